//! Start watching in the foreground

use crate::system_config;
use anyhow::Result;

pub async fn run() -> Result<()> {
    let config = system_config::load()?;
    crate::daemon::start(&config).await
}
