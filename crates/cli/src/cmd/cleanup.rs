//! Drop ledger records whose source images are gone

use crate::system_config;
use anyhow::Result;
use gridstitch_journal::Ledger;
use owo_colors::OwoColorize;

pub async fn run() -> Result<()> {
    let config = system_config::load()?;
    let root = config.settings.watch_folder;

    let (removed, remaining) = tokio::task::spawn_blocking(move || {
        let ledger = Ledger::open(&root);
        (ledger.cleanup(), ledger.count())
    })
    .await?;

    if removed == 0 {
        println!("{}", "Ledger is clean".dimmed());
    } else {
        println!("{} Removed {} stale records", "✓".green(), removed);
    }
    println!("{} groups recorded", remaining);
    Ok(())
}
