//! Pause, resume and auto-start flags

use crate::system_config;
use anyhow::Result;
use owo_colors::OwoColorize;

/// Set `is_paused`; a running watcher picks it up on restart
pub async fn run_set_paused(paused: bool) -> Result<()> {
    let mut config = system_config::load()?;
    config.settings.is_paused = paused;
    system_config::save(&config)?;

    if paused {
        println!("{} Watching paused", "✓".green());
        println!(
            "{}",
            "Note: A running watcher keeps going until it is stopped (Ctrl-C)".yellow()
        );
    } else {
        println!("{} Watching resumed", "✓".green());
        println!("{}", "Start with 'gridstitch start'".dimmed());
    }
    Ok(())
}

pub async fn run_autostart(enabled: bool) -> Result<()> {
    let mut config = system_config::load()?;
    config.settings.auto_start = enabled;
    system_config::save(&config)?;

    println!(
        "{} Auto-start {}",
        "✓".green(),
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}
