//! Show settings, daemon state and ledger size

use crate::locks::DaemonLock;
use crate::system_config;
use anyhow::{Context, Result};
use gridstitch_journal::Ledger;
use owo_colors::OwoColorize;

pub async fn run() -> Result<()> {
    let config = system_config::load()?;
    let config_path = system_config::config_file_path()
        .context("Could not determine config file path")?;
    let root = &config.settings.watch_folder;

    println!("{}", "Gridstitch Status".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    println!("Watch folder:  {}", root.display().to_string().cyan());
    if !root.is_dir() {
        println!("  {}", "Folder does not exist".red());
    }
    match &config.settings.output_folder {
        Some(out) => println!("Output folder: {}", out.display().to_string().cyan()),
        None => println!("Output folder: {}", "Processed/ next to each group".dimmed()),
    }
    println!("Config:        {}", config_path.display().dimmed());
    println!();

    print!("Watcher:       ");
    if let Some(holder) = DaemonLock::holder(root) {
        println!("{} (pid {})", "Running ✓".green(), holder.pid);
    } else if config.settings.is_paused {
        println!("{}", "Paused".yellow());
        println!("  {}", "Tip: Resume with 'gridstitch resume'".dimmed());
    } else {
        println!("{}", "Not running".yellow());
        println!("  {}", "Tip: Start with 'gridstitch start'".dimmed());
    }
    println!(
        "Auto-start:    {}",
        if config.settings.auto_start { "on" } else { "off" }
    );
    println!();

    let ledger = Ledger::open(root);
    println!("Ledger:        {}", ledger.path().display().dimmed());
    println!("  Groups:      {}", ledger.count());
    if let Some(latest) = ledger.records().into_iter().max_by_key(|r| r.processed_at) {
        println!(
            "  Latest:      {} ({})",
            latest.output_path,
            latest.processed_at.format("%Y-%m-%d %H:%M:%S UTC").to_string().dimmed()
        );
    }

    Ok(())
}
