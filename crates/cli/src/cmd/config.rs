//! Configuration management command
//!
//! Provides CLI interface to view and edit the settings file.

use crate::system_config::{self, SystemConfig};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;

/// List all configuration values
pub async fn run_list() -> Result<()> {
    let config = system_config::load()?;
    let config_path = system_config::config_file_path()
        .context("Could not determine config file path")?;

    println!("{}", "Gridstitch Configuration".bold());
    println!("{}: {}", "Location".dimmed(), config_path.display().dimmed());

    let mut section = "";
    for &key in SystemConfig::KEYS {
        let (prefix, name) = key.split_once('.').unwrap_or(("", key));
        if prefix != section {
            println!("\n{}", format!("[{}]", prefix).yellow());
            section = prefix;
        }
        let value = config.get(key)?;
        let value = if value.is_empty() {
            "(not set)".dimmed().to_string()
        } else {
            value
        };
        println!("  {} = {}", name.cyan(), value);
    }

    println!("\n{}", "Valid Ranges:".bold());
    println!("  debounce_ms: 100-600,000");
    println!("  single_hold_ms: >= debounce_ms");
    println!("  stability_ms: 0-60,000");
    println!("  poll_interval_ms: 10-5,000");
    println!("  max_depth: 1-255");
    println!("  cleanup_interval_secs: 0 disables");

    Ok(())
}

/// Get a single configuration value
pub async fn run_get(key: &str) -> Result<()> {
    let config = system_config::load()?;
    println!("{}", config.get(key)?);
    Ok(())
}

/// Set a configuration value
pub async fn run_set(key: &str, value: &str) -> Result<()> {
    let mut config = system_config::load()?;
    config.set(key, value)?;
    system_config::save(&config)?;

    println!("{} {} = {}", "✓".green(), key.cyan(), value);
    println!(
        "{}",
        "Note: Restart the watcher for changes to take effect".yellow()
    );

    Ok(())
}

/// Show the config file path and optionally create it
pub async fn run_path(create: bool) -> Result<()> {
    let config_path = system_config::config_file_path()
        .context("Could not determine config file path")?;

    if create && !config_path.exists() {
        system_config::init_if_missing()?;
        println!("{} Created config file at: {}", "✓".green(), config_path.display());
    } else if config_path.exists() {
        println!("{}", config_path.display());
    } else {
        println!("{}", config_path.display());
        println!("{}", "File does not exist. Use --create to create it.".yellow());
    }

    Ok(())
}

/// Show example configuration
pub async fn run_example() -> Result<()> {
    println!("{}", system_config::example_config());
    Ok(())
}
