//! Gridstitch CLI - gridstitch command

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use cli_lib::{cmd, logging, system_config};
use std::path::PathBuf;

/// Gridstitch - Stitch images that land together into one grid
#[derive(Parser)]
#[command(name = "gridstitch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/gridstitch/config.toml)
    #[arg(long, global = true, env = system_config::CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `gridstitch_watcher=trace`
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the configured folder until Ctrl-C
    Start,
    /// Stitch unprocessed groups already in the watch folder, then exit
    Scan {
        /// Only list what would be stitched
        #[arg(long)]
        dry_run: bool,
    },
    /// Stitch the given images into one grid
    Stitch {
        /// 2 to 6 image files
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
        /// Output directory (default: Processed/ next to the first image)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show settings, watcher state and ledger size
    Status,
    /// Remove ledger records whose images are gone
    Cleanup,
    /// Stop new watching sessions from starting
    Pause,
    /// Allow watching again
    Resume,
    /// Store the auto-start flag
    Autostart {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// List all configuration values
    List,
    /// Print one value
    Get {
        /// Dotted key, e.g. watcher.debounce_ms
        key: String,
    },
    /// Change one value
    Set { key: String, value: String },
    /// Show the config file location
    Path {
        /// Write the default config if the file is missing
        #[arg(long)]
        create: bool,
    },
    /// Print an annotated example config
    Example,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = cli.config {
        system_config::set_path_override(path);
    }

    // Only the long-running watcher writes a log file
    let log_dir = matches!(cli.command, Commands::Start).then(system_config::state_dir);
    let _guard = logging::init(&cli.log_level, log_dir.as_deref())?;

    match cli.command {
        Commands::Start => cmd::start::run().await,
        Commands::Scan { dry_run } => cmd::scan::run(dry_run).await,
        Commands::Stitch { files, output } => cmd::stitch::run(files, output).await,
        Commands::Status => cmd::status::run().await,
        Commands::Cleanup => cmd::cleanup::run().await,
        Commands::Pause => cmd::pause::run_set_paused(true).await,
        Commands::Resume => cmd::pause::run_set_paused(false).await,
        Commands::Autostart { state } => cmd::pause::run_autostart(matches!(state, Toggle::On)).await,
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::List => cmd::config::run_list().await,
            ConfigCommands::Get { key } => cmd::config::run_get(&key).await,
            ConfigCommands::Set { key, value } => cmd::config::run_set(&key, &value).await,
            ConfigCommands::Path { create } => cmd::config::run_path(create).await,
            ConfigCommands::Example => cmd::config::run_example().await,
        },
    }
}
