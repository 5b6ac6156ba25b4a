//! Stitch an explicit list of files

use anyhow::{Context, Result};
use gridstitch_core::Compositor;
use owo_colors::OwoColorize;
use std::path::PathBuf;

pub async fn run(files: Vec<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let compositor = Compositor::new(output);

    let result = tokio::task::spawn_blocking(move || compositor.compose(&files))
        .await?
        .context("Failed to stitch images")?;

    println!(
        "{} {} ({} images, {}x{})",
        "✓".green(),
        result.output_path.display(),
        result.count(),
        result.width,
        result.height
    );
    Ok(())
}
