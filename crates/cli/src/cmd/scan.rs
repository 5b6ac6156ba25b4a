//! One-shot scan: stitch every unprocessed group already on disk

use crate::daemon::log_status_event;
use crate::locks::DaemonLock;
use crate::queue::ProcessingQueue;
use crate::system_config;
use anyhow::{Context, Result};
use gridstitch_core::{Compositor, StatusBus};
use gridstitch_journal::Ledger;
use gridstitch_watcher::StartupReconciler;
use owo_colors::OwoColorize;
use std::sync::Arc;

pub async fn run(dry_run: bool) -> Result<()> {
    let config = system_config::load()?;
    let root = config.watch_root()?;
    let reconciler = StartupReconciler::from_config(&root, &config.watch_config())?;
    let ledger = Arc::new(Ledger::open(&root));

    if dry_run {
        let plan = reconciler.plan(&ledger).context("Scan failed")?;
        println!("{}", "Unprocessed groups".bold());
        for group in &plan.groups {
            println!("  {} ({} images)", group.directory().display().cyan(), group.len());
        }
        for (directory, count) in &plan.oversized {
            println!(
                "  {} {} ({} images, more than one group)",
                "skip".yellow(),
                directory.display(),
                count
            );
        }
        println!(
            "\n{} to stitch, {} already done, {} skipped",
            plan.groups.len(),
            plan.already_processed,
            plan.oversized.len()
        );
        return Ok(());
    }

    // Keep a running daemon and this scan from stitching the same groups
    let lock = DaemonLock::acquire(&root)?;

    let status = StatusBus::new();
    status.on_status_event(log_status_event);
    let compositor = Compositor::new(config.settings.output_folder.clone());
    let (queue, handle) = ProcessingQueue::spawn(compositor, Arc::clone(&ledger), status.clone());

    let scan_ledger = Arc::clone(&ledger);
    let report = tokio::task::spawn_blocking(move || reconciler.run(&scan_ledger, &handle, &status))
        .await?
        .context("Scan failed")?;

    let stats = queue.shutdown().await;
    lock.release()?;

    println!(
        "{} {} groups found, {} stitched, {} already done, {} failed",
        "✓".green(),
        report.enqueued,
        stats.stitched,
        report.already_processed + stats.skipped,
        stats.failed
    );
    if report.skipped_oversized > 0 {
        println!(
            "{}",
            format!(
                "{} folders had more than 6 images and were skipped",
                report.skipped_oversized
            )
            .yellow()
        );
    }
    Ok(())
}
