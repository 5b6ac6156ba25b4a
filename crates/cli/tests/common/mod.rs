//! Shared fixtures for the integration tests

#![allow(dead_code)]

use gridstitch_core::{StatusBus, StatusKind};
use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Write a solid-colour PNG
pub fn write_png(path: &Path, width: u32, height: u32, shade: u8) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    RgbImage::from_pixel(width, height, Rgb([shade, 255 - shade, shade / 2]))
        .save(path)
        .unwrap();
    path.to_path_buf()
}

/// Write `count` images named `{stem}_01.png`, `{stem}_02.png`, ...
pub fn write_series(dir: &Path, stem: &str, count: usize) -> Vec<PathBuf> {
    (1..=count)
        .map(|i| write_png(&dir.join(format!("{stem}_{i:02}.png")), 40, 30, (i * 30) as u8))
        .collect()
}

/// Record every status event kind emitted on `bus`
pub fn record_status(bus: &StatusBus) -> Arc<Mutex<Vec<StatusKind>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    bus.on_status_event(move |event| sink.lock().push(event.kind.clone()));
    events
}

/// Files in `dir` with a `.jpg` extension
pub fn outputs_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut found: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e == "jpg").unwrap_or(false))
        .collect();
    found.sort();
    found
}

/// Poll `check` every 50ms until it holds or `timeout` passes
pub async fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}
