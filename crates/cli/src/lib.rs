//! Gridstitch CLI library
//!
//! Wires the watcher, processing queue and ledger into the `gridstitch`
//! daemon, and holds the settings store and command implementations.

pub mod cmd;
pub mod daemon;
pub mod locks;
pub mod logging;
pub mod queue;
pub mod system_config;

pub use queue::{ProcessingQueue, QueueHandle};
pub use system_config::SystemConfig;
