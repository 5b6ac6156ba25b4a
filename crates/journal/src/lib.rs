//! Completion ledger for Gridstitch
//!
//! This crate provides:
//! - The persisted record of which image groups were already stitched
//! - Crash-tolerant loading (a corrupt ledger is treated as empty)
//! - Cleanup of records whose source files disappeared

pub mod ledger;

// Re-exports
pub use ledger::{Ledger, LedgerError, ProcessingRecord, LEDGER_FILE_NAME, LEDGER_VERSION};

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;
