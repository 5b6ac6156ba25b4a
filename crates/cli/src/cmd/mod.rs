//! CLI command implementations

pub mod cleanup;
pub mod config;
pub mod pause;
pub mod scan;
pub mod start;
pub mod status;
pub mod stitch;
