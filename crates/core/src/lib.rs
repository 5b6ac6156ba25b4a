//! Core types and the grid compositor for Gridstitch
//!
//! This crate provides:
//! - Image groups and their canonical ordering
//! - Order-independent group keys
//! - The fixed grid layout table (2-6 images)
//! - The grid compositor and output naming
//! - A status observer bus for UI/log consumers

pub mod compose;
pub mod error;
pub mod group;
pub mod layout;
pub mod status;

// Re-exports
pub use compose::{common_prefix, output_file_name, Compositor, StitchOutput, OUTPUT_DIR_NAME};
pub use error::{Result, StitchError};
pub use group::{is_supported_image, GroupKey, ImageGroup, MAX_GROUP_SIZE, MIN_GROUP_SIZE, SUPPORTED_EXTENSIONS};
pub use layout::GridLayout;
pub use status::{StatusBus, StatusEvent, StatusKind};
