//! Configuration Module
//!
//! Handles configuration loading, validation, and persistence.

pub mod manager;
pub mod options;
pub mod types;

pub use manager::ConfigManager;
pub use options::ConfigOption;
pub use types::*;
