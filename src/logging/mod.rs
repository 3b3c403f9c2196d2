//! Logging Module
//!
//! Log sink abstraction used by the relay core, plus hex rendering of
//! relayed data.

pub mod hexdump;
pub mod memory;
pub mod sink;

pub use hexdump::{hex_dump, hex_line};
pub use memory::{LogEntry, RecordingLog};
pub use sink::{RelayLog, TracingLog};

/// Shared handle to a log sink
pub type SharedLog = std::sync::Arc<dyn RelayLog>;
