//! Connection Management Module
//!
//! Handles TCP connection acceptance and session spawning.

pub mod manager;

pub use manager::{run_proxy_server, ConnectionManager};
