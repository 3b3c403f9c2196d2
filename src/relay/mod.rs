//! Data Relay Module
//!
//! Connects to remote endpoints and moves data between a client and all of
//! its remotes.

pub mod connector;
pub mod fanout;
pub mod pump;
pub mod session;
pub mod stats;

pub use connector::{ConnectError, EndpointConnector};
pub use fanout::{FanOutPump, FanOutTarget};
pub use pump::{shared_writer, PumpOutcome, PumpSettings, RelayPump, SharedWriter};
pub use session::{ConnectionSession, SessionState, SessionSummary};
pub use stats::{Flow, SessionStats};
