//! # FTP Session Core
//!
//! Stateful correlator for FTP control channels in the ftpmon ecosystem.
//!
//! This crate provides:
//! - Command/reply pairing for long-lived control connections (FIFO with
//!   batched-reply draining)
//! - Prediction of negotiated data channels (PORT/EPRT/PASV/EPSV) into a
//!   shared, TTL-expiring expectation table
//! - Best-effort working-directory tracking for locator building
//! - One structured record per logical command, handed to an external sink
//!
//! Byte-level framing, transport lifecycle, and record encoding live in
//! collaborating crates; this core only consumes their events.

pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod path;
pub mod predictor;
pub mod reply;
pub mod session;
pub mod types;

// Re-exports for convenience
pub use config::CorrelatorConfig;
pub use error::{FtpError, Result};
pub use events::{ControlEvent, NotableEvent};
pub use manager::SessionCorrelator;
pub use path::CwdTracker;
pub use predictor::{DataChannelPredictor, ExpectedConnectionTable, NegotiationVariant};
pub use reply::ReplyCode;
pub use session::{Pairing, PendingCommandQueue, SessionState};
pub use types::{
    ConnectionId, DataDirection, ExpectedConnection, PendingCommand, SessionRecord,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
