//! Event definitions consumed from and produced for collaborators

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ConnectionId;

/// Events delivered by the transport/decoding layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControlEvent {
    /// A command line was observed on the control channel
    CommandIssued {
        /// Connection the command was seen on
        conn: ConnectionId,
        /// Command verb as decoded from the wire
        command: String,
        /// Command argument, possibly empty
        argument: String,
        /// Observation timestamp
        ts: DateTime<Utc>,
    },

    /// A status line was observed on the control channel
    ReplyReceived {
        /// Connection the reply was seen on
        conn: ConnectionId,
        /// 3-digit numeric status code
        code: u16,
        /// Free-form reply text
        message: String,
        /// True for the non-final lines of a multi-line reply
        continuation: bool,
        /// Observation timestamp
        ts: DateTime<Utc>,
    },

    /// The control connection terminated
    ConnectionClosed {
        /// Connection that went away
        conn: ConnectionId,
    },
}

/// Out-of-band signals raised toward a notification collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NotableEvent {
    /// A SITE EXEC command succeeded on the control channel
    SiteExecSuccess {
        /// Connection the command ran on
        conn: ConnectionId,
        /// Session uid for cross-log correlation
        uid: String,
        /// Human-readable summary of what ran
        message: String,
    },
}
