//! Core types for control-channel correlation

use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder user before a USER command is seen
pub const UNKNOWN_USER: &str = "<unknown>";

/// Marker substituted for passwords of non-anonymous users
pub const REDACTED_PASSWORD: &str = "<hidden>";

/// Synthetic command seeded into a fresh session so the server greeting
/// has something to pair with
pub const INIT_COMMAND: &str = "<init>";

/// Synthetic command for the terminal pairing of a session that ends with
/// nothing queued
pub const FINISH_COMMAND: &str = "<finish>";

/// Working directory sentinel meaning "an existing but unspecified directory"
pub const DEFAULT_CWD: &str = "/.";

/// Identity of a control connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId {
    /// Address/port of the endpoint that opened the control connection
    pub orig: SocketAddr,

    /// Address/port of the responding (server) endpoint
    pub resp: SocketAddr,
}

impl ConnectionId {
    /// Create a new connection identity
    pub fn new(orig: SocketAddr, resp: SocketAddr) -> Self {
        Self { orig, resp }
    }

    /// Address of the responding endpoint
    pub fn responder_ip(&self) -> IpAddr {
        self.resp.ip()
    }

    /// Address of the originating endpoint
    pub fn originator_ip(&self) -> IpAddr {
        self.orig.ip()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.orig, self.resp)
    }
}

/// A command issued on the control channel, not yet paired with a reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCommand {
    /// Command verb, uppercased (e.g. "RETR")
    pub command: String,

    /// Command argument, possibly empty
    pub argument: String,

    /// When the command was observed
    pub issued_at: DateTime<Utc>,
}

impl PendingCommand {
    /// Create a pending command
    pub fn new(command: String, argument: String, issued_at: DateTime<Utc>) -> Self {
        Self {
            command,
            argument,
            issued_at,
        }
    }

    /// Create a synthetic entry such as the greeting shim or the terminal
    /// finish marker
    pub fn synthetic(command: &str, issued_at: DateTime<Utc>) -> Self {
        Self {
            command: command.to_string(),
            argument: String::new(),
            issued_at,
        }
    }

    /// Returns true for entries the correlator made up rather than observed
    pub fn is_synthetic(&self) -> bool {
        self.command == INIT_COMMAND || self.command == FINISH_COMMAND
    }
}

/// Who is expected to dial the predicted data connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataDirection {
    /// Active mode: the server connects out to the client-supplied endpoint
    Active,
    /// Passive mode: the client connects to the server-supplied endpoint
    Passive,
}

impl fmt::Display for DataDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataDirection::Active => write!(f, "active"),
            DataDirection::Passive => write!(f, "passive"),
        }
    }
}

/// A predicted future data connection negotiated on a control channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedConnection {
    /// Host the data connection is expected to target
    pub host: IpAddr,

    /// Port the data connection is expected to target
    pub port: u16,

    /// Uid of the control session that negotiated the channel
    pub session_uid: String,

    /// Identity of the control connection that negotiated the channel
    pub session: ConnectionId,

    /// Negotiation mode the endpoint came from
    pub direction: DataDirection,

    /// When the expectation was registered; entries expire a fixed TTL later
    pub registered_at: DateTime<Utc>,
}

/// One finalized command/reply pairing, ready for the structured-log sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Issue time of the paired command
    pub ts: DateTime<Utc>,

    /// Session uid for cross-log correlation
    pub uid: String,

    /// Control connection identity
    pub id: ConnectionId,

    /// Username, or "<unknown>"
    pub user: String,

    /// Password if captured; redacted unless the user is anonymous-class
    pub password: Option<String>,

    /// Command verb
    pub command: String,

    /// Command argument; rewritten to an ftp:// locator for file commands
    pub argument: String,

    /// MIME type reported by a file-analysis collaborator
    pub mime_type: Option<String>,

    /// MIME description reported by a file-analysis collaborator
    pub mime_desc: Option<String>,

    /// Transferred file size in bytes, when a reply disclosed it
    pub file_size: Option<u64>,

    /// Final reply code paired with the command
    pub reply_code: Option<u16>,

    /// Final reply text paired with the command
    pub reply_msg: Option<String>,

    /// Detection tags attached by external collaborators
    pub tags: HashSet<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> ConnectionId {
        ConnectionId::new(
            "10.0.0.2:40000".parse().unwrap(),
            "10.0.0.1:21".parse().unwrap(),
        )
    }

    #[test]
    fn test_connection_display() {
        assert_eq!(conn().to_string(), "10.0.0.2:40000 -> 10.0.0.1:21");
        assert_eq!(conn().responder_ip(), "10.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_synthetic_commands() {
        let shim = PendingCommand::synthetic(INIT_COMMAND, Utc::now());
        assert!(shim.is_synthetic());
        assert!(shim.argument.is_empty());

        let real = PendingCommand::new("RETR".to_string(), "a".to_string(), Utc::now());
        assert!(!real.is_synthetic());
    }
}
