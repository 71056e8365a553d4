//! Per-connection session state

mod pending;

pub use pending::PendingCommandQueue;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::CorrelatorConfig;
use crate::path::CwdTracker;
use crate::types::{ConnectionId, PendingCommand, INIT_COMMAND, UNKNOWN_USER};

/// The in-flight association of one command with its reply
#[derive(Debug, Clone)]
pub struct Pairing {
    /// The command this pairing answers
    pub command: PendingCommand,

    /// Reply code, once a reply (or terminal condition) arrived
    pub reply_code: Option<u16>,

    /// Reply text accompanying the code
    pub reply_message: String,
}

impl Pairing {
    /// A pairing is complete once it has both a command and a reply code
    pub fn is_complete(&self) -> bool {
        self.reply_code.is_some()
    }
}

/// Aggregate state for one control connection.
///
/// At most one in-flight [`Pairing`] exists at a time; it is populated by a
/// dequeue from the pending queue and consumed exactly once by emission.
#[derive(Debug)]
pub struct SessionState {
    /// Session uid for cross-log correlation
    pub uid: String,

    /// Control connection identity
    pub conn: ConnectionId,

    /// When the session was first observed
    pub started_at: DateTime<Utc>,

    /// Username from the last USER command, or "<unknown>"
    pub user: String,

    /// Password from the last PASS command, if any
    pub password: Option<String>,

    /// Verb of the most recently issued command
    pub command: String,

    /// Argument of the most recently issued command
    pub argument: String,

    /// MIME type from a file-analysis collaborator; cleared at every emission
    pub mime_type: Option<String>,

    /// MIME description; cleared at every emission
    pub mime_desc: Option<String>,

    /// Transferred file size disclosed by a reply; cleared at every emission
    pub file_size: Option<u64>,

    /// Detection tags attached by collaborators; cleared at every emission
    pub tags: HashSet<String>,

    /// Code of the last reply seen on this connection
    pub reply_code: Option<u16>,

    /// Text of the last reply seen on this connection
    pub reply_msg: Option<String>,

    /// Working-directory tracker
    pub cwd: CwdTracker,

    /// The current command/reply pair under construction
    pub pairing: Option<Pairing>,

    /// Commands issued but not yet paired with a reply
    pub pending: PendingCommandQueue,
}

impl SessionState {
    /// Create session state for a newly observed control connection.
    ///
    /// The pending queue is seeded with a synthetic shim so the server
    /// greeting has something to pair with.
    pub fn new(conn: ConnectionId, config: &CorrelatorConfig, now: DateTime<Utc>) -> Self {
        let mut pending = PendingCommandQueue::new(config.max_pending_commands);
        pending.push(INIT_COMMAND.to_string(), String::new(), now);
        Self {
            uid: Uuid::new_v4().to_string(),
            conn,
            started_at: now,
            user: UNKNOWN_USER.to_string(),
            password: None,
            command: String::new(),
            argument: String::new(),
            mime_type: None,
            mime_desc: None,
            file_size: None,
            tags: HashSet::new(),
            reply_code: None,
            reply_msg: None,
            cwd: CwdTracker::new(),
            pairing: None,
            pending,
        }
    }

    /// Clear the fields that never persist across command boundaries
    pub fn reset_transients(&mut self) {
        self.mime_type = None;
        self.mime_desc = None;
        self.file_size = None;
        self.tags.clear();
    }
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
    fn test_new_session_seeds_shim() {
        let session = SessionState::new(conn(), &CorrelatorConfig::default(), Utc::now());
        assert_eq!(session.pending.len(), 1);
        assert_eq!(session.user, UNKNOWN_USER);
        assert!(session.pairing.is_none());
        assert!(!session.uid.is_empty());
    }

    #[test]
    fn test_reset_transients() {
        let mut session = SessionState::new(conn(), &CorrelatorConfig::default(), Utc::now());
        session.mime_type = Some("text/plain".to_string());
        session.mime_desc = Some("ASCII text".to_string());
        session.file_size = Some(42);
        session.tags.insert("bruteforce".to_string());
        session.user = "alice".to_string();

        session.reset_transients();
        assert!(session.mime_type.is_none());
        assert!(session.mime_desc.is_none());
        assert!(session.file_size.is_none());
        assert!(session.tags.is_empty());
        // Non-transient fields survive
        assert_eq!(session.user, "alice");
    }
}
