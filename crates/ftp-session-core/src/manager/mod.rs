//! Session correlator
//!
//! The central coordinator for control-channel correlation. It receives
//! "command issued," "reply received," and "connection ended" notifications
//! from the transport layer, drives per-session state and the data-channel
//! predictor, and hands finalized records to the logging collaborator.

mod handlers;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::CorrelatorConfig;
use crate::error::{FtpError, Result};
use crate::events::{ControlEvent, NotableEvent};
use crate::predictor::{DataChannelPredictor, ExpectedConnectionTable};
use crate::session::SessionState;
use crate::types::{ConnectionId, SessionRecord};

/// Event-driven correlator for FTP control connections.
///
/// Each connection's events arrive strictly ordered; sessions live in a
/// concurrent map so many transport tasks can feed the correlator, while the
/// expectation table is shared process-wide state read by the
/// connection-acceptance path.
pub struct SessionCorrelator {
    /// Active sessions by control connection identity
    pub(crate) sessions: Arc<DashMap<ConnectionId, SessionState>>,

    /// Negotiation parser writing into the shared expectation table
    pub(crate) predictor: DataChannelPredictor,

    /// Correlator configuration
    pub(crate) config: CorrelatorConfig,

    /// Channel for handing finalized records to the log sink
    pub(crate) record_tx: mpsc::Sender<SessionRecord>,

    /// Optional channel for notable-event signals
    pub(crate) notable_tx: Option<mpsc::Sender<NotableEvent>>,

    /// Shutdown signal for the event loop and sweeper
    pub(crate) shutdown: Arc<Notify>,
}

impl SessionCorrelator {
    /// Create a new correlator emitting records on `record_tx`
    pub fn new(config: CorrelatorConfig, record_tx: mpsc::Sender<SessionRecord>) -> Result<Self> {
        if config.max_pending_commands == 0 {
            return Err(FtpError::ConfigError(
                "max_pending_commands must be at least 1".to_string(),
            ));
        }
        if config.expectation_ttl == 0 {
            return Err(FtpError::ConfigError(
                "expectation_ttl must be at least 1 second".to_string(),
            ));
        }

        let table = ExpectedConnectionTable::new(config.expectation_ttl);
        Ok(Self {
            sessions: Arc::new(DashMap::new()),
            predictor: DataChannelPredictor::new(table),
            config,
            record_tx,
            notable_tx: None,
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// Attach a notable-event channel
    pub fn with_notable_sender(mut self, notable_tx: mpsc::Sender<NotableEvent>) -> Self {
        self.notable_tx = Some(notable_tx);
        self
    }

    /// Handle to the expectation table, for the connection-acceptance
    /// collaborator
    pub fn expectations(&self) -> ExpectedConnectionTable {
        self.predictor.table().clone()
    }

    /// The negotiation predictor owned by this correlator
    pub fn predictor(&self) -> &DataChannelPredictor {
        &self.predictor
    }

    /// Number of sessions currently tracked
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Dispatch one transport event
    pub fn handle_event(&self, event: ControlEvent) -> Result<()> {
        match event {
            ControlEvent::CommandIssued {
                conn,
                command,
                argument,
                ts,
            } => self.handle_command(conn, &command, &argument, ts),
            ControlEvent::ReplyReceived {
                conn,
                code,
                message,
                continuation,
                ts,
            } => self.handle_reply(conn, code, &message, continuation, ts),
            ControlEvent::ConnectionClosed { conn } => self.handle_connection_closed(conn),
        }
    }

    /// Consume transport events until the channel closes or shutdown fires
    pub async fn run(&self, mut events: mpsc::Receiver<ControlEvent>) -> Result<()> {
        info!("session correlator started");
        loop {
            tokio::select! {
                maybe_event = events.recv() => match maybe_event {
                    Some(event) => {
                        if let Err(e) = self.handle_event(event) {
                            error!("session correlator stopping: {}", e);
                            return Err(e);
                        }
                    }
                    None => {
                        debug!("control event channel closed");
                        break;
                    }
                },
                _ = self.shutdown.notified() => {
                    info!("session correlator shutting down");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Spawn the expectation-table sweep on this correlator's shutdown signal
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        self.expectations()
            .spawn_sweeper(self.config.expiry_check_interval, self.shutdown.clone())
    }

    /// Stop the event loop and sweeper
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    /// Attach a detection tag to a session's current command.
    ///
    /// Tags make the pairing emission-worthy regardless of the
    /// logged-commands set, and are cleared at every emission.
    pub fn tag_session(&self, conn: ConnectionId, tag: &str) {
        match self.sessions.get_mut(&conn) {
            Some(mut session) => {
                session.tags.insert(tag.to_string());
            }
            None => debug!("tag {:?} for unknown session {}", tag, conn),
        }
    }

    /// Record MIME metadata reported by a file-analysis collaborator
    pub fn set_mime(&self, conn: ConnectionId, mime_type: &str, mime_desc: Option<&str>) {
        match self.sessions.get_mut(&conn) {
            Some(mut session) => {
                session.mime_type = Some(mime_type.to_string());
                session.mime_desc = mime_desc.map(|d| d.to_string());
            }
            None => debug!("MIME metadata for unknown session {}", conn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let (tx, _rx) = mpsc::channel(8);
        let mut config = CorrelatorConfig::default();
        config.max_pending_commands = 0;
        assert!(matches!(
            SessionCorrelator::new(config, tx),
            Err(FtpError::ConfigError(_))
        ));

        let (tx, _rx) = mpsc::channel(8);
        let mut config = CorrelatorConfig::default();
        config.expectation_ttl = 0;
        assert!(matches!(
            SessionCorrelator::new(config, tx),
            Err(FtpError::ConfigError(_))
        ));
    }

    #[test]
    fn test_fresh_correlator_is_empty() {
        let (tx, _rx) = mpsc::channel(8);
        let correlator = SessionCorrelator::new(CorrelatorConfig::default(), tx).unwrap();
        assert_eq!(correlator.session_count(), 0);
        assert!(correlator.expectations().is_empty());
        assert_eq!(correlator.predictor().parse_failure_count(), 0);
    }
}
