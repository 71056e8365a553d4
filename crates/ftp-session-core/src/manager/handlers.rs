//! Protocol event handlers for the session correlator
//!
//! One handler per transport notification, plus the finalize/emit path they
//! all funnel into. Handlers never fail on malformed input; the only error
//! they surface is the record sink hanging up.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::error::{FtpError, Result};
use crate::events::NotableEvent;
use crate::predictor::NegotiationVariant;
use crate::reply::ReplyCode;
use crate::session::{Pairing, SessionState};
use crate::types::{
    ConnectionId, PendingCommand, SessionRecord, FINISH_COMMAND, INIT_COMMAND, REDACTED_PASSWORD,
};

use super::SessionCorrelator;

impl SessionCorrelator {
    /// Handle a command observed on the control channel
    pub(crate) fn handle_command(
        &self,
        conn: ConnectionId,
        command: &str,
        argument: &str,
        ts: DateTime<Utc>,
    ) -> Result<()> {
        let command = command.trim().to_uppercase();
        let argument = argument.trim().to_string();
        debug!("{} command {} {}", conn, command, argument);

        let mut session = self
            .sessions
            .entry(conn)
            .or_insert_with(|| SessionState::new(conn, &self.config, ts));

        // A completed pairing is written out when the next command arrives
        if session.pairing.as_ref().is_some_and(Pairing::is_complete) {
            self.finalize(&mut session)?;
        }

        match command.as_str() {
            "USER" if !argument.is_empty() => session.user = argument.clone(),
            "PASS" => session.password = Some(argument.clone()),
            _ => {}
        }

        session.command = command.clone();
        session.argument = argument.clone();
        session.pending.push(command, argument, ts);
        Ok(())
    }

    /// Handle a reply observed on the control channel
    pub(crate) fn handle_reply(
        &self,
        conn: ConnectionId,
        code: u16,
        message: &str,
        continuation: bool,
        ts: DateTime<Utc>,
    ) -> Result<()> {
        if continuation {
            debug!("{} ignoring continuation line for {}", conn, code);
            return Ok(());
        }

        let mut session = self
            .sessions
            .entry(conn)
            .or_insert_with(|| SessionState::new(conn, &self.config, ts));

        // Pair FIFO against the queue. With nothing queued, the reply
        // refines the held pairing (a later status line superseding an
        // earlier one for the same command), or it is unsolicited and
        // pairs with a fresh shim.
        let command = session
            .pending
            .take_matching(code)
            .or_else(|| session.pairing.take().map(|p| p.command))
            .unwrap_or_else(|| PendingCommand::synthetic(INIT_COMMAND, ts));

        session.reply_code = Some(code);
        session.reply_msg = Some(message.to_string());
        session.pairing = Some(Pairing {
            command,
            reply_code: Some(code),
            reply_message: message.to_string(),
        });

        self.apply_reply_effects(&mut session, code, message);

        // The server is batching replies: emit now instead of holding the
        // pairing for a command that may never come
        if !session.pending.is_empty() {
            self.finalize(&mut session)?;
        }
        Ok(())
    }

    /// Handle control connection termination
    pub(crate) fn handle_connection_closed(&self, conn: ConnectionId) -> Result<()> {
        let Some((_, mut session)) = self.sessions.remove(&conn) else {
            debug!("close for unknown session {}", conn);
            return Ok(());
        };

        // A command still waiting gets a terminal pairing carrying the last
        // reply metadata forward
        if session.pairing.is_none() {
            let command = session
                .pending
                .take_next()
                .unwrap_or_else(|| PendingCommand::synthetic(FINISH_COMMAND, Utc::now()));
            session.pairing = Some(Pairing {
                command,
                reply_code: session.reply_code,
                reply_message: session.reply_msg.clone().unwrap_or_default(),
            });
        }

        let result = self.finalize(&mut session);
        info!("{} control session {} closed", conn, session.uid);
        result
    }

    /// Command-specific enrichment driven by the paired reply
    fn apply_reply_effects(&self, session: &mut SessionState, code: u16, message: &str) {
        let (cmd, arg) = match &session.pairing {
            Some(p) => (p.command.command.clone(), p.command.argument.clone()),
            None => return,
        };
        let digits = ReplyCode::decode(code);

        if cmd == "RETR" && code == 150 {
            if let Some(size) = parse_byte_count(message) {
                session.file_size = Some(size);
            }
        }

        if cmd == "SIZE" && code == 213 {
            if let Ok(size) = message.trim().parse::<u64>() {
                session.file_size = Some(size);
            }
        }

        if cmd == "SITE" && digits.is_success() && arg.to_lowercase().contains("exec") {
            self.notify_site_exec(session, &arg);
        }

        if digits.is_success() && (cmd == "PORT" || cmd == "EPRT") {
            let variant = if cmd == "PORT" {
                NegotiationVariant::Port
            } else {
                NegotiationVariant::Eprt
            };
            if let Some((host, port)) =
                self.predictor
                    .parse(variant, &arg, session.conn.responder_ip())
            {
                self.predictor
                    .register(host, port, session, variant.direction());
            }
        }

        if (cmd == "PASV" && code == 227) || (cmd == "EPSV" && code == 229) {
            let variant = if cmd == "PASV" {
                NegotiationVariant::Pasv
            } else {
                NegotiationVariant::Epsv
            };
            if let Some((host, port)) =
                self.predictor
                    .parse(variant, message, session.conn.responder_ip())
            {
                self.predictor
                    .register(host, port, session, variant.direction());
            }
        }

        session.cwd.apply_directory_reply(&cmd, &arg, code, message);
    }

    /// Raise the notable-event signal for a successful SITE EXEC
    fn notify_site_exec(&self, session: &SessionState, argument: &str) {
        info!("{} SITE EXEC succeeded: {}", session.conn, argument);
        let Some(tx) = &self.notable_tx else {
            return;
        };
        let event = NotableEvent::SiteExecSuccess {
            conn: session.conn,
            uid: session.uid.clone(),
            message: format!("SITE EXEC succeeded: {}", argument),
        };
        if let Err(e) = tx.try_send(event) {
            warn!("dropping notable event: {}", e);
        }
    }

    /// Consume the in-flight pairing: emit it if it is worth logging, then
    /// clear the transient fields either way
    pub(crate) fn finalize(&self, session: &mut SessionState) -> Result<()> {
        let Some(pairing) = session.pairing.take() else {
            return Ok(());
        };

        let loggable = !session.tags.is_empty()
            || self.config.logged_commands.contains(&pairing.command.command);

        let result = if loggable {
            self.emit(session, &pairing)
        } else {
            Ok(())
        };

        session.reset_transients();
        result
    }

    /// Build and hand off one record; non-blocking, buffered by the sink
    fn emit(&self, session: &SessionState, pairing: &Pairing) -> Result<()> {
        let command = &pairing.command.command;
        let mut argument = pairing.command.argument.clone();
        if self.config.file_commands.contains(command) {
            argument = format!(
                "ftp://{}{}",
                format_host(session.conn.responder_ip()),
                session.cwd.resolve(&argument)
            );
        }

        let password = if self
            .config
            .guest_users
            .contains(&session.user.to_lowercase())
        {
            session.password.clone()
        } else {
            session
                .password
                .as_ref()
                .map(|_| REDACTED_PASSWORD.to_string())
        };

        let record = SessionRecord {
            ts: pairing.command.issued_at,
            uid: session.uid.clone(),
            id: session.conn,
            user: session.user.clone(),
            password,
            command: command.clone(),
            argument,
            mime_type: session.mime_type.clone(),
            mime_desc: session.mime_desc.clone(),
            file_size: session.file_size,
            reply_code: pairing.reply_code,
            reply_msg: if pairing.reply_message.is_empty() {
                None
            } else {
                Some(pairing.reply_message.clone())
            },
            tags: session.tags.clone(),
        };

        match self.record_tx.try_send(record) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(record)) => {
                warn!(
                    "record buffer full, dropping {} record for {}",
                    record.command, record.id
                );
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(FtpError::EmitChannelClosed),
        }
    }
}

/// Extract a "(NNN bytes)" byte count from free-form reply text
fn parse_byte_count(message: &str) -> Option<u64> {
    for (idx, _) in message.match_indices('(') {
        let rest = &message[idx + 1..];
        let end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if end == 0 {
            continue;
        }
        if rest[end..].starts_with(" bytes)") {
            if let Ok(size) = rest[..end].parse::<u64>() {
                return Some(size);
            }
        }
    }
    None
}

/// Format an address for embedding in an ftp:// locator
fn format_host(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{}]", v6),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_byte_count() {
        assert_eq!(
            parse_byte_count("Opening BINARY mode data connection for afile (1234 bytes)."),
            Some(1234)
        );
        assert_eq!(parse_byte_count("Opening (mode bytes)"), None);
        assert_eq!(parse_byte_count("no parens at all"), None);
        assert_eq!(parse_byte_count("(12 bytes) early wins (34 bytes)"), Some(12));
    }

    #[test]
    fn test_format_host() {
        assert_eq!(format_host("10.0.0.1".parse().unwrap()), "10.0.0.1");
        assert_eq!(format_host("::1".parse().unwrap()), "[::1]");
    }
}
