//! Shared table of predicted future data connections

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::types::ExpectedConnection;

/// Thread-safe table of expected data connections, keyed by (host, port).
///
/// Written by many control sessions concurrently and read by the
/// connection-acceptance path. Entries expire a fixed TTL after
/// registration; expiry is lazy on lookup and also driven by an optional
/// background sweep. Re-registration of a key overwrites the prior entry.
#[derive(Debug, Clone)]
pub struct ExpectedConnectionTable {
    entries: Arc<DashMap<(IpAddr, u16), ExpectedConnection>>,
    ttl: Duration,
}

impl ExpectedConnectionTable {
    /// Create a table whose entries live for `ttl_secs` seconds
    pub fn new(ttl_secs: u32) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl: Duration::seconds(i64::from(ttl_secs)),
        }
    }

    /// Insert an expectation; the last negotiation for a key wins
    pub fn insert(&self, expectation: ExpectedConnection) {
        debug!(
            "expecting {} data connection to {}:{} for session {}",
            expectation.direction, expectation.host, expectation.port, expectation.uid_short()
        );
        self.entries
            .insert((expectation.host, expectation.port), expectation);
    }

    /// Look up a live expectation, lazily dropping it if it expired
    pub fn lookup(&self, host: IpAddr, port: u16) -> Option<ExpectedConnection> {
        self.lookup_at(host, port, Utc::now())
    }

    /// Look up against an explicit clock
    pub fn lookup_at(
        &self,
        host: IpAddr,
        port: u16,
        now: DateTime<Utc>,
    ) -> Option<ExpectedConnection> {
        let key = (host, port);
        let expired = match self.entries.get(&key) {
            Some(entry) => now >= entry.registered_at + self.ttl,
            None => return None,
        };
        if expired {
            self.entries.remove(&key);
            debug!("expected data connection to {}:{} expired", host, port);
            return None;
        }
        self.entries.get(&key).map(|entry| entry.value().clone())
    }

    /// Remove all expired entries, returning the keys that went away
    pub fn expire_entries(&self, now: DateTime<Utc>) -> Vec<(IpAddr, u16)> {
        let to_remove: Vec<(IpAddr, u16)> = self
            .entries
            .iter()
            .filter(|entry| now >= entry.registered_at + self.ttl)
            .map(|entry| *entry.key())
            .collect();

        let mut removed = Vec::new();
        for key in to_remove {
            if self.entries.remove(&key).is_some() {
                debug!("expected data connection to {}:{} expired", key.0, key.1);
                removed.push(key);
            }
        }
        removed
    }

    /// Spawn a background sweep that runs every `interval_secs` until
    /// `shutdown` fires
    pub fn spawn_sweeper(self, interval_secs: u64, shutdown: Arc<Notify>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(StdDuration::from_secs(interval_secs.max(1)));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.expire_entries(Utc::now());
                        if !removed.is_empty() {
                            debug!("swept {} expired data-connection expectations", removed.len());
                        }
                    }
                    _ = shutdown.notified() => break,
                }
            }
        })
    }

    /// Number of live (not yet swept) entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no expectations are registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ExpectedConnection {
    fn uid_short(&self) -> &str {
        self.session_uid.get(..8).unwrap_or(&self.session_uid)
    }
}
