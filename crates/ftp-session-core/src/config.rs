//! Configuration for the session correlator

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Configuration for [`SessionCorrelator`](crate::manager::SessionCorrelator)
/// and the components it owns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelatorConfig {
    /// Maximum commands queued per session awaiting a reply; the oldest
    /// entry is evicted (and counted) when a misbehaving peer exceeds it
    pub max_pending_commands: usize,

    /// Lifetime of a predicted data connection, in seconds
    pub expectation_ttl: u32,

    /// Expectation-table sweep interval in seconds
    pub expiry_check_interval: u64,

    /// Commands whose command/reply pairs are always logged
    pub logged_commands: HashSet<String>,

    /// Commands whose argument names a file; the argument is rewritten
    /// into an ftp:// locator at emission
    pub file_commands: HashSet<String>,

    /// Usernames (lowercase) treated as anonymous-class; their passwords
    /// are kept verbatim instead of redacted
    pub guest_users: HashSet<String>,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            max_pending_commands: 64,
            expectation_ttl: 300,      // 5 minutes
            expiry_check_interval: 30, // Sweep every 30 seconds
            logged_commands: [
                "APPE", "DELE", "RETR", "STOR", "STOU", "ACCT", "PORT", "PASV", "EPRT", "EPSV",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
            file_commands: [
                "APPE", "CWD", "DELE", "MKD", "RETR", "RMD", "RNFR", "RNTO", "STOR", "STOU",
                "SIZE", "MDTM",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
            guest_users: ["anonymous", "ftp", "ftpuser", "guest"]
                .iter()
                .map(|u| u.to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sets() {
        let config = CorrelatorConfig::default();
        assert!(config.logged_commands.contains("RETR"));
        assert!(config.file_commands.contains("CWD"));
        assert!(config.guest_users.contains("anonymous"));
        assert!(!config.logged_commands.contains("NOOP"));
        assert_eq!(config.expectation_ttl, 300);
    }
}
