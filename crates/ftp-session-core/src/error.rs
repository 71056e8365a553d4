//! Error types for control-channel correlation

use thiserror::Error;

/// Result type alias for correlator operations
pub type Result<T> = std::result::Result<T, FtpError>;

/// Main error type for correlator operations
#[derive(Error, Debug)]
pub enum FtpError {
    /// The record sink hung up; no further emissions are possible
    #[error("record channel closed")]
    EmitChannelClosed,

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    ConfigError(String),
}

impl FtpError {
    /// Returns true if the error means the downstream collaborator went away
    pub fn is_channel_closed(&self) -> bool {
        matches!(self, FtpError::EmitChannelClosed)
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for FtpError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        FtpError::EmitChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categorization() {
        assert!(FtpError::EmitChannelClosed.is_channel_closed());
        assert!(!FtpError::ConfigError("bad".to_string()).is_channel_closed());
    }
}
