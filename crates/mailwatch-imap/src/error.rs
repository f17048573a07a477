//! Error types for the IMAP engine.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// SOCKS proxy dial failed.
    #[error("Proxy connect error: {0}")]
    Proxy(#[from] tokio_socks::Error),

    /// Server rejected a command (NO/BAD), carrying the server's own text.
    #[error("Command failed: {0}")]
    Command(String),

    /// Malformed ID or search arguments, caught before transmission.
    #[error("Invalid argument: {0}")]
    Validation(String),

    /// Operation submitted while no connection is open.
    #[error("Not connected")]
    NotConnected,

    /// The connection was destroyed while the operation was pending.
    ///
    /// Pending operations are discarded on teardown, never settled with a
    /// fabricated command result.
    #[error("Connection destroyed")]
    Destroyed,

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Protocol violation or invalid connection state.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_server_text() {
        let err = Error::Command("SELECT failed: no such mailbox".to_string());
        assert!(err.to_string().contains("no such mailbox"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn timeout_reports_duration() {
        let err = Error::Timeout(Duration::from_secs(5));
        assert!(err.to_string().contains("5s"));
    }
}
