// ── Core error types ──
//
// Errors surfaced by nvrlink-core to embedders. Stream-time failures never
// take this path: they become error signals on the EventChannel and the
// manager keeps retrying. These variants cover construction and teardown.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Construction errors ──────────────────────────────────────────
    #[error("Invalid connection target: {message}")]
    InvalidTarget { message: String },

    #[error("Cannot connect to {host}: {reason}")]
    ConnectionFailed { host: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<nvrlink_api::Error> for CoreError {
    fn from(err: nvrlink_api::Error) -> Self {
        match err {
            nvrlink_api::Error::Authentication { message }
            | nvrlink_api::Error::DigestChallenge { message } => {
                CoreError::AuthenticationFailed { message }
            }
            nvrlink_api::Error::Transport(ref e) => CoreError::ConnectionFailed {
                host: e
                    .url()
                    .and_then(|u| u.host_str().map(str::to_owned))
                    .unwrap_or_else(|| "<unknown>".into()),
                reason: e.to_string(),
            },
            nvrlink_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            nvrlink_api::Error::Tls(msg) => CoreError::Config {
                message: format!("TLS error: {msg}"),
            },
            nvrlink_api::Error::HttpStatus { status, url } => CoreError::ConnectionFailed {
                host: url,
                reason: format!("HTTP {status}"),
            },
            nvrlink_api::Error::StreamInterrupted(reason) => CoreError::ConnectionFailed {
                host: String::new(),
                reason,
            },
        }
    }
}
