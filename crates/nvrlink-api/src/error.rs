use thiserror::Error;

/// Top-level error type for the `nvrlink-api` crate.
///
/// Covers every failure mode of one event-stream attempt: Digest
/// authentication, transport, and unexpected HTTP responses.
/// `nvrlink-core` maps these into error signals and never treats any of
/// them as fatal.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The server rejected the request and no retry is possible this cycle
    /// (401 without a challenge, or too many consecutive challenges).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The `WWW-Authenticate` header could not be turned into a Digest
    /// challenge (missing realm/nonce, unsupported scheme, etc.)
    #[error("Unusable Digest challenge: {message}")]
    DigestChallenge { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, reset, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL construction error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS configuration or client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The server answered with a non-2xx, non-401 status.
    #[error("Unexpected HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// The body stream failed mid-flight.
    #[error("Event stream interrupted: {0}")]
    StreamInterrupted(String),
}

impl Error {
    /// Returns `true` if this error came out of the Digest handshake.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::DigestChallenge { .. })
    }

    /// Returns `true` for connection-level failures (refused, timeout,
    /// interrupted body) as opposed to protocol-level rejections.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            Self::StreamInterrupted(_) => true,
            _ => false,
        }
    }

    /// The HTTP status behind this error, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Authentication { .. } => Some(401),
            _ => None,
        }
    }
}

/// A malformed event record.
///
/// Only surfaces through [`record::try_parse_chunk`](crate::record::try_parse_chunk);
/// the lossy entry point downgrades it to a sentinel record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record line is missing the `{key}` field: {line:?}")]
    MissingField { key: &'static str, line: String },

    #[error("record index {value:?} is not an integer")]
    InvalidIndex { value: String },
}
