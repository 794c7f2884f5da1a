//! CLI error types with miette diagnostics.

use miette::Diagnostic;
use thiserror::Error;

use nvrlink_config::ConfigError;
use nvrlink_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file not found")]
    #[diagnostic(
        code(nvrlink::no_config),
        help(
            "Create one listing your cameras, or pass --config.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(nvrlink::validation))]
    Validation { field: String, reason: String },

    #[error("No password configured for camera '{camera}'")]
    #[diagnostic(
        code(nvrlink::no_credentials),
        help("Set `password_env` (preferred) or `password` on the camera.")
    )]
    NoCredentials { camera: String },

    #[error("Cameras on {host} disagree on {field}")]
    #[diagnostic(
        code(nvrlink::conflict),
        help(
            "Cameras on one NVR share a single event stream, so they must use\n\
             the same username, password and insecure setting."
        )
    )]
    Conflict { host: String, field: String },

    #[error(transparent)]
    #[diagnostic(code(nvrlink::config))]
    Config(Box<figment::Error>),

    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not set up the connection to {host}")]
    #[diagnostic(code(nvrlink::connection_failed))]
    ConnectionFailed {
        host: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(nvrlink::auth_failed),
        help("Verify the username and password configured for this NVR.")
    )]
    AuthFailed { message: String },

    #[error("Motion webhook client error")]
    #[diagnostic(code(nvrlink::webhook))]
    Webhook(#[from] reqwest::Error),

    // ── Internal ─────────────────────────────────────────────────────
    #[error("Internal error: {message}")]
    #[diagnostic(code(nvrlink::internal))]
    Internal { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NoConfig { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError / CoreError → CliError mapping ───────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { camera } => CliError::NoCredentials { camera },
            ConfigError::Conflict { host, field } => CliError::Conflict {
                host,
                field: field.into(),
            },
            ConfigError::NotFound { path } => CliError::NoConfig {
                path: path.display().to_string(),
            },
            ConfigError::Figment(err) => CliError::Config(err),
            ConfigError::Target(err) => err.into(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidTarget { message } => CliError::Validation {
                field: "camera".into(),
                reason: message,
            },
            CoreError::ConnectionFailed { host, reason } => CliError::ConnectionFailed {
                host,
                source: reason.into(),
            },
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::Config { message } => CliError::Validation {
                field: "transport".into(),
                reason: message,
            },
            CoreError::Internal(message) => CliError::Internal { message },
        }
    }
}
