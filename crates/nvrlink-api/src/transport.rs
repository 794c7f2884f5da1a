// Shared transport configuration for building the per-target reqwest::Client.
//
// One client per connection target. The idle pool is capped so that a target
// never holds more than its single event stream plus one idle socket.

use std::time::Duration;

use tracing::warn;

use crate::error::Error;

/// TLS verification mode for `https` targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// Use the bundled root store and the backend's default protocol floor.
    System,
    /// Accept any certificate and request TLS 1.0 as the minimum version.
    ///
    /// Cameras and NVRs ship self-signed certificates and old firmware; this
    /// is the compatibility default.
    #[default]
    LegacyAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Bounds the TCP/TLS connect phase only; the event body is unbounded.
    pub connect_timeout: Duration,
    /// Idle sockets kept per host.
    pub max_idle_per_host: usize,
    pub tcp_keepalive: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::default(),
            connect_timeout: Duration::from_secs(30),
            max_idle_per_host: 1,
            tcp_keepalive: Some(Duration::from_secs(60)),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .pool_max_idle_per_host(self.max_idle_per_host)
            .tcp_keepalive(self.tcp_keepalive)
            .user_agent(concat!("nvrlink/", env!("CARGO_PKG_VERSION")));

        if self.tls == TlsMode::LegacyAcceptInvalid {
            // rustls cannot go below TLS 1.2; the requested floor is
            // clamped by the backend, so tell the operator.
            warn!(
                requested_min = "TLS 1.0",
                effective_min = "TLS 1.2",
                "certificate verification disabled; legacy TLS versions unavailable with rustls"
            );
            builder = builder
                .danger_accept_invalid_certs(true)
                .min_tls_version(reqwest::tls::Version::TLS_1_0);
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    /// Same config with a different idle-pool cap.
    pub fn with_max_idle_per_host(mut self, max_idle: usize) -> Self {
        self.max_idle_per_host = max_idle;
        self
    }
}
