// ── ConnectionTarget ──
//
// One unique (host, credentials) pair. Exactly one ConnectionManager, and
// therefore at most one outstanding stream, exists per target.

use std::collections::BTreeSet;
use std::fmt;

use nvrlink_api::DigestCredentials;
use nvrlink_api::session;
use secrecy::SecretString;
use url::Url;

use crate::error::CoreError;

/// Immutable description of one NVR/camera event endpoint.
#[derive(Clone)]
pub struct ConnectionTarget {
    host: String,
    credentials: DigestCredentials,
    use_insecure_transport: bool,
    watched_event_codes: BTreeSet<String>,
}

impl ConnectionTarget {
    /// Build a target. `host` may carry a port (`10.0.0.5:8080`).
    ///
    /// `use_insecure_transport` selects plaintext HTTP; otherwise HTTPS,
    /// verified or not per the manager's transport config. Event codes are deduplicated and
    /// kept sorted, which fixes the order in the attach URL.
    pub fn new<I, C>(
        host: impl Into<String>,
        username: impl Into<String>,
        password: SecretString,
        use_insecure_transport: bool,
        watched_event_codes: I,
    ) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        let host: String = host.into();
        let host = host.trim().to_string();
        if host.is_empty() {
            return Err(CoreError::InvalidTarget {
                message: "host is empty".into(),
            });
        }

        let watched_event_codes: BTreeSet<String> = watched_event_codes
            .into_iter()
            .map(|code| {
                let code: String = code.into();
                code.trim().to_string()
            })
            .filter(|code| !code.is_empty())
            .collect();
        if watched_event_codes.is_empty() {
            return Err(CoreError::InvalidTarget {
                message: format!("no event codes to watch on {host}"),
            });
        }

        Ok(Self {
            host,
            credentials: DigestCredentials {
                username: username.into(),
                password,
            },
            use_insecure_transport,
            watched_event_codes,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    pub fn credentials(&self) -> &DigestCredentials {
        &self.credentials
    }

    pub fn use_insecure_transport(&self) -> bool {
        self.use_insecure_transport
    }

    pub fn watched_event_codes(&self) -> &BTreeSet<String> {
        &self.watched_event_codes
    }

    /// `{scheme}://{host}/cgi-bin/eventManager.cgi?action=attach&codes=[...]`
    pub fn attach_url(&self) -> Result<Url, CoreError> {
        Ok(session::attach_url(
            &self.host,
            self.use_insecure_transport,
            self.watched_event_codes.iter().map(String::as_str),
        )?)
    }
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTarget")
            .field("host", &self.host)
            .field("username", &self.credentials.username)
            .field("use_insecure_transport", &self.use_insecure_transport)
            .field("watched_event_codes", &self.watched_event_codes)
            .finish_non_exhaustive()
    }
}
