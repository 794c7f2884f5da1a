//! Configuration for nvrlink.
//!
//! A TOML file lists cameras; several cameras (channels) usually sit behind
//! one NVR host. This crate loads and validates that file and collapses the
//! cameras into one [`ConnectionTarget`] per host, so each NVR gets exactly
//! one event stream no matter how many channels are configured.
//!
//! ```toml
//! [defaults]
//! reconnect_delay_secs = 10
//! motion_port = 8080
//!
//! [[cameras]]
//! name = "driveway"
//! host = "10.0.0.5"
//! index = 0
//! username = "admin"
//! password_env = "NVR_PASSWORD"
//! event_codes = ["VideoMotion"]
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use nvrlink_api::{TlsMode, TransportConfig};
use nvrlink_core::{ConnectionTarget, CoreError, ManagerConfig};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no password configured for camera '{camera}'")]
    NoCredentials { camera: String },

    #[error("cameras on host {host} disagree on {field}")]
    Conflict { host: String, field: &'static str },

    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error(transparent)]
    Target(#[from] CoreError),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub cameras: Vec<Camera>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle connections kept per host by the HTTP pool.
    #[serde(default = "default_max_idle")]
    pub max_idle_per_host: usize,

    #[serde(default = "default_max_auth_attempts")]
    pub max_auth_attempts: u32,

    /// Verify HTTPS certificates against the system roots. Off by default
    /// because NVRs ship self-signed certificates.
    #[serde(default)]
    pub verify_tls: bool,

    /// Motion webhook endpoint.
    #[serde(default = "default_motion_host")]
    pub motion_host: String,

    #[serde(default = "default_motion_port")]
    pub motion_port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: default_reconnect_delay(),
            connect_timeout_secs: default_connect_timeout(),
            max_idle_per_host: default_max_idle(),
            max_auth_attempts: default_max_auth_attempts(),
            verify_tls: false,
            motion_host: default_motion_host(),
            motion_port: default_motion_port(),
            log_level: default_log_level(),
        }
    }
}

fn default_reconnect_delay() -> u64 {
    10
}
fn default_connect_timeout() -> u64 {
    30
}
fn default_max_idle() -> usize {
    1
}
fn default_max_auth_attempts() -> u32 {
    3
}
fn default_motion_host() -> String {
    "localhost".into()
}
fn default_motion_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".into()
}

impl Defaults {
    /// Connection manager tuning derived from these defaults.
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            reconnect_delay: Duration::from_secs(self.reconnect_delay_secs),
            max_auth_attempts: self.max_auth_attempts,
            transport: TransportConfig {
                tls: if self.verify_tls {
                    TlsMode::System
                } else {
                    TlsMode::LegacyAcceptInvalid
                },
                connect_timeout: Duration::from_secs(self.connect_timeout_secs),
                ..TransportConfig::default()
            }
            .with_max_idle_per_host(self.max_idle_per_host),
        }
    }
}

/// One camera: a channel on an NVR host.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Camera {
    /// Name passed to the motion webhook.
    pub name: String,

    /// NVR host, optionally with a port.
    pub host: String,

    /// Channel index on the host.
    #[serde(default)]
    pub index: i64,

    pub username: String,

    /// Plaintext password; prefer `password_env`.
    pub password: Option<String>,

    /// Environment variable holding the password.
    pub password_env: Option<String>,

    /// Plain HTTP instead of HTTPS.
    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_event_codes")]
    pub event_codes: Vec<String>,
}

fn default_event_codes() -> Vec<String> {
    vec!["VideoMotion".into()]
}

impl Camera {
    /// Whether an alarm from `host` on channel `index` of type `event_type`
    /// belongs to this camera.
    pub fn matches(&self, host: &str, index: i64, event_type: &str) -> bool {
        self.host.trim() == host
            && self.index == index
            && self.event_codes.iter().any(|code| code.trim() == event_type)
    }

    /// Password from `password_env` first, then the plaintext field.
    pub fn resolve_password(&self) -> Result<SecretString, ConfigError> {
        if let Some(ref env_name) = self.password_env {
            if let Ok(val) = std::env::var(env_name) {
                return Ok(SecretString::from(val));
            }
        }

        if let Some(ref pw) = self.password {
            return Ok(SecretString::from(pw.clone()));
        }

        Err(ConfigError::NoCredentials {
            camera: self.name.clone(),
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, reason: String| ConfigError::Validation {
            field: format!("cameras.{field}"),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name", format!("camera on {} has no name", self.host)));
        }
        if self.host.trim().is_empty() {
            return Err(invalid("host", format!("camera '{}' has no host", self.name)));
        }
        if self.username.trim().is_empty() {
            return Err(invalid(
                "username",
                format!("camera '{}' has no username", self.name),
            ));
        }
        if self.event_codes.iter().all(|code| code.trim().is_empty()) {
            return Err(invalid(
                "event_codes",
                format!("camera '{}' watches no event codes", self.name),
            ));
        }
        Ok(())
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "nvrlink", "nvrlink").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("nvrlink");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load config from `path` (or the platform default) plus `NVRLINK_` env vars.
///
/// Nested keys use a double underscore:
/// `NVRLINK_DEFAULTS__RECONNECT_DELAY_SECS=5`. An explicit `path` must
/// exist; a missing default file just yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) if !p.exists() => {
            return Err(ConfigError::NotFound {
                path: p.to_path_buf(),
            });
        }
        Some(p) => p.to_path_buf(),
        None => config_path(),
    };
    debug!(path = %path.display(), "loading configuration");

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("NVRLINK_").split("__"));

    Ok(figment.extract()?)
}

// ── Grouping ────────────────────────────────────────────────────────

struct HostGroup {
    host: String,
    username: String,
    password: SecretString,
    insecure: bool,
    codes: BTreeSet<String>,
    cameras: Vec<String>,
}

impl Config {
    /// Check every camera without building targets.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.groups().map(|_| ())
    }

    /// One [`ConnectionTarget`] per distinct host, in first-seen order.
    ///
    /// Cameras on the same host must agree on username, password and
    /// transport; their event codes are merged.
    pub fn targets(&self) -> Result<Vec<ConnectionTarget>, ConfigError> {
        self.groups()?
            .into_iter()
            .map(|group| {
                debug!(
                    host = %group.host,
                    cameras = ?group.cameras,
                    codes = ?group.codes,
                    "grouped cameras into one target"
                );
                ConnectionTarget::new(
                    group.host,
                    group.username,
                    group.password,
                    group.insecure,
                    group.codes,
                )
                .map_err(ConfigError::from)
            })
            .collect()
    }

    fn groups(&self) -> Result<Vec<HostGroup>, ConfigError> {
        if self.cameras.is_empty() {
            return Err(ConfigError::Validation {
                field: "cameras".into(),
                reason: "no cameras configured".into(),
            });
        }

        let mut groups: Vec<HostGroup> = Vec::new();
        for camera in &self.cameras {
            camera.validate()?;
            let host = camera.host.trim();
            let password = camera.resolve_password()?;
            let codes = camera
                .event_codes
                .iter()
                .map(String::as_str)
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .map(str::to_owned);

            match groups.iter_mut().find(|g| g.host == host) {
                Some(group) => {
                    let conflict = |field| ConfigError::Conflict {
                        host: host.to_owned(),
                        field,
                    };
                    if group.username != camera.username.trim() {
                        return Err(conflict("username"));
                    }
                    if group.password.expose_secret() != password.expose_secret() {
                        return Err(conflict("password"));
                    }
                    if group.insecure != camera.insecure {
                        return Err(conflict("insecure"));
                    }
                    group.codes.extend(codes);
                    group.cameras.push(camera.name.clone());
                }
                None => groups.push(HostGroup {
                    host: host.to_owned(),
                    username: camera.username.trim().to_owned(),
                    password,
                    insecure: camera.insecure,
                    codes: codes.collect(),
                    cameras: vec![camera.name.clone()],
                }),
            }
        }
        Ok(groups)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use figment::Jail;
    use pretty_assertions::assert_eq;

    use super::*;

    fn camera(name: &str, host: &str, index: i64, codes: &[&str]) -> Camera {
        Camera {
            name: name.into(),
            host: host.into(),
            index,
            username: "admin".into(),
            password: Some("pass".into()),
            password_env: None,
            insecure: false,
            event_codes: codes.iter().map(|c| (*c).to_string()).collect(),
        }
    }

    fn config(cameras: Vec<Camera>) -> Config {
        Config {
            defaults: Defaults::default(),
            cameras,
        }
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_cameras_and_fills_defaults() {
        let file = write_config(
            r#"
            [defaults]
            reconnect_delay_secs = 5

            [[cameras]]
            name = "driveway"
            host = "10.0.0.5"
            username = "admin"
            password = "pass"
            "#,
        );

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.defaults.reconnect_delay_secs, 5);
        assert_eq!(config.defaults.max_auth_attempts, 3);
        assert_eq!(config.defaults.motion_host, "localhost");

        let cam = &config.cameras[0];
        assert_eq!(cam.index, 0);
        assert_eq!(cam.event_codes, ["VideoMotion"]);
        assert!(!cam.insecure);

        let manager = config.defaults.manager_config();
        assert_eq!(manager.reconnect_delay, Duration::from_secs(5));
        assert_eq!(manager.transport.connect_timeout, Duration::from_secs(30));
        assert_eq!(manager.transport.max_idle_per_host, 1);
        assert_eq!(manager.transport.tls, TlsMode::LegacyAcceptInvalid);
    }

    #[test]
    fn verify_tls_selects_system_roots() {
        let file = write_config(
            r#"
            [defaults]
            verify_tls = true

            [[cameras]]
            name = "driveway"
            host = "10.0.0.5"
            username = "admin"
            password = "pass"
            "#,
        );

        let config = load_config(Some(file.path())).unwrap();
        assert!(config.defaults.verify_tls);
        assert_eq!(config.defaults.manager_config().transport.tls, TlsMode::System);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn malformed_toml_is_a_load_error() {
        let file = write_config("[[cameras]]\nname = ");
        assert!(matches!(
            load_config(Some(file.path())),
            Err(ConfigError::Figment(_))
        ));
    }

    #[test]
    fn env_overrides_file_and_supplies_password() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "nvrlink.toml",
                r#"
                [defaults]
                motion_port = 8080

                [[cameras]]
                name = "driveway"
                host = "10.0.0.5"
                username = "admin"
                password_env = "DRIVEWAY_PASSWORD"
                "#,
            )?;
            jail.set_env("NVRLINK_DEFAULTS__MOTION_PORT", "9090");
            jail.set_env("DRIVEWAY_PASSWORD", "from-env");

            let config = load_config(Some(Path::new("nvrlink.toml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.defaults.motion_port, 9090);

            let password = config.cameras[0]
                .resolve_password()
                .map_err(|e| e.to_string())?;
            assert_eq!(password.expose_secret(), "from-env");
            Ok(())
        });
    }

    #[test]
    fn cameras_on_one_host_become_one_target() {
        let config = config(vec![
            camera("front", "10.0.0.5", 0, &["VideoMotion"]),
            camera("back", "10.0.0.5", 1, &["VideoMotion", "CrossLineDetection"]),
            camera("garage", "10.0.0.6", 0, &["VideoMotion"]),
        ]);

        let targets = config.targets().unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].host(), "10.0.0.5");
        let codes: Vec<&str> = targets[0]
            .watched_event_codes()
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(codes, ["CrossLineDetection", "VideoMotion"]);
        assert_eq!(targets[1].host(), "10.0.0.6");
    }

    #[test]
    fn rejects_conflicting_credentials_on_one_host() {
        let mut other = camera("back", "10.0.0.5", 1, &["VideoMotion"]);
        other.password = Some("different".into());
        let config = config(vec![camera("front", "10.0.0.5", 0, &["VideoMotion"]), other]);

        let result = config.targets();
        let Err(ConfigError::Conflict { host, field }) = &result else {
            panic!("expected conflict, got {result:?}");
        };
        assert_eq!(host, "10.0.0.5");
        assert_eq!(*field, "password");
    }

    #[test]
    fn rejects_conflicting_transport_on_one_host() {
        let mut other = camera("back", "10.0.0.5", 1, &["VideoMotion"]);
        other.insecure = true;
        let config = config(vec![camera("front", "10.0.0.5", 0, &["VideoMotion"]), other]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Conflict { field: "insecure", .. })
        ));
    }

    #[test]
    fn rejects_incomplete_cameras() {
        let no_host = camera("front", " ", 0, &["VideoMotion"]);
        let mut no_user = camera("front", "10.0.0.5", 0, &["VideoMotion"]);
        no_user.username = String::new();
        let no_codes = camera("front", "10.0.0.5", 0, &[]);
        let mut no_password = camera("front", "10.0.0.5", 0, &["VideoMotion"]);
        no_password.password = None;

        for (cam, field) in [
            (no_host, Some("cameras.host")),
            (no_user, Some("cameras.username")),
            (no_codes, Some("cameras.event_codes")),
            (no_password, None),
        ] {
            match (config(vec![cam]).validate(), field) {
                (Err(ConfigError::Validation { field: got, .. }), Some(want)) => {
                    assert_eq!(got, want);
                }
                (Err(ConfigError::NoCredentials { camera }), None) => {
                    assert_eq!(camera, "front");
                }
                (other, want) => panic!("expected {want:?} failure, got {other:?}"),
            }
        }
    }

    #[test]
    fn empty_config_is_invalid() {
        assert!(matches!(
            Config::default().targets(),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn routes_alarm_to_matching_cameras() {
        let config = config(vec![
            camera("front", "10.0.0.5", 0, &["VideoMotion"]),
            camera("back", "10.0.0.5", 1, &["VideoMotion"]),
            camera("gate", "10.0.0.5", 0, &["CrossLineDetection"]),
        ]);

        let names: Vec<&str> = config
            .cameras
            .iter()
            .filter(|c| c.matches("10.0.0.5", 0, "VideoMotion"))
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, ["front"]);
        assert!(!config.cameras[0].matches("10.0.0.9", 0, "VideoMotion"));
    }
}
