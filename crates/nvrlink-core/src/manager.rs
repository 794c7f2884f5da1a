//! Connection lifecycle for one target.
//!
//! A [`ConnectionManager`] drives its target through
//!
//! ```text
//! Connecting ──► Streaming ──► ReconnectPending ──► Connecting ...
//!     │  ▲
//!     ▼  │ (401 + challenge, immediate)
//! Authenticating
//! ```
//!
//! forever, publishing alarms, errors, diagnostics and reconnect notices on
//! its [`EventChannel`]. Every failure waits the same fixed delay before the
//! next attempt. The only way out is the per-target cancellation token.
//!
//! # Example
//!
//! ```rust,ignore
//! use nvrlink_core::{ConnectionManager, ConnectionTarget, ManagerConfig, SignalKind};
//!
//! let target = ConnectionTarget::new("10.0.0.5", "admin", password, false, ["VideoMotion"])?;
//! let manager = ConnectionManager::new(target, ManagerConfig::default())?;
//! let mut alarms = manager.channel().subscribe_to(SignalKind::Alarm);
//! let handle = manager.spawn();
//!
//! while let Some(signal) = alarms.recv().await {
//!     println!("{:?}", signal.as_alarm());
//! }
//!
//! handle.shutdown();
//! ```

use std::sync::Arc;
use std::time::Duration;

use nvrlink_api::digest::{DigestChallenge, format_nonce_count};
use nvrlink_api::{
    AttachRequest, Error, EventRecord, EventSession, EventStream, Handshake, RecordError,
    SessionSignal, TransportConfig,
};
use strum::Display;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::channel::EventChannel;
use crate::error::CoreError;
use crate::event::{AlarmEvent, ErrorReport};
use crate::source::EventSource;
use crate::target::ConnectionTarget;

const DIGEST_METHOD: &str = "GET";

// ── ConnectionState ──────────────────────────────────────────────

/// Observable state of one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConnectionState {
    Connecting,
    Authenticating,
    Streaming,
    ReconnectPending,
    /// Cancelled; the manager task has exited.
    Stopped,
}

// ── ManagerConfig ────────────────────────────────────────────────

/// Tuning for one connection manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Fixed wait before every reconnect. No backoff, no jitter. Default: 10s.
    pub reconnect_delay: Duration,

    /// Consecutive Digest challenges accepted within one connection attempt
    /// before giving up until the next cycle. Default: 3.
    pub max_auth_attempts: u32,

    /// HTTP client settings for the target's session.
    pub transport: TransportConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(10),
            max_auth_attempts: 3,
            transport: TransportConfig::default(),
        }
    }
}

// ── State machine phases ─────────────────────────────────────────

enum Phase {
    /// Issue `request`; `nonce_count` challenges have been answered so far.
    Connecting {
        request: AttachRequest,
        nonce_count: u32,
    },
    Streaming(EventStream),
    ReconnectPending,
}

impl Phase {
    /// Start of a fresh connection cycle: no credentials, counter at zero.
    fn fresh() -> Self {
        Self::Connecting {
            request: AttachRequest::anonymous(),
            nonce_count: 0,
        }
    }
}

// ── ConnectionManager ────────────────────────────────────────────

/// Owns one target's stream, request counter and event channel.
pub struct ConnectionManager<S: EventSource = EventSession> {
    target: Arc<ConnectionTarget>,
    source: S,
    config: ManagerConfig,
    channel: EventChannel,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
}

impl ConnectionManager<EventSession> {
    /// Create a manager with an HTTP session built from `config.transport`.
    ///
    /// Does not connect; call [`spawn`](Self::spawn) or [`run`](Self::run).
    pub fn new(target: ConnectionTarget, config: ManagerConfig) -> Result<Self, CoreError> {
        let session = EventSession::new(target.attach_url()?, &config.transport)?;
        Ok(Self::with_source(target, session, config))
    }
}

impl<S: EventSource> ConnectionManager<S> {
    /// Create a manager around any [`EventSource`].
    pub fn with_source(target: ConnectionTarget, source: S, config: ManagerConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Self {
            target: Arc::new(target),
            source,
            config,
            channel: EventChannel::new(),
            state,
            cancel: CancellationToken::new(),
        }
    }

    /// Tie this manager's lifetime to a parent token.
    ///
    /// Cancelling `parent` stops [`run`](Self::run) as well as a spawned task.
    pub fn with_cancellation(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    /// Subscribe here before [`spawn`](Self::spawn) to see the first signals.
    pub fn channel(&self) -> &EventChannel {
        &self.channel
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Run the state machine on a background task.
    pub fn spawn(self) -> ManagerHandle {
        let host = self.target.host().to_string();
        let channel = self.channel.clone();
        let state = self.state.subscribe();
        let cancel = self.cancel.clone();
        let task = tokio::spawn(self.run());

        ManagerHandle {
            host,
            channel,
            state,
            cancel,
            task: Some(task),
        }
    }

    /// Run the state machine until cancelled.
    pub async fn run(self) {
        let host = self.target.host();
        info!(host, codes = ?self.target.watched_event_codes(), "starting event stream");

        let mut phase = Phase::fresh();
        loop {
            phase = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                next = self.step(phase) => next,
            };
        }

        self.state.send_replace(ConnectionState::Stopped);
        info!(host, "event stream stopped");
    }

    async fn step(&self, phase: Phase) -> Phase {
        match phase {
            Phase::Connecting {
                request,
                nonce_count,
            } => self.connect(request, nonce_count).await,
            Phase::Streaming(stream) => self.stream(stream).await,
            Phase::ReconnectPending => self.wait_reconnect().await,
        }
    }

    // ── Connecting / Authenticating ──────────────────────────────

    async fn connect(&self, request: AttachRequest, nonce_count: u32) -> Phase {
        let host = self.target.host();
        self.state.send_replace(ConnectionState::Connecting);
        debug!(host, nonce_count, "opening event stream");

        match self.source.open(&request).await {
            Ok(Handshake::Accepted(stream)) => {
                info!(host, "event stream connected");
                self.channel.debug(format!(
                    "Connected to {host}, watching {}",
                    self.watched_codes()
                ));
                self.state.send_replace(ConnectionState::Streaming);
                Phase::Streaming(stream)
            }
            Ok(Handshake::Challenged { www_authenticate }) => {
                self.state.send_replace(ConnectionState::Authenticating);
                self.answer_challenge(&www_authenticate, nonce_count)
                    .unwrap_or_else(|e| {
                        self.fail(format!("Authentication with {host} failed"), &e)
                    })
            }
            Err(e) => self.fail(format!("Connection to {host} failed"), &e),
        }
    }

    /// Solve the challenge and go straight back to `Connecting`.
    fn answer_challenge(&self, header: &str, nonce_count: u32) -> Result<Phase, Error> {
        if nonce_count >= self.config.max_auth_attempts {
            return Err(Error::Authentication {
                message: format!("credentials rejected after {nonce_count} digest attempts"),
            });
        }

        let challenge = DigestChallenge::parse(header)?;
        let nonce_count = nonce_count + 1;
        let authorization = challenge.authorize(
            self.target.credentials(),
            DIGEST_METHOD,
            self.source.request_uri(),
            nonce_count,
        );

        debug!(
            host = self.target.host(),
            realm = %challenge.realm,
            nc = %format_nonce_count(nonce_count),
            "answering digest challenge"
        );
        self.channel.debug(format!(
            "Authenticating with {} (realm {:?}, nc {})",
            self.target.host(),
            challenge.realm,
            format_nonce_count(nonce_count)
        ));

        Ok(Phase::Connecting {
            request: AttachRequest::authorized(authorization),
            nonce_count,
        })
    }

    // ── Streaming ────────────────────────────────────────────────

    async fn stream(&self, mut stream: EventStream) -> Phase {
        let host = self.target.host();
        loop {
            match stream.next_signal().await {
                SessionSignal::Data { bytes, record } => self.handle_chunk(bytes, record),
                SessionSignal::Error(e) => {
                    return self.fail(format!("Event stream from {host} failed"), &e);
                }
                SessionSignal::End => {
                    info!(host, "event stream closed by server");
                    self.channel.debug(format!("Event stream from {host} ended"));
                    return Phase::ReconnectPending;
                }
            }
        }
    }

    fn handle_chunk(&self, bytes: usize, record: Result<EventRecord, RecordError>) {
        let host = self.target.host();
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                debug!(host, error = %e, "ignoring malformed event record");
                self.channel
                    .debug(format!("Ignoring malformed event record from {host}: {e}"));
                return;
            }
        };
        if let Some(alarm) = AlarmEvent::from_record(record, host) {
            debug!(host, alarm = %alarm, "alarm received");
            self.channel.alarm(alarm);
        } else {
            trace!(host, bytes, "chunk without event record");
        }
    }

    // ── ReconnectPending ─────────────────────────────────────────

    async fn wait_reconnect(&self) -> Phase {
        let host = self.target.host();
        let delay = self.config.reconnect_delay;
        self.state.send_replace(ConnectionState::ReconnectPending);

        info!(host, delay_ms = delay.as_millis(), "waiting before reconnect");
        self.channel
            .reconnecting(format!("Reconnecting to {host} in {delay:?}"));

        tokio::time::sleep(delay).await;
        Phase::fresh()
    }

    /// Report `err` and schedule the delayed reconnect.
    fn fail(&self, summary: String, err: &Error) -> Phase {
        warn!(host = self.target.host(), error = %err, "{summary}");
        self.channel.error(ErrorReport::from_error(summary, err));
        Phase::ReconnectPending
    }

    fn watched_codes(&self) -> String {
        self.target
            .watched_event_codes()
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

// ── ManagerHandle ────────────────────────────────────────────────

/// Handle to a spawned connection manager.
#[derive(Debug)]
pub struct ManagerHandle {
    host: String,
    channel: EventChannel,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ManagerHandle {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn channel(&self) -> &EventChannel {
        &self.channel
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Signal the manager to stop. Drops any open stream.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for the manager task to exit.
    pub async fn join(mut self) -> Result<(), CoreError> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        task.await
            .map_err(|e| CoreError::Internal(format!("connection manager task failed: {e}")))
    }
}

// ── Tests ────────────────────────────────────────────────────────────
