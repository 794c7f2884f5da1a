//! One streaming `eventManager.cgi` request.
//!
//! An [`EventSession`] owns the per-target HTTP client and the attach URL.
//! Each call to [`open`](EventSession::open) issues one GET carrying the
//! immutable [`AttachRequest`] for that attempt and either hands back the
//! unbounded body as an [`EventStream`] or reports the server's Digest
//! challenge. Driving retries and reconnects is the caller's job.

use std::fmt;

use bytes::Bytes;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE};
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, RecordError};
use crate::record::{self, EventRecord};
use crate::transport::TransportConfig;

/// Path of the event subscription endpoint.
pub const EVENT_MANAGER_PATH: &str = "/cgi-bin/eventManager.cgi";

const MULTIPART_ACCEPT: &str = "multipart/x-mixed-replace";

/// Query path that attaches to the given event codes, e.g.
/// `/cgi-bin/eventManager.cgi?action=attach&codes=[VideoMotion,AlarmLocal]`.
pub fn events_watch_path<'a>(codes: impl IntoIterator<Item = &'a str>) -> String {
    let codes: Vec<&str> = codes.into_iter().collect();
    format!("{EVENT_MANAGER_PATH}?action=attach&codes=[{}]", codes.join(","))
}

/// Full attach URL for `host` (which may carry a port).
///
/// `insecure` selects plaintext `http`; otherwise `https`.
pub fn attach_url<'a>(
    host: &str,
    insecure: bool,
    codes: impl IntoIterator<Item = &'a str>,
) -> Result<Url, Error> {
    let scheme = if insecure { "http" } else { "https" };
    Ok(Url::parse(&format!("{scheme}://{host}{}", events_watch_path(codes)))?)
}

// ── Request / response types ─────────────────────────────────────────

/// Per-attempt request configuration.
///
/// Rebuilt for every attempt; the authorization header is carried
/// explicitly instead of living in shared mutable state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachRequest {
    pub authorization: Option<String>,
}

impl AttachRequest {
    /// First attempt of a connection cycle: no credentials yet.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authorized(header: impl Into<String>) -> Self {
        Self {
            authorization: Some(header.into()),
        }
    }
}

/// Outcome of one attach request.
pub enum Handshake {
    /// 2xx: the body is streaming.
    Accepted(EventStream),
    /// 401 carrying a challenge to solve before retrying.
    Challenged { www_authenticate: String },
}

impl fmt::Debug for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted(_) => f.write_str("Accepted(..)"),
            Self::Challenged { www_authenticate } => f
                .debug_struct("Challenged")
                .field("www_authenticate", www_authenticate)
                .finish(),
        }
    }
}

/// Lifecycle signal raised while consuming the body.
#[derive(Debug)]
pub enum SessionSignal {
    /// A chunk arrived; `record` is what the parser made of it.
    Data {
        bytes: usize,
        record: Result<EventRecord, RecordError>,
    },
    /// The transport failed mid-stream.
    Error(Error),
    /// The server closed the body normally.
    End,
}

// ── EventStream ──────────────────────────────────────────────────────

/// The unbounded response body of an accepted attach request.
pub struct EventStream {
    inner: BoxStream<'static, Result<Bytes, Error>>,
}

impl EventStream {
    /// Wrap any chunk stream (used for the HTTP body and for scripted sources).
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, Error>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
        }
    }

    fn from_response(resp: reqwest::Response) -> Self {
        Self::from_stream(
            resp.bytes_stream()
                .map(|chunk| chunk.map_err(|e| Error::StreamInterrupted(e.to_string()))),
        )
    }

    /// Wait for the next chunk and feed it to the record parser.
    ///
    /// Cancel-safe: dropping the future loses no data.
    pub async fn next_signal(&mut self) -> SessionSignal {
        match self.inner.next().await {
            Some(Ok(chunk)) => {
                trace!(bytes = chunk.len(), "event chunk received");
                SessionSignal::Data {
                    bytes: chunk.len(),
                    record: record::try_parse_chunk(&chunk),
                }
            }
            Some(Err(e)) => SessionSignal::Error(e),
            None => SessionSignal::End,
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}

// ── EventSession ─────────────────────────────────────────────────────

/// HTTP client bound to one target's attach URL.
#[derive(Debug, Clone)]
pub struct EventSession {
    http: reqwest::Client,
    url: Url,
    request_uri: String,
}

impl EventSession {
    /// Create a session with a client built from `transport`.
    pub fn new(url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, url))
    }

    /// Create a session around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, url: Url) -> Self {
        let request_uri = match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        };
        Self {
            http,
            url,
            request_uri,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Path and query as sent on the request line; the Digest `uri`.
    pub fn request_uri(&self) -> &str {
        &self.request_uri
    }

    /// Issue one attach request.
    ///
    /// A 401 with a `WWW-Authenticate` header is returned as
    /// [`Handshake::Challenged`]; a 401 without one is an
    /// [`Error::Authentication`]. Every other non-2xx status is an
    /// [`Error::HttpStatus`].
    pub async fn open(&self, request: &AttachRequest) -> Result<Handshake, Error> {
        debug!(
            url = %self.url,
            authorized = request.authorization.is_some(),
            "GET event stream"
        );

        let mut req = self
            .http
            .get(self.url.clone())
            .header(ACCEPT, MULTIPART_ACCEPT);
        if let Some(ref authorization) = request.authorization {
            req = req.header(AUTHORIZATION, authorization.as_str());
        }

        let resp = req.send().await.map_err(Error::Transport)?;
        let status = resp.status();

        if status == StatusCode::UNAUTHORIZED {
            return match digest_challenge(resp.headers()) {
                Some(www_authenticate) => Ok(Handshake::Challenged { www_authenticate }),
                None => Err(Error::Authentication {
                    message: "401 without a WWW-Authenticate challenge".into(),
                }),
            };
        }

        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: self.url.to_string(),
            });
        }

        Ok(Handshake::Accepted(EventStream::from_response(resp)))
    }
}

/// Prefer a `Digest` challenge when the server offers several schemes.
fn digest_challenge(headers: &reqwest::header::HeaderMap) -> Option<String> {
    let offered: Vec<&str> = headers
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    offered
        .iter()
        .find(|v| {
            v.trim_start()
                .get(..6)
                .is_some_and(|scheme| scheme.eq_ignore_ascii_case("digest"))
        })
        .or_else(|| offered.first())
        .map(|v| (*v).to_string())
}
