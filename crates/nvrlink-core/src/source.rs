// ── EventSource ──
//
// The seam between the connection state machine and the HTTP session.

use std::future::Future;

use nvrlink_api::{AttachRequest, Error, EventSession, Handshake};

/// Something a [`ConnectionManager`](crate::ConnectionManager) can attach to.
///
/// Implemented by [`EventSession`]; tests drive the state machine with
/// scripted sources instead.
pub trait EventSource: Send + Sync + 'static {
    /// Digest `uri` for this source's requests.
    fn request_uri(&self) -> &str;

    /// Issue one attach request.
    fn open(
        &self,
        request: &AttachRequest,
    ) -> impl Future<Output = Result<Handshake, Error>> + Send;
}

impl EventSource for EventSession {
    fn request_uri(&self) -> &str {
        EventSession::request_uri(self)
    }

    fn open(
        &self,
        request: &AttachRequest,
    ) -> impl Future<Output = Result<Handshake, Error>> + Send {
        EventSession::open(self, request)
    }
}
