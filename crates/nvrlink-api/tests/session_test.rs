#![allow(clippy::unwrap_used)]
// Integration tests for `EventSession` using wiremock.

use url::Url;
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nvrlink_api::digest::{DigestChallenge, DigestCredentials};
use nvrlink_api::session::attach_url;
use nvrlink_api::{AttachRequest, Error, EventSession, Handshake, SessionSignal};

const CHALLENGE: &str = r#"Digest realm="Login to X",qop="auth",nonce="abc123",opaque="xyz""#;

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, EventSession) {
    let server = MockServer::start().await;
    let host = server.address().to_string();
    let url = attach_url(&host, true, ["VideoMotion"]).unwrap();
    let session = EventSession::with_client(reqwest::Client::new(), url);
    (server, session)
}

fn attach() -> wiremock::MockBuilder {
    Mock::given(method("GET"))
        .and(path("/cgi-bin/eventManager.cgi"))
        .and(query_param("action", "attach"))
        .and(query_param("codes", "[VideoMotion]"))
}

// ── Handshake tests ─────────────────────────────────────────────────

#[tokio::test]
async fn test_accepted_stream_yields_record_then_end() {
    let (server, session) = setup().await;

    attach()
        .and(header("accept", "multipart/x-mixed-replace"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("--myboundary\r\nContent-Type: text/plain\r\n\r\nCode=VideoMotion;action=Start;index=0\r\n"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let handshake = session.open(&AttachRequest::anonymous()).await.unwrap();
    let mut stream = match handshake {
        Handshake::Accepted(stream) => stream,
        other => panic!("expected accepted stream, got {other:?}"),
    };

    let mut records = Vec::new();
    loop {
        match stream.next_signal().await {
            SessionSignal::Data { record, .. } => records.push(record.unwrap()),
            SessionSignal::End => break,
            SessionSignal::Error(e) => panic!("unexpected stream error: {e}"),
        }
    }

    let last = records.iter().rev().find(|r| !r.is_sentinel()).unwrap();
    assert_eq!(last.event_type, "VideoMotion");
    assert_eq!(last.action, "Start");
    assert_eq!(last.index, 0);
}

#[tokio::test]
async fn test_401_with_challenge_is_handed_back() {
    let (server, session) = setup().await;

    attach()
        .respond_with(ResponseTemplate::new(401).insert_header("WWW-Authenticate", CHALLENGE))
        .mount(&server)
        .await;

    let handshake = session.open(&AttachRequest::anonymous()).await.unwrap();
    match handshake {
        Handshake::Challenged { www_authenticate } => assert_eq!(www_authenticate, CHALLENGE),
        other => panic!("expected challenge, got {other:?}"),
    }
}

#[tokio::test]
async fn test_401_without_challenge_is_auth_error() {
    let (server, session) = setup().await;

    attach()
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = session.open(&AttachRequest::anonymous()).await;
    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_server_error_is_http_status() {
    let (server, session) = setup().await;

    attach()
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let result = session.open(&AttachRequest::anonymous()).await;
    assert!(
        matches!(result, Err(Error::HttpStatus { status: 503, .. })),
        "expected HttpStatus 503, got: {result:?}"
    );
}

#[tokio::test]
async fn test_authorization_header_is_sent() {
    let (server, session) = setup().await;

    let challenge = DigestChallenge::parse(CHALLENGE).unwrap();
    let creds = DigestCredentials::new("admin", "pass");
    let authorization = challenge.authorize(&creds, "GET", session.request_uri(), 1);

    attach()
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .expect(1)
        .mount(&server)
        .await;

    let handshake = session
        .open(&AttachRequest::authorized(authorization.clone()))
        .await
        .unwrap();
    assert!(matches!(handshake, Handshake::Accepted(_)));

    let requests = server.received_requests().await.unwrap();
    let sent = requests[0].headers.get("authorization").unwrap();
    assert_eq!(sent.to_str().unwrap(), authorization);
}

// ── Transport failures ──────────────────────────────────────────────

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    // Bind and immediately drop a listener to get a port nobody serves.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let url = Url::parse(&format!(
        "http://127.0.0.1:{port}/cgi-bin/eventManager.cgi?action=attach&codes=[VideoMotion]"
    ))
    .unwrap();
    let session = EventSession::with_client(reqwest::Client::new(), url);

    let result = session.open(&AttachRequest::anonymous()).await;
    match result {
        Err(e @ Error::Transport(_)) => assert!(e.is_transient(), "{e}"),
        other => panic!("expected transport error, got {other:?}"),
    }
}
