//! HTTP Digest challenge solving (`qop=auth`, `algorithm=MD5`).
//!
//! The server's `WWW-Authenticate` header is tokenized into `key=value`
//! pairs and looked up by key, so field order, quoting and padding around
//! separators do not matter. The solver itself is pure apart from the
//! random client nonce.
//!
//! ```
//! use nvrlink_api::digest::{DigestChallenge, DigestCredentials};
//!
//! let challenge = DigestChallenge::parse(
//!     r#"Digest realm="Login to X",qop="auth",nonce="abc123",opaque="xyz""#,
//! )?;
//! let creds = DigestCredentials::new("admin", "pass");
//! let header = challenge.authorize(&creds, "GET", "/cgi-bin/eventManager.cgi", 1);
//! assert!(header.contains(r#"nc="00000001""#));
//! # Ok::<(), nvrlink_api::Error>(())
//! ```

use std::fmt::Write;

use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

/// Bytes of entropy in a client nonce (hex-encoded to twice this length).
const CNONCE_BYTES: usize = 24;

const QOP_AUTH: &str = "auth";
const ALGORITHM_MD5: &str = "MD5";

// ── Credentials ──────────────────────────────────────────────────────

/// Username/password pair used to answer a challenge.
#[derive(Debug, Clone)]
pub struct DigestCredentials {
    pub username: String,
    pub password: SecretString,
}

impl DigestCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

// ── Challenge ────────────────────────────────────────────────────────

/// A parsed `WWW-Authenticate: Digest ...` challenge.
///
/// Transient: solved once per authentication retry, never cached across
/// reconnect cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub qop: Option<String>,
    pub opaque: Option<String>,
}

impl DigestChallenge {
    /// Parse a raw `WWW-Authenticate` header value.
    ///
    /// Accepts quoted and unquoted values and arbitrary whitespace around
    /// `,` and `=`. Fails when `realm` or `nonce` is missing, or when the
    /// server offers a `qop` list without `auth`.
    pub fn parse(header: &str) -> Result<Self, Error> {
        let trimmed = header.trim();
        let params = match trimmed.split_once(char::is_whitespace) {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("digest") => rest,
            Some((scheme, _)) if !scheme.contains('=') => {
                return Err(Error::DigestChallenge {
                    message: format!("unsupported auth scheme `{scheme}`"),
                });
            }
            // No scheme token: treat the whole value as the parameter list.
            _ => trimmed,
        };

        let mut realm = None;
        let mut nonce = None;
        let mut qop = None;
        let mut opaque = None;

        for (key, value) in tokenize(params) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "nonce" => nonce = Some(value),
                "qop" => qop = Some(value),
                "opaque" => opaque = Some(value),
                _ => {}
            }
        }

        let realm = realm.ok_or_else(|| Error::DigestChallenge {
            message: "challenge has no realm".into(),
        })?;
        let nonce = nonce
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::DigestChallenge {
                message: "challenge has no nonce".into(),
            })?;

        if let Some(ref offered) = qop {
            if !offered.split(',').any(|q| q.trim() == QOP_AUTH) {
                return Err(Error::DigestChallenge {
                    message: format!("server does not offer qop=auth (offered: {offered})"),
                });
            }
        }

        Ok(Self {
            realm,
            nonce,
            qop,
            opaque,
        })
    }

    /// Compute the `Authorization` header value with a fresh client nonce.
    ///
    /// `nonce_count` is rendered as the 8-digit zero-padded decimal `nc`.
    pub fn authorize(
        &self,
        credentials: &DigestCredentials,
        method: &str,
        uri: &str,
        nonce_count: u32,
    ) -> String {
        self.authorize_with_cnonce(credentials, method, uri, nonce_count, &generate_cnonce())
    }

    /// Like [`authorize`](Self::authorize) with a caller-supplied client nonce.
    pub fn authorize_with_cnonce(
        &self,
        credentials: &DigestCredentials,
        method: &str,
        uri: &str,
        nonce_count: u32,
        cnonce: &str,
    ) -> String {
        let nc = format_nonce_count(nonce_count);
        let response = self.response(credentials, method, uri, &nc, cnonce);

        let mut header = format!(
            "Digest username=\"{username}\", realm=\"{realm}\", nonce=\"{nonce}\", \
             uri=\"{uri}\", qop=\"{QOP_AUTH}\", algorithm=\"{ALGORITHM_MD5}\", \
             response=\"{response}\", nc=\"{nc}\", cnonce=\"{cnonce}\"",
            username = credentials.username,
            realm = self.realm,
            nonce = self.nonce,
        );
        if let Some(ref opaque) = self.opaque {
            let _ = write!(header, ", opaque=\"{opaque}\"");
        }
        header
    }

    /// `MD5(HA1:nonce:nc:cnonce:auth:HA2)` as lowercase hex.
    pub fn response(
        &self,
        credentials: &DigestCredentials,
        method: &str,
        uri: &str,
        nc: &str,
        cnonce: &str,
    ) -> String {
        let ha1 = md5_hex(&format!(
            "{}:{}:{}",
            credentials.username,
            self.realm,
            credentials.password.expose_secret()
        ));
        let ha2 = md5_hex(&format!("{method}:{uri}"));
        md5_hex(&format!("{ha1}:{}:{nc}:{cnonce}:{QOP_AUTH}:{ha2}", self.nonce))
    }
}

/// Zero-padded 8-digit decimal rendering of the nonce count.
pub fn format_nonce_count(nonce_count: u32) -> String {
    format!("{nonce_count:08}")
}

/// Fresh hex client nonce from the OS CSPRNG.
pub fn generate_cnonce() -> String {
    let mut bytes = [0u8; CNONCE_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
        .iter()
        .fold(String::with_capacity(CNONCE_BYTES * 2), |mut hex, b| {
            let _ = write!(hex, "{b:02x}");
            hex
        })
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input))
}

/// Split a parameter list on commas outside quotes into trimmed,
/// unquoted `(key, value)` pairs. Tokens without `=` are dropped.
fn tokenize(params: &str) -> Vec<(String, String)> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in params.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ',' if !in_quotes => tokens.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    tokens.push(current);

    tokens
        .iter()
        .filter_map(|token| {
            let (key, value) = token.split_once('=')?;
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            Some((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"Digest realm="Login to X",qop="auth",nonce="abc123",opaque="xyz""#;

    fn field<'a>(header: &'a str, key: &str) -> Option<&'a str> {
        header
            .trim_start_matches("Digest ")
            .split(", ")
            .find_map(|kv| kv.strip_prefix(&format!("{key}=")))
            .map(|v| v.trim_matches('"'))
    }

    #[test]
    fn parses_quoted_challenge() {
        let challenge = DigestChallenge::parse(SAMPLE).unwrap();
        assert_eq!(challenge.realm, "Login to X");
        assert_eq!(challenge.nonce, "abc123");
        assert_eq!(challenge.qop.as_deref(), Some("auth"));
        assert_eq!(challenge.opaque.as_deref(), Some("xyz"));
    }

    #[test]
    fn tolerates_unquoted_values_padding_and_reordering() {
        let challenge =
            DigestChallenge::parse("Digest nonce=abc123 ,  qop=auth , realm = \"Login to X\"")
                .unwrap();
        assert_eq!(challenge.realm, "Login to X");
        assert_eq!(challenge.nonce, "abc123");
        assert_eq!(challenge.opaque, None);
    }

    #[test]
    fn keeps_commas_inside_quotes() {
        let challenge =
            DigestChallenge::parse(r#"Digest realm="a, b", qop="auth,auth-int", nonce="n""#)
                .unwrap();
        assert_eq!(challenge.realm, "a, b");
        assert_eq!(challenge.qop.as_deref(), Some("auth,auth-int"));
    }

    #[test]
    fn rejects_missing_nonce() {
        let err = DigestChallenge::parse(r#"Digest realm="Login to X", qop="auth""#).unwrap_err();
        assert!(matches!(err, Error::DigestChallenge { .. }), "got {err:?}");
    }

    #[test]
    fn rejects_missing_realm() {
        assert!(DigestChallenge::parse(r#"Digest nonce="abc""#).is_err());
    }

    #[test]
    fn rejects_basic_scheme() {
        assert!(DigestChallenge::parse(r#"Basic realm="cam""#).is_err());
    }

    #[test]
    fn rejects_qop_without_auth() {
        assert!(DigestChallenge::parse(r#"Digest realm="r", nonce="n", qop="auth-int""#).is_err());
    }

    #[test]
    fn matches_rfc2617_reference_response() {
        let challenge = DigestChallenge {
            realm: "testrealm@host.com".into(),
            nonce: "dcd98b7102dd2f0e8b11d0f600bfb0c093".into(),
            qop: Some("auth".into()),
            opaque: Some("5ccc069c403ebaf9f0171e9517f40e41".into()),
        };
        let creds = DigestCredentials::new("Mufasa", "Circle Of Life");
        let header =
            challenge.authorize_with_cnonce(&creds, "GET", "/dir/index.html", 1, "0a4f113b");

        assert_eq!(
            field(&header, "response"),
            Some("6629fae49393a05397450978507c4ef1")
        );
    }

    #[test]
    fn matches_independent_md5_computation() {
        let challenge = DigestChallenge::parse(SAMPLE).unwrap();
        let creds = DigestCredentials::new("admin", "pass");
        let uri = "/cgi-bin/eventManager.cgi?action=attach&codes=[VideoMotion]";
        let cnonce = "00112233445566778899aabbccddeeff0011223344556677";

        let ha1 = format!("{:x}", md5::compute("admin:Login to X:pass"));
        let ha2 = format!("{:x}", md5::compute(format!("GET:{uri}")));
        let expected = format!(
            "{:x}",
            md5::compute(format!("{ha1}:abc123:00000007:{cnonce}:auth:{ha2}"))
        );

        let header = challenge.authorize_with_cnonce(&creds, "GET", uri, 7, cnonce);
        assert_eq!(field(&header, "response"), Some(expected.as_str()));
        assert_eq!(field(&header, "nc"), Some("00000007"));
        assert_eq!(field(&header, "cnonce"), Some(cnonce));
    }

    #[test]
    fn header_embeds_every_field() {
        let challenge = DigestChallenge::parse(SAMPLE).unwrap();
        let creds = DigestCredentials::new("admin", "pass");
        let header = challenge.authorize(&creds, "GET", "/cgi-bin/x", 1);

        assert!(header.starts_with("Digest "));
        assert_eq!(field(&header, "username"), Some("admin"));
        assert_eq!(field(&header, "realm"), Some("Login to X"));
        assert_eq!(field(&header, "nonce"), Some("abc123"));
        assert_eq!(field(&header, "uri"), Some("/cgi-bin/x"));
        assert_eq!(field(&header, "qop"), Some("auth"));
        assert_eq!(field(&header, "algorithm"), Some("MD5"));
        assert_eq!(field(&header, "nc"), Some("00000001"));
        assert_eq!(field(&header, "opaque"), Some("xyz"));
        assert!(header.contains(r#"nc="00000001""#));
    }

    #[test]
    fn nonce_count_is_zero_padded_decimal() {
        assert_eq!(format_nonce_count(0), "00000000");
        assert_eq!(format_nonce_count(1), "00000001");
        assert_eq!(format_nonce_count(12), "00000012");
        assert_eq!(format_nonce_count(99_999_999), "99999999");
    }

    #[test]
    fn cnonce_is_fresh_48_hex_chars() {
        let a = generate_cnonce();
        let b = generate_cnonce();
        assert_eq!(a.len(), 48);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
