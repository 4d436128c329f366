//! Existence oracle: one remote check per numeric account ID.
//!
//! [`HttpOracle`] speaks the REST contract `GET {base}/user/{id}`:
//!
//! | Status      | Meaning                                    |
//! |-------------|--------------------------------------------|
//! | 200         | exists (body carries account metadata)     |
//! | 404         | does not exist                             |
//! | 403 / 429   | rate limited, wait `Retry-After` seconds   |
//! | anything else, or a network error | transient failure    |
//!
//! Responses are never cached: each ID is checked a handful of times per
//! search at most, and a cache would hide rate-limit windows.

use std::fmt;
use std::time::Duration;

use frontierwatch_core::{FrontierError, FrontierResult};
use reqwest::StatusCode;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, RETRY_AFTER, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Media type requested from the oracle.
pub const ACCEPT_MEDIA_TYPE: &str = "application/vnd.github.v3+json";

/// Default oracle base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// Account metadata returned alongside a positive existence check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMetadata {
    #[serde(rename = "id")]
    pub account_id: u64,
    #[serde(rename = "login")]
    pub handle: String,
    /// `User` or `Organization`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Definitive answer for one ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Exists(Option<AccountMetadata>),
    NotExists,
}

/// A response that is neither "exists" nor "does not exist".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransientFailure {
    /// The oracle asked us to back off.
    #[error("rate limited; retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Network error or unexpected status.
    #[error("oracle unavailable: {detail}")]
    Unavailable { detail: String },
}

impl TransientFailure {
    /// Server-supplied wait, if any. Callers apply their own backoff otherwise.
    #[must_use]
    pub const fn wait_hint(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            Self::Unavailable { .. } => None,
        }
    }
}

/// Remote existence check for a single account ID.
pub trait ExistenceOracle: Send + Sync {
    /// Issue exactly one check for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`TransientFailure`] for rate limiting, network errors and any
    /// response that is not a definitive answer. A rate-limit response must
    /// never be reported as [`Outcome::NotExists`].
    fn check(&self, id: u64) -> Result<Outcome, TransientFailure>;
}

/// Connection settings for [`HttpOracle`].
#[derive(Clone)]
pub struct OracleConfig {
    pub base_url: String,
    pub user_agent: String,
    pub request_timeout: Duration,
    /// Wait applied when a rate-limit response has no usable `Retry-After`.
    pub rate_limit_wait: Duration,
    /// Sent as `Authorization: token <credential>` when present.
    pub credential: Option<String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            user_agent: format!("frontierwatch/{}", env!("CARGO_PKG_VERSION")),
            request_timeout: Duration::from_secs(8),
            rate_limit_wait: Duration::from_secs(60),
            credential: None,
        }
    }
}

impl fmt::Debug for OracleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleConfig")
            .field("base_url", &self.base_url)
            .field("user_agent", &self.user_agent)
            .field("request_timeout", &self.request_timeout)
            .field("rate_limit_wait", &self.rate_limit_wait)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Blocking HTTP implementation of [`ExistenceOracle`].
#[derive(Debug, Clone)]
pub struct HttpOracle {
    client: HttpClient,
    base_url: String,
    user_agent: String,
    rate_limit_wait: Duration,
    credential: Option<String>,
}

impl HttpOracle {
    /// Build the HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`FrontierError::InvalidConfig`] for an unparseable base URL
    /// and [`FrontierError::SubsystemError`] if the TLS/HTTP client cannot be
    /// constructed.
    pub fn new(config: OracleConfig) -> FrontierResult<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_owned();
        let parsed = reqwest::Url::parse(&base_url).map_err(|err| {
            FrontierError::config("oracle.base_url", &config.base_url, err.to_string())
        })?;

        let mut builder = HttpClient::builder().timeout(config.request_timeout);
        if is_loopback(&parsed) {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|err| FrontierError::SubsystemError {
                subsystem: "oracle",
                source: Box::new(err),
            })?;

        Ok(Self {
            client,
            base_url,
            user_agent: config.user_agent,
            rate_limit_wait: config.rate_limit_wait,
            credential: config.credential.filter(|token| !token.trim().is_empty()),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub const fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    fn user_url(&self, id: u64) -> String {
        format!("{}/user/{id}", self.base_url)
    }
}

impl ExistenceOracle for HttpOracle {
    fn check(&self, id: u64) -> Result<Outcome, TransientFailure> {
        let mut request = self
            .client
            .get(self.user_url(id))
            .header(ACCEPT, ACCEPT_MEDIA_TYPE)
            .header(USER_AGENT, &self.user_agent);
        if let Some(token) = &self.credential {
            request = request.header(AUTHORIZATION, format!("token {token}"));
        }

        let response = request.send().map_err(|err| TransientFailure::Unavailable {
            detail: err.to_string(),
        })?;

        match response.status() {
            StatusCode::OK => {
                let metadata = response
                    .bytes()
                    .ok()
                    .and_then(|body| serde_json::from_slice::<AccountMetadata>(&body).ok());
                if metadata.is_none() {
                    debug!(id, "exists but response body carried no usable metadata");
                }
                Ok(Outcome::Exists(metadata))
            }
            StatusCode::NOT_FOUND => Ok(Outcome::NotExists),
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                Err(TransientFailure::RateLimited {
                    retry_after: parse_retry_after(response.headers())
                        .unwrap_or(self.rate_limit_wait),
                })
            }
            other => Err(TransientFailure::Unavailable {
                detail: format!("unexpected status {other}"),
            }),
        }
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn is_loopback(url: &reqwest::Url) -> bool {
    url.host_str().is_some_and(|host| {
        host.eq_ignore_ascii_case("localhost")
            || host
                .trim_matches(['[', ']'])
                .parse::<std::net::IpAddr>()
                .is_ok_and(|addr| addr.is_loopback())
    })
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{Read, Write};
    use std::net::{Shutdown, TcpListener, TcpStream};
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[derive(Debug, Clone)]
    struct TestHttpResponse {
        status: u16,
        reason: &'static str,
        headers: Vec<(&'static str, String)>,
        body: Vec<u8>,
    }

    impl TestHttpResponse {
        fn new(status: u16, reason: &'static str, body: &str) -> Self {
            Self {
                status,
                reason,
                headers: Vec::new(),
                body: body.as_bytes().to_vec(),
            }
        }

        fn with_header(mut self, name: &'static str, value: &str) -> Self {
            self.headers.push((name, value.to_owned()));
            self
        }
    }

    /// Serves `responses` in order, one per connection, and records each
    /// request head.
    fn spawn_test_http_server(
        responses: Vec<TestHttpResponse>,
    ) -> (String, Arc<Mutex<Vec<String>>>, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let queue = Arc::new(Mutex::new(VecDeque::from(responses)));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let requests_for_thread = Arc::clone(&requests);

        let handle = thread::spawn(move || {
            while let Ok((mut stream, _)) = listener.accept() {
                let Ok(head) = read_http_headers(&mut stream) else {
                    break;
                };
                requests_for_thread.lock().unwrap().push(head);

                let response = queue.lock().unwrap().pop_front();
                let Some(response) = response else {
                    break;
                };
                if write_http_response(&mut stream, &response).is_err() {
                    break;
                }
                let _ = stream.shutdown(Shutdown::Both);
                if queue.lock().unwrap().is_empty() {
                    break;
                }
            }
        });

        (format!("http://{addr}"), requests, handle)
    }

    fn read_http_headers(stream: &mut TcpStream) -> std::io::Result<String> {
        let mut buf = [0_u8; 1024];
        let mut request = Vec::new();
        loop {
            let read = stream.read(&mut buf)?;
            if read == 0 {
                break;
            }
            request.extend_from_slice(&buf[..read]);
            if request.windows(4).any(|window| window == b"\r\n\r\n") {
                break;
            }
            if request.len() > 64 * 1024 {
                break;
            }
        }
        Ok(String::from_utf8_lossy(&request).into_owned())
    }

    fn write_http_response(
        stream: &mut TcpStream,
        response: &TestHttpResponse,
    ) -> std::io::Result<()> {
        write!(stream, "HTTP/1.1 {} {}\r\n", response.status, response.reason)?;
        for (name, value) in &response.headers {
            write!(stream, "{name}: {value}\r\n")?;
        }
        write!(
            stream,
            "Content-Length: {}\r\nConnection: close\r\n\r\n",
            response.body.len()
        )?;
        stream.write_all(&response.body)?;
        stream.flush()?;
        Ok(())
    }

    fn oracle_for(base_url: String, credential: Option<&str>) -> HttpOracle {
        HttpOracle::new(OracleConfig {
            base_url,
            request_timeout: Duration::from_secs(5),
            credential: credential.map(str::to_owned),
            ..OracleConfig::default()
        })
        .unwrap()
    }

    const ACCOUNT_BODY: &str = r#"{"id":262206000,"login":"octo-frontier","type":"User","created_at":"2026-03-01T12:00:00Z","site_admin":false}"#;

    #[test]
    fn ok_response_is_exists_with_metadata() {
        let (base, requests, handle) =
            spawn_test_http_server(vec![TestHttpResponse::new(200, "OK", ACCOUNT_BODY)]);
        let oracle = oracle_for(base, None);

        let outcome = oracle.check(262_206_000).unwrap();
        handle.join().unwrap();

        let Outcome::Exists(Some(meta)) = outcome else {
            panic!("expected exists with metadata, got {outcome:?}");
        };
        assert_eq!(meta.account_id, 262_206_000);
        assert_eq!(meta.handle, "octo-frontier");
        assert_eq!(meta.kind, "User");
        assert_eq!(meta.created_at.as_deref(), Some("2026-03-01T12:00:00Z"));

        let head = requests.lock().unwrap()[0].to_ascii_lowercase();
        assert!(head.starts_with("get /user/262206000 "));
        assert!(head.contains("accept: application/vnd.github.v3+json"));
        assert!(head.contains("user-agent: frontierwatch/"));
        assert!(!head.contains("authorization"));
    }

    #[test]
    fn ok_with_unparseable_body_still_exists() {
        let (base, _requests, handle) =
            spawn_test_http_server(vec![TestHttpResponse::new(200, "OK", "<html>")]);
        let oracle = oracle_for(base, None);
        assert_eq!(oracle.check(7).unwrap(), Outcome::Exists(None));
        handle.join().unwrap();
    }

    #[test]
    fn not_found_is_not_exists() {
        let (base, _requests, handle) =
            spawn_test_http_server(vec![TestHttpResponse::new(404, "Not Found", "{}")]);
        let oracle = oracle_for(base, None);
        assert_eq!(oracle.check(99).unwrap(), Outcome::NotExists);
        handle.join().unwrap();
    }

    #[test]
    fn too_many_requests_carries_retry_after() {
        let (base, _requests, handle) = spawn_test_http_server(vec![
            TestHttpResponse::new(429, "Too Many Requests", "").with_header("Retry-After", "2"),
        ]);
        let oracle = oracle_for(base, None);
        let failure = oracle.check(1).unwrap_err();
        handle.join().unwrap();
        assert_eq!(
            failure,
            TransientFailure::RateLimited {
                retry_after: Duration::from_secs(2)
            }
        );
        assert_eq!(failure.wait_hint(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn forbidden_without_retry_after_uses_default_wait() {
        let (base, _requests, handle) =
            spawn_test_http_server(vec![TestHttpResponse::new(403, "Forbidden", "")]);
        let oracle = oracle_for(base, None);
        let failure = oracle.check(1).unwrap_err();
        handle.join().unwrap();
        assert_eq!(failure.wait_hint(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn server_error_is_unavailable_without_hint() {
        let (base, _requests, handle) =
            spawn_test_http_server(vec![TestHttpResponse::new(502, "Bad Gateway", "")]);
        let oracle = oracle_for(base, None);
        let failure = oracle.check(1).unwrap_err();
        handle.join().unwrap();
        assert!(matches!(failure, TransientFailure::Unavailable { ref detail } if detail.contains("502")));
        assert_eq!(failure.wait_hint(), None);
    }

    #[test]
    fn connection_refused_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let oracle = oracle_for(format!("http://{addr}"), None);
        assert!(matches!(
            oracle.check(1),
            Err(TransientFailure::Unavailable { .. })
        ));
    }

    #[test]
    fn credential_is_sent_as_token_header() {
        let (base, requests, handle) =
            spawn_test_http_server(vec![TestHttpResponse::new(404, "Not Found", "")]);
        let oracle = oracle_for(base, Some("s3cret"));
        assert!(oracle.has_credential());
        let _ = oracle.check(5);
        handle.join().unwrap();
        let head = requests.lock().unwrap()[0].to_ascii_lowercase();
        assert!(head.contains("authorization: token s3cret"));
    }

    #[test]
    fn blank_credential_is_ignored() {
        let oracle = oracle_for("http://127.0.0.1:9".into(), Some("  "));
        assert!(!oracle.has_credential());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let oracle = oracle_for("http://127.0.0.1:9/".into(), None);
        assert_eq!(oracle.base_url(), "http://127.0.0.1:9");
        assert_eq!(oracle.user_url(42), "http://127.0.0.1:9/user/42");
    }

    #[test]
    fn invalid_base_url_is_config_error() {
        let err = HttpOracle::new(OracleConfig {
            base_url: "not a url".into(),
            ..OracleConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, FrontierError::InvalidConfig { ref field, .. } if field == "oracle.base_url"));
    }

    #[test]
    fn debug_redacts_credential() {
        let config = OracleConfig {
            credential: Some("s3cret".into()),
            ..OracleConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn retry_after_ignores_http_dates() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2026 07:28:00 GMT".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(RETRY_AFTER, " 17 ".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(17)));
    }
}
