//! HTTP transport: request construction, URL normalization, client identity.

pub mod response;

use std::io;
use std::net::IpAddr;
use std::sync::OnceLock;
use std::time::Duration;

use reqwest::{header, Client, Method, Url};
use thiserror::Error;
use tracing::debug;

use crate::config::ClientConfig;
use crate::ErrorKind;

pub use response::{BodyStream, Content, DecodeError, ResponseEnvelope};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid request to {url}: {reason}")]
    InvalidRequest { url: String, reason: String },

    #[error("{url} unreachable: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} dropped the connection mid-body: {source}")]
    Interrupted {
        url: String,
        #[source]
        source: io::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            TransportError::Unreachable { .. }
            | TransportError::Interrupted { .. }
            | TransportError::Status { .. } => ErrorKind::Unreachable,
            TransportError::Client(_) => ErrorKind::Configuration,
        }
    }
}

/// The identifying `User-Agent`, composed once per process.
pub fn user_agent() -> &'static str {
    static USER_AGENT: OnceLock<String> = OnceLock::new();
    USER_AGENT.get_or_init(|| {
        format!(
            "Mozilla/5.0 ({}; U; {}; en-us) Rust/2021 (KHTML, like Gecko) {}/{}",
            std::env::consts::OS,
            std::env::consts::ARCH,
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
        )
    })
}

/// Complete a scheme-relative URL (`://host/path`) with `https` or `http`.
pub fn normalize_url(url: &str, secure: bool) -> String {
    if url.starts_with(':') {
        let scheme = if secure { "https" } else { "http" };
        format!("{}{}", scheme, url)
    } else {
        url.to_string()
    }
}

/// Pooled HTTP client that stamps every request with the client identity.
///
/// Cloning is cheap and shares the underlying connection pool.
#[derive(Clone)]
pub struct Transport {
    client: Client,
    secure: bool,
}

impl Transport {
    /// Build a transport honoring the configured timeout and source address.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        Self::build(config.timeout, config.source_address, config.secure)
    }

    fn build(
        timeout: Duration,
        source_address: Option<IpAddr>,
        secure: bool,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .tcp_keepalive(timeout)
            .local_address(source_address)
            .build()
            .map_err(TransportError::Client)?;

        Ok(Self { client, secure })
    }

    /// Issue a GET request.
    pub async fn get(&self, url: &str) -> Result<ResponseEnvelope, TransportError> {
        self.request(Method::GET, url, None).await
    }

    /// Issue a POST request with the given content type and body.
    pub async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: impl Into<reqwest::Body>,
    ) -> Result<ResponseEnvelope, TransportError> {
        self.request(Method::POST, url, Some((content_type, body.into())))
            .await
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<(&str, reqwest::Body)>,
    ) -> Result<ResponseEnvelope, TransportError> {
        let target = self.parse_url(url)?;
        debug!(%method, url = %target, "dispatching request");

        let mut builder = self
            .client
            .request(method, target.clone())
            .header(header::USER_AGENT, user_agent());
        if let Some((content_type, body)) = body {
            builder = builder.header(header::CONTENT_TYPE, content_type).body(body);
        }

        let response = builder.send().await.map_err(|source| {
            if source.is_builder() {
                TransportError::InvalidRequest {
                    url: target.to_string(),
                    reason: source.to_string(),
                }
            } else {
                TransportError::Unreachable {
                    url: target.to_string(),
                    source,
                }
            }
        })?;

        Ok(ResponseEnvelope::from_response(response))
    }

    fn parse_url(&self, url: &str) -> Result<Url, TransportError> {
        let normalized = normalize_url(url, self.secure);
        let parsed = Url::parse(&normalized).map_err(|e| TransportError::InvalidRequest {
            url: normalized.clone(),
            reason: e.to_string(),
        })?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            other => Err(TransportError::InvalidRequest {
                url: normalized,
                reason: format!("unsupported scheme '{}'", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(secure: bool) -> Transport {
        Transport::build(Duration::from_secs(1), None, secure).unwrap()
    }

    #[test]
    fn test_normalize_scheme_relative_secure() {
        assert_eq!(
            normalize_url("://example.com/path", true),
            "https://example.com/path"
        );
    }

    #[test]
    fn test_normalize_scheme_relative_plain() {
        assert_eq!(
            normalize_url("://example.com/path", false),
            "http://example.com/path"
        );
    }

    #[test]
    fn test_normalize_leaves_absolute_urls() {
        assert_eq!(
            normalize_url("http://example.com/a", true),
            "http://example.com/a"
        );
    }

    #[test]
    fn test_user_agent_is_stable() {
        let ua = user_agent();
        assert!(ua.starts_with("Mozilla/5.0 ("));
        assert!(ua.contains(std::env::consts::OS));
        assert!(ua.contains(std::env::consts::ARCH));
        assert!(ua.ends_with(env!("CARGO_PKG_VERSION")));
        assert!(std::ptr::eq(ua, user_agent()));
    }

    #[test]
    fn test_parse_url_rejects_garbage() {
        let err = transport(false).parse_url("not a url").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_parse_url_rejects_other_schemes() {
        let err = transport(false).parse_url("ftp://example.com/").unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest { .. }));
    }

    #[test]
    fn test_parse_url_secure_completion() {
        let url = transport(true).parse_url("://example.com/path").unwrap();
        assert_eq!(url.as_str(), "https://example.com/path");
    }

    #[test]
    fn test_client_build_error_has_no_url() {
        let source = Client::new().get("not a url").build().unwrap_err();
        let err = TransportError::Client(source);
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().starts_with("failed to build HTTP client: "));
    }

    #[tokio::test]
    async fn test_get_invalid_url_fails_before_io() {
        let err = transport(false).get("http://bad host/").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_get_refused_connection_is_unreachable() {
        // Bind then drop to obtain a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = transport(false)
            .get(&format!("://127.0.0.1:{}/latency.txt", port))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unreachable);
    }
}
