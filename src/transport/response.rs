//! Response envelope: drain-once body with guaranteed close, XML decoding.

use std::io;

use bytes::{Bytes, BytesMut};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

use crate::ErrorKind;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read response body: {0}")]
    Read(#[source] io::Error),

    #[error("response body already consumed")]
    BodyConsumed,

    #[error("response body for '{schema}' is not valid UTF-8: {source}")]
    Encoding {
        schema: &'static str,
        #[source]
        source: std::str::Utf8Error,
    },

    #[error("failed to decode '{schema}' document: {source}")]
    Parse {
        schema: &'static str,
        #[source]
        source: quick_xml::DeError,
    },
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            // Timeouts and resets while streaming the body.
            DecodeError::Read(_) => ErrorKind::Unreachable,
            _ => ErrorKind::Decode,
        }
    }
}

/// An unread response body.
///
/// `close` releases the underlying connection and must be safe to call after
/// a failed read.
#[async_trait::async_trait]
pub trait BodyStream: Send {
    async fn read_to_end(&mut self) -> io::Result<Bytes>;

    fn close(&mut self) -> io::Result<()>;
}

/// Body backed by a live `reqwest::Response`.
struct HttpBody {
    response: Option<reqwest::Response>,
}

#[async_trait::async_trait]
impl BodyStream for HttpBody {
    async fn read_to_end(&mut self) -> io::Result<Bytes> {
        let response = self
            .response
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "body closed"))?;

        let mut buf = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(io::Error::other)? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }

    fn close(&mut self) -> io::Result<()> {
        // Dropping the response returns the connection to the pool (or closes it).
        self.response.take();
        Ok(())
    }
}

/// Bytes drained from a response, plus any error raised while closing it.
#[derive(Debug)]
pub struct Content {
    pub bytes: Bytes,
    pub close_error: Option<io::Error>,
}

/// A single HTTP exchange: status, headers and a body that can be drained once.
pub struct ResponseEnvelope {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<Box<dyn BodyStream>>,
}

impl std::fmt::Debug for ResponseEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseEnvelope")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("drained", &self.body.is_none())
            .finish()
    }
}

impl ResponseEnvelope {
    pub(crate) fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let headers = response.headers().clone();
        Self::from_stream(
            status,
            headers,
            Box::new(HttpBody {
                response: Some(response),
            }),
        )
    }

    /// Wrap an arbitrary body stream.
    pub fn from_stream(status: StatusCode, headers: HeaderMap, body: Box<dyn BodyStream>) -> Self {
        Self {
            status,
            headers,
            body: Some(body),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether the body has already been drained.
    pub fn is_drained(&self) -> bool {
        self.body.is_none()
    }

    /// Read the whole body and close the stream.
    ///
    /// The stream is closed on every path. A read error takes precedence over
    /// a close error; a close error after a good read is returned alongside
    /// the bytes.
    pub async fn read_content(&mut self) -> Result<Content, DecodeError> {
        let mut body = self.body.take().ok_or(DecodeError::BodyConsumed)?;

        let read = body.read_to_end().await;
        let closed = body.close();

        match (read, closed) {
            (Err(e), _) => Err(DecodeError::Read(e)),
            (Ok(bytes), Err(e)) => Ok(Content {
                bytes,
                close_error: Some(e),
            }),
            (Ok(bytes), Ok(())) => Ok(Content {
                bytes,
                close_error: None,
            }),
        }
    }

    /// Drain the body and decode it as the XML document named `schema`.
    pub async fn read_structured<T: DeserializeOwned>(
        &mut self,
        schema: &'static str,
    ) -> Result<T, DecodeError> {
        let content = self.read_content().await?;
        if let Some(e) = &content.close_error {
            warn!(%schema, error = %e, "failed to close response body after read");
        }

        let text = std::str::from_utf8(&content.bytes)
            .map_err(|source| DecodeError::Encoding { schema, source })?;
        quick_xml::de::from_str(text).map_err(|source| DecodeError::Parse { schema, source })
    }
}
