use super::RoundTrip;
use crate::directory::Endpoint;
use crate::transport::{Transport, TransportError};
use anyhow::Result;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Body served by a healthy endpoint's `latency.txt`.
const LATENCY_BODY: &str = "test=test";

/// HTTP round trip: GET `latency.txt` next to the endpoint URL.
///
/// A query parameter defeats intermediate caches. The measured time covers
/// the request up to the response headers; the body is drained afterwards to
/// release the connection and validated.
#[derive(Clone)]
pub struct HttpRoundTrip {
    transport: Transport,
}

impl HttpRoundTrip {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }
}

#[async_trait::async_trait]
impl RoundTrip for HttpRoundTrip {
    async fn round_trip(&self, endpoint: &Endpoint) -> Result<Duration> {
        let url = format!("{}?x={}", endpoint.latency_url(), Uuid::new_v4());

        let start = Instant::now();
        let mut envelope = self.transport.get(&url).await?;
        let duration = start.elapsed();

        let status = envelope.status();
        let content = envelope.read_content().await?;
        if !status.is_success() {
            return Err(TransportError::Status {
                url,
                status: status.as_u16(),
            }
            .into());
        }

        let body = String::from_utf8_lossy(&content.bytes);
        if body.trim() != LATENCY_BODY {
            anyhow::bail!("unexpected latency body from {}: {:?}", url, body.trim());
        }

        Ok(duration)
    }
}
