//! Latency probing: fixed-attempt round-trip sampling and ranking.

use std::time::Duration;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::directory::{Endpoint, EndpointSet};

pub mod http;

pub use http::HttpRoundTrip;

/// Round trips per endpoint.
pub const DEFAULT_ATTEMPTS: u32 = 4;
/// Latency recorded for a failed round trip.
pub const DEFAULT_ERROR_LATENCY: Duration = Duration::from_secs(60);
/// Endpoints probed at the same time.
pub const DEFAULT_CONCURRENCY: usize = 8;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// How many samples to take and what a failed sample costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePolicy {
    pub attempts: u32,
    pub error_latency: Duration,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            error_latency: DEFAULT_ERROR_LATENCY,
        }
    }
}

/// One round trip against one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencySample {
    pub endpoint_id: u32,
    pub attempt: u32,
    /// Measured duration, or the error latency when `failed`.
    pub latency: Duration,
    pub failed: bool,
}

/// A single lightweight exchange with an endpoint.
#[async_trait::async_trait]
pub trait RoundTrip: Send + Sync {
    /// Perform one round trip and return how long it took.
    async fn round_trip(&self, endpoint: &Endpoint) -> Result<Duration>;
}

/// Samples endpoints with a `RoundTrip` and ranks them by mean latency.
pub struct LatencyProbe<R> {
    round_trip: R,
    concurrency: usize,
}

impl<R: RoundTrip> LatencyProbe<R> {
    pub fn new(round_trip: R, concurrency: usize) -> Self {
        Self {
            round_trip,
            concurrency: concurrency.max(1),
        }
    }

    pub fn round_trip(&self) -> &R {
        &self.round_trip
    }

    /// Take exactly `policy.attempts` sequential samples. Failures become
    /// `policy.error_latency` and never end the loop early.
    pub async fn sample(&self, endpoint: &Endpoint, policy: ProbePolicy) -> Vec<LatencySample> {
        let mut samples = Vec::with_capacity(policy.attempts as usize);
        for attempt in 0..policy.attempts {
            let sample = match self.round_trip.round_trip(endpoint).await {
                Ok(latency) => LatencySample {
                    endpoint_id: endpoint.id,
                    attempt,
                    latency,
                    failed: false,
                },
                Err(e) => {
                    debug!(id = endpoint.id, attempt, error = %e, "latency probe failed");
                    LatencySample {
                        endpoint_id: endpoint.id,
                        attempt,
                        latency: policy.error_latency,
                        failed: true,
                    }
                }
            };
            samples.push(sample);
        }
        samples
    }

    /// Measure one endpoint, store the result in `endpoint.latency` and return it.
    pub async fn measure_latency(&self, endpoint: &mut Endpoint, policy: ProbePolicy) -> Duration {
        let samples = self.sample(endpoint, policy).await;
        let latency = mean_latency(&samples, policy.error_latency);
        let failed = samples.iter().filter(|s| s.failed).count();
        debug!(
            id = endpoint.id,
            latency_ms = latency.as_secs_f64() * 1000.0,
            failed,
            attempts = policy.attempts,
            "measured endpoint latency"
        );
        endpoint.latency = Some(latency);
        latency
    }

    /// Measure every endpoint concurrently, then order the set by latency.
    ///
    /// Ties keep directory order.
    pub async fn measure_latencies(&self, mut set: EndpointSet, policy: ProbePolicy) -> EndpointSet {
        stream::iter(set.iter_mut())
            .for_each_concurrent(self.concurrency, |endpoint| async move {
                self.measure_latency(endpoint, policy).await;
            })
            .await;
        set.sort_by_latency();
        set
    }
}

/// Arithmetic mean of the samples; `error_latency` when there are none.
pub fn mean_latency(samples: &[LatencySample], error_latency: Duration) -> Duration {
    if samples.is_empty() {
        return error_latency;
    }
    let total: u128 = samples.iter().map(|s| s.latency.as_nanos()).sum();
    let mean = total / samples.len() as u128;
    // mean <= max sample, so the seconds always fit.
    Duration::new((mean / NANOS_PER_SEC) as u64, (mean % NANOS_PER_SEC) as u32)
}
