//! Endpoint selection: explicit override or latency-ranked automatic choice.

use thiserror::Error;
use tracing::info;

use crate::config::{ClientConfig, Settings};
use crate::directory::{CatalogError, DirectoryCatalog, Endpoint, EndpointSource};
use crate::probes::{HttpRoundTrip, LatencyProbe, ProbePolicy, RoundTrip};
use crate::transport::{Transport, TransportError};
use crate::ErrorKind;

#[derive(Debug, Error)]
pub enum SelectError {
    #[error(transparent)]
    Directory(#[from] CatalogError),

    #[error("endpoint lookup failed: endpoint {0} not found in directory")]
    EndpointNotFound(u32),

    #[error("no candidate endpoints available")]
    EmptyCandidateSet,
}

impl SelectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SelectError::Directory(e) => e.kind(),
            SelectError::EndpointNotFound(_) => ErrorKind::Configuration,
            SelectError::EmptyCandidateSet => ErrorKind::EmptyCandidateSet,
        }
    }
}

/// Selector wired to the live directory and HTTP latency probes.
pub type HttpSelector = Selector<DirectoryCatalog, HttpRoundTrip>;

pub struct Selector<S, R> {
    source: S,
    probe: LatencyProbe<R>,
    policy: ProbePolicy,
}

impl<S: EndpointSource, R: RoundTrip> Selector<S, R> {
    pub fn new(source: S, probe: LatencyProbe<R>, policy: ProbePolicy) -> Self {
        Self {
            source,
            probe,
            policy,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Pick the endpoint to test against.
    ///
    /// With an explicit id the matching endpoint is probed and returned
    /// whatever its latency. Otherwise the closest subset is probed and the
    /// fastest entry wins. Directory failures are never retried.
    pub async fn select(&self, config: &ClientConfig) -> Result<Endpoint, SelectError> {
        match config.explicit_endpoint {
            Some(id) => self.select_explicit(id).await,
            None => self.select_automatic().await,
        }
    }

    async fn select_explicit(&self, id: u32) -> Result<Endpoint, SelectError> {
        let endpoints = self.source.all_endpoints().await?;
        let mut selected = endpoints
            .find(id)
            .cloned()
            .ok_or(SelectError::EndpointNotFound(id))?;

        let latency = self.probe.measure_latency(&mut selected, self.policy).await;
        info!(
            id,
            sponsor = %selected.sponsor,
            latency_ms = latency.as_secs_f64() * 1000.0,
            "using requested endpoint"
        );
        Ok(selected)
    }

    async fn select_automatic(&self) -> Result<Endpoint, SelectError> {
        let candidates = self.source.closest_endpoints().await?;
        if candidates.is_empty() {
            return Err(SelectError::EmptyCandidateSet);
        }

        let ranked = self.probe.measure_latencies(candidates, self.policy).await;
        let selected = ranked
            .into_iter()
            .next()
            .ok_or(SelectError::EmptyCandidateSet)?;
        info!(
            id = selected.id,
            sponsor = %selected.sponsor,
            latency_ms = selected.latency.map(|l| l.as_secs_f64() * 1000.0),
            "selected fastest endpoint"
        );
        Ok(selected)
    }
}

impl HttpSelector {
    /// Build the HTTP-backed selector from validated settings.
    pub fn from_settings(settings: &Settings, client: &ClientConfig) -> Result<Self, TransportError> {
        let transport = Transport::new(client)?;
        let catalog = DirectoryCatalog::new(transport.clone(), &settings.directory);
        let probe = LatencyProbe::new(HttpRoundTrip::new(transport), settings.probe.concurrency);
        Ok(Selector::new(catalog, probe, settings.probe_policy()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::tests::endpoint;
    use crate::directory::EndpointSet;
    use crate::probes::tests::ScriptedRoundTrip;
    use crate::transport::DecodeError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct FakeSource {
        all: Vec<Endpoint>,
        closest: Vec<Endpoint>,
        broken: bool,
        all_calls: AtomicU32,
        closest_calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl EndpointSource for FakeSource {
        async fn all_endpoints(&self) -> Result<EndpointSet, CatalogError> {
            self.all_calls.fetch_add(1, Ordering::SeqCst);
            if self.broken {
                return Err(TransportError::Status {
                    url: "http://directory.invalid/servers".to_string(),
                    status: 503,
                }
                .into());
            }
            Ok(EndpointSet::new(self.all.clone()))
        }

        async fn closest_endpoints(&self) -> Result<EndpointSet, CatalogError> {
            self.closest_calls.fetch_add(1, Ordering::SeqCst);
            if self.broken {
                return Err(DecodeError::BodyConsumed.into());
            }
            Ok(EndpointSet::new(self.closest.clone()))
        }
    }

    fn three() -> Vec<Endpoint> {
        vec![
            endpoint(111, 0.0, 0.0),
            endpoint(12345, 0.0, 0.0),
            endpoint(333, 0.0, 0.0),
        ]
    }

    fn policy() -> ProbePolicy {
        ProbePolicy {
            attempts: 2,
            error_latency: Duration::from_secs(60),
        }
    }

    fn selector(source: FakeSource, rt: ScriptedRoundTrip) -> Selector<FakeSource, ScriptedRoundTrip> {
        Selector::new(source, LatencyProbe::new(rt, 4), policy())
    }

    fn explicit(id: u32) -> ClientConfig {
        ClientConfig {
            explicit_endpoint: Some(id),
            ..ClientConfig::default()
        }
    }

    #[tokio::test]
    async fn test_explicit_endpoint_overrides_ranking() {
        let source = FakeSource {
            all: three(),
            ..Default::default()
        };
        let rt = ScriptedRoundTrip::default()
            .with(111, &[Some(1), Some(1)])
            .with(12345, &[Some(900), None])
            .with(333, &[Some(2), Some(2)]);
        let sel = selector(source, rt);

        let chosen = sel.select(&explicit(12345)).await.unwrap();
        assert_eq!(chosen.id, 12345);
        // (900ms + 60s) / 2
        assert_eq!(chosen.latency, Some(Duration::from_millis(30_450)));
        assert_eq!(sel.source.all_calls.load(Ordering::SeqCst), 1);
        assert_eq!(sel.source.closest_calls.load(Ordering::SeqCst), 0);
        // Only the requested endpoint was probed.
        assert_eq!(sel.probe_calls(), 2);
    }

    #[tokio::test]
    async fn test_explicit_endpoint_missing_is_configuration_error() {
        let source = FakeSource {
            all: three(),
            ..Default::default()
        };
        let sel = selector(source, ScriptedRoundTrip::default());

        let err = sel.select(&explicit(99999)).await.unwrap_err();
        assert!(matches!(err, SelectError::EndpointNotFound(99999)));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("lookup"));
        assert_eq!(sel.probe_calls(), 0);
    }

    #[tokio::test]
    async fn test_automatic_picks_fastest() {
        let source = FakeSource {
            closest: three(),
            ..Default::default()
        };
        let rt = ScriptedRoundTrip::default()
            .with(111, &[Some(50), Some(50)])
            .with(12345, &[Some(10), Some(10)]);
        let sel = selector(source, rt);

        let chosen = sel.select(&ClientConfig::default()).await.unwrap();
        assert_eq!(chosen.id, 12345);
        assert_eq!(chosen.latency, Some(Duration::from_millis(10)));
        assert_eq!(sel.source.all_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_automatic_empty_candidates() {
        let sel = selector(FakeSource::default(), ScriptedRoundTrip::default());

        let err = sel.select(&ClientConfig::default()).await.unwrap_err();
        assert!(matches!(err, SelectError::EmptyCandidateSet));
        assert_eq!(err.kind(), ErrorKind::EmptyCandidateSet);
    }

    #[tokio::test]
    async fn test_directory_failures_are_fatal() {
        let source = FakeSource {
            broken: true,
            ..Default::default()
        };
        let sel = selector(source, ScriptedRoundTrip::default());

        let err = sel.select(&explicit(12345)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unreachable);
        assert!(err.to_string().starts_with("directory fetch failed"));

        let err = sel.select(&ClientConfig::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(err.to_string().starts_with("directory decode failed"));

        // One attempt each, no retry.
        assert_eq!(sel.source.all_calls.load(Ordering::SeqCst), 1);
        assert_eq!(sel.source.closest_calls.load(Ordering::SeqCst), 1);
    }

    impl Selector<FakeSource, ScriptedRoundTrip> {
        fn probe_calls(&self) -> u32 {
            self.probe.round_trip().calls.load(Ordering::SeqCst)
        }
    }
}
