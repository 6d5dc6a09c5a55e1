//! speedscout -- finds the best speed-test endpoint to run a throughput test against.
//!
//! This crate provides the endpoint-selection core: an identifying HTTP
//! transport, directory decoding, latency probing and ranking, and the
//! selector that ties them together.

pub mod config;
pub mod directory;
pub mod probes;
pub mod report;
pub mod selector;
pub mod transport;

use anyhow::{Context, Result};

use config::Settings;
use directory::{EndpointSet, EndpointSource};
use report::SelectionReport;
use selector::HttpSelector;

/// Failure classes shared by every error type in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed URL or request, rejected before any network I/O.
    InvalidRequest,
    /// Connection, timeout or HTTP status failure.
    Unreachable,
    /// A response arrived but could not be decoded.
    Decode,
    /// Invalid configuration, including an unknown explicit endpoint.
    Configuration,
    /// The closest-endpoint filter left nothing to probe.
    EmptyCandidateSet,
}

/// Select an endpoint using `settings`.
pub async fn run_selection(settings: &Settings) -> Result<SelectionReport> {
    let client = settings
        .client_config()
        .context("invalid client configuration")?;
    let selector =
        HttpSelector::from_settings(settings, &client).context("failed to set up HTTP client")?;

    tracing::info!(
        explicit = ?client.explicit_endpoint,
        secure = client.secure,
        "Selecting endpoint"
    );
    let endpoint = selector
        .select(&client)
        .await
        .context("endpoint selection failed")?;

    Ok(SelectionReport::new(&endpoint, &client))
}

/// Fetch the directory, annotated with distances from the client.
pub async fn list_endpoints(settings: &Settings, closest_only: bool) -> Result<EndpointSet> {
    let client = settings
        .client_config()
        .context("invalid client configuration")?;
    let selector =
        HttpSelector::from_settings(settings, &client).context("failed to set up HTTP client")?;
    let catalog = selector.source();

    if closest_only {
        return catalog
            .closest_endpoints()
            .await
            .context("failed to load closest endpoints");
    }

    let config = catalog
        .fetch_config()
        .await
        .context("failed to load directory configuration")?;
    let endpoints = catalog
        .all_endpoints()
        .await
        .context("failed to load endpoint list")?;
    Ok(endpoints.with_distances(&config.client.coordinates()))
}
