//! Endpoint directory: fetches the provider's server list and narrows it down
//! to the candidates worth probing.

pub mod geo;
pub mod schema;

use std::collections::HashSet;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DirectorySection;
use crate::transport::{DecodeError, Transport, TransportError};
use crate::ErrorKind;

pub use geo::Coordinates;
use schema::{ConfigDocument, ServersDocument, CONFIG_SCHEMA, SERVERS_SCHEMA};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("directory fetch failed: {0}")]
    Fetch(#[from] TransportError),

    #[error("directory decode failed: {0}")]
    Decode(#[from] DecodeError),
}

impl CatalogError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CatalogError::Fetch(e) => e.kind(),
            CatalogError::Decode(e) => e.kind(),
        }
    }
}

/// How the closest subset is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Proximity {
    /// Rank by great-circle distance from the client's reported location.
    #[default]
    Distance,
    /// Trust the order the directory publishes.
    Directory,
}

/// A candidate test server.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub id: u32,
    /// Upload URL as published; may be scheme-relative.
    pub url: String,
    pub coordinates: Coordinates,
    pub name: String,
    pub country: String,
    pub country_code: String,
    pub sponsor: String,
    pub host: String,
    /// Distance from the client, once computed.
    pub distance_km: Option<f64>,
    /// Fitness from the last latency measurement.
    pub latency: Option<Duration>,
}

impl Endpoint {
    /// `latency.txt` in the same directory as the endpoint URL.
    pub fn latency_url(&self) -> String {
        let path_start = self.url.find("://").map(|i| i + 3).unwrap_or(0);
        match self.url[path_start..].rfind('/') {
            Some(i) => format!("{}latency.txt", &self.url[..path_start + i + 1]),
            None => format!("{}/latency.txt", self.url),
        }
    }
}

/// Ordered endpoint collection with unique ids, in directory order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndpointSet {
    endpoints: Vec<Endpoint>,
}

impl EndpointSet {
    /// Build a set, dropping later duplicates of an id.
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        let mut seen = HashSet::with_capacity(endpoints.len());
        let endpoints = endpoints
            .into_iter()
            .filter(|e| {
                let fresh = seen.insert(e.id);
                if !fresh {
                    warn!(id = e.id, "duplicate endpoint id in directory, keeping first");
                }
                fresh
            })
            .collect();
        Self { endpoints }
    }

    pub fn find(&self, id: u32) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.id == id)
    }

    pub fn first(&self) -> Option<&Endpoint> {
        self.endpoints.first()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Endpoint> {
        self.endpoints.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Endpoint> {
        self.endpoints.iter_mut()
    }

    /// Drop endpoints whose id is in `ids`.
    pub fn without(mut self, ids: &[u32]) -> Self {
        self.endpoints.retain(|e| !ids.contains(&e.id));
        self
    }

    /// Record each endpoint's distance from `origin`.
    pub fn with_distances(mut self, origin: &Coordinates) -> Self {
        for e in &mut self.endpoints {
            e.distance_km = Some(origin.distance_km(&e.coordinates));
        }
        self
    }

    /// Reduce to at most `limit` endpoints nearest to `origin`.
    pub fn closest(self, origin: &Coordinates, limit: usize, proximity: Proximity) -> Self {
        let mut set = self.with_distances(origin);
        if proximity == Proximity::Distance {
            set.endpoints.sort_by(|a, b| {
                let da = a.distance_km.unwrap_or(f64::INFINITY);
                let db = b.distance_km.unwrap_or(f64::INFINITY);
                da.total_cmp(&db)
            });
        }
        set.endpoints.truncate(limit);
        set
    }

    /// Stable ascending sort by measured latency; unmeasured endpoints last.
    pub fn sort_by_latency(&mut self) {
        self.endpoints.sort_by_key(|e| e.latency.unwrap_or(Duration::MAX));
    }
}

impl IntoIterator for EndpointSet {
    type Item = Endpoint;
    type IntoIter = std::vec::IntoIter<Endpoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.endpoints.into_iter()
    }
}

impl FromIterator<Endpoint> for EndpointSet {
    fn from_iter<I: IntoIterator<Item = Endpoint>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Where endpoint candidates come from.
#[async_trait::async_trait]
pub trait EndpointSource: Send + Sync {
    /// Every endpoint in the directory.
    async fn all_endpoints(&self) -> Result<EndpointSet, CatalogError>;

    /// The geography-filtered subset worth probing.
    async fn closest_endpoints(&self) -> Result<EndpointSet, CatalogError>;
}

/// `EndpointSource` backed by the remote directory service.
///
/// Every call issues fresh requests; callers that want caching keep the
/// returned set.
#[derive(Clone)]
pub struct DirectoryCatalog {
    transport: Transport,
    config_url: String,
    servers_url: String,
    proximity: Proximity,
    closest_limit: usize,
}

impl DirectoryCatalog {
    pub fn new(transport: Transport, section: &DirectorySection) -> Self {
        Self {
            transport,
            config_url: section.config_url.clone(),
            servers_url: section.servers_url.clone(),
            proximity: section.proximity,
            closest_limit: section.closest_limit,
        }
    }

    /// Fetch the session configuration (client location, ignore list).
    pub async fn fetch_config(&self) -> Result<ConfigDocument, CatalogError> {
        self.fetch(&self.config_url, CONFIG_SCHEMA).await
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        url: &str,
        schema: &'static str,
    ) -> Result<T, CatalogError> {
        let mut envelope = self.transport.get(url).await?;
        let status = envelope.status();
        if !status.is_success() {
            // Drain so the connection is released before bailing.
            let _ = envelope.read_content().await;
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }
        envelope
            .read_structured(schema)
            .await
            .map_err(|e| match e {
                DecodeError::Read(source) => TransportError::Interrupted {
                    url: url.to_string(),
                    source,
                }
                .into(),
                other => other.into(),
            })
    }
}

#[async_trait::async_trait]
impl EndpointSource for DirectoryCatalog {
    async fn all_endpoints(&self) -> Result<EndpointSet, CatalogError> {
        let doc: ServersDocument = self.fetch(&self.servers_url, SERVERS_SCHEMA).await?;
        let set: EndpointSet = doc.servers.entries.into_iter().map(Endpoint::from).collect();
        info!(url = %self.servers_url, count = set.len(), "loaded endpoint directory");
        Ok(set)
    }

    async fn closest_endpoints(&self) -> Result<EndpointSet, CatalogError> {
        let config = self.fetch_config().await?;
        let ignored = config.server_config.ignored();
        let origin = config.client.coordinates();
        debug!(
            lat = origin.lat,
            lon = origin.lon,
            ignored = ignored.len(),
            "client location from directory config"
        );

        let closest = self
            .all_endpoints()
            .await?
            .without(&ignored)
            .closest(&origin, self.closest_limit, self.proximity);
        info!(
            count = closest.len(),
            proximity = ?self.proximity,
            "selected closest endpoints"
        );
        Ok(closest)
    }
}
