//! XML documents published by the directory service (subset of fields we consume).

use serde::{Deserialize, Serialize};

use super::{Coordinates, Endpoint};

/// Schema name reported when the session configuration fails to decode.
pub const CONFIG_SCHEMA: &str = "settings";
/// Schema name reported when the server list fails to decode.
pub const SERVERS_SCHEMA: &str = "servers";

/// Session configuration: `<settings><client .../><server-config .../></settings>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "settings")]
pub struct ConfigDocument {
    pub client: ClientInfo,
    #[serde(rename = "server-config", default)]
    pub server_config: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    #[serde(rename = "@ip", default)]
    pub ip: String,
    #[serde(rename = "@lat")]
    pub lat: f64,
    #[serde(rename = "@lon")]
    pub lon: f64,
    #[serde(rename = "@isp", default)]
    pub isp: String,
}

impl ClientInfo {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            lat: self.lat,
            lon: self.lon,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Comma-separated endpoint ids the provider asks clients to skip.
    #[serde(rename = "@ignoreids", default)]
    pub ignore_ids: String,
}

impl ServerConfig {
    /// Parsed ignore list; malformed entries are skipped.
    pub fn ignored(&self) -> Vec<u32> {
        self.ignore_ids
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect()
    }
}

/// Server list: `<settings><servers><server .../>...</servers></settings>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "settings")]
pub struct ServersDocument {
    #[serde(default)]
    pub servers: ServerList,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerList {
    #[serde(rename = "server", default)]
    pub entries: Vec<ServerEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEntry {
    #[serde(rename = "@id")]
    pub id: u32,
    #[serde(rename = "@url")]
    pub url: String,
    #[serde(rename = "@lat")]
    pub lat: f64,
    #[serde(rename = "@lon")]
    pub lon: f64,
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "@country", default)]
    pub country: String,
    #[serde(rename = "@cc", default)]
    pub country_code: String,
    #[serde(rename = "@sponsor", default)]
    pub sponsor: String,
    #[serde(rename = "@host", default)]
    pub host: String,
}

impl From<ServerEntry> for Endpoint {
    fn from(e: ServerEntry) -> Self {
        Endpoint {
            id: e.id,
            url: e.url,
            coordinates: Coordinates {
                lat: e.lat,
                lon: e.lon,
            },
            name: e.name,
            country: e.country,
            country_code: e.country_code,
            sponsor: e.sponsor,
            host: e.host,
            distance_km: None,
            latency: None,
        }
    }
}

impl From<&Endpoint> for ServerEntry {
    fn from(e: &Endpoint) -> Self {
        ServerEntry {
            id: e.id,
            url: e.url.clone(),
            lat: e.coordinates.lat,
            lon: e.coordinates.lon,
            name: e.name.clone(),
            country: e.country.clone(),
            country_code: e.country_code.clone(),
            sponsor: e.sponsor.clone(),
            host: e.host.clone(),
        }
    }
}
