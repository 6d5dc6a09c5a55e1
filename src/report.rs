//! Selection result formatting.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::ClientConfig;
use crate::directory::Endpoint;

/// How the endpoint was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    Explicit,
    Automatic,
}

impl std::fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionMode::Explicit => write!(f, "explicit"),
            SelectionMode::Automatic => write!(f, "automatic"),
        }
    }
}

/// The chosen endpoint, ready for display or JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionReport {
    pub mode: SelectionMode,
    pub id: u32,
    pub sponsor: String,
    pub name: String,
    pub country: String,
    pub host: String,
    pub url: String,
    pub distance_km: Option<f64>,
    pub latency_ms: Option<f64>,
    pub selected_at: DateTime<Utc>,
}

impl SelectionReport {
    pub fn new(endpoint: &Endpoint, config: &ClientConfig) -> Self {
        let mode = if config.explicit_endpoint.is_some() {
            SelectionMode::Explicit
        } else {
            SelectionMode::Automatic
        };
        Self {
            mode,
            id: endpoint.id,
            sponsor: endpoint.sponsor.clone(),
            name: endpoint.name.clone(),
            country: endpoint.country.clone(),
            host: endpoint.host.clone(),
            url: endpoint.url.clone(),
            distance_km: endpoint.distance_km,
            latency_ms: endpoint.latency.map(|l| l.as_secs_f64() * 1000.0),
            selected_at: Utc::now(),
        }
    }
}

/// Format a selection as a one-line human-readable summary.
pub fn format_summary(report: &SelectionReport) -> String {
    let mut summary = format!(
        "{} ({}, {}) [id {}]",
        report.sponsor, report.name, report.country, report.id
    );

    if let Some(km) = report.distance_km {
        summary.push_str(&format!(", {:.1} km", km));
    }
    match report.latency_ms {
        Some(ms) if ms >= 1000.0 => summary.push_str(&format!(", latency: {:.2}s", ms / 1000.0)),
        Some(ms) => summary.push_str(&format!(", latency: {:.1}ms", ms)),
        None => summary.push_str(", latency: n/a"),
    }
    summary.push_str(&format!(" ({} selection)", report.mode));

    summary
}

/// Format one directory entry as a table row for listings.
pub fn format_row(endpoint: &Endpoint) -> String {
    let distance = endpoint
        .distance_km
        .map(|km| format!("{:.1} km", km))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:>6} | {:<25} | {:<20} | {:<15} | {}",
        endpoint.id, endpoint.sponsor, endpoint.name, endpoint.country, distance
    )
}
