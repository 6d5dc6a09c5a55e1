//! TOML configuration for speedscout.
//!
//! A layered model: compiled-in defaults, an optional TOML file (explicit
//! path or the `SPEEDSCOUT_CONFIG` environment variable), then command-line
//! overrides applied by the binary. `Settings::client_config` validates the
//! result into the immutable `ClientConfig` consumed by the core.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::directory::Proximity;
use crate::probes::{ProbePolicy, DEFAULT_CONCURRENCY};
use crate::ErrorKind;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "SPEEDSCOUT_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid source IP: {0}")]
    InvalidSourceAddress(String),

    #[error("timeout must be greater than zero")]
    ZeroTimeout,
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}

/// Validated, immutable client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub source_address: Option<IpAddr>,
    pub secure: bool,
    /// Explicit endpoint id; `None` selects automatically.
    pub explicit_endpoint: Option<u32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            source_address: None,
            secure: false,
            explicit_endpoint: None,
        }
    }
}

const DEFAULT_TIMEOUT_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// Top-level settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub directory: DirectorySection,
    #[serde(default)]
    pub probe: ProbeSection,
}

impl Settings {
    /// Load settings from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let settings: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        info!(path = %path.display(), "loaded configuration");
        Ok(settings)
    }

    /// Load from `path` if given, else from `SPEEDSCOUT_CONFIG`, else defaults.
    ///
    /// An explicitly requested file that fails to load is an error; a broken
    /// file named by the environment only warns.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(settings) => return Ok(settings),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "{} set but file could not be loaded, using defaults",
                        CONFIG_ENV
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }

    /// Validate the client section.
    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        let c = &self.client;
        if c.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        let source_address = match c.source_address.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<IpAddr>()
                    .map_err(|_| ConfigError::InvalidSourceAddress(raw.to_string()))?,
            ),
        };

        Ok(ClientConfig {
            timeout: Duration::from_secs(c.timeout_secs),
            source_address,
            secure: c.secure,
            explicit_endpoint: c.endpoint.filter(|id| *id != 0),
        })
    }

    pub fn probe_policy(&self) -> ProbePolicy {
        ProbePolicy {
            attempts: self.probe.attempts,
            error_latency: Duration::from_millis(self.probe.error_latency_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    /// Per-request timeout (connect and full exchange).
    pub timeout_secs: u64,
    /// Local IP to bind outgoing connections to.
    pub source_address: Option<String>,
    /// Complete scheme-relative URLs with `https` instead of `http`.
    pub secure: bool,
    /// Explicit endpoint id; absent or 0 selects automatically.
    pub endpoint: Option<u32>,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            source_address: None,
            secure: false,
            endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorySection {
    pub config_url: String,
    pub servers_url: String,
    pub proximity: Proximity,
    pub closest_limit: usize,
}

impl Default for DirectorySection {
    fn default() -> Self {
        Self {
            config_url: "://www.speedtest.net/speedtest-config.php".to_string(),
            servers_url: "://www.speedtest.net/speedtest-servers.php".to_string(),
            proximity: Proximity::Distance,
            closest_limit: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSection {
    pub attempts: u32,
    pub error_latency_ms: u64,
    /// Endpoints probed at the same time.
    pub concurrency: usize,
}

impl Default for ProbeSection {
    fn default() -> Self {
        let policy = ProbePolicy::default();
        Self {
            attempts: policy.attempts,
            error_latency_ms: policy.error_latency.as_millis() as u64,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        let client = settings.client_config().unwrap();
        assert_eq!(client, ClientConfig::default());
        assert_eq!(settings.probe.attempts, 4);
        assert_eq!(settings.probe.error_latency_ms, 60_000);
        assert_eq!(settings.directory.closest_limit, 5);
        assert_eq!(settings.directory.proximity, Proximity::Distance);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [client]
            timeout_secs = 3
            source_address = "127.0.0.1"
            secure = true
            endpoint = 12345

            [directory]
            proximity = "directory"

            [probe]
            attempts = 2
            "#
        )
        .unwrap();

        let settings = Settings::load(file.path()).unwrap();
        let client = settings.client_config().unwrap();
        assert_eq!(client.timeout, Duration::from_secs(3));
        assert_eq!(client.source_address, Some("127.0.0.1".parse().unwrap()));
        assert!(client.secure);
        assert_eq!(client.explicit_endpoint, Some(12345));
        assert_eq!(settings.directory.proximity, Proximity::Directory);
        // Unset fields keep their defaults.
        assert_eq!(settings.directory.closest_limit, 5);
        assert_eq!(settings.probe_policy().attempts, 2);
        assert_eq!(
            settings.probe_policy().error_latency,
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_invalid_source_address_is_fatal() {
        let mut settings = Settings::default();
        settings.client.source_address = Some("300.1.1.1".to_string());
        let err = settings.client_config().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSourceAddress(ref s) if s == "300.1.1.1"));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_zero_endpoint_means_automatic() {
        let mut settings = Settings::default();
        settings.client.endpoint = Some(0);
        assert_eq!(settings.client_config().unwrap().explicit_endpoint, None);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut settings = Settings::default();
        settings.client.timeout_secs = 0;
        assert!(matches!(
            settings.client_config(),
            Err(ConfigError::ZeroTimeout)
        ));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = Settings::load_or_default(Some(Path::new("/nonexistent/speedscout.toml")))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[client]\ntimeout_secs = \"soon\"").unwrap();
        assert!(matches!(
            Settings::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
