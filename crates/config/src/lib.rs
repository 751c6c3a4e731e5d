//! Configuration loading and validation.
//!
//! Layered via figment: built-in defaults, then an optional configuration
//! file (YAML, TOML or JSON, picked by extension), then `SNAPSORT_*`
//! environment variables. Command-line flags are applied on top by the
//! binary, not here.

pub mod error;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use snapsort_geo::{DEFAULT_MAJOR_CITIES, DEFAULT_NATIONAL_PARKS};
use std::path::{Path, PathBuf};
use tracing::debug;

const ENV_PREFIX: &str = "SNAPSORT_";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bounded worker-pool size for metadata extraction and geocoding
    /// dispatch. Controls parallelism, not request rate.
    pub workers: usize,
    /// Verify moved/copied files against a pre-move content hash.
    pub verify: bool,
    /// Descend into subdirectories of the source.
    pub recursive: bool,
    /// Glob-ish patterns excluded from the source scan.
    pub exclude: Vec<String>,
    /// Filename template; variables: `date`, `year`, `month`, `day`,
    /// `name`, `ext`.
    pub filename_pattern: String,
    pub cluster: ClusterConfig,
    pub geocode: GeocodeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 4,
            verify: true,
            recursive: true,
            exclude: Vec::new(),
            filename_pattern: "{{ date }}_{{ name }}{{ ext }}".to_string(),
            cluster: ClusterConfig::default(),
            geocode: GeocodeConfig::default(),
        }
    }
}

/// Spatial clustering knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Two capture points within this distance belong to the same cluster.
    pub distance_threshold_miles: f64,
    /// Fraction of cluster members that must share a major-city name for the
    /// cluster to adopt it.
    pub city_vote_threshold: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self { distance_threshold_miles: 25.0, city_vote_threshold: 0.8 }
    }
}

/// Geocoding and cache knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodeConfig {
    /// Quantization precision in decimal degrees for the cache key.
    pub precision: u8,
    /// How long a cached geocoding failure embargoes a cell.
    pub failed_ttl_hours: u64,
    /// Cache database location. `None` means the platform cache directory.
    pub cache_path: Option<PathBuf>,
    /// Provider chain in priority order.
    pub providers: Vec<ProviderConfig>,
    pub retry: RetryConfig,
    /// Major-city names eligible for `State-City` folders.
    pub major_cities: Vec<String>,
    /// National-park names eligible for `State-Park` folders.
    pub national_parks: Vec<String>,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            precision: 3,
            failed_ttl_hours: 24,
            cache_path: None,
            providers: vec![ProviderConfig::default()],
            retry: RetryConfig::default(),
            major_cities: DEFAULT_MAJOR_CITIES.iter().map(|s| s.to_string()).collect(),
            national_parks: DEFAULT_NATIONAL_PARKS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// One geocoding provider in the fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider identifier: `nominatim` or `locationiq`.
    pub name: String,
    pub api_key: Option<String>,
    /// Token-bucket burst capacity.
    pub burst: u32,
    /// Token-bucket refill rate (the provider's documented quota).
    pub quota_per_second: f64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        // Nominatim's published usage policy: one request per second.
        Self { name: "nominatim".to_string(), api_key: None, burst: 1, quota_per_second: 1.0 }
    }
}

/// Retry behaviour for transient provider failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 500, jitter: 0.2 }
    }
}

impl Config {
    /// Load configuration: defaults → optional file → environment.
    ///
    /// The file format is chosen by extension; an unrecognized extension is
    /// rejected rather than guessed at.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = file {
            if !path.is_file() {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
            }
            figment = match path.extension().and_then(|e| e.to_str()) {
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("toml") => figment.merge(Toml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => exn::bail!(ErrorKind::UnknownFormat(path.to_path_buf())),
            };
        }
        let config: Config =
            figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract().or_raise(|| ErrorKind::Invalid)?;
        config.validate()?;
        debug!(workers = config.workers, providers = config.geocode.providers.len(), "configuration loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            exn::bail!(ErrorKind::Constraint("workers must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.cluster.city_vote_threshold) {
            exn::bail!(ErrorKind::Constraint("city_vote_threshold must be within [0, 1]"));
        }
        if self.cluster.distance_threshold_miles <= 0.0 {
            exn::bail!(ErrorKind::Constraint("distance_threshold_miles must be positive"));
        }
        if self.geocode.providers.is_empty() {
            exn::bail!(ErrorKind::Constraint("at least one geocoding provider is required"));
        }
        Ok(())
    }

    /// Resolved cache database path: the configured one, or the platform
    /// cache directory (`~/.cache/snapsort/geocode.db` on Linux).
    pub fn cache_path(&self) -> Option<PathBuf> {
        self.geocode.cache_path.clone().or_else(|| {
            directories::ProjectDirs::from("", "", "snapsort").map(|dirs| dirs.cache_dir().join("geocode.db"))
        })
    }
}
