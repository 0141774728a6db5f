use crate::models::DemographicPolicy;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub providers: ProviderSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// Search behaviour and limits
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_radius_miles")]
    pub default_radius_miles: u32,
    #[serde(default = "default_max_radius_miles")]
    pub max_radius_miles: u32,
    #[serde(default = "default_radius_step_miles")]
    pub radius_step_miles: u32,
    #[serde(default = "default_policy")]
    pub default_policy: DemographicPolicy,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_worker_limit")]
    pub worker_limit: usize,
    /// Tie-break order for plurality; unlisted categories sort alphabetically after these
    #[serde(default)]
    pub category_priority: Vec<String>,
    /// Factor applied to the radius ceiling when collecting candidate tracts
    #[serde(default = "default_tract_region_margin")]
    pub tract_region_margin: f64,
}

impl SearchSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_radius_miles: default_radius_miles(),
            max_radius_miles: default_max_radius_miles(),
            radius_step_miles: default_radius_step_miles(),
            default_policy: default_policy(),
            request_timeout_secs: default_request_timeout_secs(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            worker_limit: default_worker_limit(),
            category_priority: Vec::new(),
            tract_region_margin: default_tract_region_margin(),
        }
    }
}

fn default_radius_miles() -> u32 { 10 }
fn default_max_radius_miles() -> u32 { 25 }
fn default_radius_step_miles() -> u32 { 5 }
fn default_policy() -> DemographicPolicy { DemographicPolicy::StrictMajority }
fn default_request_timeout_secs() -> u64 { 30 }
fn default_retry_count() -> u32 { 3 }
fn default_retry_base_delay_ms() -> u64 { 200 }
fn default_worker_limit() -> usize { 16 }
fn default_tract_region_margin() -> f64 { 1.2 }

/// Upstream data providers
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub google_maps_api_key: String,
    #[serde(default = "default_google_maps_base_url")]
    pub google_maps_base_url: String,
    #[serde(default)]
    pub census_api_key: String,
    #[serde(default = "default_census_api_base_url")]
    pub census_api_base_url: String,
    #[serde(default = "default_tigerweb_base_url")]
    pub tigerweb_base_url: String,
    #[serde(default = "default_acs_year")]
    pub acs_year: u16,
    /// JSON object mapping tract GEOID to HOLC grade
    pub holc_grades_path: Option<String>,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            google_maps_api_key: String::new(),
            google_maps_base_url: default_google_maps_base_url(),
            census_api_key: String::new(),
            census_api_base_url: default_census_api_base_url(),
            tigerweb_base_url: default_tigerweb_base_url(),
            acs_year: default_acs_year(),
            holc_grades_path: None,
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

fn default_google_maps_base_url() -> String { "https://maps.googleapis.com/maps/api".to_string() }
fn default_census_api_base_url() -> String { "https://api.census.gov/data".to_string() }
fn default_tigerweb_base_url() -> String {
    "https://tigerweb.geo.census.gov/arcgis/rest/services/TIGERweb/Tracts_Blocks/MapServer/0".to_string()
}
fn default_acs_year() -> u16 { 2022 }
fn default_http_timeout_secs() -> u64 { 10 }

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// Shared L2 store; the process-local cache is used alone when unset
    pub redis_url: Option<String>,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_l1_cache_size")]
    pub l1_cache_size: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            ttl_secs: default_cache_ttl_secs(),
            l1_cache_size: default_l1_cache_size(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 { 86_400 }
fn default_l1_cache_size() -> u64 { 10_000 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with FAIRWAY__)
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8082)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., FAIRWAY__SEARCH__MAX_RADIUS_MILES -> search.max_radius_miles
            .add_source(
                Environment::with_prefix("FAIRWAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        substitute_env_vars(settings)?.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("FAIRWAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}

/// Apply the conventional un-prefixed secret variables on top of the layered config
fn substitute_env_vars(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let overrides = [
        ("GOOGLE_MAPS_API_KEY", "providers.google_maps_api_key"),
        ("CENSUS_API_KEY", "providers.census_api_key"),
        ("HOLC_GRADES_PATH", "providers.holc_grades_path"),
        ("REDIS_URL", "cache.redis_url"),
        ("LOG_LEVEL", "logging.level"),
        ("LOG_FORMAT", "logging.format"),
    ];

    let mut builder = Config::builder().add_source(settings);
    for (var, key) in overrides {
        if let Ok(value) = env::var(var) {
            builder = builder.set_override(key, value)?;
        }
    }

    builder.build()
}
