use crate::core::{FeatureConfig, LifecycleConfig, MatchingConfig, OptimizerConfig};
use crate::models::Weights;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub listings: ListingSourceSettings,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub scoring: ScoringSettings,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    pub auth: AuthSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// WordPress REST namespace serving the listings
#[derive(Debug, Clone, Deserialize)]
pub struct ListingSourceSettings {
    pub base_url: String,
    pub username: String,
    pub application_password: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_page_size() -> usize { 100 }
fn default_timeout_secs() -> u64 { 10 }

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheSettings {
    /// Shared L2 tier; without it only the in-process cache is used
    pub redis_url: Option<String>,
    pub ttl_secs: Option<u64>,
    pub l1_cache_size: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScoringSettings {
    #[serde(default)]
    pub weights: WeightsConfig,
}

/// Default weights installed as version 0
#[derive(Debug, Clone, Deserialize)]
pub struct WeightsConfig {
    #[serde(default = "default_category_weight")]
    pub category_match: f64,
    #[serde(default = "default_location_weight")]
    pub location_proximity: f64,
    #[serde(default = "default_impact_weight")]
    pub environmental_impact: f64,
    #[serde(default = "default_condition_weight")]
    pub condition_compatibility: f64,
    #[serde(default = "default_value_weight")]
    pub value_range_overlap: f64,
    #[serde(default = "default_urgency_weight")]
    pub urgency: f64,
    #[serde(default = "default_user_weight")]
    pub user_compatibility: f64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            category_match: default_category_weight(),
            location_proximity: default_location_weight(),
            environmental_impact: default_impact_weight(),
            condition_compatibility: default_condition_weight(),
            value_range_overlap: default_value_weight(),
            urgency: default_urgency_weight(),
            user_compatibility: default_user_weight(),
        }
    }
}

impl From<&WeightsConfig> for Weights {
    fn from(config: &WeightsConfig) -> Self {
        Weights {
            category_match: config.category_match,
            location_proximity: config.location_proximity,
            environmental_impact: config.environmental_impact,
            condition_compatibility: config.condition_compatibility,
            value_range_overlap: config.value_range_overlap,
            urgency: config.urgency,
            user_compatibility: config.user_compatibility,
        }
    }
}

fn default_category_weight() -> f64 { 0.25 }
fn default_location_weight() -> f64 { 0.20 }
fn default_impact_weight() -> f64 { 0.15 }
fn default_condition_weight() -> f64 { 0.10 }
fn default_value_weight() -> f64 { 0.10 }
fn default_urgency_weight() -> f64 { 0.05 }
fn default_user_weight() -> f64 { 0.15 }

/// Admin token verification
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// HS256 secret shared with the WordPress side
    pub jwt_secret: String,
    #[serde(default = "default_admin_role")]
    pub admin_role: String,
}

fn default_admin_role() -> String { "administrator".to_string() }

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
    /// 3. Environment variables (prefixed with EXCHANGE__)
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = Config::builder()
            // Add default config file
            .add_source(File::with_name("config/default").required(false))
            // Add local config file (for development overrides)
            .add_source(File::with_name("config/local").required(false))
            // e.g., EXCHANGE__SERVER__PORT -> server.port
            .add_source(env_source())
            .build()?;

        settings = substitute_env_vars(settings)?;

        settings.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(env_source())
            .build()?;

        settings.try_deserialize()
    }

    pub fn default_weights(&self) -> Weights {
        Weights::from(&self.scoring.weights)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("EXCHANGE")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

/// Apply the conventional unprefixed variables on top of loaded settings
///
/// `DATABASE_URL`, `REDIS_URL` and `JWT_SECRET` are what the deployment
/// tooling exports; they win over file values.
fn substitute_env_vars(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let mut builder = Config::builder().add_source(settings);

    for (var, key) in [
        ("DATABASE_URL", "database.url"),
        ("REDIS_URL", "cache.redis_url"),
        ("JWT_SECRET", "auth.jwt_secret"),
        ("WP_APPLICATION_PASSWORD", "listings.application_password"),
    ] {
        if let Ok(value) = env::var(var) {
            builder = builder.set_override(key, value)?;
        }
    }

    builder.build()
}
