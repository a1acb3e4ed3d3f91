use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LIST_STALENESS_SECS: u64 = 300; // 5 minutes for lists
const DEFAULT_COUNT_STALENESS_SECS: u64 = 30; // 30 seconds for badge counts
const DEFAULT_REFERENCE_STALENESS_SECS: u64 = 1800; // 30 minutes for reference data
const DEFAULT_TRASH_RETENTION_DAYS: i64 = 7;
const DEFAULT_EVENT_BUFFER: usize = 256;
const CONFIG_DIR: &str = "config";

/// Remote gateway connection settings for the REST backend.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct GatewayConfig {
    /// Base URL of the row API, e.g. `https://project.example.co/rest/v1`
    #[validate(url(message = "gateway base_url must be a valid URL"))]
    pub base_url: String,

    /// API key sent as both `apikey` and bearer token headers.
    #[validate(length(min = 1, message = "gateway api_key must not be empty"))]
    pub api_key: String,
}

/// Configuration for the synchronization core.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Staleness threshold for list queries, in seconds.
    #[serde(default = "default_list_staleness")]
    #[validate(range(min = 1))]
    pub list_staleness_secs: u64,

    /// Staleness threshold for head-only badge counts, in seconds.
    #[serde(default = "default_count_staleness")]
    #[validate(range(min = 1))]
    pub count_staleness_secs: u64,

    /// Staleness threshold for rarely-changing reference data, in seconds.
    #[serde(default = "default_reference_staleness")]
    #[validate(range(min = 1))]
    pub reference_staleness_secs: u64,

    /// How long soft-deleted commissions stay visible in the trash view
    /// before becoming eligible for purge.
    #[serde(default = "default_trash_retention")]
    #[validate(range(min = 1))]
    pub trash_retention_days: i64,

    /// Buffer size of the in-process domain event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// REST gateway settings; absent when running against an embedded store.
    #[serde(default)]
    pub gateway: Option<GatewayConfig>,
}

fn default_list_staleness() -> u64 {
    DEFAULT_LIST_STALENESS_SECS
}
fn default_count_staleness() -> u64 {
    DEFAULT_COUNT_STALENESS_SECS
}
fn default_reference_staleness() -> u64 {
    DEFAULT_REFERENCE_STALENESS_SECS
}
fn default_trash_retention() -> i64 {
    DEFAULT_TRASH_RETENTION_DAYS
}
fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            list_staleness_secs: DEFAULT_LIST_STALENESS_SECS,
            count_staleness_secs: DEFAULT_COUNT_STALENESS_SECS,
            reference_staleness_secs: DEFAULT_REFERENCE_STALENESS_SECS,
            trash_retention_days: DEFAULT_TRASH_RETENTION_DAYS,
            event_buffer: DEFAULT_EVENT_BUFFER,
            gateway: None,
        }
    }
}

impl SyncConfig {
    /// Loads configuration from `config/sync.toml` (optional) with
    /// `COMMISSION_`-prefixed environment overrides, then validates it.
    pub fn load() -> Result<Self, ConfigError> {
        let cfg: SyncConfig = Config::builder()
            .add_source(File::with_name(&format!("{CONFIG_DIR}/sync")).required(false))
            .add_source(Environment::with_prefix("COMMISSION").separator("__"))
            .build()?
            .try_deserialize()?;

        cfg.validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;

        if let Some(gateway) = &cfg.gateway {
            gateway
                .validate()
                .map_err(|e| ConfigError::Message(e.to_string()))?;
        }

        Ok(cfg)
    }
}
