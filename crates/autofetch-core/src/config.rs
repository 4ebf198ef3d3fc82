use std::path::{Path, PathBuf};
use std::time::Duration;

use jsonschema::{validator_for, Validator};
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::orchestrator::LoopConfig;
use crate::util::env_bool;
use crate::watcher::WatcherConfig;

pub const DEFAULT_MAX_WAIT_SECS: u64 = 20;
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 150;
pub const DEFAULT_SESSION_REFRESH: u32 = 10;
pub const DEFAULT_DELAY_BETWEEN_SECS: f64 = 2.0;
pub const DEFAULT_WEBDRIVER_URL: &str = "http://127.0.0.1:9515";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Run settings. Every field is optional in the TOML file; accessors apply
/// the defaults.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FetchConfig {
    /// Directory downloads land in
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Text file with one address per line
    #[serde(default)]
    pub input_txt: Option<PathBuf>,
    /// Listing page scraped for addresses
    #[serde(default)]
    pub url: Option<String>,
    /// Maximum wait for page elements (seconds)
    #[serde(default)]
    #[schemars(range(min = 1))]
    pub max_wait_secs: Option<u64>,
    /// Maximum wait for a download to finish (seconds)
    #[serde(default)]
    #[schemars(range(min = 1))]
    pub download_timeout_secs: Option<u64>,
    /// Restart the session after this many successful downloads (0 disables)
    #[serde(default)]
    pub session_refresh: Option<u32>,
    /// Pause between addresses (seconds)
    #[serde(default)]
    #[schemars(range(min = 0.0))]
    pub delay_between_secs: Option<f64>,
    #[serde(default)]
    pub filter_downloads: Option<bool>,
    #[serde(default)]
    pub headless: Option<bool>,
    #[serde(default)]
    pub block_images: Option<bool>,
    #[serde(default)]
    #[schemars(range(min = 1))]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub temp_backoff_ms: Option<u64>,
    #[serde(default)]
    pub stability_checks: Option<u32>,
    #[serde(default)]
    pub stability_interval_ms: Option<u64>,
    /// Keep the loose substring pass when matching existing files
    #[serde(default)]
    pub substring_fallback: Option<bool>,
    /// Allow a HEAD request when the address alone does not name a file
    #[serde(default)]
    pub probe_headers: Option<bool>,
    #[serde(default)]
    pub webdriver_url: Option<String>,
}

static CONFIG_SCHEMA: Lazy<Validator> = Lazy::new(|| {
    let schema = schemars::schema_for!(FetchConfig);
    let schema_value = serde_json::to_value(&schema).expect("schema value");
    validator_for(&schema_value).expect("valid schema")
});

/// Returns the JSON schema describing the configuration file.
///
/// # Panics
///
/// Panics if schema generation fails; this indicates a programming error.
pub fn config_schema_json() -> serde_json::Value {
    let schema = schemars::schema_for!(FetchConfig);
    serde_json::to_value(&schema).expect("schema json")
}

pub fn parse_config(content: &str) -> Result<FetchConfig, ConfigError> {
    let raw: toml::Value = toml::from_str(content)?;
    let json_value =
        serde_json::to_value(&raw).map_err(|err| ConfigError::Invalid(err.to_string()))?;
    let validation_errors: Vec<_> = CONFIG_SCHEMA
        .iter_errors(&json_value)
        .map(|e| e.to_string())
        .collect();
    if !validation_errors.is_empty() {
        return Err(ConfigError::Invalid(validation_errors.join(", ")));
    }
    Ok(toml::from_str(content)?)
}

pub fn load_config(path: &Path) -> Result<FetchConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

impl FetchConfig {
    /// Fill unset fields from `other` (self wins).
    pub fn or(self, other: FetchConfig) -> FetchConfig {
        FetchConfig {
            output_dir: self.output_dir.or(other.output_dir),
            input_txt: self.input_txt.or(other.input_txt),
            url: self.url.or(other.url),
            max_wait_secs: self.max_wait_secs.or(other.max_wait_secs),
            download_timeout_secs: self.download_timeout_secs.or(other.download_timeout_secs),
            session_refresh: self.session_refresh.or(other.session_refresh),
            delay_between_secs: self.delay_between_secs.or(other.delay_between_secs),
            filter_downloads: self.filter_downloads.or(other.filter_downloads),
            headless: self.headless.or(other.headless),
            block_images: self.block_images.or(other.block_images),
            poll_interval_ms: self.poll_interval_ms.or(other.poll_interval_ms),
            temp_backoff_ms: self.temp_backoff_ms.or(other.temp_backoff_ms),
            stability_checks: self.stability_checks.or(other.stability_checks),
            stability_interval_ms: self.stability_interval_ms.or(other.stability_interval_ms),
            substring_fallback: self.substring_fallback.or(other.substring_fallback),
            probe_headers: self.probe_headers.or(other.probe_headers),
            webdriver_url: self.webdriver_url.or(other.webdriver_url),
        }
    }

    /// Settings taken from `AUTOFETCH_*` environment flags.
    pub fn from_env() -> FetchConfig {
        FetchConfig {
            headless: env_bool("AUTOFETCH_HEADLESS"),
            filter_downloads: env_bool("AUTOFETCH_FILTER_DOWNLOADS"),
            probe_headers: env_bool("AUTOFETCH_PROBE_HEADERS"),
            ..FetchConfig::default()
        }
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs.unwrap_or(DEFAULT_MAX_WAIT_SECS))
    }

    pub fn headless(&self) -> bool {
        self.headless.unwrap_or(false)
    }

    pub fn block_images(&self) -> bool {
        self.block_images.unwrap_or(true)
    }

    pub fn filter_downloads(&self) -> bool {
        self.filter_downloads.unwrap_or(false)
    }

    pub fn substring_fallback(&self) -> bool {
        self.substring_fallback.unwrap_or(true)
    }

    pub fn probe_headers(&self) -> bool {
        self.probe_headers.unwrap_or(true)
    }

    pub fn webdriver_url(&self) -> &str {
        self.webdriver_url.as_deref().unwrap_or(DEFAULT_WEBDRIVER_URL)
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        let defaults = WatcherConfig::default();
        WatcherConfig {
            timeout: self
                .download_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS)),
            poll_interval: self
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            temp_backoff: self
                .temp_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.temp_backoff),
            stability_checks: self.stability_checks.unwrap_or(defaults.stability_checks),
            stability_interval: self
                .stability_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.stability_interval),
        }
    }

    /// Fails when `delay_between_secs` cannot be represented as a duration
    /// (infinite or beyond `u64` seconds).
    pub fn loop_config(&self) -> Result<LoopConfig, ConfigError> {
        let secs = self
            .delay_between_secs
            .unwrap_or(DEFAULT_DELAY_BETWEEN_SECS)
            .max(0.0);
        let delay_between = Duration::try_from_secs_f64(secs).map_err(|err| {
            ConfigError::Invalid(format!("delay_between_secs = {secs}: {err}"))
        })?;
        Ok(LoopConfig {
            session_refresh: self.session_refresh.unwrap_or(DEFAULT_SESSION_REFRESH),
            delay_between,
            watcher: self.watcher_config(),
            ..LoopConfig::default()
        })
    }
}
