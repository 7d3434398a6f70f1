//! Configuration management for warplog
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files. A single [`Config`] is built at startup and passed
//! down to every component; nothing here is process-global.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Endpoint name of the regular history API
pub const DEFAULT_ENDPOINT: &str = "getGachaLog";

/// Endpoint name used by collaboration banners
pub const COLLABORATION_ENDPOINT: &str = "getLdGachaLog";

/// Page size the history API pages by
pub const HISTORY_PAGE_SIZE: u32 = 20;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Remote API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Link discovery configuration
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Persisted store configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Banners to fetch, in fetch order
    #[serde(default = "default_banners")]
    pub banners: Vec<BannerSpec>,
}

/// Remote history API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Language code sent with every page request
    pub lang: String,

    /// Records per page; the history API serves exactly this many
    pub page_size: u32,

    /// Pause after every page, in milliseconds
    pub page_delay_ms: u64,

    /// Pause after every banner, in milliseconds
    pub category_delay_ms: u64,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Timeout of the validation probe in seconds
    pub probe_timeout_secs: u64,

    /// Banner id used by the validation probe
    pub probe_gacha_type: String,

    /// Page size used by the validation probe
    pub probe_page_size: u32,

    /// Endpoint variant used when a banner names none, and as the fallback
    /// for alternate-eligible banners
    pub default_endpoint: String,

    /// User agent string
    pub user_agent: String,
}

/// One entry of the banner table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerSpec {
    /// `gacha_type` sent to the API, also the store key
    pub id: String,

    /// Display name
    pub name: String,

    /// Endpoint variant tried first; `None` means the default endpoint
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Retry the whole run on the default endpoint when the primary one is empty
    #[serde(default)]
    pub alternate_eligible: bool,
}

impl BannerSpec {
    /// Banner served by the default endpoint
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            endpoint: None,
            alternate_eligible: false,
        }
    }

    /// Banner whose primary endpoint differs from the default one
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>, alternate_eligible: bool) -> Self {
        self.endpoint = Some(endpoint.into());
        self.alternate_eligible = alternate_eligible;
        self
    }

    /// Endpoint variant tried first
    pub fn primary_endpoint<'a>(&'a self, default: &'a str) -> &'a str {
        self.endpoint.as_deref().unwrap_or(default)
    }
}

/// Link discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Registry keys scanned for string values holding the link
    pub registry_keys: Vec<String>,

    /// Candidate game log files; a leading `~` is the user's home directory
    pub log_paths: Vec<String>,

    /// Marker identifying the history endpoint in text artifacts
    pub endpoint_marker: String,

    /// Markers accepted inside the web cache
    pub cache_markers: Vec<String>,

    /// Delimiter separating entries of the web cache data file
    pub cache_delimiter: String,

    /// How many leading log lines are searched for the install path
    pub header_scan_lines: usize,

    /// Try copy utilities when the cache file is locked
    pub copy_fallback: bool,
}

/// Persisted store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file holding every banner's history
    pub store_path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables over the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(lang) = std::env::var("WARPLOG_LANG") {
            config.api.lang = lang;
        }

        if let Some(delay) = env_parse::<u64>("WARPLOG_PAGE_DELAY_MS") {
            config.api.page_delay_ms = delay;
        }

        if let Some(delay) = env_parse::<u64>("WARPLOG_CATEGORY_DELAY_MS") {
            config.api.category_delay_ms = delay;
        }

        if let Some(timeout) = env_parse::<u64>("WARPLOG_REQUEST_TIMEOUT") {
            config.api.request_timeout_secs = timeout;
        }

        if let Ok(path) = std::env::var("WARPLOG_STORE_PATH") {
            config.storage.store_path = PathBuf::from(path);
        }

        if let Ok(level) = std::env::var("WARPLOG_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Ok(format) = std::env::var("WARPLOG_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.api.page_size != HISTORY_PAGE_SIZE {
            anyhow::bail!("page_size must be {HISTORY_PAGE_SIZE}");
        }

        if self.api.probe_page_size == 0 {
            anyhow::bail!("probe_page_size must be greater than 0");
        }

        if self.api.request_timeout_secs == 0 || self.api.probe_timeout_secs == 0 {
            anyhow::bail!("timeouts must be greater than 0");
        }

        if self.api.default_endpoint.is_empty() {
            anyhow::bail!("default_endpoint must not be empty");
        }

        if self.banners.is_empty() {
            anyhow::bail!("at least one banner must be configured");
        }

        let mut seen = HashSet::new();
        for banner in &self.banners {
            if banner.id.is_empty() {
                anyhow::bail!("banner ids must not be empty");
            }
            if !seen.insert(banner.id.as_str()) {
                anyhow::bail!("duplicate banner id: {}", banner.id);
            }
        }

        if self.discovery.endpoint_marker.is_empty() {
            anyhow::bail!("endpoint_marker must not be empty");
        }

        if self.discovery.cache_markers.iter().any(String::is_empty) {
            anyhow::bail!("cache_markers must not contain empty markers");
        }

        if self.discovery.cache_delimiter.is_empty() {
            anyhow::bail!("cache_delimiter must not be empty");
        }

        Ok(())
    }

    /// Look up a banner by id
    pub fn banner(&self, id: &str) -> Option<&BannerSpec> {
        self.banners.iter().find(|b| b.id == id)
    }
}

impl ApiConfig {
    /// Pause between pages
    #[must_use]
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    /// Pause between banners
    #[must_use]
    pub fn category_delay(&self) -> Duration {
        Duration::from_millis(self.category_delay_ms)
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Get probe timeout as Duration
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl DiscoveryConfig {
    /// Log paths with `~` expanded to the home directory
    pub fn resolved_log_paths(&self) -> Vec<PathBuf> {
        let home = dirs::home_dir();
        self.log_paths
            .iter()
            .map(|raw| match (raw.strip_prefix("~/"), &home) {
                (Some(rest), Some(home)) => home.join(rest),
                _ => PathBuf::from(raw),
            })
            .collect()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

/// Banner table used when the config file has none
pub fn default_banners() -> Vec<BannerSpec> {
    vec![
        BannerSpec::new("11", "Limited character"),
        BannerSpec::new("12", "Limited light cone"),
        BannerSpec::new("21", "Collaboration character")
            .with_endpoint(COLLABORATION_ENDPOINT, true),
        BannerSpec::new("22", "Collaboration light cone")
            .with_endpoint(COLLABORATION_ENDPOINT, true),
        BannerSpec::new("1", "Standard"),
        BannerSpec::new("2", "Beginner"),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            discovery: DiscoveryConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            banners: default_banners(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            lang: String::from("en"),
            page_size: HISTORY_PAGE_SIZE,
            page_delay_ms: 500,
            category_delay_ms: 1500,
            request_timeout_secs: 30,
            probe_timeout_secs: 15,
            probe_gacha_type: String::from("1"),
            probe_page_size: 5,
            default_endpoint: String::from(DEFAULT_ENDPOINT),
            user_agent: format!("warplog/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        let registry_keys = [
            r"HKCU\Software\miHoYo\崩坏：星穹铁道",
            r"HKCU\Software\miHoYo\Honkai: Star Rail",
            r"HKCU\Software\Cognosphere\Star Rail",
            r"HKCU\Software\HoYoverse\Star Rail",
        ];

        let mut log_paths = Vec::new();
        for file in ["Player.log", "Player-prev.log"] {
            for vendor in ["Cognosphere", "miHoYo", "HoYoverse"] {
                log_paths.push(format!("~/AppData/LocalLow/{vendor}/Star Rail/{file}"));
            }
        }

        Self {
            registry_keys: registry_keys.iter().map(|k| k.to_string()).collect(),
            log_paths,
            endpoint_marker: String::from(DEFAULT_ENDPOINT),
            cache_markers: vec![
                String::from(DEFAULT_ENDPOINT),
                String::from(COLLABORATION_ENDPOINT),
            ],
            cache_delimiter: String::from("1/0/"),
            header_scan_lines: 11,
            copy_fallback: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("gacha_records.json"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_page_size() {
        let mut config = Config::default();
        config.api.page_size = 0;
        assert!(config.validate().is_err());

        config.api.page_size = 21;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_page_size_pinned_to_api_page() {
        let mut config = Config::default();
        config.api.page_size = 10;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("page_size must be 20"));

        config.api.page_size = HISTORY_PAGE_SIZE;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_banner_rejected() {
        let mut config = Config::default();
        config.banners.push(BannerSpec::new("11", "Again"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_request_timeout_conversion() {
        let config = Config::default();
        assert_eq!(config.api.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.api.probe_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_default_banner_order_and_variants() {
        let config = Config::default();
        let ids: Vec<&str> = config.banners.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, ["11", "12", "21", "22", "1", "2"]);

        let collab = config.banner("21").unwrap();
        assert!(collab.alternate_eligible);
        assert_eq!(collab.primary_endpoint(DEFAULT_ENDPOINT), COLLABORATION_ENDPOINT);

        let standard = config.banner("1").unwrap();
        assert!(!standard.alternate_eligible);
        assert_eq!(standard.primary_endpoint(DEFAULT_ENDPOINT), DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [api]
            lang = "ko"

            [[banners]]
            id = "11"
            name = "Limited"
            "#,
        )
        .unwrap();

        assert_eq!(config.api.lang, "ko");
        assert_eq!(config.api.page_size, 20);
        assert_eq!(config.banners.len(), 1);
        assert!(config.banners[0].endpoint.is_none());
        assert_eq!(config.discovery.cache_delimiter, "1/0/");
    }

    #[test]
    fn test_log_paths_expand_home() {
        let discovery = DiscoveryConfig {
            log_paths: vec!["~/x/Player.log".to_string(), "/abs/Player.log".to_string()],
            ..Default::default()
        };
        let resolved = discovery.resolved_log_paths();
        assert_eq!(resolved[1], PathBuf::from("/abs/Player.log"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(resolved[0], home.join("x/Player.log"));
        }
    }
}
