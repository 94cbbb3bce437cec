/*!
 * Configuration support for the pricing lookup library
 *
 * A configuration value is resolved once at startup and passed into the
 * API clients and sessions that need it. There is no process-wide config.
 */

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::constants::{DEBOUNCE_MS, PAGE_SIZE, SCROLL_THRESHOLD_PX};
use crate::schema::RecordPolicy;

/// Configuration for API clients and search sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RxConfig {
    /// Base URL of the pricing API, e.g. `https://api.example.com`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for HTTP requests in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Custom user agent string
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Page size for paginated lookups
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Quiet period before a typed query is sent, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Distance from the bottom of a suggestion list that triggers the next page
    #[serde(default = "default_scroll_threshold")]
    pub scroll_threshold_px: u32,

    /// Drop malformed records from list responses instead of failing them
    #[serde(default)]
    pub skip_invalid_records: bool,

    /// Bearer-token settings for authenticated endpoints
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Authenticated API settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Attach bearer tokens to requests
    #[serde(default)]
    pub enabled: bool,

    /// Path of the refresh-token endpoint
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            refresh_path: default_refresh_path(),
        }
    }
}

impl Default for RxConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
            user_agent: Some(format!("rxlookup/{}", env!("CARGO_PKG_VERSION"))),
            page_size: default_page_size(),
            debounce_ms: default_debounce_ms(),
            scroll_threshold_px: default_scroll_threshold(),
            skip_invalid_records: false,
            auth: AuthConfig::default(),
        }
    }
}

// Default value functions for serde
fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_page_size() -> usize {
    PAGE_SIZE
}

fn default_debounce_ms() -> u64 {
    DEBOUNCE_MS
}

fn default_scroll_threshold() -> u32 {
    SCROLL_THRESHOLD_PX
}

fn default_refresh_path() -> String {
    "/auth/refresh".to_string()
}

impl RxConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - `RXLOOKUP_BASE_URL`: API base URL
    /// - `RXLOOKUP_TIMEOUT`: request timeout in seconds
    /// - `RXLOOKUP_USER_AGENT`: user agent string
    /// - `RXLOOKUP_PAGE_SIZE`: number
    /// - `RXLOOKUP_DEBOUNCE_MS`: number
    /// - `RXLOOKUP_SKIP_INVALID`: "true" or "false"
    /// - `RXLOOKUP_AUTH`: "true" or "false"
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("RXLOOKUP_BASE_URL") {
            config.base_url = val;
        }

        if let Ok(val) = std::env::var("RXLOOKUP_TIMEOUT") {
            if let Ok(secs) = val.parse() {
                config.timeout_seconds = secs;
            }
        }

        if let Ok(val) = std::env::var("RXLOOKUP_USER_AGENT") {
            config.user_agent = Some(val);
        }

        if let Ok(val) = std::env::var("RXLOOKUP_PAGE_SIZE") {
            if let Ok(size) = val.parse() {
                config.page_size = size;
            }
        }

        if let Ok(val) = std::env::var("RXLOOKUP_DEBOUNCE_MS") {
            if let Ok(ms) = val.parse() {
                config.debounce_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("RXLOOKUP_SKIP_INVALID") {
            config.skip_invalid_records = val.to_lowercase() == "true";
        }

        if let Ok(val) = std::env::var("RXLOOKUP_AUTH") {
            config.auth.enabled = val.to_lowercase() == "true";
        }

        config
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| crate::RxError::Configuration {
                message: format!("Failed to parse config file: {}", e),
                suggestion: Some("Check that the file is valid TOML format".to_string()),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| crate::RxError::Configuration {
                message: format!("Failed to serialize config: {}", e),
                suggestion: None,
            })?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/rxlookup/config.toml` on Unix-like systems
    /// or `%APPDATA%\rxlookup\config.toml` on Windows
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "rxlookup")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from the default location, environment, or defaults
    ///
    /// Priority order:
    /// 1. Default config file (if exists)
    /// 2. Environment variables
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Some(config_path) = Self::default_config_path() {
            if config_path.exists() {
                match Self::from_file(&config_path) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!(path = %config_path.display(), error = %e, "ignoring unreadable config file"),
                }
            }
        }

        Self::from_env()
    }

    /// Reject values no session can work with
    pub fn validate(&self) -> crate::Result<()> {
        if self.page_size == 0 {
            return Err(crate::RxError::Configuration {
                message: "page_size must be greater than zero".to_string(),
                suggestion: Some("Use the default page size of 20".to_string()),
            });
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(crate::RxError::Configuration {
                message: format!("base_url '{}' is not an http(s) URL", self.base_url),
                suggestion: Some("Set base_url to e.g. https://api.example.com".to_string()),
            });
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn record_policy(&self) -> RecordPolicy {
        if self.skip_invalid_records {
            RecordPolicy::SkipInvalid
        } else {
            RecordPolicy::Strict
        }
    }

    /// Join an endpoint path onto the base URL
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

/// Builder for customizing configuration
#[derive(Default)]
pub struct ConfigBuilder {
    config: RxConfig,
}

impl ConfigBuilder {
    /// Start building a new configuration
    pub fn new() -> Self {
        Self {
            config: RxConfig::default(),
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn timeout_seconds(mut self, secs: u64) -> Self {
        self.config.timeout_seconds = secs;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(agent.into());
        self
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.config.page_size = size;
        self
    }

    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.config.debounce_ms = ms;
        self
    }

    pub fn skip_invalid_records(mut self, skip: bool) -> Self {
        self.config.skip_invalid_records = skip;
        self
    }

    pub fn auth(mut self, enabled: bool) -> Self {
        self.config.auth.enabled = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> RxConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = RxConfig::default();
        assert_eq!(config.page_size, 20);
        assert_eq!(config.debounce(), Duration::from_millis(300));
        assert!(!config.auth.enabled);
        assert_eq!(config.record_policy(), RecordPolicy::Strict);
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .base_url("https://pricing.example.com/")
            .page_size(50)
            .skip_invalid_records(true)
            .auth(true)
            .build();

        assert_eq!(config.page_size, 50);
        assert!(config.auth.enabled);
        assert_eq!(config.record_policy(), RecordPolicy::SkipInvalid);
        assert_eq!(
            config.endpoint_url("/drug/GetDetails"),
            "https://pricing.example.com/drug/GetDetails"
        );
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = ConfigBuilder::new().base_url("https://a.example").debounce_ms(150).build();
        config.save(&path).unwrap();
        assert_eq!(RxConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "base_url = \"https://b.example\"\n[auth]\nenabled = true\n").unwrap();
        let config = RxConfig::from_file(&path).unwrap();
        assert_eq!(config.base_url, "https://b.example");
        assert_eq!(config.page_size, 20);
        assert!(config.auth.enabled);
        assert_eq!(config.auth.refresh_path, "/auth/refresh");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "page_size = 0\n").unwrap();
        assert!(RxConfig::from_file(&path).is_err());
    }
}
