//! Global configuration for the scraper engine.
//!
//! Loaded from a TOML, YAML or JSON file (by extension), then overridden by
//! `METASCRAPE_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScrapeError};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "METASCRAPE_CONFIG";

/// Default maximum nesting of sub-scraper fetches.
pub const DEFAULT_MAX_SUBSCRAPE_DEPTH: usize = 3;

fn default_true() -> bool {
    true
}

fn default_max_subscrape_depth() -> usize {
    DEFAULT_MAX_SUBSCRAPE_DEPTH
}

fn default_scrapers_path() -> String {
    dirs::config_dir()
        .map(|d| d.join("metascrape").join("scrapers"))
        .unwrap_or_else(|| PathBuf::from("scrapers"))
        .to_string_lossy()
        .into_owned()
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory scanned (recursively) for `*.yml` definitions.
    #[serde(default = "default_scrapers_path")]
    pub scrapers_path: String,

    /// User agent for HTTP and browser fetches. `"firefox"` and `"chrome"`
    /// select a desktop browser string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Verify TLS certificates of scraped sites.
    #[serde(default = "default_true")]
    pub scraper_cert_check: bool,

    /// Chrome executable path, or an `http(s)://`/`ws://` endpoint of a
    /// running browser.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdp_path: Option<String>,

    /// Interpreter substituted for `python`/`python3` in script argv.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_path: Option<String>,

    /// Proxy URL for scraper HTTP traffic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,

    /// Case-insensitive regexes; matching scraped tag names are dropped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_tag_patterns: Vec<String>,

    #[serde(default = "default_max_subscrape_depth")]
    pub max_subscrape_depth: usize,

    /// Per-request deadline in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,

    /// File this config was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scrapers_path: default_scrapers_path(),
            user_agent: None,
            scraper_cert_check: true,
            cdp_path: None,
            python_path: None,
            proxy: None,
            exclude_tag_patterns: Vec::new(),
            max_subscrape_depth: DEFAULT_MAX_SUBSCRAPE_DEPTH,
            request_timeout: None,
            source_path: None,
        }
    }
}

impl Config {
    /// Discover and load configuration.
    ///
    /// Priority: explicit path, then `METASCRAPE_CONFIG`, then
    /// `<config_dir>/metascrape/config.toml`, then defaults. Environment
    /// overrides are applied last in every case.
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let config = if let Some(path) = explicit {
            Self::load_from_path(path).await?
        } else if let Some(path) = std::env::var(CONFIG_ENV).ok().filter(|s| !s.is_empty()) {
            tracing::debug!("Using {} from environment: {}", CONFIG_ENV, path);
            let expanded = shellexpand::tilde(&path);
            Self::load_from_path(Path::new(expanded.as_ref())).await?
        } else if let Some(path) = default_config_file().filter(|p| p.exists()) {
            tracing::debug!("Found config at {}", path.display());
            Self::load_from_path(&path).await?
        } else {
            Self::default()
        };

        Ok(config.with_env_overrides())
    }

    /// Load configuration from a specific file path.
    pub async fn load_from_path(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            ScrapeError::Configuration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| {
                ScrapeError::Configuration(format!("Failed to parse TOML config: {}", e))
            })?,
            "yaml" | "yml" => serde_yaml::from_str(&contents).map_err(|e| {
                ScrapeError::Configuration(format!("Failed to parse YAML config: {}", e))
            })?,
            _ => serde_json::from_str(&contents).map_err(|e| {
                ScrapeError::Configuration(format!("Failed to parse JSON config: {}", e))
            })?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Apply `METASCRAPE_*` environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|s| !s.is_empty());

        if let Some(path) = get("METASCRAPE_SCRAPERS_PATH") {
            tracing::debug!("Using METASCRAPE_SCRAPERS_PATH from environment: {}", path);
            self.scrapers_path = path;
        }
        if let Some(ua) = get("METASCRAPE_USER_AGENT") {
            self.user_agent = Some(ua);
        }
        if let Some(cdp) = get("METASCRAPE_CDP_PATH") {
            tracing::debug!("Using METASCRAPE_CDP_PATH from environment: {}", cdp);
            self.cdp_path = Some(cdp);
        }
        if let Some(python) = get("METASCRAPE_PYTHON_PATH") {
            self.python_path = Some(python);
        }
        if let Some(proxy) = get("METASCRAPE_PROXY") {
            tracing::debug!("Using METASCRAPE_PROXY from environment: {}", proxy);
            self.proxy = Some(proxy);
        }
        if get("METASCRAPE_NO_CERT_CHECK")
            .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        {
            self.scraper_cert_check = false;
        }
        if let Some(secs) = get("METASCRAPE_REQUEST_TIMEOUT").and_then(|s| s.parse().ok()) {
            self.request_timeout = Some(secs);
        }

        self
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Definitions directory, resolved against the config file location.
    pub fn scrapers_dir(&self) -> PathBuf {
        let base = self
            .base_dir()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        self.resolve_path(&self.scrapers_path, &base)
    }

    pub fn request_deadline(&self) -> Option<Duration> {
        self.request_timeout.map(Duration::from_secs)
    }
}

fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("metascrape").join("config.toml"))
}
