//! Browser fetch options and CDP endpoint resolution.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scrapers::definition::{CookieSet, DriverOptions, HeaderEntry};

/// Settle time after navigation when the definition sets none.
pub const DEFAULT_SLEEP: Duration = Duration::from_secs(2);

/// Common Chrome executable paths to check.
const CHROME_PATHS: &[&str] = &[
    // Linux
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    // macOS
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    // Common install locations
    "/opt/google/chrome/google-chrome",
];

const CHROME_COMMANDS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];

/// Where to get a browser from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CdpEndpoint {
    /// Launch a local executable.
    Launch(PathBuf),
    /// HTTP endpoint of a running browser; the websocket URL is discovered
    /// through `/json/version`.
    RemoteHttp(String),
    /// Websocket debugger URL of a running browser.
    RemoteWs(String),
}

impl CdpEndpoint {
    /// Interpret the configured CDP path. With no setting a local Chrome is
    /// searched for.
    pub fn resolve(cdp_path: Option<&str>) -> anyhow::Result<Self> {
        match cdp_path.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) if p.starts_with("http://") || p.starts_with("https://") => {
                Ok(CdpEndpoint::RemoteHttp(p.trim_end_matches('/').to_string()))
            }
            Some(p) if p.starts_with("ws://") || p.starts_with("wss://") => {
                Ok(CdpEndpoint::RemoteWs(p.to_string()))
            }
            Some(p) => Ok(CdpEndpoint::Launch(PathBuf::from(p))),
            None => find_chrome().map(CdpEndpoint::Launch),
        }
    }
}

fn find_chrome() -> anyhow::Result<PathBuf> {
    for path in CHROME_PATHS {
        let p = Path::new(path);
        if p.exists() {
            tracing::debug!("Found Chrome at: {}", path);
            return Ok(p.to_path_buf());
        }
    }

    for cmd in CHROME_COMMANDS {
        if let Ok(path) = which::which(cmd) {
            tracing::debug!("Found Chrome in PATH: {}", path.display());
            return Ok(path);
        }
    }

    Err(anyhow::anyhow!(
        "Chrome/Chromium not found. Install it or set cdp_path to a browser executable or a remote CDP endpoint"
    ))
}

/// Everything one browser fetch needs.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub cdp_path: Option<String>,
    pub user_agent: String,
    pub proxy: Option<String>,
    pub sleep: Duration,
    pub cookies: Vec<CookieSet>,
    pub headers: Vec<HeaderEntry>,
}

impl BrowserOptions {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            cdp_path: None,
            user_agent: user_agent.into(),
            proxy: None,
            sleep: DEFAULT_SLEEP,
            cookies: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn with_cdp_path(mut self, cdp_path: Option<String>) -> Self {
        self.cdp_path = cdp_path;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Apply a definition's driver settings.
    pub fn with_driver(mut self, driver: &DriverOptions) -> Self {
        if let Some(secs) = driver.sleep.filter(|s| *s > 0) {
            self.sleep = Duration::from_secs(secs);
        }
        self.cookies = driver.cookies.clone();
        self.headers = driver.headers.clone();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_remote_endpoints() {
        assert_eq!(
            CdpEndpoint::resolve(Some("http://localhost:9222/")).unwrap(),
            CdpEndpoint::RemoteHttp("http://localhost:9222".to_string())
        );
        assert_eq!(
            CdpEndpoint::resolve(Some("ws://localhost:9222/devtools/browser/x")).unwrap(),
            CdpEndpoint::RemoteWs("ws://localhost:9222/devtools/browser/x".to_string())
        );
    }

    #[test]
    fn test_resolve_local_path() {
        assert_eq!(
            CdpEndpoint::resolve(Some("/opt/chrome/chrome")).unwrap(),
            CdpEndpoint::Launch(PathBuf::from("/opt/chrome/chrome"))
        );
    }

    #[test]
    fn test_driver_sleep_override() {
        let driver = DriverOptions {
            use_cdp: true,
            sleep: Some(5),
            ..Default::default()
        };
        let options = BrowserOptions::new("ua").with_driver(&driver);
        assert_eq!(options.sleep, Duration::from_secs(5));

        let options = BrowserOptions::new("ua").with_driver(&DriverOptions::default());
        assert_eq!(options.sleep, DEFAULT_SLEEP);
    }
}
