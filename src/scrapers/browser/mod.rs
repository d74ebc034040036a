//! Browser-based fetching for pages that need JavaScript.
//!
//! Each fetch gets a fresh browser over CDP, either launched locally or
//! connected to a running instance, and tears it down afterwards. Dropping a
//! fetch part way (cancellation or deadline) still closes its page and stops
//! the CDP event loop.

mod config;
mod cookies;

pub use config::{BrowserOptions, CdpEndpoint, DEFAULT_SLEEP};
pub use cookies::{browser_cookies, BrowserCookie};

use crate::error::{Result, ScrapeError};
use crate::scrapers::context::ScrapeContext;

/// Fetch `url` in a browser and return the serialised DOM.
pub async fn fetch_page(ctx: &ScrapeContext, url: &str, options: &BrowserOptions) -> Result<String> {
    ctx.run(async {
        fetch::fetch(url, options)
            .await
            .map_err(|e| ScrapeError::Browser(format!("{:#}", e)))
    })
    .await
}

#[cfg(feature = "browser")]
mod fetch {
    use std::collections::HashMap;

    use anyhow::{Context, Result};
    use chromiumoxide::cdp::browser_protocol::network::{
        Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
    };
    use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
    use chromiumoxide::{Browser, BrowserConfig, Page};
    use futures::future::BoxFuture;
    use futures::StreamExt;
    use tokio::task::JoinHandle;
    use tracing::{debug, info};

    use super::cookies::inject_cookies;
    use super::{browser_cookies, BrowserOptions, CdpEndpoint};

    /// Stops the CDP event loop when dropped, after running any pending
    /// cleanup on the runtime.
    struct Teardown {
        handler: Option<JoinHandle<()>>,
        cleanup: Option<BoxFuture<'static, ()>>,
    }

    impl Teardown {
        fn new(handler: JoinHandle<()>) -> Self {
            Self {
                handler: Some(handler),
                cleanup: None,
            }
        }

        fn track_page(&mut self, page: &Page) {
            let page = page.clone();
            self.cleanup = Some(Box::pin(async move {
                let _ = page.close().await;
            }));
        }

        fn clear_cleanup(&mut self) {
            self.cleanup = None;
        }
    }

    impl Drop for Teardown {
        fn drop(&mut self) {
            let Some(handler) = self.handler.take() else {
                return;
            };
            let cleanup = self.cleanup.take();
            match (cleanup, tokio::runtime::Handle::try_current()) {
                (Some(cleanup), Ok(runtime)) => {
                    debug!("Closing abandoned browser page");
                    // the event loop has to keep running for the close to be sent
                    runtime.spawn(async move {
                        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), cleanup).await;
                        handler.abort();
                    });
                }
                _ => handler.abort(),
            }
        }
    }

    /// A browser plus its CDP event loop.
    struct Session {
        browser: Browser,
        teardown: Teardown,
        launched: bool,
    }

    impl Session {
        async fn open(options: &BrowserOptions) -> Result<Self> {
            match CdpEndpoint::resolve(options.cdp_path.as_deref())? {
                CdpEndpoint::Launch(path) => Self::launch(path, options).await,
                CdpEndpoint::RemoteHttp(http_url) => {
                    let ws_url = discover_ws_url(&http_url).await?;
                    Self::connect(&ws_url).await
                }
                CdpEndpoint::RemoteWs(ws_url) => Self::connect(&ws_url).await,
            }
        }

        async fn launch(path: std::path::PathBuf, options: &BrowserOptions) -> Result<Self> {
            info!("Launching browser {}", path.display());

            let mut builder = BrowserConfig::builder()
                .chrome_executable(path)
                .arg("--disable-blink-features=AutomationControlled")
                .arg("--disable-dev-shm-usage")
                .arg("--no-first-run")
                .arg("--no-default-browser-check")
                .arg("--no-sandbox")
                .arg("--disable-gpu");

            if let Some(proxy) = options.proxy.as_deref().filter(|p| !p.is_empty()) {
                builder = builder.arg(format!("--proxy-server={}", proxy));
            }

            let config = builder
                .build()
                .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;

            let (browser, mut handler) = Browser::launch(config)
                .await
                .context("Failed to launch browser")?;

            let handler = tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            Ok(Self {
                browser,
                teardown: Teardown::new(handler),
                launched: true,
            })
        }

        async fn connect(ws_url: &str) -> Result<Self> {
            info!("Connecting to remote browser at {}", ws_url);

            let (browser, mut handler) = Browser::connect(ws_url)
                .await
                .context("Failed to connect to remote browser")?;

            let handler = tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            Ok(Self {
                browser,
                teardown: Teardown::new(handler),
                launched: false,
            })
        }

        async fn close(mut self) {
            if self.launched {
                let _ = self.browser.close().await;
                let _ = self.browser.wait().await;
            }
            self.teardown.clear_cleanup();
        }
    }

    /// Read the websocket debugger URL from `<http_url>/json/version`.
    async fn discover_ws_url(http_url: &str) -> Result<String> {
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let resp: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .send()
            .await
            .context("Failed to connect to remote browser")?
            .json()
            .await
            .context("Failed to parse browser version info")?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("No webSocketDebuggerUrl in response"))?;

        debug!("Remote CDP instance found {}", ws_url);
        Ok(ws_url.to_string())
    }

    pub(super) async fn fetch(url: &str, options: &BrowserOptions) -> Result<String> {
        let mut session = Session::open(options).await?;
        let result = load(&mut session, url, options).await;
        session.close().await;
        result
    }

    async fn load(session: &mut Session, url: &str, options: &BrowserOptions) -> Result<String> {
        let page = session.browser.new_page("about:blank").await?;
        session.teardown.track_page(&page);

        page.execute(SetUserAgentOverrideParams::new(options.user_agent.clone()))
            .await?;

        if !options.headers.is_empty() {
            let headers: HashMap<&str, &str> = options
                .headers
                .iter()
                .map(|h| (h.key.as_str(), h.value.as_str()))
                .collect();
            page.execute(SetExtraHttpHeadersParams::new(Headers::new(serde_json::json!(headers))))
                .await?;
        }

        inject_cookies(&page, &browser_cookies(&options.cookies)).await;

        info!("Navigating to {}", url);
        let nav_params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| anyhow::anyhow!("Invalid URL: {}", e))?;
        page.execute(nav_params).await?;

        tokio::time::sleep(options.sleep).await;

        let content = page.content().await?;
        let _ = page.close().await;
        session.teardown.clear_cleanup();
        Ok(content)
    }

    #[cfg(test)]
    mod tests {
        use std::time::Duration;

        use tokio::sync::oneshot;

        use super::*;

        fn idle_handler() -> (JoinHandle<()>, oneshot::Receiver<()>) {
            let (alive, stopped) = oneshot::channel::<()>();
            let handler = tokio::spawn(async move {
                let _alive = alive;
                futures::future::pending::<()>().await;
            });
            (handler, stopped)
        }

        #[tokio::test]
        async fn test_dropped_teardown_stops_event_loop() {
            let (handler, stopped) = idle_handler();
            drop(Teardown::new(handler));
            let res = tokio::time::timeout(Duration::from_secs(1), stopped).await;
            assert!(res.expect("event loop still running").is_err());
        }

        #[tokio::test]
        async fn test_dropped_teardown_runs_cleanup_before_stopping() {
            let (handler, stopped) = idle_handler();
            let (closed_tx, closed_rx) = oneshot::channel();
            let mut teardown = Teardown::new(handler);
            teardown.cleanup = Some(Box::pin(async move {
                let _ = closed_tx.send(());
            }));
            drop(teardown);

            let closed = tokio::time::timeout(Duration::from_secs(1), closed_rx).await;
            assert!(closed.expect("cleanup never ran").is_ok());
            let res = tokio::time::timeout(Duration::from_secs(1), stopped).await;
            assert!(res.expect("event loop still running").is_err());
        }

        #[tokio::test]
        async fn test_cancelled_fetch_drops_teardown() {
            let (handler, stopped) = idle_handler();
            let teardown = Teardown::new(handler);
            let fetch = async move {
                let _teardown = teardown;
                futures::future::pending::<()>().await;
            };
            let res = tokio::time::timeout(Duration::from_millis(20), fetch).await;
            assert!(res.is_err());
            let res = tokio::time::timeout(Duration::from_secs(1), stopped).await;
            assert!(res.expect("event loop still running").is_err());
        }
    }
}

#[cfg(not(feature = "browser"))]
mod fetch {
    use anyhow::Result;

    use super::BrowserOptions;

    pub(super) async fn fetch(_url: &str, _options: &BrowserOptions) -> Result<String> {
        Err(anyhow::anyhow!(
            "Browser support not compiled. Rebuild with: cargo build --features browser"
        ))
    }
}
