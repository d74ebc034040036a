//! Shared HTTP client for scraper traffic.
//!
//! One client serves every definition: connection pooling, redirect limits,
//! TLS policy and the driver cookie jar are global.

mod response;
mod user_agent;

pub use response::{FetchedBody, HttpResponse};
pub use user_agent::{resolve_user_agent, USER_AGENT};

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::{Client, Method, Proxy, RequestBuilder};

use crate::config::Config;
use crate::error::{Result, ScrapeError};
use crate::scrapers::context::ScrapeContext;
use crate::scrapers::definition::{CookieSet, HeaderEntry};

/// Total request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Redirects followed before a request fails.
pub const MAX_REDIRECTS: usize = 20;
/// Idle pooled connections kept per host.
pub const MAX_IDLE_PER_HOST: usize = 8;

/// Options for building an [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpClientOptions {
    /// Raw user agent setting, resolved with [`resolve_user_agent`].
    pub user_agent: Option<String>,
    pub cert_check: bool,
    pub proxy: Option<String>,
    pub timeout: Duration,
}

impl Default for HttpClientOptions {
    fn default() -> Self {
        Self {
            user_agent: None,
            cert_check: true,
            proxy: None,
            timeout: REQUEST_TIMEOUT,
        }
    }
}

impl From<&Config> for HttpClientOptions {
    fn from(config: &Config) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            cert_check: config.scraper_cert_check,
            proxy: config.proxy.clone(),
            timeout: REQUEST_TIMEOUT,
        }
    }
}

/// HTTP client with a shared cookie jar.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    cookies: Arc<Jar>,
    user_agent: String,
}

impl HttpClient {
    pub fn new(options: &HttpClientOptions) -> Result<Self> {
        let user_agent = resolve_user_agent(options.user_agent.as_deref());
        let cookies = Arc::new(Jar::default());

        let mut builder = Client::builder()
            .user_agent(&user_agent)
            .timeout(options.timeout)
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .danger_accept_invalid_certs(!options.cert_check)
            .cookie_provider(cookies.clone());

        if let Some(proxy) = options.proxy.as_deref().filter(|p| !p.is_empty()) {
            let proxy = Proxy::all(proxy)
                .map_err(|e| ScrapeError::Configuration(format!("invalid proxy {}: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ScrapeError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            cookies,
            user_agent,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&HttpClientOptions::from(config))
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Add driver cookies to the shared jar, keyed by their cookie URL.
    pub fn add_cookies(&self, sets: &[CookieSet]) {
        for set in sets {
            let url = match url::Url::parse(&set.cookie_url) {
                Ok(u) => u,
                Err(e) => {
                    tracing::warn!("Skipping cookies for invalid URL {}: {}", set.cookie_url, e);
                    continue;
                }
            };
            for cookie in &set.cookies {
                let mut line = format!("{}={}", cookie.name, cookie.value);
                if let Some(domain) = cookie.domain.as_deref().filter(|d| !d.is_empty()) {
                    line.push_str(&format!("; Domain={}", domain));
                }
                line.push_str(&format!("; Path={}", cookie.path.as_deref().unwrap_or("/")));
                self.cookies.add_cookie_str(&line, &url);
            }
        }
    }

    fn request(&self, method: Method, url: &str, headers: &[HeaderEntry]) -> RequestBuilder {
        let mut request = self.client.request(method, url);
        for header in headers {
            request = request.header(header.key.as_str(), header.value.as_str());
        }
        request
    }

    async fn send(&self, ctx: &ScrapeContext, url: &str, request: RequestBuilder) -> Result<HttpResponse> {
        tracing::debug!("Fetching {}", url);
        let response = ctx.run(async { Ok(request.send().await?) }).await?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(ScrapeError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(HttpResponse::new(response))
    }

    /// GET `url` with extra headers. Statuses of 400 and above are errors.
    pub async fn get(
        &self,
        ctx: &ScrapeContext,
        url: &str,
        headers: &[HeaderEntry],
    ) -> Result<HttpResponse> {
        let request = self.request(Method::GET, url, headers);
        self.send(ctx, url, request).await
    }

    /// GET `url` and read the whole body.
    pub async fn get_body(
        &self,
        ctx: &ScrapeContext,
        url: &str,
        headers: &[HeaderEntry],
    ) -> Result<FetchedBody> {
        let response = self.get(ctx, url, headers).await?;
        ctx.run(response.into_body()).await
    }

    /// POST a JSON body.
    pub async fn post_json(
        &self,
        ctx: &ScrapeContext,
        url: &str,
        body: &serde_json::Value,
        headers: &[HeaderEntry],
    ) -> Result<HttpResponse> {
        let request = self.request(Method::POST, url, headers).json(body);
        self.send(ctx, url, request).await
    }
}
