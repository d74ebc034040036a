//! Queryable documents and the loader that fetches them.
//!
//! A [`Document`] is either parsed JSON (queried with gjson-style paths) or
//! an HTML arena (queried with XPath). Queries never fail: a selector that
//! does not parse is logged and matches nothing.

pub mod json;
pub mod markup;
mod xpath;

pub use markup::MarkupDocument;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::config::DEFAULT_MAX_SUBSCRAPE_DEPTH;
use crate::error::{Result, ScrapeError};
use crate::scrapers::browser::{self, BrowserOptions};
use crate::scrapers::context::ScrapeContext;
use crate::scrapers::definition::{DriverOptions, HeaderEntry};
use crate::scrapers::http_client::HttpClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Markup,
    Json,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Markup => "markup",
            DocumentKind::Json => "json",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Document {
    Json(serde_json::Value),
    Markup(MarkupDocument),
}

impl Document {
    /// Parse a fetched body.
    ///
    /// JSON must parse. Markup must be UTF-8 text and must not sniff as a
    /// binary format.
    pub fn from_bytes(kind: DocumentKind, body: &[u8], mime: Option<&str>) -> Result<Self> {
        match kind {
            DocumentKind::Json => serde_json::from_slice(body)
                .map(Document::Json)
                .map_err(|e| ScrapeError::InvalidDocument(format!("invalid JSON: {}", e))),
            DocumentKind::Markup => {
                if let Some(sniffed) = infer::get(body) {
                    if sniffed.matcher_type() != infer::MatcherType::Text {
                        return Err(ScrapeError::InvalidDocument(format!(
                            "expected markup, got {}",
                            sniffed.mime_type()
                        )));
                    }
                }
                let text = std::str::from_utf8(body).map_err(|e| {
                    ScrapeError::InvalidDocument(format!(
                        "markup{} is not valid UTF-8: {}",
                        mime.map(|m| format!(" ({})", m)).unwrap_or_default(),
                        e
                    ))
                })?;
                Ok(Document::Markup(MarkupDocument::parse(text)))
            }
        }
    }

    pub fn parse_json(text: &str) -> Result<Self> {
        Self::from_bytes(DocumentKind::Json, text.as_bytes(), None)
    }

    pub fn parse_markup(text: &str) -> Self {
        Document::Markup(MarkupDocument::parse(text))
    }

    pub fn kind(&self) -> DocumentKind {
        match self {
            Document::Json(_) => DocumentKind::Json,
            Document::Markup(_) => DocumentKind::Markup,
        }
    }

    /// Every non-empty text matched by `selector`.
    pub fn query(&self, selector: &str) -> Vec<String> {
        match self {
            Document::Json(value) => json::query(value, selector),
            Document::Markup(doc) => doc.query(selector).unwrap_or_else(|e| {
                warn!("Error parsing xpath expression '{}': {}", selector, e);
                Vec::new()
            }),
        }
    }

    pub fn render(&self) -> String {
        match self {
            Document::Json(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            Document::Markup(doc) => doc.render(),
        }
    }
}

/// Whether a document is a single record page or a search results page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Scrape,
    Search,
}

/// Fetches documents for one outer scrape.
///
/// Sub-documents are cached by URL for the lifetime of the loader, so
/// several fields sub-scraping the same page fetch it once.
/// Cycles are detected per document against its chain of ancestors.
pub struct DocumentLoader {
    kind: DocumentKind,
    http: HttpClient,
    browser: Option<BrowserOptions>,
    headers: Vec<HeaderEntry>,
    ctx: ScrapeContext,
    max_depth: usize,
    print_html: bool,
    fetched: Mutex<HashMap<String, Document>>,
}

impl DocumentLoader {
    pub fn new(kind: DocumentKind, http: HttpClient, ctx: ScrapeContext) -> Self {
        Self {
            kind,
            http,
            browser: None,
            headers: Vec::new(),
            ctx,
            max_depth: DEFAULT_MAX_SUBSCRAPE_DEPTH,
            print_html: false,
            fetched: Mutex::new(HashMap::new()),
        }
    }

    /// Apply a definition's driver settings. `browser` is the global
    /// browser setup, used only when the driver asks for CDP.
    pub fn with_driver(mut self, driver: Option<&DriverOptions>, browser: BrowserOptions) -> Self {
        let Some(driver) = driver else {
            return self;
        };

        if driver.use_cdp {
            self.browser = Some(browser.with_driver(driver));
        } else {
            self.http.add_cookies(&driver.cookies);
        }
        self.headers = driver.headers.clone();
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_print_html(mut self, print_html: bool) -> Self {
        self.print_html = print_html;
        self
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn context(&self) -> &ScrapeContext {
        &self.ctx
    }

    fn cached(&self, url: &str) -> Option<Document> {
        match self.fetched.lock() {
            Ok(fetched) => fetched.get(url).cloned(),
            Err(poisoned) => poisoned.into_inner().get(url).cloned(),
        }
    }

    fn remember(&self, url: &str, doc: &Document) {
        let mut fetched = match self.fetched.lock() {
            Ok(fetched) => fetched,
            Err(poisoned) => poisoned.into_inner(),
        };
        fetched.insert(url.to_string(), doc.clone());
    }

    /// Fetch a sub-document, reusing an earlier fetch of the same URL.
    async fn fetch_cached(&self, url: &str) -> Result<Document> {
        if let Some(doc) = self.cached(url) {
            debug!("Reusing sub-document {}", url);
            return Ok(doc);
        }
        let doc = self.fetch(url).await?;
        self.remember(url, &doc);
        Ok(doc)
    }

    async fn fetch(&self, url: &str) -> Result<Document> {
        info!("Loading URL: {}", url);

        let doc = match &self.browser {
            Some(options) => {
                let html = browser::fetch_page(&self.ctx, url, options).await?;
                Document::from_bytes(self.kind, html.as_bytes(), Some("text/html"))?
            }
            None => {
                let fetched = self.http.get_body(&self.ctx, url, &self.headers).await?;
                Document::from_bytes(self.kind, &fetched.body, fetched.mime_type.as_deref())?
            }
        };

        if self.print_html {
            info!("loaded {} document from {}:\n{}", self.kind.as_str(), url, doc.render());
        }

        Ok(doc)
    }

    /// Fetch the top-level document of a scrape.
    pub async fn load(self: &Arc<Self>, url: &str, query_type: QueryType) -> Result<LoadedDocument> {
        let doc = self.fetch(url).await?;
        Ok(self.wrap(url, doc, query_type))
    }

    /// Attach an already parsed document to this loader.
    pub fn wrap(self: &Arc<Self>, url: &str, doc: Document, query_type: QueryType) -> LoadedDocument {
        LoadedDocument {
            url: url.to_string(),
            doc,
            query_type,
            loader: Some(self.clone()),
            ancestors: Arc::new(Vec::new()),
        }
    }
}

/// A document together with where it came from.
pub struct LoadedDocument {
    url: String,
    doc: Document,
    query_type: QueryType,
    loader: Option<Arc<DocumentLoader>>,
    /// URLs of the documents this one was sub-scraped from, outermost first.
    ancestors: Arc<Vec<String>>,
}

impl std::fmt::Debug for LoadedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedDocument")
            .field("url", &self.url)
            .field("query_type", &self.query_type)
            .field("ancestors", &self.ancestors)
            .finish_non_exhaustive()
    }
}

impl LoadedDocument {
    /// A document with no loader. Sub-queries from it fail.
    pub fn detached(url: impl Into<String>, doc: Document, query_type: QueryType) -> Self {
        Self {
            url: url.into(),
            doc,
            query_type,
            loader: None,
            ancestors: Arc::new(Vec::new()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn query(&self, selector: &str) -> Vec<String> {
        self.doc.query(selector)
    }

    pub fn is_search(&self) -> bool {
        self.query_type == QueryType::Search
    }

    /// Fetch `url` through the same loader, as a document of the same kind.
    pub async fn sub_query(&self, url: &str) -> Result<LoadedDocument> {
        let Some(loader) = self.loader.as_ref() else {
            return Err(ScrapeError::NotSupported(
                "sub-scraping needs a document loader".to_string(),
            ));
        };

        let url = resolve_url(&self.url, url);
        let depth = self.ancestors.len() + 1;
        if depth > loader.max_depth {
            return Err(ScrapeError::NotSupported(format!(
                "sub-scrape depth limit {} reached at {}",
                loader.max_depth, url
            )));
        }
        if url == self.url || self.ancestors.iter().any(|a| *a == url) {
            return Err(ScrapeError::NotSupported(format!(
                "sub-scrape cycle: {} is already being scraped",
                url
            )));
        }

        debug!("Sub-query {} at depth {}", url, depth);
        let doc = loader.fetch_cached(&url).await?;
        let mut ancestors = Vec::with_capacity(depth);
        ancestors.extend(self.ancestors.iter().cloned());
        ancestors.push(self.url.clone());
        Ok(LoadedDocument {
            url,
            doc,
            query_type: self.query_type,
            loader: Some(loader.clone()),
            ancestors: Arc::new(ancestors),
        })
    }

    /// Like [`LoadedDocument::sub_query`], logging failures.
    pub async fn sub_document(&self, url: &str) -> Option<LoadedDocument> {
        match self.sub_query(url).await {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!("Error getting URL '{}' for sub-scraper: {}", url, e);
                None
            }
        }
    }
}

/// Resolve a possibly relative link against the document URL.
fn resolve_url(base: &str, link: &str) -> String {
    if url::Url::parse(link).is_ok() {
        return link.to_string();
    }
    url::Url::parse(base)
        .and_then(|b| b.join(link))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| link.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::http_client::HttpClientOptions;

    fn loader(max_depth: usize) -> Arc<DocumentLoader> {
        let http = HttpClient::new(&HttpClientOptions::default()).unwrap();
        Arc::new(
            DocumentLoader::new(DocumentKind::Markup, http, ScrapeContext::new())
                .with_max_depth(max_depth),
        )
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let err = Document::parse_json("{\"a\": ").unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidDocument(_)));
    }

    #[test]
    fn test_binary_markup_is_rejected() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        let err = Document::from_bytes(DocumentKind::Markup, &png, Some("image/png")).unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidDocument(_)));

        let err = Document::from_bytes(DocumentKind::Markup, &[0xff, 0xfe, 0x41], None).unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidDocument(_)));
    }

    #[test]
    fn test_bad_selector_matches_nothing() {
        let doc = Document::parse_markup("<html><body><h1>x</h1></body></html>");
        assert!(doc.query("//h1[").is_empty());
        assert_eq!(doc.query("//h1"), vec!["x"]);
    }

    #[test]
    fn test_resolve_relative_links() {
        assert_eq!(
            resolve_url("https://site.example/scenes/1", "/performers/2"),
            "https://site.example/performers/2"
        );
        assert_eq!(
            resolve_url("https://site.example/a", "https://other.example/b"),
            "https://other.example/b"
        );
    }

    #[tokio::test]
    async fn test_detached_document_cannot_sub_query() {
        let doc = LoadedDocument::detached("https://site.example", Document::parse_markup(""), QueryType::Scrape);
        assert!(doc.sub_document("https://site.example/x").await.is_none());
    }

    #[tokio::test]
    async fn test_sub_query_depth_limit() {
        let loader = loader(0);
        let doc = loader.wrap("https://site.example/a", Document::parse_markup(""), QueryType::Scrape);
        let err = doc.sub_query("https://site.example/b").await.unwrap_err();
        assert!(err.to_string().contains("depth limit"));
    }

    #[tokio::test]
    async fn test_sub_query_rejects_cycles() {
        let loader = loader(3);
        loader.remember("https://site.example/b", &Document::parse_markup("<p>b</p>"));

        let doc = loader.wrap("https://site.example/a", Document::parse_markup(""), QueryType::Search);
        assert!(doc.is_search());
        let err = doc.sub_query("https://site.example/a").await.unwrap_err();
        assert!(err.to_string().contains("cycle"));

        let child = doc.sub_query("/b").await.unwrap();
        let err = child.sub_query("https://site.example/a").await.unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[tokio::test]
    async fn test_sibling_sub_queries_share_a_url() {
        let loader = loader(3);
        loader.remember("https://site.example/info", &Document::parse_markup("<p>Det</p>"));
        let doc = loader.wrap("https://site.example/scene", Document::parse_markup(""), QueryType::Scrape);

        let first = doc.sub_query("/info").await.unwrap();
        let second = doc.sub_query("/info").await.unwrap();
        assert_eq!(first.query("//p"), vec!["Det"]);
        assert_eq!(second.query("//p"), vec!["Det"]);
    }
}
