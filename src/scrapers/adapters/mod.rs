//! Backend adapters.
//!
//! Each [`AdapterAction`] variant implements some of the four scrape
//! capabilities. Dispatch is one function per capability, matching on the
//! action. Capabilities a variant lacks return `NotSupported`.

pub mod autotag;
mod document;
pub mod freeones;
mod script;
mod stash;

use std::sync::Arc;

use crate::catalog::{Catalog, StoredGallery, StoredScene};
use crate::config::Config;
use crate::error::{Result, ScrapeError};
use crate::models::{ContentType, Input, ScrapedContent};
use crate::scrapers::browser::BrowserOptions;
use crate::scrapers::context::ScrapeContext;
use crate::scrapers::definition::{AdapterAction, BuiltinKind, ScraperDefinition, StashServer};
use crate::scrapers::document::{DocumentKind, DocumentLoader};
use crate::scrapers::http_client::HttpClient;

/// Shared collaborators for every adapter call.
pub struct AdapterEnv {
    pub http: HttpClient,
    pub config: Config,
    pub catalog: Arc<dyn Catalog>,
}

impl AdapterEnv {
    pub fn new(http: HttpClient, config: Config, catalog: Arc<dyn Catalog>) -> Self {
        Self {
            http,
            config,
            catalog,
        }
    }

    pub fn browser_options(&self) -> BrowserOptions {
        BrowserOptions::new(self.http.user_agent())
            .with_cdp_path(self.config.cdp_path.clone())
            .with_proxy(self.config.proxy.clone())
    }
}

/// A stored catalog entity used to seed a scrape.
#[derive(Debug, Clone)]
pub enum StoredEntity {
    Scene(StoredScene),
    Gallery(StoredGallery),
}

impl StoredEntity {
    pub fn content_type(&self) -> ContentType {
        match self {
            StoredEntity::Scene(_) => ContentType::Scene,
            StoredEntity::Gallery(_) => ContentType::Gallery,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            StoredEntity::Scene(s) => s.path.as_deref(),
            StoredEntity::Gallery(g) => g.path.as_deref(),
        }
    }

    /// The entity's URL, falling back to the first of its URLs.
    pub fn url(&self) -> Option<&str> {
        let (url, urls) = match self {
            StoredEntity::Scene(s) => (s.url.as_ref(), &s.urls),
            StoredEntity::Gallery(g) => (g.url.as_ref(), &g.urls),
        };
        url.or(urls.first())
            .map(String::as_str)
            .filter(|u| !u.is_empty())
    }
}

/// One adapter invocation: the environment, the request and the definition.
pub struct AdapterCall<'a> {
    pub env: &'a AdapterEnv,
    pub ctx: &'a ScrapeContext,
    pub def: &'a ScraperDefinition,
}

impl<'a> AdapterCall<'a> {
    pub fn new(env: &'a AdapterEnv, ctx: &'a ScrapeContext, def: &'a ScraperDefinition) -> Self {
        Self { env, ctx, def }
    }

    fn loader(&self, kind: DocumentKind) -> Arc<DocumentLoader> {
        Arc::new(
            DocumentLoader::new(kind, self.env.http.clone(), self.ctx.clone())
                .with_driver(self.def.driver.as_ref(), self.env.browser_options())
                .with_max_depth(self.env.config.max_subscrape_depth)
                .with_print_html(self.def.debug.print_html),
        )
    }

    fn stash_server(&self) -> Result<&'a StashServer> {
        self.def.stash_server.as_ref().ok_or_else(|| {
            ScrapeError::Configuration(format!("{}: stashServer is not configured", self.def.id))
        })
    }

    fn not_supported(&self, action: &AdapterAction, what: impl std::fmt::Display) -> ScrapeError {
        ScrapeError::NotSupported(format!(
            "{}: {} action cannot scrape {}",
            self.def.id,
            action.name(),
            what
        ))
    }
}

/// Search by name. Returns one record per result.
pub async fn by_name(
    call: &AdapterCall<'_>,
    action: &AdapterAction,
    query: &str,
    ty: ContentType,
) -> Result<Vec<ScrapedContent>> {
    match action {
        AdapterAction::Script { argv } => script::by_name(call, argv, query, ty).await,
        AdapterAction::MarkupDoc(doc) => {
            document::by_name(call, doc, DocumentKind::Markup, query, ty).await
        }
        AdapterAction::JsonDoc(doc) => document::by_name(call, doc, DocumentKind::Json, query, ty).await,
        AdapterAction::RemoteCatalog => stash::by_name(call, query, ty).await,
        AdapterAction::Builtin(_) => Err(call.not_supported(action, format!("{} by name", ty))),
    }
}

/// Scrape a single page.
pub async fn by_url(
    call: &AdapterCall<'_>,
    action: &AdapterAction,
    url: &str,
    ty: ContentType,
) -> Result<Option<ScrapedContent>> {
    match action {
        AdapterAction::Script { argv } => script::by_url(call, argv, url, ty).await,
        AdapterAction::MarkupDoc(doc) => document::by_url(call, doc, DocumentKind::Markup, url, ty).await,
        AdapterAction::JsonDoc(doc) => document::by_url(call, doc, DocumentKind::Json, url, ty).await,
        AdapterAction::RemoteCatalog | AdapterAction::Builtin(_) => {
            Err(call.not_supported(action, format!("{} by URL", ty)))
        }
    }
}

/// Scrape from a partially known fragment.
pub async fn by_fragment(
    call: &AdapterCall<'_>,
    action: &AdapterAction,
    input: &Input,
) -> Result<Option<ScrapedContent>> {
    let ty = input.validate()?;
    match action {
        AdapterAction::Script { argv } => script::by_fragment(call, argv, input, ty).await,
        AdapterAction::MarkupDoc(doc) => {
            document::by_fragment(call, doc, DocumentKind::Markup, input).await
        }
        AdapterAction::JsonDoc(doc) => document::by_fragment(call, doc, DocumentKind::Json, input).await,
        AdapterAction::RemoteCatalog => stash::by_fragment(call, input).await,
        AdapterAction::Builtin(BuiltinKind::Autotag) => autotag::by_fragment(call, input).await,
    }
}

/// Scrape seeded from a stored scene or gallery.
pub async fn by_stored(
    call: &AdapterCall<'_>,
    action: &AdapterAction,
    stored: &StoredEntity,
) -> Result<Option<ScrapedContent>> {
    match action {
        AdapterAction::Script { argv } => script::by_stored(call, argv, stored).await,
        AdapterAction::MarkupDoc(doc) => document::by_stored(call, doc, DocumentKind::Markup, stored).await,
        AdapterAction::JsonDoc(doc) => document::by_stored(call, doc, DocumentKind::Json, stored).await,
        AdapterAction::RemoteCatalog => stash::by_stored(call, stored).await,
        AdapterAction::Builtin(BuiltinKind::Autotag) => autotag::by_stored(call, stored).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_entity_url_fallback() {
        let scene = StoredEntity::Scene(StoredScene {
            id: "1".to_string(),
            urls: vec!["https://a.example/1".to_string()],
            ..Default::default()
        });
        assert_eq!(scene.url(), Some("https://a.example/1"));
        assert_eq!(scene.content_type(), ContentType::Scene);

        let gallery = StoredEntity::Gallery(StoredGallery {
            id: "2".to_string(),
            url: Some(String::new()),
            ..Default::default()
        });
        assert_eq!(gallery.url(), None);
    }
}
