//! Scraper registry and dispatch.
//!
//! The loaded definitions live in an immutable [`Snapshot`] behind an
//! `RwLock<Arc<_>>`. Readers clone the `Arc`; `reload` builds a new snapshot
//! without holding the lock and swaps it in with one write.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use regex::Regex;
use tracing::{debug, info, warn};

use super::adapters::autotag::{autotag_definition, AUTOTAG_ID};
use super::adapters::freeones::freeones_definition;
use super::adapters::{self, AdapterCall, AdapterEnv, StoredEntity};
use super::context::ScrapeContext;
use super::definition::{AdapterAction, DefinitionSummary, ScraperDefinition};
use super::http_client::HttpClient;
use super::image;
use super::resolver::{compile_exclusions, ResolveOptions, Resolver};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{Result, ScrapeError};
use crate::models::{ContentType, Input, ScrapedContent};

const DEFINITION_EXTENSION: &str = "yml";

/// An immutable set of loaded definitions, keyed by id.
#[derive(Debug, Default)]
pub struct Snapshot {
    defs: BTreeMap<String, Arc<ScraperDefinition>>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<ScraperDefinition>> {
        self.defs.get(id)
    }

    fn insert(&mut self, def: ScraperDefinition, source: &str) {
        if self.defs.contains_key(&def.id) {
            warn!("Skipping duplicate scraper id {} from {}", def.id, source);
            return;
        }
        self.defs.insert(def.id.clone(), Arc::new(def));
    }
}

/// Outcome of loading a definitions directory.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub failed: Vec<(PathBuf, String)>,
}

/// Every `*.yml` file under `dir`, recursively, in path order.
fn definition_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let entries = match std::fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(e) => {
                if current == dir {
                    debug!("Scrapers directory {} not readable: {}", dir.display(), e);
                } else {
                    warn!("Could not read {}: {}", current.display(), e);
                }
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().and_then(|e| e.to_str()) == Some(DEFINITION_EXTENSION) {
                files.push(path);
            }
        }
    }

    files.sort();
    files
}

/// Build a snapshot from the built-ins and the definitions directory.
pub fn load_snapshot(dir: &Path) -> (Snapshot, LoadReport) {
    let mut snapshot = Snapshot::default();
    let mut report = LoadReport::default();

    match freeones_definition() {
        Ok(def) => snapshot.insert(def, "built-in"),
        Err(e) => warn!("Built-in Freeones scraper failed to load: {}", e),
    }
    snapshot.insert(autotag_definition(), "built-in");

    for path in definition_files(dir) {
        match ScraperDefinition::load_from_file(&path) {
            Ok(def) => {
                debug!("Loaded scraper {} from {}", def.id, path.display());
                snapshot.insert(def, &path.display().to_string());
                report.loaded += 1;
            }
            Err(e) => {
                warn!("Error loading scraper {}: {}", path.display(), e);
                report.failed.push((path, e.to_string()));
            }
        }
    }

    (snapshot, report)
}

/// Entry point for all scrapes.
pub struct ScraperRegistry {
    env: AdapterEnv,
    exclusions: Vec<Regex>,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl ScraperRegistry {
    /// Create a registry and load the configured definitions directory.
    pub fn new(config: Config, catalog: Arc<dyn Catalog>) -> Result<Self> {
        let http = HttpClient::from_config(&config)?;
        Ok(Self::with_http_client(config, catalog, http))
    }

    pub fn with_http_client(config: Config, catalog: Arc<dyn Catalog>, http: HttpClient) -> Self {
        let exclusions = compile_exclusions(&config.exclude_tag_patterns);
        let registry = Self {
            env: AdapterEnv::new(http, config, catalog),
            exclusions,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
        };
        registry.reload();
        registry
    }

    pub fn config(&self) -> &Config {
        &self.env.config
    }

    /// Re-read the definitions directory and swap in the result.
    pub fn reload(&self) -> LoadReport {
        let dir = self.env.config.scrapers_dir();
        let (snapshot, report) = load_snapshot(&dir);
        info!(
            "Loaded {} scraper(s) from {} ({} failed)",
            report.loaded,
            dir.display(),
            report.failed.len()
        );

        let snapshot = Arc::new(snapshot);
        match self.snapshot.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
        report
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        match self.snapshot.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn definition(&self, id: &str) -> Result<Arc<ScraperDefinition>> {
        self.snapshot()
            .get(id)
            .cloned()
            .ok_or_else(|| ScrapeError::NotFound(format!("scraper with id {}", id)))
    }

    /// Summaries of definitions supporting any of `types`, sorted by
    /// lowercase name. An empty slice lists everything.
    pub fn list(&self, types: &[ContentType]) -> Vec<DefinitionSummary> {
        let snapshot = self.snapshot();
        let mut defs: Vec<_> = snapshot
            .defs
            .values()
            .filter(|d| types.is_empty() || types.iter().any(|t| d.supports(*t)))
            .collect();
        defs.sort_by_key(|d| d.name.to_lowercase());
        defs.into_iter().map(|d| d.summary()).collect()
    }

    pub fn get(&self, id: &str) -> Option<DefinitionSummary> {
        self.snapshot().get(id).map(|d| d.summary())
    }

    /// Apply the configured request deadline when the caller set none.
    fn request_context(&self, ctx: &ScrapeContext) -> ScrapeContext {
        match (ctx.deadline(), self.env.config.request_deadline()) {
            (None, Some(timeout)) => ctx.clone().with_timeout(timeout),
            _ => ctx.clone(),
        }
    }

    /// Resolve against the catalog and inline images.
    async fn finish(
        &self,
        ctx: &ScrapeContext,
        def: &ScraperDefinition,
        action: &AdapterAction,
        content: ScrapedContent,
    ) -> Result<ScrapedContent> {
        let mut results = self.finish_all(ctx, def, action, vec![content]).await?;
        results
            .pop()
            .ok_or_else(|| ScrapeError::NotFound(format!("{}: resolved result", def.id)))
    }

    /// Resolve every result of one request in a single catalog pass, then
    /// inline images.
    async fn finish_all(
        &self,
        ctx: &ScrapeContext,
        def: &ScraperDefinition,
        action: &AdapterAction,
        mut results: Vec<ScrapedContent>,
    ) -> Result<Vec<ScrapedContent>> {
        // remote catalog ids are already blanked
        if !results.is_empty() && !matches!(action, AdapterAction::RemoteCatalog) {
            let options = ResolveOptions {
                create_missing_studios: def.id == AUTOTAG_ID,
            };
            Resolver::new(self.env.catalog.as_ref(), &self.exclusions)
                .with_options(options)
                .resolve_all(&mut results)
                .await?;
        }
        for content in results.iter_mut() {
            image::encode_images(&self.env.http, ctx, content).await?;
        }
        Ok(results)
    }

    /// Search `id` for `query`.
    pub async fn scrape_name(
        &self,
        ctx: &ScrapeContext,
        id: &str,
        query: &str,
        ty: ContentType,
    ) -> Result<Vec<ScrapedContent>> {
        let ctx = self.request_context(ctx);
        let def = self.definition(id)?;
        let action = def
            .spec(ty)
            .and_then(|s| s.by_name.as_ref())
            .ok_or_else(|| ScrapeError::NotSupported(format!("{}: {} by name", id, ty)))?;

        info!("Searching {} {} for {:?}", id, ty, query);
        let call = AdapterCall::new(&self.env, &ctx, &def);
        let found = adapters::by_name(&call, action, query, ty).await?;
        self.finish_all(&ctx, &def, action, found).await
    }

    /// Scrape `url` with the first definition that claims it.
    pub async fn scrape_url(&self, ctx: &ScrapeContext, url: &str, ty: ContentType) -> Result<Option<ScrapedContent>> {
        let ctx = self.request_context(ctx);
        let snapshot = self.snapshot();

        for def in snapshot.defs.values() {
            let Some(action) = def.spec(ty).and_then(|s| s.url_action(url)) else {
                continue;
            };
            info!("Scraping {} {} with {}", ty, url, def.id);
            let call = AdapterCall::new(&self.env, &ctx, def);
            if let Some(content) = adapters::by_url(&call, action, url, ty).await? {
                return Ok(Some(self.finish(&ctx, def, action, content).await?));
            }
        }

        debug!("No scraper returned {} for {}", ty, url);
        Ok(None)
    }

    /// Scrape from a fragment, falling back to its URL when `id` has no
    /// fragment strategy for the input's type.
    pub async fn scrape_fragment(&self, ctx: &ScrapeContext, id: &str, mut input: Input) -> Result<Option<ScrapedContent>> {
        let ctx = self.request_context(ctx);
        let def = self.definition(id)?;
        let ty = input.validate()?;
        input.populate_url();

        if let Some(action) = def.spec(ty).and_then(|s| s.by_fragment.as_ref()) {
            info!("Scraping {} fragment with {}", ty, id);
            let call = AdapterCall::new(&self.env, &ctx, &def);
            return match adapters::by_fragment(&call, action, &input).await? {
                Some(content) => Ok(Some(self.finish(&ctx, &def, action, content).await?)),
                None => Ok(None),
            };
        }

        match input.url() {
            Some(url) => {
                debug!("{} has no {} fragment scraper, scraping {} instead", id, ty, url);
                self.scrape_url(&ctx, url, ty).await
            }
            None => Err(ScrapeError::NotSupported(format!("{}: {} by fragment", id, ty))),
        }
    }

    /// Scrape seeded from a stored scene or gallery.
    pub async fn scrape_stored(
        &self,
        ctx: &ScrapeContext,
        id: &str,
        entity_id: &str,
        ty: ContentType,
    ) -> Result<Option<ScrapedContent>> {
        let ctx = self.request_context(ctx);
        let def = self.definition(id)?;
        let stored = self.load_stored(entity_id, ty).await?;

        if let Some(action) = def.spec(ty).and_then(|s| s.by_fragment.as_ref()) {
            info!("Scraping stored {} {} with {}", ty, entity_id, id);
            let call = AdapterCall::new(&self.env, &ctx, &def);
            return match adapters::by_stored(&call, action, &stored).await? {
                Some(content) => Ok(Some(self.finish(&ctx, &def, action, content).await?)),
                None => Ok(None),
            };
        }

        match stored.url() {
            Some(url) => self.scrape_url(&ctx, url, ty).await,
            None => Err(ScrapeError::NotSupported(format!("{}: stored {} by fragment", id, ty))),
        }
    }

    async fn load_stored(&self, entity_id: &str, ty: ContentType) -> Result<StoredEntity> {
        let mut txn = self.env.catalog.begin().await?;
        let stored = match ty {
            ContentType::Scene => txn.find_scene(entity_id).await?.map(StoredEntity::Scene),
            ContentType::Gallery => txn.find_gallery(entity_id).await?.map(StoredEntity::Gallery),
            other => {
                return Err(ScrapeError::InvalidInput(format!(
                    "stored {} entities cannot be scraped",
                    other
                )))
            }
        };
        stored.ok_or_else(|| ScrapeError::NotFound(format!("{} {}", ty, entity_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::models::ScrapeType;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn registry(dir: &Path) -> ScraperRegistry {
        let config = Config {
            scrapers_path: dir.display().to_string(),
            ..Default::default()
        };
        ScraperRegistry::new(config, Arc::new(MemoryCatalog::new())).unwrap()
    }

    #[test]
    fn test_load_recursive_and_skip_broken() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "zeta.yml",
            "name: zeta site\nsceneByURL:\n  - action: script\n    url: [zeta.example]\n    script: [./z.sh]\n",
        );
        write(
            dir.path(),
            "nested/Alpha.yml",
            "name: Alpha\nperformerByName:\n  action: script\n  script: [./a.sh]\n",
        );
        write(dir.path(), "broken.yml", "sceneByURL: [[[");
        write(dir.path(), "notes.txt", "ignored");

        let (snapshot, report) = load_snapshot(dir.path());
        assert_eq!(report.loaded, 2);
        assert_eq!(report.failed.len(), 1);
        assert!(snapshot.get("Alpha").is_some());
        assert!(snapshot.get("zeta").is_some());
        assert!(snapshot.get(AUTOTAG_ID).is_some());
    }

    #[test]
    fn test_list_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "b.yml",
            "name: beta\nsceneByURL:\n  - action: script\n    url: [b.example]\n    script: [./b.sh]\n",
        );
        write(
            dir.path(),
            "a.yml",
            "name: Alpha\nsceneByURL:\n  - action: script\n    url: [a.example]\n    script: [./a.sh]\n",
        );
        let registry = registry(dir.path());

        let names: Vec<_> = registry
            .list(&[ContentType::Scene])
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Alpha", "Auto Tag", "beta"]);

        let performers: Vec<_> = registry
            .list(&[ContentType::Performer])
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(performers, vec!["builtin_freeones"]);
    }

    #[test]
    fn test_reload_picks_up_new_files() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        assert!(registry.get("late").is_none());

        write(
            dir.path(),
            "late.yml",
            "performerByName:\n  action: script\n  script: [./late.sh]\n",
        );
        let report = registry.reload();
        assert_eq!(report.loaded, 1);

        let summary = registry.get("late").unwrap();
        assert_eq!(summary.performer.unwrap().supported_scrapes, vec![ScrapeType::Name]);
    }

    #[tokio::test]
    async fn test_scrape_name_errors() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let ctx = ScrapeContext::new();

        let err = registry
            .scrape_name(&ctx, "missing", "x", ContentType::Performer)
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::NotFound(_)));

        let err = registry
            .scrape_name(&ctx, AUTOTAG_ID, "x", ContentType::Scene)
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::NotSupported(_)));
    }

    #[tokio::test]
    async fn test_scrape_url_without_match() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let found = registry
            .scrape_url(&ScrapeContext::new(), "https://nothing.example/1", ContentType::Scene)
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_fragment_without_strategy_or_url() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let input = Input::performer(Default::default());
        let err = registry
            .scrape_fragment(&ScrapeContext::new(), AUTOTAG_ID, input)
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::NotSupported(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scrape_name_resolves_all_results_together() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "search.sh",
            "#!/bin/sh\ncat > /dev/null\necho '[{\"title\": \"One\", \"tags\": [{\"name\": \"Admin Tools\"}, {\"name\": \"Public\"}]}, {\"title\": \"Two\", \"tags\": [{\"name\": \"Admin Tools\"}]}]'\n",
        );
        write(
            dir.path(),
            "search.yml",
            "sceneByName:\n  action: script\n  script: [sh, search.sh]\n",
        );
        let config = Config {
            scrapers_path: dir.path().display().to_string(),
            exclude_tag_patterns: vec!["^admin".to_string()],
            ..Default::default()
        };
        let registry = ScraperRegistry::new(config, Arc::new(MemoryCatalog::new())).unwrap();

        let results = registry
            .scrape_name(&ScrapeContext::new(), "search", "beach", ContentType::Scene)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        let tags: Vec<Vec<String>> = results
            .iter()
            .map(|r| match r {
                ScrapedContent::Scene(s) => s.tags.iter().map(|t| t.name.clone()).collect(),
                other => panic!("expected a scene, got {:?}", other),
            })
            .collect();
        assert_eq!(tags, vec![vec!["Public".to_string()], Vec::new()]);
    }
}
