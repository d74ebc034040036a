//! CLI command implementations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use console::style;
use serde::Serialize;

use metascrape::catalog::{Catalog, MemoryCatalog};
use metascrape::models::{ContentType, Input};
use metascrape::scrapers::{cancel_pair, ScrapeContext, ScraperRegistry};
use metascrape::Config;

/// Options shared by every command.
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
    pub timeout: Option<u64>,
}

async fn load_config(options: &GlobalOptions) -> anyhow::Result<Config> {
    let mut config = Config::load(options.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    if let Some(timeout) = options.timeout {
        config.request_timeout = Some(timeout);
    }
    Ok(config)
}

fn load_catalog(options: &GlobalOptions) -> anyhow::Result<Arc<dyn Catalog>> {
    let catalog = match options.catalog.as_deref() {
        Some(path) => MemoryCatalog::load(path)
            .with_context(|| format!("Failed to load catalog {}", path.display()))?,
        None => MemoryCatalog::new(),
    };
    Ok(Arc::new(catalog))
}

async fn registry(options: &GlobalOptions) -> anyhow::Result<ScraperRegistry> {
    let config = load_config(options).await?;
    let catalog = load_catalog(options)?;
    ScraperRegistry::new(config, catalog).context("Failed to create scraper registry")
}

/// A context cancelled by Ctrl-C, with the configured deadline.
fn request_context(registry: &ScraperRegistry) -> ScrapeContext {
    let (handle, token) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let ctx = ScrapeContext::new().with_cancel(token);
    match registry.config().request_deadline() {
        Some(deadline) => ctx.with_timeout(deadline),
        None => ctx,
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// List loaded scrapers.
pub async fn cmd_list(options: &GlobalOptions, types: &[ContentType]) -> anyhow::Result<()> {
    let registry = registry(options).await?;
    let scrapers = registry.list(types);

    if scrapers.is_empty() {
        println!(
            "{} No scrapers found in {}",
            style("!").yellow(),
            registry.config().scrapers_dir().display()
        );
        return Ok(());
    }

    println!("\n{}", style("Scrapers").bold());
    println!("{}", "-".repeat(72));
    println!("{:<24} {:<28} Types", "ID", "Name");
    println!("{}", "-".repeat(72));

    for summary in scrapers {
        let types: Vec<&str> = [
            (ContentType::Performer, summary.performer.is_some()),
            (ContentType::Scene, summary.scene.is_some()),
            (ContentType::Gallery, summary.gallery.is_some()),
            (ContentType::Movie, summary.movie.is_some()),
        ]
        .iter()
        .filter(|(_, supported)| *supported)
        .map(|(ty, _)| ty.as_str())
        .collect();

        println!("{:<24} {:<28} {}", summary.id, summary.name, types.join(", "));
    }

    Ok(())
}

/// Show one scraper.
pub async fn cmd_show(options: &GlobalOptions, id: &str) -> anyhow::Result<()> {
    let registry = registry(options).await?;
    let summary = registry
        .get(id)
        .with_context(|| format!("Scraper '{}' not found", id))?;
    print_json(&summary)
}

pub async fn cmd_scrape_url(options: &GlobalOptions, url: &str, ty: ContentType) -> anyhow::Result<()> {
    let registry = registry(options).await?;
    let ctx = request_context(&registry);
    let result = registry
        .scrape_url(&ctx, url, ty)
        .await
        .with_context(|| format!("Failed to scrape {}", url))?;
    print_json(&result)
}

pub async fn cmd_scrape_name(
    options: &GlobalOptions,
    id: &str,
    query: &str,
    ty: ContentType,
) -> anyhow::Result<()> {
    let registry = registry(options).await?;
    let ctx = request_context(&registry);
    let results = registry
        .scrape_name(&ctx, id, query, ty)
        .await
        .with_context(|| format!("Failed to search {} for '{}'", id, query))?;
    print_json(&results)
}

/// Read a fragment argument: inline JSON or `@path`.
async fn read_fragment(arg: &str) -> anyhow::Result<serde_json::Value> {
    let text = match arg.strip_prefix('@') {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read fragment file {}", path))?,
        None => arg.to_string(),
    };
    serde_json::from_str(&text).context("Fragment is not valid JSON")
}

pub async fn cmd_scrape_fragment(
    options: &GlobalOptions,
    id: &str,
    ty: ContentType,
    json: &str,
) -> anyhow::Result<()> {
    let input = Input::from_json(ty, read_fragment(json).await?)?;
    let registry = registry(options).await?;
    let ctx = request_context(&registry);
    let result = registry
        .scrape_fragment(&ctx, id, input)
        .await
        .with_context(|| format!("Failed to scrape {} fragment with {}", ty, id))?;
    print_json(&result)
}

pub async fn cmd_scrape_stored(
    options: &GlobalOptions,
    id: &str,
    entity_id: &str,
    ty: ContentType,
) -> anyhow::Result<()> {
    if options.catalog.is_none() {
        anyhow::bail!("scrape-stored needs a catalog (--catalog <seed.json>)");
    }
    let registry = registry(options).await?;
    let ctx = request_context(&registry);
    let result = registry
        .scrape_stored(&ctx, id, entity_id, ty)
        .await
        .with_context(|| format!("Failed to scrape stored {} {} with {}", ty, entity_id, id))?;
    print_json(&result)
}

/// Reload the definitions directory and report failures.
pub async fn cmd_reload(options: &GlobalOptions) -> anyhow::Result<()> {
    let registry = registry(options).await?;
    let report = registry.reload();

    println!(
        "{} Loaded {} scraper(s) from {}",
        style("✓").green(),
        report.loaded,
        registry.config().scrapers_dir().display()
    );
    for (path, error) in &report.failed {
        println!("{} {}: {}", style("✗").red(), path.display(), error);
    }

    if !report.failed.is_empty() {
        anyhow::bail!("{} definition(s) failed to load", report.failed.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_fragment_inline_and_file() {
        let value = read_fragment(r#"{"title": "x"}"#).await.unwrap();
        assert_eq!(value["title"], "x");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frag.json");
        std::fs::write(&path, r#"{"name": "Jane"}"#).unwrap();
        let value = read_fragment(&format!("@{}", path.display())).await.unwrap();
        assert_eq!(value["name"], "Jane");

        assert!(read_fragment("not json").await.is_err());
    }
}
