//! Document-mapping adapter for `scrapeXPath` and `scrapeJson` actions.

use std::sync::Arc;

use tracing::debug;

use super::{AdapterCall, StoredEntity};
use crate::error::{Result, ScrapeError};
use crate::models::{ContentType, Input, ScrapedContent};
use crate::scrapers::definition::DocAction;
use crate::scrapers::document::{DocumentKind, LoadedDocument, QueryType};
use crate::scrapers::mapped::MappedScraper;
use crate::scrapers::url::QueryUrlParameters;

/// Placeholder replaced by the escaped search term in name queries.
const NAME_PLACEHOLDER: &str = "{}";

fn mapping<'a>(call: &AdapterCall<'a>, action: &DocAction, kind: DocumentKind) -> Result<&'a Arc<MappedScraper>> {
    let blocks = match kind {
        DocumentKind::Markup => &call.def.xpath_scrapers,
        DocumentKind::Json => &call.def.json_scrapers,
    };
    blocks.get(&action.scraper).ok_or_else(|| {
        ScrapeError::NotFound(format!(
            "{}: searched for scraper name {}",
            call.def.id, action.scraper
        ))
    })
}

fn query_url<'b>(call: &AdapterCall<'_>, action: &'b DocAction) -> Result<&'b str> {
    action.query_url.as_deref().ok_or_else(|| {
        ScrapeError::Configuration(format!("{}: {} requires queryURL", call.def.id, action.scraper))
    })
}

/// Apply replacements, then build the URL from the action's template.
fn build_url(call: &AdapterCall<'_>, action: &DocAction, mut params: QueryUrlParameters) -> Result<String> {
    params.apply_replacements(&action.replacements);
    let url = params.construct_url(query_url(call, action)?);
    debug!("Constructed query URL {}", url);
    Ok(url)
}

async fn load(call: &AdapterCall<'_>, kind: DocumentKind, url: &str, query_type: QueryType) -> Result<LoadedDocument> {
    call.loader(kind).load(url, query_type).await
}

async fn scrape_single(scraper: &MappedScraper, doc: &LoadedDocument, ty: ContentType) -> Option<ScrapedContent> {
    match ty {
        ContentType::Performer => scraper.scrape_performer(doc).await.map(ScrapedContent::Performer),
        ContentType::Scene => scraper.scrape_scene(doc).await.map(ScrapedContent::Scene),
        ContentType::Gallery => scraper.scrape_gallery(doc).await.map(ScrapedContent::Gallery),
        ContentType::Movie => scraper.scrape_movie(doc).await.map(ScrapedContent::Movie),
    }
}

pub(super) async fn by_url(
    call: &AdapterCall<'_>,
    action: &DocAction,
    kind: DocumentKind,
    url: &str,
    ty: ContentType,
) -> Result<Option<ScrapedContent>> {
    let scraper = mapping(call, action, kind)?;

    // rewrite only when the action asks for it
    let url = if action.replacements.is_empty() {
        url.to_string()
    } else {
        let mut params = QueryUrlParameters::from_url(url);
        params.apply_replacements(&action.replacements);
        params.construct_url(action.query_url.as_deref().unwrap_or("{url}"))
    };

    let doc = load(call, kind, &url, QueryType::Scrape).await?;
    Ok(scrape_single(scraper, &doc, ty).await)
}

pub(super) async fn by_name(
    call: &AdapterCall<'_>,
    action: &DocAction,
    kind: DocumentKind,
    name: &str,
    ty: ContentType,
) -> Result<Vec<ScrapedContent>> {
    let scraper = mapping(call, action, kind)?;
    let url = query_url(call, action)?.replace(NAME_PLACEHOLDER, &urlencoding::encode(name));

    let doc = load(call, kind, &url, QueryType::Search).await?;
    match ty {
        ContentType::Performer => Ok(scraper
            .scrape_performers(&doc)
            .await
            .into_iter()
            .map(ScrapedContent::Performer)
            .collect()),
        ContentType::Scene => Ok(scraper
            .scrape_scenes(&doc)
            .await
            .into_iter()
            .map(ScrapedContent::Scene)
            .collect()),
        other => Err(ScrapeError::NotSupported(format!(
            "{}: cannot search {} by name",
            call.def.id, other
        ))),
    }
}

pub(super) async fn by_fragment(
    call: &AdapterCall<'_>,
    action: &DocAction,
    kind: DocumentKind,
    input: &Input,
) -> Result<Option<ScrapedContent>> {
    let Some(scene) = input.scene.as_ref() else {
        return Err(ScrapeError::NotSupported(format!(
            "{}: cannot use a {} scraper as a {} fragment scraper",
            call.def.id,
            kind.as_str(),
            input.validate()?
        )));
    };

    let scraper = mapping(call, action, kind)?;
    let url = build_url(call, action, QueryUrlParameters::from_scene_fragment(scene))?;
    let doc = load(call, kind, &url, QueryType::Scrape).await?;
    Ok(scraper.scrape_scene(&doc).await.map(ScrapedContent::Scene))
}

pub(super) async fn by_stored(
    call: &AdapterCall<'_>,
    action: &DocAction,
    kind: DocumentKind,
    stored: &StoredEntity,
) -> Result<Option<ScrapedContent>> {
    let scraper = mapping(call, action, kind)?;

    let params = match stored {
        StoredEntity::Scene(scene) => QueryUrlParameters::from_stored_scene(scene),
        StoredEntity::Gallery(gallery) => QueryUrlParameters::from_stored_gallery(gallery),
    };
    let url = build_url(call, action, params)?;
    let doc = load(call, kind, &url, QueryType::Scrape).await?;

    Ok(match stored {
        StoredEntity::Scene(_) => scraper.scrape_scene(&doc).await.map(ScrapedContent::Scene),
        StoredEntity::Gallery(_) => scraper.scrape_gallery(&doc).await.map(ScrapedContent::Gallery),
    })
}
