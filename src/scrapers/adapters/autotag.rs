//! Built-in scraper that tags stored scenes and galleries from their file
//! path, matching the names and aliases of catalog performers, studios and
//! tags.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

use regex::Regex;
use tracing::debug;

use super::{AdapterCall, StoredEntity};
use crate::catalog::{CatalogTxn, NamedEntity, NamedKind};
use crate::error::{Result, ScrapeError};
use crate::models::{Input, ScrapedContent, ScrapedGallery, ScrapedPerformer, ScrapedScene, ScrapedStudio, ScrapedTag};
use crate::scrapers::definition::{AdapterAction, BuiltinKind, ScraperDefinition, TypeSpec};

pub const AUTOTAG_ID: &str = "builtin_autotag";
const AUTOTAG_NAME: &str = "Auto Tag";

/// Characters that may separate the words of a name inside a path.
const SEPARATOR_CLASS: &str = r"[.\-_ ]*";

/// Compiled name patterns, keyed by name. `None` marks names with no words.
static NAME_PATTERNS: LazyLock<Mutex<HashMap<String, Option<Regex>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// The built-in definition. Scenes and galleries by fragment only.
pub fn autotag_definition() -> ScraperDefinition {
    let spec = || TypeSpec {
        by_fragment: Some(AdapterAction::Builtin(BuiltinKind::Autotag)),
        ..Default::default()
    };
    ScraperDefinition {
        id: AUTOTAG_ID.to_string(),
        name: AUTOTAG_NAME.to_string(),
        scene: Some(spec()),
        gallery: Some(spec()),
        ..Default::default()
    }
}

/// Regex matching `name` as a whole word sequence, case-insensitive, with
/// its words joined by any run of separators.
fn name_regex(name: &str) -> Option<Regex> {
    let words: Vec<String> = name
        .split(|c: char| c.is_whitespace() || c == '.' || c == '-' || c == '_')
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect();
    if words.is_empty() {
        return None;
    }
    let pattern = format!(
        r"(?i)(?:^|[^\p{{L}}\p{{N}}]){}(?:$|[^\p{{L}}\p{{N}}])",
        words.join(SEPARATOR_CLASS)
    );
    Regex::new(&pattern).ok()
}

/// The pattern for `name`, compiled on first use.
fn cached_name_regex(name: &str) -> Option<Regex> {
    let mut patterns = NAME_PATTERNS.lock().unwrap_or_else(|e| e.into_inner());
    patterns
        .entry(name.to_string())
        .or_insert_with(|| name_regex(name))
        .clone()
}

fn entity_matches(entity: &NamedEntity, path: &str) -> bool {
    std::iter::once(&entity.name)
        .chain(entity.aliases.iter())
        .filter_map(|n| cached_name_regex(n))
        .any(|re| re.is_match(path))
}

async fn matching(txn: &mut dyn CatalogTxn, kind: NamedKind, path: &str) -> Result<Vec<NamedEntity>> {
    let all = txn.all_named(kind).await?;
    let found: Vec<_> = all.into_iter().filter(|e| entity_matches(e, path)).collect();
    debug!("Autotag matched {} {}(s) in {}", found.len(), kind.as_str(), path);
    Ok(found)
}

/// Everything found in one path.
#[derive(Debug, Default)]
struct PathMatches {
    performers: Vec<ScrapedPerformer>,
    studio: Option<ScrapedStudio>,
    tags: Vec<ScrapedTag>,
}

impl PathMatches {
    fn is_empty(&self) -> bool {
        self.performers.is_empty() && self.studio.is_none() && self.tags.is_empty()
    }
}

async fn match_path(call: &AdapterCall<'_>, path: &str) -> Result<PathMatches> {
    let mut txn = call.env.catalog.begin().await?;

    let performers = matching(txn.as_mut(), NamedKind::Performer, path)
        .await?
        .into_iter()
        .map(|e| ScrapedPerformer {
            stored_id: Some(e.id),
            name: Some(e.name),
            ..Default::default()
        })
        .collect();

    // The longest studio name wins when several match.
    let studio = matching(txn.as_mut(), NamedKind::Studio, path)
        .await?
        .into_iter()
        .max_by_key(|e| e.name.len())
        .map(|e| ScrapedStudio {
            stored_id: Some(e.id),
            name: e.name,
            ..Default::default()
        });

    let tags = matching(txn.as_mut(), NamedKind::Tag, path)
        .await?
        .into_iter()
        .map(|e| ScrapedTag {
            stored_id: Some(e.id),
            name: e.name,
            ..Default::default()
        })
        .collect();

    Ok(PathMatches {
        performers,
        studio,
        tags,
    })
}

async fn tag_entity(call: &AdapterCall<'_>, stored: &StoredEntity) -> Result<Option<ScrapedContent>> {
    let Some(path) = stored.path().filter(|p| !p.is_empty()) else {
        debug!("Autotag skipped: no path");
        return Ok(None);
    };

    let found = match_path(call, path).await?;
    if found.is_empty() {
        return Ok(None);
    }

    Ok(Some(match stored {
        StoredEntity::Scene(scene) => ScrapedContent::Scene(ScrapedScene {
            stored_id: Some(scene.id.clone()),
            performers: found.performers,
            studio: found.studio,
            tags: found.tags,
            ..Default::default()
        }),
        StoredEntity::Gallery(gallery) => ScrapedContent::Gallery(ScrapedGallery {
            stored_id: Some(gallery.id.clone()),
            performers: found.performers,
            studio: found.studio,
            tags: found.tags,
            ..Default::default()
        }),
    }))
}

pub(super) async fn by_fragment(call: &AdapterCall<'_>, input: &Input) -> Result<Option<ScrapedContent>> {
    let stored = {
        let mut txn = call.env.catalog.begin().await?;
        if let Some(scene) = &input.scene {
            let id = scene.stored_id.as_deref().ok_or_else(|| {
                ScrapeError::InvalidInput("autotag needs a stored scene id".to_string())
            })?;
            txn.find_scene(id)
                .await?
                .map(StoredEntity::Scene)
                .ok_or_else(|| ScrapeError::NotFound(format!("scene {}", id)))?
        } else if let Some(gallery) = &input.gallery {
            let id = gallery.stored_id.as_deref().ok_or_else(|| {
                ScrapeError::InvalidInput("autotag needs a stored gallery id".to_string())
            })?;
            txn.find_gallery(id)
                .await?
                .map(StoredEntity::Gallery)
                .ok_or_else(|| ScrapeError::NotFound(format!("gallery {}", id)))?
        } else {
            return Err(ScrapeError::NotSupported(format!(
                "{}: only scenes and galleries can be auto-tagged",
                call.def.id
            )));
        }
    };

    tag_entity(call, &stored).await
}

pub(super) async fn by_stored(call: &AdapterCall<'_>, stored: &StoredEntity) -> Result<Option<ScrapedContent>> {
    tag_entity(call, stored).await
}
