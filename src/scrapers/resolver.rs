//! Post-scrape resolution against the local catalog.
//!
//! Nested performers, studios, movies and tags are matched by name and
//! stamped with their stored id. Tags matching an exclusion pattern are
//! dropped. Everything runs in one catalog transaction per request.

use std::collections::BTreeSet;

use regex::{Regex, RegexBuilder};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, CatalogTxn, NamedKind};
use crate::error::Result;
use crate::models::{ScrapedContent, ScrapedMovie, ScrapedPerformer, ScrapedStudio, ScrapedTag};

/// Compile exclusion patterns case-insensitively. Invalid patterns are
/// skipped.
pub fn compile_exclusions(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match RegexBuilder::new(p).case_insensitive(true).build() {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Invalid tag exclusion pattern {:?}: {}", p, e);
                None
            }
        })
        .collect()
}

/// Drop tags matching any exclusion and return each distinct dropped name
/// once, in the order first seen.
pub fn filter_excluded_tags(exclusions: &[Regex], tags: &mut Vec<ScrapedTag>) -> Vec<String> {
    if exclusions.is_empty() {
        return Vec::new();
    }
    let mut ignored: Vec<String> = Vec::new();
    tags.retain(|tag| {
        let excluded = exclusions.iter().any(|re| re.is_match(&tag.name));
        if excluded && !ignored.contains(&tag.name) {
            ignored.push(tag.name.clone());
        }
        !excluded
    });
    ignored
}

/// Checksum given to studios the resolver creates.
pub fn studio_checksum(name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hex::encode(hasher.finalize())
}

/// Resolution options for one result.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    /// Create studios that have no catalog match.
    pub create_missing_studios: bool,
}

/// Matches one scraped record against the catalog.
pub struct Resolver<'a> {
    catalog: &'a dyn Catalog,
    exclusions: &'a [Regex],
    options: ResolveOptions,
}

struct Pass<'a> {
    txn: Box<dyn CatalogTxn>,
    exclusions: &'a [Regex],
    options: ResolveOptions,
    ignored: BTreeSet<String>,
}

impl Pass<'_> {
    async fn stored_id(&mut self, kind: NamedKind, name: &str) -> Result<Option<String>> {
        if name.trim().is_empty() {
            return Ok(None);
        }
        let found = self.txn.find_by_name(kind, name.trim()).await?;
        debug!(
            "Resolved {} {:?}: {}",
            kind.as_str(),
            name,
            found.as_ref().map(|e| e.id.as_str()).unwrap_or("no match")
        );
        Ok(found.map(|e| e.id))
    }

    async fn tags(&mut self, tags: &mut Vec<ScrapedTag>) -> Result<()> {
        self.ignored.extend(filter_excluded_tags(self.exclusions, tags));
        for tag in tags.iter_mut() {
            if tag.stored_id.is_none() {
                tag.stored_id = self.stored_id(NamedKind::Tag, &tag.name).await?;
            }
        }
        Ok(())
    }

    async fn studio(&mut self, studio: &mut ScrapedStudio) -> Result<()> {
        if studio.stored_id.is_some() {
            return Ok(());
        }
        studio.stored_id = self.stored_id(NamedKind::Studio, &studio.name).await?;
        if studio.stored_id.is_none() && self.options.create_missing_studios && !studio.name.trim().is_empty() {
            let name = studio.name.trim();
            let created = self
                .txn
                .create(NamedKind::Studio, name, Some(studio_checksum(name).as_str()))
                .await?;
            info!("Created studio {} ({})", created.name, created.id);
            studio.stored_id = Some(created.id);
        }
        Ok(())
    }

    async fn performer(&mut self, performer: &mut ScrapedPerformer) -> Result<()> {
        if performer.stored_id.is_none() {
            if let Some(name) = performer.name.clone() {
                performer.stored_id = self.stored_id(NamedKind::Performer, &name).await?;
            }
        }
        self.tags(&mut performer.tags).await
    }

    async fn movie(&mut self, movie: &mut ScrapedMovie) -> Result<()> {
        if movie.stored_id.is_none() {
            if let Some(name) = movie.name.clone() {
                movie.stored_id = self.stored_id(NamedKind::Movie, &name).await?;
            }
        }
        if let Some(studio) = movie.studio.as_mut() {
            self.studio(studio).await?;
        }
        self.tags(&mut movie.tags).await
    }

    async fn content(&mut self, content: &mut ScrapedContent) -> Result<()> {
        match content {
            ScrapedContent::Performer(p) => self.performer(p).await?,
            ScrapedContent::Scene(s) => {
                for p in &mut s.performers {
                    self.performer(p).await?;
                }
                for m in &mut s.movies {
                    self.movie(m).await?;
                }
                if let Some(studio) = s.studio.as_mut() {
                    self.studio(studio).await?;
                }
                self.tags(&mut s.tags).await?;
            }
            ScrapedContent::Gallery(g) => {
                for p in &mut g.performers {
                    self.performer(p).await?;
                }
                if let Some(studio) = g.studio.as_mut() {
                    self.studio(studio).await?;
                }
                self.tags(&mut g.tags).await?;
            }
            ScrapedContent::Movie(m) => self.movie(m).await?,
            ScrapedContent::Studio(s) => self.studio(s).await?,
            ScrapedContent::Tag(t) => {
                if t.stored_id.is_none() {
                    t.stored_id = self.stored_id(NamedKind::Tag, &t.name).await?;
                }
            }
        }
        Ok(())
    }
}

impl<'a> Resolver<'a> {
    pub fn new(catalog: &'a dyn Catalog, exclusions: &'a [Regex]) -> Self {
        Self {
            catalog,
            exclusions,
            options: ResolveOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ResolveOptions) -> Self {
        self.options = options;
        self
    }

    /// Resolve `content` in place and commit. Returns the ignored tag names.
    ///
    /// On error the transaction is dropped uncommitted.
    pub async fn resolve(&self, content: &mut ScrapedContent) -> Result<Vec<String>> {
        self.resolve_all(std::slice::from_mut(content)).await
    }

    /// Resolve every result of one request in a single transaction.
    /// Ignored tags are collected across all results and logged once.
    pub async fn resolve_all(&self, contents: &mut [ScrapedContent]) -> Result<Vec<String>> {
        let mut pass = Pass {
            txn: self.catalog.begin().await?,
            exclusions: self.exclusions,
            options: self.options,
            ignored: BTreeSet::new(),
        };
        for content in contents.iter_mut() {
            pass.content(content).await?;
        }

        let Pass { txn, ignored, .. } = pass;
        txn.commit().await?;

        let ignored: Vec<String> = ignored.into_iter().collect();
        if !ignored.is_empty() {
            info!("Scraping ignored tags: {}", ignored.join(", "));
        }
        Ok(ignored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogState, MemoryCatalog, NamedEntity};
    use crate::models::ScrapedScene;

    fn named(id: &str, name: &str) -> NamedEntity {
        NamedEntity {
            id: id.to_string(),
            name: name.to_string(),
            aliases: Vec::new(),
            checksum: None,
        }
    }

    fn tags(names: &[&str]) -> Vec<ScrapedTag> {
        names.iter().map(|n| ScrapedTag::new(*n)).collect()
    }

    #[test]
    fn test_filter_excluded_tags() {
        let exclusions = compile_exclusions(&["^admin".to_string(), "(".to_string()]);
        assert_eq!(exclusions.len(), 1);

        let mut t = tags(&["Admin Tools", "Public", "ADMINISTRATION"]);
        let ignored = filter_excluded_tags(&exclusions, &mut t);
        assert_eq!(ignored, vec!["Admin Tools", "ADMINISTRATION"]);
        assert_eq!(t, tags(&["Public"]));
    }

    #[test]
    fn test_filter_excluded_tags_reports_each_name_once() {
        let exclusions = compile_exclusions(&["^admin".to_string()]);
        let mut t = tags(&["Admin Tools", "Public", "Admin Tools", "admin tools", "Admin Tools"]);
        let ignored = filter_excluded_tags(&exclusions, &mut t);
        assert_eq!(ignored, vec!["Admin Tools", "admin tools"]);
        assert_eq!(t, tags(&["Public"]));
    }

    #[tokio::test]
    async fn test_resolve_all_shares_ignored_tags() {
        let catalog = MemoryCatalog::from_state(CatalogState {
            tags: vec![named("4", "Public")],
            ..Default::default()
        });
        let scene = |title: &str| {
            ScrapedContent::Scene(ScrapedScene {
                title: Some(title.to_string()),
                tags: tags(&["Admin Tools", "Public"]),
                ..Default::default()
            })
        };
        let mut results = vec![scene("One"), scene("Two")];

        let exclusions = compile_exclusions(&["^admin".to_string()]);
        let ignored = Resolver::new(&catalog, &exclusions)
            .resolve_all(&mut results)
            .await
            .unwrap();
        assert_eq!(ignored, vec!["Admin Tools"]);

        for result in results {
            let ScrapedContent::Scene(scene) = result else {
                panic!("expected scene");
            };
            assert_eq!(scene.tags.len(), 1);
            assert_eq!(scene.tags[0].stored_id.as_deref(), Some("4"));
        }
    }

    #[test]
    fn test_studio_checksum() {
        assert_eq!(
            studio_checksum("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_resolve_scene_stamps_ids() {
        let catalog = MemoryCatalog::from_state(CatalogState {
            performers: vec![named("1", "Jane Doe")],
            studios: vec![named("2", "Acme")],
            tags: vec![named("3", "Outdoor")],
            ..Default::default()
        });

        let mut content = ScrapedContent::Scene(ScrapedScene {
            title: Some("T".to_string()),
            performers: vec![
                ScrapedPerformer {
                    name: Some("jane doe".to_string()),
                    ..Default::default()
                },
                ScrapedPerformer {
                    name: Some("Unknown".to_string()),
                    ..Default::default()
                },
            ],
            studio: Some(ScrapedStudio {
                name: "ACME".to_string(),
                ..Default::default()
            }),
            tags: tags(&["outdoor", "Admin Tools", "admin tools"]),
            ..Default::default()
        });

        let exclusions = compile_exclusions(&["^Admin".to_string()]);
        let ignored = Resolver::new(&catalog, &exclusions)
            .resolve(&mut content)
            .await
            .unwrap();
        assert_eq!(ignored, vec!["Admin Tools", "admin tools"]);

        let ScrapedContent::Scene(scene) = content else {
            panic!("expected scene");
        };
        assert_eq!(scene.performers[0].stored_id.as_deref(), Some("1"));
        assert_eq!(scene.performers[1].stored_id, None);
        assert_eq!(scene.studio.unwrap().stored_id.as_deref(), Some("2"));
        assert_eq!(scene.tags.len(), 1);
        assert_eq!(scene.tags[0].stored_id.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_missing_studio_created_when_asked() {
        let catalog = MemoryCatalog::new();
        let mut content = ScrapedContent::Studio(ScrapedStudio {
            name: "New Studio".to_string(),
            ..Default::default()
        });

        Resolver::new(&catalog, &[])
            .with_options(ResolveOptions {
                create_missing_studios: true,
            })
            .resolve(&mut content)
            .await
            .unwrap();

        let ScrapedContent::Studio(studio) = content else {
            panic!("expected studio");
        };
        let id = studio.stored_id.unwrap();

        let mut txn = catalog.begin().await.unwrap();
        let stored = txn.find_by_id(NamedKind::Studio, &id).await.unwrap().unwrap();
        assert_eq!(stored.checksum.as_deref(), Some(studio_checksum("New Studio").as_str()));
    }
}
