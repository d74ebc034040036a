//! Scraper definitions.
//!
//! A definition is loaded from one YAML file (or built in) and never changes
//! afterwards. Each content type gets a [`TypeSpec`] listing the strategies
//! it supports. A missing spec means the type is not supported at all.

mod schema;

pub use schema::{
    ActionKind, ActionSpec, CookieEntry, CookieSet, DebugOptions, DefinitionFile, DriverOptions,
    HeaderEntry, QueryUrlReplacements, StashServer, UrlActionSpec,
};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::error::{Result, ScrapeError};
use crate::models::{ContentType, ScrapeType};
use crate::scrapers::mapped::MappedScraper;

/// Deterministic scrapers implemented in code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    Autotag,
}

/// A document action: which mapping block to run and how to build its URL.
#[derive(Debug, Clone)]
pub struct DocAction {
    pub scraper: String,
    pub query_url: Option<String>,
    pub replacements: QueryUrlReplacements,
}

/// How a strategy is carried out.
#[derive(Debug, Clone)]
pub enum AdapterAction {
    Script { argv: Vec<String> },
    MarkupDoc(DocAction),
    JsonDoc(DocAction),
    RemoteCatalog,
    Builtin(BuiltinKind),
}

impl AdapterAction {
    pub fn name(&self) -> &'static str {
        match self {
            AdapterAction::Script { .. } => ActionKind::Script.as_str(),
            AdapterAction::MarkupDoc(_) => ActionKind::ScrapeXPath.as_str(),
            AdapterAction::JsonDoc(_) => ActionKind::ScrapeJson.as_str(),
            AdapterAction::RemoteCatalog => ActionKind::Stash.as_str(),
            AdapterAction::Builtin(_) => "builtin",
        }
    }
}

/// A by-URL strategy and the URL substrings it claims.
#[derive(Debug, Clone)]
pub struct UrlMatcher {
    pub patterns: Vec<String>,
    pub action: AdapterAction,
}

impl UrlMatcher {
    pub fn matches(&self, url: &str) -> bool {
        self.patterns.iter().any(|p| url.contains(p.as_str()))
    }
}

/// Strategies for one content type.
#[derive(Debug, Clone, Default)]
pub struct TypeSpec {
    pub by_name: Option<AdapterAction>,
    pub by_fragment: Option<AdapterAction>,
    pub by_url: Vec<UrlMatcher>,
}

impl TypeSpec {
    fn is_empty(&self) -> bool {
        self.by_name.is_none() && self.by_fragment.is_none() && self.by_url.is_empty()
    }

    /// The first by-URL action whose patterns match `url`.
    pub fn url_action(&self, url: &str) -> Option<&AdapterAction> {
        self.by_url.iter().find(|m| m.matches(url)).map(|m| &m.action)
    }

    pub fn supported_scrapes(&self) -> Vec<ScrapeType> {
        let mut scrapes = Vec::new();
        if self.by_name.is_some() {
            scrapes.push(ScrapeType::Name);
        }
        if self.by_fragment.is_some() {
            scrapes.push(ScrapeType::Fragment);
        }
        if !self.by_url.is_empty() {
            scrapes.push(ScrapeType::Url);
        }
        scrapes
    }

    fn summary(&self) -> TypeSummary {
        TypeSummary {
            supported_scrapes: self.supported_scrapes(),
            urls: self
                .by_url
                .iter()
                .flat_map(|m| m.patterns.iter().cloned())
                .collect(),
        }
    }
}

/// What a definition offers for one content type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeSummary {
    pub supported_scrapes: Vec<ScrapeType>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
}

/// Listing entry for a definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefinitionSummary {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performer: Option<TypeSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<TypeSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gallery: Option<TypeSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub movie: Option<TypeSummary>,
}

/// A loaded scraper definition.
#[derive(Debug, Clone, Default)]
pub struct ScraperDefinition {
    pub id: String,
    pub name: String,
    /// Directory of the definition file. Scripts run here.
    pub dir: Option<PathBuf>,
    pub performer: Option<TypeSpec>,
    pub scene: Option<TypeSpec>,
    pub gallery: Option<TypeSpec>,
    pub movie: Option<TypeSpec>,
    pub xpath_scrapers: BTreeMap<String, Arc<MappedScraper>>,
    pub json_scrapers: BTreeMap<String, Arc<MappedScraper>>,
    pub stash_server: Option<StashServer>,
    pub driver: Option<DriverOptions>,
    pub debug: DebugOptions,
}

impl ScraperDefinition {
    /// Load a definition file. The id is the file stem.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                ScrapeError::Configuration(format!("invalid definition path {}", path.display()))
            })?
            .to_string();

        let contents = std::fs::read_to_string(path).map_err(|e| {
            ScrapeError::Configuration(format!("failed to read {}: {}", path.display(), e))
        })?;

        Self::from_yaml(&id, &contents, path.parent().map(Path::to_path_buf))
    }

    /// Parse and validate a definition from YAML text.
    pub fn from_yaml(id: &str, yaml: &str, dir: Option<PathBuf>) -> Result<Self> {
        let file: DefinitionFile = serde_yaml::from_str(yaml)
            .map_err(|e| ScrapeError::Configuration(format!("{}: {}", id, e)))?;
        Self::from_file(id, file, dir)
    }

    fn from_file(id: &str, file: DefinitionFile, dir: Option<PathBuf>) -> Result<Self> {
        let validate_blocks = |blocks: BTreeMap<String, MappedScraper>, section: &str| {
            blocks
                .into_iter()
                .map(|(name, mut scraper)| {
                    scraper.validate(&format!("{}.{}", section, name));
                    (name, Arc::new(scraper))
                })
                .collect::<BTreeMap<_, _>>()
        };

        let mut def = ScraperDefinition {
            id: id.to_string(),
            name: if file.name.is_empty() {
                id.to_string()
            } else {
                file.name.clone()
            },
            dir,
            xpath_scrapers: validate_blocks(file.xpath_scrapers, "xPathScrapers"),
            json_scrapers: validate_blocks(file.json_scrapers, "jsonScrapers"),
            stash_server: file.stash_server,
            driver: file.driver,
            debug: file.debug.unwrap_or_default(),
            ..Default::default()
        };

        def.performer = def.type_spec(
            file.performer_by_name.as_ref(),
            file.performer_by_fragment.as_ref(),
            &file.performer_by_url,
        )?;
        def.scene = def.type_spec(
            file.scene_by_name.as_ref(),
            file.scene_by_fragment.as_ref(),
            &file.scene_by_url,
        )?;
        def.gallery = def.type_spec(None, file.gallery_by_fragment.as_ref(), &file.gallery_by_url)?;
        def.movie = def.type_spec(None, None, &file.movie_by_url)?;

        Ok(def)
    }

    fn type_spec(
        &self,
        by_name: Option<&ActionSpec>,
        by_fragment: Option<&ActionSpec>,
        by_url: &[UrlActionSpec],
    ) -> Result<Option<TypeSpec>> {
        let spec = TypeSpec {
            by_name: by_name.map(|s| self.action(s)).transpose()?,
            by_fragment: by_fragment.map(|s| self.action(s)).transpose()?,
            by_url: by_url
                .iter()
                .map(|u| {
                    Ok(UrlMatcher {
                        patterns: u.url.clone(),
                        action: self.action(&u.spec)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?,
        };

        Ok((!spec.is_empty()).then_some(spec))
    }

    fn action(&self, spec: &ActionSpec) -> Result<AdapterAction> {
        let config_err = |msg: String| ScrapeError::Configuration(format!("{}: {}", self.id, msg));

        match spec.action {
            ActionKind::Script => {
                if spec.script.is_empty() {
                    return Err(config_err("script action requires a command".to_string()));
                }
                Ok(AdapterAction::Script {
                    argv: spec.script.clone(),
                })
            }
            ActionKind::ScrapeXPath | ActionKind::ScrapeJson => {
                let scraper = spec.scraper.clone().ok_or_else(|| {
                    config_err(format!("{} action requires a scraper", spec.action.as_str()))
                })?;
                let blocks = if spec.action == ActionKind::ScrapeXPath {
                    &self.xpath_scrapers
                } else {
                    &self.json_scrapers
                };
                if !blocks.contains_key(&scraper) {
                    return Err(config_err(format!("scraper {} not found", scraper)));
                }

                let doc = DocAction {
                    scraper,
                    query_url: spec.query_url.clone().filter(|u| !u.is_empty()),
                    replacements: spec.query_url_replace.clone(),
                };
                Ok(if spec.action == ActionKind::ScrapeXPath {
                    AdapterAction::MarkupDoc(doc)
                } else {
                    AdapterAction::JsonDoc(doc)
                })
            }
            ActionKind::Stash => {
                if self.stash_server.is_none() {
                    return Err(config_err("stash action requires stashServer".to_string()));
                }
                Ok(AdapterAction::RemoteCatalog)
            }
        }
    }

    pub fn spec(&self, ty: ContentType) -> Option<&TypeSpec> {
        match ty {
            ContentType::Performer => self.performer.as_ref(),
            ContentType::Scene => self.scene.as_ref(),
            ContentType::Gallery => self.gallery.as_ref(),
            ContentType::Movie => self.movie.as_ref(),
        }
    }

    pub fn supports(&self, ty: ContentType) -> bool {
        self.spec(ty).is_some()
    }

    /// Mapping block named by a document action.
    pub fn mapping(&self, action: &AdapterAction) -> Option<&Arc<MappedScraper>> {
        match action {
            AdapterAction::MarkupDoc(doc) => self.xpath_scrapers.get(&doc.scraper),
            AdapterAction::JsonDoc(doc) => self.json_scrapers.get(&doc.scraper),
            _ => None,
        }
    }

    pub fn summary(&self) -> DefinitionSummary {
        DefinitionSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            performer: self.performer.as_ref().map(TypeSpec::summary),
            scene: self.scene.as_ref().map(TypeSpec::summary),
            gallery: self.gallery.as_ref().map(TypeSpec::summary),
            movie: self.movie.as_ref().map(TypeSpec::summary),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINITION: &str = r#"
name: Example Site
sceneByURL:
  - action: scrapeXPath
    url:
      - example.com/scenes/
    scraper: sceneScraper
sceneByFragment:
  action: scrapeXPath
  queryURL: "https://example.com/search?q={filename}"
  queryURLReplace:
    filename:
      - regex: '\..+$'
        with: ""
  scraper: sceneScraper
performerByName:
  action: script
  script:
    - python
    - example.py
    - search
groupByURL:
  - action: scrapeJson
    url:
      - api.example.com/movies
    scraper: movieScraper
xPathScrapers:
  sceneScraper:
    scene:
      Title: //h1
jsonScrapers:
  movieScraper:
    movie:
      Name: data.name
driver:
  useCDP: true
  sleep: 3
"#;

    #[test]
    fn test_load_definition() {
        let def = ScraperDefinition::from_yaml("example", DEFINITION, None).unwrap();
        assert_eq!(def.name, "Example Site");

        let scene = def.scene.as_ref().unwrap();
        assert_eq!(
            scene.supported_scrapes(),
            vec![ScrapeType::Fragment, ScrapeType::Url]
        );
        let action = scene.url_action("https://example.com/scenes/42").unwrap();
        assert!(matches!(action, AdapterAction::MarkupDoc(d) if d.scraper == "sceneScraper"));
        assert!(scene.url_action("https://other.com/scenes/42").is_none());

        let Some(AdapterAction::MarkupDoc(frag)) = scene.by_fragment.as_ref() else {
            panic!("expected xpath fragment action");
        };
        assert_eq!(frag.replacements["filename"].len(), 1);

        assert!(matches!(
            def.performer.as_ref().unwrap().by_name,
            Some(AdapterAction::Script { ref argv }) if argv.len() == 3
        ));
        assert!(def.movie.is_some());
        assert!(def.gallery.is_none());
        assert!(def.driver.as_ref().unwrap().use_cdp);
    }

    #[test]
    fn test_name_defaults_to_id() {
        let def = ScraperDefinition::from_yaml(
            "bare",
            "sceneByURL:\n  - action: script\n    url: [bare.com]\n    script: [./bare.sh]\n",
            None,
        )
        .unwrap();
        assert_eq!(def.name, "bare");
    }

    #[test]
    fn test_unknown_scraper_reference() {
        let yaml = "sceneByURL:\n  - action: scrapeXPath\n    url: [x.com]\n    scraper: missing\n";
        let err = ScraperDefinition::from_yaml("broken", yaml, None).unwrap_err();
        assert!(matches!(err, ScrapeError::Configuration(ref m) if m.contains("missing")));
    }

    #[test]
    fn test_stash_requires_server() {
        let yaml = "performerByName:\n  action: stash\n";
        let err = ScraperDefinition::from_yaml("stash", yaml, None).unwrap_err();
        assert!(matches!(err, ScrapeError::Configuration(_)));
    }

    #[test]
    fn test_mixed_post_process_styles_rejected() {
        let yaml = r#"
sceneByURL:
  - action: scrapeXPath
    url: [x.com]
    scraper: s
xPathScrapers:
  s:
    scene:
      Date:
        selector: //time
        parseDate: 2006-01-02
        postProcess:
          - parseDate: January 2, 2006
"#;
        let err = ScraperDefinition::from_yaml("mixed", yaml, None).unwrap_err();
        assert!(matches!(err, ScrapeError::Configuration(ref m) if m.contains("postProcess")));
    }

    #[test]
    fn test_javascript_post_process_rejected() {
        let yaml = r#"
sceneByURL:
  - action: scrapeXPath
    url: [x.com]
    scraper: s
xPathScrapers:
  s:
    scene:
      Title:
        selector: //h1
        postProcess:
          - javascript: return value.toUpperCase();
"#;
        let err = ScraperDefinition::from_yaml("js", yaml, None).unwrap_err();
        assert!(matches!(
            err,
            ScrapeError::Configuration(ref m) if m.contains("Title") && m.contains("javascript")
        ));
    }

    #[test]
    fn test_summary() {
        let def = ScraperDefinition::from_yaml("example", DEFINITION, None).unwrap();
        let summary = def.summary();
        assert_eq!(summary.scene.unwrap().urls, vec!["example.com/scenes/"]);
        assert_eq!(
            summary.performer.unwrap().supported_scrapes,
            vec![ScrapeType::Name]
        );
    }
}
