//! On-disk YAML schema for scraper definitions.
//!
//! These types mirror the file format one to one. [`super::ScraperDefinition`]
//! is built from them after validation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::scrapers::mapped::{MappedScraper, RegexReplace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ActionKind {
    #[serde(rename = "script")]
    Script,
    #[serde(rename = "scrapeXPath")]
    ScrapeXPath,
    #[serde(rename = "scrapeJson")]
    ScrapeJson,
    #[serde(rename = "stash")]
    Stash,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Script => "script",
            ActionKind::ScrapeXPath => "scrapeXPath",
            ActionKind::ScrapeJson => "scrapeJson",
            ActionKind::Stash => "stash",
        }
    }
}

/// Per-parameter regex rewrite rules applied before URL substitution.
pub type QueryUrlReplacements = BTreeMap<String, Vec<RegexReplace>>;

/// One strategy entry (`performerByName`, `sceneByFragment`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct ActionSpec {
    pub action: ActionKind,
    #[serde(default)]
    pub script: Vec<String>,
    #[serde(default)]
    pub scraper: Option<String>,
    #[serde(default, rename = "queryURL")]
    pub query_url: Option<String>,
    #[serde(default, rename = "queryURLReplace")]
    pub query_url_replace: QueryUrlReplacements,
}

/// A by-URL entry: an action plus the URL substrings it handles.
#[derive(Debug, Clone, Deserialize)]
pub struct UrlActionSpec {
    #[serde(flatten)]
    pub spec: ActionSpec,
    #[serde(default)]
    pub url: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StashServer {
    pub url: String,
    #[serde(default, rename = "apiKey", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CookieEntry {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: String,
    #[serde(rename = "Domain", default)]
    pub domain: Option<String>,
    #[serde(rename = "Path", default)]
    pub path: Option<String>,
}

/// Cookies to inject for one URL.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CookieSet {
    #[serde(rename = "CookieURL")]
    pub cookie_url: String,
    #[serde(rename = "Cookies", default)]
    pub cookies: Vec<CookieEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HeaderEntry {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value", default)]
    pub value: String,
}

/// Fetch options shared by every document action of a definition.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DriverOptions {
    #[serde(rename = "useCDP", default)]
    pub use_cdp: bool,
    /// Settle time in seconds after browser navigation.
    #[serde(default)]
    pub sleep: Option<u64>,
    #[serde(default)]
    pub cookies: Vec<CookieSet>,
    #[serde(default)]
    pub headers: Vec<HeaderEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DebugOptions {
    #[serde(rename = "printHTML", default)]
    pub print_html: bool,
}

/// A definition file as written.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefinitionFile {
    #[serde(default)]
    pub name: String,

    #[serde(default, rename = "performerByName")]
    pub performer_by_name: Option<ActionSpec>,
    #[serde(default, rename = "performerByFragment")]
    pub performer_by_fragment: Option<ActionSpec>,
    #[serde(default, rename = "performerByURL")]
    pub performer_by_url: Vec<UrlActionSpec>,

    #[serde(default, rename = "sceneByName")]
    pub scene_by_name: Option<ActionSpec>,
    #[serde(default, rename = "sceneByFragment")]
    pub scene_by_fragment: Option<ActionSpec>,
    #[serde(default, rename = "sceneByURL")]
    pub scene_by_url: Vec<UrlActionSpec>,

    #[serde(default, rename = "galleryByFragment")]
    pub gallery_by_fragment: Option<ActionSpec>,
    #[serde(default, rename = "galleryByURL")]
    pub gallery_by_url: Vec<UrlActionSpec>,

    #[serde(default, rename = "movieByURL", alias = "groupByURL")]
    pub movie_by_url: Vec<UrlActionSpec>,

    #[serde(default, rename = "xPathScrapers")]
    pub xpath_scrapers: BTreeMap<String, MappedScraper>,
    #[serde(default, rename = "jsonScrapers")]
    pub json_scrapers: BTreeMap<String, MappedScraper>,

    #[serde(default, rename = "stashServer")]
    pub stash_server: Option<StashServer>,

    #[serde(default)]
    pub driver: Option<DriverOptions>,

    #[serde(default)]
    pub debug: Option<DebugOptions>,
}
