//! Local catalog contract.
//!
//! The scraper engine never owns durable entities. It reads stored scenes and
//! galleries and matches scraped names against catalog entities through this
//! trait, inside one transaction per request.

mod memory;

pub use memory::{CatalogState, MemoryCatalog};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors from catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Entity already exists: {0}")]
    Conflict(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Kinds of named entities the resolver can match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedKind {
    Performer,
    Studio,
    Tag,
    Movie,
}

impl NamedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NamedKind::Performer => "performer",
            NamedKind::Studio => "studio",
            NamedKind::Tag => "tag",
            NamedKind::Movie => "movie",
        }
    }
}

/// A stored performer, studio, tag or movie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedEntity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// A stored scene as seen by the scraper engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredScene {
    pub id: String,
    pub title: Option<String>,
    pub code: Option<String>,
    pub details: Option<String>,
    pub url: Option<String>,
    pub urls: Vec<String>,
    pub date: Option<String>,
    /// Primary file path.
    pub path: Option<String>,
    pub checksum: Option<String>,
    pub oshash: Option<String>,
}

/// A stored gallery as seen by the scraper engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredGallery {
    pub id: String,
    pub title: Option<String>,
    pub details: Option<String>,
    pub url: Option<String>,
    pub urls: Vec<String>,
    pub date: Option<String>,
    /// Zip file or folder path.
    pub path: Option<String>,
    pub checksum: Option<String>,
}

/// Entry point to the catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Start a transaction. Changes are discarded unless committed.
    async fn begin(&self) -> CatalogResult<Box<dyn CatalogTxn>>;
}

/// Operations available inside a catalog transaction.
#[async_trait]
pub trait CatalogTxn: Send {
    /// Find an entity by case-insensitive exact name.
    async fn find_by_name(&mut self, kind: NamedKind, name: &str)
        -> CatalogResult<Option<NamedEntity>>;

    async fn find_by_id(&mut self, kind: NamedKind, id: &str) -> CatalogResult<Option<NamedEntity>>;

    /// Create a new entity and return it with its assigned id.
    async fn create(
        &mut self,
        kind: NamedKind,
        name: &str,
        checksum: Option<&str>,
    ) -> CatalogResult<NamedEntity>;

    /// All entities of a kind, in id order.
    async fn all_named(&mut self, kind: NamedKind) -> CatalogResult<Vec<NamedEntity>>;

    async fn find_scene(&mut self, id: &str) -> CatalogResult<Option<StoredScene>>;

    async fn find_gallery(&mut self, id: &str) -> CatalogResult<Option<StoredGallery>>;

    async fn commit(self: Box<Self>) -> CatalogResult<()>;
}
