//! In-memory catalog for single-process use and tests.
//!
//! A transaction holds the catalog lock for its whole lifetime and works on a
//! copy of the state, which replaces the shared state on commit.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    Catalog, CatalogError, CatalogResult, CatalogTxn, NamedEntity, NamedKind, StoredGallery,
    StoredScene,
};

/// Catalog contents. Also the JSON seed format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogState {
    pub performers: Vec<NamedEntity>,
    pub studios: Vec<NamedEntity>,
    pub tags: Vec<NamedEntity>,
    pub movies: Vec<NamedEntity>,
    pub scenes: Vec<StoredScene>,
    pub galleries: Vec<StoredGallery>,
}

impl CatalogState {
    fn entities(&self, kind: NamedKind) -> &Vec<NamedEntity> {
        match kind {
            NamedKind::Performer => &self.performers,
            NamedKind::Studio => &self.studios,
            NamedKind::Tag => &self.tags,
            NamedKind::Movie => &self.movies,
        }
    }

    fn entities_mut(&mut self, kind: NamedKind) -> &mut Vec<NamedEntity> {
        match kind {
            NamedKind::Performer => &mut self.performers,
            NamedKind::Studio => &mut self.studios,
            NamedKind::Tag => &mut self.tags,
            NamedKind::Movie => &mut self.movies,
        }
    }

    /// Next free numeric id for a kind.
    fn next_id(&self, kind: NamedKind) -> String {
        let max = self
            .entities(kind)
            .iter()
            .filter_map(|e| e.id.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        (max + 1).to_string()
    }
}

/// Mutex-guarded in-process catalog.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    state: Arc<Mutex<CatalogState>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: CatalogState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Seed a catalog from a JSON document.
    pub fn from_json(json: &str) -> CatalogResult<Self> {
        let state: CatalogState =
            serde_json::from_str(json).map_err(|e| CatalogError::Serialization(e.to_string()))?;
        Ok(Self::from_state(state))
    }

    /// Seed a catalog from a JSON file.
    pub fn load(path: &Path) -> CatalogResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Copy of the current committed state.
    pub async fn snapshot(&self) -> CatalogState {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn begin(&self) -> CatalogResult<Box<dyn CatalogTxn>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTxn { guard, working }))
    }
}

struct MemoryTxn {
    guard: OwnedMutexGuard<CatalogState>,
    working: CatalogState,
}

#[async_trait]
impl CatalogTxn for MemoryTxn {
    async fn find_by_name(
        &mut self,
        kind: NamedKind,
        name: &str,
    ) -> CatalogResult<Option<NamedEntity>> {
        let needle = name.to_lowercase();
        Ok(self
            .working
            .entities(kind)
            .iter()
            .find(|e| e.name.to_lowercase() == needle)
            .cloned())
    }

    async fn find_by_id(&mut self, kind: NamedKind, id: &str) -> CatalogResult<Option<NamedEntity>> {
        Ok(self
            .working
            .entities(kind)
            .iter()
            .find(|e| e.id == id)
            .cloned())
    }

    async fn create(
        &mut self,
        kind: NamedKind,
        name: &str,
        checksum: Option<&str>,
    ) -> CatalogResult<NamedEntity> {
        let lower = name.to_lowercase();
        if self
            .working
            .entities(kind)
            .iter()
            .any(|e| e.name.to_lowercase() == lower)
        {
            return Err(CatalogError::Conflict(format!("{} {}", kind.as_str(), name)));
        }

        let entity = NamedEntity {
            id: self.working.next_id(kind),
            name: name.to_string(),
            aliases: Vec::new(),
            checksum: checksum.map(str::to_string),
        };
        self.working.entities_mut(kind).push(entity.clone());
        Ok(entity)
    }

    async fn all_named(&mut self, kind: NamedKind) -> CatalogResult<Vec<NamedEntity>> {
        Ok(self.working.entities(kind).clone())
    }

    async fn find_scene(&mut self, id: &str) -> CatalogResult<Option<StoredScene>> {
        Ok(self.working.scenes.iter().find(|s| s.id == id).cloned())
    }

    async fn find_gallery(&mut self, id: &str) -> CatalogResult<Option<StoredGallery>> {
        Ok(self.working.galleries.iter().find(|g| g.id == id).cloned())
    }

    async fn commit(self: Box<Self>) -> CatalogResult<()> {
        let MemoryTxn { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r#"{
        "performers": [{"id": "1", "name": "Jane Doe"}],
        "tags": [{"id": "4", "name": "Outdoor"}],
        "scenes": [{"id": "10", "title": "Beach", "path": "/media/jane_doe_beach.mp4"}]
    }"#;

    #[tokio::test]
    async fn test_find_by_name_is_case_insensitive() {
        let catalog = MemoryCatalog::from_json(SEED).unwrap();
        let mut txn = catalog.begin().await.unwrap();
        let found = txn
            .find_by_name(NamedKind::Performer, "jane DOE")
            .await
            .unwrap();
        assert_eq!(found.map(|e| e.id), Some("1".to_string()));
        assert!(txn
            .find_by_name(NamedKind::Performer, "Jane")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_create_assigns_next_id_and_commits() {
        let catalog = MemoryCatalog::from_json(SEED).unwrap();
        let mut txn = catalog.begin().await.unwrap();
        let created = txn
            .create(NamedKind::Tag, "Indoor", Some("abc"))
            .await
            .unwrap();
        assert_eq!(created.id, "5");
        txn.commit().await.unwrap();

        let state = catalog.snapshot().await;
        assert_eq!(state.tags.len(), 2);
        assert_eq!(state.tags[1].checksum.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_uncommitted_changes_are_discarded() {
        let catalog = MemoryCatalog::new();
        {
            let mut txn = catalog.begin().await.unwrap();
            txn.create(NamedKind::Studio, "Acme", None).await.unwrap();
        }
        assert!(catalog.snapshot().await.studios.is_empty());
    }

    #[tokio::test]
    async fn test_create_duplicate_conflicts() {
        let catalog = MemoryCatalog::from_json(SEED).unwrap();
        let mut txn = catalog.begin().await.unwrap();
        let err = txn
            .create(NamedKind::Tag, "outdoor", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_find_scene() {
        let catalog = MemoryCatalog::from_json(SEED).unwrap();
        let mut txn = catalog.begin().await.unwrap();
        let scene = txn.find_scene("10").await.unwrap().unwrap();
        assert_eq!(scene.title.as_deref(), Some("Beach"));
        assert!(txn.find_gallery("10").await.unwrap().is_none());
    }
}
