//! In-memory persona directory kept current by change events.
//!
//! The directory is seeded by a full scan of a [`PersonaSource`] and then
//! follows a stream of [`PersonaChange`] events. Readers see a change once the
//! sync task has applied it.

use super::PersonaProfile;
use crate::error::{KbError, Result};
use crate::knowledge_store::KnowledgeStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Where the full persona list comes from.
#[async_trait]
pub trait PersonaSource: Send + Sync {
    async fn load_all(&self) -> Result<Vec<PersonaProfile>>;
}

/// A change to the persona set.
#[derive(Debug, Clone)]
pub enum PersonaChange {
    /// Created or updated.
    Upserted(PersonaProfile),
    /// Deleted, by id.
    Deleted(String),
}

/// Reads every `*.toml` profile in a directory.
pub struct TomlPersonaSource {
    dir: PathBuf,
}

impl TomlPersonaSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl PersonaSource for TomlPersonaSource {
    async fn load_all(&self) -> Result<Vec<PersonaProfile>> {
        if !self.dir.exists() {
            return Err(KbError::NotFound(format!(
                "Persona directory does not exist: {}",
                self.dir.display()
            )));
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        let mut profiles = Vec::with_capacity(paths.len());
        for path in paths {
            match PersonaProfile::from_file(&path) {
                Ok(profile) => profiles.push(profile),
                Err(e) => warn!("Skipping persona file {}: {}", path.display(), e),
            }
        }
        Ok(profiles)
    }
}

/// Cache of persona profiles by id.
#[derive(Default)]
pub struct PersonaDirectory {
    personas: RwLock<HashMap<String, PersonaProfile>>,
    store: Option<Arc<dyn KnowledgeStore>>,
}

impl PersonaDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delete an owner's knowledge when its persona is deleted.
    pub fn with_store(mut self, store: Arc<dyn KnowledgeStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, PersonaProfile>> {
        self.personas.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, PersonaProfile>> {
        self.personas.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the cache with a full scan of `source`. Returns the persona count.
    pub async fn refresh(&self, source: &dyn PersonaSource) -> Result<usize> {
        let profiles = source.load_all().await?;
        let map: HashMap<String, PersonaProfile> =
            profiles.into_iter().map(|p| (p.id.clone(), p)).collect();
        let count = map.len();

        *self.write() = map;
        info!("Loaded {} personas", count);
        Ok(count)
    }

    /// Apply one change event.
    pub async fn apply(&self, change: PersonaChange) -> Result<()> {
        match change {
            PersonaChange::Upserted(profile) => {
                debug!("Persona upserted: {}", profile.id);
                self.write().insert(profile.id.clone(), profile);
            }
            PersonaChange::Deleted(id) => {
                let removed = self.write().remove(&id).is_some();
                debug!("Persona deleted: {} (cached: {})", id, removed);

                if let Some(store) = &self.store {
                    let chunks = store.delete_owner(&id).await?;
                    info!("Deleted {} knowledge chunks of persona {}", chunks, id);
                }
            }
        }
        Ok(())
    }

    /// Apply changes from `rx` until the sender side closes.
    pub fn spawn_sync(self: Arc<Self>, mut rx: mpsc::Receiver<PersonaChange>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(change) = rx.recv().await {
                if let Err(e) = self.apply(change).await {
                    error!("Failed to apply persona change: {}", e);
                }
            }
            debug!("Persona change stream closed");
        })
    }

    pub fn get(&self, id: &str) -> Option<PersonaProfile> {
        self.read().get(id).cloned()
    }

    /// All personas, sorted by name.
    pub fn all(&self) -> Vec<PersonaProfile> {
        let mut personas: Vec<PersonaProfile> = self.read().values().cloned().collect();
        personas.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        personas
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge_store::{ChunkMetadata, KnowledgeChunk, MemoryKnowledgeStore};
    use crate::persona::sample_profile;

    struct FixedSource(Vec<PersonaProfile>);

    #[async_trait]
    impl PersonaSource for FixedSource {
        async fn load_all(&self) -> Result<Vec<PersonaProfile>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_refresh_replaces_cache() {
        let directory = PersonaDirectory::new();
        directory
            .apply(PersonaChange::Upserted(sample_profile("stale")))
            .await
            .unwrap();

        let count = directory
            .refresh(&FixedSource(vec![sample_profile("a"), sample_profile("b")]))
            .await
            .unwrap();

        assert_eq!(count, 2);
        assert!(directory.get("stale").is_none());
        assert!(directory.get("a").is_some());
    }

    #[tokio::test]
    async fn test_upsert_updates_existing() {
        let directory = PersonaDirectory::new();
        directory.apply(PersonaChange::Upserted(sample_profile("a"))).await.unwrap();

        let mut updated = sample_profile("a");
        updated.name = "Renamed".to_string();
        directory.apply(PersonaChange::Upserted(updated)).await.unwrap();

        assert_eq!(directory.len(), 1);
        assert_eq!(directory.get("a").unwrap().name, "Renamed");
    }

    #[tokio::test]
    async fn test_delete_cascades_to_store() {
        let store = Arc::new(MemoryKnowledgeStore::new());
        let chunk = KnowledgeChunk::new(
            "a",
            "some advice",
            vec![1.0, 0.0],
            ChunkMetadata {
                source_id: "vid".to_string(),
                source_title: "Video".to_string(),
                start_offset_seconds: 0.0,
            },
        );
        store.insert(&chunk).await.unwrap();

        let directory = PersonaDirectory::new().with_store(store.clone());
        directory.apply(PersonaChange::Upserted(sample_profile("a"))).await.unwrap();
        directory.apply(PersonaChange::Deleted("a".to_string())).await.unwrap();

        assert!(directory.is_empty());
        assert_eq!(store.count("a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sync_task_applies_events() {
        let directory = Arc::new(PersonaDirectory::new());
        let (tx, rx) = mpsc::channel(8);
        let handle = directory.clone().spawn_sync(rx);

        tx.send(PersonaChange::Upserted(sample_profile("a"))).await.unwrap();
        tx.send(PersonaChange::Upserted(sample_profile("b"))).await.unwrap();
        tx.send(PersonaChange::Deleted("a".to_string())).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let ids: Vec<String> = directory.all().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[tokio::test]
    async fn test_toml_source_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.toml"), "id = \"a\"\nname = \"A\"\n").unwrap();
        std::fs::write(dir.path().join("broken.toml"), "not = [valid").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let profiles = TomlPersonaSource::new(dir.path()).load_all().await.unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].id, "a");

        let missing = TomlPersonaSource::new(dir.path().join("nope")).load_all().await;
        assert!(matches!(missing, Err(KbError::NotFound(_))));
    }
}
