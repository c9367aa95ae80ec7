//! Process-wide collection cache with single-flight builds.
//!
//! Collections are keyed by [`crate::ingest::collection_key`]. The first
//! caller for a key runs the build; concurrent callers for the same key
//! wait on the same [`OnceCell`] and share its result, so a collection is
//! never embedded twice. A failed build leaves the key absent and the next
//! caller retries.
//!
//! With a [`CollectionStore`] attached, built collections are also written
//! to SQLite and reloaded from there on later runs.

use anyhow::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;

use crate::index::Collection;
use crate::store::{CollectionInfo, CollectionStore};

struct Slot {
    name: String,
    cell: Arc<OnceCell<Arc<Collection>>>,
}

pub struct CollectionCache {
    store: Option<CollectionStore>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl CollectionCache {
    /// A cache that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            store: None,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// A cache backed by a SQLite store.
    pub fn with_store(store: CollectionStore) -> Self {
        Self {
            store: Some(store),
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the collection for `key`, building it with `build` on a miss.
    ///
    /// Lookup order is memory, then the store, then `build`. A stored
    /// collection that fails to load is rebuilt and overwritten. A newly
    /// built collection supersedes any other cached collection named `name`.
    pub async fn get_or_build<F, Fut>(
        &self,
        key: &str,
        name: &str,
        build: F,
    ) -> Result<Arc<Collection>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Collection>>,
    {
        let cell = self
            .slots()
            .entry(key.to_string())
            .or_insert_with(|| Slot {
                name: name.to_string(),
                cell: Arc::new(OnceCell::new()),
            })
            .cell
            .clone();

        if let Some(collection) = cell.get() {
            tracing::debug!(key, "collection cache hit (memory)");
            return Ok(collection.clone());
        }

        let result = cell
            .get_or_try_init(|| async {
                if let Some(store) = &self.store {
                    match store.load(key).await {
                        Ok(Some(collection)) => {
                            tracing::info!(key, name, "collection cache hit (disk)");
                            return Ok(Arc::new(collection));
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(key, error = %e, "unreadable stored collection, rebuilding");
                        }
                    }
                }

                tracing::info!(key, name, "collection cache miss, building");
                let collection = build().await?;

                if let Some(store) = &self.store {
                    if let Err(e) = store.save(&collection).await {
                        tracing::warn!(key, error = %e, "failed to persist collection");
                    }
                }
                self.drop_other_slots_named(name, key);

                Ok::<_, anyhow::Error>(Arc::new(collection))
            })
            .await;

        match result {
            Ok(collection) => Ok(collection.clone()),
            Err(e) => {
                let mut slots = self.slots();
                let unset = slots
                    .get(key)
                    .map(|slot| Arc::ptr_eq(&slot.cell, &cell) && !slot.cell.initialized())
                    .unwrap_or(false);
                if unset {
                    slots.remove(key);
                }
                Err(e)
            }
        }
    }

    fn drop_other_slots_named(&self, name: &str, key: &str) {
        self.slots()
            .retain(|k, slot| k == key || slot.name != name);
    }

    /// True when `key` has a built collection in memory.
    pub fn contains(&self, key: &str) -> bool {
        self.slots()
            .get(key)
            .map(|slot| slot.cell.initialized())
            .unwrap_or(false)
    }

    /// Drop every collection whose key or name equals `name_or_key`, in
    /// memory and in the store. Returns the number of collections removed.
    pub async fn invalidate(&self, name_or_key: &str) -> Result<usize> {
        let mut removed: Vec<String> = {
            let mut slots = self.slots();
            let keys: Vec<String> = slots
                .iter()
                .filter(|(k, slot)| *k == name_or_key || slot.name == name_or_key)
                .map(|(k, _)| k.clone())
                .collect();
            for k in &keys {
                slots.remove(k);
            }
            keys
        };

        if let Some(store) = &self.store {
            for key in store.delete(name_or_key).await? {
                if !removed.contains(&key) {
                    removed.push(key);
                }
            }
        }

        tracing::info!(target_name = name_or_key, count = removed.len(), "invalidated collections");
        Ok(removed.len())
    }

    /// Known collections: the store's contents plus any memory-only builds.
    pub async fn list(&self) -> Result<Vec<CollectionInfo>> {
        let mut infos = match &self.store {
            Some(store) => store.list().await?,
            None => Vec::new(),
        };

        let memory: Vec<CollectionInfo> = self
            .slots()
            .values()
            .filter_map(|slot| slot.cell.get())
            .filter(|c| !infos.iter().any(|i| i.key == c.key))
            .map(|c| CollectionInfo {
                key: c.key.clone(),
                name: c.name.clone(),
                model: c.model.clone(),
                dims: c.dims,
                chunk_count: c.len(),
                created_at: c.created_at,
            })
            .collect();
        infos.extend(memory);

        Ok(infos)
    }
}
