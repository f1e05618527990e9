//! Remove path: fully optimistic batched removal.
//!
//! The local remove lands before any remote operation. Blob cleanup is
//! best-effort per item and never gates confirmation; the one remote call
//! that does is a single batched tombstone write on the collection node.

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::item::InventoryItem;
use crate::store::Transition;

use super::{SyncEngine, SyncSignal};

impl SyncEngine {
    /// Issue a remove intent for the given entities.
    ///
    /// Entities are matched in the local store by identity (value
    /// equality), not by id; pass the entities as they appear in the
    /// current snapshot. Confirmation arrives as
    /// [`SyncSignal::ItemsRemoveSynced`] once the batched tombstone write
    /// succeeds.
    pub fn remove_items(&self, items: Vec<InventoryItem>) {
        let ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();

        self.store.apply(&Transition::Remove { items });
        self.emit(SyncSignal::ItemsRemoved { ids: ids.clone() });

        // Best-effort blob cleanup; failures are logged and ignored
        for id in &ids {
            let engine = self.clone();
            let path = self.image_path(id);
            let id = id.clone();
            tokio::spawn(async move {
                match engine.blobs.delete(&path).await {
                    Ok(()) => debug!(id = %id, "item image deleted"),
                    Err(e) => warn!(id = %id, error = %e, "blob delete failed; continuing"),
                }
            });
        }

        let engine = self.clone();
        tokio::spawn(async move {
            let mut tombstones = Map::new();
            for id in &ids {
                tombstones.insert(id.clone(), Value::Null);
            }

            match engine
                .remote
                .write_partial(&engine.config.collection_path, tombstones)
                .await
            {
                Ok(()) => {
                    debug!(count = ids.len(), "batched removal synced");
                    engine.emit(SyncSignal::ItemsRemoveSynced { ids });
                }
                Err(e) => {
                    error!(error = %e, "batched tombstone write failed");
                    engine.emit(SyncSignal::ItemsRemoveFailed { ids, reason: e.to_string() });
                }
            }
        });
    }
}
