// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Reconciliation engine.
//!
//! The [`SyncEngine`] owns the mapping from local optimistic intent to
//! remote operations and merges inbound remote change events back into
//! local state. Every intent follows the same shape:
//!
//! ```text
//! caller intent ──► local transition (synchronous, optimistic)
//!                        │
//!                        ▼
//!                 spawned remote continuation
//!                (blob upload → remote write)
//!                        │
//!                        ▼
//!              Synced / Failed broadcast signal
//! ```
//!
//! Independently, [`fetch_and_subscribe`](SyncEngine::fetch_and_subscribe)
//! runs a standing subscription that reconciles server-confirmed stock
//! changes into the local store.
//!
//! There are no retries and no rollback: a failed remote operation is
//! terminal for that intent, leaves the optimistic local state in place,
//! and is surfaced through a `*Failed` signal.

mod types;

mod create;
mod fetch;
mod remove;
mod update;

pub use types::{SyncError, SyncSignal};

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::config::EngineConfig;
use crate::item::InventoryItem;
use crate::storage::traits::{BlobStore, ImageDecoder, RemoteStore};
use crate::store::{Snapshot, StateStore};

/// The reconciliation engine.
///
/// Cheap to clone: clones share the same state store, adapters and signal
/// channel, which is how spawned remote continuations keep working after
/// the original handle is dropped.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use inventory_sync::{EngineConfig, NewItem, SyncEngine};
/// use inventory_sync::storage::memory::{DataUriDecoder, InMemoryBlobs, InMemoryRemote};
///
/// #[tokio::main]
/// async fn main() {
///     let engine = SyncEngine::new(
///         EngineConfig::default(),
///         Arc::new(InMemoryRemote::new()),
///         Arc::new(InMemoryBlobs::new()),
///         Arc::new(DataUriDecoder::default()),
///     );
///
///     let mut signals = engine.subscribe_signals();
///     engine.fetch_and_subscribe().await.expect("initial load");
///
///     engine.add_item(NewItem {
///         id: "sku-1".into(),
///         stock: 10,
///         ..Default::default()
///     });
///
///     while let Ok(signal) = signals.recv().await {
///         println!("{signal:?}");
///     }
/// }
/// ```
#[derive(Clone)]
pub struct SyncEngine {
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) remote: Arc<dyn RemoteStore>,
    pub(crate) blobs: Arc<dyn BlobStore>,
    pub(crate) decoder: Arc<dyn ImageDecoder>,
    pub(crate) store: StateStore,
    pub(crate) signals: broadcast::Sender<SyncSignal>,
    /// Unconfirmed renames, old id → new id. Reconciliation for either id
    /// is deferred until the rename's delete-old confirms.
    pub(crate) renames_in_flight: Arc<DashMap<String, String>>,
}

impl SyncEngine {
    /// Create an engine over the given adapters. The local store starts
    /// empty; call [`fetch_and_subscribe`](Self::fetch_and_subscribe) to
    /// load from the remote store.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        remote: Arc<dyn RemoteStore>,
        blobs: Arc<dyn BlobStore>,
        decoder: Arc<dyn ImageDecoder>,
    ) -> Self {
        let (signals, _) = broadcast::channel(config.signal_capacity.max(1));
        Self {
            config: Arc::new(config),
            remote,
            blobs,
            decoder,
            store: StateStore::new(),
            signals,
            renames_in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Handle to the local state store.
    #[must_use]
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Latest local snapshot.
    #[must_use]
    pub fn state(&self) -> Snapshot {
        self.store.latest()
    }

    /// Subscribe to engine signals. Subscribe before issuing intents;
    /// a lagging receiver drops the oldest signals.
    #[must_use]
    pub fn subscribe_signals(&self) -> broadcast::Receiver<SyncSignal> {
        self.signals.subscribe()
    }

    pub(crate) fn emit(&self, signal: SyncSignal) {
        // No receivers is not an error; signals are advisory
        let _ = self.signals.send(signal);
    }

    pub(crate) fn item_path(&self, id: &str) -> String {
        format!("{}/{}", self.config.collection_path, id)
    }

    pub(crate) fn image_path(&self, id: &str) -> String {
        format!("{}/{}.{}", self.config.image_dir, id, self.config.image_ext)
    }

    pub(crate) fn find_local(&self, id: &str) -> Option<InventoryItem> {
        self.store.latest().iter().find(|item| item.id == id).cloned()
    }
}

pub(crate) fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
