//! Fetch & subscribe path: initial full load, then a process-lifetime
//! subscription that reconciles server-confirmed stock changes.

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::item::InventoryItem;
use crate::store::Transition;

use super::{SyncEngine, SyncError, SyncSignal};

impl SyncEngine {
    /// Load the full collection, then start the standing subscription.
    ///
    /// Emits [`SyncSignal::FetchStarted`] immediately and
    /// [`SyncSignal::AllItemsLoaded`] once the local store holds the
    /// mapping's values in insertion order. A missing collection node loads
    /// as empty. Read or subscribe failures propagate as the returned
    /// error; the subscription itself lives for the rest of the process.
    pub async fn fetch_and_subscribe(&self) -> Result<(), SyncError> {
        self.emit(SyncSignal::FetchStarted);

        let collection = self.config.collection_path.as_str();
        let mut items: Vec<InventoryItem> = Vec::new();
        match self.remote.read(collection).await? {
            Some(Value::Object(mapping)) => {
                items.reserve(mapping.len());
                for (id, doc) in mapping {
                    match serde_json::from_value(doc) {
                        Ok(item) => items.push(item),
                        Err(e) => warn!(id = %id, error = %e, "skipping malformed remote document"),
                    }
                }
            }
            Some(_) => warn!(path = collection, "collection node is not a mapping; loading empty"),
            None => debug!(path = collection, "collection node absent; loading empty"),
        }

        let count = items.len();
        self.store.apply(&Transition::LoadAll { items });
        info!(count, "initial inventory load applied");
        self.emit(SyncSignal::AllItemsLoaded { count });

        let rx = self.remote.subscribe(collection).await?;
        let engine = self.clone();
        tokio::spawn(async move {
            engine.pump_notifications(rx).await;
        });
        Ok(())
    }

    async fn pump_notifications(&self, mut rx: mpsc::UnboundedReceiver<Value>) {
        while let Some(doc) = rx.recv().await {
            self.reconcile(doc);
        }
        debug!("remote notification stream closed");
    }

    /// Merge one inbound change notification into local state.
    ///
    /// Only stock differences are reconciled, by wholesale replacement with
    /// the notification's entity. The lookup runs against the latest
    /// snapshot; no match means the notification is skipped, never applied
    /// to some other entity.
    fn reconcile(&self, doc: Value) {
        let item: InventoryItem = match serde_json::from_value(doc) {
            Ok(item) => item,
            Err(e) => {
                warn!(error = %e, "ignoring malformed change notification");
                return;
            }
        };

        let rename_pending = self.renames_in_flight.contains_key(&item.id)
            || self.renames_in_flight.iter().any(|entry| entry.value() == &item.id);
        if rename_pending {
            debug!(id = %item.id, "rename in flight; deferring reconciliation");
            return;
        }

        match self.find_local(&item.id) {
            None => debug!(id = %item.id, "no local entity for change notification; skipping"),
            Some(local) if local.stock != item.stock => {
                let id = item.id.clone();
                let stock = item.stock;
                self.store.apply(&Transition::ApplyRemoteStock { item });
                debug!(id = %id, stock, "remote stock change reconciled");
                self.emit(SyncSignal::ItemStockReconciled { id, stock });
            }
            Some(_) => {}
        }
    }
}
