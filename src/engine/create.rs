//! Create path: optimistic local create, then image decode + upload, then
//! the remote full write.
//!
//! The decode and upload run concurrently and independently; the decoded
//! inline representation only refreshes local display and never gates the
//! remote write. The remote write waits only on the upload.

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::item::{ImageRef, InventoryItem, NewItem};
use crate::store::Transition;

use super::{epoch_millis, SyncEngine, SyncSignal};

impl SyncEngine {
    /// Issue a create intent.
    ///
    /// The local create transition is applied synchronously, before this
    /// method returns; the remote write is confirmed later through
    /// [`SyncSignal::ItemCreateSynced`] or surfaced through
    /// [`SyncSignal::ItemCreateFailed`]. When the intent carries an image
    /// payload, the local entity starts with a pending placeholder that is
    /// refreshed once the inline representation is decoded.
    pub fn add_item(&self, intent: NewItem) {
        let placeholder = intent.image.as_ref().map(|_| ImageRef::Pending);
        let item = intent.to_item(placeholder);
        self.store.apply(&Transition::Create { item });
        self.emit(SyncSignal::ItemCreated { id: intent.id.clone() });

        match intent.image.clone() {
            Some(bytes) => {
                let engine = self.clone();
                let id = intent.id.clone();
                let decode_bytes = bytes.clone();
                tokio::spawn(async move {
                    engine.refresh_inline_image(&id, &decode_bytes).await;
                });

                let engine = self.clone();
                tokio::spawn(async move {
                    engine.sync_new_item_with_image(intent, bytes).await;
                });
            }
            None => {
                let engine = self.clone();
                tokio::spawn(async move {
                    engine.write_new_item(intent.to_item(None)).await;
                });
            }
        }
    }

    /// Swap the local placeholder for the decoded inline representation.
    /// Display-only; a decode failure leaves the placeholder in place.
    async fn refresh_inline_image(&self, id: &str, bytes: &[u8]) {
        match self.decoder.decode_inline(bytes).await {
            Ok(uri) => {
                let mut props = Map::new();
                props.insert("image".to_string(), Value::String(uri));
                self.store.apply(&Transition::Update { id: id.to_string(), props });
                debug!(id, "inline image representation applied");
            }
            Err(e) => warn!(id, error = %e, "image decode failed; placeholder retained"),
        }
    }

    async fn sync_new_item_with_image(&self, intent: NewItem, bytes: Vec<u8>) {
        let path = self.image_path(&intent.id);
        let url = match self.blobs.upload(&path, bytes).await {
            Ok(url) => url,
            Err(e) => {
                error!(id = %intent.id, error = %e, "image upload failed; item will not sync");
                self.emit(SyncSignal::ItemCreateFailed {
                    id: intent.id.clone(),
                    reason: e.to_string(),
                });
                return;
            }
        };

        debug!(id = %intent.id, url = %url, "item image uploaded");
        self.write_new_item(intent.to_item(Some(ImageRef::Url(url)))).await;
    }

    /// Full replace of the item document, stamped with the write time.
    async fn write_new_item(&self, item: InventoryItem) {
        let id = item.id.clone();
        let mut doc = match serde_json::to_value(&item) {
            Ok(Value::Object(doc)) => doc,
            Ok(_) | Err(_) => {
                error!(id = %id, "item did not serialize to a document");
                self.emit(SyncSignal::ItemCreateFailed {
                    id,
                    reason: "item did not serialize to a document".to_string(),
                });
                return;
            }
        };
        doc.insert("timestamp".to_string(), Value::from(epoch_millis()));

        match self.remote.write_full(&self.item_path(&id), Value::Object(doc)).await {
            Ok(()) => {
                debug!(id = %id, "new item synced");
                self.emit(SyncSignal::ItemCreateSynced { id });
            }
            Err(e) => {
                error!(id = %id, error = %e, "remote write for new item failed");
                self.emit(SyncSignal::ItemCreateFailed { id, reason: e.to_string() });
            }
        }
    }
}
