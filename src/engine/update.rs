// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Update path, including identifier renames.
//!
//! Four combinations of (rename?, image?):
//!
//! | rename | image | local transition            | remote operation(s)            |
//! |--------|-------|-----------------------------|--------------------------------|
//! | no     | no    | merge now                   | partial update at old key      |
//! | no     | yes   | merge after decode          | partial update after upload    |
//! | yes    | no    | merge now                   | read-old, write-new, delete-old|
//! | yes    | yes   | merge after decode          | read-old, write-new, delete-old; upload runs concurrently |
//!
//! A rename is deliberately non-atomic: read-old → write-new → delete-old,
//! no transaction. Confirmation is emitted after delete-old succeeds (or
//! after the partial update in the non-rename paths). While a rename is
//! unconfirmed, subscription reconciliation for either id is deferred.
//!
//! Quirk carried over from the observed system: when a rename also carries
//! an image payload, the merged document written at the new key embeds the
//! original update intent under a nested `patch` field instead of
//! flattening it.

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::item::ItemPatch;
use crate::store::Transition;

use super::{SyncEngine, SyncSignal};

impl SyncEngine {
    /// Issue an update intent against the item with identifier `id`.
    ///
    /// A patch carrying a new `id` renames the entity. Patches without an
    /// image payload apply their local transition synchronously; with one,
    /// the local transition lands once the inline representation has been
    /// decoded.
    pub fn update_item(&self, id: &str, patch: ItemPatch) {
        let id = id.to_string();
        match (patch.id.clone(), patch.image.clone()) {
            (None, None) => {
                let props = patch.props();
                self.store.apply(&Transition::Update { id: id.clone(), props: props.clone() });
                self.emit(SyncSignal::ItemUpdated { id: id.clone() });

                let engine = self.clone();
                tokio::spawn(async move {
                    engine.sync_partial_update(&id, props).await;
                });
            }
            (None, Some(bytes)) => {
                let engine = self.clone();
                let local_id = id.clone();
                let local_props = patch.props();
                let decode_bytes = bytes.clone();
                tokio::spawn(async move {
                    engine.apply_patch_with_inline(&local_id, local_props, &decode_bytes).await;
                });

                let engine = self.clone();
                let props = patch.props();
                tokio::spawn(async move {
                    engine.sync_image_update(&id, props, bytes).await;
                });
            }
            (Some(new_id), None) => {
                self.store.apply(&Transition::Update { id: id.clone(), props: patch.props() });
                self.emit(SyncSignal::ItemUpdated { id: id.clone() });
                self.renames_in_flight.insert(id.clone(), new_id.clone());

                let engine = self.clone();
                tokio::spawn(async move {
                    engine.sync_rename(&id, &new_id, &patch, false).await;
                });
            }
            (Some(new_id), Some(bytes)) => {
                self.renames_in_flight.insert(id.clone(), new_id.clone());

                let engine = self.clone();
                let local_id = id.clone();
                let local_props = patch.props();
                let decode_bytes = bytes.clone();
                tokio::spawn(async move {
                    engine.apply_patch_with_inline(&local_id, local_props, &decode_bytes).await;
                });

                // Blob lands at the intent's target id; outcome is logged
                // only, the rename does not wait for it
                let engine = self.clone();
                let upload_id = id.clone();
                tokio::spawn(async move {
                    engine.upload_image_only(&upload_id, bytes).await;
                });

                let engine = self.clone();
                tokio::spawn(async move {
                    engine.sync_rename(&id, &new_id, &patch, true).await;
                });
            }
        }
    }

    /// Decode the inline representation, then apply the full patch props
    /// locally in one transition.
    async fn apply_patch_with_inline(&self, id: &str, mut props: Map<String, Value>, bytes: &[u8]) {
        match self.decoder.decode_inline(bytes).await {
            Ok(uri) => {
                props.insert("image".to_string(), Value::String(uri));
            }
            Err(e) => {
                warn!(id, error = %e, "image decode failed; applying update without image");
            }
        }
        self.store.apply(&Transition::Update { id: id.to_string(), props });
        self.emit(SyncSignal::ItemUpdated { id: id.to_string() });
    }

    async fn sync_partial_update(&self, id: &str, props: Map<String, Value>) {
        match self.remote.write_partial(&self.item_path(id), props).await {
            Ok(()) => {
                debug!(id, "item update synced");
                self.emit(SyncSignal::ItemUpdateSynced { id: id.to_string() });
            }
            Err(e) => {
                error!(id, error = %e, "remote partial update failed");
                self.emit(SyncSignal::ItemUpdateFailed {
                    id: id.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Upload the new image, then issue the partial update with the durable
    /// reference substituted in. An upload failure aborts the remote write.
    async fn sync_image_update(&self, id: &str, mut props: Map<String, Value>, bytes: Vec<u8>) {
        let path = self.image_path(id);
        match self.blobs.upload(&path, bytes).await {
            Ok(url) => {
                props.insert("image".to_string(), Value::String(url));
                self.sync_partial_update(id, props).await;
            }
            Err(e) => {
                error!(id, error = %e, "image upload failed; update will not sync");
                self.emit(SyncSignal::ItemUpdateFailed {
                    id: id.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn upload_image_only(&self, id: &str, bytes: Vec<u8>) {
        let path = self.image_path(id);
        match self.blobs.upload(&path, bytes).await {
            Ok(url) => debug!(id, url = %url, "item image uploaded"),
            Err(e) => error!(id, error = %e, "image upload failed during rename"),
        }
    }

    /// Non-atomic rename: read-old → write-new → delete-old.
    ///
    /// `embed_intent` selects the rename+image document shape (intent
    /// nested under `patch`) over the flat shallow merge.
    async fn sync_rename(&self, old_id: &str, new_id: &str, patch: &ItemPatch, embed_intent: bool) {
        let old_path = self.item_path(old_id);

        let base = match self.remote.read(&old_path).await {
            Ok(Some(Value::Object(doc))) => doc,
            Ok(_) => {
                warn!(id = old_id, "no remote document for rename; starting from empty");
                Map::new()
            }
            Err(e) => {
                error!(id = old_id, error = %e, "rename read failed");
                self.renames_in_flight.remove(old_id);
                self.emit(SyncSignal::ItemUpdateFailed {
                    id: old_id.to_string(),
                    reason: e.to_string(),
                });
                return;
            }
        };

        let mut merged = base;
        if embed_intent {
            merged.insert("patch".to_string(), patch.as_intent_value());
        } else {
            for (key, value) in patch.props() {
                if value.is_null() {
                    merged.shift_remove(&key);
                } else {
                    merged.insert(key, value);
                }
            }
        }

        if let Err(e) = self
            .remote
            .write_full(&self.item_path(new_id), Value::Object(merged))
            .await
        {
            error!(old_id, new_id, error = %e, "rename write at new key failed");
            self.renames_in_flight.remove(old_id);
            self.emit(SyncSignal::ItemUpdateFailed {
                id: new_id.to_string(),
                reason: e.to_string(),
            });
            return;
        }

        // Delete-old is a null tombstone on the collection node. A change
        // notification for the old key racing this delete is ignorable:
        // once the delete succeeds the key no longer exists.
        let mut tombstone = Map::new();
        tombstone.insert(old_id.to_string(), Value::Null);
        match self
            .remote
            .write_partial(&self.config.collection_path, tombstone)
            .await
        {
            Ok(()) => {
                debug!(old_id, new_id, "rename synced");
                self.renames_in_flight.remove(old_id);
                self.emit(SyncSignal::ItemUpdateSynced { id: new_id.to_string() });
            }
            Err(e) => {
                error!(old_id, new_id, error = %e, "rename delete-old failed");
                self.renames_in_flight.remove(old_id);
                self.emit(SyncSignal::ItemUpdateFailed {
                    id: new_id.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
}
