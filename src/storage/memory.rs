// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory adapter implementations.
//!
//! [`InMemoryRemote`] is a hierarchical document store with insertion-ordered
//! collection reads, null-tombstone partial writes and child-changed
//! notification fan-out. [`InMemoryBlobs`] is a byte store handing out
//! `mem://` references. Both carry failure-injection toggles so the test
//! suite can exercise the engine's failure signals; [`InMemoryRemote`] can
//! also delay full writes to widen the rename window.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use super::traits::{BlobError, BlobStore, ImageDecoder, RemoteError, RemoteStore};

/// In-memory [`RemoteStore`].
///
/// Documents live at full slash-delimited paths (`inventory/sku-1`); reading
/// a parent path collects the immediate children into a mapping, preserving
/// the order the children were first written.
#[derive(Default)]
pub struct InMemoryRemote {
    docs: Mutex<Map<String, Value>>,
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Value>>>>,
    partial_writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    full_write_delay: Mutex<Option<Duration>>,
}

impl InMemoryRemote {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct (non-adapter) access to a stored document.
    #[must_use]
    pub fn document(&self, path: &str) -> Option<Value> {
        self.docs.lock().get(path).cloned()
    }

    /// Whether a document exists at `path`.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.docs.lock().contains_key(path)
    }

    /// How many `write_partial` calls have been issued.
    #[must_use]
    pub fn partial_write_count(&self) -> usize {
        self.partial_writes.load(Ordering::Relaxed)
    }

    /// Make subsequent reads fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    /// Make subsequent writes (full and partial) fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Delay full writes, widening multi-step windows for tests.
    pub fn set_full_write_delay(&self, delay: Option<Duration>) {
        *self.full_write_delay.lock() = delay;
    }

    /// Fan a change notification out to subscribers of `parent` without
    /// touching stored documents (simulates an externally-originated
    /// change event).
    pub fn notify_child_changed(&self, parent: &str, doc: Value) {
        let mut subscribers = self.subscribers.lock();
        if let Some(senders) = subscribers.get_mut(parent) {
            senders.retain(|tx| tx.send(doc.clone()).is_ok());
        }
    }

    fn parent_of(path: &str) -> Option<&str> {
        path.rsplit_once('/').map(|(parent, _)| parent)
    }

    fn notify_parent(&self, path: &str, doc: &Value) {
        if let Some(parent) = Self::parent_of(path) {
            self.notify_child_changed(parent, doc.clone());
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn read(&self, path: &str) -> Result<Option<Value>, RemoteError> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(RemoteError::Backend("read failed (injected)".to_string()));
        }

        let docs = self.docs.lock();
        if let Some(doc) = docs.get(path) {
            return Ok(Some(doc.clone()));
        }

        // Collect immediate children into a mapping, insertion-ordered
        let prefix = format!("{path}/");
        let mut children = Map::new();
        for (key, doc) in docs.iter() {
            if let Some(rest) = key.strip_prefix(&prefix) {
                if !rest.contains('/') {
                    children.insert(rest.to_string(), doc.clone());
                }
            }
        }

        if children.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Value::Object(children)))
        }
    }

    async fn write_full(&self, path: &str, doc: Value) -> Result<(), RemoteError> {
        let delay = *self.full_write_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(RemoteError::Backend("write failed (injected)".to_string()));
        }

        self.docs.lock().insert(path.to_string(), doc.clone());
        self.notify_parent(path, &doc);
        Ok(())
    }

    async fn write_partial(
        &self,
        path: &str,
        fields: Map<String, Value>,
    ) -> Result<(), RemoteError> {
        self.partial_writes.fetch_add(1, Ordering::Relaxed);
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(RemoteError::Backend("write failed (injected)".to_string()));
        }

        // (parent path, changed child document) pairs to fan out after the
        // lock is released
        let mut notifications: Vec<(Option<String>, Value)> = Vec::new();
        {
            let mut docs = self.docs.lock();
            if let Some(Value::Object(mut doc)) = docs.get(path).cloned() {
                // Document node: merge fields, nulls remove fields
                for (key, value) in fields {
                    if value.is_null() {
                        doc.shift_remove(&key);
                    } else {
                        doc.insert(key, value);
                    }
                }
                let updated = Value::Object(doc);
                docs.insert(path.to_string(), updated.clone());
                notifications.push((Self::parent_of(path).map(str::to_string), updated));
            } else if docs.keys().any(|k| k.starts_with(&format!("{path}/")))
                || !path.contains('/')
            {
                // Collection node: fields address children; nulls are child
                // tombstones (removal is not a child-changed event)
                for (key, value) in fields {
                    let child = format!("{path}/{key}");
                    if value.is_null() {
                        docs.shift_remove(&child);
                    } else {
                        docs.insert(child, value.clone());
                        notifications.push((Some(path.to_string()), value));
                    }
                }
            } else {
                // No document yet: a partial update creates one
                let mut doc = Map::new();
                for (key, value) in fields {
                    if !value.is_null() {
                        doc.insert(key, value);
                    }
                }
                let doc = Value::Object(doc);
                docs.insert(path.to_string(), doc.clone());
                notifications.push((Self::parent_of(path).map(str::to_string), doc));
            }
        }

        for (parent, doc) in notifications {
            if let Some(parent) = parent {
                self.notify_child_changed(&parent, doc);
            }
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        path: &str,
    ) -> Result<mpsc::UnboundedReceiver<Value>, RemoteError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .entry(path.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}

/// In-memory [`BlobStore`] handing out `mem://` references.
#[derive(Default)]
pub struct InMemoryBlobs {
    blobs: DashMap<String, Vec<u8>>,
    fail_uploads: AtomicBool,
    fail_deletes: AtomicBool,
}

impl InMemoryBlobs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.blobs.contains_key(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobs {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<String, BlobError> {
        if self.fail_uploads.load(Ordering::Relaxed) {
            return Err(BlobError::Backend("upload failed (injected)".to_string()));
        }
        self.blobs.insert(path.to_string(), bytes);
        Ok(format!("mem://{path}"))
    }

    async fn delete(&self, path: &str) -> Result<(), BlobError> {
        if self.fail_deletes.load(Ordering::Relaxed) {
            return Err(BlobError::Backend("delete failed (injected)".to_string()));
        }
        self.blobs.remove(path);
        Ok(())
    }
}

/// [`ImageDecoder`] producing base64 `data:` URIs.
pub struct DataUriDecoder {
    media_type: String,
}

impl DataUriDecoder {
    #[must_use]
    pub fn new(media_type: impl Into<String>) -> Self {
        Self { media_type: media_type.into() }
    }
}

impl Default for DataUriDecoder {
    fn default() -> Self {
        Self::new("image/jpeg")
    }
}

#[async_trait]
impl ImageDecoder for DataUriDecoder {
    async fn decode_inline(&self, bytes: &[u8]) -> Result<String, BlobError> {
        Ok(format!("data:{};base64,{}", self.media_type, BASE64.encode(bytes)))
    }
}
