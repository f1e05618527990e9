use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("remote store error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("blob store error: {0}")]
    Backend(String),
}

/// Key-value document store over a slash-delimited hierarchical namespace.
///
/// Reading a path that holds a document returns that document; reading a
/// path whose immediate children hold documents returns the mapping of
/// child name to document, in insertion order.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// One-shot point read. `None` when the path holds nothing.
    async fn read(&self, path: &str) -> Result<Option<Value>, RemoteError>;

    /// Full replace of the document at `path`.
    async fn write_full(&self, path: &str, doc: Value) -> Result<(), RemoteError>;

    /// Partial update of the node at `path`. Null-valued fields are
    /// tombstones: they delete the named field (or child, on a collection
    /// node).
    async fn write_partial(
        &self,
        path: &str,
        fields: Map<String, Value>,
    ) -> Result<(), RemoteError>;

    /// Standing subscription to per-child change events at `path`.
    ///
    /// Fires for every subsequent change at any immediate child, regardless
    /// of origin (local-originated writes included). The stream lives for
    /// the life of the store; there is no unsubscribe.
    async fn subscribe(&self, path: &str)
        -> Result<mpsc::UnboundedReceiver<Value>, RemoteError>;
}

/// Content-addressed binary store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload bytes at `path`; resolves to a durable retrieval reference.
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<String, BlobError>;

    /// Delete the blob at `path`.
    async fn delete(&self, path: &str) -> Result<(), BlobError>;
}

/// Asynchronous, single-shot decode of raw image bytes into a displayable
/// inline representation (a `data:` URI). No cancellation.
#[async_trait]
pub trait ImageDecoder: Send + Sync {
    async fn decode_inline(&self, bytes: &[u8]) -> Result<String, BlobError>;
}
