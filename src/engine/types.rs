//! Public types for the reconciliation engine.

use thiserror::Error;

use crate::storage::traits::{BlobError, RemoteError};

/// Signals emitted by the engine for the presentation layer.
///
/// Local transitions emit a `*d` signal synchronously with the intent;
/// `*Synced` arrives once the remote write confirms durability; `*Failed`
/// means the intent's remote operation is terminal and the optimistic local
/// state will never be confirmed (no retry, no rollback).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncSignal {
    /// Initial load started
    FetchStarted,
    /// Initial load applied to the local store
    AllItemsLoaded { count: usize },

    ItemCreated { id: String },
    ItemCreateSynced { id: String },
    ItemCreateFailed { id: String, reason: String },

    ItemUpdated { id: String },
    ItemUpdateSynced { id: String },
    ItemUpdateFailed { id: String, reason: String },

    ItemsRemoved { ids: Vec<String> },
    ItemsRemoveSynced { ids: Vec<String> },
    ItemsRemoveFailed { ids: Vec<String>, reason: String },

    /// A server-confirmed stock change was reconciled into local state
    ItemStockReconciled { id: String, stock: i64 },
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),
}
