//! # Inventory Sync
//!
//! An optimistic mutation / remote reconciliation engine for an inventory
//! catalog: local state changes apply immediately for responsiveness, the
//! corresponding remote writes run asynchronously, and inbound remote
//! change notifications are reconciled into local state without clobbering
//! in-flight local edits.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Caller Intents                        │
//! │  • add_item / update_item / remove_items                   │
//! │  • fetch_and_subscribe (initial load + standing stream)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Reconciliation Engine                       │
//! │  • Optimistic local transition first, remote op second     │
//! │  • Broadcast signals: created/updated/removed, synced,     │
//! │    failed, stock-reconciled                                │
//! │  • Rename = read-old → write-new → delete-old (no txn)     │
//! └─────────────────────────────────────────────────────────────┘
//!          │                                      │
//!          ▼                                      ▼
//! ┌───────────────────────┐        ┌───────────────────────────┐
//! │   Local State Store   │        │      Remote Adapters      │
//! │  pure reduce() over   │        │  RemoteStore / BlobStore  │
//! │  immutable snapshots  │        │  / ImageDecoder seams     │
//! │  on a watch channel   │        │  (injected, fakeable)     │
//! └───────────────────────┘        └───────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use inventory_sync::{EngineConfig, ItemPatch, NewItem, SyncEngine, SyncSignal};
//! use inventory_sync::storage::memory::{DataUriDecoder, InMemoryBlobs, InMemoryRemote};
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = SyncEngine::new(
//!         EngineConfig::default(),
//!         Arc::new(InMemoryRemote::new()),
//!         Arc::new(InMemoryBlobs::new()),
//!         Arc::new(DataUriDecoder::default()),
//!     );
//!
//!     let mut signals = engine.subscribe_signals();
//!     engine.fetch_and_subscribe().await.expect("initial load");
//!
//!     // Applied locally before this call returns; synced in the background
//!     engine.add_item(NewItem { id: "sku-1".into(), stock: 10, ..Default::default() });
//!     engine.update_item("sku-1", ItemPatch { stock: Some(7), ..Default::default() });
//!
//!     while let Ok(signal) = signals.recv().await {
//!         if matches!(signal, SyncSignal::ItemUpdateSynced { .. }) {
//!             break;
//!         }
//!     }
//! }
//! ```
//!
//! ## Guarantees and non-guarantees
//!
//! - Local transitions for an intent are applied before its remote
//!   operation is issued.
//! - No ordering between remote confirmations of concurrent intents, nor
//!   between a confirmation and a subscription-driven reconciliation.
//! - No retries, no rollback, no cancellation: a failed remote operation is
//!   terminal for that intent and surfaces as a `*Failed` signal while the
//!   optimistic local state stays in place.
//!
//! ## Modules
//!
//! - [`engine`]: the [`SyncEngine`] orchestrating intents and reconciliation
//! - [`store`]: the local state store (pure transitions over snapshots)
//! - [`item`]: entity model and intent payloads
//! - [`storage`]: adapter traits and in-memory implementations
//! - [`config`]: engine configuration

pub mod config;
pub mod engine;
pub mod item;
pub mod storage;
pub mod store;

pub use config::EngineConfig;
pub use engine::{SyncEngine, SyncError, SyncSignal};
pub use item::{ImageRef, InventoryItem, ItemPatch, NewItem};
pub use storage::traits::{BlobError, BlobStore, ImageDecoder, RemoteError, RemoteStore};
pub use store::{reduce, Snapshot, StateStore, Transition};
