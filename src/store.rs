// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local state store.
//!
//! Holds the ordered sequence of inventory items and applies exactly five
//! transition kinds through a pure, total [`reduce`] function. Every writer
//! (local intents, remote confirmations, subscription reconciliation)
//! funnels through the same transitions, which is what makes
//! concurrent-origin updates composable without locks.
//!
//! [`StateStore`] publishes immutable snapshots on a watch channel: the
//! engine always reads the latest snapshot, and the presentation layer gets
//! cheap equality-based change detection by watching the channel.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::item::InventoryItem;

/// Immutable snapshot of the full item collection.
pub type Snapshot = Arc<Vec<InventoryItem>>;

/// A state transition.
///
/// Transitions are plain data; [`reduce`] gives them meaning.
#[derive(Debug, Clone)]
pub enum Transition {
    /// Replace the entire collection (initial full load only). Order is the
    /// insertion order of the source mapping.
    LoadAll { items: Vec<InventoryItem> },
    /// Append an item to the end of the sequence. No uniqueness check at
    /// this layer; the engine owns the contract.
    Create { item: InventoryItem },
    /// Shallow-merge partial props into the item with this id. No-op when
    /// the id is absent. Null-valued props act as field tombstones.
    Update { id: String, props: Map<String, Value> },
    /// Drop every item whose identity (by value, not id) is in this list.
    Remove { items: Vec<InventoryItem> },
    /// Replace the item with the matching id wholesale. Used only for
    /// server-confirmed stock reconciliation.
    ApplyRemoteStock { item: InventoryItem },
}

/// Apply a transition to a state, producing the next state.
///
/// Pure and total: malformed merge payloads leave the affected item
/// unchanged rather than failing.
#[must_use]
pub fn reduce(state: &[InventoryItem], transition: &Transition) -> Vec<InventoryItem> {
    match transition {
        Transition::LoadAll { items } => items.clone(),
        Transition::Create { item } => {
            let mut next = state.to_vec();
            next.push(item.clone());
            next
        }
        Transition::Update { id, props } => state
            .iter()
            .map(|item| {
                if item.id == *id {
                    merge_props(item, props)
                } else {
                    item.clone()
                }
            })
            .collect(),
        Transition::Remove { items } => state
            .iter()
            .filter(|item| !items.contains(item))
            .cloned()
            .collect(),
        Transition::ApplyRemoteStock { item } => state
            .iter()
            .map(|local| {
                if local.id == item.id {
                    item.clone()
                } else {
                    local.clone()
                }
            })
            .collect(),
    }
}

/// Shallow merge of wire-shaped props into an item, via its document form.
///
/// Falls back to the unchanged item if the merged document no longer
/// deserializes (keeps `reduce` total).
fn merge_props(item: &InventoryItem, props: &Map<String, Value>) -> InventoryItem {
    let mut doc = match serde_json::to_value(item) {
        Ok(Value::Object(doc)) => doc,
        _ => return item.clone(),
    };

    for (key, value) in props {
        if value.is_null() {
            doc.shift_remove(key);
        } else {
            doc.insert(key.clone(), value.clone());
        }
    }

    serde_json::from_value(Value::Object(doc)).unwrap_or_else(|_| item.clone())
}

/// Shared handle to the local state.
///
/// Cheap to clone; all clones apply transitions to the same snapshot
/// channel. `apply` is atomic with respect to concurrent appliers.
#[derive(Debug, Clone)]
pub struct StateStore {
    tx: Arc<watch::Sender<Snapshot>>,
}

impl StateStore {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(Vec::new()));
        Self { tx: Arc::new(tx) }
    }

    /// Apply a transition, publishing the new snapshot.
    pub fn apply(&self, transition: &Transition) {
        self.tx
            .send_modify(|snapshot| *snapshot = Arc::new(reduce(snapshot.as_slice(), transition)));
    }

    /// The latest snapshot. Never a stale closure capture: each call reads
    /// the current channel value.
    #[must_use]
    pub fn latest(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    /// Watch snapshot changes (presentation layer seam).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
