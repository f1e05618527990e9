//! Inventory entity model.
//!
//! The [`InventoryItem`] is the unit of state that flows through the engine.
//! Items serialize to camelCase documents matching the remote store's wire
//! shape, with any attributes beyond the core fields carried in an open
//! mapping.
//!
//! # Example
//!
//! ```
//! use inventory_sync::{InventoryItem, ImageRef};
//! use serde_json::json;
//!
//! let item: InventoryItem = serde_json::from_value(json!({
//!     "id": "sku-1",
//!     "stock": 10,
//!     "initialStock": 10,
//!     "image": "https://blobs.example/sku-1.jpg",
//!     "label": "Widget",
//! })).unwrap();
//!
//! assert_eq!(item.stock, 10);
//! assert_eq!(item.image, Some(ImageRef::Url("https://blobs.example/sku-1.jpg".into())));
//! assert_eq!(item.attrs["label"], "Widget");
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Wire value used for the image field while an upload is still pending.
pub const PENDING_IMAGE: &str = "pending://image";

/// Reference to an item's image.
///
/// Serializes as a plain string so remote documents stay flat:
/// `"pending://image"` for [`ImageRef::Pending`], a `data:` URI for
/// [`ImageRef::Inline`], anything else is a durable [`ImageRef::Url`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ImageRef {
    /// Placeholder used between optimistic create and upload completion
    Pending,
    /// Inline displayable representation (data URI), local-only refresh
    Inline(String),
    /// Durable retrieval reference returned by the blob store
    Url(String),
}

impl ImageRef {
    /// The wire string for this reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => PENDING_IMAGE,
            Self::Inline(s) | Self::Url(s) => s,
        }
    }
}

impl From<String> for ImageRef {
    fn from(s: String) -> Self {
        if s == PENDING_IMAGE {
            Self::Pending
        } else if s.starts_with("data:") {
            Self::Inline(s)
        } else {
            Self::Url(s)
        }
    }
}

impl From<ImageRef> for String {
    fn from(r: ImageRef) -> String {
        match r {
            ImageRef::Pending => PENDING_IMAGE.to_string(),
            ImageRef::Inline(s) | ImageRef::Url(s) => s,
        }
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inventory entity.
///
/// `initial_stock` is a snapshot of `stock` taken at creation or at the last
/// full replace. Identifiers are stable once created unless explicitly
/// renamed through an update intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: String,
    pub stock: i64,
    pub initial_stock: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,
    /// Open mapping of any additional attributes
    #[serde(flatten)]
    pub attrs: Map<String, Value>,
}

/// A create intent: the caller-supplied fields for a new item.
///
/// `image` carries the raw bytes of an image payload, if any. The engine
/// decodes and uploads them; the caller never deals with blob references.
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub id: String,
    pub stock: i64,
    pub image: Option<Vec<u8>>,
    pub attrs: Map<String, Value>,
}

impl NewItem {
    /// Materialize the entity this intent describes, with the given image
    /// reference. `initial_stock` is snapshotted from `stock`.
    #[must_use]
    pub fn to_item(&self, image: Option<ImageRef>) -> InventoryItem {
        InventoryItem {
            id: self.id.clone(),
            stock: self.stock,
            initial_stock: self.stock,
            image,
            attrs: self.attrs.clone(),
        }
    }
}

/// An update intent: a partial-properties payload.
///
/// `id` present means this update renames the entity (delete-old +
/// create-new at the remote layer). Null values in `attrs` act as field
/// tombstones during the shallow merge.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    /// New identifier, when the update renames the entity
    pub id: Option<String>,
    pub stock: Option<i64>,
    /// Raw image payload bytes, when the update replaces the image
    pub image: Option<Vec<u8>>,
    pub attrs: Map<String, Value>,
}

impl ItemPatch {
    /// Partial-properties mapping in wire shape.
    ///
    /// A `stock` change forces `initialStock := stock`; the state store
    /// itself stays a dumb shallow merge.
    #[must_use]
    pub fn props(&self) -> Map<String, Value> {
        let mut props = self.attrs.clone();
        if let Some(ref id) = self.id {
            props.insert("id".to_string(), Value::String(id.clone()));
        }
        if let Some(stock) = self.stock {
            props.insert("stock".to_string(), Value::from(stock));
            props.insert("initialStock".to_string(), Value::from(stock));
        }
        props
    }

    /// The intent as a plain JSON object, without the `initialStock`
    /// adjustment and without the binary image payload. Used when a rename
    /// embeds the original intent into the merged remote document.
    #[must_use]
    pub fn as_intent_value(&self) -> Value {
        let mut m = self.attrs.clone();
        if let Some(ref id) = self.id {
            m.insert("id".to_string(), Value::String(id.clone()));
        }
        if let Some(stock) = self.stock {
            m.insert("stock".to_string(), Value::from(stock));
        }
        Value::Object(m)
    }

    /// Whether this update renames the entity.
    #[must_use]
    pub fn is_rename(&self) -> bool {
        self.id.is_some()
    }
}
