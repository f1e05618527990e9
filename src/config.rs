//! Configuration for the reconciliation engine.
//!
//! # Example
//!
//! ```
//! use inventory_sync::EngineConfig;
//!
//! let config = EngineConfig::default();
//! assert_eq!(config.collection_path, "inventory");
//!
//! let config = EngineConfig {
//!     collection_path: "warehouse/aisle7".into(),
//!     ..Default::default()
//! };
//! assert_eq!(config.image_dir, "itemImages");
//! # let _ = config;
//! ```

use serde::Deserialize;

/// Engine configuration. All fields have sensible defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Remote collection node holding the item documents
    #[serde(default = "default_collection_path")]
    pub collection_path: String,

    /// Blob store directory for item images
    #[serde(default = "default_image_dir")]
    pub image_dir: String,

    /// File extension for uploaded item images
    #[serde(default = "default_image_ext")]
    pub image_ext: String,

    /// Capacity of the broadcast signal channel
    #[serde(default = "default_signal_capacity")]
    pub signal_capacity: usize,
}

fn default_collection_path() -> String { "inventory".to_string() }
fn default_image_dir() -> String { "itemImages".to_string() }
fn default_image_ext() -> String { "jpg".to_string() }
fn default_signal_capacity() -> usize { 256 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            collection_path: default_collection_path(),
            image_dir: default_image_dir(),
            image_ext: default_image_ext(),
            signal_capacity: default_signal_capacity(),
        }
    }
}
