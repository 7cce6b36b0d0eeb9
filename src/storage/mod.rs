//! Durable key-value storage.
//!
//! The panel persists three things: the UI-state slot, the defaults slot and
//! the scene library. All of it goes through [`KeyValueStore`], which mirrors
//! browser local storage (string keys, string values) and adds an atomic
//! batch write so multi-key updates never leave the store half-written.
//!
//! # Layout
//!
//! ```text
//! <prefix>.ui_state        # primary UI-state slot
//! <prefix>.ui_defaults     # user-promoted defaults
//! <prefix>.scenes          # scene catalog (JSON array)
//! <prefix>.scene.<uuid>    # one entry per saved scene
//! ```

mod memory;
mod scenes;
mod sqlite;
mod state_store;

use std::sync::Arc;

pub use memory::MemoryStore;
pub use scenes::{PruneSummary, SCENE_SCHEMA_TAG, SceneCatalogEntry, SceneLibrary, SceneRecord};
pub use sqlite::SqliteStore;
pub use state_store::{LoadedSnapshot, SnapshotSlot, StateStore};

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;

/// Default prefix for every storage key.
pub const DEFAULT_KEY_PREFIX: &str = "gpanel";

/// One write inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { key: String, value: String },
    Delete { key: String },
}

impl WriteOp {
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// String key-value storage with atomic batches.
pub trait KeyValueStore: Send + Sync {
    /// Read a key; `Ok(None)` when absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Apply every write or none of them.
    fn apply_batch(&self, ops: &[WriteOp]) -> Result<()>;

    /// Keys starting with `prefix`, sorted.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.apply_batch(&[WriteOp::put(key, value)])
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.apply_batch(&[WriteOp::delete(key)])
    }
}

/// Shared, thread-safe store handle.
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Open the store selected by configuration.
pub fn open_store(config: &StorageConfig) -> Result<SharedStore> {
    Ok(match config.backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::Sqlite => Arc::new(SqliteStore::open(config.resolved_path()?)?),
    })
}
