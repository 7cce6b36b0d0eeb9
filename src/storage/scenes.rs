//! Saved-scene library.
//!
//! Each scene lives under its own key and is indexed by a small catalog.
//! Every mutation writes the entry and the catalog in one batch, so the
//! catalog never lists a scene that is not stored (or misses one that is).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{DEFAULT_KEY_PREFIX, SharedStore, WriteOp};
use crate::engine::EngineBridge;
use crate::error::{PanelError, Result};
use crate::snapshot::{PartialSnapshot, UiStateSnapshot};

/// Tag written into every scene entry.
pub const SCENE_SCHEMA_TAG: &str = "galaxy-scene/1";

/// One stored scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneRecord {
    pub schema_tag: String,
    pub scene_payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_state: Option<Value>,
}

impl SceneRecord {
    pub fn new(scene_payload: String, ui_state: Option<&UiStateSnapshot>) -> Self {
        Self {
            schema_tag: SCENE_SCHEMA_TAG.to_string(),
            scene_payload,
            ui_state: ui_state.map(|s| s.to_partial().to_value()),
        }
    }

    /// The embedded UI state, if present and readable.
    pub fn ui_snapshot(&self) -> Option<PartialSnapshot> {
        self.ui_state.clone().and_then(PartialSnapshot::from_value)
    }
}

/// Catalog row: `{id, name, createdAt, sizeBytes}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneCatalogEntry {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// What a prune pass removed or recovered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneSummary {
    /// Catalog rows whose entry was missing.
    pub stale_rows: usize,
    /// Entries no catalog row pointed at, or unreadable during a rebuild.
    pub orphan_entries: usize,
    /// Entries put back into a rebuilt catalog.
    pub recovered_entries: usize,
    /// The stored catalog was unreadable and has been rebuilt.
    pub catalog_rebuilt: bool,
}

/// Scene catalog plus entries, backed by a [`SharedStore`].
#[derive(Clone)]
pub struct SceneLibrary {
    store: SharedStore,
    bridge: EngineBridge,
    prefix: String,
}

impl SceneLibrary {
    pub fn new(store: SharedStore, bridge: EngineBridge) -> Self {
        Self::with_prefix(store, bridge, DEFAULT_KEY_PREFIX)
    }

    pub fn with_prefix(
        store: SharedStore,
        bridge: EngineBridge,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bridge,
            prefix: prefix.into(),
        }
    }

    fn catalog_key(&self) -> String {
        format!("{}.scenes", self.prefix)
    }

    fn entry_prefix(&self) -> String {
        format!("{}.scene.", self.prefix)
    }

    /// Storage key for a scene id.
    pub fn entry_key(&self, id: &str) -> String {
        format!("{}{id}", self.entry_prefix())
    }

    fn read_catalog(&self) -> Result<Vec<SceneCatalogEntry>> {
        let Some(text) = self.store.get(&self.catalog_key())? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&text).map_err(|e| PanelError::SceneCatalogCorrupt(e.to_string()))
    }

    fn catalog_op(&self, catalog: &[SceneCatalogEntry]) -> Result<WriteOp> {
        let text = serde_json::to_string(catalog)
            .map_err(|e| PanelError::Storage(format!("Failed to serialize scene catalog: {e}")))?;
        Ok(WriteOp::put(self.catalog_key(), text))
    }

    /// Catalog rows in creation order.
    pub fn list_scenes(&self) -> Result<Vec<SceneCatalogEntry>> {
        self.read_catalog()
    }

    /// Capture the engine's current scene under `name`.
    #[instrument(skip(self, ui_state))]
    pub fn save_scene(
        &self,
        name: &str,
        ui_state: Option<&UiStateSnapshot>,
    ) -> Result<SceneCatalogEntry> {
        let payload = self.bridge.export_scene()?;
        self.store_record(name, &SceneRecord::new(payload, ui_state))
    }

    /// Store an already-built record under a fresh id.
    pub fn store_record(&self, name: &str, record: &SceneRecord) -> Result<SceneCatalogEntry> {
        let text = serde_json::to_string(record)
            .map_err(|e| PanelError::Storage(format!("Failed to serialize scene: {e}")))?;
        let entry = SceneCatalogEntry {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
            size_bytes: text.len() as u64,
        };

        let mut catalog = self.read_catalog()?;
        catalog.push(entry.clone());
        self.store.apply_batch(&[
            WriteOp::put(self.entry_key(&entry.id), text),
            self.catalog_op(&catalog)?,
        ])?;
        info!(id = %entry.id, name, size = entry.size_bytes, "Scene saved");
        Ok(entry)
    }

    /// Read a stored record without touching the engine.
    pub fn read_record(&self, id: &str) -> Result<SceneRecord> {
        let text = self
            .store
            .get(&self.entry_key(id))?
            .ok_or_else(|| PanelError::SceneNotFound { id: id.to_string() })?;
        let record: SceneRecord = serde_json::from_str(&text)
            .map_err(|e| PanelError::Storage(format!("Scene '{id}' is corrupt: {e}")))?;
        if record.schema_tag != SCENE_SCHEMA_TAG {
            warn!(id, tag = %record.schema_tag, "Scene has an unexpected schema tag");
        }
        Ok(record)
    }

    /// Push a stored scene into the engine.
    ///
    /// Returns the UI state saved alongside it so the caller can apply it.
    #[instrument(skip(self))]
    pub fn load_scene(&self, id: &str) -> Result<Option<PartialSnapshot>> {
        let record = self.read_record(id)?;
        self.bridge.import_scene(&record.scene_payload)?;
        debug!(id, "Scene loaded");
        Ok(record.ui_snapshot())
    }

    /// Remove a scene and its catalog row together.
    #[instrument(skip(self))]
    pub fn delete_scene(&self, id: &str) -> Result<()> {
        let mut catalog = self.read_catalog()?;
        let before = catalog.len();
        catalog.retain(|e| e.id != id);
        let key = self.entry_key(id);
        if catalog.len() == before && self.store.get(&key)?.is_none() {
            return Err(PanelError::SceneNotFound { id: id.to_string() });
        }
        self.store
            .apply_batch(&[WriteOp::delete(key), self.catalog_op(&catalog)?])?;
        info!(id, "Scene deleted");
        Ok(())
    }

    pub fn rename_scene(&self, id: &str, name: &str) -> Result<()> {
        let mut catalog = self.read_catalog()?;
        let entry = catalog
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| PanelError::SceneNotFound { id: id.to_string() })?;
        entry.name = name.to_string();
        self.store.apply_batch(&[self.catalog_op(&catalog)?])
    }

    /// Reconcile the catalog with the stored entries.
    ///
    /// An unreadable catalog is rebuilt from the entries themselves.
    #[instrument(skip(self))]
    pub fn prune_catalog(&self) -> Result<PruneSummary> {
        let prefix = self.entry_prefix();
        let stored: Vec<String> = self
            .store
            .keys_with_prefix(&prefix)?
            .into_iter()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect();
        let mut catalog = match self.read_catalog() {
            Ok(catalog) => catalog,
            Err(PanelError::SceneCatalogCorrupt(reason)) => {
                warn!(%reason, "Scene catalog unreadable, rebuilding");
                return self.rebuild_catalog(&stored);
            }
            Err(e) => return Err(e),
        };

        let before = catalog.len();
        catalog.retain(|e| stored.contains(&e.id));
        let stale_rows = before - catalog.len();

        let orphans: Vec<&String> = stored
            .iter()
            .filter(|id| !catalog.iter().any(|e| &e.id == *id))
            .collect();

        let summary = PruneSummary {
            stale_rows,
            orphan_entries: orphans.len(),
            ..PruneSummary::default()
        };
        if summary == PruneSummary::default() {
            return Ok(summary);
        }

        let mut ops: Vec<WriteOp> = orphans
            .into_iter()
            .map(|id| WriteOp::delete(self.entry_key(id)))
            .collect();
        ops.push(self.catalog_op(&catalog)?);
        self.store.apply_batch(&ops)?;
        info!(stale_rows, orphan_entries = summary.orphan_entries, "Scene catalog pruned");
        Ok(summary)
    }

    /// Replace the catalog with one row per readable entry.
    ///
    /// Names and creation times are lost with the old catalog, so rows get a
    /// placeholder name and the rebuild time. Unreadable entries are removed.
    fn rebuild_catalog(&self, stored: &[String]) -> Result<PruneSummary> {
        let now = Utc::now();
        let mut catalog = Vec::new();
        let mut ops = Vec::new();
        for id in stored {
            let key = self.entry_key(id);
            let Some(text) = self.store.get(&key)? else {
                continue;
            };
            if serde_json::from_str::<SceneRecord>(&text).is_ok() {
                catalog.push(SceneCatalogEntry {
                    id: id.clone(),
                    name: format!("Recovered {}", id.chars().take(8).collect::<String>()),
                    created_at: now,
                    size_bytes: text.len() as u64,
                });
            } else {
                debug!(id, "Dropping unreadable scene entry");
                ops.push(WriteOp::delete(key));
            }
        }

        let summary = PruneSummary {
            stale_rows: 0,
            orphan_entries: ops.len(),
            recovered_entries: catalog.len(),
            catalog_rebuilt: true,
        };
        ops.push(self.catalog_op(&catalog)?);
        self.store.apply_batch(&ops)?;
        info!(
            recovered = summary.recovered_entries,
            dropped = summary.orphan_entries,
            "Scene catalog rebuilt"
        );
        Ok(summary)
    }
}
