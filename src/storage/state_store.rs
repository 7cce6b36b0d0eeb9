//! UI-state persistence over a [`KeyValueStore`].
//!
//! Two independent slots share the snapshot envelope: the primary slot is
//! rewritten on every settings change, the defaults slot only when the user
//! promotes the current state. Writes are best-effort and reads never fail.

use tracing::{debug, instrument, warn};

use super::{DEFAULT_KEY_PREFIX, SharedStore, WriteOp};
use crate::error::Result;
use crate::snapshot::{PartialSnapshot, UiStateSnapshot};

/// Which stored snapshot to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSlot {
    Primary,
    Defaults,
}

impl SnapshotSlot {
    const fn suffix(self) -> &'static str {
        match self {
            Self::Primary => "ui_state",
            Self::Defaults => "ui_defaults",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Primary => "stored",
            Self::Defaults => "defaults",
        }
    }
}

/// Result of reading the slots in priority order.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadedSnapshot {
    /// The primary slot held a usable snapshot.
    Primary(PartialSnapshot),
    /// The primary slot was empty or unreadable; the defaults slot was used.
    Defaults(PartialSnapshot),
    /// Neither slot produced anything.
    Empty,
}

impl LoadedSnapshot {
    pub fn slot(&self) -> Option<SnapshotSlot> {
        match self {
            Self::Primary(_) => Some(SnapshotSlot::Primary),
            Self::Defaults(_) => Some(SnapshotSlot::Defaults),
            Self::Empty => None,
        }
    }

    /// The snapshot to apply; empty when nothing was stored.
    pub fn into_snapshot(self) -> PartialSnapshot {
        match self {
            Self::Primary(s) | Self::Defaults(s) => s,
            Self::Empty => PartialSnapshot::empty(),
        }
    }
}

/// Snapshot persistence for the panel.
#[derive(Clone)]
pub struct StateStore {
    store: SharedStore,
    prefix: String,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl StateStore {
    pub fn new(store: SharedStore) -> Self {
        Self::with_prefix(store, DEFAULT_KEY_PREFIX)
    }

    pub fn with_prefix(store: SharedStore, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Storage key for a slot, e.g. `gpanel.ui_state`.
    pub fn key(&self, slot: SnapshotSlot) -> String {
        format!("{}.{}", self.prefix, slot.suffix())
    }

    /// Write a snapshot, surfacing the storage error.
    pub fn try_save(&self, slot: SnapshotSlot, snapshot: &PartialSnapshot) -> Result<()> {
        self.store.set(&self.key(slot), &snapshot.to_json())
    }

    /// Persist the primary slot.
    ///
    /// Storage failures are logged and swallowed; returns whether the write
    /// landed so callers can show a notice.
    #[instrument(skip_all)]
    pub fn save(&self, snapshot: &UiStateSnapshot) -> bool {
        self.save_slot(SnapshotSlot::Primary, &snapshot.to_partial())
    }

    /// Best-effort write to any slot.
    pub fn save_slot(&self, slot: SnapshotSlot, snapshot: &PartialSnapshot) -> bool {
        match self.try_save(slot, snapshot) {
            Ok(()) => {
                debug!(slot = slot.label(), keys = snapshot.len(), "Snapshot saved");
                true
            }
            Err(e) => {
                warn!(slot = slot.label(), error = %e, "Snapshot not saved");
                false
            }
        }
    }

    /// Read one slot; `None` on absence, read failure or unparseable content.
    pub fn load(&self, slot: SnapshotSlot) -> Option<PartialSnapshot> {
        let text = match self.store.get(&self.key(slot)) {
            Ok(Some(text)) => text,
            Ok(None) => return None,
            Err(e) => {
                warn!(slot = slot.label(), error = %e, "Snapshot slot unreadable");
                return None;
            }
        };
        PartialSnapshot::parse(&text).filter(|s| !s.is_empty())
    }

    /// Primary slot, falling back to defaults when the primary is empty.
    pub fn load_with_fallback(&self) -> LoadedSnapshot {
        if let Some(primary) = self.load(SnapshotSlot::Primary) {
            return LoadedSnapshot::Primary(primary);
        }
        match self.load(SnapshotSlot::Defaults) {
            Some(defaults) => {
                debug!("Primary snapshot empty, using stored defaults");
                LoadedSnapshot::Defaults(defaults)
            }
            None => LoadedSnapshot::Empty,
        }
    }

    /// Store `snapshot` as the user defaults.
    pub fn promote_to_defaults(&self, snapshot: &UiStateSnapshot) -> bool {
        self.save_slot(SnapshotSlot::Defaults, &snapshot.to_partial())
    }

    /// Remove a slot.
    pub fn clear(&self, slot: SnapshotSlot) -> Result<()> {
        self.store.apply_batch(&[WriteOp::delete(self.key(slot))])
    }
}
