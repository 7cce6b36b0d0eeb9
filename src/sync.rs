//! Reconciliation between the engine, the UI model and storage.
//!
//! [`SyncController`] owns the UI model for the session. Values reach the
//! engine only through the [`EngineBridge`]; values reach storage only
//! through the [`StateStore`]. Every operation that needs the engine checks
//! for it up front and declines without touching the UI model when it is
//! missing.

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::engine::{EngineAction, EngineBridge, Setting, SettingValue};
use crate::error::{PanelError, Result};
use crate::snapshot::{PartialSnapshot, UiStateSnapshot};
use crate::storage::{LoadedSnapshot, SceneCatalogEntry, SceneLibrary, SnapshotSlot, StateStore};

/// Where the UI model's values came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// The primary storage slot.
    Stored,
    /// The user-promoted defaults slot.
    Defaults,
    /// Live engine read-back.
    Engine,
    /// Built-in defaults; nothing else was available.
    HardCoded,
}

/// Outcome of [`SyncController::apply_snapshot`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplyReport {
    /// Settings taken from the snapshot.
    pub from_snapshot: usize,
    /// Settings read back from the engine.
    pub from_engine: usize,
    /// Snapshot keys present but not well-typed.
    pub rejected_keys: Vec<String>,
    /// Snapshot keys no longer in the registry.
    pub unknown_keys: Vec<String>,
    /// Settings switched off to keep exclusive groups consistent.
    pub forced_off: Vec<String>,
    /// Settings the engine refused; the UI keeps its previous value.
    pub failed: Vec<String>,
}

/// Owner of the UI model.
pub struct SyncController {
    bridge: EngineBridge,
    store: StateStore,
    ui: UiStateSnapshot,
    provenance: Provenance,
    dirty: bool,
    notices: Vec<String>,
}

impl std::fmt::Debug for SyncController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncController")
            .field("provenance", &self.provenance)
            .field("dirty", &self.dirty)
            .field("engine_ready", &self.bridge.is_ready())
            .finish_non_exhaustive()
    }
}

impl SyncController {
    pub fn new(bridge: EngineBridge, store: StateStore) -> Self {
        Self {
            bridge,
            store,
            ui: UiStateSnapshot::defaults(),
            provenance: Provenance::HardCoded,
            dirty: false,
            notices: Vec::new(),
        }
    }

    pub fn bridge(&self) -> &EngineBridge {
        &self.bridge
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Current UI value of one setting.
    pub fn value(&self, setting: Setting) -> SettingValue {
        self.ui.get(setting)
    }

    /// Total projection of the UI model.
    pub fn build_snapshot(&self) -> UiStateSnapshot {
        self.ui.clone()
    }

    /// Short user-facing notices accumulated since the last call.
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    fn notice(&mut self, error: &PanelError) {
        self.notices.push(error.notice());
    }

    fn require_engine(&mut self) -> Result<()> {
        if self.bridge.is_ready() {
            Ok(())
        } else {
            self.notice(&PanelError::EngineUnavailable);
            Err(PanelError::EngineUnavailable)
        }
    }

    /// Decide what the UI shows at startup.
    ///
    /// Storage is read primary-then-defaults. With an engine attached the
    /// result is applied to it and glow is switched off; without one the UI
    /// mirrors the stored values (or built-in defaults) and the engine is
    /// left alone.
    #[instrument(skip(self))]
    pub fn initialize(&mut self) -> Result<Provenance> {
        let loaded = self.store.load_with_fallback();
        let stored = match &loaded {
            LoadedSnapshot::Primary(_) => Some(Provenance::Stored),
            LoadedSnapshot::Defaults(_) => Some(Provenance::Defaults),
            LoadedSnapshot::Empty => None,
        };
        let snapshot = loaded.into_snapshot();

        if !self.bridge.is_ready() {
            self.ui = UiStateSnapshot::from_values(
                Setting::ALL
                    .into_iter()
                    .filter_map(|s| snapshot.get(s).map(|v| (s, v)))
                    .collect(),
            );
            self.provenance = stored.unwrap_or(Provenance::HardCoded);
            self.notice(&PanelError::EngineUnavailable);
            info!(provenance = ?self.provenance, "Initialized without engine");
            return Ok(self.provenance);
        }

        self.apply_snapshot(&snapshot)?;
        self.set(Setting::GlowEnabled, SettingValue::Bool(false))?;
        self.provenance = stored.unwrap_or(Provenance::Engine);
        info!(provenance = ?self.provenance, "Initialized from engine");
        Ok(self.provenance)
    }

    /// Resolve every setting (snapshot value if well-typed, else the live
    /// engine value), push it to the engine and mirror it in the UI.
    ///
    /// An empty snapshot is a pure read-back from the engine. Fails without
    /// mutating anything when the engine is unavailable or unreadable.
    #[instrument(skip_all, fields(keys = snapshot.len()))]
    pub fn apply_snapshot(&mut self, snapshot: &PartialSnapshot) -> Result<ApplyReport> {
        self.require_engine()?;

        let mut report = ApplyReport {
            unknown_keys: snapshot.unknown_keys().into_iter().map(String::from).collect(),
            ..ApplyReport::default()
        };
        let mut resolved = Vec::with_capacity(Setting::ALL.len());
        for setting in Setting::ALL {
            match snapshot.get(setting) {
                Some(value) => {
                    report.from_snapshot += 1;
                    resolved.push((setting, value, true));
                }
                None => {
                    if snapshot.contains_key(setting.key()) {
                        report.rejected_keys.push(setting.key().to_string());
                    }
                    let value = self.bridge.get(setting)?;
                    report.from_engine += 1;
                    resolved.push((setting, value, false));
                }
            }
        }
        enforce_exclusive(&mut resolved, &mut report.forced_off);

        for (setting, value, from_snapshot) in resolved {
            let applied = if from_snapshot || report.forced_off.iter().any(|k| k == setting.key()) {
                self.bridge.set(setting, value)
            } else {
                Ok(value)
            };
            match applied {
                Ok(value) => self.ui.set(setting, value),
                Err(e) => {
                    warn!(setting = setting.key(), error = %e, "Engine refused value");
                    report.failed.push(setting.key().to_string());
                }
            }
        }
        self.dirty = true;
        debug!(
            from_snapshot = report.from_snapshot,
            from_engine = report.from_engine,
            rejected = report.rejected_keys.len(),
            "Snapshot applied"
        );
        Ok(report)
    }

    /// Re-read every setting from the engine.
    pub fn sync_from_engine(&mut self) -> Result<ApplyReport> {
        let report = self.apply_snapshot(&PartialSnapshot::empty())?;
        self.provenance = Provenance::Engine;
        Ok(report)
    }

    /// Change one setting, switching off anything exclusive with it.
    pub fn set(&mut self, setting: Setting, value: SettingValue) -> Result<SettingValue> {
        self.require_engine()?;
        let applied = self.bridge.set(setting, value)?;
        self.ui.set(setting, applied);

        if applied == SettingValue::Bool(true) {
            for other in setting.exclusive_with() {
                if self.ui.get(other) == SettingValue::Bool(true) {
                    self.bridge.set(other, SettingValue::Bool(false))?;
                    self.ui.set(other, SettingValue::Bool(false));
                    debug!(
                        enabled = setting.key(),
                        disabled = other.key(),
                        "Exclusive setting cleared"
                    );
                }
            }
        }
        self.dirty = true;
        Ok(applied)
    }

    pub fn action(&mut self, action: EngineAction) -> Result<()> {
        self.require_engine()?;
        self.bridge.action(action)
    }

    /// Persist the UI model if it changed since the last successful save.
    pub fn persist_if_dirty(&mut self) -> bool {
        if !self.dirty {
            return true;
        }
        self.save_now()
    }

    /// Persist the UI model now. Failures become a notice.
    pub fn save_now(&mut self) -> bool {
        if self.store.save(&self.ui) {
            self.dirty = false;
            true
        } else {
            self.notices.push(
                PanelError::StorageWrite {
                    key: self.store.key(SnapshotSlot::Primary),
                    reason: String::new(),
                }
                .notice(),
            );
            false
        }
    }

    /// Store the current UI model as the user defaults.
    pub fn promote_to_defaults(&mut self) -> bool {
        let saved = self.store.promote_to_defaults(&self.ui);
        if !saved {
            self.notices.push("Defaults could not be saved.".to_string());
        }
        saved
    }

    /// Apply the stored defaults, or the built-in ones when none are stored.
    pub fn reset_to_defaults(&mut self) -> Result<Provenance> {
        let (snapshot, provenance) = match self.store.load(SnapshotSlot::Defaults) {
            Some(defaults) => (defaults, Provenance::Defaults),
            None => (UiStateSnapshot::defaults().to_partial(), Provenance::HardCoded),
        };
        self.apply_snapshot(&snapshot)?;
        self.provenance = provenance;
        Ok(provenance)
    }

    /// Save the engine's scene together with the current UI model.
    pub fn save_scene(&mut self, library: &SceneLibrary, name: &str) -> Result<SceneCatalogEntry> {
        self.require_engine()?;
        library.save_scene(name, Some(&self.ui)).inspect_err(|e| self.notices.push(e.notice()))
    }

    /// Load a saved scene and the UI model stored with it.
    pub fn open_scene(&mut self, library: &SceneLibrary, id: &str) -> Result<Option<ApplyReport>> {
        self.require_engine()?;
        let ui_state = match library.load_scene(id) {
            Ok(ui_state) => ui_state,
            Err(e) => {
                self.notice(&e);
                return Err(e);
            }
        };
        ui_state.map(|snapshot| self.apply_snapshot(&snapshot)).transpose()
    }
}

/// Keep at most one member of each exclusive group switched on, favoring
/// registry order.
fn enforce_exclusive(resolved: &mut [(Setting, SettingValue, bool)], forced_off: &mut Vec<String>) {
    for index in 0..resolved.len() {
        let (setting, value, _) = resolved[index];
        if value != SettingValue::Bool(true) {
            continue;
        }
        let rivals = setting.exclusive_with();
        for entry in resolved.iter_mut().skip(index + 1) {
            if rivals.contains(&entry.0) && entry.1 == SettingValue::Bool(true) {
                entry.1 = SettingValue::Bool(false);
                forced_off.push(entry.0.key().to_string());
            }
        }
    }
}
