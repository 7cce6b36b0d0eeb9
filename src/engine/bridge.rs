//! Typed accessor table over the raw engine contract.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, trace, warn};

use super::settings::{Setting, SettingValue};
use super::{EngineAction, EngineApi};
use crate::error::{PanelError, Result};

/// Shared handle to the engine, typed by the settings registry.
///
/// The bridge starts detached; every call fails with
/// [`PanelError::EngineUnavailable`] until [`EngineBridge::attach`] runs.
/// Clones share the same attachment.
#[derive(Clone, Default)]
pub struct EngineBridge {
    api: Arc<RwLock<Option<Arc<dyn EngineApi>>>>,
}

impl std::fmt::Debug for EngineBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBridge")
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl EngineBridge {
    /// A bridge with no engine attached yet.
    pub fn detached() -> Self {
        Self::default()
    }

    /// A bridge already attached to `api`.
    pub fn new(api: Arc<dyn EngineApi>) -> Self {
        let bridge = Self::default();
        bridge.attach(api);
        bridge
    }

    /// Attach the engine once it has finished loading.
    pub fn attach(&self, api: Arc<dyn EngineApi>) {
        debug!("Engine attached to bridge");
        if let Ok(mut slot) = self.api.write() {
            *slot = Some(api);
        }
    }

    pub fn detach(&self) {
        if let Ok(mut slot) = self.api.write() {
            *slot = None;
        }
    }

    pub fn is_ready(&self) -> bool {
        self.api.read().map(|slot| slot.is_some()).unwrap_or(false)
    }

    fn api(&self) -> Result<Arc<dyn EngineApi>> {
        self.api
            .read()
            .ok()
            .and_then(|slot| slot.clone())
            .ok_or(PanelError::EngineUnavailable)
    }

    /// Read one setting back from the engine.
    ///
    /// A non-finite read-back resolves to the setting's hard-coded default.
    pub fn get(&self, setting: Setting) -> Result<SettingValue> {
        let api = self.api()?;
        let wire = api.get(&setting.getter())?;
        let value = setting.kind().from_wire(wire).unwrap_or_else(|| {
            warn!(setting = setting.key(), wire, "Engine returned invalid value, using default");
            setting.default_value()
        });
        trace!(setting = setting.key(), ?value, "Engine read");
        Ok(value)
    }

    /// Push one setting to the engine, clamped to its range.
    pub fn set(&self, setting: Setting, value: SettingValue) -> Result<SettingValue> {
        let api = self.api()?;
        let kind = setting.kind();
        let value = kind.clamp(value).ok_or_else(|| {
            PanelError::Other(format!("Value {value:?} does not fit setting '{}'", setting.key()))
        })?;
        api.set(&setting.setter(), kind.to_wire(value))?;
        trace!(setting = setting.key(), ?value, "Engine write");
        Ok(value)
    }

    /// Read every registered setting.
    pub fn read_all(&self) -> Result<BTreeMap<Setting, SettingValue>> {
        Setting::ALL
            .into_iter()
            .map(|setting| self.get(setting).map(|value| (setting, value)))
            .collect()
    }

    pub fn action(&self, action: EngineAction) -> Result<()> {
        debug!(action = action.label(), "Engine action");
        self.api()?.action(action.symbol())
    }

    pub fn set_ui_hover(&self, hovering: bool) -> Result<()> {
        self.api()?.set_ui_hover(hovering)
    }

    /// Serialize the current scene and copy it out of engine memory.
    pub fn export_scene(&self) -> Result<String> {
        let api = self.api()?;
        let len = api.build_scene()?;
        if len == 0 {
            return Err(PanelError::EmptyScene);
        }
        let address = api.scene_pointer()?;
        let bytes = api.read_memory(address, len)?;
        debug!(len, "Scene exported from engine");
        String::from_utf8(bytes)
            .map_err(|e| PanelError::Other(format!("Scene payload is not UTF-8: {e}")))
    }

    /// Replace the engine scene with a serialized payload.
    pub fn import_scene(&self, payload: &str) -> Result<()> {
        let api = self.api()?;
        if api.load_scene(payload)? {
            debug!(len = payload.len(), "Scene loaded into engine");
            Ok(())
        } else {
            Err(PanelError::SceneRejected)
        }
    }
}
