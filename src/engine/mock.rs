//! In-process engine implementation for tests and the CLI demo.
//!
//! [`SimulatedEngine`] stores accessor values in a map seeded with the
//! registry defaults, records every call and supports error injection, in
//! the same spirit as a mock hardware device.
//!
//! # Example
//!
//! ```rust,ignore
//! use gpanel::engine::mock::{EngineCall, SimulatedEngine};
//! use gpanel::engine::EngineApi;
//!
//! let engine = SimulatedEngine::new();
//! engine.set("web_set_trails_length", 100.0).unwrap();
//! engine.assert_contains(&EngineCall::Set {
//!     symbol: "web_set_trails_length".into(),
//!     value: 100.0,
//! });
//! ```

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, trace};

use super::EngineApi;
use super::settings::Setting;
use crate::error::{PanelError, Result};

/// Base address reported for the scene buffer.
const SCENE_BUFFER_ADDRESS: usize = 0x0010_0000;

/// Recorded call for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Get { symbol: String },
    Set { symbol: String, value: f64 },
    Action { symbol: String },
    BuildScene,
    LoadScene { len: usize },
}

/// Mock engine holding accessor values in memory.
pub struct SimulatedEngine {
    values: Mutex<HashMap<String, f64>>,
    scene: Mutex<String>,
    scene_buffer: Mutex<Vec<u8>>,
    call_log: Mutex<Vec<EngineCall>>,
    error_injection: Mutex<Option<PanelError>>,
    hovering: AtomicBool,
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedEngine {
    /// Engine seeded with every registry default.
    #[must_use]
    pub fn new() -> Self {
        let values = Setting::ALL
            .into_iter()
            .map(|s| (s.spec().stem.to_string(), s.kind().to_wire(s.default_value())))
            .collect();
        debug!("Creating simulated engine");
        Self {
            values: Mutex::new(values),
            scene: Mutex::new(String::new()),
            scene_buffer: Mutex::new(Vec::new()),
            call_log: Mutex::new(Vec::new()),
            error_injection: Mutex::new(None),
            hovering: AtomicBool::new(false),
        }
    }

    // === Engine-side mutation ===

    /// Change a value as if the simulation changed it on its own.
    pub fn set_raw(&self, symbol: &str, value: f64) {
        if let Some(stem) = stem_of(symbol) {
            self.values.lock().unwrap().insert(stem.to_string(), value);
        }
    }

    /// Current raw value behind a getter or setter symbol.
    #[must_use]
    pub fn raw(&self, symbol: &str) -> Option<f64> {
        let stem = stem_of(symbol)?;
        self.values.lock().unwrap().get(stem).copied()
    }

    /// Replace the current scene text.
    pub fn set_scene(&self, text: &str) {
        *self.scene.lock().unwrap() = text.to_string();
    }

    #[must_use]
    pub fn scene(&self) -> String {
        self.scene.lock().unwrap().clone()
    }

    #[must_use]
    pub fn is_hovering(&self) -> bool {
        self.hovering.load(Ordering::SeqCst)
    }

    /// Inject an error for the next call.
    pub fn inject_error(&self, error: PanelError) {
        *self.error_injection.lock().unwrap() = Some(error);
    }

    // === Assertions ===

    #[must_use]
    pub fn calls(&self) -> Vec<EngineCall> {
        self.call_log.lock().unwrap().clone()
    }

    /// Number of recorded calls naming `symbol`.
    #[must_use]
    pub fn call_count(&self, symbol: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| match call {
                EngineCall::Get { symbol: s }
                | EngineCall::Set { symbol: s, .. }
                | EngineCall::Action { symbol: s } => s == symbol,
                _ => false,
            })
            .count()
    }

    /// # Panics
    ///
    /// Panics if the call was not recorded.
    pub fn assert_contains(&self, expected: &EngineCall) {
        let calls = self.calls();
        assert!(
            calls.contains(expected),
            "Expected call {expected:?} not found in: {calls:#?}",
        );
    }

    pub fn clear_calls(&self) {
        self.call_log.lock().unwrap().clear();
    }

    // === Internal Helpers ===

    fn record(&self, call: EngineCall) {
        trace!(?call, "Recording engine call");
        self.call_log.lock().unwrap().push(call);
    }

    fn check_error(&self) -> Result<()> {
        match self.error_injection.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn stem_of(symbol: &str) -> Option<&str> {
    symbol
        .strip_prefix("web_get_")
        .or_else(|| symbol.strip_prefix("web_set_"))
}

impl EngineApi for SimulatedEngine {
    fn get(&self, symbol: &str) -> Result<f64> {
        self.check_error()?;
        self.record(EngineCall::Get { symbol: symbol.to_string() });
        symbol
            .strip_prefix("web_get_")
            .and_then(|stem| self.values.lock().unwrap().get(stem).copied())
            .ok_or_else(|| PanelError::UnknownAccessor { symbol: symbol.to_string() })
    }

    fn set(&self, symbol: &str, value: f64) -> Result<()> {
        self.check_error()?;
        self.record(EngineCall::Set { symbol: symbol.to_string(), value });
        if symbol == "web_set_ui_hover" {
            self.hovering.store(value != 0.0, Ordering::SeqCst);
            return Ok(());
        }
        let stem = symbol
            .strip_prefix("web_set_")
            .ok_or_else(|| PanelError::UnknownAccessor { symbol: symbol.to_string() })?;
        let mut values = self.values.lock().unwrap();
        match values.get_mut(stem) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(PanelError::UnknownAccessor { symbol: symbol.to_string() }),
        }
    }

    fn action(&self, symbol: &str) -> Result<()> {
        self.check_error()?;
        self.record(EngineCall::Action { symbol: symbol.to_string() });
        if symbol == "web_clear_scene" {
            self.scene.lock().unwrap().clear();
        }
        Ok(())
    }

    fn build_scene(&self) -> Result<usize> {
        self.check_error()?;
        self.record(EngineCall::BuildScene);
        let scene = self.scene.lock().unwrap().clone();
        let mut buffer = self.scene_buffer.lock().unwrap();
        *buffer = scene.into_bytes();
        Ok(buffer.len())
    }

    fn scene_pointer(&self) -> Result<usize> {
        self.check_error()?;
        Ok(SCENE_BUFFER_ADDRESS)
    }

    fn read_memory(&self, address: usize, len: usize) -> Result<Vec<u8>> {
        self.check_error()?;
        let buffer = self.scene_buffer.lock().unwrap();
        let start = address
            .checked_sub(SCENE_BUFFER_ADDRESS)
            .ok_or_else(|| PanelError::Other(format!("Address {address:#x} out of range")))?;
        buffer
            .get(start..start.saturating_add(len))
            .map(<[u8]>::to_vec)
            .ok_or_else(|| {
                PanelError::Other(format!("Read of {len} bytes at {address:#x} out of range"))
            })
    }

    fn load_scene(&self, text: &str) -> Result<bool> {
        self.check_error()?;
        self.record(EngineCall::LoadScene { len: text.len() });
        if serde_json::from_str::<serde_json::Value>(text).is_err() {
            return Ok(false);
        }
        *self.scene.lock().unwrap() = text.to_string();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_with_defaults() {
        let engine = SimulatedEngine::new();
        assert_eq!(engine.get("web_get_target_fps").unwrap(), 144.0);
        assert_eq!(engine.get("web_get_time_playing").unwrap(), 1.0);
    }

    #[test]
    fn test_unknown_accessor() {
        let engine = SimulatedEngine::new();
        assert!(matches!(
            engine.get("web_get_warp_drive"),
            Err(PanelError::UnknownAccessor { .. })
        ));
        assert!(engine.set("web_set_warp_drive", 1.0).is_err());
    }

    #[test]
    fn test_injected_error_is_consumed() {
        let engine = SimulatedEngine::new();
        engine.inject_error(PanelError::EngineUnavailable);
        assert!(engine.get("web_get_theta").is_err());
        assert!(engine.get("web_get_theta").is_ok());
    }

    #[test]
    fn test_call_log() {
        let engine = SimulatedEngine::new();
        engine.set("web_set_theta", 0.5).unwrap();
        engine.action("web_rc_center_camera").unwrap();
        engine.set_ui_hover(true).unwrap();
        assert!(engine.is_hovering());
        assert_eq!(engine.call_count("web_set_theta"), 1);
        engine.assert_contains(&EngineCall::Action { symbol: "web_rc_center_camera".into() });
    }

    #[test]
    fn test_clear_scene_action() {
        let engine = SimulatedEngine::new();
        engine.set_scene("{\"particles\":1}");
        engine.action("web_clear_scene").unwrap();
        assert!(engine.scene().is_empty());
    }

    #[test]
    fn test_memory_bounds() {
        let engine = SimulatedEngine::new();
        engine.set_scene("abc");
        let len = engine.build_scene().unwrap();
        let ptr = engine.scene_pointer().unwrap();
        assert_eq!(engine.read_memory(ptr, len).unwrap(), b"abc");
        assert!(engine.read_memory(ptr, len + 1).is_err());
        assert!(engine.read_memory(0, 1).is_err());
    }
}
