//! Engine abstraction layer.
//!
//! The simulation engine is opaque: it exports a flat set of numeric accessor
//! calls. [`EngineApi`] is that raw contract; [`EngineBridge`] layers the typed
//! settings registry on top of it and is the only path between UI state and
//! the engine.
//!
//! # Implementation Notes
//!
//! - Booleans cross the boundary as `0`/`1`
//! - Colors cross the boundary packed into a `u32` (see [`crate::color`])
//! - Scene export is two calls: `build_scene` returns a byte length, then
//!   `scene_pointer` gives the address to read that many bytes from

mod bridge;
pub mod mock;
pub mod settings;

pub use bridge::EngineBridge;
pub use settings::{Setting, SettingKind, SettingSpec, SettingValue};

use crate::error::Result;

/// Raw accessor contract exported by the engine.
pub trait EngineApi: Send + Sync {
    /// Call a zero-argument getter such as `web_get_trails_length`.
    fn get(&self, symbol: &str) -> Result<f64>;

    /// Call a one-argument setter such as `web_set_trails_length`.
    fn set(&self, symbol: &str, value: f64) -> Result<()>;

    /// Call a zero-argument action with no return value.
    fn action(&self, symbol: &str) -> Result<()>;

    /// Serialize the current scene; returns its length in bytes.
    fn build_scene(&self) -> Result<usize>;

    /// Address of the buffer filled by the last `build_scene`.
    fn scene_pointer(&self) -> Result<usize>;

    /// Read `len` bytes of engine memory starting at `address`.
    fn read_memory(&self, address: usize, len: usize) -> Result<Vec<u8>>;

    /// Replace the scene from serialized text; `false` if the engine rejected it.
    fn load_scene(&self, text: &str) -> Result<bool>;

    /// Tell the engine whether the pointer is over panel UI.
    fn set_ui_hover(&self, hovering: bool) -> Result<()> {
        self.set("web_set_ui_hover", if hovering { 1.0 } else { 0.0 })
    }
}

/// Zero-argument engine actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineAction {
    ClearScene,
    CenterCamera,
    DeleteSelection,
    DeleteStray,
    DeselectAll,
    InvertSelection,
    SelectClusters,
    SubdivideAll,
    SubdivideSelected,
    PinSelected,
    UnpinSelected,
}

impl EngineAction {
    pub const ALL: [Self; 11] = [
        Self::ClearScene,
        Self::CenterCamera,
        Self::DeleteSelection,
        Self::DeleteStray,
        Self::DeselectAll,
        Self::InvertSelection,
        Self::SelectClusters,
        Self::SubdivideAll,
        Self::SubdivideSelected,
        Self::PinSelected,
        Self::UnpinSelected,
    ];

    /// Exported symbol name.
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::ClearScene => "web_clear_scene",
            Self::CenterCamera => "web_rc_center_camera",
            Self::DeleteSelection => "web_rc_delete_selection",
            Self::DeleteStray => "web_rc_delete_stray",
            Self::DeselectAll => "web_rc_deselect_all",
            Self::InvertSelection => "web_rc_invert_selection",
            Self::SelectClusters => "web_rc_select_clusters",
            Self::SubdivideAll => "web_rc_subdivide_all",
            Self::SubdivideSelected => "web_rc_subdivide_selected",
            Self::PinSelected => "web_rc_pin_selected",
            Self::UnpinSelected => "web_rc_unpin_selected",
        }
    }

    /// Human label shown in the actions menu.
    pub const fn label(self) -> &'static str {
        match self {
            Self::ClearScene => "Clear Scene",
            Self::CenterCamera => "Center Camera",
            Self::DeleteSelection => "Delete Selection",
            Self::DeleteStray => "Delete Stray Particles",
            Self::DeselectAll => "Deselect All",
            Self::InvertSelection => "Invert Selection",
            Self::SelectClusters => "Select Clusters",
            Self::SubdivideAll => "Subdivide All",
            Self::SubdivideSelected => "Subdivide Selected",
            Self::PinSelected => "Pin Selected",
            Self::UnpinSelected => "Unpin Selected",
        }
    }
}
