//! Panel configuration.
//!
//! Loaded from TOML or YAML, by default at `<config_dir>/gpanel/config.toml`.

mod loader;
mod path;
mod schema;

pub use loader::{
    ConfigFormat, default_config_path, load_config, load_config_from_str, load_or_default,
    save_config,
};
pub use path::{PathResolver, home_dir, resolve_path};
pub use schema::{
    CaptureConfig, DEFAULT_CODEC_PREFERENCES, MAX_CAPTURE_FPS, PanelConfig, RecordingConfig,
    StorageBackend, StorageConfig,
};
