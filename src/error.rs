//! Error types for panel operations.

use thiserror::Error;

/// Primary error type for panel operations.
#[derive(Error, Debug)]
pub enum PanelError {
    // Archive errors
    #[error("Archive entry name '{name}' is {len} bytes; the limit is 100")]
    ArchiveNameTooLong { name: String, len: usize },

    #[error("Archive entry '{name}' is {size} bytes; the limit is {max}")]
    ArchiveEntryTooLarge { name: String, size: u64, max: u64 },

    #[error("Archive source for '{name}' could not be read: {reason}")]
    ArchiveSource { name: String, reason: String },

    // Capture errors
    #[error("Rendering surface unavailable: {0}")]
    Surface(String),

    #[error("Frame encoding failed: {0}")]
    Encode(String),

    #[error("Frame encoding path not supported: {0}")]
    EncodeUnsupported(String),

    #[error("Recorder failed: {0}")]
    Recorder(String),

    #[error("No async runtime is available to drive capture")]
    NoRuntime,

    // Engine errors
    #[error("Simulation engine is not ready")]
    EngineUnavailable,

    #[error("Engine has no accessor named '{symbol}'")]
    UnknownAccessor { symbol: String },

    #[error("Engine rejected the scene payload")]
    SceneRejected,

    #[error("Engine returned an empty scene")]
    EmptyScene,

    // Storage errors
    #[error("Storage write failed for '{key}': {reason}")]
    StorageWrite { key: String, reason: String },

    #[error("Storage backend error: {0}")]
    Storage(String),

    #[error("Scene not found: {id}")]
    SceneNotFound { id: String },

    #[error("Scene catalog is corrupt: {0}")]
    SceneCatalogCorrupt(String),

    // Configuration errors
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl PanelError {
    /// Returns true if the error is recoverable by the user.
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ArchiveNameTooLong { .. }
                | Self::EngineUnavailable
                | Self::SceneNotFound { .. }
                | Self::SceneCatalogCorrupt(_)
                | Self::ConfigNotFound { .. }
                | Self::ConfigInvalid(_)
                | Self::StorageWrite { .. }
        )
    }

    /// Returns a suggestion for how to fix the error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::ArchiveNameTooLong { .. } => Some("Use a shorter file name (at most 100 bytes)"),
            Self::EngineUnavailable => Some("Wait for the engine to finish loading, then retry"),
            Self::StorageWrite { .. } => {
                Some("Free up browser storage or leave private browsing mode")
            }
            Self::ConfigNotFound { .. } => Some("Run: gpanel config --init"),
            Self::SceneNotFound { .. } => Some("Run: gpanel scenes list"),
            Self::SceneCatalogCorrupt(_) => Some("Run: gpanel scenes prune"),
            _ => None,
        }
    }

    /// Short inline notice shown in the panel instead of halting it.
    pub fn notice(&self) -> String {
        match self {
            Self::EngineUnavailable => "Engine not ready yet.".to_string(),
            Self::StorageWrite { .. } => "Settings could not be saved.".to_string(),
            Self::SceneRejected => "Scene could not be loaded.".to_string(),
            Self::EmptyScene => "Nothing to save: the scene is empty.".to_string(),
            Self::SceneNotFound { .. } => "Saved scene no longer exists.".to_string(),
            Self::Recorder(_) => "Recording failed.".to_string(),
            other => other.to_string(),
        }
    }
}

/// Convenience type alias for Results using PanelError.
pub type Result<T> = std::result::Result<T, PanelError>;

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| PanelError::Other(format!("{}: {e}", f().into())))
    }
}
