//! Loading and saving the panel configuration file.
//!
//! The format is chosen by extension (`.toml`, `.yaml`, `.yml`). A missing
//! file at the default location yields defaults; a missing file the user
//! named explicitly is an error.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, trace};

use super::path::PathResolver;
use super::schema::PanelConfig;
use crate::error::{PanelError, Result};

/// Configuration file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// Detect format from file extension.
    #[must_use]
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }

    fn for_path(path: &Path) -> Result<Self> {
        Self::from_extension(path).ok_or_else(|| {
            PanelError::ConfigParse(format!(
                "Unknown config format for '{}': expected .yaml, .yml, or .toml",
                path.display()
            ))
        })
    }
}

/// `<config_dir>/gpanel/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("gpanel").join("config.toml"))
}

/// Load and validate a config file, resolving its paths.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PanelConfig> {
    let path = path.as_ref();
    let format = ConfigFormat::for_path(path)?;

    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PanelError::ConfigNotFound {
                path: path.display().to_string(),
            }
        } else {
            PanelError::Io(e)
        }
    })?;
    debug!(bytes = content.len(), ?format, "Read config file");

    let mut config = load_config_from_str(&content, format)?;
    resolve_paths(&mut config, &PathResolver::for_config_file(path))?;
    info!("Configuration loaded");
    Ok(config)
}

/// Parse and validate config text. Paths are left as written.
pub fn load_config_from_str(content: &str, format: ConfigFormat) -> Result<PanelConfig> {
    trace!(?format, len = content.len(), "Parsing config content");
    let config: PanelConfig = match format {
        ConfigFormat::Yaml if content.trim().is_empty() => PanelConfig::default(),
        ConfigFormat::Yaml => serde_yaml::from_str(content)
            .map_err(|e| PanelError::ConfigParse(format!("YAML: {e}")))?,
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| PanelError::ConfigParse(format!("TOML: {e}")))?
        }
    };
    config.validate()?;
    Ok(config)
}

/// Load `explicit` if given, else the default location, else defaults.
pub fn load_or_default(explicit: Option<&Path>) -> Result<PanelConfig> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    match default_config_path() {
        Some(path) if path.exists() => load_config(path),
        _ => {
            debug!("No config file, using defaults");
            let mut config = PanelConfig::default();
            resolve_paths(&mut config, &PathResolver::for_working_dir())?;
            Ok(config)
        }
    }
}

/// Write `config` to `path` in the format its extension names.
#[instrument(skip(config), fields(path = %path.as_ref().display()))]
pub fn save_config<P: AsRef<Path>>(config: &PanelConfig, path: P) -> Result<()> {
    let path = path.as_ref();
    let content = match ConfigFormat::for_path(path)? {
        ConfigFormat::Yaml => serde_yaml::to_string(config)
            .map_err(|e| PanelError::ConfigParse(format!("YAML: {e}")))?,
        ConfigFormat::Toml => toml::to_string_pretty(config)
            .map_err(|e| PanelError::ConfigParse(format!("TOML: {e}")))?,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    info!("Configuration saved");
    Ok(())
}

fn resolve_paths(config: &mut PanelConfig, resolver: &PathResolver) -> Result<()> {
    resolver.resolve_field(&mut config.storage.path)?;
    resolver.resolve_field(&mut config.capture.output_dir)?;
    resolver.resolve_field(&mut config.capture.icc_profile)
}
