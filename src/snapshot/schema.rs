//! Persisted UI-state snapshot types.
//!
//! Stored snapshots are a versioned envelope around raw JSON values. Values
//! are validated per key when read through [`PartialSnapshot::get`], so a
//! stale or hand-edited snapshot only loses the keys that no longer fit.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::engine::{Setting, SettingValue};

/// Current envelope version.
pub const SNAPSHOT_SCHEMA: u32 = 1;

/// On-disk form: `{"schema": 1, "settings": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEnvelope {
    schema: u32,
    #[serde(default)]
    settings: Map<String, Value>,
}

/// A possibly incomplete, unvalidated snapshot as read from storage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialSnapshot {
    entries: Map<String, Value>,
}

impl PartialSnapshot {
    /// Snapshot with no keys; applying it reads everything back from the engine.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from raw JSON entries.
    #[must_use]
    pub fn from_raw(entries: Map<String, Value>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Validated value for `setting`, or `None` when absent or ill-typed.
    #[must_use]
    pub fn get(&self, setting: Setting) -> Option<SettingValue> {
        let raw = self.entries.get(setting.key())?;
        let value = setting.kind().coerce(raw);
        if value.is_none() {
            debug!(setting = setting.key(), %raw, "Ignoring ill-typed snapshot value");
        }
        value
    }

    /// Whether a raw value is present for `key`, well-typed or not.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert a raw value, replacing any previous one.
    pub fn insert_raw(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    /// Keys that are not part of the registry.
    #[must_use]
    pub fn unknown_keys(&self) -> Vec<&str> {
        self.entries
            .keys()
            .filter(|k| Setting::from_key(k).is_none())
            .map(String::as_str)
            .collect()
    }

    /// Serialize into the current envelope version.
    #[must_use]
    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }

    /// The current envelope as a JSON value, for embedding in other records.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let envelope = SnapshotEnvelope {
            schema: SNAPSHOT_SCHEMA,
            settings: self.entries.clone(),
        };
        serde_json::to_value(envelope).unwrap_or(Value::Null)
    }

    /// Read an embedded envelope, migrating older versions.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        migrate(value).map(Self::from_raw)
    }

    /// Parse stored text, migrating older envelopes.
    ///
    /// Returns `None` for invalid JSON, non-object roots and unknown future
    /// schema versions. Never panics.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let root: Value = match serde_json::from_str(text) {
            Ok(root) => root,
            Err(e) => {
                warn!(error = %e, "Stored snapshot is not valid JSON");
                return None;
            }
        };
        Self::from_value(root)
    }
}

/// Upgrade any known envelope version to the current settings map.
fn migrate(root: Value) -> Option<Map<String, Value>> {
    let Value::Object(mut object) = root else {
        warn!("Stored snapshot root is not an object");
        return None;
    };
    let version = match object.get("schema") {
        None => 0,
        Some(v) => match v.as_u64().and_then(|v| u32::try_from(v).ok()) {
            Some(v) => v,
            None => {
                warn!(schema = %v, "Stored snapshot has a malformed schema tag");
                return None;
            }
        },
    };
    match version {
        0 => Some(migrate_v0(object)),
        SNAPSHOT_SCHEMA => match object.remove("settings") {
            Some(Value::Object(settings)) => Some(settings),
            None => Some(Map::new()),
            Some(_) => {
                warn!("Stored snapshot settings are not an object");
                None
            }
        },
        newer => {
            warn!(schema = newer, "Stored snapshot is from a newer version");
            None
        }
    }
}

/// v0 was the bare settings object with no envelope.
fn migrate_v0(object: Map<String, Value>) -> Map<String, Value> {
    debug!(keys = object.len(), "Migrating untagged snapshot");
    object
}

/// A complete, validated copy of every tracked setting.
#[derive(Debug, Clone, PartialEq)]
pub struct UiStateSnapshot {
    values: BTreeMap<Setting, SettingValue>,
}

impl UiStateSnapshot {
    /// Snapshot holding every hard-coded default.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            values: Setting::ALL
                .into_iter()
                .map(|s| (s, s.default_value()))
                .collect(),
        }
    }

    /// Build from a map, filling any missing setting with its default.
    #[must_use]
    pub fn from_values(values: BTreeMap<Setting, SettingValue>) -> Self {
        let mut snapshot = Self::defaults();
        snapshot.values.extend(values);
        snapshot
    }

    #[must_use]
    pub fn get(&self, setting: Setting) -> SettingValue {
        self.values
            .get(&setting)
            .copied()
            .unwrap_or_else(|| setting.default_value())
    }

    pub fn set(&mut self, setting: Setting, value: SettingValue) {
        self.values.insert(setting, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Setting, SettingValue)> + '_ {
        self.values.iter().map(|(s, v)| (*s, *v))
    }

    /// Settings whose value differs from `other`.
    #[must_use]
    pub fn diff(&self, other: &Self) -> Vec<Setting> {
        Setting::ALL
            .into_iter()
            .filter(|s| self.get(*s) != other.get(*s))
            .collect()
    }

    /// Raw persisted form.
    #[must_use]
    pub fn to_partial(&self) -> PartialSnapshot {
        let entries = self
            .values
            .iter()
            .map(|(s, v)| (s.key().to_string(), v.to_json()))
            .collect();
        PartialSnapshot::from_raw(entries)
    }
}
