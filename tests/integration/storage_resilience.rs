//! Panel behavior with corrupt, missing and failing storage.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use gpanel::engine::{EngineBridge, Setting, SettingValue};
use gpanel::snapshot::UiStateSnapshot;
use gpanel::storage::{
    KeyValueStore, MemoryStore, SharedStore, SnapshotSlot, SqliteStore, StateStore,
};
use gpanel::sync::Provenance;

use crate::common::{controller, headless_engine, memory_store};

fn defaults_with(setting: Setting, value: SettingValue) -> UiStateSnapshot {
    let mut snapshot = UiStateSnapshot::defaults();
    snapshot.set(setting, value);
    snapshot
}

#[test]
fn test_invalid_primary_falls_back_to_defaults() {
    let (_, store) = memory_store();
    store.set("gpanel.ui_state", "{not json").unwrap();
    StateStore::new(store.clone())
        .promote_to_defaults(&defaults_with(Setting::Theta, SettingValue::Float(3.0)));

    let (_, bridge) = headless_engine();
    let mut sync = controller(bridge, store);
    assert_eq!(sync.initialize().unwrap(), Provenance::Defaults);
    assert_eq!(sync.value(Setting::Theta), SettingValue::Float(3.0));
}

#[test]
fn test_both_slots_invalid_falls_back_to_engine_or_built_ins() {
    let (_, store) = memory_store();
    store.set("gpanel.ui_state", "[1, 2, 3]").unwrap();
    store.set("gpanel.ui_defaults", "\"text\"").unwrap();

    let (engine, bridge) = headless_engine();
    engine.set_raw("web_get_target_fps", 60.0);
    let mut sync = controller(bridge, store.clone());
    assert_eq!(sync.initialize().unwrap(), Provenance::Engine);
    assert_eq!(sync.value(Setting::TargetFps), SettingValue::Int(60));

    let mut headless = controller(EngineBridge::detached(), store);
    assert_eq!(headless.initialize().unwrap(), Provenance::HardCoded);
    assert_eq!(headless.value(Setting::TargetFps), Setting::TargetFps.default_value());
}

#[test]
fn test_newer_schema_is_ignored() {
    let (_, store) = memory_store();
    store
        .set(
            "gpanel.ui_state",
            &json!({"schema": 99, "settings": {"theta": 4.0}}).to_string(),
        )
        .unwrap();
    assert!(StateStore::new(store).load(SnapshotSlot::Primary).is_none());
}

#[test]
fn test_untagged_legacy_object_is_migrated() {
    let (engine, bridge) = headless_engine();
    let (_, store) = memory_store();
    store
        .set("gpanel.ui_state", &json!({"trailsLength": 250, "whiteTrails": true}).to_string())
        .unwrap();

    let mut sync = controller(bridge, store);
    assert_eq!(sync.initialize().unwrap(), Provenance::Stored);
    assert_eq!(sync.value(Setting::TrailsLength), SettingValue::Int(250));
    assert_eq!(engine.raw("web_get_white_trails"), Some(1.0));
}

#[test]
fn test_bad_values_degrade_per_key() {
    let (engine, bridge) = headless_engine();
    engine.set_raw("web_get_trails_thickness", 0.5);
    let (_, store) = memory_store();
    store
        .set(
            "gpanel.ui_state",
            &json!({
                "schema": 1,
                "settings": {
                    "trailsThickness": "thick",
                    "lightColor": {"r": 255, "g": 136, "b": 0},
                    "retiredSetting": 12
                }
            })
            .to_string(),
        )
        .unwrap();

    let mut sync = controller(bridge, store);
    sync.initialize().unwrap();
    assert_eq!(sync.value(Setting::TrailsThickness), SettingValue::Float(0.5));
    assert!(matches!(
        sync.value(Setting::LightColor),
        SettingValue::Color(c) if (c.r, c.g, c.b) == (255, 136, 0)
    ));
}

#[test]
fn test_quota_failure_keeps_previous_state() {
    let quota = Arc::new(MemoryStore::with_quota(64));
    let store: SharedStore = quota.clone();
    let (_, bridge) = headless_engine();
    let mut sync = controller(bridge, store.clone());
    sync.initialize().unwrap();
    sync.set(Setting::TimeFactor, SettingValue::Float(3.0)).unwrap();

    assert!(!sync.persist_if_dirty());
    assert!(sync.is_dirty());
    assert_eq!(sync.take_notices(), vec!["Settings could not be saved."]);
    assert!(quota.is_empty());
    // The session keeps working.
    assert_eq!(sync.value(Setting::TimeFactor), SettingValue::Float(3.0));
}

#[test]
fn test_disabled_storage_never_halts_startup() {
    let mem = Arc::new(MemoryStore::new());
    mem.set_disabled(true);
    let store: SharedStore = mem.clone();
    let (_, bridge) = headless_engine();
    let mut sync = controller(bridge, store);
    assert_eq!(sync.initialize().unwrap(), Provenance::Engine);
    assert!(!sync.save_now());
    assert!(!sync.promote_to_defaults());
}

#[test]
fn test_sqlite_state_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("panel.db");
    {
        let store: SharedStore = Arc::new(SqliteStore::open(&path).unwrap());
        assert!(StateStore::new(store)
            .save(&defaults_with(Setting::ColorMode, SettingValue::Int(7))));
    }

    let store: SharedStore = Arc::new(SqliteStore::open(&path).unwrap());
    let loaded = StateStore::new(store).load(SnapshotSlot::Primary).unwrap();
    assert_eq!(loaded.get(Setting::ColorMode), Some(SettingValue::Int(7)));
}
