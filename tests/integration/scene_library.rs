//! Saved scenes over the SQLite backend.

use std::sync::Arc;

use tempfile::TempDir;

use gpanel::engine::{EngineBridge, Setting, SettingValue};
use gpanel::error::PanelError;
use gpanel::storage::{
    KeyValueStore, SCENE_SCHEMA_TAG, SceneLibrary, SceneRecord, SharedStore, SqliteStore,
};

use crate::common::{controller, headless_engine, init_test_logging};

fn sqlite_store(dir: &TempDir) -> SharedStore {
    Arc::new(SqliteStore::open(dir.path().join("panel.db")).unwrap())
}

#[test]
fn test_scene_round_trip_restores_engine_and_panel() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir);
    let (engine, bridge) = headless_engine();
    let library = SceneLibrary::new(store.clone(), bridge.clone());

    let mut sync = controller(bridge, store);
    sync.initialize().unwrap();
    sync.set(Setting::TrailsLength, SettingValue::Int(900)).unwrap();
    engine.set_scene(r#"{"bodies":[1,2,3]}"#);
    let entry = sync.save_scene(&library, "three bodies").unwrap();
    assert_eq!(entry.name, "three bodies");

    sync.set(Setting::TrailsLength, SettingValue::Int(10)).unwrap();
    engine.set_scene("");
    let report = sync.open_scene(&library, &entry.id).unwrap().unwrap();
    assert_eq!(report.from_snapshot, Setting::ALL.len());
    assert_eq!(engine.scene(), r#"{"bodies":[1,2,3]}"#);
    assert_eq!(sync.value(Setting::TrailsLength), SettingValue::Int(900));
    assert_eq!(engine.raw("web_get_trails_length"), Some(900.0));
}

#[test]
fn test_catalog_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let (engine, bridge) = headless_engine();
    engine.set_scene("{}");
    let saved = {
        let library = SceneLibrary::new(sqlite_store(&dir), bridge.clone());
        library.save_scene("a", None).unwrap();
        library.save_scene("b", None).unwrap()
    };

    let library = SceneLibrary::new(sqlite_store(&dir), bridge);
    let listed = library.list_scenes().unwrap();
    let names: Vec<_> = listed.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["a", "b"]);
    assert_eq!(listed[1], saved);
}

#[test]
fn test_scene_without_ui_state_leaves_panel_alone() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir);
    let (engine, bridge) = headless_engine();
    let library = SceneLibrary::new(store.clone(), bridge.clone());
    engine.set_scene(r#"{"bare":true}"#);
    let entry = library.save_scene("bare", None).unwrap();

    let mut sync = controller(bridge, store);
    sync.initialize().unwrap();
    sync.set(Setting::Theta, SettingValue::Float(2.0)).unwrap();
    assert_eq!(sync.open_scene(&library, &entry.id).unwrap(), None);
    assert_eq!(sync.value(Setting::Theta), SettingValue::Float(2.0));
    assert_eq!(engine.scene(), r#"{"bare":true}"#);
}

#[test]
fn test_open_missing_scene_reports_notice() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir);
    let (_, bridge) = headless_engine();
    let library = SceneLibrary::new(store.clone(), bridge.clone());
    let mut sync = controller(bridge, store);
    sync.initialize().unwrap();
    sync.take_notices();

    let err = sync.open_scene(&library, "does-not-exist").unwrap_err();
    assert!(matches!(err, PanelError::SceneNotFound { .. }));
    assert_eq!(sync.take_notices(), vec!["Saved scene no longer exists."]);
}

#[test]
fn test_scene_save_needs_engine() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir);
    let bridge = EngineBridge::detached();
    let library = SceneLibrary::new(store.clone(), bridge.clone());
    let mut sync = controller(bridge, store.clone());

    assert!(matches!(
        sync.save_scene(&library, "nope"),
        Err(PanelError::EngineUnavailable)
    ));
    assert!(store.keys_with_prefix("gpanel.scene").unwrap().is_empty());
}

#[test]
fn test_records_carry_schema_tag() {
    let dir = TempDir::new().unwrap();
    let (_, bridge) = headless_engine();
    let library = SceneLibrary::new(sqlite_store(&dir), bridge);
    let entry = library
        .store_record("imported", &SceneRecord::new("{\"x\":1}".to_string(), None))
        .unwrap();

    let record = library.read_record(&entry.id).unwrap();
    assert_eq!(record.schema_tag, SCENE_SCHEMA_TAG);
    assert_eq!(record.scene_payload, "{\"x\":1}");
    assert!(record.ui_snapshot().is_none());
}

#[test]
fn test_corrupt_catalog_is_rebuilt_by_prune() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir);
    let (engine, bridge) = headless_engine();
    let library = SceneLibrary::new(store.clone(), bridge);
    engine.set_scene(r#"{"bodies":[1]}"#);
    let first = library.save_scene("first", None).unwrap();
    let second = library.save_scene("second", None).unwrap();

    store.set("gpanel.scenes", "[{\"id\":").unwrap();
    store.set("gpanel.scene.junk", "not a scene").unwrap();
    assert!(matches!(library.list_scenes(), Err(PanelError::SceneCatalogCorrupt(_))));
    assert!(library.save_scene("blocked", None).is_err());

    let summary = library.prune_catalog().unwrap();
    assert!(summary.catalog_rebuilt);
    assert_eq!(summary.recovered_entries, 2);
    assert_eq!(summary.orphan_entries, 1);
    assert_eq!(store.get("gpanel.scene.junk").unwrap(), None);

    let mut ids: Vec<_> = library
        .list_scenes()
        .unwrap()
        .into_iter()
        .map(|entry| entry.id)
        .collect();
    ids.sort();
    let mut expected = vec![first.id.clone(), second.id];
    expected.sort();
    assert_eq!(ids, expected);

    // The library is usable again and recovered scenes still load.
    library.save_scene("third", None).unwrap();
    assert_eq!(library.list_scenes().unwrap().len(), 3);
    engine.set_scene("");
    library.load_scene(&first.id).unwrap();
    assert_eq!(engine.scene(), r#"{"bodies":[1]}"#);
    assert!(!library.prune_catalog().unwrap().catalog_rebuilt);
}
