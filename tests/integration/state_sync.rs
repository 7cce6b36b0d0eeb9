//! Startup reconciliation between storage, the UI model and the engine.

use std::sync::Arc;

use serde_json::json;

use gpanel::engine::mock::SimulatedEngine;
use gpanel::engine::{EngineBridge, Setting, SettingValue};
use gpanel::snapshot::{PartialSnapshot, UiStateSnapshot};
use gpanel::storage::{KeyValueStore, StateStore};
use gpanel::sync::{Provenance, SyncController};

use crate::common::{controller, headless_engine, init_test_logging, memory_store};

#[test]
fn test_stored_state_is_pushed_to_engine() {
    init_test_logging();
    let (engine, bridge) = headless_engine();
    let (_, store) = memory_store();
    let mut stored = UiStateSnapshot::defaults();
    stored.set(Setting::TrailsLength, SettingValue::Int(700));
    stored.set(Setting::GlowEnabled, SettingValue::Bool(true));
    assert!(StateStore::new(store.clone()).save(&stored));

    let mut sync = controller(bridge, store);
    assert_eq!(sync.initialize().unwrap(), Provenance::Stored);
    assert_eq!(engine.raw("web_get_trails_length"), Some(700.0));
    assert_eq!(sync.value(Setting::TrailsLength), SettingValue::Int(700));
    assert_eq!(sync.value(Setting::GlowEnabled), SettingValue::Bool(false));
    assert_eq!(engine.raw("web_get_glow_enabled"), Some(0.0));
}

#[test]
fn test_empty_storage_reads_engine() {
    let (engine, bridge) = headless_engine();
    engine.set_raw("web_get_color_mode", 3.0);
    let (_, store) = memory_store();

    let mut sync = controller(bridge, store);
    assert_eq!(sync.initialize().unwrap(), Provenance::Engine);
    assert_eq!(sync.value(Setting::ColorMode), SettingValue::Int(3));
}

#[test]
fn test_no_engine_mirrors_storage_and_leaves_engine_alone() {
    let (_, store) = memory_store();
    let mut stored = UiStateSnapshot::defaults();
    stored.set(Setting::Theta, SettingValue::Float(1.5));
    StateStore::new(store.clone()).save(&stored);

    let mut sync = controller(EngineBridge::detached(), store);
    assert_eq!(sync.initialize().unwrap(), Provenance::Stored);
    assert_eq!(sync.value(Setting::Theta), SettingValue::Float(1.5));
    assert_eq!(sync.take_notices(), vec!["Engine not ready yet."]);
}

#[test]
fn test_no_engine_and_no_storage_is_hard_coded() {
    let (_, store) = memory_store();
    let mut sync = controller(EngineBridge::detached(), store);
    assert_eq!(sync.initialize().unwrap(), Provenance::HardCoded);
    assert_eq!(sync.build_snapshot(), UiStateSnapshot::defaults());
}

#[test]
fn test_engine_attached_later() {
    let (_, store) = memory_store();
    let bridge = EngineBridge::detached();
    let mut sync = controller(bridge.clone(), store);
    sync.initialize().unwrap();

    let engine = Arc::new(SimulatedEngine::new());
    engine.set_raw("web_get_softening", 12.0);
    bridge.attach(engine);
    let report = sync.sync_from_engine().unwrap();
    assert_eq!(report.from_engine, Setting::ALL.len());
    assert_eq!(sync.provenance(), Provenance::Engine);
    assert_eq!(sync.value(Setting::Softening), SettingValue::Float(12.0));
}

#[test]
fn test_state_survives_restart() {
    let (_, store) = memory_store();
    {
        let (_, bridge) = headless_engine();
        let mut sync = controller(bridge, store.clone());
        sync.initialize().unwrap();
        sync.set(Setting::TimeFactor, SettingValue::Float(2.5)).unwrap();
        sync.set(Setting::ToolBlackHole, SettingValue::Bool(true)).unwrap();
        assert!(sync.persist_if_dirty());
    }

    let (engine, bridge) = headless_engine();
    let mut sync = controller(bridge, store);
    assert_eq!(sync.initialize().unwrap(), Provenance::Stored);
    assert_eq!(sync.value(Setting::TimeFactor), SettingValue::Float(2.5));
    assert_eq!(engine.raw("web_get_tool_black_hole"), Some(1.0));
}

#[test]
fn test_stored_snapshot_with_two_tools_keeps_first() {
    let (engine, bridge) = headless_engine();
    let (_, store) = memory_store();
    store
        .set(
            "gpanel.ui_state",
            &json!({"schema": 1, "settings": {"toolEraser": true, "toolStar": true}}).to_string(),
        )
        .unwrap();

    let mut sync = controller(bridge, store);
    sync.initialize().unwrap();
    assert_eq!(sync.value(Setting::ToolStar), SettingValue::Bool(true));
    assert_eq!(sync.value(Setting::ToolEraser), SettingValue::Bool(false));
    assert_eq!(engine.raw("web_get_tool_eraser"), Some(0.0));
}

#[test]
fn test_setting_one_trail_mode_clears_the_other() {
    let (engine, bridge) = headless_engine();
    let (_, store) = memory_store();
    let mut sync = controller(bridge, store);
    sync.initialize().unwrap();

    sync.set(Setting::GlobalTrails, SettingValue::Bool(true)).unwrap();
    sync.set(Setting::SelectedTrails, SettingValue::Bool(true)).unwrap();
    assert_eq!(sync.value(Setting::GlobalTrails), SettingValue::Bool(false));
    assert_eq!(engine.raw("web_get_global_trails"), Some(0.0));
    assert_eq!(engine.raw("web_get_selected_trails"), Some(1.0));
}

#[test]
fn test_out_of_range_values_are_clamped_on_the_way_in() {
    let (engine, bridge) = headless_engine();
    let (_, store) = memory_store();
    let mut sync = controller(bridge, store);
    sync.initialize().unwrap();

    let mut snapshot = PartialSnapshot::empty();
    snapshot.insert_raw("trailsLength", json!(99_999));
    let report = sync.apply_snapshot(&snapshot).unwrap();
    assert_eq!(report.from_snapshot, 1);
    assert_eq!(sync.value(Setting::TrailsLength), SettingValue::Int(1500));
    assert_eq!(engine.raw("web_get_trails_length"), Some(1500.0));
}
