//! Common test utilities for the Galaxy panel.
//!
//! - capture fixtures wired to in-memory hosts
//! - a simulated engine behind a bridge
//! - an independent tar reader for archive assertions
#![allow(dead_code)]

use std::io::{Cursor, Read};
use std::sync::Arc;

use gpanel::capture::surface::{ManualTicker, MemorySink, StaticSurface};
use gpanel::capture::{CaptureScheduler, ExportCompositor};
use gpanel::color::ColorValue;
use gpanel::engine::EngineBridge;
use gpanel::engine::mock::SimulatedEngine;
use gpanel::storage::{MemoryStore, SharedStore, StateStore};
use gpanel::sync::SyncController;
use tracing_subscriber::EnvFilter;

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A scheduler and the hosts it talks to.
pub struct CaptureHarness {
    pub surface: Arc<StaticSurface>,
    pub ticker: Arc<ManualTicker>,
    pub sink: Arc<MemorySink>,
    pub scheduler: CaptureScheduler,
}

impl CaptureHarness {
    pub fn new(width: u32, height: u32) -> Self {
        let surface = Arc::new(
            StaticSurface::new(width, height, ColorValue::TRANSPARENT)
                .with_ancestry(vec![ColorValue::TRANSPARENT, ColorValue::rgb(12, 14, 40)]),
        );
        let ticker = Arc::new(ManualTicker::new());
        let sink = Arc::new(MemorySink::new());
        let scheduler = CaptureScheduler::new(
            surface.clone(),
            ticker.clone(),
            sink.clone(),
            ExportCompositor::new(ColorValue::BLACK),
        );
        Self {
            surface,
            ticker,
            sink,
            scheduler,
        }
    }

    /// Fire `count` ticks, letting each capture finish before the next.
    pub async fn run_ticks(&self, count: usize) -> usize {
        let mut issued = 0;
        for _ in 0..count {
            self.ticker.fire();
            if self.scheduler.is_in_flight() {
                issued += 1;
            }
            self.scheduler.settle().await;
        }
        issued
    }
}

/// Simulated engine plus a bridge attached to it.
pub fn headless_engine() -> (Arc<SimulatedEngine>, EngineBridge) {
    let engine = Arc::new(SimulatedEngine::new());
    let bridge = EngineBridge::new(engine.clone());
    (engine, bridge)
}

pub fn memory_store() -> (Arc<MemoryStore>, SharedStore) {
    let store = Arc::new(MemoryStore::new());
    let shared: SharedStore = store.clone();
    (store, shared)
}

pub fn controller(bridge: EngineBridge, store: SharedStore) -> SyncController {
    SyncController::new(bridge, StateStore::new(store))
}

/// One archive member as seen by the reference reader.
#[derive(Debug)]
pub struct TarMember {
    pub name: String,
    pub size: u64,
    pub mode: u32,
    pub mtime: u64,
    pub bytes: Vec<u8>,
}

/// Read an archive with the `tar` crate, panicking on any format error.
pub fn read_tar(bytes: &[u8]) -> Vec<TarMember> {
    let mut archive = tar::Archive::new(Cursor::new(bytes));
    archive
        .entries()
        .expect("archive entries")
        .map(|entry| {
            let mut entry = entry.expect("archive entry");
            let header = entry.header().clone();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).expect("entry body");
            TarMember {
                name: entry.path().expect("entry path").display().to_string(),
                size: header.size().expect("size"),
                mode: header.mode().expect("mode"),
                mtime: header.mtime().expect("mtime"),
                bytes: data,
            }
        })
        .collect()
}
