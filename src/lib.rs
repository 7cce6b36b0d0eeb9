//! Galaxy panel library - capture, archive export and state synchronization
//! for the Galaxy Engine control panel.
//!
//! This library exposes the core functionality of the `gpanel` CLI for use in
//! tests and embedding hosts.
//!
//! # Modules
//!
//! - `color`: RGBA value type and the engine's packed wire format
//! - `archive`: ustar encoder for frame bundles
//! - `capture`: frame scheduler, compositor and video recorder
//! - `engine`: typed bridge over the simulation engine's accessor surface
//! - `snapshot`: versioned UI state snapshots
//! - `storage`: key-value backends, snapshot slots and the scene library
//! - `sync`: reconciliation of panel state with the engine
//! - `config`: configuration file handling
//! - `error`: Error types with user-recoverable hints
#![forbid(unsafe_code)]

pub mod archive;
pub mod capture;
pub mod cli;
pub mod color;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod snapshot;
pub mod storage;
pub mod sync;
