//! UI-state snapshots.
//!
//! A [`UiStateSnapshot`] is the complete, validated set of panel settings at
//! one instant. A [`PartialSnapshot`] is what comes back from storage: a
//! versioned envelope of raw values that is validated key by key on use.
//!
//! # Stored Format
//!
//! ```text
//! {"schema":1,"settings":{"trailsLength":48,"lightColor":{"r":255,"g":255,"b":255,"a":255}}}
//! ```
//!
//! Untagged objects from older panels are read as schema 0 and migrated.

mod schema;

pub use schema::{PartialSnapshot, SNAPSHOT_SCHEMA, UiStateSnapshot};
