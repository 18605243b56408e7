//! Database module: the sheet-like tables and the key/value store.
//!
//! - `model`: row views returned by repositories that have no domain twin.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! Callers import from `class_roster::db`; the repository API is re-exported.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{InvitationCounts, TriggerRow};
