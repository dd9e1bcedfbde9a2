//! Configuration module for ferrite-sync
//!
//! This module holds the tunable sync scrolling settings, including
//! serialization to/from JSON and persistent storage in a
//! platform-specific directory.

mod persistence;
mod settings;

pub use persistence::*;
pub use settings::*;
