//! Infrastructure adapters for external systems.

pub mod actions;
pub mod sqlite;
