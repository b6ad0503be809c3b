//! HTTP handlers for entity CRUD and export.

pub mod entity;
pub use entity::*;
