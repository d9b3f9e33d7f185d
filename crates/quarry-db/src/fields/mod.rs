//! Field descriptors.
//!
//! [`FieldDef`] describes one model column: its [`FieldType`], nullability,
//! bounds and, for relationships, the target model, referential actions and
//! reverse name.

pub mod types;

pub use types::{FieldDef, FieldType, ForeignKeyOptions, OnDelete};
