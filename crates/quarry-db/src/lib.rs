//! # quarry-db
//!
//! The query-set engine. Models describe themselves through the
//! [`Model`](model::Model) trait, a [`Registry`](registry::Registry) indexes
//! their relationships, and a [`QuerySet`](query::QuerySet) accumulates
//! filters, joins and ordering through method chaining without touching the
//! database.
//!
//! ## Architecture
//!
//! Nothing is resolved at chain time. When a terminal method (`.get()`,
//! `.count()`, `.first()`, ...) runs, the query set resolves every field path
//! against the registry, compiles its filters into a predicate tree, builds a
//! backend-neutral [`Statement`](query::Statement), and hands it to a
//! [`DbExecutor`](executor::DbExecutor), which renders it with the
//! [`SqlCompiler`](query::SqlCompiler) for its dialect.
//!
//! ## Module Overview
//!
//! - [`model`] - The [`Model`](model::Model) trait and [`ModelMeta`](model::ModelMeta)
//! - [`fields`] - Field definitions ([`FieldDef`](fields::FieldDef)) and cleaning
//! - [`registry`] - Model lookup and relationship classification
//! - [`value`] / [`row`] - Backend-agnostic values and result rows
//! - [`query`] - Lookups, resolution, clause compilation and SQL rendering
//! - [`executor`] - The async executor trait backends implement
//! - [`validators`] - Field validators

// - struct_excessive_bools: FieldDef carries one flag per field option
// - too_many_lines: the SQL compiler match arms are long
// - cast_precision_loss: i64-to-f64 casts are acceptable for validator comparisons
// - result_large_err: QuarryError is the single error type across the crates
// - format_push_string: format! with push_str reads better than write! for SQL
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::result_large_err)]
#![allow(clippy::format_push_string)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::match_same_arms)]
// significant_drop_tightening: false positives with async Mutex guards
#![allow(clippy::significant_drop_tightening)]

pub mod executor;
pub mod fields;
pub mod model;
pub mod query;
pub mod registry;
pub mod row;
pub mod validators;
pub mod value;

#[cfg(test)]
mod testing;

// Re-export the most commonly used types at the crate root.
pub use executor::DbExecutor;
pub use fields::{FieldDef, FieldType, ForeignKeyOptions, OnDelete};
pub use model::{Model, ModelMeta, PivotMeta};
pub use query::{DatabaseBackendType, Lookup, LookupKind, Manager, QuerySet, SqlCompiler, Statement, Q};
pub use registry::{Registry, RegistryBuilder, Relation, Table};
pub use row::{FromValue, Row};
pub use validators::Validator;
pub use value::Value;
