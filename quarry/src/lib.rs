//! # quarry
//!
//! An async, chainable query-set engine with relationship-aware joins.
//!
//! This is the meta-crate that re-exports the sub-crates for convenient
//! access. Depend on `quarry` for the whole engine, or on individual crates
//! for finer-grained control.
//!
//! ```rust,no_run
//! use quarry::prelude::*;
//!
//! # async fn example() -> QuarryResult<()> {
//! quarry::core::SETTINGS.configure(Settings::default());
//! let db = quarry::connect(&quarry::core::SETTINGS.get().database)?;
//! assert_eq!(db.backend_type(), DatabaseBackendType::SQLite);
//! # Ok(())
//! # }
//! ```

/// Errors, settings and logging.
pub use quarry_core as core;

/// Models, filters, the statement builder and `QuerySet`.
pub use quarry_db as db;

/// Database executors.
pub use quarry_db_backends as db_backends;

pub use quarry_db_backends::connect;

/// Test databases, fixtures and statement-count assertions.
#[cfg(feature = "testing")]
pub use quarry_test as test;

// Third-party re-exports
pub use async_trait;
pub use chrono;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
pub use tracing_subscriber;

/// The names most programs need.
pub mod prelude {
    pub use quarry_core::{QuarryError, QuarryResult, Settings, ValidationError};
    pub use quarry_db::{
        DatabaseBackendType, DbExecutor, FieldDef, FieldType, ForeignKeyOptions, Manager, Model,
        ModelMeta, OnDelete, QuerySet, Registry, RegistryBuilder, Row, Value, Q,
    };

    #[cfg(feature = "sqlite")]
    pub use quarry_db_backends::SqliteBackend;
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_connect_from_settings() {
        let settings = Settings::default();
        let db = crate::connect(&settings.database).unwrap();
        assert_eq!(db.backend_type(), DatabaseBackendType::SQLite);
    }

    #[test]
    fn test_prelude_filters_compose() {
        let q = Q::filter("name", "Ada") & !Q::filter("language", "fr");
        assert_eq!(q.paths(), vec!["name", "language"]);
    }
}
