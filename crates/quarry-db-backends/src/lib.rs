//! # quarry-db-backends
//!
//! Executors that run quarry statements against real databases.
//!
//! Supported backends:
//! - `SQLite` (feature `sqlite`)

use std::sync::Arc;

use quarry_core::settings::DatabaseSettings;
use quarry_core::{QuarryError, QuarryResult};
use quarry_db::DbExecutor;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

/// Opens the executor named by `settings.engine`.
///
/// # Errors
///
/// `ConfigurationError` for an engine that is unknown or not compiled in,
/// `OperationalError` if the database cannot be opened.
pub fn connect(settings: &DatabaseSettings) -> QuarryResult<Arc<dyn DbExecutor>> {
    match settings.engine.as_str() {
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Arc::new(SqliteBackend::open(&settings.name)?)),
        other => Err(QuarryError::ConfigurationError(format!(
            "Unsupported database engine '{other}'"
        ))),
    }
}
