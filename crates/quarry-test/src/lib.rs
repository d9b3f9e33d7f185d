//! # quarry-test
//!
//! Test support for quarry: an in-memory SQLite [`TestDatabase`] that
//! counts statements, table setup from model metadata, query-count
//! assertions, and a small set of [`fixtures`] models covering forward,
//! reverse, ambiguous and many-to-many relationships.

pub mod assert_queries;
pub mod fixtures;
pub mod test_database;

pub use assert_queries::{assert_max_queries, assert_num_queries};
pub use test_database::TestDatabase;

/// Installs a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; output goes through the test harness capture.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
