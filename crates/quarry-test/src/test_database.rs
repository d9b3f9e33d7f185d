//! Test database utilities.
//!
//! Provides [`TestDatabase`], an in-memory SQLite database for tests. It
//! implements [`DbExecutor`] so query sets run against it directly, counts
//! every statement it executes, and creates tables from model metadata.
//!
//! ## Example
//!
//! ```rust,no_run
//! use quarry_test::fixtures::{self, User};
//! use quarry_test::TestDatabase;
//!
//! async fn example() {
//!     let db = TestDatabase::new();
//!     db.setup_table(User::meta()).await.unwrap();
//! }
//! # use quarry_db::Model;
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use quarry_core::QuarryResult;
use quarry_db::model::ModelMeta;
use quarry_db::{DatabaseBackendType, DbExecutor, Registry, Row, Value};
use quarry_db_backends::sqlite::SqliteBackend;

/// An in-memory SQLite database for testing.
///
/// Clones share the same connection and the same statement counter. Each
/// `TestDatabase::new()` call starts from an empty database.
#[derive(Debug, Clone)]
pub struct TestDatabase {
    backend: Arc<SqliteBackend>,
    query_count: Arc<AtomicUsize>,
}

impl TestDatabase {
    /// Creates a new in-memory SQLite test database.
    ///
    /// # Panics
    ///
    /// Panics if the in-memory database cannot be created.
    pub fn new() -> Self {
        let backend = SqliteBackend::memory().expect("Failed to create in-memory SQLite database");
        Self {
            backend: Arc::new(backend),
            query_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates a table from the given [`ModelMeta`], without foreign key
    /// constraints.
    pub async fn setup_table(&self, meta: &ModelMeta) -> QuarryResult<()> {
        let sql = Self::create_table_sql(meta, None)?;
        self.execute_raw(&sql).await?;
        Ok(())
    }

    /// Creates tables for `metas` in order, with `REFERENCES` clauses
    /// resolved through `registry`.
    ///
    /// Referenced tables must come earlier in `metas`.
    pub async fn setup_tables(&self, registry: &Registry, metas: &[&ModelMeta]) -> QuarryResult<()> {
        for meta in metas {
            let sql = Self::create_table_sql(meta, Some(registry))?;
            self.execute_raw(&sql).await?;
            tracing::debug!(table = %meta.db_table, "created test table");
        }
        Ok(())
    }

    /// Drops all user-created tables in the database.
    pub async fn teardown(&self) -> QuarryResult<()> {
        let rows = self
            .backend
            .query(
                "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
                &[],
            )
            .await?;

        self.backend.execute_sql("PRAGMA foreign_keys=OFF", &[]).await?;
        for row in &rows {
            let table_name: String = row.get("name")?;
            self.backend
                .execute_sql(&format!("DROP TABLE IF EXISTS \"{table_name}\""), &[])
                .await?;
        }
        self.backend.execute_sql("PRAGMA foreign_keys=ON", &[]).await?;
        Ok(())
    }

    /// Executes a raw SQL string with no parameters.
    pub async fn execute_raw(&self, sql: &str) -> QuarryResult<u64> {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        self.backend.execute_sql(sql, &[]).await
    }

    /// Returns the number of statements executed so far.
    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::Relaxed)
    }

    /// Resets the statement counter to zero.
    pub fn reset_query_count(&self) {
        self.query_count.store(0, Ordering::Relaxed);
    }

    /// Returns the inner `SqliteBackend`.
    pub fn backend(&self) -> &SqliteBackend {
        &self.backend
    }

    /// Generates a `CREATE TABLE IF NOT EXISTS` statement from model metadata.
    fn create_table_sql(meta: &ModelMeta, registry: Option<&Registry>) -> QuarryResult<String> {
        let mut col_defs: Vec<String> = Vec::new();

        for field in &meta.fields {
            let mut parts = vec![format!(
                "\"{}\" {}",
                field.column,
                field.field_kind().sqlite_column_type()
            )];

            if field.primary_key {
                parts.push("PRIMARY KEY".to_string());
                if field.is_auto() {
                    parts.push("AUTOINCREMENT".to_string());
                }
            } else if !field.null {
                parts.push("NOT NULL".to_string());
            }

            if field.unique && !field.primary_key {
                parts.push("UNIQUE".to_string());
            }

            if let (Some(registry), Some(target)) = (registry, field.target_model()) {
                let table = registry.table_for(target)?;
                parts.push(format!("REFERENCES \"{}\" (\"{}\")", table.name, table.primary_key));
                if let Some(action) = field.cascade_on_delete() {
                    parts.push(format!("ON DELETE {}", action.sql_keyword()));
                }
                if let Some(action) = field.cascade_on_update() {
                    parts.push(format!("ON UPDATE {}", action.sql_keyword()));
                }
            }

            col_defs.push(parts.join(" "));
        }

        Ok(format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
            meta.db_table,
            col_defs.join(", ")
        ))
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DbExecutor for TestDatabase {
    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::SQLite
    }

    async fn execute_sql(&self, sql: &str, params: &[Value]) -> QuarryResult<u64> {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        self.backend.execute_sql(sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> QuarryResult<Vec<Row>> {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        self.backend.query(sql, params).await
    }

    /// Counts as one statement: the batch is a single round trip.
    async fn execute_many(&self, sql: &str, rows: &[Vec<Value>]) -> QuarryResult<u64> {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        self.backend.execute_many(sql, rows).await
    }

    async fn insert_returning_id(&self, sql: &str, params: &[Value]) -> QuarryResult<Value> {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        self.backend.insert_returning_id(sql, params).await
    }
}
