//! SQLite executor using `rusqlite`.
//!
//! The connection lives behind a `tokio::sync::Mutex` and every call runs in
//! `tokio::task::spawn_blocking`, so the async runtime is never blocked on
//! disk I/O.
//!
//! Features:
//! - WAL mode and foreign key enforcement enabled on open
//! - In-memory database support via `:memory:` path (great for testing)
//! - Batched statements run inside one transaction

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use quarry_core::{QuarryError, QuarryResult};
use quarry_db::{DatabaseBackendType, DbExecutor, Row, Value};
use rusqlite::types::ValueRef;
use tokio::sync::Mutex;
use tracing::debug;

/// A SQLite database executor.
pub struct SqliteBackend {
    path: PathBuf,
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Opens a SQLite database at the given path.
    ///
    /// If the path is `:memory:`, an in-memory database is created.
    ///
    /// # Errors
    ///
    /// Returns an `OperationalError` if the database cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> QuarryResult<Self> {
        let path = path.into();
        let conn = if path.to_str() == Some(":memory:") {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(&path)
        }
        .map_err(|e| QuarryError::OperationalError(format!("SQLite open failed: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| QuarryError::OperationalError(format!("Failed to set pragmas: {e}")))?;

        debug!(path = %path.display(), "opened sqlite database");
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database.
    pub fn memory() -> QuarryResult<Self> {
        Self::open(":memory:")
    }

    /// Returns the database file path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Binds values to a prepared statement, starting at parameter 1.
    fn bind_params(stmt: &mut rusqlite::Statement<'_>, params: &[Value]) -> QuarryResult<()> {
        for (i, param) in params.iter().enumerate() {
            let idx = i + 1;
            match param {
                Value::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null),
                Value::Bool(b) => stmt.raw_bind_parameter(idx, b),
                Value::Int(v) => stmt.raw_bind_parameter(idx, v),
                Value::Float(v) => stmt.raw_bind_parameter(idx, v),
                Value::String(s) => stmt.raw_bind_parameter(idx, s.as_str()),
                Value::Bytes(b) => stmt.raw_bind_parameter(idx, b.as_slice()),
                Value::Date(d) => stmt.raw_bind_parameter(idx, d.to_string()),
                Value::DateTime(dt) => stmt.raw_bind_parameter(idx, dt.to_string()),
                Value::Time(t) => stmt.raw_bind_parameter(idx, t.to_string()),
                Value::Uuid(u) => stmt.raw_bind_parameter(idx, u.to_string()),
                Value::Json(j) => stmt.raw_bind_parameter(idx, j.to_string()),
                Value::List(values) => {
                    let items: Vec<String> = values.iter().map(ToString::to_string).collect();
                    let json = serde_json::to_string(&items)
                        .map_err(|e| QuarryError::SerializationError(e.to_string()))?;
                    stmt.raw_bind_parameter(idx, json)
                }
            }
            .map_err(|e| QuarryError::DatabaseError(format!("Bind error: {e}")))?;
        }
        Ok(())
    }

    fn convert_row(sqlite_row: &rusqlite::Row<'_>, column_names: &[String]) -> QuarryResult<Row> {
        let values = (0..column_names.len())
            .map(|i| {
                let value = match sqlite_row.get_ref(i).map_err(map_error)? {
                    ValueRef::Null => Value::Null,
                    ValueRef::Integer(v) => Value::Int(v),
                    ValueRef::Real(v) => Value::Float(v),
                    ValueRef::Text(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
                    ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
                };
                Ok(value)
            })
            .collect::<QuarryResult<Vec<_>>>()?;
        Ok(Row::new(column_names.to_vec(), values))
    }

    /// Runs `work` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, work: F) -> QuarryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> QuarryResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            work(&mut conn)
        })
        .await
        .map_err(|e| QuarryError::DatabaseError(format!("Task join error: {e}")))?
    }
}

/// Maps constraint violations to `IntegrityError`, everything else to
/// `DatabaseError`.
fn map_error(err: rusqlite::Error) -> QuarryError {
    match err.sqlite_error_code() {
        Some(rusqlite::ErrorCode::ConstraintViolation) => QuarryError::IntegrityError(err.to_string()),
        _ => QuarryError::DatabaseError(err.to_string()),
    }
}

#[async_trait]
impl DbExecutor for SqliteBackend {
    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::SQLite
    }

    async fn execute_sql(&self, sql: &str, params: &[Value]) -> QuarryResult<u64> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql).map_err(map_error)?;
            Self::bind_params(&mut stmt, &params)?;
            let count = stmt.raw_execute().map_err(map_error)?;
            Ok(count as u64)
        })
        .await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> QuarryResult<Vec<Row>> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql).map_err(map_error)?;
            let column_names: Vec<String> =
                stmt.column_names().into_iter().map(String::from).collect();
            Self::bind_params(&mut stmt, &params)?;

            let mut raw_rows = stmt.raw_query();
            let mut rows = Vec::new();
            while let Some(row) = raw_rows.next().map_err(map_error)? {
                rows.push(Self::convert_row(row, &column_names)?);
            }
            Ok(rows)
        })
        .await
    }

    /// Prepares once and runs every row inside a single transaction; any
    /// failure rolls back the whole batch.
    async fn execute_many(&self, sql: &str, rows: &[Vec<Value>]) -> QuarryResult<u64> {
        let sql = sql.to_string();
        let rows = rows.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(map_error)?;
            let mut affected = 0;
            {
                let mut stmt = tx.prepare(&sql).map_err(map_error)?;
                for params in &rows {
                    Self::bind_params(&mut stmt, params)?;
                    affected += stmt.raw_execute().map_err(map_error)? as u64;
                }
            }
            tx.commit().map_err(map_error)?;
            Ok(affected)
        })
        .await
    }

    async fn insert_returning_id(&self, sql: &str, params: &[Value]) -> QuarryResult<Value> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql).map_err(map_error)?;
            Self::bind_params(&mut stmt, &params)?;
            stmt.raw_execute().map_err(map_error)?;
            Ok(Value::Int(conn.last_insert_rowid()))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_db::query::statement::{InsertStatement, SelectStatement, Statement};

    async fn users_table() -> SqliteBackend {
        let backend = SqliteBackend::memory().unwrap();
        backend
            .execute_sql(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE, age INTEGER)",
                &[],
            )
            .await
            .unwrap();
        backend
    }

    #[tokio::test]
    async fn test_memory_open() {
        let backend = SqliteBackend::memory().unwrap();
        assert_eq!(backend.backend_type(), DatabaseBackendType::SQLite);
        assert_eq!(backend.path().to_str(), Some(":memory:"));
    }

    #[tokio::test]
    async fn test_insert_and_query() {
        let backend = users_table().await;
        let id = backend
            .insert_returning_id(
                "INSERT INTO users (name, age) VALUES (?, ?)",
                &[Value::from("Alice"), Value::Int(30)],
            )
            .await
            .unwrap();
        assert_eq!(id, Value::Int(1));

        let rows = backend.query("SELECT id, name, age FROM users", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<String>("name").unwrap(), "Alice");
        assert_eq!(rows[0].get::<i64>("age").unwrap(), 30);
    }

    #[tokio::test]
    async fn test_null_and_blob_values() {
        let backend = SqliteBackend::memory().unwrap();
        backend
            .execute_sql("CREATE TABLE t (id INTEGER PRIMARY KEY, bio TEXT, data BLOB)", &[])
            .await
            .unwrap();
        let blob = vec![0xDE_u8, 0xAD, 0xBE, 0xEF];
        backend
            .execute_sql(
                "INSERT INTO t (bio, data) VALUES (?, ?)",
                &[Value::Null, Value::Bytes(blob.clone())],
            )
            .await
            .unwrap();
        let rows = backend.query("SELECT bio, data FROM t", &[]).await.unwrap();
        assert_eq!(rows[0].try_get::<String>("bio").unwrap(), None);
        assert_eq!(rows[0].get_value("data"), Some(&Value::Bytes(blob)));
    }

    #[tokio::test]
    async fn test_unique_violation_is_integrity_error() {
        let backend = users_table().await;
        let insert = "INSERT INTO users (name) VALUES (?)";
        backend.execute_sql(insert, &[Value::from("a")]).await.unwrap();
        let err = backend.execute_sql(insert, &[Value::from("a")]).await.unwrap_err();
        assert!(matches!(err, QuarryError::IntegrityError(_)));
    }

    #[tokio::test]
    async fn test_execute_many_is_atomic() {
        let backend = users_table().await;
        let insert = "INSERT INTO users (name) VALUES (?)";
        let affected = backend
            .execute_many(insert, &[vec![Value::from("a")], vec![Value::from("b")]])
            .await
            .unwrap();
        assert_eq!(affected, 2);

        let err = backend
            .execute_many(insert, &[vec![Value::from("c")], vec![Value::from("a")]])
            .await
            .unwrap_err();
        assert!(matches!(err, QuarryError::IntegrityError(_)));
        let rows = backend.query("SELECT name FROM users", &[]).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_statement_level_methods() {
        let backend = users_table().await;
        let insert = Statement::Insert(InsertStatement {
            table: "users".into(),
            columns: vec!["name".into()],
            rows: vec![vec![Value::from("a")], vec![Value::from("b")]],
        });
        assert_eq!(backend.execute(&insert).await.unwrap(), 2);

        let count = backend
            .fetch_scalar(&Statement::count(&SelectStatement::new("users")))
            .await
            .unwrap();
        assert_eq!(count, Value::Int(2));

        let exists = backend
            .fetch_scalar(&Statement::exists(&SelectStatement::new("users")))
            .await
            .unwrap();
        assert_eq!(exists, Value::Int(1));
    }
}
