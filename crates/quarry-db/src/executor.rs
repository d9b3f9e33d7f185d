//! Database execution interface.
//!
//! [`DbExecutor`] is the bridge between the query engine and concrete
//! backends (`quarry-db-backends`). Backends implement the raw SQL methods;
//! the statement-level methods (`fetch_all`, `fetch_one`, `fetch_scalar`,
//! `execute`, `execute_batch`, `insert`) are provided on top of them and
//! render each [`Statement`] with the backend's dialect before running it.
//!
//! Every terminal query-set call goes through exactly one of the
//! statement-level methods per statement; transaction scoping is left to
//! the backend.

use async_trait::async_trait;
use quarry_core::{QuarryError, QuarryResult};
use tracing::debug;

use crate::query::compiler::{DatabaseBackendType, SqlCompiler};
use crate::query::statement::Statement;
use crate::row::Row;
use crate::value::Value;

/// Minimal async database executor trait.
///
/// Query-set terminal operations accept `&dyn DbExecutor`, which backends
/// implement.
#[async_trait]
pub trait DbExecutor: Send + Sync {
    /// Returns the backend type for SQL compilation.
    fn backend_type(&self) -> DatabaseBackendType;

    /// Runs a SQL statement that does not return rows.
    /// Returns the number of rows affected.
    async fn execute_sql(&self, sql: &str, params: &[Value]) -> QuarryResult<u64>;

    /// Runs a SQL query and returns all result rows.
    async fn query(&self, sql: &str, params: &[Value]) -> QuarryResult<Vec<Row>>;

    /// Runs one statement once per parameter row and returns the total
    /// number of affected rows.
    ///
    /// The default runs the rows one by one; backends should override this
    /// to prepare once and run inside a transaction.
    async fn execute_many(&self, sql: &str, rows: &[Vec<Value>]) -> QuarryResult<u64> {
        let mut affected = 0;
        for params in rows {
            affected += self.execute_sql(sql, params).await?;
        }
        Ok(affected)
    }

    /// Executes an INSERT and returns the last inserted row ID.
    ///
    /// The default queries `last_insert_rowid()`; backends should override
    /// it with their own mechanism.
    async fn insert_returning_id(&self, sql: &str, params: &[Value]) -> QuarryResult<Value> {
        self.execute_sql(sql, params).await?;
        let rows = self.query("SELECT last_insert_rowid() AS id", &[]).await?;
        match rows.into_iter().next() {
            Some(row) => row.get::<Value>("id"),
            None => Err(QuarryError::DatabaseError(
                "Failed to retrieve last inserted ID".to_string(),
            )),
        }
    }

    /// Returns a compiler for this backend's dialect.
    fn compiler(&self) -> SqlCompiler {
        SqlCompiler::new(self.backend_type())
    }

    /// Renders `statement` and logs the result.
    fn render(&self, statement: &Statement) -> (String, Vec<Value>) {
        let (sql, params) = self.compiler().compile(statement);
        debug!(kind = statement.kind(), sql = %sql, params = params.len(), "executing statement");
        (sql, params)
    }

    /// Runs a row-returning statement.
    async fn fetch_all(&self, statement: &Statement) -> QuarryResult<Vec<Row>> {
        let (sql, params) = self.render(statement);
        self.query(&sql, &params).await
    }

    /// Runs a row-returning statement and keeps the first row.
    async fn fetch_one(&self, statement: &Statement) -> QuarryResult<Option<Row>> {
        Ok(self.fetch_all(statement).await?.into_iter().next())
    }

    /// Runs a statement returning a single value, such as a count.
    ///
    /// Returns `Value::Null` when the statement produced no row.
    async fn fetch_scalar(&self, statement: &Statement) -> QuarryResult<Value> {
        Ok(self
            .fetch_one(statement)
            .await?
            .and_then(|row| row.values().first().cloned())
            .unwrap_or(Value::Null))
    }

    /// Runs a statement that does not return rows.
    async fn execute(&self, statement: &Statement) -> QuarryResult<u64> {
        let (sql, params) = self.render(statement);
        self.execute_sql(&sql, &params).await
    }

    /// Runs a keyed batch statement once per parameter row.
    async fn execute_batch(&self, statement: &Statement, rows: &[Vec<Value>]) -> QuarryResult<u64> {
        let (sql, _) = self.render(statement);
        debug!(rows = rows.len(), "executing batch");
        self.execute_many(&sql, rows).await
    }

    /// Runs an INSERT and returns the backend-assigned key.
    async fn insert(&self, statement: &Statement) -> QuarryResult<Value> {
        let (sql, params) = self.render(statement);
        self.insert_returning_id(&sql, &params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::statement::{BatchUpdateStatement, SelectStatement};
    use crate::testing::RecordingExecutor;

    #[allow(dead_code)]
    fn _assert_object_safe(_: &dyn DbExecutor) {}

    #[tokio::test]
    async fn test_fetch_scalar_first_cell() {
        let db = RecordingExecutor::new();
        db.push(vec![Row::from_pairs([("count", Value::Int(3))])]);
        let count = db
            .fetch_scalar(&Statement::count(&SelectStatement::new("users")))
            .await
            .unwrap();
        assert_eq!(count, Value::Int(3));
        assert_eq!(
            db.statements(),
            vec!["SELECT COUNT(*) FROM (SELECT * FROM \"users\") AS \"subquery\""]
        );
    }

    #[tokio::test]
    async fn test_fetch_scalar_without_rows() {
        let db = RecordingExecutor::new();
        let value = db
            .fetch_scalar(&Statement::Select(SelectStatement::new("users")))
            .await
            .unwrap();
        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn test_fetch_one_keeps_first() {
        let db = RecordingExecutor::new();
        db.push(vec![
            Row::from_pairs([("id", Value::Int(1))]),
            Row::from_pairs([("id", Value::Int(2))]),
        ]);
        let row = db
            .fetch_one(&Statement::Select(SelectStatement::new("users")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get::<i64>("id").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_execute_batch_runs_each_row() {
        let db = RecordingExecutor::new();
        let statement = Statement::BatchUpdate(BatchUpdateStatement {
            table: "users".into(),
            columns: vec!["name".into()],
            key: "id".into(),
        });
        let rows = vec![
            vec![Value::from("a"), Value::Int(1)],
            vec![Value::from("b"), Value::Int(2)],
        ];
        let affected = db.execute_batch(&statement, &rows).await.unwrap();
        assert_eq!(affected, 2);
        assert_eq!(db.statements().len(), 2);
        assert_eq!(db.params(1), rows[1]);
    }

    #[tokio::test]
    async fn test_insert_returns_key() {
        let db = RecordingExecutor::new();
        let statement = Statement::Insert(crate::query::statement::InsertStatement {
            table: "users".into(),
            columns: vec!["name".into()],
            rows: vec![vec![Value::from("Ada")]],
        });
        assert_eq!(db.insert(&statement).await.unwrap(), Value::Int(1));
    }
}
