//! Statement-count assertions.
//!
//! [`assert_num_queries`] and [`assert_max_queries`] run an async block
//! against a [`TestDatabase`] and check how many statements it issued,
//! which catches N+1 patterns and confirms that eager joins, caching and
//! batching actually save round trips. Both hand back the block's output so
//! the result can be inspected afterwards.
//!
//! ## Example
//!
//! ```rust,no_run
//! use quarry_db::{Manager, Q};
//! use quarry_test::fixtures::{self, Permission};
//! use quarry_test::{assert_num_queries, TestDatabase};
//!
//! async fn example(db: &TestDatabase) {
//!     let permissions = Manager::<Permission>::new(fixtures::registry());
//!     let rows = assert_num_queries(db, 1, || async {
//!         permissions.all().select_related(&["designation__user"]).all(db).await.unwrap()
//!     })
//!     .await;
//!     assert!(rows.iter().all(|p| p.designation.is_some()));
//! }
//! ```

use std::future::Future;

use crate::test_database::TestDatabase;

/// Asserts that exactly `expected_count` statements run during `f`.
///
/// # Panics
///
/// Panics if the number of statements does not match `expected_count`.
pub async fn assert_num_queries<T, F, Fut>(db: &TestDatabase, expected_count: usize, f: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    db.reset_query_count();
    let output = f().await;
    let actual = db.query_count();
    assert_eq!(
        actual, expected_count,
        "Expected {expected_count} SQL queries, but {actual} were executed"
    );
    output
}

/// Asserts that at most `max_count` statements run during `f`.
///
/// # Panics
///
/// Panics if more than `max_count` statements run.
pub async fn assert_max_queries<T, F, Fut>(db: &TestDatabase, max_count: usize, f: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    db.reset_query_count();
    let output = f().await;
    let actual = db.query_count();
    assert!(
        actual <= max_count,
        "Expected at most {max_count} SQL queries, but {actual} were executed"
    );
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, User};
    use quarry_db::{Manager, Q, Value};

    async fn seeded() -> (TestDatabase, Manager<User>) {
        let db = TestDatabase::new();
        fixtures::setup(&db).await.unwrap();
        let users = Manager::<User>::new(fixtures::registry());
        users
            .all()
            .create(&db, &[("name", Value::from("Ada")), ("language", Value::from("en"))])
            .await
            .unwrap();
        (db, users)
    }

    #[tokio::test]
    async fn test_returns_block_output() {
        let (db, users) = seeded().await;
        let count = assert_num_queries(&db, 1, || async { users.all().count(&db).await.unwrap() }).await;
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_zero_queries() {
        let db = TestDatabase::new();
        assert_num_queries(&db, 0, || async {}).await;
    }

    #[tokio::test]
    async fn test_cached_rows_cost_nothing() {
        let (db, users) = seeded().await;
        let qs = users.filter(Q::filter("language", "en"));
        assert_num_queries(&db, 1, || async {
            qs.all(&db).await.unwrap();
            qs.all(&db).await.unwrap();
        })
        .await;
    }

    #[tokio::test]
    #[should_panic(expected = "Expected 1 SQL queries, but 2 were executed")]
    async fn test_too_many_queries() {
        let (db, users) = seeded().await;
        assert_num_queries(&db, 1, || async {
            users.all().count(&db).await.unwrap();
            users.all().exists(&db).await.unwrap();
        })
        .await;
    }

    #[tokio::test]
    async fn test_max_queries_passes() {
        let (db, users) = seeded().await;
        assert_max_queries(&db, 3, || async {
            users.all().first(&db).await.unwrap();
        })
        .await;
    }

    #[tokio::test]
    #[should_panic(expected = "Expected at most 1 SQL queries, but 2 were executed")]
    async fn test_max_queries_fails() {
        let (db, users) = seeded().await;
        assert_max_queries(&db, 1, || async {
            users.all().first(&db).await.unwrap();
            users.all().last(&db).await.unwrap();
        })
        .await;
    }
}
