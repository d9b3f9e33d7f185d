//! Backend-neutral statements.
//!
//! The query set assembles one [`Statement`] per terminal call. Statements
//! carry resolved columns, joins and predicates but no SQL text; the
//! [`SqlCompiler`](super::compiler::SqlCompiler) renders them per backend,
//! and [`Display`](std::fmt::Display) gives a SQLite rendering with inline
//! parameters for logs and diagnostics.

use std::fmt;

use crate::value::Value;

use super::clause::{ColumnRef, WhereNode};
use super::compiler::{DatabaseBackendType, SqlCompiler};
use super::resolver::Join;

/// A sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// The sorted column.
    pub column: ColumnRef,
    /// Whether to sort in descending order.
    pub descending: bool,
}

impl OrderBy {
    /// Splits a sort key into its field path and direction.
    ///
    /// A leading `-` means descending.
    ///
    /// ```
    /// use quarry_db::query::statement::OrderBy;
    ///
    /// assert_eq!(OrderBy::parse("-id"), ("id", true));
    /// assert_eq!(OrderBy::parse("name"), ("name", false));
    /// ```
    pub fn parse(key: &str) -> (&str, bool) {
        key.strip_prefix('-').map_or((key, false), |rest| (rest, true))
    }

    /// Returns the same key in the opposite direction.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            column: self.column.clone(),
            descending: !self.descending,
        }
    }
}

/// A selected column and the name it carries in the result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectColumn {
    /// The source column.
    pub column: ColumnRef,
    /// Result name for joined columns, `<path>__<column>`.
    pub alias: Option<String>,
}

impl SelectColumn {
    /// Selects `column`, aliasing it when it comes from a join.
    pub fn new(column: ColumnRef) -> Self {
        let alias = column.alias.is_some().then(|| column.result_name());
        Self { column, alias }
    }
}

/// Row de-duplication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Distinct {
    /// No de-duplication.
    #[default]
    None,
    /// `SELECT DISTINCT`.
    All,
    /// One row per distinct value of the listed columns.
    On(Vec<ColumnRef>),
}

/// A SELECT over the root table and its joins.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    /// The root table.
    pub table: String,
    /// Selected columns.
    pub columns: Vec<SelectColumn>,
    /// Joins in traversal order.
    pub joins: Vec<Join>,
    /// Filter conjunction.
    pub where_clause: Option<WhereNode>,
    /// Sort keys.
    pub order_by: Vec<OrderBy>,
    /// Grouping keys.
    pub group_by: Vec<ColumnRef>,
    /// De-duplication.
    pub distinct: Distinct,
    /// Maximum number of rows.
    pub limit: Option<usize>,
    /// Rows to skip.
    pub offset: Option<usize>,
}

impl SelectStatement {
    /// Creates an unfiltered SELECT of nothing from `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            joins: Vec::new(),
            where_clause: None,
            order_by: Vec::new(),
            group_by: Vec::new(),
            distinct: Distinct::None,
            limit: None,
            offset: None,
        }
    }

    /// Drops ordering, limit and offset, keeping the matched row set.
    #[must_use]
    pub fn unordered(&self) -> Self {
        Self {
            order_by: Vec::new(),
            limit: None,
            offset: None,
            ..self.clone()
        }
    }

    /// Narrows the filter to rows whose `pk_column` is selected by this
    /// statement, so writes can follow joined predicates.
    ///
    /// Without joins the filter is reused as is.
    pub fn write_scope(&self, pk_column: &str) -> Option<WhereNode> {
        if self.joins.is_empty() {
            return self.where_clause.clone();
        }
        let mut inner = self.unordered();
        inner.columns = vec![SelectColumn::new(ColumnRef::root(pk_column))];
        inner.distinct = Distinct::None;
        inner.group_by.clear();
        Some(WhereNode::InSubquery {
            column: ColumnRef::root(pk_column),
            query: Box::new(inner),
        })
    }
}

/// A multi-row INSERT.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    /// The target table.
    pub table: String,
    /// Inserted columns, shared by every row.
    pub columns: Vec<String>,
    /// One value list per row, aligned with `columns`.
    pub rows: Vec<Vec<Value>>,
}

/// An UPDATE of every row matching a filter.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    /// The target table.
    pub table: String,
    /// `column = value` pairs.
    pub assignments: Vec<(String, Value)>,
    /// Filter over root columns.
    pub where_clause: Option<WhereNode>,
}

/// A DELETE of every row matching a filter.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    /// The target table.
    pub table: String,
    /// Filter over root columns.
    pub where_clause: Option<WhereNode>,
}

/// A parameterized UPDATE keyed by one column, run once per row.
///
/// Each parameter row holds the `columns` values followed by the key value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchUpdateStatement {
    /// The target table.
    pub table: String,
    /// Updated columns.
    pub columns: Vec<String>,
    /// The key column, normally the primary key.
    pub key: String,
}

/// Every statement the engine emits.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Fetch rows.
    Select(SelectStatement),
    /// Insert rows.
    Insert(InsertStatement),
    /// Update matching rows.
    Update(UpdateStatement),
    /// Delete matching rows.
    Delete(DeleteStatement),
    /// Count the rows of the wrapped select.
    Count(SelectStatement),
    /// Test whether the wrapped select matches anything.
    Exists(SelectStatement),
    /// Keyed update run against many parameter rows.
    BatchUpdate(BatchUpdateStatement),
}

impl Statement {
    /// Wraps `select` in a row count.
    pub fn count(select: &SelectStatement) -> Self {
        Self::Count(select.unordered())
    }

    /// Wraps `select` in an existence check.
    pub fn exists(select: &SelectStatement) -> Self {
        let mut inner = select.unordered();
        inner.limit = Some(1);
        Self::Exists(inner)
    }

    /// Returns a short name for the statement kind, used as a log field.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Select(_) => "select",
            Self::Insert(_) => "insert",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
            Self::Count(_) => "count",
            Self::Exists(_) => "exists",
            Self::BatchUpdate(_) => "batch_update",
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (sql, params) = SqlCompiler::new(DatabaseBackendType::SQLite).compile(self);
        f.write_str(&sql)?;
        if !params.is_empty() {
            let literals: Vec<String> = params.iter().map(Value::sql_literal).collect();
            write!(f, " -- [{}]", literals.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::clause::Predicate;
    use crate::query::lookups::Lookup;
    use crate::query::resolver::JoinKind;

    fn joined_select() -> SelectStatement {
        let mut select = SelectStatement::new("permissions");
        select.columns = vec![SelectColumn::new(ColumnRef::root("id"))];
        select.joins = vec![Join {
            alias: "designation".into(),
            table: "designations".into(),
            kind: JoinKind::Inner,
            parent_alias: None,
            parent_column: "designation_id".into(),
            column: "id".into(),
            model: "Designation",
        }];
        select.where_clause = Some(WhereNode::Predicate(Predicate {
            column: ColumnRef::joined("designation", "title"),
            lookup: Lookup::Exact(Value::from("Admin")),
            escape: None,
        }));
        select.order_by = vec![OrderBy {
            column: ColumnRef::root("id"),
            descending: true,
        }];
        select.limit = Some(5);
        select
    }

    #[test]
    fn test_parse_order_key() {
        assert_eq!(OrderBy::parse("-created"), ("created", true));
        assert_eq!(OrderBy::parse("created"), ("created", false));
    }

    #[test]
    fn test_select_column_alias() {
        assert_eq!(SelectColumn::new(ColumnRef::root("id")).alias, None);
        assert_eq!(
            SelectColumn::new(ColumnRef::joined("designation__user", "name")).alias,
            Some("designation__user__name".to_string())
        );
    }

    #[test]
    fn test_count_strips_ordering_and_limit() {
        let Statement::Count(inner) = Statement::count(&joined_select()) else {
            panic!("expected count");
        };
        assert!(inner.order_by.is_empty());
        assert_eq!(inner.limit, None);
        assert_eq!(inner.joins.len(), 1);
    }

    #[test]
    fn test_exists_limits_to_one() {
        let Statement::Exists(inner) = Statement::exists(&joined_select()) else {
            panic!("expected exists");
        };
        assert_eq!(inner.limit, Some(1));
    }

    #[test]
    fn test_write_scope_without_joins_reuses_filter() {
        let mut select = joined_select();
        select.joins.clear();
        assert_eq!(select.write_scope("id"), select.where_clause);
    }

    #[test]
    fn test_write_scope_with_joins_uses_subquery() {
        let scope = joined_select().write_scope("id").unwrap();
        match scope {
            WhereNode::InSubquery { column, query } => {
                assert_eq!(column, ColumnRef::root("id"));
                assert_eq!(query.columns.len(), 1);
                assert_eq!(query.limit, None);
                assert_eq!(query.joins.len(), 1);
            }
            other => panic!("unexpected scope: {other:?}"),
        }
    }

    #[test]
    fn test_display_inlines_parameters() {
        let text = Statement::Select(joined_select()).to_string();
        assert!(text.starts_with("SELECT \"permissions\".\"id\" FROM \"permissions\""));
        assert!(text.ends_with(" -- ['Admin']"));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(Statement::count(&joined_select()).kind(), "count");
        let batch = Statement::BatchUpdate(BatchUpdateStatement {
            table: "users".into(),
            columns: vec!["name".into()],
            key: "id".into(),
        });
        assert_eq!(batch.kind(), "batch_update");
    }
}
