//! SQL rendering.
//!
//! [`SqlCompiler`] translates a [`Statement`] into a parameterized SQL string
//! and its bound values. PostgreSQL gets `$1, $2, ...` placeholders, `ILIKE`
//! and `DISTINCT ON`; SQLite and MySQL get `?` placeholders, `LOWER(..)`
//! comparisons, and a `GROUP BY` in place of `DISTINCT ON`. Placeholders
//! are numbered across subqueries, so one parameter list serves the whole
//! statement.

use super::clause::{ColumnRef, Predicate, WhereNode};
use super::lookups::Lookup;
use super::statement::{
    BatchUpdateStatement, DeleteStatement, Distinct, InsertStatement, SelectStatement, Statement,
    UpdateStatement,
};
use crate::value::Value;

/// The type of database backend, used by the compiler to generate
/// backend-specific SQL syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackendType {
    /// PostgreSQL (uses `$1, $2, ...` placeholders).
    PostgreSQL,
    /// SQLite (uses `?` placeholders).
    SQLite,
    /// MySQL (uses `?` placeholders).
    MySQL,
}

/// Compiles statements to SQL for one backend.
#[derive(Debug, Clone, Copy)]
pub struct SqlCompiler {
    backend: DatabaseBackendType,
}

impl SqlCompiler {
    /// Creates a new compiler for the given backend type.
    pub const fn new(backend: DatabaseBackendType) -> Self {
        Self { backend }
    }

    /// Returns the backend this compiler targets.
    pub const fn backend(&self) -> DatabaseBackendType {
        self.backend
    }

    /// Returns a parameter placeholder for the given 1-based index.
    fn placeholder(&self, index: usize) -> String {
        match self.backend {
            DatabaseBackendType::PostgreSQL => format!("${index}"),
            DatabaseBackendType::SQLite | DatabaseBackendType::MySQL => "?".to_string(),
        }
    }

    fn bind(&self, value: Value, params: &mut Vec<Value>) -> String {
        params.push(value);
        self.placeholder(params.len())
    }

    /// Compiles any statement into SQL and parameters.
    ///
    /// A [`Statement::BatchUpdate`] yields no parameters; its rows are bound
    /// by the executor.
    pub fn compile(&self, statement: &Statement) -> (String, Vec<Value>) {
        match statement {
            Statement::Select(select) => self.compile_select(select),
            Statement::Insert(insert) => self.compile_insert(insert),
            Statement::Update(update) => self.compile_update(update),
            Statement::Delete(delete) => self.compile_delete(delete),
            Statement::Count(select) => {
                let mut params = Vec::new();
                let mut sql = String::from("SELECT COUNT(*) FROM (");
                self.write_select(select, &mut sql, &mut params);
                sql.push_str(") AS \"subquery\"");
                (sql, params)
            }
            Statement::Exists(select) => {
                let mut params = Vec::new();
                let mut sql = String::from("SELECT EXISTS(");
                self.write_select(select, &mut sql, &mut params);
                sql.push(')');
                (sql, params)
            }
            Statement::BatchUpdate(batch) => (self.compile_batch_update(batch), Vec::new()),
        }
    }

    /// Compiles a SELECT statement.
    pub fn compile_select(&self, select: &SelectStatement) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let mut sql = String::new();
        self.write_select(select, &mut sql, &mut params);
        (sql, params)
    }

    fn write_select(&self, select: &SelectStatement, sql: &mut String, params: &mut Vec<Value>) {
        let root = Some(select.table.as_str());
        sql.push_str("SELECT ");

        let mut group_by: Vec<&ColumnRef> = select.group_by.iter().collect();
        match &select.distinct {
            Distinct::None => {}
            Distinct::All => sql.push_str("DISTINCT "),
            Distinct::On(columns) if self.backend == DatabaseBackendType::PostgreSQL => {
                let cols: Vec<String> = columns.iter().map(|c| self.column(c, root)).collect();
                sql.push_str(&format!("DISTINCT ON ({}) ", cols.join(", ")));
            }
            Distinct::On(columns) => {
                for column in columns {
                    if !group_by.contains(&column) {
                        group_by.push(column);
                    }
                }
            }
        }

        // SELECT columns
        if select.columns.is_empty() {
            sql.push('*');
        } else {
            let parts: Vec<String> = select
                .columns
                .iter()
                .map(|c| {
                    let col = self.column(&c.column, root);
                    match &c.alias {
                        Some(alias) => format!("{col} AS \"{alias}\""),
                        None => col,
                    }
                })
                .collect();
            sql.push_str(&parts.join(", "));
        }

        // FROM
        sql.push_str(&format!(" FROM \"{}\"", select.table));

        // JOINs
        for join in &select.joins {
            let parent = join.parent_alias.as_deref().unwrap_or(&select.table);
            sql.push_str(&format!(
                " {} \"{}\" AS \"{}\" ON \"{}\".\"{}\" = \"{parent}\".\"{}\"",
                join.kind.sql_keyword(),
                join.table,
                join.alias,
                join.alias,
                join.column,
                join.parent_column,
            ));
        }

        // WHERE
        if let Some(where_clause) = &select.where_clause {
            sql.push_str(" WHERE ");
            self.compile_where_node(where_clause, root, sql, params);
        }

        // GROUP BY
        if !group_by.is_empty() {
            let cols: Vec<String> = group_by.iter().map(|c| self.column(c, root)).collect();
            sql.push_str(&format!(" GROUP BY {}", cols.join(", ")));
        }

        // ORDER BY
        if !select.order_by.is_empty() {
            let orders: Vec<String> = select
                .order_by
                .iter()
                .map(|o| {
                    let dir = if o.descending { " DESC" } else { " ASC" };
                    format!("{}{dir}", self.column(&o.column, root))
                })
                .collect();
            sql.push_str(&format!(" ORDER BY {}", orders.join(", ")));
        }

        // LIMIT / OFFSET
        match (select.limit, select.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            // SQLite and MySQL only accept OFFSET after a LIMIT.
            (None, Some(offset)) => match self.backend {
                DatabaseBackendType::PostgreSQL => sql.push_str(&format!(" OFFSET {offset}")),
                DatabaseBackendType::SQLite => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
                DatabaseBackendType::MySQL => {
                    sql.push_str(&format!(" LIMIT 18446744073709551615 OFFSET {offset}"));
                }
            },
            (None, None) => {}
        }
    }

    /// Compiles a (possibly multi-row) INSERT statement.
    pub fn compile_insert(&self, insert: &InsertStatement) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        if insert.columns.is_empty() {
            return (format!("INSERT INTO \"{}\" DEFAULT VALUES", insert.table), params);
        }
        let columns: Vec<String> = insert.columns.iter().map(|c| format!("\"{c}\"")).collect();
        let rows: Vec<String> = insert
            .rows
            .iter()
            .map(|row| {
                let placeholders: Vec<String> =
                    row.iter().map(|v| self.bind(v.clone(), &mut params)).collect();
                format!("({})", placeholders.join(", "))
            })
            .collect();
        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES {}",
            insert.table,
            columns.join(", "),
            rows.join(", ")
        );
        (sql, params)
    }

    /// Compiles an UPDATE statement.
    pub fn compile_update(&self, update: &UpdateStatement) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sets: Vec<String> = update
            .assignments
            .iter()
            .map(|(column, value)| format!("\"{column}\" = {}", self.bind(value.clone(), &mut params)))
            .collect();
        let mut sql = format!("UPDATE \"{}\" SET {}", update.table, sets.join(", "));
        if let Some(where_clause) = &update.where_clause {
            sql.push_str(" WHERE ");
            self.compile_where_node(where_clause, None, &mut sql, &mut params);
        }
        (sql, params)
    }

    /// Compiles a DELETE statement.
    pub fn compile_delete(&self, delete: &DeleteStatement) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let mut sql = format!("DELETE FROM \"{}\"", delete.table);
        if let Some(where_clause) = &delete.where_clause {
            sql.push_str(" WHERE ");
            self.compile_where_node(where_clause, None, &mut sql, &mut params);
        }
        (sql, params)
    }

    /// Compiles a keyed batch UPDATE; the key placeholder comes last.
    pub fn compile_batch_update(&self, batch: &BatchUpdateStatement) -> String {
        let sets: Vec<String> = batch
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("\"{c}\" = {}", self.placeholder(i + 1)))
            .collect();
        format!(
            "UPDATE \"{}\" SET {} WHERE \"{}\" = {}",
            batch.table,
            sets.join(", "),
            batch.key,
            self.placeholder(batch.columns.len() + 1)
        )
    }

    /// Renders a column; root columns are qualified with `root` when given.
    fn column(&self, column: &ColumnRef, root: Option<&str>) -> String {
        match (&column.alias, root) {
            (Some(alias), _) => format!("\"{alias}\".\"{}\"", column.column),
            (None, Some(table)) => format!("\"{table}\".\"{}\"", column.column),
            (None, None) => format!("\"{}\"", column.column),
        }
    }

    fn compile_where_node(
        &self,
        node: &WhereNode,
        root: Option<&str>,
        sql: &mut String,
        params: &mut Vec<Value>,
    ) {
        match node {
            WhereNode::Predicate(predicate) => {
                self.compile_predicate(predicate, root, sql, params);
            }
            WhereNode::And(children) => {
                if children.is_empty() {
                    sql.push_str("1=1");
                    return;
                }
                sql.push('(');
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(" AND ");
                    }
                    self.compile_where_node(child, root, sql, params);
                }
                sql.push(')');
            }
            WhereNode::Or(children) => {
                if children.is_empty() {
                    sql.push_str("1=0");
                    return;
                }
                sql.push('(');
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(" OR ");
                    }
                    self.compile_where_node(child, root, sql, params);
                }
                sql.push(')');
            }
            WhereNode::Not(inner) => {
                sql.push_str("NOT (");
                self.compile_where_node(inner, root, sql, params);
                sql.push(')');
            }
            WhereNode::InSubquery { column, query } => {
                sql.push_str(&format!("{} IN (", self.column(column, root)));
                self.write_select(query, sql, params);
                sql.push(')');
            }
        }
    }

    /// Compiles a single predicate into SQL.
    fn compile_predicate(
        &self,
        predicate: &Predicate,
        root: Option<&str>,
        sql: &mut String,
        params: &mut Vec<Value>,
    ) {
        let col = self.column(&predicate.column, root);
        match &predicate.lookup {
            Lookup::Exact(val) => {
                if val.is_null() {
                    sql.push_str(&format!("{col} IS NULL"));
                } else {
                    let ph = self.bind(val.clone(), params);
                    sql.push_str(&format!("{col} = {ph}"));
                }
            }
            Lookup::IExact(val) => {
                let ph = self.bind(val.clone(), params);
                sql.push_str(&format!("LOWER({col}) = LOWER({ph})"));
            }
            Lookup::Like {
                pattern,
                case_insensitive,
            } => {
                let ph = self.bind(Value::String(pattern.clone()), params);
                if !case_insensitive {
                    sql.push_str(&format!("{col} LIKE {ph}"));
                } else if self.backend == DatabaseBackendType::PostgreSQL {
                    sql.push_str(&format!("{col} ILIKE {ph}"));
                } else {
                    sql.push_str(&format!("LOWER({col}) LIKE LOWER({ph})"));
                }
                if let Some(escape) = predicate.escape {
                    sql.push_str(&self.escape_clause(escape));
                }
            }
            Lookup::Gt(val) => {
                let ph = self.bind(val.clone(), params);
                sql.push_str(&format!("{col} > {ph}"));
            }
            Lookup::Gte(val) => {
                let ph = self.bind(val.clone(), params);
                sql.push_str(&format!("{col} >= {ph}"));
            }
            Lookup::Lt(val) => {
                let ph = self.bind(val.clone(), params);
                sql.push_str(&format!("{col} < {ph}"));
            }
            Lookup::Lte(val) => {
                let ph = self.bind(val.clone(), params);
                sql.push_str(&format!("{col} <= {ph}"));
            }
            Lookup::In(vals) => {
                if vals.is_empty() {
                    sql.push_str("1=0");
                    return;
                }
                let placeholders: Vec<String> =
                    vals.iter().map(|v| self.bind(v.clone(), params)).collect();
                sql.push_str(&format!("{col} IN ({})", placeholders.join(", ")));
            }
            Lookup::IsNull(true) => sql.push_str(&format!("{col} IS NULL")),
            Lookup::IsNull(false) => sql.push_str(&format!("{col} IS NOT NULL")),
            Lookup::Range(low, high) => {
                let low = self.bind(low.clone(), params);
                let high = self.bind(high.clone(), params);
                sql.push_str(&format!("{col} BETWEEN {low} AND {high}"));
            }
        }
    }

    fn escape_clause(&self, escape: char) -> String {
        // MySQL string literals treat a backslash as an escape of their own.
        if self.backend == DatabaseBackendType::MySQL && escape == '\\' {
            " ESCAPE '\\\\'".to_string()
        } else {
            format!(" ESCAPE '{escape}'")
        }
    }
}
