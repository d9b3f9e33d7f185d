//! QuerySet and Manager for building and executing database queries.
//!
//! A [`QuerySet`] is an immutable snapshot of query intent: filters,
//! eager joins, ordering, grouping, distinct columns, limit and offset.
//! Chain methods take `&self` and return a new query set; nothing is
//! resolved until the statement is needed, and nothing runs until a
//! terminal method (`get`, `first`, `all`, `count`, `create`, ...) is
//! awaited with a [`DbExecutor`].
//!
//! The compiled statement and the fetched rows are cached per instance.
//! Neither cache survives a chain call or a plain `clone()`;
//! [`QuerySet::clone_with_cache`] keeps the rows explicitly.
//!
//! # Examples
//!
//! ```ignore
//! let users = Manager::<User>::new(registry);
//! let english = users.filter(Q::filter("language", "English")).order_by(&["-id"]);
//! let newest = english.first(&db).await?;
//! let ada = users.all().lookup("ada").get(&db, Q::all()).await?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use quarry_core::logging::query_span;
use quarry_core::{OrmSettings, QuarryError, QuarryResult, ValidationError, SETTINGS};
use tokio::sync::OnceCell;
use tracing::{debug, Instrument};

use super::clause::{ClauseCompiler, ColumnRef, WhereNode};
use super::compiler::{DatabaseBackendType, SqlCompiler};
use super::lookups::Q;
use super::resolver::JoinPlan;
use super::statement::{
    BatchUpdateStatement, DeleteStatement, Distinct, InsertStatement, OrderBy, SelectColumn,
    SelectStatement, Statement, UpdateStatement,
};
use crate::executor::DbExecutor;
use crate::fields::FieldDef;
use crate::model::{Model, ModelMeta};
use crate::registry::Registry;
use crate::row::{FromValue, Row};
use crate::value::Value;

/// The entry point for model-level query operations.
///
/// The `Manager` holds no query state; every access hands out a fresh
/// `QuerySet`.
pub struct Manager<M: Model> {
    registry: Arc<Registry>,
    orm: Arc<OrmSettings>,
    _phantom: PhantomData<M>,
}

impl<M: Model> Manager<M> {
    /// Creates a manager using the global ORM settings.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_settings(registry, SETTINGS.get_or_default().orm.clone())
    }

    /// Creates a manager with explicit ORM settings.
    pub fn with_settings(registry: Arc<Registry>, orm: OrmSettings) -> Self {
        Self {
            registry,
            orm: Arc::new(orm),
            _phantom: PhantomData,
        }
    }

    /// Returns a new `QuerySet` over every row.
    pub fn all(&self) -> QuerySet<M> {
        QuerySet::new(Arc::clone(&self.registry), Arc::clone(&self.orm))
    }

    /// Returns a new `QuerySet` with the given filter applied.
    pub fn filter(&self, q: Q) -> QuerySet<M> {
        self.all().filter(q)
    }

    /// Returns a new `QuerySet` with the given exclusion applied.
    pub fn exclude(&self, q: Q) -> QuerySet<M> {
        self.all().exclude(q)
    }
}

impl<M: Model> fmt::Debug for Manager<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager").field("model", &M::model_name()).finish()
    }
}

/// A lazy, immutable, chainable query over model `M`.
pub struct QuerySet<M: Model> {
    model: PhantomData<M>,
    registry: Arc<Registry>,
    orm: Arc<OrmSettings>,
    filters: Vec<(Q, bool)>,
    related: Vec<Vec<String>>,
    order_by: Vec<String>,
    group_by: Vec<String>,
    distinct: Option<Vec<String>>,
    limit: Option<usize>,
    offset: Option<usize>,
    pivot: bool,
    exclude_secrets: bool,
    statement: OnceLock<SelectStatement>,
    cache: OnceCell<Vec<Row>>,
}

impl<M: Model> Clone for QuerySet<M> {
    /// Copies the query intent; both caches start empty.
    fn clone(&self) -> Self {
        Self {
            model: PhantomData,
            registry: Arc::clone(&self.registry),
            orm: Arc::clone(&self.orm),
            filters: self.filters.clone(),
            related: self.related.clone(),
            order_by: self.order_by.clone(),
            group_by: self.group_by.clone(),
            distinct: self.distinct.clone(),
            limit: self.limit,
            offset: self.offset,
            pivot: self.pivot,
            exclude_secrets: self.exclude_secrets,
            statement: OnceLock::new(),
            cache: OnceCell::new(),
        }
    }
}

impl<M: Model> fmt::Debug for QuerySet<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySet")
            .field("model", &M::model_name())
            .field("filters", &self.filters)
            .field("related", &self.related)
            .field("order_by", &self.order_by)
            .field("group_by", &self.group_by)
            .field("distinct", &self.distinct)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("pivot", &self.pivot)
            .field("exclude_secrets", &self.exclude_secrets)
            .field("cached", &self.is_cached())
            .finish_non_exhaustive()
    }
}

impl<M: Model> QuerySet<M> {
    fn new(registry: Arc<Registry>, orm: Arc<OrmSettings>) -> Self {
        Self {
            model: PhantomData,
            registry,
            orm,
            filters: Vec::new(),
            related: Vec::new(),
            order_by: Vec::new(),
            group_by: Vec::new(),
            distinct: None,
            limit: None,
            offset: None,
            pivot: false,
            exclude_secrets: false,
            statement: OnceLock::new(),
            cache: OnceCell::new(),
        }
    }

    /// Clones this query set, keeping the fetched rows.
    #[must_use]
    pub fn clone_with_cache(&self) -> Self {
        let mut next = self.clone();
        next.cache = OnceCell::new_with(self.cache.get().cloned());
        if let Some(statement) = self.statement.get() {
            let _ = next.statement.set(statement.clone());
        }
        next
    }

    fn derive(&self, change: impl FnOnce(&mut Self)) -> Self {
        let mut next = self.clone();
        change(&mut next);
        next
    }

    // ── State accessors ──────────────────────────────────────────────

    /// Filter trees with their exclude flag, in call order.
    pub fn filters(&self) -> &[(Q, bool)] {
        &self.filters
    }

    /// Relationship paths requested through `select_related`.
    pub fn related_paths(&self) -> &[Vec<String>] {
        &self.related
    }

    /// Sort keys, `-` prefixed when descending.
    pub fn ordering(&self) -> &[String] {
        &self.order_by
    }

    /// Grouping keys.
    pub fn grouping(&self) -> &[String] {
        &self.group_by
    }

    /// Distinct fields; empty for a plain `DISTINCT`.
    pub fn distinct_fields(&self) -> Option<&[String]> {
        self.distinct.as_deref()
    }

    /// The row limit.
    pub const fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    /// The row offset.
    pub const fn offset_value(&self) -> Option<usize> {
        self.offset
    }

    /// Returns `true` once rows have been fetched into this instance.
    pub fn is_cached(&self) -> bool {
        self.cache.initialized()
    }

    // ── Chain methods ────────────────────────────────────────────────

    /// Adds a filter. Paths through relationships join those tables.
    #[must_use]
    pub fn filter(&self, q: Q) -> Self {
        self.derive(|qs| qs.filters.push((q, false)))
    }

    /// Adds a negated filter.
    ///
    /// A filter that reads through relationships is negated as a subquery
    /// on the primary key: rows without any related row stay in the
    /// result, and rows with several matching related rows are removed
    /// once.
    #[must_use]
    pub fn exclude(&self, q: Q) -> Self {
        self.derive(|qs| qs.filters.push((q, true)))
    }

    /// Replaces the ordering. A leading `-` sorts descending.
    #[must_use]
    pub fn order_by(&self, keys: &[&str]) -> Self {
        let keys = keys.iter().map(ToString::to_string).collect();
        self.derive(|qs| qs.order_by = keys)
    }

    /// Caps the number of rows.
    #[must_use]
    pub fn limit(&self, n: usize) -> Self {
        self.derive(|qs| qs.limit = Some(n))
    }

    /// Skips the first `n` rows.
    #[must_use]
    pub fn offset(&self, n: usize) -> Self {
        self.derive(|qs| qs.offset = Some(n))
    }

    /// Replaces the grouping keys.
    #[must_use]
    pub fn group_by(&self, keys: &[&str]) -> Self {
        let keys = keys.iter().map(ToString::to_string).collect();
        self.derive(|qs| qs.group_by = keys)
    }

    /// De-duplicates rows; with fields, one row per distinct combination.
    #[must_use]
    pub fn distinct(&self, fields: &[&str]) -> Self {
        let fields = fields.iter().map(ToString::to_string).collect();
        self.derive(|qs| qs.distinct = Some(fields))
    }

    /// Eagerly joins the given relationship paths.
    #[must_use]
    pub fn select_related(&self, paths: &[&str]) -> Self {
        let separator = self.orm.lookup_separator.clone();
        self.derive(|qs| {
            for path in paths {
                let segments: Vec<String> =
                    path.split(separator.as_str()).map(str::to_string).collect();
                if !qs.related.contains(&segments) {
                    qs.related.push(segments);
                }
            }
        })
    }

    /// Case-insensitive substring search across the model's text fields.
    ///
    /// Every text field is searched, secret ones included. An empty term
    /// leaves the query unchanged.
    #[must_use]
    pub fn lookup(&self, term: &str) -> Self {
        if term.is_empty() {
            return self.clone();
        }
        let separator = &self.orm.lookup_separator;
        let q = M::meta()
            .text_fields()
            .fold(Q::Or(Vec::new()), |acc, f| {
                acc | Q::filter(format!("{}{separator}icontains", f.name), term)
            });
        self.filter(q)
    }

    /// Drops secret fields from the selected columns.
    #[must_use]
    pub fn exclude_secrets(&self) -> Self {
        self.derive(|qs| qs.exclude_secrets = true)
    }

    /// Treats `M` as a many-to-many pivot: joins the far side and keeps one
    /// row per far-side entity.
    #[must_use]
    pub fn pivot(&self) -> Self {
        self.derive(|qs| qs.pivot = true)
    }

    // ── Compilation ──────────────────────────────────────────────────

    /// Returns the compiled SELECT, building it on first use.
    ///
    /// # Errors
    ///
    /// Propagates resolution errors: unknown fields or relationship
    /// segments, ambiguous reverse relationships, invalid operands.
    pub fn statement(&self) -> QuarryResult<SelectStatement> {
        if let Some(statement) = self.statement.get() {
            return Ok(statement.clone());
        }
        let built = self.build()?;
        Ok(self.statement.get_or_init(|| built).clone())
    }

    /// Renders the compiled SELECT for `backend`.
    pub fn sql(&self, backend: DatabaseBackendType) -> QuarryResult<(String, Vec<Value>)> {
        Ok(SqlCompiler::new(backend).compile(&Statement::Select(self.statement()?)))
    }

    fn build(&self) -> QuarryResult<SelectStatement> {
        let meta = M::meta();
        let registry = &*self.registry;
        registry.model(meta.name)?;
        let compiler = ClauseCompiler::new(registry, meta.name, &self.orm);

        let mut paths = self.related.clone();
        let mut nodes = Vec::with_capacity(self.filters.len());
        for (q, exclude) in &self.filters {
            let (node, joins) = compiler.compile_with_joins(q, false)?;
            if !*exclude {
                for path in joins {
                    push_path(&mut paths, path);
                }
                nodes.push(node);
            } else if joins.is_empty() {
                nodes.push(WhereNode::Not(Box::new(node)));
            } else {
                nodes.push(self.exclude_through_joins(node, &joins)?);
            }
        }

        let mut resolve = |key: &str| -> QuarryResult<ColumnRef> {
            let (related, column) = compiler.resolve_column(key)?;
            push_path(&mut paths, related);
            Ok(column)
        };

        let order_by = self
            .order_by
            .iter()
            .map(|key| {
                let (path, descending) = OrderBy::parse(key);
                Ok(OrderBy {
                    column: resolve(path)?,
                    descending,
                })
            })
            .collect::<QuarryResult<Vec<_>>>()?;
        let group_by = self
            .group_by
            .iter()
            .map(|key| resolve(key))
            .collect::<QuarryResult<Vec<_>>>()?;
        let mut distinct = match &self.distinct {
            None => Distinct::None,
            Some(fields) if fields.is_empty() => Distinct::All,
            Some(fields) => Distinct::On(
                fields
                    .iter()
                    .map(|key| resolve(key))
                    .collect::<QuarryResult<Vec<_>>>()?,
            ),
        };

        if self.pivot {
            let pivot = meta.pivot.as_ref().ok_or_else(|| {
                QuarryError::Precondition(format!("{} is not a many-to-many pivot", meta.name))
            })?;
            distinct = Distinct::On(vec![resolve(pivot.related_field)?]);
            push_path(&mut paths, vec![pivot.related_field.to_string()]);
        }

        let plan = JoinPlan::from_paths(registry, meta.name, &paths)?;
        let mut columns = self.columns_of(meta, None);
        for join in plan.joins() {
            columns.extend(self.columns_of(registry.model(join.model)?, Some(&join.alias)));
        }

        let statement = SelectStatement {
            table: meta.db_table.clone(),
            columns,
            joins: plan.into_joins(),
            where_clause: WhereNode::conjoin(nodes),
            order_by,
            group_by,
            distinct,
            limit: self.limit,
            offset: self.offset,
        };
        debug!(model = meta.name, joins = statement.joins.len(), "compiled query set");
        Ok(statement)
    }

    /// Negates a joined filter as `NOT (pk IN (SELECT pk ... WHERE node))`.
    ///
    /// Rows with no related rows at all are kept, and a row is dropped once
    /// for any number of matching related rows.
    fn exclude_through_joins(
        &self,
        node: WhereNode,
        paths: &[Vec<String>],
    ) -> QuarryResult<WhereNode> {
        let meta = M::meta();
        let pk = self.pk_column()?;
        let mut inner = SelectStatement::new(meta.db_table.clone());
        inner.columns = vec![SelectColumn::new(ColumnRef::root(pk.as_str()))];
        inner.joins = JoinPlan::from_paths(&self.registry, meta.name, paths)?.into_joins();
        inner.where_clause = Some(node);
        Ok(WhereNode::Not(Box::new(WhereNode::InSubquery {
            column: ColumnRef::root(pk),
            query: Box::new(inner),
        })))
    }

    fn columns_of(&self, meta: &ModelMeta, alias: Option<&str>) -> Vec<SelectColumn> {
        meta.fields
            .iter()
            .filter(|f| !(self.exclude_secrets && f.secret))
            .map(|f| {
                SelectColumn::new(match alias {
                    Some(alias) => ColumnRef::joined(alias, f.column.as_str()),
                    None => ColumnRef::root(f.column.as_str()),
                })
            })
            .collect()
    }

    // ── Execution helpers ────────────────────────────────────────────

    async fn traced<T, F>(&self, op: &'static str, fut: F) -> QuarryResult<T>
    where
        F: Future<Output = QuarryResult<T>>,
    {
        let result = fut.instrument(query_span(M::model_name(), op)).await;
        if let Err(err) = &result {
            debug!(model = M::model_name(), op, kind = err.kind(), error = %err, "query failed");
        }
        result
    }

    async fn rows(&self, db: &dyn DbExecutor) -> QuarryResult<&[Row]> {
        if let Some(rows) = self.cache.get() {
            return Ok(rows.as_slice());
        }
        let statement = Statement::Select(self.statement()?);
        let rows = self
            .cache
            .get_or_try_init(|| db.fetch_all(&statement))
            .await?;
        Ok(rows.as_slice())
    }

    fn pk_column(&self) -> QuarryResult<String> {
        Ok(self.registry.table_for(M::model_name())?.primary_key.clone())
    }

    fn field_def(name: &str) -> Option<&'static FieldDef> {
        let meta = M::meta();
        if name == "pk" {
            meta.pk_field()
        } else {
            meta.field_or_column(name)
        }
    }

    /// Cleans a create payload and completes it with defaults and automatic
    /// values, in declaration order.
    fn prepare_create(fields: &[(&str, Value)]) -> QuarryResult<Vec<(&'static FieldDef, Value)>> {
        let meta = M::meta();
        let mut provided: HashMap<&'static str, Value> = HashMap::new();
        let mut errors: HashMap<String, Vec<ValidationError>> = HashMap::new();

        for (name, value) in fields {
            let Some(def) = Self::field_def(name) else {
                errors.entry((*name).to_string()).or_default().push(ValidationError::new(
                    format!("Unknown field '{name}' on {}.", meta.name),
                    "unknown_field",
                ));
                continue;
            };
            match def.clean(value.clone()) {
                Ok(cleaned) => {
                    provided.insert(def.name, cleaned);
                }
                Err(err) => merge_errors(&mut errors, err),
            }
        }

        let mut payload = Vec::with_capacity(meta.fields.len());
        for def in &meta.fields {
            let value = match provided.remove(def.name) {
                Some(value) if !def.auto_now => Some(value),
                explicit => def
                    .auto_value_on_create()
                    .or(explicit)
                    .or_else(|| def.default.clone()),
            };
            match value {
                Some(value) => payload.push((def, value)),
                None if def.is_auto() || def.null => {}
                None => errors.entry(def.name.to_string()).or_default().push(
                    ValidationError::new("This field is required.", "required"),
                ),
            }
        }

        if errors.is_empty() {
            Ok(payload)
        } else {
            Err(ValidationError::with_field_errors(errors).into())
        }
    }

    /// Splits a prepared payload into insert columns and values, leaving out
    /// a NULL primary key so the backend assigns it.
    fn insert_row(payload: &[(&'static FieldDef, Value)]) -> (Vec<String>, Vec<Value>) {
        payload
            .iter()
            .filter(|(def, value)| !(def.primary_key && value.is_null()))
            .map(|(def, value)| (def.column.clone(), value.clone()))
            .unzip()
    }

    // ── Terminal operations ──────────────────────────────────────────

    /// Fetches every matching entity. Rows are cached on this instance.
    pub async fn all(&self, db: &dyn DbExecutor) -> QuarryResult<Vec<M>> {
        self.traced("all", async {
            self.rows(db).await?.iter().map(M::from_row).collect()
        })
        .await
    }

    /// Applies `q`, then fetches every matching entity.
    pub async fn all_with(&self, db: &dyn DbExecutor, q: Q) -> QuarryResult<Vec<M>> {
        self.filter(q).all(db).await
    }

    /// Fetches the far-side entities of a pivot query set, one per distinct
    /// far-side key.
    ///
    /// # Errors
    ///
    /// `Precondition` if `M` is not a pivot or its far side is not `R`.
    pub async fn related_all<R: Model>(&self, db: &dyn DbExecutor) -> QuarryResult<Vec<R>> {
        self.traced("related_all", async {
            let meta = M::meta();
            let pivot = meta.pivot.as_ref().ok_or_else(|| {
                QuarryError::Precondition(format!("{} is not a many-to-many pivot", meta.name))
            })?;
            let target = meta
                .get_field(pivot.related_field)
                .and_then(FieldDef::target_model);
            if target != Some(R::model_name()) {
                return Err(QuarryError::Precondition(format!(
                    "{}.{} does not lead to {}",
                    meta.name,
                    pivot.related_field,
                    R::model_name()
                )));
            }

            let qs = if self.pivot {
                self.clone_with_cache()
            } else {
                self.pivot()
            };
            qs.rows(db)
                .await?
                .iter()
                .filter_map(|row| row.related(pivot.related_field))
                .map(|row| R::from_row(&row))
                .collect()
        })
        .await
    }

    /// Fetches the single entity matching `q`.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` if nothing matches, `MultipleObjectsReturned` if more
    /// than one row does.
    pub async fn get(&self, db: &dyn DbExecutor, q: Q) -> QuarryResult<M> {
        self.traced("get", async {
            let mut select = self.filter(q).statement()?;
            select.limit = Some(select.limit.map_or(2, |limit| limit.min(2)));
            let statement = Statement::Select(select);
            let rows = db.fetch_all(&statement).await?;
            match rows.as_slice() {
                [] => Err(QuarryError::DoesNotExist(format!(
                    "{} matching query does not exist: {statement}",
                    M::model_name()
                ))),
                [row] => M::from_row(row),
                _ => Err(QuarryError::MultipleObjectsReturned(format!(
                    "get() returned more than one {}: {statement}",
                    M::model_name()
                ))),
            }
        })
        .await
    }

    /// Like [`get`](Self::get), but `None` when nothing matches.
    pub async fn get_or_none(&self, db: &dyn DbExecutor, q: Q) -> QuarryResult<Option<M>> {
        match self.get(db, q).await {
            Ok(entity) => Ok(Some(entity)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn edge(&self, last: bool) -> Self {
        let key = if last { "-pk" } else { "pk" };
        self.derive(|qs| {
            qs.order_by = vec![key.to_string()];
            qs.limit = Some(1);
        })
    }

    async fn fetch_edge(&self, db: &dyn DbExecutor, last: bool) -> QuarryResult<Option<M>> {
        let statement = Statement::Select(self.edge(last).statement()?);
        db.fetch_one(&statement)
            .await?
            .as_ref()
            .map(M::from_row)
            .transpose()
    }

    /// The entity with the lowest primary key; any ordering is replaced.
    pub async fn first(&self, db: &dyn DbExecutor) -> QuarryResult<Option<M>> {
        self.traced("first", self.fetch_edge(db, false)).await
    }

    /// The entity with the highest primary key; any ordering is replaced.
    pub async fn last(&self, db: &dyn DbExecutor) -> QuarryResult<Option<M>> {
        self.traced("last", self.fetch_edge(db, true)).await
    }

    /// Validates `fields`, inserts one row and returns the new entity.
    ///
    /// Missing fields take their `auto_now`/`auto_now_add` value or their
    /// default; the primary key comes from the backend unless supplied.
    ///
    /// # Errors
    ///
    /// `ValidationError` keyed by field for unknown, invalid and missing
    /// required fields.
    pub async fn create(&self, db: &dyn DbExecutor, fields: &[(&str, Value)]) -> QuarryResult<M> {
        self.traced("create", async {
            let meta = M::meta();
            let payload = Self::prepare_create(fields)?;
            let (columns, values) = Self::insert_row(&payload);
            let statement = Statement::Insert(InsertStatement {
                table: meta.db_table.clone(),
                columns,
                rows: vec![values],
            });

            let supplied_pk = payload
                .iter()
                .find(|(def, value)| def.primary_key && !value.is_null())
                .map(|(_, value)| value.clone());
            let pk = match supplied_pk {
                Some(pk) => {
                    db.execute(&statement).await?;
                    pk
                }
                None => db.insert(&statement).await?,
            };

            let (columns, values) = meta
                .fields
                .iter()
                .map(|def| {
                    let value = if def.primary_key {
                        pk.clone()
                    } else {
                        payload
                            .iter()
                            .find(|(f, _)| f.name == def.name)
                            .map_or(Value::Null, |(_, v)| v.clone())
                    };
                    (def.column.clone(), value)
                })
                .unzip();
            M::from_row(&Row::new(columns, values))
        })
        .await
    }

    /// Validates every row and inserts them with multi-row statements.
    ///
    /// Rows are chunked by `default_batch_size`; consecutive rows with the
    /// same columns share a statement. Returns the number of inserted rows.
    pub async fn bulk_create(
        &self,
        db: &dyn DbExecutor,
        rows: &[Vec<(&str, Value)>],
    ) -> QuarryResult<u64> {
        self.traced("bulk_create", async {
            let prepared = rows
                .iter()
                .map(|row| Self::prepare_create(row).map(|payload| Self::insert_row(&payload)))
                .collect::<QuarryResult<Vec<_>>>()?;
            let batch = self.orm.default_batch_size.unwrap_or(usize::MAX).max(1);

            let mut inserted = 0;
            for group in prepared.chunk_by(|a, b| a.0 == b.0) {
                let size = if group[0].0.is_empty() { 1 } else { batch };
                for chunk in group.chunks(size) {
                    let statement = Statement::Insert(InsertStatement {
                        table: M::meta().db_table.clone(),
                        columns: chunk[0].0.clone(),
                        rows: chunk.iter().map(|(_, values)| values.clone()).collect(),
                    });
                    inserted += db.execute(&statement).await?;
                }
            }
            Ok(inserted)
        })
        .await
    }

    /// Writes the named fields of each entity with one keyed batch.
    ///
    /// Every entity must supply every named field.
    ///
    /// # Errors
    ///
    /// `ValidationError` for unknown fields, the primary key, or a field an
    /// entity does not supply; `Precondition` for an unsaved entity.
    pub async fn bulk_update(
        &self,
        db: &dyn DbExecutor,
        entities: &[M],
        fields: &[&str],
    ) -> QuarryResult<u64> {
        self.traced("bulk_update", async {
            if entities.is_empty() || fields.is_empty() {
                return Ok(0);
            }
            let defs = fields
                .iter()
                .map(|name| match Self::field_def(name) {
                    Some(def) if def.primary_key => Err(ValidationError::for_field(
                        *name,
                        "The primary key cannot be bulk updated.",
                        "primary_key",
                    )),
                    Some(def) => Ok(def),
                    None => Err(ValidationError::for_field(
                        *name,
                        format!("Unknown field '{name}' on {}.", M::model_name()),
                        "unknown_field",
                    )),
                })
                .collect::<Result<Vec<_>, _>>()?;

            let mut rows = Vec::with_capacity(entities.len());
            for entity in entities {
                let pk = entity.pk().ok_or_else(|| {
                    QuarryError::Precondition(format!(
                        "bulk_update() requires saved {} instances",
                        M::model_name()
                    ))
                })?;
                let values: HashMap<&str, Value> = entity.field_values().into_iter().collect();
                let mut row = Vec::with_capacity(defs.len() + 1);
                for def in &defs {
                    let value = values.get(def.name).cloned().ok_or_else(|| {
                        ValidationError::for_field(
                            def.name,
                            format!("{} with pk {pk} does not supply this field.", M::model_name()),
                            "missing_field",
                        )
                    })?;
                    row.push(def.clean(value)?);
                }
                row.push(pk);
                rows.push(row);
            }

            let statement = Statement::BatchUpdate(BatchUpdateStatement {
                table: M::meta().db_table.clone(),
                columns: defs.iter().map(|d| d.column.clone()).collect(),
                key: self.pk_column()?,
            });
            db.execute_batch(&statement, &rows).await
        })
        .await
    }

    /// Updates every matching row and returns the number affected.
    ///
    /// `auto_now` fields not named in `fields` are refreshed.
    pub async fn update(&self, db: &dyn DbExecutor, fields: &[(&str, Value)]) -> QuarryResult<u64> {
        self.traced("update", async {
            let meta = M::meta();
            let mut assignments: Vec<(&'static FieldDef, Value)> = Vec::new();
            let mut errors: HashMap<String, Vec<ValidationError>> = HashMap::new();
            for (name, value) in fields {
                match Self::field_def(name) {
                    Some(def) => match def.clean(value.clone()) {
                        Ok(cleaned) => assignments.push((def, cleaned)),
                        Err(err) => merge_errors(&mut errors, err),
                    },
                    None => errors.entry((*name).to_string()).or_default().push(
                        ValidationError::new(
                            format!("Unknown field '{name}' on {}.", meta.name),
                            "unknown_field",
                        ),
                    ),
                }
            }
            if !errors.is_empty() {
                return Err(ValidationError::with_field_errors(errors).into());
            }
            for def in &meta.fields {
                if assignments.iter().any(|(d, _)| d.name == def.name) {
                    continue;
                }
                if let Some(value) = def.auto_value_on_update() {
                    assignments.push((def, value));
                }
            }
            if assignments.is_empty() {
                return Ok(0);
            }

            let select = self.statement()?;
            let statement = Statement::Update(UpdateStatement {
                table: meta.db_table.clone(),
                assignments: assignments
                    .into_iter()
                    .map(|(def, value)| (def.column.clone(), value))
                    .collect(),
                where_clause: select.write_scope(&self.pk_column()?),
            });
            db.execute(&statement).await
        })
        .await
    }

    /// Deletes every matching row and returns the number affected.
    pub async fn delete(&self, db: &dyn DbExecutor) -> QuarryResult<u64> {
        self.traced("delete", async {
            let select = self.statement()?;
            let statement = Statement::Delete(DeleteStatement {
                table: M::meta().db_table.clone(),
                where_clause: select.write_scope(&self.pk_column()?),
            });
            db.execute(&statement).await
        })
        .await
    }

    /// Returns `true` if any row matches.
    pub async fn exists(&self, db: &dyn DbExecutor) -> QuarryResult<bool> {
        self.traced("exists", async {
            let value = db.fetch_scalar(&Statement::exists(&self.statement()?)).await?;
            if value.is_null() {
                Ok(false)
            } else {
                bool::from_value(&value)
            }
        })
        .await
    }

    /// Counts matching rows, ignoring ordering, limit and offset.
    pub async fn count(&self, db: &dyn DbExecutor) -> QuarryResult<u64> {
        self.traced("count", async {
            let value = db.fetch_scalar(&Statement::count(&self.statement()?)).await?;
            if value.is_null() {
                return Ok(0);
            }
            let n = i64::from_value(&value)?;
            u64::try_from(n)
                .map_err(|_| QuarryError::DatabaseError(format!("count returned {n}")))
        })
        .await
    }

    /// Fetches the entity matching `filters`, creating it when absent.
    ///
    /// The created row takes `defaults` overlaid with every plain field
    /// filter. Returns the entity and whether it was created.
    pub async fn get_or_create(
        &self,
        db: &dyn DbExecutor,
        filters: &[(&str, Value)],
        defaults: &[(&str, Value)],
    ) -> QuarryResult<(M, bool)> {
        self.traced("get_or_create", async {
            match self.get(db, pairs_to_q(filters)).await {
                Ok(found) => Ok((found, false)),
                Err(err) if err.is_not_found() => {
                    let payload = self.merge_payload(filters, defaults);
                    Ok((self.create(db, &payload).await?, true))
                }
                Err(err) => Err(err),
            }
        })
        .await
    }

    /// Updates the entity matching `filters` with `defaults`, creating it
    /// when absent. Returns the entity and whether it was created.
    pub async fn update_or_create(
        &self,
        db: &dyn DbExecutor,
        filters: &[(&str, Value)],
        defaults: &[(&str, Value)],
    ) -> QuarryResult<(M, bool)> {
        self.traced("update_or_create", async {
            match self.get(db, pairs_to_q(filters)).await {
                Ok(found) => {
                    if defaults.is_empty() {
                        return Ok((found, false));
                    }
                    let pk = found.pk().ok_or_else(|| {
                        QuarryError::Precondition(format!(
                            "{} returned without a primary key",
                            M::model_name()
                        ))
                    })?;
                    let by_pk = Self::new(Arc::clone(&self.registry), Arc::clone(&self.orm));
                    by_pk.filter(Q::filter("pk", pk.clone())).update(db, defaults).await?;
                    Ok((by_pk.get(db, Q::filter("pk", pk)).await?, false))
                }
                Err(err) if err.is_not_found() => {
                    let payload = self.merge_payload(filters, defaults);
                    Ok((self.create(db, &payload).await?, true))
                }
                Err(err) => Err(err),
            }
        })
        .await
    }

    /// Returns `true` if `entity` matches the current filters.
    ///
    /// # Errors
    ///
    /// `Precondition` if `entity` has no primary key.
    pub async fn contains(&self, db: &dyn DbExecutor, entity: &M) -> QuarryResult<bool> {
        self.traced("contains", async {
            let pk = entity.pk().ok_or_else(|| {
                QuarryError::Precondition(format!(
                    "contains() requires a saved {} instance",
                    M::model_name()
                ))
            })?;
            let scoped = self.filter(Q::filter("pk", pk)).statement()?;
            let value = db.fetch_scalar(&Statement::exists(&scoped)).await?;
            if value.is_null() {
                Ok(false)
            } else {
                bool::from_value(&value)
            }
        })
        .await
    }

    /// Overlays plain field filters on `defaults`; filters with a lookup
    /// or relationship path are not copied.
    fn merge_payload<'k>(
        &self,
        filters: &[(&'k str, Value)],
        defaults: &[(&'k str, Value)],
    ) -> Vec<(&'k str, Value)> {
        let mut payload: Vec<(&'k str, Value)> = defaults.to_vec();
        for (key, value) in filters {
            if key.contains(self.orm.lookup_separator.as_str()) {
                continue;
            }
            match payload.iter_mut().find(|(k, _)| k == key) {
                Some(slot) => slot.1 = value.clone(),
                None => payload.push((key, value.clone())),
            }
        }
        payload
    }
}

fn push_path(paths: &mut Vec<Vec<String>>, path: Vec<String>) {
    if !path.is_empty() && !paths.contains(&path) {
        paths.push(path);
    }
}

fn merge_errors(errors: &mut HashMap<String, Vec<ValidationError>>, err: ValidationError) {
    for (field, list) in err.field_errors {
        errors.entry(field).or_default().extend(list);
    }
}

fn pairs_to_q(pairs: &[(&str, Value)]) -> Q {
    pairs
        .iter()
        .fold(Q::all(), |q, (key, value)| q & Q::filter(*key, value.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::resolver::JoinKind;
    use crate::testing::{self, Course, Designation, Enrollment, Permission, RecordingExecutor, User};

    fn users() -> Manager<User> {
        Manager::with_settings(testing::registry(), OrmSettings::default())
    }

    fn permissions() -> Manager<Permission> {
        Manager::with_settings(testing::registry(), OrmSettings::default())
    }

    fn select_sql<M: Model>(qs: &QuerySet<M>) -> String {
        qs.sql(DatabaseBackendType::SQLite).unwrap().0
    }

    // ── Chain semantics ──────────────────────────────────────────────

    #[test]
    fn test_chain_calls_do_not_mutate_receiver() {
        let base = users().all();
        let derived = base
            .filter(Q::filter("name", "Ada"))
            .exclude(Q::filter("language", "COBOL"))
            .order_by(&["-id"])
            .limit(3)
            .offset(1)
            .group_by(&["language"])
            .distinct(&["name"])
            .select_related(&["designations"]);

        assert!(base.filters().is_empty());
        assert!(base.ordering().is_empty());
        assert!(base.grouping().is_empty());
        assert!(base.related_paths().is_empty());
        assert_eq!(base.distinct_fields(), None);
        assert_eq!(base.limit_value(), None);
        assert_eq!(base.offset_value(), None);

        assert_eq!(derived.filters().len(), 2);
        assert!(derived.filters()[1].1);
        assert_eq!(derived.ordering(), ["-id"]);
        assert_eq!(derived.limit_value(), Some(3));
    }

    #[tokio::test]
    async fn test_clone_drops_row_cache() {
        let db = RecordingExecutor::new();
        db.push(vec![testing::user_row(1, "Ada", "en")]);
        let qs = users().all();
        qs.all(&db).await.unwrap();
        assert!(qs.is_cached());
        assert!(!qs.clone().is_cached());
        assert!(!qs.filter(Q::filter("id", 1_i64)).is_cached());
        assert!(qs.clone_with_cache().is_cached());

        // A second fetch on the same instance is served from the cache.
        qs.all(&db).await.unwrap();
        assert_eq!(db.statements().len(), 1);
    }

    #[test]
    fn test_select_lists_every_root_column() {
        assert_eq!(
            select_sql(&users().all()),
            "SELECT \"users\".\"id\", \"users\".\"name\", \"users\".\"language\", \
             \"users\".\"password\" FROM \"users\""
        );
    }

    #[test]
    fn test_same_path_joined_once() {
        let qs = permissions()
            .filter(Q::filter("designation__title", "Admin"))
            .filter(Q::filter("designation__title__startswith", "Ad"))
            .select_related(&["designation"]);
        let statement = qs.statement().unwrap();
        assert_eq!(statement.joins.len(), 1);
        assert_eq!(statement.joins[0].alias, "designation");
    }

    #[test]
    fn test_filter_through_relation_joins_implicitly() {
        let qs = permissions().filter(Q::filter("designation__user__name__icontains", "ad"));
        let statement = qs.statement().unwrap();
        let aliases: Vec<_> = statement.joins.iter().map(|j| j.alias.as_str()).collect();
        assert_eq!(aliases, vec!["designation", "designation__user"]);
        assert!(statement
            .columns
            .iter()
            .any(|c| c.alias.as_deref() == Some("designation__user__name")));
        assert!(select_sql(&qs).contains("LOWER(\"designation__user\".\"name\") LIKE LOWER(?)"));
    }

    #[test]
    fn test_escape_reaches_sql() {
        let qs = users().filter(Q::filter("name__contains", "50%_off"));
        let (sql, params) = qs.sql(DatabaseBackendType::SQLite).unwrap();
        assert!(sql.ends_with("\"users\".\"name\" LIKE ? ESCAPE '\\'"));
        assert_eq!(params, vec![Value::from(r"%50\%\_off%")]);

        let plain = select_sql(&users().filter(Q::filter("name__contains", "plain")));
        assert!(!plain.contains("ESCAPE"));
    }

    #[test]
    fn test_ambiguous_reverse_names_resolve_separately() {
        let teams: Manager<testing::Team> =
            Manager::with_settings(testing::registry(), OrmSettings::default());
        let home = teams.filter(Q::filter("home_matches__venue", "Anfield")).statement().unwrap();
        let away = teams.filter(Q::filter("away_matches__venue", "Anfield")).statement().unwrap();
        assert_eq!(home.joins[0].table, "matches");
        assert_eq!(away.joins[0].table, "matches");
        assert_eq!(home.joins[0].column, "home_id");
        assert_eq!(away.joins[0].column, "away_id");
        assert_eq!(home.joins[0].kind, JoinKind::Left);
    }

    #[test]
    fn test_unresolved_path_fails_before_io() {
        let err = users().filter(Q::filter("team__name", "x")).statement().unwrap_err();
        assert!(matches!(err, QuarryError::UnresolvedPath { .. }));
    }

    #[test]
    fn test_order_by_sign() {
        let desc = select_sql(&users().all().order_by(&["-id"]));
        assert!(desc.ends_with("ORDER BY \"users\".\"id\" DESC"));
        let asc = select_sql(&users().all().order_by(&["id"]));
        assert!(asc.ends_with("ORDER BY \"users\".\"id\" ASC"));
    }

    #[test]
    fn test_order_by_related_field_joins() {
        let sql = select_sql(&permissions().all().order_by(&["designation__title"]));
        assert!(sql.contains("INNER JOIN \"designations\" AS \"designation\""));
        assert!(sql.ends_with("ORDER BY \"designation\".\"title\" ASC"));
    }

    #[test]
    fn test_lookup_empty_term_is_identity() {
        let qs = users().filter(Q::filter("language", "en"));
        assert_eq!(qs.lookup("").statement().unwrap(), qs.statement().unwrap());
    }

    #[test]
    fn test_lookup_searches_every_text_field() {
        let (sql, params) = users().all().lookup("test").sql(DatabaseBackendType::SQLite).unwrap();
        assert!(sql.ends_with(
            "WHERE (LOWER(\"users\".\"name\") LIKE LOWER(?) OR LOWER(\"users\".\"language\") LIKE LOWER(?) \
             OR LOWER(\"users\".\"password\") LIKE LOWER(?))"
        ));
        assert_eq!(params, vec![Value::from("%test%"); 3]);
    }

    #[test]
    fn test_exclude_through_reverse_relation_uses_subquery() {
        let teams: Manager<testing::Team> =
            Manager::with_settings(testing::registry(), OrmSettings::default());
        let qs = teams.all().exclude(Q::filter("home_matches__venue", "Anfield"));
        let statement = qs.statement().unwrap();
        assert!(statement.joins.is_empty());
        assert_eq!(
            select_sql(&qs),
            "SELECT \"teams\".\"id\", \"teams\".\"name\" FROM \"teams\" \
             WHERE NOT (\"teams\".\"id\" IN (SELECT \"teams\".\"id\" FROM \"teams\" \
             LEFT JOIN \"matches\" AS \"home_matches\" ON \"home_matches\".\"home_id\" = \"teams\".\"id\" \
             WHERE \"home_matches\".\"venue\" = ?))"
        );

        let plain = select_sql(&teams.all().exclude(Q::filter("name", "Reds")));
        assert!(plain.ends_with("WHERE NOT (\"teams\".\"name\" = ?)"));
    }

    #[test]
    fn test_exclude_secrets_drops_columns() {
        let sql = select_sql(&users().all().exclude_secrets());
        assert!(!sql.contains("password"));
        let user = User::from_row(&Row::from_pairs([
            ("id", Value::Int(1)),
            ("name", Value::from("Ada")),
            ("language", Value::from("en")),
        ]))
        .unwrap();
        assert_eq!(user.password, None);
    }

    #[test]
    fn test_distinct_without_fields() {
        assert!(select_sql(&users().all().distinct(&[])).starts_with("SELECT DISTINCT "));
    }

    #[test]
    fn test_pivot_distinct_on_far_side() {
        let enrollments: Manager<Enrollment> =
            Manager::with_settings(testing::registry(), OrmSettings::default());
        let sql = select_sql(&enrollments.filter(Q::filter("student", 1_i64)).pivot());
        assert!(sql.contains("INNER JOIN \"courses\" AS \"course\""));
        assert!(sql.ends_with("GROUP BY \"enrollments\".\"course_id\""));

        let not_pivot = users().all().pivot().statement().unwrap_err();
        assert!(matches!(not_pivot, QuarryError::Precondition(_)));
    }

    // ── Terminal operations ──────────────────────────────────────────

    #[tokio::test]
    async fn test_get_semantics() {
        let db = RecordingExecutor::new();
        let qs = users().all();

        db.push(Vec::new());
        let err = qs.get(&db, Q::filter("name", "Ada")).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("User"));

        db.push(vec![testing::user_row(1, "Ada", "en")]);
        let user = qs.get(&db, Q::filter("name", "Ada")).await.unwrap();
        assert_eq!(user.id, Some(1));

        db.push(vec![testing::user_row(1, "Ada", "en"), testing::user_row(2, "Ada", "fr")]);
        let err = qs.get(&db, Q::filter("name", "Ada")).await.unwrap_err();
        assert!(matches!(err, QuarryError::MultipleObjectsReturned(_)));

        assert!(db.statements()[0].ends_with("LIMIT 2"));
    }

    #[tokio::test]
    async fn test_get_or_none() {
        let db = RecordingExecutor::new();
        assert!(users().all().get_or_none(&db, Q::filter("id", 4_i64)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_first_and_last_order_by_pk_only() {
        let db = RecordingExecutor::new();
        let qs = users().all().order_by(&["name"]);
        db.push(vec![testing::user_row(1, "Ada", "en")]);
        let first = qs.first(&db).await.unwrap();
        assert_eq!(first.map(|u| u.id), Some(Some(1)));
        qs.last(&db).await.unwrap();

        let statements = db.statements();
        assert!(statements[0].ends_with("ORDER BY \"users\".\"id\" ASC LIMIT 1"));
        assert!(statements[1].ends_with("ORDER BY \"users\".\"id\" DESC LIMIT 1"));
        assert_eq!(qs.ordering(), ["name".to_string()]);
    }

    #[tokio::test]
    async fn test_first_on_empty_table() {
        let db = RecordingExecutor::new();
        assert!(users().all().lookup("zzz").first(&db).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_fills_defaults_and_pk() {
        let db = RecordingExecutor::new();
        let user = users()
            .all()
            .create(&db, &[("name", Value::from("Test")), ("language", Value::from("English"))])
            .await
            .unwrap();
        assert_eq!(user.id, Some(1));
        assert_eq!(user.password.as_deref(), Some(""));
        assert_eq!(
            db.statements()[0],
            "INSERT INTO \"users\" (\"name\", \"language\", \"password\") VALUES (?, ?, ?)"
        );
    }

    #[tokio::test]
    async fn test_create_validation() {
        let db = RecordingExecutor::new();
        let err = users()
            .all()
            .create(&db, &[("nickname", Value::from("x")), ("name", Value::Int(3))])
            .await
            .unwrap_err();
        let QuarryError::ValidationError(v) = err else {
            panic!("expected validation error");
        };
        assert!(v.has_field("nickname"));
        assert!(v.has_field("name"));
        assert!(v.has_field("language"));
        assert!(db.statements().is_empty());
    }

    #[tokio::test]
    async fn test_create_with_relation_by_column() {
        let db = RecordingExecutor::new();
        let designation: Designation = Manager::with_settings(testing::registry(), OrmSettings::default())
            .all()
            .create(&db, &[("title", Value::from("Admin")), ("user_id", Value::Int(4))])
            .await
            .unwrap();
        assert!(designation.id.is_some());
        assert!(db.statements()[0].contains("(\"title\", \"user_id\")"));
        assert_eq!(db.params(0), vec![Value::from("Admin"), Value::Int(4)]);
    }

    #[tokio::test]
    async fn test_bulk_create_batches() {
        let db = RecordingExecutor::new();
        let mut orm = OrmSettings::default();
        orm.default_batch_size = Some(2);
        let manager: Manager<User> = Manager::with_settings(testing::registry(), orm);
        let rows: Vec<Vec<(&str, Value)>> = (0..3)
            .map(|i| vec![("name", Value::from(format!("u{i}"))), ("language", Value::from("en"))])
            .collect();
        manager.all().bulk_create(&db, &rows).await.unwrap();
        let statements = db.statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].ends_with("VALUES (?, ?, ?), (?, ?, ?)"));
        assert!(statements[1].ends_with("VALUES (?, ?, ?)"));
    }

    #[tokio::test]
    async fn test_bulk_update_single_batch() {
        let db = RecordingExecutor::new();
        let people = vec![
            User {
                id: Some(1),
                name: "Ada".into(),
                language: "en".into(),
                password: None,
            },
            User {
                id: Some(2),
                name: "Linus".into(),
                language: "fi".into(),
                password: None,
            },
        ];
        let affected = users().all().bulk_update(&db, &people, &["language"]).await.unwrap();
        assert_eq!(affected, 2);
        assert_eq!(
            db.statements()[0],
            "UPDATE \"users\" SET \"language\" = ? WHERE \"id\" = ?"
        );
        assert_eq!(db.params(1), vec![Value::from("fi"), Value::Int(2)]);
    }

    #[tokio::test]
    async fn test_bulk_update_rejections() {
        let db = RecordingExecutor::new();
        let unsaved = vec![User {
            id: None,
            name: "Ada".into(),
            language: "en".into(),
            password: None,
        }];
        let err = users().all().bulk_update(&db, &unsaved, &["name"]).await.unwrap_err();
        assert!(matches!(err, QuarryError::Precondition(_)));

        let err = users().all().bulk_update(&db, &unsaved, &["id"]).await.unwrap_err();
        assert!(matches!(err, QuarryError::ValidationError(_)));

        let err = users().all().bulk_update(&db, &unsaved, &["nickname"]).await.unwrap_err();
        assert!(err.to_string().contains("nickname"));
    }

    #[tokio::test]
    async fn test_update_through_join_uses_subquery() {
        let db = RecordingExecutor::new();
        permissions()
            .filter(Q::filter("designation__title", "Admin"))
            .update(&db, &[("code", Value::from("all"))])
            .await
            .unwrap();
        assert_eq!(
            db.statements()[0],
            "UPDATE \"permissions\" SET \"code\" = ? WHERE \"id\" IN (SELECT \"permissions\".\"id\" \
             FROM \"permissions\" INNER JOIN \"designations\" AS \"designation\" \
             ON \"designation\".\"id\" = \"permissions\".\"designation_id\" \
             WHERE \"designation\".\"title\" = ?)"
        );
    }

    #[tokio::test]
    async fn test_update_without_fields_is_noop() {
        let db = RecordingExecutor::new();
        assert_eq!(users().all().update(&db, &[]).await.unwrap(), 0);
        assert!(db.statements().is_empty());
    }

    #[tokio::test]
    async fn test_delete_scoped_by_filter() {
        let db = RecordingExecutor::new();
        users().filter(Q::filter("language", "COBOL")).delete(&db).await.unwrap();
        assert_eq!(db.statements()[0], "DELETE FROM \"users\" WHERE \"language\" = ?");
    }

    #[tokio::test]
    async fn test_count_and_exists() {
        let db = RecordingExecutor::new();
        let qs = users().filter(Q::filter("language", "en"));
        db.push(vec![Row::from_pairs([("c", Value::Int(2))])]);
        db.push(vec![Row::from_pairs([("e", Value::Int(1))])]);
        assert_eq!(qs.count(&db).await.unwrap(), 2);
        assert!(qs.exists(&db).await.unwrap());
        assert!(!qs.exists(&db).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_or_create_flow() {
        let db = RecordingExecutor::new();
        let qs = users().all();
        let filters = [("name", Value::from("Ada")), ("language__iexact", Value::from("EN"))];
        let defaults = [("language", Value::from("en"))];

        let (created, was_created) = qs.get_or_create(&db, &filters, &defaults).await.unwrap();
        assert!(was_created);
        assert_eq!(created.language, "en");

        db.push(vec![testing::user_row(1, "Ada", "en")]);
        let (found, was_created) = qs.get_or_create(&db, &filters, &defaults).await.unwrap();
        assert!(!was_created);
        assert_eq!(found.id, created.id);
    }

    #[tokio::test]
    async fn test_update_or_create_updates_existing() {
        let db = RecordingExecutor::new();
        db.push(vec![testing::user_row(1, "Ada", "en")]);
        db.push(vec![testing::user_row(1, "Ada", "fr")]);
        let (user, created) = users()
            .all()
            .update_or_create(&db, &[("name", Value::from("Ada"))], &[("language", Value::from("fr"))])
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(user.language, "fr");
        assert!(db.statements()[1].starts_with("UPDATE \"users\" SET \"language\" = ?"));
    }

    #[tokio::test]
    async fn test_contains_requires_pk() {
        let db = RecordingExecutor::new();
        let unsaved = User {
            id: None,
            name: "Ada".into(),
            language: "en".into(),
            password: None,
        };
        let err = users().all().contains(&db, &unsaved).await.unwrap_err();
        assert!(matches!(err, QuarryError::Precondition(_)));

        db.push(vec![Row::from_pairs([("e", Value::Bool(true))])]);
        let saved = User { id: Some(3), ..unsaved };
        assert!(users().all().contains(&db, &saved).await.unwrap());
    }

    #[test]
    fn test_select_related_nested_columns() {
        let qs = permissions().all().select_related(&["designation__user"]);
        let statement = qs.statement().unwrap();
        assert_eq!(statement.joins.len(), 2);
        let sql = select_sql(&qs);
        assert!(sql.contains("\"designation\".\"title\" AS \"designation__title\""));
        assert!(sql.contains("\"designation__user\".\"name\" AS \"designation__user__name\""));

        let row = Row::from_pairs([
            ("id", Value::Int(10)),
            ("designation__id", Value::Int(5)),
            ("designation__user__id", Value::Int(1)),
            ("designation__user__name", Value::from("Ada")),
        ]);
        let user = row.related("designation").and_then(|d| d.related("user")).unwrap();
        assert_eq!(user.get::<String>("name").unwrap(), "Ada");
    }

    #[tokio::test]
    async fn test_related_all_through_pivot() {
        let db = RecordingExecutor::new();
        db.push(vec![
            Row::from_pairs([
                ("id", Value::Int(1)),
                ("student_id", Value::Int(1)),
                ("course_id", Value::Int(7)),
                ("course__id", Value::Int(7)),
                ("course__title", Value::from("Rust")),
            ]),
            Row::from_pairs([
                ("id", Value::Int(2)),
                ("student_id", Value::Int(1)),
                ("course_id", Value::Int(8)),
                ("course__id", Value::Int(8)),
                ("course__title", Value::from("SQL")),
            ]),
        ]);
        let enrollments: Manager<Enrollment> =
            Manager::with_settings(testing::registry(), OrmSettings::default());
        let courses = enrollments
            .filter(Q::filter("student", 1_i64))
            .related_all::<Course>(&db)
            .await
            .unwrap();
        let ids: Vec<_> = courses.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![Some(7), Some(8)]);
        assert!(db.statements()[0].contains("GROUP BY \"enrollments\".\"course_id\""));

        let err = enrollments.all().related_all::<User>(&db).await.unwrap_err();
        assert!(matches!(err, QuarryError::Precondition(_)));
    }
}
