//! Clause compilation.
//!
//! [`ClauseCompiler`] turns a [`Q`] tree into a backend-neutral
//! [`WhereNode`]. Each filter path is split into relationship segments,
//! terminal field and operator; the segments are checked against the
//! relationship graph and become the column's table alias, so a predicate
//! on `designation__user__name` reads the `name` column of the table joined
//! as `designation__user`.

use quarry_core::{OrmSettings, QuarryError, QuarryResult};

use crate::registry::{Registry, Relation};
use crate::row::RELATED_SEPARATOR;

use super::lookups::{split_path, Lookup, Operand, Q};
use super::resolver::Resolver;
use super::statement::SelectStatement;

/// A column on the root table (`alias == None`) or on a joined table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    /// The join alias, i.e. the dotted relationship path.
    pub alias: Option<String>,
    /// The column name.
    pub column: String,
}

impl ColumnRef {
    /// A column on the root table.
    pub fn root(column: impl Into<String>) -> Self {
        Self {
            alias: None,
            column: column.into(),
        }
    }

    /// A column on the table joined as `alias`.
    pub fn joined(alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
            column: column.into(),
        }
    }

    /// The name this column carries in a result row.
    pub fn result_name(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{alias}{RELATED_SEPARATOR}{}", self.column),
            None => self.column.clone(),
        }
    }
}

/// A compiled `(column, operator, value)` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// The compared column.
    pub column: ColumnRef,
    /// The validated comparison.
    pub lookup: Lookup,
    /// Set when the pattern was escaped; the backend must declare it.
    pub escape: Option<char>,
}

impl Predicate {
    /// Returns `true` if the pattern carries escaped wildcards.
    pub const fn is_escaped(&self) -> bool {
        self.escape.is_some()
    }
}

/// A node of a compiled WHERE clause.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereNode {
    /// A single condition.
    Predicate(Predicate),
    /// Logical AND; empty is always true.
    And(Vec<WhereNode>),
    /// Logical OR; empty is always false.
    Or(Vec<WhereNode>),
    /// Logical negation.
    Not(Box<WhereNode>),
    /// `column IN (SELECT ...)`, used to scope writes through joins.
    InSubquery {
        /// The outer column.
        column: ColumnRef,
        /// The inner query, selecting one column.
        query: Box<SelectStatement>,
    },
}

impl WhereNode {
    /// Conjoins `nodes`, returning `None` when there are none.
    pub fn conjoin(mut nodes: Vec<Self>) -> Option<Self> {
        match nodes.len() {
            0 => None,
            1 => nodes.pop(),
            _ => Some(Self::And(nodes)),
        }
    }

    /// Returns every predicate in the tree, left to right.
    pub fn predicates(&self) -> Vec<&Predicate> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Predicate>) {
        match self {
            Self::Predicate(p) => out.push(p),
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.collect(out);
                }
            }
            Self::Not(inner) => inner.collect(out),
            Self::InSubquery { .. } => {}
        }
    }
}

/// Compiles filter trees for one model.
#[derive(Debug, Clone, Copy)]
pub struct ClauseCompiler<'a> {
    registry: &'a Registry,
    model: &'static str,
    orm: &'a OrmSettings,
}

impl<'a> ClauseCompiler<'a> {
    /// Creates a compiler rooted at `model`.
    pub const fn new(registry: &'a Registry, model: &'static str, orm: &'a OrmSettings) -> Self {
        Self {
            registry,
            model,
            orm,
        }
    }

    /// Compiles `q`; with `exclude` the result is negated as a whole.
    ///
    /// # Errors
    ///
    /// Fails on the first unresolvable segment or field, on an operand that
    /// does not fit its operator, and on an unsaved entity operand.
    pub fn compile(&self, q: &Q, exclude: bool) -> QuarryResult<WhereNode> {
        self.compile_with_joins(q, exclude).map(|(node, _)| node)
    }

    /// Like [`compile`](Self::compile), also returning the relationship
    /// paths the predicates read from, in the order they appear.
    pub fn compile_with_joins(
        &self,
        q: &Q,
        exclude: bool,
    ) -> QuarryResult<(WhereNode, Vec<Vec<String>>)> {
        let mut joins = Vec::new();
        let node = self.compile_node(q, &mut joins)?;
        let node = if exclude {
            WhereNode::Not(Box::new(node))
        } else {
            node
        };
        Ok((node, joins))
    }

    fn compile_node(&self, q: &Q, joins: &mut Vec<Vec<String>>) -> QuarryResult<WhereNode> {
        match q {
            Q::Filter { path, operand } => self.compile_filter(path, operand, joins),
            Q::And(children) => Ok(WhereNode::And(
                children
                    .iter()
                    .map(|c| self.compile_node(c, joins))
                    .collect::<QuarryResult<_>>()?,
            )),
            Q::Or(children) => Ok(WhereNode::Or(
                children
                    .iter()
                    .map(|c| self.compile_node(c, joins))
                    .collect::<QuarryResult<_>>()?,
            )),
            Q::Not(inner) => Ok(WhereNode::Not(Box::new(self.compile_node(inner, joins)?))),
        }
    }

    fn compile_filter(
        &self,
        path: &str,
        operand: &Operand,
        joins: &mut Vec<Vec<String>>,
    ) -> QuarryResult<WhereNode> {
        let parts = split_path(path, &self.orm.lookup_separator);
        let (related, column) = self.column_for(parts.related, &parts.field)?;

        let value = match operand {
            Operand::Value(v) => v.clone(),
            Operand::Entity { model, pk } => pk.clone().ok_or_else(|| {
                QuarryError::Precondition(format!(
                    "cannot filter '{path}' by an unsaved {model} instance"
                ))
            })?,
        };

        let (lookup, escape) = Lookup::build(parts.kind, value, self.orm.like_escape, path)?;
        if !related.is_empty() && !joins.contains(&related) {
            joins.push(related);
        }
        Ok(WhereNode::Predicate(Predicate {
            column,
            lookup,
            escape,
        }))
    }

    /// Resolves a bare field path (no operator) to a column.
    ///
    /// Returns the relationship segments alongside the column so callers can
    /// make sure the matching join is planned.
    pub fn resolve_column(&self, path: &str) -> QuarryResult<(Vec<String>, ColumnRef)> {
        let mut segments: Vec<String> = path
            .split(self.orm.lookup_separator.as_str())
            .map(str::to_string)
            .collect();
        let field = segments.pop().unwrap_or_default();
        self.column_for(segments, &field)
    }

    /// Finds the column `field` names on the model reached through
    /// `related`. A path ending on a reverse relationship reads the related
    /// model's `default_related_lookup_field` through one more join.
    fn column_for(
        &self,
        mut related: Vec<String>,
        field: &str,
    ) -> QuarryResult<(Vec<String>, ColumnRef)> {
        let resolver = Resolver::new(self.registry);
        let target = if related.is_empty() {
            self.model
        } else {
            resolver.resolve(self.model, &related)?.target
        };

        let meta = self.registry.model(target)?;
        let field_name = if field == "pk" {
            self.registry.primary_key_name(target)?
        } else {
            field
        };

        let (owner_meta, column_field) = match meta.field_or_column(field_name) {
            Some(def) => (meta, def.name),
            None if matches!(
                self.registry.relation(target, field_name),
                Some(Relation::Reverse { .. })
            ) =>
            {
                related.push(field_name.to_string());
                let owner = resolver.resolve(self.model, &related)?.target;
                let owner_meta = self.registry.model(owner)?;
                (owner_meta, self.orm.default_related_lookup_field.as_str())
            }
            None => return Err(QuarryError::unresolved(target, field_name)),
        };

        let def = owner_meta
            .field_or_column(column_field)
            .ok_or_else(|| QuarryError::unresolved(owner_meta.name, column_field))?;
        let column = if related.is_empty() {
            ColumnRef::root(def.column.clone())
        } else {
            ColumnRef::joined(related.join(RELATED_SEPARATOR), def.column.clone())
        };
        Ok((related, column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use crate::value::Value;

    fn compile(model: &'static str, q: &Q) -> QuarryResult<WhereNode> {
        let registry = testing::registry();
        let orm = OrmSettings::default();
        ClauseCompiler::new(&registry, model, &orm).compile(q, false)
    }

    fn single(node: &WhereNode) -> &Predicate {
        let preds = node.predicates();
        assert_eq!(preds.len(), 1);
        preds[0]
    }

    #[test]
    fn test_root_column() {
        let node = compile("User", &Q::filter("name", "Ada")).unwrap();
        let p = single(&node);
        assert_eq!(p.column, ColumnRef::root("name"));
        assert_eq!(p.lookup, Lookup::Exact(Value::from("Ada")));
    }

    #[test]
    fn test_joined_column() {
        let node = compile("Permission", &Q::filter("designation__user__name__icontains", "ad"))
            .unwrap();
        let p = single(&node);
        assert_eq!(p.column, ColumnRef::joined("designation__user", "name"));
        assert!(matches!(p.lookup, Lookup::Like { case_insensitive: true, .. }));
    }

    #[test]
    fn test_pk_alias() {
        let node = compile("Permission", &Q::filter("pk__in", Value::list([1_i64, 2]))).unwrap();
        assert_eq!(single(&node).column, ColumnRef::root("id"));
    }

    #[test]
    fn test_relation_field_uses_fk_column() {
        let node = compile("Permission", &Q::filter("designation", 3_i64)).unwrap();
        assert_eq!(single(&node).column, ColumnRef::root("designation_id"));
        let node = compile("Permission", &Q::filter("designation_id", 3_i64)).unwrap();
        assert_eq!(single(&node).column, ColumnRef::root("designation_id"));
    }

    #[test]
    fn test_escape_flag() {
        let node = compile("User", &Q::filter("name__contains", "50%_off")).unwrap();
        let p = single(&node);
        assert!(p.is_escaped());
        assert!(matches!(&p.lookup, Lookup::Like { pattern, .. } if pattern == r"%50\%\_off%"));

        let node = compile("User", &Q::filter("name__contains", "plain")).unwrap();
        assert!(!single(&node).is_escaped());
    }

    #[test]
    fn test_entity_operand() {
        let user = testing::User {
            id: Some(9),
            name: "Ada".into(),
            language: "en".into(),
            password: None,
        };
        let node = compile("Designation", &Q::entity("user", &user)).unwrap();
        assert_eq!(single(&node).lookup, Lookup::Exact(Value::Int(9)));

        let unsaved = testing::User { id: None, ..user };
        let err = compile("Designation", &Q::entity("user", &unsaved)).unwrap_err();
        assert!(matches!(err, QuarryError::Precondition(_)));
    }

    #[test]
    fn test_exclude_negates() {
        let registry = testing::registry();
        let orm = OrmSettings::default();
        let node = ClauseCompiler::new(&registry, "User", &orm)
            .compile(&(Q::filter("name", "a") | Q::filter("name", "b")), true)
            .unwrap();
        assert!(matches!(node, WhereNode::Not(inner) if matches!(*inner, WhereNode::Or(_))));
    }

    #[test]
    fn test_unknown_field() {
        let err = compile("User", &Q::filter("nickname", "x")).unwrap_err();
        assert!(matches!(
            err,
            QuarryError::UnresolvedPath { ref segment, .. } if segment == "nickname"
        ));
    }

    #[test]
    fn test_unknown_relation() {
        let err = compile("User", &Q::filter("team__name", "x")).unwrap_err();
        assert!(err.to_string().contains("team"));
    }

    #[test]
    fn test_resolve_column() {
        let registry = testing::registry();
        let orm = OrmSettings::default();
        let compiler = ClauseCompiler::new(&registry, "Permission", &orm);
        let (related, column) = compiler.resolve_column("designation__title").unwrap();
        assert_eq!(related, vec!["designation"]);
        assert_eq!(column.result_name(), "designation__title");
        let (related, column) = compiler.resolve_column("pk").unwrap();
        assert!(related.is_empty());
        assert_eq!(column, ColumnRef::root("id"));
    }

    #[test]
    fn test_reverse_terminal_reads_related_key() {
        let registry = testing::registry();
        let orm = OrmSettings::default();
        let (node, joins) = ClauseCompiler::new(&registry, "Designation", &orm)
            .compile_with_joins(&Q::filter("permissions__in", Value::list([5_i64])), false)
            .unwrap();
        assert_eq!(single(&node).column, ColumnRef::joined("permissions", "id"));
        assert_eq!(joins, vec![vec!["permissions".to_string()]]);
    }

    #[test]
    fn test_join_paths_deduplicated() {
        let registry = testing::registry();
        let orm = OrmSettings::default();
        let q = Q::filter("designation__title", "a") | Q::filter("designation__title", "b");
        let (_, joins) = ClauseCompiler::new(&registry, "Permission", &orm)
            .compile_with_joins(&q, false)
            .unwrap();
        assert_eq!(joins, vec![vec!["designation".to_string()]]);
    }

    #[test]
    fn test_conjoin() {
        assert!(WhereNode::conjoin(Vec::new()).is_none());
        let one = WhereNode::And(Vec::new());
        assert_eq!(WhereNode::conjoin(vec![one.clone()]), Some(one));
    }
}
