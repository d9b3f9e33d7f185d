//! Relationship path resolution.
//!
//! A relationship path such as `["designation", "user"]` is walked left to
//! right over the registry's relation tables. Each segment is classified in
//! one step as a forward relationship, a reverse relationship, or neither
//! ([`Resolution`]); forward wins when both exist. Every step contributes one
//! [`Join`] whose alias is the dotted prefix walked so far, so later joins
//! can reference the tables introduced by earlier ones and two paths that
//! share a prefix share its joins.
//!
//! Reverse steps into a model that declares several foreign keys to the
//! current table are disambiguated by related name.

use quarry_core::{QuarryError, QuarryResult};
use tracing::warn;

use crate::fields::FieldDef;
use crate::registry::{default_related_name, Registry, Relation};
use crate::row::RELATED_SEPARATOR;

/// The outcome of classifying one path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A relationship field on the current model.
    Forward {
        /// The relationship field name.
        field: &'static str,
        /// The model it points at.
        target: &'static str,
    },
    /// A relationship declared on `owner` that points at the current model.
    Reverse {
        /// The declaring model.
        owner: &'static str,
        /// Every foreign key on `owner` targeting the current model.
        candidates: Vec<Disambiguation>,
    },
    /// Neither a relationship field nor a related name.
    Unresolved,
}

/// One candidate foreign key when several point at the same table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disambiguation {
    /// The foreign-key field on the owning model.
    pub field: &'static str,
    /// The table the foreign key targets.
    pub table: String,
    /// The related name that selects this foreign key.
    pub related_name: String,
}

/// SQL join type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `INNER JOIN`
    Inner,
    /// `LEFT JOIN`
    Left,
}

impl JoinKind {
    /// Returns the SQL keyword for this join type.
    pub const fn sql_keyword(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
        }
    }
}

/// One join produced by path resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    /// The dotted path prefix, used as the table alias.
    pub alias: String,
    /// The joined table.
    pub table: String,
    /// The join type.
    pub kind: JoinKind,
    /// Alias of the table joined from; `None` for the root table.
    pub parent_alias: Option<String>,
    /// Column on the parent side of the ON condition.
    pub parent_column: String,
    /// Column on the joined side of the ON condition.
    pub column: String,
    /// The model behind the joined table.
    pub model: &'static str,
}

/// A fully walked relationship path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// The model reached by the last segment.
    pub target: &'static str,
    /// Joins in traversal order.
    pub joins: Vec<Join>,
    /// Candidate sets consulted at ambiguous reverse steps.
    pub disambiguations: Vec<Vec<Disambiguation>>,
}

/// Walks relationship paths against a [`Registry`].
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    registry: &'a Registry,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver over `registry`.
    pub const fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Classifies `segment` on `model`.
    pub fn resolve_segment(&self, model: &str, segment: &str) -> QuarryResult<Resolution> {
        Ok(match self.registry.relation(model, segment) {
            Some(&Relation::Forward { field, target }) => Resolution::Forward { field, target },
            Some(&Relation::Reverse { owner }) => Resolution::Reverse {
                owner,
                candidates: self.multiple_foreign_keys(owner, model)?,
            },
            Some(Relation::Scalar { .. }) | None => Resolution::Unresolved,
        })
    }

    /// Lists the foreign keys on `owner` that target `target`.
    pub fn multiple_foreign_keys(
        &self,
        owner: &str,
        target: &str,
    ) -> QuarryResult<Vec<Disambiguation>> {
        let owner_meta = self.registry.model(owner)?;
        let table = self.registry.table_for(target)?.name.clone();
        Ok(owner_meta
            .relations_to(target)
            .map(|f| Disambiguation {
                field: f.name,
                table: table.clone(),
                related_name: effective_related_name(owner, f),
            })
            .collect())
    }

    /// Walks `segments` from `model`.
    ///
    /// # Errors
    ///
    /// `UnresolvedPath` names the first segment that is neither a
    /// relationship field nor a related name; `AmbiguousRelationship` is
    /// returned when a related name matches more than one foreign key.
    pub fn resolve<S: AsRef<str>>(&self, model: &str, segments: &[S]) -> QuarryResult<ResolvedPath> {
        let mut current = self.registry.model(model)?.name;
        let mut joins: Vec<Join> = Vec::with_capacity(segments.len());
        let mut disambiguations = Vec::new();
        let mut outer = false;

        for (i, segment) in segments.iter().enumerate() {
            let segment = segment.as_ref();
            let alias = segments[..=i]
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<_>>()
                .join(RELATED_SEPARATOR);
            let parent_alias = joins.last().map(|j| j.alias.clone());

            let join = match self.resolve_segment(current, segment)? {
                Resolution::Forward { field, target } => {
                    let fk = self.field(current, field)?;
                    outer = outer || fk.is_nullable();
                    let table = self.registry.table_for(target)?;
                    Join {
                        alias,
                        table: table.name.clone(),
                        kind: if outer { JoinKind::Left } else { JoinKind::Inner },
                        parent_alias,
                        parent_column: fk.column.clone(),
                        column: table.primary_key.clone(),
                        model: target,
                    }
                }
                Resolution::Reverse { owner, candidates } => {
                    let mut matching = candidates.iter().filter(|c| c.related_name == segment);
                    let chosen = match (matching.next(), matching.next()) {
                        (Some(only), None) => only.field,
                        _ => {
                            warn!(model = owner, segment, "ambiguous reverse relationship");
                            return Err(QuarryError::AmbiguousRelationship {
                                model: owner.to_string(),
                                segment: segment.to_string(),
                                candidates: candidates.iter().map(|c| c.field.to_string()).collect(),
                            });
                        }
                    };
                    if candidates.len() > 1 {
                        disambiguations.push(candidates.clone());
                    }
                    outer = true;
                    let fk = self.field(owner, chosen)?;
                    Join {
                        alias,
                        table: self.registry.table_for(owner)?.name.clone(),
                        kind: JoinKind::Left,
                        parent_alias,
                        parent_column: self.registry.table_for(current)?.primary_key.clone(),
                        column: fk.column.clone(),
                        model: owner,
                    }
                }
                Resolution::Unresolved => {
                    warn!(model = current, segment, "unresolved relationship segment");
                    return Err(QuarryError::unresolved(current, segment));
                }
            };
            current = join.model;
            joins.push(join);
        }

        Ok(ResolvedPath {
            target: current,
            joins,
            disambiguations,
        })
    }

    fn field(&self, model: &str, name: &str) -> QuarryResult<&'static FieldDef> {
        self.registry
            .model(model)?
            .get_field(name)
            .ok_or_else(|| QuarryError::unresolved(model, name))
    }
}

fn effective_related_name(owner: &str, field: &FieldDef) -> String {
    field
        .related_name()
        .map_or_else(|| default_related_name(owner), ToString::to_string)
}

/// The de-duplicated join list for a set of relationship paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinPlan {
    joins: Vec<Join>,
}

impl JoinPlan {
    /// Resolves every path from `model` and merges their joins.
    ///
    /// Joins are keyed by alias, so each dotted prefix appears once, in the
    /// order it was first reached.
    pub fn from_paths<S: AsRef<str>>(
        registry: &Registry,
        model: &str,
        paths: &[Vec<S>],
    ) -> QuarryResult<Self> {
        let resolver = Resolver::new(registry);
        let mut plan = Self::default();
        for path in paths {
            for join in resolver.resolve(model, path)?.joins {
                if !plan.contains(&join.alias) {
                    plan.joins.push(join);
                }
            }
        }
        Ok(plan)
    }

    /// Returns `true` if a join with `alias` is planned.
    pub fn contains(&self, alias: &str) -> bool {
        self.joins.iter().any(|j| j.alias == alias)
    }

    /// Returns the planned joins.
    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    /// Consumes the plan, returning its joins.
    pub fn into_joins(self) -> Vec<Join> {
        self.joins
    }

    /// Returns `true` if nothing is joined.
    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }
}
