//! Lookup keywords, filter paths and `Q` objects.
//!
//! A filter is written as a path plus an operand: `"designation__user__name__icontains"`
//! with `"ada"`. [`split_path`] separates the relationship segments, the
//! terminal field and the [`LookupKind`]; [`Lookup::build`] validates the
//! operand for that kind and prepares pattern values for `LIKE`.
//!
//! # Examples
//!
//! ```
//! use quarry_db::query::lookups::{split_path, LookupKind, Q};
//!
//! let path = split_path("designation__user__name__icontains", "__");
//! assert_eq!(path.related, vec!["designation", "user"]);
//! assert_eq!(path.field, "name");
//! assert_eq!(path.kind, LookupKind::IContains);
//!
//! // name = "Ada" AND NOT (language = "COBOL")
//! let q = Q::filter("name", "Ada") & !Q::filter("language", "COBOL");
//! assert_eq!(q.paths(), vec!["name", "language"]);
//! ```

use std::ops;

use quarry_core::{QuarryResult, ValidationError};

use crate::model::Model;
use crate::value::Value;

/// The operator named by the final segment of a filter path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKind {
    /// `field = value`
    Exact,
    /// Case-insensitive equality.
    IExact,
    /// Substring match.
    Contains,
    /// Case-insensitive substring match.
    IContains,
    /// Prefix match.
    StartsWith,
    /// Case-insensitive prefix match.
    IStartsWith,
    /// Suffix match.
    EndsWith,
    /// Case-insensitive suffix match.
    IEndsWith,
    /// `field > value`
    Gt,
    /// `field >= value`
    Gte,
    /// `field < value`
    Lt,
    /// `field <= value`
    Lte,
    /// Membership in a list.
    In,
    /// NULL test; the operand is a boolean.
    IsNull,
    /// Inclusive range; the operand is a two-item list.
    Range,
}

impl LookupKind {
    const ALL: [Self; 15] = [
        Self::Exact,
        Self::IExact,
        Self::Contains,
        Self::IContains,
        Self::StartsWith,
        Self::IStartsWith,
        Self::EndsWith,
        Self::IEndsWith,
        Self::Gt,
        Self::Gte,
        Self::Lt,
        Self::Lte,
        Self::In,
        Self::IsNull,
        Self::Range,
    ];

    /// Parses a lookup keyword such as `"icontains"`.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.keyword() == keyword)
    }

    /// Returns the keyword used in filter paths.
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::IExact => "iexact",
            Self::Contains => "contains",
            Self::IContains => "icontains",
            Self::StartsWith => "startswith",
            Self::IStartsWith => "istartswith",
            Self::EndsWith => "endswith",
            Self::IEndsWith => "iendswith",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
            Self::IsNull => "isnull",
            Self::Range => "range",
        }
    }

    /// Returns `true` for the `LIKE`-based kinds.
    pub const fn is_pattern(self) -> bool {
        matches!(
            self,
            Self::Contains
                | Self::IContains
                | Self::StartsWith
                | Self::IStartsWith
                | Self::EndsWith
                | Self::IEndsWith
        )
    }

    /// Returns `true` for the case-insensitive kinds.
    pub const fn is_case_insensitive(self) -> bool {
        matches!(
            self,
            Self::IExact | Self::IContains | Self::IStartsWith | Self::IEndsWith
        )
    }
}

/// A filter path split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupPath {
    /// Relationship segments walked before the terminal field.
    pub related: Vec<String>,
    /// The terminal field (or column) name.
    pub field: String,
    /// The lookup operator.
    pub kind: LookupKind,
}

/// Splits `path` on `separator`.
///
/// The last segment is taken as the operator when it is a lookup keyword
/// and something precedes it; otherwise the operator is `exact`.
pub fn split_path(path: &str, separator: &str) -> LookupPath {
    let mut segments: Vec<&str> = path.split(separator).collect();
    let kind = match segments.as_slice() {
        [_, .., last] => LookupKind::from_keyword(last),
        _ => None,
    };
    if kind.is_some() {
        segments.pop();
    }
    let field = segments.pop().unwrap_or_default().to_string();
    LookupPath {
        related: segments.into_iter().map(str::to_string).collect(),
        field,
        kind: kind.unwrap_or(LookupKind::Exact),
    }
}

/// The right-hand side of a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A plain value.
    Value(Value),
    /// An entity; its primary key is compared.
    Entity {
        /// The entity's model name.
        model: &'static str,
        /// The entity's primary key, `None` if unsaved.
        pk: Option<Value>,
    },
}

/// A composable filter tree.
///
/// Combine with `&` (AND), `|` (OR) and `!` (NOT).
#[derive(Debug, Clone, PartialEq)]
pub enum Q {
    /// A single `path = operand` condition.
    Filter {
        /// The filter path, e.g. `"user__name__startswith"`.
        path: String,
        /// The compared operand.
        operand: Operand,
    },
    /// Logical AND of multiple conditions.
    And(Vec<Q>),
    /// Logical OR of multiple conditions.
    Or(Vec<Q>),
    /// Logical negation of a condition.
    Not(Box<Q>),
}

impl Q {
    /// Creates a filter comparing `path` with a value.
    pub fn filter(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Filter {
            path: path.into(),
            operand: Operand::Value(value.into()),
        }
    }

    /// Creates a filter comparing `path` with an entity's primary key.
    pub fn entity<M: Model>(path: impl Into<String>, entity: &M) -> Self {
        Self::Filter {
            path: path.into(),
            operand: Operand::Entity {
                model: M::model_name(),
                pk: entity.pk(),
            },
        }
    }

    /// An empty conjunction, matching every row.
    pub const fn all() -> Self {
        Self::And(Vec::new())
    }

    /// Returns `true` for an empty AND or OR.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::And(children) | Self::Or(children) => children.is_empty(),
            _ => false,
        }
    }

    /// Returns every filter path in the tree, left to right.
    pub fn paths(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Filter { path, .. } => out.push(path),
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.collect_paths(out);
                }
            }
            Self::Not(inner) => inner.collect_paths(out),
        }
    }
}

impl ops::BitAnd for Q {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), other) => {
                left.push(other);
                Self::And(left)
            }
            (other, Self::And(mut right)) => {
                right.insert(0, other);
                Self::And(right)
            }
            (left, right) => Self::And(vec![left, right]),
        }
    }
}

impl ops::BitOr for Q {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Self::Or(mut left), Self::Or(right)) => {
                left.extend(right);
                Self::Or(left)
            }
            (Self::Or(mut left), other) => {
                left.push(other);
                Self::Or(left)
            }
            (other, Self::Or(mut right)) => {
                right.insert(0, other);
                Self::Or(right)
            }
            (left, right) => Self::Or(vec![left, right]),
        }
    }
}

impl ops::Not for Q {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }
}

/// A validated comparison ready for SQL rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Equality; `Exact(Null)` renders as `IS NULL`.
    Exact(Value),
    /// Case-insensitive equality.
    IExact(Value),
    /// A `LIKE` match against a fully wrapped pattern.
    Like {
        /// The pattern including `%` markers.
        pattern: String,
        /// Whether the match ignores case.
        case_insensitive: bool,
    },
    /// Greater than.
    Gt(Value),
    /// Greater than or equal.
    Gte(Value),
    /// Less than.
    Lt(Value),
    /// Less than or equal.
    Lte(Value),
    /// Membership test.
    In(Vec<Value>),
    /// `IS NULL` when `true`, `IS NOT NULL` when `false`.
    IsNull(bool),
    /// Inclusive range.
    Range(Value, Value),
}

impl Lookup {
    /// Validates `value` for `kind` and builds the lookup.
    ///
    /// For pattern kinds the value is escaped with `escape` when it holds a
    /// wildcard; the returned flag carries the escape character in that case.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` keyed by `path` when the operand does not
    /// fit the operator: `in` needs a list, `range` a two-item list, `isnull`
    /// a boolean, and pattern kinds a non-null scalar.
    pub fn build(
        kind: LookupKind,
        value: Value,
        escape: char,
        path: &str,
    ) -> QuarryResult<(Self, Option<char>)> {
        let invalid = |message: String| ValidationError::for_field(path, message, "invalid_lookup");
        let lookup = match kind {
            LookupKind::Exact => Self::Exact(value),
            LookupKind::IExact => Self::IExact(value),
            LookupKind::Gt => Self::Gt(value),
            LookupKind::Gte => Self::Gte(value),
            LookupKind::Lt => Self::Lt(value),
            LookupKind::Lte => Self::Lte(value),
            LookupKind::In => match value {
                Value::List(items) => Self::In(items),
                other => {
                    return Err(invalid(format!(
                        "'in' lookup expects a list, got {}",
                        other.type_name()
                    ))
                    .into())
                }
            },
            LookupKind::Range => match value {
                Value::List(items) => match <[Value; 2]>::try_from(items) {
                    Ok([low, high]) => Self::Range(low, high),
                    Err(_) => {
                        return Err(
                            invalid("'range' lookup expects a list of two values".into()).into()
                        )
                    }
                },
                other => {
                    return Err(invalid(format!(
                        "'range' lookup expects a list, got {}",
                        other.type_name()
                    ))
                    .into())
                }
            },
            LookupKind::IsNull => match value {
                Value::Bool(b) => Self::IsNull(b),
                other => {
                    return Err(invalid(format!(
                        "'isnull' lookup expects a boolean, got {}",
                        other.type_name()
                    ))
                    .into())
                }
            },
            pattern_kind => {
                let raw = match value {
                    Value::String(s) => s,
                    Value::Null | Value::List(_) | Value::Bytes(_) | Value::Json(_) => {
                        return Err(invalid(format!(
                            "'{}' lookup expects text, got {}",
                            pattern_kind.keyword(),
                            value.type_name()
                        ))
                        .into())
                    }
                    other => other.to_string(),
                };
                let (escaped, flagged) = escape_like(&raw, escape);
                let pattern = match pattern_kind {
                    LookupKind::StartsWith | LookupKind::IStartsWith => format!("{escaped}%"),
                    LookupKind::EndsWith | LookupKind::IEndsWith => format!("%{escaped}"),
                    _ => format!("%{escaped}%"),
                };
                let lookup = Self::Like {
                    pattern,
                    case_insensitive: pattern_kind.is_case_insensitive(),
                };
                return Ok((lookup, flagged.then_some(escape)));
            }
        };
        Ok((lookup, None))
    }
}

/// Escapes `LIKE` wildcards in `raw`.
///
/// Only values containing `%` or `_` are rewritten; the escape character
/// itself is doubled in that case so it cannot swallow the next character.
/// Returns the value and whether anything was escaped.
pub fn escape_like(raw: &str, escape: char) -> (String, bool) {
    if !raw.contains(['%', '_']) {
        return (raw.to_string(), false);
    }
    let mut out = String::with_capacity(raw.len() + 4);
    for c in raw.chars() {
        if c == '%' || c == '_' || c == escape {
            out.push(escape);
        }
        out.push(c);
    }
    (out, true)
}
