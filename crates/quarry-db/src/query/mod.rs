//! Query building, compilation, and execution.
//!
//! The pipeline runs bottom-up:
//!
//! - [`lookups`] - `Q` filter trees, lookup kinds and operand validation
//! - [`resolver`] - relationship paths to joins, including reverse names
//! - [`clause`] - `Q` trees to resolved predicate trees
//! - [`statement`] - backend-neutral SELECT/INSERT/UPDATE/DELETE values
//! - [`compiler`] - statements to parameterized SQL per backend
//! - [`queryset`] - the immutable, chainable `QuerySet` and its `Manager`

pub mod clause;
pub mod compiler;
pub mod lookups;
pub mod queryset;
pub mod resolver;
pub mod statement;

pub use clause::{ClauseCompiler, ColumnRef, Predicate, WhereNode};
pub use compiler::{DatabaseBackendType, SqlCompiler};
pub use lookups::{Lookup, LookupKind, Operand, Q};
pub use queryset::{Manager, QuerySet};
pub use resolver::{Disambiguation, Join, JoinKind, JoinPlan, Resolution, ResolvedPath, Resolver};
pub use statement::{OrderBy, SelectColumn, SelectStatement, Statement};
