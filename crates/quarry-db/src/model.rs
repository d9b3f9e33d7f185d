//! Model trait and metadata.
//!
//! [`Model`] connects a Rust type to its table: static [`ModelMeta`], the
//! primary key of an instance, its field values, and construction from a
//! [`Row`]. [`ModelMeta`] is declared once per type, typically in a
//! `LazyLock`, and registered with a
//! [`RegistryBuilder`](crate::registry::RegistryBuilder).

use quarry_core::QuarryResult;

use crate::fields::FieldDef;
use crate::row::Row;
use crate::value::Value;

/// The core trait for all models.
///
/// # Examples
///
/// ```
/// use std::sync::LazyLock;
/// use quarry_core::QuarryResult;
/// use quarry_db::fields::{FieldDef, FieldType};
/// use quarry_db::model::{Model, ModelMeta};
/// use quarry_db::row::Row;
/// use quarry_db::value::Value;
///
/// struct User {
///     id: Option<i64>,
///     name: String,
/// }
///
/// impl Model for User {
///     fn meta() -> &'static ModelMeta {
///         static META: LazyLock<ModelMeta> = LazyLock::new(|| {
///             ModelMeta::new("User", "users", vec![
///                 FieldDef::new("id", FieldType::BigAutoField).primary_key(),
///                 FieldDef::new("name", FieldType::CharField).max_length(100),
///             ])
///         });
///         &META
///     }
///
///     fn pk(&self) -> Option<Value> {
///         self.id.map(Value::Int)
///     }
///
///     fn field_values(&self) -> Vec<(&'static str, Value)> {
///         vec![("id", self.id.into()), ("name", self.name.clone().into())]
///     }
///
///     fn from_row(row: &Row) -> QuarryResult<Self> {
///         Ok(Self { id: row.get("id")?, name: row.get("name")? })
///     }
/// }
///
/// assert_eq!(User::table_name(), "users");
/// assert_eq!(User::pk_field_name(), "id");
/// ```
pub trait Model: Send + Sync + Sized + 'static {
    /// Returns the static metadata for this model type.
    fn meta() -> &'static ModelMeta;

    /// Returns the primary key value, or `None` if unsaved.
    fn pk(&self) -> Option<Value>;

    /// Returns all field name-value pairs for this instance, keyed by field
    /// name. Relationship fields carry the related primary key.
    fn field_values(&self) -> Vec<(&'static str, Value)>;

    /// Constructs a model instance from a result row.
    ///
    /// Root columns are read by column name; related entities joined with
    /// `select_related` are reached through [`Row::related`].
    fn from_row(row: &Row) -> QuarryResult<Self>;

    /// Returns the model name used for registry lookups.
    fn model_name() -> &'static str {
        Self::meta().name
    }

    /// Returns the database table name.
    fn table_name() -> &'static str {
        Self::meta().db_table.as_str()
    }

    /// Returns the name of the primary key field.
    fn pk_field_name() -> &'static str {
        Self::meta().pk_field().map_or("id", |f| f.name)
    }
}

/// Marks a model as a many-to-many pivot.
#[derive(Debug, Clone)]
pub struct PivotMeta {
    /// The relationship field leading to the "other side" of the pivot.
    pub related_field: &'static str,
}

/// Metadata about a model.
#[derive(Debug)]
pub struct ModelMeta {
    /// The model name (e.g. "User"), used as relationship target.
    pub name: &'static str,
    /// The database table name.
    pub db_table: String,
    /// Field definitions, in column order.
    pub fields: Vec<FieldDef>,
    /// Set when this model is a many-to-many pivot.
    pub pivot: Option<PivotMeta>,
}

impl ModelMeta {
    /// Creates metadata for a regular model.
    pub fn new(name: &'static str, db_table: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            name,
            db_table: db_table.into(),
            fields,
            pivot: None,
        }
    }

    /// Marks this model as a pivot whose far side is `related_field`.
    #[must_use]
    pub fn pivot(mut self, related_field: &'static str) -> Self {
        self.pivot = Some(PivotMeta { related_field });
        self
    }

    /// Returns the primary key field.
    pub fn pk_field(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Looks up a field by attribute name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a field by attribute name, falling back to column name.
    pub fn field_or_column(&self, name: &str) -> Option<&FieldDef> {
        self.get_field(name)
            .or_else(|| self.fields.iter().find(|f| f.column == name))
    }

    /// Returns the string-typed fields, in declaration order.
    pub fn text_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.is_text())
    }

    /// Returns the relationship fields pointing at `target`.
    pub fn relations_to<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a FieldDef> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.target_model() == Some(target))
    }
}
