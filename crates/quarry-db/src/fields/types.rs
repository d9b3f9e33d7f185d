//! Field type definitions.
//!
//! [`FieldType`] is the closed set of column kinds a model may declare and
//! [`FieldDef`] is the descriptor the query engine consumes: kind,
//! nullability, relationship target, cascade policy and related name.
//! Relationship fields are built through [`FieldDef::foreign_key`] and
//! [`FieldDef::one_to_one`], which validate their options up front.

use quarry_core::{QuarryError, QuarryResult, ValidationError};

use crate::validators::{
    EmailValidator, MaxLengthValidator, MaxValueValidator, MinValueValidator, Validator,
};
use crate::value::Value;

/// The type of a model field, determining its column type and coercion rules.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum FieldType {
    /// Auto-incrementing 32-bit integer primary key.
    AutoField,
    /// Auto-incrementing 64-bit integer primary key.
    BigAutoField,
    /// 32-bit signed integer.
    IntegerField,
    /// 64-bit signed integer.
    BigIntegerField,
    /// 64-bit floating-point number.
    FloatField,
    /// Boolean (true/false).
    BooleanField,
    /// Variable-length string, usually with a max length.
    CharField,
    /// Unlimited-length text.
    TextField,
    /// Email address (a `CharField` with email validation).
    EmailField,
    /// Date without time.
    DateField,
    /// Date and time.
    DateTimeField,
    /// Time without date.
    TimeField,
    /// UUID.
    UuidField,
    /// JSON document.
    JsonField,
    /// Raw binary data.
    BinaryField,
    /// Many-to-one relationship.
    ForeignKey {
        /// The target model name.
        to: String,
        /// Behavior when the referenced row is deleted.
        on_delete: OnDelete,
        /// Behavior when the referenced key is updated.
        on_update: OnDelete,
        /// The name used for the reverse relation.
        related_name: Option<String>,
    },
    /// One-to-one relationship (a unique foreign key).
    OneToOneField {
        /// The target model name.
        to: String,
        /// Behavior when the referenced row is deleted.
        on_delete: OnDelete,
        /// Behavior when the referenced key is updated.
        on_update: OnDelete,
        /// The name used for the reverse relation.
        related_name: Option<String>,
    },
}

/// Referential action for ON DELETE / ON UPDATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OnDelete {
    /// Propagate the change to referencing rows.
    Cascade,
    /// Refuse the change while referencing rows exist.
    Restrict,
    /// Set the foreign key to NULL.
    SetNull,
    /// Set the foreign key to its default value.
    SetDefault,
    /// Take no action.
    DoNothing,
}

impl OnDelete {
    /// Returns the SQL keyword for this action.
    pub const fn sql_keyword(self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::Restrict => "RESTRICT",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
            Self::DoNothing => "NO ACTION",
        }
    }
}

impl FieldType {
    /// Returns `true` for auto-incrementing primary key types.
    pub const fn is_auto(&self) -> bool {
        matches!(self, Self::AutoField | Self::BigAutoField)
    }

    /// Returns `true` for string-typed fields searched by `lookup`.
    pub const fn is_text(&self) -> bool {
        matches!(self, Self::CharField | Self::TextField | Self::EmailField)
    }

    /// Returns the SQLite column type used by test table setup.
    pub const fn sqlite_column_type(&self) -> &'static str {
        match self {
            Self::AutoField
            | Self::BigAutoField
            | Self::IntegerField
            | Self::BigIntegerField
            | Self::BooleanField
            | Self::ForeignKey { .. }
            | Self::OneToOneField { .. } => "INTEGER",
            Self::FloatField => "REAL",
            Self::BinaryField => "BLOB",
            Self::CharField
            | Self::TextField
            | Self::EmailField
            | Self::DateField
            | Self::DateTimeField
            | Self::TimeField
            | Self::UuidField
            | Self::JsonField => "TEXT",
        }
    }
}

/// Options for a relationship field, validated by [`FieldDef::foreign_key`].
#[derive(Debug, Clone)]
pub struct ForeignKeyOptions {
    /// Target model name.
    pub to: String,
    /// ON DELETE action. Defaults to `Cascade`.
    pub on_delete: OnDelete,
    /// ON UPDATE action. Defaults to `Cascade`.
    pub on_update: OnDelete,
    /// Name of the reverse relationship on the target model.
    pub related_name: Option<String>,
    /// Whether the foreign key column accepts NULL.
    pub null: bool,
    /// Explicit column name. Defaults to `<field>_id`.
    pub column: Option<String>,
}

impl ForeignKeyOptions {
    /// Creates options targeting `to` with cascading delete and update.
    pub fn new(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            on_delete: OnDelete::Cascade,
            on_update: OnDelete::Cascade,
            related_name: None,
            null: false,
            column: None,
        }
    }

    /// Sets the ON DELETE action.
    #[must_use]
    pub const fn on_delete(mut self, action: OnDelete) -> Self {
        self.on_delete = action;
        self
    }

    /// Sets the ON UPDATE action.
    #[must_use]
    pub const fn on_update(mut self, action: OnDelete) -> Self {
        self.on_update = action;
        self
    }

    /// Sets the reverse relationship name.
    #[must_use]
    pub fn related_name(mut self, name: impl Into<String>) -> Self {
        self.related_name = Some(name.into());
        self
    }

    /// Allows NULL in the foreign key column.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    /// Sets an explicit column name.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

/// Complete definition of a model field.
#[derive(Debug)]
pub struct FieldDef {
    /// The attribute name of this field.
    pub name: &'static str,
    /// The database column name (may differ from `name`).
    pub column: String,
    /// The type of this field.
    pub field_type: FieldType,
    /// Whether this field is the primary key.
    pub primary_key: bool,
    /// Whether NULL is allowed.
    pub null: bool,
    /// Default value for new rows.
    pub default: Option<Value>,
    /// Whether a UNIQUE constraint is applied.
    pub unique: bool,
    /// Maximum character length.
    pub max_length: Option<usize>,
    /// Inclusive lower bound for integer fields.
    pub min_value: Option<i64>,
    /// Inclusive upper bound for integer fields.
    pub max_value: Option<i64>,
    /// Whether the field is dropped from results by `exclude_secrets`.
    pub secret: bool,
    /// Refresh with the current time on every create and update.
    pub auto_now: bool,
    /// Fill with the current time on create.
    pub auto_now_add: bool,
    /// Custom validators run by [`clean`](Self::clean).
    pub validators: Vec<Box<dyn Validator>>,
}

impl FieldDef {
    /// Creates a new `FieldDef` with sensible defaults.
    pub fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            column: name.to_string(),
            field_type,
            primary_key: false,
            null: false,
            default: None,
            unique: false,
            max_length: None,
            min_value: None,
            max_value: None,
            secret: false,
            auto_now: false,
            auto_now_add: false,
            validators: Vec::new(),
        }
    }

    /// Builds a validated many-to-one relationship field.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the target is empty, or if a
    /// `SetNull` action is requested on a non-nullable column.
    ///
    /// # Examples
    ///
    /// ```
    /// use quarry_db::fields::{FieldDef, ForeignKeyOptions, OnDelete};
    ///
    /// let fk = FieldDef::foreign_key(
    ///     "author",
    ///     ForeignKeyOptions::new("User").related_name("articles"),
    /// )
    /// .unwrap();
    /// assert_eq!(fk.column, "author_id");
    ///
    /// let bad = FieldDef::foreign_key(
    ///     "editor",
    ///     ForeignKeyOptions::new("User").on_delete(OnDelete::SetNull),
    /// );
    /// assert!(bad.is_err());
    /// ```
    pub fn foreign_key(name: &'static str, options: ForeignKeyOptions) -> QuarryResult<Self> {
        Self::relation(name, options, false)
    }

    /// Builds a validated one-to-one relationship field.
    pub fn one_to_one(name: &'static str, options: ForeignKeyOptions) -> QuarryResult<Self> {
        Self::relation(name, options, true)
    }

    fn relation(name: &'static str, options: ForeignKeyOptions, one_to_one: bool) -> QuarryResult<Self> {
        if options.to.is_empty() {
            return Err(QuarryError::ConfigurationError(format!(
                "Relationship field '{name}' must name a target model"
            )));
        }
        for (clause, action) in [("on_delete", options.on_delete), ("on_update", options.on_update)] {
            if action == OnDelete::SetNull && !options.null {
                return Err(QuarryError::ConfigurationError(format!(
                    "Relationship field '{name}' uses {clause}=SET NULL but is not nullable"
                )));
            }
        }
        if options.related_name.as_deref() == Some("") {
            return Err(QuarryError::ConfigurationError(format!(
                "Relationship field '{name}' has an empty related_name"
            )));
        }

        let ForeignKeyOptions {
            to,
            on_delete,
            on_update,
            related_name,
            null,
            column,
        } = options;
        let field_type = if one_to_one {
            FieldType::OneToOneField {
                to,
                on_delete,
                on_update,
                related_name,
            }
        } else {
            FieldType::ForeignKey {
                to,
                on_delete,
                on_update,
                related_name,
            }
        };

        let mut field = Self::new(name, field_type);
        field.column = column.unwrap_or_else(|| format!("{name}_id"));
        field.null = null;
        field.unique = one_to_one;
        Ok(field)
    }

    /// Sets the database column name.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Marks this field as the primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Allows NULL values.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    /// Sets the maximum character length.
    #[must_use]
    pub const fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Sets the inclusive lower bound.
    #[must_use]
    pub const fn min_value(mut self, min: i64) -> Self {
        self.min_value = Some(min);
        self
    }

    /// Sets the inclusive upper bound.
    #[must_use]
    pub const fn max_value(mut self, max: i64) -> Self {
        self.max_value = Some(max);
        self
    }

    /// Sets the default value for new rows.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Marks this field as having a UNIQUE constraint.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks this field as secret.
    #[must_use]
    pub const fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    /// Refreshes this field with the current time on every write.
    #[must_use]
    pub const fn auto_now(mut self) -> Self {
        self.auto_now = true;
        self
    }

    /// Fills this field with the current time on create.
    #[must_use]
    pub const fn auto_now_add(mut self) -> Self {
        self.auto_now_add = true;
        self
    }

    /// Attaches a custom validator.
    #[must_use]
    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    // ── Descriptor interface ─────────────────────────────────────────

    /// Returns the field's type.
    pub const fn field_kind(&self) -> &FieldType {
        &self.field_type
    }

    /// Returns `true` if NULL is allowed.
    pub const fn is_nullable(&self) -> bool {
        self.null
    }

    /// Returns the target model name for relationship fields.
    pub fn target_model(&self) -> Option<&str> {
        match &self.field_type {
            FieldType::ForeignKey { to, .. } | FieldType::OneToOneField { to, .. } => Some(to),
            _ => None,
        }
    }

    /// Returns the explicitly declared reverse relationship name.
    pub fn related_name(&self) -> Option<&str> {
        match &self.field_type {
            FieldType::ForeignKey { related_name, .. }
            | FieldType::OneToOneField { related_name, .. } => related_name.as_deref(),
            _ => None,
        }
    }

    /// Returns the ON DELETE action for relationship fields.
    pub const fn cascade_on_delete(&self) -> Option<OnDelete> {
        match &self.field_type {
            FieldType::ForeignKey { on_delete, .. } | FieldType::OneToOneField { on_delete, .. } => {
                Some(*on_delete)
            }
            _ => None,
        }
    }

    /// Returns the ON UPDATE action for relationship fields.
    pub const fn cascade_on_update(&self) -> Option<OnDelete> {
        match &self.field_type {
            FieldType::ForeignKey { on_update, .. } | FieldType::OneToOneField { on_update, .. } => {
                Some(*on_update)
            }
            _ => None,
        }
    }

    /// Returns `true` if this field is string-typed.
    pub const fn is_text(&self) -> bool {
        self.field_type.is_text()
    }

    /// Returns `true` if this field is a relationship.
    pub const fn is_relation(&self) -> bool {
        matches!(
            self.field_type,
            FieldType::ForeignKey { .. } | FieldType::OneToOneField { .. }
        )
    }

    /// Returns `true` if the database assigns this field's value.
    pub const fn is_auto(&self) -> bool {
        self.field_type.is_auto()
    }

    /// Returns the value maintained automatically on create, if any.
    pub fn auto_value_on_create(&self) -> Option<Value> {
        if self.auto_now || self.auto_now_add {
            self.now()
        } else {
            None
        }
    }

    /// Returns the value refreshed automatically on update, if any.
    pub fn auto_value_on_update(&self) -> Option<Value> {
        if self.auto_now {
            self.now()
        } else {
            None
        }
    }

    fn now(&self) -> Option<Value> {
        let now = chrono::Utc::now().naive_utc();
        match self.field_type {
            FieldType::DateTimeField => Some(Value::DateTime(now)),
            FieldType::DateField => Some(Value::Date(now.date())),
            FieldType::TimeField => Some(Value::Time(now.time())),
            _ => None,
        }
    }

    // ── Cleaning ─────────────────────────────────────────────────────

    /// Coerces and validates a payload value for this field.
    ///
    /// Checks nullability and type, converts the loose forms callers
    /// commonly pass (integers for floats, ISO strings for dates and UUIDs),
    /// then applies `max_length`, the integer bounds, email syntax and any
    /// custom validators. Errors are keyed under the field name.
    pub fn clean(&self, value: Value) -> Result<Value, ValidationError> {
        if value.is_null() {
            return if self.null || self.is_auto() {
                Ok(Value::Null)
            } else {
                Err(self.error("This field cannot be null.", "null"))
            };
        }

        let value = self.coerce(value)?;

        let mut checks: Vec<Box<dyn Validator>> = Vec::new();
        if let Some(max) = self.max_length {
            checks.push(Box::new(MaxLengthValidator::new(max)));
        }
        if let Some(min) = self.min_value {
            checks.push(Box::new(MinValueValidator::new(min)));
        }
        if let Some(max) = self.max_value {
            checks.push(Box::new(MaxValueValidator::new(max)));
        }
        if self.field_type == FieldType::EmailField {
            checks.push(Box::new(EmailValidator));
        }

        for validator in checks.iter().chain(&self.validators) {
            validator
                .validate(&value)
                .map_err(|e| self.error(e.message, e.code))?;
        }
        Ok(value)
    }

    #[allow(clippy::cast_precision_loss)]
    fn coerce(&self, value: Value) -> Result<Value, ValidationError> {
        let coerced = match (&self.field_type, value) {
            (
                FieldType::AutoField
                | FieldType::BigAutoField
                | FieldType::IntegerField
                | FieldType::BigIntegerField,
                Value::Int(i),
            ) => Value::Int(i),
            (FieldType::FloatField, Value::Float(f)) => Value::Float(f),
            (FieldType::FloatField, Value::Int(i)) => Value::Float(i as f64),
            (FieldType::BooleanField, Value::Bool(b)) => Value::Bool(b),
            (FieldType::BooleanField, Value::Int(i @ (0 | 1))) => Value::Bool(i == 1),
            (FieldType::CharField | FieldType::TextField | FieldType::EmailField, Value::String(s)) => {
                Value::String(s)
            }
            (FieldType::DateField, Value::Date(d)) => Value::Date(d),
            (FieldType::DateField, Value::String(s)) => Value::Date(
                s.parse()
                    .map_err(|_| self.error(format!("'{s}' is not a valid date."), "invalid"))?,
            ),
            (FieldType::DateTimeField, Value::DateTime(dt)) => Value::DateTime(dt),
            (FieldType::DateTimeField, Value::Date(d)) => Value::DateTime(d.and_time(chrono::NaiveTime::MIN)),
            (FieldType::TimeField, Value::Time(t)) => Value::Time(t),
            (FieldType::UuidField, Value::Uuid(u)) => Value::Uuid(u),
            (FieldType::UuidField, Value::String(s)) => Value::Uuid(
                uuid::Uuid::parse_str(&s)
                    .map_err(|_| self.error(format!("'{s}' is not a valid UUID."), "invalid"))?,
            ),
            (FieldType::JsonField, Value::Json(j)) => Value::Json(j),
            (FieldType::JsonField, Value::String(s)) => Value::Json(serde_json::Value::String(s)),
            (FieldType::BinaryField, Value::Bytes(b)) => Value::Bytes(b),
            (
                FieldType::ForeignKey { .. } | FieldType::OneToOneField { .. },
                v @ (Value::Int(_) | Value::String(_) | Value::Uuid(_)),
            ) => v,
            (kind, other) => {
                return Err(self.error(
                    format!("Expected a value for {kind:?}, got {}.", other.type_name()),
                    "invalid",
                ))
            }
        };
        Ok(coerced)
    }

    fn error(&self, message: impl Into<String>, code: impl Into<String>) -> ValidationError {
        ValidationError::for_field(self.name, message, code)
    }
}
