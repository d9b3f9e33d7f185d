//! Result rows and typed cell access.
//!
//! A [`Row`] is what execution adapters hand back to the query engine. Root
//! model columns appear under their own names; columns of eagerly joined
//! tables appear under `"<path>__<column>"`, where `<path>` is the
//! relationship path joined with [`RELATED_SEPARATOR`]. [`Row::related`]
//! peels one path segment off, which is how
//! [`Model::from_row`](crate::model::Model::from_row) populates nested
//! related entities.

use quarry_core::{QuarryError, QuarryResult};

use crate::value::Value;

/// Separator between a join alias and a column name in result rows.
pub const RELATED_SEPARATOR: &str = "__";

/// A generic database row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row from column names and values.
    ///
    /// # Panics
    ///
    /// Panics if the number of columns does not match the number of values.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        assert_eq!(
            columns.len(),
            values.len(),
            "Row column count must match value count"
        );
        Self { columns, values }
    }

    /// Builds a row from `(column, value)` pairs.
    pub fn from_pairs<C: Into<String>>(pairs: impl IntoIterator<Item = (C, Value)>) -> Self {
        let (columns, values) = pairs.into_iter().map(|(c, v)| (c.into(), v)).unzip();
        Self { columns, values }
    }

    /// Returns the column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the values, in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Gets a typed value by column name.
    ///
    /// # Errors
    ///
    /// Returns an error if the column does not exist or the value cannot be
    /// converted to the requested type.
    pub fn get<T: FromValue>(&self, column: &str) -> QuarryResult<T> {
        let value = self.get_value(column).ok_or_else(|| {
            QuarryError::DatabaseError(format!("Column '{column}' not found in row"))
        })?;
        T::from_value(value).map_err(|e| match e {
            QuarryError::SerializationError(msg) => {
                QuarryError::SerializationError(format!("column '{column}': {msg}"))
            }
            other => other,
        })
    }

    /// Gets a typed value, treating a missing column like NULL.
    ///
    /// Used for fields that a query may leave out of the select list, such
    /// as secret fields under `exclude_secrets`.
    pub fn try_get<T: FromValue>(&self, column: &str) -> QuarryResult<Option<T>> {
        match self.get_value(column) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.get(column).map(Some),
        }
    }

    /// Gets a typed value by column index.
    pub fn get_by_index<T: FromValue>(&self, idx: usize) -> QuarryResult<T> {
        let value = self.values.get(idx).ok_or_else(|| {
            QuarryError::DatabaseError(format!(
                "Column index {idx} out of bounds (row has {} columns)",
                self.values.len()
            ))
        })?;
        T::from_value(value)
    }

    /// Returns a reference to the raw value at the given column name.
    pub fn get_value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    /// Returns the sub-row for an eagerly joined relationship.
    ///
    /// The sub-row contains every column prefixed with `"<name>__"`, with the
    /// prefix stripped, so nested joins stay reachable through further calls.
    /// Returns `None` when the relationship was not joined, or when every
    /// joined cell is NULL (an outer join that matched nothing).
    pub fn related(&self, name: &str) -> Option<Self> {
        let prefix = format!("{name}{RELATED_SEPARATOR}");
        let (columns, values): (Vec<String>, Vec<Value>) = self
            .columns
            .iter()
            .zip(&self.values)
            .filter_map(|(c, v)| c.strip_prefix(&prefix).map(|rest| (rest.to_string(), v.clone())))
            .unzip();

        if values.iter().all(Value::is_null) {
            return None;
        }
        Some(Self { columns, values })
    }
}

/// Trait for converting a [`Value`] to a concrete Rust type.
///
/// Conversions accept the storage forms execution adapters actually return:
/// SQLite hands back booleans as integers and temporal/UUID values as text.
pub trait FromValue: Sized {
    /// Attempts to convert a value reference to this type.
    fn from_value(value: &Value) -> QuarryResult<Self>;
}

fn mismatch(expected: &str, value: &Value) -> QuarryError {
    QuarryError::SerializationError(format!("expected {expected}, got {}", value.type_name()))
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Int(i) => Ok(*i),
            Value::Bool(b) => Ok(Self::from(*b)),
            _ => Err(mismatch("int", value)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        let wide = i64::from_value(value)?;
        Self::try_from(wide).map_err(|e| {
            QuarryError::SerializationError(format!("int value {wide} out of i32 range: {e}"))
        })
    }
}

impl FromValue for f64 {
    #[allow(clippy::cast_precision_loss)]
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as Self),
            _ => Err(mismatch("float", value)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            _ => Err(mismatch("bool", value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::String(s) => Ok(s.clone()),
            _ => Err(mismatch("string", value)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            _ => Err(mismatch("bytes", value)),
        }
    }
}

impl FromValue for uuid::Uuid {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Uuid(u) => Ok(*u),
            Value::String(s) => Self::parse_str(s)
                .map_err(|e| QuarryError::SerializationError(format!("invalid uuid '{s}': {e}"))),
            _ => Err(mismatch("uuid", value)),
        }
    }
}

impl FromValue for chrono::NaiveDate {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Date(d) => Ok(*d),
            Value::DateTime(dt) => Ok(dt.date()),
            Value::String(s) => s
                .parse()
                .map_err(|e| QuarryError::SerializationError(format!("invalid date '{s}': {e}"))),
            _ => Err(mismatch("date", value)),
        }
    }
}

impl FromValue for chrono::NaiveDateTime {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::DateTime(dt) => Ok(*dt),
            Value::String(s) => s
                .parse()
                .or_else(|_| Self::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                .map_err(|e| {
                    QuarryError::SerializationError(format!("invalid datetime '{s}': {e}"))
                }),
            _ => Err(mismatch("datetime", value)),
        }
    }
}

impl FromValue for chrono::NaiveTime {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Time(t) => Ok(*t),
            Value::String(s) => s
                .parse()
                .map_err(|e| QuarryError::SerializationError(format!("invalid time '{s}': {e}"))),
            _ => Err(mismatch("time", value)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Json(j) => Ok(j.clone()),
            Value::String(s) => serde_json::from_str(s)
                .map_err(|e| QuarryError::SerializationError(format!("invalid json: {e}"))),
            _ => Err(mismatch("json", value)),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Null => Ok(None),
            _ => T::from_value(value).map(Some),
        }
    }
}
