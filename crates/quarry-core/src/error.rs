//! Core error types for quarry.
//!
//! [`QuarryError`] is the single error enum surfaced by every terminal
//! query-set operation. Path resolution failures, row-count failures,
//! payload validation failures and precondition failures each get their own
//! variant so callers can match on the kind, and every message carries the
//! offending identifier (field name, path segment or primary-key value).

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Represents a validation error with optional field-level errors.
///
/// Validation errors can be either simple (a single message) or compound
/// (containing per-field error lists).
///
/// # Examples
///
/// ```
/// use quarry_core::error::ValidationError;
///
/// // Simple validation error
/// let err = ValidationError::new("Unknown field 'nickname'.", "unknown_field");
///
/// // Field-level validation errors
/// let mut field_errors = std::collections::HashMap::new();
/// field_errors.insert(
///     "email".to_string(),
///     vec![ValidationError::new("Invalid email address.", "invalid")],
/// );
/// let err = ValidationError::with_field_errors(field_errors);
/// ```
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The primary error message.
    pub message: String,
    /// A short code identifying the type of validation failure (e.g. "required", "invalid").
    pub code: String,
    /// Additional parameters providing context for the error message.
    pub params: HashMap<String, String>,
    /// Per-field validation errors, keyed by field name.
    pub field_errors: HashMap<String, Vec<Self>>,
}

impl ValidationError {
    /// Creates a new `ValidationError` with a message and code.
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            params: HashMap::new(),
            field_errors: HashMap::new(),
        }
    }

    /// Creates a `ValidationError` containing per-field errors.
    pub fn with_field_errors(field_errors: HashMap<String, Vec<Self>>) -> Self {
        Self {
            message: String::new(),
            code: String::new(),
            params: HashMap::new(),
            field_errors,
        }
    }

    /// Creates a single-field error, keyed under `field`.
    pub fn for_field(
        field: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        let field = field.into();
        let inner = Self::new(message, code).with_param("field", field.clone());
        let mut field_errors = HashMap::new();
        field_errors.insert(field, vec![inner]);
        Self::with_field_errors(field_errors)
    }

    /// Adds a parameter to this validation error.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Returns `true` if `field` has at least one error recorded against it.
    pub fn has_field(&self, field: &str) -> bool {
        self.field_errors.contains_key(field)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.message.is_empty() {
            write!(f, "{}", self.message)?;
        } else if !self.field_errors.is_empty() {
            let mut fields: Vec<&String> = self.field_errors.keys().collect();
            fields.sort();
            let mut first = true;
            for field in fields {
                for error in &self.field_errors[field] {
                    if !first {
                        write!(f, "; ")?;
                    }
                    write!(f, "{field}: {error}")?;
                    first = false;
                }
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// The primary error type for quarry.
///
/// The first group of variants is the query engine's own taxonomy; the rest
/// are ambient failures reported by execution adapters and configuration.
#[derive(Error, Debug)]
pub enum QuarryError {
    // ── Query resolution ─────────────────────────────────────────────

    /// A field or relationship segment does not exist on a model.
    #[error("Unresolved path: '{segment}' is not a field or related name on {model}")]
    UnresolvedPath {
        /// The model the segment was looked up on.
        model: String,
        /// The offending path segment.
        segment: String,
    },

    /// A reverse relationship matches several foreign keys into the same
    /// table and none of them is declared with the requested related name.
    #[error(
        "Ambiguous relationship: '{segment}' from {model} matches foreign keys [{}]",
        candidates.join(", ")
    )]
    AmbiguousRelationship {
        /// The model that declares the competing foreign keys.
        model: String,
        /// The path segment that could not be disambiguated.
        segment: String,
        /// The candidate foreign-key field names.
        candidates: Vec<String>,
    },

    // ── Terminal row-count failures ──────────────────────────────────

    /// Raised when a query expected exactly one result but found none.
    #[error("Object does not exist: {0}")]
    DoesNotExist(String),

    /// Raised when a query expected exactly one result but found multiple.
    #[error("Multiple objects returned when one expected: {0}")]
    MultipleObjectsReturned(String),

    // ── Payload / call preconditions ─────────────────────────────────

    /// One or more fields failed validation.
    #[error("Validation error: {0}")]
    ValidationError(ValidationError),

    /// A call was made with arguments that violate its precondition.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    // ── Execution adapter ────────────────────────────────────────────

    /// A generic database error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A database integrity constraint was violated.
    #[error("Integrity error: {0}")]
    IntegrityError(String),

    /// An operational database error (connection failure, etc.).
    #[error("Operational error: {0}")]
    OperationalError(String),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value or model declaration is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // ── Serialization / IO ───────────────────────────────────────────

    /// An error occurred during serialization or deserialization.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl QuarryError {
    /// Builds an [`UnresolvedPath`](Self::UnresolvedPath) error.
    pub fn unresolved(model: impl Into<String>, segment: impl Into<String>) -> Self {
        Self::UnresolvedPath {
            model: model.into(),
            segment: segment.into(),
        }
    }

    /// Returns `true` for [`DoesNotExist`](Self::DoesNotExist).
    ///
    /// `get_or_create` and `update_or_create` recover from this kind only.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::DoesNotExist(_))
    }

    /// Returns a short, stable name for the error kind, used as a log field.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UnresolvedPath { .. } => "unresolved_path",
            Self::AmbiguousRelationship { .. } => "ambiguous_relationship",
            Self::DoesNotExist(_) => "not_found",
            Self::MultipleObjectsReturned(_) => "multiple_found",
            Self::ValidationError(_) => "validation",
            Self::Precondition(_) => "precondition",
            Self::DatabaseError(_) => "database",
            Self::IntegrityError(_) => "integrity",
            Self::OperationalError(_) => "operational",
            Self::ConfigurationError(_) => "configuration",
            Self::SerializationError(_) => "serialization",
            Self::IoError(_) => "io",
        }
    }
}

impl From<ValidationError> for QuarryError {
    fn from(err: ValidationError) -> Self {
        Self::ValidationError(err)
    }
}

/// A convenience type alias for `Result<T, QuarryError>`.
pub type QuarryResult<T> = Result<T, QuarryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display_simple() {
        let err = ValidationError::new("This field is required.", "required");
        assert_eq!(err.to_string(), "This field is required.");
    }

    #[test]
    fn test_validation_error_display_field_errors() {
        let mut field_errors = HashMap::new();
        field_errors.insert(
            "email".to_string(),
            vec![ValidationError::new("Invalid email.", "invalid")],
        );
        let err = ValidationError::with_field_errors(field_errors);
        assert!(err.to_string().contains("email: Invalid email."));
    }

    #[test]
    fn test_validation_error_for_field() {
        let err = ValidationError::for_field("nickname", "Unknown field.", "unknown_field");
        assert!(err.has_field("nickname"));
        assert_eq!(err.to_string(), "nickname: Unknown field.");
    }

    #[test]
    fn test_validation_error_with_param() {
        let err = ValidationError::new("Too short.", "min_length").with_param("min", "8");
        assert_eq!(err.params.get("min").unwrap(), "8");
    }

    #[test]
    fn test_unresolved_path_names_segment() {
        let err = QuarryError::unresolved("Permission", "desgination");
        let msg = err.to_string();
        assert!(msg.contains("desgination"));
        assert!(msg.contains("Permission"));
        assert_eq!(err.kind(), "unresolved_path");
    }

    #[test]
    fn test_ambiguous_relationship_lists_candidates() {
        let err = QuarryError::AmbiguousRelationship {
            model: "Match".into(),
            segment: "matches_set".into(),
            candidates: vec!["home".into(), "away".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("matches_set"));
        assert!(msg.contains("home, away"));
    }

    #[test]
    fn test_is_not_found() {
        assert!(QuarryError::DoesNotExist("user".into()).is_not_found());
        assert!(!QuarryError::MultipleObjectsReturned("user".into()).is_not_found());
        assert!(!QuarryError::Precondition("pk".into()).is_not_found());
    }

    #[test]
    fn test_validation_error_conversion() {
        let err: QuarryError = ValidationError::new("bad", "invalid").into();
        assert_eq!(err.kind(), "validation");
        assert_eq!(err.to_string(), "Validation error: bad");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: QuarryError = io_err.into();
        assert_eq!(err.kind(), "io");
        assert!(err.to_string().contains("file missing"));
    }
}
