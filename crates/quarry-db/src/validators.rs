//! Field validators.
//!
//! Validators enforce constraints on payload values before they reach an
//! INSERT or UPDATE. [`FieldDef::clean`](crate::fields::FieldDef::clean)
//! derives the built-in ones from the field's declared bounds and then runs
//! any custom validators attached to the field.

use std::fmt;
use std::sync::LazyLock;

use quarry_core::ValidationError;
use regex::Regex;

use crate::value::Value;

/// A trait for validating field values.
///
/// # Examples
///
/// ```
/// use quarry_db::validators::{MaxLengthValidator, Validator};
/// use quarry_db::value::Value;
///
/// let v = MaxLengthValidator::new(5);
/// assert!(v.validate(&Value::from("hi")).is_ok());
/// assert!(v.validate(&Value::from("toolong")).is_err());
/// ```
pub trait Validator: Send + Sync + fmt::Debug {
    /// Validates the given value, returning an error if invalid.
    fn validate(&self, value: &Value) -> Result<(), ValidationError>;

    /// Returns a human-readable name for this validator.
    fn name(&self) -> &str;
}

/// Validates that a string value does not exceed a maximum length.
#[derive(Debug, Clone)]
pub struct MaxLengthValidator {
    /// The maximum allowed length, in characters.
    pub max_length: usize,
}

impl MaxLengthValidator {
    /// Creates a new `MaxLengthValidator`.
    pub const fn new(max_length: usize) -> Self {
        Self { max_length }
    }
}

impl Validator for MaxLengthValidator {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        if let Value::String(s) = value {
            let len = s.chars().count();
            if len > self.max_length {
                return Err(ValidationError::new(
                    format!(
                        "Ensure this value has at most {} characters (it has {len}).",
                        self.max_length
                    ),
                    "max_length",
                )
                .with_param("limit", self.max_length.to_string()));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "MaxLengthValidator"
    }
}

/// Validates that an integer value is at least `min_value`.
#[derive(Debug, Clone)]
pub struct MinValueValidator {
    /// The minimum allowed value.
    pub min_value: i64,
}

impl MinValueValidator {
    /// Creates a new `MinValueValidator`.
    pub const fn new(min_value: i64) -> Self {
        Self { min_value }
    }
}

impl Validator for MinValueValidator {
    #[allow(clippy::cast_precision_loss)]
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        if let Some(n) = value.as_number() {
            if n < self.min_value as f64 {
                return Err(ValidationError::new(
                    format!(
                        "Ensure this value is greater than or equal to {}.",
                        self.min_value
                    ),
                    "min_value",
                ));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "MinValueValidator"
    }
}

/// Validates that an integer value is at most `max_value`.
#[derive(Debug, Clone)]
pub struct MaxValueValidator {
    /// The maximum allowed value.
    pub max_value: i64,
}

impl MaxValueValidator {
    /// Creates a new `MaxValueValidator`.
    pub const fn new(max_value: i64) -> Self {
        Self { max_value }
    }
}

impl Validator for MaxValueValidator {
    #[allow(clippy::cast_precision_loss)]
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        if let Some(n) = value.as_number() {
            if n > self.max_value as f64 {
                return Err(ValidationError::new(
                    format!(
                        "Ensure this value is less than or equal to {}.",
                        self.max_value
                    ),
                    "max_value",
                ));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "MaxValueValidator"
    }
}

static EMAIL_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$").ok()
});

/// Validates that a string looks like an email address.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmailValidator;

impl Validator for EmailValidator {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        if let Value::String(s) = value {
            let valid = EMAIL_RE.as_ref().is_some_and(|re| re.is_match(s));
            if !valid {
                return Err(ValidationError::new("Enter a valid email address.", "invalid"));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "EmailValidator"
    }
}

/// Validates a string against an arbitrary regular expression.
#[derive(Debug, Clone)]
pub struct RegexValidator {
    regex: Regex,
    message: String,
}

impl RegexValidator {
    /// Compiles `pattern` into a validator.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` with code `invalid_regex` if the pattern
    /// does not compile.
    pub fn new(pattern: &str, message: impl Into<String>) -> Result<Self, ValidationError> {
        let regex = Regex::new(pattern).map_err(|e| {
            ValidationError::new(format!("Invalid regex '{pattern}': {e}"), "invalid_regex")
        })?;
        Ok(Self {
            regex,
            message: message.into(),
        })
    }
}

impl Validator for RegexValidator {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        match value {
            Value::String(s) if !self.regex.is_match(s) => {
                Err(ValidationError::new(self.message.clone(), "invalid"))
            }
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "RegexValidator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_length() {
        let v = MaxLengthValidator::new(3);
        assert!(v.validate(&Value::from("abc")).is_ok());
        let err = v.validate(&Value::from("abcd")).unwrap_err();
        assert_eq!(err.code, "max_length");
        assert_eq!(err.params.get("limit").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_max_length_counts_characters() {
        let v = MaxLengthValidator::new(4);
        assert!(v.validate(&Value::from("café")).is_ok());
    }

    #[test]
    fn test_max_length_non_string() {
        assert!(MaxLengthValidator::new(1).validate(&Value::Int(12345)).is_ok());
    }

    #[test]
    fn test_min_and_max_value() {
        let min = MinValueValidator::new(0);
        let max = MaxValueValidator::new(100);
        assert!(min.validate(&Value::Int(0)).is_ok());
        assert!(min.validate(&Value::Int(-1)).is_err());
        assert!(max.validate(&Value::Float(100.0)).is_ok());
        assert!(max.validate(&Value::Int(101)).is_err());
        assert!(max.validate(&Value::from("not a number")).is_ok());
    }

    #[test]
    fn test_email() {
        assert!(EmailValidator.validate(&Value::from("ada@example.com")).is_ok());
        assert!(EmailValidator.validate(&Value::from("not-an-email")).is_err());
        assert!(EmailValidator.validate(&Value::from("a@b")).is_err());
    }

    #[test]
    fn test_regex_validator() {
        let v = RegexValidator::new(r"^[a-z]+$", "Lowercase letters only.").unwrap();
        assert!(v.validate(&Value::from("slug")).is_ok());
        let err = v.validate(&Value::from("Slug1")).unwrap_err();
        assert_eq!(err.message, "Lowercase letters only.");
    }

    #[test]
    fn test_regex_validator_bad_pattern() {
        let err = RegexValidator::new("(", "x").unwrap_err();
        assert_eq!(err.code, "invalid_regex");
    }

    #[test]
    fn test_validator_names() {
        assert_eq!(MaxLengthValidator::new(5).name(), "MaxLengthValidator");
        assert_eq!(MinValueValidator::new(5).name(), "MinValueValidator");
        assert_eq!(MaxValueValidator::new(5).name(), "MaxValueValidator");
        assert_eq!(EmailValidator.name(), "EmailValidator");
    }
}
