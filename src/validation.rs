//! Data quality checks for streams.
//!
//! Items are checked against a [`Validate`] rule, most often the stream's own
//! [`StructSchema`]. What happens to an invalid item is decided by the [`ValidationMode`]:
//! skip it, record it in an [`ErrorCollector`] and skip it, or fail the stream with a
//! [`StreamError::Validation`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::{Arc, Mutex};
//! use tabstream::validation::{ErrorCollector, ValidationMode};
//! use tabstream::{Item, Stream, StructSchema};
//!
//! # fn main() -> anyhow::Result<()> {
//! let schema = Arc::new(StructSchema::from_names(&["id"])?);
//! let collector = Arc::new(Mutex::new(ErrorCollector::new()));
//! let valid = Stream::from_items(vec![Item::row([1]), Item::row([1, 2])])
//!     .with_schema(schema)
//!     .validate_schema(ValidationMode::LogAndContinue, Some(Arc::clone(&collector)))?
//!     .collect()?;
//! assert_eq!(valid.len(), 1);
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, StreamError};
use crate::item::{FieldRef, Item};
use crate::schema::StructSchema;
use crate::stream::Stream;
use crate::value::Value;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Outcome of validating one item.
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// A rule items are checked against.
pub trait Validate {
    fn validate(&self, item: &Item) -> ValidationResult;
}

impl Validate for StructSchema {
    fn validate(&self, item: &Item) -> ValidationResult {
        let messages = self.get_validation_errors(item);
        if messages.is_empty() {
            Ok(())
        } else {
            Err(messages
                .into_iter()
                .map(|m| ValidationError::new(Check::Schema, m))
                .collect())
        }
    }
}

impl<F> Validate for F
where
    F: Fn(&Item) -> ValidationResult,
{
    fn validate(&self, item: &Item) -> ValidationResult {
        self(item)
    }
}

/// The kind of check an item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    /// The stream schema rejected the item.
    Schema,
    /// The field the rule reads is absent.
    MissingField,
    NotNull,
    NotEmpty,
    Range,
    Pattern,
    Length,
    /// A user rule.
    Custom,
}

/// One reason an item is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub check: Check,
    /// The offending field, when the check concerns one.
    pub field: Option<FieldRef>,
    pub message: String,
}

impl ValidationError {
    pub fn new(check: Check, message: impl Into<String>) -> Self {
        Self {
            check,
            field: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn at(mut self, field: impl Into<FieldRef>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{field}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// How a stream reacts to an invalid item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ValidationMode {
    /// Drop invalid items silently.
    SkipInvalid,
    /// Record invalid items in the collector and drop them.
    #[default]
    LogAndContinue,
    /// Fail on the first invalid item.
    FailFast,
}

/// The errors of one invalid item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    /// Position of the item in the validated stream.
    pub index: usize,
    pub item: String,
    pub errors: Vec<ValidationError>,
}

/// Accumulates validation errors for batch reporting.
#[derive(Debug, Clone, Default)]
pub struct ErrorCollector {
    errors: Vec<RecordError>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, index: usize, item: &Item, errors: Vec<ValidationError>) {
        self.errors.push(RecordError {
            index,
            item: item.summary(),
            errors,
        });
    }

    /// Number of invalid items seen.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[RecordError] {
        &self.errors
    }

    pub fn clear(&mut self) {
        self.errors.clear();
    }

    /// Export errors as pretty-printed JSON.
    ///
    /// # Errors
    /// Serialization failures.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.errors).context("serialize validation errors")
    }

    /// Write the JSON export to `path`.
    ///
    /// # Errors
    /// Serialization or I/O failures.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("write validation errors to {}", path.display()))
    }
}

impl fmt::Display for ErrorCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErrorCollector({} errors)", self.error_count())
    }
}

fn format_errors(errors: &[ValidationError]) -> Vec<String> {
    errors.iter().map(ValidationError::to_string).collect()
}

/// Validation helpers for common field checks.
pub mod validators {
    use super::{Check, ValidationError, ValidationResult};
    use crate::value::Value;
    use regex::Regex;

    pub fn not_null(field: &str, value: &Value) -> ValidationResult {
        if value.is_null() {
            Err(vec![ValidationError::new(Check::NotNull, "must not be null").at(field)])
        } else {
            Ok(())
        }
    }

    /// Strings must be non-empty; other values pass.
    pub fn not_empty(field: &str, value: &Value) -> ValidationResult {
        match value {
            Value::Str(s) if s.is_empty() => Err(vec![ValidationError::new(Check::NotEmpty, "must not be empty").at(field)]),
            _ => Ok(()),
        }
    }

    /// Inclusive range check in the total order of values.
    pub fn in_range(field: &str, value: &Value, min: &Value, max: &Value) -> ValidationResult {
        if value >= min && value <= max {
            Ok(())
        } else {
            Err(vec![ValidationError::new(Check::Range, format!("must be between {min} and {max}")).at(field)])
        }
    }

    pub fn matches(field: &str, value: &Value, pattern: &Regex) -> ValidationResult {
        match value.as_str() {
            Some(s) if pattern.is_match(s) => Ok(()),
            _ => Err(vec![
                ValidationError::new(Check::Pattern, format!("must match {}", pattern.as_str())).at(field),
            ]),
        }
    }

    pub fn max_length(field: &str, value: &Value, max: usize) -> ValidationResult {
        match value.as_str() {
            Some(s) if s.chars().count() > max => Err(vec![
                ValidationError::new(Check::Length, format!("must have at most {max} characters")).at(field),
            ]),
            _ => Ok(()),
        }
    }
}

/// Combine multiple validation results.
pub fn combine_validations(results: Vec<ValidationResult>) -> ValidationResult {
    let mut all_errors = Vec::new();
    for result in results {
        if let Err(mut errors) = result {
            all_errors.append(&mut errors);
        }
    }
    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(all_errors)
    }
}

/// Apply `check` to one field of the item; a missing field is an error of the rule.
pub fn check_field<F>(item: &Item, field: &str, check: F) -> ValidationResult
where
    F: FnOnce(&str, &Value) -> ValidationResult,
{
    match item.get_value(&FieldRef::from(field)) {
        Ok(value) => check(field, &value),
        Err(e) => Err(vec![ValidationError::new(Check::MissingField, format!("{e:#}")).at(field)]),
    }
}

impl Stream {
    /// Check every item with `rule`, handling invalid ones according to `mode`.
    #[must_use]
    pub fn validate<R>(
        self,
        rule: R,
        mode: ValidationMode,
        collector: Option<Arc<Mutex<ErrorCollector>>>,
    ) -> Self
    where
        R: Validate + 'static,
    {
        let mut index = 0usize;
        let kind = self.item_type();
        let logger = self.logger().cloned();
        self.flat_map(move |item| {
            let at = index;
            index += 1;
            match rule.validate(&item) {
                Ok(()) => Ok(Some(item)),
                Err(errors) => match mode {
                    ValidationMode::SkipInvalid => Ok(None),
                    ValidationMode::LogAndContinue => {
                        if let Some(l) = &logger {
                            l.log(
                                &format!("invalid item #{at}: {}", format_errors(&errors).join(", ")),
                                crate::logger::Level::Warn,
                            );
                        }
                        if let Some(c) = &collector {
                            c.lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .add_error(at, &item, errors);
                        }
                        Ok(None)
                    }
                    ValidationMode::FailFast => Err(StreamError::Validation {
                        item: item.summary(),
                        messages: format_errors(&errors),
                    }
                    .into()),
                },
            }
        })
        .with_item_kind(kind)
    }

    /// [`Stream::validate`] against the stream schema.
    ///
    /// # Errors
    /// `InvalidArgument` when the stream has no schema.
    pub fn validate_schema(
        self,
        mode: ValidationMode,
        collector: Option<Arc<Mutex<ErrorCollector>>>,
    ) -> Result<Self> {
        let Some(schema) = self.schema().cloned() else {
            return Err(StreamError::invalid("validate_schema", "the stream has no schema").into());
        };
        Ok(self.validate(SchemaRule(schema), mode, collector))
    }
}

struct SchemaRule(Arc<StructSchema>);

impl Validate for SchemaRule {
    fn validate(&self, item: &Item) -> ValidationResult {
        self.0.validate(item)
    }
}
