//! Error kinds shared by every stream operation.
//!
//! Operations return [`anyhow::Result`] like the rest of the crate. When a failure belongs to
//! one of the well-known kinds below, the root cause is a [`StreamError`], which callers can
//! recover with `err.downcast_ref::<StreamError>()` even after `.context(...)` layers were
//! added on the way up.
//!
//! Structural mistakes (unsupported item kind, write into a locked struct, expression cycle)
//! are always fatal. Value-level mistakes (a user function failing on one item) are fatal only
//! when no logger was attached to the selection.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = anyhow::Result<T>;

/// Maximum length of the item summary embedded into error messages.
pub const SUMMARY_LIMIT: usize = 80;

/// The error kinds a stream operation can fail with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The operation is not defined for this item kind (e.g. writing a field into a `Line`).
    #[error("{operation}: unsupported item kind {kind} ({detail})")]
    UnsupportedItemKind {
        kind: String,
        operation: String,
        detail: String,
    },

    /// A field name or position could not be resolved and no default could be substituted.
    #[error("{operation}: field {field} not found in {item}{reason}")]
    FieldNotFound {
        field: String,
        item: String,
        operation: String,
        reason: String,
    },

    /// The dependency graph of selection expressions is not a DAG.
    #[error("expression cycle between fields: {}", .fields.join(", "))]
    ExpressionCycle { fields: Vec<String> },

    /// An item does not conform to the declared struct.
    #[error("validation failed for {item}: {}", .messages.join("; "))]
    Validation { item: String, messages: Vec<String> },

    /// A user-supplied selection or filter function failed.
    #[error("{operation}: function for {field} failed on {item}: {message}")]
    UserFunction {
        field: String,
        item: String,
        operation: String,
        message: String,
    },

    /// An argument combination that can never succeed.
    #[error("{operation}: {message}")]
    InvalidArgument { operation: String, message: String },
}

impl StreamError {
    pub fn unsupported(
        kind: impl ToString,
        operation: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::UnsupportedItemKind {
            kind: kind.to_string(),
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    pub fn field_not_found(
        field: impl ToString,
        item: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self::FieldNotFound {
            field: field.to_string(),
            item: item.into(),
            operation: operation.into(),
            reason: String::new(),
        }
    }

    /// Same as [`StreamError::field_not_found`] with an explanation appended to the message.
    #[must_use]
    pub fn because(mut self, why: impl Into<String>) -> Self {
        if let Self::FieldNotFound { reason, .. } = &mut self {
            *reason = format!(" ({})", why.into());
        }
        self
    }

    pub fn invalid(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Short machine-friendly name of the kind, used in logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedItemKind { .. } => "unsupported_item_kind",
            Self::FieldNotFound { .. } => "field_not_found",
            Self::ExpressionCycle { .. } => "expression_cycle",
            Self::Validation { .. } => "validation",
            Self::UserFunction { .. } => "user_function",
            Self::InvalidArgument { .. } => "invalid_argument",
        }
    }
}

/// Find the [`StreamError`] at the root of an `anyhow` chain, if any.
pub fn stream_error(err: &anyhow::Error) -> Option<&StreamError> {
    err.chain().find_map(|e| e.downcast_ref::<StreamError>())
}

/// Cut a debug rendering down to [`SUMMARY_LIMIT`] characters.
pub(crate) fn summarize(text: &str) -> String {
    if text.chars().count() <= SUMMARY_LIMIT {
        return text.to_string();
    }
    let mut out: String = text.chars().take(SUMMARY_LIMIT - 3).collect();
    out.push_str("...");
    out
}
