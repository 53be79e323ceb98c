use std::sync::Arc;

use thiserror::Error;

use crate::value::ScalarKind;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while decoding, resolving, or loading a feature.
///
/// None of these escape [`Evaluator::eval`](crate::Evaluator::eval): they are folded into an
/// [`EvalResult`](crate::EvalResult) carrying the caller's default value.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The document is malformed or does not match the expected schema.
    #[error("error decoding feature document: {0}")]
    Decode(String),

    /// An attribute tag that is neither built-in nor registered.
    #[error("unknown attribute {0:?}")]
    UnknownAttribute(String),

    /// Attempt to register an extension under a built-in attribute tag.
    #[error("attribute tag {0:?} is reserved for a built-in attribute")]
    ReservedAttribute(String),

    /// A classifier discriminator that does not name any classifier.
    #[error("unknown classifier {0:?}")]
    UnknownClassifier(String),

    /// Two scalars of incomparable kinds were compared.
    #[error("type mismatch in {operation}: cannot compare {left:?} with {right:?}")]
    TypeMismatch {
        /// Classifier tag of the failing comparison.
        operation: &'static str,
        /// Kind produced by the attribute.
        left: ScalarKind,
        /// Kind of the literal operand.
        right: ScalarKind,
    },

    /// An attribute's underlying query failed.
    #[error("failed to evaluate attribute {attribute:?}: {message}")]
    AttributeEvaluation {
        /// Tag of the failing attribute.
        attribute: String,
        /// Human-readable cause.
        message: String,
    },

    /// The store has no document for the requested feature.
    #[error("feature {0:?} not found")]
    StoreNotFound(String),

    /// I/O error while talking to the store.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),
}

impl Error {
    /// Build an [`Error::AttributeEvaluation`], the error extension attributes should return.
    pub fn attribute(attribute: impl Into<String>, message: impl ToString) -> Error {
        Error::AttributeEvaluation {
            attribute: attribute.into(),
            message: message.to_string(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}
