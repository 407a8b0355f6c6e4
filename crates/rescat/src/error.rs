//! Error types for the rescat crate.

use std::io;

use thiserror::Error;

use crate::expr::ExpressionError;

/// Errors that can occur when loading, building, or querying collections.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed source or JSON text.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Two resources share a name.
    #[error("duplicate resource name: '{0}'")]
    DuplicateName(String),

    /// Direct access of an attribute the resource does not have.
    #[error("resource '{resource}' has no attribute '{attribute}'")]
    AttributeNotFound { resource: String, attribute: String },

    /// Attempt to change or remove the `name` attribute.
    #[error("attribute '{0}' is reserved and cannot be modified")]
    ReservedAttribute(String),

    /// A resource name, attribute, or nested key starts with `#`, which the
    /// JSON form reserves for comments.
    #[error("'{0}' starts with '#', which marks a comment")]
    CommentKey(String),

    /// A tag does not match the tag syntax.
    #[error("invalid tag: '{0}'")]
    InvalidTag(String),

    /// The `tags` attribute was not a sequence of strings.
    #[error("'tags' must be a list of strings, got {0}")]
    InvalidTags(&'static str),

    /// Expression parse or evaluation failure.
    #[error(transparent)]
    Expression(#[from] ExpressionError),

    /// Malformed location string or fragment.
    #[error("invalid location '{location}': {reason}")]
    Location { location: String, reason: String },

    /// Failed to read a local file or stdin.
    #[error("failed to read '{location}': {source}")]
    Fetch {
        location: String,
        #[source]
        source: io::Error,
    },

    /// Failed to fetch a remote location.
    #[error("failed to fetch '{location}': {message}")]
    Remote { location: String, message: String },

    /// A hook file could not be loaded or a hook failed.
    #[error("hook '{hook}': {message}")]
    Hook { hook: String, message: String },

    /// Malformed configuration document.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Validation was requested but no checkers are configured.
    #[error("no checkers configured")]
    NoCheckers,

    /// `singleton()` on a collection that does not hold exactly one resource.
    #[error("expected exactly 1 resource, not {0}")]
    NotSingleton(usize),
}

impl Error {
    /// Create a location error.
    pub fn location(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Location {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Create a hook error.
    pub fn hook(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hook {
            hook: hook.into(),
            message: message.into(),
        }
    }
}

/// Malformed collection text, with the position of the problem.
///
/// Line and column are 1-based. JSON errors carry the position reported
/// by `serde_json`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{format} parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    /// Which grammar rejected the text (`json` or `source`).
    pub format: &'static str,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(
        format: &'static str,
        line: usize,
        column: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            format,
            line,
            column,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        let message = err.to_string();
        let position = format!(" at line {} column {}", err.line(), err.column());
        let message = message
            .strip_suffix(&position)
            .map(str::to_string)
            .unwrap_or(message);
        ParseError::new("json", err.line(), err.column(), message)
    }
}

/// Result type for rescat operations.
pub type Result<T> = std::result::Result<T, Error>;
