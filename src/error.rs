//! Error types.
//!
//! - `ExprError`: a compiled predicate / ordering / projection failed to parse
//! - `StoreError`: failures reported by a backing store, passed through opaque
//! - `DataSourceError`: what adapters return to their callers

use thiserror::Error;

/// Parse failure in the dynamic expression language.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("unexpected character '{found}' at position {pos}")]
    UnexpectedChar { pos: usize, found: char },
    #[error("unexpected token '{found}' at position {pos}, expected {expected}")]
    UnexpectedToken {
        pos: usize,
        found: String,
        expected: &'static str,
    },
    #[error("unexpected end of expression, expected {expected}")]
    UnexpectedEnd { expected: &'static str },
    #[error("unknown method '{name}' at position {pos}")]
    UnknownMethod { pos: usize, name: String },
    #[error("unterminated string literal starting at position {pos}")]
    UnterminatedString { pos: usize },
    #[error("invalid number '{raw}' at position {pos}")]
    InvalidNumber { pos: usize, raw: String },
}

/// Categorized store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Database, collection or document does not exist.
    NotFound,
    /// The store cannot evaluate part of the query.
    Unsupported,
    /// A continuation token was not issued by this store.
    InvalidContinuation,
    /// The caller cancelled the request.
    Cancelled,
    /// Anything else: timeouts, authorization, transport.
    Backend,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::NotFound, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Unsupported, message)
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Backend, message)
    }

    pub fn cancelled() -> Self {
        Self::new(StoreErrorKind::Cancelled, "request cancelled")
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == StoreErrorKind::NotFound
    }
}

impl From<ExprError> for StoreError {
    fn from(err: ExprError) -> Self {
        StoreError::new(StoreErrorKind::Unsupported, err.to_string())
    }
}

/// Errors surfaced by data source adapters.
#[derive(Debug, Error)]
pub enum DataSourceError {
    /// Missing or blank required identifier; raised at construction.
    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument { name: &'static str, reason: String },
    /// Policy-dependent empty result.
    #[error("not found: {0}")]
    NotFound(String),
    #[error("query cancelled")]
    Cancelled,
    #[error("invalid expression: {0}")]
    Expression(#[from] ExprError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("result conversion failed: {0}")]
    Conversion(#[from] serde_json::Error),
}

impl DataSourceError {
    pub fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        DataSourceError::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    /// Wrap a store failure, surfacing store-side cancellation as `Cancelled`.
    pub fn from_store(err: StoreError) -> Self {
        match err.kind {
            StoreErrorKind::Cancelled => DataSourceError::Cancelled,
            _ => DataSourceError::Store(err),
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            DataSourceError::NotFound(_) => true,
            DataSourceError::Store(e) => e.is_not_found(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DataSourceError>;
