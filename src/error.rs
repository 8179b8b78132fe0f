//! Engine-level error types shared across compilation and execution.
//!
//! Compile phases report structured [`Diag`](crate::diag::Diag)s; the engine
//! facade converts them into [`EngineError`]s so callers see a single error
//! shape with a stable code, a recoverability flag, and free-form context.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// The closed set of error kinds the engine can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Lexer,
    Parser,
    Semantic,
    TypeCheck,
    Validation,
    Execution,
    Browser,
    Network,
    Timeout,
    Resource,
    Security,
    Permission,
    RateLimit,
    Cache,
}

impl ErrorKind {
    /// Stable machine-readable code for this kind.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Lexer => "LEXER_ERROR",
            ErrorKind::Parser => "PARSER_ERROR",
            ErrorKind::Semantic => "SEMANTIC_ERROR",
            ErrorKind::TypeCheck => "TYPE_CHECK_ERROR",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Execution => "EXECUTION_ERROR",
            ErrorKind::Browser => "BROWSER_ERROR",
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::Timeout => "TIMEOUT_ERROR",
            ErrorKind::Resource => "RESOURCE_ERROR",
            ErrorKind::Security => "SECURITY_ERROR",
            ErrorKind::Permission => "PERMISSION_ERROR",
            ErrorKind::RateLimit => "RATE_LIMIT_ERROR",
            ErrorKind::Cache => "CACHE_ERROR",
        }
    }

    /// Whether errors of this kind are recoverable by retrying or adjusting
    /// inputs. Compile-time kinds are never recoverable.
    pub fn default_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network
                | ErrorKind::Timeout
                | ErrorKind::Resource
                | ErrorKind::RateLimit
                | ErrorKind::Cache
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A single engine error with kind, message, recoverability, and context.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct EngineError {
    /// Which member of the closed kind set this error belongs to.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Whether the caller can meaningfully retry.
    pub recoverable: bool,
    /// Free-form context (line/column/token/field/step id/...).
    pub context: BTreeMap<String, String>,
}

impl EngineError {
    /// Creates an error of the given kind with the kind's default
    /// recoverability.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            recoverable: kind.default_recoverable(),
            context: BTreeMap::new(),
        }
    }

    /// Creates an execution error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Execution, message)
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Creates a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Attaches a context key/value pair.
    pub fn with_context(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Overrides the recoverability flag.
    pub fn with_recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    /// Stable code for this error.
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

/// Result alias used throughout the runtime half of the crate.
pub type EngineResult<T> = Result<T, EngineError>;
