//! Error taxonomy for configuration, evaluation, and remote operations.
//!
//! `ConfigError` is fatal and pre-run: the rule tree must be fixed before
//! anything is mutated. `EvalError` is scoped to one binding combination and
//! only skips it. `ProviderError` is scoped to one remote call and carries a
//! transient/permanent classification supplied by the provider.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed definition at '{path}': {reason}")]
    MalformedDefinition { path: String, reason: String },
    #[error("duplicate label definition '{name}'")]
    DuplicateName { name: String },
    #[error("invalid regex '{pattern}' at '{path}': {source}")]
    RegexCompile {
        path: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid target '{spec}': {reason}")]
    InvalidTarget { spec: String, reason: String },
}

impl ConfigError {
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::MalformedDefinition {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("unresolved reference '{path}'")]
    UnresolvedReference { path: String },
    #[error("index {index} out of range in '{path}'")]
    IndexOutOfRange { path: String, index: usize },
    #[error("unknown predicate '{name}'")]
    UnknownPredicate { name: String },
    #[error("predicate '{name}' takes {expected} argument(s), got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("type error: {0}")]
    Type(String),
    #[error("syntax error: {0}")]
    Syntax(String),
}

/// Error reported by the repository data provider for one remote call.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
    /// Whether the provider classified the failure as retryable.
    pub transient: bool,
}

impl ProviderError {
    pub fn permanent(message: impl Into<String>) -> Self {
        ProviderError {
            message: message.into(),
            transient: false,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        ProviderError {
            message: message.into(),
            transient: true,
        }
    }
}
