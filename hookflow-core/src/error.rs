//! Core error types.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Opaque error returned by user-supplied handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The registry a handler was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Check,
    OnSuccess,
    OnError,
    Adapter,
    Filter,
    Execute,
    CurrentState,
}

impl HandlerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::Check => "check",
            HandlerKind::OnSuccess => "on_success",
            HandlerKind::OnError => "on_error",
            HandlerKind::Adapter => "adapter",
            HandlerKind::Filter => "filter",
            HandlerKind::Execute => "execute",
            HandlerKind::CurrentState => "current_state",
        }
    }
}

impl PartialOrd for HandlerKind {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// Ordered by name so listings read alphabetically.
impl Ord for HandlerKind {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from the transition engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read definition '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported definition format: '{}'", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("engine '{engine}' has no {kind} function configured")]
    NotConfigured { engine: String, kind: HandlerKind },

    #[error("{kind} handler '{name}' is not registered")]
    HandlerNotRegistered { kind: HandlerKind, name: String },

    #[error("failed to resolve current state: {0}")]
    CurrentState(#[source] BoxError),

    #[error("transition not found: '{current}' -> '{target}' in state machine '{engine}'")]
    TransitionNotFound {
        current: String,
        target: String,
        engine: String,
    },

    #[error("nested engine entry '{name}' declares no target state")]
    MissingNestedTarget { name: String },

    #[error("{kind} handler '{name}' failed: {source}")]
    Handler {
        kind: HandlerKind,
        name: String,
        #[source]
        source: BoxError,
    },
}

impl CoreError {
    /// Returns whether this error comes from engine wiring rather than from a
    /// subject or handler.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CoreError::NotConfigured { .. }
                | CoreError::HandlerNotRegistered { .. }
                | CoreError::MissingNestedTarget { .. }
        )
    }

    /// Returns the underlying handler error, if this error wraps one.
    pub fn handler_source(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            CoreError::Handler { source, .. } | CoreError::CurrentState(source) => {
                Some(source.as_ref())
            }
            _ => None,
        }
    }

    /// Returns a stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::Io { .. } => "DEFINITION_IO_ERROR",
            CoreError::UnsupportedFormat { .. } => "BAD_DEFINITION",
            CoreError::Json(_) => "BAD_DEFINITION",
            CoreError::Yaml(_) => "BAD_DEFINITION",
            CoreError::NotConfigured { .. } => "NOT_CONFIGURED",
            CoreError::HandlerNotRegistered { .. } => "HANDLER_NOT_REGISTERED",
            CoreError::CurrentState(_) => "CURRENT_STATE_FAILED",
            CoreError::TransitionNotFound { .. } => "TRANSITION_NOT_FOUND",
            CoreError::MissingNestedTarget { .. } => "BAD_DEFINITION",
            CoreError::Handler { .. } => "HANDLER_FAILED",
        }
    }
}
