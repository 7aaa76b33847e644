//! Handle scope and reference invariant violations.

use super::error_code::{self, JsBridgeErrorCode};
use super::node_error::NodeError;

/// Scope discipline violations are programming errors and surface
/// immediately; they are never silently tolerated.
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error("scope closed out of order: innermost open scope is {expected}, got {got}")]
    OutOfOrderClose { expected: u64, got: u64 },

    #[error("no scope is open on this context")]
    NoOpenScope,

    #[error("unknown scope token {token}")]
    UnknownScope { token: u64 },

    #[error("escape was already called on this scope")]
    EscapeCalledTwice,

    #[error("escape is only valid on an escapable scope")]
    NotEscapable,

    #[error("reference was already deleted")]
    ReferenceDeleted,

    #[error(transparent)]
    Native(#[from] NodeError),
}

impl JsBridgeErrorCode for ScopeError {
    fn error_code(&self) -> &'static str {
        error_code::SCOPE_ERROR
    }
}
