//! Library and symbol binding errors. Fatal at startup, never retried.

use super::error_code::{self, JsBridgeErrorCode};

/// Errors raised while locating the engine library or resolving its
/// entry points. `Clone` because resolution results are cached per slot.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BindingError {
    #[error("engine library not found; searched: {searched}")]
    LibraryNotFound { searched: String },

    #[error("failed to load engine library {path}: {reason}")]
    LibraryLoadFailed { path: String, reason: String },

    #[error("entry point `{symbol}` not found in engine library")]
    EntryPointNotFound { symbol: &'static str },
}

impl JsBridgeErrorCode for BindingError {
    fn error_code(&self) -> &'static str {
        error_code::BINDING_ERROR
    }
}
