//! Callback correlation registry errors.

use super::error_code::{self, JsBridgeErrorCode};

/// Token misuse is deterministic: a second release attempt is rejected,
/// never a double-free.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("callback token {token:#x} was already released")]
    AlreadyReleased { token: u64 },

    #[error("callback token {token:#x} was never registered")]
    UnknownToken { token: u64 },
}

impl JsBridgeErrorCode for RegistryError {
    fn error_code(&self) -> &'static str {
        error_code::REGISTRY_ERROR
    }
}
