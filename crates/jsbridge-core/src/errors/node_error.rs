//! Failures reported by the engine through status codes.

use crate::status::Status;

use super::error_code::{self, JsBridgeErrorCode};

/// A non-ok status from a native call, carrying the engine's last-error
/// message. Recoverable by the caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NodeError {
    #[error("native call failed with {status}: {message}")]
    Call {
        status: Status,
        engine_error_code: u32,
        message: String,
    },

    #[error("JavaScript exception pending: {message}")]
    ExceptionPending { message: String },
}

impl NodeError {
    /// The status code to hand back across the C ABI when this error
    /// must be reported to the engine instead of raised in the host.
    pub fn status(&self) -> Status {
        match self {
            NodeError::Call { status, .. } => *status,
            NodeError::ExceptionPending { .. } => Status::PendingException,
        }
    }
}

impl JsBridgeErrorCode for NodeError {
    fn error_code(&self) -> &'static str {
        error_code::NODE_ERROR
    }
}
