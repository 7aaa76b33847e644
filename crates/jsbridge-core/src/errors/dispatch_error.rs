//! Cross-thread dispatch failures.

use super::error_code::{self, JsBridgeErrorCode};
use super::node_error::NodeError;

/// Failures observed by a submitter of cross-thread work. An error
/// raised inside the work item is captured and re-raised here, never
/// lost on the runtime thread.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("runtime was disposed before the work item could run")]
    RuntimeDisposed,

    #[error("work item failed: {0}")]
    WorkFailed(#[from] NodeError),

    #[error("work item panicked: {message}")]
    WorkPanicked { message: String },
}

impl JsBridgeErrorCode for DispatchError {
    fn error_code(&self) -> &'static str {
        error_code::DISPATCH_ERROR
    }
}
