//! Platform and runtime lifecycle errors.

use super::binding_error::BindingError;
use super::error_code::{self, JsBridgeErrorCode};
use super::node_error::NodeError;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("platform already initialized for this process")]
    AlreadyInitialized,

    #[error("platform has been disposed; no further platform may be created in this process")]
    PlatformDisposed,

    #[error("{count} runtime(s) still alive; dispose them before the platform")]
    RuntimesAlive { count: usize },

    #[error("runtime startup failed: {reason}")]
    StartupFailed { reason: String },

    #[error("dispose may not be called from the runtime's own thread")]
    DisposeOnRuntimeThread,

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Native(#[from] NodeError),
}

impl JsBridgeErrorCode for LifecycleError {
    fn error_code(&self) -> &'static str {
        error_code::LIFECYCLE_ERROR
    }
}
