//! Translation between raw engine statuses and host errors.
//!
//! Two directions cross here. Inbound, a non-ok status from an engine
//! call is paired with the engine's last-error info and raised as a
//! [`NodeError`]. Outbound, a host callback invoked by the engine must
//! never let an error or panic cross the C boundary; it is converted
//! into a thrown JavaScript error and a status code instead.

use std::panic::{self, AssertUnwindSafe};

use jsbridge_abi::{ApiResult, NodeApi};
use jsbridge_core::errors::{JsBridgeErrorCode, NodeError};
use jsbridge_core::status::Status;
use jsbridge_core::types::NativeEnv;

/// Build the host error for a failed call, consuming the engine's
/// last-error state for the message.
pub fn node_error(api: &dyn NodeApi, env: NativeEnv, status: Status) -> NodeError {
    let info = api.last_error_info(env);
    if status == Status::PendingException {
        NodeError::ExceptionPending {
            message: info.message,
        }
    } else {
        NodeError::Call {
            status,
            engine_error_code: info.engine_error_code,
            message: info.message,
        }
    }
}

/// Raise a raw call result into the host error model.
pub fn check<T>(api: &dyn NodeApi, env: NativeEnv, result: ApiResult<T>) -> Result<T, NodeError> {
    result.map_err(|status| node_error(api, env, status))
}

/// Render a panic payload for logging and thrown messages.
pub fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run a host callback on behalf of the engine.
///
/// Errors become thrown JavaScript errors (unless an exception is
/// already pending) and panics are absorbed; in both cases the status
/// the engine expects comes back instead of unwinding through C frames.
pub fn guard_host_callback<F>(api: &dyn NodeApi, env: NativeEnv, location: &str, f: F) -> Status
where
    F: FnOnce() -> Result<(), NodeError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Status::Ok,
        Ok(Err(e)) => {
            let pending = api.is_exception_pending(env).unwrap_or(false);
            if !pending {
                if let Err(status) = api.throw_error(env, Some(e.error_code()), &e.to_string()) {
                    tracing::error!(%status, location, "failed to throw host error into engine");
                }
            }
            e.status()
        }
        Err(payload) => {
            let message = panic_message(payload);
            tracing::error!(location, panic = %message, "host callback panicked");
            if let Err(status) = api.throw_error(env, None, &message) {
                tracing::error!(%status, location, "failed to throw panic message into engine");
            }
            Status::GenericFailure
        }
    }
}
