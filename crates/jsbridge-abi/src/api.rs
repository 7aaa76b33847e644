//! The capability-checked engine API surface.
//!
//! One trait method per bound entry point, each returning the raw
//! [`Status`] on failure; translation into host errors happens in the
//! runtime layer's mapper. An `is_supported` query replaces the
//! "every method throws by default" pattern: callers branch on
//! capability instead of catching.
//!
//! The trait is also the interception seam: a tracing decorator can wrap
//! any `NodeApi` without the rest of the stack noticing.

use jsbridge_core::status::{ExtendedErrorInfo, Status};
use jsbridge_core::types::{
    NativeEnv, NativeEscapableScope, NativeHandleScope, NativePlatform, NativeRef, NativeValue,
    RunMode,
};

/// Result of a raw engine call. The runtime layer pairs the status with
/// the engine's last-error info before surfacing it to hosts.
pub type ApiResult<T> = Result<T, Status>;

/// Module initializer invoked by the engine: receives the environment,
/// the exports object, and the registration token, and returns the
/// (possibly replaced) exports.
pub type ModuleInitFn = extern "C" fn(NativeEnv, NativeValue, u64) -> NativeValue;

/// Invoked by the engine exactly once when it no longer needs a
/// registration token.
pub type ModuleReleaseFn = extern "C" fn(u64);

/// Operations of the bound surface, for capability probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiOp {
    CreatePlatform,
    DestroyPlatform,
    CreateEnvironment,
    DestroyEnvironment,
    RunEventLoop,
    OpenHandleScope,
    CloseHandleScope,
    OpenEscapableScope,
    CloseEscapableScope,
    EscapeHandle,
    CreateReference,
    ReferenceRef,
    ReferenceUnref,
    DeleteReference,
    LastErrorInfo,
    ThrowError,
    IsExceptionPending,
    RunScript,
    AddModule,
    FatalError,
}

impl ApiOp {
    /// The C entry point implementing this operation.
    pub fn symbol_name(self) -> &'static str {
        match self {
            ApiOp::CreatePlatform => "napi_create_platform",
            ApiOp::DestroyPlatform => "napi_destroy_platform",
            ApiOp::CreateEnvironment => "napi_create_environment",
            ApiOp::DestroyEnvironment => "napi_destroy_environment",
            ApiOp::RunEventLoop => "napi_run_event_loop",
            ApiOp::OpenHandleScope => "napi_open_handle_scope",
            ApiOp::CloseHandleScope => "napi_close_handle_scope",
            ApiOp::OpenEscapableScope => "napi_open_escapable_handle_scope",
            ApiOp::CloseEscapableScope => "napi_close_escapable_handle_scope",
            ApiOp::EscapeHandle => "napi_escape_handle",
            ApiOp::CreateReference => "napi_create_reference",
            ApiOp::ReferenceRef => "napi_reference_ref",
            ApiOp::ReferenceUnref => "napi_reference_unref",
            ApiOp::DeleteReference => "napi_delete_reference",
            ApiOp::LastErrorInfo => "napi_get_last_error_info",
            ApiOp::ThrowError => "napi_throw_error",
            ApiOp::IsExceptionPending => "napi_is_exception_pending",
            ApiOp::RunScript => "napi_run_script",
            ApiOp::AddModule => "node_embedding_add_module",
            ApiOp::FatalError => "napi_fatal_error",
        }
    }
}

/// The bound engine surface.
///
/// Thread discipline is the caller's contract, not this trait's: every
/// method taking a [`NativeEnv`] must run on that environment's thread.
/// Platform-level methods are callable from any thread; the engine
/// serializes them internally.
pub trait NodeApi: Send + Sync {
    /// Whether the loaded library exports this operation.
    fn is_supported(&self, op: ApiOp) -> bool;

    // ---- Platform ----
    fn create_platform(&self, args: &[String]) -> ApiResult<NativePlatform>;
    fn destroy_platform(&self, platform: NativePlatform) -> ApiResult<()>;

    // ---- Environment ----
    fn create_environment(
        &self,
        platform: NativePlatform,
        flags: i32,
        args: &[String],
        main_script: Option<&str>,
    ) -> ApiResult<NativeEnv>;
    fn destroy_environment(&self, env: NativeEnv) -> ApiResult<()>;

    /// Pump the environment's event loop. Returns whether more work
    /// remains scheduled.
    fn run_event_loop(&self, env: NativeEnv, mode: RunMode) -> ApiResult<bool>;

    // ---- Scopes ----
    fn open_handle_scope(&self, env: NativeEnv) -> ApiResult<NativeHandleScope>;
    fn close_handle_scope(&self, env: NativeEnv, scope: NativeHandleScope) -> ApiResult<()>;
    fn open_escapable_scope(&self, env: NativeEnv) -> ApiResult<NativeEscapableScope>;
    fn close_escapable_scope(&self, env: NativeEnv, scope: NativeEscapableScope) -> ApiResult<()>;
    fn escape_handle(
        &self,
        env: NativeEnv,
        scope: NativeEscapableScope,
        value: NativeValue,
    ) -> ApiResult<NativeValue>;

    // ---- References ----
    fn create_reference(
        &self,
        env: NativeEnv,
        value: NativeValue,
        initial_count: u32,
    ) -> ApiResult<NativeRef>;
    fn reference_ref(&self, env: NativeEnv, reference: NativeRef) -> ApiResult<u32>;
    fn reference_unref(&self, env: NativeEnv, reference: NativeRef) -> ApiResult<u32>;
    fn delete_reference(&self, env: NativeEnv, reference: NativeRef) -> ApiResult<()>;

    // ---- Errors ----
    /// Snapshot of the engine's last-error state. Infallible: when the
    /// engine cannot be queried a status-derived fallback is returned.
    fn last_error_info(&self, env: NativeEnv) -> ExtendedErrorInfo;
    fn throw_error(&self, env: NativeEnv, code: Option<&str>, message: &str) -> ApiResult<()>;
    fn is_exception_pending(&self, env: NativeEnv) -> ApiResult<bool>;

    // ---- Script & modules ----
    fn run_script(&self, env: NativeEnv, source: &str) -> ApiResult<NativeValue>;
    fn add_module(
        &self,
        env: NativeEnv,
        name: &str,
        init: ModuleInitFn,
        release: ModuleReleaseFn,
        data: u64,
    ) -> ApiResult<()>;

    // ---- Fatal ----
    /// Report an unrecoverable native condition. Never returns.
    fn fatal_error(&self, location: &str, message: &str) -> !;
}
