//! Production `NodeApi` implementation calling through the symbol table.
//!
//! Every wrapper follows the same shape: resolve the slot (cached after
//! first use), seed the out-parameter, make the unsafe C call, and fold
//! the raw status into an [`ApiResult`]. Required entry points are
//! verified eagerly at construction so binding errors surface at startup
//! instead of mid-call.

use std::ffi::{c_char, c_int, c_void, CStr, CString};

use jsbridge_core::errors::BindingError;
use jsbridge_core::status::{ExtendedErrorInfo, Status};
use jsbridge_core::types::{
    NativeEnv, NativeEscapableScope, NativeHandleScope, NativePlatform, NativeRef, NativeValue,
    RunMode,
};

use crate::api::{ApiOp, ApiResult, ModuleInitFn, ModuleReleaseFn, NodeApi};
use crate::loader::EngineLibrary;
use crate::symbol_table;

/// Node-API version requested at environment creation.
const NAPI_VERSION: i32 = 8;

/// Layout of the engine's last-error record.
#[repr(C)]
pub struct RawErrorInfo {
    pub error_message: *const c_char,
    pub engine_reserved: *mut c_void,
    pub engine_error_code: u32,
    pub error_code: i32,
}

symbol_table! {
    /// Lazily-bound entry points of the engine library.
    pub struct NodeSymbols {
        napi_create_platform: unsafe extern "C" fn(
            c_int,
            *const *const c_char,
            *mut NativePlatform,
        ) -> i32,
        napi_destroy_platform: unsafe extern "C" fn(NativePlatform) -> i32,
        napi_create_environment: unsafe extern "C" fn(
            NativePlatform,
            i32,
            c_int,
            *const *const c_char,
            *const c_char,
            i32,
            *mut NativeEnv,
        ) -> i32,
        napi_destroy_environment: unsafe extern "C" fn(NativeEnv) -> i32,
        napi_run_event_loop: unsafe extern "C" fn(NativeEnv, i32, *mut bool) -> i32,
        napi_open_handle_scope: unsafe extern "C" fn(NativeEnv, *mut NativeHandleScope) -> i32,
        napi_close_handle_scope: unsafe extern "C" fn(NativeEnv, NativeHandleScope) -> i32,
        napi_open_escapable_handle_scope: unsafe extern "C" fn(
            NativeEnv,
            *mut NativeEscapableScope,
        ) -> i32,
        napi_close_escapable_handle_scope: unsafe extern "C" fn(
            NativeEnv,
            NativeEscapableScope,
        ) -> i32,
        napi_escape_handle: unsafe extern "C" fn(
            NativeEnv,
            NativeEscapableScope,
            NativeValue,
            *mut NativeValue,
        ) -> i32,
        napi_create_reference: unsafe extern "C" fn(
            NativeEnv,
            NativeValue,
            u32,
            *mut NativeRef,
        ) -> i32,
        napi_reference_ref: unsafe extern "C" fn(NativeEnv, NativeRef, *mut u32) -> i32,
        napi_reference_unref: unsafe extern "C" fn(NativeEnv, NativeRef, *mut u32) -> i32,
        napi_delete_reference: unsafe extern "C" fn(NativeEnv, NativeRef) -> i32,
        napi_get_last_error_info: unsafe extern "C" fn(
            NativeEnv,
            *mut *const RawErrorInfo,
        ) -> i32,
        napi_throw_error: unsafe extern "C" fn(NativeEnv, *const c_char, *const c_char) -> i32,
        napi_is_exception_pending: unsafe extern "C" fn(NativeEnv, *mut bool) -> i32,
        napi_create_string_utf8: unsafe extern "C" fn(
            NativeEnv,
            *const c_char,
            usize,
            *mut NativeValue,
        ) -> i32,
        napi_run_script: unsafe extern "C" fn(NativeEnv, NativeValue, *mut NativeValue) -> i32,
        node_embedding_add_module: unsafe extern "C" fn(
            NativeEnv,
            *const c_char,
            ModuleInitFn,
            ModuleReleaseFn,
            u64,
        ) -> i32,
        napi_fatal_error: unsafe extern "C" fn(*const c_char, usize, *const c_char, usize) -> !,
    }
}

fn to_result<T>(raw: i32, value: T) -> ApiResult<T> {
    let status = Status::from_raw(raw);
    if status.is_ok() {
        Ok(value)
    } else {
        Err(status)
    }
}

/// Reported when a wrapper is invoked for an entry point the library
/// lacks. Required entries are verified at construction; this path is
/// reachable only for optional capabilities.
fn absent(e: &BindingError) -> Status {
    tracing::error!(error = %e, "call to unavailable entry point");
    Status::GenericFailure
}

fn c_string(value: &str) -> CString {
    // Interior NULs cannot cross the C boundary; truncate at the first.
    CString::new(value).unwrap_or_else(|e| {
        let pos = e.nul_position();
        let mut bytes = e.into_vec();
        bytes.truncate(pos);
        CString::new(bytes).expect("truncated at first NUL")
    })
}

pub struct LibNodeApi {
    symbols: NodeSymbols,
}

impl LibNodeApi {
    /// Bind against a loaded engine library, eagerly verifying every
    /// required entry point.
    pub fn new(lib: EngineLibrary) -> Result<Self, BindingError> {
        let symbols = NodeSymbols::new(lib);
        symbols.napi_create_platform()?;
        symbols.napi_destroy_platform()?;
        symbols.napi_create_environment()?;
        symbols.napi_destroy_environment()?;
        symbols.napi_run_event_loop()?;
        symbols.napi_open_handle_scope()?;
        symbols.napi_close_handle_scope()?;
        symbols.napi_open_escapable_handle_scope()?;
        symbols.napi_close_escapable_handle_scope()?;
        symbols.napi_escape_handle()?;
        symbols.napi_create_reference()?;
        symbols.napi_reference_ref()?;
        symbols.napi_reference_unref()?;
        symbols.napi_delete_reference()?;
        symbols.napi_get_last_error_info()?;
        symbols.napi_throw_error()?;
        symbols.napi_is_exception_pending()?;
        symbols.napi_create_string_utf8()?;
        symbols.napi_run_script()?;
        // node_embedding_add_module and napi_fatal_error are optional
        // capabilities; callers probe via is_supported.
        tracing::info!(
            path = %symbols.library().path().display(),
            "engine entry points bound"
        );
        Ok(Self { symbols })
    }

    pub fn symbols(&self) -> &NodeSymbols {
        &self.symbols
    }
}

impl NodeApi for LibNodeApi {
    fn is_supported(&self, op: ApiOp) -> bool {
        self.symbols.is_available(op.symbol_name())
    }

    fn create_platform(&self, args: &[String]) -> ApiResult<NativePlatform> {
        let f = self.symbols.napi_create_platform().map_err(|e| absent(&e))?;
        let owned: Vec<CString> = args.iter().map(|a| c_string(a)).collect();
        let argv: Vec<*const c_char> = owned.iter().map(|c| c.as_ptr()).collect();
        let mut platform = NativePlatform::null();
        let raw = unsafe { f(argv.len() as c_int, argv.as_ptr(), &mut platform) };
        to_result(raw, platform)
    }

    fn destroy_platform(&self, platform: NativePlatform) -> ApiResult<()> {
        let f = self.symbols.napi_destroy_platform().map_err(|e| absent(&e))?;
        to_result(unsafe { f(platform) }, ())
    }

    fn create_environment(
        &self,
        platform: NativePlatform,
        flags: i32,
        args: &[String],
        main_script: Option<&str>,
    ) -> ApiResult<NativeEnv> {
        let f = self
            .symbols
            .napi_create_environment()
            .map_err(|e| absent(&e))?;
        let owned: Vec<CString> = args.iter().map(|a| c_string(a)).collect();
        let argv: Vec<*const c_char> = owned.iter().map(|c| c.as_ptr()).collect();
        let script = main_script.map(c_string);
        let script_ptr = script.as_ref().map_or(std::ptr::null(), |s| s.as_ptr());
        let mut env = NativeEnv::null();
        let raw = unsafe {
            f(
                platform,
                flags,
                argv.len() as c_int,
                argv.as_ptr(),
                script_ptr,
                NAPI_VERSION,
                &mut env,
            )
        };
        to_result(raw, env)
    }

    fn destroy_environment(&self, env: NativeEnv) -> ApiResult<()> {
        let f = self
            .symbols
            .napi_destroy_environment()
            .map_err(|e| absent(&e))?;
        to_result(unsafe { f(env) }, ())
    }

    fn run_event_loop(&self, env: NativeEnv, mode: RunMode) -> ApiResult<bool> {
        let f = self.symbols.napi_run_event_loop().map_err(|e| absent(&e))?;
        let mut more = false;
        let raw = unsafe { f(env, mode as i32, &mut more) };
        to_result(raw, more)
    }

    fn open_handle_scope(&self, env: NativeEnv) -> ApiResult<NativeHandleScope> {
        let f = self
            .symbols
            .napi_open_handle_scope()
            .map_err(|e| absent(&e))?;
        let mut scope = NativeHandleScope::null();
        to_result(unsafe { f(env, &mut scope) }, scope)
    }

    fn close_handle_scope(&self, env: NativeEnv, scope: NativeHandleScope) -> ApiResult<()> {
        let f = self
            .symbols
            .napi_close_handle_scope()
            .map_err(|e| absent(&e))?;
        to_result(unsafe { f(env, scope) }, ())
    }

    fn open_escapable_scope(&self, env: NativeEnv) -> ApiResult<NativeEscapableScope> {
        let f = self
            .symbols
            .napi_open_escapable_handle_scope()
            .map_err(|e| absent(&e))?;
        let mut scope = NativeEscapableScope::null();
        to_result(unsafe { f(env, &mut scope) }, scope)
    }

    fn close_escapable_scope(&self, env: NativeEnv, scope: NativeEscapableScope) -> ApiResult<()> {
        let f = self
            .symbols
            .napi_close_escapable_handle_scope()
            .map_err(|e| absent(&e))?;
        to_result(unsafe { f(env, scope) }, ())
    }

    fn escape_handle(
        &self,
        env: NativeEnv,
        scope: NativeEscapableScope,
        value: NativeValue,
    ) -> ApiResult<NativeValue> {
        let f = self.symbols.napi_escape_handle().map_err(|e| absent(&e))?;
        let mut escaped = NativeValue::null();
        to_result(unsafe { f(env, scope, value, &mut escaped) }, escaped)
    }

    fn create_reference(
        &self,
        env: NativeEnv,
        value: NativeValue,
        initial_count: u32,
    ) -> ApiResult<NativeRef> {
        let f = self
            .symbols
            .napi_create_reference()
            .map_err(|e| absent(&e))?;
        let mut reference = NativeRef::null();
        to_result(unsafe { f(env, value, initial_count, &mut reference) }, reference)
    }

    fn reference_ref(&self, env: NativeEnv, reference: NativeRef) -> ApiResult<u32> {
        let f = self.symbols.napi_reference_ref().map_err(|e| absent(&e))?;
        let mut count = 0u32;
        to_result(unsafe { f(env, reference, &mut count) }, count)
    }

    fn reference_unref(&self, env: NativeEnv, reference: NativeRef) -> ApiResult<u32> {
        let f = self
            .symbols
            .napi_reference_unref()
            .map_err(|e| absent(&e))?;
        let mut count = 0u32;
        to_result(unsafe { f(env, reference, &mut count) }, count)
    }

    fn delete_reference(&self, env: NativeEnv, reference: NativeRef) -> ApiResult<()> {
        let f = self
            .symbols
            .napi_delete_reference()
            .map_err(|e| absent(&e))?;
        to_result(unsafe { f(env, reference) }, ())
    }

    fn last_error_info(&self, env: NativeEnv) -> ExtendedErrorInfo {
        let Ok(f) = self.symbols.napi_get_last_error_info() else {
            return ExtendedErrorInfo::from_status(Status::GenericFailure);
        };
        let mut info: *const RawErrorInfo = std::ptr::null();
        let raw = unsafe { f(env, &mut info) };
        if !Status::from_raw(raw).is_ok() || info.is_null() {
            return ExtendedErrorInfo::from_status(Status::from_raw(raw));
        }
        // SAFETY: the engine guarantees the record stays valid until the
        // next call on this env; we copy out of it immediately.
        unsafe {
            let record = &*info;
            let status = Status::from_raw(record.error_code);
            let message = if record.error_message.is_null() {
                status.message().to_string()
            } else {
                CStr::from_ptr(record.error_message)
                    .to_string_lossy()
                    .into_owned()
            };
            ExtendedErrorInfo {
                message,
                engine_error_code: record.engine_error_code,
                status,
            }
        }
    }

    fn throw_error(&self, env: NativeEnv, code: Option<&str>, message: &str) -> ApiResult<()> {
        let f = self.symbols.napi_throw_error().map_err(|e| absent(&e))?;
        let code = code.map(c_string);
        let code_ptr = code.as_ref().map_or(std::ptr::null(), |c| c.as_ptr());
        let message = c_string(message);
        to_result(unsafe { f(env, code_ptr, message.as_ptr()) }, ())
    }

    fn is_exception_pending(&self, env: NativeEnv) -> ApiResult<bool> {
        let f = self
            .symbols
            .napi_is_exception_pending()
            .map_err(|e| absent(&e))?;
        let mut pending = false;
        to_result(unsafe { f(env, &mut pending) }, pending)
    }

    fn run_script(&self, env: NativeEnv, source: &str) -> ApiResult<NativeValue> {
        let create = self
            .symbols
            .napi_create_string_utf8()
            .map_err(|e| absent(&e))?;
        let run = self.symbols.napi_run_script().map_err(|e| absent(&e))?;
        let mut script = NativeValue::null();
        let raw = unsafe { create(env, source.as_ptr() as *const c_char, source.len(), &mut script) };
        let script = to_result(raw, script)?;
        let mut result = NativeValue::null();
        to_result(unsafe { run(env, script, &mut result) }, result)
    }

    fn add_module(
        &self,
        env: NativeEnv,
        name: &str,
        init: ModuleInitFn,
        release: ModuleReleaseFn,
        data: u64,
    ) -> ApiResult<()> {
        let f = self
            .symbols
            .node_embedding_add_module()
            .map_err(|e| absent(&e))?;
        let name = c_string(name);
        to_result(unsafe { f(env, name.as_ptr(), init, release, data) }, ())
    }

    fn fatal_error(&self, location: &str, message: &str) -> ! {
        if let Ok(f) = self.symbols.napi_fatal_error() {
            let location_c = c_string(location);
            let message_c = c_string(message);
            // Never returns.
            unsafe {
                f(
                    location_c.as_ptr(),
                    location.len(),
                    message_c.as_ptr(),
                    message.len(),
                )
            }
        }
        tracing::error!(location, reason = message, "fatal engine condition; aborting");
        std::process::abort();
    }
}
