//! Deterministic in-process engine double.
//!
//! `MockEngine` implements [`NodeApi`] over plain host state so the
//! runtime layer's invariants are testable without a real engine
//! library: scope LIFO discipline, value liveness across scope closes,
//! reference counting, escape-once, and a synthetic pending-work counter
//! for event-loop semantics. Every violation answers with the same
//! status a real engine would report, plus a recorded last-error
//! message.

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::Mutex;

use jsbridge_core::status::{ExtendedErrorInfo, Status};
use jsbridge_core::types::{
    NativeEnv, NativeEscapableScope, NativeHandleScope, NativePlatform, NativeRef, NativeValue,
    RunMode,
};

use crate::api::{ApiOp, ApiResult, ModuleInitFn, ModuleReleaseFn, NodeApi};

fn handle(id: u64) -> *mut c_void {
    id as *mut c_void
}

fn id_of(ptr: *mut c_void) -> u64 {
    ptr as u64
}

/// Internal outcome carrying the message that becomes last-error state.
type MockResult<T> = Result<T, (Status, String)>;

fn invalid(message: &str) -> (Status, String) {
    (Status::InvalidArg, message.to_string())
}

#[derive(Debug)]
struct ScopeRecord {
    id: u64,
    escapable: bool,
    escaped: bool,
}

#[derive(Debug)]
struct ValueRecord {
    /// Innermost scope at creation; `None` for environment-lifetime values.
    scope: Option<u64>,
    live: bool,
    /// Number of references with a positive count pinning this value.
    pins: u32,
}

#[derive(Debug)]
struct RefRecord {
    value: u64,
    count: u32,
    deleted: bool,
}

#[derive(Debug)]
struct EnvState {
    alive: bool,
    scopes: Vec<ScopeRecord>,
    values: HashMap<u64, ValueRecord>,
    refs: HashMap<u64, RefRecord>,
    pending_tasks: u32,
    pending_exception: Option<String>,
    /// (release callback, token) pairs owned by the engine until the
    /// environment is destroyed.
    module_releases: Vec<(ModuleReleaseFn, u64)>,
}

impl EnvState {
    fn new() -> Self {
        Self {
            alive: true,
            scopes: Vec::new(),
            values: HashMap::new(),
            refs: HashMap::new(),
            pending_tasks: 0,
            pending_exception: None,
            module_releases: Vec::new(),
        }
    }
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    platforms: HashMap<u64, bool>,
    envs: HashMap<u64, EnvState>,
    last_error: Option<(Status, String)>,
    released_tokens: Vec<u64>,
}

impl MockState {
    fn fresh_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn env_mut(&mut self, env: NativeEnv) -> MockResult<&mut EnvState> {
        self.envs
            .get_mut(&id_of(env.as_raw()))
            .filter(|e| e.alive)
            .ok_or_else(|| invalid("environment is not alive"))
    }

    /// Record the failure (if any) as the last-error state and convert
    /// to the raw status the real engine would return.
    fn seal<T>(&mut self, outcome: MockResult<T>) -> ApiResult<T> {
        match outcome {
            Ok(value) => Ok(value),
            Err((status, message)) => {
                self.last_error = Some((status, message));
                Err(status)
            }
        }
    }
}

/// In-process engine double. All state sits behind one mutex; the mock
/// is deliberately unconcerned with performance.
pub struct MockEngine {
    state: Mutex<MockState>,
    unsupported: Vec<ApiOp>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            unsupported: Vec::new(),
        }
    }

    /// A mock that reports the given operations as unavailable, for
    /// exercising capability probing.
    pub fn without_ops(unsupported: Vec<ApiOp>) -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            unsupported,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock engine poisoned")
    }

    // ---- test inspection helpers ----

    /// Seed the environment's event loop with `n` synthetic work items.
    pub fn push_pending_tasks(&self, env: NativeEnv, n: u32) {
        let mut state = self.lock();
        if let Ok(env_state) = state.env_mut(env) {
            env_state.pending_tasks += n;
        }
    }

    /// Whether a value is still usable. The core of use-after-close
    /// detection in tests.
    pub fn value_is_live(&self, env: NativeEnv, value: NativeValue) -> bool {
        let mut state = self.lock();
        state
            .env_mut(env)
            .ok()
            .and_then(|e| e.values.get(&id_of(value.as_raw())))
            .map(|v| v.live)
            .unwrap_or(false)
    }

    pub fn open_scope_count(&self, env: NativeEnv) -> usize {
        let mut state = self.lock();
        state.env_mut(env).map(|e| e.scopes.len()).unwrap_or(0)
    }

    pub fn env_is_alive(&self, env: NativeEnv) -> bool {
        self.lock()
            .envs
            .get(&id_of(env.as_raw()))
            .map(|e| e.alive)
            .unwrap_or(false)
    }

    /// Tokens whose release callback the engine has invoked.
    pub fn released_tokens(&self) -> Vec<u64> {
        self.lock().released_tokens.clone()
    }

    /// Create an environment-lifetime value directly, bypassing scripts.
    pub fn alloc_value(&self, env: NativeEnv) -> NativeValue {
        let mut state = self.lock();
        let id = state.fresh_id();
        if let Ok(env_state) = state.env_mut(env) {
            let scope = env_state.scopes.last().map(|s| s.id);
            env_state.values.insert(
                id,
                ValueRecord {
                    scope,
                    live: true,
                    pins: 0,
                },
            );
        }
        NativeValue::from_raw(handle(id))
    }

    fn open_scope(&self, env: NativeEnv, escapable: bool) -> ApiResult<u64> {
        let mut state = self.lock();
        let id = state.fresh_id();
        let outcome = state.env_mut(env).map(|env_state| {
            env_state.scopes.push(ScopeRecord {
                id,
                escapable,
                escaped: false,
            });
            id
        });
        state.seal(outcome)
    }

    fn close_scope(&self, env: NativeEnv, scope_id: u64, escapable: bool) -> ApiResult<()> {
        let mut state = self.lock();
        let outcome = (|| {
            let env_state = state.env_mut(env)?;
            let top_matches = env_state
                .scopes
                .last()
                .map(|top| top.id == scope_id && top.escapable == escapable)
                .unwrap_or(false);
            if !top_matches {
                return Err((
                    Status::HandleScopeMismatch,
                    "close does not target the innermost open scope".to_string(),
                ));
            }
            env_state.scopes.pop();
            // Values of the closed scope die unless pinned by a
            // positive-count reference.
            for value in env_state.values.values_mut() {
                if value.scope == Some(scope_id) && value.pins == 0 {
                    value.live = false;
                }
            }
            Ok(())
        })();
        state.seal(outcome)
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeApi for MockEngine {
    fn is_supported(&self, op: ApiOp) -> bool {
        !self.unsupported.contains(&op)
    }

    fn create_platform(&self, _args: &[String]) -> ApiResult<NativePlatform> {
        let mut state = self.lock();
        let id = state.fresh_id();
        state.platforms.insert(id, true);
        Ok(NativePlatform::from_raw(handle(id)))
    }

    fn destroy_platform(&self, platform: NativePlatform) -> ApiResult<()> {
        let mut state = self.lock();
        let outcome = match state.platforms.get_mut(&id_of(platform.as_raw())) {
            Some(alive) if *alive => {
                *alive = false;
                Ok(())
            }
            _ => Err(invalid("platform is not alive")),
        };
        state.seal(outcome)
    }

    fn create_environment(
        &self,
        platform: NativePlatform,
        _flags: i32,
        _args: &[String],
        _main_script: Option<&str>,
    ) -> ApiResult<NativeEnv> {
        let mut state = self.lock();
        let platform_alive = state
            .platforms
            .get(&id_of(platform.as_raw()))
            .copied()
            .unwrap_or(false);
        let outcome = if platform_alive {
            let id = state.fresh_id();
            state.envs.insert(id, EnvState::new());
            Ok(NativeEnv::from_raw(handle(id)))
        } else {
            Err(invalid("platform is not alive"))
        };
        state.seal(outcome)
    }

    fn destroy_environment(&self, env: NativeEnv) -> ApiResult<()> {
        let releases = {
            let mut state = self.lock();
            let outcome = state.env_mut(env).map(|env_state| {
                env_state.alive = false;
                std::mem::take(&mut env_state.module_releases)
            });
            state.seal(outcome)?
        };
        // Release callbacks fire exactly once per token, outside the
        // state lock because they call back into host code.
        for (release, token) in releases {
            release(token);
            self.lock().released_tokens.push(token);
        }
        Ok(())
    }

    fn run_event_loop(&self, env: NativeEnv, mode: RunMode) -> ApiResult<bool> {
        let mut state = self.lock();
        let outcome = (|| {
            let env_state = state.env_mut(env)?;
            match mode {
                RunMode::Default => {
                    env_state.pending_tasks = 0;
                    Ok(false)
                }
                RunMode::Once | RunMode::NoWait => {
                    if env_state.pending_tasks > 0 {
                        env_state.pending_tasks -= 1;
                    }
                    Ok(env_state.pending_tasks > 0)
                }
            }
        })();
        state.seal(outcome)
    }

    fn open_handle_scope(&self, env: NativeEnv) -> ApiResult<NativeHandleScope> {
        self.open_scope(env, false)
            .map(|id| NativeHandleScope::from_raw(handle(id)))
    }

    fn close_handle_scope(&self, env: NativeEnv, scope: NativeHandleScope) -> ApiResult<()> {
        self.close_scope(env, id_of(scope.as_raw()), false)
    }

    fn open_escapable_scope(&self, env: NativeEnv) -> ApiResult<NativeEscapableScope> {
        self.open_scope(env, true)
            .map(|id| NativeEscapableScope::from_raw(handle(id)))
    }

    fn close_escapable_scope(&self, env: NativeEnv, scope: NativeEscapableScope) -> ApiResult<()> {
        self.close_scope(env, id_of(scope.as_raw()), true)
    }

    fn escape_handle(
        &self,
        env: NativeEnv,
        scope: NativeEscapableScope,
        value: NativeValue,
    ) -> ApiResult<NativeValue> {
        let scope_id = id_of(scope.as_raw());
        let value_id = id_of(value.as_raw());
        let mut state = self.lock();
        let outcome = (|| {
            let env_state = state.env_mut(env)?;
            let position = env_state
                .scopes
                .iter()
                .position(|s| s.id == scope_id)
                .ok_or_else(|| invalid("scope is not open"))?;
            if !env_state.scopes[position].escapable {
                return Err(invalid("scope is not escapable"));
            }
            if env_state.scopes[position].escaped {
                return Err((
                    Status::EscapeCalledTwice,
                    "escape was already called on this scope".to_string(),
                ));
            }
            let parent = position.checked_sub(1).map(|i| env_state.scopes[i].id);
            let record = env_state
                .values
                .get_mut(&value_id)
                .filter(|r| r.live)
                .ok_or_else(|| invalid("value is not live"))?;
            record.scope = parent;
            env_state.scopes[position].escaped = true;
            Ok(value)
        })();
        state.seal(outcome)
    }

    fn create_reference(
        &self,
        env: NativeEnv,
        value: NativeValue,
        initial_count: u32,
    ) -> ApiResult<NativeRef> {
        let value_id = id_of(value.as_raw());
        let mut state = self.lock();
        let id = state.fresh_id();
        let outcome = (|| {
            let env_state = state.env_mut(env)?;
            let record = env_state
                .values
                .get_mut(&value_id)
                .filter(|r| r.live)
                .ok_or_else(|| invalid("value is not live"))?;
            if initial_count > 0 {
                record.pins += 1;
            }
            env_state.refs.insert(
                id,
                RefRecord {
                    value: value_id,
                    count: initial_count,
                    deleted: false,
                },
            );
            Ok(NativeRef::from_raw(handle(id)))
        })();
        state.seal(outcome)
    }

    fn reference_ref(&self, env: NativeEnv, reference: NativeRef) -> ApiResult<u32> {
        let ref_id = id_of(reference.as_raw());
        let mut state = self.lock();
        let outcome = (|| {
            let env_state = state.env_mut(env)?;
            let record = env_state
                .refs
                .get_mut(&ref_id)
                .filter(|r| !r.deleted)
                .ok_or_else(|| invalid("reference is not live"))?;
            record.count += 1;
            let count = record.count;
            let value_id = record.value;
            // Crossing zero re-pins the referent.
            if count == 1 {
                if let Some(value) = env_state.values.get_mut(&value_id) {
                    value.pins += 1;
                }
            }
            Ok(count)
        })();
        state.seal(outcome)
    }

    fn reference_unref(&self, env: NativeEnv, reference: NativeRef) -> ApiResult<u32> {
        let ref_id = id_of(reference.as_raw());
        let mut state = self.lock();
        let outcome = (|| {
            let env_state = state.env_mut(env)?;
            let record = env_state
                .refs
                .get_mut(&ref_id)
                .filter(|r| !r.deleted)
                .ok_or_else(|| invalid("reference is not live"))?;
            if record.count == 0 {
                return Err((
                    Status::GenericFailure,
                    "reference count is already zero".to_string(),
                ));
            }
            record.count -= 1;
            let count = record.count;
            let value_id = record.value;
            if count == 0 {
                if let Some(value) = env_state.values.get_mut(&value_id) {
                    value.pins = value.pins.saturating_sub(1);
                }
            }
            Ok(count)
        })();
        state.seal(outcome)
    }

    fn delete_reference(&self, env: NativeEnv, reference: NativeRef) -> ApiResult<()> {
        let ref_id = id_of(reference.as_raw());
        let mut state = self.lock();
        let outcome = (|| {
            let env_state = state.env_mut(env)?;
            let record = env_state
                .refs
                .get_mut(&ref_id)
                .filter(|r| !r.deleted)
                .ok_or_else(|| invalid("reference already deleted"))?;
            record.deleted = true;
            Ok(())
        })();
        state.seal(outcome)
    }

    fn last_error_info(&self, _env: NativeEnv) -> ExtendedErrorInfo {
        let state = self.lock();
        match &state.last_error {
            Some((status, message)) => ExtendedErrorInfo {
                message: message.clone(),
                engine_error_code: 0,
                status: *status,
            },
            None => ExtendedErrorInfo::from_status(Status::GenericFailure),
        }
    }

    fn throw_error(&self, env: NativeEnv, code: Option<&str>, message: &str) -> ApiResult<()> {
        let rendered = match code {
            Some(code) => format!("[{code}] {message}"),
            None => message.to_string(),
        };
        let mut state = self.lock();
        let outcome = state.env_mut(env).map(|env_state| {
            env_state.pending_exception = Some(rendered);
        });
        state.seal(outcome)
    }

    fn is_exception_pending(&self, env: NativeEnv) -> ApiResult<bool> {
        let mut state = self.lock();
        let outcome = state
            .env_mut(env)
            .map(|env_state| env_state.pending_exception.is_some());
        state.seal(outcome)
    }

    fn run_script(&self, env: NativeEnv, _source: &str) -> ApiResult<NativeValue> {
        // Scripts are not evaluated; the result is a fresh live value in
        // the innermost scope (or environment lifetime when none is open).
        {
            let mut state = self.lock();
            let outcome = state.env_mut(env).map(|_| ());
            state.seal(outcome)?;
        }
        Ok(self.alloc_value(env))
    }

    fn add_module(
        &self,
        env: NativeEnv,
        _name: &str,
        init: ModuleInitFn,
        release: ModuleReleaseFn,
        data: u64,
    ) -> ApiResult<()> {
        {
            let mut state = self.lock();
            let outcome = state.env_mut(env).map(|_| ());
            state.seal(outcome)?;
        }
        // The double "loads" the module immediately: the initializer runs
        // with a fresh exports object, and the release callback is parked
        // until environment teardown. The initializer runs unlocked since
        // it calls back into host code.
        let exports = self.alloc_value(env);
        let _ = init(env, exports, data);
        let mut state = self.lock();
        let outcome = state.env_mut(env).map(|env_state| {
            env_state.module_releases.push((release, data));
        });
        state.seal(outcome)
    }

    fn fatal_error(&self, location: &str, message: &str) -> ! {
        // Stand-in for process abort so the condition is observable in
        // tests.
        panic!("fatal engine condition at {location}: {message}");
    }
}
