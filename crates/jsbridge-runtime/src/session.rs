//! The per-environment entry surface handed to work items.
//!
//! An `EmbeddingSession` is the only way host code touches an
//! environment: every scope, script, and reference operation goes
//! through it. Sessions are pinned to the thread that owns the
//! environment and are passed explicitly into dispatched work instead
//! of living in thread-local storage.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

use jsbridge_abi::NodeApi;
use jsbridge_core::errors::{NodeError, ScopeError};
use jsbridge_core::types::{NativeEnv, NativeValue, RunMode};

use crate::mapper;
use crate::scope::{Reference, ScopeStack, ScopeToken};

/// Access to one live environment. `!Send`: a session never leaves the
/// thread the environment was created on.
pub struct EmbeddingSession {
    env: NativeEnv,
    api: Arc<dyn NodeApi>,
    scopes: RefCell<ScopeStack>,
    _not_send: PhantomData<*const ()>,
}

impl EmbeddingSession {
    /// Wrap a live environment. The caller must be on the environment's
    /// thread; the session cannot be moved off it afterwards.
    pub fn new(env: NativeEnv, api: Arc<dyn NodeApi>) -> Self {
        Self {
            env,
            api: Arc::clone(&api),
            scopes: RefCell::new(ScopeStack::new(env, api)),
            _not_send: PhantomData,
        }
    }

    pub fn env(&self) -> NativeEnv {
        self.env
    }

    pub fn api(&self) -> &Arc<dyn NodeApi> {
        &self.api
    }

    // ---- scopes ----

    pub fn open_scope(&self) -> Result<ScopeToken, ScopeError> {
        self.scopes.borrow_mut().open()
    }

    pub fn open_escapable_scope(&self) -> Result<ScopeToken, ScopeError> {
        self.scopes.borrow_mut().open_escapable()
    }

    pub fn close_scope(&self, token: ScopeToken) -> Result<(), ScopeError> {
        self.scopes.borrow_mut().close(token)
    }

    /// Promote a value out of an escapable scope. Once per scope.
    pub fn escape(&self, token: ScopeToken, value: NativeValue) -> Result<NativeValue, ScopeError> {
        self.scopes.borrow_mut().escape(token, value)
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.borrow().depth()
    }

    // ---- values & references ----

    /// Pin a value beyond its scope with an initial reference count.
    pub fn create_reference(
        &self,
        value: NativeValue,
        initial_count: u32,
    ) -> Result<Reference, ScopeError> {
        Reference::create(Arc::clone(&self.api), self.env, value, initial_count)
    }

    /// Evaluate a script source in this environment.
    pub fn run_script(&self, source: &str) -> Result<NativeValue, NodeError> {
        mapper::check(self.api.as_ref(), self.env, self.api.run_script(self.env, source))
    }

    pub fn throw_error(&self, code: Option<&str>, message: &str) -> Result<(), NodeError> {
        mapper::check(
            self.api.as_ref(),
            self.env,
            self.api.throw_error(self.env, code, message),
        )
    }

    pub fn is_exception_pending(&self) -> Result<bool, NodeError> {
        mapper::check(
            self.api.as_ref(),
            self.env,
            self.api.is_exception_pending(self.env),
        )
    }

    // ---- event loop ----

    /// Pump the environment's event loop. Returns whether more work
    /// remains scheduled.
    pub fn pump(&self, mode: RunMode) -> Result<bool, NodeError> {
        mapper::check(
            self.api.as_ref(),
            self.env,
            self.api.run_event_loop(self.env, mode),
        )
    }
}
