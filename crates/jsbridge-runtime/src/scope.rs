//! Handle scope discipline and ref-counted references.
//!
//! Scopes are tracked host-side as a strict stack of tokens. Closing
//! anything but the innermost open scope is refused before the engine is
//! even asked, so a misbehaving caller cannot corrupt engine state.
//! Escapable scopes additionally track their single permitted escape.

use std::sync::Arc;

use jsbridge_abi::NodeApi;
use jsbridge_core::errors::ScopeError;
use jsbridge_core::types::{NativeEnv, NativeEscapableScope, NativeHandleScope, NativeRef, NativeValue};

use crate::mapper;

/// Opaque identifier for one open scope. Tokens are never reused within
/// a session, so a stale token is always detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeToken(u64);

impl ScopeToken {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
enum RawScope {
    Plain(NativeHandleScope),
    Escapable(NativeEscapableScope),
}

#[derive(Debug)]
struct OpenScope {
    token: u64,
    raw: RawScope,
    escaped: bool,
}

/// Host-side mirror of the engine's scope stack for one environment.
pub(crate) struct ScopeStack {
    env: NativeEnv,
    api: Arc<dyn NodeApi>,
    stack: Vec<OpenScope>,
    next_token: u64,
}

impl ScopeStack {
    pub(crate) fn new(env: NativeEnv, api: Arc<dyn NodeApi>) -> Self {
        Self {
            env,
            api,
            stack: Vec::new(),
            next_token: 1,
        }
    }

    fn fresh_token(&mut self) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        token
    }

    pub(crate) fn open(&mut self) -> Result<ScopeToken, ScopeError> {
        let raw = mapper::check(self.api.as_ref(), self.env, self.api.open_handle_scope(self.env))?;
        let token = self.fresh_token();
        self.stack.push(OpenScope {
            token,
            raw: RawScope::Plain(raw),
            escaped: false,
        });
        tracing::trace!(token, depth = self.stack.len(), "handle scope opened");
        Ok(ScopeToken(token))
    }

    pub(crate) fn open_escapable(&mut self) -> Result<ScopeToken, ScopeError> {
        let raw = mapper::check(
            self.api.as_ref(),
            self.env,
            self.api.open_escapable_scope(self.env),
        )?;
        let token = self.fresh_token();
        self.stack.push(OpenScope {
            token,
            raw: RawScope::Escapable(raw),
            escaped: false,
        });
        tracing::trace!(token, depth = self.stack.len(), "escapable scope opened");
        Ok(ScopeToken(token))
    }

    /// Close the innermost open scope. Refused without touching the
    /// engine when `token` names any other scope.
    pub(crate) fn close(&mut self, token: ScopeToken) -> Result<(), ScopeError> {
        let top = match self.stack.last() {
            Some(top) => top,
            None => return Err(ScopeError::NoOpenScope),
        };
        if top.token != token.0 {
            if self.stack.iter().any(|s| s.token == token.0) {
                return Err(ScopeError::OutOfOrderClose {
                    expected: top.token,
                    got: token.0,
                });
            }
            return Err(ScopeError::UnknownScope { token: token.0 });
        }
        let raw = top.raw;
        match raw {
            RawScope::Plain(scope) => mapper::check(
                self.api.as_ref(),
                self.env,
                self.api.close_handle_scope(self.env, scope),
            )?,
            RawScope::Escapable(scope) => mapper::check(
                self.api.as_ref(),
                self.env,
                self.api.close_escapable_scope(self.env, scope),
            )?,
        }
        self.stack.pop();
        tracing::trace!(token = token.0, depth = self.stack.len(), "scope closed");
        Ok(())
    }

    /// Promote `value` into the scope enclosing the given escapable
    /// scope. At most once per scope.
    pub(crate) fn escape(
        &mut self,
        token: ScopeToken,
        value: NativeValue,
    ) -> Result<NativeValue, ScopeError> {
        let entry = self
            .stack
            .iter_mut()
            .find(|s| s.token == token.0)
            .ok_or(ScopeError::UnknownScope { token: token.0 })?;
        let scope = match entry.raw {
            RawScope::Escapable(scope) => scope,
            RawScope::Plain(_) => return Err(ScopeError::NotEscapable),
        };
        if entry.escaped {
            return Err(ScopeError::EscapeCalledTwice);
        }
        entry.escaped = true;
        let escaped = mapper::check(
            self.api.as_ref(),
            self.env,
            self.api.escape_handle(self.env, scope, value),
        )?;
        Ok(escaped)
    }

    pub(crate) fn depth(&self) -> usize {
        self.stack.len()
    }
}

/// A ref-counted engine reference keeping a value reachable across
/// scope closes. Pinned to the runtime thread like every other
/// environment-bound object.
pub struct Reference {
    raw: NativeRef,
    env: NativeEnv,
    api: Arc<dyn NodeApi>,
    deleted: bool,
}

impl Reference {
    pub(crate) fn create(
        api: Arc<dyn NodeApi>,
        env: NativeEnv,
        value: NativeValue,
        initial_count: u32,
    ) -> Result<Self, ScopeError> {
        let raw = mapper::check(api.as_ref(), env, api.create_reference(env, value, initial_count))?;
        Ok(Self {
            raw,
            env,
            api,
            deleted: false,
        })
    }

    /// Increment the count; returns the new count.
    pub fn ref_(&mut self) -> Result<u32, ScopeError> {
        if self.deleted {
            return Err(ScopeError::ReferenceDeleted);
        }
        Ok(mapper::check(
            self.api.as_ref(),
            self.env,
            self.api.reference_ref(self.env, self.raw),
        )?)
    }

    /// Decrement the count; returns the new count. At zero the referent
    /// is no longer pinned.
    pub fn unref(&mut self) -> Result<u32, ScopeError> {
        if self.deleted {
            return Err(ScopeError::ReferenceDeleted);
        }
        Ok(mapper::check(
            self.api.as_ref(),
            self.env,
            self.api.reference_unref(self.env, self.raw),
        )?)
    }

    /// Release the engine-side reference. Exactly once; further calls
    /// (including on drop) are refused.
    pub fn delete(&mut self) -> Result<(), ScopeError> {
        if self.deleted {
            return Err(ScopeError::ReferenceDeleted);
        }
        mapper::check(
            self.api.as_ref(),
            self.env,
            self.api.delete_reference(self.env, self.raw),
        )?;
        self.deleted = true;
        Ok(())
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl Drop for Reference {
    fn drop(&mut self) {
        if !self.deleted {
            if let Err(status) = self.api.delete_reference(self.env, self.raw) {
                tracing::warn!(%status, "reference cleanup failed on drop");
            }
        }
    }
}
