//! Callback correlation registry.
//!
//! Host state that must be reachable from a native callback is parked
//! here under an opaque token. The token is a pointer-sized value the
//! engine can carry and hand back later; it encodes a slot index plus a
//! generation counter so that a stale or doubly-released token is
//! detected deterministically instead of touching freed state.

use std::fmt;
use std::sync::Mutex;

use crate::errors::RegistryError;

/// Opaque, single-release correlation handle. The packed representation
/// (`index << 32 | generation`) fits the pointer-sized `data` argument
/// of native callback registration entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackToken(u64);

impl CallbackToken {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    fn pack(index: u32, generation: u32) -> Self {
        Self(((index as u64) << 32) | generation as u64)
    }

    fn index(self) -> u32 {
        (self.0 >> 32) as u32
    }

    fn generation(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for CallbackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

struct Slot<T> {
    generation: u32,
    state: Option<T>,
}

/// Arena of callback slots indexed by a stable integer id.
///
/// Release is exactly-once: whichever of the host-explicit and the
/// native-invoked release paths runs first wins; the second attempt is
/// rejected with [`RegistryError::AlreadyReleased`].
pub struct CallbackRegistry<T> {
    inner: Mutex<RegistryState<T>>,
}

struct RegistryState<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> CallbackRegistry<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryState {
                slots: Vec::new(),
                free: Vec::new(),
            }),
        }
    }

    /// Park `state` and return its token. Ownership stays with the
    /// registry until [`release`](Self::release).
    pub fn register(&self, state: T) -> CallbackToken {
        let mut inner = self.inner.lock().expect("registry poisoned");
        if let Some(index) = inner.free.pop() {
            let slot = &mut inner.slots[index as usize];
            debug_assert!(slot.state.is_none());
            slot.state = Some(state);
            return CallbackToken::pack(index, slot.generation);
        }
        let index = inner.slots.len() as u32;
        inner.slots.push(Slot {
            generation: 0,
            state: Some(state),
        });
        CallbackToken::pack(index, 0)
    }

    /// Clone the state behind a live token. The clone is taken under the
    /// lock and handed out, so the caller may run arbitrary code with it
    /// (including re-entering this registry) without holding the lock.
    pub fn get(&self, token: CallbackToken) -> Result<T, RegistryError>
    where
        T: Clone,
    {
        self.with(token, T::clone)
    }

    /// Borrow the state behind a live token. The registry lock is held
    /// for the duration of `f`; callbacks that may re-enter the registry
    /// must go through [`get`](Self::get) instead.
    pub fn with<R>(
        &self,
        token: CallbackToken,
        f: impl FnOnce(&T) -> R,
    ) -> Result<R, RegistryError> {
        let inner = self.inner.lock().expect("registry poisoned");
        let slot = inner
            .slots
            .get(token.index() as usize)
            .ok_or(RegistryError::UnknownToken { token: token.raw() })?;
        if slot.generation != token.generation() || slot.state.is_none() {
            return Err(RegistryError::AlreadyReleased { token: token.raw() });
        }
        Ok(f(slot.state.as_ref().expect("checked occupied")))
    }

    /// Free the slot and return the parked state. Exactly once per token;
    /// the slot's generation is bumped so the old token can never match
    /// again, even after the slot is reused.
    pub fn release(&self, token: CallbackToken) -> Result<T, RegistryError> {
        let mut inner = self.inner.lock().expect("registry poisoned");
        let slot = inner
            .slots
            .get_mut(token.index() as usize)
            .ok_or(RegistryError::UnknownToken { token: token.raw() })?;
        if slot.generation != token.generation() || slot.state.is_none() {
            return Err(RegistryError::AlreadyReleased { token: token.raw() });
        }
        let state = slot.state.take().expect("checked occupied");
        slot.generation = slot.generation.wrapping_add(1);
        let index = token.index();
        inner.free.push(index);
        tracing::debug!(token = %token, "callback token released");
        Ok(state)
    }

    /// Number of live (registered, unreleased) tokens.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("registry poisoned");
        inner.slots.iter().filter(|s| s.state.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for CallbackRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_resolve() {
        let registry = CallbackRegistry::new();
        let token = registry.register("hello".to_string());
        let len = registry.with(token, |s| s.len()).unwrap();
        assert_eq!(len, 5);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn release_returns_state_exactly_once() {
        let registry = CallbackRegistry::new();
        let token = registry.register(42u32);
        assert_eq!(registry.release(token).unwrap(), 42);
        assert_eq!(
            registry.release(token),
            Err(RegistryError::AlreadyReleased { token: token.raw() })
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn get_hands_out_a_clone_without_holding_the_lock() {
        let registry = CallbackRegistry::new();
        let token = registry.register(std::sync::Arc::new(5u32));
        let state = registry.get(token).unwrap();
        assert_eq!(*state, 5);

        // The registry is free while the clone is in use.
        let second = registry.register(std::sync::Arc::new(6u32));
        assert_eq!(*registry.get(second).unwrap(), 6);

        registry.release(token).unwrap();
        assert!(registry.get(token).is_err());
        registry.release(second).unwrap();
    }

    #[test]
    fn resolve_after_release_is_rejected() {
        let registry = CallbackRegistry::new();
        let token = registry.register(1u8);
        registry.release(token).unwrap();
        assert!(registry.with(token, |_| ()).is_err());
    }

    #[test]
    fn unknown_token_is_rejected() {
        let registry: CallbackRegistry<u8> = CallbackRegistry::new();
        let bogus = CallbackToken::from_raw(u64::MAX);
        assert_eq!(
            registry.with(bogus, |_| ()),
            Err(RegistryError::UnknownToken { token: u64::MAX })
        );
    }

    #[test]
    fn slot_reuse_invalidates_old_token() {
        let registry = CallbackRegistry::new();
        let first = registry.register("a");
        registry.release(first).unwrap();

        // The freed slot is reused with a bumped generation.
        let second = registry.register("b");
        assert_eq!(
            registry.release(first),
            Err(RegistryError::AlreadyReleased { token: first.raw() })
        );
        assert_eq!(registry.release(second).unwrap(), "b");
    }

    #[test]
    fn token_packing_round_trips() {
        let token = CallbackToken::pack(7, 3);
        assert_eq!(token.index(), 7);
        assert_eq!(token.generation(), 3);
        assert_eq!(CallbackToken::from_raw(token.raw()), token);
    }
}
