//! Lazily-resolved entry point slots.
//!
//! Each bound engine function owns one [`SymbolSlot`]. The first call
//! resolves the symbol and caches the outcome; later calls reuse it with
//! no lookup cost. A missing symbol fails permanently — the slot never
//! retries.

use std::sync::OnceLock;

use jsbridge_core::errors::BindingError;

use crate::loader::EngineLibrary;

/// Observable resolution state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// No resolution attempted yet.
    Unresolved,
    /// Resolved; the cached pointer is served on every call.
    Resolved,
    /// The library lacks this symbol; every call fails deterministically.
    Absent,
}

/// A named, lazily-bound function pointer of signature `T`.
///
/// Resolution is idempotent under concurrent first use: `OnceLock`
/// guarantees exactly one underlying lookup, and every caller observes
/// the same cached result.
pub struct SymbolSlot<T: Copy + 'static> {
    name: &'static str,
    cell: OnceLock<Result<T, BindingError>>,
}

impl<T: Copy + 'static> SymbolSlot<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            cell: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Resolve through the library, caching the outcome.
    pub fn get(&self, lib: &EngineLibrary) -> Result<T, BindingError> {
        self.resolve_with(|| lib.symbol::<T>(self.name))
    }

    /// Resolve with a custom resolver. The resolver runs at most once,
    /// even under concurrent first use.
    pub fn resolve_with(
        &self,
        resolver: impl FnOnce() -> Result<T, BindingError>,
    ) -> Result<T, BindingError> {
        self.cell
            .get_or_init(|| match resolver() {
                Ok(ptr) => Ok(ptr),
                Err(e) => {
                    tracing::warn!(symbol = self.name, error = %e, "entry point resolution failed");
                    Err(e)
                }
            })
            .clone()
    }

    pub fn state(&self) -> SlotState {
        match self.cell.get() {
            None => SlotState::Unresolved,
            Some(Ok(_)) => SlotState::Resolved,
            Some(Err(_)) => SlotState::Absent,
        }
    }
}

/// Declares the engine's symbol table: one lazily-bound slot per entry
/// point, an accessor per slot, and a name-based capability probe.
///
/// Adding a binding is a one-line change here; the resolution, caching,
/// and availability behavior is shared.
#[macro_export]
macro_rules! symbol_table {
    (
        $(#[$meta:meta])*
        pub struct $table:ident {
            $( $name:ident : $ty:ty ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        pub struct $table {
            lib: $crate::loader::EngineLibrary,
            $( $name: $crate::symbols::SymbolSlot<$ty>, )+
        }

        impl $table {
            pub fn new(lib: $crate::loader::EngineLibrary) -> Self {
                Self {
                    lib,
                    $( $name: $crate::symbols::SymbolSlot::new(stringify!($name)), )+
                }
            }

            $(
                pub fn $name(
                    &self,
                ) -> Result<$ty, jsbridge_core::errors::BindingError> {
                    self.$name.get(&self.lib)
                }
            )+

            /// Capability probe: true when the library exports the entry
            /// point. The probe performs (and caches) the resolution.
            pub fn is_available(&self, name: &str) -> bool {
                match name {
                    $( stringify!($name) => self.$name.get(&self.lib).is_ok(), )+
                    _ => false,
                }
            }

            pub fn library(&self) -> &$crate::loader::EngineLibrary {
                &self.lib
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type Thunk = fn() -> i32;

    fn forty_two() -> i32 {
        42
    }

    #[test]
    fn resolution_is_cached() {
        let slot: SymbolSlot<Thunk> = SymbolSlot::new("thunk");
        assert_eq!(slot.state(), SlotState::Unresolved);

        let calls = AtomicUsize::new(0);
        let resolve = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(forty_two as Thunk)
        };
        let first = slot.resolve_with(resolve).unwrap();
        let second = slot
            .resolve_with(|| panic!("second resolution must not run"))
            .unwrap();
        assert_eq!(first(), 42);
        assert_eq!(second(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(slot.state(), SlotState::Resolved);
    }

    #[test]
    fn absence_is_permanent() {
        let slot: SymbolSlot<Thunk> = SymbolSlot::new("missing");
        let err = slot
            .resolve_with(|| {
                Err(jsbridge_core::errors::BindingError::EntryPointNotFound { symbol: "missing" })
            })
            .unwrap_err();
        assert!(matches!(
            err,
            jsbridge_core::errors::BindingError::EntryPointNotFound { symbol: "missing" }
        ));
        assert_eq!(slot.state(), SlotState::Absent);

        // The slot never retries, even with a resolver that would succeed.
        assert!(slot.resolve_with(|| Ok(forty_two as Thunk)).is_err());
    }

    #[test]
    fn concurrent_first_use_resolves_once() {
        let slot: Arc<SymbolSlot<Thunk>> = Arc::new(SymbolSlot::new("thunk"));
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let slot = Arc::clone(&slot);
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    slot.resolve_with(|| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(forty_two as Thunk)
                    })
                    .unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap()(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
