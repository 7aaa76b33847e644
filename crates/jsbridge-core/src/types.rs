//! Opaque handle types shared between the host and the engine.
//!
//! Each handle wraps a raw pointer owned by the engine. The host never
//! dereferences these; it only passes them back through engine entry
//! points. Thread affinity is enforced by the runtime layer, not here:
//! handles without an explicit `Send`/`Sync` impl are pinned to the
//! thread that received them.

use std::ffi::c_void;

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        pub struct $name(*mut c_void);

        impl $name {
            /// Wrap a raw engine pointer.
            pub fn from_raw(ptr: *mut c_void) -> Self {
                Self(ptr)
            }

            /// The raw engine pointer.
            pub fn as_raw(self) -> *mut c_void {
                self.0
            }

            /// A null handle, used as an out-parameter seed.
            pub fn null() -> Self {
                Self(std::ptr::null_mut())
            }

            pub fn is_null(self) -> bool {
                self.0.is_null()
            }
        }
    };
}

opaque_handle! {
    /// One engine execution context. All scope, reference, and value
    /// operations target exactly one `NativeEnv`.
    NativeEnv
}

opaque_handle! {
    /// An engine-owned value. Only valid while its innermost enclosing
    /// scope is open, unless escaped or pinned by a reference.
    NativeValue
}

opaque_handle! {
    /// An open handle scope.
    NativeHandleScope
}

opaque_handle! {
    /// An open escapable handle scope.
    NativeEscapableScope
}

opaque_handle! {
    /// A ref-counted reference keeping a value reachable across scopes.
    NativeRef
}

opaque_handle! {
    /// One loaded engine instance, shared by all of its environments.
    NativePlatform
}

// SAFETY: a platform handle is created once per process and is only ever
// handed back to engine entry points, which serialize platform-level
// operations internally. Runtime threads need to carry it across the
// spawn boundary.
unsafe impl Send for NativePlatform {}
unsafe impl Sync for NativePlatform {}

/// Event-loop pump mode.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Run until no further work is scheduled.
    Default = 0,
    /// Block until at least one item completes, or return if none pending.
    Once = 1,
    /// Poll without blocking; report whether more work remains.
    NoWait = 2,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_handles_are_null() {
        assert!(NativeEnv::null().is_null());
        assert!(NativeValue::null().is_null());
    }

    #[test]
    fn handles_round_trip_raw_pointers() {
        let fake = 0x1234usize as *mut c_void;
        let env = NativeEnv::from_raw(fake);
        assert_eq!(env.as_raw(), fake);
        assert!(!env.is_null());
    }
}
