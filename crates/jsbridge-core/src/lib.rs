//! # jsbridge-core
//!
//! Foundation crate for the jsbridge embedding stack.
//! Defines status codes, opaque handle types, error enums, configuration,
//! and the callback correlation registry. Every other crate in the
//! workspace depends on this.

pub mod config;
pub mod errors;
pub mod registry;
pub mod status;
pub mod types;

// Re-export the most commonly used types at the crate root.
pub use config::{LoaderConfig, PlatformConfig, RuntimeConfig, RuntimeFlags};
pub use errors::{
    BindingError, ConfigError, DispatchError, JsBridgeErrorCode, LifecycleError, NodeError,
    RegistryError, ScopeError,
};
pub use registry::{CallbackRegistry, CallbackToken};
pub use status::{ExtendedErrorInfo, Status};
pub use types::{
    NativeEnv, NativeEscapableScope, NativeHandleScope, NativePlatform, NativeRef, NativeValue,
    RunMode,
};
