//! Error handling for jsbridge.
//! One error enum per subsystem, `thiserror` only, zero `anyhow`.

pub mod binding_error;
pub mod config_error;
pub mod dispatch_error;
pub mod error_code;
pub mod lifecycle_error;
pub mod node_error;
pub mod registry_error;
pub mod scope_error;

pub use binding_error::BindingError;
pub use config_error::ConfigError;
pub use dispatch_error::DispatchError;
pub use error_code::JsBridgeErrorCode;
pub use lifecycle_error::LifecycleError;
pub use node_error::NodeError;
pub use registry_error::RegistryError;
pub use scope_error::ScopeError;
