//! Stable machine-readable error codes.

/// Every jsbridge error enum exposes a stable code for log filtering
/// and host-side dispatch.
pub trait JsBridgeErrorCode {
    fn error_code(&self) -> &'static str;
}

pub const BINDING_ERROR: &str = "JSB_BINDING";
pub const CONFIG_ERROR: &str = "JSB_CONFIG";
pub const NODE_ERROR: &str = "JSB_NODE";
pub const SCOPE_ERROR: &str = "JSB_SCOPE";
pub const DISPATCH_ERROR: &str = "JSB_DISPATCH";
pub const LIFECYCLE_ERROR: &str = "JSB_LIFECYCLE";
pub const REGISTRY_ERROR: &str = "JSB_REGISTRY";
