//! Configuration objects for the embedding stack.
//!
//! All of these are plain serde structs with compiled defaults; callers
//! hand them to `Platform` / `Runtime` construction. Hooks and other
//! non-serializable settings live next to the consuming component, not
//! here.

mod loader_config;
mod platform_config;
mod runtime_config;

pub use loader_config::LoaderConfig;
pub use platform_config::PlatformConfig;
pub use runtime_config::{RuntimeConfig, RuntimeFlags};
