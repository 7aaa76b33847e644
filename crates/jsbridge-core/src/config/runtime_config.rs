//! Runtime (environment) creation settings.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Flags controlling process-wide side effects of a runtime.
///
/// Packed into a bitmask when crossing the C ABI; bit positions are
/// part of the engine contract and must not be reordered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeFlags {
    /// The runtime owns (and may rewrite) the process title.
    pub own_process_title: bool,
    /// Install the engine's inspector signal handlers.
    pub handle_inspector_signals: bool,
    /// Permit loading native addons.
    pub allow_addons: bool,
    /// Do not consult global module search paths.
    pub suppress_global_search_paths: bool,
    /// Expose browser-style globals on the global object.
    pub expose_browser_globals: bool,
}

impl Default for RuntimeFlags {
    fn default() -> Self {
        Self {
            own_process_title: false,
            handle_inspector_signals: true,
            allow_addons: true,
            suppress_global_search_paths: false,
            expose_browser_globals: false,
        }
    }
}

impl RuntimeFlags {
    /// Pack into the engine's flag bitmask.
    pub fn to_bits(self) -> i32 {
        let mut bits = 0;
        if self.own_process_title {
            bits |= 1 << 0;
        }
        if self.handle_inspector_signals {
            bits |= 1 << 1;
        }
        if self.allow_addons {
            bits |= 1 << 2;
        }
        if self.suppress_global_search_paths {
            bits |= 1 << 3;
        }
        if self.expose_browser_globals {
            bits |= 1 << 4;
        }
        bits
    }
}

/// Serializable part of runtime creation settings. Hooks and statically
/// registered modules are configured on `RuntimeSettings` in the runtime
/// crate.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RuntimeConfig {
    pub flags: RuntimeFlags,

    /// Per-runtime argument vector (appended after the platform args).
    pub args: Vec<String>,
}

impl RuntimeConfig {
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_flags_bits() {
        // inspector signals + addons
        assert_eq!(RuntimeFlags::default().to_bits(), 0b110);
    }

    #[test]
    fn all_flags_set_all_bits() {
        let flags = RuntimeFlags {
            own_process_title: true,
            handle_inspector_signals: true,
            allow_addons: true,
            suppress_global_search_paths: true,
            expose_browser_globals: true,
        };
        assert_eq!(flags.to_bits(), 0b11111);
    }

    #[test]
    fn from_toml_overrides_single_flag() {
        let config = RuntimeConfig::from_toml(
            r#"
            [flags]
            expose_browser_globals = true
            "#,
        )
        .unwrap();
        assert!(config.flags.expose_browser_globals);
        // untouched keys keep their defaults
        assert!(config.flags.allow_addons);
    }
}
