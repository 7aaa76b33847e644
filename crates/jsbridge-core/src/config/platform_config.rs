//! Platform creation settings.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

use super::LoaderConfig;

/// Settings for the process-wide platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Argument vector handed to the engine at platform creation.
    /// The first entry is the conventional program name.
    pub args: Vec<String>,

    /// Engine library location strategy.
    pub loader: LoaderConfig,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            args: vec!["node".to_string()],
            loader: LoaderConfig::default(),
        }
    }
}

impl PlatformConfig {
    /// Parse from a TOML string, falling back to defaults for missing keys.
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
    fn defaults_carry_program_name() {
        let config = PlatformConfig::default();
        assert_eq!(config.args, vec!["node".to_string()]);
        assert!(config.loader.library_path.is_none());
    }

    #[test]
    fn from_toml_parses_partial_config() {
        let config = PlatformConfig::from_toml(
            r#"
            args = ["node", "--no-warnings"]

            [loader]
            platform_id = "linux-x64"
            "#,
        )
        .unwrap();
        assert_eq!(config.args.len(), 2);
        assert_eq!(config.loader.platform_id.as_deref(), Some("linux-x64"));
    }

    #[test]
    fn from_toml_rejects_invalid_toml() {
        assert!(PlatformConfig::from_toml("args = not-a-list").is_err());
    }
}
