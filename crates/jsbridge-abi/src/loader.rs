//! Engine library loading.
//!
//! Finds and loads the engine's shared library. The loader itself has no
//! single-load constraint; one-engine-per-process is enforced by the
//! platform layer above it.

use std::env;
use std::path::{Path, PathBuf};

use libloading::Library;

use jsbridge_core::config::LoaderConfig;
use jsbridge_core::errors::BindingError;

/// Environment variable overriding the library location.
pub const LIBRARY_PATH_ENV: &str = "JSBRIDGE_LIBNODE_PATH";

/// Platform-mangled library file name, applied only when probing search
/// paths; explicit paths are used verbatim.
pub fn platform_library_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "node.dll"
    } else if cfg!(target_os = "macos") {
        "libnode.dylib"
    } else {
        "libnode.so"
    }
}

/// Default platform identifier for the bundled runtime layout.
pub fn default_platform_id() -> String {
    let os = if cfg!(target_os = "windows") {
        "win"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    };
    let arch = if cfg!(target_arch = "aarch64") {
        "arm64"
    } else if cfg!(target_arch = "x86") {
        "x86"
    } else {
        "x64"
    };
    format!("{os}-{arch}")
}

/// One location the loader will try, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Candidate {
    /// Explicit path from config; failure to open is fatal immediately.
    Explicit(PathBuf),
    /// Path from `JSBRIDGE_LIBNODE_PATH`; failure to open is fatal.
    EnvOverride(PathBuf),
    /// Bundled layout probe; skipped silently when the file is absent.
    Bundled(PathBuf),
    /// Bare library name handed to the OS default search.
    OsDefault(&'static str),
}

pub(crate) fn candidates(config: &LoaderConfig, env_override: Option<PathBuf>) -> Vec<Candidate> {
    let mut list = Vec::new();
    if let Some(path) = &config.library_path {
        list.push(Candidate::Explicit(path.clone()));
        return list;
    }
    if let Some(path) = env_override {
        list.push(Candidate::EnvOverride(path));
        return list;
    }
    if let Some(root) = app_root(config) {
        let platform_id = config
            .platform_id
            .clone()
            .unwrap_or_else(default_platform_id);
        list.push(Candidate::Bundled(
            root.join("runtime")
                .join(platform_id)
                .join("native")
                .join(platform_library_name()),
        ));
    }
    list.push(Candidate::OsDefault(platform_library_name()));
    list
}

fn app_root(config: &LoaderConfig) -> Option<PathBuf> {
    if let Some(root) = &config.app_root {
        return Some(root.clone());
    }
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// A loaded engine library. Keeps the OS handle alive for the lifetime
/// of every symbol resolved from it.
#[derive(Debug)]
pub struct EngineLibrary {
    lib: Library,
    path: PathBuf,
}

impl EngineLibrary {
    /// Load the engine library using the configured probe order.
    ///
    /// Failure of every strategy is fatal: the system cannot proceed
    /// without the engine.
    pub fn load(config: &LoaderConfig) -> Result<Self, BindingError> {
        let env_override = env::var_os(LIBRARY_PATH_ENV).map(PathBuf::from);
        let mut searched = Vec::new();

        for candidate in candidates(config, env_override) {
            match candidate {
                Candidate::Explicit(path) | Candidate::EnvOverride(path) => {
                    // An explicitly requested path that fails to open is an
                    // immediate error, not a fall-through.
                    return Self::open_at(&path);
                }
                Candidate::Bundled(path) => {
                    if path.is_file() {
                        tracing::debug!(path = %path.display(), "probing bundled engine library");
                        return Self::open_at(&path);
                    }
                    searched.push(path.display().to_string());
                }
                Candidate::OsDefault(name) => {
                    tracing::debug!(name, "probing OS default search path");
                    match unsafe { Library::new(name) } {
                        Ok(lib) => {
                            tracing::info!(name, "engine library loaded from OS search path");
                            return Ok(Self {
                                lib,
                                path: PathBuf::from(name),
                            });
                        }
                        Err(e) => {
                            searched.push(format!("{name} (OS search path: {e})"));
                        }
                    }
                }
            }
        }

        Err(BindingError::LibraryNotFound {
            searched: searched.join(", "),
        })
    }

    fn open_at(path: &Path) -> Result<Self, BindingError> {
        // Resolve symlinks and relative components before handing the
        // path to the OS loader.
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        match unsafe { Library::new(&canonical) } {
            Ok(lib) => {
                tracing::info!(path = %canonical.display(), "engine library loaded");
                Ok(Self {
                    lib,
                    path: canonical,
                })
            }
            Err(e) => Err(BindingError::LibraryLoadFailed {
                path: canonical.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Resolve a raw entry point. Callers go through [`SymbolSlot`] so
    /// resolution happens at most once per slot.
    ///
    /// [`SymbolSlot`]: crate::symbols::SymbolSlot
    pub fn symbol<T: Copy + 'static>(&self, name: &'static str) -> Result<T, BindingError> {
        // SAFETY: the caller's slot declares the exact C signature of the
        // entry point; the engine library's ABI fixes those signatures.
        match unsafe { self.lib.get::<T>(name.as_bytes()) } {
            Ok(symbol) => Ok(*symbol),
            Err(_) => Err(BindingError::EntryPointNotFound { symbol: name }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_short_circuits_probing() {
        let config = LoaderConfig {
            library_path: Some(PathBuf::from("/opt/libnode.so.115")),
            ..Default::default()
        };
        let list = candidates(&config, Some(PathBuf::from("/ignored")));
        assert_eq!(
            list,
            vec![Candidate::Explicit(PathBuf::from("/opt/libnode.so.115"))]
        );
    }

    #[test]
    fn env_override_beats_bundled_and_default() {
        let config = LoaderConfig::default();
        let list = candidates(&config, Some(PathBuf::from("/env/libnode.so")));
        assert_eq!(
            list,
            vec![Candidate::EnvOverride(PathBuf::from("/env/libnode.so"))]
        );
    }

    #[test]
    fn default_probe_order_is_bundled_then_os() {
        let config = LoaderConfig {
            app_root: Some(PathBuf::from("/app")),
            platform_id: Some("linux-x64".to_string()),
            ..Default::default()
        };
        let list = candidates(&config, None);
        assert_eq!(list.len(), 2);
        assert_eq!(
            list[0],
            Candidate::Bundled(
                PathBuf::from("/app")
                    .join("runtime")
                    .join("linux-x64")
                    .join("native")
                    .join(platform_library_name())
            )
        );
        assert_eq!(list[1], Candidate::OsDefault(platform_library_name()));
    }

    #[test]
    fn explicit_missing_path_is_an_immediate_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoaderConfig {
            library_path: Some(dir.path().join("does-not-exist.so")),
            ..Default::default()
        };
        match EngineLibrary::load(&config) {
            Err(BindingError::LibraryLoadFailed { .. }) => {}
            other => panic!("expected LibraryLoadFailed, got {other:?}"),
        }
    }

    #[test]
    fn platform_id_has_os_and_arch() {
        let id = default_platform_id();
        assert!(id.contains('-'));
    }
}
