//! Engine library location settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where to look for the engine's shared library.
///
/// Resolution order (first hit wins):
/// 1. `library_path` — used verbatim, no platform name mangling.
/// 2. The `JSBRIDGE_LIBNODE_PATH` environment variable.
/// 3. The bundled layout `<app_root>/runtime/<platform_id>/native/<libname>`.
/// 4. The OS default shared-library search path.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoaderConfig {
    /// Explicit path to the engine library.
    pub library_path: Option<PathBuf>,

    /// Root of the host application's install layout. Defaults to the
    /// directory of the current executable.
    pub app_root: Option<PathBuf>,

    /// Platform identifier used in the bundled layout, e.g. `linux-x64`.
    /// Defaults to a value derived from the compile target.
    pub platform_id: Option<String>,
}
