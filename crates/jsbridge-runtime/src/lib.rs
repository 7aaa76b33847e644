//! # jsbridge-runtime
//!
//! Lifetime and threading layer of the embedding stack: the
//! once-per-process [`Platform`], per-runtime dedicated threads and
//! event loops, handle scope discipline, and cross-thread dispatch.
//!
//! ## Architecture
//!
//! - `platform` — once-per-process engine initialization and disposal
//! - `runtime` — one environment + event loop on its own thread
//! - `session` — the per-environment operation surface handed to work
//!   items; never leaves the runtime thread
//! - `scope` — LIFO handle scopes, escapable scopes, references
//! - `dispatch` — FIFO cross-thread work submission with result and
//!   panic propagation
//! - `mapper` — status-to-error translation at the native boundary
//!
//! ## Getting started
//!
//! ```no_run
//! use jsbridge_core::config::PlatformConfig;
//! use jsbridge_runtime::{load_platform, RuntimeSettings};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let platform = load_platform(&PlatformConfig::default())?;
//! let runtime = platform.create_runtime(RuntimeSettings::default())?;
//! runtime.run(|session| {
//!     session.run_script("console.log('embedded')")?;
//!     Ok(())
//! })?;
//! runtime.dispose()?;
//! platform.dispose()?;
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod mapper;
pub mod platform;
pub mod runtime;
pub mod scope;
pub mod session;

pub use dispatch::{Dispatcher, PendingResult, TaskPoster};
pub use platform::{PhaseTracker, Platform, PlatformPhase};
pub use runtime::{ModuleInit, Runtime, RuntimeSettings, SessionHook, StartupHook, StaticModule};
pub use scope::{Reference, ScopeToken};
pub use session::EmbeddingSession;

use std::sync::Arc;

use jsbridge_abi::{EngineLibrary, LibNodeApi};
use jsbridge_core::config::PlatformConfig;
use jsbridge_core::errors::LifecycleError;

/// Load the engine library, bind its entry points, and initialize the
/// platform in one step.
pub fn load_platform(config: &PlatformConfig) -> Result<Platform, LifecycleError> {
    let lib = EngineLibrary::load(&config.loader)?;
    let api = LibNodeApi::new(lib)?;
    Platform::new(Arc::new(api), config)
}
