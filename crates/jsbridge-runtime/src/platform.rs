//! Engine platform lifecycle.
//!
//! One platform per process, ever: after a platform is disposed the
//! engine cannot be re-initialized in the same process, so a second
//! creation attempt is refused rather than allowed to crash natively.
//! The once-per-process rule lives in a [`PhaseTracker`]; tests inject
//! their own tracker to exercise the state machine in isolation.

use std::sync::{Arc, Mutex, OnceLock};

use jsbridge_abi::NodeApi;
use jsbridge_core::config::PlatformConfig;
use jsbridge_core::errors::LifecycleError;
use jsbridge_core::types::NativePlatform;

use crate::runtime::{Runtime, RuntimeSettings};

/// Where a platform sits in its one-way lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformPhase {
    Uninitialized,
    Active,
    Disposed,
}

/// The once-per-process state machine. `Uninitialized → Active` on
/// creation, `Active → Disposed` on dispose, and `Disposed` is final.
pub struct PhaseTracker {
    phase: Mutex<PlatformPhase>,
}

impl PhaseTracker {
    pub const fn new() -> Self {
        Self {
            phase: Mutex::new(PlatformPhase::Uninitialized),
        }
    }

    fn begin_create(&self) -> Result<(), LifecycleError> {
        let mut phase = self.phase.lock().map_err(|_| LifecycleError::StartupFailed {
            reason: "platform phase tracker poisoned".to_string(),
        })?;
        match *phase {
            PlatformPhase::Uninitialized => {
                *phase = PlatformPhase::Active;
                Ok(())
            }
            PlatformPhase::Active => Err(LifecycleError::AlreadyInitialized),
            PlatformPhase::Disposed => Err(LifecycleError::PlatformDisposed),
        }
    }

    fn abort_create(&self) {
        if let Ok(mut phase) = self.phase.lock() {
            if *phase == PlatformPhase::Active {
                *phase = PlatformPhase::Uninitialized;
            }
        }
    }

    fn mark_disposed(&self) {
        if let Ok(mut phase) = self.phase.lock() {
            *phase = PlatformPhase::Disposed;
        }
    }

    pub fn current(&self) -> PlatformPhase {
        self.phase
            .lock()
            .map(|phase| *phase)
            .unwrap_or(PlatformPhase::Disposed)
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn process_tracker() -> Arc<PhaseTracker> {
    static TRACKER: OnceLock<Arc<PhaseTracker>> = OnceLock::new();
    Arc::clone(TRACKER.get_or_init(|| Arc::new(PhaseTracker::new())))
}

/// Runtime accounting and the disposed flag share one lock: whether a
/// runtime may still be created and whether the platform may be torn
/// down are decided in the same critical section.
struct PlatformState {
    live_runtimes: usize,
    disposed: bool,
}

pub(crate) struct PlatformInner {
    pub(crate) api: Arc<dyn NodeApi>,
    pub(crate) handle: NativePlatform,
    tracker: Arc<PhaseTracker>,
    state: Mutex<PlatformState>,
}

impl PlatformInner {
    pub(crate) fn runtime_closed(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.live_runtimes = state.live_runtimes.saturating_sub(1);
        }
    }
}

/// One initialized engine instance. Runtimes are created from it; it
/// must outlive them all and is disposed exactly once.
pub struct Platform {
    inner: Arc<PlatformInner>,
}

impl Platform {
    /// Initialize the engine platform for this process.
    pub fn new(api: Arc<dyn NodeApi>, config: &PlatformConfig) -> Result<Self, LifecycleError> {
        Self::with_tracker(api, config, process_tracker())
    }

    /// Initialize against an injected phase tracker instead of the
    /// process-wide one.
    pub fn with_tracker(
        api: Arc<dyn NodeApi>,
        config: &PlatformConfig,
        tracker: Arc<PhaseTracker>,
    ) -> Result<Self, LifecycleError> {
        tracker.begin_create()?;
        let handle = match api.create_platform(&config.args) {
            Ok(handle) => handle,
            Err(status) => {
                tracker.abort_create();
                return Err(LifecycleError::StartupFailed {
                    reason: format!("platform creation failed with {status}"),
                });
            }
        };
        tracing::info!(args = ?config.args, "engine platform initialized");
        Ok(Self {
            inner: Arc::new(PlatformInner {
                api,
                handle,
                tracker,
                state: Mutex::new(PlatformState {
                    live_runtimes: 0,
                    disposed: false,
                }),
            }),
        })
    }

    /// Spawn a runtime with its own environment, event loop, and
    /// dedicated thread. The runtime is accounted for in the same
    /// critical section that checks the disposed flag, so a concurrent
    /// `dispose` can never slip between the check and the spawn.
    pub fn create_runtime(&self, settings: RuntimeSettings) -> Result<Runtime, LifecycleError> {
        {
            let mut state = self
                .inner
                .state
                .lock()
                .map_err(|_| LifecycleError::StartupFailed {
                    reason: "platform state poisoned".to_string(),
                })?;
            if state.disposed {
                return Err(LifecycleError::PlatformDisposed);
            }
            state.live_runtimes += 1;
        }
        match Runtime::spawn(Arc::clone(&self.inner), settings) {
            Ok(runtime) => Ok(runtime),
            Err(e) => {
                self.inner.runtime_closed();
                Err(e)
            }
        }
    }

    /// Tear the platform down. Refused while runtimes are alive; exactly
    /// once.
    pub fn dispose(&self) -> Result<(), LifecycleError> {
        {
            let mut state = self
                .inner
                .state
                .lock()
                .map_err(|_| LifecycleError::StartupFailed {
                    reason: "platform state poisoned".to_string(),
                })?;
            if state.live_runtimes > 0 {
                return Err(LifecycleError::RuntimesAlive {
                    count: state.live_runtimes,
                });
            }
            if state.disposed {
                return Err(LifecycleError::PlatformDisposed);
            }
            state.disposed = true;
        }
        if let Err(status) = self.inner.api.destroy_platform(self.inner.handle) {
            tracing::error!(%status, "platform destruction reported failure");
        }
        self.inner.tracker.mark_disposed();
        tracing::info!("engine platform disposed");
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().map(|s| s.disposed).unwrap_or(true)
    }

    /// Number of runtimes created and not yet disposed.
    pub fn live_runtimes(&self) -> usize {
        self.inner
            .state
            .lock()
            .map(|s| s.live_runtimes)
            .unwrap_or(0)
    }

    pub fn api(&self) -> &Arc<dyn NodeApi> {
        &self.inner.api
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsbridge_abi::mock::MockEngine;

    #[test]
    fn tracker_walks_one_way() {
        let tracker = PhaseTracker::new();
        assert_eq!(tracker.current(), PlatformPhase::Uninitialized);
        tracker.begin_create().unwrap();
        assert_eq!(tracker.current(), PlatformPhase::Active);
        assert!(matches!(
            tracker.begin_create(),
            Err(LifecycleError::AlreadyInitialized)
        ));
        tracker.mark_disposed();
        assert!(matches!(
            tracker.begin_create(),
            Err(LifecycleError::PlatformDisposed)
        ));
    }

    #[test]
    fn failed_creation_releases_the_tracker() {
        let tracker = PhaseTracker::new();
        tracker.begin_create().unwrap();
        tracker.abort_create();
        assert_eq!(tracker.current(), PlatformPhase::Uninitialized);
        tracker.begin_create().unwrap();
    }

    #[test]
    fn dispose_is_exactly_once() {
        let tracker = Arc::new(PhaseTracker::new());
        let platform = Platform::with_tracker(
            Arc::new(MockEngine::new()),
            &PlatformConfig::default(),
            tracker,
        )
        .unwrap();
        platform.dispose().unwrap();
        assert!(matches!(
            platform.dispose(),
            Err(LifecycleError::PlatformDisposed)
        ));
    }
}
