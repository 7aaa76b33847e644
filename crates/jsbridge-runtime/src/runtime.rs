//! One JavaScript runtime: an environment, its event loop, and the
//! dedicated thread that owns both.
//!
//! The runtime thread creates the environment, runs the bootstrap hooks,
//! then alternates between draining the dispatch queue and pumping the
//! engine's event loop. Everything environment-bound stays on that
//! thread; other threads talk to it through the [`Dispatcher`].

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use jsbridge_abi::{ApiOp, NodeApi};
use jsbridge_core::config::RuntimeConfig;
use jsbridge_core::errors::{DispatchError, JsBridgeErrorCode, LifecycleError, NodeError};
use jsbridge_core::registry::{CallbackRegistry, CallbackToken};
use jsbridge_core::types::{NativeEnv, NativePlatform, NativeValue, RunMode};

use crate::dispatch::{self, Dispatcher, PendingResult, TaskPoster, WorkItem};
use crate::mapper;
use crate::platform::PlatformInner;
use crate::session::EmbeddingSession;

/// How long the runtime thread sleeps on an empty queue before pumping
/// the event loop again.
const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Hook running on the runtime thread during bootstrap.
pub type SessionHook = Box<dyn FnOnce(&EmbeddingSession) -> Result<(), NodeError> + Send>;

/// Startup hook; additionally receives the environment's `require`
/// function value.
pub type StartupHook =
    Box<dyn FnOnce(&EmbeddingSession, NativeValue) -> Result<(), NodeError> + Send>;

/// Initializer of a statically linked module: receives the exports
/// object and returns the (possibly replaced) exports.
pub type ModuleInit =
    Box<dyn Fn(&EmbeddingSession, NativeValue) -> Result<NativeValue, NodeError> + Send + Sync>;

/// A host module registered with the environment before any script runs.
pub struct StaticModule {
    pub name: String,
    pub init: ModuleInit,
}

/// Everything a runtime is created with. Hooks run in declaration
/// order: preload, module registration, startup, post-startup.
pub struct RuntimeSettings {
    pub config: RuntimeConfig,
    /// Script evaluated by the engine as the environment's main script.
    pub startup_script: Option<String>,
    /// Runs before module registration, first thing after the
    /// environment exists.
    pub preload: Option<SessionHook>,
    /// Runs after module registration with the `require` value in hand.
    pub startup: Option<StartupHook>,
    /// Runs last, after the environment is fully wired.
    pub post_startup: Option<SessionHook>,
    pub modules: Vec<StaticModule>,
    /// Wake-up called after each enqueue, for external schedulers.
    pub task_poster: Option<TaskPoster>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            config: RuntimeConfig::default(),
            startup_script: None,
            preload: None,
            startup: None,
            post_startup: None,
            modules: Vec::new(),
            task_poster: None,
        }
    }
}

struct ModuleEntry {
    api: Arc<dyn NodeApi>,
    init: ModuleInit,
}

/// Correlates engine-held module tokens with host initializers. Tokens
/// are released exactly once, by the engine's release callback. Entries
/// are `Arc`ed so the init trampoline can clone one out and run it
/// without holding the registry lock.
fn module_registry() -> &'static CallbackRegistry<Arc<ModuleEntry>> {
    static REGISTRY: OnceLock<CallbackRegistry<Arc<ModuleEntry>>> = OnceLock::new();
    REGISTRY.get_or_init(CallbackRegistry::new)
}

extern "C" fn module_init_trampoline(env: NativeEnv, exports: NativeValue, data: u64) -> NativeValue {
    let token = CallbackToken::from_raw(data);
    // Clone the entry out of the registry first: the initializer may
    // register further modules (for example by creating another runtime),
    // which re-enters the registry.
    let entry = match module_registry().get(token) {
        Ok(entry) => entry,
        Err(e) => {
            tracing::error!(error = %e, "module init fired with a dead token");
            return exports;
        }
    };
    // Ephemeral session for the duration of the initializer; the engine
    // guarantees we are on the environment's thread here.
    let session = EmbeddingSession::new(env, Arc::clone(&entry.api));
    match panic::catch_unwind(AssertUnwindSafe(|| (entry.init)(&session, exports))) {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            let pending = entry.api.is_exception_pending(env).unwrap_or(false);
            if !pending {
                if let Err(status) =
                    entry.api.throw_error(env, Some(e.error_code()), &e.to_string())
                {
                    tracing::error!(%status, "failed to throw module init error");
                }
            }
            exports
        }
        Err(payload) => {
            let message = mapper::panic_message(payload);
            tracing::error!(panic = %message, "module initializer panicked");
            let _ = entry.api.throw_error(env, None, &message);
            exports
        }
    }
}

extern "C" fn module_release_trampoline(data: u64) {
    let token = CallbackToken::from_raw(data);
    if let Err(e) = module_registry().release(token) {
        tracing::warn!(error = %e, "module release fired with a dead token");
    }
}

/// Handle to one live runtime. Dropping it disposes the runtime
/// (best effort); call [`Runtime::dispose`] to observe errors.
pub struct Runtime {
    dispatcher: Dispatcher,
    join: Mutex<Option<JoinHandle<()>>>,
    platform: Arc<PlatformInner>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime").finish_non_exhaustive()
    }
}

impl Runtime {
    pub(crate) fn spawn(
        platform: Arc<PlatformInner>,
        mut settings: RuntimeSettings,
    ) -> Result<Self, LifecycleError> {
        let poster = settings.task_poster.take();
        let (dispatcher, receiver) = Dispatcher::new(poster);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let api = Arc::clone(&platform.api);
        let handle = platform.handle;
        let thread_dispatcher = dispatcher.clone();
        let join = thread::Builder::new()
            .name("jsbridge-runtime".into())
            .spawn(move || {
                runtime_main(api, handle, settings, thread_dispatcher, receiver, ready_tx)
            })
            .map_err(|e| LifecycleError::StartupFailed {
                reason: format!("runtime thread spawn failed: {e}"),
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                dispatcher,
                join: Mutex::new(Some(join)),
                platform,
            }),
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => {
                let _ = join.join();
                Err(LifecycleError::StartupFailed {
                    reason: "runtime thread exited before signalling readiness".to_string(),
                })
            }
        }
    }

    // ---- dispatch ----

    /// Fire-and-forget work on the runtime thread, FIFO per submitter.
    pub fn post<F>(&self, f: F) -> Result<(), DispatchError>
    where
        F: FnOnce(&EmbeddingSession) + Send + 'static,
    {
        self.dispatcher.post(f)
    }

    /// [`post`](Self::post) with explicit control over inline execution
    /// when already on the runtime thread.
    pub fn post_with<F>(&self, f: F, allow_inline: bool) -> Result<(), DispatchError>
    where
        F: FnOnce(&EmbeddingSession) + Send + 'static,
    {
        self.dispatcher.post_with(f, allow_inline)
    }

    /// Run work on the runtime thread and wait for its result. Inline
    /// (no queue round-trip) when called from the runtime thread itself.
    pub fn run<R, F>(&self, f: F) -> Result<R, DispatchError>
    where
        R: Send + 'static,
        F: FnOnce(&EmbeddingSession) -> Result<R, NodeError> + Send + 'static,
    {
        self.dispatcher.run(f)
    }

    /// Submit work and collect the result later.
    pub fn run_async<R, F>(&self, f: F) -> Result<PendingResult<R>, DispatchError>
    where
        R: Send + 'static,
        F: FnOnce(&EmbeddingSession) -> Result<R, NodeError> + Send + 'static,
    {
        self.dispatcher.run_async(f)
    }

    // ---- event loop ----

    /// Run the event loop until no further work is scheduled.
    pub fn run_event_loop(&self) -> Result<(), DispatchError> {
        self.run(|session| session.pump(RunMode::Default).map(|_| ()))
    }

    /// Process at most one pending item; returns whether more remain.
    pub fn run_event_loop_once(&self) -> Result<bool, DispatchError> {
        self.run(|session| session.pump(RunMode::Once))
    }

    /// Poll the event loop without blocking; returns whether more work
    /// remains.
    pub fn run_event_loop_no_wait(&self) -> Result<bool, DispatchError> {
        self.run(|session| session.pump(RunMode::NoWait))
    }

    // ---- keep-alive ----

    /// Hold the runtime open independent of queued work.
    pub fn ref_(&self) {
        self.dispatcher.ref_();
    }

    /// Release one hold; at zero (and an idle queue and event loop) the
    /// runtime thread exits naturally.
    pub fn unref(&self) {
        self.dispatcher.unref();
    }

    pub fn is_runtime_thread(&self) -> bool {
        self.dispatcher.is_runtime_thread()
    }

    /// A cloneable submission handle independent of the runtime's
    /// lifetime guard.
    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    /// Shut the runtime down and join its thread. Idempotent; queued
    /// work that never ran reports `RuntimeDisposed` to its submitters.
    pub fn dispose(&self) -> Result<(), LifecycleError> {
        if self.dispatcher.is_runtime_thread() {
            return Err(LifecycleError::DisposeOnRuntimeThread);
        }
        let handle = self
            .join
            .lock()
            .map_err(|_| LifecycleError::StartupFailed {
                reason: "runtime join handle poisoned".to_string(),
            })?
            .take();
        let Some(handle) = handle else {
            return Ok(());
        };
        self.dispatcher.close();
        if handle.join().is_err() {
            tracing::error!("runtime thread panicked during shutdown");
        }
        self.platform.runtime_closed();
        tracing::info!("runtime disposed");
        Ok(())
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if self.dispatcher.is_runtime_thread() {
            tracing::error!("runtime handle dropped on its own thread; leaking the thread");
            return;
        }
        if let Err(e) = self.dispose() {
            tracing::warn!(error = %e, "runtime disposal on drop failed");
        }
    }
}

fn runtime_main(
    api: Arc<dyn NodeApi>,
    platform: NativePlatform,
    settings: RuntimeSettings,
    dispatcher: Dispatcher,
    receiver: Receiver<WorkItem>,
    ready: Sender<Result<(), LifecycleError>>,
) {
    dispatcher.bind_current_thread();

    let env = match api.create_environment(
        platform,
        settings.config.flags.to_bits(),
        &settings.config.args,
        settings.startup_script.as_deref(),
    ) {
        Ok(env) => env,
        Err(status) => {
            let _ = ready.send(Err(LifecycleError::StartupFailed {
                reason: format!("environment creation failed with {status}"),
            }));
            return;
        }
    };
    tracing::debug!("environment created, bootstrapping");

    let session = EmbeddingSession::new(env, Arc::clone(&api));
    let root = match session.open_scope() {
        Ok(token) => token,
        Err(e) => {
            let _ = ready.send(Err(LifecycleError::StartupFailed {
                reason: format!("root scope open failed: {e}"),
            }));
            teardown(&api, env);
            return;
        }
    };

    if let Err(e) = bootstrap(&session, &api, settings) {
        let _ = ready.send(Err(e));
        if let Err(e) = session.close_scope(root) {
            tracing::warn!(error = %e, "root scope close failed during startup abort");
        }
        teardown(&api, env);
        return;
    }

    dispatcher.install_session(&session);
    let _ = ready.send(Ok(()));

    main_loop(&dispatcher, &receiver, &session);

    dispatcher.clear_session();
    if let Err(e) = session.close_scope(root) {
        tracing::warn!(error = %e, "root scope close failed during shutdown");
    }
    teardown(&api, env);
    tracing::debug!("runtime thread exiting");
}

fn bootstrap(
    session: &EmbeddingSession,
    api: &Arc<dyn NodeApi>,
    settings: RuntimeSettings,
) -> Result<(), LifecycleError> {
    if let Some(hook) = settings.preload {
        hook(session).map_err(LifecycleError::Native)?;
    }

    if !settings.modules.is_empty() {
        if !api.is_supported(ApiOp::AddModule) {
            return Err(LifecycleError::StartupFailed {
                reason: "loaded engine library does not support module registration".to_string(),
            });
        }
        for module in settings.modules {
            let token = module_registry().register(Arc::new(ModuleEntry {
                api: Arc::clone(api),
                init: module.init,
            }));
            if let Err(status) = api.add_module(
                session.env(),
                &module.name,
                module_init_trampoline,
                module_release_trampoline,
                token.raw(),
            ) {
                let _ = module_registry().release(token);
                return Err(LifecycleError::Native(mapper::node_error(
                    api.as_ref(),
                    session.env(),
                    status,
                )));
            }
            tracing::debug!(name = %module.name, %token, "static module registered");
        }
    }

    if let Some(hook) = settings.startup {
        let require = session.run_script("require").map_err(LifecycleError::Native)?;
        hook(session, require).map_err(LifecycleError::Native)?;
    }

    if let Some(hook) = settings.post_startup {
        hook(session).map_err(LifecycleError::Native)?;
    }
    Ok(())
}

fn main_loop(dispatcher: &Dispatcher, receiver: &Receiver<WorkItem>, session: &EmbeddingSession) {
    loop {
        match receiver.recv_timeout(QUEUE_POLL_INTERVAL) {
            Ok(item) => {
                if dispatcher.is_shutdown() {
                    break;
                }
                dispatch::execute(item, session);
                while let Ok(item) = receiver.try_recv() {
                    if dispatcher.is_shutdown() {
                        break;
                    }
                    dispatch::execute(item, session);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if dispatcher.is_shutdown() {
            break;
        }
        let more = match session.pump(RunMode::NoWait) {
            Ok(more) => more,
            Err(e) => {
                tracing::warn!(error = %e, "event loop pump failed");
                false
            }
        };
        if dispatcher.keep_alive_count() == 0 && !more && receiver.is_empty() {
            tracing::debug!("keep-alive reached zero with an idle loop; exiting");
            break;
        }
    }
}

fn teardown(api: &Arc<dyn NodeApi>, env: NativeEnv) {
    if let Err(status) = api.destroy_environment(env) {
        tracing::warn!(%status, "environment destruction reported failure");
    }
}
