//! Cross-thread dispatch onto the runtime thread.
//!
//! Work submitted from any thread is queued in submission order and
//! executed on the runtime thread with the environment's session in
//! hand. Submissions from the runtime thread itself run inline, so a
//! work item may freely call back into the dispatcher without
//! deadlocking. Errors and panics inside a work item travel back to the
//! submitter; they are never lost on the runtime thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, ThreadId};

use crossbeam_channel::{Receiver, Sender};

use jsbridge_core::errors::{DispatchError, NodeError};

use crate::mapper;
use crate::session::EmbeddingSession;

/// External wake-up invoked after each enqueue, for hosts that
/// integrate the runtime with their own scheduler.
pub type TaskPoster = Arc<dyn Fn() + Send + Sync>;

/// One unit of queued work. Runs on the runtime thread with the live
/// session.
pub(crate) struct WorkItem {
    pub(crate) run: Box<dyn FnOnce(&EmbeddingSession) + Send>,
}

struct DispatchShared {
    /// `None` once the dispatcher is closed; items can no longer enter.
    sender: Mutex<Option<Sender<WorkItem>>>,
    /// Runtime stays alive while this is non-zero, even with an idle
    /// queue and event loop.
    keep_alive: AtomicUsize,
    runtime_thread: OnceLock<ThreadId>,
    /// Session of the runtime thread, installed for the lifetime of the
    /// main loop. Only that thread stores or dereferences it.
    session: AtomicPtr<EmbeddingSession>,
    shutdown: AtomicBool,
    task_poster: Option<TaskPoster>,
}

/// Handle for submitting work to one runtime thread. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<DispatchShared>,
}

impl Dispatcher {
    pub(crate) fn new(task_poster: Option<TaskPoster>) -> (Self, Receiver<WorkItem>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let shared = Arc::new(DispatchShared {
            sender: Mutex::new(Some(sender)),
            keep_alive: AtomicUsize::new(1),
            runtime_thread: OnceLock::new(),
            session: AtomicPtr::new(std::ptr::null_mut()),
            shutdown: AtomicBool::new(false),
            task_poster,
        });
        (Self { shared }, receiver)
    }

    // ---- runtime-thread bookkeeping ----

    /// Record the calling thread as the runtime thread. Called once from
    /// the runtime's main function.
    pub(crate) fn bind_current_thread(&self) {
        let _ = self.shared.runtime_thread.set(thread::current().id());
    }

    pub fn is_runtime_thread(&self) -> bool {
        self.shared.runtime_thread.get() == Some(&thread::current().id())
    }

    /// Make the session visible for inline execution. Runtime thread
    /// only; must be cleared before the session is dropped.
    pub(crate) fn install_session(&self, session: &EmbeddingSession) {
        self.shared
            .session
            .store(session as *const EmbeddingSession as *mut EmbeddingSession, Ordering::Release);
    }

    pub(crate) fn clear_session(&self) {
        self.shared.session.store(std::ptr::null_mut(), Ordering::Release);
    }

    // ---- keep-alive ----

    /// Hold the runtime open independent of queued work.
    pub fn ref_(&self) {
        self.shared.keep_alive.fetch_add(1, Ordering::AcqRel);
    }

    /// Release one hold. The runtime exits naturally once the count
    /// reaches zero and no work remains.
    pub fn unref(&self) {
        let _ = self
            .shared
            .keep_alive
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_sub(1));
    }

    pub(crate) fn keep_alive_count(&self) -> usize {
        self.shared.keep_alive.load(Ordering::Acquire)
    }

    // ---- shutdown ----

    /// Stop accepting work and wake the runtime thread. Items still
    /// queued are dropped; their submitters observe `RuntimeDisposed`.
    pub(crate) fn close(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        if let Ok(mut guard) = self.shared.sender.lock() {
            *guard = None;
        }
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    // ---- submission ----

    fn post_item(&self, item: WorkItem) -> Result<(), DispatchError> {
        if self.is_shutdown() {
            return Err(DispatchError::RuntimeDisposed);
        }
        {
            let guard = self
                .shared
                .sender
                .lock()
                .map_err(|_| DispatchError::RuntimeDisposed)?;
            match guard.as_ref() {
                Some(sender) => sender
                    .send(item)
                    .map_err(|_| DispatchError::RuntimeDisposed)?,
                None => return Err(DispatchError::RuntimeDisposed),
            }
        }
        if let Some(poster) = &self.shared.task_poster {
            poster();
        }
        Ok(())
    }

    /// Fire-and-forget submission in FIFO order. Runs inline when
    /// already on the runtime thread.
    pub fn post<F>(&self, f: F) -> Result<(), DispatchError>
    where
        F: FnOnce(&EmbeddingSession) + Send + 'static,
    {
        self.post_with(f, true)
    }

    /// [`post`](Self::post) with explicit control over inline execution:
    /// with `allow_inline` false the work always goes through the queue,
    /// even from the runtime thread.
    pub fn post_with<F>(&self, f: F, allow_inline: bool) -> Result<(), DispatchError>
    where
        F: FnOnce(&EmbeddingSession) + Send + 'static,
    {
        if allow_inline {
            if let Some(session) = self.inline_session() {
                // Absorb panics just like the queued path does.
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| f(session))) {
                    tracing::error!(
                        panic = %mapper::panic_message(payload),
                        "work item panicked on the runtime thread"
                    );
                }
                return Ok(());
            }
        }
        self.post_item(WorkItem { run: Box::new(f) })
    }

    /// Submit work and block until it has run, returning its result.
    /// Runs inline when already on the runtime thread.
    pub fn run<R, F>(&self, f: F) -> Result<R, DispatchError>
    where
        R: Send + 'static,
        F: FnOnce(&EmbeddingSession) -> Result<R, NodeError> + Send + 'static,
    {
        if let Some(session) = self.inline_session() {
            return match panic::catch_unwind(AssertUnwindSafe(|| f(session))) {
                Ok(result) => result.map_err(DispatchError::WorkFailed),
                Err(payload) => Err(DispatchError::WorkPanicked {
                    message: mapper::panic_message(payload),
                }),
            };
        }
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.post_item(WorkItem {
            run: Box::new(move |session| {
                let outcome = match panic::catch_unwind(AssertUnwindSafe(|| f(session))) {
                    Ok(result) => result.map_err(DispatchError::WorkFailed),
                    Err(payload) => Err(DispatchError::WorkPanicked {
                        message: mapper::panic_message(payload),
                    }),
                };
                let _ = tx.send(outcome);
            }),
        })?;
        match rx.recv() {
            Ok(outcome) => outcome,
            // Sender dropped without sending: the item was discarded
            // during shutdown.
            Err(_) => Err(DispatchError::RuntimeDisposed),
        }
    }

    /// Submit work and return a handle to collect its result later.
    ///
    /// Waiting on the handle from the runtime thread deadlocks; use
    /// [`PendingResult::try_take`] there.
    pub fn run_async<R, F>(&self, f: F) -> Result<PendingResult<R>, DispatchError>
    where
        R: Send + 'static,
        F: FnOnce(&EmbeddingSession) -> Result<R, NodeError> + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.post_item(WorkItem {
            run: Box::new(move |session| {
                let outcome = match panic::catch_unwind(AssertUnwindSafe(|| f(session))) {
                    Ok(result) => result.map_err(DispatchError::WorkFailed),
                    Err(payload) => Err(DispatchError::WorkPanicked {
                        message: mapper::panic_message(payload),
                    }),
                };
                let _ = tx.send(outcome);
            }),
        })?;
        Ok(PendingResult { rx })
    }

    /// The installed session, when on the runtime thread.
    fn inline_session(&self) -> Option<&EmbeddingSession> {
        if !self.is_runtime_thread() {
            return None;
        }
        let ptr = self.shared.session.load(Ordering::Acquire);
        if ptr.is_null() {
            return None;
        }
        // SAFETY: only the runtime thread stores this pointer, and it
        // clears it before the session is dropped. We are on that thread
        // (checked above), so the session is alive and no other thread
        // touches it.
        Some(unsafe { &*ptr })
    }
}

/// Result of work submitted with [`Dispatcher::run_async`].
pub struct PendingResult<T> {
    rx: Receiver<Result<T, DispatchError>>,
}

impl<T> PendingResult<T> {
    /// Block until the work has run.
    pub fn wait(self) -> Result<T, DispatchError> {
        match self.rx.recv() {
            Ok(outcome) => outcome,
            Err(_) => Err(DispatchError::RuntimeDisposed),
        }
    }

    /// Collect the result if the work already ran.
    pub fn try_take(&self) -> Option<Result<T, DispatchError>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(crossbeam_channel::TryRecvError::Empty) => None,
            Err(crossbeam_channel::TryRecvError::Disconnected) => {
                Some(Err(DispatchError::RuntimeDisposed))
            }
        }
    }
}

/// Execute one item on the runtime thread, absorbing panics so the loop
/// survives. Items built by `run`/`run_async` have already captured the
/// panic for their submitter by the time this sees it.
pub(crate) fn execute(item: WorkItem, session: &EmbeddingSession) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| (item.run)(session))) {
        tracing::error!(
            panic = %mapper::panic_message(payload),
            "work item panicked on the runtime thread"
        );
    }
}
