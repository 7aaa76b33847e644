//! Cross-thread dispatch semantics against a full runtime backed by the
//! mock engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use jsbridge_abi::mock::MockEngine;
use jsbridge_core::config::PlatformConfig;
use jsbridge_core::errors::{DispatchError, NodeError};
use jsbridge_core::status::Status;
use jsbridge_runtime::{PhaseTracker, Platform, Runtime, RuntimeSettings};

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn runtime() -> (Arc<MockEngine>, Platform, Runtime) {
    init_tracing();
    let engine = Arc::new(MockEngine::new());
    let platform = Platform::with_tracker(
        engine.clone(),
        &PlatformConfig::default(),
        Arc::new(PhaseTracker::new()),
    )
    .unwrap();
    let rt = platform.create_runtime(RuntimeSettings::default()).unwrap();
    (engine, platform, rt)
}

#[test]
fn run_returns_the_work_items_result() {
    let (_engine, platform, rt) = runtime();
    let answer = rt.run(|_session| Ok(42)).unwrap();
    assert_eq!(answer, 42);

    rt.dispose().unwrap();
    platform.dispose().unwrap();
}

#[test]
fn posted_work_runs_in_submission_order() {
    let (_engine, platform, rt) = runtime();
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 0..5u32 {
        let order = Arc::clone(&order);
        rt.post(move |_session| order.lock().unwrap().push(i)).unwrap();
    }
    // Barrier: queued after the posts, so they have all run by now.
    rt.run(|_session| Ok(())).unwrap();
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);

    rt.dispose().unwrap();
    platform.dispose().unwrap();
}

#[test]
fn work_errors_propagate_to_the_submitter() {
    let (_engine, platform, rt) = runtime();
    let err = rt
        .run(|_session| -> Result<(), NodeError> {
            Err(NodeError::Call {
                status: Status::GenericFailure,
                engine_error_code: 0,
                message: "deliberate".to_string(),
            })
        })
        .unwrap_err();
    match err {
        DispatchError::WorkFailed(NodeError::Call { status, message, .. }) => {
            assert_eq!(status, Status::GenericFailure);
            assert_eq!(message, "deliberate");
        }
        other => panic!("expected WorkFailed, got {other:?}"),
    }

    rt.dispose().unwrap();
    platform.dispose().unwrap();
}

#[test]
fn work_panics_surface_without_killing_the_runtime() {
    let (_engine, platform, rt) = runtime();
    let err = rt
        .run(|_session| -> Result<(), NodeError> { panic!("kaboom") })
        .unwrap_err();
    match err {
        DispatchError::WorkPanicked { message } => assert!(message.contains("kaboom")),
        other => panic!("expected WorkPanicked, got {other:?}"),
    }
    // The runtime thread survived the panic.
    assert_eq!(rt.run(|_session| Ok(7)).unwrap(), 7);

    rt.dispose().unwrap();
    platform.dispose().unwrap();
}

#[test]
fn run_async_delivers_the_result_later() {
    let (_engine, platform, rt) = runtime();
    let pending = rt.run_async(|_session| Ok("done".to_string())).unwrap();
    assert_eq!(pending.wait().unwrap(), "done");

    rt.dispose().unwrap();
    platform.dispose().unwrap();
}

#[test]
fn nested_submission_from_the_runtime_thread_runs_inline() {
    let (_engine, platform, rt) = runtime();
    let dispatcher = rt.dispatcher();
    rt.run(move |_session| {
        assert!(dispatcher.is_runtime_thread());
        // Inline: completes without a queue round-trip even though the
        // loop is busy with the current item.
        assert_eq!(dispatcher.run(|_s| Ok(11)).unwrap(), 11);
        Ok(())
    })
    .unwrap();

    rt.dispose().unwrap();
    platform.dispose().unwrap();
}

#[test]
fn inline_work_panics_surface_as_dispatch_errors() {
    let (_engine, platform, rt) = runtime();
    let dispatcher = rt.dispatcher();
    rt.run(move |_session| {
        let err = dispatcher
            .run(|_s| -> Result<(), NodeError> { panic!("inline kaboom") })
            .unwrap_err();
        match err {
            DispatchError::WorkPanicked { message } => assert!(message.contains("inline kaboom")),
            other => panic!("expected WorkPanicked, got {other:?}"),
        }
        Ok(())
    })
    .unwrap();

    rt.dispose().unwrap();
    platform.dispose().unwrap();
}

#[test]
fn post_without_inline_queues_even_on_the_runtime_thread() {
    let (_engine, platform, rt) = runtime();
    let order = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = rt.dispatcher();

    let current = Arc::clone(&order);
    let queued = Arc::clone(&order);
    rt.run(move |_session| {
        dispatcher
            .post_with(move |_s| queued.lock().unwrap().push("queued"), false)
            .unwrap();
        current.lock().unwrap().push("current");
        Ok(())
    })
    .unwrap();
    rt.run(|_session| Ok(())).unwrap();
    assert_eq!(*order.lock().unwrap(), vec!["current", "queued"]);

    rt.dispose().unwrap();
    platform.dispose().unwrap();
}

#[test]
fn disposed_runtime_rejects_new_work() {
    let (_engine, platform, rt) = runtime();
    rt.dispose().unwrap();

    assert!(matches!(
        rt.run(|_session| Ok(1)),
        Err(DispatchError::RuntimeDisposed)
    ));
    assert!(matches!(
        rt.post(|_session| ()),
        Err(DispatchError::RuntimeDisposed)
    ));
    platform.dispose().unwrap();
}

#[test]
fn work_still_queued_at_dispose_reports_disposed() {
    let (_engine, platform, rt) = runtime();
    let (started_tx, started_rx) = crossbeam_channel::bounded::<()>(1);
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);

    // Occupy the runtime thread so the next item stays queued.
    rt.post(move |_session| {
        let _ = started_tx.send(());
        let _ = release_rx.recv();
    })
    .unwrap();
    started_rx.recv().unwrap();
    let pending = rt.run_async(|_session| Ok(5)).unwrap();

    thread::scope(|s| {
        let disposer = s.spawn(|| rt.dispose());
        // Let dispose close the queue before the blocker returns.
        thread::sleep(Duration::from_millis(200));
        release_tx.send(()).unwrap();
        disposer.join().unwrap().unwrap();
    });

    assert!(matches!(
        pending.wait(),
        Err(DispatchError::RuntimeDisposed)
    ));
    platform.dispose().unwrap();
}

#[test]
fn runtime_exits_naturally_when_keep_alive_reaches_zero() {
    let (_engine, platform, rt) = runtime();
    rt.unref();

    // The thread winds down on its own; new work starts being refused.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        match rt.run(|_session| Ok(())) {
            Err(DispatchError::RuntimeDisposed) => break,
            Ok(()) if std::time::Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(10));
            }
            Ok(()) => panic!("runtime did not exit after keep-alive reached zero"),
            Err(other) => panic!("unexpected dispatch error: {other:?}"),
        }
    }

    rt.dispose().unwrap();
    platform.dispose().unwrap();
}

#[test]
fn task_poster_fires_on_every_enqueue() {
    let engine = Arc::new(MockEngine::new());
    let platform = Platform::with_tracker(
        engine,
        &PlatformConfig::default(),
        Arc::new(PhaseTracker::new()),
    )
    .unwrap();
    let posts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&posts);
    let settings = RuntimeSettings {
        task_poster: Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })),
        ..Default::default()
    };
    let rt = platform.create_runtime(settings).unwrap();

    rt.post(|_session| ()).unwrap();
    rt.run(|_session| Ok(())).unwrap();
    assert!(posts.load(Ordering::SeqCst) >= 2);

    rt.dispose().unwrap();
    platform.dispose().unwrap();
}
