//! Runtime bootstrap: hooks, static modules, and event-loop pumping.

use std::sync::{Arc, Mutex};

use jsbridge_abi::mock::MockEngine;
use jsbridge_core::config::PlatformConfig;
use jsbridge_core::errors::{LifecycleError, NodeError};
use jsbridge_core::status::Status;
use jsbridge_core::types::RunMode;
use jsbridge_runtime::{PhaseTracker, Platform, Runtime, RuntimeSettings, StaticModule};

fn scoped_platform() -> (Arc<MockEngine>, Platform) {
    let engine = Arc::new(MockEngine::new());
    let platform = Platform::with_tracker(
        engine.clone(),
        &PlatformConfig::default(),
        Arc::new(PhaseTracker::new()),
    )
    .unwrap();
    (engine, platform)
}

fn deliberate_failure() -> NodeError {
    NodeError::Call {
        status: Status::GenericFailure,
        engine_error_code: 0,
        message: "deliberate".to_string(),
    }
}

#[test]
fn bootstrap_runs_hooks_and_modules_in_order() {
    let (_engine, platform) = scoped_platform();
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let preload_log = Arc::clone(&log);
    let module_log = Arc::clone(&log);
    let startup_log = Arc::clone(&log);
    let post_log = Arc::clone(&log);
    let settings = RuntimeSettings {
        preload: Some(Box::new(move |_session| {
            preload_log.lock().unwrap().push("preload");
            Ok(())
        })),
        modules: vec![StaticModule {
            name: "host_module".to_string(),
            init: Box::new(move |_session, exports| {
                module_log.lock().unwrap().push("module");
                Ok(exports)
            }),
        }],
        startup: Some(Box::new(move |_session, require| {
            assert!(!require.is_null());
            startup_log.lock().unwrap().push("startup");
            Ok(())
        })),
        post_startup: Some(Box::new(move |_session| {
            post_log.lock().unwrap().push("post_startup");
            Ok(())
        })),
        ..Default::default()
    };

    let rt = platform.create_runtime(settings).unwrap();
    rt.run(|_session| Ok(())).unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["preload", "module", "startup", "post_startup"]
    );

    rt.dispose().unwrap();
    platform.dispose().unwrap();
}

#[test]
fn module_release_fires_when_the_environment_dies() {
    let (engine, platform) = scoped_platform();
    let settings = RuntimeSettings {
        modules: vec![StaticModule {
            name: "short_lived".to_string(),
            init: Box::new(|_session, exports| Ok(exports)),
        }],
        ..Default::default()
    };
    let rt = platform.create_runtime(settings).unwrap();
    assert!(engine.released_tokens().is_empty());

    rt.dispose().unwrap();
    assert_eq!(engine.released_tokens().len(), 1);
    platform.dispose().unwrap();
}

#[test]
fn module_init_may_create_another_runtime() {
    let engine = Arc::new(MockEngine::new());
    let platform = Arc::new(
        Platform::with_tracker(
            engine,
            &PlatformConfig::default(),
            Arc::new(PhaseTracker::new()),
        )
        .unwrap(),
    );
    let nested: Arc<Mutex<Option<Runtime>>> = Arc::new(Mutex::new(None));

    // The initializer registers another module mid-init by spinning up a
    // second runtime; module registration must not be locked against
    // itself while an initializer runs.
    let inner_platform = Arc::clone(&platform);
    let slot = Arc::clone(&nested);
    let settings = RuntimeSettings {
        modules: vec![StaticModule {
            name: "spawner".to_string(),
            init: Box::new(move |_session, exports| {
                let inner = inner_platform
                    .create_runtime(RuntimeSettings {
                        modules: vec![StaticModule {
                            name: "spawned".to_string(),
                            init: Box::new(|_s, e| Ok(e)),
                        }],
                        ..Default::default()
                    })
                    .map_err(|e| NodeError::Call {
                        status: Status::GenericFailure,
                        engine_error_code: 0,
                        message: e.to_string(),
                    })?;
                *slot.lock().unwrap() = Some(inner);
                Ok(exports)
            }),
        }],
        ..Default::default()
    };

    let rt = platform.create_runtime(settings).unwrap();
    let inner = nested.lock().unwrap().take().expect("nested runtime exists");

    inner.dispose().unwrap();
    rt.dispose().unwrap();
    platform.dispose().unwrap();
}

#[test]
fn failing_module_init_becomes_a_pending_exception() {
    let (_engine, platform) = scoped_platform();
    let settings = RuntimeSettings {
        modules: vec![StaticModule {
            name: "broken".to_string(),
            init: Box::new(|_session, _exports| Err(deliberate_failure())),
        }],
        ..Default::default()
    };

    // Startup itself succeeds; the failure is thrown into the
    // environment the way a JavaScript module error would be.
    let rt = platform.create_runtime(settings).unwrap();
    let pending = rt.run(|session| session.is_exception_pending()).unwrap();
    assert!(pending);

    rt.dispose().unwrap();
    platform.dispose().unwrap();
}

#[test]
fn failing_preload_hook_fails_runtime_creation() {
    let (_engine, platform) = scoped_platform();
    let settings = RuntimeSettings {
        preload: Some(Box::new(|_session| Err(deliberate_failure()))),
        ..Default::default()
    };

    match platform.create_runtime(settings) {
        Err(LifecycleError::Native(NodeError::Call { message, .. })) => {
            assert_eq!(message, "deliberate");
        }
        other => panic!("expected Native(Call), got {other:?}"),
    }
    // The failed runtime left nothing alive behind.
    assert_eq!(platform.live_runtimes(), 0);
    platform.dispose().unwrap();
}

#[test]
fn event_loop_pumping_reports_remaining_work() {
    let (engine, platform) = scoped_platform();
    let rt = platform.create_runtime(RuntimeSettings::default()).unwrap();

    let seeder = Arc::clone(&engine);
    rt.run(move |session| {
        seeder.push_pending_tasks(session.env(), 2);
        assert_eq!(session.pump(RunMode::NoWait)?, true);
        assert_eq!(session.pump(RunMode::NoWait)?, false);
        Ok(())
    })
    .unwrap();

    // Idle loop: nothing remains in any mode.
    assert!(!rt.run_event_loop_no_wait().unwrap());
    assert!(!rt.run_event_loop_once().unwrap());
    rt.run_event_loop().unwrap();

    rt.dispose().unwrap();
    platform.dispose().unwrap();
}
