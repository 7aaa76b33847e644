//! Handle scope and reference discipline against the mock engine.

use std::sync::Arc;

use jsbridge_abi::mock::MockEngine;
use jsbridge_abi::NodeApi;
use jsbridge_core::errors::ScopeError;
use jsbridge_runtime::EmbeddingSession;

fn session() -> (Arc<MockEngine>, EmbeddingSession) {
    let engine = Arc::new(MockEngine::new());
    let platform = engine.create_platform(&["node".to_string()]).unwrap();
    let env = engine.create_environment(platform, 0, &[], None).unwrap();
    let session = EmbeddingSession::new(env, engine.clone());
    (engine, session)
}

#[test]
fn nested_scopes_close_in_lifo_order() {
    let (_engine, session) = session();
    let outer = session.open_scope().unwrap();
    let inner = session.open_scope().unwrap();
    assert_eq!(session.scope_depth(), 2);

    session.close_scope(inner).unwrap();
    session.close_scope(outer).unwrap();
    assert_eq!(session.scope_depth(), 0);
}

#[test]
fn out_of_order_close_is_refused_host_side() {
    let (engine, session) = session();
    let outer = session.open_scope().unwrap();
    let inner = session.open_scope().unwrap();

    match session.close_scope(outer) {
        Err(ScopeError::OutOfOrderClose { expected, got }) => {
            assert_eq!(expected, inner.raw());
            assert_eq!(got, outer.raw());
        }
        other => panic!("expected OutOfOrderClose, got {other:?}"),
    }
    // The refusal never reached the engine; both scopes are still open.
    assert_eq!(session.scope_depth(), 2);
    assert_eq!(engine.open_scope_count(session.env()), 2);
}

#[test]
fn close_with_no_open_scope_is_refused() {
    let (_engine, session) = session();
    let token = session.open_scope().unwrap();
    session.close_scope(token).unwrap();

    assert!(matches!(
        session.close_scope(token),
        Err(ScopeError::NoOpenScope)
    ));
}

#[test]
fn stale_token_is_detected() {
    let (_engine, session) = session();
    let outer = session.open_scope().unwrap();
    let inner = session.open_scope().unwrap();
    session.close_scope(inner).unwrap();

    match session.close_scope(inner) {
        Err(ScopeError::UnknownScope { token }) => assert_eq!(token, inner.raw()),
        other => panic!("expected UnknownScope, got {other:?}"),
    }
    session.close_scope(outer).unwrap();
}

#[test]
fn escape_requires_an_escapable_scope() {
    let (engine, session) = session();
    let plain = session.open_scope().unwrap();
    let value = engine.alloc_value(session.env());

    assert!(matches!(
        session.escape(plain, value),
        Err(ScopeError::NotEscapable)
    ));
}

#[test]
fn escape_is_permitted_exactly_once() {
    let (engine, session) = session();
    let scope = session.open_escapable_scope().unwrap();
    let first = engine.alloc_value(session.env());
    let second = engine.alloc_value(session.env());

    session.escape(scope, first).unwrap();
    assert!(matches!(
        session.escape(scope, second),
        Err(ScopeError::EscapeCalledTwice)
    ));
}

#[test]
fn escaped_value_survives_its_scope() {
    let (engine, session) = session();
    let outer = session.open_scope().unwrap();
    let inner = session.open_escapable_scope().unwrap();
    let value = engine.alloc_value(session.env());

    let escaped = session.escape(inner, value).unwrap();
    session.close_scope(inner).unwrap();
    assert!(engine.value_is_live(session.env(), escaped));

    session.close_scope(outer).unwrap();
    assert!(!engine.value_is_live(session.env(), escaped));
}

#[test]
fn reference_pins_a_value_past_its_scope() {
    let (engine, session) = session();
    let scope = session.open_scope().unwrap();
    let value = engine.alloc_value(session.env());
    let mut reference = session.create_reference(value, 1).unwrap();
    session.close_scope(scope).unwrap();

    assert!(engine.value_is_live(session.env(), value));
    assert_eq!(reference.unref().unwrap(), 0);
    assert_eq!(reference.ref_().unwrap(), 1);
    reference.delete().unwrap();
}

#[test]
fn deleted_reference_refuses_further_use() {
    let (engine, session) = session();
    let _scope = session.open_scope().unwrap();
    let value = engine.alloc_value(session.env());
    let mut reference = session.create_reference(value, 1).unwrap();

    reference.delete().unwrap();
    assert!(reference.is_deleted());
    assert!(matches!(reference.delete(), Err(ScopeError::ReferenceDeleted)));
    assert!(matches!(reference.ref_(), Err(ScopeError::ReferenceDeleted)));
    assert!(matches!(reference.unref(), Err(ScopeError::ReferenceDeleted)));
}

#[test]
fn script_results_live_in_the_current_scope() {
    let (engine, session) = session();
    let scope = session.open_scope().unwrap();
    let value = session.run_script("6 * 7").unwrap();
    assert!(engine.value_is_live(session.env(), value));

    session.close_scope(scope).unwrap();
    assert!(!engine.value_is_live(session.env(), value));
}
