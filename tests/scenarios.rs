use hookline::prelude::*;
use hookline::{Offload, Settlement};
use hookline_testing::{RecordingLogger, ScriptedHandler, init_tracing};
use serde_json::json;
use std::time::Duration;

fn engine() -> Engine {
    init_tracing();
    Engine::builder().logger(RecordingLogger::new()).build()
}

#[test]
fn test_fetch_awaits_value_from_issuer() {
    let engine = engine();
    let (deferred, completer) = engine.event_loop().register::<i64>();
    let handler = ScriptedHandler::new().awaiting(deferred);

    let unit = engine.dispatch(Request::get("/"), Target::component(handler), RouteParams::new());
    assert!(unit.is_suspended());

    std::thread::spawn(move || completer.fulfill(42));
    let stats = engine.run();

    assert_eq!(unit.output().unwrap().body, "42");
    assert_eq!(stats.completions, 1);
    assert_eq!(stats.stalled, 0);
}

#[test]
fn test_rejected_fetch_reaches_error_hook_and_caller() {
    let engine = engine();
    let (deferred, completer) = engine.event_loop().register::<i64>();
    let handler = ScriptedHandler::new().awaiting(deferred);
    let journal = handler.journal();
    let observed = handler.observed();

    let unit = engine.dispatch(Request::get("/"), Target::component(handler), RouteParams::new());
    completer.reject(Fault::timeout(Duration::from_millis(100)));
    engine.run();

    assert!(matches!(unit.error().unwrap(), Fault::Timeout { after_ms: 100 }));
    assert!(matches!(observed.borrow()[0], Fault::Timeout { after_ms: 100 }));
    let journal = journal.borrow();
    assert_eq!(&journal[journal.len() - 2..], ["error", "after_response"]);
}

#[test]
fn test_request_timeout_wins_over_slow_issuer() {
    init_tracing();
    let engine = Engine::builder()
        .logger(RecordingLogger::new())
        .request_timeout(Duration::from_millis(10))
        .build();
    let (deferred, completer) = engine.event_loop().register::<i64>();
    let handler = ScriptedHandler::new().awaiting(deferred.clone());
    let journal = handler.journal();

    let unit = engine.dispatch(Request::get("/"), Target::component(handler), RouteParams::new());
    let issuer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(60));
        completer.fulfill(7);
    });
    engine.run();
    assert!(unit.is_completed());
    assert_eq!(engine.event_loop().pending_operations(), 0);
    issuer.join().unwrap();
    let late = engine.event_loop().run_until_stalled();

    assert!(matches!(unit.error().unwrap(), Fault::Timeout { after_ms: 10 }));
    assert_eq!(unit.error().unwrap().status(), StatusCode::GATEWAY_TIMEOUT);
    // The late result was dropped and resumed nothing.
    assert_eq!(late.discarded, 1);
    assert_eq!(late.polls, 0);
    assert_eq!(deferred.settlement(), Settlement::Pending);
    assert!(!journal.borrow().contains(&"fetch:resumed"));
    assert_eq!(
        journal.borrow().iter().filter(|s| **s == "after_response").count(),
        1
    );
}

#[test]
fn test_independent_requests_finish_in_settlement_order() {
    let engine = engine();
    let (d1, c1) = engine.event_loop().register::<i64>();
    let (d2, c2) = engine.event_loop().register::<i64>();

    let first = engine.dispatch(
        Request::get("/one"),
        Target::component(ScriptedHandler::new().awaiting(d1)),
        RouteParams::new(),
    );
    let second = engine.dispatch(
        Request::get("/two"),
        Target::component(ScriptedHandler::new().awaiting(d2)),
        RouteParams::new(),
    );
    assert!(first.is_suspended() && second.is_suspended());

    c2.fulfill(2);
    engine.event_loop().run_until_stalled();
    assert!(second.is_completed());
    assert!(first.is_suspended());
    assert_eq!(second.output().unwrap().body, "2");

    c1.fulfill(1);
    engine.event_loop().run_until_stalled();
    assert_eq!(first.output().unwrap().body, "1");
    assert_eq!(engine.event_loop().live_units(), 0);
}

#[test]
fn test_cancellation_runs_cleanup_and_discards_late_result() {
    let engine = engine();
    let (deferred, completer) = engine.event_loop().register::<i64>();
    let handler = ScriptedHandler::new().awaiting(deferred.clone());
    let journal = handler.journal();
    let observed = handler.observed();

    let (unit, probe) =
        engine.dispatch_probed(Request::get("/"), Target::component(handler), RouteParams::new());
    engine.event_loop().cancel(unit.id()).unwrap();

    assert!(unit.error().unwrap().is_cancelled());
    assert_eq!(deferred.settlement(), Settlement::Rejected);
    assert!(observed.borrow()[0].is_cancelled());
    assert!(probe.is_finished());
    assert_eq!(engine.event_loop().pending_operations(), 0);
    let after_cancel = journal.borrow().clone();

    completer.fulfill(5);
    let stats = engine.event_loop().run_until_stalled();

    assert_eq!(stats.discarded, 1);
    assert_eq!(stats.polls, 0);
    assert_eq!(*journal.borrow(), after_cancel);
    assert_eq!(
        after_cancel.iter().filter(|s| **s == "after_response").count(),
        1
    );
}

#[test]
fn test_abandoned_issuer_raises_instead_of_hanging() {
    let engine = engine();
    let (deferred, completer) = engine.event_loop().register::<i64>();
    let unit = engine.dispatch(
        Request::get("/"),
        Target::component(ScriptedHandler::new().awaiting(deferred)),
        RouteParams::new(),
    );

    std::thread::spawn(move || drop(completer));
    let stats = engine.run();

    assert!(matches!(unit.error().unwrap(), Fault::Abandoned));
    assert_eq!(stats.stalled, 0);
}

#[test]
fn test_named_handler_timeout_overrides_engine() {
    init_tracing();
    let registry = HandlerRegistry::builder()
        .handler_with(
            HandlerMeta::new("stuck").timeout(Duration::from_millis(5)),
            || Box::new(ScriptedHandler::new().awaiting(Deferred::new())),
        )
        .build();
    let engine = Engine::builder()
        .request_timeout(Duration::from_secs(60))
        .registry(registry)
        .logger(RecordingLogger::new())
        .build();

    let unit = engine
        .dispatch_named("stuck", Request::get("/"), RouteParams::new())
        .unwrap();
    engine.run();

    assert!(matches!(unit.error().unwrap(), Fault::Timeout { after_ms: 5 }));
}

#[test]
fn test_callable_path_shapes_replies() {
    let engine = engine();

    let object = Callable::new(|_request: Request, params: RouteParams| async move {
        Ok::<_, Fault>(json!({ "user": params["id"], "active": true }))
    });
    let mut route = RouteParams::new();
    route.insert("id".into(), "3".into());
    let response = engine.handle(Request::get("/users/3"), object, route).unwrap();
    assert_eq!(response.content_type(), Some("application/json"));
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&response.body).unwrap(),
        json!({ "user": "3", "active": true })
    );

    let scalar = Callable::new(|_request: Request, _params: RouteParams| async move {
        Ok::<_, Fault>(json!(12.5))
    });
    let response = engine.handle(Request::get("/"), scalar, RouteParams::new()).unwrap();
    assert_eq!(response.body, "12.5");

    let redirect = Callable::new(|_request: Request, _params: RouteParams| async move {
        Ok::<_, Fault>(Response::redirect("/login"))
    });
    let response = engine.handle(Request::get("/"), redirect, RouteParams::new()).unwrap();
    assert_eq!(response.status, StatusCode::FOUND);
    assert_eq!(response.location(), Some("/login"));
}

#[test]
fn test_offloaded_fetch_on_tokio() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    init_tracing();
    let engine = Engine::builder()
        .offload(Offload::new(runtime.handle().clone()))
        .logger(RecordingLogger::new())
        .build();

    let offload = engine.app().offload.clone().unwrap();
    let answer = offload.issue(engine.event_loop(), async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(42i64)
    });

    let response = engine
        .handle(
            Request::get("/"),
            Target::component(ScriptedHandler::new().awaiting(answer)),
            RouteParams::new(),
        )
        .unwrap();
    assert_eq!(response.body, "42");
}

#[test]
fn test_shutdown_cancels_in_flight_requests() {
    let engine = engine();
    let (deferred, _completer) = engine.event_loop().register::<i64>();
    let handler = ScriptedHandler::new().awaiting(deferred);
    let journal = handler.journal();

    let unit = engine.dispatch(Request::get("/"), Target::component(handler), RouteParams::new());
    assert_eq!(engine.shutdown(), 1);

    assert!(unit.error().unwrap().is_cancelled());
    assert_eq!(journal.borrow().last(), Some(&"after_response"));
    assert_eq!(engine.event_loop().live_units(), 0);
}

#[test]
fn test_invalid_config_is_reported_through_public_error() {
    let service = hookline::ConfigService::from_pairs([("HOOKLINE_REQUEST_TIMEOUT_MS", "later")]);
    let err = hookline::EngineConfig::from_service(&service).unwrap_err();

    assert!(matches!(err, hookline::config::ConfigError::Invalid { .. }));
    assert!(matches!(err, hookline::ConfigError::Invalid { ref value, .. } if value == "later"));
}
