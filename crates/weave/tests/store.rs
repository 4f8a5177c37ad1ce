//! Reactive store behaviour against a hand-driven backend.

mod support;

use std::rc::Rc;

use futures_channel::mpsc;
use serde_json::json;
use support::{Counter, Harness, value, variable};
use weave::error::ResolveError;
use weave::store::{DerivedResponse, Phase, StoreMessage};
use weave::weave_model::{Value, Variable};
use weave::{RequestExtras, Resolution, RuntimeConfig, StoreError, TransportError};

fn plain(uid: &str, default: serde_json::Value) -> serde_json::Value {
    json!({"__typename": "Variable", "uid": uid, "default": default})
}

fn sum_tracking_a() -> Variable {
    variable(json!({
        "__typename": "DerivedVariable",
        "uid": "sum",
        "variables": [plain("A", json!(1)), plain("B", json!(2))],
        "deps": [plain("A", json!(1))]
    }))
}

fn ready(resolution: Resolution) -> Value {
    match resolution {
        Resolution::Ready(value) => value,
        other => panic!("expected a ready value, got {other:?}"),
    }
}

#[test]
fn leaves_resolve_synchronously() {
    let harness = Harness::new();
    let extras = RequestExtras::new();
    let a = variable(plain("A", json!({"n": 1})));
    let nested = variable(json!({"__typename": "Variable", "uid": "A", "default": {"n": 1}, "nested": ["n"]}));

    assert_eq!(ready(harness.store.read(&a, &extras)), value(json!({"n": 1})));
    assert_eq!(ready(harness.store.read(&nested, &extras)), Value::int(1));
}

#[test]
fn derived_resolution_lifecycle() {
    let mut harness = Harness::new();
    let extras = RequestExtras::new();
    let sum = sum_tracking_a();
    let _subscription = harness.store.subscribe(&sum, &extras, || {});

    assert!(harness.store.read(&sum, &extras).is_pending());
    assert_eq!(harness.store.phase(&sum, &extras), Some(Phase::Resolving));
    assert_eq!(harness.backend.request_count(), 1);
    assert_eq!(
        harness.backend.request_json(0),
        json!({
            "uid": "sum",
            "values": {
                "data": {
                    "type": "derived",
                    "uid": "sum",
                    "values": [{"__ref": "Variable:A"}, {"__ref": "Variable:B"}],
                    "force": false
                },
                "lookup": {"Variable:A": 1, "Variable:B": 2}
            }
        })
    );

    // Reading again while in flight coalesces onto the same request.
    assert!(harness.store.read(&sum, &extras).is_pending());
    assert_eq!(harness.backend.request_count(), 1);

    harness.backend.respond(0, Value::int(3));
    harness.settle();
    assert_eq!(ready(harness.store.read(&sum, &extras)), Value::int(3));
    assert_eq!(harness.store.phase(&sum, &extras), Some(Phase::Resolved));
}

#[test]
fn only_tracked_dependencies_trigger_recomputation() {
    let mut harness = Harness::new();
    let extras = RequestExtras::new();
    let sum = sum_tracking_a();
    let a = variable(plain("A", json!(1)));
    let b = variable(plain("B", json!(2)));
    let _subscription = harness.store.subscribe(&sum, &extras, || {});
    harness.store.read(&sum, &extras);
    harness.backend.respond(0, Value::int(3));
    harness.settle();

    harness.store.write(&b, &extras, Value::int(5)).unwrap();
    assert_eq!(harness.backend.request_count(), 1);
    assert_eq!(ready(harness.store.read(&sum, &extras)), Value::int(3));

    harness.store.write(&a, &extras, Value::int(10)).unwrap();
    assert_eq!(harness.backend.request_count(), 2);
    assert_eq!(
        harness.backend.request_json(1)["values"]["lookup"],
        json!({"Variable:A": 10, "Variable:B": 5})
    );
    assert!(matches!(
        harness.store.read(&sum, &extras),
        Resolution::Refreshing(stale) if stale == Value::int(3)
    ));
}

#[test]
fn unsubscribed_cells_refresh_on_next_read() {
    let mut harness = Harness::new();
    let extras = RequestExtras::new();
    let sum = sum_tracking_a();
    let a = variable(plain("A", json!(1)));
    harness.store.read(&sum, &extras);
    harness.backend.respond(0, Value::int(3));
    harness.settle();

    harness.store.write(&a, &extras, Value::int(4)).unwrap();
    assert_eq!(harness.backend.request_count(), 1);
    assert!(matches!(harness.store.read(&sum, &extras), Resolution::Refreshing(_)));
    assert_eq!(harness.backend.request_count(), 2);
}

#[test]
fn stale_responses_are_discarded() {
    let mut harness = Harness::new();
    let extras = RequestExtras::new();
    let sum = sum_tracking_a();
    let a = variable(plain("A", json!(1)));
    let _subscription = harness.store.subscribe(&sum, &extras, || {});
    harness.store.read(&sum, &extras);
    harness.store.write(&a, &extras, Value::int(2)).unwrap();
    assert_eq!(harness.backend.request_count(), 2);

    harness.backend.respond(1, value(json!("new")));
    harness.settle();
    harness.backend.respond(0, value(json!("old")));
    harness.settle();

    assert_eq!(ready(harness.store.read(&sum, &extras)), value(json!("new")));
}

#[test]
fn subscribers_hear_about_settled_values() {
    let mut harness = Harness::new();
    let extras = RequestExtras::new();
    let sum = sum_tracking_a();
    let a = variable(plain("A", json!(1)));
    let counter = Counter::default();
    let _subscription = harness.store.subscribe(&sum, &extras, counter.callback());

    harness.store.read(&sum, &extras);
    harness.backend.respond(0, Value::int(3));
    harness.settle();
    assert_eq!(counter.get(), 1);

    // Restart notifies, so the stale value can be shown as refreshing.
    harness.store.write(&a, &extras, Value::int(2)).unwrap();
    assert_eq!(counter.get(), 2);
}

#[test]
fn writes_converge_across_contexts() {
    let mut harness = Harness::new();
    let alice = RequestExtras::new().with_header("x-user", "alice");
    let bob = RequestExtras::new().with_header("x-user", "bob");
    let prefs = variable(json!({
        "__typename": "Variable",
        "uid": "prefs-var",
        "default": {"theme": "light"},
        "store": {"uid": "prefs"}
    }));
    harness.store.read(&prefs, &alice);
    harness.store.read(&prefs, &bob);
    let counter = Counter::default();
    let _subscription = harness.store.subscribe(&prefs, &bob, counter.callback());

    harness
        .store
        .write(&prefs, &alice, value(json!({"theme": "dark"})))
        .unwrap();
    harness.settle();

    assert_eq!(ready(harness.store.read(&prefs, &bob)), value(json!({"theme": "dark"})));
    assert_eq!(counter.get(), 1);
    let persisted = harness.backend.persisted();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].0, "prefs");
    assert_eq!(persisted[0].2.header("x-user"), Some("alice"));

    harness
        .store
        .write(&prefs, &bob, value(json!({"theme": "blue"})))
        .unwrap();
    harness.settle();
    assert_eq!(ready(harness.store.read(&prefs, &alice)), value(json!({"theme": "blue"})));
    assert_eq!(harness.backend.persisted()[1].2.header("x-user"), Some("bob"));
}

#[test]
fn new_contexts_start_from_the_synchronized_value() {
    let harness = Harness::new();
    let a = variable(plain("A", json!(1)));
    let first = RequestExtras::new();
    harness.store.write(&a, &first, Value::int(9)).unwrap();

    let late = RequestExtras::new().with_header("authorization", "token");
    assert_eq!(ready(harness.store.read(&a, &late)), Value::int(9));
}

#[test]
fn derived_cells_are_isolated_per_context() {
    let harness = Harness::new();
    let sum = sum_tracking_a();
    let alice = RequestExtras::new().with_header("x-user", "alice");
    let bob = RequestExtras::new().with_header("x-user", "bob");
    harness.store.read(&sum, &alice);
    harness.store.read(&sum, &bob);

    assert_eq!(harness.backend.request_count(), 2);
    assert_eq!(harness.backend.request_extras(0).header("x-user"), Some("alice"));
    assert_eq!(harness.backend.request_extras(1).header("x-user"), Some("bob"));
}

#[test]
fn cookie_separators_do_not_merge_contexts() {
    let mut harness = Harness::new();
    let sum = sum_tracking_a();
    let one_cookie = RequestExtras::new().with_header("cookie", "sid=1;x-tenant=2");
    let two_headers = RequestExtras::new()
        .with_header("cookie", "sid=1")
        .with_header("x-tenant", "2");
    harness.store.read(&sum, &one_cookie);
    harness.backend.respond(0, value(json!("for-cookie")));
    harness.settle();

    assert!(harness.store.read(&sum, &two_headers).is_pending());
    assert_eq!(harness.backend.request_count(), 2);
    assert_eq!(harness.backend.request_extras(1).header("x-tenant"), Some("2"));
}

#[test]
fn toggle_and_sync_target_the_nested_path() {
    let harness = Harness::new();
    let extras = RequestExtras::new();
    let whole = variable(plain("panel", json!({"open": false, "title": "Filters"})));
    let open = variable(json!({
        "__typename": "Variable",
        "uid": "panel",
        "default": {"open": false, "title": "Filters"},
        "nested": ["open"]
    }));
    let title = variable(json!({
        "__typename": "Variable",
        "uid": "panel",
        "default": {"open": false, "title": "Filters"},
        "nested": ["title"]
    }));

    harness.store.toggle(&open, &extras).unwrap();
    assert_eq!(
        ready(harness.store.read(&whole, &extras)),
        value(json!({"open": true, "title": "Filters"}))
    );

    harness.store.sync(&title, &extras, value(json!("Search"))).unwrap();
    assert_eq!(
        ready(harness.store.read(&whole, &extras)),
        value(json!({"open": true, "title": "Search"}))
    );

    harness.store.toggle(&open, &extras).unwrap();
    assert_eq!(ready(harness.store.read(&open, &extras)), Value::Bool(false));
}

#[test]
fn nested_write_into_a_primitive_fails() {
    let harness = Harness::new();
    let extras = RequestExtras::new();
    let nested = variable(json!({"__typename": "Variable", "uid": "n", "default": 4, "nested": ["x"]}));

    assert!(matches!(
        harness.store.write(&nested, &extras, Value::int(1)),
        Err(StoreError::Path { uid, .. }) if uid == "n"
    ));
}

#[test]
fn derived_variables_are_read_only() {
    let harness = Harness::new();
    assert!(matches!(
        harness.store.write(&sum_tracking_a(), &RequestExtras::new(), Value::int(1)),
        Err(StoreError::NotWritable { uid }) if uid == "sum"
    ));
}

#[test]
fn force_trigger_marks_only_the_triggered_node() {
    let mut harness = Harness::new();
    let extras = RequestExtras::new();
    let inner = json!({"__typename": "DerivedVariable", "uid": "inner", "variables": [plain("X", json!(1))]});
    let outer = variable(json!({
        "__typename": "DerivedVariable",
        "uid": "outer",
        "variables": [plain("A", json!(0)), inner.clone()]
    }));
    let _subscription = harness.store.subscribe(&outer, &extras, || {});
    harness.store.read(&outer, &extras);
    harness.backend.respond(0, Value::int(1));
    harness.settle();

    harness.store.trigger(&variable(inner), true);
    assert_eq!(harness.backend.request_count(), 2);
    let data = &harness.backend.request_json(1)["values"]["data"];
    assert_eq!(data["force"], json!(false));
    assert_eq!(data["values"][1]["uid"], json!("inner"));
    assert_eq!(data["values"][1]["force"], json!(true));
}

#[test]
fn trigger_on_the_root_recomputes_once() {
    let mut harness = Harness::new();
    let extras = RequestExtras::new();
    let sum = sum_tracking_a();
    let _subscription = harness.store.subscribe(&sum, &extras, || {});
    harness.store.read(&sum, &extras);
    harness.backend.respond(0, Value::int(3));
    harness.settle();

    harness.store.trigger(&sum, false);
    assert_eq!(harness.backend.request_count(), 2);
    assert_eq!(harness.backend.request_json(1)["values"]["data"]["force"], json!(false));
    harness.store.read(&sum, &extras);
    assert_eq!(harness.backend.request_count(), 2);

    let unrelated = variable(json!({"__typename": "DerivedVariable", "uid": "other", "variables": []}));
    harness.store.trigger(&unrelated, true);
    assert_eq!(harness.backend.request_count(), 2);
}

#[test]
fn backend_failures_stay_with_their_cell() {
    let mut harness = Harness::new();
    let extras = RequestExtras::new();
    let failing = variable(json!({"__typename": "DerivedVariable", "uid": "failing", "variables": []}));
    let healthy = variable(json!({"__typename": "DerivedVariable", "uid": "healthy", "variables": []}));
    harness.store.read(&failing, &extras);
    harness.store.read(&healthy, &extras);

    harness.backend.fail(
        0,
        TransportError::Status {
            status: 500,
            message: "boom".into(),
        },
    );
    harness.backend.respond(1, Value::int(1));
    harness.settle();

    assert!(matches!(
        harness.store.read(&failing, &extras),
        Resolution::Failed(error) if matches!(*error, ResolveError::Transport(TransportError::Status { status: 500, .. }))
    ));
    assert_eq!(ready(harness.store.read(&healthy, &extras)), Value::int(1));
}

#[test]
fn normalized_responses_with_missing_references_fail() {
    let mut harness = Harness::new();
    let extras = RequestExtras::new();
    let table = variable(json!({"__typename": "DerivedVariable", "uid": "table", "variables": []}));
    harness.store.read(&table, &extras);
    harness.backend.respond_with(
        0,
        DerivedResponse::Normalized {
            data: value(json!({"row": {"__ref": "Variable:gone"}})),
            lookup: Default::default(),
        },
    );
    harness.settle();

    assert!(matches!(
        harness.store.read(&table, &extras),
        Resolution::Failed(error) if matches!(&*error, ResolveError::MissingReference { key } if key == "Variable:gone")
    ));
}

#[test]
fn resolve_awaits_the_next_settled_value() {
    let mut harness = Harness::new();
    let extras = RequestExtras::new();
    let nested = variable(json!({
        "__typename": "DerivedVariable",
        "uid": "profile",
        "variables": [],
        "nested": ["name"]
    }));

    let pending = harness.store.resolve(&nested, &extras);
    harness.backend.respond(0, value(json!({"name": "Ann", "age": 3})));
    assert_eq!(harness.pool.run_until(pending).unwrap(), value(json!("Ann")));

    let cached = harness.store.resolve(&nested, &extras);
    assert_eq!(harness.pool.run_until(cached).unwrap(), value(json!("Ann")));
    assert_eq!(harness.backend.request_count(), 1);
}

#[test]
fn dropping_the_last_subscription_evicts_the_cell() {
    let mut harness = Harness::new();
    let extras = RequestExtras::new();
    let sum = sum_tracking_a();
    let first = harness.store.subscribe(&sum, &extras, || {});
    let second = harness.store.subscribe(&sum, &extras, || {});
    let pending = harness.store.resolve(&sum, &extras);
    assert!(harness.store.has_cell(&sum, &extras));

    drop(first);
    assert!(harness.store.has_cell(&sum, &extras));
    drop(second);
    assert!(!harness.store.has_cell(&sum, &extras));
    assert_eq!(harness.store.subscriber_count(), 0);

    assert!(matches!(
        harness.pool.run_until(pending),
        Err(error) if matches!(&*error, ResolveError::Cancelled { uid } if uid == "sum")
    ));

    // The evicted request's response goes nowhere.
    harness.backend.respond(0, Value::int(1));
    harness.settle();
    assert!(!harness.store.has_cell(&sum, &extras));
}

#[test]
fn backend_store_is_fetched_before_first_read() {
    let mut harness = Harness::new();
    let extras = RequestExtras::new().with_header("x-user", "alice");
    let prefs = variable(json!({
        "__typename": "Variable",
        "uid": "prefs-var",
        "default": {"theme": "light"},
        "store": {"uid": "prefs"}
    }));
    harness.backend.set_store("prefs", value(json!({"theme": "dark"})));
    harness.backend.hold_fetches();

    let store = harness.store.clone();
    let backend = harness.backend.clone();
    let (prefs_in_task, extras_in_task) = (prefs.clone(), extras.clone());
    let resolved = harness.pool.run_until(async move {
        let mount = store.mount_backend_variable(&prefs_in_task, &extras_in_task);
        futures::pin_mut!(mount);
        assert!(futures::poll!(mount.as_mut()).is_pending());
        assert!(store.read(&prefs_in_task, &extras_in_task).is_pending());

        let resolved = store.resolve(&prefs_in_task, &extras_in_task);
        backend.release_fetches();
        mount.await.unwrap();
        resolved.await
    });

    assert_eq!(resolved.unwrap(), value(json!({"theme": "dark"})));
    assert_eq!(ready(harness.store.read(&prefs, &extras)), value(json!({"theme": "dark"})));
    assert_eq!(harness.backend.fetches()[0].0, "prefs");
    assert_eq!(harness.backend.fetches()[0].1.header("x-user"), Some("alice"));
}

#[test]
fn mounting_requires_a_store_binding() {
    let harness = Harness::new();
    let mut pool = futures::executor::LocalPool::new();
    let a = variable(plain("A", json!(1)));
    assert!(matches!(
        pool.run_until(harness.store.mount_backend_variable(&a, &RequestExtras::new())),
        Err(StoreError::NoBackendStore { uid }) if uid == "A"
    ));
}

#[test]
fn push_messages_update_bound_variables() {
    let mut harness = Harness::new();
    let extras = RequestExtras::new();
    let prefs = variable(json!({
        "__typename": "Variable",
        "uid": "prefs-var",
        "default": null,
        "store": {"uid": "prefs"}
    }));
    let mount = harness.store.mount_backend_variable(&prefs, &extras);
    harness.pool.run_until(mount).unwrap();
    let counter = Counter::default();
    let _subscription = harness.store.subscribe(&prefs, &extras, counter.callback());

    let (sender, receiver) = mpsc::unbounded();
    harness.store.listen(receiver);
    sender
        .unbounded_send(StoreMessage {
            store_uid: "prefs".into(),
            value: value(json!({"theme": "dark"})),
        })
        .unwrap();
    sender
        .unbounded_send(StoreMessage {
            store_uid: "unrelated".into(),
            value: Value::int(1),
        })
        .unwrap();
    harness.settle();

    assert_eq!(ready(harness.store.read(&prefs, &extras)), value(json!({"theme": "dark"})));
    assert_eq!(counter.get(), 1);
    assert!(harness.backend.persisted().is_empty());
}

#[test]
fn url_variables_keep_text_values() {
    let harness = Harness::new();
    let extras = RequestExtras::new();
    let id = variable(json!({"__typename": "UrlVariable", "uid": "id", "query": "id", "default": ""}));

    harness.store.write(&id, &extras, Value::text("42")).unwrap();
    assert_eq!(ready(harness.store.read(&id, &extras)), Value::text("42"));

    harness.store.write(&id, &extras, Value::text("true")).unwrap();
    assert_eq!(ready(harness.store.read(&id, &extras)), Value::text("true"));

    harness.store.write(&id, &extras, Value::int(42)).unwrap();
    assert_eq!(ready(harness.store.read(&id, &extras)), Value::int(42));
    assert_eq!(harness.store.query().to_string(), "id=42");
}

#[test]
fn url_variables_follow_the_query() {
    let mut harness = Harness::with_query("?page=2");
    let extras = RequestExtras::new();
    let page = variable(json!({"__typename": "UrlVariable", "uid": "page", "query": "page", "default": 1}));
    let rows = variable(json!({
        "__typename": "DerivedVariable",
        "uid": "rows",
        "variables": [{"__typename": "UrlVariable", "uid": "page", "query": "page", "default": 1}]
    }));
    assert_eq!(ready(harness.store.read(&page, &extras)), Value::int(2));

    let counter = Counter::default();
    let _page_subscription = harness.store.subscribe(&page, &extras, counter.callback());
    let _rows_subscription = harness.store.subscribe(&rows, &extras, || {});
    harness.store.read(&rows, &extras);
    harness.backend.respond(0, value(json!(["r"])));
    harness.settle();

    harness.store.write(&page, &extras, Value::int(3)).unwrap();
    assert_eq!(harness.store.query().get("page"), Some("3"));
    assert_eq!(counter.get(), 1);
    assert_eq!(harness.backend.request_count(), 2);

    harness.store.navigate("page=7&sort=name");
    assert_eq!(ready(harness.store.read(&page, &extras)), Value::int(7));
    assert_eq!(counter.get(), 2);
    assert_eq!(
        harness.backend.request_json(2)["values"]["lookup"],
        json!({"Variable:page": 7})
    );

    harness.store.navigate("page=7&sort=date");
    assert_eq!(counter.get(), 2);

    harness.store.navigate("");
    assert_eq!(ready(harness.store.read(&page, &extras)), Value::int(1));
}

#[test]
fn polling_restarts_after_the_interval() {
    let mut harness = Harness::new();
    let extras = RequestExtras::new();
    let clock = harness.clock.clone();
    let ticker = variable(json!({
        "__typename": "DerivedVariable",
        "uid": "ticker",
        "variables": [],
        "polling_interval": 5
    }));
    let _subscription = harness.store.subscribe(&ticker, &extras, || {});
    harness.store.read(&ticker, &extras);
    harness.backend.respond(0, Value::int(1));
    harness.settle();

    clock.advance_by(4_999);
    harness.store.poll();
    assert_eq!(harness.backend.request_count(), 1);

    clock.advance_by(1);
    harness.store.poll();
    assert_eq!(harness.backend.request_count(), 2);
    assert!(matches!(harness.store.read(&ticker, &extras), Resolution::Refreshing(_)));
}

#[test]
fn ws_channel_is_attached_to_requests() {
    let harness = Harness::with_config(RuntimeConfig {
        ws_channel: Some("chan-7".into()),
        ..RuntimeConfig::default()
    });
    let data = variable(json!({"__typename": "DataVariable", "uid": "T"}));
    harness.store.read(&data, &RequestExtras::new());

    let request = harness.backend.request_json(0);
    assert_eq!(request["ws_channel"], json!("chan-7"));
    assert_eq!(request["values"]["data"]["type"], json!("data"));
}

#[test]
fn loop_instances_get_their_own_cells() {
    let harness = Harness::new();
    let extras = RequestExtras::new();
    let instance = |key: &str| {
        variable(json!({
            "__typename": "DerivedVariable",
            "uid": "D",
            "variables": [key],
            "loop_instance_uid": format!("D:{key}")
        }))
    };
    harness.store.read(&instance("a"), &extras);
    harness.store.read(&instance("b"), &extras);
    harness.store.read(&instance("a"), &extras);

    assert_eq!(harness.backend.request_count(), 2);
    assert_eq!(harness.backend.request(0).uid, "D");
    assert_eq!(harness.backend.request_json(1)["values"]["data"]["values"], json!(["b"]));
}

#[test]
fn clear_resets_every_cell() {
    let harness = Harness::new();
    let extras = RequestExtras::new();
    let a = variable(plain("A", json!(1)));
    harness.store.write(&a, &extras, Value::int(5)).unwrap();
    let subscription = harness.store.subscribe(&a, &extras, || {});

    harness.store.clear();
    assert_eq!(ready(harness.store.read(&a, &extras)), Value::int(1));
    assert_eq!(harness.store.subscriber_count(), 0);
    drop(subscription);
}

#[test]
fn clear_keeps_the_query() {
    let harness = Harness::with_query("?page=2");
    let extras = RequestExtras::new();
    let page = variable(json!({"__typename": "UrlVariable", "uid": "page", "query": "page", "default": 1}));
    harness.store.read(&page, &extras);

    harness.store.clear();
    assert_eq!(ready(harness.store.read(&page, &extras)), Value::int(2));
    assert_eq!(harness.store.query().get("page"), Some("2"));
}

#[test]
fn sweep_evicts_cells_only_read_once() {
    let mut harness = Harness::new();
    let extras = RequestExtras::new();
    let sum = sum_tracking_a();
    let watched = variable(json!({
        "__typename": "DerivedVariable",
        "uid": "watched",
        "variables": [plain("A", json!(1))]
    }));
    let _subscription = harness.store.subscribe(&watched, &extras, || {});
    harness.store.read(&watched, &extras);
    harness.store.read(&sum, &extras);
    let waiting = harness.store.resolve(&sum, &extras);

    // A caller is still waiting on `sum`.
    assert_eq!(harness.store.sweep(), 0);

    harness.backend.respond(1, Value::int(3));
    harness.settle();
    assert_eq!(harness.pool.run_until(waiting).unwrap(), Value::int(3));

    assert_eq!(harness.store.sweep(), 1);
    assert!(!harness.store.has_cell(&sum, &extras));
    assert!(harness.store.has_cell(&watched, &extras));
}

#[test]
fn callbacks_may_read_the_store() {
    let mut harness = Harness::new();
    let extras = RequestExtras::new();
    let sum = sum_tracking_a();
    let seen = Rc::new(std::cell::RefCell::new(Vec::new()));
    let callback = {
        let store = harness.store.clone();
        let (sum, extras, seen) = (sum.clone(), extras.clone(), seen.clone());
        move || seen.borrow_mut().push(store.read(&sum, &extras).value().cloned())
    };
    let _subscription = harness.store.subscribe(&sum, &extras, callback);
    harness.store.read(&sum, &extras);
    harness.backend.respond(0, Value::int(3));
    harness.settle();

    assert_eq!(*seen.borrow(), vec![Some(Value::int(3))]);
}
