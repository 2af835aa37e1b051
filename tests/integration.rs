//! Integration tests for dispatch, stores and the application facade.

use fluxer::{Action, Application, Observable, StateEvent, Store, StoreDefinition};
use parking_lot::Mutex;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;

fn people() -> Value {
    json!([
        {"name": "Ada"},
        {"name": "Grace"},
        {"name": "Barbara"},
    ])
}

fn person_store(app: &Application) -> Arc<Store> {
    app.create_store(
        StoreDefinition::new()
            .initial_state(people)
            .on_named("addPerson", "onAddPerson")
            .handler("onAddPerson", |_, state, data| {
                Ok(Some(state.insert(0, data.clone())))
            })
            .on("noop", |_, state, _| Ok(Some(state.clone()))),
    )
    .unwrap()
}

// --- Realistic Workflow Tests ---

#[test]
fn test_add_person_inserts_at_front() {
    let app = Application::new();
    app.register_stores([("Person", person_store(&app))]).unwrap();

    app.dispatch(Action::new("addPerson", json!({"name": "X"})))
        .unwrap();

    let person = app.evaluate(&["Person"]).into_one().unwrap();
    assert_eq!(person.len(), 4);
    assert_eq!(person.first().unwrap(), json!({"name": "X"}));
}

#[test]
fn test_count_getter_follows_store() {
    let app = Application::new();
    app.register_stores([("Person", person_store(&app))]).unwrap();

    let count = app
        .create_getter("count", &["Person"], |deps| {
            Some(json!(deps[0].len()).into())
        })
        .unwrap();
    assert_eq!(count.get_state().unwrap().unwrap(), json!(3));

    app.dispatch(Action::new("addPerson", json!({"name": "X"})))
        .unwrap();
    assert_eq!(count.get_state().unwrap().unwrap(), json!(4));
}

#[test]
fn test_initial_state_after_registration() {
    let app = Application::new();
    let store = person_store(&app);
    app.register_stores([("Person", Arc::clone(&store))]).unwrap();

    assert_eq!(app.evaluate(&["Person"]).into_one().unwrap(), people());
    assert_eq!(store.get_state().unwrap(), people());
}

#[test]
fn test_incremental_registration_keeps_existing_stores() {
    let app = Application::new();
    app.register_stores([("Person", person_store(&app))]).unwrap();
    app.dispatch(Action::new("addPerson", json!({"name": "X"})))
        .unwrap();

    let employer = app
        .create_store(StoreDefinition::new().initial_state(|| json!({"name": "ACME"})))
        .unwrap();
    app.register_stores([("Employer", employer)]).unwrap();

    assert_eq!(app.store_ids(), vec!["Person", "Employer"]);
    assert_eq!(app.state("Person").unwrap().len(), 4);
}

#[test]
fn test_unchanged_transition_fires_no_change_events() {
    let app = Application::new();
    let store = person_store(&app);
    app.register_stores([("Person", Arc::clone(&store))]).unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    for event in [StateEvent::Changing, StateEvent::Change, StateEvent::DispatchHandled] {
        let events = Arc::clone(&events);
        store.on(event, Box::new(move |e| events.lock().push(e)));
    }

    let before = app.state("Person").unwrap();
    app.dispatch(Action::bare("noop")).unwrap();

    assert_eq!(*events.lock(), vec![StateEvent::DispatchHandled]);
    assert_eq!(app.state("Person").unwrap(), before);
}

#[test]
fn test_change_events_bracket_the_write() {
    let app = Application::new();
    let store = person_store(&app);
    app.register_stores([("Person", Arc::clone(&store))]).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        let reader = Arc::clone(&store);
        store.on(
            StateEvent::Changing,
            Box::new(move |_| seen.lock().push(("changing", reader.get_state().unwrap().len()))),
        );
    }
    {
        let seen = Arc::clone(&seen);
        let reader = Arc::clone(&store);
        store.on(
            StateEvent::Change,
            Box::new(move |_| seen.lock().push(("change", reader.get_state().unwrap().len()))),
        );
    }

    app.dispatch(Action::new("addPerson", json!({"name": "X"})))
        .unwrap();
    assert_eq!(*seen.lock(), vec![("changing", 3), ("change", 4)]);
}

#[test]
fn test_unknown_action_type_is_ignored() {
    let app = Application::new();
    app.register_stores([("Person", person_store(&app))]).unwrap();

    app.dispatch(Action::bare("somethingElse")).unwrap();
    assert_eq!(app.state("Person").unwrap(), people());
}

// --- wait_for Ordering ---

#[test]
fn test_wait_for_sees_updated_state() {
    let app = Application::new();

    // Registered first, but reads Counter after Counter has handled the action.
    let mirror = app
        .create_store(
            StoreDefinition::new()
                .initial_state(|| json!({"seen": null}))
                .on("increment", |ctx, state, _| {
                    ctx.wait_for(["Counter"])?;
                    let counter = ctx.state_of("Counter").unwrap_or_default();
                    Ok(Some(state.set("seen", counter.to_plain())))
                }),
        )
        .unwrap();
    let counter = app
        .create_store(
            StoreDefinition::new()
                .initial_state(|| json!({"count": 0}))
                .on("increment", |_, state, _| {
                    let count = state
                        .get("count")
                        .and_then(|c| c.as_value().as_i64())
                        .unwrap_or(0);
                    Ok(Some(state.set("count", count + 1)))
                }),
        )
        .unwrap();

    app.register_stores([("Mirror", mirror), ("Counter", counter)])
        .unwrap();
    app.dispatch(Action::bare("increment")).unwrap();

    assert_eq!(app.state("Counter").unwrap(), json!({"count": 1}));
    assert_eq!(app.state("Mirror").unwrap(), json!({"seen": {"count": 1}}));
}

#[test]
fn test_wait_for_by_store_handle() {
    let app = Application::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let second = {
        let log = Arc::clone(&log);
        app.create_store(StoreDefinition::new().on("go", move |_, state, _| {
            log.lock().push("second");
            Ok(Some(state.clone()))
        }))
        .unwrap()
    };
    let first = {
        let log = Arc::clone(&log);
        let target = Arc::clone(&second);
        app.create_store(StoreDefinition::new().on("go", move |ctx, state, _| {
            ctx.wait_for([&target])?;
            log.lock().push("first");
            Ok(Some(state.clone()))
        }))
        .unwrap()
    };

    app.register_stores([("First", first), ("Second", second)])
        .unwrap();
    app.dispatch(Action::bare("go")).unwrap();

    // Second runs exactly once, ahead of First.
    assert_eq!(*log.lock(), vec!["second", "first"]);
}

// --- Determinism ---

fn counter_app() -> Application {
    let app = Application::new();
    let store = app
        .create_store(
            StoreDefinition::new()
                .initial_state(|| json!({"total": 0, "log": []}))
                .on("add", |_, state, data| {
                    let total = state
                        .get("total")
                        .and_then(|t| t.as_value().as_i64())
                        .unwrap_or(0);
                    let by = data.as_i64().unwrap_or(0);
                    let log = state.get("log").unwrap_or_default().push(by);
                    Ok(Some(state.set("total", total + by).set("log", log.to_plain())))
                })
                .on("clear", |_, _, _| Ok(Some(json!({"total": 0, "log": []}).into()))),
        )
        .unwrap();
    app.register_stores([("Counter", store)]).unwrap();
    app
}

proptest! {
    #[test]
    fn prop_dispatch_is_deterministic(ops in prop::collection::vec((any::<bool>(), -100i64..100), 0..40)) {
        let run = || {
            let app = counter_app();
            for (clear, by) in &ops {
                let action = if *clear {
                    Action::bare("clear")
                } else {
                    Action::new("add", json!(by))
                };
                app.dispatch(action).unwrap();
            }
            app.evaluate(&[]).into_all().unwrap()
        };

        prop_assert_eq!(run(), run());
    }
}
