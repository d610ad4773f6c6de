use state_rx::*;
use test_log::test;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn runtime() -> Rc<Runtime> {
    Runtime::new(RuntimeConfig::default())
}

fn counter(rt: &Rc<Runtime>) -> Rc<ViewV2> {
    ViewV2::builder(rt, "Counter")
        .local("count", 0)
        .local("label", "clicks")
        .build()
        .unwrap()
}

#[test]
fn test_element_rerenders_on_traced_change() {
    let rt = runtime();
    let view = counter(&rt);
    let state = view.state().clone();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen2 = seen.clone();
    let elmt = view.observe_component_creation(move |_, _| {
        seen2.borrow_mut().push(state.get("count")?);
        Ok(())
    }).unwrap();
    assert_eq!(*seen.borrow(), vec![Value::from(0)]);

    view.set("count", 1).unwrap();
    // nothing runs synchronously inside the write
    assert_eq!(view.render_count(elmt), 1);
    assert!(rt.has_pending_tasks());
    rt.flush();
    assert_eq!(view.render_count(elmt), 2);
    assert_eq!(*seen.borrow(), vec![Value::from(0), Value::from(1)]);

    // a field the element never read
    view.set("label", "taps").unwrap();
    rt.flush();
    assert_eq!(view.render_count(elmt), 2);
}

#[test]
fn test_writing_same_value_notifies_nothing() {
    let rt = runtime();
    let view = counter(&rt);
    let state = view.state().clone();
    let elmt = view.observe_component_creation(move |_, _| state.get("count").map(|_| ())).unwrap();

    view.set("count", 0).unwrap();
    assert!(!rt.has_pending_tasks());
    assert_eq!(rt.observe().pending_counts(), PendingCounts::default());
    rt.flush();
    assert_eq!(view.render_count(elmt), 1);
}

#[test]
fn test_several_writes_render_once() {
    let rt = runtime();
    let view = counter(&rt);
    let state = view.state().clone();
    let elmt = view.observe_component_creation(move |_, _| {
        state.get("count")?;
        state.get("label")?;
        Ok(())
    }).unwrap();

    view.set("count", 1).unwrap();
    view.set("count", 2).unwrap();
    view.set("label", "taps").unwrap();
    assert_eq!(rt.observe().pending_counts().elmts, 1);
    rt.flush();
    assert_eq!(view.render_count(elmt), 2);
}

#[test]
fn test_rerender_replaces_dependencies() {
    let rt = runtime();
    let view = ViewV2::builder(&rt, "Toggle")
        .local("show_a", true)
        .local("a", 1)
        .local("b", 2)
        .build()
        .unwrap();
    let state = view.state().clone();
    let elmt = view.observe_component_creation(move |_, _| {
        if state.get("show_a")?.as_bool() == Some(true) {
            state.get("a")?;
        } else {
            state.get("b")?;
        }
        Ok(())
    }).unwrap();
    let target = view.state().target().clone();
    assert_eq!(rt.observe().dependents(&target, &PropKey::field("a")), vec![elmt]);
    assert!(rt.observe().dependents(&target, &PropKey::field("b")).is_empty());

    view.set("show_a", false).unwrap();
    rt.flush();
    assert!(rt.observe().dependents(&target, &PropKey::field("a")).is_empty());
    assert_eq!(rt.observe().dependents(&target, &PropKey::field("b")), vec![elmt]);

    // `a` is no longer read
    view.set("a", 10).unwrap();
    rt.flush();
    assert_eq!(view.render_count(elmt), 2);
}

#[test]
fn test_deleted_view_leaves_no_bindings() {
    let rt = runtime();
    let view = counter(&rt);
    let state = view.state().clone();
    let elmt = view.observe_component_creation(move |_, _| state.get("count").map(|_| ())).unwrap();
    let target = view.state().target().clone();
    assert!(rt.observe().has_bindings(elmt));
    assert!(rt.is_elmt_registered(elmt));

    view.about_to_be_deleted();
    assert!(view.is_deleted());
    assert!(!rt.observe().has_bindings(elmt));
    assert!(!rt.observe().target_references(&target, elmt));
    assert!(!rt.is_elmt_registered(elmt));

    view.set("count", 5).unwrap();
    assert!(!rt.has_pending_tasks());
}

#[test]
fn test_deleted_elmt_ids_are_purged() {
    let allocator = Rc::new(ElementIdAllocator::new());
    let rt = Runtime::with_allocator(RuntimeConfig::default(), allocator.clone());
    let view = counter(&rt);
    let state = view.state().clone();
    let first = view.observe_component_creation({
        let state = state.clone();
        move |_, _| state.get("count").map(|_| ())
    }).unwrap();
    let second = view.observe_component_creation(move |_, _| state.get("count").map(|_| ())).unwrap();

    allocator.report_deleted(first);
    assert_eq!(rt.unregister_deleted_elmt_ids(), 1);
    assert!(!rt.is_elmt_registered(first));
    assert!(rt.is_elmt_registered(second));
    assert!(!rt.observe().has_bindings(first));
    assert_eq!(view.elmt_ids(), vec![second]);

    view.set("count", 1).unwrap();
    rt.flush();
    assert_eq!(view.render_count(second), 2);
    assert_eq!(rt.unregister_deleted_elmt_ids(), 0);
}

#[test]
fn test_bind_id_ranges() {
    assert_eq!(BindId(1).kind(), BindKind::Element);
    assert_eq!(BindId::MIN_COMPUTED_ID.kind(), BindKind::Computed);
    assert_eq!(BindId::MIN_WATCH_ID.kind(), BindKind::Monitor);
    assert_eq!(BindId::MIN_PERSISTENCE_ID.kind(), BindKind::Persistence);
    assert_eq!(BindId::ILLEGAL_V1V2_ACCESS.kind(), BindKind::IllegalAccessSentinel);

    let rt = runtime();
    let view = counter(&rt);
    let computed = view.computed("double", |this| Ok(Value::from(this.get("count")?.as_f64().unwrap_or(0.0) * 2.0))).unwrap();
    assert_eq!(computed.id().kind(), BindKind::Computed);
    let monitor = view.monitor(&["count"], "on_count", |_, _| Ok(())).unwrap();
    assert_eq!(monitor.watch_id().kind(), BindKind::Monitor);
    assert_eq!(view.id().kind(), BindKind::Element);
}

#[test]
fn test_illegal_v1_access() {
    let rt = runtime();
    let view = counter(&rt);
    let err = rt.observe().with_illegal_v1_access_guard(|| view.get("count")).unwrap_err();
    assert!(matches!(err, StateError::IllegalV1V2Access { .. }));
    assert!(!rt.observe().is_illegal_access_scope());
    assert_eq!(view.get("count").unwrap(), Value::from(0));
}

#[test]
fn test_execute_unobserved() {
    let rt = runtime();
    let view = counter(&rt);
    let state = view.state().clone();
    let rt2 = rt.clone();
    let elmt = view.observe_component_creation(move |_, _| {
        rt2.execute_unobserved(|| state.get("count")).map(|_| ())
    }).unwrap();
    assert!(!rt.observe().has_bindings(elmt));

    rt.execute_unobserved(|| view.set("count", 3)).unwrap();
    assert!(!rt.has_pending_tasks());
    assert_eq!(view.get("count").unwrap(), Value::from(3));
}

#[test]
fn test_params_are_read_only_for_the_child() {
    let rt = runtime();
    let view = ViewV2::builder(&rt, "Child")
        .param("title", "a")
        .once_param("initial", 1)
        .build()
        .unwrap();
    let state = view.state().clone();
    let elmt = view.observe_component_creation(move |_, _| {
        state.get("title")?;
        state.get("initial")?;
        Ok(())
    }).unwrap();

    let err = view.set("title", "b").unwrap_err();
    assert!(matches!(err, StateError::ReadOnly { decorator: "@Param", .. }));

    view.update_param("title", "b").unwrap();
    view.update_param("initial", 2).unwrap();
    rt.flush();
    assert_eq!(view.get("title").unwrap(), Value::from("b"));
    assert_eq!(view.get("initial").unwrap(), Value::from(1));
    assert_eq!(view.render_count(elmt), 2);

    assert!(matches!(view.update_param("missing", 1), Err(StateError::UnknownProperty(_))));
}

#[test]
fn test_provider_and_consumer() {
    let rt = runtime();
    let root = ViewV2::builder(&rt, "Root")
        .provider("theme", "theme", "dark")
        .build()
        .unwrap();
    let child = ViewV2::builder(&rt, "Child").parent(&root).build().unwrap();
    let leaf = ViewV2::builder(&rt, "Leaf")
        .parent(&child)
        .consumer("theme", "theme", "light")
        .consumer("lang", "lang", "en")
        .build()
        .unwrap();
    assert!(leaf.is_consumer_connected("theme"));
    assert!(!leaf.is_consumer_connected("lang"));
    assert_eq!(leaf.get("theme").unwrap(), Value::from("dark"));
    assert_eq!(leaf.get("lang").unwrap(), Value::from("en"));

    let renders = Rc::new(Cell::new(0));
    let renders2 = renders.clone();
    let leaf2 = leaf.clone();
    leaf.observe_component_creation(move |_, _| {
        leaf2.get("theme")?;
        renders2.set(renders2.get() + 1);
        Ok(())
    }).unwrap();

    // writes through to the provider
    leaf.set("theme", "blue").unwrap();
    assert_eq!(root.get("theme").unwrap(), Value::from("blue"));
    rt.flush();
    assert_eq!(renders.get(), 2);

    root.set("theme", "green").unwrap();
    rt.flush();
    assert_eq!(renders.get(), 3);
    assert_eq!(root.children().len(), 1);
}

#[test]
fn test_duplicate_provider() {
    let rt = runtime();
    let err = ViewV2::builder(&rt, "Root")
        .provider("a", "shared", 1)
        .provider("b", "shared", 2)
        .build()
        .unwrap_err();
    assert!(matches!(err, StateError::DuplicateProvide(alias) if alias == "shared"));
}

#[test]
fn test_deferred_errors_reach_the_handler() {
    let rt = runtime();
    let view = counter(&rt);
    let state = view.state().clone();
    view.observe_component_creation(move |_, is_first| {
        let count = state.get("count")?;
        if !is_first && count == Value::from(1) {
            return Err(StateError::app("render failed"));
        }
        Ok(())
    }).unwrap();
    let errors = Rc::new(RefCell::new(Vec::new()));
    let errors2 = errors.clone();
    rt.set_uncaught_error_handler(move |err| errors2.borrow_mut().push(err.to_string()));

    view.set("count", 1).unwrap();
    rt.flush();
    assert_eq!(*errors.borrow(), vec!["render failed".to_string()]);
    assert_eq!(rt.observe().pending_counts(), PendingCounts::default());
    assert!(!rt.observe().is_update_scheduled());
}

#[test]
fn test_dead_references_are_swept() {
    let config = RuntimeConfig { cleanup_threshold: 2, ..RuntimeConfig::default() };
    let rt = Runtime::new(config);
    let view = counter(&rt);
    let state = view.state().clone();
    let elmt = view.observe_component_creation(move |_, _| state.get("count").map(|_| ())).unwrap();
    view.set("count", 1).unwrap();
    rt.flush();
    view.set("count", 2).unwrap();
    rt.flush();
    rt.run_idle_tasks();
    // the live element keeps its dependency through the sweep
    assert!(rt.observe().has_bindings(elmt));
    assert!(rt.observe().dump_bindings().contains(&elmt.to_string()));
}

#[test]
fn test_id_index_for_widely_observed_targets() {
    let rt = Runtime::new(RuntimeConfig { id_refs_threshold: 2, ..RuntimeConfig::default() });
    let view = ViewV2::builder(&rt, "Wide")
        .local("a", 1)
        .local("b", 2)
        .local("c", 3)
        .build()
        .unwrap();
    let state = view.state().clone();
    let wide = view.observe_component_creation(move |_, _| {
        for field in ["a", "b", "c"] {
            state.get(field)?;
        }
        Ok(())
    }).unwrap();
    let state = view.state().clone();
    let narrow = view.observe_component_creation(move |_, _| state.get("a").map(|_| ())).unwrap();
    let target = view.state().target().clone();
    assert!(rt.observe().uses_id_index(&target));
    assert_eq!(rt.observe().observed_keys(&target).len(), 3);

    rt.observe().clear_binding(wide);
    assert!(!rt.observe().target_references(&target, wide));
    assert!(rt.observe().target_references(&target, narrow));
    assert_eq!(rt.observe().observed_keys(&target), vec![PropKey::field("a")]);

    view.set("a", 10).unwrap();
    view.set("b", 20).unwrap();
    rt.flush();
    assert_eq!(view.render_count(wide), 1);
    assert_eq!(view.render_count(narrow), 2);
}
