use state_rx::*;
use test_log::test;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn num(value: Value) -> f64 {
    value.as_f64().unwrap_or(f64::NAN)
}

fn sum_view(rt: &Rc<Runtime>) -> Rc<ViewV2> {
    ViewV2::builder(rt, "Sum")
        .local("a", 1)
        .local("b", 2)
        .build()
        .unwrap()
}

#[test]
fn test_computed_caches_and_recomputes() {
    let rt = Runtime::new(RuntimeConfig::default());
    let view = sum_view(&rt);
    let runs = Rc::new(Cell::new(0));
    let runs2 = runs.clone();
    let sum = view.computed("sum", move |this| {
        runs2.set(runs2.get() + 1);
        Ok(Value::from(num(this.get("a")?) + num(this.get("b")?)))
    }).unwrap();
    assert_eq!(sum.peek(), Value::from(3));
    assert_eq!(view.get("sum").unwrap(), Value::from(3));
    assert_eq!(runs.get(), 1);

    view.set("a", 10).unwrap();
    // recomputed in the update pass, not on write
    assert_eq!(sum.peek(), Value::from(3));
    rt.flush();
    assert_eq!(sum.peek(), Value::from(12));
    assert_eq!(runs.get(), 2);

    // reading the cached value never recomputes
    sum.get().unwrap();
    view.state().get("sum").unwrap();
    assert_eq!(runs.get(), 2);

    assert!(matches!(view.set("sum", 1), Err(StateError::ReadOnly { decorator: "@Computed", .. })));
}

#[test]
fn test_unchanged_computed_does_not_notify_readers() {
    let rt = Runtime::new(RuntimeConfig::default());
    let view = sum_view(&rt);
    view.computed("positive", |this| Ok(Value::from(num(this.get("a")?) > 0.0))).unwrap();
    let state = view.state().clone();
    let elmt = view.observe_component_creation(move |_, _| state.get("positive").map(|_| ())).unwrap();

    view.set("a", 5).unwrap();
    rt.flush();
    assert_eq!(view.render_count(elmt), 1);

    view.set("a", -1).unwrap();
    rt.flush();
    assert_eq!(view.render_count(elmt), 2);
    assert_eq!(view.get("positive").unwrap(), Value::from(false));
}

#[test]
fn test_chained_computed_settle_before_elements() {
    let rt = Runtime::new(RuntimeConfig::default());
    let view = sum_view(&rt);
    view.computed("sum", |this| Ok(Value::from(num(this.get("a")?) + num(this.get("b")?)))).unwrap();
    view.computed("double", |this| Ok(Value::from(num(this.get("sum")?) * 2.0))).unwrap();
    let state = view.state().clone();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen2 = seen.clone();
    view.observe_component_creation(move |_, _| {
        seen2.borrow_mut().push((num(state.get("sum")?), num(state.get("double")?)));
        Ok(())
    }).unwrap();

    view.set("a", 4).unwrap();
    view.set("b", 6).unwrap();
    rt.flush();
    // the element never sees a half-updated pair
    assert_eq!(*seen.borrow(), vec![(3.0, 6.0), (10.0, 20.0)]);
}

#[test]
fn test_mutation_inside_computed_is_an_error() {
    let rt = Runtime::new(RuntimeConfig::default());
    let view = sum_view(&rt);
    let err = view.computed("bad", |this| {
        let a = this.get("a")?;
        this.set("b", a)?;
        Ok(Value::Undefined)
    }).unwrap_err();
    assert!(matches!(err, StateError::MutationInComputed { property } if property == "b"));
    assert!(view.get("bad").is_ok());
}

#[test]
fn test_monitor_reports_before_and_now() {
    let rt = Runtime::new(RuntimeConfig::default());
    let view = sum_view(&rt);
    let changes = Rc::new(RefCell::new(Vec::new()));
    let changes2 = changes.clone();
    view.monitor(&["a", "b"], "on_change", move |_, monitor| {
        for path in monitor.dirty() {
            let change = monitor.value(Some(path)).unwrap();
            changes2.borrow_mut().push((change.path.clone(), change.before.clone(), change.now.clone()));
        }
        Ok(())
    }).unwrap();

    view.set("a", 5).unwrap();
    rt.flush();
    assert_eq!(*changes.borrow(), vec![("a".to_string(), Value::from(1), Value::from(5))]);

    // changed and changed back within one pass: nothing to report
    view.set("b", 7).unwrap();
    view.set("b", 2).unwrap();
    rt.flush();
    assert_eq!(changes.borrow().len(), 1);

    view.set("a", 6).unwrap();
    view.set("b", 8).unwrap();
    rt.flush();
    let changes = changes.borrow();
    assert_eq!(changes.len(), 3);
    assert_eq!(changes[1], ("a".to_string(), Value::from(5), Value::from(6)));
    assert_eq!(changes[2], ("b".to_string(), Value::from(2), Value::from(8)));
}

#[test]
fn test_monitor_sees_settled_computed() {
    let rt = Runtime::new(RuntimeConfig::default());
    let view = sum_view(&rt);
    view.computed("sum", |this| Ok(Value::from(num(this.get("a")?) + num(this.get("b")?)))).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen2 = seen.clone();
    view.monitor(&["sum"], "on_sum", move |this, monitor| {
        let change = monitor.value(None).unwrap();
        // the computed value read here is the one the monitor was told about
        seen2.borrow_mut().push((num(change.before.clone()), num(change.now.clone()), num(this.get("sum")?)));
        Ok(())
    }).unwrap();

    view.set("a", 10).unwrap();
    rt.flush();
    assert_eq!(*seen.borrow(), vec![(3.0, 12.0, 12.0)]);
}

#[test]
fn test_monitor_nested_path() {
    let rt = Runtime::new(RuntimeConfig::default());
    let address = ClassDescriptor::builder("Address").trace("city").build();
    let home = rt.new_observed_v2(&address, [("city", "Oslo")]);
    let view = ViewV2::builder(&rt, "Profile")
        .local("address", home.target().clone())
        .build()
        .unwrap();
    let cities = Rc::new(RefCell::new(Vec::new()));
    let cities2 = cities.clone();
    view.monitor(&["address.city"], "on_city", move |_, monitor| {
        cities2.borrow_mut().push(monitor.value(Some("address.city")).unwrap().now.clone());
        Ok(())
    }).unwrap();

    home.set("city", "Bergen").unwrap();
    rt.flush();
    // replacing the parent object re-resolves the path
    view.set("address", rt.new_observed_v2(&address, [("city", "Tromsø")])).unwrap();
    rt.flush();
    assert_eq!(*cities.borrow(), vec![Value::from("Bergen"), Value::from("Tromsø")]);
}

#[test]
fn test_monitor_function_changing_state_settles() {
    let rt = Runtime::new(RuntimeConfig::default());
    let view = sum_view(&rt);
    view.monitor(&["a"], "mirror", |this, monitor| {
        let now = monitor.value(None).unwrap().now.clone();
        this.set("b", now)
    }).unwrap();
    let state = view.state().clone();
    let elmt = view.observe_component_creation(move |_, _| state.get("b").map(|_| ())).unwrap();

    view.set("a", 9).unwrap();
    rt.flush();
    assert_eq!(view.get("b").unwrap(), Value::from(9));
    assert_eq!(view.render_count(elmt), 2);
    assert!(!rt.has_pending_tasks());
}

#[test]
fn test_deleted_computed_and_monitor_stop() {
    let rt = Runtime::new(RuntimeConfig::default());
    let view = sum_view(&rt);
    let runs = Rc::new(Cell::new(0));
    let runs2 = runs.clone();
    let monitor = view.monitor(&["a"], "count", move |_, _| {
        runs2.set(runs2.get() + 1);
        Ok(())
    }).unwrap();
    let computed = view.computed("sum", |this| Ok(Value::from(num(this.get("a")?) + 1.0))).unwrap();

    view.about_to_be_deleted();
    assert!(!rt.observe().has_bindings(computed.id()));
    view.set("a", 3).unwrap();
    rt.flush();
    assert_eq!(runs.get(), 0);
    assert_eq!(computed.peek(), Value::from(2));
    assert_eq!(monitor.paths(), vec!["a".to_string()]);
}

#[test]
fn test_inactive_view_delays_updates() {
    let rt = Runtime::new(RuntimeConfig::default());
    let parent = sum_view(&rt);
    let child = ViewV2::builder(&rt, "Child").parent(&parent).local("x", 0).build().unwrap();
    let monitor_runs = Rc::new(Cell::new(0));
    let monitor_runs2 = monitor_runs.clone();
    child.monitor(&["x"], "on_x", move |_, _| {
        monitor_runs2.set(monitor_runs2.get() + 1);
        Ok(())
    }).unwrap();
    let doubled = child.computed("doubled", |this| Ok(Value::from(num(this.get("x")?) * 2.0))).unwrap();
    let state = child.state().clone();
    let elmt = child.observe_component_creation(move |_, _| state.get("x").map(|_| ())).unwrap();

    parent.set_active(false).unwrap();
    assert!(!child.is_active());
    child.set("x", 1).unwrap();
    rt.flush();
    assert_eq!(child.render_count(elmt), 1);
    assert_eq!(child.delayed_elmt_ids(), vec![elmt]);
    assert_eq!(doubled.peek(), Value::from(0));
    assert_eq!(monitor_runs.get(), 0);

    parent.set_active(true).unwrap();
    assert_eq!(doubled.peek(), Value::from(2));
    assert_eq!(monitor_runs.get(), 1);
    assert_eq!(child.render_count(elmt), 2);
    assert!(child.delayed_elmt_ids().is_empty());
}

#[test]
fn test_free_standing_computed_and_monitor() {
    let rt = Runtime::new(RuntimeConfig::default());
    let counter = rt.make_observed(ObjectRef::new_object([("n", 1)])).observed().unwrap().clone();
    let computed = ComputedV2::new(&rt, &counter, "square", |this| {
        let n = num(this.get("n")?);
        Ok(Value::from(n * n))
    }, None).unwrap();
    let last = Rc::new(RefCell::new(Value::Undefined));
    let last2 = last.clone();
    let _monitor = MonitorV2::new(&rt, &counter, &["square"], "on_square", move |_, monitor| {
        *last2.borrow_mut() = monitor.value(None).unwrap().now.clone();
        Ok(())
    }, None).unwrap();

    counter.set("n", 3).unwrap();
    rt.update_synchronously().unwrap();
    assert_eq!(computed.get().unwrap(), Value::from(9));
    assert_eq!(*last.borrow(), Value::from(9));
    assert_eq!(counter.get("square").unwrap(), Value::from(9));
}

#[test]
fn test_monitor_deep_path_ignores_same_value_writes() {
    let rt = Runtime::new(RuntimeConfig::default());
    let c = ObjectRef::new_object([("c", 1)]);
    let b = ObjectRef::new_object([("b", c)]);
    let root = rt.make_observed(ObjectRef::new_object([("a", b)])).observed().unwrap().clone();
    let runs = Rc::new(RefCell::new(Vec::new()));
    let runs2 = runs.clone();
    let _monitor = MonitorV2::new(&rt, &root, &["a.b.c"], "on_c", move |_, monitor| {
        let dirty: Vec<String> = monitor.dirty().into_iter().map(String::from).collect();
        runs2.borrow_mut().push(dirty);
        Ok(())
    }, None).unwrap();

    let leaf = root.get("a").unwrap().observed().unwrap().get("b").unwrap().observed().unwrap().clone();
    leaf.set("c", 2).unwrap();
    rt.flush();
    assert_eq!(*runs.borrow(), vec![vec!["a.b.c".to_string()]]);

    leaf.set("c", 2).unwrap();
    rt.flush();
    assert_eq!(runs.borrow().len(), 1);
}

#[test]
fn test_deleted_monitor_is_released() {
    let rt = Runtime::new(RuntimeConfig::default());
    let view = sum_view(&rt);
    let monitor = view.monitor(&["a"], "on_a", |_, _| Ok(())).unwrap();
    let weak = Rc::downgrade(&monitor);
    assert!(format!("{:?}", monitor).contains("on_a"));
    assert!(format!("{:?}", view.state().target().downgrade()).starts_with("Weak("));
    drop(monitor);
    assert!(weak.upgrade().is_some());

    view.about_to_be_deleted();
    assert!(weak.upgrade().is_none());
}
