use state_rx::*;
use test_log::test;
use std::rc::Rc;

fn runtime() -> Rc<Runtime> {
    Runtime::new(RuntimeConfig::default())
}

/// A bare component to render elements in.
fn host(rt: &Rc<Runtime>) -> Rc<ViewV2> {
    ViewV2::builder(rt, "Host").build().unwrap()
}

fn observed(rt: &Rc<Runtime>, target: ObjectRef) -> Observed {
    rt.make_observed(target).observed().unwrap().clone()
}

#[test]
fn test_array_index_and_length_dependencies() {
    let rt = runtime();
    let view = ViewV2::builder(&rt, "List")
        .local("items", ObjectRef::new_array([1, 2, 3]))
        .build()
        .unwrap();
    let state = view.state().clone();
    let elmt = view.observe_component_creation(move |_, _| {
        let items = state.get("items")?.observed()?.array()?;
        items.get(1)?;
        Ok(())
    }).unwrap();
    let items = view.get("items").unwrap().observed().unwrap().array().unwrap();
    assert_eq!(items.observed().wrap_mode(), Some(WrapMode::Decorator));

    items.set(0, 10).unwrap();
    rt.flush();
    assert_eq!(view.render_count(elmt), 1);

    items.set(1, 20).unwrap();
    rt.flush();
    assert_eq!(view.render_count(elmt), 2);

    // structural changes move elements, so index readers depend on the length too
    items.push(4).unwrap();
    rt.flush();
    assert_eq!(view.render_count(elmt), 3);

    items.reverse().unwrap();
    rt.flush();
    assert_eq!(view.render_count(elmt), 4);
    assert_eq!(items.to_vec().unwrap(), vec![Value::from(4), Value::from(3), Value::from(20), Value::from(10)]);
}

#[test]
fn test_array_mutators() {
    let rt = runtime();
    let items = observed(&rt, ObjectRef::new_array([3, 1, 2])).array().unwrap();
    assert_eq!(items.len().unwrap(), 3);
    assert_eq!(items.unshift([0]).unwrap(), 4);
    assert_eq!(items.shift().unwrap(), Value::from(0));
    assert_eq!(items.pop().unwrap(), Value::from(2));
    assert_eq!(items.splice(0, 1, [7, 8]).unwrap(), vec![Value::from(3)]);
    assert_eq!(items.to_vec().unwrap(), vec![Value::from(7), Value::from(8), Value::from(1)]);

    items.sort_by(|a, b| a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(std::cmp::Ordering::Equal)).unwrap();
    assert_eq!(items.to_vec().unwrap(), vec![Value::from(1), Value::from(7), Value::from(8)]);
    assert_eq!(items.index_of(&Value::from(8)).unwrap(), Some(2));

    items.fill(0, 1, 3).unwrap();
    assert_eq!(items.to_vec().unwrap(), vec![Value::from(1), Value::from(0), Value::from(0)]);
    items.extend_to(5).unwrap();
    assert_eq!(items.get(4).unwrap(), Value::Undefined);
    items.shrink_to(1).unwrap();
    assert_eq!(items.len().unwrap(), 1);
    items.set(3, 9).unwrap();
    assert_eq!(items.to_vec().unwrap(), vec![Value::from(1), Value::Undefined, Value::Undefined, Value::from(9)]);

    let mut sum = 0.0;
    items.for_each(|value, _| {
        sum += value.as_f64().unwrap_or(0.0);
        Ok(())
    }).unwrap();
    assert_eq!(sum, 10.0);
}

#[test]
fn test_map_entry_dependencies() {
    let rt = runtime();
    let view = host(&rt);
    let map = observed(&rt, ObjectRef::new_map([("a", 1)])).map().unwrap();
    let reader = map.clone();
    let entry_elmt = view.observe_component_creation(move |_, _| reader.get("a").map(|_| ())).unwrap();
    let iterator = map.clone();
    let iter_elmt = view.observe_component_creation(move |_, _| iterator.keys().map(|_| ())).unwrap();

    // a new key only changes the set of keys
    map.set("b", 2).unwrap();
    rt.flush();
    assert_eq!(view.render_count(entry_elmt), 1);
    assert_eq!(view.render_count(iter_elmt), 2);

    map.set("a", 5).unwrap();
    rt.flush();
    assert_eq!(view.render_count(entry_elmt), 2);
    assert_eq!(view.render_count(iter_elmt), 3);

    map.set("a", 5).unwrap();
    assert!(!rt.has_pending_tasks());

    assert!(map.delete("a").unwrap());
    assert!(!map.delete("a").unwrap());
    rt.flush();
    assert_eq!(view.render_count(entry_elmt), 3);
    assert_eq!(map.size().unwrap(), 1);
    assert_eq!(map.entries().unwrap(), vec![(Value::from("b"), Value::from(2))]);

    map.clear().unwrap();
    rt.flush();
    assert_eq!(view.render_count(iter_elmt), 5);
    assert_eq!(map.size().unwrap(), 0);
}

#[test]
fn test_set_membership_dependencies() {
    let rt = runtime();
    let view = host(&rt);
    let set = observed(&rt, ObjectRef::new_set(["x"])).set_view().unwrap();
    let reader = set.clone();
    let absent_elmt = view.observe_component_creation(move |_, _| reader.has("y").map(|_| ())).unwrap();
    let reader = set.clone();
    let present_elmt = view.observe_component_creation(move |_, _| reader.has("x").map(|_| ())).unwrap();

    set.add("y").unwrap();
    rt.flush();
    assert_eq!(view.render_count(absent_elmt), 2);
    assert_eq!(view.render_count(present_elmt), 1);

    set.add("y").unwrap();
    assert!(!rt.has_pending_tasks());

    assert!(set.delete("x").unwrap());
    rt.flush();
    assert_eq!(view.render_count(present_elmt), 2);
    assert_eq!(set.values().unwrap(), vec![Value::from("y")]);
}

#[test]
fn test_date_fields_normalize() {
    let rt = runtime();
    let date = observed(&rt, ObjectRef::new_date(0.0)).date().unwrap();
    assert_eq!(date.get_full_year().unwrap(), 1970.0);
    assert_eq!(date.get_month().unwrap(), 0.0);
    assert_eq!(date.get_date().unwrap(), 1.0);

    // month 13 is February of the next year
    date.set_month(13.0).unwrap();
    assert_eq!(date.get_full_year().unwrap(), 1971.0);
    assert_eq!(date.get_month().unwrap(), 1.0);

    // day 0 is the last day of the previous month
    date.set_date(0.0).unwrap();
    assert_eq!(date.get_month().unwrap(), 0.0);
    assert_eq!(date.get_date().unwrap(), 31.0);

    date.set_hours(25.0).unwrap();
    assert_eq!(date.get_date().unwrap(), 1.0);
    assert_eq!(date.get_hours().unwrap(), 1.0);
    assert_eq!(date.get_month().unwrap(), 1.0);

    assert_eq!(date.set_time(1500.0).unwrap(), 1500.0);
    assert_eq!(date.get_seconds().unwrap(), 1.0);
    assert_eq!(date.get_milliseconds().unwrap(), 500.0);

    assert!(date.set_time(f64::NAN).unwrap().is_nan());
    assert!(date.get_full_year().unwrap().is_nan());
}

#[test]
fn test_date_fires_only_when_the_instant_changes() {
    let rt = runtime();
    let view = host(&rt);
    let date = observed(&rt, ObjectRef::new_date(0.0)).date().unwrap();
    let reader = date.clone();
    let elmt = view.observe_component_creation(move |_, _| reader.get_time().map(|_| ())).unwrap();

    date.set_minutes(0.0).unwrap();
    assert!(!rt.has_pending_tasks());

    date.set_minutes(30.0).unwrap();
    rt.flush();
    assert_eq!(view.render_count(elmt), 2);
}

#[test]
fn test_make_observed_and_get_target() {
    let rt = runtime();
    let raw = ObjectRef::new_object([("inner", ObjectRef::new_object([("x", 1)]))]);
    let value = rt.make_observed(raw.clone());
    assert!(rt.is_made_observed(&raw));
    let outer = value.observed().unwrap();
    assert_eq!(outer.wrap_mode(), Some(WrapMode::Explicit));
    assert!(rt.get_target(&value).same_value(&Value::Ref(raw.clone())));

    // explicit observation reaches nested plain objects
    let inner = outer.get("inner").unwrap();
    assert_eq!(inner.observed().unwrap().wrap_mode(), Some(WrapMode::Explicit));

    let view = host(&rt);
    let reader = inner.observed().unwrap().clone();
    let elmt = view.observe_component_creation(move |_, _| reader.get("x").map(|_| ())).unwrap();
    inner.observed().unwrap().set("x", 2).unwrap();
    rt.flush();
    assert_eq!(view.render_count(elmt), 2);

    assert_eq!(rt.make_observed(5), Value::from(5));
}

#[test]
fn test_plain_objects_under_decorated_state_are_not_observed() {
    let rt = runtime();
    let view = ViewV2::builder(&rt, "Holder")
        .local("plain", ObjectRef::new_object([("x", 1)]))
        .build()
        .unwrap();
    let plain = view.get("plain").unwrap();
    assert!(matches!(plain, Value::Ref(_)));

    let state = view.state().clone();
    let elmt = view.observe_component_creation(move |_, _| {
        state.get("plain")?;
        Ok(())
    }).unwrap();
    plain.target().unwrap().raw_set("x", 2);
    assert!(!rt.has_pending_tasks());

    // reassignment is observed
    view.set("plain", ObjectRef::new_object([("x", 3)])).unwrap();
    rt.flush();
    assert_eq!(view.render_count(elmt), 2);
}

#[test]
fn test_traced_fields_of_observed_v2_classes() {
    let rt = runtime();
    let person = ClassDescriptor::builder("Person").trace("name").build();
    let p = rt.new_observed_v2(&person, [("name", Value::from("Ann")), ("age", Value::from(30))]);
    let view = host(&rt);
    let reader = p.clone();
    let elmt = view.observe_component_creation(move |_, _| {
        reader.get("name")?;
        reader.get("age")?;
        Ok(())
    }).unwrap();

    // `age` is not traced
    p.set("age", 31).unwrap();
    assert!(!rt.has_pending_tasks());
    assert_eq!(p.get("age").unwrap(), Value::from(31));

    p.set("name", "Bob").unwrap();
    rt.flush();
    assert_eq!(view.render_count(elmt), 2);

    assert!(p.has("name").unwrap());
    assert!(!p.has("email").unwrap());
    assert!(matches!(p.array(), Err(StateError::WrongContainer { .. })));
}

#[test]
fn test_object_keys_and_delete() {
    let rt = runtime();
    let view = host(&rt);
    let obj = observed(&rt, ObjectRef::new_object([("a", 1)]));
    let reader = obj.clone();
    let elmt = view.observe_component_creation(move |_, _| reader.keys().map(|_| ())).unwrap();

    obj.set("a", 2).unwrap();
    rt.flush();
    assert_eq!(view.render_count(elmt), 1);

    obj.set("b", 1).unwrap();
    rt.flush();
    assert_eq!(view.render_count(elmt), 2);

    assert!(obj.delete("a").unwrap());
    rt.flush();
    assert_eq!(view.render_count(elmt), 3);
    assert_eq!(obj.keys().unwrap(), vec![Rc::<str>::from("b")]);
}

#[test]
fn test_same_value_semantics() {
    let raw = ObjectRef::new_array([1]);
    let rt = runtime();
    let observed = rt.make_observed(raw.clone());
    assert!(observed.same_value(&Value::Ref(raw)));
    assert!(!Value::from(f64::NAN).same_value(&Value::from(f64::NAN)));
    assert!(Value::from("a").same_value(&Value::from("a")));
    assert!(!Value::Null.same_value(&Value::Undefined));
    assert!(!Value::Ref(ObjectRef::new_array([1])).same_value(&Value::Ref(ObjectRef::new_array([1]))));
}

#[test]
fn test_deep_copy_keeps_shared_identity() {
    let shared = ObjectRef::new_object([("x", 1)]);
    let original = Value::Ref(ObjectRef::new_array([Value::Ref(shared.clone()), Value::Ref(shared.clone())]));
    let copy = original.deep_copy();
    let items = match &*copy.target().unwrap().borrow() {
        Container::Array(items) => items.clone(),
        _ => unreachable!(),
    };
    assert!(items[0].same_value(&items[1]));
    assert!(!items[0].same_value(&Value::Ref(shared.clone())));

    let shallow = original.shallow_copy();
    let items = match &*shallow.target().unwrap().borrow() {
        Container::Array(items) => items.clone(),
        _ => unreachable!(),
    };
    assert!(items[0].same_value(&Value::Ref(shared)));
    assert!(!shallow.same_value(&original));
}

#[test]
fn test_sort_comparator_can_read_the_array() {
    let rt = runtime();
    let items = observed(&rt, ObjectRef::new_array([3, 1, 2])).array().unwrap();
    let reader = items.clone();
    items.sort_by(|a, b| {
        assert_eq!(reader.len().unwrap(), 3);
        a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(std::cmp::Ordering::Equal)
    }).unwrap();
    assert_eq!(items.to_vec().unwrap(), vec![Value::from(1), Value::from(2), Value::from(3)]);
}

#[test]
fn test_deep_copy_copies_container_keys() {
    let shared = ObjectRef::new_object([("x", 1)]);
    let map = ObjectRef::new_map([(shared.clone(), 1)]);
    let set = ObjectRef::new_set([shared.clone()]);
    let original = Value::Ref(ObjectRef::new_array([Value::Ref(map), Value::Ref(set)]));
    let copy = original.deep_copy();

    let items = match &*copy.target().unwrap().borrow() {
        Container::Array(items) => items.clone(),
        _ => unreachable!(),
    };
    let map_key = match &*items[0].target().unwrap().borrow() {
        Container::Map(entries) => entries.keys().next().unwrap().to_value(),
        _ => unreachable!(),
    };
    let set_value = match &*items[1].target().unwrap().borrow() {
        Container::Set(values) => values.iter().next().unwrap().to_value(),
        _ => unreachable!(),
    };
    assert!(!map_key.same_value(&Value::Ref(shared)));
    assert!(map_key.same_value(&set_value));
}
