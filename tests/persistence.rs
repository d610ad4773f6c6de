use state_rx::*;
use test_log::test;
use std::rc::Rc;

fn connected(rt: &Rc<Runtime>) -> (Rc<MemoryBackend>, Rc<PersistenceV2>) {
    let backend = Rc::new(MemoryBackend::new());
    let persistence = PersistenceV2::new(rt, backend.clone());
    (backend, persistence)
}

#[test]
fn test_stringify_tags_collections() {
    let map = ObjectRef::new_map([("a", 1)]);
    assert_eq!(JsonCoder::stringify(&Value::Ref(map)).unwrap(), r#"{"__map__":[["a",1]]}"#);
    let set = ObjectRef::new_set([1, 2]);
    assert_eq!(JsonCoder::stringify(&Value::Ref(set)).unwrap(), r#"{"__set__":[1,2]}"#);
    let date = ObjectRef::new_date(1_700_000_000_000.0);
    assert_eq!(JsonCoder::stringify(&Value::Ref(date)).unwrap(), r#"{"__date__":1700000000000}"#);
    let invalid = ObjectRef::new_date(f64::NAN);
    assert_eq!(JsonCoder::stringify(&Value::Ref(invalid)).unwrap(), r#"{"__date__":null}"#);
}

#[test]
fn test_stringify_skips_like_json() {
    let object = ObjectRef::new_object([
        ("a", Value::Undefined),
        ("b", Value::from(NativeFn::new(|_| Value::Null))),
        ("c", Value::from(1.5)),
        ("d", Value::from(f64::NAN)),
        ("e", Value::from(ObjectRef::new_array([Value::Null, Value::from(true)]))),
    ]);
    assert_eq!(JsonCoder::stringify(&Value::Ref(object)).unwrap(), r#"{"c":1.5,"d":null,"e":[null,true]}"#);
    assert_eq!(JsonCoder::stringify(&Value::from("x")).unwrap(), r#""x""#);
}

#[test]
fn test_cycles_are_rejected_but_sharing_is_not() {
    let shared = ObjectRef::new_object([("n", 1)]);
    let object = ObjectRef::new_object([("left", shared.clone()), ("right", shared)]);
    assert_eq!(JsonCoder::stringify(&Value::Ref(object)).unwrap(), r#"{"left":{"n":1},"right":{"n":1}}"#);

    let cyclic = ObjectRef::new_object([("n", 1)]);
    cyclic.raw_set("me", cyclic.clone());
    assert!(matches!(JsonCoder::stringify(&Value::Ref(cyclic.clone())), Err(StateError::CyclicValue)));
    // break the cycle so the test does not leak
    cyclic.raw_set("me", Value::Null);
}

#[test]
fn test_parse_restores_tagged_values() {
    let value = JsonCoder::parse(r#"{"items":[1,{"__set__":["x"]}],"when":{"__date__":5},"lookup":{"__map__":[["k",true]]}}"#).unwrap();
    let root = value.target().unwrap();
    assert_eq!(root.kind(), ContainerKind::Object);

    let items = root.raw_get("items");
    let items = items.target().unwrap();
    assert_eq!(items.kind(), ContainerKind::Array);
    assert_eq!(items.raw_len(), 2);

    let when = root.raw_get("when");
    assert_eq!(when.target().unwrap().kind(), ContainerKind::Date);
    let lookup = root.raw_get("lookup");
    assert_eq!(lookup.target().unwrap().kind(), ContainerKind::Map);
    assert_eq!(lookup.target().unwrap().raw_len(), 1);

    assert!(matches!(JsonCoder::parse("{"), Err(StateError::Json(_))));
    assert!(matches!(JsonCoder::parse(r#"{"__date__":"soon"}"#), Err(StateError::JsonTypeMismatch { .. })));
}

#[test]
fn test_parse_to_class() {
    let prefs = ClassDescriptor::builder("Prefs").trace("volume").build();
    let value = JsonCoder::parse_to(r#"{"volume":3}"#, &prefs).unwrap();
    let target = value.target().unwrap();
    assert_eq!(target.class().map(|class| class.name().to_string()), Some("Prefs".to_string()));
    assert_eq!(target.raw_get("volume"), Value::from(3));

    let err = JsonCoder::parse_to("[1]", &prefs).unwrap_err();
    assert!(matches!(err, StateError::JsonTypeMismatch { expected: "object", found } if found == "array"));
}

#[test]
fn test_connect_saves_default_and_changes() {
    let rt = Runtime::new(RuntimeConfig::default());
    let (backend, persistence) = connected(&rt);
    let settings = persistence.connect("settings", ObjectRef::new_object([("volume", 3)])).unwrap();
    assert_eq!(backend.get("settings").as_deref(), Some(r#"{"volume":3}"#));
    assert!(persistence.is_connected("settings"));

    settings.set("volume", 5).unwrap();
    // written in the update pass
    assert_eq!(backend.get("settings").as_deref(), Some(r#"{"volume":3}"#));
    rt.flush();
    assert_eq!(backend.get("settings").as_deref(), Some(r#"{"volume":5}"#));

    let again = persistence.connect("settings", ObjectRef::new_object([("volume", 0)])).unwrap();
    assert!(again.target().ptr_eq(settings.target()));
    assert_eq!(persistence.keys(), vec!["settings".to_string()]);
}

#[test]
fn test_collections_are_persisted() {
    let rt = Runtime::new(RuntimeConfig::default());
    let (backend, persistence) = connected(&rt);
    let tags = persistence.connect("tags", ObjectRef::new_map([("a", 1)])).unwrap();
    tags.map().unwrap().set("b", 2).unwrap();
    rt.flush();
    assert_eq!(backend.get("tags").as_deref(), Some(r#"{"__map__":[["a",1],["b",2]]}"#));

    let list = persistence.connect("list", ObjectRef::new_array([1])).unwrap();
    list.array().unwrap().push(2).unwrap();
    rt.flush();
    assert_eq!(backend.get("list").as_deref(), Some("[1,2]"));
}

#[test]
fn test_connect_loads_stored_value() {
    let rt = Runtime::new(RuntimeConfig::default());
    let (backend, persistence) = connected(&rt);
    backend.set("count", r#"{"n":7}"#);
    let count = persistence.connect("count", ObjectRef::new_object([("n", 0)])).unwrap();
    assert_eq!(count.get("n").unwrap(), Value::from(7));

    let prefs = ClassDescriptor::builder("Prefs").trace("volume").build();
    backend.set("prefs", r#"{"volume":9}"#);
    let loaded = persistence.connect("prefs", ObjectRef::new_instance(&prefs, [("volume", 1)])).unwrap();
    assert_eq!(loaded.target().class().map(|class| class.name().to_string()), Some("Prefs".to_string()));
    assert_eq!(loaded.get("volume").unwrap(), Value::from(9));

    loaded.set("volume", 4).unwrap();
    rt.flush();
    assert_eq!(backend.get("prefs").as_deref(), Some(r#"{"volume":4}"#));
}

#[test]
fn test_connect_errors() {
    let rt = Runtime::new(RuntimeConfig::default());
    let (backend, persistence) = connected(&rt);
    backend.set("user", "[1,2]");
    let err = persistence.connect("user", ObjectRef::new_object([("name", "ann")])).unwrap_err();
    assert!(matches!(err, StateError::JsonTypeMismatch { expected: "object", .. }));
    assert!(!persistence.is_connected("user"));

    let err = persistence.connect("count", 1).unwrap_err();
    assert!(matches!(err, StateError::UnsupportedValue { .. }));
    assert!(!backend.has("count"));
}

#[test]
fn test_remove_disconnects() {
    let rt = Runtime::new(RuntimeConfig::default());
    let (backend, persistence) = connected(&rt);
    let settings = persistence.connect("settings", ObjectRef::new_object([("volume", 3)])).unwrap();
    persistence.remove("settings");
    assert!(!backend.has("settings"));
    assert!(!persistence.is_connected("settings"));

    settings.set("volume", 8).unwrap();
    rt.flush();
    assert!(backend.is_empty());
}

#[test]
fn test_failed_connect_leaves_key_unconnected() {
    let rt = Runtime::new(RuntimeConfig::default());
    let (backend, persistence) = connected(&rt);
    let cyclic = ObjectRef::new_object([("n", 1)]);
    cyclic.raw_set("me", cyclic.clone());
    let err = persistence.connect("loop", cyclic.clone()).unwrap_err();
    assert!(matches!(err, StateError::CyclicValue));
    assert!(!persistence.is_connected("loop"));
    assert!(persistence.keys().is_empty());
    assert!(!backend.has("loop"));
    cyclic.raw_set("me", Value::Null);

    let fixed = persistence.connect("loop", ObjectRef::new_object([("n", 2)])).unwrap();
    assert_eq!(fixed.get("n").unwrap(), Value::from(2));
    assert_eq!(backend.get("loop").as_deref(), Some(r#"{"n":2}"#));
}
