use state_rx::*;
use test_log::test;
use std::rc::Rc;

#[test]
fn test_config_from_partial_json() {
    let config = RuntimeConfig::from_json(r#"{"prop_deep_copy": false}"#).unwrap();
    assert_eq!(config, RuntimeConfig { prop_deep_copy: false, ..RuntimeConfig::default() });
    assert_eq!(RuntimeConfig::from_json("{}").unwrap(), RuntimeConfig::default());
    assert!(matches!(RuntimeConfig::from_json(r#"{"cleanup_threshold": "soon"}"#), Err(StateError::Json(_))));
}

#[test]
fn test_parse_dump_command() {
    assert_eq!(
        DumpCommand::parse(&["-viewHierarchy", "-r"]),
        Some(DumpCommand { kind: DumpKind::ViewHierarchy, recursive: true, view_id: None }),
    );
    assert_eq!(
        DumpCommand::parse(&["-profiler", "-viewId=12"]),
        Some(DumpCommand { kind: DumpKind::Profiler, recursive: false, view_id: Some(BindId(12)) }),
    );
    assert_eq!(DumpCommand::parse(&["-dumpAll"]).map(|c| c.kind), Some(DumpKind::All));
    assert_eq!(DumpCommand::parse(&["-viewId=abc", "-profiler"]), None);
    assert_eq!(DumpCommand::parse(&["-bogus"]), None);
    assert_eq!(DumpCommand::parse::<&str>(&[]), None);
}

fn tree(rt: &Rc<Runtime>) -> (Rc<ViewV2>, Rc<ViewV2>, Rc<ViewV2>) {
    let root = ViewV2::builder(rt, "Root").local("count", 0).build().unwrap();
    let child = ViewV2::builder(rt, "Child").parent(&root).build().unwrap();
    let leaf = ViewV2::builder(rt, "Leaf").parent(&child).build().unwrap();
    (root, child, leaf)
}

#[test]
fn test_dump_view_hierarchy() {
    let rt = Runtime::new(RuntimeConfig::default());
    let (root, child, leaf) = tree(&rt);

    let shallow = on_dump_info(root.clone(), &["-viewHierarchy"]);
    assert_eq!(shallow, format!(
        "--- view hierarchy ---\n|-- ViewV2 Root[{}]\n  |-- ViewV2 Child[{}]\n",
        root.id(), child.id(),
    ));

    let deep = on_dump_info(root.clone(), &["-viewHierarchy", "-r"]);
    assert_eq!(deep, format!(
        "--- view hierarchy ---\n|-- ViewV2 Root[{}]\n  |-- ViewV2 Child[{}]\n    |-- ViewV2 Leaf[{}]\n",
        root.id(), child.id(), leaf.id(),
    ));
}

#[test]
fn test_dump_profiler_and_element_ids() {
    let rt = Runtime::new(RuntimeConfig::default());
    let (root, child, _leaf) = tree(&rt);
    let state = root.state().clone();
    let elmt = root.observe_component_creation(move |_, _| state.get("count").map(|_| ())).unwrap();
    root.set("count", 1).unwrap();
    rt.flush();

    let profile = on_dump_info(root.clone(), &["-profiler"]);
    assert_eq!(profile, format!("--- profiler ---\nViewV2 Root[{}]\n  elmt {}: rendered 2 times\n", root.id(), elmt));

    let ids = on_dump_info(root.clone(), &["-registeredElementIds"]);
    assert!(ids.ends_with(&format!("  [{}]\n", elmt)));

    let dirty = on_dump_info(root.clone(), &["-dirtyElementIds"]);
    assert!(dirty.ends_with("  []\n"));

    let by_id = on_dump_info(root.clone(), &["-profiler", &format!("-viewId={}", child.id())]);
    assert_eq!(by_id, format!("--- profiler ---\nViewV2 Child[{}]\n", child.id()));

    let state = on_dump_info(root.clone(), &["-stateVariables"]);
    assert!(state.contains("count"));
}

#[test]
fn test_dump_errors() {
    let rt = Runtime::new(RuntimeConfig::default());
    let (root, _, _) = tree(&rt);
    assert_eq!(on_dump_info(root.clone(), &["-foo"]), "unknown dump command: -foo\n");
    assert_eq!(on_dump_info(root.clone(), &["-profiler", "-viewId=99999"]), "no view with id 99999\n");
}

#[test]
fn test_dump_legacy_views() {
    let rt = Runtime::new(RuntimeConfig::default());
    let parent = ViewPU::new(&rt, "Parent", None);
    let child = ViewPU::new(&rt, "Child", Some(&parent));
    parent.state("count", 0).unwrap();
    child.set_active(false);

    let hierarchy = on_dump_info(parent.clone(), &["-viewHierarchy", "-r"]);
    assert_eq!(hierarchy, format!(
        "--- view hierarchy ---\n|-- ViewPU Parent[{}]\n  |-- ViewPU Child[{}] (inactive)\n",
        parent.elmt_id(), child.elmt_id(),
    ));

    let inactive = on_dump_info(parent.clone(), &["-inactiveComponents", "-r"]);
    assert_eq!(inactive, format!("--- inactive components ---\nViewPU Child[{}]\n", child.elmt_id()));

    let state = on_dump_info(parent.clone(), &["-stateVariables"]);
    assert!(state.contains("@State count"));

    let all = on_dump_info(parent.clone(), &["-dumpAll"]);
    for section in ["view hierarchy", "state variables", "registered element ids", "dirty element ids", "inactive components", "profiler"] {
        assert!(all.contains(&format!("--- {} ---", section)));
    }
}
