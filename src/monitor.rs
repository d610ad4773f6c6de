use std::cell::RefCell;
use std::rc::{Rc, Weak};
use derivative::Derivative;
use log::{debug, error, warn};
use crate::bind_id::BindId;
use crate::error::Result;
use crate::observe::ReactiveOwner;
use crate::proxy::{Observed, WrapMode};
use crate::runtime::Runtime;
use crate::value::{ContainerKind, ObjectRef, Value, WeakObjectRef};
use crate::view_v2::ViewV2;

type MonitorFn = Box<dyn Fn(&Observed, &IMonitor) -> Result<()>>;

/// One monitored path: its own bind id and the value it had when the monitor function
/// last ran (`before`) and now. `None` means the path does not resolve.
#[derive(Debug, Clone)]
pub struct MonitorValueV2 {
    path: String,
    segments: Vec<Rc<str>>,
    id: BindId,
    before: Option<Value>,
    now: Option<Value>,
    dirty: bool,
}

impl MonitorValueV2 {
    fn new(path: &str, id: BindId) -> Self {
        MonitorValueV2 {
            path: path.to_string(),
            segments: path.split('.').map(Rc::from).collect(),
            id,
            before: None,
            now: None,
            dirty: false,
        }
    }

    /// Returns whether the value differs from the one seen by the last run.
    fn set_value(&mut self, is_init: bool, value: Option<Value>) -> bool {
        self.now = value;
        if is_init {
            self.before = self.now.clone();
        }
        self.dirty = !same(&self.before, &self.now);
        self.dirty
    }

    fn reset(&mut self) {
        self.before = self.now.clone();
        self.dirty = false;
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn id(&self) -> BindId {
        self.id
    }
}

fn same(a: &Option<Value>, b: &Option<Value>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.same_value(b),
        (None, None) => true,
        _ => false,
    }
}

/// A changed path as seen by the monitor function.
#[derive(Debug, Clone)]
pub struct IMonitorValue {
    pub path: String,
    pub before: Value,
    pub now: Value,
}

/// What a monitor function receives: which paths changed, and how.
#[derive(Debug, Clone)]
pub struct IMonitor {
    values: Vec<IMonitorValue>,
}

impl IMonitor {
    /// The changed paths, in declaration order.
    pub fn dirty(&self) -> Vec<&str> {
        self.values.iter().map(|v| v.path.as_str()).collect()
    }

    /// The change of `path`, or of the first changed path for `None`.
    pub fn value(&self, path: Option<&str>) -> Option<&IMonitorValue> {
        match path {
            Some(path) => self.values.iter().find(|v| v.path == path),
            None => self.values.first(),
        }
    }
}

/// A `@Monitor` function watching one or more dotted paths from its owner.
///
/// Each path records dependencies under its own id. When one is dirty only that path
/// is re-resolved; the function is queued if the path's value changed and runs at most
/// once per update pass, after every computed has settled.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct MonitorV2 {
    watch_id: BindId,
    name: String,
    #[derivative(Debug = "ignore")]
    rt: Weak<Runtime>,
    target: WeakObjectRef,
    values: RefCell<Vec<MonitorValueV2>>,
    #[derivative(Debug = "ignore")]
    func: MonitorFn,
    #[derivative(Debug = "ignore")]
    owning_view: Weak<ViewV2>,
    #[derivative(Debug = "ignore")]
    self_ref: Weak<MonitorV2>,
}

impl MonitorV2 {
    pub fn new(
        rt: &Rc<Runtime>,
        target: &Observed,
        paths: &[&str],
        name: &str,
        func: impl Fn(&Observed, &IMonitor) -> Result<()> + 'static,
        owning_view: Option<&Rc<ViewV2>>,
    ) -> Result<Rc<MonitorV2>> {
        let observe = rt.observe();
        let watch_id = observe.next_watch_id();
        let values = paths.iter().map(|path| MonitorValueV2::new(path, observe.next_watch_id())).collect();
        let monitor = Rc::new_cyclic(|self_ref| MonitorV2 {
            watch_id,
            name: name.to_string(),
            rt: Rc::downgrade(rt),
            target: target.target().downgrade(),
            values: RefCell::new(values),
            func: Box::new(func),
            owning_view: owning_view.map_or_else(Weak::new, Rc::downgrade),
            self_ref: self_ref.clone(),
        });
        monitor.init_monitor(rt, target.target())?;
        target.target().0.monitors.borrow_mut().push(monitor.clone());
        debug!("@Monitor {} created with id {} for {:?}", name, watch_id, paths);
        Ok(monitor)
    }

    pub fn watch_id(&self) -> BindId {
        self.watch_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owning_view(&self) -> Option<Rc<ViewV2>> {
        self.owning_view.upgrade()
    }

    pub fn paths(&self) -> Vec<String> {
        self.values.borrow().iter().map(|v| v.path.clone()).collect()
    }

    fn init_monitor(&self, rt: &Rc<Runtime>, target: &ObjectRef) -> Result<()> {
        let count = self.values.borrow().len();
        for index in 0..count {
            let value = self.record_path(rt, target, index)?;
            let mut values = self.values.borrow_mut();
            if value.is_none() {
                warn!("@Monitor {}: path '{}' can not be resolved", self.name, values[index].path);
            }
            values[index].set_value(true, value);
        }
        Ok(())
    }

    /// Re-resolves the path with bind id `id`; returns whether the monitor function
    /// needs to run.
    pub(crate) fn notify_change(&self, id: BindId) -> Result<bool> {
        let (Some(rt), Some(target)) = (self.rt.upgrade(), self.target.upgrade()) else {
            return Ok(false);
        };
        let Some(index) = self.values.borrow().iter().position(|v| v.id == id) else {
            error!("@Monitor {}: unknown path id {}", self.name, id);
            return Ok(false);
        };
        let value = self.record_path(&rt, &target, index)?;
        Ok(self.values.borrow_mut()[index].set_value(false, value))
    }

    fn record_path(&self, rt: &Rc<Runtime>, target: &ObjectRef, index: usize) -> Result<Option<Value>> {
        let (id, segments) = {
            let values = self.values.borrow();
            (values[index].id, values[index].segments.clone())
        };
        let root = Value::Observed(self.this(rt, target.clone()));
        rt.observe().record_dependencies(id, ReactiveOwner::Monitor(self.self_ref.clone()), || resolve_path(root, &segments))
    }

    fn this(&self, rt: &Rc<Runtime>, target: ObjectRef) -> Observed {
        let mode = if target.class().is_some() { WrapMode::Decorator } else { WrapMode::Explicit };
        Observed::v2(rt, target, mode)
    }

    /// Runs the monitor function if any path is dirty, then takes the current values as
    /// the new baseline.
    pub(crate) fn run_monitor_function(&self) -> Result<()> {
        let (Some(rt), Some(target)) = (self.rt.upgrade(), self.target.upgrade()) else {
            return Ok(());
        };
        let changes: Vec<IMonitorValue> = self.values.borrow()
            .iter()
            .filter(|v| v.dirty)
            .map(|v| IMonitorValue {
                path: v.path.clone(),
                before: v.before.clone().unwrap_or(Value::Undefined),
                now: v.now.clone().unwrap_or(Value::Undefined),
            })
            .collect();
        if changes.is_empty() {
            return Ok(());
        }
        let monitor = IMonitor { values: changes };
        debug!("@Monitor {}: running for {:?}", self.name, monitor.dirty());
        let result = (self.func)(&self.this(&rt, target), &monitor);
        for value in self.values.borrow_mut().iter_mut() {
            value.reset();
        }
        result.inspect_err(|err| error!("@Monitor {}: {}", self.name, err))
    }

    pub fn about_to_be_deleted(&self) {
        let Some(rt) = self.rt.upgrade() else {
            return;
        };
        for value in self.values.borrow().iter() {
            rt.observe().clear_binding(value.id);
        }
        if let Some(target) = self.target.upgrade() {
            target.0.monitors.borrow_mut().retain(|monitor| monitor.watch_id != self.watch_id);
        }
    }
}

/// Walks `segments` from `root`. Arrays are indexed by numeric segments, maps by key.
/// `None` if a segment can not be followed.
fn resolve_path(root: Value, segments: &[Rc<str>]) -> Result<Option<Value>> {
    let mut current = root;
    for segment in segments {
        current = match &current {
            Value::Observed(observed) => match observed.kind() {
                ContainerKind::Object => {
                    if !observed.has(segment)? {
                        return Ok(None);
                    }
                    observed.get(segment)?
                }
                ContainerKind::Array => {
                    let array = observed.array()?;
                    match segment.parse::<usize>() {
                        Ok(index) if index < array.len()? => array.get(index)?,
                        _ => return Ok(None),
                    }
                }
                ContainerKind::Map => {
                    let map = observed.map()?;
                    if !map.has(&**segment)? {
                        return Ok(None);
                    }
                    map.get(&**segment)?
                }
                ContainerKind::Set | ContainerKind::Date => return Ok(None),
            },
            // reached through untraced state: followed without dependencies
            Value::Ref(target) if target.kind() == ContainerKind::Object => {
                let value = target.raw_get(segment);
                if value.is_undefined() && !target.raw_has(segment) {
                    return Ok(None);
                }
                value
            }
            _ => return Ok(None),
        };
    }
    Ok(Some(current))
}
