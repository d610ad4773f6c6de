//! `ViewV2`: a component whose state is traced through [ObserveV2](crate::ObserveV2).

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write;
use std::rc::{Rc, Weak};
use derivative::Derivative;
use indexmap::IndexMap;
use log::{debug, error};
use crate::bind_id::{BindId, ElmtId};
use crate::class::ClassDescriptor;
use crate::computed::ComputedV2;
use crate::error::{Result, StateError};
use crate::monitor::{IMonitor, MonitorV2};
use crate::node::{UpdateFn, UpdateFuncEntry};
use crate::observe::ReactiveOwner;
use crate::proxy::{Observed, WrapMode};
use crate::pu::ViewPU;
use crate::runtime::{ElmtOwner, Runtime};
use crate::value::{ObjectRef, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarDecorator {
    Local,
    Param,
    OnceParam,
    Provider,
    Consumer,
}

impl VarDecorator {
    fn name(self) -> &'static str {
        match self {
            VarDecorator::Local => "@Local",
            VarDecorator::Param => "@Param",
            VarDecorator::OnceParam => "@Once @Param",
            VarDecorator::Provider => "@Provider",
            VarDecorator::Consumer => "@Consumer",
        }
    }
}

/// A `@Consumer` connected to the `@Provider` of an ancestor.
#[derive(Debug, Clone)]
struct ConsumerBinding {
    provider: Weak<ViewV2>,
    field: Rc<str>,
}

/// Declares the decorated variables of a [ViewV2].
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ViewV2Builder {
    #[derivative(Debug = "ignore")]
    rt: Rc<Runtime>,
    name: String,
    #[derivative(Debug = "ignore")]
    parent: Option<Rc<ViewV2>>,
    #[derivative(Debug = "ignore")]
    legacy_parent: Weak<ViewPU>,
    vars: Vec<(Rc<str>, VarDecorator, Value)>,
    /// field -> alias
    aliases: HashMap<Rc<str>, Rc<str>>,
}

impl ViewV2Builder {
    pub fn parent(mut self, parent: &Rc<ViewV2>) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    pub(crate) fn legacy_parent(mut self, parent: &Weak<ViewPU>) -> Self {
        self.legacy_parent = parent.clone();
        self
    }

    pub fn local(self, name: &str, value: impl Into<Value>) -> Self {
        self.var(name, VarDecorator::Local, value.into())
    }

    pub fn param(self, name: &str, value: impl Into<Value>) -> Self {
        self.var(name, VarDecorator::Param, value.into())
    }

    /// A `@Once @Param`: takes the parent's value at construction and ignores later updates.
    pub fn once_param(self, name: &str, value: impl Into<Value>) -> Self {
        self.var(name, VarDecorator::OnceParam, value.into())
    }

    pub fn provider(mut self, name: &str, alias: &str, value: impl Into<Value>) -> Self {
        self.aliases.insert(Rc::from(name), Rc::from(alias));
        self.var(name, VarDecorator::Provider, value.into())
    }

    /// `default` is used when no ancestor provides `alias`.
    pub fn consumer(mut self, name: &str, alias: &str, default: impl Into<Value>) -> Self {
        self.aliases.insert(Rc::from(name), Rc::from(alias));
        self.var(name, VarDecorator::Consumer, default.into())
    }

    fn var(mut self, name: &str, decorator: VarDecorator, value: Value) -> Self {
        self.vars.push((Rc::from(name), decorator, value));
        self
    }

    pub fn build(self) -> Result<Rc<ViewV2>> {
        let mut class = ClassDescriptor::builder(self.name.clone());
        let mut provided = HashMap::new();
        let mut consumers = HashMap::new();
        let mut decorators = IndexMap::new();
        for (field, decorator, _) in &self.vars {
            class = match decorator {
                VarDecorator::Param | VarDecorator::OnceParam => class.read_only(field),
                _ => class.trace(field),
            };
            decorators.insert(field.clone(), *decorator);
            let alias = self.aliases.get(field).cloned().unwrap_or_else(|| field.clone());
            match decorator {
                VarDecorator::Provider => {
                    if provided.insert(alias.clone(), field.clone()).is_some() {
                        return Err(StateError::DuplicateProvide(alias.to_string()));
                    }
                }
                VarDecorator::Consumer => {
                    if let Some(binding) = self.parent.as_ref().and_then(|parent| parent.find_provider(&alias)) {
                        consumers.insert(field.clone(), binding);
                    } else {
                        debug!("{}: no @Provider '{}' for @Consumer {}, using its default", self.name, alias, field);
                    }
                }
                _ => {}
            }
        }
        let class = class.build();
        let state = ObjectRef::new_instance(&class, self.vars.into_iter().map(|(field, _, value)| (field, value)));
        let view = Rc::new_cyclic(|self_ref| ViewV2 {
            id: self.rt.allocate_elmt_id(),
            name: self.name,
            state: Observed::v2(&self.rt, state, WrapMode::Decorator),
            rt: self.rt.clone(),
            parent: self.parent.clone(),
            legacy_parent: self.legacy_parent.clone(),
            decorators,
            provided,
            consumers,
            update_funcs: RefCell::new(BTreeMap::new()),
            dirty: RefCell::new(BTreeSet::new()),
            active: Cell::new(true),
            delayed_elmts: RefCell::new(BTreeSet::new()),
            delayed_computed: RefCell::new(BTreeSet::new()),
            delayed_monitors: RefCell::new(BTreeSet::new()),
            computeds: RefCell::new(Vec::new()),
            monitors: RefCell::new(Vec::new()),
            children: RefCell::new(Vec::new()),
            deleted: Cell::new(false),
            self_ref: self_ref.clone(),
        });
        if let Some(parent) = &self.parent {
            parent.children.borrow_mut().push(Rc::downgrade(&view));
        }
        debug!("{}[{}] created", view.name, view.id);
        Ok(view)
    }
}

/// A V2 component. Its decorated variables live in one traced state object, and each of
/// its elements re-renders when state it read during its last render changes.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ViewV2 {
    id: ElmtId,
    name: String,
    state: Observed,
    #[derivative(Debug = "ignore")]
    rt: Rc<Runtime>,
    #[derivative(Debug = "ignore")]
    parent: Option<Rc<ViewV2>>,
    #[derivative(Debug = "ignore")]
    legacy_parent: Weak<ViewPU>,
    decorators: IndexMap<Rc<str>, VarDecorator>,
    /// alias -> providing field
    provided: HashMap<Rc<str>, Rc<str>>,
    consumers: HashMap<Rc<str>, ConsumerBinding>,
    #[derivative(Debug = "ignore")]
    update_funcs: RefCell<BTreeMap<ElmtId, UpdateFuncEntry>>,
    dirty: RefCell<BTreeSet<ElmtId>>,
    active: Cell<bool>,
    delayed_elmts: RefCell<BTreeSet<ElmtId>>,
    delayed_computed: RefCell<BTreeSet<BindId>>,
    delayed_monitors: RefCell<BTreeSet<BindId>>,
    #[derivative(Debug = "ignore")]
    computeds: RefCell<Vec<Rc<ComputedV2>>>,
    #[derivative(Debug = "ignore")]
    monitors: RefCell<Vec<Rc<MonitorV2>>>,
    #[derivative(Debug = "ignore")]
    children: RefCell<Vec<Weak<ViewV2>>>,
    deleted: Cell<bool>,
    #[derivative(Debug = "ignore")]
    self_ref: Weak<ViewV2>,
}

impl ViewV2 {
    pub fn builder(rt: &Rc<Runtime>, name: impl Into<String>) -> ViewV2Builder {
        ViewV2Builder {
            rt: rt.clone(),
            name: name.into(),
            parent: None,
            legacy_parent: Weak::new(),
            vars: Vec::new(),
            aliases: HashMap::new(),
        }
    }

    pub fn id(&self) -> ElmtId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The traced object holding the decorated variables.
    pub fn state(&self) -> &Observed {
        &self.state
    }

    pub fn parent(&self) -> Option<&Rc<ViewV2>> {
        self.parent.as_ref()
    }

    /// The V1 view hosting this component, if it was created by one.
    pub fn legacy_parent(&self) -> Option<Rc<ViewPU>> {
        self.legacy_parent.upgrade()
    }

    pub fn children(&self) -> Vec<Rc<ViewV2>> {
        self.children.borrow().iter().filter_map(Weak::upgrade).collect()
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.get()
    }

    fn find_provider(&self, alias: &str) -> Option<ConsumerBinding> {
        match self.provided.get(alias) {
            Some(field) => Some(ConsumerBinding { provider: self.self_ref.clone(), field: field.clone() }),
            None => self.parent.as_ref().and_then(|parent| parent.find_provider(alias)),
        }
    }

    /// Whether `field` is a `@Consumer` connected to an ancestor's `@Provider`.
    pub fn is_consumer_connected(&self, field: &str) -> bool {
        self.consumers.contains_key(field)
    }

    // region variables

    /// Reads a decorated variable. A connected `@Consumer` reads its provider.
    pub fn get(&self, field: &str) -> Result<Value> {
        match self.consumers.get(field) {
            Some(binding) => match binding.provider.upgrade() {
                Some(provider) => provider.get(&binding.field),
                None => self.state.get(field),
            },
            None => self.state.get(field),
        }
    }

    /// Assigns a decorated variable. `@Param`s are read-only here; a connected
    /// `@Consumer` writes through to its provider.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<()> {
        match self.consumers.get(field) {
            Some(binding) => match binding.provider.upgrade() {
                Some(provider) => provider.set(&binding.field, value),
                None => self.state.set(field, value),
            },
            None => self.state.set(field, value),
        }
    }

    /// The parent passes a new value for a `@Param`. Ignored for `@Once` params.
    pub fn update_param(&self, field: &str, value: impl Into<Value>) -> Result<()> {
        match self.decorators.get(field) {
            Some(VarDecorator::Param) => self.state.set_internal(field, value.into()),
            Some(VarDecorator::OnceParam) => {
                debug!("{}: @Once @Param {} ignores updates", self.name, field);
                Ok(())
            }
            _ => Err(StateError::UnknownProperty(field.to_string())),
        }
    }

    /// Declares a `@Computed` on this component.
    pub fn computed(self: &Rc<Self>, name: &str, compute: impl Fn(&Observed) -> Result<Value> + 'static) -> Result<Rc<ComputedV2>> {
        let computed = ComputedV2::new(&self.rt, &self.state, name, compute, Some(self))?;
        self.computeds.borrow_mut().push(computed.clone());
        Ok(computed)
    }

    /// Declares a `@Monitor` on this component.
    pub fn monitor(self: &Rc<Self>, paths: &[&str], name: &str, func: impl Fn(&Observed, &IMonitor) -> Result<()> + 'static) -> Result<Rc<MonitorV2>> {
        let monitor = MonitorV2::new(&self.rt, &self.state, paths, name, func, Some(self))?;
        self.monitors.borrow_mut().push(monitor.clone());
        Ok(monitor)
    }

    // endregion

    // region rendering

    /// Registers a new element with its update function and renders it the first time.
    pub fn observe_component_creation(&self, func: impl Fn(ElmtId, bool) -> Result<()> + 'static) -> Result<ElmtId> {
        let id = self.rt.allocate_elmt_id();
        let func: UpdateFn = Rc::new(func);
        self.update_funcs.borrow_mut().insert(id, UpdateFuncEntry::new(func.clone()));
        self.rt.register_elmt_owner(id, ElmtOwner::View(self.self_ref.clone()));
        debug!("{}[{}]: element {} created", self.name, self.id, id);
        self.render(id, &func, true)?;
        Ok(id)
    }

    /// Re-renders one element, replacing the dependencies it recorded last time.
    pub fn update_element(&self, id: ElmtId) -> Result<()> {
        let func = match self.update_funcs.borrow().get(&id) {
            Some(entry) => entry.func.clone(),
            None => {
                debug!("{}[{}]: element {} has no update function", self.name, self.id, id);
                return Ok(());
            }
        };
        self.render(id, &func, false)
    }

    fn render(&self, id: ElmtId, func: &UpdateFn, is_first: bool) -> Result<()> {
        if let Some(entry) = self.update_funcs.borrow().get(&id) {
            entry.render_count.set(entry.render_count.get() + 1);
        }
        let observe = self.rt.observe();
        observe.start_record_dependencies(id, ReactiveOwner::View(self.self_ref.clone()), true);
        let result = func(id, is_first);
        observe.stop_record_dependencies();
        result.inspect_err(|err| error!("{}[{}]: rendering element {} failed: {}", self.name, self.id, id, err))
    }

    /// Marks an element dirty, or parks it while the component is inactive.
    pub fn ui_node_need_update_v2(&self, id: ElmtId) {
        if self.active.get() {
            self.dirty.borrow_mut().insert(id);
        } else {
            self.delayed_elmts.borrow_mut().insert(id);
        }
    }

    /// Re-renders the dirty elements in ascending id order.
    pub fn update_dirty_elements(&self) -> Result<()> {
        let dirty = std::mem::take(&mut *self.dirty.borrow_mut());
        for id in dirty {
            self.update_element(id)?;
        }
        Ok(())
    }

    pub(crate) fn delay_computed(&self, id: BindId) {
        self.delayed_computed.borrow_mut().insert(id);
    }

    pub(crate) fn delay_monitor(&self, id: BindId) {
        self.delayed_monitors.borrow_mut().insert(id);
    }

    /// Activates or deactivates this component and its descendants. On activation the
    /// updates parked meanwhile run: computed first, then monitors, then elements.
    pub fn set_active(&self, active: bool) -> Result<()> {
        if self.active.get() != active {
            self.active.set(active);
            debug!("{}[{}]: {}", self.name, self.id, if active { "active" } else { "inactive" });
            if active {
                self.perform_delayed_update()?;
            }
        }
        for child in self.children() {
            child.set_active(active)?;
        }
        Ok(())
    }

    fn perform_delayed_update(&self) -> Result<()> {
        let observe = self.rt.observe();
        let computed = std::mem::take(&mut *self.delayed_computed.borrow_mut());
        if !computed.is_empty() {
            observe.update_dirty_computed_props(computed)?;
        }
        let monitors = std::mem::take(&mut *self.delayed_monitors.borrow_mut());
        if !monitors.is_empty() {
            observe.update_dirty_monitors(monitors)?;
        }
        let elmts = std::mem::take(&mut *self.delayed_elmts.borrow_mut());
        self.dirty.borrow_mut().extend(elmts);
        self.update_dirty_elements()
    }

    // endregion

    // region teardown

    pub(crate) fn purge_deleted_elmt_id(&self, id: ElmtId) {
        self.update_funcs.borrow_mut().remove(&id);
        self.dirty.borrow_mut().remove(&id);
        self.delayed_elmts.borrow_mut().remove(&id);
    }

    /// Tears the component down: its computed and monitors stop, its elements lose
    /// their bindings and registrations.
    pub fn about_to_be_deleted(&self) {
        if self.deleted.replace(true) {
            return;
        }
        for computed in self.computeds.borrow_mut().drain(..) {
            computed.about_to_be_deleted();
        }
        for monitor in self.monitors.borrow_mut().drain(..) {
            monitor.about_to_be_deleted();
        }
        let elmts = std::mem::take(&mut *self.update_funcs.borrow_mut());
        for id in elmts.keys() {
            self.rt.observe().clear_binding(*id);
            self.rt.unregister_elmt_owner(*id);
        }
        self.dirty.borrow_mut().clear();
        debug!("{}[{}] deleted", self.name, self.id);
    }

    // endregion

    // region introspection

    pub fn elmt_ids(&self) -> Vec<ElmtId> {
        self.update_funcs.borrow().keys().copied().collect()
    }

    pub fn dirty_elmt_ids(&self) -> Vec<ElmtId> {
        self.dirty.borrow().iter().copied().collect()
    }

    pub fn delayed_elmt_ids(&self) -> Vec<ElmtId> {
        self.delayed_elmts.borrow().iter().copied().collect()
    }

    pub fn render_count(&self, id: ElmtId) -> usize {
        self.update_funcs.borrow().get(&id).map_or(0, |entry| entry.render_count.get())
    }

    pub(crate) fn render_counts(&self) -> Vec<(ElmtId, usize)> {
        self.update_funcs.borrow().iter().map(|(id, entry)| (*id, entry.render_count.get())).collect()
    }

    pub(crate) fn state_variables_info(&self) -> String {
        let mut out = String::new();
        for (field, decorator) in &self.decorators {
            let value = self.state.target().raw_get(field);
            let connected = if self.consumers.contains_key(field) { " (connected)" } else { "" };
            let _ = writeln!(out, "  {} {}{}: {:?}", decorator.name(), field, connected, value);
        }
        for computed in self.computeds.borrow().iter() {
            let _ = writeln!(out, "  @Computed {}: {:?}", computed.name(), computed.peek());
        }
        for monitor in self.monitors.borrow().iter() {
            let _ = writeln!(out, "  @Monitor {}: {:?}", monitor.name(), monitor.paths());
        }
        out
    }

    // endregion
}
