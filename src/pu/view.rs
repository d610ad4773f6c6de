use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write;
use std::rc::{Rc, Weak};
use derivative::Derivative;
use indexmap::IndexMap;
use log::{debug, error};
use crate::bind_id::ElmtId;
use crate::error::{Result, StateError};
use crate::node::{UpdateFn, UpdateFuncEntry};
use crate::observe::ReactiveOwner;
use crate::pu::{LocalStorage, PuProperty};
use crate::runtime::{ElmtOwner, Runtime};
use crate::value::Value;
use crate::view_v2::{ViewV2, ViewV2Builder};

/// A V1 component. Its properties report which of its elements read them; a change
/// marks those elements dirty and schedules one re-render of the view.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ViewPU {
    elmt_id: ElmtId,
    name: String,
    #[derivative(Debug = "ignore")]
    rt: Rc<Runtime>,
    #[derivative(Debug = "ignore")]
    parent: Option<Rc<ViewPU>>,
    #[derivative(Debug = "ignore")]
    children: RefCell<Vec<Weak<ViewPU>>>,
    #[derivative(Debug = "ignore")]
    v2_children: RefCell<Vec<Weak<ViewV2>>>,
    #[derivative(Debug = "ignore")]
    local_storage: Rc<LocalStorage>,
    properties: RefCell<IndexMap<Rc<str>, Rc<PuProperty>>>,
    /// alias -> `@Provide` property
    provided: RefCell<HashMap<Rc<str>, Rc<PuProperty>>>,
    #[derivative(Debug = "ignore")]
    update_funcs: RefCell<BTreeMap<ElmtId, UpdateFuncEntry>>,
    dirty: RefCell<BTreeSet<ElmtId>>,
    /// Elements invalidated by V2 state while inactive.
    delayed_elmts: RefCell<BTreeSet<ElmtId>>,
    active: Cell<bool>,
    need_update: Cell<bool>,
    deleted: Cell<bool>,
    #[derivative(Debug = "ignore")]
    self_ref: Weak<ViewPU>,
}

impl ViewPU {
    /// A view sharing its parent's local storage (or a new one at the root).
    pub fn new(rt: &Rc<Runtime>, name: impl Into<String>, parent: Option<&Rc<ViewPU>>) -> Rc<ViewPU> {
        let storage = match parent {
            Some(parent) => parent.local_storage.clone(),
            None => LocalStorage::new(rt),
        };
        Self::with_local_storage(rt, name, parent, storage)
    }

    pub fn with_local_storage(rt: &Rc<Runtime>, name: impl Into<String>, parent: Option<&Rc<ViewPU>>, local_storage: Rc<LocalStorage>) -> Rc<ViewPU> {
        let view = Rc::new_cyclic(|self_ref| ViewPU {
            elmt_id: rt.allocate_elmt_id(),
            name: name.into(),
            rt: rt.clone(),
            parent: parent.cloned(),
            children: RefCell::new(Vec::new()),
            v2_children: RefCell::new(Vec::new()),
            local_storage,
            properties: RefCell::new(IndexMap::new()),
            provided: RefCell::new(HashMap::new()),
            update_funcs: RefCell::new(BTreeMap::new()),
            dirty: RefCell::new(BTreeSet::new()),
            delayed_elmts: RefCell::new(BTreeSet::new()),
            active: Cell::new(true),
            need_update: Cell::new(false),
            deleted: Cell::new(false),
            self_ref: self_ref.clone(),
        });
        if let Some(parent) = parent {
            parent.children.borrow_mut().push(Rc::downgrade(&view));
        }
        debug!("{}[{}] created", view.name, view.elmt_id);
        view
    }

    pub fn elmt_id(&self) -> ElmtId {
        self.elmt_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Rc<ViewPU>> {
        self.parent.as_ref()
    }

    pub fn children(&self) -> Vec<Rc<ViewPU>> {
        self.children.borrow().iter().filter_map(Weak::upgrade).collect()
    }

    pub fn v2_children(&self) -> Vec<Rc<ViewV2>> {
        self.v2_children.borrow().iter().filter_map(Weak::upgrade).collect()
    }

    pub fn local_storage(&self) -> &Rc<LocalStorage> {
        &self.local_storage
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.get()
    }

    fn me(&self) -> Option<Rc<ViewPU>> {
        self.self_ref.upgrade()
    }

    // region declarations

    fn declare(&self, property: Rc<PuProperty>) -> Rc<PuProperty> {
        self.properties.borrow_mut().insert(Rc::from(property.name()), property.clone());
        property
    }

    pub fn property(&self, name: &str) -> Option<Rc<PuProperty>> {
        self.properties.borrow().get(name).cloned()
    }

    pub fn properties(&self) -> Vec<Rc<PuProperty>> {
        self.properties.borrow().values().cloned().collect()
    }

    pub fn state(&self, name: &str, value: impl Into<Value>) -> Result<Rc<PuProperty>> {
        let property = PuProperty::new_state(&self.rt, "@State", name, value.into(), self.me().as_ref())?;
        Ok(self.declare(property))
    }

    pub fn link(&self, name: &str, source: &Rc<PuProperty>) -> Rc<PuProperty> {
        self.declare(PuProperty::new_link(&self.rt, "@Link", name, source, self.me().as_ref()))
    }

    pub fn prop(&self, name: &str, source: &Rc<PuProperty>) -> Result<Rc<PuProperty>> {
        let property = PuProperty::new_prop(&self.rt, "@Prop", name, Some(source), Value::Undefined, self.me().as_ref())?;
        Ok(self.declare(property))
    }

    /// A `@Prop` the parent initializes from a plain value (and updates with `reset`).
    pub fn prop_value(&self, name: &str, init: impl Into<Value>) -> Result<Rc<PuProperty>> {
        let property = PuProperty::new_prop(&self.rt, "@Prop", name, None, init.into(), self.me().as_ref())?;
        Ok(self.declare(property))
    }

    pub fn object_link(&self, name: &str, value: impl Into<Value>) -> Result<Rc<PuProperty>> {
        let property = PuProperty::new_object_link(&self.rt, name, value.into(), self.me().as_ref())?;
        Ok(self.declare(property))
    }

    pub fn provide(&self, name: &str, alias: &str, value: impl Into<Value>) -> Result<Rc<PuProperty>> {
        if self.provided.borrow().contains_key(alias) {
            return Err(StateError::DuplicateProvide(alias.to_string()));
        }
        let property = PuProperty::new_state(&self.rt, "@Provide", name, value.into(), self.me().as_ref())?;
        self.add_provided_var(alias, &property)?;
        Ok(self.declare(property))
    }

    pub fn consume(&self, name: &str, alias: &str) -> Result<Rc<PuProperty>> {
        let property = self.initialize_consume(name, alias)?;
        Ok(self.declare(property))
    }

    pub fn storage_link(&self, key: &str, name: &str, default: impl Into<Value>) -> Result<Rc<PuProperty>> {
        let storage = self.rt.app_storage().clone();
        let property = storage.set_and_link_for(key, default.into(), name, self.me().as_ref(), "@StorageLink")?;
        Ok(self.declare(property))
    }

    pub fn storage_prop(&self, key: &str, name: &str, default: impl Into<Value>) -> Result<Rc<PuProperty>> {
        let storage = self.rt.app_storage().clone();
        let property = storage.set_and_prop_for(key, default.into(), name, self.me().as_ref(), "@StorageProp")?;
        Ok(self.declare(property))
    }

    pub fn local_storage_link(&self, key: &str, name: &str, default: impl Into<Value>) -> Result<Rc<PuProperty>> {
        let property = self.local_storage.set_and_link_for(key, default.into(), name, self.me().as_ref(), "@LocalStorageLink")?;
        Ok(self.declare(property))
    }

    pub fn local_storage_prop(&self, key: &str, name: &str, default: impl Into<Value>) -> Result<Rc<PuProperty>> {
        let property = self.local_storage.set_and_prop_for(key, default.into(), name, self.me().as_ref(), "@LocalStorageProp")?;
        Ok(self.declare(property))
    }

    // endregion

    // region provide / consume

    pub fn add_provided_var(&self, alias: &str, property: &Rc<PuProperty>) -> Result<()> {
        let mut provided = self.provided.borrow_mut();
        if provided.contains_key(alias) {
            return Err(StateError::DuplicateProvide(alias.to_string()));
        }
        provided.insert(Rc::from(alias), property.clone());
        Ok(())
    }

    /// The nearest `@Provide` of `alias`, starting at this view.
    pub fn find_provide(&self, alias: &str) -> Option<Rc<PuProperty>> {
        if let Some(property) = self.provided.borrow().get(alias) {
            return Some(property.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.find_provide(alias))
    }

    pub fn initialize_consume(&self, name: &str, alias: &str) -> Result<Rc<PuProperty>> {
        let source = self.parent.as_ref()
            .and_then(|parent| parent.find_provide(alias))
            .ok_or_else(|| StateError::MissingProvider(alias.to_string()))?;
        Ok(PuProperty::new_link(&self.rt, "@Consume", name, &source, self.me().as_ref()))
    }

    // endregion

    // region rendering

    /// Registers a new element with its update function and renders it the first time.
    pub fn observe_component_creation(&self, func: impl Fn(ElmtId, bool) -> Result<()> + 'static) -> Result<ElmtId> {
        let id = self.rt.allocate_elmt_id();
        let func: UpdateFn = Rc::new(func);
        self.update_funcs.borrow_mut().insert(id, UpdateFuncEntry::new(func.clone()));
        self.rt.register_elmt_owner(id, ElmtOwner::LegacyView(self.self_ref.clone()));
        debug!("{}[{}]: element {} created", self.name, self.elmt_id, id);
        self.render(id, &func, true)?;
        Ok(id)
    }

    pub fn update_element(&self, id: ElmtId) -> Result<()> {
        let func = match self.update_funcs.borrow().get(&id) {
            Some(entry) => entry.func.clone(),
            None => {
                debug!("{}[{}]: element {} has no update function", self.name, self.elmt_id, id);
                return Ok(());
            }
        };
        self.render(id, &func, false)
    }

    fn render(&self, id: ElmtId, func: &UpdateFn, is_first: bool) -> Result<()> {
        if let Some(entry) = self.update_funcs.borrow().get(&id) {
            entry.render_count.set(entry.render_count.get() + 1);
        }
        // V1 properties and V2 state read while rendering both attribute to this element
        self.rt.push_pu_render(id);
        let observe = self.rt.observe();
        observe.start_record_dependencies(id, ReactiveOwner::LegacyView(self.self_ref.clone()), true);
        let result = func(id, is_first);
        observe.stop_record_dependencies();
        self.rt.pop_pu_render();
        result.inspect_err(|err| error!("{}[{}]: rendering element {} failed: {}", self.name, self.elmt_id, id, err))
    }

    /// A property of this view changed; `dependents` are the elements that read it.
    pub fn view_property_has_changed(&self, var_name: &str, dependents: BTreeSet<ElmtId>) {
        debug!("{}[{}]: '{}' changed, dependent elements {:?}", self.name, self.elmt_id, var_name, dependents);
        let registered: Vec<ElmtId> = {
            let update_funcs = self.update_funcs.borrow();
            dependents.into_iter().filter(|id| update_funcs.contains_key(id)).collect()
        };
        if registered.is_empty() {
            return;
        }
        self.dirty.borrow_mut().extend(registered);
        self.mark_need_update();
    }

    /// Schedules one re-render of the dirty elements.
    pub fn mark_need_update(&self) {
        if !self.need_update.replace(true) {
            self.rt.schedule_rerender(self.self_ref.clone());
        }
    }

    pub fn rerender(&self) -> Result<()> {
        self.need_update.set(false);
        self.update_dirty_elements()
    }

    /// An element was invalidated by V2 state it read.
    pub fn ui_node_need_update_v2(&self, id: ElmtId) {
        if self.active.get() {
            self.dirty.borrow_mut().insert(id);
        } else {
            self.delayed_elmts.borrow_mut().insert(id);
        }
    }

    pub fn update_dirty_elements(&self) -> Result<()> {
        let dirty = std::mem::take(&mut *self.dirty.borrow_mut());
        for id in dirty {
            self.update_element(id)?;
        }
        Ok(())
    }

    /// Activates or deactivates this view and its descendants. On activation properties
    /// send the changes they held back, and a re-render is scheduled if anything is dirty.
    pub fn set_active(&self, active: bool) {
        if self.active.get() != active {
            self.active.set(active);
            debug!("{}[{}]: {}", self.name, self.elmt_id, if active { "active" } else { "inactive" });
            if active {
                for property in self.properties() {
                    property.perform_delayed_update();
                }
                let delayed = std::mem::take(&mut *self.delayed_elmts.borrow_mut());
                self.dirty.borrow_mut().extend(delayed);
                if !self.dirty.borrow().is_empty() {
                    self.mark_need_update();
                }
            }
        }
        for child in self.children() {
            child.set_active(active);
        }
        for child in self.v2_children() {
            if let Err(err) = child.set_active(active) {
                error!("{}[{}]: activating V2 child {} failed: {}", self.name, self.elmt_id, child.name(), err);
            }
        }
    }

    /// Creates a V2 child component. `params` declares its variables; reading observed
    /// state (V1 or V2) while it runs is an error.
    pub fn create_v2_child(&self, name: &str, params: impl FnOnce(ViewV2Builder) -> Result<ViewV2Builder>) -> Result<Rc<ViewV2>> {
        let builder = ViewV2::builder(&self.rt, name).legacy_parent(&self.self_ref);
        let builder = self.rt.observe()
            .with_illegal_v1_access_guard(|| params(builder))
            .inspect_err(|err| error!("{}[{}]: creating V2 child {} failed: {}", self.name, self.elmt_id, name, err))?;
        let child = builder.build()?;
        if !self.active.get() {
            child.set_active(false)?;
        }
        self.v2_children.borrow_mut().push(Rc::downgrade(&child));
        Ok(child)
    }

    // endregion

    // region teardown

    /// Forgets deleted elements: their update functions and every property dependency.
    pub fn purge_deleted_elmt_ids(&self, ids: &[ElmtId]) {
        for property in self.properties() {
            for id in ids {
                property.purge_dependency_on_elmt_id(*id);
            }
        }
        let mut update_funcs = self.update_funcs.borrow_mut();
        for id in ids {
            update_funcs.remove(id);
            self.dirty.borrow_mut().remove(id);
            self.delayed_elmts.borrow_mut().remove(id);
        }
    }

    pub fn about_to_be_deleted(&self) {
        if self.deleted.replace(true) {
            return;
        }
        let properties: Vec<Rc<PuProperty>> = self.properties.borrow_mut().drain(..).map(|(_, p)| p).collect();
        for property in properties {
            property.about_to_be_deleted();
        }
        self.provided.borrow_mut().clear();
        let elmts = std::mem::take(&mut *self.update_funcs.borrow_mut());
        for id in elmts.keys() {
            self.rt.observe().clear_binding(*id);
            self.rt.unregister_elmt_owner(*id);
        }
        self.dirty.borrow_mut().clear();
        debug!("{}[{}] deleted", self.name, self.elmt_id);
    }

    // endregion

    // region introspection

    pub fn elmt_ids(&self) -> Vec<ElmtId> {
        self.update_funcs.borrow().keys().copied().collect()
    }

    pub fn dirty_elmt_ids(&self) -> Vec<ElmtId> {
        self.dirty.borrow().iter().copied().collect()
    }

    pub fn render_count(&self, id: ElmtId) -> usize {
        self.update_funcs.borrow().get(&id).map_or(0, |entry| entry.render_count.get())
    }

    pub(crate) fn render_counts(&self) -> Vec<(ElmtId, usize)> {
        self.update_funcs.borrow().iter().map(|(id, entry)| (*id, entry.render_count.get())).collect()
    }

    pub(crate) fn state_variables_info(&self) -> String {
        let mut out = String::new();
        for property in self.properties.borrow().values() {
            let _ = writeln!(
                out,
                "  {} {}: {:?} subscribers {} dependencies [{}]",
                property.decorator(),
                property.name(),
                property.get_unmonitored(),
                property.number_of_subscribers(),
                property.dump_dependencies(),
            );
        }
        out
    }

    // endregion
}
