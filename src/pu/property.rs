use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};
use derivative::Derivative;
use log::{debug, error, trace};
use crate::bind_id::ElmtId;
use crate::error::{Result, StateError};
use crate::pu::{ObservedObject, PropertyDependencies, PuSubscriber, SubscriberId, ViewPU};
use crate::runtime::Runtime;
use crate::value::Value;

/// How a property gets its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// Owns its value: `@State`, `@Provide`, storage entries.
    State,
    /// Two-way synced to a source: `@Link`, `@Consume`, `@StorageLink`, `@LocalStorageLink`.
    Link,
    /// One-way synced copy of a source: `@Prop`, `@StorageProp`, `@LocalStorageProp`.
    Prop,
    /// A nested observed object handed down by the parent; read-only for the child.
    ObjectLink,
}

/// One V1 reactive variable.
///
/// Reassignment (`set`) notifies every element that read the property. In-place
/// mutation of an owned observed object arrives through [PuSubscriber] and, for `@Track`
/// fields, only notifies the elements that read that field.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct PuProperty {
    id: SubscriberId,
    name: Rc<str>,
    decorator: &'static str,
    kind: PropertyKind,
    #[derivative(Debug = "ignore")]
    rt: Weak<Runtime>,
    /// Unused by links, which read through to their source.
    value: RefCell<Value>,
    #[derivative(Debug = "ignore")]
    source: RefCell<Option<Rc<PuProperty>>>,
    subscribers: RefCell<BTreeSet<SubscriberId>>,
    #[derivative(Debug = "ignore")]
    subscriber_refs: RefCell<Vec<Weak<PuProperty>>>,
    #[derivative(Debug = "ignore")]
    owning_view: Weak<ViewPU>,
    dependencies: RefCell<PropertyDependencies>,
    /// A change arrived while the owning view was inactive.
    delayed_notification: Cell<bool>,
    change_notification_is_ongoing: Cell<bool>,
    notification_count: Cell<usize>,
    #[derivative(Debug = "ignore")]
    self_ref: Weak<PuProperty>,
}

fn check_value(name: &str, value: &Value) -> Result<()> {
    match value {
        Value::Function(_) => Err(StateError::UnsupportedValue { name: name.to_string(), reason: "functions can not be state" }),
        _ => Ok(()),
    }
}

impl PuProperty {
    fn create(
        rt: &Rc<Runtime>,
        kind: PropertyKind,
        decorator: &'static str,
        name: &str,
        owning_view: Option<&Rc<ViewPU>>,
        source: Option<&Rc<PuProperty>>,
    ) -> Rc<PuProperty> {
        let property = Rc::new_cyclic(|self_ref| PuProperty {
            id: rt.subscriber_manager().make_id(),
            name: Rc::from(name),
            decorator,
            kind,
            rt: Rc::downgrade(rt),
            value: RefCell::new(Value::Undefined),
            source: RefCell::new(source.cloned()),
            subscribers: RefCell::new(BTreeSet::new()),
            subscriber_refs: RefCell::new(Vec::new()),
            owning_view: owning_view.map_or_else(Weak::new, Rc::downgrade),
            dependencies: RefCell::new(PropertyDependencies::default()),
            delayed_notification: Cell::new(false),
            change_notification_is_ongoing: Cell::new(false),
            notification_count: Cell::new(0),
            self_ref: self_ref.clone(),
        });
        let subscriber: Rc<dyn PuSubscriber> = property.clone();
        rt.subscriber_manager().add(&subscriber);
        if let Some(source) = source {
            source.add_subscriber_ref(&property);
        }
        debug!("{} '{}' created with id {}", decorator, name, property.id);
        property
    }

    /// A property owning `value`; containers become observed objects owned by it.
    pub fn new_state(rt: &Rc<Runtime>, decorator: &'static str, name: &str, value: Value, owning_view: Option<&Rc<ViewPU>>) -> Result<Rc<PuProperty>> {
        check_value(name, &value)?;
        let property = Self::create(rt, PropertyKind::State, decorator, name, owning_view, None);
        property.set_value_internal(value);
        Ok(property)
    }

    pub fn new_link(rt: &Rc<Runtime>, decorator: &'static str, name: &str, source: &Rc<PuProperty>, owning_view: Option<&Rc<ViewPU>>) -> Rc<PuProperty> {
        Self::create(rt, PropertyKind::Link, decorator, name, owning_view, Some(source))
    }

    /// A one-way copy of `source`, or of `init` when the parent passes a plain value.
    pub fn new_prop(rt: &Rc<Runtime>, decorator: &'static str, name: &str, source: Option<&Rc<PuProperty>>, init: Value, owning_view: Option<&Rc<ViewPU>>) -> Result<Rc<PuProperty>> {
        let initial = match source {
            Some(source) => source.get_unmonitored(),
            None => init,
        };
        check_value(name, &initial)?;
        let property = Self::create(rt, PropertyKind::Prop, decorator, name, owning_view, source);
        property.set_value_internal(property.copy_from_source(&initial));
        Ok(property)
    }

    pub fn new_object_link(rt: &Rc<Runtime>, name: &str, value: Value, owning_view: Option<&Rc<ViewPU>>) -> Result<Rc<PuProperty>> {
        check_value(name, &value)?;
        let property = Self::create(rt, PropertyKind::ObjectLink, "@ObjectLink", name, owning_view, None);
        property.set_value_internal(value);
        Ok(property)
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn decorator(&self) -> &'static str {
        self.decorator
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn source(&self) -> Option<Rc<PuProperty>> {
        self.source.borrow().clone()
    }

    /// How many times this property notified a change.
    pub fn notification_count(&self) -> usize {
        self.notification_count.get()
    }

    pub fn has_delayed_notification(&self) -> bool {
        self.delayed_notification.get()
    }

    // region reading

    /// Reads the value. While an element of a V1 view renders, it becomes dependent.
    pub fn get(&self) -> Result<Value> {
        if let Some(rt) = self.rt.upgrade() {
            if rt.observe().is_illegal_access_scope() {
                return Err(StateError::IllegalV1V2Access { property: self.name.to_string() });
            }
            if let Some(elmt) = rt.current_pu_render() {
                trace!("{} '{}': read by element {}", self.decorator, self.name, elmt);
                self.dependencies.borrow_mut().add_property_dependency(elmt);
            }
        }
        let value = self.get_unmonitored();
        if value.target().and_then(|t| t.class().cloned()).is_some_and(|class| class.has_tracked_fields()) {
            ObservedObject::register_property_read_cb(&value, self.self_ref.clone());
        }
        Ok(value)
    }

    /// Reads the value without recording a dependency.
    pub fn get_unmonitored(&self) -> Value {
        match self.kind {
            PropertyKind::Link => match self.source() {
                Some(source) => source.get_unmonitored(),
                None => Value::Undefined,
            },
            _ => self.value.borrow().clone(),
        }
    }

    /// A `@Track` field of the value was read through `get`'s handle.
    pub(crate) fn on_object_property_read(&self, field: &str) {
        let Some(rt) = self.rt.upgrade() else {
            return;
        };
        if let Some(elmt) = rt.current_pu_render() {
            self.dependencies.borrow_mut().add_tracked_property_dependency(field, elmt);
        }
    }

    // endregion

    // region writing

    /// Assigns a new value. Assigning the current value does nothing. A link writes to
    /// its source, a prop only to its local copy.
    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        check_value(&self.name, &value)?;
        match self.kind {
            PropertyKind::ObjectLink => Err(StateError::ReadOnly { name: self.name.to_string(), decorator: self.decorator }),
            PropertyKind::Link => {
                let Some(source) = self.source() else {
                    return Ok(());
                };
                if self.change_notification_is_ongoing.get() || source.get_unmonitored().same_value(&value) {
                    return Ok(());
                }
                self.change_notification_is_ongoing.set(true);
                let result = source.set(value);
                if result.is_ok() {
                    self.notify_property_has_changed_pu();
                }
                self.change_notification_is_ongoing.set(false);
                result
            }
            PropertyKind::State | PropertyKind::Prop => {
                if self.set_value_internal(value) {
                    self.notify_property_has_changed_pu();
                }
                Ok(())
            }
        }
    }

    /// The parent re-syncs an `@ObjectLink` or a source-less `@Prop`.
    pub fn reset(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        check_value(&self.name, &value)?;
        let value = match self.kind {
            PropertyKind::Prop => self.copy_from_source(&value),
            _ => value,
        };
        if self.set_value_internal(value) {
            self.notify_property_has_changed_pu();
        }
        Ok(())
    }

    /// Swaps the owned value, moving ownership of observed containers. Returns whether
    /// the value changed.
    fn set_value_internal(&self, value: Value) -> bool {
        let old = self.value.borrow().clone();
        if old.same_value(&value) {
            return false;
        }
        ObservedObject::remove_owning_property(&old, self.id);
        let value = match self.rt.upgrade() {
            Some(rt) if value.is_container() => ObservedObject::create_new(&rt, value, Some(self.id)),
            _ => value,
        };
        *self.value.borrow_mut() = value;
        true
    }

    fn copy_from_source(&self, value: &Value) -> Value {
        let deep = self.rt.upgrade().map_or(true, |rt| rt.config().prop_deep_copy);
        if deep {
            value.deep_copy()
        } else {
            value.shallow_copy()
        }
    }

    // endregion

    // region notification

    /// Reassignment: every dependent element, and every sync peer.
    pub fn notify_property_has_changed_pu(&self) {
        self.notification_count.set(self.notification_count.get() + 1);
        debug!("{} '{}': has changed", self.decorator, self.name);
        if let Some(view) = self.owning_view.upgrade() {
            if view.is_active() {
                let dependents = self.dependencies.borrow().get_all_property_dependencies();
                view.view_property_has_changed(&self.name, dependents);
            } else {
                self.delayed_notification.set(true);
            }
        }
        self.notify_subscribers(|subscriber| subscriber.sync_peer_has_changed(self));
    }

    /// One `@Track` field of the owned object changed: only the elements reading it.
    pub fn notify_tracked_object_property_has_changed(&self, field: &str) {
        self.notification_count.set(self.notification_count.get() + 1);
        debug!("{} '{}': tracked field '{}' has changed", self.decorator, self.name, field);
        if let Some(view) = self.owning_view.upgrade() {
            if view.is_active() {
                let dependents = self.dependencies.borrow().get_tracked_property_dependencies(field);
                view.view_property_has_changed(&self.name, dependents);
            } else {
                self.delayed_notification.set(true);
            }
        }
        self.notify_subscribers(|subscriber| subscriber.sync_peer_tracked_property_has_changed(self, field));
    }

    fn notify_subscribers(&self, notify: impl Fn(&dyn PuSubscriber)) {
        let peers: Vec<Rc<PuProperty>> = self.subscriber_refs.borrow().iter().filter_map(Weak::upgrade).collect();
        for peer in peers {
            notify(&*peer);
        }
        let ids: Vec<SubscriberId> = self.subscribers.borrow().iter().copied().collect();
        let Some(rt) = self.rt.upgrade() else {
            return;
        };
        for id in ids {
            match rt.subscriber_manager().get(id) {
                Some(subscriber) => notify(&*subscriber),
                None => error!("{} '{}': unknown subscriber {}", self.decorator, self.name, id),
            }
        }
    }

    /// Sends the change that arrived while the owning view was inactive.
    pub fn perform_delayed_update(&self) {
        if !self.delayed_notification.replace(false) {
            return;
        }
        if let Some(view) = self.owning_view.upgrade() {
            let dependents = self.dependencies.borrow().get_all_property_dependencies();
            view.view_property_has_changed(&self.name, dependents);
        }
    }

    // endregion

    // region subscribers

    /// Subscribes a [PuSubscriber] registered with the subscriber manager.
    pub fn add_subscriber(&self, id: SubscriberId) {
        self.subscribers.borrow_mut().insert(id);
    }

    pub(crate) fn add_subscriber_ref(&self, peer: &Rc<PuProperty>) {
        self.subscriber_refs.borrow_mut().push(Rc::downgrade(peer));
    }

    pub fn remove_subscriber(&self, id: SubscriberId) {
        self.subscribers.borrow_mut().remove(&id);
        self.subscriber_refs.borrow_mut().retain(|peer| peer.upgrade().is_some_and(|peer| peer.id != id));
    }

    pub fn number_of_subscribers(&self) -> usize {
        let peers = self.subscriber_refs.borrow().iter().filter(|peer| peer.strong_count() > 0).count();
        self.subscribers.borrow().len() + peers
    }

    // endregion

    // region dependencies

    pub fn dependent_elmt_ids(&self) -> BTreeSet<ElmtId> {
        self.dependencies.borrow().get_all_property_dependencies()
    }

    pub fn tracked_dependent_elmt_ids(&self, field: &str) -> BTreeSet<ElmtId> {
        self.dependencies.borrow().get_tracked_property_dependencies(field)
    }

    pub fn purge_dependency_on_elmt_id(&self, id: ElmtId) {
        self.dependencies.borrow_mut().purge(id);
    }

    pub fn dump_dependencies(&self) -> String {
        self.dependencies.borrow().dump()
    }

    // endregion

    /// Unsubscribes from the source and the registry and releases the owned value.
    pub fn about_to_be_deleted(&self) {
        if let Some(source) = self.source.borrow_mut().take() {
            source.remove_subscriber(self.id);
        }
        if let Some(rt) = self.rt.upgrade() {
            rt.subscriber_manager().delete(self.id);
        }
        ObservedObject::remove_owning_property(&self.value.borrow(), self.id);
        self.dependencies.borrow_mut().clear();
        self.subscribers.borrow_mut().clear();
        self.subscriber_refs.borrow_mut().clear();
        debug!("{} '{}' deleted", self.decorator, self.name);
    }
}

impl PuSubscriber for PuProperty {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn describe(&self) -> String {
        format!("{} '{}'", self.decorator, self.name)
    }

    fn on_tracked_object_property_has_changed(&self, field: &str) {
        self.notify_tracked_object_property_has_changed(field);
    }

    fn on_tracked_object_property_compat_mode_has_changed(&self, _field: &str) {
        self.notify_property_has_changed_pu();
    }

    fn sync_peer_has_changed(&self, source: &PuProperty) {
        match self.kind {
            PropertyKind::Link => {
                // the change is this link's own write coming back from the source
                if !self.change_notification_is_ongoing.get() {
                    self.notify_property_has_changed_pu();
                }
            }
            PropertyKind::Prop => {
                let copy = self.copy_from_source(&source.get_unmonitored());
                if self.set_value_internal(copy) {
                    self.notify_property_has_changed_pu();
                }
            }
            PropertyKind::State | PropertyKind::ObjectLink => {}
        }
    }

    fn sync_peer_tracked_property_has_changed(&self, source: &PuProperty, field: &str) {
        match self.kind {
            PropertyKind::Link => {
                if !self.change_notification_is_ongoing.get() {
                    self.notify_tracked_object_property_has_changed(field);
                }
            }
            PropertyKind::Prop => self.sync_peer_has_changed(source),
            PropertyKind::State | PropertyKind::ObjectLink => {}
        }
    }
}
