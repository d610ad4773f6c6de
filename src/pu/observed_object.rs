use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};
use log::{debug, error};
use crate::error::{Result, StateError};
use crate::observe::PropKey;
use crate::proxy::{Observed, Tracker};
use crate::pu::{PuProperty, SubscriberId};
use crate::runtime::Runtime;
use crate::value::{ObjectRef, Value};

/// V1 observation state of one container: the properties owning it, and the property
/// whose `get` handed it out last (to attribute `@Track` field reads).
pub(crate) struct PuHandler {
    rt: Weak<Runtime>,
    owning_properties: RefCell<BTreeSet<SubscriberId>>,
    read_cb: RefCell<Option<Weak<PuProperty>>>,
}

impl PuHandler {
    fn new(rt: Weak<Runtime>) -> Rc<PuHandler> {
        Rc::new(PuHandler {
            rt,
            owning_properties: RefCell::new(BTreeSet::new()),
            read_cb: RefCell::new(None),
        })
    }

    /// A handler for a copy of the container: same runtime, no owners yet.
    pub(crate) fn fresh(&self) -> Rc<PuHandler> {
        PuHandler::new(self.rt.clone())
    }

    pub(crate) fn runtime(&self) -> Option<Rc<Runtime>> {
        self.rt.upgrade()
    }

    pub(crate) fn record_read(&self, target: &ObjectRef, key: &PropKey) -> Result<()> {
        let Some(rt) = self.rt.upgrade() else {
            return Ok(());
        };
        if rt.observe().is_illegal_access_scope() {
            return Err(StateError::IllegalV1V2Access { property: key.to_string() });
        }
        if let PropKey::Field(field) = key {
            if target.class().is_some_and(|class| class.is_tracked(field)) {
                let property = self.read_cb.borrow().as_ref().and_then(Weak::upgrade);
                if let Some(property) = property {
                    property.on_object_property_read(field);
                }
            }
        }
        Ok(())
    }

    /// Tells every owning property that `key` of `target` changed. With `@Track` fields
    /// on the type only those fields count; otherwise any change counts for the object
    /// as a whole.
    pub(crate) fn notify_property_changed(&self, target: &ObjectRef, key: &PropKey) {
        let Some(rt) = self.rt.upgrade() else {
            return;
        };
        let field = key.to_string();
        let owners: Vec<SubscriberId> = self.owning_properties.borrow().iter().copied().collect();
        for id in owners {
            let Some(subscriber) = rt.subscriber_manager().get(id) else {
                error!("ObservedObject {:?}: unknown owning property {}", target, id);
                continue;
            };
            match target.class() {
                Some(class) if class.has_tracked_fields() => {
                    if class.is_tracked(&field) {
                        subscriber.on_tracked_object_property_has_changed(&field);
                    } else {
                        debug!("ObservedObject {:?}: '{}' is not @Track, change not observed", target, field);
                    }
                }
                _ => subscriber.on_tracked_object_property_compat_mode_has_changed(&field),
            }
        }
    }
}

/// Operations on V1 observed objects (`@Observed` instances and containers held by V1
/// state). Observation is one level deep.
#[derive(Debug)]
pub struct ObservedObject;

impl ObservedObject {
    /// Makes the container behind `value` observed (once per container) and adds
    /// `owning_property` as an owner. Primitives are returned unchanged.
    pub fn create_new(rt: &Rc<Runtime>, value: Value, owning_property: Option<SubscriberId>) -> Value {
        let Some(target) = value.target().cloned() else {
            return value;
        };
        let handler = match target.pu_handler() {
            Some(handler) => handler,
            None => {
                let handler = PuHandler::new(rt.weak());
                *target.0.pu_handler.borrow_mut() = Some(handler.clone());
                handler
            }
        };
        if let Some(id) = owning_property {
            handler.owning_properties.borrow_mut().insert(id);
        }
        Value::Observed(Observed::new(target, Tracker::Pu(handler)))
    }

    pub fn is_observed_object(value: &Value) -> bool {
        value.target().is_some_and(|target| target.pu_handler().is_some())
    }

    /// Returns `false` if `value` is not an observed object.
    pub fn add_owning_property(value: &Value, id: SubscriberId) -> bool {
        match value.target().and_then(ObjectRef::pu_handler) {
            Some(handler) => {
                handler.owning_properties.borrow_mut().insert(id);
                true
            }
            None => false,
        }
    }

    pub fn remove_owning_property(value: &Value, id: SubscriberId) {
        if let Some(handler) = value.target().and_then(ObjectRef::pu_handler) {
            handler.owning_properties.borrow_mut().remove(&id);
            let mut read_cb = handler.read_cb.borrow_mut();
            if read_cb.as_ref().and_then(Weak::upgrade).is_some_and(|p| p.id() == id) {
                *read_cb = None;
            }
        }
    }

    pub fn owning_properties(value: &Value) -> Vec<SubscriberId> {
        value.target()
            .and_then(ObjectRef::pu_handler)
            .map(|handler| handler.owning_properties.borrow().iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn register_property_read_cb(value: &Value, property: Weak<PuProperty>) {
        if let Some(handler) = value.target().and_then(ObjectRef::pu_handler) {
            *handler.read_cb.borrow_mut() = Some(property);
        }
    }
}
