use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter, Write};
use std::rc::{Rc, Weak};
use log::debug;
use crate::pu::PuProperty;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(pub u32);

impl Display for SubscriberId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receives V1 change notifications. Every callback defaults to doing nothing.
pub trait PuSubscriber {
    fn id(&self) -> SubscriberId;

    fn describe(&self) -> String {
        format!("subscriber {}", self.id())
    }

    /// A `@Track` field of an owned object changed.
    fn on_tracked_object_property_has_changed(&self, _field: &str) {}

    /// A field of an owned object without `@Track` fields changed; the object counts as
    /// changed as a whole.
    fn on_tracked_object_property_compat_mode_has_changed(&self, _field: &str) {}

    /// The property this one is synced to changed.
    fn sync_peer_has_changed(&self, _source: &PuProperty) {}

    fn sync_peer_tracked_property_has_changed(&self, _source: &PuProperty, _field: &str) {}
}

/// Registry from subscriber id to (weakly held) subscriber.
pub struct SubscriberManager {
    next_id: Cell<u32>,
    subscribers: RefCell<BTreeMap<SubscriberId, Weak<dyn PuSubscriber>>>,
}

impl SubscriberManager {
    pub fn new() -> Self {
        SubscriberManager {
            next_id: Cell::new(0),
            subscribers: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn make_id(&self) -> SubscriberId {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        SubscriberId(id)
    }

    /// Returns `false` if the id was taken already.
    pub fn add(&self, subscriber: &Rc<dyn PuSubscriber>) -> bool {
        let id = subscriber.id();
        let mut subscribers = self.subscribers.borrow_mut();
        if subscribers.get(&id).is_some_and(|s| s.strong_count() > 0) {
            debug!("SubscriberManager: id {} already registered", id);
            return false;
        }
        subscribers.insert(id, Rc::downgrade(subscriber));
        true
    }

    pub fn delete(&self, id: SubscriberId) -> bool {
        self.subscribers.borrow_mut().remove(&id).is_some()
    }

    pub fn get(&self, id: SubscriberId) -> Option<Rc<dyn PuSubscriber>> {
        self.subscribers.borrow().get(&id).and_then(Weak::upgrade)
    }

    pub fn has(&self, id: SubscriberId) -> bool {
        self.get(id).is_some()
    }

    pub fn num_subscribers(&self) -> usize {
        self.subscribers.borrow().len()
    }

    pub fn dump_subscriber_info(&self) -> String {
        let mut out = String::new();
        for (id, subscriber) in self.subscribers.borrow().iter() {
            let description = subscriber.upgrade().map_or("<dropped>".to_string(), |s| s.describe());
            let _ = writeln!(out, "{}: {}", id, description);
        }
        out
    }
}

impl Default for SubscriberManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for SubscriberManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberManager")
            .field("next_id", &self.next_id.get())
            .field("ids", &self.subscribers.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}
