//! `PersistenceV2`: observed containers mirrored to a string key-value backend.
//!
//! A connected value is written as JSON whenever any observed property it was
//! serialized from changes. Saving records dependencies under a persistence
//! [`BindId`], so the scheduler treats it like any other reactive consumer.

mod coder;

pub use coder::{JsonCoder, DATE_MARKER, MAP_MARKER, SET_MARKER};

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};
use log::{debug, warn};
use crate::bind_id::BindId;
use crate::error::{Result, StateError};
use crate::observe::ReactiveOwner;
use crate::proxy::Observed;
use crate::runtime::Runtime;
use crate::value::Value;

/// Where persisted values go. Keys and values are plain strings.
pub trait StorageBackend {
    fn has(&self, key: &str) -> bool;
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn delete(&self, key: &str);
}

impl<T: StorageBackend + ?Sized> StorageBackend for Rc<T> {
    fn has(&self, key: &str) -> bool {
        (**self).has(key)
    }

    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) {
        (**self).delete(key)
    }
}

/// In-memory backend, mostly for tests.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RefCell<BTreeMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }
}

impl StorageBackend for MemoryBackend {
    fn has(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.borrow_mut().insert(key.to_string(), value.to_string());
    }

    fn delete(&self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }
}

struct Connection {
    id: BindId,
    value: Observed,
}

pub struct PersistenceV2 {
    rt: Weak<Runtime>,
    backend: Box<dyn StorageBackend>,
    connections: RefCell<BTreeMap<String, Connection>>,
    keys_by_id: RefCell<HashMap<BindId, String>>,
    self_ref: Weak<PersistenceV2>,
}

impl PersistenceV2 {
    pub fn new(rt: &Rc<Runtime>, backend: impl StorageBackend + 'static) -> Rc<Self> {
        Rc::new_cyclic(|self_ref| PersistenceV2 {
            rt: Rc::downgrade(rt),
            backend: Box::new(backend),
            connections: RefCell::new(BTreeMap::new()),
            keys_by_id: RefCell::new(HashMap::new()),
            self_ref: self_ref.clone(),
        })
    }

    /// Connects `key` to an observed value.
    ///
    /// The stored JSON is loaded if there is any, otherwise `default` is used. Loading
    /// into an instance of a class keeps the class of `default`. Connecting a key
    /// twice returns the same value.
    pub fn connect(&self, key: &str, default: impl Into<Value>) -> Result<Observed> {
        if let Some(connection) = self.connections.borrow().get(key) {
            return Ok(connection.value.clone());
        }
        let rt = self.rt.upgrade().ok_or(StateError::RuntimeGone)?;
        let default = default.into();
        let Some(default_target) = default.target() else {
            return Err(StateError::UnsupportedValue { name: key.to_string(), reason: "only containers can be persisted" });
        };
        let value = match self.backend.get(key) {
            Some(text) => {
                let parsed = match default_target.class() {
                    Some(class) => JsonCoder::parse_to(&text, class)?,
                    None => JsonCoder::parse(&text)?,
                };
                let expected = default_target.kind();
                match parsed.target() {
                    Some(target) if target.kind() == expected => {}
                    Some(target) => return Err(StateError::JsonTypeMismatch { expected: kind_name(expected), found: target.kind().to_string() }),
                    None => return Err(StateError::JsonTypeMismatch { expected: kind_name(expected), found: parsed.type_name().to_string() }),
                }
                debug!("PersistenceV2::connect: loaded '{}'", key);
                parsed
            }
            None => default,
        };
        let observed = match rt.make_observed(value) {
            Value::Observed(observed) => observed,
            other => return Err(StateError::NotObserved(other.type_name())),
        };
        let id = rt.observe().next_persistence_id();
        self.connections.borrow_mut().insert(key.to_string(), Connection { id, value: observed.clone() });
        self.keys_by_id.borrow_mut().insert(id, key.to_string());
        if let Err(err) = self.save(key) {
            self.connections.borrow_mut().remove(key);
            self.keys_by_id.borrow_mut().remove(&id);
            rt.observe().clear_binding(id);
            warn!("PersistenceV2::connect: '{}' not connected: {}", key, err);
            return Err(err);
        }
        Ok(observed)
    }

    /// Serializes the value connected to `key` and writes it to the backend.
    pub fn save(&self, key: &str) -> Result<()> {
        let (id, value) = match self.connections.borrow().get(key) {
            Some(connection) => (connection.id, connection.value.clone()),
            None => {
                warn!("PersistenceV2::save: '{}' is not connected", key);
                return Ok(());
            }
        };
        let rt = self.rt.upgrade().ok_or(StateError::RuntimeGone)?;
        let owner = ReactiveOwner::Persistence(self.self_ref.clone());
        let text = rt.observe().record_dependencies(id, owner, || JsonCoder::stringify(&Value::Observed(value)))?;
        debug!("PersistenceV2::save: '{}' = {}", key, text);
        self.backend.set(key, &text);
        Ok(())
    }

    /// Disconnects `key` and deletes it from the backend.
    pub fn remove(&self, key: &str) {
        let connection = self.connections.borrow_mut().remove(key);
        if let Some(connection) = connection {
            self.keys_by_id.borrow_mut().remove(&connection.id);
            if let Some(rt) = self.rt.upgrade() {
                rt.observe().clear_binding(connection.id);
            }
        }
        self.backend.delete(key);
    }

    pub fn keys(&self) -> Vec<String> {
        self.connections.borrow().keys().cloned().collect()
    }

    pub fn is_connected(&self, key: &str) -> bool {
        self.connections.borrow().contains_key(key)
    }

    pub(crate) fn on_change_observed(&self, id: BindId) -> Result<()> {
        let key = self.keys_by_id.borrow().get(&id).cloned();
        match key {
            Some(key) => self.save(&key),
            None => {
                debug!("PersistenceV2::on_change_observed: {} is no longer connected", id);
                Ok(())
            }
        }
    }
}

fn kind_name(kind: crate::value::ContainerKind) -> &'static str {
    use crate::value::ContainerKind;
    match kind {
        ContainerKind::Object => "object",
        ContainerKind::Array => "array",
        ContainerKind::Map => "Map",
        ContainerKind::Set => "Set",
        ContainerKind::Date => "Date",
    }
}

impl Debug for PersistenceV2 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceV2")
            .field("keys", &self.keys())
            .finish()
    }
}
