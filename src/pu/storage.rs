use std::cell::RefCell;
use std::rc::{Rc, Weak};
use indexmap::IndexMap;
use log::{debug, warn};
use crate::error::{Result, StateError};
use crate::pu::{PuProperty, ViewPU};
use crate::runtime::Runtime;
use crate::value::Value;

/// Named state shared between views: each entry is a `@State`-like property that views
/// link to (two-way) or take props from (one-way).
#[derive(Debug)]
pub struct LocalStorage {
    rt: Weak<Runtime>,
    storage: RefCell<IndexMap<Rc<str>, Rc<PuProperty>>>,
}

/// The application-wide storage is a [LocalStorage] owned by the runtime.
pub type AppStorage = LocalStorage;

impl LocalStorage {
    pub fn new(rt: &Rc<Runtime>) -> Rc<LocalStorage> {
        Self::new_with(Rc::downgrade(rt))
    }

    pub(crate) fn new_with(rt: Weak<Runtime>) -> Rc<LocalStorage> {
        Rc::new(LocalStorage { rt, storage: RefCell::new(IndexMap::new()) })
    }

    fn runtime(&self) -> Result<Rc<Runtime>> {
        self.rt.upgrade().ok_or(StateError::RuntimeGone)
    }

    pub fn has(&self, key: &str) -> bool {
        self.storage.borrow().contains_key(key)
    }

    /// The current value, without recording a dependency.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.storage_property(key).map(|p| p.get_unmonitored())
    }

    /// Updates an existing entry; `false` if there is none.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<bool> {
        match self.storage_property(key) {
            Some(property) => {
                property.set(value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn set_or_create(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        match self.storage_property(key) {
            Some(property) => property.set(value),
            None => self.create(key, value).map(|_| ()),
        }
    }

    fn create(&self, key: &str, value: Value) -> Result<Rc<PuProperty>> {
        let rt = self.runtime()?;
        let property = PuProperty::new_state(&rt, "@StorageEntry", key, value, None)?;
        self.storage.borrow_mut().insert(Rc::from(key), property.clone());
        debug!("storage: created '{}'", key);
        Ok(property)
    }

    pub fn keys(&self) -> Vec<String> {
        self.storage.borrow().keys().map(|k| k.to_string()).collect()
    }

    pub fn size(&self) -> usize {
        self.storage.borrow().len()
    }

    /// The property backing `key`.
    pub fn storage_property(&self, key: &str) -> Option<Rc<PuProperty>> {
        self.storage.borrow().get(key).cloned()
    }

    /// A two-way link to an existing entry.
    pub fn link(&self, key: &str) -> Result<Option<Rc<PuProperty>>> {
        self.link_for(key, key, None, "@StorageLink")
    }

    /// A two-way link, creating the entry with `default` first if needed.
    pub fn set_and_link(&self, key: &str, default: impl Into<Value>) -> Result<Rc<PuProperty>> {
        self.set_and_link_for(key, default.into(), key, None, "@StorageLink")
    }

    /// A one-way copy of an existing entry.
    pub fn prop(&self, key: &str) -> Result<Option<Rc<PuProperty>>> {
        self.prop_for(key, key, None, "@StorageProp")
    }

    pub fn set_and_prop(&self, key: &str, default: impl Into<Value>) -> Result<Rc<PuProperty>> {
        self.set_and_prop_for(key, default.into(), key, None, "@StorageProp")
    }

    pub(crate) fn link_for(&self, key: &str, name: &str, view: Option<&Rc<ViewPU>>, decorator: &'static str) -> Result<Option<Rc<PuProperty>>> {
        let Some(source) = self.storage_property(key) else {
            return Ok(None);
        };
        let rt = self.runtime()?;
        Ok(Some(PuProperty::new_link(&rt, decorator, name, &source, view)))
    }

    pub(crate) fn set_and_link_for(&self, key: &str, default: Value, name: &str, view: Option<&Rc<ViewPU>>, decorator: &'static str) -> Result<Rc<PuProperty>> {
        let source = match self.storage_property(key) {
            Some(source) => source,
            None => self.create(key, default)?,
        };
        let rt = self.runtime()?;
        Ok(PuProperty::new_link(&rt, decorator, name, &source, view))
    }

    pub(crate) fn prop_for(&self, key: &str, name: &str, view: Option<&Rc<ViewPU>>, decorator: &'static str) -> Result<Option<Rc<PuProperty>>> {
        let Some(source) = self.storage_property(key) else {
            return Ok(None);
        };
        let rt = self.runtime()?;
        PuProperty::new_prop(&rt, decorator, name, Some(&source), Value::Undefined, view).map(Some)
    }

    pub(crate) fn set_and_prop_for(&self, key: &str, default: Value, name: &str, view: Option<&Rc<ViewPU>>, decorator: &'static str) -> Result<Rc<PuProperty>> {
        let source = match self.storage_property(key) {
            Some(source) => source,
            None => self.create(key, default)?,
        };
        let rt = self.runtime()?;
        PuProperty::new_prop(&rt, decorator, name, Some(&source), Value::Undefined, view)
    }

    /// Removes an entry nothing links to any more. Returns `false` (and keeps the entry)
    /// while links or props still subscribe to it.
    pub fn delete(&self, key: &str) -> bool {
        let Some(property) = self.storage_property(key) else {
            return false;
        };
        let subscribers = property.number_of_subscribers();
        if subscribers > 0 {
            warn!("storage: can not delete '{}', it still has {} subscriber(s)", key, subscribers);
            return false;
        }
        self.storage.borrow_mut().shift_remove(key);
        property.about_to_be_deleted();
        debug!("storage: deleted '{}'", key);
        true
    }

    /// Removes every entry, or nothing if any entry is still subscribed to.
    pub fn clear(&self) -> bool {
        let subscribed: Vec<String> = self.storage.borrow()
            .iter()
            .filter(|(_, property)| property.number_of_subscribers() > 0)
            .map(|(key, _)| key.to_string())
            .collect();
        if !subscribed.is_empty() {
            warn!("storage: can not clear, {:?} still have subscribers", subscribed);
            return false;
        }
        for key in self.keys() {
            self.delete(&key);
        }
        true
    }
}
