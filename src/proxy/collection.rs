use indexmap::{IndexMap, IndexSet};
use crate::error::{Result, StateError};
use crate::observe::PropKey;
use crate::value::{Container, ContainerKind, Key, Value};
use super::Observed;

/// Map operations on an observed `Map`.
///
/// A lookup of a present key depends on that entry. A lookup of a missing key depends on
/// the size instead, so a later insert invalidates the negative answer. Iteration depends
/// on the size and on the any-entry marker.
#[derive(Debug, Clone)]
pub struct MapProxy {
    observed: Observed,
}

impl MapProxy {
    pub(crate) fn new(observed: Observed) -> Self {
        MapProxy { observed }
    }

    pub fn observed(&self) -> &Observed {
        &self.observed
    }

    fn entries_ref<R>(&self, f: impl FnOnce(&IndexMap<Key, Value>) -> R) -> Result<R> {
        match &*self.observed.target().borrow() {
            Container::Map(entries) => Ok(f(entries)),
            other => Err(StateError::WrongContainer { expected: ContainerKind::Map, found: other.kind() }),
        }
    }

    fn entries_mut<R>(&self, f: impl FnOnce(&mut IndexMap<Key, Value>) -> R) -> Result<R> {
        match &mut *self.observed.target().borrow_mut() {
            Container::Map(entries) => Ok(f(entries)),
            other => Err(StateError::WrongContainer { expected: ContainerKind::Map, found: other.kind() }),
        }
    }

    fn read_key(&self, key: &Key, present: bool) -> Result<()> {
        if present {
            self.observed.read(PropKey::Entry(key.clone()))
        } else {
            self.observed.read(PropKey::Length)
        }
    }

    fn read_all(&self) -> Result<()> {
        self.observed.read(PropKey::Length)?;
        self.observed.read(PropKey::AnyProperty)
    }

    pub fn size(&self) -> Result<usize> {
        let size = self.entries_ref(IndexMap::len)?;
        self.observed.read(PropKey::Length)?;
        Ok(size)
    }

    pub fn get(&self, key: impl Into<Key>) -> Result<Value> {
        let key = key.into();
        let value = self.entries_ref(|entries| entries.get(&key).cloned())?;
        self.read_key(&key, value.is_some())?;
        Ok(self.observed.wrap(value.unwrap_or(Value::Undefined)))
    }

    pub fn has(&self, key: impl Into<Key>) -> Result<bool> {
        let key = key.into();
        let present = self.entries_ref(|entries| entries.contains_key(&key))?;
        self.read_key(&key, present)?;
        Ok(present)
    }

    /// Inserts or replaces an entry. Replacing a value with itself does nothing.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        let value = value.into().into_stored();
        let previous = self.entries_mut(|entries| match entries.get_mut(&key) {
            Some(old) if old.same_value(&value) => Some(false),
            Some(old) => {
                *old = value;
                Some(true)
            }
            None => {
                entries.insert(key.clone(), value);
                None
            }
        })?;
        match previous {
            Some(false) => Ok(()),
            Some(true) => {
                self.observed.fire(PropKey::Entry(key))?;
                self.observed.fire(PropKey::AnyProperty)
            }
            None => {
                self.observed.fire(PropKey::Entry(key))?;
                self.observed.fire(PropKey::Length)
            }
        }
    }

    pub fn delete(&self, key: impl Into<Key>) -> Result<bool> {
        let key = key.into();
        let removed = self.entries_mut(|entries| entries.shift_remove(&key).is_some())?;
        if removed {
            self.observed.fire(PropKey::Entry(key))?;
            self.observed.fire(PropKey::Length)?;
            self.observed.fire(PropKey::AnyProperty)?;
        }
        Ok(removed)
    }

    pub fn clear(&self) -> Result<()> {
        let removed: Vec<Key> = self.entries_mut(|entries| entries.drain(..).map(|(k, _)| k).collect())?;
        if removed.is_empty() {
            return Ok(());
        }
        for key in removed {
            self.observed.fire(PropKey::Entry(key))?;
        }
        self.observed.fire(PropKey::Length)?;
        self.observed.fire(PropKey::AnyProperty)
    }

    pub fn keys(&self) -> Result<Vec<Value>> {
        self.read_all()?;
        let keys = self.entries_ref(|entries| entries.keys().map(Key::to_value).collect::<Vec<_>>())?;
        Ok(keys.into_iter().map(|k| self.observed.wrap(k)).collect())
    }

    pub fn values(&self) -> Result<Vec<Value>> {
        self.read_all()?;
        let values = self.entries_ref(|entries| entries.values().cloned().collect::<Vec<_>>())?;
        Ok(values.into_iter().map(|v| self.observed.wrap(v)).collect())
    }

    pub fn entries(&self) -> Result<Vec<(Value, Value)>> {
        self.read_all()?;
        let entries = self.entries_ref(|entries| entries.iter().map(|(k, v)| (k.to_value(), v.clone())).collect::<Vec<_>>())?;
        Ok(entries.into_iter().map(|(k, v)| (self.observed.wrap(k), self.observed.wrap(v))).collect())
    }

    pub fn for_each(&self, mut f: impl FnMut(Value, Value) -> Result<()>) -> Result<()> {
        for (key, value) in self.entries()? {
            f(value, key)?;
        }
        Ok(())
    }
}

/// Set operations on an observed `Set`, with the same dependency rules as [MapProxy].
#[derive(Debug, Clone)]
pub struct SetProxy {
    observed: Observed,
}

impl SetProxy {
    pub(crate) fn new(observed: Observed) -> Self {
        SetProxy { observed }
    }

    pub fn observed(&self) -> &Observed {
        &self.observed
    }

    fn values_ref<R>(&self, f: impl FnOnce(&IndexSet<Key>) -> R) -> Result<R> {
        match &*self.observed.target().borrow() {
            Container::Set(values) => Ok(f(values)),
            other => Err(StateError::WrongContainer { expected: ContainerKind::Set, found: other.kind() }),
        }
    }

    fn values_mut<R>(&self, f: impl FnOnce(&mut IndexSet<Key>) -> R) -> Result<R> {
        match &mut *self.observed.target().borrow_mut() {
            Container::Set(values) => Ok(f(values)),
            other => Err(StateError::WrongContainer { expected: ContainerKind::Set, found: other.kind() }),
        }
    }

    pub fn size(&self) -> Result<usize> {
        let size = self.values_ref(IndexSet::len)?;
        self.observed.read(PropKey::Length)?;
        Ok(size)
    }

    pub fn has(&self, value: impl Into<Key>) -> Result<bool> {
        let key = value.into();
        let present = self.values_ref(|values| values.contains(&key))?;
        if present {
            self.observed.read(PropKey::Entry(key))?;
        } else {
            self.observed.read(PropKey::Length)?;
        }
        Ok(present)
    }

    /// Adding a present value does nothing.
    pub fn add(&self, value: impl Into<Key>) -> Result<()> {
        let key = value.into();
        let added = self.values_mut(|values| values.insert(key.clone()))?;
        if added {
            self.observed.fire(PropKey::Entry(key))?;
            self.observed.fire(PropKey::Length)?;
        }
        Ok(())
    }

    pub fn delete(&self, value: impl Into<Key>) -> Result<bool> {
        let key = value.into();
        let removed = self.values_mut(|values| values.shift_remove(&key))?;
        if removed {
            self.observed.fire(PropKey::Entry(key))?;
            self.observed.fire(PropKey::Length)?;
            self.observed.fire(PropKey::AnyProperty)?;
        }
        Ok(removed)
    }

    pub fn clear(&self) -> Result<()> {
        let removed: Vec<Key> = self.values_mut(|values| values.drain(..).collect())?;
        if removed.is_empty() {
            return Ok(());
        }
        for key in removed {
            self.observed.fire(PropKey::Entry(key))?;
        }
        self.observed.fire(PropKey::Length)?;
        self.observed.fire(PropKey::AnyProperty)
    }

    pub fn values(&self) -> Result<Vec<Value>> {
        self.observed.read(PropKey::Length)?;
        self.observed.read(PropKey::AnyProperty)?;
        let values = self.values_ref(|values| values.iter().map(Key::to_value).collect::<Vec<_>>())?;
        Ok(values.into_iter().map(|v| self.observed.wrap(v)).collect())
    }

    pub fn for_each(&self, mut f: impl FnMut(Value) -> Result<()>) -> Result<()> {
        for value in self.values()? {
            f(value)?;
        }
        Ok(())
    }
}
