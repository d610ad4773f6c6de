use std::cmp::Ordering;
use crate::error::{Result, StateError};
use crate::observe::PropKey;
use crate::value::{Container, ContainerKind, Value};
use super::Observed;

/// Array operations on an observed array.
///
/// Reading an element depends on that index and on the array's length (reordering only
/// fires the length). Every call that changes length or order fires the length.
#[derive(Debug, Clone)]
pub struct ArrayProxy {
    observed: Observed,
}

impl ArrayProxy {
    pub(crate) fn new(observed: Observed) -> Self {
        ArrayProxy { observed }
    }

    pub fn observed(&self) -> &Observed {
        &self.observed
    }

    fn items<R>(&self, f: impl FnOnce(&Vec<Value>) -> R) -> Result<R> {
        match &*self.observed.target().borrow() {
            Container::Array(items) => Ok(f(items)),
            other => Err(StateError::WrongContainer { expected: ContainerKind::Array, found: other.kind() }),
        }
    }

    fn items_mut<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> Result<R> {
        match &mut *self.observed.target().borrow_mut() {
            Container::Array(items) => Ok(f(items)),
            other => Err(StateError::WrongContainer { expected: ContainerKind::Array, found: other.kind() }),
        }
    }

    /// Runs a structural mutation and fires the length.
    fn mutate<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> Result<R> {
        let result = self.items_mut(f)?;
        self.observed.fire(PropKey::Length)?;
        Ok(result)
    }

    pub fn len(&self) -> Result<usize> {
        let len = self.items(Vec::len)?;
        self.observed.read(PropKey::Length)?;
        Ok(len)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// `Undefined` past the end.
    pub fn get(&self, index: usize) -> Result<Value> {
        let value = self.items(|items| items.get(index).cloned().unwrap_or(Value::Undefined))?;
        self.observed.read(PropKey::Index(index))?;
        self.observed.read(PropKey::Length)?;
        Ok(self.observed.wrap(value))
    }

    /// Writes one element, padding with `Undefined` when writing past the end.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        let value = value.into().into_stored();
        let (changed, grew) = self.items_mut(|items| {
            if index < items.len() {
                if items[index].same_value(&value) {
                    return (false, false);
                }
                items[index] = value;
                (true, false)
            } else {
                items.resize(index, Value::Undefined);
                items.push(value);
                (true, true)
            }
        })?;
        if changed {
            self.observed.fire(PropKey::Index(index))?;
        }
        if grew {
            self.observed.fire(PropKey::Length)?;
        }
        Ok(())
    }

    /// Returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> Result<usize> {
        let value = value.into().into_stored();
        self.mutate(|items| {
            items.push(value);
            items.len()
        })
    }

    pub fn pop(&self) -> Result<Value> {
        let value = self.mutate(Vec::pop)?;
        Ok(self.observed.wrap(value.unwrap_or(Value::Undefined)))
    }

    pub fn shift(&self) -> Result<Value> {
        let value = self.mutate(|items| (!items.is_empty()).then(|| items.remove(0)))?;
        Ok(self.observed.wrap(value.unwrap_or(Value::Undefined)))
    }

    /// Inserts at the front; returns the new length.
    pub fn unshift<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Result<usize> {
        let values: Vec<Value> = values.into_iter().map(|v| v.into().into_stored()).collect();
        self.mutate(|items| {
            items.splice(0..0, values);
            items.len()
        })
    }

    /// Removes `delete_count` elements from `start` and inserts `insert` there. Bounds are
    /// clamped to the array. Returns the removed elements.
    pub fn splice<V: Into<Value>>(&self, start: usize, delete_count: usize, insert: impl IntoIterator<Item = V>) -> Result<Vec<Value>> {
        let insert: Vec<Value> = insert.into_iter().map(|v| v.into().into_stored()).collect();
        let removed = self.mutate(|items| {
            let start = start.min(items.len());
            let end = start + delete_count.min(items.len() - start);
            items.splice(start..end, insert).collect::<Vec<_>>()
        })?;
        Ok(removed.into_iter().map(|v| self.observed.wrap(v)).collect())
    }

    /// Truncates to `len` elements.
    pub fn shrink_to(&self, len: usize) -> Result<()> {
        self.mutate(|items| items.truncate(len))
    }

    /// Pads with `Undefined` up to `len` elements.
    pub fn extend_to(&self, len: usize) -> Result<()> {
        self.mutate(|items| {
            if items.len() < len {
                items.resize(len, Value::Undefined);
            }
        })
    }

    /// Copies `start..end` to `target` within the array, without changing its length.
    pub fn copy_within(&self, target: usize, start: usize, end: usize) -> Result<()> {
        self.mutate(|items| {
            let len = items.len();
            let (to, from, end) = (target.min(len), start.min(len), end.min(len));
            let count = end.saturating_sub(from).min(len - to);
            let copied: Vec<Value> = items[from..from + count].to_vec();
            items[to..to + count].clone_from_slice(&copied);
        })
    }

    pub fn fill(&self, value: impl Into<Value>, start: usize, end: usize) -> Result<()> {
        let value = value.into().into_stored();
        self.mutate(|items| {
            let end = end.min(items.len());
            let start = start.min(end);
            items[start..end].fill(value);
        })
    }

    pub fn reverse(&self) -> Result<()> {
        self.mutate(|items| items.reverse())
    }

    /// Sorts with `compare` seeing the raw elements. The array keeps its old order until
    /// the sort is done, so `compare` may read it.
    pub fn sort_by(&self, mut compare: impl FnMut(&Value, &Value) -> Ordering) -> Result<()> {
        let mut items = self.items(Clone::clone)?;
        items.sort_by(&mut compare);
        self.mutate(|slot| *slot = items)
    }

    /// Visits every element. Depends on the length and on each visited index.
    pub fn for_each(&self, mut f: impl FnMut(Value, usize) -> Result<()>) -> Result<()> {
        self.observed.read(PropKey::Length)?;
        let items = self.items(Clone::clone)?;
        for (index, value) in items.into_iter().enumerate() {
            self.observed.read(PropKey::Index(index))?;
            f(self.observed.wrap(value), index)?;
        }
        Ok(())
    }

    pub fn to_vec(&self) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        self.for_each(|value, _| {
            out.push(value);
            Ok(())
        })?;
        Ok(out)
    }

    pub fn index_of(&self, needle: &Value) -> Result<Option<usize>> {
        let mut found = None;
        self.for_each(|value, index| {
            if found.is_none() && value.same_value(needle) {
                found = Some(index);
            }
            Ok(())
        })?;
        Ok(found)
    }
}
