use std::cell::RefCell;
use std::collections::HashMap;
use crate::value::{ObjectRef, TargetId, WeakObjectRef};

/// Side table of targets wrapped through `make_observed`, one entry per target.
///
/// Such targets carry no decorator metadata of their own, so this is how a target
/// reached again later (through decorated state, or a second `make_observed`) is known
/// to be observed as a whole.
#[derive(Debug, Default)]
pub(crate) struct RefInfo {
    entries: RefCell<HashMap<TargetId, WeakObjectRef>>,
}

impl RefInfo {
    pub(crate) fn register(&self, target: &ObjectRef) -> bool {
        let mut entries = self.entries.borrow_mut();
        if entries.get(&target.id()).is_some_and(WeakObjectRef::is_alive) {
            return false;
        }
        entries.insert(target.id(), target.downgrade());
        true
    }

    pub(crate) fn contains(&self, target: &ObjectRef) -> bool {
        self.entries.borrow().contains_key(&target.id())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Drops entries of collected targets; returns how many.
    pub(crate) fn prune(&self) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|_, target| target.is_alive());
        before - entries.len()
    }
}
