//! The V2 dependency graph and the update pass driving `@Computed`, `@Monitor`,
//! persistence and UI re-render.
//!
//! A dependency is recorded when a proxied property is read while a bind id is on top of
//! the rendering stack ([ObserveV2::add_ref]). It is stored twice: on the target, keyed
//! by property (who to notify), and in `id2targets`, keyed by bind id (what to clean up).
//! A change ([ObserveV2::fire_change]) sorts the dependent ids into one pending set per
//! id range and schedules a single deferred update pass for the whole burst.

pub(crate) mod meta;
mod owner;
pub(crate) mod scheduler;
mod update;

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write;
use std::rc::Rc;
use log::{debug, trace};
use crate::bind_id::{BindId, BindIdAllocator, BindKind};
use crate::config::RuntimeConfig;
use crate::error::{Result, StateError};
use crate::monitor::MonitorV2;
use crate::value::{ObjectRef, TargetId, WeakObjectRef};
use scheduler::{Task, TaskQueue};

pub use meta::PropKey;
pub(crate) use meta::TargetMeta;
pub use owner::ReactiveOwner;

/// Number of ids waiting in each pending set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingCounts {
    pub elmts: usize,
    pub computed: usize,
    pub monitors: usize,
    pub persistence: usize,
}

pub struct ObserveV2 {
    id_refs_threshold: usize,
    cleanup_threshold: usize,
    queue: Rc<TaskQueue>,
    ids: BindIdAllocator,
    id2cmp: RefCell<HashMap<BindId, ReactiveOwner>>,
    id2targets: RefCell<HashMap<BindId, HashMap<TargetId, WeakObjectRef>>>,
    /// Bind ids currently rendering or evaluating, innermost last.
    stack: RefCell<Vec<(BindId, Option<ReactiveOwner>)>>,
    elmt_ids_changed: RefCell<BTreeSet<BindId>>,
    computed_props_changed: RefCell<BTreeSet<BindId>>,
    monitor_ids_changed: RefCell<BTreeSet<BindId>>,
    persistence_changed: RefCell<BTreeSet<BindId>>,
    monitor_fns_to_run: RefCell<BTreeMap<BindId, Rc<MonitorV2>>>,
    /// An update pass is scheduled or running.
    start_dirty: Cell<bool>,
    disabled: Cell<usize>,
    computing: Cell<usize>,
    clear_binding_count: Cell<usize>,
    cleanup_scheduled: Cell<bool>,
}

impl ObserveV2 {
    pub(crate) fn new(config: &RuntimeConfig, queue: Rc<TaskQueue>) -> Self {
        ObserveV2 {
            id_refs_threshold: config.id_refs_threshold,
            cleanup_threshold: config.cleanup_threshold,
            queue,
            ids: BindIdAllocator::new(),
            id2cmp: RefCell::new(HashMap::new()),
            id2targets: RefCell::new(HashMap::new()),
            stack: RefCell::new(Vec::new()),
            elmt_ids_changed: RefCell::new(BTreeSet::new()),
            computed_props_changed: RefCell::new(BTreeSet::new()),
            monitor_ids_changed: RefCell::new(BTreeSet::new()),
            persistence_changed: RefCell::new(BTreeSet::new()),
            monitor_fns_to_run: RefCell::new(BTreeMap::new()),
            start_dirty: Cell::new(false),
            disabled: Cell::new(0),
            computing: Cell::new(0),
            clear_binding_count: Cell::new(0),
            cleanup_scheduled: Cell::new(false),
        }
    }

    pub(crate) fn next_computed_id(&self) -> BindId {
        self.ids.next_computed()
    }

    pub(crate) fn next_watch_id(&self) -> BindId {
        self.ids.next_watch()
    }

    pub(crate) fn next_persistence_id(&self) -> BindId {
        self.ids.next_persistence()
    }

    // region recording

    /// Makes `id` the receiver of dependencies recorded from now on. With `clear`, the
    /// dependencies `id` recorded in earlier passes are dropped first.
    pub fn start_record_dependencies(&self, id: BindId, owner: ReactiveOwner, clear: bool) {
        if clear {
            self.clear_binding(id);
        }
        self.stack.borrow_mut().push((id, Some(owner)));
    }

    pub fn stop_record_dependencies(&self) {
        self.stack.borrow_mut().pop();
    }

    /// Runs `f` with `id` recording (after clearing its old dependencies).
    pub fn record_dependencies<T>(&self, id: BindId, owner: ReactiveOwner, f: impl FnOnce() -> T) -> T {
        self.start_record_dependencies(id, owner, true);
        let result = f();
        self.stop_record_dependencies();
        result
    }

    /// Runs `f` while reading any observed state is an application error: a V1 parent
    /// evaluating the parameters of a V2 child.
    pub fn with_illegal_v1_access_guard<T>(&self, f: impl FnOnce() -> T) -> T {
        self.stack.borrow_mut().push((BindId::ILLEGAL_V1V2_ACCESS, None));
        let result = f();
        self.stack.borrow_mut().pop();
        result
    }

    pub fn is_illegal_access_scope(&self) -> bool {
        self.current_bind_id() == Some(BindId::ILLEGAL_V1V2_ACCESS)
    }

    pub fn current_bind_id(&self) -> Option<BindId> {
        self.stack.borrow().last().map(|(id, _)| *id)
    }

    /// Runs `f` with dependency recording and change notification switched off.
    pub fn execute_unobserved<T>(&self, f: impl FnOnce() -> T) -> T {
        self.disabled.set(self.disabled.get() + 1);
        let result = f();
        self.disabled.set(self.disabled.get() - 1);
        result
    }

    pub(crate) fn enter_computed(&self) {
        self.computing.set(self.computing.get() + 1);
    }

    pub(crate) fn leave_computed(&self) {
        self.computing.set(self.computing.get() - 1);
    }

    // endregion

    /// Records that the bind id on top of the stack reads `key` of `target`.
    pub fn add_ref(&self, target: &ObjectRef, key: PropKey) -> Result<()> {
        if self.disabled.get() > 0 {
            return Ok(());
        }
        let (id, owner) = match self.stack.borrow().last() {
            Some((id, owner)) => (*id, owner.clone()),
            None => return Ok(()),
        };
        if id == BindId::ILLEGAL_V1V2_ACCESS {
            return Err(StateError::IllegalV1V2Access { property: key.to_string() });
        }
        trace!("add_ref: {} reads target {:?} '{}'", id, target.id(), key);
        target.meta().borrow_mut().add(key, id, self.id_refs_threshold);
        self.id2targets.borrow_mut()
            .entry(id)
            .or_default()
            .entry(target.id())
            .or_insert_with(|| target.downgrade());
        if let Some(owner) = owner {
            self.id2cmp.borrow_mut().entry(id).or_insert(owner);
        }
        Ok(())
    }

    /// Marks every bind id depending on `key` of `target` dirty and schedules an update
    /// pass if none is pending.
    pub fn fire_change(&self, target: &ObjectRef, key: PropKey) -> Result<()> {
        if target.meta().borrow().is_empty() || self.disabled.get() > 0 {
            return Ok(());
        }
        if self.computing.get() > 0 {
            return Err(StateError::MutationInComputed { property: key.to_string() });
        }
        let dependents = target.meta().borrow().dependents(&key);
        if dependents.is_empty() {
            return Ok(());
        }
        trace!("fire_change: target {:?} '{}' -> {:?}", target.id(), key, dependents);
        let current = self.current_bind_id();
        let mut any = false;
        for id in dependents {
            // a bind id does not notify itself while it is being evaluated
            if Some(id) == current {
                continue;
            }
            let pending = match id.kind() {
                BindKind::Element => &self.elmt_ids_changed,
                BindKind::Computed => &self.computed_props_changed,
                BindKind::Monitor => &self.monitor_ids_changed,
                BindKind::Persistence => &self.persistence_changed,
                BindKind::IllegalAccessSentinel => continue,
            };
            pending.borrow_mut().insert(id);
            any = true;
        }
        if any && !self.start_dirty.get() {
            self.start_dirty.set(true);
            debug!("fire_change: scheduling update pass");
            self.queue.schedule_microtask(Task::UpdateDirty);
        }
        Ok(())
    }

    /// Removes every dependency of `id` from the targets it read and from the reverse map.
    pub fn clear_binding(&self, id: BindId) {
        self.clear_binding_internal(id);
        let count = self.clear_binding_count.get() + 1;
        if count >= self.cleanup_threshold && !self.cleanup_scheduled.get() {
            self.clear_binding_count.set(0);
            self.cleanup_scheduled.set(true);
            self.queue.schedule_idle(Task::CleanUpDeadReferences);
        } else {
            self.clear_binding_count.set(count);
        }
    }

    fn clear_binding_internal(&self, id: BindId) {
        let targets = self.id2targets.borrow_mut().remove(&id);
        for target in targets.into_iter().flat_map(|targets| targets.into_values()) {
            if let Some(target) = target.upgrade() {
                target.meta().borrow_mut().remove_id(id);
            }
        }
        self.id2cmp.borrow_mut().remove(&id);
    }

    /// Drops bindings whose owner is gone and reverse entries of collected targets.
    pub fn clean_up_dead_references(&self) {
        self.cleanup_scheduled.set(false);
        let dead: Vec<BindId> = self.id2cmp.borrow()
            .iter()
            .filter(|(_, owner)| !owner.is_alive())
            .map(|(id, _)| *id)
            .collect();
        for id in &dead {
            self.clear_binding_internal(*id);
        }
        let mut pruned_targets = 0;
        self.id2targets.borrow_mut().retain(|_, targets| {
            let before = targets.len();
            targets.retain(|_, target| target.is_alive());
            pruned_targets += before - targets.len();
            !targets.is_empty()
        });
        debug!("clean_up_dead_references: {} dead owners, {} dead targets", dead.len(), pruned_targets);
    }

    // region introspection

    /// Bind ids depending on `key` of `target`.
    pub fn dependents(&self, target: &ObjectRef, key: &PropKey) -> Vec<BindId> {
        target.meta().borrow().dependents(key)
    }

    /// Whether `id` has an entry in the reverse map or the owner map.
    pub fn has_bindings(&self, id: BindId) -> bool {
        self.id2targets.borrow().contains_key(&id) || self.id2cmp.borrow().contains_key(&id)
    }

    /// Whether any property of `target` still lists `id`.
    pub fn target_references(&self, target: &ObjectRef, id: BindId) -> bool {
        target.meta().borrow().contains_id(id)
    }

    /// Whether `target` keeps the per-bind-id property index (see
    /// [RuntimeConfig::id_refs_threshold](crate::RuntimeConfig::id_refs_threshold)).
    pub fn uses_id_index(&self, target: &ObjectRef) -> bool {
        target.meta().borrow().uses_id_refs()
    }

    /// Properties of `target` with at least one dependent.
    pub fn observed_keys(&self, target: &ObjectRef) -> Vec<PropKey> {
        target.meta().borrow().observed_keys()
    }

    pub fn owner_of(&self, id: BindId) -> Option<ReactiveOwner> {
        self.id2cmp.borrow().get(&id).cloned()
    }

    pub fn pending_counts(&self) -> PendingCounts {
        PendingCounts {
            elmts: self.elmt_ids_changed.borrow().len(),
            computed: self.computed_props_changed.borrow().len(),
            monitors: self.monitor_ids_changed.borrow().len(),
            persistence: self.persistence_changed.borrow().len(),
        }
    }

    pub fn is_update_scheduled(&self) -> bool {
        self.start_dirty.get()
    }

    pub fn dump_bindings(&self) -> String {
        let mut out = String::new();
        let id2targets = self.id2targets.borrow();
        let mut ids: Vec<_> = id2targets.keys().copied().collect();
        ids.sort();
        for id in ids {
            let owner = self.owner_of(id).map_or("-".to_string(), |o| o.describe());
            let _ = writeln!(out, "{} ({:?}) owner {} reads {} target(s)", id, id.kind(), owner, id2targets[&id].len());
        }
        out
    }

    // endregion
}
