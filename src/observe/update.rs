use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use log::{debug, error};
use crate::bind_id::BindId;
use crate::error::Result;
use crate::monitor::MonitorV2;
use crate::pu::ViewPU;
use crate::view_v2::ViewV2;
use super::{ObserveV2, ReactiveOwner};

fn take(pending: &RefCell<BTreeSet<BindId>>) -> BTreeSet<BindId> {
    std::mem::take(&mut *pending.borrow_mut())
}

impl ObserveV2 {
    /// The fixed-point update pass.
    ///
    /// Computed ids, persistence ids and monitor paths are drained (in that order) and the
    /// queued monitor functions run until none of the three has work left. Only then are
    /// the dirty elements re-rendered, and since rendering may change state again the
    /// whole thing repeats until every pending set is empty.
    pub fn update_dirty2(&self) -> Result<()> {
        self.start_dirty.set(true);
        let result = self.update_until_settled();
        self.start_dirty.set(false);
        if result.is_err() {
            // a failed pass must not leave work behind that no later pass is scheduled for
            self.discard_pending();
        }
        result
    }

    fn update_until_settled(&self) -> Result<()> {
        let mut passes = 0;
        loop {
            passes += 1;
            loop {
                let computed = take(&self.computed_props_changed);
                if !computed.is_empty() {
                    self.update_dirty_computed_props(computed)?;
                }
                let persisted = take(&self.persistence_changed);
                if !persisted.is_empty() {
                    self.update_dirty_persistence(persisted)?;
                }
                let monitors = take(&self.monitor_ids_changed);
                if !monitors.is_empty() {
                    self.update_dirty_monitor_paths(monitors)?;
                }
                self.run_queued_monitor_functions()?;
                if self.computed_props_changed.borrow().is_empty()
                    && self.persistence_changed.borrow().is_empty()
                    && self.monitor_ids_changed.borrow().is_empty() {
                    break;
                }
            }
            let elmts = take(&self.elmt_ids_changed);
            if !elmts.is_empty() {
                self.update_ui_nodes(elmts)?;
            }
            let counts = self.pending_counts();
            if counts.elmts + counts.computed + counts.monitors + counts.persistence == 0 {
                break;
            }
        }
        debug!("update_dirty2: settled after {} pass(es)", passes);
        Ok(())
    }

    fn discard_pending(&self) {
        self.elmt_ids_changed.borrow_mut().clear();
        self.computed_props_changed.borrow_mut().clear();
        self.monitor_ids_changed.borrow_mut().clear();
        self.persistence_changed.borrow_mut().clear();
        self.monitor_fns_to_run.borrow_mut().clear();
    }

    /// Recomputes the given `@Computed`s in ascending id order. A computed owned by an
    /// inactive view is parked on that view instead.
    pub fn update_dirty_computed_props(&self, ids: BTreeSet<BindId>) -> Result<()> {
        debug!("update_dirty_computed_props: {:?}", ids);
        for id in ids {
            match self.owner_of(id) {
                Some(ReactiveOwner::Computed(computed)) => {
                    let Some(computed) = computed.upgrade() else {
                        continue;
                    };
                    if let Some(view) = computed.owning_view().filter(|view| !view.is_active()) {
                        view.delay_computed(id);
                        continue;
                    }
                    computed.fire_change()?;
                }
                Some(other) => error!("update_dirty_computed_props: {} is owned by {:?}", id, other),
                None => debug!("update_dirty_computed_props: {} has no owner", id),
            }
        }
        Ok(())
    }

    /// Re-evaluates the given monitor paths and runs the monitor functions whose paths
    /// changed value.
    pub fn update_dirty_monitors(&self, ids: BTreeSet<BindId>) -> Result<()> {
        self.update_dirty_monitor_paths(ids)?;
        self.run_queued_monitor_functions()
    }

    fn update_dirty_monitor_paths(&self, ids: BTreeSet<BindId>) -> Result<()> {
        debug!("update_dirty_monitor_paths: {:?}", ids);
        for id in ids {
            match self.owner_of(id) {
                Some(ReactiveOwner::Monitor(monitor)) => {
                    let Some(monitor) = monitor.upgrade() else {
                        continue;
                    };
                    if let Some(view) = monitor.owning_view().filter(|view| !view.is_active()) {
                        view.delay_monitor(id);
                        continue;
                    }
                    if monitor.notify_change(id)? {
                        self.monitor_fns_to_run.borrow_mut().insert(monitor.watch_id(), monitor);
                    }
                }
                Some(other) => error!("update_dirty_monitor_paths: {} is owned by {:?}", id, other),
                None => debug!("update_dirty_monitor_paths: {} has no owner", id),
            }
        }
        Ok(())
    }

    fn run_queued_monitor_functions(&self) -> Result<()> {
        let to_run: BTreeMap<BindId, Rc<MonitorV2>> = std::mem::take(&mut *self.monitor_fns_to_run.borrow_mut());
        for monitor in to_run.into_values() {
            monitor.run_monitor_function()?;
        }
        Ok(())
    }

    fn update_dirty_persistence(&self, ids: BTreeSet<BindId>) -> Result<()> {
        debug!("update_dirty_persistence: {:?}", ids);
        for id in ids {
            match self.owner_of(id) {
                Some(ReactiveOwner::Persistence(persistence)) => {
                    if let Some(persistence) = persistence.upgrade() {
                        persistence.on_change_observed(id)?;
                    }
                }
                Some(other) => error!("update_dirty_persistence: {} is owned by {:?}", id, other),
                None => debug!("update_dirty_persistence: {} has no owner", id),
            }
        }
        Ok(())
    }

    /// Marks each element dirty on its owning view, then lets every affected view
    /// re-render once.
    fn update_ui_nodes(&self, ids: BTreeSet<BindId>) -> Result<()> {
        debug!("update_ui_nodes: {:?}", ids);
        let mut views: BTreeMap<BindId, Rc<ViewV2>> = BTreeMap::new();
        let mut legacy_views: BTreeMap<BindId, Rc<ViewPU>> = BTreeMap::new();
        for id in ids {
            match self.owner_of(id) {
                Some(ReactiveOwner::View(view)) => {
                    if let Some(view) = view.upgrade() {
                        view.ui_node_need_update_v2(id);
                        views.entry(view.id()).or_insert(view);
                    }
                }
                Some(ReactiveOwner::LegacyView(view)) => {
                    if let Some(view) = view.upgrade() {
                        view.ui_node_need_update_v2(id);
                        legacy_views.entry(view.elmt_id()).or_insert(view);
                    }
                }
                Some(other) => error!("update_ui_nodes: element {} is owned by {:?}", id, other),
                // deleted elements whose binding was already cleared
                None => debug!("update_ui_nodes: element {} has no owner", id),
            }
        }
        for view in views.values() {
            view.update_dirty_elements()?;
        }
        for view in legacy_views.values() {
            view.update_dirty_elements()?;
        }
        Ok(())
    }
}
