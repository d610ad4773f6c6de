use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};
use log::{debug, error};
use crate::bind_id::ElmtId;
use crate::class::ClassDescriptor;
use crate::config::RuntimeConfig;
use crate::error::{Result, StateError};
use crate::node::{ElementIdAllocator, UiNodeAllocator};
use crate::observe::scheduler::{Task, TaskQueue};
use crate::observe::ObserveV2;
use crate::proxy::{Observed, RefInfo, WrapMode};
use crate::pu::{LocalStorage, SubscriberManager, ViewPU};
use crate::value::{ObjectRef, Value};
use crate::view_v2::ViewV2;

/// The view owning an element id.
#[derive(Clone)]
pub(crate) enum ElmtOwner {
    LegacyView(Weak<ViewPU>),
    View(Weak<ViewV2>),
}

type ErrorHandler = Rc<dyn Fn(&StateError)>;

/// Everything process-wide about state observation, owned by the application root.
///
/// Independent runtimes share nothing, so each test (or each application root) builds
/// its own.
pub struct Runtime {
    config: RuntimeConfig,
    queue: Rc<TaskQueue>,
    observe: ObserveV2,
    ref_info: RefInfo,
    subscriber_manager: SubscriberManager,
    allocator: Rc<dyn UiNodeAllocator>,
    elmt_owners: RefCell<HashMap<ElmtId, ElmtOwner>>,
    /// Elements of V1 views currently rendering, innermost last.
    pu_render_stack: RefCell<Vec<ElmtId>>,
    app_storage: Rc<LocalStorage>,
    uncaught_error_handler: RefCell<Option<ErrorHandler>>,
    self_ref: Weak<Runtime>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Rc<Runtime> {
        Self::with_allocator(config, Rc::new(ElementIdAllocator::new()))
    }

    pub fn with_allocator(config: RuntimeConfig, allocator: Rc<dyn UiNodeAllocator>) -> Rc<Runtime> {
        Rc::new_cyclic(|self_ref: &Weak<Runtime>| {
            let queue = Rc::new(TaskQueue::default());
            Runtime {
                observe: ObserveV2::new(&config, queue.clone()),
                config,
                queue,
                ref_info: RefInfo::default(),
                subscriber_manager: SubscriberManager::new(),
                allocator,
                elmt_owners: RefCell::new(HashMap::new()),
                pu_render_stack: RefCell::new(Vec::new()),
                app_storage: LocalStorage::new_with(self_ref.clone()),
                uncaught_error_handler: RefCell::new(None),
                self_ref: self_ref.clone(),
            }
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn observe(&self) -> &ObserveV2 {
        &self.observe
    }

    pub fn subscriber_manager(&self) -> &SubscriberManager {
        &self.subscriber_manager
    }

    /// The application-wide storage (`AppStorage`).
    pub fn app_storage(&self) -> &Rc<LocalStorage> {
        &self.app_storage
    }

    pub(crate) fn ref_info(&self) -> &RefInfo {
        &self.ref_info
    }

    pub(crate) fn weak(&self) -> Weak<Runtime> {
        self.self_ref.clone()
    }

    // region element ids

    pub fn allocate_elmt_id(&self) -> ElmtId {
        self.allocator.allocate_elmt_id()
    }

    pub(crate) fn register_elmt_owner(&self, id: ElmtId, owner: ElmtOwner) {
        self.elmt_owners.borrow_mut().insert(id, owner);
    }

    pub(crate) fn unregister_elmt_owner(&self, id: ElmtId) {
        self.elmt_owners.borrow_mut().remove(&id);
    }

    pub fn is_elmt_registered(&self, id: ElmtId) -> bool {
        self.elmt_owners.borrow().contains_key(&id)
    }

    /// Takes the ids the node tree deleted, drops their update functions from the
    /// owning views and clears their bindings. Returns how many were purged.
    pub fn unregister_deleted_elmt_ids(&self) -> usize {
        let deleted = self.allocator.obtain_deleted_elmt_ids();
        for id in &deleted {
            let owner = self.elmt_owners.borrow_mut().remove(id);
            match owner {
                Some(ElmtOwner::LegacyView(view)) => {
                    if let Some(view) = view.upgrade() {
                        view.purge_deleted_elmt_ids(&[*id]);
                    }
                }
                Some(ElmtOwner::View(view)) => {
                    if let Some(view) = view.upgrade() {
                        view.purge_deleted_elmt_id(*id);
                    }
                }
                None => debug!("unregister_deleted_elmt_ids: {} was not registered", id),
            }
            self.observe.clear_binding(*id);
        }
        debug!("unregister_deleted_elmt_ids: purged {:?}", deleted);
        deleted.len()
    }

    // endregion

    // region V1 render stack

    pub(crate) fn push_pu_render(&self, id: ElmtId) {
        self.pu_render_stack.borrow_mut().push(id);
    }

    pub(crate) fn pop_pu_render(&self) {
        self.pu_render_stack.borrow_mut().pop();
    }

    /// The V1 element currently rendering, whose reads become property dependencies.
    pub(crate) fn current_pu_render(&self) -> Option<ElmtId> {
        self.pu_render_stack.borrow().last().copied()
    }

    // endregion

    // region scheduling

    pub(crate) fn schedule_rerender(&self, view: Weak<ViewPU>) {
        self.queue.schedule_microtask(Task::RerenderLegacy(view));
    }

    /// Runs every deferred task: update passes and V1 re-renders, including tasks those
    /// schedule. Errors go to the uncaught-error handler.
    pub fn flush(&self) {
        while let Some(task) = self.queue.pop_microtask() {
            let result = match task {
                Task::UpdateDirty => self.observe.update_dirty2(),
                Task::RerenderLegacy(view) => match view.upgrade() {
                    Some(view) => view.rerender(),
                    None => Ok(()),
                },
                Task::CleanUpDeadReferences => {
                    self.clean_up_dead_references();
                    Ok(())
                }
            };
            if let Err(err) = result {
                self.report_uncaught(err);
            }
        }
    }

    pub fn has_pending_tasks(&self) -> bool {
        self.queue.has_microtasks()
    }

    /// Runs the update pass now instead of waiting for [Runtime::flush].
    pub fn update_synchronously(&self) -> Result<()> {
        self.observe.update_dirty2()
    }

    pub fn run_idle_tasks(&self) {
        while let Some(task) = self.queue.pop_idle() {
            match task {
                Task::CleanUpDeadReferences => self.clean_up_dead_references(),
                other => self.queue.schedule_microtask(other),
            }
        }
    }

    fn clean_up_dead_references(&self) {
        self.observe.clean_up_dead_references();
        let pruned = self.ref_info.prune();
        debug!("clean_up_dead_references: {} dead make_observed targets", pruned);
    }

    pub fn set_uncaught_error_handler(&self, handler: impl Fn(&StateError) + 'static) {
        *self.uncaught_error_handler.borrow_mut() = Some(Rc::new(handler));
    }

    fn report_uncaught(&self, err: StateError) {
        let handler = self.uncaught_error_handler.borrow().clone();
        match handler {
            Some(handler) => handler(&err),
            None => error!("uncaught error in deferred update: {}", err),
        }
    }

    // endregion

    // region observation entry points

    /// Runs `f` without recording dependencies or notifying changes.
    pub fn execute_unobserved<T>(&self, f: impl FnOnce() -> T) -> T {
        self.observe.execute_unobserved(f)
    }

    /// Observes a value as a whole (`UIUtils.makeObserved`). Primitives and already
    /// observed values are returned as they are; instances of a type with traced fields
    /// observe themselves through their descriptor.
    pub fn make_observed(self: &Rc<Self>, value: impl Into<Value>) -> Value {
        match value.into() {
            Value::Ref(target) => {
                if target.class().is_some_and(|class| class.has_traced_fields()) {
                    return Value::Observed(Observed::v2(self, target, WrapMode::Decorator));
                }
                if self.ref_info.register(&target) {
                    debug!("make_observed: {:?}", target);
                }
                Value::Observed(Observed::v2(self, target, WrapMode::Explicit))
            }
            other => other,
        }
    }

    /// A new instance of a type whose traced fields are observed (`@ObservedV2`).
    pub fn new_observed_v2<K: Into<Rc<str>>, V: Into<Value>>(self: &Rc<Self>, class: &Rc<ClassDescriptor>, fields: impl IntoIterator<Item = (K, V)>) -> Observed {
        Observed::v2(self, ObjectRef::new_instance(class, fields), WrapMode::Decorator)
    }

    /// The raw container behind an observed value (`UIUtils.getTarget`).
    pub fn get_target(&self, value: &Value) -> Value {
        match value {
            Value::Observed(observed) => Value::Ref(observed.target().clone()),
            other => other.clone(),
        }
    }

    pub fn is_made_observed(&self, target: &ObjectRef) -> bool {
        self.ref_info.contains(target)
    }

    // endregion
}

impl Debug for Runtime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("registered_elmts", &self.elmt_owners.borrow().len())
            .field("subscribers", &self.subscriber_manager.num_subscribers())
            .field("made_observed", &self.ref_info.len())
            .finish()
    }
}
