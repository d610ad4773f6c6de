use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Weak;
use crate::pu::ViewPU;

#[derive(Debug)]
pub(crate) enum Task {
    /// Run the V2 update pass.
    UpdateDirty,
    /// Re-render the dirty elements of a V1 view.
    RerenderLegacy(Weak<ViewPU>),
    CleanUpDeadReferences,
}

/// Single-threaded deferred execution: microtasks run on the next [Runtime::flush](crate::Runtime::flush),
/// idle tasks on [Runtime::run_idle_tasks](crate::Runtime::run_idle_tasks).
#[derive(Debug, Default)]
pub(crate) struct TaskQueue {
    microtasks: RefCell<VecDeque<Task>>,
    idle: RefCell<VecDeque<Task>>,
}

impl TaskQueue {
    pub(crate) fn schedule_microtask(&self, task: Task) {
        self.microtasks.borrow_mut().push_back(task);
    }

    pub(crate) fn schedule_idle(&self, task: Task) {
        self.idle.borrow_mut().push_back(task);
    }

    pub(crate) fn pop_microtask(&self) -> Option<Task> {
        self.microtasks.borrow_mut().pop_front()
    }

    pub(crate) fn pop_idle(&self) -> Option<Task> {
        self.idle.borrow_mut().pop_front()
    }

    pub(crate) fn has_microtasks(&self) -> bool {
        !self.microtasks.borrow().is_empty()
    }
}
