use std::cell::{Cell, RefCell};
use std::rc::Rc;
use crate::bind_id::{BindId, ElmtId};
use crate::error::Result;

/// The native UI node tree, as far as observation is concerned: it hands out element ids
/// and reports which of them were deleted since the last call.
pub trait UiNodeAllocator {
    fn allocate_elmt_id(&self) -> ElmtId;
    fn obtain_deleted_elmt_ids(&self) -> Vec<ElmtId>;
}

/// Counts element ids up from 1 and keeps deleted ids until they are obtained. Stands in
/// for the native tree in headless use and in tests.
#[derive(Debug)]
pub struct ElementIdAllocator {
    next: Cell<i64>,
    deleted: RefCell<Vec<ElmtId>>,
}

impl ElementIdAllocator {
    pub fn new() -> Self {
        ElementIdAllocator {
            next: Cell::new(1),
            deleted: RefCell::new(Vec::new()),
        }
    }

    /// Marks an element deleted, the way the native tree does when a node is destroyed.
    pub fn report_deleted(&self, id: ElmtId) {
        self.deleted.borrow_mut().push(id);
    }
}

impl Default for ElementIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl UiNodeAllocator for ElementIdAllocator {
    fn allocate_elmt_id(&self) -> ElmtId {
        let id = self.next.get();
        self.next.set(id + 1);
        debug_assert!(BindId(id) < BindId::MIN_COMPUTED_ID, "element ids exhausted");
        BindId(id)
    }

    fn obtain_deleted_elmt_ids(&self) -> Vec<ElmtId> {
        std::mem::take(&mut *self.deleted.borrow_mut())
    }
}

/// Re-creates or updates the UI of one element; the flag is set on the first render.
pub type UpdateFn = Rc<dyn Fn(ElmtId, bool) -> Result<()>>;

/// An element's update function as registered on its view.
pub(crate) struct UpdateFuncEntry {
    pub(crate) func: UpdateFn,
    pub(crate) render_count: Cell<usize>,
}

impl UpdateFuncEntry {
    pub(crate) fn new(func: UpdateFn) -> Self {
        UpdateFuncEntry { func, render_count: Cell::new(0) }
    }
}
