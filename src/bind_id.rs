use std::cell::Cell;
use std::fmt::{Display, Formatter};

/// Identifies one observation participant: a UI element, a `@Computed`, one path of a
/// `@Monitor`, or a persisted value. The numeric range decides which.
///
/// The boundaries are compared with `<` everywhere an id is dispatched, so they must
/// never change independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindId(pub i64);

/// Element ids are bind ids below [BindId::MIN_COMPUTED_ID], handed out by the native
/// node allocator.
pub type ElmtId = BindId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindKind {
    Element,
    Computed,
    Monitor,
    Persistence,
    /// Pushed while a V1 parent evaluates the parameters of a V2 child.
    IllegalAccessSentinel,
}

impl BindId {
    pub const MIN_COMPUTED_ID: BindId = BindId(0x10_0000_0000);
    pub const MIN_WATCH_ID: BindId = BindId(0x1_0000_0000_0000);
    pub const MIN_PERSISTENCE_ID: BindId = BindId(0x10_0000_0000_0000);
    pub const ILLEGAL_V1V2_ACCESS: BindId = BindId(-2);

    pub fn kind(self) -> BindKind {
        if self == BindId::ILLEGAL_V1V2_ACCESS {
            BindKind::IllegalAccessSentinel
        } else if self < BindId::MIN_COMPUTED_ID {
            BindKind::Element
        } else if self < BindId::MIN_WATCH_ID {
            BindKind::Computed
        } else if self < BindId::MIN_PERSISTENCE_ID {
            BindKind::Monitor
        } else {
            BindKind::Persistence
        }
    }
}

impl Display for BindId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allocates ids for the non-element ranges.
#[derive(Debug)]
pub(crate) struct BindIdAllocator {
    next_computed: Cell<i64>,
    next_watch: Cell<i64>,
    next_persistence: Cell<i64>,
}

impl BindIdAllocator {
    pub(crate) fn new() -> Self {
        BindIdAllocator {
            next_computed: Cell::new(BindId::MIN_COMPUTED_ID.0),
            next_watch: Cell::new(BindId::MIN_WATCH_ID.0),
            next_persistence: Cell::new(BindId::MIN_PERSISTENCE_ID.0),
        }
    }

    pub(crate) fn next_computed(&self) -> BindId {
        Self::bump(&self.next_computed)
    }

    pub(crate) fn next_watch(&self) -> BindId {
        Self::bump(&self.next_watch)
    }

    pub(crate) fn next_persistence(&self) -> BindId {
        Self::bump(&self.next_persistence)
    }

    fn bump(cell: &Cell<i64>) -> BindId {
        let id = cell.get();
        cell.set(id + 1);
        BindId(id)
    }
}
