//! Observing handles over raw containers.
//!
//! An [Observed] pairs a raw target with a tracker. Every read through it records a
//! dependency, every effective write fires a change, and nested containers come back
//! observed too where the tracker says so. The tracker decides what that means:
//!
//! - V2 decorator mode: `@Trace` fields of described types, plus arrays, maps, sets and
//!   dates reached through them.
//! - V2 explicit mode (`make_observed`): every field, recursively.
//! - V1 (`ObservedObject`): first level only, notifying the owning properties.

mod array;
mod collection;
mod date;
mod object;
mod ref_info;

use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};
use crate::error::Result;
use crate::observe::PropKey;
use crate::pu::PuHandler;
use crate::runtime::Runtime;
use crate::value::{ContainerKind, ObjectRef, Value};

pub use array::ArrayProxy;
pub use collection::{MapProxy, SetProxy};
pub use date::DateProxy;
pub(crate) use ref_info::RefInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    /// State declared through decorators: the class descriptor decides what is traced.
    Decorator,
    /// `make_observed`: the whole object graph is observed.
    Explicit,
}

#[derive(Clone)]
pub(crate) enum Tracker {
    V2 { rt: Weak<Runtime>, mode: WrapMode },
    Pu(Rc<PuHandler>),
}

/// What an observing handle does on reads and writes. Implemented once per observation
/// model; the container operations only decide which [PropKey] is involved.
pub(crate) trait Interceptor {
    fn observes_field(&self, target: &ObjectRef, field: &str) -> bool;
    fn record_read(&self, target: &ObjectRef, key: PropKey) -> Result<()>;
    fn fire_write(&self, target: &ObjectRef, key: PropKey) -> Result<()>;
    /// The handle to give out for a value read from an observed container.
    fn wrap_nested(&self, value: Value) -> Value;
}

impl Interceptor for Tracker {
    fn observes_field(&self, target: &ObjectRef, field: &str) -> bool {
        match self {
            Tracker::V2 { mode: WrapMode::Decorator, .. } => match target.class() {
                Some(class) if class.has_traced_fields() => class.is_traced(field),
                _ => true,
            },
            Tracker::V2 { mode: WrapMode::Explicit, .. } => true,
            Tracker::Pu(_) => true,
        }
    }

    fn record_read(&self, target: &ObjectRef, key: PropKey) -> Result<()> {
        match self {
            Tracker::V2 { rt, .. } => match rt.upgrade() {
                Some(rt) => rt.observe().add_ref(target, key),
                None => Ok(()),
            },
            Tracker::Pu(handler) => handler.record_read(target, &key),
        }
    }

    fn fire_write(&self, target: &ObjectRef, key: PropKey) -> Result<()> {
        match self {
            Tracker::V2 { rt, .. } => match rt.upgrade() {
                Some(rt) => rt.observe().fire_change(target, key),
                None => Ok(()),
            },
            Tracker::Pu(handler) => {
                handler.notify_property_changed(target, &key);
                Ok(())
            }
        }
    }

    fn wrap_nested(&self, value: Value) -> Value {
        let Value::Ref(target) = value else {
            return value;
        };
        match self {
            Tracker::V2 { rt, mode } => {
                let Some(runtime) = rt.upgrade() else {
                    return Value::Ref(target);
                };
                let described = target.class().is_some_and(|class| class.has_traced_fields());
                let mode = if described {
                    WrapMode::Decorator
                } else if *mode == WrapMode::Explicit || runtime.ref_info().contains(&target) {
                    WrapMode::Explicit
                } else if target.kind() == ContainerKind::Object {
                    // plain objects under decorated state are observed by assignment only
                    return Value::Ref(target);
                } else {
                    WrapMode::Decorator
                };
                Value::Observed(Observed::new(target, Tracker::V2 { rt: rt.clone(), mode }))
            }
            // V1 observation is shallow: only containers that are observed objects
            // themselves come back observed
            Tracker::Pu(_) => match target.pu_handler() {
                Some(handler) => Value::Observed(Observed::new(target, Tracker::Pu(handler))),
                None => Value::Ref(target),
            },
        }
    }
}

/// A raw container seen through an observing proxy. Cloning is cheap; clones observe
/// the same target.
#[derive(Clone)]
pub struct Observed {
    target: ObjectRef,
    tracker: Tracker,
}

impl Observed {
    pub(crate) fn new(target: ObjectRef, tracker: Tracker) -> Self {
        Observed { target, tracker }
    }

    pub(crate) fn v2(rt: &Rc<Runtime>, target: ObjectRef, mode: WrapMode) -> Self {
        Observed::new(target, Tracker::V2 { rt: Rc::downgrade(rt), mode })
    }

    /// The raw target. Access through it is not observed.
    pub fn target(&self) -> &ObjectRef {
        &self.target
    }

    pub fn kind(&self) -> ContainerKind {
        self.target.kind()
    }

    /// `None` for V1 observed objects.
    pub fn wrap_mode(&self) -> Option<WrapMode> {
        match &self.tracker {
            Tracker::V2 { mode, .. } => Some(*mode),
            Tracker::Pu(_) => None,
        }
    }

    pub fn is_v1(&self) -> bool {
        matches!(self.tracker, Tracker::Pu(_))
    }

    pub(crate) fn runtime(&self) -> Option<Rc<Runtime>> {
        match &self.tracker {
            Tracker::V2 { rt, .. } => rt.upgrade(),
            Tracker::Pu(handler) => handler.runtime(),
        }
    }

    pub(crate) fn read(&self, key: PropKey) -> Result<()> {
        self.tracker.record_read(&self.target, key)
    }

    pub(crate) fn fire(&self, key: PropKey) -> Result<()> {
        self.tracker.fire_write(&self.target, key)
    }

    pub(crate) fn wrap(&self, value: Value) -> Value {
        self.tracker.wrap_nested(value)
    }
}

impl Debug for Observed {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let model = match &self.tracker {
            Tracker::V2 { mode: WrapMode::Decorator, .. } => "v2",
            Tracker::V2 { mode: WrapMode::Explicit, .. } => "v2 explicit",
            Tracker::Pu(_) => "v1",
        };
        write!(f, "Observed({:?}, {})", self.target, model)
    }
}
