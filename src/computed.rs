use std::cell::RefCell;
use std::rc::{Rc, Weak};
use derivative::Derivative;
use log::{debug, error};
use crate::bind_id::BindId;
use crate::error::Result;
use crate::observe::{PropKey, ReactiveOwner};
use crate::proxy::{Observed, WrapMode};
use crate::runtime::Runtime;
use crate::value::{ObjectRef, Value, WeakObjectRef};
use crate::view_v2::ViewV2;

type ComputeFn = Box<dyn Fn(&Observed) -> Result<Value>>;

/// A `@Computed` property: a cached getter on its owner.
///
/// The compute function runs with its own bind id recording, so it is re-run (in the
/// update pass) when anything it read changes. Readers of the property depend on the
/// owner's field of the same name, which is only fired when the recomputed value differs
/// from the cached one.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ComputedV2 {
    id: BindId,
    name: Rc<str>,
    #[derivative(Debug = "ignore")]
    rt: Weak<Runtime>,
    owner: WeakObjectRef,
    #[derivative(Debug = "ignore")]
    compute: ComputeFn,
    value: RefCell<Value>,
    #[derivative(Debug = "ignore")]
    owning_view: Weak<ViewV2>,
    #[derivative(Debug = "ignore")]
    self_ref: Weak<ComputedV2>,
}

impl ComputedV2 {
    /// Defines `name` on `owner` and computes its first value.
    pub fn new(
        rt: &Rc<Runtime>,
        owner: &Observed,
        name: &str,
        compute: impl Fn(&Observed) -> Result<Value> + 'static,
        owning_view: Option<&Rc<ViewV2>>,
    ) -> Result<Rc<ComputedV2>> {
        let computed = Rc::new_cyclic(|self_ref| ComputedV2 {
            id: rt.observe().next_computed_id(),
            name: Rc::from(name),
            rt: Rc::downgrade(rt),
            owner: owner.target().downgrade(),
            compute: Box::new(compute),
            value: RefCell::new(Value::Undefined),
            owning_view: owning_view.map_or_else(Weak::new, Rc::downgrade),
            self_ref: self_ref.clone(),
        });
        let value = computed.observe_compute()?;
        *computed.value.borrow_mut() = value;
        owner.target().0.computed.borrow_mut().insert(computed.name.clone(), computed.clone());
        debug!("@Computed {} created with id {}", name, computed.id);
        Ok(computed)
    }

    pub fn id(&self) -> BindId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owning_view(&self) -> Option<Rc<ViewV2>> {
        self.owning_view.upgrade()
    }

    /// The cached value. Records a dependency on the property.
    pub fn get(&self) -> Result<Value> {
        if let (Some(rt), Some(owner)) = (self.rt.upgrade(), self.owner.upgrade()) {
            rt.observe().add_ref(&owner, PropKey::Field(self.name.clone()))?;
        }
        Ok(self.value.borrow().clone())
    }

    /// The cached value, without recording a dependency.
    pub fn peek(&self) -> Value {
        self.value.borrow().clone()
    }

    fn this(&self, rt: &Rc<Runtime>, owner: ObjectRef) -> Observed {
        let mode = if owner.class().is_some() { WrapMode::Decorator } else { WrapMode::Explicit };
        Observed::v2(rt, owner, mode)
    }

    fn observe_compute(&self) -> Result<Value> {
        let (Some(rt), Some(owner)) = (self.rt.upgrade(), self.owner.upgrade()) else {
            return Ok(self.value.borrow().clone());
        };
        let this = self.this(&rt, owner);
        let observe = rt.observe();
        observe.start_record_dependencies(self.id, ReactiveOwner::Computed(self.self_ref.clone()), true);
        observe.enter_computed();
        let result = (self.compute)(&this);
        observe.leave_computed();
        observe.stop_record_dependencies();
        result.inspect_err(|err| error!("@Computed {}: {}", self.name, err))
    }

    /// Recomputes, and notifies readers if the value changed.
    pub(crate) fn fire_change(&self) -> Result<()> {
        let value = self.observe_compute()?;
        if self.value.borrow().same_value(&value) {
            return Ok(());
        }
        debug!("@Computed {} changed to {:?}", self.name, value);
        *self.value.borrow_mut() = value;
        match (self.rt.upgrade(), self.owner.upgrade()) {
            (Some(rt), Some(owner)) => rt.observe().fire_change(&owner, PropKey::Field(self.name.clone())),
            _ => Ok(()),
        }
    }

    pub fn about_to_be_deleted(&self) {
        if let Some(rt) = self.rt.upgrade() {
            rt.observe().clear_binding(self.id);
        }
        if let Some(owner) = self.owner.upgrade() {
            owner.0.computed.borrow_mut().remove(&self.name);
        }
    }
}
