use std::rc::Rc;
use crate::error::{Result, StateError};
use crate::observe::PropKey;
use crate::value::{Container, ContainerKind, Value};
use super::{ArrayProxy, DateProxy, Interceptor, MapProxy, Observed, SetProxy};

impl Observed {
    /// Reads a field. A `@Computed` of that name yields its cached value.
    pub fn get(&self, field: &str) -> Result<Value> {
        if let Some(computed) = self.target.computed(field) {
            return computed.get();
        }
        let value = match &*self.target.borrow() {
            Container::Object(fields) => fields.get(field).cloned().unwrap_or(Value::Undefined),
            other => return Err(StateError::WrongContainer { expected: ContainerKind::Object, found: other.kind() }),
        };
        if !self.tracker.observes_field(&self.target, field) {
            return Ok(value);
        }
        self.read(PropKey::field(field))?;
        Ok(self.wrap(value))
    }

    /// Writes a field. Writing the value the field already holds does nothing.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<()> {
        if self.target.class().is_some_and(|class| class.is_read_only(field)) {
            return Err(StateError::ReadOnly { name: field.to_string(), decorator: "@Param" });
        }
        self.set_internal(field, value.into())
    }

    /// Field write bypassing the read-only check (`@Param` updates from the parent).
    pub(crate) fn set_internal(&self, field: &str, value: Value) -> Result<()> {
        if self.target.computed(field).is_some() {
            return Err(StateError::ReadOnly { name: field.to_string(), decorator: "@Computed" });
        }
        let value = value.into_stored();
        let added = {
            let mut data = self.target.borrow_mut();
            let Container::Object(fields) = &mut *data else {
                return Err(StateError::WrongContainer { expected: ContainerKind::Object, found: data.kind() });
            };
            match fields.get_mut(field) {
                Some(old) if old.same_value(&value) => return Ok(()),
                Some(old) => {
                    *old = value;
                    false
                }
                None => {
                    fields.insert(Rc::from(field), value);
                    true
                }
            }
        };
        if !self.tracker.observes_field(&self.target, field) {
            return Ok(());
        }
        self.fire(PropKey::field(field))?;
        if added {
            self.fire(PropKey::Length)?;
        }
        Ok(())
    }

    pub fn has(&self, field: &str) -> Result<bool> {
        let present = match &*self.target.borrow() {
            Container::Object(fields) => fields.contains_key(field),
            other => return Err(StateError::WrongContainer { expected: ContainerKind::Object, found: other.kind() }),
        } || self.target.computed(field).is_some();
        if self.tracker.observes_field(&self.target, field) {
            self.read(PropKey::field(field))?;
        }
        Ok(present)
    }

    /// Field names in insertion order. Depends on the set of fields, not their values.
    pub fn keys(&self) -> Result<Vec<Rc<str>>> {
        let keys = match &*self.target.borrow() {
            Container::Object(fields) => fields.keys().cloned().collect(),
            other => return Err(StateError::WrongContainer { expected: ContainerKind::Object, found: other.kind() }),
        };
        self.read(PropKey::Length)?;
        Ok(keys)
    }

    /// Removes a field; `false` if it was not there.
    pub fn delete(&self, field: &str) -> Result<bool> {
        let removed = match &mut *self.target.borrow_mut() {
            Container::Object(fields) => fields.shift_remove(field).is_some(),
            other => return Err(StateError::WrongContainer { expected: ContainerKind::Object, found: other.kind() }),
        };
        if removed {
            self.fire(PropKey::field(field))?;
            self.fire(PropKey::Length)?;
        }
        Ok(removed)
    }

    pub fn array(&self) -> Result<ArrayProxy> {
        self.expect_kind(ContainerKind::Array)?;
        Ok(ArrayProxy::new(self.clone()))
    }

    pub fn map(&self) -> Result<MapProxy> {
        self.expect_kind(ContainerKind::Map)?;
        Ok(MapProxy::new(self.clone()))
    }

    pub fn set_view(&self) -> Result<SetProxy> {
        self.expect_kind(ContainerKind::Set)?;
        Ok(SetProxy::new(self.clone()))
    }

    pub fn date(&self) -> Result<DateProxy> {
        self.expect_kind(ContainerKind::Date)?;
        Ok(DateProxy::new(self.clone()))
    }

    fn expect_kind(&self, expected: ContainerKind) -> Result<()> {
        let found = self.target.kind();
        if found == expected {
            Ok(())
        } else {
            Err(StateError::WrongContainer { expected, found })
        }
    }
}
