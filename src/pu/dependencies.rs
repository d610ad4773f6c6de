use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::rc::Rc;
use crate::bind_id::ElmtId;

/// Which elements of the owning view read a property: as a whole, or (for objects with
/// `@Track` fields) one field at a time.
#[derive(Debug, Clone, Default)]
pub struct PropertyDependencies {
    property_dependencies: BTreeSet<ElmtId>,
    tracked_property_dependencies: BTreeMap<Rc<str>, BTreeSet<ElmtId>>,
}

impl PropertyDependencies {
    pub fn add_property_dependency(&mut self, id: ElmtId) {
        self.property_dependencies.insert(id);
    }

    pub fn add_tracked_property_dependency(&mut self, field: &str, id: ElmtId) {
        self.tracked_property_dependencies.entry(Rc::from(field)).or_default().insert(id);
    }

    /// Every element depending on the property in any way.
    pub fn get_all_property_dependencies(&self) -> BTreeSet<ElmtId> {
        let mut all = self.property_dependencies.clone();
        for ids in self.tracked_property_dependencies.values() {
            all.extend(ids.iter().copied());
        }
        all
    }

    pub fn get_tracked_property_dependencies(&self, field: &str) -> BTreeSet<ElmtId> {
        self.tracked_property_dependencies.get(field).cloned().unwrap_or_default()
    }

    pub fn purge(&mut self, id: ElmtId) {
        self.property_dependencies.remove(&id);
        self.tracked_property_dependencies.retain(|_, ids| {
            ids.remove(&id);
            !ids.is_empty()
        });
    }

    pub fn clear(&mut self) {
        self.property_dependencies.clear();
        self.tracked_property_dependencies.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.property_dependencies.is_empty() && self.tracked_property_dependencies.is_empty()
    }

    pub fn dump(&self) -> String {
        let mut out = format!("elmts {:?}", self.property_dependencies.iter().map(|id| id.0).collect::<Vec<_>>());
        for (field, ids) in &self.tracked_property_dependencies {
            let _ = write!(out, ", {}: {:?}", field, ids.iter().map(|id| id.0).collect::<Vec<_>>());
        }
        out
    }
}
