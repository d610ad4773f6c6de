use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::rc::Rc;
use crate::bind_id::BindId;
use crate::value::Key;

/// Which part of a target a dependency is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropKey {
    Field(Rc<str>),
    Index(usize),
    /// An entry of a Map or Set.
    Entry(Key),
    /// Structure of an array, map or set (size, order, membership).
    Length,
    /// Every mutating call of a Date.
    Date,
    /// Any entry of a Map or Set; read by whole-collection iteration.
    AnyProperty,
}

impl PropKey {
    pub fn field(name: &str) -> PropKey {
        PropKey::Field(Rc::from(name))
    }

    pub fn field_name(&self) -> Option<&str> {
        match self {
            PropKey::Field(name) => Some(name),
            _ => None,
        }
    }
}

impl Display for PropKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PropKey::Field(name) => write!(f, "{}", name),
            PropKey::Index(index) => write!(f, "{}", index),
            PropKey::Entry(key) => write!(f, "{}", key),
            PropKey::Length => write!(f, "__ob_length"),
            PropKey::Date => write!(f, "__date__"),
            PropKey::AnyProperty => write!(f, "__ob_any_property"),
        }
    }
}

/// Dependency metadata carried by each target.
///
/// `refs` answers "who depends on this property" (fired on change). `id_refs` is the
/// inverse, kept only once the target has many observed properties, so removing one
/// bind id does not scan all of them.
#[derive(Debug, Default)]
pub(crate) struct TargetMeta {
    refs: HashMap<PropKey, BTreeSet<BindId>>,
    id_refs: Option<HashMap<BindId, HashSet<PropKey>>>,
}

impl TargetMeta {
    pub(crate) fn add(&mut self, key: PropKey, id: BindId, id_refs_threshold: usize) {
        if let Some(id_refs) = &mut self.id_refs {
            id_refs.entry(id).or_default().insert(key.clone());
        }
        self.refs.entry(key).or_default().insert(id);
        if self.id_refs.is_none() && self.refs.len() > id_refs_threshold {
            self.build_id_refs();
        }
    }

    fn build_id_refs(&mut self) {
        let mut id_refs: HashMap<BindId, HashSet<PropKey>> = HashMap::new();
        for (key, ids) in &self.refs {
            for id in ids {
                id_refs.entry(*id).or_default().insert(key.clone());
            }
        }
        self.id_refs = Some(id_refs);
    }

    pub(crate) fn remove_id(&mut self, id: BindId) {
        match &mut self.id_refs {
            Some(id_refs) => {
                for key in id_refs.remove(&id).unwrap_or_default() {
                    if let Some(ids) = self.refs.get_mut(&key) {
                        ids.remove(&id);
                        if ids.is_empty() {
                            self.refs.remove(&key);
                        }
                    }
                }
            }
            None => self.refs.retain(|_, ids| {
                ids.remove(&id);
                !ids.is_empty()
            }),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub(crate) fn dependents(&self, key: &PropKey) -> Vec<BindId> {
        self.refs.get(key).map(|ids| ids.iter().copied().collect()).unwrap_or_default()
    }

    pub(crate) fn contains_id(&self, id: BindId) -> bool {
        self.refs.values().any(|ids| ids.contains(&id))
    }

    pub(crate) fn uses_id_refs(&self) -> bool {
        self.id_refs.is_some()
    }

    pub(crate) fn observed_keys(&self) -> Vec<PropKey> {
        self.refs.keys().cloned().collect()
    }
}
