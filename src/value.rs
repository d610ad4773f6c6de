use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use indexmap::{IndexMap, IndexSet};
use crate::class::ClassDescriptor;
use crate::computed::ComputedV2;
use crate::error::{Result, StateError};
use crate::monitor::MonitorV2;
use crate::observe::TargetMeta;
use crate::proxy::Observed;
use crate::pu::PuHandler;

/// Identity of a container. Two handles refer to the same container iff their ids match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetId(u64);

thread_local! {
    static NEXT_TARGET_ID: Cell<u64> = Cell::new(0);
}

impl TargetId {
    fn next() -> TargetId {
        NEXT_TARGET_ID.with(|cell| {
            let id = cell.get() + 1;
            cell.set(id);
            TargetId(id)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Object,
    Array,
    Map,
    Set,
    Date,
}

/// The contents of a container. Values stored here are always raw (never [Value::Observed]).
#[derive(Debug)]
pub enum Container {
    Object(IndexMap<Rc<str>, Value>),
    Array(Vec<Value>),
    Map(IndexMap<Key, Value>),
    Set(IndexSet<Key>),
    /// Milliseconds since the unix epoch, `NaN` for an invalid date.
    Date(f64),
}

/// A dynamically typed application value.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    /// A raw container: reads and writes through it are never observed.
    Ref(ObjectRef),
    /// A container seen through an observing proxy.
    Observed(Observed),
    Function(NativeFn),
}

#[derive(Clone)]
pub struct NativeFn(Rc<dyn Fn(&[Value]) -> Value>);

/// Key of a Map or element of a Set. Primitive keys compare like `SameValueZero`,
/// container keys by identity.
#[derive(Clone)]
pub enum Key {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Object(ObjectRef),
}

pub(crate) struct ObjectCell {
    pub(crate) id: TargetId,
    pub(crate) data: RefCell<Container>,
    pub(crate) class: Option<Rc<ClassDescriptor>>,
    /// Dependency metadata: which bind ids read which property of this target.
    pub(crate) meta: RefCell<TargetMeta>,
    pub(crate) computed: RefCell<HashMap<Rc<str>, Rc<ComputedV2>>>,
    pub(crate) monitors: RefCell<Vec<Rc<MonitorV2>>>,
    /// Set once the container is wrapped as a V1 `ObservedObject`.
    pub(crate) pu_handler: RefCell<Option<Rc<PuHandler>>>,
}

/// Shared handle to a raw container.
#[derive(Clone)]
pub struct ObjectRef(pub(crate) Rc<ObjectCell>);

#[derive(Clone)]
pub struct WeakObjectRef(pub(crate) Weak<ObjectCell>);

impl Container {
    pub fn kind(&self) -> ContainerKind {
        match self {
            Container::Object(_) => ContainerKind::Object,
            Container::Array(_) => ContainerKind::Array,
            Container::Map(_) => ContainerKind::Map,
            Container::Set(_) => ContainerKind::Set,
            Container::Date(_) => ContainerKind::Date,
        }
    }

    fn empty_like(&self) -> Container {
        match self {
            Container::Object(_) => Container::Object(IndexMap::new()),
            Container::Array(_) => Container::Array(Vec::new()),
            Container::Map(_) => Container::Map(IndexMap::new()),
            Container::Set(_) => Container::Set(IndexSet::new()),
            Container::Date(ms) => Container::Date(*ms),
        }
    }
}

impl ObjectRef {
    pub(crate) fn from_parts(data: Container, class: Option<Rc<ClassDescriptor>>) -> Self {
        ObjectRef(Rc::new(ObjectCell {
            id: TargetId::next(),
            data: RefCell::new(data),
            class,
            meta: RefCell::new(TargetMeta::default()),
            computed: RefCell::new(HashMap::new()),
            monitors: RefCell::new(Vec::new()),
            pu_handler: RefCell::new(None),
        }))
    }

    pub fn new_object<K: Into<Rc<str>>, V: Into<Value>>(fields: impl IntoIterator<Item = (K, V)>) -> Self {
        Self::from_parts(Container::Object(collect_fields(fields)), None)
    }

    /// An instance of a described type (`@ObservedV2` / `@Observed` class).
    pub fn new_instance<K: Into<Rc<str>>, V: Into<Value>>(class: &Rc<ClassDescriptor>, fields: impl IntoIterator<Item = (K, V)>) -> Self {
        Self::from_parts(Container::Object(collect_fields(fields)), Some(class.clone()))
    }

    pub fn new_array<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        let items = items.into_iter().map(|v| v.into().into_stored()).collect();
        Self::from_parts(Container::Array(items), None)
    }

    pub fn new_map<K: Into<Key>, V: Into<Value>>(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        let entries = entries.into_iter().map(|(k, v)| (k.into(), v.into().into_stored())).collect();
        Self::from_parts(Container::Map(entries), None)
    }

    pub fn new_set<K: Into<Key>>(values: impl IntoIterator<Item = K>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        Self::from_parts(Container::Set(values), None)
    }

    pub fn new_date(epoch_millis: f64) -> Self {
        Self::from_parts(Container::Date(epoch_millis), None)
    }

    pub fn id(&self) -> TargetId {
        self.0.id
    }

    pub fn kind(&self) -> ContainerKind {
        self.0.data.borrow().kind()
    }

    pub fn class(&self) -> Option<&Rc<ClassDescriptor>> {
        self.0.class.as_ref()
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef(Rc::downgrade(&self.0))
    }

    /// Unobserved read access to the contents.
    pub fn borrow(&self) -> Ref<'_, Container> {
        self.0.data.borrow()
    }

    /// Unobserved write access to the contents. Nothing is notified.
    pub fn borrow_mut(&self) -> RefMut<'_, Container> {
        self.0.data.borrow_mut()
    }

    /// Unobserved field read; `Undefined` for missing fields and non-objects.
    pub fn raw_get(&self, field: &str) -> Value {
        match &*self.borrow() {
            Container::Object(fields) => fields.get(field).cloned().unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        }
    }

    pub fn raw_has(&self, field: &str) -> bool {
        matches!(&*self.borrow(), Container::Object(fields) if fields.contains_key(field))
    }

    /// Unobserved field write; ignored for non-objects.
    pub fn raw_set(&self, field: &str, value: impl Into<Value>) {
        if let Container::Object(fields) = &mut *self.borrow_mut() {
            fields.insert(Rc::from(field), value.into().into_stored());
        }
    }

    /// Number of fields, elements or entries. Unobserved.
    pub fn raw_len(&self) -> usize {
        match &*self.borrow() {
            Container::Object(fields) => fields.len(),
            Container::Array(items) => items.len(),
            Container::Map(entries) => entries.len(),
            Container::Set(values) => values.len(),
            Container::Date(_) => 0,
        }
    }

    pub(crate) fn computed(&self, name: &str) -> Option<Rc<ComputedV2>> {
        self.0.computed.borrow().get(name).cloned()
    }

    pub(crate) fn pu_handler(&self) -> Option<Rc<PuHandler>> {
        self.0.pu_handler.borrow().clone()
    }

    pub(crate) fn meta(&self) -> &RefCell<TargetMeta> {
        &self.0.meta
    }
}

impl Debug for WeakObjectRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.upgrade() {
            Some(target) => write!(f, "Weak({:?})", target),
            None => write!(f, "Weak(dropped)"),
        }
    }
}

impl WeakObjectRef {
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.0.upgrade().map(ObjectRef)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

fn collect_fields<K: Into<Rc<str>>, V: Into<Value>>(fields: impl IntoIterator<Item = (K, V)>) -> IndexMap<Rc<str>, Value> {
    fields.into_iter().map(|(k, v)| (k.into(), v.into().into_stored())).collect()
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state)
    }
}

impl Debug for ObjectRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.kind(), self.id().0)
    }
}

impl Value {
    /// `===`: primitives by value, containers by identity of the raw target
    /// (a proxy and its target are the same value).
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(&a.0, &b.0),
            _ => match (self.target(), other.target()) {
                (Some(a), Some(b)) => a.ptr_eq(b),
                _ => false,
            },
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The raw container behind a `Ref` or `Observed` value.
    pub fn target(&self) -> Option<&ObjectRef> {
        match self {
            Value::Ref(target) => Some(target),
            Value::Observed(observed) => Some(observed.target()),
            _ => None,
        }
    }

    pub fn as_observed(&self) -> Option<&Observed> {
        match self {
            Value::Observed(observed) => Some(observed),
            _ => None,
        }
    }

    pub fn observed(&self) -> Result<&Observed> {
        self.as_observed().ok_or(StateError::NotObserved(self.type_name()))
    }

    pub fn is_container(&self) -> bool {
        self.target().is_some()
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Ref(_) => "object",
            Value::Observed(_) => "observed object",
            Value::Function(_) => "function",
        }
    }

    /// Containers store raw targets, never proxies.
    pub(crate) fn into_stored(self) -> Value {
        match self {
            Value::Observed(observed) => Value::Ref(observed.target().clone()),
            other => other,
        }
    }

    /// Copies every reachable container, including containers used as Map keys or Set
    /// elements. A container reachable over several paths is copied once, so shared
    /// references stay shared in the copy.
    pub fn deep_copy(&self) -> Value {
        let mut copied = HashMap::new();
        deep_copy_value(self, &mut copied)
    }

    /// Copies the outermost container only; nested containers are shared.
    pub fn shallow_copy(&self) -> Value {
        let Some(target) = self.target() else {
            return self.clone();
        };
        let data = match &*target.borrow() {
            Container::Object(fields) => Container::Object(fields.clone()),
            Container::Array(items) => Container::Array(items.clone()),
            Container::Map(entries) => Container::Map(entries.clone()),
            Container::Set(values) => Container::Set(values.clone()),
            Container::Date(ms) => Container::Date(*ms),
        };
        let copy = ObjectRef::from_parts(data, target.class().cloned());
        if let Some(handler) = target.pu_handler() {
            *copy.0.pu_handler.borrow_mut() = Some(handler.fresh());
        }
        Value::Ref(copy)
    }
}

fn deep_copy_value(value: &Value, copied: &mut HashMap<TargetId, ObjectRef>) -> Value {
    match value.target() {
        Some(target) => Value::Ref(deep_copy_target(target, copied)),
        None => value.clone(),
    }
}

fn deep_copy_key(key: &Key, copied: &mut HashMap<TargetId, ObjectRef>) -> Key {
    match key {
        Key::Object(target) => Key::Object(deep_copy_target(target, copied)),
        other => other.clone(),
    }
}

fn deep_copy_target(target: &ObjectRef, copied: &mut HashMap<TargetId, ObjectRef>) -> ObjectRef {
    if let Some(done) = copied.get(&target.id()) {
        return done.clone();
    }
    let copy = ObjectRef::from_parts(target.borrow().empty_like(), target.class().cloned());
    if let Some(handler) = target.pu_handler() {
        *copy.0.pu_handler.borrow_mut() = Some(handler.fresh());
    }
    // registered before descending so cycles and shared children resolve to the copy
    copied.insert(target.id(), copy.clone());
    let data = match &*target.borrow() {
        Container::Object(fields) => Container::Object(fields.iter().map(|(k, v)| (k.clone(), deep_copy_value(v, copied))).collect()),
        Container::Array(items) => Container::Array(items.iter().map(|v| deep_copy_value(v, copied)).collect()),
        Container::Map(entries) => Container::Map(entries.iter().map(|(k, v)| (deep_copy_key(k, copied), deep_copy_value(v, copied))).collect()),
        Container::Set(values) => Container::Set(values.iter().map(|k| deep_copy_key(k, copied)).collect()),
        Container::Date(ms) => Container::Date(*ms),
    };
    *copy.borrow_mut() = data;
    copy
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_value(other)
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Ref(target) => write!(f, "{:?}", target),
            Value::Observed(observed) => write!(f, "Observed({:?})", observed.target()),
            Value::Function(_) => write!(f, "function"),
        }
    }
}

impl NativeFn {
    pub fn new(f: impl Fn(&[Value]) -> Value + 'static) -> Self {
        NativeFn(Rc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.0)(args)
    }
}

impl Key {
    pub fn from_value(value: &Value) -> Result<Key> {
        Ok(match value {
            Value::Undefined => Key::Undefined,
            Value::Null => Key::Null,
            Value::Bool(b) => Key::Bool(*b),
            Value::Number(n) => Key::Number(*n),
            Value::Str(s) => Key::Str(s.clone()),
            Value::Ref(target) => Key::Object(target.clone()),
            Value::Observed(observed) => Key::Object(observed.target().clone()),
            Value::Function(_) => {
                return Err(StateError::UnsupportedValue { name: "key".to_string(), reason: "functions can not be used as keys" })
            }
        })
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::Undefined => Value::Undefined,
            Key::Null => Value::Null,
            Key::Bool(b) => Value::Bool(*b),
            Key::Number(n) => Value::Number(*n),
            Key::Str(s) => Value::Str(s.clone()),
            Key::Object(target) => Value::Ref(target.clone()),
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::Undefined, Key::Undefined) | (Key::Null, Key::Null) => true,
            (Key::Bool(a), Key::Bool(b)) => a == b,
            (Key::Number(a), Key::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Key::Str(a), Key::Str(b)) => a == b,
            (Key::Object(a), Key::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Key::Undefined | Key::Null => {}
            Key::Bool(b) => b.hash(state),
            Key::Number(n) => {
                // -0 and 0 are the same key, every NaN is the same key
                let canonical = if *n == 0.0 { 0.0f64 } else if n.is_nan() { f64::NAN } else { *n };
                canonical.to_bits().hash(state)
            }
            Key::Str(s) => s.hash(state),
            Key::Object(target) => target.id().hash(state),
        }
    }
}

impl Debug for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&self.to_value(), f)
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Str(s) => write!(f, "{}", s),
            other => Debug::fmt(other, f),
        }
    }
}

impl Display for ContainerKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ContainerKind::Object => "Object",
            ContainerKind::Array => "Array",
            ContainerKind::Map => "Map",
            ContainerKind::Set => "Set",
            ContainerKind::Date => "Date",
        };
        f.write_str(name)
    }
}

impl Debug for NativeFn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("NativeFn")
    }
}

// region conversions

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<ObjectRef> for Value {
    fn from(target: ObjectRef) -> Self {
        Value::Ref(target)
    }
}

impl From<Observed> for Value {
    fn from(observed: Observed) -> Self {
        Value::Observed(observed)
    }
}

impl From<NativeFn> for Value {
    fn from(f: NativeFn) -> Self {
        Value::Function(f)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(Rc::from(s))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(Rc::from(s))
    }
}

impl From<f64> for Key {
    fn from(n: f64) -> Self {
        Key::Number(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Number(n as f64)
    }
}

impl From<bool> for Key {
    fn from(b: bool) -> Self {
        Key::Bool(b)
    }
}

impl From<ObjectRef> for Key {
    fn from(target: ObjectRef) -> Self {
        Key::Object(target)
    }
}

// endregion
