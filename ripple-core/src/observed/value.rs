//! Raw values.
//!
//! A [`Value`] is plain data: primitives compare by value, objects and arrays
//! are reference-counted and compare by identity. Raw access never tracks and
//! never notifies; wrap a raw object with [`crate::create`] to observe it.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};

use super::array::ObservedArray;
use super::object::ObservedObject;
use crate::reactive::{Runtime, SubjectId};

/// A raw value in an observed graph.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(RawObject),
    Array(RawArray),
}

impl Value {
    /// Strict equality: primitives by value (`NaN` is never equal to
    /// itself), objects and arrays by identity.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Array(a), Self::Array(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&RawObject> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&RawArray> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Build a fresh raw graph from JSON.
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            JsonValue::String(s) => Self::String(Rc::from(s)),
            JsonValue::Array(items) => {
                Self::Array(RawArray::new(items.into_iter().map(Self::from_json).collect()))
            }
            JsonValue::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Deep snapshot as JSON.
    ///
    /// A reference back to an object or array already on the current path
    /// becomes `null`; non-finite numbers become `null` as well.
    pub fn to_json(&self) -> JsonValue {
        self.to_json_inner(&mut HashSet::new())
    }

    fn to_json_inner(&self, path: &mut HashSet<SubjectId>) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Number(n) => JsonNumber::from_f64(*n).map_or(JsonValue::Null, JsonValue::Number),
            Self::String(s) => JsonValue::String(s.to_string()),
            Self::Object(o) => {
                if !path.insert(o.id()) {
                    return JsonValue::Null;
                }
                let map: JsonMap<String, JsonValue> = o
                    .entries()
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_json_inner(path)))
                    .collect();
                path.remove(&o.id());
                JsonValue::Object(map)
            }
            Self::Array(a) => {
                if !path.insert(a.id()) {
                    return JsonValue::Null;
                }
                let items = a.to_vec().iter().map(|v| v.to_json_inner(path)).collect();
                path.remove(&a.id());
                JsonValue::Array(items)
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_eq(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Number(n) => write!(f, "Number({n})"),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::Object(o) => o.fmt(f),
            Self::Array(a) => a.fmt(f),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<RawObject> for Value {
    fn from(o: RawObject) -> Self {
        Self::Object(o)
    }
}

impl From<RawArray> for Value {
    fn from(a: RawArray) -> Self {
        Self::Array(a)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(RawArray::new(items))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        Self::from_json(json)
    }
}

// ----------------------------------------------------------------------------
// Raw objects
// ----------------------------------------------------------------------------

pub(crate) struct ObjectInner {
    pub(crate) id: SubjectId,
    pub(crate) fields: RefCell<IndexMap<Rc<str>, Value>>,
    pub(crate) computed: RefCell<IndexMap<Rc<str>, Rc<super::object::ComputedField>>>,
    // Array fields present at first wrap have been bound to this object.
    pub(crate) patched: Cell<bool>,
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        Runtime::release_subject(self.id);
    }
}

/// A raw object: an ordered map from keys to values with reference identity.
#[derive(Clone)]
pub struct RawObject(pub(crate) Rc<ObjectInner>);

impl RawObject {
    pub fn new() -> Self {
        Self(Rc::new(ObjectInner {
            id: SubjectId::new(),
            fields: RefCell::new(IndexMap::new()),
            computed: RefCell::new(IndexMap::new()),
            patched: Cell::new(false),
        }))
    }

    pub fn id(&self) -> SubjectId {
        self.0.id
    }

    pub fn len(&self) -> usize {
        self.0.fields.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a field without tracking.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.fields.borrow().get(key).cloned()
    }

    /// Write a field without notifying anyone.
    pub fn insert(&self, key: impl Into<Rc<str>>, value: impl Into<Value>) -> Option<Value> {
        self.0.fields.borrow_mut().insert(key.into(), value.into())
    }

    pub fn keys(&self) -> Vec<Rc<str>> {
        self.0.fields.borrow().keys().cloned().collect()
    }

    pub(crate) fn entries(&self) -> Vec<(Rc<str>, Value)> {
        self.0
            .fields
            .borrow()
            .iter()
            .map(|(k, v)| (Rc::clone(k), v.clone()))
            .collect()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> Weak<ObjectInner> {
        Rc::downgrade(&self.0)
    }
}

impl Default for RawObject {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for RawObject
where
    K: Into<Rc<str>>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let object = Self::new();
        {
            let mut fields = object.0.fields.borrow_mut();
            for (k, v) in iter {
                fields.insert(k.into(), v.into());
            }
        }
        object
    }
}

impl fmt::Debug for RawObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Shallow: raw graphs may be cyclic.
        f.debug_struct("RawObject")
            .field("id", &self.0.id)
            .field("keys", &self.keys())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Raw arrays
// ----------------------------------------------------------------------------

/// The object field an array was patched into. Mutators write a fresh copy
/// of the array back through this field.
pub(crate) struct ArrayBinding {
    pub(crate) owner: Weak<ObjectInner>,
    pub(crate) field: Rc<str>,
}

pub(crate) struct ArrayInner {
    pub(crate) id: SubjectId,
    pub(crate) items: RefCell<Vec<Value>>,
    pub(crate) binding: RefCell<Option<ArrayBinding>>,
}

impl Drop for ArrayInner {
    fn drop(&mut self) {
        Runtime::release_subject(self.id);
    }
}

/// A raw array with reference identity.
#[derive(Clone)]
pub struct RawArray(pub(crate) Rc<ArrayInner>);

impl RawArray {
    pub fn new(items: Vec<Value>) -> Self {
        Self(Rc::new(ArrayInner {
            id: SubjectId::new(),
            items: RefCell::new(items),
            binding: RefCell::new(None),
        }))
    }

    pub fn id(&self) -> SubjectId {
        self.0.id
    }

    pub fn len(&self) -> usize {
        self.0.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.items.borrow().get(index).cloned()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.0.items.borrow().clone()
    }

    /// Whether the array is patched into a live object field.
    pub fn is_bound(&self) -> bool {
        self.0
            .binding
            .borrow()
            .as_ref()
            .is_some_and(|b| b.owner.strong_count() > 0)
    }

    /// Patch the array into `owner.field`. The first live binding wins;
    /// returns whether this call created it.
    pub(crate) fn bind(&self, owner: &RawObject, field: &Rc<str>) -> bool {
        if self.is_bound() {
            return false;
        }
        *self.0.binding.borrow_mut() = Some(ArrayBinding {
            owner: owner.downgrade(),
            field: Rc::clone(field),
        });
        true
    }

    pub(crate) fn binding(&self) -> Option<(RawObject, Rc<str>)> {
        let binding = self.0.binding.borrow();
        let binding = binding.as_ref()?;
        let owner = binding.owner.upgrade()?;
        Some((RawObject(owner), Rc::clone(&binding.field)))
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<V: Into<Value>> FromIterator<V> for RawArray {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Debug for RawArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawArray")
            .field("id", &self.0.id)
            .field("len", &self.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Observed values
// ----------------------------------------------------------------------------

/// What a tracked read returns: primitives as-is, objects and arrays wrapped.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Observed {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObservedObject),
    Array(ObservedArray),
}

impl Observed {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObservedObject> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ObservedArray> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<ObservedObject> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<ObservedArray> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Wrap a raw value. Arrays wrapped this way are not bound to a field.
    pub(crate) fn wrap(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::String(s),
            Value::Object(o) => Self::Object(ObservedObject::wrap(o)),
            Value::Array(a) => Self::Array(ObservedArray::wrap(a)),
        }
    }
}

impl From<Value> for Observed {
    fn from(value: Value) -> Self {
        Self::wrap(value)
    }
}

/// Anything that may or may not be an observed wrapper.
pub trait Reactive {
    /// Whether reads through this value are tracked.
    fn is_reactive(&self) -> bool;

    /// The raw value behind one level of wrapping.
    fn to_raw(&self) -> Value;
}

impl Reactive for Value {
    fn is_reactive(&self) -> bool {
        false
    }

    fn to_raw(&self) -> Value {
        self.clone()
    }
}

impl Reactive for Observed {
    fn is_reactive(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Array(_))
    }

    fn to_raw(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(*n),
            Self::String(s) => Value::String(Rc::clone(s)),
            Self::Object(o) => o.to_raw(),
            Self::Array(a) => a.to_raw(),
        }
    }
}

impl Reactive for ObservedObject {
    fn is_reactive(&self) -> bool {
        true
    }

    fn to_raw(&self) -> Value {
        Value::Object(self.raw().clone())
    }
}

impl Reactive for ObservedArray {
    fn is_reactive(&self) -> bool {
        true
    }

    fn to_raw(&self) -> Value {
        Value::Array(self.raw().clone())
    }
}
