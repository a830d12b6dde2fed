//! Observed objects.
//!
//! [`ObservedObject`] is a cheap handle over a [`RawObject`]. Every field read
//! through it is tracked as `(object, key)`; every write that changes a field
//! notifies that edge. Nested objects and arrays come back wrapped.
//!
//! A wrapper holds no state of its own, so wrapping the same raw object twice
//! yields two handles that compare equal and behave identically. The one
//! thing wrapping does is patch the object's array fields, once, on first
//! wrap.

use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::array::ObservedArray;
use super::value::{ObjectInner, Observed, RawObject, Value};
use crate::error::{ReactiveError, Result};
use crate::reactive::{untracked, ComputedCell, EdgeKey, FieldKey, Runtime, SubjectId, Watcher};

type Derive = Box<dyn Fn(&ObservedObject) -> Value>;

/// A computed (virtual, read-only) field installed on an object.
pub(crate) struct ComputedField {
    cell: ComputedCell<Value>,
    derive: Derive,
}

impl ComputedField {
    fn read(&self, owner: &ObservedObject) -> Value {
        // Failures are already logged by the cell; readers see null.
        self.cell.read(|| (self.derive)(owner)).unwrap_or_default()
    }
}

/// A tracked view of a raw object.
#[derive(Clone)]
pub struct ObservedObject {
    raw: RawObject,
}

impl ObservedObject {
    /// Wrap a raw object, binding its array fields on first wrap.
    pub fn wrap(raw: RawObject) -> Self {
        if !raw.0.patched.replace(true) {
            for (key, value) in raw.entries() {
                if let Value::Array(array) = value {
                    array.bind(&raw, &key);
                }
            }
        }
        Self { raw }
    }

    /// Wrap a fresh object with no fields.
    pub fn new() -> Self {
        Self::wrap(RawObject::new())
    }

    pub fn id(&self) -> SubjectId {
        self.raw.id()
    }

    /// The raw object behind this wrapper.
    pub fn raw(&self) -> &RawObject {
        &self.raw
    }

    fn key(&self, key: &str) -> EdgeKey {
        EdgeKey::new(self.raw.id(), key)
    }

    fn computed_field(&self, key: &str) -> Option<Rc<ComputedField>> {
        self.raw.0.computed.borrow().get(key).cloned()
    }

    /// Read a field, tracking `(self, key)`. Missing fields read as null.
    pub fn get(&self, key: &str) -> Observed {
        if let Some(field) = self.computed_field(key) {
            // The cell tracks its own key.
            return Observed::wrap(field.read(self));
        }

        Runtime::track(self.key(key));
        self.raw.get(key).map_or(Observed::Null, Observed::wrap)
    }

    /// Read a field without tracking.
    pub fn get_untracked(&self, key: &str) -> Observed {
        untracked(|| self.get(key))
    }

    /// Read a nested object field.
    pub fn object(&self, key: &str) -> Option<ObservedObject> {
        self.get(key).into_object()
    }

    /// Read a nested array field.
    pub fn array(&self, key: &str) -> Option<ObservedArray> {
        self.get(key).into_array()
    }

    /// Write a field.
    ///
    /// Writing a value strictly equal to the current one does nothing.
    /// Otherwise the value is stored and `(self, key)` is notified; adding a
    /// new key also notifies the key set. An array written here is patched
    /// into this field unless it is already patched elsewhere.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        if self.raw.0.computed.borrow().contains_key(key) {
            return Err(ReactiveError::ReadOnlyField { key: key.to_string() });
        }
        self.write(Rc::from(key), value.into());
        Ok(())
    }

    pub(crate) fn write(&self, key: Rc<str>, value: Value) {
        if let Value::Array(array) = &value {
            array.bind(&self.raw, &key);
        }

        let previous = {
            let mut fields = self.raw.0.fields.borrow_mut();
            match fields.get_mut(&key) {
                Some(current) if current.strict_eq(&value) => return,
                Some(current) => Some(std::mem::replace(current, value)),
                None => {
                    fields.insert(Rc::clone(&key), value);
                    None
                }
            }
        };
        let added = previous.is_none();
        trace!(object = %self.id(), field = %key, added, "field written");

        let edge = EdgeKey::new(self.raw.id(), FieldKey::Named(key));
        if added {
            let keys = EdgeKey::new(self.raw.id(), FieldKey::Keys);
            Runtime::batch(|| {
                Runtime::trigger(&edge);
                Runtime::trigger(&keys);
            });
        } else {
            Runtime::trigger(&edge);
        }
        // The old value is released only after subscribers ran.
        drop(previous);
    }

    /// Remove a data field, notifying the field and the key set.
    pub fn remove(&self, key: &str) -> Result<Option<Value>> {
        if self.raw.0.computed.borrow().contains_key(key) {
            return Err(ReactiveError::ReadOnlyField { key: key.to_string() });
        }
        let removed = self.raw.0.fields.borrow_mut().shift_remove(key);
        if removed.is_some() {
            let edge = self.key(key);
            let keys = EdgeKey::new(self.raw.id(), FieldKey::Keys);
            Runtime::batch(|| {
                Runtime::trigger(&edge);
                Runtime::trigger(&keys);
            });
        }
        Ok(removed)
    }

    /// Data field names, in insertion order. Tracks the key set.
    pub fn keys(&self) -> Vec<Rc<str>> {
        Runtime::track(EdgeKey::new(self.raw.id(), FieldKey::Keys));
        self.raw.keys()
    }

    /// Number of data fields. Tracks the key set.
    pub fn len(&self) -> usize {
        Runtime::track(EdgeKey::new(self.raw.id(), FieldKey::Keys));
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` names a data or computed field. Tracks `(self, key)`.
    pub fn contains_key(&self, key: &str) -> bool {
        Runtime::track(self.key(key));
        self.raw.0.fields.borrow().contains_key(key)
            || self.raw.0.computed.borrow().contains_key(key)
    }

    /// Install a read-only virtual field computed from this object.
    ///
    /// `derive` receives the object itself, so it does not need to capture a
    /// handle (which would keep the object alive through its own field). The
    /// value is computed lazily on first read and again on the first read
    /// after any input changes. Readers of the field are notified as soon as
    /// an input changes.
    pub fn computed<F>(&self, key: &str, derive: F) -> Result<Computed>
    where
        F: Fn(&ObservedObject) -> Value + 'static,
    {
        if self.raw.0.fields.borrow().contains_key(key)
            || self.raw.0.computed.borrow().contains_key(key)
        {
            return Err(ReactiveError::FieldConflict { key: key.to_string() });
        }

        let field = Rc::new(ComputedField {
            cell: ComputedCell::new(key, self.key(key), Some(self.id())),
            derive: Box::new(derive),
        });
        self.raw
            .0
            .computed
            .borrow_mut()
            .insert(Rc::from(key), Rc::clone(&field));
        debug!(
            object = %self.id(),
            field = key,
            computation = %field.cell.node(),
            "installed computed field"
        );

        // A reader that looked for the key before it existed must see it now.
        Runtime::trigger(&self.key(key));

        Ok(Computed {
            owner: self.raw.downgrade(),
            field,
        })
    }

    /// Call `callback(new, old)` whenever field `key` changes value.
    ///
    /// The watcher does not keep the object alive; once the object is gone
    /// the watcher never fires again.
    pub fn watch<C>(&self, key: &str, callback: C) -> Watcher
    where
        C: Fn(&Observed, &Observed) + 'static,
    {
        let owner = self.raw.downgrade();
        let field = key.to_string();
        Watcher::with_label(
            key,
            move || match owner.upgrade() {
                Some(inner) => ObservedObject {
                    raw: RawObject(inner),
                }
                .get(&field),
                None => Observed::Null,
            },
            callback,
        )
    }

    /// Patch the array held in `key` so in-place mutation notifies `key`.
    ///
    /// Returns whether the array was newly patched. Needed only for arrays
    /// inserted through the raw object after it was wrapped.
    pub fn patch_array(&self, key: &str) -> Result<bool> {
        match self.raw.get(key) {
            Some(Value::Array(array)) => Ok(array.bind(&self.raw, &Rc::from(key))),
            _ => Err(ReactiveError::NotAnArray { key: key.to_string() }),
        }
    }

    /// Whether two handles wrap the same raw object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.raw.ptr_eq(&other.raw)
    }
}

impl Default for ObservedObject {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ObservedObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ObservedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservedObject")
            .field("raw", &self.raw)
            .finish()
    }
}

/// Handle to a computed field.
///
/// Dropping the handle leaves the field in place; it lives as long as its
/// object.
pub struct Computed {
    owner: Weak<ObjectInner>,
    field: Rc<ComputedField>,
}

impl Computed {
    /// Read the field, tracking it like any other field. Reads as null once
    /// the owning object is gone and nothing was ever computed.
    pub fn get(&self) -> Observed {
        match self.owner.upgrade() {
            Some(inner) => {
                let owner = ObservedObject {
                    raw: RawObject(inner),
                };
                Observed::wrap(self.field.read(&owner))
            }
            None => Observed::wrap(self.field.cell.peek().unwrap_or_default()),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.field.cell.is_dirty()
    }

    /// Number of times the derivation has run successfully.
    pub fn recompute_count(&self) -> usize {
        self.field.cell.recomputations()
    }

    /// Stop tracking inputs. The field keeps its last value.
    pub fn dispose(&self) {
        self.field.cell.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.field.cell.is_disposed()
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("field", self.field.cell.key())
            .field("dirty", &self.is_dirty())
            .field("recompute_count", &self.recompute_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect;
    use serde_json::json;
    use std::cell::{Cell, RefCell};

    fn state(json: serde_json::Value) -> ObservedObject {
        Observed::wrap(Value::from_json(json)).into_object().unwrap()
    }

    #[test]
    fn reads_are_tracked_per_field() {
        let s = state(json!({"a": 1, "b": 2}));
        let runs = Rc::new(Cell::new(0));
        let (obj, r) = (s.clone(), runs.clone());
        let e = effect(move || {
            obj.get("a");
            r.set(r.get() + 1);
        });

        s.set("b", 3).unwrap();
        assert_eq!(runs.get(), 1);
        s.set("a", 5).unwrap();
        assert_eq!(runs.get(), 2);
        e.dispose();
    }

    #[test]
    fn equal_writes_are_ignored() {
        let s = state(json!({"name": "x"}));
        let runs = Rc::new(Cell::new(0));
        let (obj, r) = (s.clone(), runs.clone());
        let e = effect(move || {
            obj.get("name");
            r.set(r.get() + 1);
        });

        s.set("name", "x").unwrap();
        assert_eq!(runs.get(), 1);

        // NaN is never equal to itself, so this always notifies.
        s.set("name", f64::NAN).unwrap();
        s.set("name", f64::NAN).unwrap();
        assert_eq!(runs.get(), 3);
        e.dispose();
    }

    #[test]
    fn nested_objects_are_wrapped_with_stable_identity() {
        let s = state(json!({"user": {"name": "ada"}}));
        let first = s.object("user").unwrap();
        let second = s.object("user").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.get("name").as_str(), Some("ada"));
        assert!(s.get("missing").is_null());
    }

    #[test]
    fn adding_and_removing_keys_notifies_key_set() {
        let s = ObservedObject::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (obj, log) = (s.clone(), seen.clone());
        let e = effect(move || log.borrow_mut().push(obj.keys().len()));

        s.set("a", 1).unwrap();
        s.set("a", 2).unwrap();
        s.set("b", 1).unwrap();
        assert_eq!(s.remove("a").unwrap(), Some(Value::from(2)));
        assert_eq!(s.remove("a").unwrap(), None);
        assert_eq!(*seen.borrow(), vec![0, 1, 2, 1]);
        e.dispose();
    }

    #[test]
    fn contains_key_sees_later_insertions() {
        let s = ObservedObject::new();
        let present = Rc::new(Cell::new(false));
        let (obj, p) = (s.clone(), present.clone());
        let e = effect(move || p.set(obj.contains_key("late")));

        assert!(!present.get());
        s.set("late", true).unwrap();
        assert!(present.get());
        e.dispose();
    }

    #[test]
    fn computed_fields_are_read_only_and_unique() {
        let s = state(json!({"count": 1}));
        let _double = s
            .computed("double", |o| Value::from(o.get("count").as_f64().unwrap_or(0.0) * 2.0))
            .unwrap();

        assert_eq!(s.get("double").as_f64(), Some(2.0));
        assert!(s.contains_key("double"));
        assert!(matches!(s.set("double", 1), Err(ReactiveError::ReadOnlyField { .. })));
        assert!(matches!(s.remove("double"), Err(ReactiveError::ReadOnlyField { .. })));
        assert!(matches!(
            s.computed("count", |_| Value::Null),
            Err(ReactiveError::FieldConflict { .. })
        ));
    }

    #[test]
    fn computed_recomputes_lazily() {
        let s = state(json!({"count": 0}));
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        let double = s
            .computed("double", move |o| {
                c.set(c.get() + 1);
                Value::from(o.get("count").as_f64().unwrap_or(0.0) * 2.0)
            })
            .unwrap();
        assert_eq!(calls.get(), 0);

        s.set("count", 3).unwrap();
        assert!(double.is_dirty());
        for _ in 0..5 {
            assert_eq!(s.get("double").as_f64(), Some(6.0));
        }
        assert_eq!(calls.get(), 1);
        assert_eq!(double.recompute_count(), 1);
        assert_eq!(double.get().as_f64(), Some(6.0));
    }

    #[test]
    fn failing_computed_reads_as_null_until_inputs_recover() {
        let s = state(json!({"n": -1}));
        let _root = s
            .computed("root", |o| {
                let n = o.get("n").as_f64().unwrap_or(0.0);
                assert!(n >= 0.0, "negative input");
                Value::from(n.sqrt())
            })
            .unwrap();

        assert!(s.get("root").is_null());
        s.set("n", 9).unwrap();
        assert_eq!(s.get("root").as_f64(), Some(3.0));
    }

    #[test]
    fn object_watch_reports_changes_of_one_field() {
        let s = state(json!({"count": 0, "other": 0}));
        let calls = Rc::new(RefCell::new(Vec::new()));
        let log = calls.clone();
        let w = s.watch("count", move |new, old| {
            log.borrow_mut().push((new.as_f64(), old.as_f64()));
        });

        s.set("count", 5).unwrap();
        s.set("other", 1).unwrap();
        assert_eq!(*calls.borrow(), vec![(Some(5.0), Some(0.0))]);
        w.dispose();
    }

    #[test]
    fn patch_array_requires_an_array() {
        let s = state(json!({"n": 1}));
        assert!(matches!(s.patch_array("n"), Err(ReactiveError::NotAnArray { .. })));
        assert!(matches!(s.patch_array("none"), Err(ReactiveError::NotAnArray { .. })));

        s.raw().insert("late", Value::from(vec![Value::from(1)]));
        assert!(s.patch_array("late").unwrap());
        assert!(!s.patch_array("late").unwrap());
    }

    #[test]
    fn disposed_computed_derives_once_without_tracking() {
        let s = state(json!({"count": 2}));
        let double = s
            .computed("double", |o| Value::from(o.get("count").as_f64().unwrap_or(0.0) * 2.0))
            .unwrap();

        double.dispose();
        assert!(double.is_disposed());
        assert_eq!(double.get().as_f64(), Some(4.0));
        assert_eq!(double.recompute_count(), 1);
        assert_eq!(Runtime::subscriber_count(&EdgeKey::new(s.id(), "count")), 0);

        s.set("count", 5).unwrap();
        assert_eq!(s.get("double").as_f64(), Some(4.0));
        assert_eq!(double.recompute_count(), 1);
    }
}
