//! Observed arrays and the array-mutation bridge.
//!
//! Reads through an [`ObservedArray`] are tracked per index and on the
//! length. In-place mutators (`push`, `splice`, `sort`, ...) do not notify
//! element by element. Instead, after the native mutation:
//!
//! - every computation that read anything from the array is notified, and
//! - if the array is patched into an object field, a fresh shallow copy of
//!   the array is written back into that field through the ordinary write
//!   path, so readers of the field see a new value.
//!
//! Both happen inside one batch, so a reader that depends on the field and
//! on the array's contents still reruns exactly once.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Bound, Range, RangeBounds};

use tracing::trace;

use super::object::ObservedObject;
use super::value::{Observed, RawArray, Value};
use crate::error::{ReactiveError, Result};
use crate::reactive::{untracked, EdgeKey, FieldKey, Runtime, SubjectId};

/// A tracked view of a raw array.
#[derive(Clone)]
pub struct ObservedArray {
    raw: RawArray,
}

impl ObservedArray {
    pub fn wrap(raw: RawArray) -> Self {
        Self { raw }
    }

    /// Wrap a fresh, unpatched array.
    pub fn new(items: Vec<Value>) -> Self {
        Self::wrap(RawArray::new(items))
    }

    pub fn id(&self) -> SubjectId {
        self.raw.id()
    }

    /// The raw array behind this wrapper.
    pub fn raw(&self) -> &RawArray {
        &self.raw
    }

    /// Whether mutations are written back into an object field.
    pub fn is_patched(&self) -> bool {
        self.raw.is_bound()
    }

    fn key(&self, field: FieldKey) -> EdgeKey {
        EdgeKey::new(self.raw.id(), field)
    }

    /// Number of elements. Tracks the length.
    pub fn len(&self) -> usize {
        Runtime::track(self.key(FieldKey::Length));
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read one element, tracking that index. Out of range reads as null.
    pub fn get(&self, index: usize) -> Observed {
        Runtime::track(self.key(FieldKey::Index(index)));
        self.raw.get(index).map_or(Observed::Null, Observed::wrap)
    }

    pub fn get_untracked(&self, index: usize) -> Observed {
        untracked(|| self.get(index))
    }

    /// Read every element. Tracks the length and each index.
    pub fn to_vec(&self) -> Vec<Observed> {
        let items = self.raw.to_vec();
        Runtime::track(self.key(FieldKey::Length));
        for index in 0..items.len() {
            Runtime::track(self.key(FieldKey::Index(index)));
        }
        items.into_iter().map(Observed::wrap).collect()
    }

    /// Assign one element, or append when `index == len`.
    ///
    /// Notifies that index, and the length when the array grew. Writing a
    /// strictly equal value does nothing.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let (previous, grew) = {
            let mut items = self.raw.0.items.borrow_mut();
            let len = items.len();
            match index.cmp(&len) {
                Ordering::Less if items[index].strict_eq(&value) => return Ok(()),
                Ordering::Less => (Some(std::mem::replace(&mut items[index], value)), false),
                Ordering::Equal => {
                    items.push(value);
                    (None, true)
                }
                Ordering::Greater => return Err(ReactiveError::IndexOutOfBounds { index, len }),
            }
        };

        let element = self.key(FieldKey::Index(index));
        if grew {
            let length = self.key(FieldKey::Length);
            Runtime::batch(|| {
                Runtime::trigger(&element);
                Runtime::trigger(&length);
            });
        } else {
            Runtime::trigger(&element);
        }
        drop(previous);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------------

    fn mutate<R>(&self, op: &'static str, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        let result = f(&mut self.raw.0.items.borrow_mut());
        self.commit(op);
        result
    }

    fn commit(&self, op: &'static str) {
        let binding = self.raw.binding();
        trace!(array = %self.id(), op, patched = binding.is_some(), "array mutated");
        Runtime::batch(|| {
            Runtime::trigger_subject(self.raw.id());
            if let Some((owner, field)) = binding {
                let copy = RawArray::new(self.raw.to_vec());
                ObservedObject::wrap(owner).write(field, Value::Array(copy));
            }
        });
    }

    /// Append an element; returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        self.mutate("push", |items| {
            items.push(value);
            items.len()
        })
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<Value> {
        self.mutate("pop", Vec::pop)
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Option<Value> {
        self.mutate("shift", |items| (!items.is_empty()).then(|| items.remove(0)))
    }

    /// Prepend an element; returns the new length.
    pub fn unshift(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        self.mutate("unshift", |items| {
            items.insert(0, value);
            items.len()
        })
    }

    /// Remove `delete_count` elements at `start` and insert `insert` in
    /// their place. Both are clamped to the array. Returns the removed
    /// elements.
    pub fn splice(&self, start: usize, delete_count: usize, insert: Vec<Value>) -> Vec<Value> {
        self.mutate("splice", |items| {
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            items.splice(start..end, insert).collect()
        })
    }

    /// Sort with the natural value order: null, booleans, numbers, strings,
    /// arrays, objects. Numbers use a total order.
    pub fn sort(&self) {
        self.mutate("sort", |items| items.sort_by(compare_values));
    }

    /// Sort with a caller-supplied comparator. The comparator runs untracked.
    pub fn sort_by<F>(&self, mut compare: F)
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        self.mutate("sort", |items| untracked(|| items.sort_by(&mut compare)));
    }

    pub fn reverse(&self) {
        self.mutate("reverse", |items| items.reverse());
    }

    /// Overwrite every index in `range` (clamped to the array) with `value`.
    pub fn fill(&self, value: impl Into<Value>, range: impl RangeBounds<usize>) {
        let value = value.into();
        self.mutate("fill", |items| {
            let range = clamp_range(&range, items.len());
            items[range].fill(value);
        });
    }

    /// Copy the elements in `source` over the elements starting at `dest`,
    /// without changing the length. Whatever does not fit is dropped.
    pub fn copy_within(&self, source: impl RangeBounds<usize>, dest: usize) {
        self.mutate("copy_within", |items| {
            let len = items.len();
            let source = clamp_range(&source, len);
            let count = source.len().min(len.saturating_sub(dest));
            if count > 0 {
                let chunk = items[source.start..source.start + count].to_vec();
                items[dest..dest + count].clone_from_slice(&chunk);
            }
        });
    }

    /// Whether two handles wrap the same raw array.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.raw.ptr_eq(&other.raw)
    }
}

impl PartialEq for ObservedArray {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ObservedArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservedArray")
            .field("raw", &self.raw)
            .field("patched", &self.is_patched())
            .finish()
    }
}

fn clamp_range(range: &impl RangeBounds<usize>, len: usize) -> Range<usize> {
    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s.saturating_add(1),
        Bound::Unbounded => 0,
    }
    .min(len);
    let end = match range.end_bound() {
        Bound::Included(&e) => e.saturating_add(1),
        Bound::Excluded(&e) => e,
        Bound::Unbounded => len,
    }
    .min(len);
    start..end.max(start)
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x.total_cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x.id().cmp(&y.id()),
        (Value::Object(x), Value::Object(y)) => x.id().cmp(&y.id()),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect;
    use serde_json::json;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn state(json: serde_json::Value) -> ObservedObject {
        Observed::wrap(Value::from_json(json)).into_object().unwrap()
    }

    fn numbers(array: &ObservedArray) -> Vec<f64> {
        array
            .raw()
            .to_vec()
            .iter()
            .filter_map(Value::as_f64)
            .collect()
    }

    #[test]
    fn arrays_present_at_first_wrap_are_patched() {
        let s = state(json!({"list": [1, 2]}));
        assert!(s.array("list").unwrap().is_patched());
    }

    #[test]
    fn push_reruns_length_reader_once() {
        let s = state(json!({"list": [1, 2]}));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (obj, log) = (s.clone(), seen.clone());
        let e = effect(move || {
            let len = obj.array("list").map_or(0, |list| list.len());
            log.borrow_mut().push(len);
        });

        assert_eq!(s.array("list").unwrap().push(3), 3);
        assert_eq!(*seen.borrow(), vec![2, 3]);
        e.dispose();
    }

    #[test]
    fn mutation_replaces_field_with_a_copy() {
        let s = state(json!({"list": [1, 2]}));
        let before = s.array("list").unwrap();
        before.push(3);

        let after = s.array("list").unwrap();
        assert_ne!(before, after);
        assert!(after.is_patched());
        assert_eq!(numbers(&after), vec![1.0, 2.0, 3.0]);

        // The old handle still reaches the field through its binding.
        before.push(4);
        assert_eq!(numbers(&s.array("list").unwrap()), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn unpatched_arrays_notify_their_own_readers() {
        let grid = ObservedArray::new(vec![Value::from(vec![Value::from(1)])]);
        let inner = grid.get(0).into_array().unwrap();
        assert!(!inner.is_patched());

        let runs = Rc::new(Cell::new(0));
        let (i, r) = (inner.clone(), runs.clone());
        let e = effect(move || {
            i.to_vec();
            r.set(r.get() + 1);
        });

        inner.push(2);
        assert_eq!(runs.get(), 2);
        inner.reverse();
        assert_eq!(runs.get(), 3);
        assert_eq!(numbers(&inner), vec![2.0, 1.0]);
        e.dispose();
    }

    #[test]
    fn index_writes_notify_only_that_index() {
        let list = ObservedArray::new(vec![Value::from(1), Value::from(2)]);
        let runs = Rc::new(Cell::new(0));
        let (l, r) = (list.clone(), runs.clone());
        let e = effect(move || {
            l.get(0);
            r.set(r.get() + 1);
        });

        list.set(1, 5).unwrap();
        assert_eq!(runs.get(), 1);
        list.set(0, 1).unwrap();
        assert_eq!(runs.get(), 1);
        list.set(0, 7).unwrap();
        assert_eq!(runs.get(), 2);

        list.set(2, 9).unwrap();
        assert!(matches!(
            list.set(10, 0),
            Err(ReactiveError::IndexOutOfBounds { index: 10, len: 3 })
        ));
        e.dispose();
    }

    #[test]
    fn splice_follows_clamping_rules() {
        let list = ObservedArray::new((1..=5).map(Value::from).collect());
        let removed = list.splice(1, 2, vec![Value::from(9)]);
        assert_eq!(removed, vec![Value::from(2), Value::from(3)]);
        assert_eq!(numbers(&list), vec![1.0, 9.0, 4.0, 5.0]);

        let removed = list.splice(10, 1, vec![Value::from(6)]);
        assert!(removed.is_empty());
        assert_eq!(numbers(&list), vec![1.0, 9.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn queue_operations() {
        let list = ObservedArray::new(vec![Value::from(2)]);
        assert_eq!(list.unshift(1), 2);
        assert_eq!(list.shift(), Some(Value::from(1)));
        assert_eq!(list.pop(), Some(Value::from(2)));
        assert_eq!(list.pop(), None);
        assert_eq!(list.shift(), None);
    }

    #[test]
    fn sort_orders_mixed_values() {
        let list = ObservedArray::new(vec![
            Value::from("b"),
            Value::from(3),
            Value::Null,
            Value::from("a"),
            Value::from(-1),
            Value::from(true),
        ]);
        list.sort();
        assert_eq!(
            list.raw().to_vec(),
            vec![
                Value::Null,
                Value::from(true),
                Value::from(-1),
                Value::from(3),
                Value::from("a"),
                Value::from("b"),
            ]
        );

        list.sort_by(|a, b| compare_values(b, a));
        assert_eq!(list.raw().get(0), Some(Value::from("b")));
    }

    #[test]
    fn fill_and_copy_within_clamp() {
        let list = ObservedArray::new((0..5).map(Value::from).collect());
        list.fill(0, 3..);
        assert_eq!(numbers(&list), vec![0.0, 1.0, 2.0, 0.0, 0.0]);

        list.fill(7, 4..100);
        assert_eq!(numbers(&list), vec![0.0, 1.0, 2.0, 0.0, 7.0]);

        list.copy_within(0..3, 3);
        assert_eq!(numbers(&list), vec![0.0, 1.0, 2.0, 0.0, 1.0]);

        list.copy_within(.., 9);
        assert_eq!(list.raw().len(), 5);
    }

    #[test]
    fn late_arrays_need_patching_to_notify_the_field() {
        let s = state(json!({}));
        s.raw().insert("late", Value::from(vec![Value::from(1)]));

        let fired = Rc::new(Cell::new(0));
        let f = fired.clone();
        let w = s.watch("late", move |_, _| f.set(f.get() + 1));

        s.array("late").unwrap().push(2);
        assert_eq!(fired.get(), 0);

        assert!(s.patch_array("late").unwrap());
        s.array("late").unwrap().push(3);
        assert_eq!(fired.get(), 1);
        w.dispose();
    }
}
