//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation and caches the result.
//!
//! 2. When accessed again, if no dependencies have changed, returns the cache.
//!
//! 3. When a dependency changes, the memo is marked dirty and readers of the
//!    memo itself are notified. Nothing is recomputed yet.
//!
//! 4. On next access, the memo recomputes, rebuilding its own dependency
//!    edges exactly as an effect run does.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 memos depend on it
//! - Only the memos actually accessed will recompute
//! - Memos that are never read stay dirty (no wasted work)
//!
//! Because reading a memo is itself a tracked read, an effect that reads a
//! memo is invalidated transitively without knowing what the memo reads.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::context::untracked;
use super::runtime::{report, Runtime};
use super::subscriber::{ComputationId, EdgeKey, SubjectId};
use crate::error::{ReactiveError, Result};
use crate::graph::{NodeKind, Reaction};

/// Dirty state for a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency changed (or the memo was never read). The next read
    /// recomputes.
    Dirty,

    /// The memo was disposed and keeps returning its last value.
    Disposed,
}

/// The cache and dirty flag shared by [`Memo`] and computed object fields.
///
/// Readers subscribe to `key`; the runtime node flips `dirty` and notifies
/// `key` when any dependency of the derivation changes.
pub(crate) struct ComputedCell<T> {
    node: ComputationId,
    key: EdgeKey,
    dirty: Rc<Cell<bool>>,
    value: RefCell<Option<T>>,
    recomputations: Cell<usize>,
}

impl<T: Clone> ComputedCell<T> {
    pub fn new(label: &str, key: EdgeKey, owner: Option<SubjectId>) -> Self {
        let dirty = Rc::new(Cell::new(true));
        let node = Runtime::register(
            NodeKind::Computed,
            Rc::from(label),
            Reaction::Invalidate {
                dirty: Rc::clone(&dirty),
                notifies: key.clone(),
            },
            owner,
        );
        Self {
            node,
            key,
            dirty,
            value: RefCell::new(None),
            recomputations: Cell::new(0),
        }
    }

    pub fn node(&self) -> ComputationId {
        self.node
    }

    pub fn key(&self) -> &EdgeKey {
        &self.key
    }

    /// Read the cached value, recomputing with `derive` first if dirty.
    pub fn read(&self, derive: impl FnOnce() -> T) -> Result<T> {
        Runtime::track(self.key.clone());

        if self.dirty.get() {
            // Cleared before the run so that an invalidation arriving while
            // `derive` runs is not lost.
            self.dirty.set(false);
            if !Runtime::is_alive(self.node) {
                // Disposed: no more tracking, but still produce a value once.
                if self.value.borrow().is_none() {
                    let value = untracked(derive);
                    *self.value.borrow_mut() = Some(value);
                    self.recomputations.set(self.recomputations.get() + 1);
                }
            } else if let Some(outcome) = Runtime::run_tracked(self.node, derive) {
                match outcome {
                    Ok(value) => {
                        *self.value.borrow_mut() = Some(value);
                        self.recomputations.set(self.recomputations.get() + 1);
                    }
                    Err(err) => {
                        report(&err);
                        if self.value.borrow().is_none() {
                            return Err(err);
                        }
                    }
                }
            }
        }

        self.value
            .borrow()
            .clone()
            .ok_or_else(|| ReactiveError::ComputationFailed {
                computation: self.node,
                label: self.key.to_string(),
                message: "no value has been computed".into(),
            })
    }

    pub fn peek(&self) -> Option<T> {
        self.value.borrow().clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub fn has_value(&self) -> bool {
        self.value.borrow().is_some()
    }

    pub fn recomputations(&self) -> usize {
        self.recomputations.get()
    }

    pub fn is_disposed(&self) -> bool {
        !Runtime::is_alive(self.node)
    }

    pub fn dispose(&self) {
        Runtime::dispose(self.node);
    }
}

struct MemoInner<T> {
    subject: SubjectId,
    cell: ComputedCell<T>,
    compute: Box<dyn Fn() -> T>,
}

impl<T> Drop for MemoInner<T> {
    fn drop(&mut self) {
        Runtime::dispose(self.cell.node);
        Runtime::release_subject(self.subject);
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// Clones share the cache. The memo is disposed when the last clone drops.
///
/// # Example
///
/// ```rust
/// use ripple_core::{Memo, Signal};
///
/// let count = Signal::new(2);
/// let c = count.clone();
/// let doubled = Memo::new(move || c.get() * 2);
///
/// assert_eq!(doubled.get(), 4);
/// count.set(3);
/// assert_eq!(doubled.get(), 6);
/// assert_eq!(doubled.recompute_count(), 2);
/// ```
pub struct Memo<T: 'static> {
    inner: Rc<MemoInner<T>>,
}

impl<T: Clone + 'static> Memo<T> {
    /// Create a new memo with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::with_label("memo", compute)
    }

    /// Create a memo whose diagnostics carry `label`.
    pub fn with_label<F>(label: &str, compute: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let subject = SubjectId::new();
        Self {
            inner: Rc::new(MemoInner {
                subject,
                cell: ComputedCell::new(label, EdgeKey::value(subject), None),
                compute: Box::new(compute),
            }),
        }
    }

    /// Get the memo's subject ID (what readers subscribe to).
    pub fn id(&self) -> SubjectId {
        self.inner.subject
    }

    /// Get the ID of the computation that derives the value.
    pub fn computation_id(&self) -> ComputationId {
        self.inner.cell.node()
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// # Panics
    ///
    /// Panics if the computation fails and no earlier value exists. Inside
    /// an effect that panic is caught and logged like any other failure; use
    /// [`Memo::try_get`] to handle it explicitly.
    pub fn get(&self) -> T {
        self.try_get().unwrap_or_else(|err| panic!("{err}"))
    }

    /// Get the current value, or the error from a failed first computation.
    ///
    /// A failed recomputation keeps returning the previous value.
    pub fn try_get(&self) -> Result<T> {
        let inner = &self.inner;
        inner.cell.read(|| (inner.compute)())
    }

    /// Get the cached value without recomputing or tracking.
    pub fn peek(&self) -> Option<T> {
        self.inner.cell.peek()
    }

    /// Get the current dirty state.
    pub fn state(&self) -> MemoState {
        if self.inner.cell.is_disposed() {
            MemoState::Disposed
        } else if self.inner.cell.is_dirty() {
            MemoState::Dirty
        } else {
            MemoState::Clean
        }
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.cell.has_value()
    }

    /// Number of times the computation has run successfully.
    pub fn recompute_count(&self) -> usize {
        self.inner.cell.recomputations()
    }

    /// Get the number of computations that read this memo in their latest
    /// run.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.inner.cell.key())
    }

    /// Stop tracking. The memo keeps returning its last value.
    pub fn dispose(&self) {
        self.inner.cell.dispose();
    }
}

impl<T: 'static> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Debug + 'static> Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.subject)
            .field("state", &self.state())
            .field("value", &self.peek())
            .field("recompute_count", &self.recompute_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
