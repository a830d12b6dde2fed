//! Signal Implementation
//!
//! A Signal is the fundamental typed reactive primitive. It holds a value
//! and tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a computation (memo/effect), the runtime
//!    records an edge from the signal to that computation.
//!
//! 2. When a signal's value changes, every subscribed computation is
//!    notified. Writing a value equal to the current one is a no-op.
//!
//! 3. Notifications re-run effects and invalidate memos.
//!
//! # Memory Layout
//!
//! A signal is a reference-counted handle to:
//! - A unique subject ID (8 bytes)
//! - The value, behind a `RefCell`
//!
//! Subscribers are not stored in the signal; they live in the runtime's
//! subscriber table and are removed when the last handle is dropped.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::runtime::Runtime;
use super::subscriber::{EdgeKey, SubjectId};

struct SignalInner<T> {
    id: SubjectId,
    value: RefCell<T>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        Runtime::release_subject(self.id);
    }
}

/// A reactive signal holding a value of type T.
///
/// Clones share the same value and identity.
///
/// # Example
///
/// ```rust
/// use ripple_core::Signal;
///
/// let count = Signal::new(0);
/// assert_eq!(count.get(), 0);
///
/// count.set(5);
/// count.update(|n| n + 1);
/// assert_eq!(count.get(), 6);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T: 'static> Signal<T> {
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                id: SubjectId::new(),
                value: RefCell::new(value),
            }),
        }
    }

    /// Get the signal's unique subject ID.
    pub fn id(&self) -> SubjectId {
        self.inner.id
    }

    fn key(&self) -> EdgeKey {
        EdgeKey::value(self.inner.id)
    }

    /// Get the current value.
    ///
    /// If called within a computation, this also registers the computation
    /// as a subscriber.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        Runtime::track(self.key());
        self.get_untracked()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Borrow the value for the duration of `f`, tracking the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        Runtime::track(self.key());
        f(&self.inner.value.borrow())
    }

    /// Set a new value and notify subscribers.
    ///
    /// If the new value equals the current one nothing happens, which keeps
    /// redundant writes from cascading.
    pub fn set(&self, value: T)
    where
        T: PartialEq,
    {
        {
            let mut guard = self.inner.value.borrow_mut();
            if *guard == value {
                return;
            }
            *guard = value;
        }
        self.notify();
    }

    /// Update the value using a function.
    ///
    /// This is useful for updates that depend on the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
        T: PartialEq,
    {
        let new_value = f(&self.inner.value.borrow());
        self.set(new_value);
    }

    /// Mutate the value in place and notify unconditionally.
    pub fn update_in_place(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.inner.value.borrow_mut());
        self.notify();
    }

    /// Notify subscribers without changing the value.
    pub fn notify(&self) {
        Runtime::trigger(&self.key());
    }

    /// Get the number of computations that read this signal in their latest
    /// run.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(&self.key())
    }

    /// Whether two handles refer to the same signal.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Default + 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
