//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a field is read,
//! the runtime registers the current computation as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! When a computation runs we push its id onto the stack; when it completes,
//! the guard pops it. Nested runs (a computed recomputing while an effect is
//! running, or an effect created inside another) push on top without losing
//! the outer computation's context.
//!
//! An untracked frame can be pushed to suspend tracking for a region of code.

use std::cell::RefCell;

use super::ComputationId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextEntry {
    /// Reads are attributed to this computation.
    Tracking(ComputationId),
    /// Reads are not attributed to anything.
    Untracked,
}

/// Guard that pops the context when dropped.
///
/// This keeps the stack balanced even if the computation panics.
pub struct ReactiveContext {
    entry: ContextEntry,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given computation.
    ///
    /// The context is automatically exited when the returned guard is dropped.
    pub fn enter(computation: ComputationId) -> Self {
        Self::push(ContextEntry::Tracking(computation))
    }

    /// Enter a region in which reads are not tracked.
    pub fn untracked() -> Self {
        Self::push(ContextEntry::Untracked)
    }

    fn push(entry: ContextEntry) -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(entry));
        Self { entry }
    }

    /// Check if reads are currently being attributed to a computation.
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Get the computation reads are attributed to, if any.
    pub fn current_subscriber() -> Option<ComputationId> {
        CONTEXT_STACK.with(|stack| match stack.borrow().last() {
            Some(ContextEntry::Tracking(id)) => Some(*id),
            _ => None,
        })
    }

    /// Number of frames on the stack, tracked or not.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert_eq!(
                popped,
                Some(self.entry),
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.entry,
                popped
            );
        });
    }
}

/// Run `f` without attributing any reads inside it to the current
/// computation.
///
/// ```rust
/// use ripple_core::{effect, untracked, Signal};
///
/// let a = Signal::new(1);
/// let b = Signal::new(2);
/// let (a2, b2) = (a.clone(), b.clone());
/// let e = effect(move || {
///     a2.get();
///     untracked(|| b2.get());
/// });
/// assert_eq!(e.dependency_count(), 1);
/// ```
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}
