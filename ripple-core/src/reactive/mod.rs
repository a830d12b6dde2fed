//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, memos, effects
//! and watchers, plus the runtime that connects them. The dynamic object
//! surface in [`crate::observed`] is built on the same pieces.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the signal
//! automatically registers that context as a dependent. When the signal's
//! value changes, all dependents are notified.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It is marked dirty when
//! one of its dependencies changes and re-evaluates on the next read. Reading
//! a memo is itself a tracked read.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Its dependency set is rebuilt on every run, so it
//! only ever depends on what its latest run actually read.
//!
//! ## Watchers
//!
//! A Watcher reads one source and calls back with `(new, old)` only when the
//! value read actually changed.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a field is read, we check if there is an active
//! tracking context and, if so, register the dependency.

mod context;
mod effect;
mod memo;
mod runtime;
mod signal;
mod subscriber;
mod watch;

pub use context::{untracked, ReactiveContext};
pub use effect::{effect, try_effect, Effect};
pub use memo::{Memo, MemoState};
pub(crate) use memo::ComputedCell;
pub use runtime::{Runtime, RuntimeStats};
pub use signal::Signal;
pub use subscriber::{ComputationId, EdgeKey, FieldKey, SubjectId};
pub use watch::{watch_signal, Watcher};
