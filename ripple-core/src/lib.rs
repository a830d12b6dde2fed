//! Ripple Core
//!
//! This crate provides the dependency-tracking engine behind the Ripple
//! reactive state runtime. It implements:
//!
//! - Observed state: objects and arrays whose field reads are tracked and
//!   whose writes notify exactly the computations that read them
//! - Typed reactive primitives (signals, memos, effects, watchers)
//! - Batching, pausing and a deduplicated, ordered flush
//! - An array-mutation bridge that makes in-place list mutation observable
//!
//! The engine is UI-agnostic and single-threaded: every thread gets its own
//! runtime, and everything runs synchronously inside the call that caused it.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Tracking context, runtime, and the typed primitives
//! - `graph`: Computation arena, subscriber table, and batch scheduler
//! - `observed`: Raw value graphs and the tracked views over them
//! - `config`: Runtime limits
//! - `error`: Error types
//!
//! # Example
//!
//! ```rust
//! use ripple_core::{batch, create, effect};
//! use serde_json::json;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let state = create(json!({"count": 0})).into_object().unwrap();
//! let log = Rc::new(RefCell::new(Vec::new()));
//!
//! let (s, l) = (state.clone(), log.clone());
//! let e = effect(move || l.borrow_mut().push(s.get("count").as_f64()));
//!
//! state.set("count", 5).unwrap();
//! batch(|| {
//!     state.set("count", 6).unwrap();
//!     state.set("count", 7).unwrap();
//! });
//!
//! assert_eq!(*log.borrow(), vec![Some(0.0), Some(5.0), Some(7.0)]);
//! e.dispose();
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod observed;
pub mod reactive;

pub use config::RuntimeConfig;
pub use error::{BoxError, ReactiveError, Result};
pub use observed::{
    Computed, Observed, ObservedArray, ObservedObject, RawArray, RawObject, Reactive, Value,
};
pub use reactive::{
    effect, try_effect, untracked, watch_signal, Effect, Memo, MemoState, Runtime, RuntimeStats,
    Signal, Watcher,
};

/// Observe a value.
///
/// Objects and arrays come back wrapped; primitives come back unchanged.
pub fn create(target: impl Into<Value>) -> Observed {
    Observed::from(target.into())
}

/// Install a computed field `key` on `state`. See [`ObservedObject::computed`].
pub fn computed<F>(state: &ObservedObject, key: &str, derive: F) -> Result<Computed>
where
    F: Fn(&ObservedObject) -> Value + 'static,
{
    state.computed(key, derive)
}

/// Call `callback(new, old)` whenever `state[key]` changes value.
pub fn watch<C>(state: &ObservedObject, key: &str, callback: C) -> Watcher
where
    C: Fn(&Observed, &Observed) + 'static,
{
    state.watch(key, callback)
}

/// Run `f` with triggers deferred; each triggered computation then runs
/// once. Returns what `f` returns.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    Runtime::batch(f)
}

/// Whether reads through `value` are tracked.
pub fn is_reactive<V: Reactive + ?Sized>(value: &V) -> bool {
    value.is_reactive()
}

/// The raw value behind one level of wrapping.
pub fn to_raw<V: Reactive + ?Sized>(value: &V) -> Value {
    value.to_raw()
}

/// Queue every trigger until [`resume`].
pub fn pause() {
    Runtime::pause();
}

/// Lift a [`pause`], running the queued computations when `flush_pending`
/// is set and discarding them otherwise.
pub fn resume(flush_pending: bool) {
    Runtime::resume(flush_pending);
}

/// Patch the array in `state[key]` so in-place mutation notifies `key`.
pub fn patch_array(state: &ObservedObject, key: &str) -> Result<bool> {
    state.patch_array(key)
}

/// Counters for the current thread's runtime.
pub fn stats() -> RuntimeStats {
    Runtime::stats()
}

/// Replace the current thread's runtime limits.
pub fn configure(config: RuntimeConfig) -> Result<()> {
    Runtime::configure(config)
}
