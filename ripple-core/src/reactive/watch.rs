//! Watchers
//!
//! A watcher is an effect whose body reads exactly one source and hands
//! `(new, old)` to a callback when the value read differs from the value
//! captured on the previous run. The callback runs untracked, so nothing it
//! reads becomes a dependency of the watcher.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::context::untracked;
use super::effect::Effect;
use super::signal::Signal;
use super::subscriber::ComputationId;
use crate::error::BoxError;
use crate::graph::NodeKind;

/// Handle to a running watcher.
#[derive(Clone, PartialEq, Eq)]
pub struct Watcher {
    effect: Effect,
}

impl Watcher {
    /// Watch the value produced by `source`.
    ///
    /// `source` runs immediately to capture the initial value; the callback
    /// does not fire for it.
    pub fn new<T, S, C>(source: S, callback: C) -> Self
    where
        T: Clone + PartialEq + 'static,
        S: Fn() -> T + 'static,
        C: Fn(&T, &T) + 'static,
    {
        Self::with_label("watcher", source, callback)
    }

    /// Like [`Watcher::new`], with a label for diagnostics.
    pub fn with_label<T, S, C>(label: &str, source: S, callback: C) -> Self
    where
        T: Clone + PartialEq + 'static,
        S: Fn() -> T + 'static,
        C: Fn(&T, &T) + 'static,
    {
        let previous: RefCell<Option<T>> = RefCell::new(None);
        let body = move || {
            let current = source();
            // The borrow ends before the callback, which may write the
            // watched value and rerun this body.
            let old = previous.replace(Some(current.clone()));
            if let Some(old) = old {
                if old != current {
                    untracked(|| callback(&current, &old));
                }
            }
            Ok::<(), BoxError>(())
        };

        let effect = Effect::register(NodeKind::Watcher, label, Rc::new(body));
        effect.run();
        Self { effect }
    }

    pub fn id(&self) -> ComputationId {
        self.effect.id()
    }

    /// Stop watching. Idempotent.
    pub fn dispose(&self) {
        self.effect.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.effect.is_disposed()
    }

    /// Number of times the source has been read.
    pub fn run_count(&self) -> usize {
        self.effect.run_count()
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.id())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Call `callback(new, old)` whenever `signal` changes value.
pub fn watch_signal<T, C>(signal: &Signal<T>, callback: C) -> Watcher
where
    T: Clone + PartialEq + 'static,
    C: Fn(&T, &T) + 'static,
{
    let signal = signal.clone();
    Watcher::new(move || signal.get(), callback)
}
