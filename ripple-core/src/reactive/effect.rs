//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect re-runs: immediately outside a
//!    batch, or once at the end of the outermost batch.
//!
//! 3. Every run first releases all edges from the previous run, then
//!    re-acquires edges as reads occur. An effect that branches on a flag
//!    only depends on the side of the branch it actually took.
//!
//! # Failures
//!
//! A panic inside the body (or an `Err` from a [`try_effect`] body) is caught
//! at the run boundary, logged with the effect's id and label, and swallowed.
//! Edges read before the failure stay in place, so the effect still re-runs
//! when those fields change.
//!
//! # Lifetime
//!
//! An effect lives until [`Effect::dispose`] is called. Dropping the handle
//! does not stop it; dispose is idempotent.

use std::fmt;
use std::rc::Rc;

use super::runtime::Runtime;
use super::subscriber::ComputationId;
use crate::error::BoxError;
use crate::graph::{EffectBody, NodeKind, Reaction};

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use ripple_core::{effect, Signal};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let count = Signal::new(0);
/// let seen = Rc::new(Cell::new(-1));
///
/// let (c, s) = (count.clone(), seen.clone());
/// let e = effect(move || s.set(c.get()));
/// assert_eq!(seen.get(), 0);
///
/// count.set(5);
/// assert_eq!(seen.get(), 5);
///
/// e.dispose();
/// count.set(6);
/// assert_eq!(seen.get(), 5);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Effect {
    id: ComputationId,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self::with_label("effect", run)
    }

    /// Create an effect whose diagnostics carry `label`.
    pub fn with_label<F>(label: &str, run: F) -> Self
    where
        F: Fn() + 'static,
    {
        let effect = Self::register(NodeKind::Effect, label, infallible(run));
        effect.run();
        effect
    }

    /// Create an effect whose body can fail. An `Err` is logged like a panic.
    pub fn try_new<F, E>(run: F) -> Self
    where
        F: Fn() -> Result<(), E> + 'static,
        E: Into<BoxError>,
    {
        let effect = Self::register(
            NodeKind::Effect,
            "effect",
            Rc::new(move || run().map_err(Into::<BoxError>::into)),
        );
        effect.run();
        effect
    }

    /// Create a new effect without running it immediately.
    ///
    /// It has no dependencies, so nothing triggers it until it is run once
    /// with [`Effect::run`].
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self::register(NodeKind::Effect, "effect", infallible(run))
    }

    pub(crate) fn register(kind: NodeKind, label: &str, body: EffectBody) -> Self {
        let id = Runtime::register(kind, Rc::from(label), Reaction::Run(body), None);
        Self { id }
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> ComputationId {
        self.id
    }

    /// Run the effect now, rebuilding its dependencies. A no-op once
    /// disposed.
    pub fn run(&self) {
        Runtime::run(self.id);
    }

    /// Dispose of the effect.
    ///
    /// All edges are released and the effect never runs again.
    pub fn dispose(&self) {
        Runtime::dispose(self.id);
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        !Runtime::is_alive(self.id)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        Runtime::run_count(self.id)
    }

    /// Get the number of fields read during the latest run.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.id)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

fn infallible<F>(run: F) -> EffectBody
where
    F: Fn() + 'static,
{
    Rc::new(move || {
        run();
        Ok(())
    })
}

/// Create an effect that runs now and again whenever what it read changes.
pub fn effect<F>(run: F) -> Effect
where
    F: Fn() + 'static,
{
    Effect::new(run)
}

/// Create an effect whose body returns a `Result`.
pub fn try_effect<F, E>(run: F) -> Effect
where
    F: Fn() -> Result<(), E> + 'static,
    E: Into<BoxError>,
{
    Effect::try_new(run)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;
    use std::cell::Cell;

    #[test]
    fn effect_runs_on_creation() {
        let run_count = Rc::new(Cell::new(0));
        let run_count_clone = run_count.clone();

        let _effect = Effect::new(move || {
            run_count_clone.set(run_count_clone.get() + 1);
        });

        assert_eq!(run_count.get(), 1);
    }

    #[test]
    fn effect_lazy_does_not_run_on_creation() {
        let run_count = Rc::new(Cell::new(0));
        let run_count_clone = run_count.clone();

        let effect = Effect::new_lazy(move || {
            run_count_clone.set(run_count_clone.get() + 1);
        });

        assert_eq!(run_count.get(), 0);
        assert_eq!(effect.run_count(), 0);

        effect.run();
        assert_eq!(run_count.get(), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let signal = Signal::new(0);
        let run_count = Rc::new(Cell::new(0));
        let (s, c) = (signal.clone(), run_count.clone());

        let effect = Effect::new(move || {
            s.get();
            c.set(c.get() + 1);
        });
        assert_eq!(run_count.get(), 1);

        effect.dispose();
        assert!(effect.is_disposed());
        assert_eq!(effect.dependency_count(), 0);

        signal.set(1);
        effect.run();
        assert_eq!(run_count.get(), 1);

        effect.dispose();
        assert!(effect.is_disposed());
    }

    #[test]
    fn effect_tracks_run_count() {
        let effect = Effect::new(|| {});

        assert_eq!(effect.run_count(), 1);

        effect.run();
        assert_eq!(effect.run_count(), 2);

        effect.run();
        assert_eq!(effect.run_count(), 3);
    }

    #[test]
    fn effect_clone_shares_state() {
        let effect1 = Effect::new(|| {});
        let effect2 = effect1.clone();

        assert_eq!(effect1.id(), effect2.id());

        effect1.run();
        assert_eq!(effect2.run_count(), 2);

        effect1.dispose();
        assert!(effect2.is_disposed());
    }

    #[test]
    fn panicking_body_keeps_edges_read_before_the_panic() {
        let signal = Signal::new(0);
        let runs = Rc::new(Cell::new(0));
        let (s, r) = (signal.clone(), runs.clone());

        let effect = Effect::with_label("explodes", move || {
            r.set(r.get() + 1);
            if s.get() % 2 == 1 {
                panic!("odd value");
            }
        });

        signal.set(1);
        assert_eq!(runs.get(), 2);
        assert_eq!(effect.dependency_count(), 1);

        signal.set(2);
        assert_eq!(runs.get(), 3);
        effect.dispose();
    }

    #[test]
    fn try_effect_errors_are_swallowed() {
        let signal = Signal::new(0);
        let runs = Rc::new(Cell::new(0));
        let (s, r) = (signal.clone(), runs.clone());

        let effect = try_effect(move || {
            r.set(r.get() + 1);
            if s.get() > 0 {
                return Err("positive");
            }
            Ok(())
        });

        signal.set(3);
        signal.set(4);
        assert_eq!(runs.get(), 3);
        effect.dispose();
    }
}
