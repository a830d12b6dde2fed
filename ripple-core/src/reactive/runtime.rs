//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects fields, computeds,
//! and effects. It manages the dependency graph and schedules updates when
//! fields change.
//!
//! # How It Works
//!
//! 1. When a computation is created, it registers a node with the runtime.
//!
//! 2. When a computation reads a field, the runtime records the edge
//!    `(subject, field) -> computation`.
//!
//! 3. When a field is written, the runtime:
//!    a. Finds every computation subscribed to it
//!    b. Marks computeds dirty and notifies *their* readers in turn
//!    c. Runs effects now, or queues them if a batch is open or the runtime
//!       is paused
//!    d. Computeds are lazy - they recompute on next access
//!
//! 4. Every run releases the computation's previous edges before executing
//!    its body, so the edges left behind are exactly the fields it just read.
//!
//! # Thread Model
//!
//! Each thread has its own runtime in thread-local storage. Values created on
//! one thread are `!Send` and never observed from another. No borrow of the
//! runtime is ever held while user code runs, so bodies are free to read,
//! write, create and dispose other computations.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tracing::{debug, error, trace, warn};

use super::context::ReactiveContext;
use super::subscriber::{ComputationId, EdgeKey, SubjectId};
use crate::config::{self, RuntimeConfig};
use crate::error::{ReactiveError, Result};
use crate::graph::{
    BatchScheduler, DependencyGraph, Dispatch, FlushStep, Node, NodeKind, Reaction, Subscribers,
};

struct RuntimeState {
    graph: DependencyGraph,
    scheduler: BatchScheduler,
    config: RuntimeConfig,
}

impl RuntimeState {
    fn new() -> Self {
        Self {
            graph: DependencyGraph::new(),
            scheduler: BatchScheduler::new(),
            config: config::default_config(),
        }
    }
}

thread_local! {
    static RUNTIME: RefCell<RuntimeState> = RefCell::new(RuntimeState::new());

    // Subjects dropped while the runtime was borrowed. Released on the next
    // trigger or stats call.
    static ORPHANS: RefCell<Vec<SubjectId>> = const { RefCell::new(Vec::new()) };
}

fn with_runtime<R>(f: impl FnOnce(&mut RuntimeState) -> R) -> R {
    RUNTIME.with(|rt| f(&mut rt.borrow_mut()))
}

// For paths reachable from `Drop`: yields `None` while the runtime is
// borrowed or the thread is tearing it down.
fn try_with_runtime<R>(f: impl FnOnce(&mut RuntimeState) -> R) -> Option<R> {
    RUNTIME
        .try_with(|rt| rt.try_borrow_mut().ok().map(|mut rt| f(&mut rt)))
        .ok()
        .flatten()
}

/// Point-in-time counters describing the current thread's runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeStats {
    /// Live (not disposed) computations.
    pub computations: usize,
    /// Dependency edges across all fields.
    pub edges: usize,
    /// Computations waiting for the next flush.
    pub pending: usize,
    /// Nesting depth of open batches.
    pub batch_depth: u32,
    pub paused: bool,
}

/// The reactive runtime of the current thread.
///
/// This is a facade over thread-local state; all methods are associated
/// functions.
pub struct Runtime;

impl Runtime {
    /// Register a computation with the runtime.
    pub(crate) fn register(
        kind: NodeKind,
        label: Rc<str>,
        reaction: Reaction,
        owner: Option<SubjectId>,
    ) -> ComputationId {
        let id = ComputationId::new();
        with_runtime(|rt| rt.graph.add_node(Node::new(id, kind, label, reaction, owner)));
        trace!(computation = %id, %kind, "registered computation");
        id
    }

    /// Dispose a computation: release every edge, drop it from the pending
    /// set, and make further triggers skip it. Disposing twice is a no-op.
    pub(crate) fn dispose(id: ComputationId) {
        let removed = try_with_runtime(|rt| {
            rt.scheduler.remove(id);
            rt.graph.remove_node(id)
        })
        .flatten();
        if let Some(node) = removed {
            trace!(computation = %id, kind = %node.kind(), "disposed computation");
            // Dropped here, outside the runtime borrow: the body may own the
            // last handle to a subject whose drop calls back into the runtime.
            drop(node);
        }
    }

    pub(crate) fn is_alive(id: ComputationId) -> bool {
        with_runtime(|rt| rt.graph.contains(id))
    }

    pub(crate) fn run_count(id: ComputationId) -> usize {
        with_runtime(|rt| rt.graph.node(id).map_or(0, Node::run_count))
    }

    pub(crate) fn subscriber_count(key: &EdgeKey) -> usize {
        with_runtime(|rt| rt.graph.subscribers_of(key).len())
    }

    pub(crate) fn dependency_count(id: ComputationId) -> usize {
        with_runtime(|rt| rt.graph.node(id).map_or(0, |n| n.dependencies().len()))
    }

    /// Get the computation reads are currently attributed to, if any.
    pub fn current_subscriber() -> Option<ComputationId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if we're inside a tracking context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }

    /// Record that the current computation read `key`.
    ///
    /// Called automatically by every tracked read. Outside a computation,
    /// or inside [`untracked`](crate::untracked), this does nothing.
    pub fn track(key: EdgeKey) {
        let Some(subscriber) = ReactiveContext::current_subscriber() else {
            return;
        };
        let added = with_runtime(|rt| rt.graph.add_edge(key.clone(), subscriber));
        if added {
            trace!(computation = %subscriber, field = %key, "tracked dependency");
        }
    }

    /// Notify every computation subscribed to `key` that it changed.
    pub fn trigger(key: &EdgeKey) {
        drain_orphans();
        let subscribers = with_runtime(|rt| rt.graph.subscribers_of(key));
        if subscribers.is_empty() {
            return;
        }
        trace!(field = %key, subscribers = subscribers.len(), "triggered field");
        Self::notify_all(subscribers);
    }

    /// Notify every computation subscribed to any field of `subject`, as one
    /// batch so each runs at most once.
    pub(crate) fn trigger_subject(subject: SubjectId) {
        drain_orphans();
        let subscribers = with_runtime(|rt| rt.graph.subscribers_of_subject(subject));
        if subscribers.is_empty() {
            return;
        }
        trace!(%subject, subscribers = subscribers.len(), "triggered subject");
        Self::batch(|| Self::notify_all(subscribers));
    }

    fn notify_all(subscribers: Subscribers) {
        enum Action {
            Run,
            Invalidate(EdgeKey),
            Nothing,
        }

        for id in subscribers {
            let action = with_runtime(|rt| {
                let Some(node) = rt.graph.node(id) else {
                    // Disposed by an earlier sibling in this notification.
                    return Action::Nothing;
                };
                if node.is_eager() {
                    match rt.scheduler.dispatch(id) {
                        Dispatch::Run => Action::Run,
                        Dispatch::Deferred | Dispatch::AlreadyQueued => Action::Nothing,
                    }
                } else if let Reaction::Invalidate { dirty, notifies } = node.reaction() {
                    // Only the clean -> dirty transition is propagated; this
                    // also terminates invalidation cycles between computeds.
                    if dirty.replace(true) {
                        Action::Nothing
                    } else {
                        Action::Invalidate(notifies.clone())
                    }
                } else {
                    Action::Nothing
                }
            });

            match action {
                Action::Run => Self::run(id),
                Action::Invalidate(key) => Self::trigger(&key),
                Action::Nothing => {}
            }
        }
    }

    /// Run an eager computation now, logging and swallowing any failure.
    pub(crate) fn run(id: ComputationId) {
        let body = with_runtime(|rt| match rt.graph.node(id).map(Node::reaction) {
            Some(Reaction::Run(body)) => Some(Rc::clone(body)),
            _ => None,
        });
        let Some(body) = body else {
            return;
        };

        match Self::run_tracked(id, || body()) {
            None | Some(Ok(Ok(()))) => {}
            Some(Ok(Err(err))) => {
                let failure = Self::failure(id, err.to_string());
                report(&failure);
            }
            Some(Err(err)) => report(&err),
        }
    }

    /// Run `f` as computation `id`: release its old edges, make it the
    /// current subscriber, and catch any panic.
    ///
    /// Returns `None` if the computation has been disposed. The reentrancy
    /// guard refuses the run, before touching any edge, when `id` already
    /// has the configured number of runs on the stack.
    pub(crate) fn run_tracked<R>(
        id: ComputationId,
        f: impl FnOnce() -> R,
    ) -> Option<Result<R>> {
        let admitted = with_runtime(|rt| {
            let limit = rt.config.max_reentrant_depth;
            let node = rt.graph.node_mut(id)?;
            if node.active_runs() >= limit {
                return Some(Err(ReactiveError::ReentrancyOverflow {
                    computation: id,
                    label: node.label().to_string(),
                    limit,
                }));
            }
            node.enter_run();
            rt.graph.release_edges(id);
            Some(Ok(()))
        })?;
        if let Err(err) = admitted {
            return Some(Err(err));
        }

        let outcome = {
            let _ctx = ReactiveContext::enter(id);
            panic::catch_unwind(AssertUnwindSafe(f))
        };

        with_runtime(|rt| {
            if let Some(node) = rt.graph.node_mut(id) {
                node.exit_run();
            }
            rt.scheduler.note_run(id);
        });

        Some(outcome.map_err(|payload| Self::failure(id, panic_message(payload.as_ref()))))
    }

    fn failure(id: ComputationId, message: String) -> ReactiveError {
        let label = with_runtime(|rt| {
            rt.graph
                .node(id)
                .map_or_else(|| "disposed".to_string(), |n| n.label().to_string())
        });
        ReactiveError::ComputationFailed {
            computation: id,
            label,
            message,
        }
    }

    /// Run `f` with triggers deferred, then run every triggered computation
    /// exactly once. Nested calls share the outermost batch.
    pub fn batch<R>(f: impl FnOnce() -> R) -> R {
        struct BatchGuard {
            closed: bool,
        }

        impl Drop for BatchGuard {
            fn drop(&mut self) {
                // Only reached while unwinding out of `f`. Pending work stays
                // queued for the next flush.
                if !self.closed {
                    let _ = RUNTIME.try_with(|rt| {
                        if let Ok(mut rt) = rt.try_borrow_mut() {
                            rt.scheduler.end_batch();
                        }
                    });
                }
            }
        }

        with_runtime(|rt| rt.scheduler.begin_batch());
        let mut guard = BatchGuard { closed: false };
        let result = f();
        guard.closed = true;

        if with_runtime(|rt| rt.scheduler.end_batch()) {
            Self::flush();
        }
        result
    }

    /// Whether a batch is currently open.
    pub fn in_batch() -> bool {
        with_runtime(|rt| rt.scheduler.depth() > 0)
    }

    fn flush() {
        let started = with_runtime(|rt| {
            rt.scheduler
                .begin_flush()
                .then(|| (rt.config.max_flush_reruns, rt.scheduler.pending()))
        });
        let Some((max_reruns, pending)) = started else {
            return;
        };
        debug!(pending, "flushing pending computations");

        while let Some(step) = with_runtime(|rt| rt.scheduler.next(max_reruns)) {
            match step {
                FlushStep::Run(id) => Self::run(id),
                FlushStep::Dropped(id) => {
                    let label = with_runtime(|rt| {
                        rt.graph
                            .node(id)
                            .map_or_else(String::new, |n| n.label().to_string())
                    });
                    report(&ReactiveError::ReentrancyOverflow {
                        computation: id,
                        label,
                        limit: max_reruns,
                    });
                }
            }
        }

        with_runtime(|rt| rt.scheduler.end_flush());
    }

    /// Suspend the trigger-to-run path: triggered computations are queued
    /// until [`Runtime::resume`].
    pub fn pause() {
        with_runtime(|rt| rt.scheduler.pause());
        debug!("runtime paused");
    }

    /// Lift a pause. With `flush_pending`, queued computations run now (or
    /// when the open batch closes); otherwise they are discarded.
    pub fn resume(flush_pending: bool) {
        let (discarded, should_flush) = with_runtime(|rt| {
            let discarded = rt.scheduler.resume(flush_pending);
            (discarded, rt.scheduler.should_flush())
        });
        debug!(flush_pending, "runtime resumed");
        if discarded > 0 {
            warn!(discarded, "discarded pending computations on resume");
        }
        if flush_pending && should_flush {
            Self::flush();
        }
    }

    pub fn is_paused() -> bool {
        with_runtime(|rt| rt.scheduler.is_paused())
    }

    /// Forget a subject whose storage is gone: remove every edge keyed by
    /// it and dispose the computeds it owned.
    pub(crate) fn release_subject(subject: SubjectId) {
        let teardown = RUNTIME.try_with(|_| ()).is_err();
        if teardown {
            return;
        }

        match try_with_runtime(|rt| rt.graph.release_subject(subject)) {
            Some(owned) => {
                if !owned.is_empty() {
                    debug!(%subject, computeds = owned.len(), "released subject");
                }
                for id in owned {
                    Self::dispose(id);
                }
            }
            None => {
                let _ = ORPHANS.try_with(|orphans| orphans.borrow_mut().push(subject));
            }
        }
    }

    /// Counters for the current thread's runtime.
    pub fn stats() -> RuntimeStats {
        drain_orphans();
        with_runtime(|rt| RuntimeStats {
            computations: rt.graph.node_count(),
            edges: rt.graph.edge_count(),
            pending: rt.scheduler.pending(),
            batch_depth: rt.scheduler.depth(),
            paused: rt.scheduler.is_paused(),
        })
    }

    /// Replace the current thread's configuration.
    pub fn configure(config: RuntimeConfig) -> Result<()> {
        config.validate()?;
        with_runtime(|rt| rt.config = config);
        debug!(?config, "runtime reconfigured");
        Ok(())
    }

    /// The current thread's configuration.
    pub fn config() -> RuntimeConfig {
        with_runtime(|rt| rt.config)
    }
}

fn drain_orphans() {
    let orphans = ORPHANS
        .try_with(|orphans| std::mem::take(&mut *orphans.borrow_mut()))
        .unwrap_or_default();
    for subject in orphans {
        Runtime::release_subject(subject);
    }
}

pub(crate) fn report(err: &ReactiveError) {
    match err {
        ReactiveError::ReentrancyOverflow { computation, .. } => {
            error!(computation = %computation, error = %err, "aborted recursive run");
        }
        _ => {
            error!(computation = ?err.computation(), error = %err, "computation failed");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{effect, Signal};
    use std::cell::{Cell, RefCell};
    use tracing_test::traced_test;

    fn counting_effect(counter: Rc<Cell<u32>>) -> ComputationId {
        let id = Runtime::register(
            NodeKind::Effect,
            Rc::from("counter"),
            Reaction::Run(Rc::new(move || {
                counter.set(counter.get() + 1);
                Ok(())
            })),
            None,
        );
        Runtime::run(id);
        id
    }

    #[test]
    fn runtime_registers_and_disposes() {
        let id = counting_effect(Rc::new(Cell::new(0)));
        assert!(Runtime::is_alive(id));

        Runtime::dispose(id);
        assert!(!Runtime::is_alive(id));

        // Idempotent.
        Runtime::dispose(id);
    }

    #[test]
    fn runtime_notifies_subscribers() {
        let counter = Rc::new(Cell::new(0));
        let id = counting_effect(counter.clone());
        let key = EdgeKey::new(SubjectId::new(), "count");

        {
            let _ctx = ReactiveContext::enter(id);
            Runtime::track(key.clone());
        }
        assert_eq!(Runtime::dependency_count(id), 1);

        Runtime::trigger(&key);
        assert_eq!(counter.get(), 2);

        // The run released the edge and the body did not read it again.
        assert_eq!(Runtime::dependency_count(id), 0);
        Runtime::trigger(&key);
        assert_eq!(counter.get(), 2);

        Runtime::dispose(id);
    }

    #[test]
    fn computeds_are_invalidated_not_run() {
        let dirty = Rc::new(Cell::new(false));
        let own_key = EdgeKey::value(SubjectId::new());
        let id = Runtime::register(
            NodeKind::Computed,
            Rc::from("computed"),
            Reaction::Invalidate {
                dirty: dirty.clone(),
                notifies: own_key,
            },
            None,
        );
        let key = EdgeKey::new(SubjectId::new(), "input");
        {
            let _ctx = ReactiveContext::enter(id);
            Runtime::track(key.clone());
        }

        Runtime::trigger(&key);
        assert!(dirty.get());
        assert_eq!(Runtime::run_count(id), 0);

        Runtime::dispose(id);
    }

    #[test]
    fn batch_defers_until_outermost_close() {
        let counter = Rc::new(Cell::new(0));
        let id = counting_effect(counter.clone());
        let key = EdgeKey::new(SubjectId::new(), "x");

        Runtime::batch(|| {
            Runtime::enqueue_for_test(id);
            Runtime::batch(|| Runtime::trigger(&key));
            assert!(Runtime::in_batch());
            assert_eq!(counter.get(), 1);
        });
        assert_eq!(counter.get(), 2);
        assert!(!Runtime::in_batch());

        Runtime::dispose(id);
    }

    #[test]
    fn panicking_batch_restores_depth() {
        let result = panic::catch_unwind(|| Runtime::batch(|| panic!("inside batch")));
        assert!(result.is_err());
        assert_eq!(Runtime::stats().batch_depth, 0);
    }

    #[test]
    fn configure_rejects_invalid_limits() {
        let config = RuntimeConfig {
            max_reentrant_depth: 0,
            ..RuntimeConfig::default()
        };
        assert!(Runtime::configure(config).is_err());
        assert_eq!(Runtime::config(), RuntimeConfig::default());
    }

    #[test]
    #[traced_test]
    fn reentrancy_overflow_is_bounded_and_logged() {
        let n = Signal::new(0_u32);
        let s = n.clone();
        let e = effect(move || {
            let v = s.get();
            s.set(v + 1);
        });

        assert_eq!(n.get_untracked(), RuntimeConfig::DEFAULT_MAX_REENTRANT_DEPTH);
        assert_eq!(e.dependency_count(), 1);
        assert!(logs_contain("exceeded the reentrancy limit of 8"));
        e.dispose();
    }

    #[test]
    #[traced_test]
    fn resume_without_flush_warns_about_discarded_work() {
        let counter = Rc::new(Cell::new(0));
        let id = counting_effect(counter.clone());

        Runtime::pause();
        Runtime::enqueue_for_test(id);
        assert_eq!(Runtime::stats().pending, 1);
        Runtime::resume(false);

        assert_eq!(counter.get(), 1);
        assert!(logs_contain("discarded pending computations"));
        Runtime::dispose(id);
    }

    #[test]
    #[traced_test]
    fn failures_are_logged_with_the_label() {
        let e = crate::reactive::Effect::with_label("boom-effect", || panic!("kaboom"));
        assert_eq!(e.run_count(), 1);
        assert!(logs_contain("boom-effect"));
        assert!(logs_contain("kaboom"));
        e.dispose();
    }

    #[test]
    fn flush_budget_counts_each_rerun_once() {
        let config = RuntimeConfig {
            max_flush_reruns: 2,
            ..RuntimeConfig::default()
        };
        Runtime::configure(config).unwrap();

        let s = Signal::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (source, out) = (s.clone(), seen.clone());
        let e = effect(move || {
            let v = source.get();
            out.borrow_mut().push(v);
            if v == 1 {
                Runtime::batch(|| source.set(2));
            }
        });

        Runtime::batch(|| s.set(1));
        assert_eq!(*seen.borrow(), vec![0, 1, 2]);

        e.dispose();
        Runtime::configure(RuntimeConfig::default()).unwrap();
    }

    #[test]
    fn panic_messages_are_extracted() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "panic with non-string payload");
    }

    impl Runtime {
        fn enqueue_for_test(id: ComputationId) {
            with_runtime(|rt| {
                rt.scheduler.dispatch(id);
            });
        }
    }
}
