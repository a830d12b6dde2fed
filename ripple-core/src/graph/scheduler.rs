//! Batch Scheduler
//!
//! The scheduler decides whether a triggered computation runs now or later.
//!
//! # Algorithm
//!
//! 1. Outside a batch (and while not paused) a triggered computation runs
//!    synchronously, in trigger order.
//! 2. Inside a batch, or while paused, it is appended to the pending queue.
//!    The queue is a set: a computation appears at most once no matter how
//!    many of its dependencies change.
//! 3. When the outermost batch closes, the queue is drained front to back.
//!    A computation that is still waiting in the queue is not run early when
//!    something triggers it mid-flush; one that already ran is run again.
//! 4. A computation re-queued too many times within one flush is dropped,
//!    which bounds livelock through nested batches.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::reactive::ComputationId;

/// What the runtime should do with a triggered computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    /// Run it now.
    Run,
    /// It was queued for the next flush.
    Deferred,
    /// It is already waiting in the running flush.
    AlreadyQueued,
}

/// Next step of a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushStep {
    Run(ComputationId),
    /// The computation exceeded its rerun budget for this flush.
    Dropped(ComputationId),
}

#[derive(Debug, Default)]
pub(crate) struct BatchScheduler {
    /// Nesting depth of open batches.
    depth: u32,
    paused: bool,
    flushing: bool,
    queue: VecDeque<ComputationId>,
    queued: HashSet<ComputationId>,
    /// Runs per computation during the current flush.
    reruns: HashMap<ComputationId, u32>,
}

impl BatchScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatch(&mut self, id: ComputationId) -> Dispatch {
        if self.depth > 0 || self.paused {
            self.enqueue(id);
            Dispatch::Deferred
        } else if self.flushing && self.queued.contains(&id) {
            Dispatch::AlreadyQueued
        } else {
            Dispatch::Run
        }
    }

    /// Add to the pending set. Returns `false` if it was already pending.
    pub fn enqueue(&mut self, id: ComputationId) -> bool {
        if self.queued.insert(id) {
            self.queue.push_back(id);
            true
        } else {
            false
        }
    }

    pub fn remove(&mut self, id: ComputationId) {
        if self.queued.remove(&id) {
            self.queue.retain(|queued| *queued != id);
        }
    }

    pub fn begin_batch(&mut self) {
        self.depth += 1;
    }

    /// Close one batch level. Returns `true` when the caller should flush.
    pub fn end_batch(&mut self) -> bool {
        self.depth = self.depth.saturating_sub(1);
        self.should_flush()
    }

    pub fn should_flush(&self) -> bool {
        self.depth == 0 && !self.paused && !self.flushing && !self.queue.is_empty()
    }

    pub fn begin_flush(&mut self) -> bool {
        if self.flushing {
            return false;
        }
        self.flushing = true;
        self.reruns.clear();
        true
    }

    pub fn next(&mut self, max_reruns: u32) -> Option<FlushStep> {
        // Work queued while paused stays put until resume.
        if self.paused || self.depth > 0 {
            return None;
        }
        let id = self.queue.pop_front()?;
        self.queued.remove(&id);
        // Runs are counted by `note_run`, whoever dispatched them.
        let runs = self.reruns.get(&id).copied().unwrap_or(0);
        if runs >= max_reruns {
            Some(FlushStep::Dropped(id))
        } else {
            Some(FlushStep::Run(id))
        }
    }

    pub fn end_flush(&mut self) {
        self.flushing = false;
        self.reruns.clear();
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Lift a pause. When `flush` is false, the pending set is discarded and
    /// its size returned.
    pub fn resume(&mut self, flush: bool) -> usize {
        self.paused = false;
        if flush {
            0
        } else {
            let discarded = self.queue.len();
            self.queue.clear();
            self.queued.clear();
            discarded
        }
    }

    /// Record a completed run. Only runs during a flush count against the
    /// rerun budget.
    pub fn note_run(&mut self, id: ComputationId) {
        if self.flushing {
            *self.reruns.entry(id).or_insert(0) += 1;
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
