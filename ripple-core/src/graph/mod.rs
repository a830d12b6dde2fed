//! Dependency Graph
//!
//! This module holds the data structures behind the reactive runtime: the
//! computation arena, the subscriber table, and the batch scheduler.
//!
//! # Overview
//!
//! - Computations (effects, watchers, computeds) are nodes addressed by
//!   [`ComputationId`](crate::reactive::ComputationId).
//! - Edges run from a `(subject, field)` pair to a node. A node's edge set is
//!   rebuilt on every run, so it always equals exactly the fields read during
//!   its latest run.
//! - The scheduler collapses triggers inside a batch into one ordered,
//!   deduplicated flush.
//!
//! # Design Decisions
//!
//! 1. The graph never holds references to live values, only ids. Tearing a
//!    computation down is "remove this id everywhere", which cannot leak a
//!    reference cycle between closures and the values they read.
//!
//! 2. Both directions of every edge are stored so that a node can release
//!    its own edges without scanning the whole table.

mod edges;
mod node;
mod scheduler;

pub(crate) use edges::{DependencyGraph, Subscribers};
pub(crate) use node::{EffectBody, Node, Reaction};
pub use node::NodeKind;
pub(crate) use scheduler::{BatchScheduler, Dispatch, FlushStep};
