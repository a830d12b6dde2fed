//! Graph Nodes
//!
//! A node is the runtime's record of one computation: what it is, how to run
//! or invalidate it, and which fields it read during its latest run.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;

use crate::error::BoxError;
use crate::reactive::{ComputationId, EdgeKey, SubjectId};

/// Body of an eager computation.
pub(crate) type EffectBody = Rc<dyn Fn() -> Result<(), BoxError>>;

/// The kind of computation, used for diagnostics and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A side-effecting computation. Re-runs eagerly when a dependency changes.
    Effect,

    /// An effect specialised to report changes of a single field.
    Watcher,

    /// A cached derived value. Invalidated eagerly, recomputed lazily.
    Computed,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Effect => "effect",
            Self::Watcher => "watcher",
            Self::Computed => "computed",
        })
    }
}

/// What happens when one of a node's dependencies changes.
pub(crate) enum Reaction {
    /// Run the body (now, or at the end of the current batch).
    Run(EffectBody),

    /// Flag the cache as stale and notify readers of the computed's own field.
    Invalidate { dirty: Rc<Cell<bool>>, notifies: EdgeKey },
}

/// A computation in the dependency graph.
pub(crate) struct Node {
    id: ComputationId,
    kind: NodeKind,
    label: Rc<str>,
    reaction: Reaction,

    /// Subject that owns this computation. Computeds installed on an object
    /// die with the object.
    owner: Option<SubjectId>,

    /// Fields read during the latest run. Mirrors the subscriber table.
    dependencies: IndexSet<EdgeKey>,

    /// Runs of this node currently on the call stack.
    active_runs: u32,

    run_count: usize,
}

impl Node {
    pub fn new(
        id: ComputationId,
        kind: NodeKind,
        label: Rc<str>,
        reaction: Reaction,
        owner: Option<SubjectId>,
    ) -> Self {
        Self {
            id,
            kind,
            label,
            reaction,
            owner,
            dependencies: IndexSet::new(),
            active_runs: 0,
            run_count: 0,
        }
    }

    pub fn id(&self) -> ComputationId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn label(&self) -> &Rc<str> {
        &self.label
    }

    pub fn reaction(&self) -> &Reaction {
        &self.reaction
    }

    pub fn owner(&self) -> Option<SubjectId> {
        self.owner
    }

    /// Eager nodes are scheduled; lazy nodes are only invalidated.
    pub fn is_eager(&self) -> bool {
        matches!(self.reaction, Reaction::Run(_))
    }

    pub fn dependencies(&self) -> &IndexSet<EdgeKey> {
        &self.dependencies
    }

    pub fn add_dependency(&mut self, key: EdgeKey) -> bool {
        self.dependencies.insert(key)
    }

    pub fn remove_dependency(&mut self, key: &EdgeKey) {
        self.dependencies.shift_remove(key);
    }

    pub fn take_dependencies(&mut self) -> IndexSet<EdgeKey> {
        std::mem::take(&mut self.dependencies)
    }

    pub fn active_runs(&self) -> u32 {
        self.active_runs
    }

    pub fn enter_run(&mut self) {
        self.active_runs += 1;
    }

    pub fn exit_run(&mut self) {
        self.active_runs = self.active_runs.saturating_sub(1);
        self.run_count += 1;
    }

    pub fn run_count(&self) -> usize {
        self.run_count
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("dependencies", &self.dependencies.len())
            .field("active_runs", &self.active_runs)
            .field("run_count", &self.run_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn effect_node() -> Node {
        Node::new(
            ComputationId::new(),
            NodeKind::Effect,
            Rc::from("test"),
            Reaction::Run(Rc::new(|| Ok(()))),
            None,
        )
    }

    #[test]
    fn effects_are_eager_computeds_are_not() {
        assert!(effect_node().is_eager());

        let computed = Node::new(
            ComputationId::new(),
            NodeKind::Computed,
            Rc::from("double"),
            Reaction::Invalidate {
                dirty: Rc::new(Cell::new(true)),
                notifies: EdgeKey::value(SubjectId::new()),
            },
            None,
        );
        assert!(!computed.is_eager());
    }

    #[test]
    fn dependency_management() {
        let mut node = effect_node();
        let subject = SubjectId::new();

        assert!(node.add_dependency(EdgeKey::new(subject, "a")));
        assert!(node.add_dependency(EdgeKey::new(subject, "b")));
        assert!(!node.add_dependency(EdgeKey::new(subject, "a")));
        assert_eq!(node.dependencies().len(), 2);

        node.remove_dependency(&EdgeKey::new(subject, "a"));
        assert_eq!(node.dependencies().len(), 1);

        let taken = node.take_dependencies();
        assert_eq!(taken.len(), 1);
        assert!(node.dependencies().is_empty());
    }

    #[test]
    fn run_bookkeeping() {
        let mut node = effect_node();
        node.enter_run();
        node.enter_run();
        assert_eq!(node.active_runs(), 2);

        node.exit_run();
        node.exit_run();
        assert_eq!(node.active_runs(), 0);
        assert_eq!(node.run_count(), 2);
    }
}
