//! Dependency Graph
//!
//! The graph owns every live computation node and the subscriber table that
//! maps each `(subject, field)` pair to the computations that read it during
//! their latest run. Both directions are kept in sync: a node's dependency
//! set and the subscriber table always describe the same edges.
//!
//! Two secondary indexes keep subject-wide operations proportional to the
//! subject rather than to the whole graph: the fields of each subject that
//! currently have subscribers, and the computations each subject owns.

use std::collections::HashMap;

use indexmap::IndexSet;
use smallvec::SmallVec;

use super::node::Node;
use crate::reactive::{ComputationId, EdgeKey, FieldKey, SubjectId};

/// Subscribers of one field, in subscription order.
pub(crate) type Subscribers = SmallVec<[ComputationId; 8]>;

#[derive(Default)]
pub(crate) struct DependencyGraph {
    nodes: HashMap<ComputationId, Node>,
    subscribers: HashMap<EdgeKey, IndexSet<ComputationId>>,
    /// Fields of each subject with at least one subscriber.
    subscribed_fields: HashMap<SubjectId, IndexSet<FieldKey>>,
    /// Computations owned by each subject, in registration order.
    owned: HashMap<SubjectId, IndexSet<ComputationId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Node) -> ComputationId {
        let id = node.id();
        if let Some(owner) = node.owner() {
            self.owned.entry(owner).or_default().insert(id);
        }
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node and every edge that points at it.
    ///
    /// The node is handed back so the caller can drop its body outside of
    /// any runtime borrow.
    pub fn remove_node(&mut self, id: ComputationId) -> Option<Node> {
        self.release_edges(id);
        let node = self.nodes.remove(&id)?;
        if let Some(owner) = node.owner() {
            if let Some(owned) = self.owned.get_mut(&owner) {
                owned.shift_remove(&id);
                if owned.is_empty() {
                    self.owned.remove(&owner);
                }
            }
        }
        Some(node)
    }

    pub fn node(&self, id: ComputationId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: ComputationId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: ComputationId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Record that `dependent` read `key`. Returns `false` if the edge
    /// already existed or the node is gone.
    pub fn add_edge(&mut self, key: EdgeKey, dependent: ComputationId) -> bool {
        let Some(node) = self.nodes.get_mut(&dependent) else {
            return false;
        };
        if !node.add_dependency(key.clone()) {
            return false;
        }
        self.subscribed_fields
            .entry(key.subject)
            .or_default()
            .insert(key.field.clone());
        self.subscribers.entry(key).or_default().insert(dependent);
        true
    }

    /// Drop every edge held by `id`, leaving the node itself in place.
    pub fn release_edges(&mut self, id: ComputationId) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        for key in node.take_dependencies() {
            self.unsubscribe(&key, id);
        }
    }

    fn unsubscribe(&mut self, key: &EdgeKey, id: ComputationId) {
        if let Some(subs) = self.subscribers.get_mut(key) {
            subs.shift_remove(&id);
            if subs.is_empty() {
                self.subscribers.remove(key);
                self.forget_field(key);
            }
        }
    }

    fn forget_field(&mut self, key: &EdgeKey) {
        if let Some(fields) = self.subscribed_fields.get_mut(&key.subject) {
            fields.shift_remove(&key.field);
            if fields.is_empty() {
                self.subscribed_fields.remove(&key.subject);
            }
        }
    }

    /// Snapshot of the computations subscribed to `key`.
    pub fn subscribers_of(&self, key: &EdgeKey) -> Subscribers {
        self.subscribers
            .get(key)
            .map(|subs| subs.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Snapshot of every computation subscribed to any field of `subject`,
    /// deduplicated.
    pub fn subscribers_of_subject(&self, subject: SubjectId) -> Subscribers {
        let Some(fields) = self.subscribed_fields.get(&subject) else {
            return Subscribers::new();
        };
        let mut out: IndexSet<ComputationId> = IndexSet::new();
        for field in fields {
            let key = EdgeKey::new(subject, field.clone());
            if let Some(subs) = self.subscribers.get(&key) {
                out.extend(subs.iter().copied());
            }
        }
        // Creation order, independent of subscription order.
        out.sort_unstable();
        out.into_iter().collect()
    }

    /// Forget everything keyed by `subject`: edges that point at its fields
    /// are removed from both directions. Returns the computations owned by
    /// the subject, which the caller should dispose.
    pub fn release_subject(&mut self, subject: SubjectId) -> Vec<ComputationId> {
        for field in self.subscribed_fields.remove(&subject).unwrap_or_default() {
            let key = EdgeKey::new(subject, field);
            if let Some(subs) = self.subscribers.remove(&key) {
                for id in subs {
                    if let Some(node) = self.nodes.get_mut(&id) {
                        node.remove_dependency(&key);
                    }
                }
            }
        }

        self.owned
            .get(&subject)
            .map(|owned| owned.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Total number of `(field, computation)` edges.
    pub fn edge_count(&self) -> usize {
        self.subscribers.values().map(IndexSet::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::{NodeKind, Reaction};
    use std::rc::Rc;

    fn add_effect(graph: &mut DependencyGraph, owner: Option<SubjectId>) -> ComputationId {
        graph.add_node(Node::new(
            ComputationId::new(),
            NodeKind::Effect,
            Rc::from("effect"),
            Reaction::Run(Rc::new(|| Ok(()))),
            owner,
        ))
    }

    #[test]
    fn add_and_remove_nodes() {
        let mut graph = DependencyGraph::new();
        let a = add_effect(&mut graph, None);
        let b = add_effect(&mut graph, None);
        assert_eq!(graph.node_count(), 2);

        assert!(graph.remove_node(a).is_some());
        assert_eq!(graph.node_count(), 1);
        assert!(graph.node(a).is_none());
        assert!(graph.node(b).is_some());
        assert!(graph.remove_node(a).is_none());
    }

    #[test]
    fn edges_are_mirrored() {
        let mut graph = DependencyGraph::new();
        let subject = SubjectId::new();
        let id = add_effect(&mut graph, None);
        let key = EdgeKey::new(subject, "count");

        assert!(graph.add_edge(key.clone(), id));
        assert!(!graph.add_edge(key.clone(), id));
        assert_eq!(graph.subscribers_of(&key).as_slice(), &[id]);
        assert!(graph.node(id).unwrap().dependencies().contains(&key));

        graph.release_edges(id);
        assert!(graph.subscribers_of(&key).is_empty());
        assert!(graph.node(id).unwrap().dependencies().is_empty());
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn subscribers_keep_subscription_order() {
        let mut graph = DependencyGraph::new();
        let key = EdgeKey::new(SubjectId::new(), "x");
        let ids: Vec<_> = (0..4).map(|_| add_effect(&mut graph, None)).collect();
        for id in ids.iter().rev() {
            graph.add_edge(key.clone(), *id);
        }
        let subs = graph.subscribers_of(&key);
        let expected: Vec<_> = ids.iter().rev().copied().collect();
        assert_eq!(subs.as_slice(), expected.as_slice());
    }

    #[test]
    fn edges_to_missing_nodes_are_ignored() {
        let mut graph = DependencyGraph::new();
        let key = EdgeKey::new(SubjectId::new(), "x");
        assert!(!graph.add_edge(key.clone(), ComputationId::new()));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn release_subject_drops_edges_and_reports_owned_nodes() {
        let mut graph = DependencyGraph::new();
        let doomed = SubjectId::new();
        let survivor = SubjectId::new();

        let reader = add_effect(&mut graph, None);
        let owned = add_effect(&mut graph, Some(doomed));
        graph.add_edge(EdgeKey::new(doomed, "a"), reader);
        graph.add_edge(EdgeKey::new(doomed, FieldKey::Length), reader);
        graph.add_edge(EdgeKey::new(survivor, "b"), reader);

        let owned_ids = graph.release_subject(doomed);
        assert_eq!(owned_ids, vec![owned]);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.node(reader).unwrap().dependencies().len(), 1);
    }

    #[test]
    fn subject_indexes_follow_edges_and_nodes() {
        let mut graph = DependencyGraph::new();
        let subject = SubjectId::new();
        let reader = add_effect(&mut graph, None);
        let other = add_effect(&mut graph, None);
        let owned = add_effect(&mut graph, Some(subject));

        graph.add_edge(EdgeKey::new(subject, "a"), other);
        graph.add_edge(EdgeKey::new(subject, "a"), reader);
        graph.add_edge(EdgeKey::new(subject, "b"), reader);
        assert_eq!(graph.subscribers_of_subject(subject).as_slice(), &[reader, other]);

        graph.release_edges(reader);
        assert_eq!(graph.subscribers_of_subject(subject).as_slice(), &[other]);
        graph.release_edges(other);
        assert!(graph.subscribers_of_subject(subject).is_empty());
        assert!(graph.subscribed_fields.is_empty());

        graph.remove_node(owned);
        assert!(graph.release_subject(subject).is_empty());
        assert!(graph.owned.is_empty());
    }
}
