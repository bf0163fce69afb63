//! Full expansion of a workflow version into a graph.
//!
//! The tree is an arena: every node is stored once in a petgraph
//! [`DiGraph`] and every traversed link becomes an edge. A node reached
//! through several parents is therefore a single entry with several incoming
//! edges, and its own subtree is expanded exactly once.
//!
//! Expansion is an explicit-stack depth-first walk. A node is `InProgress`
//! from the moment it is entered until all of its children are done; meeting
//! an `InProgress` node again means the walk found a cycle.

use crate::error::WorkflowError;
use crate::link::WorkflowVersionNodeLink;
use crate::node::WorkflowVersionNode;
use crate::store::WorkflowStore;
use boltflow_core::{WorkflowVersionId, WorkflowVersionNodeId, WorkflowVersionNodeLinkId};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use rootcause::prelude::Report;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument};

/// The expanded graph of one workflow version.
#[derive(Debug, Clone, Default)]
pub struct WorkflowTree {
    graph: DiGraph<WorkflowVersionNode, WorkflowVersionNodeLink>,
    node_index_map: HashMap<WorkflowVersionNodeId, NodeIndex>,
    roots: Vec<NodeIndex>,
}

/// A node inside a [`WorkflowTree`].
///
/// Two handles are equal only when they refer to the same arena slot of the
/// same tree.
#[derive(Debug, Clone, Copy)]
pub struct TreeNode<'a> {
    tree: &'a WorkflowTree,
    index: NodeIndex,
}

impl PartialEq for TreeNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.index == other.index
    }
}

impl Eq for TreeNode<'_> {}

impl<'a> TreeNode<'a> {
    /// Returns the stored node record.
    #[must_use]
    pub fn record(&self) -> &'a WorkflowVersionNode {
        &self.tree.graph[self.index]
    }

    /// Returns the node id.
    #[must_use]
    pub fn id(&self) -> WorkflowVersionNodeId {
        self.record().id
    }

    fn neighbours(&self, direction: Direction) -> Vec<(&'a WorkflowVersionNodeLink, TreeNode<'a>)> {
        let tree = self.tree;
        tree.graph
            .edges_directed(self.index, direction)
            .map(|edge| {
                let other = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                (edge.weight(), TreeNode { tree, index: other })
            })
            .collect()
    }

    /// Returns the children with their links, ordered by output slot.
    #[must_use]
    pub fn children(&self) -> Vec<(&'a WorkflowVersionNodeLink, TreeNode<'a>)> {
        let mut children = self.neighbours(Direction::Outgoing);
        children.sort_by_key(|(link, _)| (link.parent_output_index, link.id));
        children
    }

    /// Returns the parents with their links, ordered by input slot.
    #[must_use]
    pub fn parents(&self) -> Vec<(&'a WorkflowVersionNodeLink, TreeNode<'a>)> {
        let mut parents = self.neighbours(Direction::Incoming);
        parents.sort_by_key(|(link, _)| (link.child_input_index, link.id));
        parents
    }

    /// Returns every traversed link touching the node, keyed by link id.
    #[must_use]
    pub fn link_details(&self) -> BTreeMap<WorkflowVersionNodeLinkId, &'a WorkflowVersionNodeLink> {
        self.neighbours(Direction::Incoming)
            .into_iter()
            .chain(self.neighbours(Direction::Outgoing))
            .map(|(link, _)| (link.id, link))
            .collect()
    }

    /// Returns the child reached through `link_id`.
    #[must_use]
    pub fn child_by_link(&self, link_id: WorkflowVersionNodeLinkId) -> Option<TreeNode<'a>> {
        self.neighbours(Direction::Outgoing)
            .into_iter()
            .find(|(link, _)| link.id == link_id)
            .map(|(_, node)| node)
    }

    /// Returns the parent reached through `link_id`.
    #[must_use]
    pub fn parent_by_link(&self, link_id: WorkflowVersionNodeLinkId) -> Option<TreeNode<'a>> {
        self.neighbours(Direction::Incoming)
            .into_iter()
            .find(|(link, _)| link.id == link_id)
            .map(|(_, node)| node)
    }
}

impl WorkflowTree {
    /// Returns the root nodes, ordered by node id.
    pub fn roots(&self) -> impl Iterator<Item = TreeNode<'_>> {
        self.roots.iter().map(|&index| TreeNode { tree: self, index })
    }

    /// Returns a node by id.
    #[must_use]
    pub fn node(&self, id: WorkflowVersionNodeId) -> Option<TreeNode<'_>> {
        let index = *self.node_index_map.get(&id)?;
        Some(TreeNode { tree: self, index })
    }

    /// Returns the number of distinct nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of traversed links.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns true when the tree has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    fn insert(&mut self, node: WorkflowVersionNode) -> NodeIndex {
        let id = node.id;
        let index = self.graph.add_node(node);
        self.node_index_map.insert(id, index);
        index
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

struct Frame {
    index: NodeIndex,
    id: WorkflowVersionNodeId,
    children: std::vec::IntoIter<(WorkflowVersionNodeLink, WorkflowVersionNode)>,
}

struct Expander<'s, S: ?Sized> {
    store: &'s S,
    tree: WorkflowTree,
    marks: HashMap<WorkflowVersionNodeId, Mark>,
}

impl<'s, S: WorkflowStore + ?Sized> Expander<'s, S> {
    fn new(store: &'s S) -> Self {
        Self {
            store,
            tree: WorkflowTree::default(),
            marks: HashMap::new(),
        }
    }

    async fn enter(&mut self, node: WorkflowVersionNode) -> Result<Frame, Report<WorkflowError>> {
        let id = node.id;
        let children = self
            .store
            .child_links(id)
            .await
            .map_err(WorkflowError::Store)?;
        let index = self.tree.insert(node);
        self.marks.insert(id, Mark::InProgress);
        Ok(Frame {
            index,
            id,
            children: children.into_iter(),
        })
    }

    async fn expand_root(&mut self, root: WorkflowVersionNode) -> Result<(), Report<WorkflowError>> {
        if self.marks.contains_key(&root.id) {
            return Ok(());
        }
        let frame = self.enter(root).await?;
        self.tree.roots.push(frame.index);
        let mut stack = vec![frame];

        loop {
            let Some(frame) = stack.last_mut() else {
                break;
            };
            let parent_index = frame.index;
            let Some((link, child)) = frame.children.next() else {
                self.marks.insert(frame.id, Mark::Done);
                stack.pop();
                continue;
            };

            match self.marks.get(&child.id).copied() {
                Some(Mark::InProgress) => {
                    return Err(WorkflowError::CycleDetected { node_id: child.id }.into());
                }
                Some(Mark::Done) => {
                    if let Some(&child_index) = self.tree.node_index_map.get(&child.id) {
                        self.tree.graph.add_edge(parent_index, child_index, link);
                    }
                }
                None => {
                    let frame = self.enter(child).await?;
                    self.tree.graph.add_edge(parent_index, frame.index, link);
                    stack.push(frame);
                }
            }
        }
        Ok(())
    }
}

/// Expands every root of a version into one graph.
///
/// A version that does not exist, or has no nodes, yields an empty tree.
///
/// # Errors
///
/// - `CycleDetected` if a cycle is reachable from a root.
/// - `Store` for persistence failures.
#[instrument(skip(store))]
pub async fn build_tree<S: WorkflowStore + ?Sized>(
    store: &S,
    version_id: WorkflowVersionId,
) -> Result<WorkflowTree, Report<WorkflowError>> {
    let mut roots = store
        .root_nodes(version_id)
        .await
        .map_err(WorkflowError::Store)?;
    roots.sort_by_key(|node| node.id);

    let mut expander = Expander::new(store);
    for root in roots {
        expander.expand_root(root).await?;
    }
    let tree = expander.tree;
    debug!(
        nodes = tree.node_count(),
        links = tree.link_count(),
        "built workflow tree"
    );
    Ok(tree)
}

/// Expands the graph reachable from a single node, treating it as the root.
///
/// # Errors
///
/// - `RecursionInput` if the node does not exist.
/// - `CycleDetected` if a cycle is reachable from the node.
/// - `Store` for persistence failures.
pub async fn build_subtree<S: WorkflowStore + ?Sized>(
    store: &S,
    node_id: WorkflowVersionNodeId,
) -> Result<WorkflowTree, Report<WorkflowError>> {
    let root = store
        .get_node(node_id)
        .await
        .map_err(WorkflowError::Store)?
        .ok_or(WorkflowError::RecursionInput { node_id })?;
    let mut expander = Expander::new(store);
    expander.expand_root(root).await?;
    Ok(expander.tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::NewWorkflow;
    use crate::editor::{add_link, add_node, create_workflow};
    use crate::link::NewWorkflowVersionNodeLink;
    use crate::memory::InMemoryWorkflowStore;
    use crate::node::{NewWorkflowVersionNode, WorkflowNodeType};
    use crate::version::clone_or_create_version;

    struct Fixture {
        store: InMemoryWorkflowStore,
        version: WorkflowVersionId,
    }

    impl Fixture {
        async fn new() -> Self {
            let store = InMemoryWorkflowStore::new();
            let workflow = create_workflow(&store, NewWorkflow::new("tree"))
                .await
                .expect("workflow");
            let version = clone_or_create_version(&store, workflow.id, 0, String::new())
                .await
                .expect("version")
                .id;
            Self { store, version }
        }

        async fn node(&self, name: &str) -> WorkflowVersionNodeId {
            add_node(
                &self.store,
                NewWorkflowVersionNode::new(self.version, WorkflowNodeType::ChannelFilter)
                    .with_name(name),
            )
            .await
            .expect("node")
            .id
        }

        async fn link(
            &self,
            parent: WorkflowVersionNodeId,
            child: WorkflowVersionNodeId,
            output: i32,
        ) -> WorkflowVersionNodeLinkId {
            add_link(
                &self.store,
                NewWorkflowVersionNodeLink::new(self.version, parent, child).from_output(output),
            )
            .await
            .expect("link")
            .id
        }
    }

    #[tokio::test]
    async fn chain_has_single_root() {
        let f = Fixture::new().await;
        let a = f.node("a").await;
        let b = f.node("b").await;
        let c = f.node("c").await;
        f.link(a, b, 0).await;
        f.link(b, c, 0).await;

        let tree = build_tree(&f.store, f.version).await.expect("tree");
        let roots: Vec<_> = tree.roots().map(|r| r.id()).collect();
        assert_eq!(roots, vec![a]);
        assert_eq!(tree.node_count(), 3);

        let root = tree.roots().next().expect("root");
        let (_, b_node) = root.children()[0];
        assert_eq!(b_node.id(), b);
        assert_eq!(b_node.children()[0].1.id(), c);
        assert_eq!(b_node.parents()[0].1, root);
    }

    #[tokio::test]
    async fn shared_descendant_is_expanded_once() {
        // a -> c, b -> c, c -> d
        let f = Fixture::new().await;
        let a = f.node("a").await;
        let b = f.node("b").await;
        let c = f.node("c").await;
        let d = f.node("d").await;
        let a_to_c = f.link(a, c, 0).await;
        let b_to_c = f.link(b, c, 0).await;
        f.link(c, d, 0).await;

        let tree = build_tree(&f.store, f.version).await.expect("tree");
        assert_eq!(tree.node_count(), 4);
        assert_eq!(tree.link_count(), 3);

        let roots: Vec<_> = tree.roots().collect();
        assert_eq!(roots.len(), 2);
        let via_a = roots[0].child_by_link(a_to_c).expect("a->c");
        let via_b = roots[1].child_by_link(b_to_c).expect("b->c");
        assert_eq!(via_a, via_b);

        let c_node = tree.node(c).expect("c");
        assert_eq!(c_node, via_a);
        let details = c_node.link_details();
        assert!(details.contains_key(&a_to_c));
        assert!(details.contains_key(&b_to_c));
        assert_eq!(c_node.parents().len(), 2);
        assert_eq!(c_node.children().len(), 1);
        assert_eq!(tree.node(d).expect("d").parents().len(), 1);
    }

    #[tokio::test]
    async fn children_follow_output_slot_order() {
        let f = Fixture::new().await;
        let root = f.node("root").await;
        let second = f.node("second").await;
        let first = f.node("first").await;
        f.link(root, second, 1).await;
        f.link(root, first, 0).await;

        let tree = build_tree(&f.store, f.version).await.expect("tree");
        let root_node = tree.node(root).expect("root");
        let order: Vec<_> = root_node.children().iter().map(|(_, n)| n.id()).collect();
        assert_eq!(order, vec![first, second]);
    }

    #[tokio::test]
    async fn reachable_cycle_is_detected() {
        // r -> x -> y -> x
        let f = Fixture::new().await;
        let r = f.node("r").await;
        let x = f.node("x").await;
        let y = f.node("y").await;
        f.link(r, x, 0).await;
        f.link(x, y, 0).await;
        f.link(y, x, 0).await;

        let err = build_tree(&f.store, f.version).await.unwrap_err();
        assert!(err.to_string().contains(&format!("cycle detected at node {x}")));
    }

    #[tokio::test]
    async fn unknown_version_yields_empty_tree() {
        let store = InMemoryWorkflowStore::new();
        let tree = build_tree(&store, WorkflowVersionId::new(404))
            .await
            .expect("tree");
        assert!(tree.is_empty());
        assert_eq!(tree.roots().count(), 0);
    }

    #[tokio::test]
    async fn subtree_of_missing_node_is_recursion_input() {
        let store = InMemoryWorkflowStore::new();
        let err = build_subtree(&store, WorkflowVersionNodeId::new(7))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("node wfvn_7 does not exist"));
    }

    #[tokio::test]
    async fn subtree_starts_at_given_node() {
        let f = Fixture::new().await;
        let a = f.node("a").await;
        let b = f.node("b").await;
        let c = f.node("c").await;
        f.link(a, b, 0).await;
        f.link(b, c, 0).await;

        let tree = build_subtree(&f.store, b).await.expect("subtree");
        let roots: Vec<_> = tree.roots().map(|r| r.id()).collect();
        assert_eq!(roots, vec![b]);
        assert!(tree.node(a).is_none());
        assert_eq!(tree.node_count(), 2);
    }
}
