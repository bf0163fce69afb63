//! One-hop view of a workflow node.
//!
//! [`get_node`] loads a node together with its direct parents and children.
//! Neighbours are not expanded further; use [`crate::tree`] for the whole
//! reachable graph.

use crate::error::WorkflowError;
use crate::link::WorkflowVersionNodeLink;
use crate::node::WorkflowVersionNode;
use crate::store::WorkflowStore;
use boltflow_core::{WorkflowVersionNodeId, WorkflowVersionNodeLinkId};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::instrument;

/// A neighbouring node and the link that connects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedNode {
    pub link: WorkflowVersionNodeLink,
    pub node: WorkflowVersionNode,
}

/// A node with its direct neighbours.
///
/// The same neighbour can appear more than once when it is connected through
/// several links, which is why lookups are keyed by link id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub node: WorkflowVersionNode,
    /// Upstream neighbours, ordered by the input slot they feed.
    pub parents: Vec<LinkedNode>,
    /// Downstream neighbours, ordered by the output slot they read.
    pub children: Vec<LinkedNode>,
}

impl WorkflowNode {
    /// Returns the id of the centre node.
    #[must_use]
    pub fn id(&self) -> WorkflowVersionNodeId {
        self.node.id
    }

    /// Returns every link touching the node, keyed by link id.
    ///
    /// Child links are merged last and win on a key collision.
    #[must_use]
    pub fn link_details(&self) -> BTreeMap<WorkflowVersionNodeLinkId, &WorkflowVersionNodeLink> {
        self.parents
            .iter()
            .chain(self.children.iter())
            .map(|linked| (linked.link.id, &linked.link))
            .collect()
    }

    /// Returns the parent connected through `link_id`.
    #[must_use]
    pub fn parent_by_link(&self, link_id: WorkflowVersionNodeLinkId) -> Option<&WorkflowVersionNode> {
        self.parents
            .iter()
            .find(|linked| linked.link.id == link_id)
            .map(|linked| &linked.node)
    }

    /// Returns the child connected through `link_id`.
    #[must_use]
    pub fn child_by_link(&self, link_id: WorkflowVersionNodeLinkId) -> Option<&WorkflowVersionNode> {
        self.children
            .iter()
            .find(|linked| linked.link.id == link_id)
            .map(|linked| &linked.node)
    }
}

fn linked(rows: Vec<(WorkflowVersionNodeLink, WorkflowVersionNode)>) -> Vec<LinkedNode> {
    rows.into_iter()
        .map(|(link, node)| LinkedNode { link, node })
        .collect()
}

/// Loads a node with its direct parents and children.
///
/// Returns `Ok(None)` when the node does not exist.
///
/// # Errors
///
/// Returns the store failure.
#[instrument(skip(store))]
pub async fn get_node<S: WorkflowStore + ?Sized>(
    store: &S,
    node_id: WorkflowVersionNodeId,
) -> Result<Option<WorkflowNode>, Report<WorkflowError>> {
    let Some(node) = store.get_node(node_id).await.map_err(WorkflowError::Store)? else {
        return Ok(None);
    };
    let parents = store
        .parent_links(node_id)
        .await
        .map_err(WorkflowError::Store)?;
    let children = store
        .child_links(node_id)
        .await
        .map_err(WorkflowError::Store)?;

    Ok(Some(WorkflowNode {
        node,
        parents: linked(parents),
        children: linked(children),
    }))
}
