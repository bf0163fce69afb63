//! Trigger discovery.
//!
//! A workflow is eligible to run through exactly one version: the active
//! version with the highest number. Its active root nodes of the requested
//! type are the triggers that may start it.

use crate::definition::WorkflowVersion;
use crate::error::WorkflowError;
use crate::graph::{WorkflowNode, get_node};
use crate::node::WorkflowNodeType;
use crate::store::WorkflowStore;
use boltflow_core::{Status, WorkflowId};
use rootcause::prelude::Report;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Returns the highest-numbered version per workflow, ordered by workflow id.
fn latest_per_workflow(versions: Vec<WorkflowVersion>) -> Vec<WorkflowVersion> {
    let mut latest: BTreeMap<WorkflowId, WorkflowVersion> = BTreeMap::new();
    for version in versions {
        match latest.get(&version.workflow_id) {
            Some(current) if current.version >= version.version => {}
            _ => {
                latest.insert(version.workflow_id, version);
            }
        }
    }
    latest.into_values().collect()
}

/// Finds active root nodes of `node_type` in each workflow's latest active version.
///
/// Each result is a one-hop [`WorkflowNode`] view. Workflows without an
/// active version, or whose latest active version has no matching root,
/// contribute nothing.
///
/// # Errors
///
/// Returns the store failure.
#[instrument(skip(store))]
pub async fn find_active_trigger_roots<S: WorkflowStore + ?Sized>(
    store: &S,
    node_type: WorkflowNodeType,
) -> Result<Vec<WorkflowNode>, Report<WorkflowError>> {
    let versions = store
        .active_versions()
        .await
        .map_err(WorkflowError::Store)?;

    let mut triggers = Vec::new();
    for version in latest_per_workflow(versions) {
        let mut roots = store
            .root_nodes(version.id)
            .await
            .map_err(WorkflowError::Store)?;
        roots.retain(|node| node.status == Status::Active && node.node_type == node_type);
        roots.sort_by_key(|node| node.id);

        for root in roots {
            // A node deleted between the two reads simply drops out.
            if let Some(view) = get_node(store, root.id).await? {
                triggers.push(view);
            }
        }
    }
    debug!(count = triggers.len(), "discovered trigger roots");
    Ok(triggers)
}
