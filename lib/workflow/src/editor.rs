//! Editing operations for workflows, nodes and links.
//!
//! Every write stamps `updated_on`; inserts also stamp `created_on` with the
//! same instant. Nodes and links inserted without a name get a
//! timestamp-derived one.

use crate::definition::{NewWorkflow, Workflow, name_or_default};
use crate::error::WorkflowError;
use crate::link::{NewWorkflowVersionNodeLink, WorkflowVersionNodeLink};
use crate::node::{NewWorkflowVersionNode, WorkflowVersionNode, decode_parameters};
use crate::store::WorkflowStore;
use boltflow_core::{
    WorkflowId, WorkflowVersionId, WorkflowVersionNodeId, WorkflowVersionNodeLinkId,
};
use chrono::Utc;
use rootcause::prelude::Report;
use tracing::{debug, instrument};

/// Creates a workflow.
///
/// # Errors
///
/// Returns the store failure.
#[instrument(skip(store, workflow), fields(name = %workflow.name))]
pub async fn create_workflow<S: WorkflowStore + ?Sized>(
    store: &S,
    mut workflow: NewWorkflow,
) -> Result<Workflow, Report<WorkflowError>> {
    let now = Utc::now();
    workflow.created_on = now;
    workflow.updated_on = now;
    Ok(store
        .insert_workflow(workflow)
        .await
        .map_err(WorkflowError::Store)?)
}

/// Persists changes to a workflow's name, type or status.
///
/// # Errors
///
/// Returns the store failure.
pub async fn update_workflow<S: WorkflowStore + ?Sized>(
    store: &S,
    mut workflow: Workflow,
) -> Result<Workflow, Report<WorkflowError>> {
    workflow.updated_on = Utc::now();
    store
        .update_workflow(&workflow)
        .await
        .map_err(WorkflowError::Store)?;
    Ok(workflow)
}

/// Deletes a workflow with all of its versions.
///
/// # Errors
///
/// Returns the store failure.
pub async fn delete_workflow<S: WorkflowStore + ?Sized>(
    store: &S,
    id: WorkflowId,
) -> Result<u64, Report<WorkflowError>> {
    Ok(store.delete_workflow(id).await.map_err(WorkflowError::Store)?)
}

/// Adds a node to a version.
///
/// # Errors
///
/// - `InvalidParameters` if the parameter payload does not decode.
/// - `Store` for persistence failures.
#[instrument(skip(store, node), fields(version = %node.workflow_version_id, node_type = %node.node_type))]
pub async fn add_node<S: WorkflowStore + ?Sized>(
    store: &S,
    mut node: NewWorkflowVersionNode,
) -> Result<WorkflowVersionNode, Report<WorkflowError>> {
    decode_parameters(&node.parameters)
        .map_err(|reason| WorkflowError::InvalidParameters {
            node_id: None,
            reason,
        })?;
    let now = Utc::now();
    node.name = name_or_default(node.name, now);
    node.created_on = now;
    node.updated_on = now;
    let node = store.insert_node(node).await.map_err(WorkflowError::Store)?;
    debug!(node_id = %node.id, "added node");
    Ok(node)
}

/// Persists changes to a node.
///
/// # Errors
///
/// - `InvalidParameters` if the parameter payload does not decode.
/// - `Store` for persistence failures.
pub async fn update_node<S: WorkflowStore + ?Sized>(
    store: &S,
    mut node: WorkflowVersionNode,
) -> Result<WorkflowVersionNode, Report<WorkflowError>> {
    node.decode_parameters()?;
    node.updated_on = Utc::now();
    store.update_node(&node).await.map_err(WorkflowError::Store)?;
    Ok(node)
}

/// Deletes a node and every link touching it.
///
/// # Errors
///
/// Returns the store failure.
pub async fn delete_node<S: WorkflowStore + ?Sized>(
    store: &S,
    id: WorkflowVersionNodeId,
) -> Result<u64, Report<WorkflowError>> {
    Ok(store.delete_node(id).await.map_err(WorkflowError::Store)?)
}

/// Checks that both endpoints exist and belong to the link's version.
async fn validate_endpoints<S: WorkflowStore + ?Sized>(
    store: &S,
    link_version_id: WorkflowVersionId,
    endpoints: [WorkflowVersionNodeId; 2],
) -> Result<(), Report<WorkflowError>> {
    for node_id in endpoints {
        let node = store.get_node(node_id).await.map_err(WorkflowError::Store)?;
        let node_version_id = node.map(|n| n.workflow_version_id);
        if node_version_id != Some(link_version_id) {
            return Err(WorkflowError::LinkVersionMismatch {
                link_version_id,
                node_id,
                node_version_id,
            }
            .into());
        }
    }
    Ok(())
}

/// Links an output slot of one node to an input slot of another.
///
/// # Errors
///
/// - `LinkVersionMismatch` if an endpoint is missing or belongs to another version.
/// - `Store` for persistence failures.
#[instrument(skip(store, link), fields(parent = %link.parent_node_id, child = %link.child_node_id))]
pub async fn add_link<S: WorkflowStore + ?Sized>(
    store: &S,
    mut link: NewWorkflowVersionNodeLink,
) -> Result<WorkflowVersionNodeLink, Report<WorkflowError>> {
    validate_endpoints(
        store,
        link.workflow_version_id,
        [link.parent_node_id, link.child_node_id],
    )
    .await?;
    let now = Utc::now();
    link.name = name_or_default(link.name, now);
    link.created_on = now;
    link.updated_on = now;
    let link = store.insert_link(link).await.map_err(WorkflowError::Store)?;
    debug!(link_id = %link.id, "added link");
    Ok(link)
}

/// Persists changes to a link.
///
/// # Errors
///
/// - `LinkVersionMismatch` if an endpoint is missing or belongs to another version.
/// - `Store` for persistence failures.
pub async fn update_link<S: WorkflowStore + ?Sized>(
    store: &S,
    mut link: WorkflowVersionNodeLink,
) -> Result<WorkflowVersionNodeLink, Report<WorkflowError>> {
    validate_endpoints(
        store,
        link.workflow_version_id,
        [link.parent_node_id, link.child_node_id],
    )
    .await?;
    link.updated_on = Utc::now();
    store.update_link(&link).await.map_err(WorkflowError::Store)?;
    Ok(link)
}

/// Deletes a link.
///
/// # Errors
///
/// Returns the store failure.
pub async fn delete_link<S: WorkflowStore + ?Sized>(
    store: &S,
    id: WorkflowVersionNodeLinkId,
) -> Result<u64, Report<WorkflowError>> {
    Ok(store.delete_link(id).await.map_err(WorkflowError::Store)?)
}
