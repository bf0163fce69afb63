//! Storage abstraction for workflow entities.
//!
//! The store is deliberately dumb: it persists exactly what it is given and
//! assigns surrogate ids. Timestamps, default names and validation are the
//! job of the operations in [`crate::version`] and [`crate::editor`].

use crate::definition::{NewWorkflow, NewWorkflowVersion, Workflow, WorkflowVersion};
use crate::error::StoreError;
use crate::link::{NewWorkflowVersionNodeLink, WorkflowVersionNodeLink};
use crate::log::WorkflowVersionNodeLog;
use crate::node::{NewWorkflowVersionNode, WorkflowVersionNode};
use async_trait::async_trait;
use boltflow_core::{
    WorkflowId, WorkflowVersionId, WorkflowVersionNodeId, WorkflowVersionNodeLinkId,
};

/// Trait for workflow persistence.
///
/// Reads return `Ok(None)` when the row does not exist. Deletes return the
/// number of rows removed; deleting a workflow or version cascades to
/// everything it owns.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Gets a workflow by id.
    async fn get_workflow(&self, id: WorkflowId) -> Result<Option<Workflow>, StoreError>;

    /// Gets the workflow that owns a version.
    async fn get_workflow_by_version_id(
        &self,
        version_id: WorkflowVersionId,
    ) -> Result<Option<Workflow>, StoreError>;

    /// Lists all workflows.
    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError>;

    /// Inserts a workflow and returns it with its assigned id.
    async fn insert_workflow(&self, workflow: NewWorkflow) -> Result<Workflow, StoreError>;

    /// Overwrites the mutable fields of a workflow.
    async fn update_workflow(&self, workflow: &Workflow) -> Result<(), StoreError>;

    /// Deletes a workflow.
    async fn delete_workflow(&self, id: WorkflowId) -> Result<u64, StoreError>;

    /// Gets a version by id.
    async fn get_version(
        &self,
        id: WorkflowVersionId,
    ) -> Result<Option<WorkflowVersion>, StoreError>;

    /// Lists the versions of a workflow, lowest number first.
    async fn list_versions(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<WorkflowVersion>, StoreError>;

    /// Gets a version by its number within a workflow.
    async fn find_version(
        &self,
        workflow_id: WorkflowId,
        version: i32,
    ) -> Result<Option<WorkflowVersion>, StoreError>;

    /// Gets the highest-numbered version of a workflow, regardless of status.
    async fn latest_version(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Option<WorkflowVersion>, StoreError>;

    /// Lists every version with `status = Active` across all workflows.
    async fn active_versions(&self) -> Result<Vec<WorkflowVersion>, StoreError>;

    /// Inserts a version and returns it with its assigned id.
    ///
    /// A second version with the same `(workflow_id, version)` is a
    /// `ConstraintViolation`.
    async fn insert_version(
        &self,
        version: NewWorkflowVersion,
    ) -> Result<WorkflowVersion, StoreError>;

    /// Overwrites the mutable fields of a version.
    async fn update_version(&self, version: &WorkflowVersion) -> Result<(), StoreError>;

    /// Deletes a version.
    async fn delete_version(&self, id: WorkflowVersionId) -> Result<u64, StoreError>;

    /// Gets a node by id.
    async fn get_node(
        &self,
        id: WorkflowVersionNodeId,
    ) -> Result<Option<WorkflowVersionNode>, StoreError>;

    /// Inserts a node and returns it with its assigned id.
    async fn insert_node(
        &self,
        node: NewWorkflowVersionNode,
    ) -> Result<WorkflowVersionNode, StoreError>;

    /// Overwrites the mutable fields of a node.
    async fn update_node(&self, node: &WorkflowVersionNode) -> Result<(), StoreError>;

    /// Deletes a node and every link touching it.
    async fn delete_node(&self, id: WorkflowVersionNodeId) -> Result<u64, StoreError>;

    /// Lists nodes of a version that have no incoming link.
    async fn root_nodes(
        &self,
        version_id: WorkflowVersionId,
    ) -> Result<Vec<WorkflowVersionNode>, StoreError>;

    /// Gets a link by id.
    async fn get_link(
        &self,
        id: WorkflowVersionNodeLinkId,
    ) -> Result<Option<WorkflowVersionNodeLink>, StoreError>;

    /// Inserts a link and returns it with its assigned id.
    async fn insert_link(
        &self,
        link: NewWorkflowVersionNodeLink,
    ) -> Result<WorkflowVersionNodeLink, StoreError>;

    /// Overwrites the mutable fields of a link.
    async fn update_link(&self, link: &WorkflowVersionNodeLink) -> Result<(), StoreError>;

    /// Deletes a link.
    async fn delete_link(&self, id: WorkflowVersionNodeLinkId) -> Result<u64, StoreError>;

    /// Lists links pointing into a node with the upstream node of each,
    /// ordered by `child_input_index`.
    async fn parent_links(
        &self,
        node_id: WorkflowVersionNodeId,
    ) -> Result<Vec<(WorkflowVersionNodeLink, WorkflowVersionNode)>, StoreError>;

    /// Lists links leaving a node with the downstream node of each,
    /// ordered by `parent_output_index`.
    async fn child_links(
        &self,
        node_id: WorkflowVersionNodeId,
    ) -> Result<Vec<(WorkflowVersionNodeLink, WorkflowVersionNode)>, StoreError>;

    /// Appends a log entry.
    async fn insert_log(&self, log: &WorkflowVersionNodeLog) -> Result<(), StoreError>;

    /// Lists log entries of a node, newest first, at most `limit` rows.
    async fn logs_for_node(
        &self,
        node_id: WorkflowVersionNodeId,
        limit: i64,
    ) -> Result<Vec<WorkflowVersionNodeLog>, StoreError>;

    /// Lists log entries of every node of every version of a workflow,
    /// newest first, at most `limit` rows.
    async fn logs_for_workflow(
        &self,
        workflow_id: WorkflowId,
        limit: i64,
    ) -> Result<Vec<WorkflowVersionNodeLog>, StoreError>;
}
