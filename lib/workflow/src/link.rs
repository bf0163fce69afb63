//! Links between workflow nodes.
//!
//! A link connects one output slot of a parent node to one input slot of a
//! child node. Slots are identified by integer index so a node can expose
//! several outputs (for example "matched" and "unmatched" on a filter).

use boltflow_core::{WorkflowVersionId, WorkflowVersionNodeId, WorkflowVersionNodeLinkId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored directed link `parent -> child`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowVersionNodeLink {
    pub id: WorkflowVersionNodeLinkId,
    pub workflow_version_id: WorkflowVersionId,
    pub name: String,
    pub parent_node_id: WorkflowVersionNodeId,
    pub parent_output_index: i32,
    pub child_node_id: WorkflowVersionNodeId,
    pub child_input_index: i32,
    pub visibility_settings: String,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

/// A link that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWorkflowVersionNodeLink {
    pub workflow_version_id: WorkflowVersionId,
    pub name: String,
    pub parent_node_id: WorkflowVersionNodeId,
    pub parent_output_index: i32,
    pub child_node_id: WorkflowVersionNodeId,
    pub child_input_index: i32,
    pub visibility_settings: String,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

impl NewWorkflowVersionNodeLink {
    /// Creates an unnamed link between slot 0 of both nodes.
    #[must_use]
    pub fn new(
        workflow_version_id: WorkflowVersionId,
        parent_node_id: WorkflowVersionNodeId,
        child_node_id: WorkflowVersionNodeId,
    ) -> Self {
        let now = Utc::now();
        Self {
            workflow_version_id,
            name: String::new(),
            parent_node_id,
            parent_output_index: 0,
            child_node_id,
            child_input_index: 0,
            visibility_settings: String::new(),
            created_on: now,
            updated_on: now,
        }
    }

    /// Sets the output slot on the parent.
    #[must_use]
    pub fn from_output(mut self, index: i32) -> Self {
        self.parent_output_index = index;
        self
    }

    /// Sets the input slot on the child.
    #[must_use]
    pub fn to_input(mut self, index: i32) -> Self {
        self.child_input_index = index;
        self
    }

    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attaches the id assigned by the store.
    #[must_use]
    pub fn with_id(self, id: WorkflowVersionNodeLinkId) -> WorkflowVersionNodeLink {
        WorkflowVersionNodeLink {
            id,
            workflow_version_id: self.workflow_version_id,
            name: self.name,
            parent_node_id: self.parent_node_id,
            parent_output_index: self.parent_output_index,
            child_node_id: self.child_node_id,
            child_input_index: self.child_input_index,
            visibility_settings: self.visibility_settings,
            created_on: self.created_on,
            updated_on: self.updated_on,
        }
    }
}
