//! Workflow and workflow version records.
//!
//! A workflow is a named automation that owns numbered versions. Each
//! version owns its own nodes and links, so activating a different version
//! swaps the whole graph at once.

use boltflow_core::{Status, WorkflowId, WorkflowVersionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Format used for names generated when the caller leaves the name empty.
pub const DEFAULT_NAME_FORMAT: &str = "%Y%m%d.%H%M%S.%6f";

/// Returns a timestamp-derived name such as `20240131.142501.000123`.
#[must_use]
pub fn default_name(at: DateTime<Utc>) -> String {
    at.format(DEFAULT_NAME_FORMAT).to_string()
}

/// Returns `name`, or a timestamp-derived name when `name` is empty.
pub(crate) fn name_or_default(name: String, at: DateTime<Utc>) -> String {
    if name.is_empty() { default_name(at) } else { name }
}

/// A stored workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    /// Opaque classification set by the editor.
    pub workflow_type: i32,
    pub status: Status,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

/// A workflow that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWorkflow {
    pub name: String,
    pub workflow_type: i32,
    pub status: Status,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

impl NewWorkflow {
    /// Creates an inactive workflow stamped with the current time.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            workflow_type: 0,
            status: Status::Inactive,
            created_on: now,
            updated_on: now,
        }
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Attaches the id assigned by the store.
    #[must_use]
    pub fn with_id(self, id: WorkflowId) -> Workflow {
        Workflow {
            id,
            name: self.name,
            workflow_type: self.workflow_type,
            status: self.status,
            created_on: self.created_on,
            updated_on: self.updated_on,
        }
    }
}

/// One numbered revision of a workflow.
///
/// Version `0` is the unreleased draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowVersion {
    pub id: WorkflowVersionId,
    pub workflow_id: WorkflowId,
    pub version: i32,
    pub name: String,
    pub status: Status,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

impl WorkflowVersion {
    /// Returns true for the unreleased draft revision.
    #[must_use]
    pub fn is_draft(&self) -> bool {
        self.version == 0
    }
}

/// A workflow version that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWorkflowVersion {
    pub workflow_id: WorkflowId,
    pub version: i32,
    pub name: String,
    pub status: Status,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

impl NewWorkflowVersion {
    /// Attaches the id assigned by the store.
    #[must_use]
    pub fn with_id(self, id: WorkflowVersionId) -> WorkflowVersion {
        WorkflowVersion {
            id,
            workflow_id: self.workflow_id,
            version: self.version,
            name: self.name,
            status: self.status,
            created_on: self.created_on,
            updated_on: self.updated_on,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn default_name_uses_microseconds() {
        let at = Utc
            .with_ymd_and_hms(2024, 1, 31, 14, 25, 1)
            .single()
            .expect("valid timestamp")
            + chrono::Duration::microseconds(123);
        assert_eq!(default_name(at), "20240131.142501.000123");
    }

    #[test]
    fn empty_name_is_replaced() {
        let at = Utc
            .with_ymd_and_hms(2023, 6, 1, 0, 0, 0)
            .single()
            .expect("valid timestamp");
        assert_eq!(name_or_default(String::new(), at), "20230601.000000.000000");
        assert_eq!(name_or_default("mine".to_string(), at), "mine");
    }

    #[test]
    fn new_workflow_stamps_both_timestamps() {
        let new = NewWorkflow::new("fees").with_status(Status::Active);
        assert_eq!(new.created_on, new.updated_on);
        let workflow = new.with_id(WorkflowId::new(4));
        assert_eq!(workflow.id.get(), 4);
        assert!(workflow.status.is_active());
    }
}
