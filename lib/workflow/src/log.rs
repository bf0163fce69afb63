//! Execution log for workflow node invocations.
//!
//! The log is append-only: there is no update or delete path. Callers must
//! treat a failed append as something to report, never as a reason to abort
//! the run the entry describes.

use crate::error::WorkflowError;
use crate::store::WorkflowStore;
use boltflow_core::{WorkflowId, WorkflowVersionNodeId};
use chrono::{DateTime, Utc};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Upper bound on the number of entries a single log query returns.
pub const MAX_LOG_RESULTS: i64 = 500;

/// One recorded node invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowVersionNodeLog {
    /// The Lightning node the invocation acted for.
    pub node_id: i64,
    /// Correlates all entries produced by one trigger firing.
    pub trigger_reference: String,
    pub input_data: String,
    pub output_data: String,
    pub debug_data: String,
    pub error_data: String,
    /// The workflow node that ran.
    pub workflow_version_node_id: WorkflowVersionNodeId,
    /// The trigger node that started the run, when different from the node that ran.
    pub triggered_workflow_version_node_id: Option<WorkflowVersionNodeId>,
    pub created_on: DateTime<Utc>,
}

impl WorkflowVersionNodeLog {
    /// Creates an entry with empty payloads.
    #[must_use]
    pub fn new(
        node_id: i64,
        workflow_version_node_id: WorkflowVersionNodeId,
        trigger_reference: impl Into<String>,
    ) -> Self {
        Self {
            node_id,
            trigger_reference: trigger_reference.into(),
            input_data: String::new(),
            output_data: String::new(),
            debug_data: String::new(),
            error_data: String::new(),
            workflow_version_node_id,
            triggered_workflow_version_node_id: None,
            created_on: Utc::now(),
        }
    }

    /// Sets the input payload.
    #[must_use]
    pub fn with_input(mut self, data: impl Into<String>) -> Self {
        self.input_data = data.into();
        self
    }

    /// Sets the output payload.
    #[must_use]
    pub fn with_output(mut self, data: impl Into<String>) -> Self {
        self.output_data = data.into();
        self
    }

    /// Sets the debug payload.
    #[must_use]
    pub fn with_debug(mut self, data: impl Into<String>) -> Self {
        self.debug_data = data.into();
        self
    }

    /// Sets the error payload.
    #[must_use]
    pub fn with_error(mut self, data: impl Into<String>) -> Self {
        self.error_data = data.into();
        self
    }

    /// Records the trigger node that started the run.
    #[must_use]
    pub fn triggered_by(mut self, trigger_node_id: WorkflowVersionNodeId) -> Self {
        self.triggered_workflow_version_node_id = Some(trigger_node_id);
        self
    }
}

/// Clamps a caller-supplied limit into `0..=MAX_LOG_RESULTS`.
#[must_use]
pub fn clamp_log_limit(limit: i64) -> i64 {
    limit.clamp(0, MAX_LOG_RESULTS)
}

/// Appends an entry, stamping `created_on` with the write time.
///
/// # Errors
///
/// Returns the store failure; the entry is not retried.
#[instrument(skip(store, entry), fields(node = %entry.workflow_version_node_id))]
pub async fn append_log<S: WorkflowStore + ?Sized>(
    store: &S,
    mut entry: WorkflowVersionNodeLog,
) -> Result<WorkflowVersionNodeLog, Report<WorkflowError>> {
    entry.created_on = Utc::now();
    store.insert_log(&entry).await.map_err(WorkflowError::Store)?;
    Ok(entry)
}

/// Returns the most recent entries for a node.
///
/// # Errors
///
/// Returns the store failure.
pub async fn logs_for_node<S: WorkflowStore + ?Sized>(
    store: &S,
    node_id: WorkflowVersionNodeId,
    limit: i64,
) -> Result<Vec<WorkflowVersionNodeLog>, Report<WorkflowError>> {
    Ok(store
        .logs_for_node(node_id, clamp_log_limit(limit))
        .await
        .map_err(WorkflowError::Store)?)
}

/// Returns the most recent entries across every node of a workflow.
///
/// # Errors
///
/// Returns the store failure.
pub async fn logs_for_workflow<S: WorkflowStore + ?Sized>(
    store: &S,
    workflow_id: WorkflowId,
    limit: i64,
) -> Result<Vec<WorkflowVersionNodeLog>, Report<WorkflowError>> {
    Ok(store
        .logs_for_workflow(workflow_id, clamp_log_limit(limit))
        .await
        .map_err(WorkflowError::Store)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{NewWorkflow, NewWorkflowVersion};
    use crate::memory::InMemoryWorkflowStore;
    use crate::node::{NewWorkflowVersionNode, WorkflowNodeType};
    use boltflow_core::Status;

    async fn seeded_node(store: &InMemoryWorkflowStore) -> (WorkflowId, WorkflowVersionNodeId) {
        let workflow = store
            .insert_workflow(NewWorkflow::new("logs"))
            .await
            .expect("insert workflow");
        let now = Utc::now();
        let version = store
            .insert_version(NewWorkflowVersion {
                workflow_id: workflow.id,
                version: 1,
                name: "v1".to_string(),
                status: Status::Active,
                created_on: now,
                updated_on: now,
            })
            .await
            .expect("insert version");
        let node = store
            .insert_node(NewWorkflowVersionNode::new(version.id, WorkflowNodeType::TimeTrigger))
            .await
            .expect("insert node");
        (workflow.id, node.id)
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(clamp_log_limit(-3), 0);
        assert_eq!(clamp_log_limit(25), 25);
        assert_eq!(clamp_log_limit(1_000_000), MAX_LOG_RESULTS);
    }

    #[tokio::test]
    async fn append_then_read_newest_first() {
        let store = InMemoryWorkflowStore::new();
        let (workflow_id, node_id) = seeded_node(&store).await;

        for i in 0..3 {
            let entry = WorkflowVersionNodeLog::new(1, node_id, format!("ref-{i}"))
                .with_output(format!("{{\"i\":{i}}}"));
            append_log(&store, entry).await.expect("append");
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let logs = logs_for_node(&store, node_id, 2).await.expect("read");
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].trigger_reference, "ref-2");
        assert_eq!(logs[1].trigger_reference, "ref-1");

        let all = logs_for_workflow(&store, workflow_id, 10).await.expect("read");
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn failed_append_surfaces_storage_failure() {
        let store = InMemoryWorkflowStore::new();
        let (_, node_id) = seeded_node(&store).await;
        store.fail_log_inserts(true);

        let result = append_log(&store, WorkflowVersionNodeLog::new(1, node_id, "r")).await;
        assert!(result.is_err());
        store.fail_log_inserts(false);
        assert!(logs_for_node(&store, node_id, 10).await.expect("read").is_empty());
    }
}
