//! In-memory [`WorkflowStore`] used by tests and local tooling.

use crate::definition::{NewWorkflow, NewWorkflowVersion, Workflow, WorkflowVersion};
use crate::error::StoreError;
use crate::link::{NewWorkflowVersionNodeLink, WorkflowVersionNodeLink};
use crate::log::WorkflowVersionNodeLog;
use crate::node::{NewWorkflowVersionNode, WorkflowVersionNode};
use crate::store::WorkflowStore;
use async_trait::async_trait;
use boltflow_core::{
    Status, WorkflowId, WorkflowVersionId, WorkflowVersionNodeId, WorkflowVersionNodeLinkId,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

#[derive(Default)]
struct Tables {
    next_id: i64,
    workflows: BTreeMap<WorkflowId, Workflow>,
    versions: BTreeMap<WorkflowVersionId, WorkflowVersion>,
    nodes: BTreeMap<WorkflowVersionNodeId, WorkflowVersionNode>,
    links: BTreeMap<WorkflowVersionNodeLinkId, WorkflowVersionNodeLink>,
    logs: Vec<WorkflowVersionNodeLog>,
}

impl Tables {
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn version_taken(&self, workflow_id: WorkflowId, version: i32, except: Option<WorkflowVersionId>) -> bool {
        self.versions
            .values()
            .any(|v| v.workflow_id == workflow_id && v.version == version && Some(v.id) != except)
    }

    fn remove_node_cascade(&mut self, id: WorkflowVersionNodeId) -> u64 {
        if self.nodes.remove(&id).is_none() {
            return 0;
        }
        self.links
            .retain(|_, l| l.parent_node_id != id && l.child_node_id != id);
        self.logs.retain(|l| l.workflow_version_node_id != id);
        1
    }

    fn remove_version_cascade(&mut self, id: WorkflowVersionId) -> u64 {
        if self.versions.remove(&id).is_none() {
            return 0;
        }
        let node_ids: Vec<_> = self
            .nodes
            .values()
            .filter(|n| n.workflow_version_id == id)
            .map(|n| n.id)
            .collect();
        for node_id in node_ids {
            self.remove_node_cascade(node_id);
        }
        self.links.retain(|_, l| l.workflow_version_id != id);
        1
    }

    fn endpoints_exist(&self, link: &NewWorkflowVersionNodeLink) -> bool {
        self.nodes.contains_key(&link.parent_node_id) && self.nodes.contains_key(&link.child_node_id)
    }

    fn joined(
        &self,
        filter: impl Fn(&WorkflowVersionNodeLink) -> Option<WorkflowVersionNodeId>,
    ) -> Vec<(WorkflowVersionNodeLink, WorkflowVersionNode)> {
        self.links
            .values()
            .filter_map(|link| {
                let other = filter(link)?;
                let node = self.nodes.get(&other)?;
                Some((link.clone(), node.clone()))
            })
            .collect()
    }
}

/// A [`WorkflowStore`] backed by ordered maps behind a mutex.
///
/// Enforces the same uniqueness and cascade rules as the relational schema.
#[derive(Clone, Default)]
pub struct InMemoryWorkflowStore {
    tables: Arc<Mutex<Tables>>,
    fail_logs: Arc<AtomicBool>,
}

impl InMemoryWorkflowStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent log insert fail with a storage failure.
    pub fn fail_log_inserts(&self, fail: bool) {
        self.fail_logs.store(fail, Ordering::SeqCst);
    }
}

fn missing_row(operation: &'static str, id: impl std::fmt::Display) -> StoreError {
    StoreError::StorageFailure {
        operation,
        details: format!("no row with id {id}"),
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn get_workflow(&self, id: WorkflowId) -> Result<Option<Workflow>, StoreError> {
        Ok(self.tables.lock().await.workflows.get(&id).cloned())
    }

    async fn get_workflow_by_version_id(
        &self,
        version_id: WorkflowVersionId,
    ) -> Result<Option<Workflow>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .versions
            .get(&version_id)
            .and_then(|v| tables.workflows.get(&v.workflow_id))
            .cloned())
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        Ok(self.tables.lock().await.workflows.values().cloned().collect())
    }

    async fn insert_workflow(&self, workflow: NewWorkflow) -> Result<Workflow, StoreError> {
        let mut tables = self.tables.lock().await;
        let workflow = workflow.with_id(WorkflowId::new(tables.allocate()));
        tables.workflows.insert(workflow.id, workflow.clone());
        Ok(workflow)
    }

    async fn update_workflow(&self, workflow: &Workflow) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let existing = tables
            .workflows
            .get_mut(&workflow.id)
            .ok_or_else(|| missing_row("update_workflow", workflow.id))?;
        existing.name = workflow.name.clone();
        existing.workflow_type = workflow.workflow_type;
        existing.status = workflow.status;
        existing.updated_on = workflow.updated_on;
        Ok(())
    }

    async fn delete_workflow(&self, id: WorkflowId) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.workflows.remove(&id).is_none() {
            return Ok(0);
        }
        let version_ids: Vec<_> = tables
            .versions
            .values()
            .filter(|v| v.workflow_id == id)
            .map(|v| v.id)
            .collect();
        for version_id in version_ids {
            tables.remove_version_cascade(version_id);
        }
        Ok(1)
    }

    async fn get_version(
        &self,
        id: WorkflowVersionId,
    ) -> Result<Option<WorkflowVersion>, StoreError> {
        Ok(self.tables.lock().await.versions.get(&id).cloned())
    }

    async fn list_versions(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<WorkflowVersion>, StoreError> {
        let tables = self.tables.lock().await;
        let mut versions: Vec<_> = tables
            .versions
            .values()
            .filter(|v| v.workflow_id == workflow_id)
            .cloned()
            .collect();
        versions.sort_by_key(|v| v.version);
        Ok(versions)
    }

    async fn find_version(
        &self,
        workflow_id: WorkflowId,
        version: i32,
    ) -> Result<Option<WorkflowVersion>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .versions
            .values()
            .find(|v| v.workflow_id == workflow_id && v.version == version)
            .cloned())
    }

    async fn latest_version(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Option<WorkflowVersion>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .versions
            .values()
            .filter(|v| v.workflow_id == workflow_id)
            .max_by_key(|v| v.version)
            .cloned())
    }

    async fn active_versions(&self) -> Result<Vec<WorkflowVersion>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .versions
            .values()
            .filter(|v| v.status == Status::Active)
            .cloned()
            .collect())
    }

    async fn insert_version(
        &self,
        version: NewWorkflowVersion,
    ) -> Result<WorkflowVersion, StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.workflows.contains_key(&version.workflow_id) {
            return Err(missing_row("insert_workflow_version", version.workflow_id));
        }
        if tables.version_taken(version.workflow_id, version.version, None) {
            return Err(StoreError::ConstraintViolation {
                operation: "insert_workflow_version",
                details: format!(
                    "workflow {} already has version {}",
                    version.workflow_id, version.version
                ),
            });
        }
        let version = version.with_id(WorkflowVersionId::new(tables.allocate()));
        tables.versions.insert(version.id, version.clone());
        Ok(version)
    }

    async fn update_version(&self, version: &WorkflowVersion) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.version_taken(version.workflow_id, version.version, Some(version.id)) {
            return Err(StoreError::ConstraintViolation {
                operation: "update_workflow_version",
                details: format!(
                    "workflow {} already has version {}",
                    version.workflow_id, version.version
                ),
            });
        }
        let existing = tables
            .versions
            .get_mut(&version.id)
            .ok_or_else(|| missing_row("update_workflow_version", version.id))?;
        existing.version = version.version;
        existing.name = version.name.clone();
        existing.status = version.status;
        existing.updated_on = version.updated_on;
        Ok(())
    }

    async fn delete_version(&self, id: WorkflowVersionId) -> Result<u64, StoreError> {
        Ok(self.tables.lock().await.remove_version_cascade(id))
    }

    async fn get_node(
        &self,
        id: WorkflowVersionNodeId,
    ) -> Result<Option<WorkflowVersionNode>, StoreError> {
        Ok(self.tables.lock().await.nodes.get(&id).cloned())
    }

    async fn insert_node(
        &self,
        node: NewWorkflowVersionNode,
    ) -> Result<WorkflowVersionNode, StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.versions.contains_key(&node.workflow_version_id) {
            return Err(missing_row("insert_workflow_version_node", node.workflow_version_id));
        }
        let node = node.with_id(WorkflowVersionNodeId::new(tables.allocate()));
        tables.nodes.insert(node.id, node.clone());
        Ok(node)
    }

    async fn update_node(&self, node: &WorkflowVersionNode) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let existing = tables
            .nodes
            .get_mut(&node.id)
            .ok_or_else(|| missing_row("update_workflow_version_node", node.id))?;
        existing.name = node.name.clone();
        existing.node_type = node.node_type;
        existing.status = node.status;
        existing.parameters = node.parameters.clone();
        existing.visibility_settings = node.visibility_settings.clone();
        existing.updated_on = node.updated_on;
        Ok(())
    }

    async fn delete_node(&self, id: WorkflowVersionNodeId) -> Result<u64, StoreError> {
        Ok(self.tables.lock().await.remove_node_cascade(id))
    }

    async fn root_nodes(
        &self,
        version_id: WorkflowVersionId,
    ) -> Result<Vec<WorkflowVersionNode>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .nodes
            .values()
            .filter(|n| n.workflow_version_id == version_id)
            .filter(|n| !tables.links.values().any(|l| l.child_node_id == n.id))
            .cloned()
            .collect())
    }

    async fn get_link(
        &self,
        id: WorkflowVersionNodeLinkId,
    ) -> Result<Option<WorkflowVersionNodeLink>, StoreError> {
        Ok(self.tables.lock().await.links.get(&id).cloned())
    }

    async fn insert_link(
        &self,
        link: NewWorkflowVersionNodeLink,
    ) -> Result<WorkflowVersionNodeLink, StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.endpoints_exist(&link) {
            return Err(StoreError::StorageFailure {
                operation: "insert_workflow_version_node_link",
                details: format!(
                    "link endpoints {} -> {} must both exist",
                    link.parent_node_id, link.child_node_id
                ),
            });
        }
        let link = link.with_id(WorkflowVersionNodeLinkId::new(tables.allocate()));
        tables.links.insert(link.id, link.clone());
        Ok(link)
    }

    async fn update_link(&self, link: &WorkflowVersionNodeLink) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let existing = tables
            .links
            .get_mut(&link.id)
            .ok_or_else(|| missing_row("update_workflow_version_node_link", link.id))?;
        existing.name = link.name.clone();
        existing.parent_node_id = link.parent_node_id;
        existing.parent_output_index = link.parent_output_index;
        existing.child_node_id = link.child_node_id;
        existing.child_input_index = link.child_input_index;
        existing.visibility_settings = link.visibility_settings.clone();
        existing.updated_on = link.updated_on;
        Ok(())
    }

    async fn delete_link(&self, id: WorkflowVersionNodeLinkId) -> Result<u64, StoreError> {
        Ok(u64::from(self.tables.lock().await.links.remove(&id).is_some()))
    }

    async fn parent_links(
        &self,
        node_id: WorkflowVersionNodeId,
    ) -> Result<Vec<(WorkflowVersionNodeLink, WorkflowVersionNode)>, StoreError> {
        let tables = self.tables.lock().await;
        let mut joined =
            tables.joined(|l| (l.child_node_id == node_id).then_some(l.parent_node_id));
        joined.sort_by_key(|(l, _)| (l.child_input_index, l.id));
        Ok(joined)
    }

    async fn child_links(
        &self,
        node_id: WorkflowVersionNodeId,
    ) -> Result<Vec<(WorkflowVersionNodeLink, WorkflowVersionNode)>, StoreError> {
        let tables = self.tables.lock().await;
        let mut joined =
            tables.joined(|l| (l.parent_node_id == node_id).then_some(l.child_node_id));
        joined.sort_by_key(|(l, _)| (l.parent_output_index, l.id));
        Ok(joined)
    }

    async fn insert_log(&self, log: &WorkflowVersionNodeLog) -> Result<(), StoreError> {
        if self.fail_logs.load(Ordering::SeqCst) {
            return Err(StoreError::StorageFailure {
                operation: "insert_workflow_version_node_log",
                details: "log inserts disabled".to_string(),
            });
        }
        self.tables.lock().await.logs.push(log.clone());
        Ok(())
    }

    async fn logs_for_node(
        &self,
        node_id: WorkflowVersionNodeId,
        limit: i64,
    ) -> Result<Vec<WorkflowVersionNodeLog>, StoreError> {
        let tables = self.tables.lock().await;
        let mut logs: Vec<_> = tables
            .logs
            .iter()
            .filter(|l| l.workflow_version_node_id == node_id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.created_on.cmp(&a.created_on));
        logs.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(logs)
    }

    async fn logs_for_workflow(
        &self,
        workflow_id: WorkflowId,
        limit: i64,
    ) -> Result<Vec<WorkflowVersionNodeLog>, StoreError> {
        let tables = self.tables.lock().await;
        let mut logs: Vec<_> = tables
            .logs
            .iter()
            .filter(|l| {
                tables
                    .nodes
                    .get(&l.workflow_version_node_id)
                    .and_then(|n| tables.versions.get(&n.workflow_version_id))
                    .is_some_and(|v| v.workflow_id == workflow_id)
            })
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.created_on.cmp(&a.created_on));
        logs.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(logs)
    }
}
