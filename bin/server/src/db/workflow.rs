//! PostgreSQL store for workflows, versions, nodes, links and the node log.

use super::{invalid_column, is_unique_violation};
use async_trait::async_trait;
use boltflow_core::{
    Status, WorkflowId, WorkflowVersionId, WorkflowVersionNodeId, WorkflowVersionNodeLinkId,
};
use boltflow_workflow::{
    NewWorkflow, NewWorkflowVersion, NewWorkflowVersionNode, NewWorkflowVersionNodeLink,
    StoreError, Workflow, WorkflowNodeType, WorkflowStore, WorkflowVersion, WorkflowVersionNode,
    WorkflowVersionNodeLink, WorkflowVersionNodeLog,
};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

fn store_error(operation: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| {
        if is_unique_violation(&e) {
            StoreError::ConstraintViolation {
                operation,
                details: e.to_string(),
            }
        } else {
            StoreError::StorageFailure {
                operation,
                details: e.to_string(),
            }
        }
    }
}

fn missing_row(operation: &'static str, id: impl std::fmt::Display) -> StoreError {
    StoreError::StorageFailure {
        operation,
        details: format!("no row with id {id}"),
    }
}

fn status(column: &'static str, raw: i32) -> Result<Status, sqlx::Error> {
    Status::from_i32(raw).ok_or_else(|| invalid_column(column, raw))
}

/// Row type for workflow queries.
#[derive(FromRow)]
struct WorkflowRow {
    workflow_id: i64,
    name: String,
    workflow_type: i32,
    status: i32,
    created_on: DateTime<Utc>,
    updated_on: DateTime<Utc>,
}

impl WorkflowRow {
    fn try_into_workflow(self) -> Result<Workflow, sqlx::Error> {
        Ok(Workflow {
            id: WorkflowId::new(self.workflow_id),
            name: self.name,
            workflow_type: self.workflow_type,
            status: status("workflow.status", self.status)?,
            created_on: self.created_on,
            updated_on: self.updated_on,
        })
    }
}

/// Row type for workflow version queries.
#[derive(FromRow)]
struct VersionRow {
    workflow_version_id: i64,
    workflow_id: i64,
    version: i32,
    name: String,
    status: i32,
    created_on: DateTime<Utc>,
    updated_on: DateTime<Utc>,
}

impl VersionRow {
    fn try_into_version(self) -> Result<WorkflowVersion, sqlx::Error> {
        Ok(WorkflowVersion {
            id: WorkflowVersionId::new(self.workflow_version_id),
            workflow_id: WorkflowId::new(self.workflow_id),
            version: self.version,
            name: self.name,
            status: status("workflow_version.status", self.status)?,
            created_on: self.created_on,
            updated_on: self.updated_on,
        })
    }
}

/// Row type for node queries.
#[derive(FromRow)]
struct NodeRow {
    workflow_version_node_id: i64,
    workflow_version_id: i64,
    name: String,
    node_type: i32,
    status: i32,
    parameters: String,
    visibility_settings: String,
    created_on: DateTime<Utc>,
    updated_on: DateTime<Utc>,
}

impl NodeRow {
    fn try_into_node(self) -> Result<WorkflowVersionNode, sqlx::Error> {
        let node_type = WorkflowNodeType::from_i32(self.node_type)
            .ok_or_else(|| invalid_column("workflow_version_node.type", self.node_type))?;
        Ok(WorkflowVersionNode {
            id: WorkflowVersionNodeId::new(self.workflow_version_node_id),
            workflow_version_id: WorkflowVersionId::new(self.workflow_version_id),
            name: self.name,
            node_type,
            status: status("workflow_version_node.status", self.status)?,
            parameters: self.parameters,
            visibility_settings: self.visibility_settings,
            created_on: self.created_on,
            updated_on: self.updated_on,
        })
    }
}

/// Row type for link queries.
#[derive(FromRow)]
struct LinkRow {
    workflow_version_node_link_id: i64,
    workflow_version_id: i64,
    name: String,
    parent_workflow_version_node_id: i64,
    parent_output_index: i32,
    child_workflow_version_node_id: i64,
    child_input_index: i32,
    visibility_settings: String,
    created_on: DateTime<Utc>,
    updated_on: DateTime<Utc>,
}

impl LinkRow {
    fn into_link(self) -> WorkflowVersionNodeLink {
        WorkflowVersionNodeLink {
            id: WorkflowVersionNodeLinkId::new(self.workflow_version_node_link_id),
            workflow_version_id: WorkflowVersionId::new(self.workflow_version_id),
            name: self.name,
            parent_node_id: WorkflowVersionNodeId::new(self.parent_workflow_version_node_id),
            parent_output_index: self.parent_output_index,
            child_node_id: WorkflowVersionNodeId::new(self.child_workflow_version_node_id),
            child_input_index: self.child_input_index,
            visibility_settings: self.visibility_settings,
            created_on: self.created_on,
            updated_on: self.updated_on,
        }
    }
}

/// Row type for a link joined with the node at its far end.
#[derive(FromRow)]
struct LinkedNodeRow {
    #[sqlx(flatten)]
    link: LinkRow,
    linked_node_id: i64,
    linked_version_id: i64,
    linked_name: String,
    linked_type: i32,
    linked_status: i32,
    linked_parameters: String,
    linked_visibility_settings: String,
    linked_created_on: DateTime<Utc>,
    linked_updated_on: DateTime<Utc>,
}

impl LinkedNodeRow {
    fn try_into_pair(
        self,
    ) -> Result<(WorkflowVersionNodeLink, WorkflowVersionNode), sqlx::Error> {
        let node = NodeRow {
            workflow_version_node_id: self.linked_node_id,
            workflow_version_id: self.linked_version_id,
            name: self.linked_name,
            node_type: self.linked_type,
            status: self.linked_status,
            parameters: self.linked_parameters,
            visibility_settings: self.linked_visibility_settings,
            created_on: self.linked_created_on,
            updated_on: self.linked_updated_on,
        }
        .try_into_node()?;
        Ok((self.link.into_link(), node))
    }
}

/// Row type for node log queries.
#[derive(FromRow)]
struct LogRow {
    node_id: i64,
    trigger_reference: String,
    input_data: String,
    output_data: String,
    debug_data: String,
    error_data: String,
    workflow_version_node_id: i64,
    triggered_workflow_version_node_id: Option<i64>,
    created_on: DateTime<Utc>,
}

impl LogRow {
    fn into_log(self) -> WorkflowVersionNodeLog {
        WorkflowVersionNodeLog {
            node_id: self.node_id,
            trigger_reference: self.trigger_reference,
            input_data: self.input_data,
            output_data: self.output_data,
            debug_data: self.debug_data,
            error_data: self.error_data,
            workflow_version_node_id: WorkflowVersionNodeId::new(self.workflow_version_node_id),
            triggered_workflow_version_node_id: self
                .triggered_workflow_version_node_id
                .map(WorkflowVersionNodeId::new),
            created_on: self.created_on,
        }
    }
}

/// [`WorkflowStore`] over a Postgres pool.
#[derive(Clone)]
pub struct PgWorkflowStore {
    pool: PgPool,
}

impl PgWorkflowStore {
    /// Creates a new store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_linked(
        &self,
        operation: &'static str,
        sql: &'static str,
        node_id: WorkflowVersionNodeId,
    ) -> Result<Vec<(WorkflowVersionNodeLink, WorkflowVersionNode)>, StoreError> {
        let rows: Vec<LinkedNodeRow> = sqlx::query_as(sql)
            .bind(node_id.get())
            .fetch_all(&self.pool)
            .await
            .map_err(store_error(operation))?;
        rows.into_iter()
            .map(LinkedNodeRow::try_into_pair)
            .collect::<Result<_, _>>()
            .map_err(store_error(operation))
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn get_workflow(&self, id: WorkflowId) -> Result<Option<Workflow>, StoreError> {
        let row: Option<WorkflowRow> = sqlx::query_as(
            r#"
            SELECT workflow_id, name, type AS workflow_type, status, created_on, updated_on
            FROM workflow
            WHERE workflow_id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error("get_workflow"))?;
        row.map(WorkflowRow::try_into_workflow)
            .transpose()
            .map_err(store_error("get_workflow"))
    }

    async fn get_workflow_by_version_id(
        &self,
        version_id: WorkflowVersionId,
    ) -> Result<Option<Workflow>, StoreError> {
        let row: Option<WorkflowRow> = sqlx::query_as(
            r#"
            SELECT w.workflow_id, w.name, w.type AS workflow_type, w.status, w.created_on, w.updated_on
            FROM workflow w
            JOIN workflow_version wv ON wv.workflow_id = w.workflow_id
            WHERE wv.workflow_version_id = $1
            "#,
        )
        .bind(version_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error("get_workflow_by_version_id"))?;
        row.map(WorkflowRow::try_into_workflow)
            .transpose()
            .map_err(store_error("get_workflow_by_version_id"))
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        let rows: Vec<WorkflowRow> = sqlx::query_as(
            r#"
            SELECT workflow_id, name, type AS workflow_type, status, created_on, updated_on
            FROM workflow
            ORDER BY workflow_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error("list_workflows"))?;
        rows.into_iter()
            .map(WorkflowRow::try_into_workflow)
            .collect::<Result<_, _>>()
            .map_err(store_error("list_workflows"))
    }

    async fn insert_workflow(&self, workflow: NewWorkflow) -> Result<Workflow, StoreError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO workflow (name, type, status, created_on, updated_on)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING workflow_id
            "#,
        )
        .bind(&workflow.name)
        .bind(workflow.workflow_type)
        .bind(workflow.status.as_i32())
        .bind(workflow.created_on)
        .bind(workflow.updated_on)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error("insert_workflow"))?;
        Ok(workflow.with_id(WorkflowId::new(id)))
    }

    async fn update_workflow(&self, workflow: &Workflow) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE workflow
            SET name = $2, type = $3, status = $4, updated_on = $5
            WHERE workflow_id = $1
            "#,
        )
        .bind(workflow.id.get())
        .bind(&workflow.name)
        .bind(workflow.workflow_type)
        .bind(workflow.status.as_i32())
        .bind(workflow.updated_on)
        .execute(&self.pool)
        .await
        .map_err(store_error("update_workflow"))?;
        if result.rows_affected() == 0 {
            return Err(missing_row("update_workflow", workflow.id));
        }
        Ok(())
    }

    async fn delete_workflow(&self, id: WorkflowId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM workflow WHERE workflow_id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(store_error("delete_workflow"))?;
        Ok(result.rows_affected())
    }

    async fn get_version(
        &self,
        id: WorkflowVersionId,
    ) -> Result<Option<WorkflowVersion>, StoreError> {
        let row: Option<VersionRow> = sqlx::query_as(
            r#"
            SELECT workflow_version_id, workflow_id, version, name, status, created_on, updated_on
            FROM workflow_version
            WHERE workflow_version_id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error("get_workflow_version"))?;
        row.map(VersionRow::try_into_version)
            .transpose()
            .map_err(store_error("get_workflow_version"))
    }

    async fn list_versions(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<WorkflowVersion>, StoreError> {
        let rows: Vec<VersionRow> = sqlx::query_as(
            r#"
            SELECT workflow_version_id, workflow_id, version, name, status, created_on, updated_on
            FROM workflow_version
            WHERE workflow_id = $1
            ORDER BY version
            "#,
        )
        .bind(workflow_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error("list_workflow_versions"))?;
        rows.into_iter()
            .map(VersionRow::try_into_version)
            .collect::<Result<_, _>>()
            .map_err(store_error("list_workflow_versions"))
    }

    async fn find_version(
        &self,
        workflow_id: WorkflowId,
        version: i32,
    ) -> Result<Option<WorkflowVersion>, StoreError> {
        let row: Option<VersionRow> = sqlx::query_as(
            r#"
            SELECT workflow_version_id, workflow_id, version, name, status, created_on, updated_on
            FROM workflow_version
            WHERE workflow_id = $1 AND version = $2
            "#,
        )
        .bind(workflow_id.get())
        .bind(version)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error("find_workflow_version"))?;
        row.map(VersionRow::try_into_version)
            .transpose()
            .map_err(store_error("find_workflow_version"))
    }

    async fn latest_version(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Option<WorkflowVersion>, StoreError> {
        let row: Option<VersionRow> = sqlx::query_as(
            r#"
            SELECT workflow_version_id, workflow_id, version, name, status, created_on, updated_on
            FROM workflow_version
            WHERE workflow_id = $1
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(workflow_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error("latest_workflow_version"))?;
        row.map(VersionRow::try_into_version)
            .transpose()
            .map_err(store_error("latest_workflow_version"))
    }

    async fn active_versions(&self) -> Result<Vec<WorkflowVersion>, StoreError> {
        let rows: Vec<VersionRow> = sqlx::query_as(
            r#"
            SELECT workflow_version_id, workflow_id, version, name, status, created_on, updated_on
            FROM workflow_version
            WHERE status = $1
            ORDER BY workflow_id, version
            "#,
        )
        .bind(Status::Active.as_i32())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error("active_workflow_versions"))?;
        rows.into_iter()
            .map(VersionRow::try_into_version)
            .collect::<Result<_, _>>()
            .map_err(store_error("active_workflow_versions"))
    }

    async fn insert_version(
        &self,
        version: NewWorkflowVersion,
    ) -> Result<WorkflowVersion, StoreError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO workflow_version (workflow_id, version, name, status, created_on, updated_on)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING workflow_version_id
            "#,
        )
        .bind(version.workflow_id.get())
        .bind(version.version)
        .bind(&version.name)
        .bind(version.status.as_i32())
        .bind(version.created_on)
        .bind(version.updated_on)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error("insert_workflow_version"))?;
        Ok(version.with_id(WorkflowVersionId::new(id)))
    }

    async fn update_version(&self, version: &WorkflowVersion) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_version
            SET version = $2, name = $3, status = $4, updated_on = $5
            WHERE workflow_version_id = $1
            "#,
        )
        .bind(version.id.get())
        .bind(version.version)
        .bind(&version.name)
        .bind(version.status.as_i32())
        .bind(version.updated_on)
        .execute(&self.pool)
        .await
        .map_err(store_error("update_workflow_version"))?;
        if result.rows_affected() == 0 {
            return Err(missing_row("update_workflow_version", version.id));
        }
        Ok(())
    }

    async fn delete_version(&self, id: WorkflowVersionId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM workflow_version WHERE workflow_version_id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(store_error("delete_workflow_version"))?;
        Ok(result.rows_affected())
    }

    async fn get_node(
        &self,
        id: WorkflowVersionNodeId,
    ) -> Result<Option<WorkflowVersionNode>, StoreError> {
        let row: Option<NodeRow> = sqlx::query_as(
            r#"
            SELECT workflow_version_node_id, workflow_version_id, name, type AS node_type, status,
                   parameters, visibility_settings, created_on, updated_on
            FROM workflow_version_node
            WHERE workflow_version_node_id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error("get_workflow_version_node"))?;
        row.map(NodeRow::try_into_node)
            .transpose()
            .map_err(store_error("get_workflow_version_node"))
    }

    async fn insert_node(
        &self,
        node: NewWorkflowVersionNode,
    ) -> Result<WorkflowVersionNode, StoreError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO workflow_version_node
                (workflow_version_id, name, type, status, parameters, visibility_settings,
                 created_on, updated_on)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING workflow_version_node_id
            "#,
        )
        .bind(node.workflow_version_id.get())
        .bind(&node.name)
        .bind(node.node_type.as_i32())
        .bind(node.status.as_i32())
        .bind(&node.parameters)
        .bind(&node.visibility_settings)
        .bind(node.created_on)
        .bind(node.updated_on)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error("insert_workflow_version_node"))?;
        Ok(node.with_id(WorkflowVersionNodeId::new(id)))
    }

    async fn update_node(&self, node: &WorkflowVersionNode) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_version_node
            SET name = $2, type = $3, status = $4, parameters = $5, visibility_settings = $6,
                updated_on = $7
            WHERE workflow_version_node_id = $1
            "#,
        )
        .bind(node.id.get())
        .bind(&node.name)
        .bind(node.node_type.as_i32())
        .bind(node.status.as_i32())
        .bind(&node.parameters)
        .bind(&node.visibility_settings)
        .bind(node.updated_on)
        .execute(&self.pool)
        .await
        .map_err(store_error("update_workflow_version_node"))?;
        if result.rows_affected() == 0 {
            return Err(missing_row("update_workflow_version_node", node.id));
        }
        Ok(())
    }

    async fn delete_node(&self, id: WorkflowVersionNodeId) -> Result<u64, StoreError> {
        let result =
            sqlx::query("DELETE FROM workflow_version_node WHERE workflow_version_node_id = $1")
                .bind(id.get())
                .execute(&self.pool)
                .await
                .map_err(store_error("delete_workflow_version_node"))?;
        Ok(result.rows_affected())
    }

    async fn root_nodes(
        &self,
        version_id: WorkflowVersionId,
    ) -> Result<Vec<WorkflowVersionNode>, StoreError> {
        let rows: Vec<NodeRow> = sqlx::query_as(
            r#"
            SELECT n.workflow_version_node_id, n.workflow_version_id, n.name, n.type AS node_type,
                   n.status, n.parameters, n.visibility_settings, n.created_on, n.updated_on
            FROM workflow_version_node n
            WHERE n.workflow_version_id = $1
              AND NOT EXISTS (
                  SELECT 1 FROM workflow_version_node_link l
                  WHERE l.child_workflow_version_node_id = n.workflow_version_node_id
              )
            ORDER BY n.workflow_version_node_id
            "#,
        )
        .bind(version_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error("root_workflow_version_nodes"))?;
        rows.into_iter()
            .map(NodeRow::try_into_node)
            .collect::<Result<_, _>>()
            .map_err(store_error("root_workflow_version_nodes"))
    }

    async fn get_link(
        &self,
        id: WorkflowVersionNodeLinkId,
    ) -> Result<Option<WorkflowVersionNodeLink>, StoreError> {
        let row: Option<LinkRow> = sqlx::query_as(
            r#"
            SELECT workflow_version_node_link_id, workflow_version_id, name,
                   parent_workflow_version_node_id, parent_output_index,
                   child_workflow_version_node_id, child_input_index,
                   visibility_settings, created_on, updated_on
            FROM workflow_version_node_link
            WHERE workflow_version_node_link_id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error("get_workflow_version_node_link"))?;
        Ok(row.map(LinkRow::into_link))
    }

    async fn insert_link(
        &self,
        link: NewWorkflowVersionNodeLink,
    ) -> Result<WorkflowVersionNodeLink, StoreError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO workflow_version_node_link
                (workflow_version_id, name, parent_workflow_version_node_id, parent_output_index,
                 child_workflow_version_node_id, child_input_index, visibility_settings,
                 created_on, updated_on)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING workflow_version_node_link_id
            "#,
        )
        .bind(link.workflow_version_id.get())
        .bind(&link.name)
        .bind(link.parent_node_id.get())
        .bind(link.parent_output_index)
        .bind(link.child_node_id.get())
        .bind(link.child_input_index)
        .bind(&link.visibility_settings)
        .bind(link.created_on)
        .bind(link.updated_on)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error("insert_workflow_version_node_link"))?;
        Ok(link.with_id(WorkflowVersionNodeLinkId::new(id)))
    }

    async fn update_link(&self, link: &WorkflowVersionNodeLink) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_version_node_link
            SET name = $2, parent_workflow_version_node_id = $3, parent_output_index = $4,
                child_workflow_version_node_id = $5, child_input_index = $6,
                visibility_settings = $7, updated_on = $8
            WHERE workflow_version_node_link_id = $1
            "#,
        )
        .bind(link.id.get())
        .bind(&link.name)
        .bind(link.parent_node_id.get())
        .bind(link.parent_output_index)
        .bind(link.child_node_id.get())
        .bind(link.child_input_index)
        .bind(&link.visibility_settings)
        .bind(link.updated_on)
        .execute(&self.pool)
        .await
        .map_err(store_error("update_workflow_version_node_link"))?;
        if result.rows_affected() == 0 {
            return Err(missing_row("update_workflow_version_node_link", link.id));
        }
        Ok(())
    }

    async fn delete_link(&self, id: WorkflowVersionNodeLinkId) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM workflow_version_node_link WHERE workflow_version_node_link_id = $1",
        )
        .bind(id.get())
        .execute(&self.pool)
        .await
        .map_err(store_error("delete_workflow_version_node_link"))?;
        Ok(result.rows_affected())
    }

    async fn parent_links(
        &self,
        node_id: WorkflowVersionNodeId,
    ) -> Result<Vec<(WorkflowVersionNodeLink, WorkflowVersionNode)>, StoreError> {
        self.fetch_linked(
            "parent_workflow_version_node_links",
            r#"
            SELECT l.workflow_version_node_link_id, l.workflow_version_id, l.name,
                   l.parent_workflow_version_node_id, l.parent_output_index,
                   l.child_workflow_version_node_id, l.child_input_index,
                   l.visibility_settings, l.created_on, l.updated_on,
                   n.workflow_version_node_id AS linked_node_id,
                   n.workflow_version_id AS linked_version_id,
                   n.name AS linked_name,
                   n.type AS linked_type,
                   n.status AS linked_status,
                   n.parameters AS linked_parameters,
                   n.visibility_settings AS linked_visibility_settings,
                   n.created_on AS linked_created_on,
                   n.updated_on AS linked_updated_on
            FROM workflow_version_node_link l
            JOIN workflow_version_node n
              ON n.workflow_version_node_id = l.parent_workflow_version_node_id
            WHERE l.child_workflow_version_node_id = $1
            ORDER BY l.child_input_index, l.workflow_version_node_link_id
            "#,
            node_id,
        )
        .await
    }

    async fn child_links(
        &self,
        node_id: WorkflowVersionNodeId,
    ) -> Result<Vec<(WorkflowVersionNodeLink, WorkflowVersionNode)>, StoreError> {
        self.fetch_linked(
            "child_workflow_version_node_links",
            r#"
            SELECT l.workflow_version_node_link_id, l.workflow_version_id, l.name,
                   l.parent_workflow_version_node_id, l.parent_output_index,
                   l.child_workflow_version_node_id, l.child_input_index,
                   l.visibility_settings, l.created_on, l.updated_on,
                   n.workflow_version_node_id AS linked_node_id,
                   n.workflow_version_id AS linked_version_id,
                   n.name AS linked_name,
                   n.type AS linked_type,
                   n.status AS linked_status,
                   n.parameters AS linked_parameters,
                   n.visibility_settings AS linked_visibility_settings,
                   n.created_on AS linked_created_on,
                   n.updated_on AS linked_updated_on
            FROM workflow_version_node_link l
            JOIN workflow_version_node n
              ON n.workflow_version_node_id = l.child_workflow_version_node_id
            WHERE l.parent_workflow_version_node_id = $1
            ORDER BY l.parent_output_index, l.workflow_version_node_link_id
            "#,
            node_id,
        )
        .await
    }

    async fn insert_log(&self, log: &WorkflowVersionNodeLog) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO workflow_version_node_log
                (node_id, trigger_reference, input_data, output_data, debug_data, error_data,
                 workflow_version_node_id, triggered_workflow_version_node_id, created_on)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(log.node_id)
        .bind(&log.trigger_reference)
        .bind(&log.input_data)
        .bind(&log.output_data)
        .bind(&log.debug_data)
        .bind(&log.error_data)
        .bind(log.workflow_version_node_id.get())
        .bind(log.triggered_workflow_version_node_id.map(|id| id.get()))
        .bind(log.created_on)
        .execute(&self.pool)
        .await
        .map_err(store_error("insert_workflow_version_node_log"))?;
        Ok(())
    }

    async fn logs_for_node(
        &self,
        node_id: WorkflowVersionNodeId,
        limit: i64,
    ) -> Result<Vec<WorkflowVersionNodeLog>, StoreError> {
        let rows: Vec<LogRow> = sqlx::query_as(
            r#"
            SELECT node_id, trigger_reference, input_data, output_data, debug_data, error_data,
                   workflow_version_node_id, triggered_workflow_version_node_id, created_on
            FROM workflow_version_node_log
            WHERE workflow_version_node_id = $1
            ORDER BY created_on DESC
            LIMIT $2
            "#,
        )
        .bind(node_id.get())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error("workflow_version_node_logs"))?;
        Ok(rows.into_iter().map(LogRow::into_log).collect())
    }

    async fn logs_for_workflow(
        &self,
        workflow_id: WorkflowId,
        limit: i64,
    ) -> Result<Vec<WorkflowVersionNodeLog>, StoreError> {
        let rows: Vec<LogRow> = sqlx::query_as(
            r#"
            SELECT g.node_id, g.trigger_reference, g.input_data, g.output_data, g.debug_data,
                   g.error_data, g.workflow_version_node_id, g.triggered_workflow_version_node_id,
                   g.created_on
            FROM workflow_version_node_log g
            JOIN workflow_version_node n
              ON n.workflow_version_node_id = g.workflow_version_node_id
            JOIN workflow_version v ON v.workflow_version_id = n.workflow_version_id
            WHERE v.workflow_id = $1
            ORDER BY g.created_on DESC
            LIMIT $2
            "#,
        )
        .bind(workflow_id.get())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error("workflow_logs"))?;
        Ok(rows.into_iter().map(LogRow::into_log).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_discriminants_fail_to_decode() {
        let row = NodeRow {
            workflow_version_node_id: 1,
            workflow_version_id: 1,
            name: "n".to_string(),
            node_type: 99,
            status: Status::Active.as_i32(),
            parameters: String::new(),
            visibility_settings: String::new(),
            created_on: Utc::now(),
            updated_on: Utc::now(),
        };
        let err = row.try_into_node().unwrap_err();
        assert!(err.to_string().contains("workflow_version_node.type"));

        let row = WorkflowRow {
            workflow_id: 1,
            name: "w".to_string(),
            workflow_type: 0,
            status: 9,
            created_on: Utc::now(),
            updated_on: Utc::now(),
        };
        assert!(row.try_into_workflow().is_err());
    }

    #[test]
    fn linked_row_splits_into_link_and_node() {
        let now = Utc::now();
        let row = LinkedNodeRow {
            link: LinkRow {
                workflow_version_node_link_id: 5,
                workflow_version_id: 2,
                name: "l".to_string(),
                parent_workflow_version_node_id: 3,
                parent_output_index: 1,
                child_workflow_version_node_id: 4,
                child_input_index: 0,
                visibility_settings: String::new(),
                created_on: now,
                updated_on: now,
            },
            linked_node_id: 3,
            linked_version_id: 2,
            linked_name: "trigger".to_string(),
            linked_type: WorkflowNodeType::TimeTrigger.as_i32(),
            linked_status: Status::Active.as_i32(),
            linked_parameters: String::new(),
            linked_visibility_settings: String::new(),
            linked_created_on: now,
            linked_updated_on: now,
        };

        let (link, node) = row.try_into_pair().expect("decode");
        assert_eq!(link.id, WorkflowVersionNodeLinkId::new(5));
        assert_eq!(link.parent_node_id, node.id);
        assert_eq!(node.node_type, WorkflowNodeType::TimeTrigger);
    }

    #[test]
    fn store_error_classifies_failures() {
        let err = store_error("get_workflow")(sqlx::Error::RowNotFound);
        assert!(!err.is_constraint_violation());
        assert!(err.to_string().starts_with("get_workflow: storage failure"));
    }
}
