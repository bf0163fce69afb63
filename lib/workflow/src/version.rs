//! Workflow version management.
//!
//! Versions are numbered per workflow. Version `0` is the draft an editor
//! works on before releasing it under a real number.

use crate::definition::{NewWorkflowVersion, WorkflowVersion, name_or_default};
use crate::error::WorkflowError;
use crate::store::WorkflowStore;
use boltflow_core::{Status, WorkflowId, WorkflowVersionId};
use chrono::Utc;
use rootcause::prelude::Report;
use tracing::{debug, instrument};

/// Creates a version, or clones an existing one.
///
/// With `version == 0` the highest-numbered version of the workflow is the
/// clone source; otherwise the version with that exact number is. When there
/// is no source a fresh inactive version numbered `version` is created,
/// named `name` or a timestamp when `name` is empty.
///
/// # Errors
///
/// - `NotImplemented` when a source version exists; copying its nodes and
///   links into a new version is not supported yet.
/// - `Store` with a constraint violation if a concurrent writer created the
///   same version number first.
#[instrument(skip(store, name))]
pub async fn clone_or_create_version<S: WorkflowStore + ?Sized>(
    store: &S,
    workflow_id: WorkflowId,
    version: i32,
    name: String,
) -> Result<WorkflowVersion, Report<WorkflowError>> {
    let source = if version == 0 {
        store.latest_version(workflow_id).await
    } else {
        store.find_version(workflow_id, version).await
    }
    .map_err(WorkflowError::Store)?;

    if let Some(source) = source {
        debug!(source = %source.id, "clone source found");
        return Err(WorkflowError::NotImplemented {
            operation: "clone_workflow_version",
        }
        .into());
    }

    let now = Utc::now();
    let created = store
        .insert_version(NewWorkflowVersion {
            workflow_id,
            version,
            name: name_or_default(name, now),
            status: Status::Inactive,
            created_on: now,
            updated_on: now,
        })
        .await
        .map_err(WorkflowError::Store)?;
    debug!(version_id = %created.id, name = %created.name, "created workflow version");
    Ok(created)
}

/// Persists changes to a version, stamping `updated_on`.
///
/// # Errors
///
/// Returns a constraint violation when the new number is already taken in
/// the workflow, or any other store failure.
pub async fn update_version<S: WorkflowStore + ?Sized>(
    store: &S,
    mut version: WorkflowVersion,
) -> Result<WorkflowVersion, Report<WorkflowError>> {
    version.updated_on = Utc::now();
    store
        .update_version(&version)
        .await
        .map_err(WorkflowError::Store)?;
    Ok(version)
}

/// Deletes a version with all of its nodes and links.
///
/// # Errors
///
/// Returns the store failure.
pub async fn delete_version<S: WorkflowStore + ?Sized>(
    store: &S,
    id: WorkflowVersionId,
) -> Result<u64, Report<WorkflowError>> {
    Ok(store.delete_version(id).await.map_err(WorkflowError::Store)?)
}
