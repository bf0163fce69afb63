//! Error types for the workflow crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `StoreError`: Persistence failures reported by a `WorkflowStore`
//! - `WorkflowError`: Graph, version and editing operations (wraps `StoreError`)
//!
//! Absence is never an error here. Reads return `Option` and callers decide
//! what a missing row means.

use boltflow_core::{WorkflowVersionId, WorkflowVersionNodeId};
use std::fmt;

/// Errors reported by a workflow store implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    ConstraintViolation {
        operation: &'static str,
        details: String,
    },
    /// Any other persistence failure.
    StorageFailure {
        operation: &'static str,
        details: String,
    },
}

impl StoreError {
    /// Returns true when the store rejected a write on a uniqueness constraint.
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConstraintViolation { operation, details } => {
                write!(f, "{operation}: constraint violation: {details}")
            }
            Self::StorageFailure { operation, details } => {
                write!(f, "{operation}: storage failure: {details}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// High-level workflow errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// The underlying store failed.
    Store(StoreError),
    /// The requested operation exists but has no implementation yet.
    NotImplemented { operation: &'static str },
    /// A graph operation was handed a node id that resolves to nothing.
    RecursionInput { node_id: WorkflowVersionNodeId },
    /// The graph reachable from a root revisits a node that is still being expanded.
    CycleDetected { node_id: WorkflowVersionNodeId },
    /// A link endpoint belongs to a different workflow version than the link.
    LinkVersionMismatch {
        link_version_id: WorkflowVersionId,
        node_id: WorkflowVersionNodeId,
        node_version_id: Option<WorkflowVersionId>,
    },
    /// The node's parameter payload is not valid JSON of the expected shape.
    InvalidParameters {
        node_id: Option<WorkflowVersionNodeId>,
        reason: String,
    },
}

impl WorkflowError {
    /// Returns true when the failure came from a uniqueness constraint.
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_constraint_violation())
    }
}

impl From<StoreError> for WorkflowError {
    fn from(error: StoreError) -> Self {
        Self::Store(error)
    }
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "{e}"),
            Self::NotImplemented { operation } => {
                write!(f, "{operation} is not implemented")
            }
            Self::RecursionInput { node_id } => {
                write!(f, "node {node_id} does not exist")
            }
            Self::CycleDetected { node_id } => {
                write!(f, "cycle detected at node {node_id}")
            }
            Self::LinkVersionMismatch {
                link_version_id,
                node_id,
                node_version_id,
            } => match node_version_id {
                Some(v) => write!(
                    f,
                    "link in version {link_version_id} references node {node_id} from version {v}"
                ),
                None => write!(
                    f,
                    "link in version {link_version_id} references missing node {node_id}"
                ),
            },
            Self::InvalidParameters {
                node_id: Some(node_id),
                reason,
            } => write!(f, "invalid parameters on node {node_id}: {reason}"),
            Self::InvalidParameters {
                node_id: None,
                reason,
            } => write!(f, "invalid parameters on new node: {reason}"),
        }
    }
}

impl std::error::Error for WorkflowError {}
