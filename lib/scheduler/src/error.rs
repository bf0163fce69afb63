//! Error types for the scheduler crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `ScheduleError`: A trigger node whose schedule cannot be evaluated
//! - `SchedulerError`: High-level wrapper for a scheduler tick

use boltflow_core::WorkflowVersionNodeId;
use boltflow_workflow::WorkflowError;
use std::fmt;

/// Errors reading a trigger node's schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The node has no `timeInSeconds` parameter.
    MissingInterval { node_id: WorkflowVersionNodeId },
    /// The interval is not a positive number of seconds.
    InvalidInterval {
        node_id: WorkflowVersionNodeId,
        seconds: i64,
    },
    /// The node's parameters do not decode.
    Parameters(WorkflowError),
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingInterval { node_id } => {
                write!(f, "time trigger {node_id} has no interval")
            }
            Self::InvalidInterval { node_id, seconds } => {
                write!(f, "time trigger {node_id} has invalid interval {seconds}s")
            }
            Self::Parameters(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ScheduleError {}

/// High-level scheduler errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Trigger discovery failed.
    Discovery(WorkflowError),
    /// Nobody is receiving dispatches any more.
    DispatchClosed,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovery(e) => write!(f, "trigger discovery failed: {e}"),
            Self::DispatchClosed => write!(f, "trigger dispatch receiver closed"),
        }
    }
}

impl std::error::Error for SchedulerError {}
