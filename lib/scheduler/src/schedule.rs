//! Interval schedules of time-trigger nodes.

use crate::error::ScheduleError;
use boltflow_core::WorkflowVersionNodeId;
use boltflow_workflow::{WorkflowParameterType, WorkflowVersionNode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use ulid::Ulid;

/// Correlates every log entry produced by one trigger firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerReference(Ulid);

impl TriggerReference {
    /// Creates a new reference.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for TriggerReference {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TriggerReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trig_{}", self.0)
    }
}

/// How often a time trigger fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeTriggerSchedule {
    pub node_id: WorkflowVersionNodeId,
    pub interval: Duration,
}

impl TimeTriggerSchedule {
    /// Reads the `timeInSeconds` parameter of a trigger node.
    ///
    /// # Errors
    ///
    /// - `Parameters` if the payload does not decode.
    /// - `MissingInterval` if there is no integer `timeInSeconds` value.
    /// - `InvalidInterval` if the value is not positive.
    pub fn from_node(node: &WorkflowVersionNode) -> Result<Self, ScheduleError> {
        let parameters = node.decode_parameters().map_err(ScheduleError::Parameters)?;
        let seconds = parameters
            .get(WorkflowParameterType::TimeInSeconds)
            .value_i64()
            .ok_or(ScheduleError::MissingInterval { node_id: node.id })?;
        let interval = u64::try_from(seconds)
            .ok()
            .filter(|s| *s > 0)
            .ok_or(ScheduleError::InvalidInterval {
                node_id: node.id,
                seconds,
            })?;
        Ok(Self {
            node_id: node.id,
            interval: Duration::from_secs(interval),
        })
    }
}

/// When each trigger last fired.
#[derive(Debug, Default)]
pub struct FiringHistory {
    last_fired: HashMap<WorkflowVersionNodeId, Instant>,
}

impl FiringHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A trigger is due when it never fired or its interval has elapsed.
    #[must_use]
    pub fn is_due(&self, schedule: &TimeTriggerSchedule, now: Instant) -> bool {
        self.last_fired
            .get(&schedule.node_id)
            .is_none_or(|last| now.duration_since(*last) >= schedule.interval)
    }

    pub fn record(&mut self, node_id: WorkflowVersionNodeId, at: Instant) {
        self.last_fired.insert(node_id, at);
    }

    /// Forgets triggers that are no longer active.
    pub fn retain(&mut self, active: &[WorkflowVersionNodeId]) {
        self.last_fired.retain(|id, _| active.contains(id));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.last_fired.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_fired.is_empty()
    }
}
