//! Workflow node records and their parameter payloads.
//!
//! A node is one step of a workflow version. Its behaviour is selected by
//! [`WorkflowNodeType`] and tuned by a JSON parameter payload of the form
//! `{"parameters": [{"type": "...", ...}, ...]}`.

use crate::error::WorkflowError;
use boltflow_core::{Status, WorkflowVersionId, WorkflowVersionNodeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// The kind of step a node performs.
///
/// Persisted as an integer; the discriminants are part of the relational
/// schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowNodeType {
    /// Fires on a fixed interval.
    TimeTrigger,
    /// Fires when a channel's balance moves past a threshold.
    ChannelBalanceEventTrigger,
    /// Fires when a channel opens.
    ChannelOpenEventTrigger,
    /// Fires when a channel closes.
    ChannelCloseEventTrigger,
    /// Narrows the set of channels passed downstream.
    ChannelFilter,
    /// Computes a new channel policy.
    ChannelPolicyConfigurator,
    /// Computes and applies a channel policy in one step.
    ChannelPolicyAutoRun,
    /// Moves liquidity between channels.
    Rebalance,
}

impl WorkflowNodeType {
    /// Returns the persisted discriminant.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::TimeTrigger => 0,
            Self::ChannelBalanceEventTrigger => 1,
            Self::ChannelOpenEventTrigger => 2,
            Self::ChannelCloseEventTrigger => 3,
            Self::ChannelFilter => 4,
            Self::ChannelPolicyConfigurator => 5,
            Self::ChannelPolicyAutoRun => 6,
            Self::Rebalance => 7,
        }
    }

    /// Decodes a persisted discriminant.
    #[must_use]
    pub const fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::TimeTrigger),
            1 => Some(Self::ChannelBalanceEventTrigger),
            2 => Some(Self::ChannelOpenEventTrigger),
            3 => Some(Self::ChannelCloseEventTrigger),
            4 => Some(Self::ChannelFilter),
            5 => Some(Self::ChannelPolicyConfigurator),
            6 => Some(Self::ChannelPolicyAutoRun),
            7 => Some(Self::Rebalance),
            _ => None,
        }
    }

    /// Returns true for node types that start a pipeline.
    #[must_use]
    pub const fn is_trigger(self) -> bool {
        matches!(
            self,
            Self::TimeTrigger
                | Self::ChannelBalanceEventTrigger
                | Self::ChannelOpenEventTrigger
                | Self::ChannelCloseEventTrigger
        )
    }
}

impl fmt::Display for WorkflowNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TimeTrigger => "time_trigger",
            Self::ChannelBalanceEventTrigger => "channel_balance_event_trigger",
            Self::ChannelOpenEventTrigger => "channel_open_event_trigger",
            Self::ChannelCloseEventTrigger => "channel_close_event_trigger",
            Self::ChannelFilter => "channel_filter",
            Self::ChannelPolicyConfigurator => "channel_policy_configurator",
            Self::ChannelPolicyAutoRun => "channel_policy_auto_run",
            Self::Rebalance => "rebalance",
        };
        f.write_str(name)
    }
}

/// Known parameter record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowParameterType {
    /// Interval of a time trigger.
    TimeInSeconds,
    /// Channels a node applies to.
    ChannelIds,
    /// Balance threshold as a percentage of capacity.
    BalanceShiftPercent,
    /// Proportional routing fee in parts per million.
    FeeRatePpm,
    /// Base routing fee in millisatoshi.
    BaseFeeMsat,
    /// Smallest HTLC to forward.
    MinHtlcMsat,
    /// Largest HTLC to forward.
    MaxHtlcMsat,
    /// Amount to move in a rebalance.
    AmountMsat,
}

impl WorkflowParameterType {
    /// Returns the `type` tag used in the JSON payload.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TimeInSeconds => "timeInSeconds",
            Self::ChannelIds => "channelIds",
            Self::BalanceShiftPercent => "balanceShiftPercent",
            Self::FeeRatePpm => "feeRatePpm",
            Self::BaseFeeMsat => "baseFeeMsat",
            Self::MinHtlcMsat => "minHtlcMsat",
            Self::MaxHtlcMsat => "maxHtlcMsat",
            Self::AmountMsat => "amountMsat",
        }
    }
}

/// One typed parameter record.
///
/// The `type` tag is kept as text so that records written by newer editors
/// still decode; lookups simply never match them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNodeParameter {
    #[serde(rename = "type", default)]
    pub parameter_type: String,
    #[serde(flatten)]
    pub fields: Map<String, JsonValue>,
}

impl WorkflowNodeParameter {
    /// Creates a record with a single `value` field.
    #[must_use]
    pub fn with_value(parameter_type: WorkflowParameterType, value: JsonValue) -> Self {
        let mut fields = Map::new();
        fields.insert("value".to_string(), value);
        Self {
            parameter_type: parameter_type.as_str().to_string(),
            fields,
        }
    }

    /// Returns true for the zero-value record produced by a failed lookup.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameter_type.is_empty() && self.fields.is_empty()
    }

    /// Returns the `value` field.
    #[must_use]
    pub fn value(&self) -> Option<&JsonValue> {
        self.fields.get("value")
    }

    /// Returns the `value` field as an integer.
    #[must_use]
    pub fn value_i64(&self) -> Option<i64> {
        self.value().and_then(JsonValue::as_i64)
    }
}

/// The decoded parameter payload of a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNodeParameters {
    #[serde(default)]
    pub parameters: Vec<WorkflowNodeParameter>,
}

impl WorkflowNodeParameters {
    /// Returns the first record of the given type, or an empty record.
    #[must_use]
    pub fn get(&self, parameter_type: WorkflowParameterType) -> WorkflowNodeParameter {
        self.parameters
            .iter()
            .find(|p| p.parameter_type == parameter_type.as_str())
            .cloned()
            .unwrap_or_default()
    }
}

pub(crate) fn decode_parameters(raw: &str) -> Result<WorkflowNodeParameters, String> {
    if raw.trim().is_empty() {
        return Ok(WorkflowNodeParameters::default());
    }
    serde_json::from_str(raw).map_err(|e| e.to_string())
}

/// A stored workflow node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowVersionNode {
    pub id: WorkflowVersionNodeId,
    pub workflow_version_id: WorkflowVersionId,
    pub name: String,
    pub node_type: WorkflowNodeType,
    pub status: Status,
    /// Raw JSON parameter payload.
    pub parameters: String,
    /// Raw JSON editor layout hints; never interpreted by the engine.
    pub visibility_settings: String,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

impl WorkflowVersionNode {
    /// Decodes the parameter payload. An empty payload decodes to no parameters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameters` if the payload is not valid JSON of the
    /// expected shape.
    pub fn decode_parameters(&self) -> Result<WorkflowNodeParameters, WorkflowError> {
        decode_parameters(&self.parameters).map_err(|reason| WorkflowError::InvalidParameters {
            node_id: Some(self.id),
            reason,
        })
    }
}

/// A node that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWorkflowVersionNode {
    pub workflow_version_id: WorkflowVersionId,
    pub name: String,
    pub node_type: WorkflowNodeType,
    pub status: Status,
    pub parameters: String,
    pub visibility_settings: String,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

impl NewWorkflowVersionNode {
    /// Creates an active node with an empty name and no parameters.
    #[must_use]
    pub fn new(workflow_version_id: WorkflowVersionId, node_type: WorkflowNodeType) -> Self {
        let now = Utc::now();
        Self {
            workflow_version_id,
            name: String::new(),
            node_type,
            status: Status::Active,
            parameters: String::new(),
            visibility_settings: String::new(),
            created_on: now,
            updated_on: now,
        }
    }

    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Serializes and sets the parameter payload.
    #[must_use]
    pub fn with_parameters(mut self, parameters: &WorkflowNodeParameters) -> Self {
        self.parameters = serde_json::to_string(parameters).unwrap_or_default();
        self
    }

    /// Attaches the id assigned by the store.
    #[must_use]
    pub fn with_id(self, id: WorkflowVersionNodeId) -> WorkflowVersionNode {
        WorkflowVersionNode {
            id,
            workflow_version_id: self.workflow_version_id,
            name: self.name,
            node_type: self.node_type,
            status: self.status,
            parameters: self.parameters,
            visibility_settings: self.visibility_settings,
            created_on: self.created_on,
            updated_on: self.updated_on,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node_with_parameters(parameters: &str) -> WorkflowVersionNode {
        NewWorkflowVersionNode::new(WorkflowVersionId::new(1), WorkflowNodeType::TimeTrigger)
            .with_id(WorkflowVersionNodeId::new(9))
            .with_parameters_raw(parameters)
    }

    impl WorkflowVersionNode {
        fn with_parameters_raw(mut self, parameters: &str) -> Self {
            self.parameters = parameters.to_string();
            self
        }
    }

    #[test]
    fn node_type_discriminants_round_trip() {
        for raw in 0..8 {
            let node_type = WorkflowNodeType::from_i32(raw).expect("known type");
            assert_eq!(node_type.as_i32(), raw);
        }
        assert_eq!(WorkflowNodeType::from_i32(8), None);
    }

    #[test]
    fn trigger_types() {
        assert!(WorkflowNodeType::TimeTrigger.is_trigger());
        assert!(WorkflowNodeType::ChannelCloseEventTrigger.is_trigger());
        assert!(!WorkflowNodeType::Rebalance.is_trigger());
    }

    #[test]
    fn lookup_returns_first_match() {
        let node = node_with_parameters(
            r#"{"parameters":[
                {"type":"channelIds","value":[1,2]},
                {"type":"timeInSeconds","value":60},
                {"type":"timeInSeconds","value":120}
            ]}"#,
        );
        let parameters = node.decode_parameters().expect("valid payload");
        let interval = parameters.get(WorkflowParameterType::TimeInSeconds);
        assert_eq!(interval.value_i64(), Some(60));
        assert_eq!(
            parameters.get(WorkflowParameterType::ChannelIds).value(),
            Some(&json!([1, 2]))
        );
    }

    #[test]
    fn lookup_of_absent_type_yields_empty_record() {
        let node = node_with_parameters(r#"{"parameters":[{"type":"somethingNew","x":1}]}"#);
        let parameters = node.decode_parameters().expect("valid payload");
        assert_eq!(parameters.parameters.len(), 1);
        let missing = parameters.get(WorkflowParameterType::AmountMsat);
        assert!(missing.is_empty());
        assert_eq!(missing.value_i64(), None);
    }

    #[test]
    fn empty_payload_has_no_parameters() {
        let node = node_with_parameters("");
        assert_eq!(
            node.decode_parameters().expect("empty is fine"),
            WorkflowNodeParameters::default()
        );
    }

    #[test]
    fn malformed_payload_is_invalid_parameters() {
        let node = node_with_parameters("{not json");
        let err = node.decode_parameters().unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidParameters { node_id: Some(id), .. } if id == WorkflowVersionNodeId::new(9)
        ));
    }

    #[test]
    fn with_parameters_serializes_payload() {
        let parameters = WorkflowNodeParameters {
            parameters: vec![WorkflowNodeParameter::with_value(
                WorkflowParameterType::TimeInSeconds,
                json!(30),
            )],
        };
        let node = NewWorkflowVersionNode::new(WorkflowVersionId::new(2), WorkflowNodeType::TimeTrigger)
            .with_parameters(&parameters)
            .with_id(WorkflowVersionNodeId::new(1));
        assert_eq!(
            node.decode_parameters().expect("round trip"),
            parameters
        );
    }
}
