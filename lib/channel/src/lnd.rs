//! Remote node capability surface.
//!
//! The daemon does not speak the node's RPC protocol itself; a connector
//! implements [`LightningClient`] and hands it to the ingestion loops.

use crate::channel::CloseType;
use crate::error::RpcError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// A stream of items from a subscription, each of which may fail.
pub type RpcStream<T> = BoxStream<'static, Result<T, RpcError>>;

/// An open channel as listed by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenChannel {
    /// Packed short channel id.
    pub chan_id: u64,
    pub channel_point: String,
    pub remote_pubkey: String,
    pub capacity: i64,
    pub private: bool,
    pub active: bool,
    pub initiator: bool,
}

/// A closed channel as listed by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelCloseSummary {
    /// Packed short channel id, zero when the channel never confirmed.
    pub chan_id: u64,
    pub channel_point: String,
    pub remote_pubkey: String,
    pub capacity: i64,
    pub closing_tx_hash: String,
    pub close_height: u32,
    pub settled_balance: i64,
    pub close_type: CloseType,
}

/// A funding outpoint in the node's binary form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPoint {
    /// Funding txid in internal byte order.
    pub funding_txid_bytes: Vec<u8>,
    pub output_index: u32,
}

/// A channel waiting for its funding transaction to confirm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUpdate {
    /// Funding txid in internal byte order.
    pub txid: Vec<u8>,
    pub output_index: u32,
}

/// One item of the channel event subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEventUpdate {
    Open(OpenChannel),
    Closed(ChannelCloseSummary),
    Active(ChannelPoint),
    Inactive(ChannelPoint),
    FullyResolved(ChannelPoint),
    PendingOpen(PendingUpdate),
}

/// An on-chain wallet transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub tx_hash: String,
    pub amount: i64,
    pub num_confirmations: i32,
    pub block_hash: String,
    pub block_height: i32,
    /// Seconds since the Unix epoch.
    pub time_stamp: i64,
    pub total_fees: i64,
    pub dest_addresses: Vec<String>,
    pub raw_tx_hex: String,
    pub label: String,
}

impl Transaction {
    /// Returns the transaction time, or the epoch if it is out of range.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.time_stamp, 0).unwrap_or(DateTime::UNIX_EPOCH)
    }
}

/// The calls the ingestion layer makes against a node.
#[async_trait]
pub trait LightningClient: Send + Sync {
    /// Opens the channel lifecycle event stream.
    async fn subscribe_channel_events(&self) -> Result<RpcStream<ChannelEventUpdate>, RpcError>;

    /// Lists currently open channels.
    async fn list_channels(&self) -> Result<Vec<OpenChannel>, RpcError>;

    /// Lists closed channels.
    async fn closed_channels(&self) -> Result<Vec<ChannelCloseSummary>, RpcError>;

    /// Lists wallet transactions.
    async fn get_transactions(&self) -> Result<Vec<Transaction>, RpcError>;

    /// Opens the wallet transaction stream.
    async fn subscribe_transactions(&self) -> Result<RpcStream<Transaction>, RpcError>;

    /// Signs `message` with the node key.
    async fn sign_message(&self, message: &str) -> Result<String, RpcError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_timestamp_is_utc_seconds() {
        let tx = fake::transaction("aa", 1_700_000_000);
        assert_eq!(tx.timestamp().timestamp(), 1_700_000_000);
    }

    #[test]
    fn event_update_serializes_with_variant_tag() {
        let update = ChannelEventUpdate::Active(ChannelPoint {
            funding_txid_bytes: vec![1, 2],
            output_index: 3,
        });
        let json = serde_json::to_value(&update).expect("serialize");
        assert_eq!(json["active"]["outputIndex"], 3);
    }
}
