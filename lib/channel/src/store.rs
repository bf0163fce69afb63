//! Channel and transaction storage abstractions.

use crate::channel::{Channel, ChannelTransaction, Confirmation, NewChannel, StatusChange};
use crate::error::ChannelStoreError;
use crate::event::{ChannelEvent, ChannelEventType};
use crate::lnd::Transaction;
use crate::short_channel_id::ShortChannelId;
use async_trait::async_trait;
use boltflow_core::ChannelId;
use std::collections::HashSet;

/// Persistence for channels and their lifecycle events.
///
/// A channel is identified by its channel point; the store keeps at most
/// one record per channel point.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn get_channel(&self, id: ChannelId) -> Result<Option<Channel>, ChannelStoreError>;

    async fn find_channel_by_point(
        &self,
        channel_point: &str,
    ) -> Result<Option<Channel>, ChannelStoreError>;

    /// Lists every channel, ordered by id.
    async fn list_channels(&self) -> Result<Vec<Channel>, ChannelStoreError>;

    /// Inserts `channel` unless one with the same channel point exists.
    ///
    /// Returns the stored record, which is the pre-existing one when there
    /// was one. An existing record is never modified.
    async fn ensure_channel(&self, channel: NewChannel) -> Result<Channel, ChannelStoreError>;

    /// Records where and when the funding or closing transaction confirmed.
    ///
    /// Only that transaction's confirmation columns change.
    async fn record_confirmation(
        &self,
        id: ChannelId,
        transaction: ChannelTransaction,
        confirmation: &Confirmation,
    ) -> Result<(), ChannelStoreError>;

    /// Sets the short channel id and nothing else.
    async fn set_short_channel_id(
        &self,
        id: ChannelId,
        short_channel_id: ShortChannelId,
    ) -> Result<(), ChannelStoreError>;

    /// Applies `change` to the channel at `channel_point` if its status is
    /// still `change.from`.
    ///
    /// Returns false when the status has moved on, or there is no such channel.
    async fn change_status(
        &self,
        channel_point: &str,
        change: &StatusChange,
    ) -> Result<bool, ChannelStoreError>;

    async fn insert_channel_event(&self, event: &ChannelEvent) -> Result<(), ChannelStoreError>;

    /// Returns which of `channel_points` already have an event of `event_type`.
    async fn existing_channel_points(
        &self,
        event_type: ChannelEventType,
        channel_points: &[String],
    ) -> Result<HashSet<String>, ChannelStoreError>;

    /// Lists the events of one channel point, oldest first.
    async fn channel_events(
        &self,
        channel_point: &str,
    ) -> Result<Vec<ChannelEvent>, ChannelStoreError>;
}

/// Persistence for on-chain wallet transactions.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Inserts a transaction. Returns false when one with the same
    /// timestamp and hash is already stored.
    async fn insert_transaction(&self, tx: &Transaction) -> Result<bool, ChannelStoreError>;

    /// Lists stored transactions, oldest first.
    async fn list_transactions(&self) -> Result<Vec<Transaction>, ChannelStoreError>;
}
