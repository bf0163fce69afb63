//! In-memory [`ChannelStore`] and [`TransactionStore`] used by tests and local tooling.

use crate::channel::{Channel, ChannelTransaction, Confirmation, NewChannel, StatusChange};
use crate::error::ChannelStoreError;
use crate::event::{ChannelEvent, ChannelEventType};
use crate::lnd::Transaction;
use crate::short_channel_id::ShortChannelId;
use crate::store::{ChannelStore, TransactionStore};
use async_trait::async_trait;
use boltflow_core::ChannelId;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

#[derive(Default)]
struct Tables {
    next_id: i64,
    channels: BTreeMap<ChannelId, Channel>,
    events: Vec<ChannelEvent>,
    transactions: BTreeMap<(DateTime<Utc>, String), Transaction>,
}

impl Tables {
    fn short_id_taken(&self, channel: &Channel) -> bool {
        channel.short_channel_id.is_some()
            && self.channels.values().any(|c| {
                c.id != channel.id && c.short_channel_id == channel.short_channel_id
            })
    }
}

/// A channel and transaction store backed by ordered maps behind a mutex.
#[derive(Clone, Default)]
pub struct InMemoryChannelStore {
    tables: Arc<Mutex<Tables>>,
    fail_events: Arc<AtomicBool>,
    fail_updates: Arc<AtomicBool>,
}

impl InMemoryChannelStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent event insert fail with a storage failure.
    pub fn fail_event_inserts(&self, fail: bool) {
        self.fail_events.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent channel update fail with a storage failure.
    pub fn fail_channel_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Returns every stored event in insertion order.
    pub async fn events(&self) -> Vec<ChannelEvent> {
        self.tables.lock().await.events.clone()
    }
}

fn missing_row(operation: &'static str, id: ChannelId) -> ChannelStoreError {
    ChannelStoreError::StorageFailure {
        operation,
        details: format!("no row with id {id}"),
    }
}

fn injected(operation: &'static str) -> ChannelStoreError {
    ChannelStoreError::StorageFailure {
        operation,
        details: "injected failure".to_string(),
    }
}

#[async_trait]
impl ChannelStore for InMemoryChannelStore {
    async fn get_channel(&self, id: ChannelId) -> Result<Option<Channel>, ChannelStoreError> {
        Ok(self.tables.lock().await.channels.get(&id).cloned())
    }

    async fn find_channel_by_point(
        &self,
        channel_point: &str,
    ) -> Result<Option<Channel>, ChannelStoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .channels
            .values()
            .find(|c| c.channel_point == channel_point)
            .cloned())
    }

    async fn list_channels(&self) -> Result<Vec<Channel>, ChannelStoreError> {
        Ok(self.tables.lock().await.channels.values().cloned().collect())
    }

    async fn ensure_channel(&self, channel: NewChannel) -> Result<Channel, ChannelStoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables
            .channels
            .values()
            .find(|c| c.channel_point == channel.channel_point)
        {
            return Ok(existing.clone());
        }
        tables.next_id += 1;
        let channel = channel.into_channel(ChannelId::new(tables.next_id));
        if tables.short_id_taken(&channel) {
            return Err(ChannelStoreError::ConstraintViolation {
                operation: "ensure_channel",
                details: format!("short_channel_id={:?}", channel.short_channel_id),
            });
        }
        tables.channels.insert(channel.id, channel.clone());
        Ok(channel)
    }

    async fn record_confirmation(
        &self,
        id: ChannelId,
        transaction: ChannelTransaction,
        confirmation: &Confirmation,
    ) -> Result<(), ChannelStoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(injected("record_confirmation"));
        }
        let mut tables = self.tables.lock().await;
        let channel = tables
            .channels
            .get_mut(&id)
            .ok_or_else(|| missing_row("record_confirmation", id))?;
        channel.apply_confirmation(transaction, confirmation);
        channel.updated_on = Utc::now();
        Ok(())
    }

    async fn set_short_channel_id(
        &self,
        id: ChannelId,
        short_channel_id: ShortChannelId,
    ) -> Result<(), ChannelStoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(injected("set_short_channel_id"));
        }
        let mut tables = self.tables.lock().await;
        let mut patched = tables
            .channels
            .get(&id)
            .cloned()
            .ok_or_else(|| missing_row("set_short_channel_id", id))?;
        patched.short_channel_id = Some(short_channel_id);
        if tables.short_id_taken(&patched) {
            return Err(ChannelStoreError::ConstraintViolation {
                operation: "set_short_channel_id",
                details: format!("short_channel_id={short_channel_id}"),
            });
        }
        patched.updated_on = Utc::now();
        tables.channels.insert(id, patched);
        Ok(())
    }

    async fn change_status(
        &self,
        channel_point: &str,
        change: &StatusChange,
    ) -> Result<bool, ChannelStoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(injected("change_status"));
        }
        let mut tables = self.tables.lock().await;
        let Some(channel) = tables
            .channels
            .values_mut()
            .find(|c| c.channel_point == channel_point)
        else {
            return Ok(false);
        };
        let changed = channel.apply_status_change(change);
        if changed {
            channel.updated_on = Utc::now();
        }
        Ok(changed)
    }

    async fn insert_channel_event(&self, event: &ChannelEvent) -> Result<(), ChannelStoreError> {
        if self.fail_events.load(Ordering::SeqCst) {
            return Err(injected("insert_channel_event"));
        }
        self.tables.lock().await.events.push(event.clone());
        Ok(())
    }

    async fn existing_channel_points(
        &self,
        event_type: ChannelEventType,
        channel_points: &[String],
    ) -> Result<HashSet<String>, ChannelStoreError> {
        let wanted: HashSet<&str> = channel_points.iter().map(String::as_str).collect();
        Ok(self
            .tables
            .lock()
            .await
            .events
            .iter()
            .filter(|e| e.event_type == event_type && wanted.contains(e.chan_point.as_str()))
            .map(|e| e.chan_point.clone())
            .collect())
    }

    async fn channel_events(
        &self,
        channel_point: &str,
    ) -> Result<Vec<ChannelEvent>, ChannelStoreError> {
        let mut events: Vec<_> = self
            .tables
            .lock()
            .await
            .events
            .iter()
            .filter(|e| e.chan_point == channel_point)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.time);
        Ok(events)
    }
}

#[async_trait]
impl TransactionStore for InMemoryChannelStore {
    async fn insert_transaction(&self, tx: &Transaction) -> Result<bool, ChannelStoreError> {
        let mut tables = self.tables.lock().await;
        let key = (tx.timestamp(), tx.tx_hash.clone());
        if tables.transactions.contains_key(&key) {
            return Ok(false);
        }
        tables.transactions.insert(key, tx.clone());
        Ok(true)
    }

    async fn list_transactions(&self) -> Result<Vec<Transaction>, ChannelStoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .transactions
            .values()
            .cloned()
            .collect())
    }
}
