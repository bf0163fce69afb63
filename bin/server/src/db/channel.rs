//! PostgreSQL store for channels, channel events and wallet transactions.

use super::{invalid_column, is_unique_violation};
use async_trait::async_trait;
use boltflow_channel::{
    Channel, ChannelEvent, ChannelEventType, ChannelStatus, ChannelStore, ChannelStoreError,
    ChannelTransaction, Confirmation, NewChannel, ShortChannelId, StatusChange, Transaction,
    TransactionStore,
};
use boltflow_core::ChannelId;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::collections::HashSet;

fn store_error(operation: &'static str) -> impl FnOnce(sqlx::Error) -> ChannelStoreError {
    move |e| {
        if is_unique_violation(&e) {
            ChannelStoreError::ConstraintViolation {
                operation,
                details: e.to_string(),
            }
        } else {
            ChannelStoreError::StorageFailure {
                operation,
                details: e.to_string(),
            }
        }
    }
}

fn missing_row(operation: &'static str, id: ChannelId) -> ChannelStoreError {
    ChannelStoreError::StorageFailure {
        operation,
        details: format!("no row with id {id}"),
    }
}

/// Row type for channel queries.
#[derive(FromRow)]
struct ChannelRow {
    channel_id: i64,
    short_channel_id: Option<String>,
    channel_point: String,
    status: i32,
    remote_pub_key: String,
    capacity: i64,
    private: bool,
    funding_transaction_hash: String,
    funding_output_index: i64,
    funding_block_height: Option<i64>,
    funding_transaction_on: Option<DateTime<Utc>>,
    funded_on: Option<DateTime<Utc>>,
    closing_transaction_hash: Option<String>,
    closing_block_height: Option<i64>,
    closing_transaction_on: Option<DateTime<Utc>>,
    closed_on: Option<DateTime<Utc>>,
    created_on: DateTime<Utc>,
    updated_on: DateTime<Utc>,
}

impl ChannelRow {
    fn try_into_channel(self) -> Result<Channel, sqlx::Error> {
        let short_channel_id = self
            .short_channel_id
            .map(|raw| {
                raw.parse::<ShortChannelId>()
                    .map_err(|_| invalid_column("channel.short_channel_id", raw))
            })
            .transpose()?;
        let status = ChannelStatus::from_i32(self.status)
            .ok_or_else(|| invalid_column("channel.status", self.status))?;
        let funding_output_index = u32::try_from(self.funding_output_index)
            .map_err(|_| invalid_column("channel.funding_output_index", self.funding_output_index))?;
        Ok(Channel {
            id: ChannelId::new(self.channel_id),
            short_channel_id,
            channel_point: self.channel_point,
            status,
            remote_pub_key: self.remote_pub_key,
            capacity: self.capacity,
            private: self.private,
            funding_transaction_hash: self.funding_transaction_hash,
            funding_output_index,
            funding_block_height: self.funding_block_height,
            funding_transaction_on: self.funding_transaction_on,
            funded_on: self.funded_on,
            closing_transaction_hash: self.closing_transaction_hash,
            closing_block_height: self.closing_block_height,
            closing_transaction_on: self.closing_transaction_on,
            closed_on: self.closed_on,
            created_on: self.created_on,
            updated_on: self.updated_on,
        })
    }
}

/// Row type for channel event queries.
#[derive(FromRow)]
struct ChannelEventRow {
    time: DateTime<Utc>,
    event_type: i32,
    imported: bool,
    chan_id: Option<i64>,
    chan_point: String,
    pub_key: Option<String>,
    event_payload: serde_json::Value,
}

impl ChannelEventRow {
    fn try_into_event(self) -> Result<ChannelEvent, sqlx::Error> {
        let event_type = ChannelEventType::from_i32(self.event_type)
            .ok_or_else(|| invalid_column("channel_event.event_type", self.event_type))?;
        let chan_id = self.chan_id.map(chan_id_from_column);
        Ok(ChannelEvent {
            time: self.time,
            event_type,
            imported: self.imported,
            chan_id,
            chan_point: self.chan_point,
            pub_key: self.pub_key,
            payload: self.event_payload,
        })
    }
}

/// Row type for transaction queries.
#[derive(FromRow)]
struct TransactionRow {
    timestamp: DateTime<Utc>,
    tx_hash: String,
    amount: i64,
    num_confirmations: i32,
    block_hash: String,
    block_height: i32,
    total_fees: i64,
    dest_addresses: Vec<String>,
    raw_tx_hex: String,
    label: String,
}

impl TransactionRow {
    fn into_transaction(self) -> Transaction {
        Transaction {
            tx_hash: self.tx_hash,
            amount: self.amount,
            num_confirmations: self.num_confirmations,
            block_hash: self.block_hash,
            block_height: self.block_height,
            time_stamp: self.timestamp.timestamp(),
            total_fees: self.total_fees,
            dest_addresses: self.dest_addresses,
            raw_tx_hex: self.raw_tx_hex,
            label: self.label,
        }
    }
}

/// Packed short channel ids are stored by bit pattern in a signed 64-bit
/// column, so every id the codec accepts round-trips.
fn chan_id_column(chan_id: u64) -> i64 {
    chan_id as i64
}

fn chan_id_from_column(column: i64) -> u64 {
    column as u64
}

/// [`ChannelStore`] and [`TransactionStore`] over a Postgres pool.
#[derive(Clone)]
pub struct PgChannelStore {
    pool: PgPool,
}

impl PgChannelStore {
    /// Creates a new store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelStore for PgChannelStore {
    async fn get_channel(&self, id: ChannelId) -> Result<Option<Channel>, ChannelStoreError> {
        let row: Option<ChannelRow> = sqlx::query_as("SELECT * FROM channel WHERE channel_id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error("get_channel"))?;
        row.map(ChannelRow::try_into_channel)
            .transpose()
            .map_err(store_error("get_channel"))
    }

    async fn find_channel_by_point(
        &self,
        channel_point: &str,
    ) -> Result<Option<Channel>, ChannelStoreError> {
        let row: Option<ChannelRow> =
            sqlx::query_as("SELECT * FROM channel WHERE channel_point = $1")
                .bind(channel_point)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error("find_channel_by_point"))?;
        row.map(ChannelRow::try_into_channel)
            .transpose()
            .map_err(store_error("find_channel_by_point"))
    }

    async fn list_channels(&self) -> Result<Vec<Channel>, ChannelStoreError> {
        let rows: Vec<ChannelRow> = sqlx::query_as("SELECT * FROM channel ORDER BY channel_id")
            .fetch_all(&self.pool)
            .await
            .map_err(store_error("list_channels"))?;
        rows.into_iter()
            .map(ChannelRow::try_into_channel)
            .collect::<Result<_, _>>()
            .map_err(store_error("list_channels"))
    }

    async fn ensure_channel(&self, channel: NewChannel) -> Result<Channel, ChannelStoreError> {
        let channel_point = channel.channel_point.clone();
        let draft = channel.into_channel(ChannelId::new(0));
        let inserted: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO channel
                (short_channel_id, channel_point, status, remote_pub_key, capacity, private,
                 funding_transaction_hash, funding_output_index, closing_transaction_hash,
                 closing_block_height, created_on, updated_on)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (channel_point) DO NOTHING
            RETURNING channel_id
            "#,
        )
        .bind(draft.short_channel_id.map(|id| id.to_string()))
        .bind(&draft.channel_point)
        .bind(draft.status.as_i32())
        .bind(&draft.remote_pub_key)
        .bind(draft.capacity)
        .bind(draft.private)
        .bind(&draft.funding_transaction_hash)
        .bind(i64::from(draft.funding_output_index))
        .bind(&draft.closing_transaction_hash)
        .bind(draft.closing_block_height)
        .bind(draft.created_on)
        .bind(draft.updated_on)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error("ensure_channel"))?;

        match inserted {
            Some((id,)) => Ok(Channel {
                id: ChannelId::new(id),
                ..draft
            }),
            None => self
                .find_channel_by_point(&channel_point)
                .await?
                .ok_or_else(|| ChannelStoreError::StorageFailure {
                    operation: "ensure_channel",
                    details: format!("channel {channel_point} vanished after conflict"),
                }),
        }
    }

    async fn record_confirmation(
        &self,
        id: ChannelId,
        transaction: ChannelTransaction,
        confirmation: &Confirmation,
    ) -> Result<(), ChannelStoreError> {
        let query = match transaction {
            ChannelTransaction::Funding => {
                r#"
                UPDATE channel
                SET funding_block_height = $2, funding_transaction_on = $3, funded_on = $4,
                    updated_on = $5
                WHERE channel_id = $1
                "#
            }
            ChannelTransaction::Closing => {
                r#"
                UPDATE channel
                SET closing_block_height = $2, closing_transaction_on = $3, closed_on = $4,
                    updated_on = $5
                WHERE channel_id = $1
                "#
            }
        };
        let result = sqlx::query(query)
            .bind(id.get())
            .bind(confirmation.block_height)
            .bind(confirmation.transaction_on)
            .bind(confirmation.confirmed_on)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(store_error("record_confirmation"))?;
        if result.rows_affected() == 0 {
            return Err(missing_row("record_confirmation", id));
        }
        Ok(())
    }

    async fn set_short_channel_id(
        &self,
        id: ChannelId,
        short_channel_id: ShortChannelId,
    ) -> Result<(), ChannelStoreError> {
        let result = sqlx::query(
            "UPDATE channel SET short_channel_id = $2, updated_on = $3 WHERE channel_id = $1",
        )
        .bind(id.get())
        .bind(short_channel_id.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(store_error("set_short_channel_id"))?;
        if result.rows_affected() == 0 {
            return Err(missing_row("set_short_channel_id", id));
        }
        Ok(())
    }

    async fn change_status(
        &self,
        channel_point: &str,
        change: &StatusChange,
    ) -> Result<bool, ChannelStoreError> {
        // Every SET expression sees the row as it was before the update.
        let result = sqlx::query(
            r#"
            UPDATE channel
            SET status = $3,
                closing_block_height = CASE
                    WHEN closing_transaction_hash IS NULL THEN $5
                    ELSE closing_block_height
                END,
                closing_transaction_hash = COALESCE(closing_transaction_hash, $4),
                updated_on = $6
            WHERE channel_point = $1 AND status = $2
            "#,
        )
        .bind(channel_point)
        .bind(change.from.as_i32())
        .bind(change.to.as_i32())
        .bind(&change.closing_transaction_hash)
        .bind(change.closing_block_height)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(store_error("change_status"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_channel_event(&self, event: &ChannelEvent) -> Result<(), ChannelStoreError> {
        sqlx::query(
            r#"
            INSERT INTO channel_event
                (time, event_type, imported, chan_id, chan_point, pub_key, event_payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.time)
        .bind(event.event_type.as_i32())
        .bind(event.imported)
        .bind(event.chan_id.map(chan_id_column))
        .bind(&event.chan_point)
        .bind(&event.pub_key)
        .bind(&event.payload)
        .execute(&self.pool)
        .await
        .map_err(store_error("insert_channel_event"))?;
        Ok(())
    }

    async fn existing_channel_points(
        &self,
        event_type: ChannelEventType,
        channel_points: &[String],
    ) -> Result<HashSet<String>, ChannelStoreError> {
        if channel_points.is_empty() {
            return Ok(HashSet::new());
        }
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT chan_point
            FROM channel_event
            WHERE event_type = $1 AND chan_point = ANY($2)
            "#,
        )
        .bind(event_type.as_i32())
        .bind(channel_points)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error("existing_channel_points"))?;
        Ok(rows.into_iter().map(|(point,)| point).collect())
    }

    async fn channel_events(
        &self,
        channel_point: &str,
    ) -> Result<Vec<ChannelEvent>, ChannelStoreError> {
        let rows: Vec<ChannelEventRow> = sqlx::query_as(
            r#"
            SELECT time, event_type, imported, chan_id, chan_point, pub_key, event_payload
            FROM channel_event
            WHERE chan_point = $1
            ORDER BY time, channel_event_id
            "#,
        )
        .bind(channel_point)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error("channel_events"))?;
        rows.into_iter()
            .map(ChannelEventRow::try_into_event)
            .collect::<Result<_, _>>()
            .map_err(store_error("channel_events"))
    }
}

#[async_trait]
impl TransactionStore for PgChannelStore {
    async fn insert_transaction(&self, tx: &Transaction) -> Result<bool, ChannelStoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO tx
                (timestamp, tx_hash, amount, num_confirmations, block_hash, block_height,
                 total_fees, dest_addresses, raw_tx_hex, label)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (timestamp, tx_hash) DO NOTHING
            "#,
        )
        .bind(tx.timestamp())
        .bind(&tx.tx_hash)
        .bind(tx.amount)
        .bind(tx.num_confirmations)
        .bind(&tx.block_hash)
        .bind(tx.block_height)
        .bind(tx.total_fees)
        .bind(&tx.dest_addresses)
        .bind(&tx.raw_tx_hex)
        .bind(&tx.label)
        .execute(&self.pool)
        .await
        .map_err(store_error("insert_transaction"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_transactions(&self) -> Result<Vec<Transaction>, ChannelStoreError> {
        let rows: Vec<TransactionRow> = sqlx::query_as(
            r#"
            SELECT timestamp, tx_hash, amount, num_confirmations, block_hash, block_height,
                   total_fees, dest_addresses, raw_tx_hex, label
            FROM tx
            ORDER BY timestamp, tx_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error("list_transactions"))?;
        Ok(rows.into_iter().map(TransactionRow::into_transaction).collect())
    }
}
