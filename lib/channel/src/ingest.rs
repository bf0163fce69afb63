//! Channel event ingestion.
//!
//! Live events arrive through [`subscribe_and_store_channel_events`], which
//! keeps a subscription open until cancelled. Historical channels are
//! backfilled with [`import_channel_list`]. Both paths make sure a channel
//! record exists and then append one event row.

use crate::channel::{ChannelStatus, NewChannel, StatusChange};
use crate::error::IngestError;
use crate::event::{ChannelEvent, ChannelEventType};
use crate::lnd::{ChannelEventUpdate, LightningClient};
use crate::rate_limit::RateLimiter;
use crate::short_channel_id::ShortChannelId;
use crate::store::ChannelStore;
use chrono::Utc;
use futures::StreamExt;
use rootcause::prelude::Report;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Something the ingestion layer learned that other subsystems may act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveredFact {
    /// A peer the node has a channel with.
    PeerPublicKey(String),
    /// A funding outpoint worth watching.
    ChannelPoint(String),
}

/// Delivers [`DiscoveredFact`]s to whoever listens.
///
/// A publisher without a receiver, or whose receiver has gone away, drops
/// facts after logging them.
#[derive(Debug, Clone, Default)]
pub struct FactPublisher {
    sender: Option<mpsc::Sender<DiscoveredFact>>,
}

impl FactPublisher {
    #[must_use]
    pub fn new(sender: mpsc::Sender<DiscoveredFact>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// A publisher that discards every fact.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    pub async fn publish(&self, fact: DiscoveredFact) {
        let Some(sender) = &self.sender else {
            return;
        };
        if let Err(e) = sender.send(fact).await {
            warn!(fact = ?e.0, "discovered fact receiver closed");
        }
    }
}

/// Which channel listing to backfill from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelListing {
    Open,
    Closed,
}

impl ChannelListing {
    /// The event type the listing's entries are recorded as.
    #[must_use]
    pub fn event_type(self) -> ChannelEventType {
        match self {
            Self::Open => ChannelEventType::Open,
            Self::Closed => ChannelEventType::Closed,
        }
    }
}

fn short_channel_id(chan_id: u64) -> Option<ShortChannelId> {
    (chan_id != 0).then(|| ShortChannelId::from_lnd(chan_id))
}

/// Returns the channel record an open or close update describes.
fn channel_for_update(update: &ChannelEventUpdate) -> Option<NewChannel> {
    match update {
        ChannelEventUpdate::Open(c) => {
            let mut channel = NewChannel::new(&c.channel_point, ChannelStatus::Open)
                .with_remote_pub_key(&c.remote_pubkey)
                .with_capacity(c.capacity, c.private);
            channel.short_channel_id = short_channel_id(c.chan_id);
            Some(channel)
        }
        ChannelEventUpdate::Closed(c) => {
            let mut channel = NewChannel::new(&c.channel_point, c.close_type.status())
                .with_remote_pub_key(&c.remote_pubkey)
                .with_capacity(c.capacity, false)
                .with_closing(&c.closing_tx_hash, i64::from(c.close_height));
            channel.short_channel_id = short_channel_id(c.chan_id);
            Some(channel)
        }
        _ => None,
    }
}

async fn publish_facts(facts: &FactPublisher, update: &ChannelEventUpdate) {
    match update {
        ChannelEventUpdate::Open(c) => {
            facts
                .publish(DiscoveredFact::PeerPublicKey(c.remote_pubkey.clone()))
                .await;
            facts
                .publish(DiscoveredFact::ChannelPoint(c.channel_point.clone()))
                .await;
        }
        ChannelEventUpdate::Closed(c) => {
            facts
                .publish(DiscoveredFact::ChannelPoint(c.channel_point.clone()))
                .await;
        }
        _ => {}
    }
}

/// Makes sure the channel an update describes exists and follows its lifecycle.
///
/// New channels are inserted in the update's state. An existing record
/// keeps everything it has, except that its status advances when the
/// update moves it along a valid transition; a close also records the
/// closing transaction. The status change only applies to the status that
/// was read, so a concurrent change is re-read and judged again.
async fn ensure_channel<S: ChannelStore + ?Sized>(
    store: &S,
    wanted: NewChannel,
) -> Result<(), Report<IngestError>> {
    let target = wanted.status;
    let closing_transaction_hash = wanted.closing_transaction_hash.clone();
    let closing_block_height = wanted.closing_block_height;

    let mut stored = store
        .ensure_channel(wanted)
        .await
        .map_err(IngestError::Store)?;
    loop {
        if stored.status == target || !stored.status.can_transition_to(target) {
            return Ok(());
        }

        debug!(channel_point = %stored.channel_point, from = %stored.status, to = %target, "advancing channel status");
        let change = StatusChange {
            from: stored.status,
            to: target,
            closing_transaction_hash: closing_transaction_hash.clone(),
            closing_block_height,
        };
        if store
            .change_status(&stored.channel_point, &change)
            .await
            .map_err(IngestError::Store)?
        {
            return Ok(());
        }

        // Statuses only move forward, so this settles.
        stored = match store
            .find_channel_by_point(&stored.channel_point)
            .await
            .map_err(IngestError::Store)?
        {
            Some(channel) => channel,
            None => return Ok(()),
        };
    }
}

/// Records one channel update.
///
/// Open and close updates also publish their discovered facts and make
/// sure the channel record exists. Every update appends one event row.
///
/// # Errors
///
/// - `ChannelPoint` if the update carries a malformed outpoint.
/// - `Store` for persistence failures.
#[instrument(skip(store, facts, update))]
pub async fn store_channel_event<S: ChannelStore + ?Sized>(
    store: &S,
    facts: &FactPublisher,
    update: ChannelEventUpdate,
    imported: bool,
) -> Result<(), Report<IngestError>> {
    let event = ChannelEvent::from_update(&update, imported, Utc::now())?;

    publish_facts(facts, &update).await;
    if let Some(channel) = channel_for_update(&update) {
        ensure_channel(store, channel).await?;
    }

    store
        .insert_channel_event(&event)
        .await
        .map_err(IngestError::Store)?;
    debug!(channel_point = %event.chan_point, event_type = %event.event_type, "stored channel event");
    Ok(())
}

/// Backfills events from a channel listing.
///
/// Channel points that already have an event of the listing's type are
/// skipped, so importing the same listing twice stores each event once.
/// Returns the number of events stored.
///
/// # Errors
///
/// Returns the first node or store failure.
#[instrument(skip(client, store, facts))]
pub async fn import_channel_list<C, S>(
    client: &C,
    store: &S,
    facts: &FactPublisher,
    listing: ChannelListing,
) -> Result<usize, Report<IngestError>>
where
    C: LightningClient + ?Sized,
    S: ChannelStore + ?Sized,
{
    let updates: Vec<ChannelEventUpdate> = match listing {
        ChannelListing::Open => client
            .list_channels()
            .await
            .map_err(IngestError::Rpc)?
            .into_iter()
            .map(ChannelEventUpdate::Open)
            .collect(),
        ChannelListing::Closed => client
            .closed_channels()
            .await
            .map_err(IngestError::Rpc)?
            .into_iter()
            .map(ChannelEventUpdate::Closed)
            .collect(),
    };

    let points: Vec<String> = updates
        .iter()
        .filter_map(|update| match update {
            ChannelEventUpdate::Open(c) => Some(c.channel_point.clone()),
            ChannelEventUpdate::Closed(c) => Some(c.channel_point.clone()),
            _ => None,
        })
        .collect();
    let mut seen: HashSet<String> = store
        .existing_channel_points(listing.event_type(), &points)
        .await
        .map_err(IngestError::Store)?;

    let mut stored = 0;
    for (update, point) in updates.into_iter().zip(points) {
        if !seen.insert(point) {
            continue;
        }
        store_channel_event(store, facts, update, true).await?;
        stored += 1;
    }
    info!(stored, skipped = seen.len() - stored, "imported channel listing");
    Ok(stored)
}

/// Subscribes to channel events and stores them until `cancel` fires.
///
/// A failed receive, an ended stream or a failed reconnect leads to a new
/// subscription after waiting for the rate limiter. A failed store waits
/// for the limiter too and moves on to the next event. Neither ends the loop.
///
/// # Errors
///
/// Returns an error only when the initial subscription fails.
#[instrument(skip_all)]
pub async fn subscribe_and_store_channel_events<C, S>(
    client: &C,
    store: &S,
    facts: &FactPublisher,
    limiter: &RateLimiter,
    cancel: CancellationToken,
) -> Result<(), Report<IngestError>>
where
    C: LightningClient + ?Sized,
    S: ChannelStore + ?Sized,
{
    let mut stream = client
        .subscribe_channel_events()
        .await
        .map_err(IngestError::Rpc)?;
    info!("subscribed to channel events");

    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => break,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(update)) => {
                if let Err(e) = store_channel_event(store, facts, update, false).await {
                    warn!(error = %e, "failed to store channel event");
                    if !limiter.take(&cancel).await {
                        break;
                    }
                }
            }
            failure => {
                match failure {
                    Some(Err(e)) => warn!(error = %e, "channel event stream failed"),
                    _ => warn!("channel event stream ended"),
                }
                if !limiter.take(&cancel).await {
                    break;
                }
                stream = match client.subscribe_channel_events().await {
                    Ok(s) => {
                        info!("resubscribed to channel events");
                        s
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to resubscribe to channel events");
                        futures::stream::empty().boxed()
                    }
                };
            }
        }
    }

    info!("channel event subscription cancelled");
    Ok(())
}
