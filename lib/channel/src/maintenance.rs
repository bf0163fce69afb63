//! Periodic reconciliation of channel metadata.
//!
//! Channels learn their funding and closing confirmation details, and
//! their short channel id, from the verification service. Every lookup is
//! followed by a fixed pause to stay inside the service's rate limits.

use crate::channel::{Channel, ChannelTransaction, Confirmation};
use crate::error::IngestError;
use crate::node::NodeSettings;
use crate::store::ChannelStore;
use crate::verification::{TransactionDetails, VerificationService};
use rootcause::prelude::Report;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// What one sweep did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileSummary {
    pub channels: usize,
    pub lookups: usize,
    pub updated: usize,
    pub failures: usize,
}

/// Backfills channel metadata from a [`VerificationService`].
pub struct Reconciler<S: ?Sized, V: ?Sized> {
    store: Arc<S>,
    verifier: Arc<V>,
    node: NodeSettings,
    delay: Duration,
}

impl From<&TransactionDetails> for Confirmation {
    fn from(details: &TransactionDetails) -> Self {
        Self {
            block_height: details.block_height,
            transaction_on: details.transaction_timestamp,
            confirmed_on: details.block_timestamp,
        }
    }
}

impl<S, V> Reconciler<S, V>
where
    S: ChannelStore + ?Sized,
    V: VerificationService + ?Sized,
{
    #[must_use]
    pub fn new(store: Arc<S>, verifier: Arc<V>, node: NodeSettings, delay: Duration) -> Self {
        Self {
            store,
            verifier,
            node,
            delay,
        }
    }

    /// Sleeps for the configured delay. Returns false if cancelled first.
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            () = cancel.cancelled() => false,
            () = tokio::time::sleep(self.delay) => true,
        }
    }

    async fn lookup_details(
        &self,
        channel: &mut Channel,
        transaction: ChannelTransaction,
        summary: &mut ReconcileSummary,
    ) {
        let hash = match transaction {
            ChannelTransaction::Funding => channel.funding_transaction_hash.clone(),
            ChannelTransaction::Closing => {
                channel.closing_transaction_hash.clone().unwrap_or_default()
            }
        };
        summary.lookups += 1;
        let details = match self.verifier.transaction_details(&hash).await {
            Ok(details) => details,
            Err(e) => {
                warn!(channel_id = %channel.id, transaction_hash = %hash, error = %e, "verification lookup failed");
                summary.failures += 1;
                return;
            }
        };
        if !details.is_confirmed() {
            debug!(channel_id = %channel.id, transaction_hash = %hash, "transaction not confirmed yet");
            return;
        }

        let confirmation = Confirmation::from(&details);
        match self
            .store
            .record_confirmation(channel.id, transaction, &confirmation)
            .await
        {
            Ok(()) => {
                channel.apply_confirmation(transaction, &confirmation);
                summary.updated += 1;
            }
            Err(e) => {
                error!(channel_id = %channel.id, error = %e, "failed to update channel details");
                summary.failures += 1;
            }
        }
    }

    async fn lookup_short_channel_id(&self, channel: &mut Channel, summary: &mut ReconcileSummary) {
        summary.lookups += 1;
        let id = match self
            .verifier
            .short_channel_id(&channel.funding_transaction_hash, channel.funding_output_index)
            .await
        {
            Ok(Some(id)) => id,
            Ok(None) => return,
            Err(e) => {
                warn!(channel_id = %channel.id, error = %e, "short channel id lookup failed");
                summary.failures += 1;
                return;
            }
        };

        match self.store.set_short_channel_id(channel.id, id).await {
            Ok(()) => {
                channel.short_channel_id = Some(id);
                summary.updated += 1;
            }
            Err(e) => {
                error!(channel_id = %channel.id, error = %e, "failed to update short channel id");
                summary.failures += 1;
            }
        }
    }

    /// Runs one sweep over every stored channel.
    ///
    /// Does nothing unless the node is on bitcoin mainnet. A failed lookup
    /// or update is logged and the sweep moves on to the next step.
    ///
    /// # Errors
    ///
    /// Returns an error only when the channel list cannot be read.
    #[instrument(skip_all)]
    pub async fn reconcile(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ReconcileSummary, Report<IngestError>> {
        let mut summary = ReconcileSummary::default();
        if !self.node.is_bitcoin_mainnet() {
            info!(chain = ?self.node.chain, network = ?self.node.network, "skipping channel verification");
            return Ok(summary);
        }

        let channels = self
            .store
            .list_channels()
            .await
            .map_err(IngestError::Store)?;
        summary.channels = channels.len();

        for mut channel in channels {
            if channel.needs_closing_details() {
                self.lookup_details(&mut channel, ChannelTransaction::Closing, &mut summary)
                    .await;
                if !self.pause(cancel).await {
                    break;
                }
            }
            if channel.needs_funding_details() {
                self.lookup_details(&mut channel, ChannelTransaction::Funding, &mut summary)
                    .await;
                if !self.pause(cancel).await {
                    break;
                }
            }
            if channel.needs_short_channel_id() {
                self.lookup_short_channel_id(&mut channel, &mut summary).await;
                if !self.pause(cancel).await {
                    break;
                }
            }
        }

        info!(
            channels = summary.channels,
            lookups = summary.lookups,
            updated = summary.updated,
            failures = summary.failures,
            "channel verification sweep finished"
        );
        Ok(summary)
    }

    /// Sweeps every `tick` until `cancel` fires. The first sweep happens
    /// one tick after start.
    pub async fn run(&self, tick: Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval_at(Instant::now() + tick, tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.reconcile(&cancel).await {
                        error!(error = %e, "channel verification sweep failed");
                    }
                }
            }
        }
        info!("channel verification stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelStatus, CloseType, NewChannel};
    use crate::error::VerificationError;
    use crate::ingest::{FactPublisher, store_channel_event};
    use crate::lnd::ChannelEventUpdate;
    use crate::lnd::fake::closed_channel;
    use crate::memory::InMemoryChannelStore;
    use crate::node::Network;
    use crate::short_channel_id::ShortChannelId;
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    const FUNDING: &str = "1111111111111111111111111111111111111111111111111111111111111111";
    const CLOSING: &str = "2222222222222222222222222222222222222222222222222222222222222222";
    const OTHER: &str = "3333333333333333333333333333333333333333333333333333333333333333";

    #[derive(Default)]
    struct FakeVerifier {
        details: HashMap<String, TransactionDetails>,
        short_ids: HashMap<String, ShortChannelId>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VerificationService for FakeVerifier {
        async fn transaction_details(
            &self,
            transaction_hash: &str,
        ) -> Result<TransactionDetails, VerificationError> {
            self.calls.lock().await.push(transaction_hash.to_string());
            self.details
                .get(transaction_hash)
                .cloned()
                .ok_or(VerificationError::Status { status: 404 })
        }

        async fn short_channel_id(
            &self,
            funding_transaction_hash: &str,
            output_index: u32,
        ) -> Result<Option<ShortChannelId>, VerificationError> {
            self.calls
                .lock()
                .await
                .push(format!("{funding_transaction_hash}:{output_index}"));
            Ok(self.short_ids.get(funding_transaction_hash).copied())
        }
    }

    fn confirmed(hash: &str, height: i64) -> TransactionDetails {
        TransactionDetails {
            transaction_hash: hash.to_string(),
            block_height: height,
            block_timestamp: DateTime::from_timestamp(1_700_000_600, 0),
            transaction_timestamp: DateTime::from_timestamp(1_700_000_000, 0),
        }
    }

    fn mainnet() -> NodeSettings {
        NodeSettings::default()
    }

    fn reconciler(
        store: &Arc<InMemoryChannelStore>,
        verifier: FakeVerifier,
        node: NodeSettings,
    ) -> (Reconciler<InMemoryChannelStore, FakeVerifier>, Arc<FakeVerifier>) {
        let verifier = Arc::new(verifier);
        (
            Reconciler::new(store.clone(), verifier.clone(), node, Duration::from_millis(500)),
            verifier,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn backfills_closing_and_funding_details() {
        let store = Arc::new(InMemoryChannelStore::new());
        let short_id = ShortChannelId::from_lnd(555_891_088_896_622_593);
        store
            .ensure_channel(
                NewChannel::new(format!("{FUNDING}:0"), ChannelStatus::CooperativeClosed)
                    .with_short_channel_id(short_id)
                    .with_closing(CLOSING, 0),
            )
            .await
            .expect("channel");
        let verifier = FakeVerifier {
            details: HashMap::from([
                (FUNDING.to_string(), confirmed(FUNDING, 790_000)),
                (CLOSING.to_string(), confirmed(CLOSING, 800_000)),
            ]),
            ..FakeVerifier::default()
        };
        let (reconciler, verifier) = reconciler(&store, verifier, mainnet());

        let start = Instant::now();
        let summary = reconciler
            .reconcile(&CancellationToken::new())
            .await
            .expect("sweep");

        assert_eq!(summary.lookups, 2);
        assert_eq!(summary.updated, 2);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        assert_eq!(*verifier.calls.lock().await, vec![CLOSING, FUNDING]);

        let channel = store.list_channels().await.expect("list").remove(0);
        assert_eq!(channel.closing_block_height, Some(800_000));
        assert_eq!(channel.funding_block_height, Some(790_000));
        assert!(channel.closed_on.is_some());
        assert!(channel.funded_on.is_some());
        assert!(!channel.needs_funding_details());
        assert!(!channel.needs_closing_details());
    }

    #[tokio::test(start_paused = true)]
    async fn skipped_off_mainnet() {
        let store = Arc::new(InMemoryChannelStore::new());
        store
            .ensure_channel(NewChannel::new(format!("{FUNDING}:0"), ChannelStatus::Open))
            .await
            .expect("channel");
        let node = NodeSettings {
            network: Network::Testnet,
            ..NodeSettings::default()
        };
        let (reconciler, verifier) = reconciler(&store, FakeVerifier::default(), node);

        let summary = reconciler
            .reconcile(&CancellationToken::new())
            .await
            .expect("sweep");

        assert_eq!(summary, ReconcileSummary::default());
        assert!(verifier.calls.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn never_confirming_channels_are_left_alone() {
        let store = Arc::new(InMemoryChannelStore::new());
        for (point, status) in [
            ("aa:0", ChannelStatus::Opening),
            ("bb:0", ChannelStatus::FundingCancelledClosed),
            ("cc:0", ChannelStatus::AbandonedClosed),
        ] {
            store
                .ensure_channel(NewChannel::new(point, status).with_closing(CLOSING, 0))
                .await
                .expect("channel");
        }
        let (reconciler, verifier) = reconciler(&store, FakeVerifier::default(), mainnet());

        let summary = reconciler
            .reconcile(&CancellationToken::new())
            .await
            .expect("sweep");

        assert_eq!(summary.channels, 3);
        assert_eq!(summary.lookups, 0);
        assert!(verifier.calls.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_the_sweep() {
        let store = Arc::new(InMemoryChannelStore::new());
        let short_id = ShortChannelId::from_lnd(1 << 40);
        store
            .ensure_channel(
                NewChannel::new("dead:0", ChannelStatus::Open).with_short_channel_id(short_id),
            )
            .await
            .expect("unknown channel");
        store
            .ensure_channel(
                NewChannel::new(format!("{FUNDING}:1"), ChannelStatus::Open)
                    .with_short_channel_id(ShortChannelId::from_lnd(2 << 40)),
            )
            .await
            .expect("known channel");
        let verifier = FakeVerifier {
            details: HashMap::from([(FUNDING.to_string(), confirmed(FUNDING, 790_000))]),
            ..FakeVerifier::default()
        };
        let (reconciler, _) = reconciler(&store, verifier, mainnet());

        let summary = reconciler
            .reconcile(&CancellationToken::new())
            .await
            .expect("sweep");

        assert_eq!(summary.failures, 1);
        assert_eq!(summary.updated, 1);
        let known = store
            .find_channel_by_point(&format!("{FUNDING}:1"))
            .await
            .expect("find")
            .expect("present");
        assert_eq!(known.funding_block_height, Some(790_000));
    }

    #[tokio::test(start_paused = true)]
    async fn update_failure_is_counted_not_returned() {
        let store = Arc::new(InMemoryChannelStore::new());
        store
            .ensure_channel(
                NewChannel::new(format!("{FUNDING}:0"), ChannelStatus::Open)
                    .with_short_channel_id(ShortChannelId::from_lnd(1 << 40)),
            )
            .await
            .expect("channel");
        store.fail_channel_updates(true);
        let verifier = FakeVerifier {
            details: HashMap::from([(FUNDING.to_string(), confirmed(FUNDING, 790_000))]),
            ..FakeVerifier::default()
        };
        let (reconciler, _) = reconciler(&store, verifier, mainnet());

        let summary = reconciler
            .reconcile(&CancellationToken::new())
            .await
            .expect("sweep");
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.updated, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fills_missing_short_channel_id() {
        let store = Arc::new(InMemoryChannelStore::new());
        let channel = store
            .ensure_channel(NewChannel::new(format!("{FUNDING}:1"), ChannelStatus::Open))
            .await
            .expect("channel");
        let funded = Confirmation {
            block_height: 505_580,
            transaction_on: DateTime::from_timestamp(1, 0),
            confirmed_on: DateTime::from_timestamp(2, 0),
        };
        store
            .record_confirmation(channel.id, ChannelTransaction::Funding, &funded)
            .await
            .expect("update");
        let verifier = FakeVerifier {
            short_ids: HashMap::from([(
                FUNDING.to_string(),
                ShortChannelId::from_lnd(555_891_088_896_622_593),
            )]),
            ..FakeVerifier::default()
        };
        let (reconciler, verifier) = reconciler(&store, verifier, mainnet());

        reconciler
            .reconcile(&CancellationToken::new())
            .await
            .expect("sweep");

        assert_eq!(*verifier.calls.lock().await, vec![format!("{FUNDING}:1")]);
        let stored = store
            .get_channel(channel.id)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(stored.lnd_short_channel_id(), Some(555_891_088_896_622_593));
    }

    #[tokio::test(start_paused = true)]
    async fn run_sweeps_on_each_tick_until_cancelled() {
        let store = Arc::new(InMemoryChannelStore::new());
        store
            .ensure_channel(
                NewChannel::new(format!("{FUNDING}:0"), ChannelStatus::Open)
                    .with_short_channel_id(ShortChannelId::from_lnd(1 << 40)),
            )
            .await
            .expect("channel");
        // unconfirmed, so every sweep looks it up again
        let verifier = FakeVerifier {
            details: HashMap::from([(FUNDING.to_string(), confirmed(FUNDING, 0))]),
            ..FakeVerifier::default()
        };
        let (reconciler, verifier) = reconciler(&store, verifier, mainnet());
        let reconciler = Arc::new(reconciler);
        let cancel = CancellationToken::new();

        let task = {
            let (reconciler, cancel) = (reconciler.clone(), cancel.clone());
            tokio::spawn(async move { reconciler.run(Duration::from_secs(60), cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(verifier.calls.lock().await.is_empty());
        tokio::time::sleep(Duration::from_secs(62)).await;
        cancel.cancel();
        task.await.expect("join");

        assert_eq!(verifier.calls.lock().await.len(), 2);
    }

    /// Delivers a close event for the channel while its funding lookup is in flight.
    struct CloseDuringLookup {
        store: Arc<InMemoryChannelStore>,
        close: Mutex<Option<ChannelEventUpdate>>,
    }

    #[async_trait]
    impl VerificationService for CloseDuringLookup {
        async fn transaction_details(
            &self,
            transaction_hash: &str,
        ) -> Result<TransactionDetails, VerificationError> {
            if let Some(update) = self.close.lock().await.take() {
                store_channel_event(self.store.as_ref(), &FactPublisher::disabled(), update, false)
                    .await
                    .expect("close event");
            }
            Ok(confirmed(transaction_hash, 790_000))
        }

        async fn short_channel_id(
            &self,
            _funding_transaction_hash: &str,
            _output_index: u32,
        ) -> Result<Option<ShortChannelId>, VerificationError> {
            Ok(None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn close_during_lookup_is_kept() {
        let store = Arc::new(InMemoryChannelStore::new());
        let point = format!("{FUNDING}:0");
        let short_id = ShortChannelId::from_lnd(1 << 40);
        store
            .ensure_channel(
                NewChannel::new(&point, ChannelStatus::Open).with_short_channel_id(short_id),
            )
            .await
            .expect("channel");
        let mut close = closed_channel(short_id.to_lnd(), &point, CloseType::RemoteForce);
        close.closing_tx_hash = CLOSING.to_string();
        let verifier = Arc::new(CloseDuringLookup {
            store: store.clone(),
            close: Mutex::new(Some(ChannelEventUpdate::Closed(close))),
        });
        let reconciler = Reconciler::new(
            store.clone(),
            verifier,
            mainnet(),
            Duration::from_millis(500),
        );

        let summary = reconciler
            .reconcile(&CancellationToken::new())
            .await
            .expect("sweep");
        assert_eq!(summary.updated, 1);

        let channel = store
            .find_channel_by_point(&point)
            .await
            .expect("find")
            .expect("present");
        assert_eq!(channel.status, ChannelStatus::RemoteForceClosed);
        assert_eq!(channel.closing_transaction_hash.as_deref(), Some(CLOSING));
        assert_eq!(channel.funding_block_height, Some(790_000));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_pause_ends_the_sweep() {
        let store = Arc::new(InMemoryChannelStore::new());
        for (hash, scid) in [(FUNDING, 1u64 << 40), (OTHER, 2 << 40)] {
            store
                .ensure_channel(
                    NewChannel::new(format!("{hash}:0"), ChannelStatus::Open)
                        .with_short_channel_id(ShortChannelId::from_lnd(scid)),
                )
                .await
                .expect("channel");
        }
        let verifier = FakeVerifier {
            details: HashMap::from([
                (FUNDING.to_string(), confirmed(FUNDING, 790_000)),
                (OTHER.to_string(), confirmed(OTHER, 790_001)),
            ]),
            ..FakeVerifier::default()
        };
        let (reconciler, verifier) = reconciler(&store, verifier, mainnet());
        let cancel = CancellationToken::new();

        let start = Instant::now();
        let (summary, ()) = tokio::join!(reconciler.reconcile(&cancel), async {
            tokio::time::sleep(Duration::from_millis(250)).await;
            cancel.cancel();
        });
        let summary = summary.expect("sweep");

        assert_eq!(start.elapsed(), Duration::from_millis(250));
        assert_eq!(summary.lookups, 1);
        assert_eq!(*verifier.calls.lock().await, vec![FUNDING]);
        let untouched = store
            .find_channel_by_point(&format!("{OTHER}:0"))
            .await
            .expect("find")
            .expect("present");
        assert_eq!(untouched.funding_block_height, None);
    }
}
