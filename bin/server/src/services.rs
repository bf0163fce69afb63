//! Long-running daemon tasks.
//!
//! Every task stops when the shared cancellation token fires.

use crate::config::ServerConfig;
use boltflow_channel::{
    ChannelListing, ChannelStore, DiscoveredFact, FactPublisher, LightningClient, MessageSigner,
    RateLimiter, Reconciler, TransactionStore, VectorClient, import_channel_list,
    serve_sign_requests, subscribe_and_store_channel_events, subscribe_and_store_transactions,
};
use boltflow_scheduler::{TriggerDispatch, TriggerDispatcher};
use boltflow_workflow::WorkflowStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const DISPATCH_BUFFER: usize = 64;
const FACT_BUFFER: usize = 256;
const SIGN_BUFFER: usize = 8;

/// Spawns the time-trigger dispatcher and the task receiving its dispatches.
pub fn spawn_scheduler<S>(
    store: Arc<S>,
    config: &ServerConfig,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>>
where
    S: WorkflowStore + ?Sized + 'static,
{
    let (tx, rx) = mpsc::channel(DISPATCH_BUFFER);
    let dispatcher = TriggerDispatcher::new(store, tx, config.scheduler.lightning_node_id);
    vec![
        tokio::spawn(dispatcher.run(config.scheduler.tick(), cancel.clone())),
        tokio::spawn(receive_dispatches(rx, cancel)),
    ]
}

/// Node-side execution is out of this daemon's hands; dispatches are
/// recorded so that operators can follow trigger activity.
async fn receive_dispatches(mut rx: mpsc::Receiver<TriggerDispatch>, cancel: CancellationToken) {
    loop {
        let dispatch = tokio::select! {
            () = cancel.cancelled() => break,
            dispatch = rx.recv() => dispatch,
        };
        let Some(dispatch) = dispatch else {
            break;
        };
        info!(
            trigger_reference = %dispatch.trigger_reference,
            node_id = %dispatch.trigger.id(),
            fired_at = %dispatch.fired_at,
            "time trigger dispatched"
        );
    }
}

async fn receive_facts(mut rx: mpsc::Receiver<DiscoveredFact>) {
    while let Some(fact) = rx.recv().await {
        debug!(?fact, "discovered fact");
    }
}

/// Spawns channel ingestion and reconciliation against a node connection.
///
/// Existing channels are imported before the live subscription starts.
pub fn spawn_channel_services<C, S>(
    client: Arc<C>,
    store: Arc<S>,
    config: &ServerConfig,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>>
where
    C: LightningClient + ?Sized + 'static,
    S: ChannelStore + TransactionStore + 'static,
{
    let mut handles = Vec::new();

    let (fact_tx, fact_rx) = mpsc::channel(FACT_BUFFER);
    handles.push(tokio::spawn(receive_facts(fact_rx)));
    let facts = FactPublisher::new(fact_tx);

    handles.push(tokio::spawn({
        let client = client.clone();
        let store = store.clone();
        let cancel = cancel.clone();
        async move {
            for listing in [ChannelListing::Open, ChannelListing::Closed] {
                match import_channel_list(client.as_ref(), store.as_ref(), &facts, listing).await {
                    Ok(imported) => info!(?listing, imported, "imported channel listing"),
                    Err(e) => error!(?listing, error = %e, "channel listing import failed"),
                }
            }
            let limiter = RateLimiter::default();
            if let Err(e) = subscribe_and_store_channel_events(
                client.as_ref(),
                store.as_ref(),
                &facts,
                &limiter,
                cancel,
            )
            .await
            {
                error!(error = %e, "channel event subscription failed");
            }
        }
    }));

    handles.push(tokio::spawn({
        let client = client.clone();
        let store = store.clone();
        let cancel = cancel.clone();
        async move {
            let limiter = RateLimiter::default();
            if let Err(e) =
                subscribe_and_store_transactions(client.as_ref(), store.as_ref(), &limiter, cancel)
                    .await
            {
                error!(error = %e, "transaction subscription failed");
            }
        }
    }));

    let (signer, sign_requests) = MessageSigner::channel(SIGN_BUFFER);
    handles.push(tokio::spawn({
        let client = client.clone();
        let cancel = cancel.clone();
        async move { serve_sign_requests(client.as_ref(), sign_requests, cancel).await }
    }));

    let verifier = Arc::new(VectorClient::new(
        config.maintenance.verification_url.clone(),
        &config.node,
        signer,
    ));
    let reconciler = Reconciler::new(
        store,
        verifier,
        config.node.clone(),
        config.maintenance.verification_delay(),
    );
    let tick = config.maintenance.tick();
    handles.push(tokio::spawn(async move { reconciler.run(tick, cancel).await }));

    handles
}
