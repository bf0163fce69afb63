//! On-chain wallet transaction ingestion.

use crate::error::IngestError;
use crate::lnd::LightningClient;
use crate::rate_limit::RateLimiter;
use crate::store::TransactionStore;
use futures::StreamExt;
use rootcause::prelude::Report;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Stores every transaction the node lists.
///
/// Transactions already stored are left alone. Returns how many were new.
///
/// # Errors
///
/// Returns the node failure, or the first store failure.
#[instrument(skip_all)]
pub async fn import_transactions<C, S>(client: &C, store: &S) -> Result<usize, Report<IngestError>>
where
    C: LightningClient + ?Sized,
    S: TransactionStore + ?Sized,
{
    let transactions = client
        .get_transactions()
        .await
        .map_err(IngestError::Rpc)?;
    let mut inserted = 0;
    for tx in &transactions {
        if store
            .insert_transaction(tx)
            .await
            .map_err(IngestError::Store)?
        {
            inserted += 1;
        }
    }
    info!(listed = transactions.len(), inserted, "imported transactions");
    Ok(inserted)
}

/// Imports existing transactions, then stores streamed ones until `cancel` fires.
///
/// Receive and store failures are handled the way the channel event loop
/// handles them: logged, rate limited, never fatal.
///
/// # Errors
///
/// Returns an error when the import or the initial subscription fails.
#[instrument(skip_all)]
pub async fn subscribe_and_store_transactions<C, S>(
    client: &C,
    store: &S,
    limiter: &RateLimiter,
    cancel: CancellationToken,
) -> Result<(), Report<IngestError>>
where
    C: LightningClient + ?Sized,
    S: TransactionStore + ?Sized,
{
    import_transactions(client, store).await?;

    let mut stream = client
        .subscribe_transactions()
        .await
        .map_err(IngestError::Rpc)?;

    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => break,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(tx)) => match store.insert_transaction(&tx).await {
                Ok(inserted) => debug!(tx_hash = %tx.tx_hash, inserted, "stored transaction"),
                Err(e) => {
                    warn!(tx_hash = %tx.tx_hash, error = %e, "failed to store transaction");
                    if !limiter.take(&cancel).await {
                        break;
                    }
                }
            },
            failure => {
                match failure {
                    Some(Err(e)) => warn!(error = %e, "transaction stream failed"),
                    _ => warn!("transaction stream ended"),
                }
                if !limiter.take(&cancel).await {
                    break;
                }
                stream = match client.subscribe_transactions().await {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(error = %e, "failed to resubscribe to transactions");
                        futures::stream::empty().boxed()
                    }
                };
            }
        }
    }

    info!("transaction subscription cancelled");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lnd::fake::{FakeLightningClient, stream_error, transaction};
    use crate::memory::InMemoryChannelStore;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    #[tokio::test]
    async fn import_is_idempotent() {
        let client = FakeLightningClient {
            transactions: vec![transaction("aa", 1), transaction("bb", 2)],
            ..FakeLightningClient::default()
        };
        let store = InMemoryChannelStore::new();

        assert_eq!(import_transactions(&client, &store).await.expect("first"), 2);
        assert_eq!(import_transactions(&client, &store).await.expect("second"), 0);
        assert_eq!(store.list_transactions().await.expect("list").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn streamed_transactions_are_stored_across_resubscribes() {
        let client = Arc::new(FakeLightningClient {
            transactions: vec![transaction("aa", 1)],
            ..FakeLightningClient::default()
        });
        client
            .script_transaction_stream(vec![
                Ok(transaction("aa", 1)),
                Ok(transaction("bb", 2)),
                Err(stream_error("subscribe_transactions")),
            ])
            .await;
        client
            .script_transaction_stream(vec![Ok(transaction("cc", 3))])
            .await;
        let store = Arc::new(InMemoryChannelStore::new());
        let cancel = CancellationToken::new();

        let task = {
            let (client, store, cancel) = (client.clone(), store.clone(), cancel.clone());
            tokio::spawn(async move {
                subscribe_and_store_transactions(
                    client.as_ref(),
                    store.as_ref(),
                    &RateLimiter::default(),
                    cancel,
                )
                .await
            })
        };

        tokio::time::sleep(Duration::from_secs(10)).await;
        cancel.cancel();
        task.await.expect("join").expect("loop");

        let hashes: Vec<_> = store
            .list_transactions()
            .await
            .expect("list")
            .into_iter()
            .map(|tx| tx.tx_hash)
            .collect();
        assert_eq!(hashes, vec!["aa", "bb", "cc"]);
        assert_eq!(client.transaction_subscriptions.load(Ordering::SeqCst), 3);
    }
}
