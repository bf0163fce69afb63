//! External verification service.
//!
//! The service confirms on-chain details of funding and closing
//! transactions. Every request is signed by the node key; signing goes
//! through [`MessageSigner`], which forwards the message to whichever task
//! owns the node connection and waits for its reply.

use crate::error::{RpcError, VerificationError};
use crate::lnd::LightningClient;
use crate::node::NodeSettings;
use crate::short_channel_id::ShortChannelId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Default base URL of the verification service.
pub const DEFAULT_VERIFICATION_URL: &str = "https://vector.ln.capital/";

const SHORT_CHANNEL_ID_PATH: &str = "api/bitcoin/shortChannelId";
const TRANSACTION_DETAILS_PATH: &str = "api/bitcoin/transactionDetails";

/// A request for the node to sign `message`.
#[derive(Debug)]
pub struct SignMessageRequest {
    pub message: String,
    pub reply: oneshot::Sender<Result<String, RpcError>>,
}

/// Handle for requesting signatures from the node connection task.
#[derive(Debug, Clone)]
pub struct MessageSigner {
    requests: mpsc::Sender<SignMessageRequest>,
}

impl MessageSigner {
    /// Creates a signer and the receiver its requests arrive on.
    #[must_use]
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<SignMessageRequest>) {
        let (requests, receiver) = mpsc::channel(buffer);
        (Self { requests }, receiver)
    }

    /// Signs `message`, waiting for as long as the node takes to answer.
    ///
    /// # Errors
    ///
    /// Returns `Signing` if the node task is gone or refuses to sign.
    pub async fn sign(&self, message: String) -> Result<String, VerificationError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(SignMessageRequest { message, reply })
            .await
            .map_err(|_| VerificationError::Signing {
                details: "signing task stopped".to_string(),
            })?;
        response
            .await
            .map_err(|_| VerificationError::Signing {
                details: "signing task dropped the request".to_string(),
            })?
            .map_err(|e| VerificationError::Signing {
                details: e.to_string(),
            })
    }
}

/// Answers signing requests with `client` until `cancel` fires or every
/// [`MessageSigner`] is dropped.
pub async fn serve_sign_requests<C: LightningClient + ?Sized>(
    client: &C,
    mut requests: mpsc::Receiver<SignMessageRequest>,
    cancel: CancellationToken,
) {
    loop {
        let request = tokio::select! {
            () = cancel.cancelled() => break,
            request = requests.recv() => request,
        };
        let Some(request) = request else {
            break;
        };
        let signature = client.sign_message(&request.message).await;
        if request.reply.send(signature).is_err() {
            debug!("signature requester went away");
        }
    }
}

/// Confirmation details of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionDetails {
    pub transaction_hash: String,
    pub block_height: i64,
    pub block_timestamp: Option<DateTime<Utc>>,
    pub transaction_timestamp: Option<DateTime<Utc>>,
}

impl TransactionDetails {
    /// The service reports block height 0 for unconfirmed or unknown transactions.
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.block_height != 0
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransactionDetailsRequest<'a> {
    transaction_hash: &'a str,
    unix_time: i64,
    signature: String,
    public_key: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShortChannelIdRequest<'a> {
    transaction_hash: &'a str,
    output_index: u32,
    unix_time: i64,
    signature: String,
    public_key: &'a str,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ShortChannelIdResponse {
    short_channel_id: String,
}

/// Lookups the reconciliation loop makes.
#[async_trait]
pub trait VerificationService: Send + Sync {
    /// Fetches the confirmation details of a transaction.
    async fn transaction_details(
        &self,
        transaction_hash: &str,
    ) -> Result<TransactionDetails, VerificationError>;

    /// Fetches the short channel id of a funding outpoint. Returns `None`
    /// when the service does not know it.
    async fn short_channel_id(
        &self,
        funding_transaction_hash: &str,
        output_index: u32,
    ) -> Result<Option<ShortChannelId>, VerificationError>;
}

/// HTTP client for the verification service.
#[derive(Debug, Clone)]
pub struct VectorClient {
    http: reqwest::Client,
    base_url: String,
    public_key: String,
    signer: MessageSigner,
}

impl VectorClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, node: &NodeSettings, signer: MessageSigner) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            public_key: node.public_key.clone(),
            signer,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }

    async fn get_json<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, VerificationError> {
        let response = self
            .http
            .get(self.url(path))
            .header("Boltflow-Version", env!("CARGO_PKG_VERSION"))
            .json(body)
            .send()
            .await
            .map_err(|e| VerificationError::Request {
                details: e.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(VerificationError::Status {
                status: status.as_u16(),
            });
        }
        response
            .json::<R>()
            .await
            .map_err(|e| VerificationError::Decode {
                details: e.to_string(),
            })
    }
}

#[async_trait]
impl VerificationService for VectorClient {
    #[instrument(skip(self))]
    async fn transaction_details(
        &self,
        transaction_hash: &str,
    ) -> Result<TransactionDetails, VerificationError> {
        let unix_time = Utc::now().timestamp();
        let signature = self
            .signer
            .sign(format!("{transaction_hash}/{unix_time}"))
            .await?;
        let request = TransactionDetailsRequest {
            transaction_hash,
            unix_time,
            signature,
            public_key: &self.public_key,
        };
        self.get_json(TRANSACTION_DETAILS_PATH, &request).await
    }

    #[instrument(skip(self))]
    async fn short_channel_id(
        &self,
        funding_transaction_hash: &str,
        output_index: u32,
    ) -> Result<Option<ShortChannelId>, VerificationError> {
        let unix_time = Utc::now().timestamp();
        let signature = self
            .signer
            .sign(format!("{funding_transaction_hash}/{output_index}/{unix_time}"))
            .await?;
        let request = ShortChannelIdRequest {
            transaction_hash: funding_transaction_hash,
            output_index,
            unix_time,
            signature,
            public_key: &self.public_key,
        };
        let response: ShortChannelIdResponse =
            self.get_json(SHORT_CHANNEL_ID_PATH, &request).await?;
        if response.short_channel_id.is_empty() {
            warn!("verification service has no short channel id");
            return Ok(None);
        }
        response
            .short_channel_id
            .parse()
            .map(Some)
            .map_err(VerificationError::InvalidShortChannelId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lnd::fake::FakeLightningClient;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    fn node() -> NodeSettings {
        NodeSettings {
            public_key: "02abc".to_string(),
            ..NodeSettings::default()
        }
    }

    fn spawn_signer(cancel: &CancellationToken) -> MessageSigner {
        let (signer, requests) = MessageSigner::channel(4);
        let client = Arc::new(FakeLightningClient::default());
        let cancel = cancel.clone();
        tokio::spawn(async move { serve_sign_requests(client.as_ref(), requests, cancel).await });
        signer
    }

    #[tokio::test]
    async fn signer_round_trips_through_node_task() {
        let cancel = CancellationToken::new();
        let signer = spawn_signer(&cancel);

        let signature = signer.sign("hello".to_string()).await.expect("sign");
        assert_eq!(signature, "sig(hello)");
        cancel.cancel();
    }

    #[tokio::test]
    async fn signer_without_task_fails() {
        let (signer, requests) = MessageSigner::channel(1);
        drop(requests);
        let err = signer.sign("hello".to_string()).await.unwrap_err();
        assert!(matches!(err, VerificationError::Signing { .. }));
    }

    #[tokio::test]
    async fn fetches_transaction_details() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/bitcoin/transactionDetails")
                    .json_body_partial(r#"{"transactionHash":"ab12","publicKey":"02abc"}"#);
                then.status(200).json_body(json!({
                    "transactionHash": "ab12",
                    "blockHeight": 800000,
                    "blockTimestamp": "2023-07-24T10:00:00Z",
                    "transactionTimestamp": "2023-07-24T09:55:00Z"
                }));
            })
            .await;
        let cancel = CancellationToken::new();
        let client = VectorClient::new(server.url("/"), &node(), spawn_signer(&cancel));

        let details = client.transaction_details("ab12").await.expect("details");

        mock.assert_async().await;
        assert!(details.is_confirmed());
        assert_eq!(details.block_height, 800_000);
        assert!(details.block_timestamp.is_some());
        cancel.cancel();
    }

    #[tokio::test]
    async fn fetches_short_channel_id() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/bitcoin/shortChannelId")
                    .json_body_partial(r#"{"transactionHash":"cd34","outputIndex":1}"#);
                then.status(200)
                    .json_body(json!({ "shortChannelId": "505580x1917x1" }));
            })
            .await;
        let cancel = CancellationToken::new();
        let client = VectorClient::new(server.url(""), &node(), spawn_signer(&cancel));

        let id = client.short_channel_id("cd34", 1).await.expect("lookup");

        mock.assert_async().await;
        assert_eq!(id.map(|id| id.to_string()).as_deref(), Some("505580x1917x1"));
        cancel.cancel();
    }

    #[tokio::test]
    async fn empty_short_channel_id_is_none() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/bitcoin/shortChannelId");
                then.status(200).json_body(json!({ "shortChannelId": "" }));
            })
            .await;
        let cancel = CancellationToken::new();
        let client = VectorClient::new(server.url(""), &node(), spawn_signer(&cancel));

        assert_eq!(client.short_channel_id("cd34", 0).await.expect("lookup"), None);
        cancel.cancel();
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/bitcoin/transactionDetails");
                then.status(503);
            })
            .await;
        let cancel = CancellationToken::new();
        let client = VectorClient::new(server.url(""), &node(), spawn_signer(&cancel));

        let err = client.transaction_details("ab12").await.unwrap_err();
        assert_eq!(err, VerificationError::Status { status: 503 });
        cancel.cancel();
    }
}
