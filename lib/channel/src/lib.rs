//! Lightning channel ingestion for the boltflow platform.
//!
//! This crate provides:
//!
//! - **Codec**: Conversion between packed and textual short channel ids
//! - **Entities**: Channels with their lifecycle, and the channel event time series
//! - **Storage**: The `ChannelStore` and `TransactionStore` traits and an in-memory implementation
//! - **Node surface**: The `LightningClient` trait a node connector implements
//! - **Ingestion**: Rate-limited event and transaction subscriptions, and idempotent imports
//! - **Reconciliation**: Periodic backfill of channel metadata from a verification service

pub mod channel;
pub mod error;
pub mod event;
pub mod ingest;
pub mod lnd;
pub mod maintenance;
pub mod memory;
pub mod node;
pub mod rate_limit;
pub mod short_channel_id;
pub mod store;
pub mod transactions;
pub mod verification;

pub use channel::{
    Channel, ChannelStatus, ChannelTransaction, CloseType, Confirmation, NewChannel, StatusChange,
};
pub use error::{
    ChannelPointError, ChannelStoreError, IngestError, RpcError, ShortChannelIdError,
    VerificationError,
};
pub use event::{ChannelEvent, ChannelEventType, canonical_channel_point};
pub use ingest::{
    ChannelListing, DiscoveredFact, FactPublisher, import_channel_list, store_channel_event,
    subscribe_and_store_channel_events,
};
pub use lnd::{LightningClient, Transaction};
pub use maintenance::{ReconcileSummary, Reconciler};
pub use memory::InMemoryChannelStore;
pub use node::{Chain, Network, NodeSettings};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use short_channel_id::ShortChannelId;
pub use store::{ChannelStore, TransactionStore};
pub use transactions::{import_transactions, subscribe_and_store_transactions};
pub use verification::{
    DEFAULT_VERIFICATION_URL, MessageSigner, VectorClient, VerificationService,
    serve_sign_requests,
};
