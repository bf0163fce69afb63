//! Error types for the channel crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `ChannelStoreError`: Persistence failures reported by a channel or transaction store
//! - `ShortChannelIdError`: Malformed or out-of-range short channel ids
//! - `ChannelPointError`: Funding outpoints that cannot be rendered
//! - `RpcError`: Failures reported by the remote node
//! - `VerificationError`: Failures talking to the verification service
//! - `IngestError`: Ingestion and reconciliation operations (wraps the above)

use std::fmt;

/// Errors reported by a channel or transaction store implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStoreError {
    /// A uniqueness constraint rejected the write.
    ConstraintViolation {
        operation: &'static str,
        details: String,
    },
    /// Any other persistence failure.
    StorageFailure {
        operation: &'static str,
        details: String,
    },
}

impl ChannelStoreError {
    /// Returns true when the store rejected a write on a uniqueness constraint.
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }
}

impl fmt::Display for ChannelStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConstraintViolation { operation, details } => {
                write!(f, "{operation}: constraint violation: {details}")
            }
            Self::StorageFailure { operation, details } => {
                write!(f, "{operation}: storage failure: {details}")
            }
        }
    }
}

impl std::error::Error for ChannelStoreError {}

/// Errors parsing or building a short channel id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortChannelIdError {
    /// The text is not three `x`-separated integers.
    Malformed { input: String },
    /// A component does not fit in its bit field.
    OutOfRange { field: &'static str, value: u64 },
}

impl fmt::Display for ShortChannelIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { input } => write!(f, "malformed short channel id: {input:?}"),
            Self::OutOfRange { field, value } => {
                write!(f, "short channel id {field} out of range: {value}")
            }
        }
    }
}

impl std::error::Error for ShortChannelIdError {}

/// Errors rendering a funding outpoint as a channel point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelPointError {
    /// The funding transaction id is not 32 bytes.
    InvalidTxidLength { length: usize },
}

impl fmt::Display for ChannelPointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTxidLength { length } => {
                write!(f, "funding txid must be 32 bytes, got {length}")
            }
        }
    }
}

impl std::error::Error for ChannelPointError {}

/// Errors reported by the remote node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// A unary call or subscription request failed.
    Call {
        operation: &'static str,
        details: String,
    },
    /// An open stream failed to deliver the next item.
    Stream {
        operation: &'static str,
        details: String,
    },
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call { operation, details } => write!(f, "{operation} failed: {details}"),
            Self::Stream { operation, details } => {
                write!(f, "{operation} stream receive failed: {details}")
            }
        }
    }
}

impl std::error::Error for RpcError {}

/// Errors talking to the verification service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// The node did not produce a signature for the request.
    Signing { details: String },
    /// The HTTP request could not be sent.
    Request { details: String },
    /// The service answered with a non-success status.
    Status { status: u16 },
    /// The response body did not decode.
    Decode { details: String },
    /// The service returned a short channel id that does not parse.
    InvalidShortChannelId(ShortChannelIdError),
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signing { details } => write!(f, "signing failed: {details}"),
            Self::Request { details } => write!(f, "verification request failed: {details}"),
            Self::Status { status } => write!(f, "verification service returned status {status}"),
            Self::Decode { details } => write!(f, "verification response did not decode: {details}"),
            Self::InvalidShortChannelId(e) => write!(f, "verification service returned {e}"),
        }
    }
}

impl std::error::Error for VerificationError {}

/// High-level ingestion and reconciliation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// The remote node failed.
    Rpc(RpcError),
    /// The store failed.
    Store(ChannelStoreError),
    /// An event carried an outpoint that cannot be rendered.
    ChannelPoint(ChannelPointError),
    /// An event payload could not be serialized for storage.
    Payload { details: String },
}

impl From<RpcError> for IngestError {
    fn from(error: RpcError) -> Self {
        Self::Rpc(error)
    }
}

impl From<ChannelStoreError> for IngestError {
    fn from(error: ChannelStoreError) -> Self {
        Self::Store(error)
    }
}

impl From<ChannelPointError> for IngestError {
    fn from(error: ChannelPointError) -> Self {
        Self::ChannelPoint(error)
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "{e}"),
            Self::ChannelPoint(e) => write!(f, "{e}"),
            Self::Payload { details } => write!(f, "event payload: {details}"),
        }
    }
}

impl std::error::Error for IngestError {}
