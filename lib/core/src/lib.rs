//! Core domain types and utilities for boltflow.
//!
//! This crate provides the foundational types shared by the workflow
//! engine, the channel ingestion layer and the daemon: the error `Result`
//! alias, strongly-typed surrogate keys and the shared record status.

pub mod error;
pub mod id;
pub mod status;

pub use error::Result;
pub use id::{
    ChannelId, ParseIdError, WorkflowId, WorkflowVersionId, WorkflowVersionNodeId,
    WorkflowVersionNodeLinkId,
};
pub use status::Status;
