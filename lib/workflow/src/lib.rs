//! Workflow graph engine for the boltflow platform.
//!
//! This crate provides:
//!
//! - **Entities**: Workflows, numbered versions, nodes, links and the node execution log
//! - **Storage**: The `WorkflowStore` trait and an in-memory implementation
//! - **Versions**: Draft creation and the clone entry point
//! - **Editing**: Node and link writes with timestamping, default names and validation
//! - **Graph views**: One-hop node views and full version trees
//! - **Triggers**: Discovery of active trigger roots across workflows

pub mod definition;
pub mod editor;
pub mod error;
pub mod graph;
pub mod link;
pub mod log;
pub mod memory;
pub mod node;
pub mod store;
pub mod tree;
pub mod trigger;
pub mod version;

pub use definition::{NewWorkflow, NewWorkflowVersion, Workflow, WorkflowVersion};
pub use error::{StoreError, WorkflowError};
pub use graph::{LinkedNode, WorkflowNode, get_node};
pub use link::{NewWorkflowVersionNodeLink, WorkflowVersionNodeLink};
pub use log::{MAX_LOG_RESULTS, WorkflowVersionNodeLog, append_log};
pub use memory::InMemoryWorkflowStore;
pub use node::{
    NewWorkflowVersionNode, WorkflowNodeParameter, WorkflowNodeParameters, WorkflowNodeType,
    WorkflowParameterType, WorkflowVersionNode,
};
pub use store::WorkflowStore;
pub use tree::{TreeNode, WorkflowTree, build_subtree, build_tree};
pub use trigger::find_active_trigger_roots;
pub use version::clone_or_create_version;
