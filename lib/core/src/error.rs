//! Error handling foundation for boltflow.
//!
//! This module provides only the `Result` type alias using rootcause.
//! Each crate defines its own domain-specific error types in their own
//! error modules. Long-lived services report failures as
//! `Report<C>` so that callers can attach their own context as errors
//! propagate up the stack.

use rootcause::Report;

/// Outcome of a long-lived service operation failing with context `C`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
