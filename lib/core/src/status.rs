//! Lifecycle status shared by workflows, versions and nodes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a record participates in automation.
///
/// Persisted as a small integer; the discriminants are part of the
/// relational schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Present but not eligible to run.
    #[default]
    Inactive,
    /// Eligible to run.
    Active,
    /// Soft-deleted.
    Deleted,
}

impl Status {
    /// Returns the persisted discriminant.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Inactive => 0,
            Self::Active => 1,
            Self::Deleted => 2,
        }
    }

    /// Decodes a persisted discriminant.
    #[must_use]
    pub const fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Inactive),
            1 => Some(Self::Active),
            2 => Some(Self::Deleted),
            _ => None,
        }
    }

    /// Returns true for [`Status::Active`].
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "inactive"),
            Self::Active => write!(f, "active"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}
