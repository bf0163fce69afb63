//! Channel records and their lifecycle.

use crate::short_channel_id::ShortChannelId;
use boltflow_core::ChannelId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a channel.
///
/// ```text
/// Opening ──► Open ──► Closing ──► CooperativeClosed | LocalForceClosed
///    │          │                  RemoteForceClosed | BreachClosed
///    │          └──► (any closed state except FundingCancelledClosed)
///    └──► FundingCancelledClosed | AbandonedClosed
/// ```
///
/// Every closed state is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Opening,
    Open,
    Closing,
    CooperativeClosed,
    LocalForceClosed,
    RemoteForceClosed,
    BreachClosed,
    FundingCancelledClosed,
    AbandonedClosed,
}

impl ChannelStatus {
    /// Returns the stored discriminant.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Opening => 0,
            Self::Open => 1,
            Self::Closing => 2,
            Self::CooperativeClosed => 100,
            Self::LocalForceClosed => 101,
            Self::RemoteForceClosed => 102,
            Self::BreachClosed => 103,
            Self::FundingCancelledClosed => 104,
            Self::AbandonedClosed => 105,
        }
    }

    /// Parses a stored discriminant.
    #[must_use]
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Opening),
            1 => Some(Self::Open),
            2 => Some(Self::Closing),
            100 => Some(Self::CooperativeClosed),
            101 => Some(Self::LocalForceClosed),
            102 => Some(Self::RemoteForceClosed),
            103 => Some(Self::BreachClosed),
            104 => Some(Self::FundingCancelledClosed),
            105 => Some(Self::AbandonedClosed),
            _ => None,
        }
    }

    /// Returns true for the closed states.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self.as_i32() >= 100
    }

    /// Returns true when a channel may move from `self` to `next`.
    ///
    /// Staying in the same state is always allowed.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return true;
        }
        match self {
            Self::Opening => matches!(
                next,
                Self::Open | Self::FundingCancelledClosed | Self::AbandonedClosed
            ),
            Self::Open => next == Self::Closing || (next.is_terminal() && next != Self::FundingCancelledClosed),
            Self::Closing => matches!(
                next,
                Self::CooperativeClosed
                    | Self::LocalForceClosed
                    | Self::RemoteForceClosed
                    | Self::BreachClosed
            ),
            _ => false,
        }
    }

    /// Returns true for the states that never produce on-chain confirmation data.
    #[must_use]
    pub fn never_confirms(self) -> bool {
        matches!(self, Self::FundingCancelledClosed | Self::AbandonedClosed)
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Opening => "opening",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::CooperativeClosed => "cooperative_closed",
            Self::LocalForceClosed => "local_force_closed",
            Self::RemoteForceClosed => "remote_force_closed",
            Self::BreachClosed => "breach_closed",
            Self::FundingCancelledClosed => "funding_cancelled_closed",
            Self::AbandonedClosed => "abandoned_closed",
        };
        write!(f, "{s}")
    }
}

/// How the remote node reports a channel was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseType {
    Cooperative,
    LocalForce,
    RemoteForce,
    Breach,
    FundingCanceled,
    Abandoned,
}

impl CloseType {
    /// Returns the terminal status a close of this kind ends in.
    #[must_use]
    pub fn status(self) -> ChannelStatus {
        match self {
            Self::Cooperative => ChannelStatus::CooperativeClosed,
            Self::LocalForce => ChannelStatus::LocalForceClosed,
            Self::RemoteForce => ChannelStatus::RemoteForceClosed,
            Self::Breach => ChannelStatus::BreachClosed,
            Self::FundingCanceled => ChannelStatus::FundingCancelledClosed,
            Self::Abandoned => ChannelStatus::AbandonedClosed,
        }
    }
}

/// A stored channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub short_channel_id: Option<ShortChannelId>,
    /// Funding outpoint, `<txid>:<output>`.
    pub channel_point: String,
    pub status: ChannelStatus,
    pub remote_pub_key: String,
    pub capacity: i64,
    pub private: bool,
    pub funding_transaction_hash: String,
    pub funding_output_index: u32,
    pub funding_block_height: Option<i64>,
    pub funding_transaction_on: Option<DateTime<Utc>>,
    pub funded_on: Option<DateTime<Utc>>,
    pub closing_transaction_hash: Option<String>,
    pub closing_block_height: Option<i64>,
    pub closing_transaction_on: Option<DateTime<Utc>>,
    pub closed_on: Option<DateTime<Utc>>,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

fn missing_height(height: Option<i64>) -> bool {
    height.is_none_or(|h| h == 0)
}

impl Channel {
    /// Packed form of the short channel id, if known.
    #[must_use]
    pub fn lnd_short_channel_id(&self) -> Option<u64> {
        self.short_channel_id.map(ShortChannelId::to_lnd)
    }

    /// Returns true when the funding confirmation details should be looked up.
    #[must_use]
    pub fn needs_funding_details(&self) -> bool {
        if self.status == ChannelStatus::Opening || self.status.never_confirms() {
            return false;
        }
        if self.funding_transaction_hash.is_empty() {
            return false;
        }
        self.funding_transaction_on.is_none()
            || missing_height(self.funding_block_height)
            || self.funded_on.is_none()
    }

    /// Returns true when the closing confirmation details should be looked up.
    #[must_use]
    pub fn needs_closing_details(&self) -> bool {
        if matches!(self.status, ChannelStatus::Opening | ChannelStatus::Open)
            || self.status.never_confirms()
        {
            return false;
        }
        if self
            .closing_transaction_hash
            .as_deref()
            .is_none_or(str::is_empty)
        {
            return false;
        }
        self.closing_transaction_on.is_none()
            || missing_height(self.closing_block_height)
            || self.closed_on.is_none()
    }

    /// Returns true when the short channel id should be looked up.
    #[must_use]
    pub fn needs_short_channel_id(&self) -> bool {
        self.short_channel_id.is_none()
            && self.status != ChannelStatus::Opening
            && !self.status.never_confirms()
            && !self.funding_transaction_hash.is_empty()
    }
}

/// One of the two on-chain transactions of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelTransaction {
    Funding,
    Closing,
}

/// Where and when a channel transaction confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub block_height: i64,
    pub transaction_on: Option<DateTime<Utc>>,
    pub confirmed_on: Option<DateTime<Utc>>,
}

impl Channel {
    /// Copies `confirmation` into the columns of `transaction`.
    pub fn apply_confirmation(&mut self, transaction: ChannelTransaction, confirmation: &Confirmation) {
        match transaction {
            ChannelTransaction::Funding => {
                self.funding_block_height = Some(confirmation.block_height);
                self.funding_transaction_on = confirmation.transaction_on;
                self.funded_on = confirmation.confirmed_on;
            }
            ChannelTransaction::Closing => {
                self.closing_block_height = Some(confirmation.block_height);
                self.closing_transaction_on = confirmation.transaction_on;
                self.closed_on = confirmation.confirmed_on;
            }
        }
    }

    /// Applies `change` if the channel is still in `change.from`.
    ///
    /// Returns false, leaving the channel untouched, otherwise.
    pub fn apply_status_change(&mut self, change: &StatusChange) -> bool {
        if self.status != change.from {
            return false;
        }
        self.status = change.to;
        if self.closing_transaction_hash.is_none() {
            self.closing_transaction_hash = change.closing_transaction_hash.clone();
            self.closing_block_height = change.closing_block_height;
        }
        true
    }
}

/// A status change guarded by the status it starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub from: ChannelStatus,
    pub to: ChannelStatus,
    /// Recorded only when the channel has no closing transaction yet.
    pub closing_transaction_hash: Option<String>,
    pub closing_block_height: Option<i64>,
}

/// A channel to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChannel {
    pub short_channel_id: Option<ShortChannelId>,
    pub channel_point: String,
    pub status: ChannelStatus,
    pub remote_pub_key: String,
    pub capacity: i64,
    pub private: bool,
    pub closing_transaction_hash: Option<String>,
    pub closing_block_height: Option<i64>,
    pub created_on: DateTime<Utc>,
}

impl NewChannel {
    /// Creates a channel record for a funding outpoint.
    ///
    /// The funding transaction hash and output index are taken from the
    /// channel point when it has the `<txid>:<output>` form.
    #[must_use]
    pub fn new(channel_point: impl Into<String>, status: ChannelStatus) -> Self {
        Self {
            short_channel_id: None,
            channel_point: channel_point.into(),
            status,
            remote_pub_key: String::new(),
            capacity: 0,
            private: false,
            closing_transaction_hash: None,
            closing_block_height: None,
            created_on: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_short_channel_id(mut self, id: ShortChannelId) -> Self {
        self.short_channel_id = Some(id);
        self
    }

    #[must_use]
    pub fn with_remote_pub_key(mut self, key: impl Into<String>) -> Self {
        self.remote_pub_key = key.into();
        self
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: i64, private: bool) -> Self {
        self.capacity = capacity;
        self.private = private;
        self
    }

    #[must_use]
    pub fn with_closing(mut self, transaction_hash: impl Into<String>, block_height: i64) -> Self {
        self.closing_transaction_hash = Some(transaction_hash.into());
        self.closing_block_height = (block_height != 0).then_some(block_height);
        self
    }

    /// Splits the channel point into funding hash and output index.
    ///
    /// Returns the whole channel point and index 0 when it has no `:`.
    #[must_use]
    pub fn funding_outpoint(&self) -> (String, u32) {
        match self.channel_point.rsplit_once(':') {
            Some((hash, index)) => (hash.to_string(), index.parse().unwrap_or(0)),
            None => (self.channel_point.clone(), 0),
        }
    }

    /// Materializes the record with the id the store assigned.
    #[must_use]
    pub fn into_channel(self, id: ChannelId) -> Channel {
        let (funding_transaction_hash, funding_output_index) = self.funding_outpoint();
        Channel {
            id,
            short_channel_id: self.short_channel_id,
            channel_point: self.channel_point,
            status: self.status,
            remote_pub_key: self.remote_pub_key,
            capacity: self.capacity,
            private: self.private,
            funding_transaction_hash,
            funding_output_index,
            funding_block_height: None,
            funding_transaction_on: None,
            funded_on: None,
            closing_transaction_hash: self.closing_transaction_hash,
            closing_block_height: self.closing_block_height,
            closing_transaction_on: None,
            closed_on: None,
            created_on: self.created_on,
            updated_on: self.created_on,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POINT: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90:1";

    fn channel(status: ChannelStatus) -> Channel {
        NewChannel::new(POINT, status).into_channel(ChannelId::new(1))
    }

    #[test]
    fn status_discriminants_roundtrip() {
        for status in [
            ChannelStatus::Opening,
            ChannelStatus::Open,
            ChannelStatus::Closing,
            ChannelStatus::CooperativeClosed,
            ChannelStatus::LocalForceClosed,
            ChannelStatus::RemoteForceClosed,
            ChannelStatus::BreachClosed,
            ChannelStatus::FundingCancelledClosed,
            ChannelStatus::AbandonedClosed,
        ] {
            assert_eq!(ChannelStatus::from_i32(status.as_i32()), Some(status));
        }
        assert_eq!(ChannelStatus::from_i32(3), None);
    }

    #[test]
    fn lifecycle_transitions() {
        use ChannelStatus::*;
        assert!(Opening.can_transition_to(Open));
        assert!(Opening.can_transition_to(FundingCancelledClosed));
        assert!(!Opening.can_transition_to(Closing));
        assert!(Open.can_transition_to(Closing));
        assert!(Open.can_transition_to(RemoteForceClosed));
        assert!(Open.can_transition_to(AbandonedClosed));
        assert!(!Open.can_transition_to(FundingCancelledClosed));
        assert!(!Open.can_transition_to(Opening));
        assert!(Closing.can_transition_to(CooperativeClosed));
        assert!(!Closing.can_transition_to(AbandonedClosed));
        assert!(!CooperativeClosed.can_transition_to(Open));
        assert!(BreachClosed.can_transition_to(BreachClosed));
        assert!(BreachClosed.is_terminal());
        assert!(!Closing.is_terminal());
    }

    #[test]
    fn close_types_end_in_terminal_states() {
        for close in [
            CloseType::Cooperative,
            CloseType::LocalForce,
            CloseType::RemoteForce,
            CloseType::Breach,
            CloseType::FundingCanceled,
            CloseType::Abandoned,
        ] {
            assert!(close.status().is_terminal());
        }
        assert_eq!(
            CloseType::FundingCanceled.status(),
            ChannelStatus::FundingCancelledClosed
        );
    }

    #[test]
    fn funding_outpoint_is_split_from_channel_point() {
        let c = channel(ChannelStatus::Open);
        assert_eq!(c.funding_output_index, 1);
        assert_eq!(c.funding_transaction_hash.len(), 64);
    }

    #[test]
    fn funding_details_gated_on_status() {
        assert!(!channel(ChannelStatus::Opening).needs_funding_details());
        assert!(!channel(ChannelStatus::AbandonedClosed).needs_funding_details());
        assert!(channel(ChannelStatus::Open).needs_funding_details());

        let mut complete = channel(ChannelStatus::Open);
        complete.funding_block_height = Some(700_000);
        complete.funding_transaction_on = Some(Utc::now());
        complete.funded_on = Some(Utc::now());
        assert!(!complete.needs_funding_details());

        complete.funding_block_height = Some(0);
        assert!(complete.needs_funding_details());
    }

    #[test]
    fn closing_details_need_a_closing_hash() {
        let mut closed = channel(ChannelStatus::CooperativeClosed);
        assert!(!closed.needs_closing_details());
        closed.closing_transaction_hash = Some("ff".repeat(32));
        assert!(closed.needs_closing_details());
        closed.closing_block_height = Some(800_000);
        closed.closing_transaction_on = Some(Utc::now());
        closed.closed_on = Some(Utc::now());
        assert!(!closed.needs_closing_details());

        let mut open = channel(ChannelStatus::Open);
        open.closing_transaction_hash = Some("ff".repeat(32));
        assert!(!open.needs_closing_details());
    }

    #[test]
    fn with_closing_ignores_zero_height() {
        let c = NewChannel::new(POINT, ChannelStatus::CooperativeClosed).with_closing("ab", 0);
        assert_eq!(c.closing_block_height, None);
        assert_eq!(c.closing_transaction_hash.as_deref(), Some("ab"));
    }

    #[test]
    fn status_change_is_guarded_by_current_status() {
        let mut c = channel(ChannelStatus::Closing);
        c.closing_transaction_hash = Some("aa".to_string());
        let change = StatusChange {
            from: ChannelStatus::Open,
            to: ChannelStatus::RemoteForceClosed,
            closing_transaction_hash: Some("bb".to_string()),
            closing_block_height: Some(800_000),
        };
        assert!(!c.apply_status_change(&change));
        assert_eq!(c.status, ChannelStatus::Closing);

        let change = StatusChange {
            from: ChannelStatus::Closing,
            ..change
        };
        assert!(c.apply_status_change(&change));
        assert_eq!(c.status, ChannelStatus::RemoteForceClosed);
        assert_eq!(c.closing_transaction_hash.as_deref(), Some("aa"));
        assert_eq!(c.closing_block_height, None);
    }
}
