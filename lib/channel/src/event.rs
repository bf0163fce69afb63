//! Channel lifecycle events as stored in the time series.

use crate::error::{ChannelPointError, IngestError};
use crate::lnd::ChannelEventUpdate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of lifecycle transition an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEventType {
    Open,
    Closed,
    Active,
    Inactive,
    FullyResolved,
    PendingOpen,
}

impl ChannelEventType {
    /// Returns the stored discriminant.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Open => 0,
            Self::Closed => 1,
            Self::Active => 2,
            Self::Inactive => 3,
            Self::FullyResolved => 4,
            Self::PendingOpen => 5,
        }
    }

    /// Parses a stored discriminant.
    #[must_use]
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Open),
            1 => Some(Self::Closed),
            2 => Some(Self::Active),
            3 => Some(Self::Inactive),
            4 => Some(Self::FullyResolved),
            5 => Some(Self::PendingOpen),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::FullyResolved => "fully_resolved",
            Self::PendingOpen => "pending_open",
        };
        write!(f, "{s}")
    }
}

/// One stored lifecycle event. Never updated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub time: DateTime<Utc>,
    pub event_type: ChannelEventType,
    /// True when the event was backfilled from a listing rather than streamed.
    pub imported: bool,
    /// Packed short channel id, when the event carries one.
    pub chan_id: Option<u64>,
    pub chan_point: String,
    pub pub_key: Option<String>,
    pub payload: serde_json::Value,
}

impl ChannelEvent {
    /// Builds the stored form of an update received at `time`.
    ///
    /// # Errors
    ///
    /// - `ChannelPoint` if a binary outpoint has the wrong length.
    /// - `Payload` if the update cannot be serialized.
    pub fn from_update(
        update: &ChannelEventUpdate,
        imported: bool,
        time: DateTime<Utc>,
    ) -> Result<Self, IngestError> {
        let (event_type, chan_id, chan_point, pub_key, payload) = match update {
            ChannelEventUpdate::Open(c) => (
                ChannelEventType::Open,
                Some(c.chan_id),
                c.channel_point.clone(),
                Some(c.remote_pubkey.clone()),
                serde_json::to_value(c),
            ),
            ChannelEventUpdate::Closed(c) => (
                ChannelEventType::Closed,
                Some(c.chan_id),
                c.channel_point.clone(),
                Some(c.remote_pubkey.clone()),
                serde_json::to_value(c),
            ),
            ChannelEventUpdate::Active(p) => (
                ChannelEventType::Active,
                None,
                canonical_channel_point(&p.funding_txid_bytes, p.output_index)?,
                None,
                serde_json::to_value(p),
            ),
            ChannelEventUpdate::Inactive(p) => (
                ChannelEventType::Inactive,
                None,
                canonical_channel_point(&p.funding_txid_bytes, p.output_index)?,
                None,
                serde_json::to_value(p),
            ),
            ChannelEventUpdate::FullyResolved(p) => (
                ChannelEventType::FullyResolved,
                None,
                canonical_channel_point(&p.funding_txid_bytes, p.output_index)?,
                None,
                serde_json::to_value(p),
            ),
            ChannelEventUpdate::PendingOpen(p) => (
                ChannelEventType::PendingOpen,
                None,
                canonical_channel_point(&p.txid, p.output_index)?,
                None,
                serde_json::to_value(p),
            ),
        };
        let payload = payload.map_err(|e| IngestError::Payload {
            details: e.to_string(),
        })?;
        Ok(Self {
            time,
            event_type,
            imported,
            chan_id,
            chan_point,
            pub_key,
            payload,
        })
    }
}

/// Renders a binary funding outpoint as `<txid>:<output>`.
///
/// The txid arrives in internal byte order and is displayed reversed, the
/// way block explorers show it.
///
/// # Errors
///
/// Returns `InvalidTxidLength` unless `txid` is 32 bytes.
pub fn canonical_channel_point(txid: &[u8], output_index: u32) -> Result<String, ChannelPointError> {
    if txid.len() != 32 {
        return Err(ChannelPointError::InvalidTxidLength { length: txid.len() });
    }
    let reversed: Vec<u8> = txid.iter().rev().copied().collect();
    Ok(format!("{}:{output_index}", hex::encode(reversed)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lnd::fake::{closed_channel, open_channel, txid};
    use crate::lnd::{ChannelPoint, PendingUpdate};
    use crate::channel::CloseType;

    #[test]
    fn channel_point_reverses_txid() {
        let mut bytes = vec![0u8; 32];
        bytes[0] = 0x01;
        bytes[31] = 0xff;
        let point = canonical_channel_point(&bytes, 7).expect("render");
        assert!(point.starts_with("ff"));
        assert!(point.ends_with("01:7"));
        assert_eq!(point.len(), 64 + 2);
    }

    #[test]
    fn channel_point_rejects_short_txid() {
        assert_eq!(
            canonical_channel_point(&[1, 2, 3], 0),
            Err(ChannelPointError::InvalidTxidLength { length: 3 })
        );
    }

    #[test]
    fn open_event_carries_id_and_peer() {
        let open = open_channel(42, "aa:0");
        let event = ChannelEvent::from_update(&ChannelEventUpdate::Open(open.clone()), false, Utc::now())
            .expect("event");
        assert_eq!(event.event_type, ChannelEventType::Open);
        assert_eq!(event.chan_id, Some(42));
        assert_eq!(event.chan_point, "aa:0");
        assert_eq!(event.pub_key.as_deref(), Some(open.remote_pubkey.as_str()));
        assert_eq!(event.payload["chanId"], 42);
        assert!(!event.imported);
    }

    #[test]
    fn closed_event_payload_keeps_close_type() {
        let closed = closed_channel(7, "bb:1", CloseType::Breach);
        let event =
            ChannelEvent::from_update(&ChannelEventUpdate::Closed(closed), true, Utc::now())
                .expect("event");
        assert_eq!(event.event_type, ChannelEventType::Closed);
        assert_eq!(event.payload["closeType"], "breach");
        assert!(event.imported);
    }

    #[test]
    fn outpoint_events_derive_channel_point() {
        let bytes = txid(1);
        let expected = canonical_channel_point(&bytes, 2).expect("render");
        for update in [
            ChannelEventUpdate::Active(ChannelPoint {
                funding_txid_bytes: bytes.clone(),
                output_index: 2,
            }),
            ChannelEventUpdate::Inactive(ChannelPoint {
                funding_txid_bytes: bytes.clone(),
                output_index: 2,
            }),
            ChannelEventUpdate::FullyResolved(ChannelPoint {
                funding_txid_bytes: bytes.clone(),
                output_index: 2,
            }),
            ChannelEventUpdate::PendingOpen(PendingUpdate {
                txid: bytes.clone(),
                output_index: 2,
            }),
        ] {
            let event = ChannelEvent::from_update(&update, false, Utc::now()).expect("event");
            assert_eq!(event.chan_point, expected);
            assert_eq!(event.chan_id, None);
            assert_eq!(event.pub_key, None);
        }
    }

    #[test]
    fn event_type_discriminants_roundtrip() {
        for t in [
            ChannelEventType::Open,
            ChannelEventType::Closed,
            ChannelEventType::Active,
            ChannelEventType::Inactive,
            ChannelEventType::FullyResolved,
            ChannelEventType::PendingOpen,
        ] {
            assert_eq!(ChannelEventType::from_i32(t.as_i32()), Some(t));
        }
        assert_eq!(ChannelEventType::from_i32(9), None);
    }
}
