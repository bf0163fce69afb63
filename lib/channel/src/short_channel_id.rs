//! Short channel id codec.
//!
//! The remote node packs a short channel id into a `u64`: bits `63..40`
//! hold the block height, `39..16` the transaction index within the block
//! and `15..0` the funding output index. Everywhere else the id is written
//! as `<block>x<tx>x<output>`.

use crate::error::ShortChannelIdError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest block height a short channel id can carry.
pub const MAX_BLOCK_HEIGHT: u32 = (1 << 24) - 1;

/// Largest transaction index a short channel id can carry.
pub const MAX_TX_INDEX: u32 = (1 << 24) - 1;

/// A channel's location in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShortChannelId {
    block_height: u32,
    tx_index: u32,
    output_index: u16,
}

impl ShortChannelId {
    /// Builds a short channel id from its components.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if the block height or transaction index does
    /// not fit in 24 bits.
    pub fn new(
        block_height: u32,
        tx_index: u32,
        output_index: u16,
    ) -> Result<Self, ShortChannelIdError> {
        if block_height > MAX_BLOCK_HEIGHT {
            return Err(ShortChannelIdError::OutOfRange {
                field: "block height",
                value: u64::from(block_height),
            });
        }
        if tx_index > MAX_TX_INDEX {
            return Err(ShortChannelIdError::OutOfRange {
                field: "tx index",
                value: u64::from(tx_index),
            });
        }
        Ok(Self {
            block_height,
            tx_index,
            output_index,
        })
    }

    /// Unpacks the remote node's integer encoding. Every `u64` is valid.
    #[must_use]
    pub fn from_lnd(packed: u64) -> Self {
        Self {
            block_height: (packed >> 40) as u32,
            tx_index: ((packed >> 16) & 0xFF_FFFF) as u32,
            output_index: packed as u16,
        }
    }

    /// Packs the id into the remote node's integer encoding.
    #[must_use]
    pub fn to_lnd(self) -> u64 {
        (u64::from(self.block_height) << 40)
            | (u64::from(self.tx_index) << 16)
            | u64::from(self.output_index)
    }

    #[must_use]
    pub fn block_height(self) -> u32 {
        self.block_height
    }

    #[must_use]
    pub fn tx_index(self) -> u32 {
        self.tx_index
    }

    #[must_use]
    pub fn output_index(self) -> u16 {
        self.output_index
    }
}

impl fmt::Display for ShortChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}x{}",
            self.block_height, self.tx_index, self.output_index
        )
    }
}

impl FromStr for ShortChannelId {
    type Err = ShortChannelIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ShortChannelIdError::Malformed {
            input: s.to_string(),
        };
        let mut parts = s.split('x');
        let (Some(block), Some(tx), Some(output), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };
        let block: u64 = block.parse().map_err(|_| malformed())?;
        let tx: u64 = tx.parse().map_err(|_| malformed())?;
        let output: u64 = output.parse().map_err(|_| malformed())?;

        let block_height = u32::try_from(block).map_err(|_| ShortChannelIdError::OutOfRange {
            field: "block height",
            value: block,
        })?;
        let tx_index = u32::try_from(tx).map_err(|_| ShortChannelIdError::OutOfRange {
            field: "tx index",
            value: tx,
        })?;
        let output_index =
            u16::try_from(output).map_err(|_| ShortChannelIdError::OutOfRange {
                field: "output index",
                value: output,
            })?;
        Self::new(block_height, tx_index, output_index)
    }
}

impl TryFrom<String> for ShortChannelId {
    type Error = ShortChannelIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ShortChannelId> for String {
    fn from(id: ShortChannelId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_channel_decodes() {
        let id = ShortChannelId::from_lnd(555_891_088_896_622_593);
        assert_eq!(id.to_string(), "505580x1917x1");
        assert_eq!(id.block_height(), 505_580);
        assert_eq!(id.tx_index(), 1917);
        assert_eq!(id.output_index(), 1);
    }

    #[test]
    fn known_channel_encodes() {
        let id: ShortChannelId = "505580x1917x1".parse().expect("parse");
        assert_eq!(id.to_lnd(), 555_891_088_896_622_593);
    }

    #[test]
    fn field_boundaries_survive_packing() {
        for (block, tx, output) in [
            (0, 0, 0),
            (MAX_BLOCK_HEIGHT, MAX_TX_INDEX, u16::MAX),
            (MAX_BLOCK_HEIGHT, 0, 0),
            (0, MAX_TX_INDEX, 0),
            (0, 0, u16::MAX),
        ] {
            let id = ShortChannelId::new(block, tx, output).expect("in range");
            let back = ShortChannelId::from_lnd(id.to_lnd());
            assert_eq!(back, id);
            assert_eq!(back.to_string().parse::<ShortChannelId>().expect("parse"), id);
        }
        assert_eq!(
            ShortChannelId::new(MAX_BLOCK_HEIGHT, MAX_TX_INDEX, u16::MAX)
                .expect("max")
                .to_lnd(),
            u64::MAX
        );
    }

    #[test]
    fn out_of_range_components_are_rejected() {
        assert!(matches!(
            ShortChannelId::new(MAX_BLOCK_HEIGHT + 1, 0, 0),
            Err(ShortChannelIdError::OutOfRange {
                field: "block height",
                ..
            })
        ));
        assert!(matches!(
            "1x16777216x0".parse::<ShortChannelId>(),
            Err(ShortChannelIdError::OutOfRange {
                field: "tx index",
                ..
            })
        ));
        assert!(matches!(
            "1x1x65536".parse::<ShortChannelId>(),
            Err(ShortChannelIdError::OutOfRange {
                field: "output index",
                ..
            })
        ));
    }

    #[test]
    fn malformed_text_is_rejected() {
        for input in ["", "1x2", "1x2x3x4", "axbxc", "1:2:3", "-1x2x3"] {
            assert!(
                matches!(
                    input.parse::<ShortChannelId>(),
                    Err(ShortChannelIdError::Malformed { .. })
                ),
                "{input} should be malformed"
            );
        }
    }

    #[test]
    fn serializes_as_text() {
        let id = ShortChannelId::new(505_580, 1917, 1).expect("id");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"505580x1917x1\"");
        let back: ShortChannelId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }
}
