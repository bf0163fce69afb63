//! Settings of the monitored node.

use serde::{Deserialize, Serialize};

/// Chain the node operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    #[default]
    Bitcoin,
    Litecoin,
}

/// Network the node operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
    Signet,
    Regtest,
    Simnet,
}

/// Identity of the monitored node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeSettings {
    #[serde(default)]
    pub chain: Chain,
    #[serde(default)]
    pub network: Network,
    /// Hex-encoded node public key.
    #[serde(default)]
    pub public_key: String,
}

impl NodeSettings {
    /// Only bitcoin mainnet channels can be verified externally.
    #[must_use]
    pub fn is_bitcoin_mainnet(&self) -> bool {
        self.chain == Chain::Bitcoin && self.network == Network::Mainnet
    }
}
