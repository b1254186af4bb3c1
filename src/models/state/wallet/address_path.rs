use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use super::hd_node::DerivationError;
use super::hd_node::HARDENED_BIT;

/// The two non-hardened chains below an account node.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, strum::EnumIter,
)]
pub enum Chain {
    Receive,
    Change,
}

impl Chain {
    pub fn index(self) -> u32 {
        match self {
            Chain::Receive => 0,
            Chain::Change => 1,
        }
    }

    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(Chain::Receive),
            1 => Some(Chain::Change),
            _ => None,
        }
    }
}

/// Relative path `chain/index` from an account node to an address key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AddressPath {
    pub chain: Chain,
    pub index: u32,
}

impl AddressPath {
    pub fn receive(index: u32) -> Self {
        Self {
            chain: Chain::Receive,
            index,
        }
    }

    pub fn change(index: u32) -> Self {
        Self {
            chain: Chain::Change,
            index,
        }
    }
}

impl fmt::Display for AddressPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chain.index(), self.index)
    }
}

impl FromStr for AddressPath {
    type Err = DerivationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DerivationError::InvalidPath(s.to_string());

        let (chain, index) = s.split_once('/').ok_or_else(invalid)?;
        let chain = chain
            .parse::<u32>()
            .ok()
            .and_then(Chain::from_index)
            .ok_or_else(invalid)?;
        let index = index.parse::<u32>().map_err(|_| invalid())?;
        if index & HARDENED_BIT != 0 {
            return Err(DerivationError::InvalidChildNumber(index));
        }

        Ok(Self { chain, index })
    }
}
