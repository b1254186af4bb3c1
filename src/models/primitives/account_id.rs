use std::fmt;
use std::str::FromStr;

use bitcoin_hashes::hash160;
use bitcoin_hashes::Hash;
use secp256k1::PublicKey;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

/// Identifies an account: the hash160 of the compressed public key of the
/// account's root node (`master / index'`).
///
/// Displayed and serialized as lower-case hex.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId([u8; 20]);

impl AccountId {
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Self(hash160::Hash::hash(&public_key.serialize()).to_byte_array())
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// first eight hex digits, for log lines and lock names
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self)
    }
}

impl FromStr for AccountId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| format!("invalid account id {s}: {e}"))?;
        let array: [u8; 20] = bytes
            .try_into()
            .map_err(|_| format!("account id {s} must be 20 bytes"))?;
        Ok(Self(array))
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
