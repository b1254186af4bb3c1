use std::fmt;
use std::str::FromStr;

use bech32::FromBase32;
use bech32::ToBase32;
use bech32::Variant;
use bitcoin_hashes::hash160;
use bitcoin_hashes::Hash;
use secp256k1::PublicKey;
use serde::Deserialize;
use serde::Serialize;

use crate::application::config::network::Network;

const WITNESS_VERSION: u8 = 0;
const WITNESS_PROGRAM_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AddressError {
    #[error("bech32 encoding failed: {0}")]
    Encoding(String),

    #[error("not a version 0 witness-pubkey-hash address: {0}")]
    Unsupported(String),
}

/// A pay-to-witness-pubkey-hash address in its bech32 string form.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// encode the P2WPKH address of `public_key` for `network`.
    pub fn p2wpkh(public_key: &PublicKey, network: Network) -> Result<Self, AddressError> {
        Self::p2wpkh_with_hrp(public_key, network.bech32_hrp())
    }

    pub(crate) fn p2wpkh_with_hrp(public_key: &PublicKey, hrp: &str) -> Result<Self, AddressError> {
        let program = hash160::Hash::hash(&public_key.serialize()).to_byte_array();
        let version =
            bech32::u5::try_from_u8(WITNESS_VERSION).map_err(|e| AddressError::Encoding(e.to_string()))?;

        let mut data = vec![version];
        data.extend(program.to_base32());

        bech32::encode(hrp, data, Variant::Bech32)
            .map(Self)
            .map_err(|e| AddressError::Encoding(e.to_string()))
    }

    /// the human-readable part, which identifies the network.
    pub fn hrp(&self) -> Option<String> {
        bech32::decode(&self.0).ok().map(|(hrp, _, _)| hrp)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// true if `public_key` hashes to this address's witness program.
    pub fn is_controlled_by(&self, public_key: &PublicKey) -> bool {
        self.hrp()
            .and_then(|hrp| Self::p2wpkh_with_hrp(public_key, &hrp).ok())
            .is_some_and(|derived| &derived == self)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (_hrp, data, variant) =
            bech32::decode(s).map_err(|e| AddressError::Encoding(e.to_string()))?;

        let Some((version, program)) = data.split_first() else {
            return Err(AddressError::Unsupported(s.to_string()));
        };
        let program =
            Vec::<u8>::from_base32(program).map_err(|e| AddressError::Encoding(e.to_string()))?;

        if variant != Variant::Bech32
            || version.to_u8() != WITNESS_VERSION
            || program.len() != WITNESS_PROGRAM_LEN
        {
            return Err(AddressError::Unsupported(s.to_string()));
        }

        // bech32 accepts upper case input; addresses are compared as strings.
        Ok(Self(s.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use secp256k1::Secp256k1;
    use secp256k1::SecretKey;

    use super::*;

    fn generator_point() -> PublicKey {
        let mut one = [0u8; 32];
        one[31] = 1;
        let sk = SecretKey::from_slice(&one).unwrap();
        PublicKey::from_secret_key(&Secp256k1::new(), &sk)
    }

    #[test]
    fn bip173_vector() {
        let address = Address::p2wpkh(&generator_point(), Network::Main).unwrap();
        assert_eq!(
            address.as_str(),
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"
        );
        assert_eq!(address.hrp().as_deref(), Some("bc"));
        assert!(address.is_controlled_by(&generator_point()));
    }

    #[test]
    fn parse_accepts_p2wpkh_and_normalizes_case() {
        let parsed: Address = "BC1QW508D6QEJXTDG4Y5R3ZARVARY0C5XW7KV8F3T4".parse().unwrap();
        assert_eq!(
            parsed,
            Address::p2wpkh(&generator_point(), Network::Main).unwrap()
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("not-an-address".parse::<Address>().is_err());
        // valid bech32 checksum, but a 32-byte (script hash) program
        assert!(
            "bc1qrp33g0q5c5txsp9arysrx4k6zdkfs4nce4xj0gdcccefvpysxf3qccfmv3"
                .parse::<Address>()
                .is_err()
        );
    }

    #[test]
    fn network_changes_prefix() {
        let regtest = Address::p2wpkh(&generator_point(), Network::RegTest).unwrap();
        assert!(regtest.as_str().starts_with("bcrt1q"));
    }
}
