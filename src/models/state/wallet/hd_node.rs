use std::fmt;
use std::sync::OnceLock;

use bip39::Language;
use bip39::Mnemonic;
use bip39::Seed;
use bitcoin_hashes::hash160;
use bitcoin_hashes::Hash;
use hmac::Hmac;
use hmac::Mac;
use secp256k1::All;
use secp256k1::PublicKey;
use secp256k1::Scalar;
use secp256k1::Secp256k1;
use secp256k1::SecretKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha512;
use zeroize::Zeroize;

use super::address_path::AddressPath;
use crate::application::config::network::Network;
use crate::models::primitives::address::Address;
use crate::models::primitives::address::AddressError;

pub const HARDENED_BIT: u32 = 0x8000_0000;

const MASTER_HMAC_KEY: &[u8] = b"Bitcoin seed";
const MIN_SEED_LEN: usize = 16;
const MAX_SEED_LEN: usize = 64;

/// process-wide secp256k1 context, created on first use.
pub(crate) fn secp() -> &'static Secp256k1<All> {
    static SECP: OnceLock<Secp256k1<All>> = OnceLock::new();
    SECP.get_or_init(Secp256k1::new)
}

/// enumerates possible key-derivation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DerivationError {
    #[error("invalid derivation path: {0}")]
    InvalidPath(String),

    #[error("child index {0} is outside the non-hardened range")]
    InvalidChildNumber(u32),

    #[error("derived key is invalid for this index")]
    InvalidDerivedKey,

    #[error("seed must be between 16 and 64 bytes, got {0}")]
    InvalidSeedLength(usize),

    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error(transparent)]
    Address(#[from] AddressError),
}

/// A BIP32 extended private key.
#[derive(Clone, PartialEq, Eq)]
pub struct HdNode {
    secret_key: SecretKey,
    public_key: PublicKey,
    chain_code: [u8; 32],
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
}

impl fmt::Debug for HdNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HdNode")
            .field("identifier", &hex::encode(self.identifier()))
            .field("depth", &self.depth)
            .field("child_number", &self.child_number)
            .finish_non_exhaustive()
    }
}

impl HdNode {
    /// Creates a master node from a seed.
    pub fn from_seed(seed: &[u8]) -> Result<Self, DerivationError> {
        if !(MIN_SEED_LEN..=MAX_SEED_LEN).contains(&seed.len()) {
            return Err(DerivationError::InvalidSeedLength(seed.len()));
        }

        let (mut left, chain_code) = hmac_sha512(MASTER_HMAC_KEY, seed)?;
        let secret_key = SecretKey::from_slice(&left);
        left.zeroize();
        let secret_key = secret_key.map_err(|_| DerivationError::InvalidDerivedKey)?;

        Ok(Self {
            public_key: PublicKey::from_secret_key(secp(), &secret_key),
            secret_key,
            chain_code,
            depth: 0,
            parent_fingerprint: [0u8; 4],
            child_number: 0,
        })
    }

    /// Creates a master node from a BIP39 english phrase and optional
    /// passphrase.
    pub fn from_mnemonic(phrase: &str, passphrase: &str) -> Result<Self, DerivationError> {
        let mnemonic = Mnemonic::from_phrase(phrase, Language::English)
            .map_err(|e| DerivationError::InvalidMnemonic(e.to_string()))?;
        let seed = Seed::new(&mnemonic, passphrase);
        Self::from_seed(seed.as_bytes())
    }

    /// Derives the child at `index`. Indices with the top bit set are
    /// hardened.
    pub fn derive_child(&self, index: u32) -> Result<Self, DerivationError> {
        // 33 bytes of key material + 4 bytes of index
        let mut data = Vec::with_capacity(37);
        if index & HARDENED_BIT != 0 {
            data.push(0);
            data.extend_from_slice(&self.secret_key.secret_bytes());
        } else {
            data.extend_from_slice(&self.public_key.serialize());
        }
        data.extend_from_slice(&index.to_be_bytes());

        let hmac_result = hmac_sha512(&self.chain_code, &data);
        data.zeroize();
        let (mut left, chain_code) = hmac_result?;

        let tweak = SecretKey::from_slice(&left);
        left.zeroize();
        let tweak = tweak.map_err(|_| DerivationError::InvalidDerivedKey)?;
        let secret_key = self
            .secret_key
            .add_tweak(&Scalar::from(tweak))
            .map_err(|_| DerivationError::InvalidDerivedKey)?;

        Ok(Self {
            public_key: PublicKey::from_secret_key(secp(), &secret_key),
            secret_key,
            chain_code,
            depth: self.depth.saturating_add(1),
            parent_fingerprint: self.fingerprint(),
            child_number: index,
        })
    }

    /// Derives the hardened child `index'`.
    pub fn derive_hardened(&self, index: u32) -> Result<Self, DerivationError> {
        if index & HARDENED_BIT != 0 {
            return Err(DerivationError::InvalidChildNumber(index));
        }
        self.derive_child(index | HARDENED_BIT)
    }

    /// Derives `chain / index` below this node.
    pub fn derive_path(&self, path: &AddressPath) -> Result<Self, DerivationError> {
        if path.index & HARDENED_BIT != 0 {
            return Err(DerivationError::InvalidChildNumber(path.index));
        }
        self.derive_child(path.chain.index())?
            .derive_child(path.index)
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn child_number(&self) -> u32 {
        self.child_number
    }

    /// hash160 of the compressed public key
    pub fn identifier(&self) -> [u8; 20] {
        hash160::Hash::hash(&self.public_key.serialize()).to_byte_array()
    }

    /// first four bytes of the identifier
    pub fn fingerprint(&self) -> [u8; 4] {
        let mut fingerprint = [0u8; 4];
        fingerprint.copy_from_slice(&self.identifier()[..4]);
        fingerprint
    }

    /// P2WPKH address of this node's public key
    pub fn address(&self, network: Network) -> Result<Address, DerivationError> {
        Ok(Address::p2wpkh(&self.public_key, network)?)
    }

    pub fn to_key_material(&self) -> KeyMaterial {
        KeyMaterial {
            secret_key: hex::encode(self.secret_key.secret_bytes()),
            chain_code: hex::encode(self.chain_code),
            depth: self.depth,
            parent_fingerprint: hex::encode(self.parent_fingerprint),
            child_number: self.child_number,
        }
    }
}

impl TryFrom<&KeyMaterial> for HdNode {
    type Error = DerivationError;

    fn try_from(material: &KeyMaterial) -> Result<Self, Self::Error> {
        let invalid = |what: &str| DerivationError::InvalidKeyMaterial(what.to_string());

        let mut secret_bytes = hex::decode(&material.secret_key).map_err(|_| invalid("secret key"))?;
        let secret_key = SecretKey::from_slice(&secret_bytes);
        secret_bytes.zeroize();
        let secret_key = secret_key.map_err(|_| invalid("secret key"))?;

        let chain_code: [u8; 32] = hex::decode(&material.chain_code)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| invalid("chain code"))?;
        let parent_fingerprint: [u8; 4] = hex::decode(&material.parent_fingerprint)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| invalid("parent fingerprint"))?;

        Ok(Self {
            public_key: PublicKey::from_secret_key(secp(), &secret_key),
            secret_key,
            chain_code,
            depth: material.depth,
            parent_fingerprint,
            child_number: material.child_number,
        })
    }
}

/// Serializable form of an [HdNode], as written to durable storage.
///
/// The hex strings are wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMaterial {
    secret_key: String,
    chain_code: String,
    depth: u8,
    parent_fingerprint: String,
    child_number: u32,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("depth", &self.depth)
            .field("child_number", &self.child_number)
            .finish_non_exhaustive()
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.secret_key.zeroize();
        self.chain_code.zeroize();
    }
}

fn hmac_sha512(key: &[u8], data: &[u8]) -> Result<([u8; 32], [u8; 32]), DerivationError> {
    let mut mac = Hmac::<Sha512>::new_from_slice(key)
        .map_err(|e| DerivationError::InvalidKeyMaterial(e.to_string()))?;
    mac.update(data);
    let result = mac.finalize().into_bytes();

    let mut left = [0u8; 32];
    let mut right = [0u8; 32];
    left.copy_from_slice(&result[..32]);
    right.copy_from_slice(&result[32..]);
    Ok((left, right))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::state::wallet::address_path::Chain;

    // BIP32 test vector 1
    const SEED_1: &str = "000102030405060708090a0b0c0d0e0f";

    fn master() -> HdNode {
        HdNode::from_seed(&hex::decode(SEED_1).unwrap()).unwrap()
    }

    #[test]
    fn bip32_vector_1_master() {
        let m = master();
        assert_eq!(
            hex::encode(m.secret_key().secret_bytes()),
            "e8f32e723decf4051aefac8e2c93c9c5b214313817cdb01a1494b917c8436b35"
        );
        assert_eq!(
            hex::encode(m.chain_code()),
            "873dff81c02f525623fd1fe5167eac3a55a049de3d314bb42ee227ffed37d508"
        );
        assert_eq!(
            hex::encode(m.public_key().serialize()),
            "0339a36013301597daef41fbe593a02cc513d0b55527ec2df1050e2e8ff49c85c2"
        );
        assert_eq!(hex::encode(m.fingerprint()), "3442193e");
    }

    #[test]
    fn bip32_vector_1_children() {
        let m0h = master().derive_hardened(0).unwrap();
        assert_eq!(
            hex::encode(m0h.secret_key().secret_bytes()),
            "edb2e14f9ee77d26dd93b4ecede8d16ed408ce149b6cd80b0715a2d911a0afea"
        );
        assert_eq!(
            hex::encode(m0h.chain_code()),
            "47fdacbd0f1097043b78c63c20c34ef4ed9a111d980047ad16282c7ae6236141"
        );
        assert_eq!(m0h.depth(), 1);
        assert_eq!(m0h.child_number(), HARDENED_BIT);

        let m0h1 = m0h.derive_child(1).unwrap();
        assert_eq!(
            hex::encode(m0h1.secret_key().secret_bytes()),
            "3c6cb8d0f6a264c91ea8b5030fadaa8e538b020f0a387421a12de9319dc93368"
        );
        assert_eq!(
            hex::encode(m0h1.public_key().serialize()),
            "03501e454bf00751f24b1b489aa925215d66af2234e3891c3b21a52bedb3cd711c"
        );
    }

    #[test]
    fn derive_path_is_chain_then_index() {
        let account = master().derive_hardened(0).unwrap();
        let via_path = account
            .derive_path(&AddressPath {
                chain: Chain::Change,
                index: 7,
            })
            .unwrap();
        let by_hand = account.derive_child(1).unwrap().derive_child(7).unwrap();
        assert_eq!(via_path, by_hand);
    }

    #[test]
    fn hardened_index_is_rejected_where_plain_expected() {
        assert_eq!(
            master().derive_hardened(HARDENED_BIT),
            Err(DerivationError::InvalidChildNumber(HARDENED_BIT))
        );
        let path = AddressPath::receive(HARDENED_BIT + 1);
        assert!(master().derive_path(&path).is_err());
    }

    #[test]
    fn seed_length_is_checked() {
        assert_eq!(
            HdNode::from_seed(&[0u8; 8]),
            Err(DerivationError::InvalidSeedLength(8))
        );
        assert!(HdNode::from_seed(&[0u8; 65]).is_err());
    }

    #[test]
    fn key_material_round_trip() {
        let node = master().derive_hardened(3).unwrap();
        let material = node.to_key_material();
        let json = serde_json::to_string(&material).unwrap();
        let restored: KeyMaterial = serde_json::from_str(&json).unwrap();
        assert_eq!(node, HdNode::try_from(&restored).unwrap());
    }

    #[test]
    fn mnemonic_is_validated() {
        assert!(matches!(
            HdNode::from_mnemonic("definitely not a mnemonic", ""),
            Err(DerivationError::InvalidMnemonic(_))
        ));

        let phrase = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
        let plain = HdNode::from_mnemonic(phrase, "").unwrap();
        let salted = HdNode::from_mnemonic(phrase, "TREZOR").unwrap();
        assert_ne!(plain, salted);
    }
}
