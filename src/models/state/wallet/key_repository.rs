use std::collections::HashMap;

use async_trait::async_trait;
use secp256k1::SecretKey;
use serde::Deserialize;
use serde::Serialize;

use super::address_path::AddressPath;
use super::hd_node::DerivationError;
use super::hd_node::HdNode;
use crate::application::config::network::Network;
use crate::models::primitives::account_id::AccountId;
use crate::models::primitives::address::Address;

/// enumerates possible key repository errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[non_exhaustive]
pub enum RepositoryError {
    #[error("no key stored for account {0}")]
    NotFound(AccountId),

    #[error("a key is already stored for account {0}")]
    AlreadyExists(AccountId),

    #[error(transparent)]
    Derivation(#[from] DerivationError),

    #[error("key storage failure: {0}")]
    Storage(String),
}

impl RepositoryError {
    pub(crate) fn storage(e: impl std::fmt::Display) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Owns the private key material of every account and hands out addresses.
///
/// The repository stores the account's own node (`master/index'`), so
/// addresses sit at `chain/index` below it. Derivation is deterministic:
/// the same account and path always yield the same address.
#[async_trait]
pub trait KeyRepository: Send + Sync + std::fmt::Debug {
    /// Address at `path` below the account node of `account_id`.
    async fn get_address(
        &self,
        account_id: &AccountId,
        path: &AddressPath,
    ) -> Result<Address, RepositoryError>;

    /// Stores the key of a new account.
    ///
    /// Overwriting an existing key is refused with
    /// [RepositoryError::AlreadyExists]; use
    /// [KeyRepository::rotate_hd_node] for that.
    async fn set_hd_node(&self, account_id: &AccountId, node: HdNode) -> Result<(), RepositoryError>;

    /// Replaces the stored key, returning the previous one.
    ///
    /// The address cache goes with the old key: addresses handed out
    /// before the rotation no longer resolve through
    /// [KeyRepository::find_path] and coins on them can no longer be
    /// signed for. A live account keeps the id of the old key, so it has
    /// to be dropped and created again from the new key's master.
    async fn rotate_hd_node(
        &self,
        account_id: &AccountId,
        node: HdNode,
    ) -> Result<HdNode, RepositoryError>;

    async fn contains(&self, account_id: &AccountId) -> bool;

    /// Reverse lookup of an address previously handed out by
    /// [KeyRepository::get_address].
    async fn find_path(&self, account_id: &AccountId, address: &Address) -> Option<AddressPath>;

    /// Private key controlling the address at `path`.
    async fn signing_key(
        &self,
        account_id: &AccountId,
        path: &AddressPath,
    ) -> Result<SecretKey, RepositoryError>;
}

/// Account node plus a cache of addresses derived from it.
#[derive(Debug, Clone)]
pub(crate) struct AccountKeys {
    node: HdNode,
    addresses: HashMap<AddressPath, Address>,
    paths: HashMap<Address, AddressPath>,
}

impl AccountKeys {
    pub(crate) fn new(node: HdNode) -> Self {
        Self {
            node,
            addresses: HashMap::new(),
            paths: HashMap::new(),
        }
    }

    pub(crate) fn node(&self) -> &HdNode {
        &self.node
    }

    pub(crate) fn into_node(self) -> HdNode {
        self.node
    }

    pub(crate) fn address(
        &mut self,
        path: &AddressPath,
        network: Network,
    ) -> Result<Address, DerivationError> {
        if let Some(address) = self.addresses.get(path) {
            return Ok(address.clone());
        }

        let address = self.node.derive_path(path)?.address(network)?;
        self.addresses.insert(*path, address.clone());
        self.paths.insert(address.clone(), *path);
        Ok(address)
    }

    pub(crate) fn find_path(&self, address: &Address) -> Option<AddressPath> {
        self.paths.get(address).copied()
    }

    pub(crate) fn signing_key(&self, path: &AddressPath) -> Result<SecretKey, DerivationError> {
        Ok(*self.node.derive_path(path)?.secret_key())
    }
}
