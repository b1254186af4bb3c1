use std::collections::HashMap;

use async_trait::async_trait;
use secp256k1::SecretKey;
use tracing::debug;

use super::address_path::AddressPath;
use super::hd_node::HdNode;
use super::key_repository::AccountKeys;
use super::key_repository::KeyRepository;
use super::key_repository::RepositoryError;
use crate::application::config::network::Network;
use crate::application::locks::tokio::AtomicMutex;
use crate::application::locks::tokio::LOG_LOCK_EVENT_CB;
use crate::models::primitives::account_id::AccountId;
use crate::models::primitives::address::Address;

/// Volatile key repository. Keys live only as long as the process.
#[derive(Debug, Clone)]
pub struct InMemoryKeyRepository {
    network: Network,
    accounts: AtomicMutex<HashMap<AccountId, AccountKeys>>,
}

impl InMemoryKeyRepository {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            accounts: AtomicMutex::from((
                HashMap::new(),
                Some("InMemoryKeyRepository"),
                Some(LOG_LOCK_EVENT_CB),
            )),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }
}

#[async_trait]
impl KeyRepository for InMemoryKeyRepository {
    async fn get_address(
        &self,
        account_id: &AccountId,
        path: &AddressPath,
    ) -> Result<Address, RepositoryError> {
        let mut accounts = self.accounts.lock_guard().await;
        let keys = accounts
            .get_mut(account_id)
            .ok_or(RepositoryError::NotFound(*account_id))?;
        Ok(keys.address(path, self.network)?)
    }

    async fn set_hd_node(&self, account_id: &AccountId, node: HdNode) -> Result<(), RepositoryError> {
        let mut accounts = self.accounts.lock_guard().await;
        if accounts.contains_key(account_id) {
            return Err(RepositoryError::AlreadyExists(*account_id));
        }
        accounts.insert(*account_id, AccountKeys::new(node));
        debug!("stored key for account {}", account_id.short());
        Ok(())
    }

    async fn rotate_hd_node(
        &self,
        account_id: &AccountId,
        node: HdNode,
    ) -> Result<HdNode, RepositoryError> {
        let mut accounts = self.accounts.lock_guard().await;
        let keys = accounts
            .get_mut(account_id)
            .ok_or(RepositoryError::NotFound(*account_id))?;
        let previous = std::mem::replace(keys, AccountKeys::new(node));
        debug!("rotated key for account {}", account_id.short());
        Ok(previous.into_node())
    }

    async fn contains(&self, account_id: &AccountId) -> bool {
        self.accounts.lock(|a| a.contains_key(account_id)).await
    }

    async fn find_path(&self, account_id: &AccountId, address: &Address) -> Option<AddressPath> {
        self.accounts
            .lock(|a| a.get(account_id).and_then(|keys| keys.find_path(address)))
            .await
    }

    async fn signing_key(
        &self,
        account_id: &AccountId,
        path: &AddressPath,
    ) -> Result<SecretKey, RepositoryError> {
        let accounts = self.accounts.lock_guard().await;
        let keys = accounts
            .get(account_id)
            .ok_or(RepositoryError::NotFound(*account_id))?;
        Ok(keys.signing_key(path)?)
    }
}

#[cfg(test)]
mod tests {
    use secp256k1::PublicKey;

    use super::*;
    use crate::models::state::wallet::hd_node::secp;

    fn account_node(seed_byte: u8) -> (AccountId, HdNode) {
        let node = HdNode::from_seed(&[seed_byte; 32])
            .unwrap()
            .derive_hardened(0)
            .unwrap();
        (AccountId::from_public_key(&node.public_key()), node)
    }

    #[tokio::test]
    async fn addresses_are_deterministic_and_distinct() {
        let repo = InMemoryKeyRepository::new(Network::RegTest);
        let (id, node) = account_node(1);
        repo.set_hd_node(&id, node.clone()).await.unwrap();

        let first = repo.get_address(&id, &AddressPath::receive(0)).await.unwrap();
        let again = repo.get_address(&id, &AddressPath::receive(0)).await.unwrap();
        let change = repo.get_address(&id, &AddressPath::change(0)).await.unwrap();
        assert_eq!(first, again);
        assert_ne!(first, change);

        let expected = node
            .derive_path(&AddressPath::receive(0))
            .unwrap()
            .address(Network::RegTest)
            .unwrap();
        assert_eq!(expected, first);
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let repo = InMemoryKeyRepository::new(Network::RegTest);
        let (id, _) = account_node(2);
        assert_eq!(
            repo.get_address(&id, &AddressPath::receive(0)).await,
            Err(RepositoryError::NotFound(id))
        );
        assert!(!repo.contains(&id).await);
    }

    #[tokio::test]
    async fn overwrite_requires_rotation() {
        let repo = InMemoryKeyRepository::new(Network::RegTest);
        let (id, node) = account_node(3);
        let (_, other) = account_node(4);
        repo.set_hd_node(&id, node.clone()).await.unwrap();

        assert_eq!(
            repo.set_hd_node(&id, other.clone()).await,
            Err(RepositoryError::AlreadyExists(id))
        );
        let previous = repo.rotate_hd_node(&id, other.clone()).await.unwrap();
        assert_eq!(node, previous);

        let (unknown, _) = account_node(5);
        assert!(repo.rotate_hd_node(&unknown, other).await.is_err());
        assert!(!repo.contains(&unknown).await);
    }

    #[tokio::test]
    async fn rotation_forgets_addresses_of_the_previous_key() {
        let repo = InMemoryKeyRepository::new(Network::RegTest);
        let (id, node) = account_node(7);
        let (_, other) = account_node(8);
        repo.set_hd_node(&id, node).await.unwrap();

        let path = AddressPath::receive(0);
        let before = repo.get_address(&id, &path).await.unwrap();
        repo.rotate_hd_node(&id, other.clone()).await.unwrap();

        assert_eq!(None, repo.find_path(&id, &before).await);
        let after = repo.get_address(&id, &path).await.unwrap();
        assert_ne!(before, after);
        assert_eq!(
            after,
            other.derive_path(&path).unwrap().address(Network::RegTest).unwrap()
        );
        let secret = repo.signing_key(&id, &path).await.unwrap();
        assert!(!before.is_controlled_by(&PublicKey::from_secret_key(secp(), &secret)));
    }

    #[tokio::test]
    async fn signing_key_controls_handed_out_address() {
        let repo = InMemoryKeyRepository::new(Network::RegTest);
        let (id, node) = account_node(6);
        repo.set_hd_node(&id, node).await.unwrap();

        let path = AddressPath::change(3);
        let address = repo.get_address(&id, &path).await.unwrap();
        assert_eq!(Some(path), repo.find_path(&id, &address).await);

        let secret = repo.signing_key(&id, &path).await.unwrap();
        assert!(address.is_controlled_by(&PublicKey::from_secret_key(secp(), &secret)));
    }
}
