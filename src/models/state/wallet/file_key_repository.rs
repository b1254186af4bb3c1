use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use secp256k1::SecretKey;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;
use zeroize::Zeroizing;

use super::address_path::AddressPath;
use super::hd_node::HdNode;
use super::hd_node::KeyMaterial;
use super::key_repository::AccountKeys;
use super::key_repository::KeyRepository;
use super::key_repository::RepositoryError;
use crate::application::config::network::Network;
use crate::application::locks::tokio::AtomicMutex;
use crate::application::locks::tokio::LOG_LOCK_EVENT_CB;
use crate::models::primitives::account_id::AccountId;
use crate::models::primitives::address::Address;

const KEY_FILE_EXTENSION: &str = "json";

#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    account_id: AccountId,
    network: Network,
    key: KeyMaterial,
}

/// Key repository persisting one JSON file per account in a directory.
///
/// Files are written to a temporary sibling and renamed into place, so a
/// crash never leaves a half-written key behind. All keys are loaded into
/// memory by [FileKeyRepository::open].
#[derive(Debug, Clone)]
pub struct FileKeyRepository {
    dir: PathBuf,
    network: Network,
    accounts: AtomicMutex<HashMap<AccountId, AccountKeys>>,
}

impl FileKeyRepository {
    pub async fn open(dir: impl Into<PathBuf>, network: Network) -> Result<Self, RepositoryError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(RepositoryError::storage)?;

        let mut accounts = HashMap::new();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(RepositoryError::storage)?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(RepositoryError::storage)?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(KEY_FILE_EXTENSION) {
                continue;
            }

            let file = Self::read_key_file(&path).await?;
            if file.network != network {
                warn!(
                    "skipping key file {} for network {}, expected {}",
                    path.display(),
                    file.network,
                    network
                );
                continue;
            }

            let node = HdNode::try_from(&file.key)?;
            accounts.insert(file.account_id, AccountKeys::new(node));
        }

        info!("loaded {} account key(s) from {}", accounts.len(), dir.display());

        Ok(Self {
            dir,
            network,
            accounts: AtomicMutex::from((
                accounts,
                Some("FileKeyRepository"),
                Some(LOG_LOCK_EVENT_CB),
            )),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_file_path(&self, account_id: &AccountId) -> PathBuf {
        self.dir
            .join(format!("{}.{}", account_id, KEY_FILE_EXTENSION))
    }

    async fn read_key_file(path: &Path) -> Result<KeyFile, RepositoryError> {
        let bytes = Zeroizing::new(
            tokio::fs::read(path)
                .await
                .map_err(RepositoryError::storage)?,
        );
        serde_json::from_slice(&bytes).map_err(RepositoryError::storage)
    }

    async fn write_key_file(&self, account_id: &AccountId, node: &HdNode) -> Result<(), RepositoryError> {
        let file = KeyFile {
            account_id: *account_id,
            network: self.network,
            key: node.to_key_material(),
        };
        let bytes = Zeroizing::new(
            serde_json::to_vec_pretty(&file).map_err(RepositoryError::storage)?,
        );

        let path = self.key_file_path(account_id);
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, bytes.as_slice())
            .await
            .map_err(RepositoryError::storage)?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(RepositoryError::storage)?;

        debug!("wrote key file {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl KeyRepository for FileKeyRepository {
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
        // held across the write so two writers cannot race on one file
        let mut accounts = self.accounts.lock_guard().await;
        if accounts.contains_key(account_id) {
            return Err(RepositoryError::AlreadyExists(*account_id));
        }
        self.write_key_file(account_id, &node).await?;
        accounts.insert(*account_id, AccountKeys::new(node));
        Ok(())
    }

    async fn rotate_hd_node(
        &self,
        account_id: &AccountId,
        node: HdNode,
    ) -> Result<HdNode, RepositoryError> {
        let mut accounts = self.accounts.lock_guard().await;
        if !accounts.contains_key(account_id) {
            return Err(RepositoryError::NotFound(*account_id));
        }
        self.write_key_file(account_id, &node).await?;
        let previous = accounts
            .insert(*account_id, AccountKeys::new(node))
            .ok_or(RepositoryError::NotFound(*account_id))?;
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
