//! Runtime counterpart of the typestate service.
//!
//! [AccountServiceHandle] holds the service in either state and attaches
//! it in place. Every account operation on a detached handle fails with
//! [ConfigError::BlockchainNotAttached] before anything is touched.

use std::sync::Arc;

use tokio::sync::broadcast;

use super::error::ConfigError;
use super::error::ServiceError;
use super::sync::SyncAccountTask;
use super::AccountService;
use super::Attached;
use super::Detached;
use crate::application::config::wallet_configuration::WalletConfiguration;
use crate::models::account::account_event::AccountEvent;
use crate::models::account::Account;
use crate::models::blockchain::coin::Txid;
use crate::models::blockchain::proxy::BlockchainProxy;
use crate::models::blockchain::proxy::ObservableBlockchain;
use crate::models::primitives::address::Address;
use crate::models::primitives::outer_entity::OuterEntity;
use crate::models::primitives::satoshi::Satoshi;
use crate::models::state::wallet::hd_node::HdNode;
use crate::models::state::wallet::key_repository::KeyRepository;

#[derive(Debug)]
enum HandleState {
    Detached(AccountService<Detached>),
    Attached(AccountService<Attached>),
}

#[derive(Debug)]
pub struct AccountServiceHandle {
    inner: HandleState,
}

impl AccountServiceHandle {
    pub fn new(
        key_repository: Arc<dyn KeyRepository>,
        config: WalletConfiguration,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            inner: HandleState::Detached(AccountService::new(key_repository, config)?),
        })
    }

    /// Attaches the blockchain. Fails if already attached.
    pub fn attach(
        &mut self,
        proxy: Arc<dyn BlockchainProxy>,
        feed: Arc<dyn ObservableBlockchain>,
    ) -> Result<(), ConfigError> {
        let HandleState::Detached(service) = &self.inner else {
            return Err(ConfigError::AlreadyAttached);
        };
        self.inner = HandleState::Attached(service.attached_with(proxy, feed));
        Ok(())
    }

    pub fn is_attached(&self) -> bool {
        matches!(self.inner, HandleState::Attached(_))
    }

    /// The attached service, for callers that want the typestate API.
    pub fn attached(&self) -> Result<&AccountService<Attached>, ConfigError> {
        match &self.inner {
            HandleState::Attached(service) => Ok(service),
            _ => Err(ConfigError::BlockchainNotAttached),
        }
    }

    pub fn config(&self) -> &WalletConfiguration {
        match &self.inner {
            HandleState::Detached(service) => service.config(),
            HandleState::Attached(service) => service.config(),
        }
    }

    /// Events of every account. A receiver taken before attaching keeps
    /// working afterwards.
    pub fn subscribe_events(&self) -> broadcast::Receiver<AccountEvent> {
        match &self.inner {
            HandleState::Detached(service) => service.subscribe_events(),
            HandleState::Attached(service) => service.subscribe_events(),
        }
    }

    pub async fn create_from_hd(
        &self,
        master: &HdNode,
        index: u32,
    ) -> Result<Account, ServiceError> {
        self.attached()?.create_from_hd(master, index).await
    }

    pub async fn get_address_for_account(
        &self,
        account: &Account,
        index: Option<u32>,
    ) -> Result<(Account, Address, Address), ServiceError> {
        self.attached()?.get_address_for_account(account, index).await
    }

    pub async fn pay(
        &self,
        account: &Account,
        amount: Satoshi,
        destinations: &[OuterEntity],
    ) -> Result<Account, ServiceError> {
        self.attached()?.pay(account, amount, destinations).await
    }

    pub fn get_sync_account_task(
        &self,
        account: &Account,
    ) -> Result<SyncAccountTask, ServiceError> {
        Ok(self.attached()?.get_sync_account_task(account))
    }

    pub async fn refresh(&self, account: &Account) -> Result<Account, ServiceError> {
        Ok(self.attached()?.refresh(account).await)
    }

    pub async fn rebroadcast(
        &self,
        account: &Account,
        txid: &Txid,
    ) -> Result<Account, ServiceError> {
        self.attached()?.rebroadcast(account, txid).await
    }

    pub async fn abandon_pending(
        &self,
        account: &Account,
        txid: &Txid,
    ) -> Result<Account, ServiceError> {
        self.attached()?.abandon_pending(account, txid).await
    }

    pub async fn unwatch_address(
        &self,
        account: &Account,
        address: &Address,
    ) -> Result<Account, ServiceError> {
        self.attached()?.unwatch_address(account, address).await
    }
}
