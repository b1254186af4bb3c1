//! Orchestrates accounts: creation from an HD root, address issuance,
//! payments and synchronization with the chain.
//!
//! The service is built in two phases. [AccountService::new] yields an
//! `AccountService<Detached>` that can do nothing but be attached; only
//! [AccountService::attach] with both a proxy and an event feed produces
//! the `AccountService<Attached>` that carries the operations. Use
//! [handle::AccountServiceHandle] when attachment has to happen later at
//! runtime.
mod addresses;
mod pay;

pub mod error;
pub mod handle;
pub mod sync;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Weak;

use tokio::sync::broadcast;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use self::error::ConfigError;
use self::error::ServiceError;
use self::error::ValidationError;
use self::sync::SyncAccountTask;
use crate::application::config::wallet_configuration::WalletConfiguration;
use crate::application::locks::tokio::AtomicMutex;
use crate::application::locks::tokio::LOG_LOCK_EVENT_CB;
use crate::coin_manager::error::CoinError;
use crate::coin_manager::CoinManager;
use crate::models::account::account_event::AccountEvent;
use crate::models::account::account_event::DomainEvent;
use crate::models::account::event_channel::EventChannel;
use crate::models::account::watcher::AddressWatcher;
use crate::models::account::Account;
use crate::models::account::AccountShared;
use crate::models::blockchain::coin::Txid;
use crate::models::blockchain::proxy::BlockchainProxy;
use crate::models::blockchain::proxy::ObservableBlockchain;
use crate::models::primitives::account_id::AccountId;
use crate::models::primitives::address::Address;
use crate::models::primitives::outer_entity::OuterEntity;
use crate::models::primitives::satoshi::Satoshi;
use crate::models::state::wallet::hd_node::HdNode;
use crate::models::state::wallet::key_repository::KeyRepository;
use crate::models::state::wallet::key_repository::RepositoryError;

/// No blockchain attached yet.
#[derive(Debug)]
pub struct Detached;

/// Blockchain infrastructure, always attached as a pair.
#[derive(Debug, Clone)]
pub struct Attached {
    proxy: Arc<dyn BlockchainProxy>,
    feed: Arc<dyn ObservableBlockchain>,
}

#[derive(Debug)]
pub struct AccountService<S> {
    config: WalletConfiguration,
    key_repository: Arc<dyn KeyRepository>,
    events: broadcast::Sender<AccountEvent>,
    accounts: AtomicMutex<HashMap<AccountId, Weak<AccountShared>>>,
    state: S,
}

impl AccountService<Detached> {
    pub fn new(
        key_repository: Arc<dyn KeyRepository>,
        config: WalletConfiguration,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_channel_capacity);

        Ok(Self {
            config,
            key_repository,
            events,
            accounts: AtomicMutex::from((
                HashMap::new(),
                Some("AccountService"),
                Some(LOG_LOCK_EVENT_CB),
            )),
            state: Detached,
        })
    }

    /// The only state transition: supplies the proxy and the event feed
    /// together.
    pub fn attach(
        self,
        proxy: Arc<dyn BlockchainProxy>,
        feed: Arc<dyn ObservableBlockchain>,
    ) -> AccountService<Attached> {
        self.attached_with(proxy, feed)
    }

    /// Attached service sharing this one's key repository, account registry
    /// and event channel.
    fn attached_with(
        &self,
        proxy: Arc<dyn BlockchainProxy>,
        feed: Arc<dyn ObservableBlockchain>,
    ) -> AccountService<Attached> {
        info!("attaching blockchain to account service");
        AccountService {
            config: self.config.clone(),
            key_repository: self.key_repository.clone(),
            events: self.events.clone(),
            accounts: self.accounts.clone(),
            state: Attached { proxy, feed },
        }
    }
}

impl<S> AccountService<S> {
    pub fn config(&self) -> &WalletConfiguration {
        &self.config
    }

    pub fn key_repository(&self) -> &Arc<dyn KeyRepository> {
        &self.key_repository
    }

    /// Events of every account of this service from now on. Ordering holds
    /// per account only.
    pub fn subscribe_events(&self) -> broadcast::Receiver<AccountEvent> {
        self.events.subscribe()
    }
}

// these methods just call a worker function in a submodule, so the public
// API is easy to read and digest.
impl AccountService<Attached> {
    /// Creates the account at hardened `index` below `master`.
    ///
    /// The account node is stored in the key repository; a node stored
    /// earlier (by a previous run) is reused. Recovery of the account's
    /// history runs in the background and is not awaited. A reused node is
    /// additionally reconciled before its first address or payment, even
    /// with background recovery turned off.
    #[instrument(skip(self, master))]
    pub async fn create_from_hd(
        &self,
        master: &HdNode,
        index: u32,
    ) -> Result<Account, ServiceError> {
        let node = master.derive_hardened(index)?;
        let id = AccountId::from_public_key(&node.public_key());

        let mut accounts = self.accounts.lock_guard().await;
        if let Some(shared) = accounts.get(&id).and_then(Weak::upgrade) {
            debug!("account {} is already live", id.short());
            let book = shared.book.lock_guard().await;
            return Ok(shared.snapshot(&book).await);
        }

        let restored = match self.key_repository.set_hd_node(&id, node).await {
            Ok(()) => false,
            Err(RepositoryError::AlreadyExists(_)) => {
                info!("restoring account {} from stored key", id.short());
                true
            }
            Err(e) => return Err(e.into()),
        };

        let coin_manager = CoinManager::new(
            id,
            self.key_repository.clone(),
            self.state.proxy.clone(),
            &self.config,
        );
        let events = EventChannel::new(
            id,
            self.config.event_channel_capacity,
            Some(self.events.clone()),
        );
        let watcher = AddressWatcher::new(coin_manager.clone(), self.state.feed.clone());
        let shared = Arc::new(AccountShared::new(
            id,
            index,
            restored,
            coin_manager,
            events,
            watcher,
        ));
        accounts.retain(|_, weak| weak.strong_count() > 0);
        accounts.insert(id, Arc::downgrade(&shared));
        drop(accounts);

        let account = {
            let book = shared.book.lock_guard().await;
            shared.events.emit(DomainEvent::AccountCreated { hd_index: index });
            shared.snapshot(&book).await
        };
        info!("created account {} at index {}", id, index);

        if self.config.recover_on_create {
            let task = self.get_sync_account_task(&account);
            tokio::spawn(async move {
                if let Err(e) = task.await {
                    warn!("background recovery of account {} failed: {}", id.short(), e);
                }
            });
        }

        Ok(account)
    }

    /// Issues the next receive/change pair, or the pair at `index`.
    ///
    /// Both addresses are watched on the chain and appended to the
    /// account's watch list. Asking for an index that was already issued
    /// returns the same pair and changes nothing.
    #[instrument(skip(self, account), fields(account = %account.id().short()))]
    pub async fn get_address_for_account(
        &self,
        account: &Account,
        index: Option<u32>,
    ) -> Result<(Account, Address, Address), ServiceError> {
        addresses::get_address_for_account(self, account, index).await
    }

    /// Pays `amount` to each destination.
    ///
    /// Only wallet users can be paid. The returned snapshot carries the
    /// pending debit (`amount` times the number of distinct destinations,
    /// plus fee); the broadcast continues in the background and its
    /// outcome is reported as a [DomainEvent].
    #[instrument(skip(self, account, destinations), fields(account = %account.id().short()))]
    pub async fn pay(
        &self,
        account: &Account,
        amount: Satoshi,
        destinations: &[OuterEntity],
    ) -> Result<Account, ServiceError> {
        pay::pay(self, account, amount, destinations).await
    }

    /// A reconciliation of `account` with the chain. Nothing happens until
    /// the task is awaited.
    pub fn get_sync_account_task(&self, account: &Account) -> SyncAccountTask {
        SyncAccountTask::new(
            account.clone(),
            self.key_repository.clone(),
            self.state.proxy.clone(),
            self.config.gap_limit,
        )
    }

    /// Latest snapshot of `account`.
    pub async fn refresh(&self, account: &Account) -> Account {
        let shared = account.shared();
        let book = shared.book.lock_guard().await;
        shared.snapshot(&book).await
    }

    /// Retries the broadcast of a failed pending debit and awaits it.
    #[instrument(skip(self, account), fields(account = %account.id().short()))]
    pub async fn rebroadcast(
        &self,
        account: &Account,
        txid: &Txid,
    ) -> Result<Account, ServiceError> {
        let shared = account.shared();
        match shared.coin_manager.rebroadcast(txid).await {
            Ok(debit) => {
                info!("rebroadcast of {} succeeded", txid);
                shared.events.emit(DomainEvent::Debited {
                    amount: debit.amount,
                    txid: *txid,
                });
            }
            Err(e @ (CoinError::BroadcastFailed(_) | CoinError::BroadcastTimeout(_))) => {
                shared.events.emit(DomainEvent::BroadcastFailed {
                    txid: *txid,
                    reason: e.to_string(),
                });
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        }
        Ok(self.refresh(account).await)
    }

    /// Reverts a failed pending debit, releasing the coins it reserved.
    #[instrument(skip(self, account), fields(account = %account.id().short()))]
    pub async fn abandon_pending(
        &self,
        account: &Account,
        txid: &Txid,
    ) -> Result<Account, ServiceError> {
        let shared = account.shared();
        let book = shared.book.lock_guard().await;
        let debit = shared.coin_manager.abandon(txid).await?;
        warn!("abandoned pending debit {} of {}", debit.txid, debit.amount);
        Ok(shared.snapshot(&book).await)
    }

    /// Stops watching `address` and drops it from the watch list.
    #[instrument(skip(self, account), fields(account = %account.id().short()))]
    pub async fn unwatch_address(
        &self,
        account: &Account,
        address: &Address,
    ) -> Result<Account, ServiceError> {
        let shared = account.shared();
        let mut book = shared.book.lock_guard().await;
        let position = book
            .watching
            .iter()
            .position(|a| a == address)
            .ok_or_else(|| ValidationError::NotWatched(address.clone()))?;
        book.watching.remove(position);
        shared.watcher.unwatch(address).await;
        Ok(shared.snapshot(&book).await)
    }
}
