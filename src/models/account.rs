//! The account entity: immutable snapshots over shared per-account state.

pub mod account_event;
pub mod event_channel;
pub mod pending_debit;
pub mod watcher;

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::broadcast;

use self::account_event::AccountEvent;
use self::event_channel::EventChannel;
use self::pending_debit::PendingDebit;
use self::watcher::AddressWatcher;
use crate::application::locks::tokio::AtomicMutex;
use crate::application::locks::tokio::LOG_LOCK_EVENT_CB;
use crate::coin_manager::CoinManager;
use crate::models::primitives::account_id::AccountId;
use crate::models::primitives::address::Address;
use crate::models::primitives::satoshi::Satoshi;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum::Display,
)]
#[non_exhaustive]
pub enum AccountType {
    #[default]
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
pub enum SyncStatus {
    /// no reconciliation with the chain has completed yet
    #[default]
    Unknown,
    Synced,
}

/// Issued addresses of one account. Guarded by the account lock, which
/// also serializes payments.
#[derive(Debug, Default)]
pub(crate) struct AddressBook {
    /// index of the next receive/change pair to issue
    pub(crate) next_index: u32,
    pub(crate) watching: Vec<Address>,
    pub(crate) sync_status: SyncStatus,
    /// key was found in the repository, so earlier runs may have issued
    /// addresses this book does not know about
    pub(crate) restored: bool,
}

/// State shared by every snapshot of one account.
#[derive(Debug)]
pub(crate) struct AccountShared {
    pub(crate) id: AccountId,
    pub(crate) hd_index: u32,
    pub(crate) account_type: AccountType,
    pub(crate) book: AtomicMutex<AddressBook>,
    pub(crate) coin_manager: CoinManager,
    pub(crate) events: EventChannel,
    pub(crate) watcher: AddressWatcher,
}

impl AccountShared {
    pub(crate) fn new(
        id: AccountId,
        hd_index: u32,
        restored: bool,
        coin_manager: CoinManager,
        events: EventChannel,
        watcher: AddressWatcher,
    ) -> Self {
        let lock_name = format!("Account-{}", id.short());
        Self {
            id,
            hd_index,
            account_type: AccountType::Normal,
            book: AtomicMutex::from((
                AddressBook {
                    restored,
                    ..AddressBook::default()
                },
                Some(lock_name),
                Some(LOG_LOCK_EVENT_CB),
            )),
            coin_manager,
            events,
            watcher,
        }
    }

    /// Snapshot from an already locked address book.
    pub(crate) async fn snapshot(self: &Arc<Self>, book: &AddressBook) -> Account {
        Account {
            id: self.id,
            hd_index: self.hd_index,
            account_type: self.account_type,
            watching_addresses: book.watching.clone(),
            next_address_index: book.next_index,
            confirmed_balance: self.coin_manager.confirmed_balance().await,
            pending_debits: self.coin_manager.pending_debits().await,
            sync_status: book.sync_status,
            shared: self.clone(),
        }
    }
}

/// An immutable view of an account at one point in time.
///
/// Operations on the account service return a new snapshot rather than
/// mutating the one passed in. Every snapshot of an account shares its
/// coin manager, event channel and address watcher; the watcher's tasks
/// stop when the last snapshot is dropped. Key material outlives all
/// snapshots in the key repository.
#[derive(Debug, Clone)]
pub struct Account {
    id: AccountId,
    hd_index: u32,
    account_type: AccountType,
    watching_addresses: Vec<Address>,
    next_address_index: u32,
    confirmed_balance: Satoshi,
    pending_debits: Vec<PendingDebit>,
    sync_status: SyncStatus,
    shared: Arc<AccountShared>,
}

impl Account {
    /// hash160 of the account node's public key
    pub fn id(&self) -> AccountId {
        self.id
    }

    /// hardened index of the account below the master key
    pub fn hd_index(&self) -> u32 {
        self.hd_index
    }

    pub fn account_type(&self) -> AccountType {
        self.account_type
    }

    /// Issued receive and change addresses, in issuance order.
    pub fn watching_addresses(&self) -> &[Address] {
        &self.watching_addresses
    }

    pub fn next_address_index(&self) -> u32 {
        self.next_address_index
    }

    pub fn confirmed_balance(&self) -> Satoshi {
        self.confirmed_balance
    }

    pub fn pending_debits(&self) -> &[PendingDebit] {
        &self.pending_debits
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    /// Confirmed balance less every pending debit and its fee.
    pub fn balance(&self) -> Satoshi {
        let pending: Satoshi = self.pending_debits.iter().map(|p| p.total()).sum();
        self.confirmed_balance.saturating_sub(pending)
    }

    pub fn coin_manager(&self) -> &CoinManager {
        &self.shared.coin_manager
    }

    /// Events emitted from now on for this account.
    pub fn subscribe(&self) -> broadcast::Receiver<AccountEvent> {
        self.shared.events.subscribe()
    }

    pub(crate) fn shared(&self) -> &Arc<AccountShared> {
        &self.shared
    }
}
