//! Reconciliation of an account with the chain.
//!
//! A [SyncAccountTask] is a description of work: creating one does nothing.
//! Awaiting it scans both address chains of the account until `gap_limit`
//! consecutive addresses without history are seen past the last issued
//! pair, merges what the chain reports into the account's coins and
//! issues every pair up to the highest one in use.

use std::future::IntoFuture;
use std::sync::Arc;

use futures::future::BoxFuture;
use strum::IntoEnumIterator;
use tracing::debug;
use tracing::info;
use tracing::instrument;

use super::addresses::issue_pair;
use super::error::ServiceError;
use super::AccountService;
use super::Attached;
use crate::models::account::account_event::DomainEvent;
use crate::models::account::Account;
use crate::models::account::AccountShared;
use crate::models::account::AddressBook;
use crate::models::account::SyncStatus;
use crate::models::blockchain::coin::Coin;
use crate::models::blockchain::proxy::BlockchainProxy;
use crate::models::primitives::account_id::AccountId;
use crate::models::state::wallet::address_path::AddressPath;
use crate::models::state::wallet::address_path::Chain;
use crate::models::state::wallet::hd_node::HARDENED_BIT;
use crate::models::state::wallet::key_repository::KeyRepository;

#[derive(Debug, Clone)]
pub struct SyncAccountTask {
    account: Account,
    key_repository: Arc<dyn KeyRepository>,
    proxy: Arc<dyn BlockchainProxy>,
    gap_limit: u32,
}

impl SyncAccountTask {
    pub(super) fn new(
        account: Account,
        key_repository: Arc<dyn KeyRepository>,
        proxy: Arc<dyn BlockchainProxy>,
        gap_limit: u32,
    ) -> Self {
        Self {
            account,
            key_repository,
            proxy,
            gap_limit,
        }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Runs the reconciliation and returns the resulting snapshot.
    #[instrument(skip(self), fields(account = %self.account.id().short()))]
    pub async fn run(self) -> Result<Account, ServiceError> {
        let shared = self.account.shared();
        let mut book = shared.book.lock_guard().await;
        reconcile(
            &*self.key_repository,
            &*self.proxy,
            self.gap_limit,
            shared,
            &mut book,
        )
        .await?;
        Ok(shared.snapshot(&book).await)
    }
}

/// Reconciles an account restored from a stored key before it hands out
/// an address or spends, so pairs used by an earlier run are not issued
/// again.
///
/// Caller holds the account lock.
pub(super) async fn recover_if_restored(
    service: &AccountService<Attached>,
    shared: &AccountShared,
    book: &mut AddressBook,
) -> Result<(), ServiceError> {
    if !book.restored || book.sync_status == SyncStatus::Synced {
        return Ok(());
    }
    info!("recovering restored account {} before use", shared.id.short());
    reconcile(
        &*service.key_repository,
        &*service.state.proxy,
        service.config.gap_limit,
        shared,
        book,
    )
    .await
}

/// Caller holds the account lock.
async fn reconcile(
    key_repository: &dyn KeyRepository,
    proxy: &dyn BlockchainProxy,
    gap_limit: u32,
    shared: &AccountShared,
    book: &mut AddressBook,
) -> Result<(), ServiceError> {
    let scanner = Scanner {
        key_repository,
        proxy,
        gap_limit,
        account_id: shared.id,
    };
    let mut coins = Vec::new();
    let mut next_index = book.next_index;
    for chain in Chain::iter() {
        let (found, used_up_to) = scanner.scan(chain, book.next_index).await?;
        debug!(
            "{:?} chain: {} outputs, used up to {:?}",
            chain,
            found.len(),
            used_up_to
        );
        coins.extend(found);
        if let Some(used) = used_up_to {
            next_index = next_index.max(used + 1);
        }
    }

    // the watcher keeps applying feed events while we scan, so the view is
    // merged rather than swapped in
    for debit in shared.coin_manager.merge_coins(coins).await {
        info!("pending debit {} settled on chain", debit.txid);
    }

    for index in 0..next_index {
        issue_pair(key_repository, shared, book, Some(index)).await?;
    }
    book.sync_status = SyncStatus::Synced;

    let confirmed = shared.coin_manager.confirmed_balance().await;
    shared.events.emit(DomainEvent::Synced { confirmed });
    info!(
        "account {} synced: {} address pairs, confirmed balance {}",
        shared.id.short(),
        book.next_index,
        confirmed
    );
    Ok(())
}

struct Scanner<'a> {
    key_repository: &'a dyn KeyRepository,
    proxy: &'a dyn BlockchainProxy,
    gap_limit: u32,
    account_id: AccountId,
}

impl Scanner<'_> {
    /// Outputs of one chain and the highest index that has any.
    ///
    /// Every index below `issued` is scanned; past it, scanning stops after
    /// `gap_limit` unused addresses in a row.
    async fn scan(
        &self,
        chain: Chain,
        issued: u32,
    ) -> Result<(Vec<Coin>, Option<u32>), ServiceError> {
        let mut coins = Vec::new();
        let mut used_up_to = None;
        let mut gap = 0;
        let mut index = 0;

        while (index < issued || gap < self.gap_limit) && index < HARDENED_BIT {
            let path = AddressPath { chain, index };
            let address = self.key_repository.get_address(&self.account_id, &path).await?;
            let outputs = self.proxy.outputs_for_address(&address).await?;

            if outputs.is_empty() {
                gap += 1;
            } else {
                gap = 0;
                used_up_to = Some(index);
                coins.extend(outputs);
            }
            index += 1;
        }

        Ok((coins, used_up_to))
    }
}

impl IntoFuture for SyncAccountTask {
    type Output = Result<Account, ServiceError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.run())
    }
}
