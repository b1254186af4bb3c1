// private module.  no need for module docs.

use tracing::debug;

use super::error::ServiceError;
use super::sync::recover_if_restored;
use super::AccountService;
use super::Attached;
use crate::models::account::account_event::DomainEvent;
use crate::models::account::Account;
use crate::models::account::AccountShared;
use crate::models::account::AddressBook;
use crate::models::primitives::address::Address;
use crate::models::state::wallet::address_path::AddressPath;
use crate::models::state::wallet::hd_node::DerivationError;
use crate::models::state::wallet::hd_node::HARDENED_BIT;
use crate::models::state::wallet::key_repository::KeyRepository;

// see description in [AccountService]
pub(super) async fn get_address_for_account(
    service: &AccountService<Attached>,
    account: &Account,
    index: Option<u32>,
) -> Result<(Account, Address, Address), ServiceError> {
    let shared = account.shared();
    let mut book = shared.book.lock_guard().await;
    recover_if_restored(service, shared, &mut book).await?;
    let (receive, change) =
        issue_pair(&*service.key_repository, shared, &mut book, index).await?;
    Ok((shared.snapshot(&book).await, receive, change))
}

/// Derives the receive/change pair at `index` (default: the next unissued
/// one), advances the counter past it and watches both addresses.
///
/// Caller holds the account lock.
pub(super) async fn issue_pair(
    key_repository: &dyn KeyRepository,
    shared: &AccountShared,
    book: &mut AddressBook,
    index: Option<u32>,
) -> Result<(Address, Address), ServiceError> {
    let index = index.unwrap_or(book.next_index);
    if index & HARDENED_BIT != 0 {
        return Err(DerivationError::InvalidChildNumber(index).into());
    }

    let receive = key_repository
        .get_address(&shared.id, &AddressPath::receive(index))
        .await?;
    let change = key_repository
        .get_address(&shared.id, &AddressPath::change(index))
        .await?;

    if index >= book.next_index {
        book.next_index = index + 1;
    }

    for address in [&receive, &change] {
        if book.watching.contains(address) {
            continue;
        }
        shared.watcher.watch(address).await;
        book.watching.push(address.clone());
        shared
            .events
            .emit(DomainEvent::WatchingAddressUpdated(address.clone()));
    }

    debug!("issued address pair {} for account {}", index, shared.id.short());
    Ok((receive, change))
}
