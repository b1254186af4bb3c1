// private module.  no need for module docs.
//
// a payment runs as a pipeline of stages:
//
//   validate -> select coins -> change address -> build -> record + broadcast
//
// validation touches nothing. every later stage runs under the account
// lock, so two payments from one account never pick the same coins.

use std::sync::Arc;

use tracing::error;
use tracing::info;
use tracing::Instrument;

use super::addresses::issue_pair;
use super::error::ServiceError;
use super::error::ValidationError;
use super::sync::recover_if_restored;
use super::AccountService;
use super::Attached;
use crate::application::config::network::Network;
use crate::coin_manager::destinations;
use crate::coin_manager::error::CoinError;
use crate::models::account::account_event::DomainEvent;
use crate::models::account::Account;
use crate::models::account::AccountShared;
use crate::models::blockchain::coin::Coin;
use crate::models::blockchain::transaction::Transaction;
use crate::models::blockchain::transaction::TransactionResult;
use crate::models::primitives::address::Address;
use crate::models::primitives::outer_entity::OuterEntity;
use crate::models::primitives::satoshi::Satoshi;

/// Validated payment request.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PaymentPlan {
    payees: Vec<(Address, Satoshi)>,
    total: Satoshi,
}

// see description in [AccountService]
pub(super) async fn pay(
    service: &AccountService<Attached>,
    account: &Account,
    amount: Satoshi,
    destinations: &[OuterEntity],
) -> Result<Account, ServiceError> {
    let plan = validate(service.config.network, amount, destinations)?;

    let shared = account.shared();
    let mut book = shared.book.lock_guard().await;
    recover_if_restored(service, shared, &mut book).await?;

    let (coins, fee) = select_coins(shared, &plan).await?;
    let (_, change_address) =
        issue_pair(&*service.key_repository, shared, &mut book, None).await?;
    let result = build(shared, &coins, &plan, &change_address).await?;

    let debit = shared.coin_manager.record_pending(&result, plan.total).await;
    info!(
        "account {} pays {} (fee {}) in {}",
        shared.id.short(),
        debit.amount,
        fee,
        debit.txid
    );
    let snapshot = shared.snapshot(&book).await;
    drop(book);

    spawn_broadcast(shared.clone(), result.tx, plan.total);
    Ok(snapshot)
}

/// Rejects anything but wallet users, collapses duplicate payees and sums
/// the debit.
fn validate(
    network: Network,
    amount: Satoshi,
    destinations: &[OuterEntity],
) -> Result<PaymentPlan, ServiceError> {
    if amount.is_zero() {
        return Err(ServiceError::from(CoinError::InvalidAmount));
    }
    if destinations.is_empty() {
        return Err(ServiceError::from(ValidationError::NoDestinations));
    }

    let mut payees = Vec::with_capacity(destinations.len());
    for destination in destinations {
        let OuterEntity::OtherUser(user) = destination else {
            let address = destination.address().clone();
            return Err(ValidationError::UnsupportedDestination(address).into());
        };
        let address = &user.next_address_to_pay;
        if address.hrp().as_deref() != Some(network.bech32_hrp()) {
            return Err(ValidationError::NetworkMismatch(address.clone()).into());
        }
        payees.push((address.clone(), amount));
    }

    let payees = destinations::normalize(&payees)?;
    let count = u64::try_from(payees.len())
        .map_err(|_| CoinError::BuildFailed("too many destinations".into()))?;
    let total = amount
        .checked_mul(count)
        .ok_or_else(|| CoinError::BuildFailed("payment amount overflow".into()))?;

    Ok(PaymentPlan { payees, total })
}

async fn select_coins(
    shared: &AccountShared,
    plan: &PaymentPlan,
) -> Result<(Vec<Coin>, Satoshi), ServiceError> {
    Ok(shared
        .coin_manager
        .pick_coins_for_payment(plan.total, plan.payees.len())
        .await?)
}

async fn build(
    shared: &AccountShared,
    coins: &[Coin],
    plan: &PaymentPlan,
    change_address: &Address,
) -> Result<TransactionResult, ServiceError> {
    Ok(shared
        .coin_manager
        .create_tx(&shared.id, coins, &plan.payees, change_address)
        .await?)
}

/// Submits the transaction in the background. The pending debit stays in
/// place whatever the outcome; failures are recorded on it and reported as
/// [DomainEvent::BroadcastFailed].
fn spawn_broadcast(shared: Arc<AccountShared>, tx: Transaction, amount: Satoshi) {
    let txid = tx.txid();
    let span = tracing::info_span!("broadcast", %txid);
    tokio::spawn(
        async move {
            let outcome = shared.coin_manager.broadcast(&tx).await;
            shared.coin_manager.settle_broadcast(&txid, &outcome).await;

            match outcome {
                Ok(()) => {
                    info!("transaction {} broadcast", txid);
                    shared.events.emit(DomainEvent::Debited { amount, txid });
                }
                Err(e) => {
                    error!("broadcast of {} failed: {}", txid, e);
                    shared.events.emit(DomainEvent::BroadcastFailed {
                        txid,
                        reason: e.to_string(),
                    });
                }
            }
        }
        .instrument(span),
    );
}
