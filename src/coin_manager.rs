//! Per-account coin bookkeeping, coin selection, transaction building and
//! broadcast.

pub mod destinations;
pub mod error;
pub mod fee_policy;
pub mod input_selector;
pub(crate) mod ledger;

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use tracing::warn;

use self::error::CoinError;
use self::fee_policy::FeePolicy;
use self::input_selector::InputSelectionPolicy;
use self::input_selector::InputSelector;
use self::ledger::CoinLedger;
use self::ledger::PendingSpend;
use crate::application::config::wallet_configuration::WalletConfiguration;
use crate::application::locks::tokio::AtomicMutex;
use crate::application::locks::tokio::LOG_LOCK_EVENT_CB;
use crate::models::account::pending_debit::BroadcastStatus;
use crate::models::account::pending_debit::PendingDebit;
use crate::models::blockchain::coin::Coin;
use crate::models::blockchain::coin::Txid;
use crate::models::blockchain::proxy::BlockchainProxy;
use crate::models::blockchain::proxy::ChainEvent;
use crate::models::blockchain::transaction::Transaction;
use crate::models::blockchain::transaction::TransactionResult;
use crate::models::blockchain::transaction::TxOutput;
use crate::models::blockchain::transaction::UnsignedInput;
use crate::models::blockchain::transaction::UnsignedTransaction;
use crate::models::primitives::account_id::AccountId;
use crate::models::primitives::address::Address;
use crate::models::primitives::satoshi::Satoshi;
use crate::models::state::wallet::key_repository::KeyRepository;

/// Authoritative in-memory view of one account's coins.
///
/// Clones share the same ledger.
#[derive(Debug, Clone)]
pub struct CoinManager {
    account_id: AccountId,
    key_repository: Arc<dyn KeyRepository>,
    proxy: Arc<dyn BlockchainProxy>,
    fee_policy: FeePolicy,
    selection_policy: InputSelectionPolicy,
    broadcast_timeout: Duration,
    ledger: AtomicMutex<CoinLedger>,
}

impl CoinManager {
    pub fn new(
        account_id: AccountId,
        key_repository: Arc<dyn KeyRepository>,
        proxy: Arc<dyn BlockchainProxy>,
        config: &WalletConfiguration,
    ) -> Self {
        let lock_name = format!("CoinLedger-{}", account_id.short());
        Self {
            account_id,
            key_repository,
            proxy,
            fee_policy: config.fee_policy,
            selection_policy: config.selection_policy,
            broadcast_timeout: config.broadcast_timeout,
            ledger: AtomicMutex::from((
                CoinLedger::default(),
                Some(lock_name),
                Some(LOG_LOCK_EVENT_CB),
            )),
        }
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn fee_policy(&self) -> FeePolicy {
        self.fee_policy
    }

    /// every known coin, whatever its status
    pub async fn coins(&self) -> Vec<Coin> {
        self.ledger.lock(|l| l.coins()).await
    }

    /// Confirmed coins not reserved by a pending spend.
    pub async fn spendable_coins(&self) -> Vec<Coin> {
        self.ledger.lock(|l| l.spendable()).await
    }

    pub async fn confirmed_balance(&self) -> Satoshi {
        self.ledger.lock(|l| l.confirmed_balance()).await
    }

    pub async fn pending_debits(&self) -> Vec<PendingDebit> {
        self.ledger.lock(|l| l.pending_debits()).await
    }

    pub async fn pending_transaction(&self, txid: &Txid) -> Option<Transaction> {
        self.ledger
            .lock(|l| l.pending(txid).map(|p| p.tx.clone()))
            .await
    }

    /// Spendable coins whose total covers `amount`, chosen by the
    /// configured [InputSelectionPolicy].
    pub async fn pick_coins_for_amount(&self, amount: Satoshi) -> Result<Vec<Coin>, CoinError> {
        if amount.is_zero() {
            return Err(CoinError::InvalidAmount);
        }

        InputSelector::new()
            .spendable_coins(self.spendable_coins().await)
            .policy(self.selection_policy)
            .target(amount)
            .select()
    }

    /// Coins covering `amount` plus the fee of a transaction spending
    /// them to `num_destinations` outputs and one change output.
    ///
    /// The fee can depend on the number of inputs, so selection is repeated
    /// with a raised target until the chosen set pays for itself.
    pub async fn pick_coins_for_payment(
        &self,
        amount: Satoshi,
        num_destinations: usize,
    ) -> Result<(Vec<Coin>, Satoshi), CoinError> {
        let mut target = amount;
        loop {
            let coins = self.pick_coins_for_amount(target).await?;
            let fee = self
                .fee_policy
                .fee(coins.len(), num_destinations + 1)
                .ok_or_else(|| CoinError::BuildFailed("fee overflow".into()))?;
            let needed = amount
                .checked_add(fee)
                .ok_or_else(|| CoinError::BuildFailed("payment amount overflow".into()))?;

            let selected: Satoshi = coins.iter().map(|c| c.value).sum();
            if selected >= needed {
                return Ok((coins, fee));
            }
            debug!("{} does not cover {} plus fee {}, reselecting", selected, amount, fee);
            target = needed;
        }
    }

    /// Builds and signs a transaction spending exactly `coins`.
    ///
    /// Each destination receives its amount, the remainder after the fee
    /// goes to `change_address`. No change output is created when nothing
    /// remains.
    pub async fn create_tx(
        &self,
        account_id: &AccountId,
        coins: &[Coin],
        destinations: &[(Address, Satoshi)],
        change_address: &Address,
    ) -> Result<TransactionResult, CoinError> {
        let destinations = destinations::normalize(destinations)?;
        if coins.is_empty() {
            return Err(CoinError::BuildFailed("no coins to spend".into()));
        }
        if destinations.iter().any(|(a, _)| a == change_address) {
            return Err(CoinError::BuildFailed(
                "change address is also a destination".into(),
            ));
        }

        let fee = self
            .fee_policy
            .fee(coins.len(), destinations.len() + 1)
            .ok_or_else(|| CoinError::BuildFailed("fee overflow".into()))?;
        let input_total: Satoshi = coins.iter().map(|c| c.value).sum();
        let requested = destinations
            .iter()
            .try_fold(fee, |acc, (_, amount)| acc.checked_add(*amount))
            .ok_or_else(|| CoinError::BuildFailed("payment amount overflow".into()))?;
        let change = input_total
            .checked_sub(requested)
            .ok_or(CoinError::InsufficientFunds {
                requested,
                available: input_total,
            })?;

        let mut outputs = destinations
            .into_iter()
            .map(|(address, value)| TxOutput { address, value })
            .collect::<Vec<_>>();
        if !change.is_zero() {
            outputs.push(TxOutput {
                address: change_address.clone(),
                value: change,
            });
        }

        let mut keys = Vec::with_capacity(coins.len());
        for coin in coins {
            let path = self
                .key_repository
                .find_path(account_id, &coin.address)
                .await
                .ok_or_else(|| {
                    CoinError::BuildFailed(format!("no key known for address {}", coin.address))
                })?;
            keys.push(self.key_repository.signing_key(account_id, &path).await?);
        }

        let unsigned = UnsignedTransaction {
            inputs: coins
                .iter()
                .map(|c| UnsignedInput {
                    previous_output: c.outpoint,
                    value: c.value,
                    address: c.address.clone(),
                })
                .collect(),
            outputs,
            fee,
        };
        let tx = unsigned.sign(&keys)?;

        debug!(
            "built transaction {} spending {} input(s), fee {}",
            tx.txid(),
            coins.len(),
            fee
        );
        Ok(TransactionResult {
            tx,
            change_address: change_address.clone(),
        })
    }

    /// Submits `tx` through the proxy, giving up after the configured
    /// broadcast timeout.
    pub async fn broadcast(&self, tx: &Transaction) -> Result<(), CoinError> {
        match tokio::time::timeout(self.broadcast_timeout, self.proxy.submit_transaction(tx)).await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(CoinError::BroadcastFailed(e.to_string())),
            Err(_) => Err(CoinError::BroadcastTimeout(self.broadcast_timeout)),
        }
    }

    /// Records the optimistic debit of a built transaction. Its inputs stay
    /// reserved until the chain resolves it.
    pub async fn record_pending(&self, result: &TransactionResult, amount: Satoshi) -> PendingDebit {
        let debit = PendingDebit {
            txid: result.tx.txid(),
            amount,
            fee: result.tx.fee(),
            status: BroadcastStatus::InFlight,
        };
        let spend = PendingSpend {
            tx: result.tx.clone(),
            debit: debit.clone(),
        };
        self.ledger.lock_mut(|l| l.record(spend)).await;
        debit
    }

    /// Stores the outcome of a broadcast on its pending debit.
    pub async fn settle_broadcast(
        &self,
        txid: &Txid,
        outcome: &Result<(), CoinError>,
    ) -> Option<PendingDebit> {
        let status = match outcome {
            Ok(()) => BroadcastStatus::Broadcast,
            Err(e) => BroadcastStatus::Failed {
                reason: e.to_string(),
            },
        };
        self.ledger.lock_mut(|l| l.set_status(txid, status)).await
    }

    /// Retries the broadcast of a failed pending transaction and waits for
    /// the outcome.
    pub async fn rebroadcast(&self, txid: &Txid) -> Result<PendingDebit, CoinError> {
        let tx = self
            .ledger
            .lock_mut(|l| {
                let pending = l
                    .pending(txid)
                    .ok_or(CoinError::UnknownPendingTransaction(*txid))?;
                if !pending.debit.status.is_failed() {
                    return Err(CoinError::PendingNotFailed(*txid));
                }
                let tx = pending.tx.clone();
                l.set_status(txid, BroadcastStatus::InFlight);
                Ok(tx)
            })
            .await?;

        let outcome = self.broadcast(&tx).await;
        if let Err(e) = &outcome {
            warn!("rebroadcast of {} failed: {}", txid, e);
        }
        let debit = self.settle_broadcast(txid, &outcome).await;
        outcome?;
        debit.ok_or(CoinError::UnknownPendingTransaction(*txid))
    }

    /// Drops a failed pending debit and releases its coins.
    pub async fn abandon(&self, txid: &Txid) -> Result<PendingDebit, CoinError> {
        self.ledger.lock_mut(|l| l.abandon(txid)).await
    }

    /// Returns the pending debits the event resolved.
    pub async fn apply_chain_event(&self, event: ChainEvent) -> Vec<PendingDebit> {
        self.ledger.lock_mut(|l| l.apply(event)).await
    }

    /// Merges a view fetched from the chain into the ledger. Returns the
    /// pending debits it resolved.
    pub async fn merge_coins(&self, coins: Vec<Coin>) -> Vec<PendingDebit> {
        self.ledger.lock_mut(|l| l.merge(coins)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::blockchain::coin::CoinStatus;
    use crate::models::blockchain::regtest::SubmitBehavior;
    use crate::tests::shared::coin_with_value;
    use crate::tests::shared::funded_coin_manager;
    use crate::tests::shared::funded_coin_manager_with_config;
    use crate::tests::shared::regtest_address;

    #[tokio::test]
    async fn zero_amount_is_invalid() {
        let (manager, _, _) = funded_coin_manager(&[100], FeePolicy::Fixed(Satoshi::new(1))).await;
        assert_eq!(
            manager.pick_coins_for_amount(Satoshi::ZERO).await,
            Err(CoinError::InvalidAmount)
        );
    }

    #[tokio::test]
    async fn selection_boundary() {
        let (manager, _, _) =
            funded_coin_manager(&[30, 70], FeePolicy::Fixed(Satoshi::new(1))).await;
        let all = manager.pick_coins_for_amount(Satoshi::new(100)).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(
            manager.pick_coins_for_amount(Satoshi::new(101)).await,
            Err(CoinError::InsufficientFunds {
                requested: Satoshi::new(101),
                available: Satoshi::new(100),
            })
        );
    }

    #[tokio::test]
    async fn payment_selection_covers_input_dependent_fee() {
        let policy = FeePolicy::Linear {
            base: Satoshi::ZERO,
            per_input: Satoshi::new(10),
            per_output: Satoshi::ZERO,
        };
        let (manager, _, _) = funded_coin_manager(&[50, 50, 50], policy).await;

        // 50 + 50 covers 95 but not 95 + 20
        let (coins, fee) = manager
            .pick_coins_for_payment(Satoshi::new(95), 1)
            .await
            .unwrap();
        assert_eq!(coins.len(), 3);
        assert_eq!(fee, Satoshi::new(30));
    }

    #[tokio::test]
    async fn create_tx_balances_and_pays_change() {
        let (manager, _, change) = funded_coin_manager(&[100], FeePolicy::Fixed(Satoshi::new(1))).await;
        let coins = manager.pick_coins_for_amount(Satoshi::new(60)).await.unwrap();
        let to = regtest_address(42);

        let result = manager
            .create_tx(&manager.account_id(), &coins, &[(to.clone(), Satoshi::new(60))], &change)
            .await
            .unwrap();

        let tx = &result.tx;
        assert_eq!(tx.input_total(), tx.output_total().checked_add(tx.fee()).unwrap());
        assert_eq!(tx.output_to(&to).unwrap().1.value, Satoshi::new(60));
        assert_eq!(result.change_address, change);
        assert_eq!(result.change(), Satoshi::new(39));
        assert!(tx.verify_signatures().is_ok());
    }

    #[tokio::test]
    async fn exact_spend_has_no_change_output() {
        let (manager, _, change) = funded_coin_manager(&[61], FeePolicy::Fixed(Satoshi::new(1))).await;
        let coins = manager.spendable_coins().await;
        let result = manager
            .create_tx(
                &manager.account_id(),
                &coins,
                &[(regtest_address(42), Satoshi::new(60))],
                &change,
            )
            .await
            .unwrap();
        assert_eq!(result.tx.outputs().len(), 1);
        assert_eq!(result.change(), Satoshi::ZERO);
    }

    #[tokio::test]
    async fn create_tx_rejects_overspend_and_bad_destinations() {
        let (manager, _, change) = funded_coin_manager(&[100], FeePolicy::Fixed(Satoshi::new(1))).await;
        let coins = manager.spendable_coins().await;
        let id = manager.account_id();

        assert_eq!(
            manager
                .create_tx(&id, &coins, &[(regtest_address(1), Satoshi::new(100))], &change)
                .await,
            Err(CoinError::InsufficientFunds {
                requested: Satoshi::new(101),
                available: Satoshi::new(100),
            })
        );
        assert!(matches!(
            manager.create_tx(&id, &coins, &[], &change).await,
            Err(CoinError::BuildFailed(_))
        ));
        assert!(matches!(
            manager
                .create_tx(&id, &coins, &[(change.clone(), Satoshi::new(5))], &change)
                .await,
            Err(CoinError::BuildFailed(_))
        ));
    }

    #[tokio::test]
    async fn pending_spend_reserves_coins_until_resolved() {
        let (manager, chain, change) =
            funded_coin_manager(&[100], FeePolicy::Fixed(Satoshi::new(1))).await;
        let coins = manager.pick_coins_for_amount(Satoshi::new(60)).await.unwrap();
        let result = manager
            .create_tx(
                &manager.account_id(),
                &coins,
                &[(regtest_address(42), Satoshi::new(60))],
                &change,
            )
            .await
            .unwrap();
        let debit = manager.record_pending(&result, Satoshi::new(60)).await;
        assert_eq!(debit.status, BroadcastStatus::InFlight);
        assert!(manager.spendable_coins().await.is_empty());
        assert_eq!(manager.confirmed_balance().await, Satoshi::new(100));

        manager.broadcast(&result.tx).await.unwrap();
        let settled = manager.settle_broadcast(&debit.txid, &Ok(())).await.unwrap();
        assert_eq!(settled.status, BroadcastStatus::Broadcast);

        let resolved = manager
            .apply_chain_event(ChainEvent::Spent(coins[0].outpoint))
            .await;
        assert_eq!(resolved.len(), 1);
        assert!(manager.pending_debits().await.is_empty());
        assert_eq!(manager.confirmed_balance().await, Satoshi::ZERO);
        assert_eq!(
            chain.coin(&coins[0].outpoint).await.unwrap().status,
            CoinStatus::Spent
        );
    }

    #[tokio::test]
    async fn failed_broadcast_can_be_retried_or_abandoned() {
        let (manager, chain, change) =
            funded_coin_manager(&[100], FeePolicy::Fixed(Satoshi::new(1))).await;
        let coins = manager.spendable_coins().await;
        let result = manager
            .create_tx(
                &manager.account_id(),
                &coins,
                &[(regtest_address(42), Satoshi::new(60))],
                &change,
            )
            .await
            .unwrap();
        let txid = result.tx.txid();
        manager.record_pending(&result, Satoshi::new(60)).await;

        assert_eq!(manager.abandon(&txid).await, Err(CoinError::PendingNotFailed(txid)));

        chain
            .set_submit_behavior(SubmitBehavior::Reject("no".into()))
            .await;
        let outcome = manager.broadcast(&result.tx).await;
        assert!(matches!(outcome, Err(CoinError::BroadcastFailed(_))));
        let failed = manager.settle_broadcast(&txid, &outcome).await.unwrap();
        assert!(failed.status.is_failed());

        // retry still rejected, debit stays failed
        assert!(manager.rebroadcast(&txid).await.is_err());
        assert!(manager.pending_debits().await[0].status.is_failed());

        chain.set_submit_behavior(SubmitBehavior::Accept).await;
        let retried = manager.rebroadcast(&txid).await.unwrap();
        assert_eq!(retried.status, BroadcastStatus::Broadcast);
        assert_eq!(manager.rebroadcast(&txid).await, Err(CoinError::PendingNotFailed(txid)));
    }

    #[tokio::test]
    async fn abandon_releases_reservation() {
        let (manager, chain, change) =
            funded_coin_manager(&[100], FeePolicy::Fixed(Satoshi::new(1))).await;
        let coins = manager.spendable_coins().await;
        let result = manager
            .create_tx(
                &manager.account_id(),
                &coins,
                &[(regtest_address(42), Satoshi::new(60))],
                &change,
            )
            .await
            .unwrap();
        let txid = result.tx.txid();
        manager.record_pending(&result, Satoshi::new(60)).await;

        chain
            .set_submit_behavior(SubmitBehavior::Reject("no".into()))
            .await;
        let outcome = manager.broadcast(&result.tx).await;
        manager.settle_broadcast(&txid, &outcome).await;

        assert_eq!(manager.abandon(&txid).await.unwrap().txid, txid);
        assert_eq!(manager.spendable_coins().await.len(), 1);
        assert_eq!(
            manager.abandon(&txid).await,
            Err(CoinError::UnknownPendingTransaction(txid))
        );
    }

    #[tokio::test]
    async fn hanging_broadcast_times_out() {
        let config = WalletConfiguration::regtest()
            .with_fee_policy(FeePolicy::Fixed(Satoshi::new(1)))
            .with_broadcast_timeout(Duration::from_millis(50));
        let (manager, chain, change) = funded_coin_manager_with_config(&[100], config).await;
        let coins = manager.spendable_coins().await;
        let result = manager
            .create_tx(
                &manager.account_id(),
                &coins,
                &[(regtest_address(42), Satoshi::new(60))],
                &change,
            )
            .await
            .unwrap();

        chain.set_submit_behavior(SubmitBehavior::Hang).await;
        assert!(matches!(
            manager.broadcast(&result.tx).await,
            Err(CoinError::BroadcastTimeout(_))
        ));
    }

    #[tokio::test]
    async fn merge_coins_resolves_spent_pending() {
        let (manager, chain, change) =
            funded_coin_manager(&[100], FeePolicy::Fixed(Satoshi::new(1))).await;
        let coins = manager.spendable_coins().await;
        let result = manager
            .create_tx(
                &manager.account_id(),
                &coins,
                &[(regtest_address(42), Satoshi::new(60))],
                &change,
            )
            .await
            .unwrap();
        manager.record_pending(&result, Satoshi::new(60)).await;
        chain.submit_transaction(&result.tx).await.unwrap();

        let mut view = chain.outputs_for_address(&coins[0].address).await.unwrap();
        view.extend(chain.outputs_for_address(&change).await.unwrap());
        let resolved = manager.merge_coins(view).await;

        assert_eq!(resolved.len(), 1);
        assert_eq!(manager.coins().await.len(), 2);
        assert!(manager.spendable_coins().await.is_empty());
        chain.mine().await;
        let view = chain.outputs_for_address(&change).await.unwrap();
        manager.merge_coins(view).await;
        assert_eq!(manager.confirmed_balance().await, Satoshi::new(39));
    }

    #[tokio::test]
    async fn unknown_coin_cannot_be_signed() {
        let (manager, _, change) = funded_coin_manager(&[100], FeePolicy::Fixed(Satoshi::new(1))).await;
        let stranger = coin_with_value(7, 100);
        assert!(matches!(
            manager
                .create_tx(
                    &manager.account_id(),
                    &[stranger],
                    &[(regtest_address(42), Satoshi::new(60))],
                    &change,
                )
                .await,
            Err(CoinError::BuildFailed(_))
        ));
    }
}
