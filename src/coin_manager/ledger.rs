use std::collections::BTreeMap;
use std::collections::HashSet;

use tracing::debug;

use super::error::CoinError;
use crate::models::account::pending_debit::BroadcastStatus;
use crate::models::account::pending_debit::PendingDebit;
use crate::models::blockchain::coin::Coin;
use crate::models::blockchain::coin::CoinStatus;
use crate::models::blockchain::coin::OutPoint;
use crate::models::blockchain::coin::Txid;
use crate::models::blockchain::proxy::ChainEvent;
use crate::models::blockchain::transaction::Transaction;
use crate::models::primitives::satoshi::Satoshi;

/// A transaction we built, together with its debit bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingSpend {
    pub(crate) tx: Transaction,
    pub(crate) debit: PendingDebit,
}

/// One account's view of its coins and unresolved spends.
///
/// Coins spent by a pending transaction stay reserved until the chain
/// reports all of them spent or the spend is abandoned.
#[derive(Debug, Default)]
pub(crate) struct CoinLedger {
    coins: BTreeMap<OutPoint, Coin>,
    pending: Vec<PendingSpend>,
}

impl CoinLedger {
    fn reserved(&self) -> HashSet<OutPoint> {
        self.pending
            .iter()
            .flat_map(|p| p.tx.spent_outpoints())
            .collect()
    }

    pub(crate) fn coins(&self) -> Vec<Coin> {
        self.coins.values().cloned().collect()
    }

    /// confirmed, unspent and not reserved
    pub(crate) fn spendable(&self) -> Vec<Coin> {
        let reserved = self.reserved();
        self.coins
            .values()
            .filter(|c| c.is_spendable() && !reserved.contains(&c.outpoint))
            .cloned()
            .collect()
    }

    pub(crate) fn confirmed_balance(&self) -> Satoshi {
        self.coins
            .values()
            .filter(|c| c.status == CoinStatus::Confirmed)
            .map(|c| c.value)
            .sum()
    }

    pub(crate) fn pending_debits(&self) -> Vec<PendingDebit> {
        self.pending.iter().map(|p| p.debit.clone()).collect()
    }

    pub(crate) fn pending(&self, txid: &Txid) -> Option<&PendingSpend> {
        self.pending.iter().find(|p| &p.debit.txid == txid)
    }

    fn pending_mut(&mut self, txid: &Txid) -> Option<&mut PendingSpend> {
        self.pending.iter_mut().find(|p| &p.debit.txid == txid)
    }

    pub(crate) fn record(&mut self, spend: PendingSpend) {
        debug!(
            "recording pending spend {} of {} (fee {})",
            spend.debit.txid, spend.debit.amount, spend.debit.fee
        );
        self.pending.push(spend);
    }

    /// Updates the status of a pending spend. `None` if it was resolved in
    /// the meantime.
    pub(crate) fn set_status(&mut self, txid: &Txid, status: BroadcastStatus) -> Option<PendingDebit> {
        let pending = self.pending_mut(txid)?;
        pending.debit.status = status;
        Some(pending.debit.clone())
    }

    /// Removes a pending spend that failed to broadcast, releasing its
    /// reservations.
    pub(crate) fn abandon(&mut self, txid: &Txid) -> Result<PendingDebit, CoinError> {
        let position = self
            .pending
            .iter()
            .position(|p| &p.debit.txid == txid)
            .ok_or(CoinError::UnknownPendingTransaction(*txid))?;
        if !self.pending[position].debit.status.is_failed() {
            return Err(CoinError::PendingNotFailed(*txid));
        }
        Ok(self.pending.remove(position).debit)
    }

    /// Applies a feed event. Returns the pending spends it resolved.
    pub(crate) fn apply(&mut self, event: ChainEvent) -> Vec<PendingDebit> {
        match event {
            ChainEvent::NewOutput(coin) => {
                let entry = self.coins.entry(coin.outpoint).or_insert_with(|| coin.clone());
                entry.status = entry.status.max(coin.status);
            }
            ChainEvent::Confirmed(outpoint) => match self.coins.get_mut(&outpoint) {
                Some(coin) => coin.status = coin.status.max(CoinStatus::Confirmed),
                None => debug!("confirmation for unknown output {}", outpoint),
            },
            ChainEvent::Spent(outpoint) => match self.coins.get_mut(&outpoint) {
                Some(coin) => coin.status = CoinStatus::Spent,
                None => debug!("spend of unknown output {}", outpoint),
            },
        }
        self.resolve()
    }

    /// Folds a view fetched from the chain into the coin set. Returns the
    /// pending spends it resolved.
    ///
    /// Statuses only move forward, so an entry the feed advanced after the
    /// view was fetched keeps its status, and coins missing from the view
    /// are kept.
    pub(crate) fn merge(&mut self, coins: Vec<Coin>) -> Vec<PendingDebit> {
        for coin in coins {
            match self.coins.get_mut(&coin.outpoint) {
                Some(known) => known.status = known.status.max(coin.status),
                None => {
                    self.coins.insert(coin.outpoint, coin);
                }
            }
        }
        self.resolve()
    }

    fn resolve(&mut self) -> Vec<PendingDebit> {
        let coins = &self.coins;
        let (resolved, pending): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.pending).into_iter().partition(|p| {
                p.tx
                    .spent_outpoints()
                    .all(|op| coins.get(&op).is_some_and(|c| c.status == CoinStatus::Spent))
            });
        self.pending = pending;

        resolved
            .into_iter()
            .map(|p| {
                debug!("pending spend {} resolved by the chain", p.debit.txid);
                p.debit
            })
            .collect()
    }
}
