use serde::Deserialize;
use serde::Serialize;

use crate::models::blockchain::coin::Txid;
use crate::models::primitives::satoshi::Satoshi;

/// Where the submission of a locally debited transaction stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum BroadcastStatus {
    InFlight,
    Broadcast,
    Failed { reason: String },
}

impl BroadcastStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// An optimistic debit awaiting resolution by the chain.
///
/// It leaves the account's balance once every coin it spends is reported
/// spent, or when an operator abandons it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDebit {
    pub txid: Txid,
    pub amount: Satoshi,
    pub fee: Satoshi,
    pub status: BroadcastStatus,
}

impl PendingDebit {
    /// amount plus fee
    pub fn total(&self) -> Satoshi {
        self.amount.saturating_add(self.fee)
    }
}
