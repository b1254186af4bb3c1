use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::models::blockchain::coin::Txid;
use crate::models::blockchain::transaction::TransactionError;
use crate::models::primitives::satoshi::Satoshi;
use crate::models::state::wallet::key_repository::RepositoryError;

/// enumerates possible coin selection, transaction building and broadcast
/// errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[non_exhaustive]
pub enum CoinError {
    #[error(
        "insufficient funds. requested: {}, available: {}",
        requested,
        available
    )]
    InsufficientFunds {
        requested: Satoshi,
        available: Satoshi,
    },

    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("transaction could not be built.  reason: {0}")]
    BuildFailed(String),

    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),

    #[error("broadcast did not complete within {0:?}")]
    BroadcastTimeout(Duration),

    #[error("signing key unavailable: {0}")]
    KeyUnavailable(#[from] RepositoryError),

    #[error("no pending transaction {0}")]
    UnknownPendingTransaction(Txid),

    #[error("pending transaction {0} has not failed")]
    PendingNotFailed(Txid),
}

impl From<TransactionError> for CoinError {
    fn from(e: TransactionError) -> Self {
        Self::BuildFailed(e.to_string())
    }
}
