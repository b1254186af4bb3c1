//! Contracts the wallet core consumes from a blockchain client.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Deserialize;
use serde::Serialize;

use super::coin::Coin;
use super::coin::OutPoint;
use super::transaction::Transaction;
use crate::models::primitives::address::Address;

/// enumerates possible blockchain client errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ChainError {
    #[error("blockchain unavailable: {0}")]
    Unavailable(String),

    #[error("transaction rejected: {0}")]
    Rejected(String),
}

/// Notification about an output paid to a watched address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum ChainEvent {
    NewOutput(Coin),
    Confirmed(OutPoint),
    Spent(OutPoint),
}

pub type ChainEventStream = BoxStream<'static, ChainEvent>;

/// Read access to chain state plus transaction submission.
#[async_trait]
pub trait BlockchainProxy: Send + Sync + std::fmt::Debug {
    async fn submit_transaction(&self, tx: &Transaction) -> Result<(), ChainError>;

    /// Every output ever paid to `address`, each with its current status.
    async fn outputs_for_address(&self, address: &Address) -> Result<Vec<Coin>, ChainError>;
}

/// Subscribable feed of per-address chain events.
#[async_trait]
pub trait ObservableBlockchain: Send + Sync + std::fmt::Debug {
    /// The stream ends when the feed shuts down. Dropping it ends the
    /// subscription.
    async fn subscribe(&self, address: &Address) -> ChainEventStream;
}
