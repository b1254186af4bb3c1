use serde::Deserialize;
use serde::Serialize;

use crate::coin_manager::error::CoinError;
use crate::models::blockchain::proxy::ChainError;
use crate::models::primitives::address::Address;
use crate::models::state::wallet::hd_node::DerivationError;
use crate::models::state::wallet::key_repository::RepositoryError;

/// enumerates possible service configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("no blockchain is attached to the account service")]
    BlockchainNotAttached,

    #[error("a blockchain is already attached to the account service")]
    AlreadyAttached,

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// enumerates possible request validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("destination {0} is not a wallet user.  only wallet users can be paid")]
    UnsupportedDestination(Address),

    #[error("no destinations given")]
    NoDestinations,

    #[error("address {0} belongs to a different network")]
    NetworkMismatch(Address),

    #[error("address {0} is not watched by this account")]
    NotWatched(Address),
}

/// Any error returned by the account service.
///
/// [ServiceError::code] gives a stable code for each failure and
/// [std::fmt::Display] the message that goes with it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Coin(#[from] CoinError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Derivation(#[from] DerivationError),
}

/// Finite set of failure codes for the transport boundary.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BlockchainNotAttached,
    AlreadyAttached,
    InvalidConfiguration,
    KeyNotFound,
    KeyAlreadyExists,
    KeyStorage,
    KeyDerivation,
    InsufficientFunds,
    InvalidAmount,
    BuildFailed,
    BroadcastFailed,
    BroadcastTimeout,
    UnknownPendingTransaction,
    PendingNotFailed,
    UnsupportedDestination,
    NoDestinations,
    NetworkMismatch,
    NotWatched,
    ChainUnavailable,
    ChainRejected,
}

impl From<&ConfigError> for ErrorCode {
    fn from(e: &ConfigError) -> Self {
        match e {
            ConfigError::BlockchainNotAttached => Self::BlockchainNotAttached,
            ConfigError::AlreadyAttached => Self::AlreadyAttached,
            ConfigError::Invalid(_) => Self::InvalidConfiguration,
        }
    }
}

impl From<&RepositoryError> for ErrorCode {
    fn from(e: &RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(_) => Self::KeyNotFound,
            RepositoryError::AlreadyExists(_) => Self::KeyAlreadyExists,
            RepositoryError::Derivation(_) => Self::KeyDerivation,
            RepositoryError::Storage(_) => Self::KeyStorage,
        }
    }
}

impl From<&CoinError> for ErrorCode {
    fn from(e: &CoinError) -> Self {
        match e {
            CoinError::InsufficientFunds { .. } => Self::InsufficientFunds,
            CoinError::InvalidAmount => Self::InvalidAmount,
            CoinError::BuildFailed(_) => Self::BuildFailed,
            CoinError::BroadcastFailed(_) => Self::BroadcastFailed,
            CoinError::BroadcastTimeout(_) => Self::BroadcastTimeout,
            CoinError::KeyUnavailable(e) => e.into(),
            CoinError::UnknownPendingTransaction(_) => Self::UnknownPendingTransaction,
            CoinError::PendingNotFailed(_) => Self::PendingNotFailed,
        }
    }
}

impl From<&ValidationError> for ErrorCode {
    fn from(e: &ValidationError) -> Self {
        match e {
            ValidationError::UnsupportedDestination(_) => Self::UnsupportedDestination,
            ValidationError::NoDestinations => Self::NoDestinations,
            ValidationError::NetworkMismatch(_) => Self::NetworkMismatch,
            ValidationError::NotWatched(_) => Self::NotWatched,
        }
    }
}

impl From<&ChainError> for ErrorCode {
    fn from(e: &ChainError) -> Self {
        match e {
            ChainError::Unavailable(_) => Self::ChainUnavailable,
            ChainError::Rejected(_) => Self::ChainRejected,
        }
    }
}

impl ServiceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Config(e) => e.into(),
            Self::Repository(e) => e.into(),
            Self::Coin(e) => e.into(),
            Self::Validation(e) => e.into(),
            Self::Chain(e) => e.into(),
            Self::Derivation(_) => ErrorCode::KeyDerivation,
        }
    }
}
