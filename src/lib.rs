// enables nightly feature async_fn_track_caller for crate feature track-lock-location.
// to enable: cargo +nightly build --features track-lock-location
#![cfg_attr(feature = "track-lock-location", feature(async_fn_track_caller))]

//! Account, key and coin engine of a hierarchical-deterministic wallet.
//!
//! Start at [api::account_service::AccountService]: construct it over a
//! [KeyRepository](models::state::wallet::key_repository::KeyRepository),
//! attach a blockchain, then create accounts, issue addresses and pay.

pub mod api;
pub mod application;
pub mod coin_manager;
pub mod models;


pub use api::account_service::error::ErrorCode;
pub use api::account_service::error::ServiceError;
pub use api::account_service::handle::AccountServiceHandle;
pub use api::account_service::AccountService;
pub use api::account_service::Attached;
pub use api::account_service::Detached;
pub use models::account::Account;
