use serde::Deserialize;
use serde::Serialize;

use crate::models::blockchain::coin::Txid;
use crate::models::primitives::account_id::AccountId;
use crate::models::primitives::address::Address;
use crate::models::primitives::satoshi::Satoshi;

/// Something that happened to an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum DomainEvent {
    AccountCreated { hd_index: u32 },

    /// optimistic debit whose transaction reached the network
    Debited { amount: Satoshi, txid: Txid },

    WatchingAddressUpdated(Address),

    BroadcastFailed { txid: Txid, reason: String },

    Synced { confirmed: Satoshi },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEvent {
    pub account_id: AccountId,
    pub event: DomainEvent,
}
