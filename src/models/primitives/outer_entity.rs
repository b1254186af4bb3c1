use serde::Deserialize;
use serde::Serialize;

use super::address::Address;

/// Another user of this wallet service, together with the address they
/// want to be paid at next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletUser {
    pub name: String,
    pub next_address_to_pay: Address,
}

/// A payment destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum OuterEntity {
    /// another user of this wallet service
    OtherUser(WalletUser),

    /// a raw address outside the wallet. not payable yet.
    ExternalAddress(Address),
}

impl OuterEntity {
    pub fn other_user(name: impl Into<String>, next_address_to_pay: Address) -> Self {
        Self::OtherUser(WalletUser {
            name: name.into(),
            next_address_to_pay,
        })
    }

    pub fn is_other_user(&self) -> bool {
        matches!(self, Self::OtherUser(_))
    }

    /// the address a payment to this entity goes to
    pub fn address(&self) -> &Address {
        match self {
            Self::OtherUser(user) => &user.next_address_to_pay,
            Self::ExternalAddress(address) => address,
        }
    }
}
