use itertools::Itertools;
use serde::Deserialize;
use serde::Serialize;

use super::error::CoinError;
use crate::models::blockchain::coin::Coin;
use crate::models::primitives::satoshi::Satoshi;

/// Order in which spendable coins are considered. Every policy is
/// deterministic: equal values are ordered by outpoint.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum InputSelectionPolicy {
    /// fewest inputs
    #[default]
    LargestFirst,

    /// consolidates dust
    SmallestFirst,

    /// order in which the coins were handed to the selector
    ByProvidedOrder,
}

// note: all fields intentionally private
#[derive(Debug, Default)]
pub struct InputSelector {
    spendable: Vec<Coin>,
    policy: InputSelectionPolicy,
    target: Satoshi,
}

impl InputSelector {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn spendable_coins(mut self, coins: Vec<Coin>) -> Self {
        self.spendable = coins;
        self
    }

    pub fn policy(mut self, policy: InputSelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn target(mut self, target: Satoshi) -> Self {
        self.target = target;
        self
    }

    /// Shortest prefix of the ordered coins whose total reaches the target.
    ///
    /// Never returns an insufficient set: if all coins together fall short
    /// the result is [CoinError::InsufficientFunds].
    pub fn select(self) -> Result<Vec<Coin>, CoinError> {
        let Self {
            spendable,
            policy,
            target,
        } = self;

        let available: Satoshi = spendable.iter().map(|c| c.value).sum();
        if available < target {
            return Err(CoinError::InsufficientFunds {
                requested: target,
                available,
            });
        }

        let ordered = match policy {
            InputSelectionPolicy::LargestFirst => spendable
                .into_iter()
                .sorted_by(|a, b| b.value.cmp(&a.value).then(a.outpoint.cmp(&b.outpoint))),
            InputSelectionPolicy::SmallestFirst => spendable
                .into_iter()
                .sorted_by(|a, b| a.value.cmp(&b.value).then(a.outpoint.cmp(&b.outpoint))),
            InputSelectionPolicy::ByProvidedOrder => spendable.into_iter(),
        };

        // scan sequence until we have enough
        Ok(ordered
            .scan(Satoshi::ZERO, |selected, coin| {
                if *selected < target {
                    *selected = selected.saturating_add(coin.value);
                    Some(coin)
                } else {
                    None
                }
            })
            .collect())
    }
}
