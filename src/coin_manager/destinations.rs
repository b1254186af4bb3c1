use std::collections::BTreeMap;

use super::error::CoinError;
use crate::models::primitives::address::Address;
use crate::models::primitives::satoshi::Satoshi;

/// Checks a destination list and collapses exact duplicates, keeping the
/// order of first appearance.
pub(crate) fn normalize(destinations: &[(Address, Satoshi)]) -> Result<Vec<(Address, Satoshi)>, CoinError> {
    if destinations.is_empty() {
        return Err(CoinError::BuildFailed("no destinations".into()));
    }

    let mut seen: BTreeMap<&Address, Satoshi> = BTreeMap::new();
    let mut normalized = Vec::with_capacity(destinations.len());
    for (address, amount) in destinations {
        if amount.is_zero() {
            return Err(CoinError::BuildFailed(format!(
                "zero amount for destination {address}"
            )));
        }
        match seen.get(address) {
            Some(existing) if existing == amount => continue,
            Some(existing) => {
                return Err(CoinError::BuildFailed(format!(
                    "conflicting amounts {existing} and {amount} for destination {address}"
                )))
            }
            None => {
                seen.insert(address, *amount);
                normalized.push((address.clone(), *amount));
            }
        }
    }
    Ok(normalized)
}
