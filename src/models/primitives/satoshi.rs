use std::fmt::Display;
use std::iter::Sum;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

/// An amount in the smallest currency unit.
///
/// Amounts are never negative; arithmetic that could leave the valid range
/// is only offered in checked form, except for [`Sum`] which saturates. The
/// total supply is far below `u64::MAX` so saturation is unreachable for
/// real coin sets.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Satoshi(u64);

impl Satoshi {
    pub const ZERO: Satoshi = Satoshi(0);

    pub const fn new(sat: u64) -> Self {
        Self(sat)
    }

    pub const fn to_sat(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Satoshi) -> Option<Satoshi> {
        self.0.checked_add(rhs.0).map(Satoshi)
    }

    pub fn checked_sub(self, rhs: Satoshi) -> Option<Satoshi> {
        self.0.checked_sub(rhs.0).map(Satoshi)
    }

    pub fn checked_mul(self, factor: u64) -> Option<Satoshi> {
        self.0.checked_mul(factor).map(Satoshi)
    }

    pub fn saturating_add(self, rhs: Satoshi) -> Satoshi {
        Satoshi(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: Satoshi) -> Satoshi {
        Satoshi(self.0.saturating_sub(rhs.0))
    }
}

impl From<u64> for Satoshi {
    fn from(sat: u64) -> Self {
        Self(sat)
    }
}

impl Display for Satoshi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} sat", self.0)
    }
}

impl FromStr for Satoshi {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().trim_end_matches("sat").trim().parse().map(Satoshi)
    }
}

impl Sum for Satoshi {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Satoshi::ZERO, |acc, x| Satoshi(acc.0.saturating_add(x.0)))
    }
}

impl<'a> Sum<&'a Satoshi> for Satoshi {
    fn sum<I: Iterator<Item = &'a Satoshi>>(iter: I) -> Self {
        iter.copied().sum()
    }
}
