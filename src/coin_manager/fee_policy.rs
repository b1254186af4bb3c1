use serde::Deserialize;
use serde::Serialize;

use crate::models::primitives::satoshi::Satoshi;

pub const DEFAULT_FIXED_FEE: Satoshi = Satoshi::new(1_000);

/// How the network fee of a transaction is computed from its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeePolicy {
    /// same fee for every transaction
    Fixed(Satoshi),

    /// `base + per_input * inputs + per_output * outputs`
    Linear {
        base: Satoshi,
        per_input: Satoshi,
        per_output: Satoshi,
    },
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self::Fixed(DEFAULT_FIXED_FEE)
    }
}

impl FeePolicy {
    /// Fee for a transaction with the given number of inputs and outputs,
    /// or `None` on overflow.
    pub fn fee(&self, num_inputs: usize, num_outputs: usize) -> Option<Satoshi> {
        match *self {
            Self::Fixed(fee) => Some(fee),
            Self::Linear {
                base,
                per_input,
                per_output,
            } => {
                let inputs = per_input.checked_mul(u64::try_from(num_inputs).ok()?)?;
                let outputs = per_output.checked_mul(u64::try_from(num_outputs).ok()?)?;
                base.checked_add(inputs)?.checked_add(outputs)
            }
        }
    }
}
