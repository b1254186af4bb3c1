use bitcoin_hashes::sha256d;
use bitcoin_hashes::Hash;
use secp256k1::ecdsa::Signature;
use secp256k1::Message;
use secp256k1::PublicKey;
use secp256k1::SecretKey;
use serde::Deserialize;
use serde::Serialize;

use super::coin::OutPoint;
use super::coin::Txid;
use crate::models::primitives::address::Address;
use crate::models::primitives::satoshi::Satoshi;
use crate::models::state::wallet::hd_node::secp;

/// enumerates possible transaction construction and verification errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[non_exhaustive]
pub enum TransactionError {
    #[error("could not encode transaction body: {0}")]
    Encoding(String),

    #[error("expected {expected} signing keys, got {got}")]
    KeyCount { expected: usize, got: usize },

    #[error("signing key does not control input {0}")]
    WrongKey(OutPoint),

    #[error("invalid signature on input {0}")]
    InvalidSignature(OutPoint),

    #[error("txid does not match transaction body")]
    TxidMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedInput {
    pub previous_output: OutPoint,
    pub value: Satoshi,
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: Address,
    pub value: Satoshi,
}

/// A transaction whose inputs have not been signed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub inputs: Vec<UnsignedInput>,
    pub outputs: Vec<TxOutput>,
    pub fee: Satoshi,
}

impl UnsignedTransaction {
    /// double-SHA256 of the bincode encoding of the body. Serves both as
    /// txid and as the message every input signs.
    pub fn digest(&self) -> Result<[u8; 32], TransactionError> {
        let encoded =
            bincode::serialize(self).map_err(|e| TransactionError::Encoding(e.to_string()))?;
        Ok(sha256d::Hash::hash(&encoded).to_byte_array())
    }

    /// Signs input `i` with `keys[i]`.
    pub fn sign(self, keys: &[SecretKey]) -> Result<Transaction, TransactionError> {
        if keys.len() != self.inputs.len() {
            return Err(TransactionError::KeyCount {
                expected: self.inputs.len(),
                got: keys.len(),
            });
        }

        let digest = self.digest()?;
        let message = message(&digest)?;

        let inputs = self
            .inputs
            .into_iter()
            .zip(keys)
            .map(|(input, key)| {
                let public_key = PublicKey::from_secret_key(secp(), key);
                if !input.address.is_controlled_by(&public_key) {
                    return Err(TransactionError::WrongKey(input.previous_output));
                }
                let signature = secp().sign_ecdsa(&message, key);
                Ok(TxInput {
                    previous_output: input.previous_output,
                    value: input.value,
                    address: input.address,
                    public_key: public_key.serialize().to_vec(),
                    signature: signature.serialize_der().to_vec(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Transaction {
            txid: Txid::from_byte_array(digest),
            inputs,
            outputs: self.outputs,
            fee: self.fee,
        })
    }
}

/// A signed input: the spent output plus a DER signature and the compressed
/// public key of the signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub previous_output: OutPoint,
    pub value: Satoshi,
    pub address: Address,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    txid: Txid,
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    fee: Satoshi,
}

impl Transaction {
    pub fn txid(&self) -> Txid {
        self.txid
    }

    pub fn inputs(&self) -> &[TxInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    pub fn fee(&self) -> Satoshi {
        self.fee
    }

    pub fn input_total(&self) -> Satoshi {
        self.inputs.iter().map(|i| i.value).sum()
    }

    pub fn output_total(&self) -> Satoshi {
        self.outputs.iter().map(|o| o.value).sum()
    }

    pub fn spent_outpoints(&self) -> impl Iterator<Item = OutPoint> + '_ {
        self.inputs.iter().map(|i| i.previous_output)
    }

    pub fn output_to(&self, address: &Address) -> Option<(u32, &TxOutput)> {
        self.outputs
            .iter()
            .enumerate()
            .find(|(_, o)| &o.address == address)
            .and_then(|(vout, o)| Some((u32::try_from(vout).ok()?, o)))
    }

    pub fn unsigned(&self) -> UnsignedTransaction {
        UnsignedTransaction {
            inputs: self
                .inputs
                .iter()
                .map(|i| UnsignedInput {
                    previous_output: i.previous_output,
                    value: i.value,
                    address: i.address.clone(),
                })
                .collect(),
            outputs: self.outputs.clone(),
            fee: self.fee,
        }
    }

    /// Checks the txid against the body and every input signature against
    /// the txid and the spent address.
    pub fn verify_signatures(&self) -> Result<(), TransactionError> {
        let digest = self.unsigned().digest()?;
        if digest != *self.txid.as_bytes() {
            return Err(TransactionError::TxidMismatch);
        }
        let message = message(&digest)?;

        for input in &self.inputs {
            let invalid = || TransactionError::InvalidSignature(input.previous_output);
            let public_key = PublicKey::from_slice(&input.public_key).map_err(|_| invalid())?;
            let signature = Signature::from_der(&input.signature).map_err(|_| invalid())?;
            secp()
                .verify_ecdsa(&message, &signature, &public_key)
                .map_err(|_| invalid())?;
            if !input.address.is_controlled_by(&public_key) {
                return Err(TransactionError::WrongKey(input.previous_output));
            }
        }
        Ok(())
    }
}

fn message(digest: &[u8; 32]) -> Result<Message, TransactionError> {
    Message::from_slice(digest).map_err(|e| TransactionError::Encoding(e.to_string()))
}

/// A built transaction plus the change address that was reserved for it.
///
/// The change output is omitted when there is nothing left over, but the
/// address stays recorded as used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResult {
    pub tx: Transaction,
    pub change_address: Address,
}

impl TransactionResult {
    pub fn change(&self) -> Satoshi {
        self.tx
            .output_to(&self.change_address)
            .map(|(_, o)| o.value)
            .unwrap_or(Satoshi::ZERO)
    }
}
