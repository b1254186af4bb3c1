use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;

use async_trait::async_trait;
use bitcoin_hashes::sha256d;
use bitcoin_hashes::Hash;
use futures::channel::mpsc::UnboundedSender;
use futures::StreamExt;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::coin::Coin;
use super::coin::CoinStatus;
use super::coin::OutPoint;
use super::coin::Txid;
use super::proxy::BlockchainProxy;
use super::proxy::ChainError;
use super::proxy::ChainEvent;
use super::proxy::ChainEventStream;
use super::proxy::ObservableBlockchain;
use super::transaction::Transaction;
use crate::application::locks::tokio::AtomicMutex;
use crate::application::locks::tokio::LOG_LOCK_EVENT_CB;
use crate::models::primitives::address::Address;
use crate::models::primitives::satoshi::Satoshi;

/// How [RegtestChain] answers transaction submissions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubmitBehavior {
    #[default]
    Accept,
    Reject(String),
    /// never answer
    Hang,
}

#[derive(Debug, Default)]
struct RegtestState {
    outputs: BTreeMap<OutPoint, Coin>,
    accepted: HashSet<Txid>,
    submitted: Vec<Transaction>,
    subscribers: HashMap<Address, Vec<UnboundedSender<ChainEvent>>>,
    behavior: SubmitBehavior,
    fundings: u64,
    height: u64,
}

impl RegtestState {
    fn notify(&mut self, address: &Address, event: ChainEvent) {
        if let Some(senders) = self.subscribers.get_mut(address) {
            senders.retain(|sender| sender.unbounded_send(event.clone()).is_ok());
        }
    }

    fn accept(&mut self, tx: &Transaction) -> Result<(), ChainError> {
        tx.verify_signatures()
            .map_err(|e| ChainError::Rejected(e.to_string()))?;

        for input in tx.inputs() {
            match self.outputs.get(&input.previous_output) {
                Some(coin)
                    if coin.status != CoinStatus::Spent
                        && coin.value == input.value
                        && coin.address == input.address => {}
                Some(_) => {
                    return Err(ChainError::Rejected(format!(
                        "input {} is spent or does not match",
                        input.previous_output
                    )))
                }
                None => {
                    return Err(ChainError::Rejected(format!(
                        "unknown input {}",
                        input.previous_output
                    )))
                }
            }
        }
        if tx.output_total().checked_add(tx.fee()) != Some(tx.input_total()) {
            return Err(ChainError::Rejected("inputs and outputs do not balance".into()));
        }

        for input in tx.inputs() {
            if let Some(coin) = self.outputs.get_mut(&input.previous_output) {
                coin.status = CoinStatus::Spent;
            }
            self.notify(&input.address, ChainEvent::Spent(input.previous_output));
        }

        for (vout, output) in (0u32..).zip(tx.outputs()) {
            let coin = Coin {
                outpoint: OutPoint {
                    txid: tx.txid(),
                    vout,
                },
                value: output.value,
                address: output.address.clone(),
                status: CoinStatus::Unconfirmed,
            };
            self.outputs.insert(coin.outpoint, coin.clone());
            self.notify(&output.address, ChainEvent::NewOutput(coin));
        }

        self.accepted.insert(tx.txid());
        Ok(())
    }
}

/// In-process chain implementing both blockchain contracts.
///
/// Funding creates confirmed outputs out of thin air, accepted transactions
/// sit unconfirmed until [RegtestChain::mine] is called. Clones share state.
#[derive(Debug, Clone)]
pub struct RegtestChain {
    state: AtomicMutex<RegtestState>,
}

impl Default for RegtestChain {
    fn default() -> Self {
        Self::new()
    }
}

impl RegtestChain {
    pub fn new() -> Self {
        Self {
            state: AtomicMutex::from((
                RegtestState::default(),
                Some("RegtestChain"),
                Some(LOG_LOCK_EVENT_CB),
            )),
        }
    }

    /// Pays `value` to `address` in a confirmed output.
    pub async fn fund(&self, address: &Address, value: Satoshi) -> OutPoint {
        let mut state = self.state.lock_guard().await;
        state.fundings += 1;

        let mut preimage = b"regtest-funding".to_vec();
        preimage.extend_from_slice(&state.fundings.to_be_bytes());
        let outpoint = OutPoint {
            txid: Txid::from_byte_array(sha256d::Hash::hash(&preimage).to_byte_array()),
            vout: 0,
        };
        let coin = Coin {
            outpoint,
            value,
            address: address.clone(),
            status: CoinStatus::Confirmed,
        };
        state.outputs.insert(outpoint, coin.clone());
        state.notify(address, ChainEvent::NewOutput(coin));

        debug!("funded {} with {}", address, value);
        outpoint
    }

    /// Confirms every unconfirmed output. Returns the number confirmed.
    pub async fn mine(&self) -> usize {
        let mut state = self.state.lock_guard().await;
        state.height += 1;

        let confirmed = state
            .outputs
            .values_mut()
            .filter(|coin| coin.status == CoinStatus::Unconfirmed)
            .map(|coin| {
                coin.status = CoinStatus::Confirmed;
                (coin.address.clone(), coin.outpoint)
            })
            .collect::<Vec<_>>();
        for (address, outpoint) in &confirmed {
            state.notify(address, ChainEvent::Confirmed(*outpoint));
        }

        info!("mined block {} confirming {} output(s)", state.height, confirmed.len());
        confirmed.len()
    }

    pub async fn height(&self) -> u64 {
        self.state.lock(|s| s.height).await
    }

    pub async fn set_submit_behavior(&self, behavior: SubmitBehavior) {
        self.state.lock_mut(|s| s.behavior = behavior).await
    }

    /// Every submission received, accepted or not.
    pub async fn submitted_transactions(&self) -> Vec<Transaction> {
        self.state.lock(|s| s.submitted.clone()).await
    }

    pub async fn coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.state.lock(|s| s.outputs.get(outpoint).cloned()).await
    }

    /// Live subscriptions on `address`.
    pub async fn subscriber_count(&self, address: &Address) -> usize {
        self.state
            .lock_mut(|s| {
                s.subscribers.get_mut(address).map_or(0, |senders| {
                    senders.retain(|sender| !sender.is_closed());
                    senders.len()
                })
            })
            .await
    }
}

#[async_trait]
impl BlockchainProxy for RegtestChain {
    async fn submit_transaction(&self, tx: &Transaction) -> Result<(), ChainError> {
        let behavior = {
            let mut state = self.state.lock_guard().await;
            state.submitted.push(tx.clone());
            state.behavior.clone()
        };

        match behavior {
            SubmitBehavior::Accept => {}
            SubmitBehavior::Reject(reason) => {
                warn!("rejecting transaction {}: {}", tx.txid(), reason);
                return Err(ChainError::Rejected(reason));
            }
            SubmitBehavior::Hang => return std::future::pending().await,
        }

        let mut state = self.state.lock_guard().await;
        if state.accepted.contains(&tx.txid()) {
            debug!("transaction {} already accepted", tx.txid());
            return Ok(());
        }
        state.accept(tx)?;
        debug!("accepted transaction {}", tx.txid());
        Ok(())
    }

    async fn outputs_for_address(&self, address: &Address) -> Result<Vec<Coin>, ChainError> {
        Ok(self
            .state
            .lock(|s| {
                s.outputs
                    .values()
                    .filter(|coin| &coin.address == address)
                    .cloned()
                    .collect()
            })
            .await)
    }
}

#[async_trait]
impl ObservableBlockchain for RegtestChain {
    async fn subscribe(&self, address: &Address) -> ChainEventStream {
        let (sender, receiver) = futures::channel::mpsc::unbounded();
        self.state
            .lock_mut(|s| {
                s.subscribers
                    .entry(address.clone())
                    .or_default()
                    .push(sender)
            })
            .await;
        receiver.boxed()
    }
}
