use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use crate::application::locks::tokio::AtomicMutex;
use crate::coin_manager::CoinManager;
use crate::models::blockchain::proxy::ObservableBlockchain;
use crate::models::primitives::address::Address;

/// Keeps a coin manager current with the chain events of its addresses.
///
/// Each watched address gets its own task. All tasks stop when the watcher
/// is dropped.
#[derive(Debug)]
pub struct AddressWatcher {
    coin_manager: CoinManager,
    feed: Arc<dyn ObservableBlockchain>,
    cancel: CancellationToken,
    watched: AtomicMutex<HashMap<Address, CancellationToken>>,
}

impl AddressWatcher {
    pub fn new(coin_manager: CoinManager, feed: Arc<dyn ObservableBlockchain>) -> Self {
        Self {
            coin_manager,
            feed,
            cancel: CancellationToken::new(),
            watched: AtomicMutex::default(),
        }
    }

    /// Starts watching `address`. Returns false if it was already watched.
    pub async fn watch(&self, address: &Address) -> bool {
        let mut watched = self.watched.lock_guard().await;
        if watched.contains_key(address) {
            return false;
        }

        let token = self.cancel.child_token();
        let mut events = self.feed.subscribe(address).await;
        watched.insert(address.clone(), token.clone());

        let coin_manager = self.coin_manager.clone();
        let address = address.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        trace!("stopped watching {}", address);
                        break;
                    }
                    next = events.next() => match next {
                        Some(event) => {
                            trace!("{} on {}", event, address);
                            for debit in coin_manager.apply_chain_event(event).await {
                                debug!("pending debit {} settled on chain", debit.txid);
                            }
                        }
                        None => {
                            debug!("event feed for {} closed", address);
                            break;
                        }
                    },
                }
            }
        });

        true
    }

    /// Stops watching `address`. Returns false if it was not watched.
    pub async fn unwatch(&self, address: &Address) -> bool {
        match self.watched.lock_mut(|w| w.remove(address)).await {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn is_watching(&self, address: &Address) -> bool {
        self.watched.lock(|w| w.contains_key(address)).await
    }
}

impl Drop for AddressWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
