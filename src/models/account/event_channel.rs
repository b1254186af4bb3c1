use tokio::sync::broadcast;
use tracing::trace;

use super::account_event::AccountEvent;
use super::account_event::DomainEvent;
use crate::models::primitives::account_id::AccountId;

/// Per-account event fan-out, optionally mirrored to a service-wide
/// channel.
///
/// Events of one account are sent in the order they are emitted. Sending
/// never blocks; receivers that lag behind by more than the channel
/// capacity observe [broadcast::error::RecvError::Lagged].
#[derive(Debug, Clone)]
pub struct EventChannel {
    account_id: AccountId,
    sender: broadcast::Sender<AccountEvent>,
    service: Option<broadcast::Sender<AccountEvent>>,
}

impl EventChannel {
    pub fn new(
        account_id: AccountId,
        capacity: usize,
        service: Option<broadcast::Sender<AccountEvent>>,
    ) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            account_id,
            sender,
            service,
        }
    }

    pub fn emit(&self, event: DomainEvent) {
        let event = AccountEvent {
            account_id: self.account_id,
            event,
        };
        trace!("account {} emits {}", self.account_id.short(), event.event);

        // an error only means nobody is listening right now
        let _ = self.sender.send(event.clone());
        if let Some(service) = &self.service {
            let _ = service.send(event);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AccountEvent> {
        self.sender.subscribe()
    }
}
