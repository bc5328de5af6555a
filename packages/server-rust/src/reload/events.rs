//! Change notification: the two signals the reload controller reacts to, and
//! an in-process broadcast bus that carries them.

use tokio::sync::broadcast;
use tracing::debug;

use crate::traits::ChangeNotifier;

/// Kind of persisted entity named by an [`SystemEvent::EntitiesChanged`] signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    PolicyBackedService,
    PolicyBackedServiceOperation,
    Policy,
    Folder,
    Other,
}

impl EntityKind {
    /// Whether a change to this kind of entity invalidates the implementation registry.
    #[must_use]
    pub fn affects_implementations(self) -> bool {
        matches!(
            self,
            Self::PolicyBackedService | Self::PolicyBackedServiceOperation
        )
    }
}

/// Process-wide signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemEvent {
    ProcessStarted,
    EntitiesChanged { kind: EntityKind },
    ProcessStopping,
}

impl SystemEvent {
    /// Whether this event should trigger a reload of the implementation registry.
    #[must_use]
    pub fn triggers_reload(&self) -> bool {
        match self {
            Self::ProcessStarted => true,
            Self::EntitiesChanged { kind } => kind.affects_implementations(),
            Self::ProcessStopping => false,
        }
    }
}

/// In-process broadcast bus for [`SystemEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SystemEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event, returning how many subscribers will see it.
    pub fn publish(&self, event: SystemEvent) -> usize {
        // No subscribers is fine.
        let delivered = self.tx.send(event.clone()).unwrap_or(0);
        debug!(?event, delivered, "published system event");
        delivered
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl ChangeNotifier for EventBus {
    fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.tx.subscribe()
    }
}
