use tokio::sync::mpsc;
use tracing::trace;

use super::TransportState;
use crate::Profile;

/// Notifications for the code that turns devices into audio sinks and
/// sources.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DiscoveryEvent {
    /// Whether `device` has at least one connected transport changed.
    DeviceConnectionChanged { device: String, connected: bool },
    /// A transport moved to `state`. `previous` is `None` for a transport
    /// that was just created.
    TransportStateChanged {
        transport: String,
        device: String,
        profile: Profile,
        previous: Option<TransportState>,
        state: TransportState,
    },
}

/// Fan-out of [`DiscoveryEvent`]s. Subscribers that went away are dropped on
/// the next event.
#[derive(Debug, Default)]
pub(crate) struct Hooks {
    subscribers: Vec<mpsc::UnboundedSender<DiscoveryEvent>>,
}

impl Hooks {
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<DiscoveryEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn fire(&mut self, event: DiscoveryEvent) {
        trace!("Firing {:?}", event);
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
