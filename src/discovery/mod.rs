//! Tracks what BlueZ exposes on the bus and negotiates A2DP transports.
//!
//! A [`Discovery`] is fed every decoded signal, and answers the calls that
//! reach our endpoint objects. Adapters and devices are mirrored into its
//! [`Registry`]; transports appear there when the remote stack configures
//! one of our endpoints. Interested code subscribes to [`DiscoveryEvent`]s.

use std::sync::Arc;

use futures::future::FutureExt;
use futures::stream::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use zbus::MatchRule;

pub use self::adapter::*;
pub use self::device::*;
pub use self::endpoint::MediaEndpoint;
pub use self::hook::DiscoveryEvent;
pub use self::registry::Registry;
pub use self::transport::*;

use self::endpoint::EndpointRequest;
use self::pending::{Completion, PendingCalls};
use crate::bus::{self, Bus, BusEvent};
use crate::{Address, Config, Endpoint, Result};

mod adapter;
mod device;
mod endpoint;
mod hook;
mod pending;
mod registry;
mod router;
mod transport;

pub struct Discovery<B: Bus> {
    bus: Arc<B>,
    config: Config,
    registry: Registry,
    pending: PendingCalls,
    requests: mpsc::UnboundedReceiver<EndpointRequest>,
    objects_listed: bool,
    matches: Vec<MatchRule<'static>>,
}

async fn remove_matches<B: Bus>(bus: &B, matches: &[MatchRule<'static>]) {
    for rule in matches {
        if let Err(err) = bus.remove_match(rule.clone()).await {
            warn!("Failed to remove filter match {}: {}", rule, err);
        }
    }
}

async fn remove_endpoints<B: Bus>(bus: &B, endpoints: &[Endpoint]) {
    for endpoint in endpoints {
        if let Err(err) = bus.remove_endpoint(*endpoint).await {
            warn!("Failed to unregister endpoint {}: {}", endpoint, err);
        }
    }
}

impl<B: Bus> Discovery<B> {
    /// Installs the signal matches, exports the configured endpoint objects
    /// and asks BlueZ for its objects. A failure undoes whatever was set up
    /// before it.
    pub async fn new(bus: Arc<B>, config: Config) -> Result<Self> {
        let mut matches = Vec::new();
        for rule in bus::match_rules()? {
            if let Err(err) = bus.add_match(rule.clone()).await {
                error!("Failed to add filter match {}: {}", rule, err);
                remove_matches(bus.as_ref(), &matches).await;
                return Err(err.into());
            }
            matches.push(rule);
        }

        let (tx, requests) = mpsc::unbounded_channel();
        for (i, endpoint) in config.endpoints.iter().enumerate() {
            let object = MediaEndpoint::new(*endpoint, tx.clone());
            if let Err(err) = bus.serve_endpoint(object).await {
                error!("Failed to register endpoint {}: {}", endpoint, err);
                remove_endpoints(bus.as_ref(), &config.endpoints[..i]).await;
                remove_matches(bus.as_ref(), &matches).await;
                return Err(err.into());
            }
        }

        let mut discovery = Discovery {
            bus,
            config,
            registry: Registry::new(),
            pending: PendingCalls::default(),
            requests,
            objects_listed: false,
            matches,
        };

        discovery.get_managed_objects();
        Ok(discovery)
    }

    /// Tears everything down. Every connected device reports itself
    /// disconnected before its transports go away.
    pub async fn shutdown(mut self) {
        self.pending.drain();
        self.registry.remove_all();
        self.requests.close();

        remove_endpoints(self.bus.as_ref(), &self.config.endpoints).await;
        remove_matches(self.bus.as_ref(), &self.matches).await;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Whether the initial object listing arrived. Until then signals are
    /// ignored; the listing covers whatever they would have told us.
    pub fn objects_listed(&self) -> bool {
        self.objects_listed
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<DiscoveryEvent> {
        self.registry.subscribe()
    }

    pub fn device_by_path(&self, path: &str) -> Option<&Device> {
        self.registry.device_by_path(path)
    }

    pub fn device_by_address(&self, remote: Address, local: Address) -> Option<&Device> {
        self.registry.device_by_address(remote, local)
    }

    pub fn transport_handle(&self, path: &str) -> Option<TransportHandle<B>> {
        self.registry
            .transport(path)
            .map(|t| TransportHandle::new(self.bus.clone(), t, self.config.call_timeout))
    }

    fn get_managed_objects(&mut self) {
        let reply = self.bus.get_managed_objects();
        self.pending.push(reply.map(Completion::ManagedObjects));
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::ManagedObjects(reply) => self.managed_objects_reply(reply),
            Completion::RegisterEndpoint {
                adapter,
                endpoint,
                reply,
            } => self.register_endpoint_reply(&adapter, endpoint, reply),
        }
    }

    /// Waits for one outstanding call to complete and handles its reply.
    /// Returns `false` if nothing was pending.
    pub async fn dispatch_next_reply(&mut self) -> bool {
        match self.pending.next().await {
            Some(completion) => {
                self.handle_completion(completion);
                true
            }
            None => false,
        }
    }

    /// Waits for one call on our endpoint objects and answers it.
    pub async fn dispatch_next_request(&mut self) -> bool {
        match self.requests.recv().await {
            Some(request) => {
                self.handle_request(request);
                true
            }
            None => false,
        }
    }

    /// Processes signals, endpoint calls and replies to our own calls until
    /// `events` ends.
    pub async fn run<S>(&mut self, mut events: S)
    where
        S: Stream<Item = BusEvent> + Unpin,
    {
        loop {
            tokio::select! {
                // a completed listing is applied before later signals
                biased;

                Some(completion) = self.pending.next(), if !self.pending.is_empty() => {
                    self.handle_completion(completion)
                }
                Some(request) = self.requests.recv() => self.handle_request(request),
                event = events.next() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        debug!("Bus event stream ended");
                        break;
                    }
                },
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::stream;

    use super::fixtures::*;
    use super::*;
    use crate::bus::mock::{MockBus, SentCall};
    use crate::bus::ADAPTER_INTERFACE;
    use crate::codec::SbcCapabilities;
    use crate::{Endpoint, UUID_A2DP_SOURCE};

    const SBC_CONFIG: &[u8] = &[0x21, 0x15, 2, 53];

    fn configure(discovery: &mut Discovery<MockBus>) {
        set_configuration(
            discovery,
            Endpoint::A2dpSource,
            TRANSPORT,
            proposal(Endpoint::A2dpSource, DEVICE, UUID_A2DP_SOURCE, SBC_CONFIG),
        )
        .unwrap();
    }

    fn served(bus: &MockBus) -> Vec<Endpoint> {
        bus.endpoints().iter().map(|e| e.endpoint()).collect()
    }

    #[tokio::test]
    pub async fn init_and_shutdown() {
        let bus = Arc::new(MockBus::new());
        let config = Config::default().with_aptx();
        let discovery = Discovery::new(bus.clone(), config).await.unwrap();

        assert_eq!(bus.matches().len(), 6);
        assert_eq!(
            served(&bus),
            vec![
                Endpoint::A2dpSource,
                Endpoint::A2dpSink,
                Endpoint::A2dpSourceAptx,
            ]
        );
        assert_eq!(bus.sent("GetManagedObjects"), vec![SentCall::GetManagedObjects]);
        assert!(!discovery.objects_listed());

        discovery.shutdown().await;
        assert!(bus.matches().is_empty());
        assert!(bus.endpoints().is_empty());
    }

    #[tokio::test]
    pub async fn failed_match_undoes_earlier_ones() {
        let bus = Arc::new(MockBus::new());
        bus.fail_match(1);

        assert!(Discovery::new(bus.clone(), Config::default()).await.is_err());
        assert!(bus.matches().is_empty());
        assert!(bus.endpoints().is_empty());
        assert!(bus.sent("GetManagedObjects").is_empty());
    }

    #[tokio::test]
    pub async fn shutdown_disconnects_devices() {
        let (_bus, mut discovery) = listed(Config::default(), adapter_and_device()).await;
        configure(&mut discovery);

        let mut events = discovery.subscribe();
        discovery.shutdown().await;

        let mut disconnected = false;
        while let Ok(event) = events.try_recv() {
            if let DiscoveryEvent::DeviceConnectionChanged { connected, .. } = event {
                assert!(!connected);
                disconnected = true;
            }
        }
        assert!(disconnected);
    }

    #[tokio::test]
    pub async fn run_processes_events_and_replies() {
        let bus = Arc::new(MockBus::new());
        let mut discovery = Discovery::new(bus.clone(), Config::default()).await.unwrap();

        assert!(bus.respond_managed_objects(Ok(Default::default())));
        let events = stream::iter(vec![interfaces_added(
            ADAPTER,
            ADAPTER_INTERFACE,
            adapter_props(),
        )]);

        discovery.run(events).await;

        assert!(discovery.objects_listed());
        assert!(discovery.registry().adapter(ADAPTER).is_some());
        assert_eq!(bus.sent("RegisterEndpoint").len(), 2);
    }

    #[tokio::test]
    pub async fn run_answers_endpoint_calls() -> anyhow::Result<()> {
        let (bus, mut discovery) = listed(Config::default(), adapter_and_device()).await;
        let media = bus.endpoint(Endpoint::A2dpSink).unwrap();
        let caps = SbcCapabilities::all(2, 53).to_bytes().to_vec();

        // the events never end, so run only stops when the call is answered
        let selected = tokio::select! {
            selected = media.select_configuration(caps) => selected,
            _ = discovery.run(stream::pending()) => unreachable!(),
        };
        assert_eq!(selected?, SBC_CONFIG);
        Ok(())
    }

    #[tokio::test]
    pub async fn transport_handle_targets_owner() {
        let (bus, mut discovery) = listed(Config::default(), adapter_and_device()).await;
        configure(&mut discovery);

        let handle = discovery.transport_handle(TRANSPORT).unwrap();
        let release = handle.release();
        tokio::pin!(release);
        assert!(futures::poll!(&mut release).is_pending());
        assert!(bus.respond("Release", Ok(())));
        release.await.unwrap();

        assert_eq!(
            bus.sent("Release"),
            vec![SentCall::Release {
                owner: SENDER.into(),
                transport: TRANSPORT.into(),
            }]
        );
        assert!(discovery.transport_handle("/unknown").is_none());
    }
}
