use tracing::{debug, error, info, warn};
use zbus::fdo::{self, ManagedObjects};
use zbus::zvariant::Value;

use super::{DeviceValidity, Discovery, TransportState};
use crate::bus::{Bus, BusEvent, Interface, Properties, BLUEZ_SERVICE};

impl<B: Bus> Discovery<B> {
    /// Applies one decoded signal.
    pub fn handle_event(&mut self, event: BusEvent) {
        match event {
            BusEvent::NameOwnerChanged {
                name,
                old_owner,
                new_owner,
            } => {
                if name != BLUEZ_SERVICE {
                    return;
                }

                if old_owner.is_some() {
                    debug!("Bluetooth daemon disappeared");
                    self.pending.drain();
                    self.registry.remove_all();
                    self.objects_listed = false;
                }

                if new_owner.is_some() {
                    debug!("Bluetooth daemon appeared");
                    self.get_managed_objects();
                }
            }
            // the pending object listing covers whatever these would tell us
            _ if !self.objects_listed => {}
            BusEvent::InterfacesAdded { path, interfaces } => {
                self.parse_interfaces(path.as_str(), &interfaces);
                self.registry.resolve_adapters();
            }
            BusEvent::InterfacesRemoved { path, interfaces } => {
                for interface in interfaces {
                    match interface {
                        Interface::Device => {
                            self.registry.remove_device(path.as_str());
                        }
                        Interface::Adapter => {
                            self.registry.remove_adapter(path.as_str());
                        }
                        _ => {}
                    }
                }
            }
            BusEvent::PropertiesChanged {
                path,
                interface,
                changed,
            } => {
                let path = path.as_str();
                match interface {
                    Interface::Adapter => {
                        debug!("Properties changed in adapter {}", path);
                        match self.registry.adapter_mut(path) {
                            Some(adapter) => adapter.parse_properties(&changed, true),
                            None => warn!("Properties changed in unknown adapter {}", path),
                        }
                    }
                    Interface::Device => {
                        info!("Properties changed in device {}", path);
                        match self.registry.device(path).map(|d| d.validity()) {
                            None => warn!("Properties changed in unknown device {}", path),
                            Some(DeviceValidity::Valid) => {
                                if let Err(err) = self.registry.update_device(path, &changed, true)
                                {
                                    warn!("Failed to update device {}: {}", path, err);
                                }
                            }
                            Some(_) => warn!(
                                "Properties changed in device {} which information is unknown or invalid",
                                path
                            ),
                        }
                    }
                    Interface::MediaTransport => {
                        info!("Properties changed in transport {}", path);
                        if self.registry.transport(path).is_some() {
                            self.parse_transport_properties(path, &changed);
                        }
                    }
                    Interface::Unknown(_) => {}
                }
            }
        }
    }

    fn parse_transport_properties(&mut self, path: &str, props: &Properties) {
        for (key, value) in props {
            if key != "State" {
                continue;
            }

            let state = match &**value {
                Value::Str(state) => TransportState::from_property(state.as_str()),
                other => {
                    error!(
                        "Property State of transport {} has wrong type {}",
                        path,
                        other.value_signature()
                    );
                    continue;
                }
            };

            match state {
                Ok(state) => {
                    self.registry.set_transport_state(path, state);
                }
                Err(err) => error!("Transport {}: {}", path, err),
            }
        }
    }

    /// Mirrors the adapters and devices of one object. A new adapter with a
    /// known address gets our endpoints registered.
    fn parse_interfaces(&mut self, path: &str, interfaces: &[(Interface, Properties)]) {
        for (interface, props) in interfaces {
            match interface {
                Interface::Adapter => {
                    let adapter = match self.registry.create_adapter(path) {
                        Ok(adapter) => adapter,
                        Err(_) => return,
                    };

                    debug!("Adapter {} found", path);
                    adapter.parse_properties(props, false);
                    if adapter.address().is_none() {
                        return;
                    }

                    let endpoints = self.config.endpoints.clone();
                    for endpoint in endpoints {
                        self.register_endpoint(path, endpoint);
                    }
                }
                Interface::Device => {
                    match self.registry.device(path).map(|d| d.validity()) {
                        // a placeholder left by SetConfiguration
                        Some(DeviceValidity::Pending) => {}
                        Some(_) => {
                            error!("Found duplicated D-Bus path for device {}", path);
                            return;
                        }
                        None => {
                            if self.registry.create_device(path).is_err() {
                                return;
                            }
                        }
                    }

                    debug!("Device {} found", path);
                    if let Err(err) = self.registry.update_device(path, props, false) {
                        warn!("Failed to update device {}: {}", path, err);
                    }
                }
                other => debug!("Unknown interface {} found, skipping", other.name()),
            }
        }
    }

    pub(super) fn managed_objects_reply(&mut self, reply: fdo::Result<ManagedObjects>) {
        let objects = match reply {
            Ok(objects) => objects,
            Err(fdo::Error::UnknownMethod(_)) => {
                warn!("BlueZ D-Bus ObjectManager not available");
                return;
            }
            Err(err) => {
                error!("GetManagedObjects() failed: {}", err);
                return;
            }
        };

        for (path, interfaces) in objects {
            let interfaces: Vec<(Interface, Properties)> = interfaces
                .into_iter()
                .map(|(name, props)| (Interface::from_name(name.as_str()), props))
                .collect();
            self.parse_interfaces(path.as_str(), &interfaces);
        }

        // devices may be listed before their adapter
        self.registry.resolve_adapters();
        self.objects_listed = true;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use zbus::fdo;

    use super::super::fixtures::*;
    use super::super::{DiscoveryEvent, TransportState};
    use crate::bus::mock::{props, value, MockBus, SentCall};
    use crate::bus::{BluezError, BusEvent, ADAPTER_INTERFACE, DEVICE_INTERFACE};
    use crate::codec::{SbcCapabilities, SBC_SIZE};
    use crate::{Config, Endpoint, Profile, UUID_A2DP_SOURCE};

    type Discovery = super::Discovery<MockBus>;

    fn configure(discovery: &mut Discovery) {
        set_configuration(
            discovery,
            Endpoint::A2dpSource,
            TRANSPORT,
            proposal(
                Endpoint::A2dpSource,
                DEVICE,
                UUID_A2DP_SOURCE,
                &[0x21, 0x15, 2, 53],
            ),
        )
        .unwrap();
    }

    #[tokio::test]
    pub async fn listing_populates_registry() {
        let (bus, discovery) = listed(Config::default(), adapter_and_device()).await;

        let device = discovery.device_by_path(DEVICE).unwrap();
        assert_eq!(device.alias(), Some("Headphones"));
        assert_eq!(
            discovery
                .device_by_address(
                    DEVICE_ADDRESS.parse().unwrap(),
                    ADAPTER_ADDRESS.parse().unwrap()
                )
                .map(|d| d.path()),
            Some(DEVICE)
        );

        let calls = bus.sent("RegisterEndpoint");
        assert_eq!(calls.len(), 2);
        match &calls[0] {
            SentCall::RegisterEndpoint {
                adapter,
                endpoint,
                capabilities,
            } => {
                assert_eq!(adapter, ADAPTER);
                assert_eq!(*endpoint, Endpoint::A2dpSource);
                assert_eq!(capabilities.len(), SBC_SIZE);
                assert_eq!(
                    SbcCapabilities::parse(capabilities).unwrap(),
                    SbcCapabilities::all(2, 53)
                );
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    pub async fn signals_before_listing_are_ignored() {
        let bus = Arc::new(MockBus::new());
        let mut discovery = Discovery::new(bus.clone(), Config::default()).await.unwrap();

        discovery.handle_event(interfaces_added(ADAPTER, ADAPTER_INTERFACE, adapter_props()));
        assert!(discovery.registry().adapter(ADAPTER).is_none());
        assert!(bus.sent("RegisterEndpoint").is_empty());

        assert!(bus.respond_managed_objects(Ok(adapter_and_device())));
        discovery.dispatch_next_reply().await;
        assert!(discovery.registry().adapter(ADAPTER).is_some());

        // now they go through
        discovery.handle_event(interfaces_removed(DEVICE, DEVICE_INTERFACE));
        assert!(discovery.registry().device(DEVICE).is_none());
    }

    #[tokio::test]
    pub async fn object_manager_unavailable() {
        let bus = Arc::new(MockBus::new());
        let mut discovery = Discovery::new(bus.clone(), Config::default()).await.unwrap();

        assert!(bus.respond_managed_objects(Err(fdo::Error::UnknownMethod(
            "no such method".into()
        ))));
        assert!(discovery.dispatch_next_reply().await);
        assert!(!discovery.objects_listed());
    }

    #[tokio::test]
    pub async fn adapter_without_address_gets_no_endpoints() {
        let (bus, mut discovery) = listed(Config::default(), Default::default()).await;

        discovery.handle_event(interfaces_added(
            ADAPTER,
            ADAPTER_INTERFACE,
            props([("Powered", value(true))]),
        ));
        assert!(discovery.registry().adapter(ADAPTER).is_some());
        assert!(bus.sent("RegisterEndpoint").is_empty());

        // a second InterfacesAdded for the same adapter is a duplicate
        discovery.handle_event(interfaces_added(ADAPTER, ADAPTER_INTERFACE, adapter_props()));
        assert!(discovery
            .registry()
            .adapter(ADAPTER)
            .unwrap()
            .address()
            .is_none());
        assert!(bus.sent("RegisterEndpoint").is_empty());
    }

    #[tokio::test]
    pub async fn register_endpoint_not_supported() {
        let config = Config::default().with_aptx();
        let (bus, mut discovery) = listed(config, Default::default()).await;
        discovery.handle_event(interfaces_added(ADAPTER, ADAPTER_INTERFACE, adapter_props()));

        let calls = bus.sent("RegisterEndpoint");
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[2],
            SentCall::RegisterEndpoint {
                adapter: ADAPTER.into(),
                endpoint: Endpoint::A2dpSourceAptx,
                capabilities: vec![0x4F, 0, 0, 0, 0x01, 0, 0x22],
            }
        );

        for _ in 0..3 {
            assert!(bus.respond(
                "RegisterEndpoint",
                Err(BluezError::NotSupported("disabled".into()))
            ));
            assert!(discovery.dispatch_next_reply().await);
        }
        assert!(!discovery.dispatch_next_reply().await);
    }

    #[tokio::test]
    pub async fn device_changes_respect_immutable_fields() {
        let (_bus, mut discovery) = listed(Config::default(), adapter_and_device()).await;

        discovery.handle_event(properties_changed(
            DEVICE,
            DEVICE_INTERFACE,
            props([
                ("Alias", value("Kitchen")),
                ("Address", value("66:77:88:99:AA:BB")),
                ("UUIDs", value(vec![UUID_A2DP_SOURCE])),
            ]),
        ));

        let device = discovery.device_by_path(DEVICE).unwrap();
        assert_eq!(device.alias(), Some("Kitchen"));
        assert_eq!(device.address().unwrap().to_string(), DEVICE_ADDRESS);
        assert!(device.has_uuid(crate::UUID_A2DP_SINK));
        assert!(device.has_uuid(UUID_A2DP_SOURCE));
    }

    #[tokio::test]
    pub async fn duplicate_state_signal_fires_once() {
        let (_bus, mut discovery) = listed(Config::default(), adapter_and_device()).await;
        configure(&mut discovery);
        let mut events = discovery.subscribe();

        discovery.handle_event(transport_state("active"));
        discovery.handle_event(transport_state("idle"));
        discovery.handle_event(transport_state("idle"));
        discovery.handle_event(transport_state("bogus"));

        let mut states = vec![];
        while let Ok(event) = events.try_recv() {
            match event {
                DiscoveryEvent::TransportStateChanged { state, .. } => states.push(state),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(states, vec![TransportState::Playing, TransportState::Idle]);
    }

    #[tokio::test]
    pub async fn state_of_wrong_type_is_skipped() {
        let (_bus, mut discovery) = listed(Config::default(), adapter_and_device()).await;
        configure(&mut discovery);

        discovery.handle_event(properties_changed(
            TRANSPORT,
            crate::bus::MEDIA_TRANSPORT_INTERFACE,
            props([("State", value(2u32))]),
        ));
        assert_eq!(
            discovery.registry().transport(TRANSPORT).unwrap().state(),
            TransportState::Idle
        );
    }

    #[tokio::test]
    pub async fn device_removal_disconnects_transports() {
        let (_bus, mut discovery) = listed(Config::default(), adapter_and_device()).await;
        configure(&mut discovery);
        let mut events = discovery.subscribe();

        discovery.handle_event(interfaces_removed(DEVICE, DEVICE_INTERFACE));
        assert!(discovery.registry().device(DEVICE).is_none());
        assert!(discovery.registry().transport(TRANSPORT).is_none());

        assert_eq!(
            events.try_recv().unwrap(),
            DiscoveryEvent::TransportStateChanged {
                transport: TRANSPORT.into(),
                device: DEVICE.into(),
                profile: Profile::A2dpSink,
                previous: Some(TransportState::Idle),
                state: TransportState::Disconnected,
            }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            DiscoveryEvent::DeviceConnectionChanged {
                device: DEVICE.into(),
                connected: false,
            }
        );
    }

    #[tokio::test]
    pub async fn daemon_restart_rebuilds_state() {
        let (bus, mut discovery) = listed(Config::default(), adapter_and_device()).await;
        configure(&mut discovery);
        let mut events = discovery.subscribe();

        discovery.handle_event(name_owner_changed(":1.4", ""));
        assert!(!discovery.objects_listed());
        assert_eq!(discovery.registry().adapters().count(), 0);
        assert_eq!(discovery.registry().devices().count(), 0);
        assert_eq!(discovery.registry().transports().count(), 0);
        assert!(!discovery.dispatch_next_reply().await);

        let mut connection_changes = 0;
        while let Ok(event) = events.try_recv() {
            if let DiscoveryEvent::DeviceConnectionChanged { connected, .. } = event {
                assert!(!connected);
                connection_changes += 1;
            }
        }
        assert_eq!(connection_changes, 1);

        discovery.handle_event(name_owner_changed("", ":1.9"));
        assert_eq!(bus.sent("GetManagedObjects").len(), 2);
        assert!(bus.respond_managed_objects(Ok(adapter_and_device())));
        assert!(discovery.dispatch_next_reply().await);
        assert!(discovery.objects_listed());
        assert!(discovery.device_by_path(DEVICE).is_some());
    }

    #[tokio::test]
    pub async fn other_names_are_ignored() {
        let (_bus, mut discovery) = listed(Config::default(), adapter_and_device()).await;

        discovery.handle_event(BusEvent::NameOwnerChanged {
            name: "org.example".into(),
            old_owner: Some(":1.3".into()),
            new_owner: None,
        });
        assert!(discovery.objects_listed());
        assert!(discovery.device_by_path(DEVICE).is_some());
    }

    #[tokio::test]
    pub async fn device_on_unknown_adapter_is_invalid() {
        let (_bus, mut discovery) = listed(Config::default(), Default::default()).await;

        discovery.handle_event(interfaces_added(DEVICE, DEVICE_INTERFACE, device_props()));
        assert!(discovery.registry().device(DEVICE).is_some());
        assert!(discovery.device_by_path(DEVICE).is_none());

        // further changes to an invalid device are ignored
        discovery.handle_event(properties_changed(
            DEVICE,
            DEVICE_INTERFACE,
            props([("Alias", value("Kitchen"))]),
        ));
        assert_eq!(
            discovery.registry().device(DEVICE).unwrap().alias(),
            Some("Headphones")
        );
    }
}
