use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::hook::{DiscoveryEvent, Hooks};
use super::{Adapter, Device, DeviceValidity, Transport, TransportState};
use crate::bus::Properties;
use crate::{Address, Error, Profile, Result};

/// Owns every adapter, device and transport, keyed by object path.
///
/// Devices refer to their adapter and transports to their device by path
/// only; the referenced entity is looked up here when needed and may be
/// gone.
#[derive(Debug, Default)]
pub struct Registry {
    adapters: HashMap<String, Adapter>,
    devices: HashMap<String, Device>,
    transports: HashMap<String, Transport>,
    hooks: Hooks,
}

impl Registry {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<DiscoveryEvent> {
        self.hooks.subscribe()
    }

    pub fn adapter(&self, path: &str) -> Option<&Adapter> {
        self.adapters.get(path)
    }

    pub fn adapters(&self) -> impl Iterator<Item = &Adapter> {
        self.adapters.values()
    }

    /// Any device at `path`, whatever its validity.
    pub fn device(&self, path: &str) -> Option<&Device> {
        self.devices.get(path)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn transport(&self, path: &str) -> Option<&Transport> {
        self.transports.get(path)
    }

    pub fn transports(&self) -> impl Iterator<Item = &Transport> {
        self.transports.values()
    }

    /// A valid device at `path`.
    pub fn device_by_path(&self, path: &str) -> Option<&Device> {
        self.devices.get(path).filter(|d| d.is_valid())
    }

    /// The valid device with address `remote` seen on the adapter with
    /// address `local`.
    pub fn device_by_address(&self, remote: Address, local: Address) -> Option<&Device> {
        self.devices.values().find(|d| {
            d.is_valid()
                && d.address == Some(remote)
                && d
                    .adapter
                    .as_deref()
                    .and_then(|a| self.adapters.get(a))
                    .and_then(|a| a.address)
                    == Some(local)
        })
    }

    pub(crate) fn create_adapter(&mut self, path: &str) -> Result<&mut Adapter> {
        if self.adapters.contains_key(path) {
            error!("Found duplicated D-Bus path for adapter {}", path);
            return Err(Error::DuplicatePath {
                path: path.to_owned(),
            });
        }

        Ok(self
            .adapters
            .entry(path.to_owned())
            .or_insert_with(|| Adapter::new(path)))
    }

    pub(crate) fn adapter_mut(&mut self, path: &str) -> Option<&mut Adapter> {
        self.adapters.get_mut(path)
    }

    pub(crate) fn remove_adapter(&mut self, path: &str) -> Option<Adapter> {
        let adapter = self.adapters.remove(path);
        match adapter {
            Some(_) => debug!("Adapter {} removed", path),
            None => warn!("Unknown adapter removed {}", path),
        }
        adapter
    }

    pub(crate) fn create_device(&mut self, path: &str) -> Result<&mut Device> {
        if self.devices.contains_key(path) {
            error!("Found duplicated D-Bus path for device {}", path);
            return Err(Error::DuplicatePath {
                path: path.to_owned(),
            });
        }

        Ok(self
            .devices
            .entry(path.to_owned())
            .or_insert_with(|| Device::new(path)))
    }

    /// Applies a device property bag. If this changes whether the device
    /// counts as connected, as when a placeholder becomes valid, the
    /// connection hook fires.
    pub(crate) fn update_device(
        &mut self,
        path: &str,
        props: &Properties,
        is_change: bool,
    ) -> Result<DeviceValidity> {
        let was_connected = self.any_transport_connected(path);

        let validity = self
            .devices
            .get_mut(path)
            .ok_or_else(|| Error::UnknownPath {
                path: path.to_owned(),
            })?
            .parse_properties(props, is_change);

        self.notify_connection_change(path, was_connected);
        Ok(validity)
    }

    fn set_device_validity(&mut self, path: &str, validity: DeviceValidity) {
        let was_connected = self.any_transport_connected(path);

        if let Some(device) = self.devices.get_mut(path) {
            device.validity = validity;
        }

        self.notify_connection_change(path, was_connected);
    }

    /// Invalidates devices whose adapter is not known.
    pub(crate) fn resolve_adapters(&mut self) {
        let orphans: Vec<String> = self
            .devices
            .values()
            .filter(|d| d.validity != DeviceValidity::Invalid)
            .filter_map(|d| match d.adapter.as_deref() {
                Some(adapter) if !self.adapters.contains_key(adapter) => {
                    error!("Device {} is child of nonexistent adapter {}", d.path, adapter);
                    Some(d.path.clone())
                }
                _ => None,
            })
            .collect();

        for path in orphans {
            self.set_device_validity(&path, DeviceValidity::Invalid);
        }
    }

    /// Removes a device, first disconnecting and freeing each of its
    /// transports.
    pub(crate) fn remove_device(&mut self, path: &str) -> Option<Device> {
        let transports: Vec<String> = match self.devices.get(path) {
            Some(device) => device.transports.iter().flatten().cloned().collect(),
            None => {
                warn!("Unknown device removed {}", path);
                return None;
            }
        };

        for transport in transports {
            self.disconnect_transport(&transport);
        }

        debug!("Device {} removed", path);
        self.devices.remove(path)
    }

    /// Drops everything, devices before adapters. Each device that counted
    /// as connected fires one connection hook.
    pub(crate) fn remove_all(&mut self) {
        let paths: Vec<String> = self.devices.keys().cloned().collect();

        for path in paths {
            // invalid devices never count as connected; the cascade fires no
            // further connection hooks
            self.set_device_validity(&path, DeviceValidity::Invalid);
            self.remove_device(&path);
        }

        for (path, _) in self.adapters.drain() {
            debug!("Adapter {} removed", path);
        }

        if !self.transports.is_empty() {
            error!("{} transports left without a device", self.transports.len());
            self.transports.clear();
        }
    }

    /// Whether a valid device at `path` has a transport that is not
    /// disconnected.
    pub fn any_transport_connected(&self, path: &str) -> bool {
        let device = match self.devices.get(path) {
            Some(device) if device.is_valid() => device,
            _ => return false,
        };

        device
            .transports
            .iter()
            .flatten()
            .filter_map(|t| self.transports.get(t))
            .any(|t| t.state != TransportState::Disconnected)
    }

    /// Whether a valid device at `path` has a connected transport for the
    /// A2DP sink profile.
    pub fn sink_transport_connected(&self, path: &str) -> bool {
        self.profile_connected(path, Profile::A2dpSink)
    }

    /// Whether a valid device at `path` has a connected transport for the
    /// A2DP source profile.
    pub fn source_transport_connected(&self, path: &str) -> bool {
        self.profile_connected(path, Profile::A2dpSource)
    }

    fn profile_connected(&self, path: &str, profile: Profile) -> bool {
        match self.devices.get(path) {
            Some(device) if device.is_valid() => device.transports[profile.index()]
                .as_deref()
                .and_then(|t| self.transports.get(t))
                .map_or(false, |t| t.state >= TransportState::Idle),
            _ => false,
        }
    }

    fn notify_connection_change(&mut self, path: &str, was_connected: bool) {
        let connected = self.any_transport_connected(path);
        if connected != was_connected {
            self.hooks.fire(DiscoveryEvent::DeviceConnectionChanged {
                device: path.to_owned(),
                connected,
            });
        }
    }

    /// Adds a freshly configured transport in the `Idle` state and claims
    /// its profile slot on the owning device.
    pub(crate) fn put_transport(&mut self, transport: Transport) -> Result<()> {
        if self.transports.contains_key(&transport.path) {
            return Err(Error::DuplicatePath {
                path: transport.path,
            });
        }

        let device = self
            .devices
            .get(&transport.device)
            .ok_or_else(|| Error::UnknownPath {
                path: transport.device.clone(),
            })?;

        if device.transports[transport.profile.index()].is_some() {
            return Err(Error::ProfileInUse {
                profile: transport.profile,
                device: transport.device,
            });
        }

        let was_connected = self.any_transport_connected(&transport.device);
        let path = transport.path.clone();
        let device = transport.device.clone();
        let profile = transport.profile;
        let state = transport.state;

        if let Some(d) = self.devices.get_mut(&device) {
            d.transports[profile.index()] = Some(path.clone());
        }
        self.transports.insert(path.clone(), transport);

        self.hooks.fire(DiscoveryEvent::TransportStateChanged {
            transport: path,
            device: device.clone(),
            profile,
            previous: None,
            state,
        });
        self.notify_connection_change(&device, was_connected);

        Ok(())
    }

    /// Moves a transport to `state`. Returns whether anything changed; a
    /// transition to the current state does nothing and `Disconnected` is
    /// never left.
    pub(crate) fn set_transport_state(&mut self, path: &str, state: TransportState) -> bool {
        let transport = match self.transports.get(path) {
            Some(transport) => transport,
            None => return false,
        };

        let previous = transport.state;
        if previous == state {
            return false;
        }

        if previous == TransportState::Disconnected {
            warn!("Transport {} is disconnected, ignoring change to {}", path, state);
            return false;
        }

        let device = transport.device.clone();
        let profile = transport.profile;

        // the predicate has to be computed before the state changes
        let was_connected = self.any_transport_connected(&device);

        if let Some(transport) = self.transports.get_mut(path) {
            transport.state = state;
        }

        debug!("Transport {} state changed from {} to {}", path, previous, state);

        if state == TransportState::Disconnected {
            if let Some(d) = self.devices.get_mut(&device) {
                if d.transports[profile.index()].as_deref() == Some(path) {
                    d.transports[profile.index()] = None;
                }
            }
        }

        self.hooks.fire(DiscoveryEvent::TransportStateChanged {
            transport: path.to_owned(),
            device: device.clone(),
            profile,
            previous: Some(previous),
            state,
        });
        self.notify_connection_change(&device, was_connected);

        true
    }

    /// Disconnects a transport and frees it.
    pub(crate) fn disconnect_transport(&mut self, path: &str) -> Option<Transport> {
        self.set_transport_state(path, TransportState::Disconnected);
        self.transports.remove(path)
    }
}
