use std::collections::HashSet;

use tracing::{debug, error, warn};
use zbus::zvariant::Value;

use crate::bus::Properties;
use crate::class::DeviceClass;
use crate::{Address, Profile, PROFILE_COUNT};

/// Whether enough of a device's mandatory properties were seen.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DeviceValidity {
    /// Created by a `SetConfiguration` call before the device's own
    /// `InterfacesAdded` arrived.
    Pending,
    Valid,
    Invalid,
}

/// A remote Bluetooth peer.
#[derive(Debug, Clone)]
pub struct Device {
    pub(crate) path: String,
    pub(crate) address: Option<Address>,
    pub(crate) alias: Option<String>,
    pub(crate) class: DeviceClass,
    pub(crate) uuids: HashSet<String>,
    pub(crate) adapter: Option<String>,
    pub(crate) validity: DeviceValidity,
    /// Transport path per profile, indexed by [`Profile::index`].
    pub(crate) transports: [Option<String>; PROFILE_COUNT],
}

impl Device {
    pub(crate) fn new(path: &str) -> Self {
        Device {
            path: path.to_owned(),
            address: None,
            alias: None,
            class: DeviceClass::default(),
            uuids: HashSet::new(),
            adapter: None,
            validity: DeviceValidity::Pending,
            transports: Default::default(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn address(&self) -> Option<Address> {
        self.address
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }

    pub fn uuids(&self) -> &HashSet<String> {
        &self.uuids
    }

    pub fn has_uuid(&self, uuid: &str) -> bool {
        self.uuids.contains(uuid)
    }

    /// Path of the adapter this device was seen on. The adapter itself may
    /// have gone away since.
    pub fn adapter(&self) -> Option<&str> {
        self.adapter.as_deref()
    }

    pub fn validity(&self) -> DeviceValidity {
        self.validity
    }

    pub fn is_valid(&self) -> bool {
        self.validity == DeviceValidity::Valid
    }

    /// Path of the transport occupying `profile`, if any.
    pub fn transport(&self, profile: Profile) -> Option<&str> {
        self.transports[profile.index()].as_deref()
    }

    fn parse_property(&mut self, key: &str, value: &Value<'_>, is_change: bool) {
        match (key, value) {
            ("Alias", Value::Str(alias)) => {
                debug!("{}: {}", key, alias);
                self.alias = Some(alias.to_string());
            }
            ("Address", Value::Str(address)) => {
                if is_change {
                    warn!(
                        "Device property 'Address' expected to be constant but changed for {}, ignoring",
                        self.path
                    );
                    return;
                }

                if self.address.is_some() {
                    warn!(
                        "Device {}: Received a duplicate 'Address' property, ignoring",
                        self.path
                    );
                    return;
                }

                match address.as_str().parse() {
                    Ok(parsed) => {
                        debug!("{}: {}", key, address);
                        self.address = Some(parsed);
                    }
                    Err(err) => warn!("Device {}: {}", self.path, err),
                }
            }
            ("Adapter", Value::ObjectPath(adapter)) => {
                if is_change {
                    warn!(
                        "Device property 'Adapter' expected to be constant but changed for {}, ignoring",
                        self.path
                    );
                    return;
                }

                if self.adapter.is_some() {
                    warn!(
                        "Device {}: Received a duplicate 'Adapter' property, ignoring",
                        self.path
                    );
                    return;
                }

                debug!("{}: {}", key, adapter);
                self.adapter = Some(adapter.to_string());
            }
            ("Class", Value::U32(class)) => {
                debug!("{}: {:#08x}", key, class);
                self.class = DeviceClass(*class);
            }
            ("UUIDs", Value::Array(uuids)) => {
                // never removed by bluetoothd, so only ever added here
                for uuid in uuids.iter() {
                    if let Value::Str(uuid) = uuid {
                        if self.uuids.insert(uuid.to_string()) {
                            debug!("{}: {}", key, uuid);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// Applies a property bag and recomputes validity. A device needs an
    /// address, an adapter and an alias to be valid.
    pub(crate) fn parse_properties(
        &mut self,
        props: &Properties,
        is_change: bool,
    ) -> DeviceValidity {
        for (key, value) in props {
            self.parse_property(key, value, is_change);
        }

        let complete = self.address.is_some() && self.adapter.is_some() && self.alias.is_some();
        self.validity = if complete {
            DeviceValidity::Valid
        } else {
            error!("Non-optional information missing for device {}", self.path);
            DeviceValidity::Invalid
        };

        self.validity
    }
}
