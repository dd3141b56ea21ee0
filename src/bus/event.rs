use std::collections::HashMap;

use zbus::message::Type as MessageType;
use zbus::zvariant::OwnedObjectPath;
use zbus::Message;

use super::{
    Properties, ADAPTER_INTERFACE, DBUS_INTERFACE, DEVICE_INTERFACE, MEDIA_TRANSPORT_INTERFACE,
    OBJECT_MANAGER_INTERFACE, PROPERTIES_INTERFACE,
};

/// The BlueZ interfaces the discovery core tells apart.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Interface {
    Adapter,
    Device,
    MediaTransport,
    Unknown(String),
}

impl Interface {
    pub fn from_name(name: &str) -> Self {
        match name {
            ADAPTER_INTERFACE => Interface::Adapter,
            DEVICE_INTERFACE => Interface::Device,
            MEDIA_TRANSPORT_INTERFACE => Interface::MediaTransport,
            other => Interface::Unknown(other.to_owned()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Interface::Adapter => ADAPTER_INTERFACE,
            Interface::Device => DEVICE_INTERFACE,
            Interface::MediaTransport => MEDIA_TRANSPORT_INTERFACE,
            Interface::Unknown(name) => name,
        }
    }
}

/// A signal the discovery core reacts to, decoded once on arrival.
#[derive(Debug)]
pub enum BusEvent {
    NameOwnerChanged {
        name: String,
        old_owner: Option<String>,
        new_owner: Option<String>,
    },
    InterfacesAdded {
        path: OwnedObjectPath,
        interfaces: Vec<(Interface, Properties)>,
    },
    InterfacesRemoved {
        path: OwnedObjectPath,
        interfaces: Vec<Interface>,
    },
    PropertiesChanged {
        path: OwnedObjectPath,
        interface: Interface,
        changed: Properties,
    },
}

fn owner(name: String) -> Option<String> {
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

impl BusEvent {
    /// Decodes `message`. Messages that are not signals we consume yield
    /// `Ok(None)`; ours with an unexpected body are an error.
    pub fn from_message(message: &Message) -> zbus::Result<Option<BusEvent>> {
        let header = message.header();
        if header.message_type() != MessageType::Signal {
            return Ok(None);
        }

        let (interface, member) = match (header.interface(), header.member()) {
            (Some(interface), Some(member)) => (interface.as_str(), member.as_str()),
            _ => return Ok(None),
        };

        let body = message.body();
        let event = match (interface, member) {
            (DBUS_INTERFACE, "NameOwnerChanged") => {
                let (name, old_owner, new_owner): (String, String, String) = body.deserialize()?;
                BusEvent::NameOwnerChanged {
                    name,
                    old_owner: owner(old_owner),
                    new_owner: owner(new_owner),
                }
            }
            (OBJECT_MANAGER_INTERFACE, "InterfacesAdded") => {
                let (path, interfaces): (OwnedObjectPath, HashMap<String, Properties>) =
                    body.deserialize()?;
                BusEvent::InterfacesAdded {
                    path,
                    interfaces: interfaces
                        .into_iter()
                        .map(|(name, props)| (Interface::from_name(&name), props))
                        .collect(),
                }
            }
            (OBJECT_MANAGER_INTERFACE, "InterfacesRemoved") => {
                let (path, interfaces): (OwnedObjectPath, Vec<String>) = body.deserialize()?;
                BusEvent::InterfacesRemoved {
                    path,
                    interfaces: interfaces.iter().map(|i| Interface::from_name(i)).collect(),
                }
            }
            (PROPERTIES_INTERFACE, "PropertiesChanged") => {
                let path = match header.path() {
                    Some(path) => OwnedObjectPath::from(path.clone()),
                    None => return Ok(None),
                };
                let (interface, changed, _): (String, Properties, Vec<String>) =
                    body.deserialize()?;
                BusEvent::PropertiesChanged {
                    path,
                    interface: Interface::from_name(&interface),
                    changed,
                }
            }
            _ => return Ok(None),
        };

        Ok(Some(event))
    }
}
