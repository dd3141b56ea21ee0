//! The boundary to the system bus.
//!
//! Everything the discovery core sends goes through the [`Bus`] trait.
//! [`SystemBus`] implements it on a `zbus` connection; tests substitute an
//! in-memory bus. Incoming signals are decoded into [`BusEvent`]s.

use std::collections::HashMap;

use futures::future::BoxFuture;
use zbus::fdo::ManagedObjects;
use zbus::message::Type as MessageType;
use zbus::zvariant::{OwnedFd, OwnedValue, Value};
use zbus::MatchRule;

pub use self::error::*;
pub use self::event::*;
pub use self::system::SystemBus;

use crate::discovery::MediaEndpoint;
use crate::Endpoint;

mod error;
mod event;
#[cfg(test)]
pub(crate) mod mock;
mod system;

pub const BLUEZ_SERVICE: &str = "org.bluez";

pub const ADAPTER_INTERFACE: &str = "org.bluez.Adapter1";
pub const DEVICE_INTERFACE: &str = "org.bluez.Device1";
pub const MEDIA_INTERFACE: &str = "org.bluez.Media1";
pub const MEDIA_ENDPOINT_INTERFACE: &str = "org.bluez.MediaEndpoint1";
pub const MEDIA_TRANSPORT_INTERFACE: &str = "org.bluez.MediaTransport1";

pub const DBUS_SERVICE: &str = "org.freedesktop.DBus";
pub const DBUS_INTERFACE: &str = "org.freedesktop.DBus";
pub const OBJECT_MANAGER_INTERFACE: &str = "org.freedesktop.DBus.ObjectManager";
pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// An `a{sv}` property bag.
pub type Properties = HashMap<String, OwnedValue>;

/// The calls the discovery core makes on the system bus.
///
/// Every future is `'static` so that it can be kept in flight while the
/// core handles other messages.
pub trait Bus: Send + Sync + 'static {
    fn add_match(&self, rule: MatchRule<'static>) -> BoxFuture<'static, zbus::Result<()>>;

    fn remove_match(&self, rule: MatchRule<'static>) -> BoxFuture<'static, zbus::Result<()>>;

    /// Exports `endpoint` at its object path.
    fn serve_endpoint(&self, endpoint: MediaEndpoint) -> BoxFuture<'static, zbus::Result<()>>;

    fn remove_endpoint(&self, endpoint: Endpoint) -> BoxFuture<'static, zbus::Result<()>>;

    /// `GetManagedObjects` on the BlueZ object manager.
    fn get_managed_objects(&self) -> BoxFuture<'static, zbus::fdo::Result<ManagedObjects>>;

    /// `org.bluez.Media1.RegisterEndpoint` on `adapter`.
    fn register_endpoint(
        &self,
        adapter: String,
        endpoint: Endpoint,
        capabilities: Vec<u8>,
    ) -> BoxFuture<'static, Result<(), BluezError>>;

    /// `Acquire`, or `TryAcquire` if `optional`, on a transport. Transport
    /// calls go to `owner`, the unique name that configured the transport.
    fn acquire(
        &self,
        owner: String,
        transport: String,
        optional: bool,
    ) -> BoxFuture<'static, Result<(OwnedFd, u16, u16), BluezError>>;

    fn release(
        &self,
        owner: String,
        transport: String,
    ) -> BoxFuture<'static, Result<(), BluezError>>;
}

fn signal_rule(
    sender: &'static str,
    interface: &'static str,
    member: &'static str,
    arg0: Option<&'static str>,
) -> zbus::Result<MatchRule<'static>> {
    let mut builder = MatchRule::builder()
        .msg_type(MessageType::Signal)
        .sender(sender)?
        .interface(interface)?
        .member(member)?;
    if let Some(arg0) = arg0 {
        builder = builder.add_arg(arg0)?;
    }
    Ok(builder.build())
}

/// Match rules for every signal the discovery core consumes.
pub fn match_rules() -> zbus::Result<Vec<MatchRule<'static>>> {
    let mut rules = vec![
        signal_rule(DBUS_SERVICE, DBUS_INTERFACE, "NameOwnerChanged", Some(BLUEZ_SERVICE))?,
        signal_rule(BLUEZ_SERVICE, OBJECT_MANAGER_INTERFACE, "InterfacesAdded", None)?,
        signal_rule(BLUEZ_SERVICE, OBJECT_MANAGER_INTERFACE, "InterfacesRemoved", None)?,
    ];

    for interface in [ADAPTER_INTERFACE, DEVICE_INTERFACE, MEDIA_TRANSPORT_INTERFACE] {
        rules.push(signal_rule(
            BLUEZ_SERVICE,
            PROPERTIES_INTERFACE,
            "PropertiesChanged",
            Some(interface),
        )?);
    }

    Ok(rules)
}

/// The contents of an `ay` value.
pub fn bytes(value: &Value<'_>) -> Option<Vec<u8>> {
    match value {
        Value::Array(array) => array
            .iter()
            .map(|byte| match byte {
                Value::U8(byte) => Some(*byte),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn rules_cover_every_consumed_signal() {
        let rules: Vec<String> = match_rules()
            .unwrap()
            .iter()
            .map(|rule| rule.to_string())
            .collect();

        assert_eq!(rules.len(), 6);
        assert!(rules[0].contains("member='NameOwnerChanged'"));
        assert!(rules[0].contains("arg0='org.bluez'"));
        assert!(rules[1].contains("sender='org.bluez'"));
        assert!(rules[2].contains("member='InterfacesRemoved'"));
        assert!(rules[5].contains("arg0='org.bluez.MediaTransport1'"));
    }

    #[test]
    pub fn bytes_of_array() {
        let value = Value::from(vec![0x21u8, 0x15, 2, 53]);
        assert_eq!(bytes(&value), Some(vec![0x21, 0x15, 2, 53]));
        assert_eq!(bytes(&Value::from(vec!["a", "b"])), None);
        assert_eq!(bytes(&Value::from(7u32)), None);
    }
}
