use tracing::{debug, warn};

use zbus::zvariant::Value;

use crate::bus::Properties;
use crate::Address;

/// A local Bluetooth controller.
#[derive(Debug, Clone)]
pub struct Adapter {
    pub(crate) path: String,
    pub(crate) address: Option<Address>,
}

impl Adapter {
    pub(crate) fn new(path: &str) -> Self {
        Adapter {
            path: path.to_owned(),
            address: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn address(&self) -> Option<Address> {
        self.address
    }

    /// Reads the properties of an `Adapter1` object. Only `Address` is
    /// consumed, and it may be set once.
    pub(crate) fn parse_properties(&mut self, props: &Properties, is_change: bool) {
        for (key, value) in props {
            let value = match (key.as_str(), &**value) {
                ("Address", Value::Str(value)) => value.as_str(),
                _ => continue,
            };

            if is_change {
                warn!(
                    "Adapter property 'Address' expected to be constant but changed for {}, ignoring",
                    self.path
                );
                return;
            }

            if self.address.is_some() {
                warn!("Adapter {} received a duplicate 'Address' property, ignoring", self.path);
                return;
            }

            match value.parse() {
                Ok(address) => {
                    debug!("Adapter {} address: {}", self.path, value);
                    self.address = Some(address);
                }
                Err(err) => warn!("Adapter {}: {}", self.path, err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::{props, value};

    fn address(address: &str) -> Properties {
        props([("Address", value(address))])
    }

    #[test]
    pub fn address_is_immutable() {
        let mut adapter = Adapter::new("/org/bluez/hci0");
        adapter.parse_properties(&address("00:11:22:33:44:55"), false);
        assert_eq!(
            adapter.address(),
            Some("00:11:22:33:44:55".parse::<Address>().unwrap())
        );

        adapter.parse_properties(&address("66:77:88:99:AA:BB"), true);
        adapter.parse_properties(&address("66:77:88:99:AA:BB"), false);
        assert_eq!(adapter.address().unwrap().to_string(), "00:11:22:33:44:55");
    }

    #[test]
    pub fn ignores_malformed_address() {
        let mut adapter = Adapter::new("/org/bluez/hci0");
        adapter.parse_properties(&address("not an address"), false);
        adapter.parse_properties(
            &props([("Address", value(1u32)), ("Powered", value(true))]),
            false,
        );
        assert_eq!(adapter.address(), None);
    }
}
