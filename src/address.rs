use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::Error;

/// A Bluetooth device address. The bytes are stored in the little-endian
/// order used on the wire, so the textual form lists them in reverse.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Address {
    bytes: [u8; 6],
}

impl Address {
    pub const fn new(bytes: [u8; 6]) -> Address {
        Address { bytes }
    }

    pub const fn zero() -> Address {
        Address { bytes: [0u8; 6] }
    }
}

impl From<[u8; 6]> for Address {
    fn from(bytes: [u8; 6]) -> Self {
        Address { bytes }
    }
}

impl From<Address> for [u8; 6] {
    fn from(val: Address) -> Self {
        val.bytes
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl FromStr for Address {
    type Err = Error;

    /// Parses the `XX:XX:XX:XX:XX:XX` form BlueZ uses for the `Address`
    /// property of adapters and devices.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidAddress {
            address: s.to_owned(),
        };

        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');

        for i in (0..6).rev() {
            let part = parts.next().ok_or_else(invalid)?;
            // from_str_radix alone would take a sign
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            bytes[i] = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }

        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Address { bytes })
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.bytes[5],
            self.bytes[4],
            self.bytes[3],
            self.bytes[2],
            self.bytes[1],
            self.bytes[0]
        )
    }
}
