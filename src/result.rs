use crate::bus::BluezError;
use crate::profile::Profile;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {:?}.", source)]
    IO {
        #[source]
        source: ::std::io::Error,
    },
    #[error("D-Bus error: {}.", source)]
    DBus {
        #[source]
        source: zbus::Error,
    },
    #[error("BlueZ returned an error: {}.", source)]
    Bluez {
        #[source]
        source: BluezError,
    },
    #[error("Timed out.")]
    TimedOut,
    #[error("Property {} has wrong type {}.", key, signature)]
    InvalidPropertyType { key: String, signature: String },
    #[error("Required property {} is missing.", key)]
    MissingProperty { key: &'static str },
    #[error("{:?} is not a valid bluetooth address.", address)]
    InvalidAddress { address: String },
    #[error("Object path {} is already registered.", path)]
    DuplicatePath { path: String },
    #[error("Object path {} is not known.", path)]
    UnknownPath { path: String },
    #[error("Information about device {} is invalid.", path)]
    InvalidDevice { path: String },
    #[error("UUID {} is incompatible with endpoint {}.", uuid, endpoint)]
    IncompatibleUuid { uuid: String, endpoint: String },
    #[error("Codec {:#04x} is not supported by endpoint {}.", codec, endpoint)]
    UnsupportedCodec { codec: u8, endpoint: String },
    #[error("Configuration of {} bytes is invalid; expected {} bytes.", found, expected)]
    InvalidConfigurationSize { expected: usize, found: usize },
    #[error("Invalid {} in configuration.", field)]
    InvalidConfiguration { field: &'static str },
    #[error("No suitable {} in capabilities.", field)]
    NoSuitableConfiguration { field: &'static str },
    #[error("Profile {} is already in use on device {}.", profile, device)]
    ProfileInUse { profile: Profile, device: String },
    #[error("Invalid transport state {:?}.", state)]
    InvalidState { state: String },
    #[error("Transport {} is not available.", path)]
    NotAvailable { path: String },
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IO { source: err }
    }
}

impl From<zbus::Error> for Error {
    fn from(err: zbus::Error) -> Self {
        Error::DBus { source: err }
    }
}

impl From<zbus::fdo::Error> for Error {
    fn from(err: zbus::fdo::Error) -> Self {
        Error::DBus { source: err.into() }
    }
}

impl From<BluezError> for Error {
    fn from(err: BluezError) -> Self {
        Error::Bluez { source: err }
    }
}
