use zbus::DBusError;

/// Errors in BlueZ's `org.bluez.Error` namespace. BlueZ returns these from
/// its own methods and our endpoint objects reply with them.
#[derive(DBusError, Debug)]
#[zbus(prefix = "org.bluez.Error")]
pub enum BluezError {
    #[zbus(error)]
    ZBus(zbus::Error),
    InvalidArguments(String),
    NotSupported(String),
    NotAvailable(String),
    Failed(String),
}

/// Errors specific to `org.bluez.MediaEndpoint1`.
#[derive(DBusError, Debug)]
#[zbus(prefix = "org.bluez.MediaEndpoint1.Error")]
pub enum EndpointError {
    #[zbus(error)]
    ZBus(zbus::Error),
    NotImplemented(String),
}
