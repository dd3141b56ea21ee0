use std::collections::HashMap;

use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{BoxStream, StreamExt};
use tracing::{error, warn};
use zbus::fdo::{DBusProxy, ManagedObjects, ObjectManagerProxy};
use zbus::zvariant::{ObjectPath, OwnedFd, Value};
use zbus::{proxy, Connection, MatchRule, MessageStream};

use super::{Bus, BluezError, BusEvent, BLUEZ_SERVICE};
use crate::discovery::MediaEndpoint;
use crate::Endpoint;

#[proxy(
    interface = "org.bluez.Media1",
    default_service = "org.bluez",
    gen_blocking = false
)]
trait Media1 {
    fn register_endpoint(
        &self,
        endpoint: &ObjectPath<'_>,
        properties: HashMap<&str, Value<'_>>,
    ) -> zbus::Result<()>;
}

#[proxy(
    interface = "org.bluez.MediaTransport1",
    default_service = "org.bluez",
    gen_blocking = false
)]
trait MediaTransport1 {
    fn acquire(&self) -> zbus::Result<(OwnedFd, u16, u16)>;

    fn try_acquire(&self) -> zbus::Result<(OwnedFd, u16, u16)>;

    fn release(&self) -> zbus::Result<()>;
}

/// [`Bus`] on a `zbus` connection to the system bus.
#[derive(Clone, Debug)]
pub struct SystemBus {
    connection: Connection,
}

impl SystemBus {
    pub async fn connect() -> zbus::Result<Self> {
        Ok(SystemBus {
            connection: Connection::system().await?,
        })
    }

    pub fn new(connection: Connection) -> Self {
        SystemBus { connection }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Every signal on the connection that the discovery core consumes,
    /// decoded. Undecodable signals are logged and skipped.
    pub fn events(&self) -> BoxStream<'static, BusEvent> {
        MessageStream::from(&self.connection)
            .filter_map(|message| {
                let event = match message {
                    Ok(message) => match BusEvent::from_message(&message) {
                        Ok(event) => event,
                        Err(err) => {
                            warn!("Failed to decode signal: {}", err);
                            None
                        }
                    },
                    Err(err) => {
                        error!("Failed to read from the bus: {}", err);
                        None
                    }
                };
                future::ready(event)
            })
            .boxed()
    }

    async fn transport(
        connection: &Connection,
        owner: String,
        transport: String,
    ) -> zbus::Result<MediaTransport1Proxy<'static>> {
        MediaTransport1Proxy::builder(connection)
            .destination(owner)?
            .path(transport)?
            .build()
            .await
    }
}

impl Bus for SystemBus {
    fn add_match(&self, rule: MatchRule<'static>) -> BoxFuture<'static, zbus::Result<()>> {
        let connection = self.connection.clone();
        async move {
            DBusProxy::new(&connection).await?.add_match_rule(rule).await?;
            Ok(())
        }
        .boxed()
    }

    fn remove_match(&self, rule: MatchRule<'static>) -> BoxFuture<'static, zbus::Result<()>> {
        let connection = self.connection.clone();
        async move {
            DBusProxy::new(&connection).await?.remove_match_rule(rule).await?;
            Ok(())
        }
        .boxed()
    }

    fn serve_endpoint(&self, endpoint: MediaEndpoint) -> BoxFuture<'static, zbus::Result<()>> {
        let connection = self.connection.clone();
        async move {
            let path = endpoint.endpoint().path();
            connection.object_server().at(path, endpoint).await?;
            Ok(())
        }
        .boxed()
    }

    fn remove_endpoint(&self, endpoint: Endpoint) -> BoxFuture<'static, zbus::Result<()>> {
        let connection = self.connection.clone();
        async move {
            connection
                .object_server()
                .remove::<MediaEndpoint, _>(endpoint.path())
                .await?;
            Ok(())
        }
        .boxed()
    }

    fn get_managed_objects(&self) -> BoxFuture<'static, zbus::fdo::Result<ManagedObjects>> {
        let connection = self.connection.clone();
        async move {
            let proxy = ObjectManagerProxy::builder(&connection)
                .destination(BLUEZ_SERVICE)?
                .path("/")?
                .build()
                .await?;
            proxy.get_managed_objects().await
        }
        .boxed()
    }

    fn register_endpoint(
        &self,
        adapter: String,
        endpoint: Endpoint,
        capabilities: Vec<u8>,
    ) -> BoxFuture<'static, Result<(), BluezError>> {
        let connection = self.connection.clone();
        async move {
            let proxy = Media1Proxy::builder(&connection).path(adapter)?.build().await?;
            let path = ObjectPath::try_from(endpoint.path()).map_err(zbus::Error::from)?;
            let properties = HashMap::from([
                ("UUID", Value::from(endpoint.uuid())),
                ("Codec", Value::from(endpoint.codec() as u8)),
                ("Capabilities", Value::from(capabilities)),
            ]);
            proxy.register_endpoint(&path, properties).await?;
            Ok(())
        }
        .boxed()
    }

    fn acquire(
        &self,
        owner: String,
        transport: String,
        optional: bool,
    ) -> BoxFuture<'static, Result<(OwnedFd, u16, u16), BluezError>> {
        let connection = self.connection.clone();
        async move {
            let proxy = Self::transport(&connection, owner, transport).await?;
            let acquired = if optional {
                proxy.try_acquire().await?
            } else {
                proxy.acquire().await?
            };
            Ok(acquired)
        }
        .boxed()
    }

    fn release(
        &self,
        owner: String,
        transport: String,
    ) -> BoxFuture<'static, Result<(), BluezError>> {
        let connection = self.connection.clone();
        async move {
            Self::transport(&connection, owner, transport)
                .await?
                .release()
                .await?;
            Ok(())
        }
        .boxed()
    }
}
