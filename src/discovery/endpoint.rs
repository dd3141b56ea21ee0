use bytes::Bytes;
use futures::future::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use zbus::interface;
use zbus::message::Header;
use zbus::zvariant::{OwnedObjectPath, Value};

use super::pending::Completion;
use super::{DeviceValidity, Discovery, Transport};
use crate::bus::{self, BluezError, Bus, EndpointError, Properties};
use crate::codec::{AptxCapabilities, AptxConfiguration, Codec, SbcCapabilities, SbcConfiguration};
use crate::{Endpoint, Error, Result};

type Reply<T> = oneshot::Sender<std::result::Result<T, BluezError>>;

/// A call on one of our endpoint objects, waiting for the [`Discovery`]
/// that owns the registry.
#[derive(Debug)]
pub(crate) enum EndpointRequest {
    SetConfiguration {
        endpoint: Endpoint,
        owner: String,
        transport: OwnedObjectPath,
        properties: Properties,
        reply: Reply<()>,
    },
    SelectConfiguration {
        endpoint: Endpoint,
        capabilities: Vec<u8>,
        reply: Reply<Vec<u8>>,
    },
    ClearConfiguration {
        transport: OwnedObjectPath,
        reply: Reply<()>,
    },
}

/// The `org.bluez.MediaEndpoint1` object exported for one [`Endpoint`].
///
/// Calls are forwarded to the [`Discovery`] that created the object and
/// answered once it has handled them.
#[derive(Clone, Debug)]
pub struct MediaEndpoint {
    endpoint: Endpoint,
    requests: mpsc::UnboundedSender<EndpointRequest>,
}

impl MediaEndpoint {
    pub(crate) fn new(
        endpoint: Endpoint,
        requests: mpsc::UnboundedSender<EndpointRequest>,
    ) -> Self {
        MediaEndpoint { endpoint, requests }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    async fn request<T>(
        &self,
        request: impl FnOnce(Reply<T>) -> EndpointRequest,
    ) -> std::result::Result<T, BluezError> {
        let gone = || BluezError::Failed("Discovery is shut down".into());

        let (tx, rx) = oneshot::channel();
        self.requests.send(request(tx)).map_err(|_| gone())?;
        rx.await.map_err(|_| gone())?
    }

    /// `SetConfiguration` as sent by `owner`.
    pub(crate) async fn configure(
        &self,
        owner: String,
        transport: OwnedObjectPath,
        properties: Properties,
    ) -> std::result::Result<(), BluezError> {
        let endpoint = self.endpoint;
        self.request(|reply| EndpointRequest::SetConfiguration {
            endpoint,
            owner,
            transport,
            properties,
            reply,
        })
        .await
    }
}

#[interface(name = "org.bluez.MediaEndpoint1")]
impl MediaEndpoint {
    async fn set_configuration(
        &self,
        #[zbus(header)] header: Header<'_>,
        transport: OwnedObjectPath,
        properties: Properties,
    ) -> std::result::Result<(), BluezError> {
        let owner = header.sender().map(|s| s.to_string()).unwrap_or_default();
        self.configure(owner, transport, properties).await
    }

    pub(crate) async fn select_configuration(
        &self,
        capabilities: Vec<u8>,
    ) -> std::result::Result<Vec<u8>, BluezError> {
        let endpoint = self.endpoint;
        self.request(|reply| EndpointRequest::SelectConfiguration {
            endpoint,
            capabilities,
            reply,
        })
        .await
    }

    async fn clear_configuration(
        &self,
        transport: OwnedObjectPath,
    ) -> std::result::Result<(), BluezError> {
        self.request(|reply| EndpointRequest::ClearConfiguration { transport, reply })
            .await
    }

    async fn release(&self) -> std::result::Result<(), EndpointError> {
        Err(EndpointError::NotImplemented("Method not implemented".into()))
    }
}

fn invalid_type(key: &str, value: &Value<'_>) -> Error {
    Error::InvalidPropertyType {
        key: key.to_owned(),
        signature: value.value_signature().to_string(),
    }
}

fn answer<T>(reply: Reply<T>, result: std::result::Result<T, BluezError>) {
    if reply.send(result).is_err() {
        debug!("Caller went away before the endpoint call was answered");
    }
}

/// The properties of a `SetConfiguration` call.
struct Proposal<'a> {
    uuid: Option<&'a str>,
    codec: Option<u8>,
    device: Option<&'a str>,
    configuration: Option<Bytes>,
}

impl<'a> Proposal<'a> {
    fn parse(props: &'a Properties) -> Result<Self> {
        let mut proposal = Proposal {
            uuid: None,
            codec: None,
            device: None,
            configuration: None,
        };

        for (key, value) in props {
            match (key.as_str(), &**value) {
                ("UUID", Value::Str(uuid)) => proposal.uuid = Some(uuid.as_str()),
                ("Codec", Value::U8(codec)) => proposal.codec = Some(*codec),
                ("Device", Value::ObjectPath(device)) => proposal.device = Some(device.as_str()),
                ("Configuration", value) => match bus::bytes(value) {
                    Some(configuration) => proposal.configuration = Some(configuration.into()),
                    None => return Err(invalid_type(key, value)),
                },
                ("UUID" | "Codec" | "Device", other) => return Err(invalid_type(key, other)),
                _ => {}
            }
        }

        Ok(proposal)
    }
}

impl<B: Bus> Discovery<B> {
    /// Handles one call on an endpoint object and answers it.
    pub(crate) fn handle_request(&mut self, request: EndpointRequest) {
        match request {
            EndpointRequest::SetConfiguration {
                endpoint,
                owner,
                transport,
                properties,
                reply,
            } => {
                let result = self
                    .configure_transport(endpoint, &owner, transport.as_str(), &properties)
                    .map_err(|err| {
                        error!("SetConfiguration on {} failed: {}", endpoint, err);
                        BluezError::InvalidArguments("Unable to set configuration".into())
                    });
                answer(reply, result);
            }
            EndpointRequest::SelectConfiguration {
                endpoint,
                capabilities,
                reply,
            } => {
                let result = self
                    .select(endpoint, &capabilities)
                    .map(|configuration| configuration.to_vec())
                    .map_err(|err| {
                        error!("SelectConfiguration on {} failed: {}", endpoint, err);
                        BluezError::InvalidArguments("Unable to select configuration".into())
                    });
                answer(reply, result);
            }
            EndpointRequest::ClearConfiguration { transport, reply } => {
                self.clear_configuration(transport.as_str());
                answer(reply, Ok(()));
            }
        }
    }

    /// Checks a proposed configuration and creates its transport. Nothing is
    /// created unless every check passes, except for a placeholder device
    /// when the device is not known yet.
    fn configure_transport(
        &mut self,
        endpoint: Endpoint,
        owner: &str,
        path: &str,
        props: &Properties,
    ) -> Result<()> {
        if self.registry.transport(path).is_some() {
            return Err(Error::DuplicatePath {
                path: path.to_owned(),
            });
        }

        let proposal = Proposal::parse(props)?;

        let uuid = proposal.uuid.ok_or(Error::MissingProperty { key: "UUID" })?;
        let profile = endpoint
            .profile_for(uuid)
            .ok_or_else(|| Error::IncompatibleUuid {
                uuid: uuid.to_owned(),
                endpoint: endpoint.to_string(),
            })?;

        let codec = endpoint.codec();
        if let Some(proposed) = proposal.codec {
            if proposed != codec as u8 {
                return Err(Error::UnsupportedCodec {
                    codec: proposed,
                    endpoint: endpoint.to_string(),
                });
            }
        }

        let device = proposal.device.ok_or(Error::MissingProperty { key: "Device" })?;
        let configuration = proposal.configuration.ok_or(Error::MissingProperty {
            key: "Configuration",
        })?;

        match codec {
            Codec::Sbc => {
                let config = SbcConfiguration::parse(&configuration)?;
                debug!("SBC configuration for {}: {:?}", path, config);
            }
            Codec::Vendor => {
                let config = AptxConfiguration::parse(&configuration)?;
                debug!("aptX configuration for {}: {:?}", path, config);
            }
            other => {
                return Err(Error::UnsupportedCodec {
                    codec: other as u8,
                    endpoint: endpoint.to_string(),
                })
            }
        }

        match self.registry.device(device).map(|d| d.validity()) {
            Some(DeviceValidity::Invalid) => {
                return Err(Error::InvalidDevice {
                    path: device.to_owned(),
                })
            }
            Some(_) => {}
            None => {
                warn!("SetConfiguration for device {} which is not known yet", device);
                self.registry.create_device(device)?;
            }
        }

        self.registry.put_transport(Transport::new(
            path,
            device,
            owner,
            profile,
            codec,
            configuration,
        ))?;

        info!("Transport {} available for profile {}", path, profile);
        Ok(())
    }

    fn select(&self, endpoint: Endpoint, capabilities: &[u8]) -> Result<Bytes> {
        match endpoint.codec() {
            Codec::Sbc => Ok(SbcCapabilities::parse(capabilities)?
                .select(&self.config)?
                .to_bytes()),
            Codec::Vendor => Ok(AptxCapabilities::parse(capabilities)?.select()?.to_bytes()),
            other => Err(Error::UnsupportedCodec {
                codec: other as u8,
                endpoint: endpoint.to_string(),
            }),
        }
    }

    fn clear_configuration(&mut self, path: &str) {
        if let Some(transport) = self.registry.transport(path) {
            info!("Clearing transport {} profile {}", path, transport.profile());
            self.registry.disconnect_transport(path);
        }
    }

    /// Registers `endpoint` with the media interface of `adapter`.
    pub(super) fn register_endpoint(&mut self, adapter: &str, endpoint: Endpoint) {
        let capabilities = match endpoint.codec() {
            Codec::Vendor => AptxCapabilities::local().to_bytes(),
            _ => SbcCapabilities::all(self.config.min_bitpool, self.config.max_bitpool).to_bytes(),
        };

        debug!("Registering endpoint {} on adapter {}", endpoint, adapter);

        let adapter = adapter.to_owned();
        let reply = self
            .bus
            .register_endpoint(adapter.clone(), endpoint, capabilities.to_vec());
        self.pending.push(reply.map(move |reply| Completion::RegisterEndpoint {
            adapter,
            endpoint,
            reply,
        }));
    }

    pub(super) fn register_endpoint_reply(
        &mut self,
        adapter: &str,
        endpoint: Endpoint,
        reply: std::result::Result<(), BluezError>,
    ) {
        match reply {
            Ok(()) => debug!("Endpoint {} registered on adapter {}", endpoint, adapter),
            Err(BluezError::NotSupported(_)) => info!(
                "Couldn't register endpoint {} because it is disabled in BlueZ",
                endpoint
            ),
            Err(err) => error!("org.bluez.Media1.RegisterEndpoint() failed: {}", err),
        }
    }
}
