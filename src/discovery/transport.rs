use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{error, info};
use zbus::zvariant::OwnedFd;

use crate::bus::{BluezError, Bus};
use crate::codec::Codec;
use crate::{Error, Profile, Result};

/// Lifecycle of a transport. A transport starts out `Idle` once it is
/// configured, moves between `Idle` and `Playing` while the remote side
/// streams, and ends `Disconnected`. States are ordered by how connected
/// they are.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum TransportState {
    Disconnected,
    Idle,
    Playing,
}

impl TransportState {
    /// Maps the `State` property of a media transport.
    pub fn from_property(state: &str) -> Result<Self> {
        match state {
            "idle" => Ok(TransportState::Idle),
            "pending" | "active" => Ok(TransportState::Playing),
            other => Err(Error::InvalidState {
                state: other.to_owned(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportState::Disconnected => "disconnected",
            TransportState::Idle => "idle",
            TransportState::Playing => "playing",
        }
    }
}

impl Display for TransportState {
    fn fmt(&self, f: &mut Formatter) -> std::result::Result<(), std::fmt::Error> {
        f.write_str(self.as_str())
    }
}

/// An audio path for one profile on one device, created when the remote
/// stack configured one of our endpoints.
#[derive(Debug, Clone)]
pub struct Transport {
    pub(crate) path: String,
    pub(crate) device: String,
    pub(crate) owner: String,
    pub(crate) profile: Profile,
    pub(crate) codec: Codec,
    pub(crate) configuration: Bytes,
    pub(crate) state: TransportState,
}

impl Transport {
    pub(crate) fn new(
        path: &str,
        device: &str,
        owner: &str,
        profile: Profile,
        codec: Codec,
        configuration: Bytes,
    ) -> Self {
        Transport {
            path: path.to_owned(),
            device: device.to_owned(),
            owner: owner.to_owned(),
            profile,
            codec,
            configuration,
            state: TransportState::Idle,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path of the owning device.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Unique bus name of the stack that configured this transport.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// The configuration blob as sent by the remote stack.
    pub fn configuration(&self) -> &Bytes {
        &self.configuration
    }

    pub fn state(&self) -> TransportState {
        self.state
    }
}

/// The result of acquiring a transport.
#[derive(Debug)]
pub struct Acquired {
    pub fd: OwnedFd,
    pub read_mtu: u16,
    pub write_mtu: u16,
}

/// Acquires and releases a transport's stream without borrowing the
/// [`Discovery`](super::Discovery) it came from. The state is captured when
/// the handle is made.
pub struct TransportHandle<B> {
    bus: Arc<B>,
    path: String,
    owner: String,
    state: TransportState,
    timeout: Duration,
}

impl<B: Bus> TransportHandle<B> {
    pub(crate) fn new(bus: Arc<B>, transport: &Transport, timeout: Duration) -> Self {
        TransportHandle {
            bus,
            path: transport.path.clone(),
            owner: transport.owner.clone(),
            state: transport.state,
            timeout,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    async fn call<T>(
        &self,
        reply: impl Future<Output = std::result::Result<T, BluezError>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, reply).await {
            Ok(reply) => Ok(reply?),
            Err(_) => Err(Error::TimedOut),
        }
    }

    /// Requests the stream's file descriptor and MTUs.
    ///
    /// An optional acquire uses `TryAcquire`, which fails with
    /// `NotAvailable` when the remote side is not streaming; that outcome
    /// is expected and returned as [`Error::NotAvailable`].
    pub async fn acquire(&self, optional: bool) -> Result<Acquired> {
        let method = if optional { "TryAcquire" } else { "Acquire" };
        let reply = self.bus.acquire(self.owner.clone(), self.path.clone(), optional);

        match self.call(reply).await {
            Ok((fd, read_mtu, write_mtu)) => Ok(Acquired {
                fd,
                read_mtu,
                write_mtu,
            }),
            Err(Error::Bluez {
                source: BluezError::NotAvailable(_),
            }) if optional => {
                info!("Failed optional acquire of unavailable transport {}", self.path);
                Err(Error::NotAvailable {
                    path: self.path.clone(),
                })
            }
            Err(err) => {
                error!("Transport {}() failed for transport {}: {}", method, self.path, err);
                Err(err)
            }
        }
    }

    pub async fn release(&self) -> Result<()> {
        if self.state != TransportState::Playing {
            info!("Transport {} auto-released by BlueZ or already released", self.path);
        }

        let reply = self.bus.release(self.owner.clone(), self.path.clone());
        match self.call(reply).await {
            Ok(()) => {
                info!("Transport {} released", self.path);
                Ok(())
            }
            Err(err) => {
                error!("Failed to release transport {}: {}", self.path, err);
                Err(err)
            }
        }
    }
}
