use std::future::Future;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::trace;
use zbus::fdo::{self, ManagedObjects};

use crate::bus::BluezError;
use crate::Endpoint;

/// A finished call, carrying what it was made for.
#[derive(Debug)]
pub(crate) enum Completion {
    ManagedObjects(fdo::Result<ManagedObjects>),
    RegisterEndpoint {
        adapter: String,
        endpoint: Endpoint,
        reply: Result<(), BluezError>,
    },
}

/// Asynchronous calls that are still waiting on their reply.
#[derive(Default)]
pub(crate) struct PendingCalls {
    in_flight: FuturesUnordered<BoxFuture<'static, Completion>>,
}

impl PendingCalls {
    pub fn push(&mut self, call: impl Future<Output = Completion> + Send + 'static) {
        self.in_flight.push(call.boxed());
        trace!("{} calls pending", self.len());
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Waits for the next reply. Returns `None` once nothing is pending.
    pub async fn next(&mut self) -> Option<Completion> {
        self.in_flight.next().await
    }

    /// Forgets every outstanding call; their replies are dropped unseen.
    pub fn drain(&mut self) {
        if !self.is_empty() {
            trace!("Dropping {} pending calls", self.len());
        }
        self.in_flight.clear();
    }
}
