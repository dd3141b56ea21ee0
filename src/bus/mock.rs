use std::io;
use std::sync::Mutex;

use futures::future::{self, BoxFuture, FutureExt};
use tokio::sync::oneshot;
use zbus::fdo::{self, ManagedObjects};
use zbus::zvariant::{ObjectPath, OwnedFd, OwnedValue, Value};
use zbus::MatchRule;

use super::{BluezError, Bus, Properties};
use crate::discovery::MediaEndpoint;
use crate::Endpoint;

type Acquired = (OwnedFd, u16, u16);

/// A call sent through the [`MockBus`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) enum SentCall {
    GetManagedObjects,
    RegisterEndpoint {
        adapter: String,
        endpoint: Endpoint,
        capabilities: Vec<u8>,
    },
    Acquire {
        owner: String,
        transport: String,
        optional: bool,
    },
    Release {
        owner: String,
        transport: String,
    },
}

impl SentCall {
    pub fn member(&self) -> &'static str {
        match self {
            SentCall::GetManagedObjects => "GetManagedObjects",
            SentCall::RegisterEndpoint { .. } => "RegisterEndpoint",
            SentCall::Acquire { optional: true, .. } => "TryAcquire",
            SentCall::Acquire { .. } => "Acquire",
            SentCall::Release { .. } => "Release",
        }
    }
}

enum Responder {
    ManagedObjects(oneshot::Sender<fdo::Result<ManagedObjects>>),
    Unit(oneshot::Sender<Result<(), BluezError>>),
    Acquired(oneshot::Sender<Result<Acquired, BluezError>>),
}

/// An in-memory bus that records everything sent through it. Calls stay
/// unanswered until a test responds to them.
#[derive(Default)]
pub(crate) struct MockBus {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    sent: Vec<SentCall>,
    pending: Vec<(&'static str, Responder)>,
    endpoints: Vec<MediaEndpoint>,
    matches: Vec<String>,
    failing_match: Option<usize>,
}

fn hung_up() -> zbus::Error {
    zbus::Error::from(io::Error::from(io::ErrorKind::ConnectionReset))
}

impl MockBus {
    pub fn new() -> Self {
        Default::default()
    }

    /// Makes the `n`th `add_match` (counting from zero) fail.
    pub fn fail_match(&self, n: usize) {
        self.state.lock().unwrap().failing_match = Some(n);
    }

    fn take(&self, member: &str) -> Option<Responder> {
        let mut state = self.state.lock().unwrap();
        let i = state.pending.iter().position(|(m, _)| *m == member)?;
        Some(state.pending.remove(i).1)
    }

    pub fn respond_managed_objects(&self, reply: fdo::Result<ManagedObjects>) -> bool {
        match self.take("GetManagedObjects") {
            Some(Responder::ManagedObjects(tx)) => tx.send(reply).is_ok(),
            _ => false,
        }
    }

    /// Answers the oldest unanswered `RegisterEndpoint` or `Release`.
    pub fn respond(&self, member: &str, reply: Result<(), BluezError>) -> bool {
        match self.take(member) {
            Some(Responder::Unit(tx)) => tx.send(reply).is_ok(),
            _ => false,
        }
    }

    /// Answers the oldest unanswered `Acquire` or `TryAcquire`.
    pub fn respond_acquire(&self, member: &str, reply: Result<Acquired, BluezError>) -> bool {
        match self.take(member) {
            Some(Responder::Acquired(tx)) => tx.send(reply).is_ok(),
            _ => false,
        }
    }

    /// Drops every unanswered call, as if the connection went away.
    pub fn hang_up(&self) {
        self.state.lock().unwrap().pending.clear();
    }

    pub fn sent(&self, member: &str) -> Vec<SentCall> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|c| c.member() == member)
            .cloned()
            .collect()
    }

    pub fn unanswered(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// The endpoint objects currently served.
    pub fn endpoints(&self) -> Vec<MediaEndpoint> {
        self.state.lock().unwrap().endpoints.clone()
    }

    pub fn endpoint(&self, endpoint: Endpoint) -> Option<MediaEndpoint> {
        self.endpoints().into_iter().find(|e| e.endpoint() == endpoint)
    }

    pub fn matches(&self) -> Vec<String> {
        self.state.lock().unwrap().matches.clone()
    }

    fn push(&self, call: SentCall, responder: Responder) {
        let mut state = self.state.lock().unwrap();
        let member = call.member();
        state.sent.push(call);
        state.pending.push((member, responder));
    }

    fn unit(&self, call: SentCall) -> BoxFuture<'static, Result<(), BluezError>> {
        let (tx, rx) = oneshot::channel();
        self.push(call, Responder::Unit(tx));
        async move { rx.await.unwrap_or_else(|_| Err(hung_up().into())) }.boxed()
    }
}

impl Bus for MockBus {
    fn add_match(&self, rule: MatchRule<'static>) -> BoxFuture<'static, zbus::Result<()>> {
        let mut state = self.state.lock().unwrap();
        let result = if state.failing_match == Some(state.matches.len()) {
            Err(zbus::Error::Failure(format!("cannot add {}", rule)))
        } else {
            state.matches.push(rule.to_string());
            Ok(())
        };
        future::ready(result).boxed()
    }

    fn remove_match(&self, rule: MatchRule<'static>) -> BoxFuture<'static, zbus::Result<()>> {
        let rule = rule.to_string();
        self.state.lock().unwrap().matches.retain(|r| *r != rule);
        future::ready(Ok(())).boxed()
    }

    fn serve_endpoint(&self, endpoint: MediaEndpoint) -> BoxFuture<'static, zbus::Result<()>> {
        self.state.lock().unwrap().endpoints.push(endpoint);
        future::ready(Ok(())).boxed()
    }

    fn remove_endpoint(&self, endpoint: Endpoint) -> BoxFuture<'static, zbus::Result<()>> {
        self.state
            .lock()
            .unwrap()
            .endpoints
            .retain(|e| e.endpoint() != endpoint);
        future::ready(Ok(())).boxed()
    }

    fn get_managed_objects(&self) -> BoxFuture<'static, fdo::Result<ManagedObjects>> {
        let (tx, rx) = oneshot::channel();
        self.push(SentCall::GetManagedObjects, Responder::ManagedObjects(tx));
        async move {
            rx.await
                .unwrap_or_else(|_| Err(fdo::Error::NoReply("connection closed".into())))
        }
        .boxed()
    }

    fn register_endpoint(
        &self,
        adapter: String,
        endpoint: Endpoint,
        capabilities: Vec<u8>,
    ) -> BoxFuture<'static, Result<(), BluezError>> {
        self.unit(SentCall::RegisterEndpoint {
            adapter,
            endpoint,
            capabilities,
        })
    }

    fn acquire(
        &self,
        owner: String,
        transport: String,
        optional: bool,
    ) -> BoxFuture<'static, Result<Acquired, BluezError>> {
        let (tx, rx) = oneshot::channel();
        let call = SentCall::Acquire {
            owner,
            transport,
            optional,
        };
        self.push(call, Responder::Acquired(tx));
        async move { rx.await.unwrap_or_else(|_| Err(hung_up().into())) }.boxed()
    }

    fn release(
        &self,
        owner: String,
        transport: String,
    ) -> BoxFuture<'static, Result<(), BluezError>> {
        self.unit(SentCall::Release { owner, transport })
    }
}

/// Wraps a plain value for a property bag.
pub(crate) fn value<'a>(value: impl Into<Value<'a>>) -> OwnedValue {
    OwnedValue::try_from(value.into()).unwrap()
}

pub(crate) fn object_path(path: &str) -> OwnedValue {
    value(ObjectPath::try_from(path).unwrap())
}

pub(crate) fn props<const N: usize>(entries: [(&str, OwnedValue); N]) -> Properties {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value))
        .collect()
}
