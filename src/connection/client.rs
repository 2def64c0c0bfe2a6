//! Connection Client
//!
//! A [`BloomdClient`] owns one TCP connection to bloomd and lets any number of
//! tasks pipeline commands over it. Each command method validates its
//! arguments, queues the request, and hands back a [`Pending`] future that
//! resolves to the typed result once the reply has been decoded.
//!
//! ## Example
//!
//! ```no_run
//! use bloomd_client::BloomdClient;
//! use std::time::Duration;
//!
//! # async fn run() -> bloomd_client::Result<()> {
//! let client = BloomdClient::connect("127.0.0.1:8673", Duration::from_secs(2)).await?;
//!
//! // Both requests are written before either reply is read.
//! let first = client.set("users", "alice")?;
//! let second = client.check("users", "bob")?;
//! println!("{} {}", first.await?, second.await?);
//! # Ok(())
//! # }
//! ```
//!
//! Validation errors come back from the method call itself; nothing is sent.
//! Errors that depend on the reply come back from awaiting the `Pending`.

use crate::connection::multiplexer::{self, InFlight, Shared};
use crate::connection::stats::StatsSnapshot;
use crate::error::{BloomdError, Result};
use crate::protocol::{
    encode_line, list_prefix, ClearResult, CreateFilterArgs, CreateResult, FilterInfo,
    FilterName, FilterSummary, FlagVerb, Lookup, Request, Response, StateArgs, StateResult,
    StateVerb,
};
use bytes::Bytes;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, trace};

/// Counter for connection ids
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Whether a client may currently submit commands.
///
/// Clients opened directly are always `CheckedOut`. Pooled clients flip to
/// `Returned` when released and back when acquired again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    CheckedOut,
    Returned,
}

struct Submitter {
    lease: LeaseState,
    inflight: mpsc::UnboundedSender<InFlight>,
    outbound: mpsc::UnboundedSender<Bytes>,
}

struct ClientInner {
    shared: Arc<Shared>,
    submitter: Mutex<Submitter>,
}

/// Handle to one bloomd connection. Cloning shares the connection.
#[derive(Clone)]
pub struct BloomdClient {
    inner: Arc<ClientInner>,
}

impl BloomdClient {
    /// Opens a TCP connection to `addr`, failing with
    /// [`BloomdError::ConnectTimeout`] if it takes longer than `connect_timeout`.
    pub async fn connect(addr: &str, connect_timeout: Duration) -> Result<Self> {
        let stream = match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(stream) => stream?,
            Err(_) => {
                debug!(peer = addr, "Connect timed out");
                return Err(BloomdError::ConnectTimeout(connect_timeout));
            }
        };
        stream.set_nodelay(true)?;

        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| addr.to_string());

        let client = Self::from_stream(stream, peer);
        info!(conn = client.id(), peer = %client.peer(), "Connected to bloomd");
        Ok(client)
    }

    /// Runs the protocol over an already established stream.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_stream<S>(stream: S, peer: impl Into<String>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let channels = multiplexer::spawn(stream, id, peer.into());

        Self {
            inner: Arc::new(ClientInner {
                shared: channels.shared,
                submitter: Mutex::new(Submitter {
                    lease: LeaseState::CheckedOut,
                    inflight: channels.inflight,
                    outbound: channels.outbound,
                }),
            }),
        }
    }

    /// Unique id of the underlying connection.
    pub fn id(&self) -> u64 {
        self.inner.shared.id
    }

    /// Address of the server.
    pub fn peer(&self) -> &str {
        &self.inner.shared.peer
    }

    /// True until the connection fails or is disconnected.
    pub fn is_connected(&self) -> bool {
        self.inner.shared.is_connected()
    }

    pub fn lease_state(&self) -> LeaseState {
        self.submitter().lease
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.shared.stats.snapshot()
    }

    /// Closes the connection. Outstanding commands fail with
    /// [`BloomdError::ConnectionLost`].
    pub fn disconnect(&self) {
        if self.is_connected() {
            debug!(conn = self.id(), peer = %self.peer(), "Disconnecting");
        }
        self.inner.shared.shutdown();
    }

    /// Lists filters, optionally only those whose name starts with `prefix`.
    pub fn list(&self, prefix: Option<&str>) -> Result<Pending<Vec<FilterSummary>>> {
        let prefix = list_prefix(prefix)?;
        self.send(Request::List { prefix }, into_filters)
    }

    /// Creates a filter with server defaults.
    pub fn create(&self, name: &str) -> Result<Pending<CreateResult>> {
        self.create_with(CreateFilterArgs::named(name)?)
    }

    pub fn create_with(&self, args: CreateFilterArgs) -> Result<Pending<CreateResult>> {
        self.send(Request::Create(args), into_create)
    }

    /// Deletes a filter from memory and disk.
    pub fn drop(&self, name: &str) -> Result<Pending<Lookup<()>>> {
        self.flag(FlagVerb::Drop, name)
    }

    /// Unmaps a filter from memory, keeping it on disk.
    pub fn close(&self, name: &str) -> Result<Pending<Lookup<()>>> {
        self.flag(FlagVerb::Close, name)
    }

    pub fn flush(&self, name: &str) -> Result<Pending<Lookup<()>>> {
        self.flag(FlagVerb::Flush, name)
    }

    /// Removes a closed filter from the server's list without deleting its data.
    pub fn clear(&self, name: &str) -> Result<Pending<Lookup<ClearResult>>> {
        self.send(Request::Clear(FilterName::new(name)?), into_clear)
    }

    pub fn info(&self, name: &str) -> Result<Pending<Lookup<FilterInfo>>> {
        self.send(Request::Info(FilterName::new(name)?), into_info)
    }

    pub fn check(&self, name: &str, key: &str) -> Result<Pending<Lookup<StateResult>>> {
        self.state(StateVerb::Check, StateArgs::single(name, key)?)
    }

    /// Adds `key`. `Yes` means the key was not present before.
    pub fn set(&self, name: &str, key: &str) -> Result<Pending<Lookup<StateResult>>> {
        self.state(StateVerb::Set, StateArgs::single(name, key)?)
    }

    /// Checks several keys at once; results follow key order.
    pub fn multi<I, K>(&self, name: &str, keys: I) -> Result<Pending<Lookup<Vec<StateResult>>>>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.states(StateVerb::Multi, StateArgs::new(name, keys)?)
    }

    /// Sets several keys at once; results follow key order.
    pub fn bulk<I, K>(&self, name: &str, keys: I) -> Result<Pending<Lookup<Vec<StateResult>>>>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.states(StateVerb::Bulk, StateArgs::new(name, keys)?)
    }

    /// Queues an arbitrary request and resolves to its raw response.
    pub fn submit(&self, request: Request) -> Result<Pending<Response>> {
        self.send(request, Ok)
    }

    fn flag(&self, verb: FlagVerb, name: &str) -> Result<Pending<Lookup<()>>> {
        let filter = FilterName::new(name)?;
        self.send(Request::Flag { verb, filter }, into_flag)
    }

    fn state(&self, verb: StateVerb, args: StateArgs) -> Result<Pending<Lookup<StateResult>>> {
        self.send(Request::State { verb, args }, into_state)
    }

    fn states(
        &self,
        verb: StateVerb,
        args: StateArgs,
    ) -> Result<Pending<Lookup<Vec<StateResult>>>> {
        self.send(Request::State { verb, args }, into_states)
    }

    fn send<T>(&self, request: Request, extract: fn(Response) -> Result<T>) -> Result<Pending<T>> {
        let line = encode_line(&request.encode());
        let written = line.len();
        let submitter = self.submitter();

        if submitter.lease == LeaseState::Returned {
            return Err(BloomdError::Released);
        }
        if !self.is_connected() {
            return Err(BloomdError::NotConnected);
        }

        let (reply, rx) = oneshot::channel();
        let inflight = InFlight {
            command: request.name(),
            decoder: request.decoder(),
            reply,
        };

        // Decoder first: the reader must know about the command before the
        // server can possibly answer it.
        submitter
            .inflight
            .send(inflight)
            .map_err(|_| BloomdError::NotConnected)?;
        submitter
            .outbound
            .send(line)
            .map_err(|_| BloomdError::NotConnected)?;
        drop(submitter);

        self.inner.shared.stats.command_sent();
        trace!(conn = self.id(), command = request.name(), bytes = written, "Queued command");

        Ok(Pending { rx, extract })
    }

    /// Sets the lease state, returning the previous one.
    pub(crate) fn set_lease(&self, lease: LeaseState) -> LeaseState {
        std::mem::replace(&mut self.submitter().lease, lease)
    }

    fn submitter(&self) -> std::sync::MutexGuard<'_, Submitter> {
        self.inner
            .submitter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for BloomdClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BloomdClient")
            .field("id", &self.id())
            .field("peer", &self.peer())
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// The eventual result of a submitted command.
///
/// Dropping it does not cancel the command: the reply is still read and
/// discarded so later replies stay correlated.
#[must_use = "the command is sent regardless, but its result is lost unless awaited"]
pub struct Pending<T> {
    rx: oneshot::Receiver<Result<Response>>,
    extract: fn(Response) -> Result<T>,
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome.and_then(this.extract)),
            Poll::Ready(Err(_)) => Poll::Ready(Err(BloomdError::ConnectionLost(
                "connection dropped before replying".to_string(),
            ))),
        }
    }
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending").finish_non_exhaustive()
    }
}

fn into_filters(response: Response) -> Result<Vec<FilterSummary>> {
    match response {
        Response::Filters(filters) => Ok(filters),
        _ => Err(BloomdError::UnexpectedResponse("list")),
    }
}

fn into_create(response: Response) -> Result<CreateResult> {
    match response {
        Response::Create(result) => Ok(result),
        _ => Err(BloomdError::UnexpectedResponse("create")),
    }
}

fn into_flag(response: Response) -> Result<Lookup<()>> {
    match response {
        Response::Flag(result) => Ok(result),
        _ => Err(BloomdError::UnexpectedResponse("drop/close/flush")),
    }
}

fn into_clear(response: Response) -> Result<Lookup<ClearResult>> {
    match response {
        Response::Clear(result) => Ok(result),
        _ => Err(BloomdError::UnexpectedResponse("clear")),
    }
}

fn into_info(response: Response) -> Result<Lookup<FilterInfo>> {
    match response {
        Response::Info(result) => Ok(result),
        _ => Err(BloomdError::UnexpectedResponse("info")),
    }
}

fn into_state(response: Response) -> Result<Lookup<StateResult>> {
    match response {
        Response::State(result) => Ok(result),
        _ => Err(BloomdError::UnexpectedResponse("check/set")),
    }
}

fn into_states(response: Response) -> Result<Lookup<Vec<StateResult>>> {
    match response {
        Response::States(result) => Ok(result),
        _ => Err(BloomdError::UnexpectedResponse("multi/bulk")),
    }
}
