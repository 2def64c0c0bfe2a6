//! Bounded Connection Pool
//!
//! Hands out [`BloomdClient`]s to callers, never keeping more than
//! `max_connections` checked out at once.
//!
//! ## Design
//!
//! ```text
//!   acquire()                                  release(client)
//!      │                                            │
//!      ▼                                            ▼
//!  Semaphore (FIFO, max_connections permits)   checked_out.remove(id)
//!      │ permit, within acquire_timeout             │
//!      ▼                                            ├─ healthy ─> idle (LIFO)
//!  idle.pop()  ── none / unhealthy ──> connect()    └─ broken ──> dropped
//!      │                                            │
//!      ▼                                            ▼
//!  checked_out[id] = (client, permit)          permit dropped, next waiter runs
//! ```
//!
//! A permit is held for exactly as long as a client is checked out, so the
//! semaphore's waiter queue is the queue of blocked `acquire` calls and they
//! are served in arrival order.
//!
//! Releasing flips the client to [`LeaseState::Returned`] before anyone else
//! can acquire it, so a handle kept by the previous holder fails with
//! [`BloomdError::Released`] instead of interleaving commands with the new
//! holder.

use crate::connection::{BloomdClient, LeaseState};
use crate::error::{BloomdError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Default bloomd address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8673";

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Server address, `host:port`
    pub addr: String,
    /// Upper bound on connections checked out at the same time
    pub max_connections: usize,
    /// Limit for establishing a new connection
    pub connect_timeout: Duration,
    /// Limit for waiting on a free slot
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            max_connections: 1,
            connect_timeout: Duration::from_millis(2000),
            acquire_timeout: Duration::from_millis(2000),
        }
    }
}

impl PoolConfig {
    /// Default configuration for the given address.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections owned by the pool (idle + checked out)
    pub open: usize,
    pub idle: usize,
    pub checked_out: usize,
}

struct Lease {
    client: BloomdClient,
    permit: OwnedSemaphorePermit,
}

#[derive(Default)]
struct PoolState {
    /// Most recently released last
    idle: Vec<BloomdClient>,
    checked_out: HashMap<u64, Lease>,
    closed: bool,
}

struct PoolInner {
    config: PoolConfig,
    permits: Arc<Semaphore>,
    state: Mutex<PoolState>,
}

/// A bounded pool of bloomd connections. Cloning shares the pool.
#[derive(Clone)]
pub struct BloomdPool {
    inner: Arc<PoolInner>,
}

impl BloomdPool {
    /// Creates an empty pool. Connections are opened lazily by `acquire`.
    pub fn new(config: PoolConfig) -> Result<Self> {
        if config.max_connections == 0 {
            return Err(BloomdError::invalid("max_connections has to be at least 1"));
        }

        debug!(
            addr = %config.addr,
            max_connections = config.max_connections,
            "Created connection pool"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                permits: Arc::new(Semaphore::new(config.max_connections)),
                config,
                state: Mutex::new(PoolState::default()),
            }),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Checks out a connected client, waiting up to `acquire_timeout` for a
    /// free slot.
    pub async fn acquire(&self) -> Result<BloomdClient> {
        if self.state().closed {
            return Err(BloomdError::PoolClosed);
        }

        let permit = self.wait_for_slot().await?;
        let client = match self.take_idle() {
            Some(client) => client,
            None => self.open_connection().await?,
        };

        let mut state = self.state();
        if state.closed {
            drop(state);
            client.disconnect();
            return Err(BloomdError::PoolClosed);
        }

        client.set_lease(LeaseState::CheckedOut);
        state.checked_out.insert(
            client.id(),
            Lease {
                client: client.clone(),
                permit,
            },
        );
        debug!(conn = client.id(), checked_out = state.checked_out.len(), "Acquired connection");

        Ok(client)
    }

    /// Returns a client to the pool and wakes the oldest waiting `acquire`.
    ///
    /// Fails with [`BloomdError::NotCheckedOut`] if `client` is not currently
    /// checked out of this pool; nothing changes in that case.
    pub fn release(&self, client: &BloomdClient) -> Result<()> {
        let mut state = self.state();
        if state.closed {
            return Err(BloomdError::PoolClosed);
        }

        let Lease { client, permit } = state
            .checked_out
            .remove(&client.id())
            .ok_or(BloomdError::NotCheckedOut(client.id()))?;

        client.set_lease(LeaseState::Returned);
        if client.is_connected() {
            debug!(conn = client.id(), "Released connection");
            state.idle.push(client);
        } else {
            debug!(conn = client.id(), "Dropping released connection, no longer active");
        }
        drop(state);

        // Last, so the woken waiter sees the idle connection.
        drop(permit);
        Ok(())
    }

    /// Closes every connection, idle or checked out, and fails all current
    /// and future `acquire` and `release` calls with [`BloomdError::PoolClosed`].
    ///
    /// Calling it again does nothing.
    pub fn close_connections(&self) {
        let (idle, leased) = {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.closed = true;
            (
                std::mem::take(&mut state.idle),
                std::mem::take(&mut state.checked_out),
            )
        };

        self.inner.permits.close();

        let count = idle.len() + leased.len();
        for client in idle {
            client.disconnect();
        }
        for (_, lease) in leased {
            lease.client.set_lease(LeaseState::Returned);
            lease.client.disconnect();
        }

        info!(addr = %self.inner.config.addr, connections = count, "Connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state();
        PoolStats {
            open: state.idle.len() + state.checked_out.len(),
            idle: state.idle.len(),
            checked_out: state.checked_out.len(),
        }
    }

    async fn wait_for_slot(&self) -> Result<OwnedSemaphorePermit> {
        let wait = self.inner.config.acquire_timeout;
        match timeout(wait, Arc::clone(&self.inner.permits).acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(BloomdError::PoolClosed),
            Err(_) => {
                debug!(timeout = ?wait, "Timed out waiting for a connection");
                Err(BloomdError::AcquireTimeout(wait))
            }
        }
    }

    /// Pops the most recently used idle connection that is still active.
    fn take_idle(&self) -> Option<BloomdClient> {
        let mut state = self.state();
        while let Some(client) = state.idle.pop() {
            if client.is_connected() {
                return Some(client);
            }
            debug!(conn = client.id(), "Discarding idle connection, no longer active");
            client.disconnect();
        }
        None
    }

    async fn open_connection(&self) -> Result<BloomdClient> {
        let config = &self.inner.config;
        match BloomdClient::connect(&config.addr, config.connect_timeout).await {
            Ok(client) => Ok(client),
            Err(e) => {
                warn!(addr = %config.addr, error = %e, "Failed to open connection");
                Err(e)
            }
        }
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for BloomdPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomdPool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}
