//! Connection Pool Module
//!
//! [`BloomdPool`] bounds how many connections are checked out at once and
//! reuses idle ones. Clients are acquired, used like any [`BloomdClient`],
//! and handed back with [`BloomdPool::release`].
//!
//! ## Example
//!
//! ```no_run
//! use bloomd_client::{BloomdPool, PoolConfig};
//!
//! # async fn run() -> bloomd_client::Result<()> {
//! let pool = BloomdPool::new(PoolConfig::new("127.0.0.1:8673").max_connections(4))?;
//!
//! let client = pool.acquire().await?;
//! let seen = client.check("users", "alice")?.await?;
//! pool.release(&client)?;
//!
//! pool.close_connections();
//! # let _ = seen;
//! # Ok(())
//! # }
//! ```
//!
//! [`BloomdClient`]: crate::BloomdClient

pub mod manager;

// Re-export commonly used types
pub use manager::{BloomdPool, PoolConfig, PoolStats, DEFAULT_ADDR};
