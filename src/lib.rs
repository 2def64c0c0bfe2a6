//! # bloomd-client - An Async Client for the bloomd Bloom Filter Server
//!
//! bloomd keeps named bloom filters and speaks a simple line protocol over
//! TCP. This crate implements that protocol on Tokio, with pipelining on
//! every connection and a bounded pool on top.
//!
//! ## Features
//!
//! - **Pipelined**: Many commands in flight per connection, replies matched in order
//! - **Typed**: Every command has its own result type; "Filter does not exist" is a value
//! - **Pooled**: Bounded, fair connection pool with acquire timeouts
//! - **Fail-fast**: Arguments are validated before anything is written
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           bloomd-client                                 │
//! │                                                                         │
//! │  ┌─────────────┐  acquire/release  ┌─────────────────────────────────┐  │
//! │  │ BloomdPool  │──────────────────>│ BloomdClient (one per socket)   │  │
//! │  │ (Semaphore) │                   │  ┌────────┐        ┌────────┐   │  │
//! │  └─────────────┘                   │  │ Writer │        │ Reader │   │  │
//! │                                    │  │  task  │        │  task  │   │  │
//! │                                    │  └───┬────┘        └───▲────┘   │  │
//! │                                    └──────┼─────────────────┼────────┘  │
//! │  ┌─────────────────────────────┐          │                 │           │
//! │  │ protocol                    │          ▼                 │           │
//! │  │  args  ─ validation         │     ┌──────────────────────┴─────┐     │
//! │  │  codec ─ encode / decoders  │     │          bloomd            │     │
//! │  │  frame ─ line splitting     │     └────────────────────────────┘     │
//! │  └─────────────────────────────┘                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use bloomd_client::{BloomdPool, CreateFilterArgs, PoolConfig};
//!
//! #[tokio::main]
//! async fn main() -> bloomd_client::Result<()> {
//!     let pool = BloomdPool::new(PoolConfig::new("127.0.0.1:8673").max_connections(4))?;
//!     let client = pool.acquire().await?;
//!
//!     let args = CreateFilterArgs::new("users", Some(100_000), Some(0.0001), None)?;
//!     client.create_with(args)?.await?;
//!
//!     client.bulk("users", ["alice", "bob"])?.await?;
//!     let seen = client.multi("users", ["alice", "carol"])?.await?;
//!     println!("{:?}", seen);
//!
//!     pool.release(&client)?;
//!     pool.close_connections();
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `list [prefix]`
//! - `create name [capacity=N] [prob=F] [in_memory=0|1]`
//! - `drop name` / `close name` / `clear name` / `flush name`
//! - `c name key` / `s name key`
//! - `m name key [key ...]` / `b name key [key ...]`
//! - `info name`
//!
//! ## Module Overview
//!
//! - [`protocol`]: Request encoding, reply decoding and typed results
//! - [`connection`]: The pipelined client and its reader/writer tasks
//! - [`pool`]: The bounded connection pool
//! - [`error`]: The crate-wide error type

pub mod connection;
pub mod error;
pub mod pool;
pub mod protocol;

// Re-export commonly used types for convenience
pub use connection::{BloomdClient, LeaseState, Pending, StatsSnapshot};
pub use error::{BloomdError, Result};
pub use pool::{BloomdPool, PoolConfig, PoolStats};
pub use protocol::{
    ClearResult, CreateFilterArgs, CreateResult, FilterInfo, FilterSummary, Lookup, Request,
    Response, StateResult,
};

/// The port bloomd listens on by default
pub const DEFAULT_PORT: u16 = 8673;

/// The default bloomd host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of bloomd-client
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
