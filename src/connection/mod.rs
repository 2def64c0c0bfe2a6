//! Connection Module
//!
//! One [`BloomdClient`] per TCP connection. Commands from any number of tasks
//! are pipelined: requests are written as soon as they are submitted and
//! replies are matched back to them strictly in order.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      BloomdClient                           │
//! │   check / set / multi / bulk / list / create / info / ...   │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ validate, encode, queue
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Connection tasks                            │
//! │                                                             │
//! │  ┌─────────────┐                      ┌─────────────────┐   │
//! │  │ Writer task │──── request lines ──>│                 │   │
//! │  └─────────────┘                      │     bloomd      │   │
//! │  ┌─────────────┐                      │                 │   │
//! │  │ Reader task │<─── reply lines ─────│                 │   │
//! │  └──────┬──────┘                      └─────────────────┘   │
//! │         │ head-of-queue decoder                             │
//! │         ▼                                                   │
//! │  ┌─────────────┐                                            │
//! │  │  Pending<T> │ resolved in submission order               │
//! │  └─────────────┘                                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Pipelining**: Any number of commands in flight per connection
//! - **Batched writes**: Queued requests are flushed together
//! - **Failure sweep**: A dead connection fails every outstanding command
//! - **Statistics**: Per-connection command and byte counters

pub mod client;
mod multiplexer;
pub mod stats;

// Re-export commonly used types
pub use client::{BloomdClient, LeaseState, Pending};
pub use stats::{ConnectionStats, StatsSnapshot};
