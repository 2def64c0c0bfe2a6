//! bloomd Wire Protocol
//!
//! bloomd is a line protocol: a request is one ASCII line, a reply is either
//! one line or a block of lines between `START` and `END`.
//!
//! ## Overview
//!
//! ```text
//! list [prefix]                      START / name prob bytes capacity size / END
//! create name [capacity=N] [prob=F]  Done | Exists | Delete in progress
//! drop|close|flush name              Done | Filter does not exist
//! clear name                         Done | Filter does not exist | not proxied
//! c|s name key                       Yes | No | Filter does not exist
//! m|b name key...                    Yes No ... | Filter does not exist
//! info name                          START / key value / END | Filter does not exist
//! ```
//!
//! ## Modules
//!
//! - `types`: Typed reply values
//! - `args`: Validated command arguments
//! - `frame`: Splitting the byte stream into lines
//! - `codec`: Request encoding and the per-command reply decoders
//!
//! ## Example
//!
//! ```
//! use bloomd_client::protocol::{Decoded, Request, Response, StateArgs, StateVerb};
//!
//! let request = Request::State {
//!     verb: StateVerb::Bulk,
//!     args: StateArgs::new("users", ["alice", "bob"]).unwrap(),
//! };
//! assert_eq!(request.encode(), "b users alice bob");
//!
//! let mut decoder = request.decoder();
//! assert!(matches!(decoder.decode("Yes No"), Decoded::Complete(Response::States(_))));
//! ```

pub mod args;
pub mod codec;
pub mod frame;
pub mod types;

// Re-export commonly used types for convenience
pub use args::{list_prefix, CreateFilterArgs, FilterName, ListPrefix, StateArgs, MIN_CAPACITY};
pub use codec::{Block, Decoded, Decoder, FlagVerb, Request, Response, StateVerb};
pub use frame::{encode_line, FrameError, LineReader, LINE_DELIMITER, MAX_LINE_LENGTH};
pub use types::{ClearResult, CreateResult, FilterInfo, FilterSummary, Lookup, StateResult};
