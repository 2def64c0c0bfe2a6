//! Command Codec
//!
//! A [`Request`] is a typed command. It knows how to render its request line
//! and which [`Decoder`] understands the reply. Decoders form a closed set,
//! one variant per reply shape, and each variant carries its own
//! accumulation state:
//!
//! ```text
//! Request::List      -> Decoder::List    START / rows / END
//! Request::Info      -> Decoder::Info    START / key value / END, or not-found
//! Request::Create    -> Decoder::Create  Done | Exists | Delete in progress
//! Request::Clear     -> Decoder::Clear   Done | not-found | not proxied
//! Request::Flag      -> Decoder::Flag    Done | not-found      (drop/close/flush)
//! Request::State     -> Decoder::State   Yes/No tokens | not-found
//! ```
//!
//! ## Decoding
//!
//! [`Decoder::decode`] is fed one line at a time and answers with a
//! [`Decoded`]:
//!
//! - `Partial` - the line was consumed, more lines belong to this reply
//! - `Complete` - the reply is finished
//! - `Failed` - the reply is finished but malformed; the stream is still aligned
//! - `Corrupt` - malformed in a way that leaves the stream position unknown
//!   (for example a bad row in the middle of a block reply)
//!
//! The request line never includes the delimiter; framing adds it.

use crate::error::BloomdError;
use crate::protocol::args::{CreateFilterArgs, FilterName, ListPrefix, StateArgs};
use crate::protocol::types::{
    ClearResult, CreateResult, FilterInfo, FilterSummary, Lookup, StateResult, BLOCK_END,
    BLOCK_START, DELETE_IN_PROGRESS, DONE, EXISTS, FILTER_NOT_FOUND, NOT_PROXIED,
};
use std::str::FromStr;

/// Prefixes bloomd uses for error replies.
const SERVER_ERROR_PREFIXES: [&str; 2] = ["Client Error", "Internal Error"];

/// Commands answering with a bare `Done` or not-found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagVerb {
    Drop,
    Close,
    Flush,
}

impl FlagVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            FlagVerb::Drop => "drop",
            FlagVerb::Close => "close",
            FlagVerb::Flush => "flush",
        }
    }
}

/// Commands of the check/set family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateVerb {
    Check,
    Set,
    Multi,
    Bulk,
}

impl StateVerb {
    /// The single-letter command sent on the wire.
    pub fn token(self) -> &'static str {
        match self {
            StateVerb::Check => "c",
            StateVerb::Set => "s",
            StateVerb::Multi => "m",
            StateVerb::Bulk => "b",
        }
    }

    /// Single-key verbs unwrap the reply to one value.
    pub fn is_single(self) -> bool {
        matches!(self, StateVerb::Check | StateVerb::Set)
    }

    pub fn name(self) -> &'static str {
        match self {
            StateVerb::Check => "check",
            StateVerb::Set => "set",
            StateVerb::Multi => "multi",
            StateVerb::Bulk => "bulk",
        }
    }
}

/// A typed command ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    List { prefix: Option<ListPrefix> },
    Create(CreateFilterArgs),
    Flag { verb: FlagVerb, filter: FilterName },
    Clear(FilterName),
    Info(FilterName),
    State { verb: StateVerb, args: StateArgs },
}

impl Request {
    /// Command name, for logging and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Request::List { .. } => "list",
            Request::Create(_) => "create",
            Request::Flag { verb, .. } => verb.as_str(),
            Request::Clear(_) => "clear",
            Request::Info(_) => "info",
            Request::State { verb, .. } => verb.name(),
        }
    }

    /// Renders the request line, without delimiter.
    pub fn encode(&self) -> String {
        match self {
            Request::List { prefix: None } => "list".to_string(),
            Request::List {
                prefix: Some(prefix),
            } => format!("list {}", prefix),
            Request::Create(args) => {
                let mut line = format!("create {}", args.name());
                if let Some(capacity) = args.capacity() {
                    line.push_str(&format!(" capacity={}", capacity));
                }
                if let Some(prob) = args.probability() {
                    line.push_str(&format!(" prob={}", prob));
                }
                if let Some(in_memory) = args.in_memory() {
                    line.push_str(&format!(" in_memory={}", u8::from(in_memory)));
                }
                line
            }
            Request::Flag { verb, filter } => format!("{} {}", verb.as_str(), filter),
            Request::Clear(filter) => format!("clear {}", filter),
            Request::Info(filter) => format!("info {}", filter),
            Request::State { verb, args } => {
                let mut line = format!("{} {}", verb.token(), args.name());
                for key in args.keys() {
                    line.push(' ');
                    line.push_str(key);
                }
                line
            }
        }
    }

    /// A fresh decoder for this request's reply.
    pub fn decoder(&self) -> Decoder {
        match self {
            Request::List { .. } => Decoder::List(Block::AwaitingStart),
            Request::Create(_) => Decoder::Create,
            Request::Flag { .. } => Decoder::Flag,
            Request::Clear(_) => Decoder::Clear,
            Request::Info(_) => Decoder::Info(Block::AwaitingStart),
            Request::State { verb, args } => Decoder::State {
                single: verb.is_single(),
                keys: args.keys().len(),
            },
        }
    }
}

/// A fully decoded reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Filters(Vec<FilterSummary>),
    Create(CreateResult),
    Flag(Lookup<()>),
    Clear(Lookup<ClearResult>),
    Info(Lookup<FilterInfo>),
    State(Lookup<StateResult>),
    States(Lookup<Vec<StateResult>>),
}

/// Outcome of feeding one line to a decoder.
#[derive(Debug)]
pub enum Decoded {
    Partial,
    Complete(Response),
    Failed(BloomdError),
    Corrupt(BloomdError),
}

/// Progress through a `START` ... `END` block.
#[derive(Debug, Clone, PartialEq)]
pub enum Block<T> {
    AwaitingStart,
    Collecting(T),
}

/// Reply decoder, one variant per reply shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoder {
    List(Block<Vec<FilterSummary>>),
    Create,
    Flag,
    Clear,
    Info(Block<FilterInfo>),
    State { single: bool, keys: usize },
}

impl Decoder {
    /// Feeds one reply line. Block state is reset whenever the reply finishes,
    /// successfully or not.
    pub fn decode(&mut self, line: &str) -> Decoded {
        match self {
            Decoder::List(block) => decode_list(block, line),
            Decoder::Info(block) => decode_info(block, line),
            Decoder::Create => single_line(line, |line| match line {
                DONE => Some(Response::Create(CreateResult::Done)),
                EXISTS => Some(Response::Create(CreateResult::Exists)),
                DELETE_IN_PROGRESS => Some(Response::Create(CreateResult::DeleteInProgress)),
                _ => None,
            }),
            Decoder::Flag => single_line(line, |line| match line {
                DONE => Some(Response::Flag(Lookup::Found(()))),
                FILTER_NOT_FOUND => Some(Response::Flag(Lookup::FilterNotFound)),
                _ => None,
            }),
            Decoder::Clear => single_line(line, |line| match line {
                DONE => Some(Response::Clear(Lookup::Found(ClearResult::Cleared))),
                NOT_PROXIED => Some(Response::Clear(Lookup::Found(ClearResult::NotProxied))),
                FILTER_NOT_FOUND => Some(Response::Clear(Lookup::FilterNotFound)),
                _ => None,
            }),
            Decoder::State { single, keys } => decode_state(*single, *keys, line),
        }
    }

    /// True while a block reply has been opened but not closed.
    pub fn in_block(&self) -> bool {
        matches!(
            self,
            Decoder::List(Block::Collecting(_)) | Decoder::Info(Block::Collecting(_))
        )
    }
}

fn server_error(line: &str) -> Option<BloomdError> {
    SERVER_ERROR_PREFIXES
        .iter()
        .any(|prefix| line.starts_with(prefix))
        .then(|| BloomdError::Server(line.to_string()))
}

fn single_line(line: &str, map: impl FnOnce(&str) -> Option<Response>) -> Decoded {
    if let Some(response) = map(line) {
        return Decoded::Complete(response);
    }
    match server_error(line) {
        Some(err) => Decoded::Failed(err),
        None => Decoded::Failed(BloomdError::protocol(format!(
            "unexpected reply: {:?}",
            line
        ))),
    }
}

fn decode_state(single: bool, keys: usize, line: &str) -> Decoded {
    if line == FILTER_NOT_FOUND {
        return Decoded::Complete(if single {
            Response::State(Lookup::FilterNotFound)
        } else {
            Response::States(Lookup::FilterNotFound)
        });
    }
    if let Some(err) = server_error(line) {
        return Decoded::Failed(err);
    }

    let mut results = Vec::with_capacity(keys);
    for token in line.split(' ') {
        match StateResult::parse(token) {
            Some(result) => results.push(result),
            None => {
                return Decoded::Failed(BloomdError::protocol(format!(
                    "invalid state reply: {:?}",
                    line
                )))
            }
        }
    }

    if results.len() != keys {
        return Decoded::Failed(BloomdError::protocol(format!(
            "expected {} results, got {}: {:?}",
            keys,
            results.len(),
            line
        )));
    }

    if single {
        Decoded::Complete(Response::State(Lookup::Found(results[0])))
    } else {
        Decoded::Complete(Response::States(Lookup::Found(results)))
    }
}

fn decode_list(block: &mut Block<Vec<FilterSummary>>, line: &str) -> Decoded {
    match std::mem::replace(block, Block::AwaitingStart) {
        Block::AwaitingStart => match line {
            BLOCK_START => {
                *block = Block::Collecting(Vec::new());
                Decoded::Partial
            }
            _ => match server_error(line) {
                Some(err) => Decoded::Failed(err),
                None => Decoded::Corrupt(BloomdError::protocol(format!(
                    "expected START, got {:?}",
                    line
                ))),
            },
        },
        Block::Collecting(mut filters) => match line {
            BLOCK_END => Decoded::Complete(Response::Filters(filters)),
            BLOCK_START => Decoded::Corrupt(BloomdError::protocol(
                "START not expected, list already open",
            )),
            _ => match parse_filter_row(line) {
                Ok(filter) => {
                    filters.push(filter);
                    *block = Block::Collecting(filters);
                    Decoded::Partial
                }
                Err(err) => Decoded::Corrupt(err),
            },
        },
    }
}

fn decode_info(block: &mut Block<FilterInfo>, line: &str) -> Decoded {
    match std::mem::replace(block, Block::AwaitingStart) {
        Block::AwaitingStart => match line {
            BLOCK_START => {
                *block = Block::Collecting(FilterInfo::default());
                Decoded::Partial
            }
            FILTER_NOT_FOUND => Decoded::Complete(Response::Info(Lookup::FilterNotFound)),
            _ => match server_error(line) {
                Some(err) => Decoded::Failed(err),
                None => Decoded::Corrupt(BloomdError::protocol(format!(
                    "expected START, got {:?}",
                    line
                ))),
            },
        },
        Block::Collecting(mut info) => match line {
            BLOCK_END => Decoded::Complete(Response::Info(Lookup::Found(info))),
            BLOCK_START => Decoded::Corrupt(BloomdError::protocol(
                "START not expected, info already open",
            )),
            _ => match apply_info_line(&mut info, line) {
                Ok(()) => {
                    *block = Block::Collecting(info);
                    Decoded::Partial
                }
                Err(err) => Decoded::Corrupt(err),
            },
        },
    }
}

fn parse_filter_row(line: &str) -> Result<FilterSummary, BloomdError> {
    let parts: Vec<&str> = line.split(' ').collect();
    if parts.len() != 5 {
        return Err(BloomdError::protocol(format!(
            "invalid filter row: {:?}",
            line
        )));
    }

    Ok(FilterSummary {
        name: parts[0].to_string(),
        probability: parse_field(parts[1], line)?,
        size_bytes: parse_field(parts[2], line)?,
        capacity: parse_field(parts[3], line)?,
        size: parse_field(parts[4], line)?,
    })
}

fn apply_info_line(info: &mut FilterInfo, line: &str) -> Result<(), BloomdError> {
    // Only known keys are checked; a value with spaces never parses.
    let (key, value) = line.split_once(' ').unwrap_or((line, ""));
    match key {
        "capacity" => info.capacity = parse_field(value, line)?,
        "checks" => info.checks = parse_field(value, line)?,
        "check_hits" => info.check_hits = parse_field(value, line)?,
        "check_misses" => info.check_misses = parse_field(value, line)?,
        "in_memory" => info.in_memory = parse_field::<u8>(value, line)? == 1,
        "page_ins" => info.page_ins = parse_field(value, line)?,
        "page_outs" => info.page_outs = parse_field(value, line)?,
        "probability" => info.probability = parse_field(value, line)?,
        "sets" => info.sets = parse_field(value, line)?,
        "set_hits" => info.set_hits = parse_field(value, line)?,
        "set_misses" => info.set_misses = parse_field(value, line)?,
        "size" => info.size = parse_field(value, line)?,
        "storage" => info.storage = parse_field(value, line)?,
        _ => {}
    }
    Ok(())
}

fn parse_field<T: FromStr>(value: &str, line: &str) -> Result<T, BloomdError> {
    value
        .parse()
        .map_err(|_| BloomdError::protocol(format!("invalid value {:?} in {:?}", value, line)))
}
