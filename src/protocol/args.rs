//! Validated Command Arguments
//!
//! Arguments are plain immutable values. Each constructor performs the whole
//! validation up front, so a value that exists can always be written to the
//! wire without corrupting the request line.
//!
//! Rules:
//! - filter names and keys must be non-blank
//! - names, keys and list prefixes must not contain whitespace, since the
//!   server splits request lines on spaces
//! - `create` capacity, when given, must be at least [`MIN_CAPACITY`]
//! - `create` probability, when given, must lie strictly between 0 and 1

use crate::error::{BloomdError, Result};
use std::fmt;

/// Smallest capacity accepted by `create`.
pub const MIN_CAPACITY: u64 = 100_000;

/// A validated filter name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterName(String);

impl FilterName {
    /// Validates and wraps a filter name.
    pub fn new(name: &str) -> Result<Self> {
        check_token("filter name", name)?;
        Ok(FilterName(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated, non-blank `list` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListPrefix(String);

impl ListPrefix {
    /// Validates and wraps a list prefix.
    pub fn new(prefix: &str) -> Result<Self> {
        check_token("list prefix", prefix)?;
        Ok(ListPrefix(prefix.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validates an optional `list` prefix. A blank prefix lists everything.
pub fn list_prefix(prefix: Option<&str>) -> Result<Option<ListPrefix>> {
    match prefix {
        None => Ok(None),
        Some(p) if p.trim().is_empty() => Ok(None),
        Some(p) => ListPrefix::new(p).map(Some),
    }
}

/// Arguments of `create name [capacity=N] [prob=F] [in_memory=0|1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateFilterArgs {
    name: FilterName,
    capacity: Option<u64>,
    probability: Option<f64>,
    in_memory: Option<bool>,
}

impl CreateFilterArgs {
    /// Validates every field and builds the arguments.
    pub fn new(
        name: &str,
        capacity: Option<u64>,
        probability: Option<f64>,
        in_memory: Option<bool>,
    ) -> Result<Self> {
        let name = FilterName::new(name)?;

        if let Some(capacity) = capacity {
            if capacity < MIN_CAPACITY {
                return Err(BloomdError::invalid(format!(
                    "capacity has to be at least {}, got {}",
                    MIN_CAPACITY, capacity
                )));
            }
        }

        if let Some(prob) = probability {
            if !(prob > 0.0 && prob < 1.0) {
                return Err(BloomdError::invalid(format!(
                    "probability has to be between 0 and 1, got {}",
                    prob
                )));
            }
        }

        Ok(Self {
            name,
            capacity,
            probability,
            in_memory,
        })
    }

    /// Arguments with server-side defaults for everything but the name.
    pub fn named(name: &str) -> Result<Self> {
        Self::new(name, None, None, None)
    }

    pub fn name(&self) -> &FilterName {
        &self.name
    }

    pub fn capacity(&self) -> Option<u64> {
        self.capacity
    }

    pub fn probability(&self) -> Option<f64> {
        self.probability
    }

    pub fn in_memory(&self) -> Option<bool> {
        self.in_memory
    }
}

/// Arguments shared by check, set, multi and bulk: a filter and its keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateArgs {
    name: FilterName,
    keys: Vec<String>,
}

impl StateArgs {
    /// Validates the filter name and every key. At least one key is required.
    pub fn new<I, K>(name: &str, keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let name = FilterName::new(name)?;
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();

        if keys.is_empty() {
            return Err(BloomdError::invalid("at least one key is required"));
        }
        for key in &keys {
            check_token("key", key)?;
        }

        Ok(Self { name, keys })
    }

    /// Arguments for a single-key command.
    pub fn single(name: &str, key: &str) -> Result<Self> {
        Self::new(name, [key])
    }

    pub fn name(&self) -> &FilterName {
        &self.name
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

fn check_token(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BloomdError::invalid(format!("invalid {}: {:?}", what, value)));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(BloomdError::invalid(format!(
            "{} must not contain whitespace: {:?}",
            what, value
        )));
    }
    Ok(())
}
