//! Reply Value Types
//!
//! Typed projections of what bloomd sends back. None of these are owned by
//! the client: they are snapshots of server-side state at the time of the
//! reply.
//!
//! ## Reply Lines
//!
//! ```text
//! Done                                   -> CreateResult::Done / Lookup::Found(())
//! Exists                                 -> CreateResult::Exists
//! Delete in progress                     -> CreateResult::DeleteInProgress
//! Filter does not exist                  -> Lookup::FilterNotFound
//! Filter is not proxied. Close it first. -> ClearResult::NotProxied
//! Yes No Yes                             -> [StateResult; 3]
//! ```

use std::fmt;

/// Reply marker opening a block reply.
pub const BLOCK_START: &str = "START";

/// Reply marker closing a block reply.
pub const BLOCK_END: &str = "END";

/// Generic success reply.
pub const DONE: &str = "Done";

/// Reply sent for any command addressing an unknown filter.
pub const FILTER_NOT_FOUND: &str = "Filter does not exist";

/// Reply to `create` when the filter already exists.
pub const EXISTS: &str = "Exists";

/// Reply to `create` while a previous filter of that name is being dropped.
pub const DELETE_IN_PROGRESS: &str = "Delete in progress";

/// Reply to `clear` when the filter is still loaded.
pub const NOT_PROXIED: &str = "Filter is not proxied. Close it first.";

/// Outcome of a command that addresses a named filter.
///
/// A missing filter is a normal answer from bloomd, so it is a value here
/// rather than an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// The filter exists and the command produced `T`.
    Found(T),
    /// The server replied `Filter does not exist`.
    FilterNotFound,
}

impl<T> Lookup<T> {
    /// Returns true when the filter existed.
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    /// Converts into an `Option`, discarding the not-found case.
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::FilterNotFound => None,
        }
    }

    /// Maps the found value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Lookup::Found(value) => Lookup::Found(f(value)),
            Lookup::FilterNotFound => Lookup::FilterNotFound,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Lookup<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Found(value) => write!(f, "{}", value),
            Lookup::FilterNotFound => write!(f, "{}", FILTER_NOT_FOUND),
        }
    }
}

/// Result of a `create` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateResult {
    /// The filter was created.
    Done,
    /// A filter with that name already exists.
    Exists,
    /// A filter with that name is still being deleted.
    DeleteInProgress,
}

impl fmt::Display for CreateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreateResult::Done => write!(f, "{}", DONE),
            CreateResult::Exists => write!(f, "{}", EXISTS),
            CreateResult::DeleteInProgress => write!(f, "{}", DELETE_IN_PROGRESS),
        }
    }
}

/// Result of a `clear` command on an existing filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearResult {
    /// The filter was removed from the server's bookkeeping.
    Cleared,
    /// The filter is still loaded and must be closed first.
    NotProxied,
}

impl fmt::Display for ClearResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClearResult::Cleared => write!(f, "{}", DONE),
            ClearResult::NotProxied => write!(f, "{}", NOT_PROXIED),
        }
    }
}

/// Per-key answer of the check/set family.
///
/// For `set`, `Yes` means the key was newly added. For `check`, `Yes` means
/// the key is (probably) present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateResult {
    Yes,
    No,
}

impl StateResult {
    pub(crate) fn parse(token: &str) -> Option<Self> {
        match token {
            "Yes" => Some(StateResult::Yes),
            "No" => Some(StateResult::No),
            _ => None,
        }
    }

    /// Returns true for `Yes`.
    pub fn is_yes(self) -> bool {
        self == StateResult::Yes
    }
}

impl fmt::Display for StateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateResult::Yes => write!(f, "Yes"),
            StateResult::No => write!(f, "No"),
        }
    }
}

/// One row of a `list` reply: `name prob sizeBytes capacity size`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSummary {
    pub name: String,
    /// Configured false-positive probability.
    pub probability: f64,
    /// Bytes used by the filter's bitmaps.
    pub size_bytes: u64,
    pub capacity: u64,
    /// Number of keys added so far.
    pub size: u64,
}

impl fmt::Display for FilterSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.name, self.probability, self.size_bytes, self.capacity, self.size
        )
    }
}

/// Statistics returned by `info`.
///
/// Keys the server sends that are not listed here are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterInfo {
    pub capacity: u64,
    pub checks: u64,
    pub check_hits: u64,
    pub check_misses: u64,
    pub in_memory: bool,
    pub page_ins: u64,
    pub page_outs: u64,
    pub probability: f64,
    pub sets: u64,
    pub set_hits: u64,
    pub set_misses: u64,
    pub size: u64,
    pub storage: u64,
}

impl fmt::Display for FilterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "capacity {}", self.capacity)?;
        writeln!(f, "checks {}", self.checks)?;
        writeln!(f, "check_hits {}", self.check_hits)?;
        writeln!(f, "check_misses {}", self.check_misses)?;
        writeln!(f, "in_memory {}", u8::from(self.in_memory))?;
        writeln!(f, "page_ins {}", self.page_ins)?;
        writeln!(f, "page_outs {}", self.page_outs)?;
        writeln!(f, "probability {}", self.probability)?;
        writeln!(f, "sets {}", self.sets)?;
        writeln!(f, "set_hits {}", self.set_hits)?;
        writeln!(f, "set_misses {}", self.set_misses)?;
        writeln!(f, "size {}", self.size)?;
        write!(f, "storage {}", self.storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_helpers() {
        let found = Lookup::Found(3);
        assert!(found.is_found());
        assert_eq!(found.clone().map(|n| n * 2), Lookup::Found(6));
        assert_eq!(found.found(), Some(3));

        let missing: Lookup<u32> = Lookup::FilterNotFound;
        assert!(!missing.is_found());
        assert_eq!(missing.found(), None);
    }

    #[test]
    fn test_state_tokens() {
        assert_eq!(StateResult::parse("Yes"), Some(StateResult::Yes));
        assert_eq!(StateResult::parse("No"), Some(StateResult::No));
        assert_eq!(StateResult::parse("yes"), None);
        assert_eq!(StateResult::parse(""), None);
    }

    #[test]
    fn test_display_matches_wire_text() {
        assert_eq!(CreateResult::DeleteInProgress.to_string(), "Delete in progress");
        assert_eq!(ClearResult::NotProxied.to_string(), NOT_PROXIED);
        assert_eq!(
            Lookup::<StateResult>::FilterNotFound.to_string(),
            "Filter does not exist"
        );
    }

    #[test]
    fn test_info_display_lists_every_field() {
        let info = FilterInfo {
            capacity: 100_000,
            in_memory: true,
            ..FilterInfo::default()
        };
        let text = info.to_string();
        assert!(text.starts_with("capacity 100000\n"));
        assert!(text.contains("in_memory 1\n"));
        assert_eq!(text.lines().count(), 13);
    }
}
