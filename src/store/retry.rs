//! Bounded retry loops for optimistic concurrency.
//!
//! Cross-process conflicts are detected after the fact (a changed
//! modification time, a re-read that does not match), so the metadata store
//! retries instead of blocking. Running out of attempts is an outcome, not an
//! error: callers get the last best-effort value and decide what to do.

use crate::error::StorageError;

/// What one attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    /// The attempt succeeded
    Done(T),
    /// A conflict was detected; the value is the best effort so far
    Retry(T),
}

/// Result of a bounded retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retried<T> {
    Done(T),
    /// Every attempt conflicted; holds the last best-effort value, if any ran
    Exhausted(Option<T>),
}

/// Run `attempt` until it reports [`Attempt::Done`], at most `max_attempts` times.
///
/// The attempt number (starting at 0) is passed in. Errors abort the loop.
pub fn retry_bounded<T, F>(max_attempts: u32, mut attempt: F) -> Result<Retried<T>, StorageError>
where
    F: FnMut(u32) -> Result<Attempt<T>, StorageError>,
{
    let mut last = None;
    for n in 0..max_attempts {
        match attempt(n)? {
            Attempt::Done(value) => return Ok(Retried::Done(value)),
            Attempt::Retry(value) => last = Some(value),
        }
    }
    Ok(Retried::Exhausted(last))
}

/// A metadata read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome<T> {
    /// The file did not change while it was read
    Fresh(T),
    /// The file kept changing; this may miss a concurrent update
    Stale(T),
}

impl<T> ReadOutcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            ReadOutcome::Fresh(value) | ReadOutcome::Stale(value) => value,
        }
    }

    pub fn value(&self) -> &T {
        match self {
            ReadOutcome::Fresh(value) | ReadOutcome::Stale(value) => value,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, ReadOutcome::Stale(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ReadOutcome<U> {
        match self {
            ReadOutcome::Fresh(value) => ReadOutcome::Fresh(f(value)),
            ReadOutcome::Stale(value) => ReadOutcome::Stale(f(value)),
        }
    }
}

/// A metadata write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataWrite {
    /// The new value was written and verified
    Committed,
    /// The stored value already matched
    Unchanged,
    /// Concurrent writers won every attempt; the update may be lost
    Exhausted,
}
