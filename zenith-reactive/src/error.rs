//! Error Types
//!
//! Every failure the reactive core can report is a [`ReactiveError`]. How an
//! error reaches user code depends on its class:
//!
//! - `Disposed`, `Construction` and `ReadOnly` are returned directly to the
//!   caller of the failing operation.
//! - `Computation` and `StoreSync` are caught at the boundary of
//!   `execute()`/`write()` and routed to the node's error handler (or the
//!   default `tracing` logger). They never abort a flush.
//! - `Producer`, `Timeout` and `RetryExhausted` are only ever observed through
//!   an async signal's `error` companion.

use std::time::Duration;

use thiserror::Error;

use crate::graph::NodeKind;

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

/// Errors produced by the reactive graph.
///
/// The type is `Clone + PartialEq` so it can be stored in a signal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A disposed node was read or written.
    #[error("{kind} #{id} was accessed after it was disposed")]
    Disposed { kind: NodeKind, id: u64 },

    /// Options passed to a constructor were invalid.
    #[error("invalid options: {0}")]
    Construction(String),

    /// An external write was attempted on a computed signal.
    #[error("computed signal #{id} is read-only")]
    ReadOnly { id: u64 },

    /// An effect or computed body (or its cleanup) failed.
    #[error("computation #{id} failed: {message}")]
    Computation { id: u64, message: String },

    /// The external store rejected a snapshot or removal.
    #[error("store sync failed for signal #{signal}: {message}")]
    StoreSync { signal: u64, message: String },

    /// An async producer resolved with an error.
    #[error("async producer failed: {0}")]
    Producer(String),

    /// An async producer did not resolve before its deadline.
    #[error("async producer timed out after {0:?}")]
    Timeout(Duration),

    /// Every attempt of an async producer failed.
    #[error("all {attempts} attempts failed, last error: {last}")]
    RetryExhausted {
        attempts: u32,
        last: Box<ReactiveError>,
    },

    /// An async load was started outside a `tokio::task::LocalSet`.
    #[error("no tokio LocalSet is running on this thread")]
    NoLocalSet,

    /// A flush kept producing new writes past the round limit.
    #[error("flush exceeded {rounds} rounds; remaining notifications were dropped")]
    FlushOverflow { rounds: usize },
}

impl ReactiveError {
    /// Whether this error is returned synchronously to the caller rather
    /// than routed to an error handler.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ReactiveError::Disposed { .. }
                | ReactiveError::Construction(_)
                | ReactiveError::ReadOnly { .. }
                | ReactiveError::NoLocalSet
        )
    }
}

/// Errors returned by [`EntityStore`](crate::store::EntityStore)
/// implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The signal value could not be turned into a snapshot.
    #[error("snapshot serialization failed: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// The store refused the operation.
    #[error("store rejected the operation: {0}")]
    Rejected(String),
}

impl StoreError {
    pub(crate) fn into_reactive(self, signal: u64) -> ReactiveError {
        ReactiveError::StoreSync {
            signal,
            message: self.to_string(),
        }
    }
}
