//! Zenith Reactive
//!
//! Fine-grained reactive state for Rust. The crate provides:
//!
//! - Signals with automatic dependency tracking
//! - Computed signals, lazy or eager, with equality short-circuiting
//! - Effects with cleanups and error routing
//! - Async signals with retry, exponential backoff and timeouts
//! - Sync and deferred scheduling with glitch-free batching
//! - Optional persistence of signal values into an external store
//!
//! # Architecture
//!
//! - `graph`: node ids, the dependency edge arena and scheduler state
//! - `reactive`: the primitives and the per-thread runtime
//! - `store`: the external-store binding protocol
//! - `debug`: the lifecycle debug channel
//! - `error`: the error taxonomy
//!
//! # Example
//!
//! ```rust,ignore
//! use zenith_reactive::{batch, ComputedSignal, Effect, Signal};
//!
//! let count = Signal::new(0);
//!
//! let doubled = ComputedSignal::new({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! Effect::new({
//!     let (count, doubled) = (count.clone(), doubled.clone());
//!     move || println!("Count: {}, Doubled: {}", count.get(), doubled.get())
//! });
//!
//! batch(|| count.set(5));
//! // Effect runs once, prints: "Count: 5, Doubled: 10"
//! ```

pub mod debug;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod store;

pub use debug::{is_debug, set_debug};
pub use error::{ReactiveError, Result, StoreError};
pub use graph::{ComputationId, NodeKind, SchedulerMode, SignalId};
pub use reactive::{
    batch, create_async_signal, create_computed, create_effect, create_signal, flush, is_in_batch,
    untrack, AsyncOptions, AsyncSignal, AsyncState, Cleanup, ComputedOptions, ComputedSignal,
    Dispose, Effect, EffectOptions, ReactiveScope, Signal, SignalOptions, SignalRead,
};
pub use store::{EntityBinding, EntityId, EntityStore, MemoryStore};
