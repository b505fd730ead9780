//! Reactive Primitives
//!
//! This module implements the reactive engine: signals, computed signals,
//! effects, async signals, and the runtime that schedules them.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. Reading it inside a running
//! computation registers the computation as a subscriber. Writing a value
//! that differs from the current one (under the signal's equality) notifies
//! every subscriber.
//!
//! ## Computed Signals
//!
//! A ComputedSignal is a read-only signal derived from other signals. It
//! recomputes when a dependency changes and only notifies its own
//! subscribers when the derived value actually changes.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects synchronize reactive state with external
//! systems.
//!
//! ## Async Signals
//!
//! An AsyncSignal is fed by an async producer, with `loading` and `error`
//! companion signals and retry/timeout handling.
//!
//! # Implementation Notes
//!
//! The engine keeps the dependency graph in a per-thread runtime, with edges
//! stored as ids in both directions. Handles never own each other through
//! the graph, so there are no reference cycles; nodes are torn down
//! explicitly with `dispose()` or in bulk through a [`ReactiveScope`].

mod async_signal;
mod computed;
mod context;
mod effect;
pub mod options;
mod runtime;
mod scope;
mod signal;

use std::fmt;
use std::future::Future;

pub use async_signal::{AsyncSignal, AsyncState};
pub use computed::ComputedSignal;
pub use context::{untrack, ReactiveContext};
pub use effect::{Cleanup, Effect, EffectOutcome};
pub use options::{
    AsyncOptions, ComputedOptions, EffectOptions, Equality, ErrorHandler, SignalOptions,
    MAX_RETRY_COUNT,
};
pub use runtime::{
    batch, clear_tick_hook, default_scheduler, flush, graph_is_consistent, has_pending,
    is_in_batch, set_default_scheduler, set_max_flush_rounds, set_tick_hook, tokio_tick_hook,
    FlushTask, TickHook,
};
pub use scope::{Dispose, ReactiveScope};
pub use signal::{Signal, SignalRead, SignalStats};

use crate::error::Result;

/// Create a signal.
pub fn create_signal<T: PartialEq + 'static>(initial: T, options: SignalOptions<T>) -> Signal<T> {
    Signal::with_options(initial, options)
}

/// Create a computed signal.
pub fn create_computed<T, F>(derive: F, options: ComputedOptions<T>) -> ComputedSignal<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn() -> T + 'static,
{
    ComputedSignal::with_options(derive, options)
}

/// Create an effect. It runs once now unless `defer_start` is set.
pub fn create_effect<F, O>(body: F, options: EffectOptions) -> Effect
where
    F: FnMut() -> O + 'static,
    O: EffectOutcome,
{
    Effect::with_options(body, options)
}

/// Create an async signal.
///
/// # Errors
///
/// Returns `ReactiveError::Construction` for invalid options.
pub fn create_async_signal<T, F, Fut, E>(producer: F, options: AsyncOptions<T>) -> Result<AsyncSignal<T>>
where
    T: Clone + PartialEq + 'static,
    F: Fn() -> Fut + 'static,
    Fut: Future<Output = std::result::Result<T, E>> + 'static,
    E: fmt::Display,
{
    AsyncSignal::new(producer, options)
}
