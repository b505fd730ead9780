//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! the current computation is registered as a subscriber.
//!
//! # Implementation
//!
//! We use a thread-local stack. Running a computation pushes its id;
//! [`untrack`] pushes an empty entry so that reads inside it register
//! nothing. Entries are popped by a guard, so the previous context is
//! restored even if the computation panics.

use std::cell::RefCell;

use crate::graph::ComputationId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Option<ComputationId>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    entry: Option<ComputationId>,
}

impl ReactiveContext {
    /// Make `computation` the tracking target until the guard is dropped.
    pub fn enter(computation: ComputationId) -> Self {
        Self::push(Some(computation))
    }

    /// Suspend tracking until the guard is dropped.
    pub fn untracked() -> Self {
        Self::push(None)
    }

    fn push(entry: Option<ComputationId>) -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(entry));
        Self { entry }
    }

    /// The computation that reads should currently register with, if any.
    pub fn current() -> Option<ComputationId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().copied().flatten())
    }

    /// Check if reads are currently tracked.
    pub fn is_tracking() -> bool {
        Self::current().is_some()
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert_eq!(
                popped,
                Some(self.entry),
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.entry,
                popped
            );
        });
    }
}

/// Run `f` without registering any dependencies.
///
/// Reads inside `f` behave like [`peek`](crate::Signal::peek) even when
/// called from inside an effect or computed body.
///
/// # Example
///
/// ```rust,ignore
/// create_effect(move || {
///     let tracked = a.get();
///     let ignored = untrack(|| b.get());
/// }, EffectOptions::default());
/// ```
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}
