//! Computed Signal Implementation
//!
//! A ComputedSignal is a read-only signal whose value is derived from other
//! signals and kept current by an owned computation.
//!
//! # How Computed Signals Work
//!
//! 1. The owned computation evaluates the derivation and writes the result
//!    into the signal slot through the normal equality-gated write. A
//!    recomputation that yields an equal value therefore notifies nobody.
//!
//! 2. Eager computed signals evaluate at construction. Lazy ones evaluate on
//!    the first read.
//!
//! 3. When a dependency changes, the computation is marked stale. The next
//!    flush recomputes it, but a read that happens first (inside a batch,
//!    or from an effect earlier in the same flush round) recomputes on the
//!    spot. Reads never observe a value derived from outdated inputs.

use std::fmt;

use crate::error::{ReactiveError, Result};
use crate::graph::{ComputationId, NodeKind, SignalId};

use super::effect::{Cleanup, Effect};
use super::options::{ComputedOptions, SignalOptions};
use super::scope::{self, Dispose};
use super::signal::{Signal, SignalRead};

/// A read-only signal derived from other signals.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
/// let doubled = ComputedSignal::new({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct ComputedSignal<T: 'static> {
    slot: Signal<Option<T>>,
    effect: Effect,
}

impl<T: Clone + PartialEq + 'static> ComputedSignal<T> {
    /// Create an eager computed signal.
    pub fn new(derive: impl Fn() -> T + 'static) -> Self {
        Self::with_options(derive, ComputedOptions::default())
    }

    pub fn with_options(derive: impl Fn() -> T + 'static, options: ComputedOptions<T>) -> Self {
        Self::try_with_options(move || Ok(derive()), options)
    }

    /// Create a computed signal from a fallible derivation.
    ///
    /// An `Err` is routed to the error handler and the previous value is
    /// kept.
    pub fn try_new(derive: impl Fn() -> Result<T> + 'static) -> Self {
        Self::try_with_options(derive, ComputedOptions::default())
    }

    pub fn try_with_options(
        derive: impl Fn() -> Result<T> + 'static,
        options: ComputedOptions<T>,
    ) -> Self {
        let ComputedOptions {
            name,
            equals,
            lazy,
            scheduler,
            error_handler,
        } = options;

        let mut slot_options = SignalOptions::<Option<T>>::new();
        slot_options.name = name.clone();
        slot_options.scheduler = scheduler;
        slot_options.error_handler = error_handler.clone();
        if let Some(equals) = equals {
            slot_options = slot_options.equals(move |a, b| match (a, b) {
                (Some(a), Some(b)) => equals(a, b),
                (None, None) => true,
                _ => false,
            });
        }
        let slot = Signal::build(None, NodeKind::Computed, slot_options);

        let target = slot.clone();
        let effect = Effect::build(
            NodeKind::Computed,
            Box::new(move || -> std::result::Result<Option<Cleanup>, String> {
                let value = derive().map_err(|e| e.to_string())?;
                target
                    .write(Some(value))
                    .map(|_| None)
                    .map_err(|e| e.to_string())
            }),
            name,
            error_handler,
        );

        let computed = Self { slot, effect };
        scope::adopt(Box::new(computed.clone()));
        if !lazy {
            let _ = computed.effect.execute();
        }
        computed
    }
}

impl<T: 'static> ComputedSignal<T> {
    /// Id of the signal slot readers subscribe to.
    pub fn id(&self) -> SignalId {
        self.slot.id()
    }

    /// Id of the owned computation.
    pub fn computation_id(&self) -> ComputationId {
        self.effect.id()
    }

    pub fn name(&self) -> Option<&str> {
        self.slot.name()
    }

    /// Computed values are read-only; this always fails.
    pub fn write(&self, _value: T) -> Result<bool> {
        Err(ReactiveError::ReadOnly {
            id: self.slot.id().raw(),
        })
    }

    /// Dispose the owned computation, then the signal slot.
    pub fn dispose(&self) {
        self.effect.dispose();
        self.slot.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.slot.is_disposed()
    }

    /// Number of times the derivation has run.
    pub fn run_count(&self) -> u64 {
        self.effect.run_count()
    }

    pub fn subscriber_count(&self) -> usize {
        self.slot.subscriber_count()
    }

    /// Recompute now if a dependency changed since the last run.
    fn refresh(&self) -> Option<ReactiveError> {
        if self.effect.node().needs_run() {
            self.effect.execute().err()
        } else {
            None
        }
    }

    fn settle(&self, value: Option<T>, failure: Option<ReactiveError>) -> Result<T> {
        value.ok_or_else(|| {
            failure.unwrap_or_else(|| ReactiveError::Computation {
                id: self.effect.id().raw(),
                message: "no value has been computed".into(),
            })
        })
    }
}

impl<T: Clone + 'static> ComputedSignal<T> {
    /// Get the current value, registering a dependency.
    pub fn read(&self) -> Result<T> {
        let failure = self.refresh();
        let value = self.slot.read()?;
        self.settle(value, failure)
    }

    /// Get the current value without registering a dependency.
    pub fn peek(&self) -> Result<T> {
        let failure = self.refresh();
        let value = self.slot.peek()?;
        self.settle(value, failure)
    }

    /// Get the current value.
    ///
    /// # Panics
    ///
    /// Panics if the computed signal was disposed or has never produced a
    /// value.
    pub fn get(&self) -> T {
        match self.read() {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }
}

impl<T: 'static> Clone for ComputedSignal<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            effect: self.effect.clone(),
        }
    }
}

impl<T: Clone + 'static> SignalRead<T> for ComputedSignal<T> {
    fn read(&self) -> Result<T> {
        ComputedSignal::read(self)
    }

    fn peek(&self) -> Result<T> {
        ComputedSignal::peek(self)
    }
}

impl<T: 'static> Dispose for ComputedSignal<T> {
    fn dispose(&self) {
        ComputedSignal::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        ComputedSignal::is_disposed(self)
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for ComputedSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedSignal")
            .field("slot", &self.slot)
            .field("run_count", &self.run_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::batch;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[test]
    fn eager_computed_runs_on_creation() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();

        let computed = ComputedSignal::new(move || {
            counter.set(counter.get() + 1);
            42
        });

        assert_eq!(calls.get(), 1);
        assert_eq!(computed.get(), 42);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn lazy_computed_runs_on_first_read() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();

        let computed = ComputedSignal::with_options(
            move || {
                counter.set(counter.get() + 1);
                42
            },
            ComputedOptions::new().lazy(true),
        );

        assert_eq!(calls.get(), 0);
        assert_eq!(computed.get(), 42);
        assert_eq!(computed.get(), 42);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn computed_follows_source_eager_and_lazy() {
        for lazy in [false, true] {
            let count = Signal::new(0);
            let doubled = ComputedSignal::with_options(
                {
                    let count = count.clone();
                    move || count.get() * 2
                },
                ComputedOptions::new().lazy(lazy),
            );

            count.set(5);
            assert_eq!(doubled.get(), 10);
        }
    }

    #[test]
    fn computed_is_read_only() {
        let computed = ComputedSignal::new(|| 1);
        assert_eq!(
            computed.write(2),
            Err(ReactiveError::ReadOnly {
                id: computed.id().raw()
            })
        );
        assert_eq!(computed.get(), 1);
    }

    #[test]
    fn equal_result_does_not_notify_downstream() {
        let count = Signal::new(1);
        let parity = count.map(|v| v % 2);
        let runs = Rc::new(Cell::new(0));

        let _effect = crate::reactive::Effect::new({
            let parity = parity.clone();
            let runs = runs.clone();
            move || {
                parity.get();
                runs.set(runs.get() + 1);
            }
        });
        assert_eq!(runs.get(), 1);

        count.set(3);
        assert_eq!(parity.run_count(), 2);
        assert_eq!(runs.get(), 1);

        count.set(4);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn custom_equality_applies_to_results() {
        let source = Signal::new(10);
        let bucket = ComputedSignal::with_options(
            {
                let source = source.clone();
                move || source.get()
            },
            ComputedOptions::new().equals(|a: &i32, b: &i32| a / 10 == b / 10),
        );

        source.set(15);
        assert_eq!(bucket.get(), 10);
        source.set(25);
        assert_eq!(bucket.get(), 25);
    }

    #[test]
    fn diamond_dependency_runs_effect_once() {
        let a = Signal::new(1);
        let b = a.map(|v| v * 2);
        let c = a.map(|v| v + 1);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let _effect = crate::reactive::Effect::new({
            let (b, c, seen) = (b.clone(), c.clone(), seen.clone());
            move || seen.borrow_mut().push((b.get(), c.get()))
        });

        a.set(2);
        assert_eq!(*seen.borrow(), vec![(2, 2), (4, 3)]);
    }

    #[test]
    fn read_inside_batch_is_fresh() {
        let count = Signal::new(1);
        let doubled = count.map(|v| v * 2);

        batch(|| {
            count.set(4);
            assert_eq!(doubled.get(), 8);
        });
        assert_eq!(doubled.run_count(), 2);
    }

    #[test]
    fn failing_derivation_keeps_previous_value() {
        let source = Signal::new(1);
        let errors = Rc::new(Cell::new(0));
        let sink = errors.clone();

        let checked = ComputedSignal::try_with_options(
            {
                let source = source.clone();
                move || {
                    let v = source.read()?;
                    if v < 0 {
                        return Err(ReactiveError::Construction("negative".into()));
                    }
                    Ok(v)
                }
            },
            ComputedOptions::new().error_handler(move |_| sink.set(sink.get() + 1)),
        );

        source.set(-1);
        assert_eq!(errors.get(), 1);
        assert_eq!(checked.get(), 1);

        source.set(2);
        assert_eq!(checked.get(), 2);
    }

    #[test]
    fn failing_first_run_surfaces_error_on_read() {
        let computed = ComputedSignal::<i32>::try_with_options(
            || Err(ReactiveError::Producer("unavailable".into())),
            ComputedOptions::new().error_handler(|_| {}),
        );
        assert!(matches!(
            computed.read(),
            Err(ReactiveError::Computation { .. })
        ));
    }

    #[test]
    fn dispose_disposes_computation_and_slot() {
        let source = Signal::new(1);
        let doubled = source.map(|v| v * 2);
        doubled.dispose();

        assert!(doubled.is_disposed());
        assert!(matches!(
            doubled.read(),
            Err(ReactiveError::Disposed {
                kind: NodeKind::Computed,
                ..
            })
        ));
        assert_eq!(source.subscriber_count(), 0);
    }
}
