//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a running computation, the signal
//!    registers that computation as a subscriber.
//!
//! 2. A write is compared against the current value with the signal's
//!    equality predicate. Equal values are ignored entirely.
//!
//! 3. An accepted write is mirrored into the bound external store (if any)
//!    and handed to the scheduler, which re-runs the subscribers.
//!
//! # Ownership
//!
//! The subscriber set lives in the runtime's graph as ids, so a signal never
//! keeps a computation alive and vice versa. Signals must be disposed
//! explicitly, or through the [`ReactiveScope`](crate::ReactiveScope) that
//! created them; after that every access fails with `Disposed`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use crate::debug::{self, Lifecycle};
use crate::error::{ReactiveError, Result};
use crate::graph::{NodeKind, SchedulerMode, SignalId};
use crate::store::EntityBinding;

use super::computed::ComputedSignal;
use super::options::{route_error, Equality, ErrorHandler, SignalOptions};
use super::runtime;
use super::scope::{self, Dispose};

/// Access counters and timestamps of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalStats {
    /// Successful reads, tracked or not.
    pub reads: u64,
    /// Accepted writes (writes of an equal value are not counted).
    pub writes: u64,
    pub created_at: Instant,
    pub last_read: Option<Instant>,
    pub last_write: Option<Instant>,
}

impl SignalStats {
    fn new() -> Self {
        Self {
            reads: 0,
            writes: 0,
            created_at: Instant::now(),
            last_read: None,
            last_write: None,
        }
    }
}

struct SignalInner<T> {
    id: SignalId,
    kind: NodeKind,
    name: Option<String>,
    value: RefCell<T>,
    equals: Equality<T>,
    scheduler: Option<SchedulerMode>,
    binding: RefCell<Option<EntityBinding<T>>>,
    error_handler: Option<ErrorHandler>,
    disposed: Cell<bool>,
    stats: Cell<SignalStats>,
}

/// A reactive cell holding a value of type `T`.
///
/// Handles are cheap to clone; clones share the same cell.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T: PartialEq + 'static> Signal<T> {
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self::with_options(value, SignalOptions::default())
    }

    pub fn with_options(value: T, options: SignalOptions<T>) -> Self {
        let signal = Self::build(value, NodeKind::Signal, options);
        scope::adopt(Box::new(signal.clone()));
        signal
    }

    /// Create a signal without adopting it into the active scope.
    pub(crate) fn build(value: T, kind: NodeKind, options: SignalOptions<T>) -> Self {
        let equals: Equality<T> = match options.equals {
            Some(equals) => equals,
            None => Rc::new(|a: &T, b: &T| a == b),
        };
        let signal = Self {
            inner: Rc::new(SignalInner {
                id: SignalId::next(),
                kind,
                name: options.name,
                value: RefCell::new(value),
                equals,
                scheduler: options.scheduler,
                binding: RefCell::new(options.binding),
                error_handler: options.error_handler,
                disposed: Cell::new(false),
                stats: Cell::new(SignalStats::new()),
            }),
        };
        debug::lifecycle(Lifecycle::Create, kind, signal.id().raw(), signal.name());
        signal.sync_store();
        signal
    }
}

impl<T: 'static> Signal<T> {
    /// Get the signal's unique ID.
    pub fn id(&self) -> SignalId {
        self.inner.id
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Borrow the value, registering a dependency if a computation is
    /// running.
    ///
    /// `f` must not write to this signal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.ensure_live()?;
        self.record_read();
        runtime::track_read(self.inner.id);
        let value = self.inner.value.borrow();
        Ok(f(&value))
    }

    /// Borrow the value without registering a dependency.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.ensure_live()?;
        self.record_read();
        let value = self.inner.value.borrow();
        Ok(f(&value))
    }

    /// Store a new value and notify subscribers.
    ///
    /// Returns `Ok(false)` if the value equals the current one, in which case
    /// nothing is notified.
    pub fn write(&self, value: T) -> Result<bool> {
        self.ensure_live()?;
        let unchanged = (self.inner.equals)(&self.inner.value.borrow(), &value);
        if unchanged {
            return Ok(false);
        }

        let previous = self.inner.value.replace(value);
        drop(previous);

        let mut stats = self.inner.stats.get();
        stats.writes += 1;
        stats.last_write = Some(Instant::now());
        self.inner.stats.set(stats);
        debug::lifecycle(Lifecycle::Write, self.inner.kind, self.id().raw(), self.name());

        self.sync_store();
        runtime::notify_write(self.inner.id, self.inner.scheduler);
        Ok(true)
    }

    /// Compute the next value from the current one and write it.
    ///
    /// The current value is read untracked.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<bool> {
        let next = self.with_untracked(f)?;
        self.write(next)
    }

    /// Store a new value.
    ///
    /// # Panics
    ///
    /// Panics if the signal has been disposed. Use [`write`](Self::write) to
    /// handle that case.
    pub fn set(&self, value: T) {
        if let Err(error) = self.write(value) {
            panic!("{error}");
        }
    }

    /// Dispose the signal: detach it from every subscriber, drop it from any
    /// pending flush and remove its external-store entry.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        runtime::remove_signal(self.inner.id);
        let binding = self.inner.binding.borrow_mut().take();
        if let Some(binding) = binding {
            if let Err(error) = binding.detach(self.inner.id) {
                self.report(error.into_reactive(self.id().raw()));
            }
        }
        debug::lifecycle(Lifecycle::Dispose, self.inner.kind, self.id().raw(), self.name());
    }

    /// Number of computations that read this signal during their last run.
    pub fn subscriber_count(&self) -> usize {
        runtime::subscriber_count(self.inner.id)
    }

    pub fn stats(&self) -> SignalStats {
        self.inner.stats.get()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.inner.disposed.get() {
            return Err(ReactiveError::Disposed {
                kind: self.inner.kind,
                id: self.inner.id.raw(),
            });
        }
        Ok(())
    }

    fn record_read(&self) {
        let mut stats = self.inner.stats.get();
        stats.reads += 1;
        stats.last_read = Some(Instant::now());
        self.inner.stats.set(stats);
        debug::lifecycle(Lifecycle::Read, self.inner.kind, self.id().raw(), self.name());
    }

    fn sync_store(&self) {
        let binding = self.inner.binding.borrow().clone();
        let Some(binding) = binding else {
            return;
        };
        let result = {
            let value = self.inner.value.borrow();
            binding.sync(self.inner.id, &value)
        };
        if let Err(error) = result {
            self.report(error.into_reactive(self.id().raw()));
        }
    }

    fn report(&self, error: ReactiveError) {
        route_error(self.inner.error_handler.as_ref(), &error);
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Get the current value, registering a dependency.
    pub fn read(&self) -> Result<T> {
        self.with(T::clone)
    }

    /// Get the current value without registering a dependency.
    pub fn peek(&self) -> Result<T> {
        self.with_untracked(T::clone)
    }

    /// Get the current value.
    ///
    /// # Panics
    ///
    /// Panics if the signal has been disposed. Use [`read`](Self::read) to
    /// handle that case.
    pub fn get(&self) -> T {
        match self.read() {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Dispose for Signal<T> {
    fn dispose(&self) {
        Signal::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Signal::is_disposed(self)
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Signal");
        s.field("id", &self.inner.id).field("name", &self.inner.name);
        match self.inner.value.try_borrow() {
            Ok(value) => s.field("value", &*value),
            Err(_) => s.field("value", &"<borrowed>"),
        };
        s.field("disposed", &self.is_disposed()).finish()
    }
}

/// Read access shared by every signal-like handle.
///
/// Also provides the `map`/`filter` derivations.
pub trait SignalRead<T: Clone + 'static>: Clone + 'static {
    /// Read and register a dependency.
    fn read(&self) -> Result<T>;

    /// Read without registering a dependency.
    fn peek(&self) -> Result<T>;

    /// Derive a computed signal by applying `f` to every value.
    fn map<U, F>(&self, f: F) -> ComputedSignal<U>
    where
        U: Clone + PartialEq + 'static,
        F: Fn(&T) -> U + 'static,
    {
        let source = self.clone();
        ComputedSignal::try_new(move || source.read().map(|value| f(&value)))
    }

    /// Derive a computed signal that is `None` whenever `predicate` rejects
    /// the current value.
    fn filter<P>(&self, predicate: P) -> ComputedSignal<Option<T>>
    where
        T: PartialEq,
        P: Fn(&T) -> bool + 'static,
    {
        let source = self.clone();
        ComputedSignal::try_new(move || {
            source
                .read()
                .map(|value| predicate(&value).then_some(value))
        })
    }
}

impl<T: Clone + 'static> SignalRead<T> for Signal<T> {
    fn read(&self) -> Result<T> {
        Signal::read(self)
    }

    fn peek(&self) -> Result<T> {
        Signal::peek(self)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
