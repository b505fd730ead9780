//! Async Signal Implementation
//!
//! An AsyncSignal wraps an async producer. Its value is `None` until the
//! first successful load (or `initial_state`), and two companion signals
//! describe the load itself:
//!
//! - `loading: bool` is true while an attempt chain is in flight;
//! - `error: Option<ReactiveError>` holds the outcome of the last failed
//!   chain.
//!
//! # Attempt Chain
//!
//! [`reload`](AsyncSignal::reload) starts at most one chain at a time. Each
//! attempt calls the producer, racing it against the timeout if one is set.
//! A failed attempt is retried after `retry_delay * 2^(attempt - 1)` until
//! `retry_count` retries are used up. The chain then settles: on success the
//! value is written, `error` is cleared and `loading` drops to false; on
//! exhaustion `error` is set and `loading` drops to false. All three writes
//! happen in one batch.
//!
//! Timeouts and exhausted retries are never raised to the caller; they are
//! only visible through `error`. A chain whose signal was disposed, or that
//! was superseded by a newer chain, discards its result.
//!
//! A chain that ends without settling, because the `refresh` future or the
//! spawned task was dropped, retires its generation and clears `loading`
//! (leaving `error` as it was), so the next `reload` can start.

use std::cell::Cell;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::Rc;
use std::time::Duration;

use crate::error::{ReactiveError, Result};
use crate::graph::{NodeKind, SignalId};

use super::options::{route_error, AsyncOptions, ErrorHandler, SignalOptions};
use super::runtime::batch;
use super::scope::{self, Dispose};
use super::signal::{Signal, SignalRead};

type Pending<T> = Pin<Box<dyn Future<Output = std::result::Result<T, String>>>>;
type Producer<T> = Rc<dyn Fn() -> Pending<T>>;

/// Snapshot of an async signal's lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum AsyncState<T> {
    /// Nothing loaded yet and no load in flight.
    Idle,
    /// An attempt chain is in flight.
    Loading,
    /// A value is available.
    Ready(T),
    /// The last attempt chain failed.
    Failed(ReactiveError),
}

struct AsyncInner<T: 'static> {
    value: Signal<Option<T>>,
    loading: Signal<bool>,
    error: Signal<Option<ReactiveError>>,
    producer: Producer<T>,
    timeout: Option<Duration>,
    retry_count: u32,
    retry_delay: Duration,
    retries: Cell<u32>,
    attempts: Cell<u64>,
    generation: Cell<u64>,
    disposed: Cell<bool>,
    error_handler: Option<ErrorHandler>,
}

/// A signal fed by an async producer, with retry and timeout.
///
/// Loading runs on the current thread: [`reload`](Self::reload) and
/// `immediate` construction spawn onto the current `tokio::task::LocalSet`,
/// while [`refresh`](Self::refresh) drives the chain in the caller's future.
///
/// # Example
///
/// ```rust,ignore
/// let user = AsyncSignal::new(
///     || async { fetch_user().await },
///     AsyncOptions::new().retry_count(2).timeout(Duration::from_secs(5)),
/// )?;
///
/// user.refresh().await;
/// if user.is_success()? {
///     println!("{:?}", user.get());
/// }
/// ```
pub struct AsyncSignal<T: 'static> {
    inner: Rc<AsyncInner<T>>,
}

impl<T: Clone + PartialEq + 'static> AsyncSignal<T> {
    pub fn new<F, Fut, E>(producer: F, options: AsyncOptions<T>) -> Result<Self>
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + 'static,
        E: fmt::Display,
    {
        options.validate()?;
        let AsyncOptions {
            name,
            timeout,
            retry_count,
            retry_delay,
            initial_state,
            immediate,
            equals,
            error_handler,
        } = options;

        let companion = |suffix: &str| name.as_ref().map(|name| format!("{name}.{suffix}"));

        let mut value_options = SignalOptions::<Option<T>>::new();
        value_options.name = name.clone();
        value_options.error_handler = error_handler.clone();
        if let Some(equals) = equals {
            value_options = value_options.equals(move |a, b| match (a, b) {
                (Some(a), Some(b)) => equals(a, b),
                (None, None) => true,
                _ => false,
            });
        }
        let mut loading_options = SignalOptions::new();
        loading_options.name = companion("loading");
        let mut error_options = SignalOptions::new();
        error_options.name = companion("error");

        let producer: Producer<T> = Rc::new(move || -> Pending<T> {
            let pending = producer();
            Box::pin(async move { pending.await.map_err(|e| e.to_string()) })
        });

        let signal = Self {
            inner: Rc::new(AsyncInner {
                value: Signal::build(initial_state, NodeKind::Async, value_options),
                loading: Signal::build(false, NodeKind::Async, loading_options),
                error: Signal::build(None, NodeKind::Async, error_options),
                producer,
                timeout,
                retry_count,
                retry_delay,
                retries: Cell::new(0),
                attempts: Cell::new(0),
                generation: Cell::new(0),
                disposed: Cell::new(false),
                error_handler,
            }),
        };
        if immediate {
            if let Err(error) = signal.reload() {
                signal.dispose();
                return Err(ReactiveError::Construction(format!(
                    "immediate async signal: {error}"
                )));
            }
        }
        scope::adopt(Box::new(signal.clone()));
        Ok(signal)
    }
}

impl<T: Clone + 'static> AsyncSignal<T> {
    /// Start an attempt chain on the current `LocalSet`.
    ///
    /// Returns `Ok(false)` without doing anything if a chain is already in
    /// flight or the signal is disposed.
    ///
    /// # Errors
    ///
    /// Returns `ReactiveError::NoLocalSet` if no `tokio::task::LocalSet` is
    /// running on this thread. Nothing is started in that case.
    pub fn reload(&self) -> Result<bool> {
        let Some(chain) = self.claim() else {
            return Ok(false);
        };
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(ReactiveError::NoLocalSet);
        }
        // tokio has no query for the current LocalSet; spawn_local panics
        // before touching the task when there is none.
        let spawned = panic::catch_unwind(AssertUnwindSafe(move || {
            drop(tokio::task::spawn_local(chain.run()));
        }));
        if spawned.is_err() {
            return Err(ReactiveError::NoLocalSet);
        }
        self.start_loading();
        Ok(true)
    }

    /// Run an attempt chain to completion in the calling future.
    ///
    /// Returns immediately if a chain is already in flight or the signal is
    /// disposed. Dropping the future ends the chain and clears `loading`.
    pub async fn refresh(&self) {
        if let Some(chain) = self.claim() {
            self.start_loading();
            chain.run().await;
        }
    }

    /// Reserve a new generation for an attempt chain.
    fn claim(&self) -> Option<Chain<T>> {
        let inner = &self.inner;
        if inner.disposed.get() || inner.loading.peek().unwrap_or(true) {
            return None;
        }
        let generation = inner.generation.get() + 1;
        inner.generation.set(generation);
        inner.retries.set(0);
        Some(Chain {
            signal: self.clone(),
            generation,
            settled: false,
        })
    }

    fn start_loading(&self) {
        let inner = &self.inner;
        let started = batch(|| -> Result<()> {
            inner.loading.write(true)?;
            inner.error.write(None)?;
            Ok(())
        });
        if let Err(error) = started {
            route_error(inner.error_handler.as_ref(), &error);
        }
    }

    async fn attempt(&self) -> std::result::Result<T, ReactiveError> {
        let inner = &self.inner;
        inner.attempts.set(inner.attempts.get() + 1);
        let pending = (inner.producer)();
        match inner.timeout {
            // Dropping the producer future on timeout stops polling it; its
            // result can never be observed.
            Some(limit) => match tokio::time::timeout(limit, pending).await {
                Ok(result) => result.map_err(ReactiveError::Producer),
                Err(_) => Err(ReactiveError::Timeout(limit)),
            },
            None => pending.await.map_err(ReactiveError::Producer),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.inner
            .retry_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.inner.disposed.get() || self.inner.generation.get() != generation
    }

    fn settle(&self, value: Option<T>, error: Option<ReactiveError>) {
        let inner = &self.inner;
        let settled = batch(|| -> Result<()> {
            if let Some(value) = value {
                inner.value.write(Some(value))?;
            }
            inner.error.write(error)?;
            inner.loading.write(false)?;
            Ok(())
        });
        if let Err(error) = settled {
            route_error(inner.error_handler.as_ref(), &error);
        }
    }

    /// Current value (`None` until loaded), registering a dependency.
    pub fn read(&self) -> Result<Option<T>> {
        self.inner.value.read()
    }

    pub fn peek(&self) -> Result<Option<T>> {
        self.inner.value.peek()
    }

    /// Current value.
    ///
    /// # Panics
    ///
    /// Panics if the signal has been disposed.
    pub fn get(&self) -> Option<T> {
        self.inner.value.get()
    }

    /// Write the value directly, e.g. for an optimistic update.
    pub fn write(&self, value: Option<T>) -> Result<bool> {
        self.inner.value.write(value)
    }

    /// Whether an attempt chain is in flight (tracked).
    pub fn is_loading(&self) -> Result<bool> {
        self.inner.loading.read()
    }

    /// True iff not loading, no error, and a value is present (tracked).
    pub fn is_success(&self) -> Result<bool> {
        let loading = self.inner.loading.read()?;
        let failed = self.inner.error.with(Option::is_some)?;
        let present = self.inner.value.with(Option::is_some)?;
        Ok(!loading && !failed && present)
    }

    /// Lifecycle snapshot (tracked).
    pub fn state(&self) -> Result<AsyncState<T>> {
        if self.inner.loading.read()? {
            return Ok(AsyncState::Loading);
        }
        if let Some(error) = self.inner.error.read()? {
            return Ok(AsyncState::Failed(error));
        }
        Ok(match self.inner.value.read()? {
            Some(value) => AsyncState::Ready(value),
            None => AsyncState::Idle,
        })
    }
}

impl<T: 'static> AsyncSignal<T> {
    pub fn id(&self) -> SignalId {
        self.inner.value.id()
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.value.name()
    }

    /// The `loading` companion signal.
    pub fn loading(&self) -> &Signal<bool> {
        &self.inner.loading
    }

    /// The `error` companion signal.
    pub fn error(&self) -> &Signal<Option<ReactiveError>> {
        &self.inner.error
    }

    /// Total number of producer invocations over the signal's lifetime.
    pub fn attempts(&self) -> u64 {
        self.inner.attempts.get()
    }

    /// Retries used by the current (or last) attempt chain.
    pub fn retries(&self) -> u32 {
        self.inner.retries.get()
    }

    /// Clear `loading`, then dispose both companions and the value signal.
    /// An in-flight chain discards its result.
    pub fn dispose(&self) {
        let inner = &self.inner;
        if inner.disposed.replace(true) {
            return;
        }
        inner.generation.set(inner.generation.get() + 1);
        // Leave the last observable state consistent: nothing is loading.
        if let Err(error) = inner.loading.write(false) {
            route_error(inner.error_handler.as_ref(), &error);
        }
        inner.loading.dispose();
        inner.error.dispose();
        inner.value.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

/// One attempt chain. Dropping it before it settles (a cancelled
/// `refresh`, a dropped task) retires its generation and clears `loading`.
struct Chain<T: Clone + 'static> {
    signal: AsyncSignal<T>,
    generation: u64,
    settled: bool,
}

impl<T: Clone + 'static> Chain<T> {
    async fn run(mut self) {
        let signal = self.signal.clone();
        let inner = &signal.inner;
        let mut attempt: u32 = 0;
        loop {
            if signal.is_stale(self.generation) {
                return;
            }
            attempt += 1;
            let outcome = signal.attempt().await;
            if signal.is_stale(self.generation) {
                tracing::trace!(target: "zenith_reactive", attempt, "discarding stale async result");
                return;
            }

            let failure = match outcome {
                Ok(value) => {
                    self.settled = true;
                    signal.settle(Some(value), None);
                    return;
                }
                Err(failure) => failure,
            };

            let retries = inner.retries.get();
            if retries >= inner.retry_count {
                let error = if inner.retry_count == 0 {
                    failure
                } else {
                    ReactiveError::RetryExhausted {
                        attempts: attempt,
                        last: Box::new(failure),
                    }
                };
                tracing::debug!(target: "zenith_reactive", %error, "async load failed");
                self.settled = true;
                signal.settle(None, Some(error));
                return;
            }

            inner.retries.set(retries + 1);
            let delay = signal.backoff(attempt);
            tracing::debug!(
                target: "zenith_reactive",
                attempt,
                ?delay,
                %failure,
                "async attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

impl<T: Clone + 'static> Drop for Chain<T> {
    fn drop(&mut self) {
        if self.settled || self.signal.is_stale(self.generation) || std::thread::panicking() {
            return;
        }
        let inner = &self.signal.inner;
        inner.generation.set(self.generation + 1);
        tracing::trace!(target: "zenith_reactive", "async chain dropped before settling");
        if let Err(error) = inner.loading.write(false) {
            route_error(inner.error_handler.as_ref(), &error);
        }
    }
}

impl<T: 'static> Clone for AsyncSignal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> SignalRead<Option<T>> for AsyncSignal<T> {
    fn read(&self) -> Result<Option<T>> {
        AsyncSignal::read(self)
    }

    fn peek(&self) -> Result<Option<T>> {
        AsyncSignal::peek(self)
    }
}

impl<T: 'static> Dispose for AsyncSignal<T> {
    fn dispose(&self) {
        AsyncSignal::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        AsyncSignal::is_disposed(self)
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for AsyncSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncSignal")
            .field("value", &self.inner.value)
            .field("loading", &self.inner.loading)
            .field("error", &self.inner.error)
            .field("attempts", &self.attempts())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let signal = AsyncSignal::new(
            || async { Ok::<_, String>(1) },
            AsyncOptions::new().retry_delay(Duration::from_millis(100)),
        )
        .unwrap();

        assert_eq!(signal.backoff(1), Duration::from_millis(100));
        assert_eq!(signal.backoff(2), Duration::from_millis(200));
        assert_eq!(signal.backoff(4), Duration::from_millis(800));
    }

    #[test]
    fn starts_idle_or_with_initial_state() {
        let idle = AsyncSignal::new(|| async { Ok::<_, String>(1) }, AsyncOptions::new()).unwrap();
        assert_eq!(idle.state(), Ok(AsyncState::Idle));
        assert_eq!(idle.is_success(), Ok(false));

        let seeded = AsyncSignal::new(
            || async { Ok::<_, String>(1) },
            AsyncOptions::new().initial_state(7),
        )
        .unwrap();
        assert_eq!(seeded.state(), Ok(AsyncState::Ready(7)));
        assert_eq!(seeded.is_success(), Ok(true));
    }

    #[test]
    fn invalid_options_are_rejected() {
        let result = AsyncSignal::new(
            || async { Ok::<_, String>(1) },
            AsyncOptions::new().timeout(Duration::ZERO),
        );
        assert!(matches!(result, Err(ReactiveError::Construction(_))));
    }

    #[test]
    fn dispose_disposes_companions() {
        let signal = AsyncSignal::new(
            || async { Ok::<_, String>(1) },
            AsyncOptions::new().name("user"),
        )
        .unwrap();
        assert_eq!(signal.loading().name(), Some("user.loading"));

        signal.dispose();
        assert!(signal.loading().is_disposed());
        assert!(signal.error().is_disposed());
        assert!(matches!(signal.read(), Err(ReactiveError::Disposed { .. })));
    }
}
