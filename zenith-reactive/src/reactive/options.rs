//! Construction Options
//!
//! Typed, builder-style option sets for every primitive. All of them are
//! `Default`, so `SignalOptions::default()` (or `::new()`) gives the plain
//! behavior: structural equality, the runtime's default scheduler, no name,
//! errors logged through `tracing`.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::ReactiveError;
use crate::graph::SchedulerMode;
use crate::store::{EntityBinding, EntityId, EntityStore};

/// Equality predicate deciding whether a write is a change.
pub type Equality<T> = Rc<dyn Fn(&T, &T) -> bool>;

/// Callback receiving errors routed away from the caller.
pub type ErrorHandler = Rc<dyn Fn(&ReactiveError)>;

/// Deliver a routed error to `handler`, or log it if there is none.
pub(crate) fn route_error(handler: Option<&ErrorHandler>, error: &ReactiveError) {
    match handler {
        Some(handler) => handler(error),
        None => tracing::error!(target: "zenith_reactive", %error, "unhandled reactive error"),
    }
}

/// Options for [`Signal`](crate::Signal).
pub struct SignalOptions<T> {
    pub(crate) name: Option<String>,
    pub(crate) equals: Option<Equality<T>>,
    pub(crate) scheduler: Option<SchedulerMode>,
    pub(crate) error_handler: Option<ErrorHandler>,
    pub(crate) binding: Option<EntityBinding<T>>,
}

impl<T> SignalOptions<T> {
    pub fn new() -> Self {
        Self {
            name: None,
            equals: None,
            scheduler: None,
            error_handler: None,
            binding: None,
        }
    }

    /// Diagnostic label.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replace the default `PartialEq` comparison.
    pub fn equals(mut self, equals: impl Fn(&T, &T) -> bool + 'static) -> Self {
        self.equals = Some(Rc::new(equals));
        self
    }

    /// Override the runtime's default scheduling for writes to this signal.
    pub fn scheduler(mut self, mode: SchedulerMode) -> Self {
        self.scheduler = Some(mode);
        self
    }

    pub fn error_handler(mut self, handler: impl Fn(&ReactiveError) + 'static) -> Self {
        self.error_handler = Some(Rc::new(handler));
        self
    }
}

impl<T: Serialize + 'static> SignalOptions<T> {
    /// Mirror every accepted value into `store` under `entity`.
    pub fn entity_binding(mut self, entity: EntityId, store: Arc<dyn EntityStore>) -> Self {
        self.binding = Some(EntityBinding::new(entity, store));
        self
    }
}

impl<T> Default for SignalOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SignalOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalOptions")
            .field("name", &self.name)
            .field("custom_equals", &self.equals.is_some())
            .field("scheduler", &self.scheduler)
            .field("bound", &self.binding.is_some())
            .finish()
    }
}

/// Options for [`ComputedSignal`](crate::ComputedSignal).
pub struct ComputedOptions<T> {
    pub(crate) name: Option<String>,
    pub(crate) equals: Option<Equality<T>>,
    pub(crate) lazy: bool,
    pub(crate) scheduler: Option<SchedulerMode>,
    pub(crate) error_handler: Option<ErrorHandler>,
}

impl<T> ComputedOptions<T> {
    pub fn new() -> Self {
        Self {
            name: None,
            equals: None,
            lazy: false,
            scheduler: None,
            error_handler: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn equals(mut self, equals: impl Fn(&T, &T) -> bool + 'static) -> Self {
        self.equals = Some(Rc::new(equals));
        self
    }

    /// Defer the first evaluation until the value is read.
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn scheduler(mut self, mode: SchedulerMode) -> Self {
        self.scheduler = Some(mode);
        self
    }

    pub fn error_handler(mut self, handler: impl Fn(&ReactiveError) + 'static) -> Self {
        self.error_handler = Some(Rc::new(handler));
        self
    }
}

impl<T> Default for ComputedOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for [`Effect`](crate::Effect).
#[derive(Default, Clone)]
pub struct EffectOptions {
    pub(crate) name: Option<String>,
    pub(crate) defer_start: bool,
    pub(crate) error_handler: Option<ErrorHandler>,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Skip the initial run; the effect does nothing until
    /// [`execute`](crate::Effect::execute) is called.
    pub fn defer_start(mut self, defer: bool) -> Self {
        self.defer_start = defer;
        self
    }

    pub fn error_handler(mut self, handler: impl Fn(&ReactiveError) + 'static) -> Self {
        self.error_handler = Some(Rc::new(handler));
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("name", &self.name)
            .field("defer_start", &self.defer_start)
            .finish()
    }
}

/// Largest supported retry count; keeps the backoff multiplier in range.
pub const MAX_RETRY_COUNT: u32 = 16;

/// Options for [`AsyncSignal`](crate::AsyncSignal).
pub struct AsyncOptions<T> {
    pub(crate) name: Option<String>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) retry_count: u32,
    pub(crate) retry_delay: Duration,
    pub(crate) initial_state: Option<T>,
    pub(crate) immediate: bool,
    pub(crate) equals: Option<Equality<T>>,
    pub(crate) error_handler: Option<ErrorHandler>,
}

impl<T> AsyncOptions<T> {
    pub fn new() -> Self {
        Self {
            name: None,
            timeout: None,
            retry_count: 0,
            retry_delay: Duration::from_millis(1000),
            initial_state: None,
            immediate: false,
            equals: None,
            error_handler: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Fail an attempt that has not resolved after `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Extra attempts after the first failure.
    pub fn retry_count(mut self, retries: u32) -> Self {
        self.retry_count = retries;
        self
    }

    /// Base delay; attempt `n` waits `retry_delay * 2^(n-1)` before retrying.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Value exposed before the first successful load.
    pub fn initial_state(mut self, value: T) -> Self {
        self.initial_state = Some(value);
        self
    }

    /// Start loading at construction. Requires a current `LocalSet`.
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn equals(mut self, equals: impl Fn(&T, &T) -> bool + 'static) -> Self {
        self.equals = Some(Rc::new(equals));
        self
    }

    pub fn error_handler(mut self, handler: impl Fn(&ReactiveError) + 'static) -> Self {
        self.error_handler = Some(Rc::new(handler));
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ReactiveError> {
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(ReactiveError::Construction(
                "timeout must be greater than zero".into(),
            ));
        }
        if self.retry_count > MAX_RETRY_COUNT {
            return Err(ReactiveError::Construction(format!(
                "retry_count {} exceeds the maximum of {MAX_RETRY_COUNT}",
                self.retry_count
            )));
        }
        Ok(())
    }
}

impl<T> Default for AsyncOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}
