//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its body immediately to establish
//!    initial dependencies (unless `defer_start` is set).
//!
//! 2. When any dependency changes, the effect is marked stale and the next
//!    flush re-runs it once.
//!
//! 3. Before re-running, the effect unsubscribes from everything it read
//!    last time and runs the previous cleanup. Dependencies are then
//!    re-collected from scratch, so branches that are no longer taken stop
//!    triggering the effect.
//!
//! # Cleanup
//!
//! A body may return a [`Cleanup`]. It runs before the next execution and
//! when the effect is disposed.
//!
//! # Errors
//!
//! A body may fail by returning `Err` or by panicking. Either way the failure
//! becomes a `ComputationError` routed to the effect's error handler; it
//! never escapes into the flush that triggered the run.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::debug::{self, Lifecycle};
use crate::error::{ReactiveError, Result};
use crate::graph::{ComputationId, NodeKind};

use super::context::ReactiveContext;
use super::options::{route_error, EffectOptions, ErrorHandler};
use super::runtime;
use super::scope::{self, Dispose};

/// Work to undo an effect's previous run.
pub struct Cleanup(Box<dyn FnOnce()>);

impl Cleanup {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Box::new(f))
    }

    fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup(..)")
    }
}

/// Values an effect body may return.
///
/// `()` means "no cleanup"; `Cleanup` or `Option<Cleanup>` register one;
/// `Result`s report a failure through the error handler.
pub trait EffectOutcome {
    fn into_outcome(self) -> std::result::Result<Option<Cleanup>, String>;
}

impl EffectOutcome for () {
    fn into_outcome(self) -> std::result::Result<Option<Cleanup>, String> {
        Ok(None)
    }
}

impl EffectOutcome for Cleanup {
    fn into_outcome(self) -> std::result::Result<Option<Cleanup>, String> {
        Ok(Some(self))
    }
}

impl EffectOutcome for Option<Cleanup> {
    fn into_outcome(self) -> std::result::Result<Option<Cleanup>, String> {
        Ok(self)
    }
}

impl<E: fmt::Display> EffectOutcome for std::result::Result<(), E> {
    fn into_outcome(self) -> std::result::Result<Option<Cleanup>, String> {
        self.map(|()| None).map_err(|e| e.to_string())
    }
}

impl<E: fmt::Display> EffectOutcome for std::result::Result<Cleanup, E> {
    fn into_outcome(self) -> std::result::Result<Option<Cleanup>, String> {
        self.map(Some).map_err(|e| e.to_string())
    }
}

type Body = Box<dyn FnMut() -> std::result::Result<Option<Cleanup>, String>>;

/// The registry entry behind an [`Effect`] handle.
pub(crate) struct ComputationNode {
    id: ComputationId,
    kind: NodeKind,
    name: Option<String>,
    body: RefCell<Body>,
    cleanup: RefCell<Option<Cleanup>>,
    disposed: Cell<bool>,
    executing: Cell<bool>,
    stale: Cell<bool>,
    runs: Cell<u64>,
    error_handler: Option<ErrorHandler>,
}

impl ComputationNode {
    pub(crate) fn id(&self) -> ComputationId {
        self.id
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    pub(crate) fn is_stale(&self) -> bool {
        self.stale.get()
    }

    /// Flag for re-execution. A running computation is not flagged: it
    /// cannot re-enter itself, and it observes the write it caused.
    pub(crate) fn mark_stale(&self) {
        if !self.executing.get() {
            self.stale.set(true);
        }
    }

    /// Whether a pull-based read should run the body first.
    pub(crate) fn needs_run(&self) -> bool {
        self.stale.get() && !self.executing.get() && !self.disposed.get()
    }

    pub(crate) fn execute(&self) -> Result<()> {
        if self.disposed.get() || self.executing.get() {
            return Ok(());
        }
        self.executing.set(true);
        self.stale.set(false);

        runtime::clear_dependencies(self.id);

        let mut failure = None;
        let previous = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = previous {
            if let Err(message) = run_guarded(|| cleanup.run()) {
                failure = Some(self.failure(format!("cleanup failed: {message}")));
            }
        }

        let outcome = {
            let _ctx = ReactiveContext::enter(self.id);
            let mut body = self.body.borrow_mut();
            run_guarded(|| (*body)())
        };

        self.executing.set(false);
        self.runs.set(self.runs.get() + 1);
        debug::lifecycle(Lifecycle::Execute, self.kind, self.id.raw(), self.name.as_deref());

        match outcome {
            Ok(Ok(cleanup)) => *self.cleanup.borrow_mut() = cleanup,
            Ok(Err(message)) | Err(message) => failure = Some(self.failure(message)),
        }

        if self.disposed.get() {
            // Disposed by its own body: drop what this run subscribed to.
            runtime::clear_dependencies(self.id);
            self.run_cleanup();
        }

        match failure {
            Some(error) => {
                route_error(self.error_handler.as_ref(), &error);
                Err(error)
            }
            None => Ok(()),
        }
    }

    pub(crate) fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        runtime::remove_computation(self.id);
        self.run_cleanup();
        debug::lifecycle(Lifecycle::Dispose, self.kind, self.id.raw(), self.name.as_deref());
    }

    fn run_cleanup(&self) {
        let cleanup = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            if let Err(message) = run_guarded(|| cleanup.run()) {
                let error = self.failure(format!("cleanup failed: {message}"));
                route_error(self.error_handler.as_ref(), &error);
            }
        }
    }

    fn failure(&self, message: String) -> ReactiveError {
        ReactiveError::Computation {
            id: self.id.raw(),
            message,
        }
    }
}

/// Run `f`, turning a panic into an error message.
fn run_guarded<R>(f: impl FnOnce() -> R) -> std::result::Result<R, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "computation panicked".to_string()
        }
    })
}

/// A side-effecting computation that re-runs when its dependencies change.
///
/// Handles are cheap to clone and share the same computation. The
/// computation lives until [`dispose`](Effect::dispose) is called (directly
/// or through an enclosing [`ReactiveScope`](crate::ReactiveScope));
/// dropping handles does not stop it.
///
/// # Example
///
/// ```rust,ignore
/// let count = create_signal(0, SignalOptions::default());
///
/// let effect = Effect::new({
///     let count = count.clone();
///     move || println!("Count is: {}", count.get())
/// });
///
/// count.set(5); // Prints: "Count is: 5"
/// effect.dispose();
/// ```
#[derive(Clone)]
pub struct Effect {
    node: Rc<ComputationNode>,
}

impl Effect {
    /// Create and immediately run an effect.
    pub fn new<F, O>(body: F) -> Self
    where
        F: FnMut() -> O + 'static,
        O: EffectOutcome,
    {
        Self::with_options(body, EffectOptions::default())
    }

    pub fn with_options<F, O>(mut body: F, options: EffectOptions) -> Self
    where
        F: FnMut() -> O + 'static,
        O: EffectOutcome,
    {
        let effect = Self::build(
            NodeKind::Effect,
            Box::new(move || body().into_outcome()),
            options.name,
            options.error_handler,
        );
        scope::adopt(Box::new(effect.clone()));
        if !options.defer_start {
            let _ = effect.execute();
        }
        effect
    }

    /// Register a computation without adopting it into a scope or running it.
    pub(crate) fn build(
        kind: NodeKind,
        body: Body,
        name: Option<String>,
        error_handler: Option<ErrorHandler>,
    ) -> Self {
        let node = Rc::new(ComputationNode {
            id: ComputationId::next(),
            kind,
            name,
            body: RefCell::new(body),
            cleanup: RefCell::new(None),
            disposed: Cell::new(false),
            executing: Cell::new(false),
            stale: Cell::new(true),
            runs: Cell::new(0),
            error_handler,
        });
        runtime::register_computation(Rc::clone(&node));
        debug::lifecycle(Lifecycle::Create, kind, node.id.raw(), node.name.as_deref());
        Self { node }
    }

    pub fn id(&self) -> ComputationId {
        self.node.id
    }

    pub fn name(&self) -> Option<&str> {
        self.node.name.as_deref()
    }

    /// Run the body now, re-collecting dependencies.
    ///
    /// Does nothing if the effect is disposed or already running. A failure
    /// is routed to the error handler and also returned.
    pub fn execute(&self) -> Result<()> {
        self.node.execute()
    }

    /// Stop the effect: unsubscribe, run the last cleanup, and skip any
    /// flush that already has it queued.
    pub fn dispose(&self) {
        self.node.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.node.is_disposed()
    }

    /// Number of completed executions, failed ones included.
    pub fn run_count(&self) -> u64 {
        self.node.runs.get()
    }

    /// Number of signals read during the last execution.
    pub fn dependency_count(&self) -> usize {
        runtime::dependency_count(self.node.id)
    }

    pub(crate) fn node(&self) -> &ComputationNode {
        &self.node
    }
}

impl Dispose for Effect {
    fn dispose(&self) {
        Effect::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Effect::is_disposed(self)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.node.id)
            .field("name", &self.node.name)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
