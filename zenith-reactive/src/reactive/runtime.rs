//! Reactive Runtime
//!
//! The runtime is the execution root that connects signals and
//! computations. It owns the dependency graph, the scheduler state and the
//! registry of live computations.
//!
//! # How It Works
//!
//! 1. A signal read inside a running computation adds a graph edge.
//! 2. An accepted write marks the signal's subscribers stale and hands the
//!    signal to the scheduler.
//! 3. A flush takes the pending signals, unions their subscribers into one
//!    deduplicated queue and executes each stale computation exactly once.
//!    Writes made during the round are picked up by the next round.
//!
//! # Thread Model
//!
//! Each thread has its own runtime, and signal handles are `!Send`, so the
//! graph always has exactly one mutator. No user code runs while any of the
//! runtime's cells is borrowed.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::debug;
use crate::error::ReactiveError;
use crate::graph::{
    ComputationId, DependencyGraph, Scheduler, SchedulerMode, SignalId, WriteAction,
};

use super::context::ReactiveContext;
use super::effect::ComputationNode;
use super::options::route_error;

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
}

/// Host callback that arranges for a [`FlushTask`] to run on a later tick.
pub type TickHook = Rc<dyn Fn(FlushTask)>;

/// A pending deferred flush handed to the host's tick hook.
///
/// Must be run on the thread that created it.
#[must_use = "a deferred flush only happens when the task is run"]
pub struct FlushTask {
    _thread_bound: std::marker::PhantomData<Rc<()>>,
}

impl FlushTask {
    /// Run the deferred flush.
    pub fn run(self) {
        RUNTIME.with(|rt| rt.scheduler.borrow_mut().tick_fired());
        flush();
    }
}

pub(crate) struct Runtime {
    graph: RefCell<DependencyGraph>,
    scheduler: RefCell<Scheduler>,
    computations: RefCell<HashMap<ComputationId, Rc<ComputationNode>>>,
    default_mode: Cell<SchedulerMode>,
    tick_hook: RefCell<Option<TickHook>>,
}

impl Runtime {
    fn new() -> Self {
        Self {
            graph: RefCell::new(DependencyGraph::new()),
            scheduler: RefCell::new(Scheduler::new()),
            computations: RefCell::new(HashMap::new()),
            default_mode: Cell::new(SchedulerMode::Sync),
            tick_hook: RefCell::new(None),
        }
    }

    fn computation(&self, id: ComputationId) -> Option<Rc<ComputationNode>> {
        self.computations.borrow().get(&id).cloned()
    }

    fn mark_subscribers_stale(&self, signal: SignalId) {
        let graph = self.graph.borrow();
        let computations = self.computations.borrow();
        for id in graph.subscribers(signal) {
            if let Some(node) = computations.get(&id) {
                node.mark_stale();
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Graph maintenance (crate-internal)
// ----------------------------------------------------------------------------

/// Register a computation so flushes can find it by id.
pub(crate) fn register_computation(node: Rc<ComputationNode>) {
    RUNTIME.with(|rt| {
        rt.computations.borrow_mut().insert(node.id(), node);
    });
}

/// Drop a computation from the registry and the graph.
pub(crate) fn remove_computation(id: ComputationId) {
    RUNTIME.with(|rt| {
        rt.graph.borrow_mut().remove_computation(id);
        rt.computations.borrow_mut().remove(&id);
    });
}

/// Record a read of `signal` by the current computation, if any.
pub(crate) fn track_read(signal: SignalId) {
    let Some(computation) = ReactiveContext::current() else {
        return;
    };
    RUNTIME.with(|rt| {
        // A computation that disposed itself mid-run must not gain edges.
        if rt.computations.borrow().contains_key(&computation) {
            rt.graph.borrow_mut().add_edge(signal, computation);
        }
    });
}

pub(crate) fn clear_dependencies(computation: ComputationId) {
    RUNTIME.with(|rt| {
        rt.graph.borrow_mut().clear_dependencies(computation);
    });
}

pub(crate) fn remove_signal(signal: SignalId) {
    RUNTIME.with(|rt| {
        rt.graph.borrow_mut().remove_signal(signal);
        rt.scheduler.borrow_mut().discard(signal);
    });
}

pub(crate) fn subscriber_count(signal: SignalId) -> usize {
    RUNTIME.with(|rt| rt.graph.borrow().subscriber_count(signal))
}

pub(crate) fn dependency_count(computation: ComputationId) -> usize {
    RUNTIME.with(|rt| rt.graph.borrow().dependency_count(computation))
}

/// Check that subscriber and dependency sets mirror each other.
pub fn graph_is_consistent() -> bool {
    RUNTIME.with(|rt| rt.graph.borrow().is_consistent())
}

/// Propagate an accepted write of `signal`.
pub(crate) fn notify_write(signal: SignalId, mode: Option<SchedulerMode>) {
    let action = RUNTIME.with(|rt| {
        rt.mark_subscribers_stale(signal);
        let mode = mode.unwrap_or(rt.default_mode.get());
        rt.scheduler.borrow_mut().on_write(signal, mode)
    });
    match action {
        WriteAction::FlushNow => flush(),
        WriteAction::ScheduleTick => request_tick(),
        WriteAction::Wait => {}
    }
}

fn request_tick() {
    let hook = RUNTIME.with(|rt| rt.tick_hook.borrow().clone());
    match hook {
        Some(hook) => hook(FlushTask {
            _thread_bound: std::marker::PhantomData,
        }),
        None => {
            tracing::trace!(target: "zenith_reactive", "deferred flush waiting for an explicit flush()");
        }
    }
}

// ----------------------------------------------------------------------------
// Public scheduling surface
// ----------------------------------------------------------------------------

/// Run every computation affected by pending writes.
///
/// Each affected computation executes at most once per round, no matter how
/// many of its dependencies changed. Does nothing if a flush is already
/// running on this thread; that flush will pick up any new writes.
pub fn flush() {
    let started = RUNTIME.with(|rt| rt.scheduler.borrow_mut().begin_flush());
    if !started {
        return;
    }

    struct FlushGuard;

    impl Drop for FlushGuard {
        fn drop(&mut self) {
            RUNTIME.with(|rt| rt.scheduler.borrow_mut().end_flush());
        }
    }

    let _guard = FlushGuard;
    let max_rounds = RUNTIME.with(|rt| rt.scheduler.borrow().max_rounds());
    let mut round = 0;

    loop {
        let dirty = RUNTIME.with(|rt| rt.scheduler.borrow_mut().take_pending());
        if dirty.is_empty() {
            break;
        }
        round += 1;
        if round > max_rounds {
            let dropped = RUNTIME.with(|rt| rt.scheduler.borrow_mut().clear_pending());
            tracing::warn!(
                target: "zenith_reactive",
                dropped = dropped + dirty.len(),
                "dropping notifications of a flush that did not settle"
            );
            route_error(None, &ReactiveError::FlushOverflow { rounds: max_rounds });
            break;
        }

        let queue = RUNTIME.with(|rt| rt.graph.borrow().affected_by(&dirty));
        debug::flush_round(round, dirty.len(), queue.len());

        for id in queue {
            let Some(node) = RUNTIME.with(|rt| rt.computation(id)) else {
                continue;
            };
            if node.is_disposed() || !node.is_stale() {
                continue;
            }
            // Errors were already routed to the node's handler.
            let _ = node.execute();
        }
    }
}

/// Coalesce every write made inside `f` into a single flush.
///
/// Nested batches share the outermost batch; only its exit flushes.
///
/// # Example
///
/// ```rust,ignore
/// batch(|| {
///     a.set(1);
///     b.set(2);
/// }); // effects reading both run once, seeing a = 1 and b = 2
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    RUNTIME.with(|rt| rt.scheduler.borrow_mut().enter_batch());

    struct BatchGuard;

    impl Drop for BatchGuard {
        fn drop(&mut self) {
            let depth = RUNTIME.with(|rt| rt.scheduler.borrow_mut().exit_batch());
            if depth == 0 && !std::thread::panicking() {
                flush();
            }
        }
    }

    let _guard = BatchGuard;
    f()
}

/// Whether a batch is open on this thread.
pub fn is_in_batch() -> bool {
    RUNTIME.with(|rt| rt.scheduler.borrow().is_batching())
}

/// Whether writes are waiting for a flush.
pub fn has_pending() -> bool {
    RUNTIME.with(|rt| rt.scheduler.borrow().has_pending())
}

/// Scheduling used by signals that do not set their own.
pub fn set_default_scheduler(mode: SchedulerMode) {
    RUNTIME.with(|rt| rt.default_mode.set(mode));
}

pub fn default_scheduler() -> SchedulerMode {
    RUNTIME.with(|rt| rt.default_mode.get())
}

/// Install the host callback used to defer flushes.
///
/// Without a hook, deferred writes wait until [`flush`] is called, a sync
/// write flushes, or a batch closes.
pub fn set_tick_hook(hook: impl Fn(FlushTask) + 'static) {
    RUNTIME.with(|rt| *rt.tick_hook.borrow_mut() = Some(Rc::new(hook)));
}

pub fn clear_tick_hook() {
    RUNTIME.with(|rt| *rt.tick_hook.borrow_mut() = None);
}

/// A tick hook that runs deferred flushes as tasks on the current
/// `tokio::task::LocalSet`.
pub fn tokio_tick_hook() -> impl Fn(FlushTask) + 'static {
    |task: FlushTask| {
        tokio::task::spawn_local(async move {
            task.run();
        });
    }
}

/// Limit on flush rounds before pending writes are dropped.
pub fn set_max_flush_rounds(rounds: usize) {
    RUNTIME.with(|rt| rt.scheduler.borrow_mut().set_max_rounds(rounds));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_tracks_nesting() {
        assert!(!is_in_batch());
        batch(|| {
            assert!(is_in_batch());
            batch(|| assert!(is_in_batch()));
            assert!(is_in_batch());
        });
        assert!(!is_in_batch());
    }

    #[test]
    fn batch_returns_closure_value() {
        assert_eq!(batch(|| 42), 42);
    }

    #[test]
    fn default_scheduler_round_trips() {
        assert_eq!(default_scheduler(), SchedulerMode::Sync);
        set_default_scheduler(SchedulerMode::Deferred);
        assert_eq!(default_scheduler(), SchedulerMode::Deferred);
        set_default_scheduler(SchedulerMode::Sync);
    }

    #[test]
    fn flush_without_pending_is_noop() {
        assert!(!has_pending());
        flush();
        assert!(!has_pending());
    }
}
