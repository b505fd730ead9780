//! Update Scheduler
//!
//! The scheduler decides *when* dirty signals propagate. It never runs
//! computations itself; it only answers "what should happen after this
//! write?" and hands out the pending set one round at a time.
//!
//! # Algorithm
//!
//! 1. A write adds the signal to the pending set.
//! 2. Inside a batch, or while a flush is already running, nothing else
//!    happens: the batch exit (or the running flush's next round) picks the
//!    signal up.
//! 3. Otherwise a `Sync` signal flushes immediately, and a `Deferred` signal
//!    requests one host tick if none is outstanding.
//! 4. A flush takes the whole pending set per round, so writes made during a
//!    round start a fresh one. Rounds are bounded by `max_rounds`.

use indexmap::IndexSet;
use smallvec::SmallVec;

use super::node::SignalId;

/// Upper bound on flush rounds before pending writes are dropped.
pub const DEFAULT_MAX_FLUSH_ROUNDS: usize = 100;

/// How a write outside a batch reaches its subscribers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchedulerMode {
    /// Flush synchronously before the write returns.
    #[default]
    Sync,

    /// Coalesce into one flush on the next host tick.
    Deferred,
}

/// What the caller should do after recording a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    /// Run a flush now.
    FlushNow,

    /// Ask the host for a tick that will run the flush.
    ScheduleTick,

    /// A batch exit, running flush or outstanding tick will handle it.
    Wait,
}

/// Batching and pending-write state for one runtime.
#[derive(Debug)]
pub struct Scheduler {
    batch_depth: usize,
    pending: IndexSet<SignalId>,
    flushing: bool,
    tick_requested: bool,
    max_rounds: usize,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            batch_depth: 0,
            pending: IndexSet::new(),
            flushing: false,
            tick_requested: false,
            max_rounds: DEFAULT_MAX_FLUSH_ROUNDS,
        }
    }

    /// Enter a (possibly nested) batch. Returns the new depth.
    pub fn enter_batch(&mut self) -> usize {
        self.batch_depth += 1;
        self.batch_depth
    }

    /// Leave a batch. Returns the remaining depth; zero means the outermost
    /// batch just closed and a flush is due.
    pub fn exit_batch(&mut self) -> usize {
        self.batch_depth = self.batch_depth.saturating_sub(1);
        self.batch_depth
    }

    pub fn is_batching(&self) -> bool {
        self.batch_depth > 0
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    pub fn set_max_rounds(&mut self, rounds: usize) {
        self.max_rounds = rounds.max(1);
    }

    /// Record a write and decide how it propagates.
    pub fn on_write(&mut self, signal: SignalId, mode: SchedulerMode) -> WriteAction {
        self.pending.insert(signal);
        if self.batch_depth > 0 || self.flushing {
            return WriteAction::Wait;
        }
        match mode {
            SchedulerMode::Sync => WriteAction::FlushNow,
            SchedulerMode::Deferred if self.tick_requested => WriteAction::Wait,
            SchedulerMode::Deferred => {
                self.tick_requested = true;
                WriteAction::ScheduleTick
            }
        }
    }

    /// Called when a requested tick fires.
    pub fn tick_fired(&mut self) {
        self.tick_requested = false;
    }

    /// Mark the start of a flush. Returns `false` if one is already running.
    ///
    /// A flush drains everything a requested tick would have, so the next
    /// deferred write may request a fresh tick.
    pub fn begin_flush(&mut self) -> bool {
        if self.flushing {
            return false;
        }
        self.flushing = true;
        self.tick_requested = false;
        true
    }

    pub fn end_flush(&mut self) {
        self.flushing = false;
    }

    /// Take the current pending set, leaving it empty for the next round.
    pub fn take_pending(&mut self) -> SmallVec<[SignalId; 8]> {
        self.pending.drain(..).collect()
    }

    /// Drop a signal from the pending set (it was disposed).
    pub fn discard(&mut self, signal: SignalId) {
        self.pending.shift_remove(&signal);
    }

    /// Drop every pending write. Returns how many were dropped.
    pub fn clear_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_write_flushes_now() {
        let mut scheduler = Scheduler::new();
        let action = scheduler.on_write(SignalId::from(1), SchedulerMode::Sync);
        assert_eq!(action, WriteAction::FlushNow);
        assert!(scheduler.has_pending());
    }

    #[test]
    fn batched_writes_wait_for_outermost_exit() {
        let mut scheduler = Scheduler::new();
        scheduler.enter_batch();
        scheduler.enter_batch();

        assert_eq!(
            scheduler.on_write(SignalId::from(1), SchedulerMode::Sync),
            WriteAction::Wait
        );
        assert_eq!(scheduler.exit_batch(), 1);
        assert!(scheduler.is_batching());
        assert_eq!(scheduler.exit_batch(), 0);
        assert!(!scheduler.is_batching());
        assert_eq!(scheduler.take_pending().len(), 1);
    }

    #[test]
    fn deferred_writes_request_a_single_tick() {
        let mut scheduler = Scheduler::new();
        assert_eq!(
            scheduler.on_write(SignalId::from(1), SchedulerMode::Deferred),
            WriteAction::ScheduleTick
        );
        assert_eq!(
            scheduler.on_write(SignalId::from(2), SchedulerMode::Deferred),
            WriteAction::Wait
        );

        scheduler.tick_fired();
        assert_eq!(scheduler.take_pending().as_slice(), &[SignalId::from(1), SignalId::from(2)]);
    }

    #[test]
    fn writes_during_flush_wait_for_next_round() {
        let mut scheduler = Scheduler::new();
        assert!(scheduler.begin_flush());
        assert!(!scheduler.begin_flush());

        assert_eq!(
            scheduler.on_write(SignalId::from(1), SchedulerMode::Sync),
            WriteAction::Wait
        );
        scheduler.end_flush();
        assert!(scheduler.has_pending());
    }

    #[test]
    fn pending_set_is_deduplicated() {
        let mut scheduler = Scheduler::new();
        scheduler.enter_batch();
        scheduler.on_write(SignalId::from(1), SchedulerMode::Sync);
        scheduler.on_write(SignalId::from(1), SchedulerMode::Sync);
        scheduler.on_write(SignalId::from(2), SchedulerMode::Sync);
        scheduler.discard(SignalId::from(2));

        assert_eq!(scheduler.take_pending().as_slice(), &[SignalId::from(1)]);
    }

    #[test]
    fn explicit_flush_clears_tick_request() {
        let mut scheduler = Scheduler::new();
        scheduler.on_write(SignalId::from(1), SchedulerMode::Deferred);
        assert!(scheduler.begin_flush());
        scheduler.take_pending();
        scheduler.end_flush();

        assert_eq!(
            scheduler.on_write(SignalId::from(1), SchedulerMode::Deferred),
            WriteAction::ScheduleTick
        );
    }
}
