//! Dependency Graph
//!
//! This module holds the bookkeeping side of the reactive system: who reads
//! whom, which signals are dirty, and when a flush should happen.
//!
//! # Overview
//!
//! The graph is bipartite:
//!
//! - Signals are sources. They hold values but know nothing about their
//!   readers except an id set.
//! - Computations are consumers. They re-run when any signal they read during
//!   their last run changes.
//!
//! Edges are stored as ids in both directions (`signal -> subscribers` and
//! `computation -> dependencies`). Nothing in the graph owns a node, so there
//! are no ownership cycles between signals and computations and disposal is
//! fully deterministic.
//!
//! The [`Scheduler`] tracks batching depth and the pending set of dirty
//! signals. Executing computations is left to the runtime, which owns the
//! node registry.

mod edges;
mod node;
mod scheduler;

pub use edges::DependencyGraph;
pub use node::{ComputationId, NodeKind, SignalId};
pub use scheduler::{Scheduler, SchedulerMode, WriteAction, DEFAULT_MAX_FLUSH_ROUNDS};
