//! Dependency Edges
//!
//! Both directions of every edge are kept in sync so that unsubscribing a
//! computation and disposing a signal are each a single pass over the
//! affected sets.
//!
//! Sets are `IndexSet`s so iteration follows subscription order. This keeps
//! flush order deterministic: within a round, computations run in the order
//! they first subscribed to a dirty signal.

use std::collections::HashMap;

use indexmap::IndexSet;

use super::node::{ComputationId, SignalId};

/// Arena of subscription edges keyed by node id.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Computations that read each signal during their last run.
    subscribers: HashMap<SignalId, IndexSet<ComputationId>>,

    /// Signals read by each computation during its last run.
    dependencies: HashMap<ComputationId, IndexSet<SignalId>>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `computation` read `signal`.
    ///
    /// Returns `true` if the edge is new.
    pub fn add_edge(&mut self, signal: SignalId, computation: ComputationId) -> bool {
        let inserted = self
            .subscribers
            .entry(signal)
            .or_default()
            .insert(computation);
        self.dependencies
            .entry(computation)
            .or_default()
            .insert(signal);
        inserted
    }

    /// Remove a single edge in both directions.
    pub fn remove_edge(&mut self, signal: SignalId, computation: ComputationId) {
        if let Some(subs) = self.subscribers.get_mut(&signal) {
            subs.shift_remove(&computation);
            if subs.is_empty() {
                self.subscribers.remove(&signal);
            }
        }
        if let Some(deps) = self.dependencies.get_mut(&computation) {
            deps.shift_remove(&signal);
        }
    }

    /// Unsubscribe `computation` from every signal it depends on.
    ///
    /// Called before re-running a computation so that dependencies from the
    /// previous run do not leak into the next. Returns how many edges were
    /// dropped.
    pub fn clear_dependencies(&mut self, computation: ComputationId) -> usize {
        let Some(deps) = self.dependencies.get_mut(&computation) else {
            return 0;
        };
        let dropped = deps.len();
        for signal in deps.drain(..) {
            if let Some(subs) = self.subscribers.get_mut(&signal) {
                subs.shift_remove(&computation);
                if subs.is_empty() {
                    self.subscribers.remove(&signal);
                }
            }
        }
        dropped
    }

    /// Forget a computation entirely.
    pub fn remove_computation(&mut self, computation: ComputationId) {
        self.clear_dependencies(computation);
        self.dependencies.remove(&computation);
    }

    /// Forget a signal entirely, removing it from every subscriber's
    /// dependency set. Returns the former subscribers.
    pub fn remove_signal(&mut self, signal: SignalId) -> Vec<ComputationId> {
        let Some(subs) = self.subscribers.remove(&signal) else {
            return Vec::new();
        };
        for computation in &subs {
            if let Some(deps) = self.dependencies.get_mut(computation) {
                deps.shift_remove(&signal);
            }
        }
        subs.into_iter().collect()
    }

    /// Iterate the current subscribers of a signal.
    pub fn subscribers(&self, signal: SignalId) -> impl Iterator<Item = ComputationId> + '_ {
        self.subscribers
            .get(&signal)
            .into_iter()
            .flat_map(|subs| subs.iter().copied())
    }

    /// Iterate the current dependencies of a computation.
    pub fn dependencies(&self, computation: ComputationId) -> impl Iterator<Item = SignalId> + '_ {
        self.dependencies
            .get(&computation)
            .into_iter()
            .flat_map(|deps| deps.iter().copied())
    }

    pub fn subscriber_count(&self, signal: SignalId) -> usize {
        self.subscribers.get(&signal).map_or(0, IndexSet::len)
    }

    pub fn dependency_count(&self, computation: ComputationId) -> usize {
        self.dependencies.get(&computation).map_or(0, IndexSet::len)
    }

    /// Union of the subscribers of every dirty signal, deduplicated.
    ///
    /// A computation that depends on several dirty signals appears once, at
    /// the position of its first occurrence.
    pub fn affected_by<'a, I>(&self, dirty: I) -> IndexSet<ComputationId>
    where
        I: IntoIterator<Item = &'a SignalId>,
    {
        let mut affected = IndexSet::new();
        for signal in dirty {
            affected.extend(self.subscribers(*signal));
        }
        affected
    }

    /// Check that the two edge directions agree.
    pub fn is_consistent(&self) -> bool {
        let forward = self.subscribers.iter().all(|(signal, subs)| {
            subs.iter().all(|c| {
                self.dependencies
                    .get(c)
                    .is_some_and(|deps| deps.contains(signal))
            })
        });
        let backward = self.dependencies.iter().all(|(computation, deps)| {
            deps.iter().all(|s| {
                self.subscribers
                    .get(s)
                    .is_some_and(|subs| subs.contains(computation))
            })
        });
        forward && backward
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (SignalId, SignalId, ComputationId, ComputationId) {
        (
            SignalId::from(1),
            SignalId::from(2),
            ComputationId::from(1),
            ComputationId::from(2),
        )
    }

    #[test]
    fn add_and_remove_edges() {
        let (a, _, c, _) = ids();
        let mut graph = DependencyGraph::new();

        assert!(graph.add_edge(a, c));
        assert!(!graph.add_edge(a, c));
        assert_eq!(graph.subscriber_count(a), 1);
        assert_eq!(graph.dependency_count(c), 1);

        graph.remove_edge(a, c);
        assert_eq!(graph.subscriber_count(a), 0);
        assert_eq!(graph.dependency_count(c), 0);
        assert!(graph.is_consistent());
    }

    #[test]
    fn clear_dependencies_unsubscribes_everywhere() {
        let (a, b, c, d) = ids();
        let mut graph = DependencyGraph::new();
        graph.add_edge(a, c);
        graph.add_edge(b, c);
        graph.add_edge(b, d);

        assert_eq!(graph.clear_dependencies(c), 2);
        assert_eq!(graph.subscriber_count(a), 0);
        assert_eq!(graph.subscribers(b).collect::<Vec<_>>(), vec![d]);
        assert!(graph.is_consistent());
    }

    #[test]
    fn remove_signal_detaches_subscribers() {
        let (a, b, c, d) = ids();
        let mut graph = DependencyGraph::new();
        graph.add_edge(a, c);
        graph.add_edge(a, d);
        graph.add_edge(b, d);

        let former = graph.remove_signal(a);
        assert_eq!(former, vec![c, d]);
        assert_eq!(graph.dependency_count(c), 0);
        assert_eq!(graph.dependencies(d).collect::<Vec<_>>(), vec![b]);
        assert!(graph.is_consistent());
    }

    #[test]
    fn affected_by_deduplicates_in_subscription_order() {
        let (a, b, c, d) = ids();
        let mut graph = DependencyGraph::new();
        graph.add_edge(a, d);
        graph.add_edge(a, c);
        graph.add_edge(b, c);

        let affected = graph.affected_by(&[a, b]);
        assert_eq!(affected.into_iter().collect::<Vec<_>>(), vec![d, c]);
    }
}
