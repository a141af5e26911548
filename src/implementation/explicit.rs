// Copyright 2023 The costsat developers
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! This module provides the explicit transition-system core shared by all
//! abstractions that store their state-changing transitions as adjacency
//! lists, together with the backward-Dijkstra engines for nonnegative cost
//! functions. Enumerating self-loops is deliberately impossible here; loops
//! are tracked as one bit per operator.

use std::cmp::Ordering;
use std::sync::OnceLock;

use binary_heap_plus::BinaryHeap;
use compare::Compare;
use rustc_hash::FxHashSet;

use crate::abstraction::Abstraction;
use crate::common::{left_subtraction, Cost, Successor, Transition, INFINITY};
use crate::implementation::{StateDependentCostFunction, TransitionCostFunction};

// ----------------------------------------------------------------------------
// --- PRIORITY QUEUE ---------------------------------------------------------
// ----------------------------------------------------------------------------

/// Comparator turning the max-heap into a min-heap over (distance, state)
/// pairs.
pub(crate) struct MinDistFirst;

impl Compare<(Cost, usize)> for MinDistFirst {
    fn compare(&self, l: &(Cost, usize), r: &(Cost, usize)) -> Ordering {
        r.cmp(l)
    }
}

pub(crate) type DistanceQueue = BinaryHeap<(Cost, usize), MinDistFirst>;

pub(crate) fn distance_queue(seeds: Vec<(Cost, usize)>) -> DistanceQueue {
    BinaryHeap::from_vec_cmp(seeds, MinDistFirst)
}

// ----------------------------------------------------------------------------
// --- DIJKSTRA ENGINES -------------------------------------------------------
// ----------------------------------------------------------------------------

/// Monotone Dijkstra over an adjacency graph under nonnegative operator
/// costs. `distances` carries the seed distances and receives the result.
pub(crate) fn dijkstra_search_ocf(
    graph: &[Vec<Successor>],
    ocf: &[Cost],
    mut queue: DistanceQueue,
    distances: &mut [Cost],
) {
    debug_assert!(ocf.iter().all(|&c| c >= 0));
    while let Some((distance, state)) = queue.pop() {
        let state_distance = distances[state];
        debug_assert!(state_distance <= distance);
        if state_distance < distance {
            continue;
        }
        for successor in &graph[state] {
            let cost = ocf[successor.op_id];
            debug_assert!(cost >= 0);
            let successor_distance =
                if cost == INFINITY { INFINITY } else { state_distance + cost };
            debug_assert!(successor_distance >= 0);
            if distances[successor.target_id] > successor_distance {
                distances[successor.target_id] = successor_distance;
                queue.push((successor_distance, successor.target_id));
            }
        }
    }
}

/// Dijkstra under per-transition costs.
pub(crate) fn dijkstra_search_tcf(
    graph: &[Vec<Successor>],
    tcf: &TransitionCostFunction,
    mut queue: DistanceQueue,
    distances: &mut [Cost],
) {
    while let Some((distance, state)) = queue.pop() {
        let state_distance = distances[state];
        debug_assert!(state_distance <= distance);
        if state_distance < distance {
            continue;
        }
        for successor in &graph[state] {
            let cost = tcf.sd_cost(successor.transition_id);
            debug_assert!(cost >= 0);
            let successor_distance =
                if cost == INFINITY { INFINITY } else { state_distance + cost };
            debug_assert!(successor_distance >= 0);
            if distances[successor.target_id] > successor_distance {
                distances[successor.target_id] = successor_distance;
                queue.push((successor_distance, successor.target_id));
            }
        }
    }
}

/// Backward Dijkstra that discovers per-transition costs on the fly from the
/// bucketed cost function. For every relaxed edge the engine first checks
/// whether the cheap per-operator minimum already covers the required
/// improvement and only then pays for a bucket walk with the required value
/// as a pruning hint. Every queried cost lands in `tcf`.
pub(crate) fn dijkstra_search_sdcf(
    abstraction: &dyn Abstraction,
    graph: &[Vec<Successor>],
    sdcf: &StateDependentCostFunction,
    tcf: &mut TransitionCostFunction,
    mut queue: DistanceQueue,
    distances: &mut [Cost],
) {
    tcf.fill_zero();
    let sd_costs = tcf.sd_costs_mut();
    while let Some((distance, state)) = queue.pop() {
        let state_distance = distances[state];
        debug_assert!(state_distance <= distance);
        if state_distance < distance {
            continue;
        }
        for successor in &graph[state] {
            // The backward arc (state -> successor) is the forward
            // transition (successor -> state).
            let source = successor.target_id;
            let required = left_subtraction(distances[source], state_distance);
            let mut cost = 0;
            if required > 0 {
                cost = sdcf.initial_cost(successor.op_id);
                if cost < required {
                    let transition = Transition::new(
                        successor.transition_id,
                        successor.op_id,
                        source,
                        state,
                    );
                    cost = sdcf.cost_at_transition_with_hint(abstraction, &transition, required);
                }
            }
            debug_assert!(cost >= 0);
            sd_costs[successor.transition_id] = cost;
            let source_distance = if cost == INFINITY { INFINITY } else { state_distance + cost };
            debug_assert!(source_distance >= 0);
            if distances[source] > source_distance {
                distances[source] = source_distance;
                queue.push((source_distance, source));
            }
        }
    }
}

// ----------------------------------------------------------------------------
// --- EXPLICIT TRANSITION SYSTEM ---------------------------------------------
// ----------------------------------------------------------------------------

/// The explicit graph core of an abstraction: state-changing transitions in
/// a backward adjacency graph (the forward graph is derived on first use),
/// per-operator transition counts and loop/outgoing bits.
pub struct ExplicitTransitionSystem {
    num_states: usize,
    num_transitions: usize,
    init_state_id: usize,
    goal_states: FxHashSet<usize>,
    /// backward_graph[target] holds one successor entry per transition that
    /// ends in `target`; the entry's target is the transition's source.
    backward_graph: Vec<Vec<Successor>>,
    forward_graph: OnceLock<Vec<Vec<Successor>>>,
    num_transitions_by_operator: Vec<usize>,
    has_loop: Vec<bool>,
    has_outgoing: Vec<bool>,
    reachability_from_init: OnceLock<Vec<bool>>,
}

impl ExplicitTransitionSystem {
    /// Builds the core from an explicit transition list. Transition ids are
    /// assigned by list position. `has_loop[op]` tells whether the operator
    /// self-loops somewhere in the abstraction; loops are never listed as
    /// transitions.
    pub fn new(
        num_states: usize,
        num_operators: usize,
        init_state_id: usize,
        goal_states: FxHashSet<usize>,
        transitions: &[(usize, usize, usize)],
        has_loop: Vec<bool>,
    ) -> Self {
        assert!(!goal_states.is_empty());
        assert_eq!(num_operators, has_loop.len());
        let mut backward_graph = vec![vec![]; num_states];
        let mut num_transitions_by_operator = vec![0; num_operators];
        let mut has_outgoing = vec![false; num_operators];
        for (transition_id, &(source, op_id, target)) in transitions.iter().enumerate() {
            assert_ne!(source, target);
            backward_graph[target].push(Successor::new(transition_id, op_id, source));
            num_transitions_by_operator[op_id] += 1;
            has_outgoing[op_id] = true;
        }
        ExplicitTransitionSystem {
            num_states,
            num_transitions: transitions.len(),
            init_state_id,
            goal_states,
            backward_graph,
            forward_graph: OnceLock::new(),
            num_transitions_by_operator,
            has_loop,
            has_outgoing,
            reachability_from_init: OnceLock::new(),
        }
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    pub fn num_transitions(&self) -> usize {
        self.num_transitions
    }

    pub fn num_operators(&self) -> usize {
        self.has_loop.len()
    }

    pub fn num_transitions_of(&self, op_id: usize) -> usize {
        self.num_transitions_by_operator[op_id]
    }

    pub fn initial_state_id(&self) -> usize {
        self.init_state_id
    }

    pub fn goal_states(&self) -> &FxHashSet<usize> {
        &self.goal_states
    }

    pub fn operator_induces_self_loop(&self, op_id: usize) -> bool {
        self.has_loop[op_id]
    }

    pub fn operator_is_active(&self, op_id: usize) -> bool {
        self.has_outgoing[op_id]
    }

    fn forward_graph(&self) -> &[Vec<Successor>] {
        self.forward_graph.get_or_init(|| {
            let mut forward = vec![vec![]; self.num_states];
            for (target, successors) in self.backward_graph.iter().enumerate() {
                for successor in successors {
                    forward[successor.target_id].push(Successor::new(
                        successor.transition_id,
                        successor.op_id,
                        target,
                    ));
                }
            }
            forward
        })
    }

    pub fn for_each_transition(&self, callback: &mut dyn FnMut(Transition)) {
        for (target, successors) in self.backward_graph.iter().enumerate() {
            for successor in successors {
                callback(Transition::new(
                    successor.transition_id,
                    successor.op_id,
                    successor.target_id,
                    target,
                ));
            }
        }
    }

    fn goal_seeds(&self, distances: &mut [Cost]) -> Vec<(Cost, usize)> {
        let mut seeds = Vec::with_capacity(self.goal_states.len());
        for &goal in &self.goal_states {
            distances[goal] = 0;
            seeds.push((0, goal));
        }
        seeds
    }

    pub fn goal_distances_nonnegative_ocf(&self, ocf: &[Cost]) -> Vec<Cost> {
        let mut distances = vec![INFINITY; self.num_states];
        let seeds = self.goal_seeds(&mut distances);
        dijkstra_search_ocf(&self.backward_graph, ocf, distance_queue(seeds), &mut distances);
        distances
    }

    pub fn goal_distances_nonnegative_tcf(&self, tcf: &TransitionCostFunction) -> Vec<Cost> {
        let mut distances = vec![INFINITY; self.num_states];
        let seeds = self.goal_seeds(&mut distances);
        dijkstra_search_tcf(&self.backward_graph, tcf, distance_queue(seeds), &mut distances);
        distances
    }

    pub fn goal_distances_sdcf(
        &self,
        abstraction: &dyn Abstraction,
        sdcf: &StateDependentCostFunction,
        tcf: &mut TransitionCostFunction,
    ) -> Vec<Cost> {
        let mut distances = vec![INFINITY; self.num_states];
        let seeds = self.goal_seeds(&mut distances);
        dijkstra_search_sdcf(
            abstraction,
            &self.backward_graph,
            sdcf,
            tcf,
            distance_queue(seeds),
            &mut distances,
        );
        distances
    }

    /// Depth-first sweep marking every state reachable through transitions
    /// whose cost is not `INFINITY`.
    fn sweep<C: Fn(&Successor) -> Cost>(
        graph: &[Vec<Successor>],
        state_id: usize,
        cost_of: C,
    ) -> Vec<bool> {
        let mut reachable = vec![false; graph.len()];
        reachable[state_id] = true;
        let mut open = vec![state_id];
        while let Some(state) = open.pop() {
            for successor in &graph[state] {
                if !reachable[successor.target_id] && cost_of(successor) != INFINITY {
                    reachable[successor.target_id] = true;
                    open.push(successor.target_id);
                }
            }
        }
        reachable
    }

    pub fn compute_reachability_from_state_ocf(&self, ocf: &[Cost], state_id: usize) -> Vec<bool> {
        Self::sweep(self.forward_graph(), state_id, |s| ocf[s.op_id])
    }

    pub fn compute_reachability_from_state_tcf(
        &self,
        tcf: &TransitionCostFunction,
        state_id: usize,
    ) -> Vec<bool> {
        Self::sweep(self.forward_graph(), state_id, |s| tcf.sd_cost(s.transition_id))
    }

    pub fn compute_reachability_to_state_ocf(&self, ocf: &[Cost], state_id: usize) -> Vec<bool> {
        Self::sweep(&self.backward_graph, state_id, |s| ocf[s.op_id])
    }

    pub fn compute_reachability_to_state_tcf(
        &self,
        tcf: &TransitionCostFunction,
        state_id: usize,
    ) -> Vec<bool> {
        Self::sweep(&self.backward_graph, state_id, |s| tcf.sd_cost(s.transition_id))
    }

    /// States reachable from the abstract initial state under the original
    /// operator costs; computed once.
    pub fn reachability_from_init(&self, operator_costs: &[Cost]) -> &[bool] {
        self.reachability_from_init
            .get_or_init(|| self.compute_reachability_from_state_ocf(operator_costs, self.init_state_id))
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_explicit {
    use super::*;

    /// A diamond: 0 -a-> 1 -b-> 3, 0 -c-> 2 -d-> 3, goal {3}.
    fn diamond() -> ExplicitTransitionSystem {
        let transitions = vec![(0, 0, 1), (1, 1, 3), (0, 2, 2), (2, 3, 3)];
        ExplicitTransitionSystem::new(
            4,
            4,
            0,
            FxHashSet::from_iter([3]),
            &transitions,
            vec![false; 4],
        )
    }

    #[test]
    fn goal_distances_take_the_cheaper_path() {
        let ts = diamond();
        // a=5, b=1, c=2, d=2.
        let distances = ts.goal_distances_nonnegative_ocf(&[5, 1, 2, 2]);
        assert_eq!(vec![4, 1, 2, 0], distances);
    }

    #[test]
    fn infinite_costs_make_states_unreachable() {
        let ts = diamond();
        let distances = ts.goal_distances_nonnegative_ocf(&[INFINITY, INFINITY, 2, 2]);
        assert_eq!(vec![4, INFINITY, 2, 0], distances);
    }

    #[test]
    fn reachability_respects_direction() {
        let ts = diamond();
        let unit = vec![1; 4];
        assert_eq!(vec![true, true, true, true], ts.compute_reachability_from_state_ocf(&unit, 0));
        assert_eq!(vec![false, true, false, true], ts.compute_reachability_from_state_ocf(&unit, 1));
        assert_eq!(vec![true, true, true, true], ts.compute_reachability_to_state_ocf(&unit, 3));
        assert_eq!(vec![true, false, false, false], ts.compute_reachability_to_state_ocf(&unit, 0));
    }

    #[test]
    fn blocked_operators_block_reachability() {
        let ts = diamond();
        let costs = vec![INFINITY, 1, INFINITY, 1];
        assert_eq!(
            vec![true, false, false, false],
            ts.compute_reachability_from_state_ocf(&costs, 0)
        );
    }

    #[test]
    fn transition_enumeration_is_exhaustive_and_unique() {
        let ts = diamond();
        let mut seen = vec![false; ts.num_transitions()];
        let mut count = 0;
        ts.for_each_transition(&mut |t: Transition| {
            assert!(!seen[t.transition_id]);
            seen[t.transition_id] = true;
            count += 1;
        });
        assert_eq!(4, count);
        assert!(seen.iter().all(|&s| s));
    }
}
