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

//! This module defines the central abstraction of the crate: the
//! [`Abstraction`] trait, the uniform transition-system API shared by the
//! Cartesian and the projection realization. Everything a saturator, a
//! distance engine or the cost-partitioning pipeline may ask of an
//! abstraction is a method of this trait; general-cost distance analysis
//! (Bellman-Ford with negative-cycle handling) and cost saturation are
//! provided directly on the trait because they only consume the primitive
//! capabilities.

use biodivine_lib_bdd::Bdd;
use rustc_hash::FxHashSet;

use crate::common::{
    compute_reachability_cost_function, path_addition, Cost, State, Transition, INFINITY,
};
use crate::implementation::{StateDependentCostFunction, TransitionCostFunction};

/// The callback driven by [`Abstraction::for_each_transition`]. Abstractions
/// enumerate their state-changing transitions by index without materializing
/// them, so the consumer provides the loop body. The simplest and most
/// natural implementation is a closure.
pub trait TransitionCallback {
    /// Executes the callback for one transition.
    fn apply(&mut self, transition: Transition);
}

impl<F: FnMut(Transition)> TransitionCallback for F {
    fn apply(&mut self, transition: Transition) {
        self(transition)
    }
}

/// Maps concrete states to abstract state ids. Abstraction functions are the
/// only part of an abstraction the heuristic facade keeps alive during the
/// search, once the transition systems have served their purpose.
pub trait AbstractionFunction {
    fn abstract_state_id(&self, state: &State) -> usize;
}

/// An abstract transition system over the operators of a planning task,
/// together with its abstraction mapping. Self-loops are tracked as a
/// per-operator bit and never enumerated; every state-changing transition
/// carries a dense unique id usable for indexing transition cost vectors.
pub trait Abstraction {
    // ------------------------------------------------------------------
    // --- STRUCTURE ----------------------------------------------------
    // ------------------------------------------------------------------

    /// The number of abstract states.
    fn num_states(&self) -> usize;

    /// The number of state-changing transitions (self-loops excluded).
    fn num_transitions(&self) -> usize;

    /// The number of operators of the underlying task.
    fn num_operators(&self) -> usize;

    /// The number of state-changing transitions labelled with the operator.
    fn num_transitions_of(&self, op_id: usize) -> usize;

    /// The abstract state containing the concrete initial state.
    fn initial_state_id(&self) -> usize;

    /// The nonempty set of abstract goal states.
    fn goal_states(&self) -> &FxHashSet<usize>;

    fn is_goal_state(&self, state_id: usize) -> bool {
        self.goal_states().contains(&state_id)
    }

    /// The abstract state containing the given concrete state.
    fn abstract_state_id(&self, state: &State) -> usize;

    /// A cheap, standalone copy of the abstraction mapping.
    fn abstraction_function(&self) -> Box<dyn AbstractionFunction>;

    /// True iff the operator induces an abstract self-loop somewhere.
    fn operator_induces_self_loop(&self, op_id: usize) -> bool;

    /// True iff the operator induces a state-changing transition somewhere.
    fn operator_is_active(&self, op_id: usize) -> bool;

    /// The variables this abstraction distinguishes (the pattern for
    /// projections, the split variables for Cartesian abstractions).
    fn split_variables(&self) -> Vec<usize>;

    // ------------------------------------------------------------------
    // --- ENUMERATION --------------------------------------------------
    // ------------------------------------------------------------------

    /// Applies the callback to every state-changing transition exactly once.
    fn for_each_transition(&self, callback: &mut dyn TransitionCallback);

    /// Applies the callback to every state-changing transition whose label
    /// is not marked state-independent in `si`. Implementations that can
    /// skip whole labels without enumerating their transitions should
    /// override this.
    fn for_each_transition_masked(&self, si: &[bool], callback: &mut dyn TransitionCallback) {
        self.for_each_transition(&mut |transition: Transition| {
            if !si[transition.op_id] {
                callback.apply(transition);
            }
        });
    }

    // ------------------------------------------------------------------
    // --- REACHABILITY -------------------------------------------------
    // ------------------------------------------------------------------

    /// The states reachable from the abstract initial state under the
    /// original operator costs. Computed once, cached by the abstraction.
    fn reachability_from_init(&self) -> &[bool];

    fn compute_reachability_from_state_ocf(&self, ocf: &[Cost], state_id: usize) -> Vec<bool>;

    fn compute_reachability_from_state_tcf(
        &self,
        tcf: &TransitionCostFunction,
        state_id: usize,
    ) -> Vec<bool>;

    fn compute_reachability_to_state_ocf(&self, ocf: &[Cost], state_id: usize) -> Vec<bool>;

    fn compute_reachability_to_state_tcf(
        &self,
        tcf: &TransitionCostFunction,
        state_id: usize,
    ) -> Vec<bool>;

    // ------------------------------------------------------------------
    // --- GOAL DISTANCES -----------------------------------------------
    // ------------------------------------------------------------------

    /// Backward Dijkstra under a nonnegative operator cost function.
    fn goal_distances_nonnegative_ocf(&self, ocf: &[Cost]) -> Vec<Cost>;

    /// Backward Dijkstra under a nonnegative transition cost function.
    fn goal_distances_nonnegative_tcf(&self, tcf: &TransitionCostFunction) -> Vec<Cost>;

    /// Backward Dijkstra that discovers per-transition costs on the fly by
    /// querying the bucketed state-dependent cost function, recording every
    /// queried cost in `tcf`.
    fn compute_goal_distances_sdcf(
        &self,
        sdcf: &StateDependentCostFunction,
        tcf: &mut TransitionCostFunction,
    ) -> Vec<Cost>;

    /// Goal distances under an arbitrary operator cost function; dispatches
    /// to Dijkstra for nonnegative costs and to Bellman-Ford otherwise.
    fn compute_goal_distances_ocf(&self, ocf: &[Cost]) -> Vec<Cost> {
        if ocf.iter().all(|&c| c >= 0) {
            self.goal_distances_nonnegative_ocf(ocf)
        } else {
            self.goal_distances_general_ocf(ocf)
        }
    }

    /// Goal distances under an arbitrary transition cost function.
    fn compute_goal_distances_tcf(&self, tcf: &TransitionCostFunction) -> Vec<Cost> {
        if tcf.is_nonnegative() {
            self.goal_distances_nonnegative_tcf(tcf)
        } else {
            self.goal_distances_general_tcf(tcf)
        }
    }

    /// Bellman-Ford under a general operator cost function. States on or
    /// before a negative-cost cycle receive distance `-INFINITY`.
    fn goal_distances_general_ocf(&self, ocf: &[Cost]) -> Vec<Cost> {
        let num_states = self.num_states();
        let mut distances = vec![INFINITY; num_states];
        loop {
            let mut negative_cycle_found = false;
            // Reset distances but keep distances of negative infinity.
            for distance in distances.iter_mut() {
                if *distance != -INFINITY {
                    *distance = INFINITY;
                }
            }
            for &goal in self.goal_states() {
                distances[goal] = 0;
            }
            for round in 0..num_states {
                let last_round = round == num_states - 1;
                let mut distances_changed = false;
                self.for_each_transition(&mut |transition: Transition| {
                    if negative_cycle_found {
                        return;
                    }
                    // Convert the forward transition into a backward edge.
                    let src = transition.target_id;
                    let target = transition.source_id;
                    let cost = ocf[transition.op_id];
                    let new_distance = path_addition(distances[src], cost);
                    if new_distance < distances[target] {
                        if last_round {
                            negative_cycle_found = true;
                            let can_reach_target = self.compute_reachability_to_state_ocf(
                                &compute_reachability_cost_function(ocf),
                                target,
                            );
                            for (state, reaches) in can_reach_target.iter().enumerate() {
                                if *reaches {
                                    distances[state] = -INFINITY;
                                }
                            }
                            debug_assert_eq!(-INFINITY, distances[target]);
                        } else {
                            distances[target] = new_distance;
                            distances_changed = true;
                        }
                    }
                });
                if !distances_changed {
                    break;
                }
            }
            if !negative_cycle_found {
                break;
            }
        }
        distances
    }

    /// Bellman-Ford under a general transition cost function.
    fn goal_distances_general_tcf(&self, tcf: &TransitionCostFunction) -> Vec<Cost> {
        let num_states = self.num_states();
        let mut distances = vec![INFINITY; num_states];
        loop {
            let mut negative_cycle_found = false;
            for distance in distances.iter_mut() {
                if *distance != -INFINITY {
                    *distance = INFINITY;
                }
            }
            for &goal in self.goal_states() {
                distances[goal] = 0;
            }
            for round in 0..num_states {
                let last_round = round == num_states - 1;
                let mut distances_changed = false;
                self.for_each_transition(&mut |transition: Transition| {
                    if negative_cycle_found {
                        return;
                    }
                    let src = transition.target_id;
                    let target = transition.source_id;
                    let cost = tcf.sd_cost(transition.transition_id);
                    let new_distance = path_addition(distances[src], cost);
                    if new_distance < distances[target] {
                        if last_round {
                            negative_cycle_found = true;
                            let can_reach_target =
                                self.compute_reachability_to_state_tcf(tcf, target);
                            for (state, reaches) in can_reach_target.iter().enumerate() {
                                if *reaches {
                                    distances[state] = -INFINITY;
                                }
                            }
                            debug_assert_eq!(-INFINITY, distances[target]);
                        } else {
                            distances[target] = new_distance;
                            distances_changed = true;
                        }
                    }
                });
                if !distances_changed {
                    break;
                }
            }
            if !negative_cycle_found {
                break;
            }
        }
        distances
    }

    // ------------------------------------------------------------------
    // --- COST SATURATION ----------------------------------------------
    // ------------------------------------------------------------------

    /// The pointwise-minimal operator cost function preserving the given
    /// goal distances: the maximal `h(src) - h(target)` over the operator's
    /// transitions between states with finite estimates, `0` for looping
    /// operators, `-INFINITY` otherwise.
    fn compute_saturated_costs_ocf(&self, h_values: &[Cost]) -> Vec<Cost> {
        let mut socf = vec![-INFINITY; self.num_operators()];
        /* To prevent negative cost cycles we ensure that all operators
        inducing self-loops have nonnegative costs. */
        for (op_id, saturated) in socf.iter_mut().enumerate() {
            if self.operator_induces_self_loop(op_id) {
                *saturated = 0;
            }
        }
        self.for_each_transition(&mut |transition: Transition| {
            let source_h = h_values[transition.source_id];
            let target_h = h_values[transition.target_id];
            if source_h == INFINITY
                || source_h == -INFINITY
                || target_h == INFINITY
                || target_h == -INFINITY
            {
                return;
            }
            let needed = source_h - target_h;
            socf[transition.op_id] = socf[transition.op_id].max(needed);
        });
        socf
    }

    /// The transition-level counterpart of [`compute_saturated_costs_ocf`]:
    /// fills `stcf` with the per-transition saturated costs and keeps the
    /// per-operator state-independent summary up to date.
    ///
    /// [`compute_saturated_costs_ocf`]: Abstraction::compute_saturated_costs_ocf
    fn compute_saturated_costs_tcf(&self, h_values: &[Cost], stcf: &mut TransitionCostFunction) {
        stcf.fill_for_saturation();
        {
            let (sd_costs, si, si_costs) = stcf.parts_mut();
            self.for_each_transition(&mut |transition: Transition| {
                let source_h = h_values[transition.source_id];
                let target_h = h_values[transition.target_id];
                if source_h == INFINITY
                    || source_h == -INFINITY
                    || target_h == INFINITY
                    || target_h == -INFINITY
                {
                    // The saturated cost of this transition remains -INFINITY.
                    return;
                }
                let op_id = transition.op_id;
                let needed = source_h - target_h;
                // The transition cost function deviates from the operator one.
                if si[op_id] && needed != si_costs[op_id] && si_costs[op_id] != -INFINITY {
                    si[op_id] = false;
                }
                sd_costs[transition.transition_id] = needed;
                si_costs[op_id] = si_costs[op_id].max(needed);
            });
            for op_id in 0..self.num_operators() {
                if self.operator_induces_self_loop(op_id) {
                    /* Only when si_costs[op_id] != -INFINITY does a loop force
                    iteration over all transitions with this label. */
                    if si_costs[op_id] != 0 && si_costs[op_id] != -INFINITY {
                        si[op_id] = false;
                    }
                    /* To prevent negative cost cycles we ensure that all
                    operators inducing self-loops have nonnegative costs. */
                    si_costs[op_id] = si_costs[op_id].max(0);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // --- FINGERPRINTS -------------------------------------------------
    // ------------------------------------------------------------------

    /// The characteristic function of the concrete states mapped to the
    /// abstract state.
    fn state_bdd(&self, state_id: usize) -> Bdd;

    /// The characteristic function of the concrete states in which taking
    /// the transition's operator follows the transition: states mapped to
    /// the source whose successor is mapped to the target.
    fn transition_bdd(&self, transition: &Transition) -> Bdd;

    /// Like [`transition_bdd`], but memoized per transition id. The cache is
    /// content-addressable: the result only depends on the transition id.
    ///
    /// [`transition_bdd`]: Abstraction::transition_bdd
    fn transition_bdd_cached(&self, transition: &Transition) -> Bdd;

    /// Drops the fingerprint cache (and any other lazily built index).
    fn clear_caches(&self);
}
