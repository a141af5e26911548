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

//! This module provides the projection abstraction: the abstract state id of
//! a concrete state is the mixed-radix hash of its restriction to a pattern
//! of variables. Transitions are never stored; they are enumerated
//! syntactically from "abstract operators", the variants of each concrete
//! operator multiplied out over the pattern variables it affects without
//! preconditions. State-changing transitions receive dense ids through
//! per-abstract-operator offsets, so the id of a transition can also be
//! recomputed from its source state alone.

use std::sync::{Arc, OnceLock};

use biodivine_lib_bdd::Bdd;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::abstraction::{Abstraction, AbstractionFunction, TransitionCallback};
use crate::common::{left_subtraction, Cost, Fact, State, Transition, INFINITY};
use crate::errors::{Error, Result};
use crate::implementation::explicit::{distance_queue, DistanceQueue};
use crate::implementation::{
    BddBuilder, StateDependentCostFunction, TaskInfo, TransitionCostFunction,
};

// ----------------------------------------------------------------------------
// --- ABSTRACT OPERATORS -----------------------------------------------------
// ----------------------------------------------------------------------------

/// One multiplied-out variant of a concrete operator, restricted to the
/// pattern. Fact `var` fields are pattern indices, not task variables.
struct AbstractOperator {
    concrete_op_id: usize,
    /// Mixed-radix hash of all pinned source values (prevail + precondition).
    precondition_hash: usize,
    /// Adding this to a source hash yields the target hash.
    forward_hash_effect: isize,
    /// Sorted facts that must hold in the source state (prevail +
    /// precondition), for forward applicability tests.
    forward_preconditions: Vec<Fact>,
    /// Sorted facts that must hold in the target state (prevail + effect),
    /// for regression applicability tests.
    regression_preconditions: Vec<Fact>,
}

/// The standalone abstraction mapping of a projection.
pub struct ProjectionFunction {
    pattern: Vec<usize>,
    hash_multipliers: Vec<usize>,
}

impl ProjectionFunction {
    pub fn new(pattern: Vec<usize>, hash_multipliers: Vec<usize>) -> Self {
        debug_assert_eq!(pattern.len(), hash_multipliers.len());
        ProjectionFunction { pattern, hash_multipliers }
    }
}

impl AbstractionFunction for ProjectionFunction {
    fn abstract_state_id(&self, state: &State) -> usize {
        self.pattern
            .iter()
            .zip(&self.hash_multipliers)
            .map(|(&var, &multiplier)| multiplier * state.value(var))
            .sum()
    }
}

// ----------------------------------------------------------------------------
// --- PROJECTION -------------------------------------------------------------
// ----------------------------------------------------------------------------

/// The projection of the task onto a pattern of variables.
pub struct Projection {
    task_info: Arc<TaskInfo>,
    bdd_builder: Arc<BddBuilder>,
    pattern: Vec<usize>,
    hash_multipliers: Vec<usize>,
    pattern_domain_sizes: Vec<usize>,
    num_states: usize,
    num_transitions: usize,
    init_state_id: usize,
    goal_states: FxHashSet<usize>,
    abstract_operators: Vec<AbstractOperator>,
    /// The id of the first transition of each abstract operator.
    transition_id_offset: Vec<usize>,
    reachability_from_init: OnceLock<Vec<bool>>,
    transition_bdd_cache: RwLock<FxHashMap<usize, Bdd>>,
}

impl Projection {
    pub fn new(
        task_info: Arc<TaskInfo>,
        bdd_builder: Arc<BddBuilder>,
        pattern: Vec<usize>,
    ) -> Result<Self> {
        if pattern.is_empty() || pattern.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::Precondition(format!(
                "projection requires a sorted, nonempty pattern, got {:?}",
                pattern
            )));
        }
        if pattern.iter().any(|&var| var >= task_info.num_variables()) {
            return Err(Error::Precondition(format!(
                "pattern {:?} mentions a variable outside the task",
                pattern
            )));
        }

        let mut hash_multipliers = Vec::with_capacity(pattern.len());
        let mut pattern_domain_sizes = Vec::with_capacity(pattern.len());
        let mut num_states: usize = 1;
        for &var in &pattern {
            hash_multipliers.push(num_states);
            let domain_size = task_info.domain_size(var);
            pattern_domain_sizes.push(domain_size);
            num_states = num_states.checked_mul(domain_size).ok_or_else(|| {
                Error::Overflow(format!("pattern {:?} spans too many abstract states", pattern))
            })?;
        }

        let mut projection = Projection {
            pattern,
            hash_multipliers,
            pattern_domain_sizes,
            num_states,
            num_transitions: 0,
            init_state_id: 0,
            goal_states: FxHashSet::default(),
            abstract_operators: vec![],
            transition_id_offset: vec![],
            reachability_from_init: OnceLock::new(),
            transition_bdd_cache: RwLock::new(FxHashMap::default()),
            task_info,
            bdd_builder,
        };
        projection.build_abstract_operators();
        projection.goal_states = projection.compute_goal_states();
        projection.init_state_id = ProjectionFunction::new(
            projection.pattern.clone(),
            projection.hash_multipliers.clone(),
        )
        .abstract_state_id(projection.task_info.initial_state());
        Ok(projection)
    }

    /// Multiplies every concrete operator out over the pattern variables it
    /// affects without a precondition; only state-changing variants become
    /// abstract operators.
    fn build_abstract_operators(&mut self) {
        let task_info = Arc::clone(&self.task_info);
        for op_id in 0..task_info.num_operators() {
            // Classify the pattern variables.
            let mut prevail = vec![];
            let mut preconditions = vec![];
            let mut effects = vec![];
            let mut effects_without_pre = vec![];
            for (index, &var) in self.pattern.iter().enumerate() {
                let pre = task_info.precondition_value(op_id, var);
                let eff = if task_info.operator_has_effect(op_id, var) {
                    task_info.postcondition_value(op_id, var)
                } else {
                    None
                };
                match (pre, eff) {
                    (Some(pre), Some(eff)) => {
                        debug_assert_ne!(pre, eff);
                        preconditions.push(Fact::new(index, pre));
                        effects.push(Fact::new(index, eff));
                    }
                    (Some(pre), None) => prevail.push(Fact::new(index, pre)),
                    (None, Some(eff)) => effects_without_pre.push(Fact::new(index, eff)),
                    (None, None) => {}
                }
            }
            self.multiply_out(
                op_id,
                0,
                &effects_without_pre,
                &mut prevail,
                &mut preconditions,
                &mut effects,
            );
        }
    }

    fn multiply_out(
        &mut self,
        op_id: usize,
        pos: usize,
        effects_without_pre: &[Fact],
        prevail: &mut Vec<Fact>,
        preconditions: &mut Vec<Fact>,
        effects: &mut Vec<Fact>,
    ) {
        if pos == effects_without_pre.len() {
            // Only state-changing variants become abstract operators.
            if !effects.is_empty() {
                self.add_abstract_operator(op_id, prevail, preconditions, effects);
            }
            return;
        }
        let index = effects_without_pre[pos].var;
        let eff = effects_without_pre[pos].value;
        for value in 0..self.pattern_domain_sizes[index] {
            if value != eff {
                preconditions.push(Fact::new(index, value));
                effects.push(Fact::new(index, eff));
            } else {
                prevail.push(Fact::new(index, value));
            }
            self.multiply_out(op_id, pos + 1, effects_without_pre, prevail, preconditions, effects);
            if value != eff {
                preconditions.pop();
                effects.pop();
            } else {
                prevail.pop();
            }
        }
    }

    fn add_abstract_operator(
        &mut self,
        op_id: usize,
        prevail: &[Fact],
        preconditions: &[Fact],
        effects: &[Fact],
    ) {
        debug_assert_eq!(preconditions.len(), effects.len());
        let mut forward_hash_effect = 0isize;
        for (pre, eff) in preconditions.iter().zip(effects) {
            debug_assert_eq!(pre.var, eff.var);
            forward_hash_effect += (eff.value as isize - pre.value as isize)
                * self.hash_multipliers[pre.var] as isize;
        }
        let mut precondition_hash = 0;
        for fact in prevail.iter().chain(preconditions) {
            precondition_hash += self.hash_multipliers[fact.var] * fact.value;
        }
        let mut forward_preconditions: Vec<Fact> =
            prevail.iter().chain(preconditions).copied().collect();
        forward_preconditions.sort_unstable();
        let mut regression_preconditions: Vec<Fact> =
            prevail.iter().chain(effects).copied().collect();
        regression_preconditions.sort_unstable();

        self.transition_id_offset.push(self.num_transitions);
        self.num_transitions +=
            self.task_info.num_transitions_from_abstract_operator(&self.pattern, op_id);
        self.abstract_operators.push(AbstractOperator {
            concrete_op_id: op_id,
            precondition_hash,
            forward_hash_effect,
            forward_preconditions,
            regression_preconditions,
        });
    }

    fn compute_goal_states(&self) -> FxHashSet<usize> {
        let mut abstract_goals = vec![];
        for goal in self.task_info.goals() {
            if let Ok(index) = self.pattern.binary_search(&goal.var) {
                abstract_goals.push(Fact::new(index, goal.value));
            }
        }
        (0..self.num_states)
            .filter(|&state_id| self.is_consistent(state_id, &abstract_goals))
            .collect()
    }

    /// Decodes one pattern position out of a state hash.
    #[inline]
    fn state_value(&self, state_id: usize, index: usize) -> usize {
        (state_id / self.hash_multipliers[index]) % self.pattern_domain_sizes[index]
    }

    fn is_consistent(&self, state_id: usize, facts: &[Fact]) -> bool {
        facts.iter().all(|fact| self.state_value(state_id, fact.var) == fact.value)
    }

    /// The pattern facts of an abstract state, with task variable ids, in
    /// descending variable order (matching the top-down diagram encoding).
    fn compute_state_facts(&self, state_id: usize) -> Vec<Fact> {
        let mut facts = Vec::with_capacity(self.pattern.len());
        for index in (0..self.pattern.len()).rev() {
            facts.push(Fact::new(self.pattern[index], self.state_value(state_id, index)));
        }
        facts
    }

    /// Recomputes the dense transition id of the transition induced by an
    /// abstract operator in a source state, inverting the source hash over
    /// the unmentioned pattern variables.
    fn transition_id(&self, source_id: usize, abs_op_id: usize) -> usize {
        let op = &self.abstract_operators[abs_op_id];
        let mut residue = source_id - op.precondition_hash;
        // Extract the values of the unmentioned variables, high to low.
        let mut unmentioned = vec![];
        for index in (0..self.pattern.len()).rev() {
            let var = self.pattern[index];
            if !self.task_info.operator_mentions_variable(op.concrete_op_id, var) {
                let value = residue / self.hash_multipliers[index];
                residue -= value * self.hash_multipliers[index];
                unmentioned.push((index, value));
            }
        }
        debug_assert_eq!(0, residue);
        // Re-hash them gap-free, low to high, into the operator's id range.
        let mut transition_id = self.transition_id_offset[abs_op_id];
        let mut multiplier = 1;
        for &(index, value) in unmentioned.iter().rev() {
            transition_id += multiplier * value;
            multiplier *= self.pattern_domain_sizes[index];
        }
        transition_id
    }

    fn is_forward_applicable(&self, state_id: usize, abs_op_id: usize) -> bool {
        self.is_consistent(state_id, &self.abstract_operators[abs_op_id].forward_preconditions)
    }

    fn is_regression_applicable(&self, state_id: usize, abs_op_id: usize) -> bool {
        self.is_consistent(state_id, &self.abstract_operators[abs_op_id].regression_preconditions)
    }

    #[inline]
    fn forward_successor(&self, state_id: usize, abs_op_id: usize) -> usize {
        (state_id as isize + self.abstract_operators[abs_op_id].forward_hash_effect) as usize
    }

    #[inline]
    fn backward_predecessor(&self, state_id: usize, abs_op_id: usize) -> usize {
        (state_id as isize - self.abstract_operators[abs_op_id].forward_hash_effect) as usize
    }

    fn goal_seeds(&self, distances: &mut [Cost]) -> DistanceQueue {
        let mut seeds = Vec::with_capacity(self.goal_states.len());
        for &goal in &self.goal_states {
            distances[goal] = 0;
            seeds.push((0, goal));
        }
        distance_queue(seeds)
    }

    /// The abstract operators applicable backwards in a state.
    fn regression_applicable_operators(&self, state_id: usize) -> Vec<usize> {
        (0..self.abstract_operators.len())
            .filter(|&abs_op| self.is_regression_applicable(state_id, abs_op))
            .collect()
    }

    fn forward_applicable_operators(&self, state_id: usize) -> Vec<usize> {
        (0..self.abstract_operators.len())
            .filter(|&abs_op| self.is_forward_applicable(state_id, abs_op))
            .collect()
    }
}

impl Abstraction for Projection {
    fn num_states(&self) -> usize {
        self.num_states
    }

    fn num_transitions(&self) -> usize {
        self.num_transitions
    }

    fn num_operators(&self) -> usize {
        self.task_info.num_operators()
    }

    fn num_transitions_of(&self, op_id: usize) -> usize {
        self.task_info.num_transitions_from_concrete_operator(&self.pattern, op_id)
    }

    fn initial_state_id(&self) -> usize {
        self.init_state_id
    }

    fn goal_states(&self) -> &FxHashSet<usize> {
        &self.goal_states
    }

    fn abstract_state_id(&self, state: &State) -> usize {
        self.pattern
            .iter()
            .zip(&self.hash_multipliers)
            .map(|(&var, &multiplier)| multiplier * state.value(var))
            .sum()
    }

    fn abstraction_function(&self) -> Box<dyn AbstractionFunction> {
        Box::new(ProjectionFunction::new(self.pattern.clone(), self.hash_multipliers.clone()))
    }

    fn operator_induces_self_loop(&self, op_id: usize) -> bool {
        self.task_info.operator_induces_self_loop(&self.pattern, op_id)
    }

    fn operator_is_active(&self, op_id: usize) -> bool {
        self.task_info.operator_is_active(&self.pattern, op_id)
    }

    fn split_variables(&self) -> Vec<usize> {
        self.pattern.clone()
    }

    fn for_each_transition(&self, callback: &mut dyn TransitionCallback) {
        let all = vec![false; self.num_operators()];
        self.for_each_transition_masked(&all, callback);
    }

    /// Enumerates transitions abstract operator by abstract operator,
    /// spelling out the assignments of the unmentioned pattern variables.
    /// Masked labels are skipped wholesale; the id arithmetic stays intact
    /// because every abstract operator owns a contiguous id range.
    fn for_each_transition_masked(&self, si: &[bool], callback: &mut dyn TransitionCallback) {
        for (abs_op_id, op) in self.abstract_operators.iter().enumerate() {
            if si[op.concrete_op_id] {
                continue;
            }
            // One fact per unmentioned pattern variable, counting upward.
            let mut free_facts: Vec<Fact> = self
                .pattern
                .iter()
                .enumerate()
                .filter(|&(_, &var)| {
                    !self.task_info.operator_mentions_variable(op.concrete_op_id, var)
                })
                .map(|(index, _)| Fact::new(index, 0))
                .collect();
            let mut transition_id = self.transition_id_offset[abs_op_id];
            loop {
                let mut source = op.precondition_hash;
                for fact in &free_facts {
                    source += self.hash_multipliers[fact.var] * fact.value;
                }
                let target = (source as isize + op.forward_hash_effect) as usize;
                debug_assert_ne!(source, target);
                callback.apply(Transition::new(
                    transition_id,
                    op.concrete_op_id,
                    source,
                    target,
                ));
                transition_id += 1;
                if !increment_to_next_state(&mut free_facts, &self.pattern_domain_sizes) {
                    break;
                }
            }
        }
    }

    fn reachability_from_init(&self) -> &[bool] {
        self.reachability_from_init.get_or_init(|| {
            self.compute_reachability_from_state_ocf(
                self.task_info.operator_costs(),
                self.init_state_id,
            )
        })
    }

    fn compute_reachability_from_state_ocf(&self, ocf: &[Cost], state_id: usize) -> Vec<bool> {
        let mut reachable = vec![false; self.num_states];
        reachable[state_id] = true;
        let mut open = vec![state_id];
        while let Some(state) = open.pop() {
            for abs_op_id in self.forward_applicable_operators(state) {
                let successor = self.forward_successor(state, abs_op_id);
                let cost = ocf[self.abstract_operators[abs_op_id].concrete_op_id];
                if !reachable[successor] && cost != INFINITY {
                    reachable[successor] = true;
                    open.push(successor);
                }
            }
        }
        reachable
    }

    fn compute_reachability_from_state_tcf(
        &self,
        tcf: &TransitionCostFunction,
        state_id: usize,
    ) -> Vec<bool> {
        let mut reachable = vec![false; self.num_states];
        reachable[state_id] = true;
        let mut open = vec![state_id];
        while let Some(state) = open.pop() {
            for abs_op_id in self.forward_applicable_operators(state) {
                let successor = self.forward_successor(state, abs_op_id);
                let cost = tcf.sd_cost(self.transition_id(state, abs_op_id));
                if !reachable[successor] && cost != INFINITY {
                    reachable[successor] = true;
                    open.push(successor);
                }
            }
        }
        reachable
    }

    fn compute_reachability_to_state_ocf(&self, ocf: &[Cost], state_id: usize) -> Vec<bool> {
        let mut reachable = vec![false; self.num_states];
        reachable[state_id] = true;
        let mut open = vec![state_id];
        while let Some(state) = open.pop() {
            for abs_op_id in self.regression_applicable_operators(state) {
                let predecessor = self.backward_predecessor(state, abs_op_id);
                let cost = ocf[self.abstract_operators[abs_op_id].concrete_op_id];
                if !reachable[predecessor] && cost != INFINITY {
                    reachable[predecessor] = true;
                    open.push(predecessor);
                }
            }
        }
        reachable
    }

    fn compute_reachability_to_state_tcf(
        &self,
        tcf: &TransitionCostFunction,
        state_id: usize,
    ) -> Vec<bool> {
        let mut reachable = vec![false; self.num_states];
        reachable[state_id] = true;
        let mut open = vec![state_id];
        while let Some(state) = open.pop() {
            for abs_op_id in self.regression_applicable_operators(state) {
                let predecessor = self.backward_predecessor(state, abs_op_id);
                let cost = tcf.sd_cost(self.transition_id(predecessor, abs_op_id));
                if !reachable[predecessor] && cost != INFINITY {
                    reachable[predecessor] = true;
                    open.push(predecessor);
                }
            }
        }
        reachable
    }

    fn goal_distances_nonnegative_ocf(&self, ocf: &[Cost]) -> Vec<Cost> {
        debug_assert!(ocf.iter().all(|&c| c >= 0));
        let mut distances = vec![INFINITY; self.num_states];
        let mut queue = self.goal_seeds(&mut distances);
        while let Some((distance, state)) = queue.pop() {
            if distance > distances[state] {
                continue;
            }
            for abs_op_id in self.regression_applicable_operators(state) {
                let predecessor = self.backward_predecessor(state, abs_op_id);
                let cost = ocf[self.abstract_operators[abs_op_id].concrete_op_id];
                let alternative =
                    if cost == INFINITY { INFINITY } else { distances[state] + cost };
                if alternative < distances[predecessor] {
                    distances[predecessor] = alternative;
                    queue.push((alternative, predecessor));
                }
            }
        }
        distances
    }

    fn goal_distances_nonnegative_tcf(&self, tcf: &TransitionCostFunction) -> Vec<Cost> {
        let mut distances = vec![INFINITY; self.num_states];
        let mut queue = self.goal_seeds(&mut distances);
        while let Some((distance, state)) = queue.pop() {
            if distance > distances[state] {
                continue;
            }
            for abs_op_id in self.regression_applicable_operators(state) {
                let predecessor = self.backward_predecessor(state, abs_op_id);
                let cost = tcf.sd_cost(self.transition_id(predecessor, abs_op_id));
                debug_assert!(cost >= 0);
                let alternative =
                    if cost == INFINITY { INFINITY } else { distances[state] + cost };
                if alternative < distances[predecessor] {
                    distances[predecessor] = alternative;
                    queue.push((alternative, predecessor));
                }
            }
        }
        distances
    }

    fn compute_goal_distances_sdcf(
        &self,
        sdcf: &StateDependentCostFunction,
        tcf: &mut TransitionCostFunction,
    ) -> Vec<Cost> {
        let mut distances = vec![INFINITY; self.num_states];
        let mut queue = self.goal_seeds(&mut distances);
        tcf.fill_zero();
        while let Some((distance, state)) = queue.pop() {
            if distance > distances[state] {
                continue;
            }
            let state_distance = distances[state];
            for abs_op_id in self.regression_applicable_operators(state) {
                let predecessor = self.backward_predecessor(state, abs_op_id);
                let concrete_op_id = self.abstract_operators[abs_op_id].concrete_op_id;
                let transition_id = self.transition_id(predecessor, abs_op_id);
                let required = left_subtraction(distances[predecessor], state_distance);
                let mut cost = 0;
                if required > 0 {
                    cost = sdcf.initial_cost(concrete_op_id);
                    if cost < required {
                        let transition =
                            Transition::new(transition_id, concrete_op_id, predecessor, state);
                        cost = sdcf.cost_at_transition_with_hint(self, &transition, required);
                    }
                }
                debug_assert!(cost >= 0);
                tcf.sd_costs_mut()[transition_id] = cost;
                let alternative =
                    if cost == INFINITY { INFINITY } else { state_distance + cost };
                if alternative < distances[predecessor] {
                    distances[predecessor] = alternative;
                    queue.push((alternative, predecessor));
                }
            }
        }
        distances
    }

    fn state_bdd(&self, state_id: usize) -> Bdd {
        self.bdd_builder.state_bdd(&self.compute_state_facts(state_id))
    }

    fn transition_bdd(&self, transition: &Transition) -> Bdd {
        self.bdd_builder
            .state_bdd_for_operator(&self.compute_state_facts(transition.source_id), transition.op_id)
    }

    fn transition_bdd_cached(&self, transition: &Transition) -> Bdd {
        if let Some(bdd) = self.transition_bdd_cache.read().get(&transition.transition_id) {
            return bdd.clone();
        }
        let bdd = self.transition_bdd(transition);
        self.transition_bdd_cache.write().insert(transition.transition_id, bdd.clone());
        bdd
    }

    fn clear_caches(&self) {
        self.transition_bdd_cache.write().clear();
    }
}

/// Materializes projections for an externally selected pattern collection.
pub struct ProjectionGenerator {
    patterns: Vec<Vec<usize>>,
}

impl ProjectionGenerator {
    pub fn new(patterns: Vec<Vec<usize>>) -> Self {
        ProjectionGenerator { patterns }
    }
}

impl crate::abstraction::AbstractionGenerator for ProjectionGenerator {
    fn generate(
        &self,
        _task: &crate::implementation::Task,
        task_info: &Arc<TaskInfo>,
        bdd_builder: &Arc<BddBuilder>,
    ) -> Result<Vec<Box<dyn Abstraction>>> {
        self.patterns
            .iter()
            .map(|pattern| {
                Projection::new(Arc::clone(task_info), Arc::clone(bdd_builder), pattern.clone())
                    .map(|projection| Box::new(projection) as Box<dyn Abstraction>)
            })
            .collect()
    }
}

/// Advances the assignment of the free pattern variables to the next state;
/// false once all assignments are exhausted.
fn increment_to_next_state(facts: &mut [Fact], pattern_domain_sizes: &[usize]) -> bool {
    for fact in facts.iter_mut() {
        fact.value += 1;
        if fact.value >= pattern_domain_sizes[fact.var] {
            fact.value = 0;
        } else {
            return true;
        }
    }
    false
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
pub(crate) mod test_projection {
    use super::*;
    use crate::implementation::task::test_tasks::two_switches;
    use crate::implementation::task::{Operator, Task};

    pub fn projection(task: &Task, pattern: Vec<usize>) -> Projection {
        let task_info = Arc::new(TaskInfo::new(task));
        let bdd_builder = Arc::new(BddBuilder::new(Arc::clone(&task_info)));
        Projection::new(task_info, bdd_builder, pattern).unwrap()
    }

    #[test]
    fn hashing_is_mixed_radix() {
        let task = Task::new(
            vec![2, 3, 2],
            vec![Operator::new(1, vec![], vec![Fact::new(0, 1)])],
            State::new(vec![0, 2, 1]),
            vec![Fact::new(0, 1)],
        );
        let projection = projection(&task, vec![0, 1]);
        assert_eq!(6, projection.num_states());
        // id = v0 + 2 * v1.
        assert_eq!(4, projection.abstract_state_id(&State::new(vec![0, 2, 1])));
        assert_eq!(4, projection.initial_state_id());
        assert_eq!(5, projection.abstract_state_id(&State::new(vec![1, 2, 0])));
    }

    #[test]
    fn transitions_are_enumerated_with_dense_ids() {
        let task = two_switches();
        let projection = projection(&task, vec![0, 1]);
        // op_a changes v0 for both values of v1, op_b vice versa.
        assert_eq!(4, projection.num_transitions());
        let mut transitions = vec![];
        projection.for_each_transition(&mut |t: Transition| transitions.push(t));
        assert_eq!(4, transitions.len());
        let mut seen = vec![false; 4];
        for t in &transitions {
            assert!(!seen[t.transition_id]);
            seen[t.transition_id] = true;
            assert_ne!(t.source_id, t.target_id);
            // The recomputed id matches the enumerated one.
            let abs_op = projection
                .abstract_operators
                .iter()
                .position(|op| op.concrete_op_id == t.op_id)
                .unwrap();
            assert_eq!(t.transition_id, projection.transition_id(t.source_id, abs_op));
        }
    }

    #[test]
    fn masked_labels_are_skipped_wholesale() {
        let task = two_switches();
        let projection = projection(&task, vec![0, 1]);
        let mut transitions = vec![];
        projection
            .for_each_transition_masked(&[true, false], &mut |t: Transition| transitions.push(t));
        assert_eq!(2, transitions.len());
        assert!(transitions.iter().all(|t| t.op_id == 1));
    }

    #[test]
    fn goal_states_and_distances() {
        let task = two_switches();
        let projection = projection(&task, vec![0, 1]);
        // Goal requires both variables at 1: single abstract goal state 3.
        assert_eq!(FxHashSet::from_iter([3]), projection.goal_states);
        let h = projection.compute_goal_distances_ocf(&[3, 4]);
        assert_eq!(vec![7, 4, 3, 0], h);
        let socf = projection.compute_saturated_costs_ocf(&h);
        assert_eq!(vec![3, 4], socf);
    }

    #[test]
    fn single_variable_projection_has_loops() {
        let task = two_switches();
        let projection = projection(&task, vec![0]);
        assert_eq!(2, projection.num_states());
        assert_eq!(1, projection.num_transitions());
        assert!(!projection.operator_induces_self_loop(0));
        assert!(projection.operator_induces_self_loop(1));
        assert!(projection.operator_is_active(0));
        assert!(!projection.operator_is_active(1));
        let h = projection.compute_goal_distances_ocf(&[3, 4]);
        assert_eq!(vec![3, 0], h);
        // The looping operator is saturated to 0, not -INFINITY.
        assert_eq!(vec![3, 0], projection.compute_saturated_costs_ocf(&h));
    }

    #[test]
    fn reachability_in_both_directions() {
        let task = two_switches();
        let projection = projection(&task, vec![0, 1]);
        let unit = vec![1, 1];
        assert_eq!(vec![true; 4], projection.compute_reachability_from_state_ocf(&unit, 0));
        // From state 3 (both at 1) nothing else is reachable.
        assert_eq!(
            vec![false, false, false, true],
            projection.compute_reachability_from_state_ocf(&unit, 3)
        );
        assert_eq!(vec![true; 4], projection.compute_reachability_to_state_ocf(&unit, 3));
        assert_eq!(
            vec![true, false, false, false],
            projection.compute_reachability_to_state_ocf(&unit, 0)
        );
    }

    #[test]
    fn the_generator_protocol_materializes_patterns() {
        use crate::abstraction::generate_abstractions;
        let task = two_switches();
        let task_info = Arc::new(TaskInfo::new(&task));
        let bdd_builder = Arc::new(BddBuilder::new(Arc::clone(&task_info)));
        let generators: Vec<Box<dyn crate::abstraction::AbstractionGenerator>> =
            vec![Box::new(ProjectionGenerator::new(vec![vec![0], vec![1], vec![0, 1]]))];
        let abstractions =
            generate_abstractions(&task, &task_info, &bdd_builder, &generators).unwrap();
        assert_eq!(3, abstractions.len());
        assert_eq!(2, abstractions[0].num_states());
        assert_eq!(4, abstractions[2].num_states());
        // Unsorted patterns are rejected.
        let bad = ProjectionGenerator::new(vec![vec![1, 0]]);
        let generators: Vec<Box<dyn crate::abstraction::AbstractionGenerator>> = vec![Box::new(bad)];
        assert!(generate_abstractions(&task, &task_info, &bdd_builder, &generators).is_err());
    }

    #[test]
    fn fingerprints_follow_the_pattern_restriction() {
        let task = two_switches();
        let task_info = Arc::new(TaskInfo::new(&task));
        let builder = Arc::new(BddBuilder::new(Arc::clone(&task_info)));
        let projection =
            Projection::new(Arc::clone(&task_info), Arc::clone(&builder), vec![0]).unwrap();
        assert!(builder.same_set(&projection.state_bdd(0), builder.fact_bdd(0, 0)));
        assert!(builder.same_set(&projection.state_bdd(1), builder.fact_bdd(0, 1)));
        // Operator 0 pins variable 0 by its precondition, so the transition
        // fingerprint is unconstrained.
        let mut transition = None;
        projection.for_each_transition(&mut |t: Transition| transition = Some(t));
        let transition = transition.unwrap();
        assert!(builder.same_set(&projection.transition_bdd(&transition), &builder.one()));
    }
}
