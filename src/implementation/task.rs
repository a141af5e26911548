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

//! This module provides the grounded planning task consumed by the crate and
//! the `TaskInfo` companion, which precomputes the per-operator/per-variable
//! metadata that abstractions, decision diagrams and projections query over
//! and over again during cost partitioning.

use crate::common::{Cost, Fact, State, INFINITY};
use crate::errors::{Error, Result};

// ----------------------------------------------------------------------------
// --- TASK -------------------------------------------------------------------
// ----------------------------------------------------------------------------

/// A grounded operator: a nonnegative integer cost, a set of precondition
/// facts and a set of effect facts, each over distinct variables.
#[derive(Clone, Debug)]
pub struct Operator {
    pub cost: Cost,
    pub preconditions: Vec<Fact>,
    pub effects: Vec<Fact>,
}

impl Operator {
    pub fn new(cost: Cost, preconditions: Vec<Fact>, effects: Vec<Fact>) -> Self {
        Operator { cost, preconditions, effects }
    }
}

/// A grounded classical planning task: variables with finite domains,
/// operators, one initial assignment and a conjunctive goal.
#[derive(Clone, Debug)]
pub struct Task {
    pub domain_sizes: Vec<usize>,
    pub operators: Vec<Operator>,
    pub initial_state: State,
    pub goals: Vec<Fact>,
}

impl Task {
    pub fn new(
        domain_sizes: Vec<usize>,
        operators: Vec<Operator>,
        initial_state: State,
        goals: Vec<Fact>,
    ) -> Self {
        Task { domain_sizes, operators, initial_state, goals }
    }

    pub fn num_variables(&self) -> usize {
        self.domain_sizes.len()
    }

    pub fn num_operators(&self) -> usize {
        self.operators.len()
    }

    /// Rejects tasks the crate cannot handle. This is the startup check of
    /// the task-rejection error class: anything that passes here is fully
    /// supported downstream.
    pub fn validate(&self) -> Result<()> {
        let num_variables = self.num_variables();
        if self.initial_state.num_variables() != num_variables {
            return Err(Error::UnsupportedTask(
                "initial state does not assign every variable".to_string(),
            ));
        }
        for (var, &size) in self.domain_sizes.iter().enumerate() {
            if size == 0 {
                return Err(Error::UnsupportedTask(format!("variable {} has an empty domain", var)));
            }
            if self.initial_state.value(var) >= size {
                return Err(Error::UnsupportedTask(format!(
                    "initial value of variable {} is outside its domain",
                    var
                )));
            }
        }
        let check_facts = |facts: &[Fact], what: &str| -> Result<()> {
            let mut seen = vec![false; num_variables];
            for fact in facts {
                if fact.var >= num_variables || fact.value >= self.domain_sizes[fact.var] {
                    return Err(Error::UnsupportedTask(format!(
                        "{} mentions fact ({}, {}) outside the task",
                        what, fact.var, fact.value
                    )));
                }
                if seen[fact.var] {
                    return Err(Error::UnsupportedTask(format!(
                        "{} assigns variable {} twice",
                        what, fact.var
                    )));
                }
                seen[fact.var] = true;
            }
            Ok(())
        };
        for (op_id, op) in self.operators.iter().enumerate() {
            if op.cost < 0 {
                return Err(Error::UnsupportedTask(format!(
                    "operator {} has negative cost {}",
                    op_id, op.cost
                )));
            }
            check_facts(&op.preconditions, &format!("operator {} precondition", op_id))?;
            check_facts(&op.effects, &format!("operator {} effect", op_id))?;
            // Trivial effects break the transition-counting arithmetic; a
            // normalized grounding never produces them.
            for eff in &op.effects {
                if op.preconditions.iter().any(|pre| pre.var == eff.var && pre.value == eff.value)
                {
                    return Err(Error::UnsupportedTask(format!(
                        "operator {} has an effect equal to its precondition on variable {}",
                        op_id, eff.var
                    )));
                }
            }
        }
        check_facts(&self.goals, "goal")?;
        Ok(())
    }

    /// Returns a copy of this task whose operator costs are multiplied by
    /// `factor`. Overflowing the finite cost range is an error.
    pub fn with_scaled_costs(&self, factor: Cost) -> Result<Task> {
        let mut scaled = self.clone();
        for (op_id, op) in scaled.operators.iter_mut().enumerate() {
            match op.cost.checked_mul(factor) {
                Some(cost) if cost < INFINITY => op.cost = cost,
                _ => {
                    return Err(Error::Overflow(format!(
                        "cost {} of operator {} cannot be scaled by {}",
                        op.cost, op_id, factor
                    )))
                }
            }
        }
        Ok(scaled)
    }

    /// Returns true iff the operator's preconditions hold in the state.
    pub fn is_applicable(&self, op_id: usize, state: &State) -> bool {
        self.operators[op_id]
            .preconditions
            .iter()
            .all(|fact| state.value(fact.var) == fact.value)
    }

    /// The ids of all operators applicable in the state.
    pub fn applicable_operators(&self, state: &State) -> Vec<usize> {
        (0..self.num_operators()).filter(|&op| self.is_applicable(op, state)).collect()
    }

    /// The successor state reached by applying an (applicable) operator.
    pub fn successor(&self, op_id: usize, state: &State) -> State {
        debug_assert!(self.is_applicable(op_id, state));
        let mut successor = state.clone();
        for &fact in &self.operators[op_id].effects {
            successor.assign(fact);
        }
        successor
    }

    /// Returns true iff every goal fact holds in the state.
    pub fn is_goal(&self, state: &State) -> bool {
        self.goals.iter().all(|fact| state.value(fact.var) == fact.value)
    }
}

// ----------------------------------------------------------------------------
// --- TASK INFO --------------------------------------------------------------
// ----------------------------------------------------------------------------

/// Precomputed, immutable task metadata. `TaskInfo` answers the questions
/// the projections and the decision-diagram builder keep asking (which
/// variables an operator mentions, pre/postcondition values, transition
/// counts over a pattern) without touching the task again.
pub struct TaskInfo {
    num_variables: usize,
    num_operators: usize,
    domain_sizes: Vec<usize>,
    operator_costs: Vec<Cost>,
    initial_state: State,
    goals: Vec<Fact>,

    /// Sorted precondition facts per operator.
    preconditions_by_operator: Vec<Vec<Fact>>,
    /// Sorted postcondition facts per operator (preconditions overridden by
    /// effects).
    postconditions_by_operator: Vec<Vec<Fact>>,

    // Flattened op x var bit tables.
    mentioned_variables: Vec<bool>,
    precondition_variables: Vec<bool>,
    effect_variables: Vec<bool>,
    /// Set iff the operator has a precondition and a different effect on the
    /// variable.
    pre_eff_variables: Vec<bool>,
}

impl TaskInfo {
    pub fn new(task: &Task) -> Self {
        let num_variables = task.num_variables();
        let num_operators = task.num_operators();
        let mut mentioned_variables = vec![false; num_operators * num_variables];
        let mut precondition_variables = vec![false; num_operators * num_variables];
        let mut effect_variables = vec![false; num_operators * num_variables];
        let mut pre_eff_variables = vec![false; num_operators * num_variables];
        let mut preconditions_by_operator = Vec::with_capacity(num_operators);
        let mut postconditions_by_operator = Vec::with_capacity(num_operators);

        for (op_id, op) in task.operators.iter().enumerate() {
            let index = |var: usize| op_id * num_variables + var;
            let mut preconditions = op.preconditions.clone();
            preconditions.sort();
            let mut postconditions = preconditions.clone();
            for &fact in &op.effects {
                match postconditions.binary_search_by_key(&fact.var, |f| f.var) {
                    Ok(pos) => postconditions[pos] = fact,
                    Err(pos) => postconditions.insert(pos, fact),
                }
            }
            for &fact in &preconditions {
                mentioned_variables[index(fact.var)] = true;
                precondition_variables[index(fact.var)] = true;
            }
            for &fact in &op.effects {
                mentioned_variables[index(fact.var)] = true;
                effect_variables[index(fact.var)] = true;
            }
            for &fact in &preconditions {
                if let Some(eff) = op.effects.iter().find(|eff| eff.var == fact.var) {
                    if eff.value != fact.value {
                        pre_eff_variables[index(fact.var)] = true;
                    }
                }
            }
            preconditions_by_operator.push(preconditions);
            postconditions_by_operator.push(postconditions);
        }

        TaskInfo {
            num_variables,
            num_operators,
            domain_sizes: task.domain_sizes.clone(),
            operator_costs: task.operators.iter().map(|op| op.cost).collect(),
            initial_state: task.initial_state.clone(),
            goals: task.goals.clone(),
            preconditions_by_operator,
            postconditions_by_operator,
            mentioned_variables,
            precondition_variables,
            effect_variables,
            pre_eff_variables,
        }
    }

    #[inline]
    fn index(&self, op_id: usize, var: usize) -> usize {
        op_id * self.num_variables + var
    }

    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    pub fn num_operators(&self) -> usize {
        self.num_operators
    }

    pub fn domain_size(&self, var: usize) -> usize {
        self.domain_sizes[var]
    }

    pub fn domain_sizes(&self) -> &[usize] {
        &self.domain_sizes
    }

    pub fn operator_cost(&self, op_id: usize) -> Cost {
        self.operator_costs[op_id]
    }

    pub fn operator_costs(&self) -> &[Cost] {
        &self.operator_costs
    }

    pub fn initial_state(&self) -> &State {
        &self.initial_state
    }

    pub fn goals(&self) -> &[Fact] {
        &self.goals
    }

    /// The precondition value of the operator on the variable, if any.
    pub fn precondition_value(&self, op_id: usize, var: usize) -> Option<usize> {
        lookup_value(&self.preconditions_by_operator[op_id], var)
    }

    /// The postcondition value of the operator on the variable, if any. This
    /// is the effect value, falling back to the precondition value for
    /// prevail conditions.
    pub fn postcondition_value(&self, op_id: usize, var: usize) -> Option<usize> {
        lookup_value(&self.postconditions_by_operator[op_id], var)
    }

    pub fn operator_mentions_variable(&self, op_id: usize, var: usize) -> bool {
        self.mentioned_variables[self.index(op_id, var)]
    }

    pub fn operator_has_precondition(&self, op_id: usize, var: usize) -> bool {
        self.precondition_variables[self.index(op_id, var)]
    }

    pub fn operator_has_effect(&self, op_id: usize, var: usize) -> bool {
        self.effect_variables[self.index(op_id, var)]
    }

    /// True iff the operator has a precondition and a different effect on the
    /// variable, i.e. it always changes the variable when applied.
    pub fn operator_changes_variable(&self, op_id: usize, var: usize) -> bool {
        self.pre_eff_variables[self.index(op_id, var)]
    }

    /// True iff the operator induces an abstract self-loop in the projection
    /// on `pattern`: it never changes a pattern variable for sure.
    pub fn operator_induces_self_loop(&self, pattern: &[usize], op_id: usize) -> bool {
        !pattern.iter().any(|&var| self.operator_changes_variable(op_id, var))
    }

    /// True iff the operator can induce a state-changing transition in the
    /// projection on `pattern`.
    pub fn operator_is_active(&self, pattern: &[usize], op_id: usize) -> bool {
        pattern.iter().any(|&var| self.operator_has_effect(op_id, var))
    }

    /// The number of state-changing transitions the concrete operator
    /// induces in the projection on `pattern`.
    pub fn num_transitions_from_concrete_operator(&self, pattern: &[usize], op_id: usize) -> usize {
        let mut num_transitions = 1;
        let mut has_state_changing_effect = false;
        for &var in pattern {
            if self.operator_changes_variable(op_id, var) {
                has_state_changing_effect = true;
            } else if self.operator_has_effect(op_id, var) {
                has_state_changing_effect = true;
                num_transitions *= self.domain_sizes[var] - 1;
            } else if !self.operator_has_precondition(op_id, var) {
                num_transitions *= self.domain_sizes[var];
            }
        }
        if has_state_changing_effect {
            num_transitions
        } else {
            0
        }
    }

    /// The number of state-changing transitions a single abstract operator
    /// (one multiplied-out variant of a concrete operator) induces in the
    /// projection on `pattern`: one per assignment of the unmentioned
    /// pattern variables.
    pub fn num_transitions_from_abstract_operator(&self, pattern: &[usize], op_id: usize) -> usize {
        pattern
            .iter()
            .filter(|&&var| !self.operator_mentions_variable(op_id, var))
            .map(|&var| self.domain_sizes[var])
            .product()
    }

    /// The number of abstract self-loops of the operator in the projection
    /// on `pattern`.
    pub fn num_loops(&self, pattern: &[usize], op_id: usize) -> usize {
        let mut num_loops = 1;
        for &var in pattern {
            if self.operator_changes_variable(op_id, var) {
                return 0;
            } else if !self.operator_has_precondition(op_id, var) {
                num_loops *= self.domain_sizes[var];
            }
        }
        num_loops
    }
}

fn lookup_value(facts: &[Fact], var: usize) -> Option<usize> {
    debug_assert!(facts.windows(2).all(|w| w[0].var < w[1].var));
    facts
        .binary_search_by_key(&var, |fact| fact.var)
        .ok()
        .map(|pos| facts[pos].value)
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
pub(crate) mod test_tasks {
    use super::*;

    /// Two binary variables; op_a flips a (cost 3), op_b flips b (cost 4).
    /// The goal requires both to be 1.
    pub fn two_switches() -> Task {
        Task::new(
            vec![2, 2],
            vec![
                Operator::new(3, vec![Fact::new(0, 0)], vec![Fact::new(0, 1)]),
                Operator::new(4, vec![Fact::new(1, 0)], vec![Fact::new(1, 1)]),
            ],
            State::new(vec![0, 0]),
            vec![Fact::new(0, 1), Fact::new(1, 1)],
        )
    }

    #[test]
    fn validation_accepts_a_sane_task() {
        assert!(two_switches().validate().is_ok());
    }

    #[test]
    fn validation_rejects_out_of_range_facts() {
        let mut task = two_switches();
        task.goals.push(Fact::new(0, 7));
        assert!(matches!(task.validate(), Err(Error::UnsupportedTask(_))));
    }

    #[test]
    fn validation_rejects_negative_costs() {
        let mut task = two_switches();
        task.operators[0].cost = -1;
        assert!(matches!(task.validate(), Err(Error::UnsupportedTask(_))));
    }

    #[test]
    fn scaling_multiplies_every_cost() {
        let scaled = two_switches().with_scaled_costs(1000).unwrap();
        assert_eq!(3000, scaled.operators[0].cost);
        assert_eq!(4000, scaled.operators[1].cost);
    }

    #[test]
    fn scaling_detects_overflow() {
        let mut task = two_switches();
        task.operators[0].cost = INFINITY / 2;
        assert!(matches!(task.with_scaled_costs(1000), Err(Error::Overflow(_))));
    }

    #[test]
    fn applicability_and_successors() {
        let task = two_switches();
        let init = task.initial_state.clone();
        assert_eq!(vec![0, 1], task.applicable_operators(&init));
        let after_a = task.successor(0, &init);
        assert_eq!(State::new(vec![1, 0]), after_a);
        assert_eq!(vec![1], task.applicable_operators(&after_a));
        assert!(!task.is_goal(&after_a));
        assert!(task.is_goal(&task.successor(1, &after_a)));
    }

    #[test]
    fn task_info_pre_and_postconditions() {
        let info = TaskInfo::new(&two_switches());
        assert_eq!(Some(0), info.precondition_value(0, 0));
        assert_eq!(None, info.precondition_value(0, 1));
        assert_eq!(Some(1), info.postcondition_value(0, 0));
        assert_eq!(None, info.postcondition_value(0, 1));
        assert!(info.operator_mentions_variable(0, 0));
        assert!(!info.operator_mentions_variable(0, 1));
        assert!(info.operator_changes_variable(0, 0));
        assert!(info.operator_has_precondition(0, 0));
        assert!(info.operator_has_effect(0, 0));
    }

    #[test]
    fn task_info_pattern_queries() {
        let info = TaskInfo::new(&two_switches());
        // In the projection on {0}, op 0 changes the variable, op 1 loops.
        assert!(!info.operator_induces_self_loop(&[0], 0));
        assert!(info.operator_induces_self_loop(&[0], 1));
        assert!(info.operator_is_active(&[0], 0));
        assert!(!info.operator_is_active(&[0], 1));
        assert_eq!(1, info.num_transitions_from_concrete_operator(&[0], 0));
        assert_eq!(0, info.num_transitions_from_concrete_operator(&[0], 1));
        assert_eq!(1, info.num_transitions_from_abstract_operator(&[0], 0));
        // op 1 has no precondition on variable 0, so it loops in both states.
        assert_eq!(2, info.num_loops(&[0], 1));
        assert_eq!(0, info.num_loops(&[0], 0));
    }

    #[test]
    fn postconditions_merge_preconditions_and_effects() {
        // One operator with a prevail condition on var 1.
        let task = Task::new(
            vec![2, 3],
            vec![Operator::new(
                1,
                vec![Fact::new(0, 0), Fact::new(1, 2)],
                vec![Fact::new(0, 1)],
            )],
            State::new(vec![0, 2]),
            vec![Fact::new(0, 1)],
        );
        let info = TaskInfo::new(&task);
        assert_eq!(Some(1), info.postcondition_value(0, 0));
        assert_eq!(Some(2), info.postcondition_value(0, 1));
        assert!(!info.operator_changes_variable(0, 1));
        // The prevail variable is mentioned but never changed, so the
        // operator loops in the projection on {1}.
        assert!(info.operator_induces_self_loop(&[1], 0));
    }
}
