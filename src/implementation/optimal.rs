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

//! This module provides the optimal cost partitioning heuristic: one linear
//! program over all abstractions at once, maximizing the summed abstract
//! goal distances subject to consistency inside each abstraction and to the
//! per-operator budget across abstractions. The program is built once; each
//! query only moves the bounds of the previous and the new abstract state
//! variables and re-solves.

use crate::abstraction::{Abstraction, AbstractionFunction};
use crate::common::{Cost, State, Transition, INFINITY};
use crate::errors::fatal;
use crate::implementation::heuristic::Estimate;
use crate::implementation::lp::{LpConstraint, LpProblem, LpSense, LpVariable};

/// Tolerance when rounding the LP objective to an integer estimate.
const EPSILON: f64 = 0.01;

/// The optimal-cost-partitioning heuristic over a set of abstractions.
pub struct OptimalCostPartitioningHeuristic {
    abstraction_functions: Vec<Box<dyn AbstractionFunction>>,
    lp: LpProblem,
    allow_negative_costs: bool,
    found_initial_h_value: bool,
    /// Column of `distance[A][s]`, per abstraction and abstract state.
    distance_variables: Vec<Vec<usize>>,
    /// Columns currently pinned to the queried state, per abstraction.
    current_abstract_state_vars: Vec<usize>,
    /// Goal distances under the original costs, for cheap dead-end checks.
    h_values: Vec<Vec<Cost>>,
}

impl OptimalCostPartitioningHeuristic {
    pub fn new(
        abstractions: &[Box<dyn Abstraction>],
        operator_costs: &[Cost],
        allow_negative_costs: bool,
    ) -> Self {
        let mut h_values = Vec::with_capacity(abstractions.len());
        for abstraction in abstractions {
            h_values.push(abstraction.compute_goal_distances_ocf(operator_costs));
        }

        let mut lp = LpProblem::new(LpSense::Maximize);
        let infinity = LpProblem::infinity();
        let default_lower = if allow_negative_costs { -infinity } else { 0.0 };

        let num_operators = operator_costs.len();
        let mut distance_variables = Vec::with_capacity(abstractions.len());
        let mut operator_cost_variables: Vec<Vec<usize>> =
            Vec::with_capacity(abstractions.len());
        let mut heuristic_variables = Vec::with_capacity(abstractions.len());

        /*
          Variables:
           * heuristic[A], maximized;
           * distance[A][s] for every abstract state;
           * operator_cost[A][o] for every operator, nonnegative when the
             operator self-loops in A (otherwise a negative loop share would
             create negative cycles inside A).
        */
        for abstraction in abstractions {
            heuristic_variables
                .push(lp.add_variable(LpVariable::new(default_lower, infinity, 1.0)));
            let states: Vec<usize> = (0..abstraction.num_states())
                .map(|_| lp.add_variable(LpVariable::new(default_lower, infinity, 0.0)))
                .collect();
            distance_variables.push(states);
            let ops: Vec<usize> = (0..num_operators)
                .map(|op_id| {
                    let lower = if abstraction.operator_induces_self_loop(op_id) {
                        0.0
                    } else {
                        default_lower
                    };
                    lp.add_variable(LpVariable::new(lower, infinity, 0.0))
                })
                .collect();
            operator_cost_variables.push(ops);
        }

        /*
          Constraints, per abstraction A:
           * for (s, o, s'): distance[A][s] + operator_cost[A][o] >= distance[A][s'];
           * for every goal g: distance[A][g] >= heuristic[A].
        */
        for (abstraction_id, abstraction) in abstractions.iter().enumerate() {
            abstraction.for_each_transition(&mut |transition: Transition| {
                let mut constraint = LpConstraint::new(0.0, infinity);
                constraint
                    .insert(distance_variables[abstraction_id][transition.source_id], 1.0);
                constraint
                    .insert(operator_cost_variables[abstraction_id][transition.op_id], 1.0);
                constraint
                    .insert(distance_variables[abstraction_id][transition.target_id], -1.0);
                lp.add_constraint(constraint);
            });
            for &goal_id in abstraction.goal_states() {
                let mut constraint = LpConstraint::new(0.0, infinity);
                constraint.insert(distance_variables[abstraction_id][goal_id], 1.0);
                constraint.insert(heuristic_variables[abstraction_id], -1.0);
                lp.add_constraint(constraint);
            }
        }

        /* Across abstractions: sum_A operator_cost[A][o] <= cost(o). */
        for (op_id, &cost) in operator_costs.iter().enumerate() {
            let mut constraint = LpConstraint::new(-infinity, f64::from(cost));
            for columns in &operator_cost_variables {
                constraint.insert(columns[op_id], 1.0);
            }
            lp.add_constraint(constraint);
        }

        let abstraction_functions: Vec<Box<dyn AbstractionFunction>> =
            abstractions.iter().map(|abstraction| abstraction.abstraction_function()).collect();

        /* Remember which columns the first query has to unpin. */
        let initial_ids: Vec<usize> = abstractions
            .iter()
            .map(|abstraction| abstraction.initial_state_id())
            .collect();
        let current_abstract_state_vars: Vec<usize> = initial_ids
            .iter()
            .enumerate()
            .map(|(abstraction_id, &state_id)| distance_variables[abstraction_id][state_id])
            .collect();

        log::info!(
            "optimal cost partitioning LP: {} columns, {} rows over {} abstractions",
            lp.num_variables(),
            lp.num_constraints(),
            abstractions.len()
        );

        OptimalCostPartitioningHeuristic {
            abstraction_functions,
            lp,
            allow_negative_costs,
            found_initial_h_value: false,
            distance_variables,
            current_abstract_state_vars,
            h_values,
        }
    }

    /// The optimal cost partitioning value for the state. LP trouble before
    /// the first successful query is fatal (the program itself is broken or
    /// out of memory); afterwards it marks a dead end of the current state.
    pub fn evaluate(&mut self, state: &State) -> Estimate {
        let infinity = LpProblem::infinity();
        for abstraction_id in 0..self.abstraction_functions.len() {
            let new_state_id =
                self.abstraction_functions[abstraction_id].abstract_state_id(state);
            if self.h_values[abstraction_id][new_state_id] == INFINITY {
                return Estimate::DeadEnd;
            }

            let old_column = self.current_abstract_state_vars[abstraction_id];
            self.lp.set_variable_upper_bound(old_column, infinity);
            if self.allow_negative_costs {
                self.lp.set_variable_lower_bound(old_column, -infinity);
            }

            let new_column = self.distance_variables[abstraction_id][new_state_id];
            self.lp.set_variable_upper_bound(new_column, 0.0);
            if self.allow_negative_costs {
                self.lp.set_variable_lower_bound(new_column, -infinity);
            }
            self.current_abstract_state_vars[abstraction_id] = new_column;
        }

        let solution = match self.lp.solve() {
            Ok(solution) => solution,
            Err(error) => {
                if !self.found_initial_h_value {
                    fatal(error);
                }
                return Estimate::DeadEnd;
            }
        };
        self.found_initial_h_value = true;

        let h = (solution.objective() - EPSILON).ceil();
        Estimate::Value(0.max(h as Cost))
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_optimal {
    use super::*;
    use crate::implementation::projection::test_projection::projection;
    use crate::implementation::task::test_tasks::two_switches;
    use crate::implementation::Task;
    use crate::common::{Fact, State};
    use crate::implementation::task::Operator;

    fn boxed(task: &Task, patterns: Vec<Vec<usize>>) -> Vec<Box<dyn Abstraction>> {
        patterns
            .into_iter()
            .map(|pattern| Box::new(projection(task, pattern)) as Box<dyn Abstraction>)
            .collect()
    }

    #[test]
    fn independent_operators_add_up() {
        let task = two_switches();
        let abstractions = boxed(&task, vec![vec![0], vec![1]]);
        let mut heuristic = OptimalCostPartitioningHeuristic::new(&abstractions, &[3, 4], false);
        assert_eq!(Estimate::Value(7), heuristic.evaluate(&task.initial_state));
        // After reaching the first subgoal only operator 1 remains.
        assert_eq!(Estimate::Value(4), heuristic.evaluate(&State::new(vec![1, 0])));
        assert_eq!(Estimate::Value(0), heuristic.evaluate(&State::new(vec![1, 1])));
        // Queries are repeatable: the bounds are restored between calls.
        assert_eq!(Estimate::Value(7), heuristic.evaluate(&task.initial_state));
    }

    #[test]
    fn a_shared_operator_is_not_counted_twice() {
        // One operator sets both variables at once; two projections each
        // need it, but the optimal partitioning must split its cost 10.
        let task = Task::new(
            vec![2, 2],
            vec![Operator::new(
                10,
                vec![Fact::new(0, 0), Fact::new(1, 0)],
                vec![Fact::new(0, 1), Fact::new(1, 1)],
            )],
            State::new(vec![0, 0]),
            vec![Fact::new(0, 1), Fact::new(1, 1)],
        );
        let abstractions = boxed(&task, vec![vec![0], vec![1]]);
        let mut heuristic = OptimalCostPartitioningHeuristic::new(&abstractions, &[10], false);
        assert_eq!(Estimate::Value(10), heuristic.evaluate(&task.initial_state));
    }

    #[test]
    fn dead_ends_are_detected_from_the_precomputed_distances() {
        let mut task = two_switches();
        // Nothing ever sets v1 to 1.
        task.operators[1] = Operator::new(4, vec![Fact::new(1, 1)], vec![Fact::new(1, 0)]);
        let abstractions = boxed(&task, vec![vec![0, 1]]);
        let mut heuristic = OptimalCostPartitioningHeuristic::new(&abstractions, &[3, 4], false);
        assert_eq!(Estimate::DeadEnd, heuristic.evaluate(&task.initial_state));
    }
}
