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

//! This module provides the LP-based saturator. It encodes the consistency
//! constraints of the abstraction as a linear program, pins the estimate of
//! the queried state, minimizes the total assigned costs, and re-derives the
//! saturated cost function from the solution's integral goal distances.
//! Only states with finite estimates that are reachable from the queried
//! state enter the program; everything else keeps its infinity.

use crate::abstraction::{
    finalize_saturator_result_ocf, Abstraction, Reachable, Saturator, SaturatorResultOcf,
    SaturatorResultTcf,
};
use crate::common::{compute_reachability_cost_function, Cost, Transition, INFINITY};
use crate::errors::{fatal, Error};
use crate::implementation::lp::{LpConstraint, LpProblem, LpSense, LpVariable};
use crate::implementation::{StateDependentCostFunction, TransitionCostFunction};

/// What the transition-form LP minimizes: the sum over transition cost
/// variables, or the sum over per-operator aggregates that upper-bound them.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ObjectiveType {
    Transitions,
    Operators,
}

/*
  All LP results are doubles; every operator cost entering a pipeline was
  multiplied by COST_FACTOR, so rounding to the nearest integer loses less
  than a thousandth of a cost unit. Rounding up unconditionally could break
  dominance or admissibility; rounding down would needlessly turn tiny
  negative values into -1. Nearest is the only safe choice.
*/
fn convert_to_int(value: f64) -> Cost {
    let rounded = value.round();
    if !(rounded > f64::from(-INFINITY) && rounded < f64::from(INFINITY)) {
        fatal(Error::Overflow(format!("LP solution value {} leaves the finite range", value)));
    }
    rounded as Cost
}

/// The LP saturator. Reachability is always measured from the queried state.
pub struct LpSaturator {
    pub objective_type: ObjectiveType,
    /// Derive initial transition costs with the discovering Dijkstra.
    pub spd: bool,
    pub use_general_costs: bool,
    pub recompute_h_values: bool,
    pub saturate_negative_infinity: bool,
}

impl Default for LpSaturator {
    fn default() -> Self {
        LpSaturator {
            objective_type: ObjectiveType::Transitions,
            spd: true,
            use_general_costs: true,
            recompute_h_values: false,
            saturate_negative_infinity: false,
        }
    }
}

impl LpSaturator {
    /// Distance variables for every state that matters: finite estimate and
    /// reachable. The queried state is pinned to its estimate, goal states
    /// are bounded by zero from above.
    fn add_distance_variables(
        lp: &mut LpProblem,
        abstraction: &dyn Abstraction,
        h_values: &[Cost],
        reachability: &[bool],
        state_id: usize,
        state_h: Cost,
    ) -> Vec<Option<usize>> {
        let infinity = LpProblem::infinity();
        let mut distance_variables = vec![None; abstraction.num_states()];
        for (source_id, variable) in distance_variables.iter_mut().enumerate() {
            let h = h_values[source_id];
            if h == INFINITY || h == -INFINITY || !reachability[source_id] {
                continue;
            }
            let mut lower = -infinity;
            let mut upper =
                if abstraction.is_goal_state(source_id) { 0.0 } else { infinity };
            if source_id == state_id {
                lower = f64::from(state_h);
                upper = f64::from(state_h);
            }
            *variable = Some(lp.add_variable(LpVariable::new(lower, upper, 0.0)));
        }
        distance_variables
    }
}

impl Saturator for LpSaturator {
    fn saturate_ocf(
        &self,
        abstraction: &dyn Abstraction,
        ocf: &[Cost],
        h_values: Vec<Cost>,
        state_id: usize,
    ) -> SaturatorResultOcf {
        let num_states = abstraction.num_states();
        let state_h = h_values[state_id];

        /*
          If h(state) = INFINITY, no path from the state reaches a goal, so
          every cost function preserves the estimate, including the one that
          assigns -INFINITY everywhere. No LP is needed.
        */
        if state_h == INFINITY {
            let fill = if self.use_general_costs { -INFINITY } else { 0 };
            let socf = vec![fill; ocf.len()];
            let mut new_h_values = vec![fill; num_states];
            new_h_values[state_id] = INFINITY;
            return SaturatorResultOcf {
                socf,
                h_values: new_h_values,
                saturate_negative_infinity: false,
            };
        }
        if state_h == -INFINITY {
            fatal(Error::Precondition(
                "LP saturator: saturating for h = -INFINITY is not supported".to_string(),
            ));
        }

        let reachability = abstraction.compute_reachability_from_state_ocf(
            &compute_reachability_cost_function(ocf),
            state_id,
        );

        let mut lp = LpProblem::new(LpSense::Minimize);
        let infinity = LpProblem::infinity();
        let distance_variables = Self::add_distance_variables(
            &mut lp,
            abstraction,
            &h_values,
            &reachability,
            state_id,
            state_h,
        );

        /* A cost variable is only created for operators that label at least
        one relevant transition; everything else keeps -INFINITY. */
        let mut operator_cost_variables: Vec<Option<usize>> = vec![None; ocf.len()];
        abstraction.for_each_transition(&mut |transition: Transition| {
            let irrelevant = distance_variables[transition.source_id].is_none()
                || distance_variables[transition.target_id].is_none()
                || ocf[transition.op_id] == INFINITY
                || ocf[transition.op_id] == -INFINITY;
            if irrelevant || operator_cost_variables[transition.op_id].is_some() {
                return;
            }
            let loops = abstraction.operator_induces_self_loop(transition.op_id);
            let lower = if !self.use_general_costs || loops { 0.0 } else { -infinity };
            let upper = f64::from(ocf[transition.op_id]);
            operator_cost_variables[transition.op_id] =
                Some(lp.add_variable(LpVariable::new(lower, upper, 0.0)));
        });

        /* For every relevant transition (s, o, s'):
             h[s] <= c[o] + h[s']  i.e.  0 <= c[o] + h[s'] - h[s]. */
        abstraction.for_each_transition(&mut |transition: Transition| {
            let (Some(from_col), Some(to_col)) = (
                distance_variables[transition.source_id],
                distance_variables[transition.target_id],
            ) else {
                return;
            };
            let Some(op_col) = operator_cost_variables[transition.op_id] else {
                return;
            };
            let mut constraint = LpConstraint::new(0.0, infinity);
            constraint.insert(op_col, 1.0);
            constraint.insert(to_col, 1.0);
            constraint.insert(from_col, -1.0);
            lp.add_constraint(constraint);
            lp.set_objective_coefficient(op_col, 1.0);
        });

        let solution = match lp.solve() {
            Ok(solution) => solution,
            Err(error) => fatal(error),
        };

        let mut new_h_values = vec![0; num_states];
        for (source_id, new_h) in new_h_values.iter_mut().enumerate() {
            match distance_variables[source_id] {
                None => {
                    *new_h = if !reachability[source_id] && h_values[source_id] != INFINITY {
                        -INFINITY
                    } else {
                        INFINITY
                    };
                }
                Some(column) => {
                    /* Values can be negative for states close to a goal
                    with many incoming transitions. */
                    *new_h = convert_to_int(solution.value(column));
                }
            }
        }

        let socf = abstraction.compute_saturated_costs_ocf(&new_h_values);
        finalize_saturator_result_ocf(
            abstraction,
            ocf,
            socf,
            new_h_values,
            self.recompute_h_values,
            Reachable::FromState,
            self.saturate_negative_infinity,
        )
    }

    fn saturate_tcf(
        &self,
        abstraction: &dyn Abstraction,
        mut tcf: TransitionCostFunction,
        sdcf: &StateDependentCostFunction,
        mut h_values: Vec<Cost>,
        state_id: usize,
    ) -> SaturatorResultTcf {
        /* The first saturator of a chain derives the transition costs; the
        discovering Dijkstra already accounts for newly useless operators. */
        if h_values.is_empty() {
            if tcf.is_uninitialized() {
                tcf = TransitionCostFunction::new(abstraction);
            }
            if self.spd {
                h_values = abstraction.compute_goal_distances_sdcf(sdcf, &mut tcf);
            } else {
                sdcf.fill_transition_costs(abstraction, &mut tcf);
                h_values = abstraction.compute_goal_distances_tcf(&tcf);
            }
        }

        let num_states = abstraction.num_states();
        let state_h = h_values[state_id];

        if state_h == INFINITY {
            let fill = if self.use_general_costs { -INFINITY } else { 0 };
            let mut new_h_values = vec![fill; num_states];
            new_h_values[state_id] = INFINITY;
            return SaturatorResultTcf {
                tcf,
                h_values: new_h_values,
                saturate_negative_infinity: self.saturate_negative_infinity,
            };
        }
        if state_h == -INFINITY {
            fatal(Error::Precondition(
                "LP transition saturator: saturating for h = -INFINITY is not supported"
                    .to_string(),
            ));
        }

        let reachability = abstraction.compute_reachability_from_state_tcf(&tcf, state_id);

        let mut lp = LpProblem::new(LpSense::Minimize);
        let infinity = LpProblem::infinity();
        let distance_variables = Self::add_distance_variables(
            &mut lp,
            abstraction,
            &h_values,
            &reachability,
            state_id,
            state_h,
        );

        let mut transition_cost_variables: Vec<Option<usize>> =
            vec![None; abstraction.num_transitions()];
        let mut operator_cost_variables: Vec<Option<usize>> =
            vec![None; abstraction.num_operators()];
        {
            let sd_costs = tcf.sd_costs();
            abstraction.for_each_transition(&mut |transition: Transition| {
                let cost = sd_costs[transition.transition_id];
                if distance_variables[transition.source_id].is_none()
                    || distance_variables[transition.target_id].is_none()
                    || cost == INFINITY
                    || cost == -INFINITY
                {
                    return;
                }
                /* 0/-infinity <= c[t] <= tcf[t]. */
                let lower = if self.use_general_costs { -infinity } else { 0.0 };
                transition_cost_variables[transition.transition_id] =
                    Some(lp.add_variable(LpVariable::new(lower, f64::from(cost), 0.0)));

                if self.objective_type == ObjectiveType::Operators
                    && operator_cost_variables[transition.op_id].is_none()
                {
                    /* 0/-infinity <= c[o] <= infinity. */
                    let loops = abstraction.operator_induces_self_loop(transition.op_id);
                    let lower = if !self.use_general_costs || loops { 0.0 } else { -infinity };
                    operator_cost_variables[transition.op_id] =
                        Some(lp.add_variable(LpVariable::new(lower, infinity, 0.0)));
                }
            });

            /* For every relevant transition t = (s, o, s'):
                 0 <= c[t] + h[s'] - h[s], and with the operator objective
                 additionally 0 <= c[o] - c[t]. */
            abstraction.for_each_transition(&mut |transition: Transition| {
                let Some(transition_col) = transition_cost_variables[transition.transition_id]
                else {
                    return;
                };
                let (Some(from_col), Some(to_col)) = (
                    distance_variables[transition.source_id],
                    distance_variables[transition.target_id],
                ) else {
                    return;
                };
                let mut constraint = LpConstraint::new(0.0, infinity);
                constraint.insert(transition_col, 1.0);
                constraint.insert(to_col, 1.0);
                constraint.insert(from_col, -1.0);
                lp.add_constraint(constraint);
                match self.objective_type {
                    ObjectiveType::Transitions => {
                        lp.set_objective_coefficient(transition_col, 1.0);
                    }
                    ObjectiveType::Operators => {
                        let Some(op_col) = operator_cost_variables[transition.op_id] else {
                            return;
                        };
                        let mut aggregate = LpConstraint::new(0.0, infinity);
                        aggregate.insert(op_col, 1.0);
                        aggregate.insert(transition_col, -1.0);
                        lp.add_constraint(aggregate);
                        lp.set_objective_coefficient(op_col, 1.0);
                    }
                }
            });
        }

        let solution = match lp.solve() {
            Ok(solution) => solution,
            Err(error) => fatal(error),
        };

        let mut new_h_values = vec![0; num_states];
        for (source_id, new_h) in new_h_values.iter_mut().enumerate() {
            match distance_variables[source_id] {
                None => {
                    *new_h =
                        if h_values[source_id] == INFINITY { INFINITY } else { -INFINITY };
                }
                Some(column) => {
                    *new_h = convert_to_int(solution.value(column));
                    if *new_h == INFINITY || *new_h == -INFINITY {
                        fatal(Error::InvariantViolation(format!(
                            "LP transition saturator: finite state {} received an infinite \
                             estimate",
                            source_id
                        )));
                    }
                }
            }
        }

        /* Instead of trusting the LP's cost variables, re-derive the
        saturated transition cost function from the integral estimates. */
        abstraction.compute_saturated_costs_tcf(&new_h_values, &mut tcf);

        SaturatorResultTcf {
            tcf,
            h_values: new_h_values,
            saturate_negative_infinity: self.saturate_negative_infinity,
        }
    }

    fn reachable(&self) -> Reachable {
        Reachable::FromState
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_lp_saturator {
    use super::*;
    use crate::implementation::projection::test_projection::projection;
    use crate::implementation::task::test_tasks::two_switches;

    #[test]
    fn the_lp_preserves_the_state_estimate() {
        let task = two_switches();
        let projection = projection(&task, vec![0, 1]);
        let ocf = vec![3, 4];
        let h_values = projection.compute_goal_distances_ocf(&ocf);
        let saturator = LpSaturator::default();
        let result = saturator.saturate_ocf(&projection, &ocf, h_values.clone(), 0);
        assert_eq!(h_values[0], result.h_values[0]);
        for (op_id, &saturated) in result.socf.iter().enumerate() {
            assert!(saturated <= ocf[op_id]);
        }
        // The estimate survives under the saturated costs.
        let resaturated = projection.compute_goal_distances_ocf(&result.socf);
        assert_eq!(h_values[0], resaturated[0]);
    }

    #[test]
    fn the_lp_never_uses_more_than_the_plain_saturator() {
        // Minimality: the LP objective cannot exceed the sum the cap
        // saturator assigns for the same state.
        use crate::abstraction::Saturator as _;
        use crate::implementation::saturator_cap::CapSaturator;
        let task = two_switches();
        let projection = projection(&task, vec![0, 1]);
        let ocf = vec![3, 4];
        let h_values = projection.compute_goal_distances_ocf(&ocf);
        let lp_result =
            LpSaturator::default().saturate_ocf(&projection, &ocf, h_values.clone(), 0);
        let cap_result =
            CapSaturator::default().saturate_ocf(&projection, &ocf, h_values, 0);
        let total = |socf: &[Cost]| -> Cost {
            socf.iter().filter(|&&c| c != -INFINITY && c != INFINITY).sum()
        };
        assert!(total(&lp_result.socf) <= total(&cap_result.socf));
    }

    #[test]
    fn an_unsolvable_state_bypasses_the_lp() {
        let task = two_switches();
        let projection = projection(&task, vec![0, 1]);
        // Operator 1 is unusable: states needing it have no goal path.
        let ocf = vec![3, INFINITY];
        let h_values = projection.compute_goal_distances_ocf(&ocf);
        assert_eq!(INFINITY, h_values[0]);
        let saturator = LpSaturator::default();
        let result = saturator.saturate_ocf(&projection, &ocf, h_values, 0);
        assert_eq!(INFINITY, result.h_values[0]);
        assert!(result.h_values.iter().enumerate().all(|(s, &h)| s == 0 || h == -INFINITY));
        // The bypass gives away every cost: -INFINITY across the board.
        assert_eq!(vec![-INFINITY, -INFINITY], result.socf);
    }

    #[test]
    fn rounding_keeps_integers() {
        assert_eq!(3, convert_to_int(2.9996));
        assert_eq!(3, convert_to_int(3.0004));
        assert_eq!(-2, convert_to_int(-2.2));
        assert_eq!(0, convert_to_int(-0.0001));
    }
}
