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

//! This module provides the cap saturator family ("all"/"perim"): plain
//! saturation of the goal distances, optionally after capping every estimate
//! at the queried state's value and discarding states outside the configured
//! reachability region. The first saturator in a transition-cost chain also
//! derives the initial transition costs, either through the discovering
//! Dijkstra (`spd`) or by querying every transition.

use crate::abstraction::{
    finalize_saturator_result_ocf, Abstraction, Reachable, Saturator, SaturatorResultOcf,
    SaturatorResultTcf,
};
use crate::common::{compute_reachability_cost_function, Cost, INFINITY};
use crate::errors::{fatal, Error};
use crate::implementation::{StateDependentCostFunction, TransitionCostFunction};

/// Clamps every finite estimate at the queried state's own estimate. Values
/// above it can never contribute to preserving it.
fn cap_h_values(max_value: Cost, h_values: &mut [Cost]) {
    debug_assert_ne!(-INFINITY, max_value);
    for h in h_values.iter_mut() {
        if *h != INFINITY {
            *h = (*h).min(max_value);
        }
    }
}

/// The cap saturator. With all options off it is the plain "all" saturator
/// that saturates the given distances as they are.
pub struct CapSaturator {
    /// Cap estimates at the queried state's estimate first.
    pub cap: bool,
    /// Derive the initial transition costs with the discovering Dijkstra
    /// instead of querying every transition.
    pub spd: bool,
    /// Which states count when preserving the estimate.
    pub reachable: Reachable,
    /// Permit negative saturated costs.
    pub use_general_costs: bool,
    /// Recompute the goal distances under the saturated costs.
    pub recompute_h_values: bool,
    /// Ask the pipeline to subtract `-INFINITY` contributions afterwards.
    pub saturate_negative_infinity: bool,
}

impl Default for CapSaturator {
    fn default() -> Self {
        CapSaturator {
            cap: false,
            spd: true,
            reachable: Reachable::All,
            use_general_costs: true,
            recompute_h_values: false,
            saturate_negative_infinity: false,
        }
    }
}

impl CapSaturator {
    /// Marks every state outside the relevant region with `-INFINITY`,
    /// which frees its cost share for later abstractions.
    fn prune_unreachable_ocf(
        &self,
        abstraction: &dyn Abstraction,
        ocf: &[Cost],
        h_values: &mut [Cost],
        state_id: usize,
    ) {
        match self.reachable {
            Reachable::All => {}
            Reachable::FromInit => {
                let reachability = abstraction.reachability_from_init();
                for (state, h) in h_values.iter_mut().enumerate() {
                    if !reachability[state] && *h != INFINITY {
                        *h = -INFINITY;
                    }
                }
            }
            Reachable::FromState => {
                let reachability = abstraction.compute_reachability_from_state_ocf(
                    &compute_reachability_cost_function(ocf),
                    state_id,
                );
                for (state, h) in h_values.iter_mut().enumerate() {
                    if !reachability[state] && *h != INFINITY {
                        *h = -INFINITY;
                    }
                }
            }
        }
    }
}

impl Saturator for CapSaturator {
    fn saturate_ocf(
        &self,
        abstraction: &dyn Abstraction,
        ocf: &[Cost],
        mut h_values: Vec<Cost>,
        state_id: usize,
    ) -> SaturatorResultOcf {
        let state_h = h_values[state_id];
        if self.cap {
            if !ocf.iter().all(|&c| c >= 0 || c == -INFINITY) {
                fatal(Error::Precondition(
                    "perim saturator only accepts costs >= 0 or -INFINITY".to_string(),
                ));
            }
            cap_h_values(state_h, &mut h_values);
        }

        self.prune_unreachable_ocf(abstraction, ocf, &mut h_values, state_id);

        let mut socf = abstraction.compute_saturated_costs_ocf(&h_values);

        /* The nonnegative variant runs Dijkstra downstream, so negative
        saturated costs are clamped away here; the -INFINITY estimates stay
        in h, and a later general saturator can fetch them again. */
        if !self.use_general_costs {
            if !ocf.iter().all(|&c| c >= 0) {
                fatal(Error::Precondition(
                    "cap saturator without general costs only accepts costs >= 0".to_string(),
                ));
            }
            for (op_id, saturated) in socf.iter_mut().enumerate() {
                debug_assert!(*saturated <= ocf[op_id]);
                *saturated = 0.max(*saturated);
                if *saturated > ocf[op_id] {
                    fatal(Error::InvariantViolation(format!(
                        "cap saturator: saturated cost {} of op {} exceeds input {}",
                        saturated, op_id, ocf[op_id]
                    )));
                }
            }
        }

        finalize_saturator_result_ocf(
            abstraction,
            ocf,
            socf,
            h_values,
            self.recompute_h_values,
            self.reachable,
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
        /* The first saturator of a chain derives the transition costs from
        the bucketed cost function and the distances under them. */
        let first_in_chain = h_values.is_empty();
        if first_in_chain {
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

        let state_h = h_values[state_id];
        if self.cap {
            if !first_in_chain && !tcf.is_nonnegative() {
                fatal(Error::Precondition(
                    "perim transition saturator only accepts costs >= 0".to_string(),
                ));
            }
            cap_h_values(state_h, &mut h_values);
        }

        match self.reachable {
            Reachable::All => {}
            Reachable::FromInit => {
                let reachability = abstraction.reachability_from_init();
                debug_assert!(reachability[state_id]);
                for (state, h) in h_values.iter_mut().enumerate() {
                    if !reachability[state] && *h != INFINITY {
                        *h = -INFINITY;
                    }
                }
            }
            Reachable::FromState => {
                let reachability = abstraction.compute_reachability_from_state_tcf(&tcf, state_id);
                debug_assert!(reachability[state_id]);
                for (state, h) in h_values.iter_mut().enumerate() {
                    if !reachability[state] && *h != INFINITY {
                        *h = -INFINITY;
                    }
                }
            }
        }

        /* Transitions between states with infinite estimates keep saturated
        cost -INFINITY; since INFINITY - x = INFINITY this is as good as
        INFINITY unless the distances are reevaluated. */
        abstraction.compute_saturated_costs_tcf(&h_values, &mut tcf);

        SaturatorResultTcf {
            tcf,
            h_values,
            saturate_negative_infinity: self.saturate_negative_infinity,
        }
    }

    fn reachable(&self) -> Reachable {
        self.reachable
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_cap_saturator {
    use super::*;
    use crate::implementation::projection::test_projection::projection;
    use crate::implementation::task::test_tasks::two_switches;

    #[test]
    fn plain_saturation_preserves_the_state_estimate() {
        let task = two_switches();
        let projection = projection(&task, vec![0, 1]);
        let ocf = vec![3, 4];
        let h_values = projection.compute_goal_distances_ocf(&ocf);
        let saturator = CapSaturator::default();
        let result = saturator.saturate_ocf(&projection, &ocf, h_values.clone(), 0);
        assert_eq!(h_values[0], result.h_values[0]);
        // Dominance: saturated costs never exceed the input.
        for (op_id, &saturated) in result.socf.iter().enumerate() {
            assert!(saturated <= ocf[op_id]);
        }
        // And the saturated costs reproduce the estimate.
        let resaturated = projection.compute_goal_distances_ocf(&result.socf);
        assert_eq!(h_values[0], resaturated[0]);
    }

    #[test]
    fn capping_lowers_estimates_above_the_state() {
        let task = two_switches();
        let projection = projection(&task, vec![0, 1]);
        let ocf = vec![3, 4];
        let h_values = projection.compute_goal_distances_ocf(&ocf);
        // Saturate for abstract state 2 (v0=0 seen from v1=1): h = 3.
        let saturator = CapSaturator { cap: true, ..CapSaturator::default() };
        let result = saturator.saturate_ocf(&projection, &ocf, h_values, 2);
        assert_eq!(3, result.h_values[2]);
        // State 0 had h = 7, capped to 3.
        assert_eq!(3, result.h_values[0]);
        // Both operators still need their capped share of 3, and neither
        // exceeds its input cost.
        assert_eq!(3, result.socf[0]);
        assert_eq!(3, result.socf[1]);
    }

    #[test]
    fn from_state_reachability_releases_unreachable_states() {
        let task = two_switches();
        let projection = projection(&task, vec![0, 1]);
        let ocf = vec![3, 4];
        let h_values = projection.compute_goal_distances_ocf(&ocf);
        // From abstract state 3 (the goal) nothing else is reachable.
        let saturator =
            CapSaturator { reachable: Reachable::FromState, ..CapSaturator::default() };
        let result = saturator.saturate_ocf(&projection, &ocf, h_values, 3);
        assert_eq!(0, result.h_values[3]);
        assert_eq!(-INFINITY, result.h_values[0]);
        assert_eq!(-INFINITY, result.h_values[1]);
        assert_eq!(-INFINITY, result.h_values[2]);
        // With every other state released, no operator needs any cost.
        assert_eq!(vec![-INFINITY, -INFINITY], result.socf);
    }

    #[test]
    fn infinite_input_costs_stay_infinite() {
        let task = two_switches();
        let projection = projection(&task, vec![0]);
        let ocf = vec![INFINITY, 4];
        let h_values = projection.compute_goal_distances_ocf(&ocf);
        let saturator = CapSaturator::default();
        let result = saturator.saturate_ocf(&projection, &ocf, h_values, 1);
        assert_eq!(INFINITY, result.socf[0]);
    }

    #[test]
    #[should_panic(expected = "precondition violated")]
    fn nonnegative_mode_rejects_negative_inputs() {
        let task = two_switches();
        let projection = projection(&task, vec![0]);
        let ocf = vec![-1, 4];
        let h_values = vec![0, 0];
        let saturator =
            CapSaturator { use_general_costs: false, ..CapSaturator::default() };
        saturator.saturate_ocf(&projection, &ocf, h_values, 0);
    }
}
