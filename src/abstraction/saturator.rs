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

//! This module defines the [`Saturator`] trait. A saturator takes an
//! abstraction, the current cost function and the current goal distances and
//! returns a cost function that is pointwise dominated by the input but
//! preserves the heuristic value of one distinguished state. Saturators are
//! chained: the output of one is the input of the next for the same
//! abstraction.

use crate::abstraction::Abstraction;
use crate::common::{Cost, INFINITY};
use crate::implementation::{StateDependentCostFunction, TransitionCostFunction};

/// Which part of the abstract state space a saturator considers relevant
/// when it tightens heuristic values.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Reachable {
    /// Keep every state.
    All,
    /// Only states reachable from the abstract initial state.
    FromInit,
    /// Only states reachable from the state being saturated for.
    FromState,
}

/// The result of saturating with an operator cost function.
pub struct SaturatorResultOcf {
    pub socf: Vec<Cost>,
    pub h_values: Vec<Cost>,
    /// True iff the pipeline should subtract `-INFINITY` contributions from
    /// the bucketed cost function afterwards.
    pub saturate_negative_infinity: bool,
}

/// The result of saturating with a transition cost function.
pub struct SaturatorResultTcf {
    pub tcf: TransitionCostFunction,
    pub h_values: Vec<Cost>,
    pub saturate_negative_infinity: bool,
}

/// A pluggable cost saturation strategy, in both the operator and the
/// transition flavor.
///
/// Contract: `h_values[state_id]` is preserved, and the returned cost
/// function lower-bounds the input on every argument that can influence the
/// heuristic value of `state_id`. For everything else, `-INFINITY` is a
/// legal assignment when the saturator uses general costs.
pub trait Saturator {
    /// Saturates an operator cost function. `h_values` are the goal
    /// distances of the abstraction under `ocf`.
    fn saturate_ocf(
        &self,
        abstraction: &dyn Abstraction,
        ocf: &[Cost],
        h_values: Vec<Cost>,
        state_id: usize,
    ) -> SaturatorResultOcf;

    /// Saturates a transition cost function against the bucketed
    /// state-dependent cost function. An empty `h_values` marks the first
    /// saturator of a chain, which is responsible for deriving the
    /// transition costs and distances from `sdcf`.
    fn saturate_tcf(
        &self,
        abstraction: &dyn Abstraction,
        tcf: TransitionCostFunction,
        sdcf: &StateDependentCostFunction,
        h_values: Vec<Cost>,
        state_id: usize,
    ) -> SaturatorResultTcf;

    /// The reachability refinement this saturator applies.
    fn reachable(&self) -> Reachable;
}

/// Shared postprocessing of operator-form saturator results: operators that
/// were unreachable (cost `INFINITY`) stay unreachable, and the goal
/// distances may be recomputed under the saturated costs while `-INFINITY`
/// estimates stay sticky for saturators that refine reachability.
pub fn finalize_saturator_result_ocf(
    abstraction: &dyn Abstraction,
    ocf: &[Cost],
    mut socf: Vec<Cost>,
    h_values: Vec<Cost>,
    recompute_h_values: bool,
    reachable: Reachable,
    saturate_negative_infinity: bool,
) -> SaturatorResultOcf {
    assert_eq!(ocf.len(), socf.len());
    for (op_id, saturated) in socf.iter_mut().enumerate() {
        if ocf[op_id] == INFINITY {
            *saturated = INFINITY;
        }
    }
    /* Recomputing goal distances can pay off because of slack in transitions
    outside the subset of states the saturator considered. */
    if recompute_h_values {
        let mut new_h_values = abstraction.compute_goal_distances_ocf(&socf);
        /* Heuristic estimates of negative infinity must survive so that a
        later saturator in the composition can still prune them. */
        if reachable != Reachable::All {
            for (state_id, h) in h_values.iter().enumerate() {
                if *h == -INFINITY {
                    new_h_values[state_id] = -INFINITY;
                }
            }
        }
        return SaturatorResultOcf {
            socf,
            h_values: new_h_values,
            saturate_negative_infinity,
        };
    }
    SaturatorResultOcf { socf, h_values, saturate_negative_infinity }
}
