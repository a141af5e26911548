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

//! This module provides the compact encoding of a cost function over the
//! transitions of one abstraction: a dense per-transition cost vector plus a
//! per-operator "state-independent" summary. The summary records, for
//! operators whose transitions all carry one value, that single value, which
//! lets the bucketed cost function subtract it with one scalar operation
//! instead of a decision-diagram pass.

use crate::abstraction::Abstraction;
use crate::common::{Cost, INFINITY};

/// A cost function over the state-changing transitions of one abstraction.
///
/// `sd_costs[t]` is the cost of transition `t`; `si[op]` is true while the
/// per-transition assignment never deviates from a single per-operator
/// value, which is then held in `si_costs[op]`.
#[derive(Debug, Default)]
pub struct TransitionCostFunction {
    sd_costs: Vec<Cost>,
    si: Vec<bool>,
    si_costs: Vec<Cost>,
}

impl TransitionCostFunction {
    /// An empty cost function; the first saturator of a chain sizes it.
    pub fn uninitialized() -> Self {
        TransitionCostFunction::default()
    }

    /// A zeroed cost function sized for the given abstraction.
    pub fn new(abstraction: &dyn Abstraction) -> Self {
        TransitionCostFunction {
            sd_costs: vec![0; abstraction.num_transitions()],
            si: vec![false; abstraction.num_operators()],
            si_costs: vec![0; abstraction.num_operators()],
        }
    }

    /// True until the cost function has been sized for an abstraction.
    pub fn is_uninitialized(&self) -> bool {
        // Abstractions can lack transitions, but never operators.
        self.si.is_empty()
    }

    /// True iff every cost value is nonnegative.
    pub fn is_nonnegative(&self) -> bool {
        self.sd_costs.iter().all(|&c| c >= 0) && self.si_costs.iter().all(|&c| c >= 0)
    }

    #[inline]
    pub fn sd_cost(&self, transition_id: usize) -> Cost {
        self.sd_costs[transition_id]
    }

    pub fn sd_costs(&self) -> &[Cost] {
        &self.sd_costs
    }

    pub fn sd_costs_mut(&mut self) -> &mut [Cost] {
        &mut self.sd_costs
    }

    pub fn si(&self) -> &[bool] {
        &self.si
    }

    pub fn si_costs(&self) -> &[Cost] {
        &self.si_costs
    }

    /// Mutable access to all three members at once; cost saturation
    /// processes transitions into all of them in a single sweep.
    pub fn parts_mut(&mut self) -> (&mut [Cost], &mut [bool], &mut [Cost]) {
        (&mut self.sd_costs, &mut self.si, &mut self.si_costs)
    }

    /// Resets the vectors to the fixpoint-ready saturation state: every
    /// transition at `-INFINITY` and every operator tentatively marked
    /// state-independent.
    pub fn fill_for_saturation(&mut self) {
        self.sd_costs.fill(-INFINITY);
        self.si.fill(true);
        self.si_costs.fill(-INFINITY);
    }

    /// Zero-fills the per-transition costs (used by the discovering
    /// Dijkstra, which overwrites the entries it touches).
    pub fn fill_zero(&mut self) {
        self.sd_costs.fill(0);
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_transition_cost_function {
    use super::*;

    #[test]
    fn default_is_uninitialized() {
        assert!(TransitionCostFunction::uninitialized().is_uninitialized());
    }

    #[test]
    fn nonnegativity_checks_both_vectors() {
        let mut tcf = TransitionCostFunction::default();
        tcf.sd_costs = vec![0, 3];
        tcf.si = vec![true];
        tcf.si_costs = vec![2];
        assert!(tcf.is_nonnegative());
        tcf.si_costs[0] = -1;
        assert!(!tcf.is_nonnegative());
        tcf.si_costs[0] = 2;
        tcf.sd_costs[1] = -INFINITY;
        assert!(!tcf.is_nonnegative());
    }

    #[test]
    fn fill_for_saturation_marks_everything_state_independent() {
        let mut tcf = TransitionCostFunction::default();
        tcf.sd_costs = vec![1, 2, 3];
        tcf.si = vec![false, false];
        tcf.si_costs = vec![7, 7];
        tcf.fill_for_saturation();
        assert_eq!(vec![-INFINITY; 3], tcf.sd_costs);
        assert_eq!(vec![true; 2], tcf.si);
        assert_eq!(vec![-INFINITY; 2], tcf.si_costs);
    }
}
