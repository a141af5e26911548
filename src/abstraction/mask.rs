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

//! This module provides the mask policies that decide which parts of the
//! pipeline run with state-dependent (transition) costs and which fall back
//! to plain operator costs. Masks are plain policy values, not deep
//! strategy hierarchies.

use crate::abstraction::Abstraction;

/// Decides per abstraction whether it is saturated with transition cost
/// functions against the bucketed cost function, or with a plain operator
/// cost function.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AbstractionMask {
    /// Every abstraction uses operator costs.
    AlwaysStateIndependent,
    /// Every abstraction uses transition costs.
    AlwaysStateDependent,
    /// Transition costs only for abstractions below a transition budget.
    SizeBased { max_num_transitions: usize },
}

impl AbstractionMask {
    /// True iff the abstraction should be handled state-dependently.
    pub fn is_state_dependent(&self, abstraction: &dyn Abstraction) -> bool {
        match *self {
            AbstractionMask::AlwaysStateIndependent => false,
            AbstractionMask::AlwaysStateDependent => true,
            AbstractionMask::SizeBased { max_num_transitions } => {
                abstraction.num_transitions() < max_num_transitions
            }
        }
    }
}

/// Per-operator state-dependence policy.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperatorMaskPolicy {
    All,
    None,
    /// Operators with few transitions, in at most `max_num_abstractions`
    /// abstractions overall.
    SizeBased {
        max_num_transitions: usize,
        max_num_abstractions: usize,
    },
}

/// Stateful generator for per-operator masks: the size-based policy limits
/// in how many abstractions an operator may be treated state-dependently,
/// so the generator counts prior selections.
pub struct OperatorMaskGenerator {
    policy: OperatorMaskPolicy,
    selected_count: Vec<usize>,
}

impl OperatorMaskGenerator {
    pub fn new(policy: OperatorMaskPolicy) -> Self {
        OperatorMaskGenerator { policy, selected_count: vec![] }
    }

    /// Returns, for the given abstraction, the operators to handle
    /// state-dependently.
    pub fn generate_mask(&mut self, abstraction: &dyn Abstraction) -> Vec<bool> {
        let num_operators = abstraction.num_operators();
        if self.selected_count.is_empty() {
            self.selected_count = vec![0; num_operators];
        }
        match self.policy {
            OperatorMaskPolicy::All => vec![true; num_operators],
            OperatorMaskPolicy::None => vec![false; num_operators],
            OperatorMaskPolicy::SizeBased { max_num_transitions, max_num_abstractions } => {
                let mut mask = vec![false; num_operators];
                for (op_id, selected) in mask.iter_mut().enumerate() {
                    if abstraction.num_transitions_of(op_id) <= max_num_transitions
                        && self.selected_count[op_id] < max_num_abstractions
                    {
                        *selected = true;
                        self.selected_count[op_id] += 1;
                    }
                }
                mask
            }
        }
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_masks {
    use super::*;
    use crate::implementation::projection::test_projection::projection;
    use crate::implementation::task::test_tasks::two_switches;

    #[test]
    fn abstraction_masks_follow_their_policy() {
        let task = two_switches();
        // Four transitions in the full projection.
        let abstraction = projection(&task, vec![0, 1]);
        assert!(!AbstractionMask::AlwaysStateIndependent.is_state_dependent(&abstraction));
        assert!(AbstractionMask::AlwaysStateDependent.is_state_dependent(&abstraction));
        assert!(AbstractionMask::SizeBased { max_num_transitions: 5 }
            .is_state_dependent(&abstraction));
        assert!(!AbstractionMask::SizeBased { max_num_transitions: 4 }
            .is_state_dependent(&abstraction));
    }

    #[test]
    fn size_based_operator_masks_count_abstractions() {
        let task = two_switches();
        let abstraction = projection(&task, vec![0, 1]);
        let mut generator = OperatorMaskGenerator::new(OperatorMaskPolicy::SizeBased {
            max_num_transitions: 8,
            max_num_abstractions: 1,
        });
        // Both operators qualify once, then the budget is exhausted.
        assert_eq!(vec![true, true], generator.generate_mask(&abstraction));
        assert_eq!(vec![false, false], generator.generate_mask(&abstraction));
        let mut all = OperatorMaskGenerator::new(OperatorMaskPolicy::All);
        assert_eq!(vec![true, true], all.generate_mask(&abstraction));
        let mut none = OperatorMaskGenerator::new(OperatorMaskPolicy::None);
        assert_eq!(vec![false, false], none.generate_mask(&abstraction));
    }
}
