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

//! This module defines the most basic data types that are used throughout all
//! the code of our library (both at the abstraction and implementation
//! levels): cost values with their two infinities and the arithmetic that is
//! legal on them, facts, states and abstract transitions.

use crate::errors::{fatal, Error};

// ----------------------------------------------------------------------------
// --- COST VALUES ------------------------------------------------------------
// ----------------------------------------------------------------------------

/// The type used for every cost and heuristic value of the crate. Two
/// sentinels of the signed range are reserved for the infinities; all other
/// values are plain finite integers.
pub type Cost = i32;

/// Positive infinity. Negative infinity is written `-INFINITY`, which leaves
/// `i32::MIN` unused.
pub const INFINITY: Cost = Cost::MAX;

/// Every operator cost fed into a cost-partitioning pipeline is multiplied by
/// this factor, so that the integral rounding of LP results loses less than
/// one thousandth of a cost unit. The heuristic facade divides the final
/// estimate by the same factor.
pub const COST_FACTOR: Cost = 1000;

/// Sentinel abstract-state id for abstractions that are never consulted by
/// any stored cost partitioning.
pub const NO_ABSTRACT_STATE: usize = usize::MAX;

/// Returns true iff `a + b` stays within the finite signed range.
pub fn is_sum_within_range(a: Cost, b: Cost) -> bool {
    (b >= 0 && a <= Cost::MAX - b) || (b < 0 && a >= Cost::MIN - b)
}

/// The sum of mixed infinities evaluates to the left operand. Overflow on
/// finite intermediates is fatal.
pub fn left_addition(a: Cost, b: Cost) -> Cost {
    if a == -INFINITY || a == INFINITY {
        a
    } else if b == -INFINITY || b == INFINITY {
        b
    } else {
        if !is_sum_within_range(a, b) {
            fatal(Error::Overflow(format!("left_addition: {} + {}", a, b)));
        }
        a + b
    }
}

/// Subtraction used for updating remaining costs: an infinite left operand
/// absorbs, an infinite right operand yields `INFINITY`.
pub fn left_subtraction(a: Cost, b: Cost) -> Cost {
    if a == INFINITY || a == -INFINITY {
        a
    } else if b == INFINITY || b == -INFINITY {
        INFINITY
    } else {
        if !is_sum_within_range(a, -b) {
            fatal(Error::Overflow(format!("left_subtraction: {} - {}", a, b)));
        }
        a - b
    }
}

/// The addition used when concatenating path costs: `INFINITY` dominates,
/// then `-INFINITY`, then plain finite addition.
pub fn path_addition(a: Cost, b: Cost) -> Cost {
    if a == INFINITY || b == INFINITY {
        INFINITY
    } else if a == -INFINITY || b == -INFINITY {
        -INFINITY
    } else {
        if !is_sum_within_range(a, b) {
            fatal(Error::Overflow(format!("path_addition: {} + {}", a, b)));
        }
        a + b
    }
}

/// Subtracts a saturated cost function from the remaining costs, in place.
/// Saturated values must be dominated by the remaining values; a violation is
/// an invariant error. The remaining costs stay nonnegative.
pub fn reduce_costs(remaining_costs: &mut [Cost], saturated_costs: &[Cost]) {
    assert_eq!(remaining_costs.len(), saturated_costs.len());
    for (op_id, remaining) in remaining_costs.iter_mut().enumerate() {
        let saturated = saturated_costs[op_id];
        if saturated > *remaining {
            fatal(Error::InvariantViolation(format!(
                "op {}: saturated cost {} exceeds remaining cost {}",
                op_id, saturated, remaining
            )));
        }
        if *remaining == INFINITY || *remaining == -INFINITY {
            // Left subtraction: an infinite remaining value absorbs.
        } else if saturated == -INFINITY {
            *remaining = INFINITY;
        } else {
            *remaining -= saturated;
        }
        debug_assert!(*remaining >= 0);
    }
}

/// Maps a cost function to the cost function used for reachability analyses:
/// finite costs become 1, infinite costs become `INFINITY`.
pub fn compute_reachability_cost_function(costs: &[Cost]) -> Vec<Cost> {
    costs
        .iter()
        .map(|&c| if c == -INFINITY || c == INFINITY { INFINITY } else { 1 })
        .collect()
}

// ----------------------------------------------------------------------------
// --- FACTS AND STATES -------------------------------------------------------
// ----------------------------------------------------------------------------

/// A fact is the assignment of one value to one planning variable.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Fact {
    pub var: usize,
    pub value: usize,
}

impl Fact {
    pub fn new(var: usize, value: usize) -> Self {
        Fact { var, value }
    }
}

/// A concrete state: a total assignment from variables to domain values.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct State {
    values: Vec<usize>,
}

impl State {
    pub fn new(values: Vec<usize>) -> Self {
        State { values }
    }

    /// The value assigned to the given variable.
    #[inline]
    pub fn value(&self, var: usize) -> usize {
        self.values[var]
    }

    /// The number of variables of the underlying task.
    pub fn num_variables(&self) -> usize {
        self.values.len()
    }

    /// Overwrites the value of one variable (used when applying effects).
    pub fn assign(&mut self, fact: Fact) {
        self.values[fact.var] = fact.value;
    }
}

// ----------------------------------------------------------------------------
// --- ABSTRACT TRANSITIONS ---------------------------------------------------
// ----------------------------------------------------------------------------

/// A labelled state-changing abstract transition with a dense unique
/// identifier. Identifiers start at 0 so that they can be used to index the
/// transition cost vectors.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Transition {
    pub transition_id: usize,
    pub op_id: usize,
    pub source_id: usize,
    pub target_id: usize,
}

impl Transition {
    pub fn new(transition_id: usize, op_id: usize, source_id: usize, target_id: usize) -> Self {
        Transition { transition_id, op_id, source_id, target_id }
    }
}

/// A directed arc of the forward or backward adjacency graph. Only the
/// endpoint and the label are stored; the anchor state is implied by the
/// adjacency list the successor lives in.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Successor {
    pub transition_id: usize,
    pub op_id: usize,
    pub target_id: usize,
}

impl Successor {
    pub fn new(transition_id: usize, op_id: usize, target_id: usize) -> Self {
        Successor { transition_id, op_id, target_id }
    }
}

/// A processing sequence for saturation: a permutation of abstraction ids.
pub type Order = Vec<usize>;

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_infinity_arithmetic {
    use super::*;

    #[test]
    fn left_addition_lets_the_left_infinity_win() {
        assert_eq!(INFINITY, left_addition(INFINITY, 5));
        assert_eq!(INFINITY, left_addition(INFINITY, -INFINITY));
        assert_eq!(-INFINITY, left_addition(-INFINITY, INFINITY));
        assert_eq!(INFINITY, left_addition(3, INFINITY));
        assert_eq!(-INFINITY, left_addition(3, -INFINITY));
        assert_eq!(8, left_addition(3, 5));
    }

    #[test]
    fn path_addition_is_dominated_by_positive_infinity() {
        assert_eq!(INFINITY, path_addition(INFINITY, -INFINITY));
        assert_eq!(INFINITY, path_addition(-INFINITY, INFINITY));
        assert_eq!(INFINITY, path_addition(4, INFINITY));
        assert_eq!(-INFINITY, path_addition(4, -INFINITY));
        assert_eq!(-INFINITY, path_addition(-INFINITY, -INFINITY));
        assert_eq!(9, path_addition(4, 5));
    }

    #[test]
    fn left_subtraction_keeps_infinite_remainders() {
        assert_eq!(INFINITY, left_subtraction(INFINITY, 3));
        assert_eq!(-INFINITY, left_subtraction(-INFINITY, 3));
        assert_eq!(INFINITY, left_subtraction(3, INFINITY));
        assert_eq!(INFINITY, left_subtraction(3, -INFINITY));
        assert_eq!(-2, left_subtraction(3, 5));
    }

    #[test]
    #[should_panic(expected = "overflow")]
    fn finite_overflow_is_fatal() {
        left_addition(INFINITY - 1, 2);
    }

    #[test]
    fn reachability_costs_map_finite_to_one() {
        let costs = vec![0, 7, INFINITY, -INFINITY, -3];
        assert_eq!(
            vec![1, 1, INFINITY, INFINITY, 1],
            compute_reachability_cost_function(&costs)
        );
    }
}

#[cfg(test)]
mod test_reduce_costs {
    use super::*;

    #[test]
    fn plain_subtraction() {
        let mut remaining = vec![10, 5, 3];
        reduce_costs(&mut remaining, &[4, 0, 3]);
        assert_eq!(vec![6, 5, 0], remaining);
    }

    #[test]
    fn infinite_remainders_absorb() {
        let mut remaining = vec![INFINITY, 5];
        reduce_costs(&mut remaining, &[3, -INFINITY]);
        assert_eq!(vec![INFINITY, INFINITY], remaining);
    }

    #[test]
    #[should_panic(expected = "invariant violation")]
    fn saturating_more_than_remaining_is_fatal() {
        let mut remaining = vec![2];
        reduce_costs(&mut remaining, &[3]);
    }
}

#[cfg(test)]
mod test_states {
    use super::*;

    #[test]
    fn assignment_overwrites_one_variable() {
        let mut state = State::new(vec![0, 1, 2]);
        state.assign(Fact::new(1, 0));
        assert_eq!(State::new(vec![0, 0, 2]), state);
        assert_eq!(0, state.value(1));
        assert_eq!(3, state.num_variables());
    }
}
