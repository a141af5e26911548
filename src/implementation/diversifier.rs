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

//! This module provides the diversification filter: a cost partitioning is
//! admitted into the collection only if it beats the running portfolio on at
//! least one held-out sample state.

use crate::common::Cost;
use crate::implementation::CostPartitioningHeuristic;

/// Holds a fixed set of samples (as abstract-state-id tuples) and the best
/// estimate any admitted cost partitioning achieved per sample.
pub struct Diversifier {
    abstract_state_ids_by_sample: Vec<Vec<usize>>,
    portfolio_h_values: Vec<Cost>,
}

impl Diversifier {
    pub fn new(abstract_state_ids_by_sample: Vec<Vec<usize>>) -> Self {
        // Starting below zero guarantees the first candidate is admitted.
        let portfolio_h_values = vec![-1; abstract_state_ids_by_sample.len()];
        Diversifier { abstract_state_ids_by_sample, portfolio_h_values }
    }

    /// True iff the candidate raises the portfolio estimate on some sample;
    /// admitted candidates update the per-sample maxima.
    pub fn is_diverse(&mut self, cp_heuristic: &CostPartitioningHeuristic) -> bool {
        let mut improves_portfolio = false;
        for (sample_id, abstract_state_ids) in
            self.abstract_state_ids_by_sample.iter().enumerate()
        {
            let cp_h = cp_heuristic.compute_heuristic(abstract_state_ids);
            let portfolio_h = &mut self.portfolio_h_values[sample_id];
            if cp_h > *portfolio_h {
                improves_portfolio = true;
                *portfolio_h = cp_h;
            }
        }
        improves_portfolio
    }

    /// The sum of the per-sample portfolio maxima (for progress logging).
    pub fn sum_portfolio_h_values(&self) -> Cost {
        self.portfolio_h_values.iter().fold(0, |acc, &h| acc.saturating_add(h))
    }

    pub fn num_samples(&self) -> usize {
        self.abstract_state_ids_by_sample.len()
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_diversifier {
    use super::*;

    fn cp(h_values: Vec<Cost>) -> CostPartitioningHeuristic {
        let mut cp = CostPartitioningHeuristic::default();
        cp.add_h_values(0, h_values);
        cp
    }

    #[test]
    fn the_first_candidate_is_always_admitted() {
        let mut diversifier = Diversifier::new(vec![vec![0], vec![1], vec![2]]);
        assert!(diversifier.is_diverse(&cp(vec![0, 0, 0])));
    }

    #[test]
    fn dominated_candidates_are_rejected() {
        let mut diversifier = Diversifier::new(vec![vec![0], vec![1], vec![2]]);
        assert!(diversifier.is_diverse(&cp(vec![2, 2, 2])));
        let before = diversifier.sum_portfolio_h_values();
        // [2, 2, 1] improves nowhere.
        assert!(!diversifier.is_diverse(&cp(vec![2, 2, 1])));
        assert_eq!(before, diversifier.sum_portfolio_h_values());
    }

    #[test]
    fn one_improved_sample_is_enough() {
        let mut diversifier = Diversifier::new(vec![vec![0], vec![1], vec![2]]);
        assert!(diversifier.is_diverse(&cp(vec![2, 2, 2])));
        assert!(diversifier.is_diverse(&cp(vec![0, 0, 3])));
        assert_eq!(2 + 2 + 3, diversifier.sum_portfolio_h_values());
    }

    #[test]
    fn portfolio_sums_are_monotone() {
        let mut diversifier = Diversifier::new(vec![vec![0], vec![1]]);
        let candidates = vec![cp(vec![1, 0]), cp(vec![0, 5]), cp(vec![2, 2]), cp(vec![1, 1])];
        let mut last_sum = diversifier.sum_portfolio_h_values();
        for candidate in candidates {
            diversifier.is_diverse(&candidate);
            let sum = diversifier.sum_portfolio_h_values();
            assert!(sum >= last_sum);
            last_sum = sum;
        }
    }
}
