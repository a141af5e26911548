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

//! This module provides the order generators: identity, uniformly random
//! (Fisher-Yates with an injected rng), and greedy scoring by the sampled
//! state's estimate against the costs an abstraction steals from the others.
//! The hill-climbing order optimizer the configuration surface mentions is
//! accepted but disabled in this build.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::abstraction::{default_order, Abstraction, OrderGenerator};
use crate::common::{left_addition, left_subtraction, Cost, Order, INFINITY};

// ----------------------------------------------------------------------------
// --- DEFAULT AND RANDOM -----------------------------------------------------
// ----------------------------------------------------------------------------

/// Always returns the identity permutation.
#[derive(Debug, Default, Copy, Clone)]
pub struct DefaultOrderGenerator;

impl OrderGenerator for DefaultOrderGenerator {
    fn initialize(&mut self, _abstractions: &[Box<dyn Abstraction>], _costs: &[Cost]) {}

    fn order_for_state(
        &mut self,
        abstractions: &[Box<dyn Abstraction>],
        _costs: &[Cost],
        _abstract_state_ids: &[usize],
        _verbose: bool,
    ) -> Order {
        default_order(abstractions.len())
    }
}

/// Shuffles the identity permutation with the injected rng.
pub struct RandomOrderGenerator {
    rng: StdRng,
    random_order: Order,
}

impl RandomOrderGenerator {
    pub fn new(rng: StdRng) -> Self {
        RandomOrderGenerator { rng, random_order: vec![] }
    }
}

impl OrderGenerator for RandomOrderGenerator {
    fn initialize(&mut self, abstractions: &[Box<dyn Abstraction>], _costs: &[Cost]) {
        self.random_order = default_order(abstractions.len());
    }

    fn order_for_state(
        &mut self,
        abstractions: &[Box<dyn Abstraction>],
        _costs: &[Cost],
        _abstract_state_ids: &[usize],
        _verbose: bool,
    ) -> Order {
        if self.random_order.len() != abstractions.len() {
            self.random_order = default_order(abstractions.len());
        }
        self.random_order.shuffle(&mut self.rng);
        self.random_order.clone()
    }
}

// ----------------------------------------------------------------------------
// --- GREEDY -----------------------------------------------------------------
// ----------------------------------------------------------------------------

/// How the greedy generator ranks abstractions for a sample.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScoringFunction {
    /// Highest estimate first.
    MaxHeuristic,
    /// Least costs stolen from other abstractions first.
    MinStolenCosts,
    /// Estimate per stolen cost unit.
    MaxHeuristicPerStolenCosts,
}

fn compute_score(h: Cost, stolen_costs: Cost, scoring_function: ScoringFunction) -> f64 {
    match scoring_function {
        ScoringFunction::MaxHeuristic => f64::from(h),
        ScoringFunction::MinStolenCosts => -f64::from(stolen_costs),
        ScoringFunction::MaxHeuristicPerStolenCosts => {
            f64::from(h) / 1.0_f64.max(f64::from(stolen_costs))
        }
    }
}

/// The slack of each operator: its cost minus what all abstractions together
/// would like to consume.
fn compute_all_surplus_costs(
    costs: &[Cost],
    saturated_costs_by_abstraction: &[Vec<Cost>],
) -> Vec<Cost> {
    let mut surplus_costs = Vec::with_capacity(costs.len());
    for (op_id, &cost) in costs.iter().enumerate() {
        let mut wanted: Cost = 0;
        for saturated_costs in saturated_costs_by_abstraction {
            let saturated = saturated_costs[op_id];
            if saturated != -INFINITY {
                wanted = left_addition(wanted, saturated.max(0));
            }
        }
        surplus_costs.push(left_subtraction(cost, wanted));
    }
    surplus_costs
}

/// How much of the contested costs this abstraction claims: for every
/// operator, the shortage `-surplus` capped by the abstraction's own
/// positive demand.
fn compute_costs_stolen_by_heuristic(saturated_costs: &[Cost], surplus_costs: &[Cost]) -> Cost {
    let mut stolen: Cost = 0;
    for (op_id, &saturated) in saturated_costs.iter().enumerate() {
        let wanted = if saturated == -INFINITY { 0 } else { saturated.max(0) };
        if wanted == 0 {
            continue;
        }
        let contested = match surplus_costs[op_id] {
            surplus if surplus == INFINITY => 0,
            surplus if surplus == -INFINITY => wanted,
            surplus => (-surplus).clamp(0, wanted),
        };
        stolen = left_addition(stolen, contested);
    }
    stolen
}

/// Ranks abstractions by a static greedy score: precomputed full-cost
/// estimates and stolen costs, combined per sample.
pub struct GreedyOrderGenerator {
    scoring_function: ScoringFunction,
    h_values_by_abstraction: Vec<Vec<Cost>>,
    stolen_costs_by_abstraction: Vec<Cost>,
}

impl GreedyOrderGenerator {
    pub fn new(scoring_function: ScoringFunction) -> Self {
        GreedyOrderGenerator {
            scoring_function,
            h_values_by_abstraction: vec![],
            stolen_costs_by_abstraction: vec![],
        }
    }

    fn rate_abstraction(&self, abstract_state_ids: &[usize], abstraction_id: usize) -> f64 {
        let state_id = abstract_state_ids[abstraction_id];
        let h = self.h_values_by_abstraction[abstraction_id][state_id];
        let stolen_costs = self.stolen_costs_by_abstraction[abstraction_id];
        compute_score(h, stolen_costs, self.scoring_function)
    }
}

impl OrderGenerator for GreedyOrderGenerator {
    fn initialize(&mut self, abstractions: &[Box<dyn Abstraction>], costs: &[Cost]) {
        self.h_values_by_abstraction.clear();
        self.stolen_costs_by_abstraction.clear();
        let mut saturated_costs_by_abstraction = Vec::with_capacity(abstractions.len());
        for abstraction in abstractions {
            let h_values = abstraction.compute_goal_distances_ocf(costs);
            let saturated_costs = abstraction.compute_saturated_costs_ocf(&h_values);
            self.h_values_by_abstraction.push(h_values);
            saturated_costs_by_abstraction.push(saturated_costs);
        }
        let surplus_costs = compute_all_surplus_costs(costs, &saturated_costs_by_abstraction);
        for saturated_costs in &saturated_costs_by_abstraction {
            self.stolen_costs_by_abstraction
                .push(compute_costs_stolen_by_heuristic(saturated_costs, &surplus_costs));
        }
        log::debug!("greedy order generator initialized over {} abstractions", abstractions.len());
    }

    fn order_for_state(
        &mut self,
        abstractions: &[Box<dyn Abstraction>],
        _costs: &[Cost],
        abstract_state_ids: &[usize],
        verbose: bool,
    ) -> Order {
        debug_assert_eq!(abstractions.len(), self.h_values_by_abstraction.len());
        let num_abstractions = abstract_state_ids.len();
        let scores: Vec<f64> = (0..num_abstractions)
            .map(|abstraction_id| self.rate_abstraction(abstract_state_ids, abstraction_id))
            .collect();
        let mut order = default_order(num_abstractions);
        order.sort_by(|&a, &b| {
            scores[b].partial_cmp(&scores[a]).unwrap_or(std::cmp::Ordering::Equal)
        });
        if verbose {
            log::debug!("greedy scores: {:?}, order: {:?}", scores, order);
        }
        order
    }
}

// ----------------------------------------------------------------------------
// --- ORDER OPTIMIZATION -----------------------------------------------------
// ----------------------------------------------------------------------------

/// Hook for hill-climbing over adjacent swaps of an incumbent order. The
/// knob is part of the configuration surface, but this build leaves the
/// incumbent untouched.
pub fn optimize_order(_incumbent_order: &mut Order, max_optimization_time: std::time::Duration) {
    if !max_optimization_time.is_zero() {
        log::debug!("order optimization requested but not enabled in this build");
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_orders {
    use super::*;
    use crate::implementation::projection::test_projection::projection;
    use crate::implementation::task::test_tasks::two_switches;
    use rand::SeedableRng;

    fn boxed_projections() -> (Vec<Box<dyn Abstraction>>, Vec<Cost>) {
        let task = two_switches();
        let abstractions: Vec<Box<dyn Abstraction>> = vec![
            Box::new(projection(&task, vec![0])),
            Box::new(projection(&task, vec![1])),
        ];
        (abstractions, vec![3, 4])
    }

    #[test]
    fn the_default_order_is_the_identity() {
        let (abstractions, costs) = boxed_projections();
        let mut generator = DefaultOrderGenerator;
        generator.initialize(&abstractions, &costs);
        assert_eq!(vec![0, 1], generator.order_for_state(&abstractions, &costs, &[0, 0], false));
    }

    #[test]
    fn random_orders_are_permutations() {
        let (abstractions, costs) = boxed_projections();
        let mut generator = RandomOrderGenerator::new(StdRng::seed_from_u64(0));
        generator.initialize(&abstractions, &costs);
        for _ in 0..10 {
            let mut order = generator.order_for_state(&abstractions, &costs, &[0, 0], false);
            order.sort_unstable();
            assert_eq!(vec![0, 1], order);
        }
    }

    #[test]
    fn greedy_prefers_the_higher_estimate() {
        let (abstractions, costs) = boxed_projections();
        let mut generator = GreedyOrderGenerator::new(ScoringFunction::MaxHeuristic);
        generator.initialize(&abstractions, &costs);
        // In the initial state both projections still need their operator:
        // h = 3 for the first and 4 for the second.
        let order = generator.order_for_state(&abstractions, &costs, &[0, 0], false);
        assert_eq!(vec![1, 0], order);
        // In a state where only variable 0 is unset, the first wins.
        let order = generator.order_for_state(&abstractions, &costs, &[0, 1], false);
        assert_eq!(vec![0, 1], order);
    }

    #[test]
    fn surplus_and_stolen_costs() {
        // Two abstractions both wanting both operators (costs [10, 1]).
        let saturated = vec![vec![6, 1], vec![6, 1]];
        let surplus = compute_all_surplus_costs(&[10, 1], &saturated);
        assert_eq!(vec![-2, -1], surplus);
        // Each claims the shortage of 2 on op 0 and of 1 on op 1.
        assert_eq!(3, compute_costs_stolen_by_heuristic(&saturated[0], &surplus));
        assert_eq!(3, compute_costs_stolen_by_heuristic(&saturated[1], &surplus));
        // Released operators steal nothing.
        assert_eq!(0, compute_costs_stolen_by_heuristic(&[-INFINITY, 0], &surplus));
    }

    #[test]
    fn disabled_order_optimization_keeps_the_incumbent() {
        let mut order = vec![2, 0, 1];
        optimize_order(&mut order, std::time::Duration::from_secs(1));
        assert_eq!(vec![2, 0, 1], order);
    }
}
