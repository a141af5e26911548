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

//! This module provides the search-facing facade: it keeps only the
//! abstraction mappings of the abstractions some stored cost partitioning
//! actually consults, evaluates a state as the maximum over the stored
//! partitionings, and undoes the cost scaling of the pipeline.

use crate::abstraction::{Abstraction, AbstractionFunction};
use crate::common::{Cost, State, COST_FACTOR, INFINITY, NO_ABSTRACT_STATE};
use crate::implementation::CostPartitioningHeuristic;

/// The answer of a heuristic query.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Estimate {
    /// An admissible lower bound on the remaining plan cost.
    Value(Cost),
    /// No plan exists from the queried state.
    DeadEnd,
}

/// Tolerance when undoing the cost scaling: LP rounding may leave the
/// scaled value a hair above a multiple of the factor.
const EPSILON: f64 = 0.01;

fn descale(h: Cost) -> Cost {
    debug_assert!(h >= 0);
    (f64::from(h) / f64::from(COST_FACTOR) - EPSILON).ceil() as Cost
}

/// The maximum estimate over the stored partitionings, with bookkeeping of
/// which order produced it.
fn compute_max_h_with_statistics(
    cp_heuristics: &[CostPartitioningHeuristic],
    abstract_state_ids: &[usize],
    num_best_order: &mut [usize],
) -> Cost {
    let mut max_h = 0;
    let mut best_id = None;
    for (current_id, cp_heuristic) in cp_heuristics.iter().enumerate() {
        let sum_h = cp_heuristic.compute_heuristic(abstract_state_ids);
        if sum_h > max_h {
            max_h = sum_h;
            best_id = Some(current_id);
        }
        if sum_h == INFINITY {
            break;
        }
    }
    debug_assert!(max_h >= 0);
    if let Some(best_id) = best_id {
        num_best_order[best_id] += 1;
    }
    max_h
}

/// Maximum over a collection of cost-partitioning heuristics, admissible
/// w.r.t. the unscaled task.
pub struct MaxCostPartitioningHeuristic {
    /// One mapping per abstraction; `None` where no stored partitioning
    /// consults the abstraction.
    abstraction_functions: Vec<Option<Box<dyn AbstractionFunction>>>,
    cp_heuristics: Vec<CostPartitioningHeuristic>,
    num_best_order: Vec<usize>,
}

impl MaxCostPartitioningHeuristic {
    /// Takes over the collection; from the abstractions only the mappings of
    /// the useful ones survive, the transition systems can be dropped by the
    /// caller afterwards.
    pub fn new(
        abstractions: &[Box<dyn Abstraction>],
        cp_heuristics: Vec<CostPartitioningHeuristic>,
    ) -> Self {
        let num_abstractions = abstractions.len();
        let mut useful_abstractions = vec![false; num_abstractions];
        for cp_heuristic in &cp_heuristics {
            cp_heuristic.mark_useful_abstractions(&mut useful_abstractions);
        }
        let abstraction_functions: Vec<Option<Box<dyn AbstractionFunction>>> = abstractions
            .iter()
            .zip(&useful_abstractions)
            .map(|(abstraction, &useful)| useful.then(|| abstraction.abstraction_function()))
            .collect();

        let num_stored_tables: usize =
            cp_heuristics.iter().map(|cp| cp.num_lookup_tables()).sum();
        log::info!(
            "facade keeps {}/{} abstraction mappings and {} lookup tables over {} partitionings",
            abstraction_functions.iter().filter(|f| f.is_some()).count(),
            num_abstractions,
            num_stored_tables,
            cp_heuristics.len()
        );

        let num_best_order = vec![0; cp_heuristics.len()];
        MaxCostPartitioningHeuristic { abstraction_functions, cp_heuristics, num_best_order }
    }

    /// Admissible estimate of the state's remaining plan cost.
    pub fn evaluate(&mut self, state: &State) -> Estimate {
        let abstract_state_ids: Vec<usize> = self
            .abstraction_functions
            .iter()
            .map(|function| match function {
                Some(function) => function.abstract_state_id(state),
                None => NO_ABSTRACT_STATE,
            })
            .collect();
        let max_h = compute_max_h_with_statistics(
            &self.cp_heuristics,
            &abstract_state_ids,
            &mut self.num_best_order,
        );
        if max_h == INFINITY {
            return Estimate::DeadEnd;
        }
        Estimate::Value(descale(max_h))
    }

    pub fn num_cost_partitionings(&self) -> usize {
        self.cp_heuristics.len()
    }

    pub fn log_statistics(&self) {
        let num_orders = self.num_best_order.len();
        let useful = self.num_best_order.iter().filter(|&&n| n > 0).count();
        log::info!(
            "orders that were the best at least once: {}/{} ({:?})",
            useful,
            num_orders,
            self.num_best_order
        );
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_facade {
    use super::*;
    use crate::implementation::collection::{
        compute_saturated_cost_partitioning, get_abstract_state_ids,
    };
    use crate::implementation::projection::test_projection::projection;
    use crate::implementation::task::test_tasks::two_switches;

    #[test]
    fn descaling_inverts_the_cost_factor() {
        assert_eq!(0, descale(0));
        assert_eq!(5, descale(5000));
        // A hair of LP rounding noise in either direction is absorbed.
        assert_eq!(5, descale(5003));
        assert_eq!(5, descale(4998));
        assert_eq!(6, descale(5011));
    }

    #[test]
    fn evaluation_takes_the_maximum_over_partitionings() {
        let task = two_switches().with_scaled_costs(COST_FACTOR).unwrap();
        let abstractions: Vec<Box<dyn Abstraction>> = vec![
            Box::new(projection(&task, vec![0])),
            Box::new(projection(&task, vec![1])),
        ];
        let costs: Vec<Cost> = task.operators.iter().map(|op| op.cost).collect();
        // Two single-abstraction partitionings; neither alone is additive.
        let cp_a = compute_saturated_cost_partitioning(&abstractions, &[0], &costs);
        let cp_b = compute_saturated_cost_partitioning(&abstractions, &[1], &costs);
        let mut facade = MaxCostPartitioningHeuristic::new(&abstractions, vec![cp_a, cp_b]);
        // max(3, 4) = 4 after descaling.
        assert_eq!(Estimate::Value(4), facade.evaluate(&task.initial_state));
        let ids = get_abstract_state_ids(&abstractions, &task.initial_state);
        assert_eq!(2, ids.len());
    }

    #[test]
    fn dead_ends_are_reported() {
        let task = two_switches().with_scaled_costs(COST_FACTOR).unwrap();
        let abstractions: Vec<Box<dyn Abstraction>> =
            vec![Box::new(projection(&task, vec![0, 1]))];
        // Block operator 1 to cut off the goal.
        let cp = compute_saturated_cost_partitioning(&abstractions, &[0], &[3000, INFINITY]);
        let mut facade = MaxCostPartitioningHeuristic::new(&abstractions, vec![cp]);
        assert_eq!(Estimate::DeadEnd, facade.evaluate(&task.initial_state));
        facade.log_statistics();
    }

    #[test]
    fn unused_abstractions_lose_their_mapping() {
        let task = two_switches().with_scaled_costs(COST_FACTOR).unwrap();
        let abstractions: Vec<Box<dyn Abstraction>> = vec![
            Box::new(projection(&task, vec![0])),
            Box::new(projection(&task, vec![1])),
        ];
        let costs: Vec<Cost> = task.operators.iter().map(|op| op.cost).collect();
        // Only the first abstraction is consulted.
        let cp = compute_saturated_cost_partitioning(&abstractions, &[0], &costs);
        let mut facade = MaxCostPartitioningHeuristic::new(&abstractions, vec![cp]);
        assert!(facade.abstraction_functions[0].is_some());
        assert!(facade.abstraction_functions[1].is_none());
        assert_eq!(Estimate::Value(3), facade.evaluate(&task.initial_state));
    }
}
