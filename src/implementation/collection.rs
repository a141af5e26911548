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

//! This module drives the offline construction of the cost-partitioning
//! collection: sample a state, pick an order for it, saturate the
//! abstractions along the order against the shared bucketed cost function,
//! and keep the result if it diversifies the portfolio. The timer is only
//! consulted between orders; a started order always finishes, and at least
//! one order is always produced.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;

use crate::abstraction::{
    default_order, Abstraction, AbstractionMask, OrderGenerator, Saturator,
};
use crate::common::{reduce_costs, Cost, State, INFINITY};
use crate::implementation::orders::optimize_order;
use crate::implementation::{
    CostPartitioningHeuristic, Diversifier, RandomWalkSampler, StateDependentCostFunction, Task,
    TransitionCostFunction,
};

/// The abstract state ids of one concrete state across all abstractions.
pub fn get_abstract_state_ids(abstractions: &[Box<dyn Abstraction>], state: &State) -> Vec<usize> {
    abstractions.iter().map(|abstraction| abstraction.abstract_state_id(state)).collect()
}

/// Checks a deadline between pipeline steps.
struct CountdownTimer {
    start: Instant,
    limit: Duration,
}

impl CountdownTimer {
    fn new(limit: Duration) -> Self {
        CountdownTimer { start: Instant::now(), limit }
    }

    fn is_expired(&self) -> bool {
        self.start.elapsed() >= self.limit
    }
}

/// The plain saturated cost partitioning over operator costs: saturate each
/// abstraction in order and subtract its share from the remaining costs.
pub fn compute_saturated_cost_partitioning(
    abstractions: &[Box<dyn Abstraction>],
    order: &[usize],
    costs: &[Cost],
) -> CostPartitioningHeuristic {
    let mut remaining_costs = costs.to_vec();
    let mut cp_heuristic = CostPartitioningHeuristic::default();
    for &abstraction_id in order {
        let abstraction = abstractions[abstraction_id].as_ref();
        let h_values = abstraction.compute_goal_distances_ocf(&remaining_costs);
        let saturated_costs = abstraction.compute_saturated_costs_ocf(&h_values);
        reduce_costs(&mut remaining_costs, &saturated_costs);
        cp_heuristic.add_h_values(abstraction_id, h_values);
    }
    cp_heuristic
}

/// One saturated cost partitioning against the bucketed cost function. Each
/// abstraction runs either the transition-cost branch (saturator chain over
/// transition cost functions, then the three-stage reduction of the bucket
/// map) or the operator-cost branch, as the mask decides.
pub fn compute_saturated_cost_partitioning_with_saturators(
    abstractions: &[Box<dyn Abstraction>],
    abstraction_mask: &AbstractionMask,
    order: &[usize],
    saturators: &[&dyn Saturator],
    abstract_state_ids: &[usize],
    sdcf: &mut StateDependentCostFunction,
) -> CostPartitioningHeuristic {
    debug_assert_eq!(abstractions.len(), order.len());
    let mut cp_heuristic = CostPartitioningHeuristic::default();
    for &abstraction_id in order {
        let abstraction = abstractions[abstraction_id].as_ref();
        let state_id = abstract_state_ids[abstraction_id];

        if abstraction_mask.is_state_dependent(abstraction) {
            let mut tcf = TransitionCostFunction::new(abstraction);
            let mut h_values = vec![];
            let mut saturate_negative_infinity = false;
            for saturator in saturators {
                let result = saturator.saturate_tcf(abstraction, tcf, sdcf, h_values, state_id);
                tcf = result.tcf;
                h_values = result.h_values;
                saturate_negative_infinity = result.saturate_negative_infinity;
            }
            sdcf.reduce_by_operator_masked(&tcf);
            sdcf.reduce_by_transition(abstraction, &tcf);
            if saturate_negative_infinity {
                sdcf.reduce_by_negative_infinity(abstraction, &h_values);
            }
            cp_heuristic.add_h_values(abstraction_id, h_values);
        } else {
            let mut socf = sdcf.remaining_operator_costs();
            let mut h_values = abstraction.compute_goal_distances_ocf(&socf);
            for saturator in saturators {
                let result = saturator.saturate_ocf(abstraction, &socf, h_values, state_id);
                socf = result.socf;
                h_values = result.h_values;
            }
            sdcf.reduce_by_operator(&socf);
            cp_heuristic.add_h_values(abstraction_id, h_values);
        }
    }
    cp_heuristic
}

/// Configuration of the collection generator.
#[derive(Clone, Debug)]
pub struct CollectionConfig {
    /// Upper bound on the number of stored cost partitionings.
    pub max_orders: usize,
    /// Deadline for the whole generation loop, checked between orders.
    pub max_time: Duration,
    /// Only keep orders that raise the estimate on some sample.
    pub diversify: bool,
    /// Number of held-out samples for diversification.
    pub num_samples: usize,
    /// Budget for hill-climbing order optimization; zero disables it.
    pub max_optimization_time: Duration,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        CollectionConfig {
            max_orders: usize::MAX,
            max_time: Duration::from_secs(200),
            diversify: true,
            num_samples: 1000,
            max_optimization_time: Duration::ZERO,
        }
    }
}

/// Produces the collection of cost partitionings whose pointwise maximum
/// becomes the search heuristic.
pub struct CostPartitioningCollectionGenerator {
    order_generator: Box<dyn OrderGenerator>,
    config: CollectionConfig,
    rng: StdRng,
}

impl CostPartitioningCollectionGenerator {
    pub fn new(
        order_generator: Box<dyn OrderGenerator>,
        config: CollectionConfig,
        rng: StdRng,
    ) -> Self {
        CostPartitioningCollectionGenerator { order_generator, config, rng }
    }

    /// Runs the generation loop. `task` must be the scaled-cost task the
    /// abstractions and the bucketed cost function were built from.
    #[allow(clippy::too_many_arguments)]
    pub fn generate(
        &mut self,
        task: &Task,
        abstractions: &[Box<dyn Abstraction>],
        abstraction_mask: &AbstractionMask,
        saturators: &[Box<dyn Saturator>],
        extra_saturator: Option<&dyn Saturator>,
        diversified_saturator: Option<&dyn Saturator>,
        sdcf: &mut StateDependentCostFunction,
    ) -> Vec<CostPartitioningHeuristic> {
        let timer = CountdownTimer::new(self.config.max_time);
        let saturator_refs: Vec<&dyn Saturator> =
            saturators.iter().map(|saturator| saturator.as_ref()).collect();

        let initial_state = task.initial_state.clone();
        let ids_for_init = get_abstract_state_ids(abstractions, &initial_state);
        let costs: Vec<Cost> = task.operators.iter().map(|op| op.cost).collect();

        /* If any abstraction detects unsolvability in the initial state,
        a single order suffices: every order proves the same dead end. */
        let default_order_cp = compute_saturated_cost_partitioning(
            abstractions,
            &default_order(abstractions.len()),
            &costs,
        );
        if default_order_cp.compute_heuristic(&ids_for_init) == INFINITY {
            log::info!("initial state is unsolvable; storing one default-order partitioning");
            return vec![default_order_cp];
        }

        self.order_generator.initialize(abstractions, &costs);
        let mut order_for_init =
            self.order_generator.order_for_state(abstractions, &costs, &ids_for_init, false);
        optimize_order(&mut order_for_init, self.config.max_optimization_time);
        let cp_for_init = compute_saturated_cost_partitioning_with_saturators(
            abstractions,
            abstraction_mask,
            &order_for_init,
            &saturator_refs,
            &ids_for_init,
            sdcf,
        );
        let init_h = cp_for_init.compute_heuristic(&ids_for_init);
        log::info!("initial order yields h = {} for the initial state", init_h);

        let sampler = RandomWalkSampler::new(task);
        let is_dead_end = |state: &State| {
            cp_for_init.compute_heuristic(&get_abstract_state_ids(abstractions, state)) == INFINITY
        };

        let mut diversifier = if self.config.diversify {
            let mut samples = vec![ids_for_init.clone()];
            while samples.len() < self.config.num_samples && !timer.is_expired() {
                let sample = sampler.sample_state(init_h, &is_dead_end, &mut self.rng);
                samples.push(get_abstract_state_ids(abstractions, &sample));
            }
            log::info!("collected {} samples for diversification", samples.len());
            Some(Diversifier::new(samples))
        } else {
            None
        };

        let mut cp_heuristics: Vec<CostPartitioningHeuristic> = vec![];
        let mut evaluated_orders = 0;
        while cp_heuristics.len() < self.config.max_orders
            && (!timer.is_expired() || cp_heuristics.is_empty())
        {
            let first_order = evaluated_orders == 0;
            let (abstract_state_ids, order, mut cp_heuristic) = if first_order {
                (ids_for_init.clone(), order_for_init.clone(), cp_for_init.clone())
            } else {
                sdcf.reinitialize();
                let sample = sampler.sample_state(init_h, &is_dead_end, &mut self.rng);
                let abstract_state_ids = get_abstract_state_ids(abstractions, &sample);
                let mut order = self.order_generator.order_for_state(
                    abstractions,
                    &costs,
                    &abstract_state_ids,
                    false,
                );
                optimize_order(&mut order, self.config.max_optimization_time);
                let cp_heuristic = compute_saturated_cost_partitioning_with_saturators(
                    abstractions,
                    abstraction_mask,
                    &order,
                    &saturator_refs,
                    &abstract_state_ids,
                    sdcf,
                );
                (abstract_state_ids, order, cp_heuristic)
            };

            /* An extra saturator consumes what the main chain left in the
            bucketed cost function. */
            if let Some(extra) = extra_saturator {
                let extra_cp = compute_saturated_cost_partitioning_with_saturators(
                    abstractions,
                    abstraction_mask,
                    &order,
                    &[extra],
                    &abstract_state_ids,
                    sdcf,
                );
                cp_heuristic.add(extra_cp);
            }

            let admit = match diversifier.as_mut() {
                None => true,
                Some(diversifier) => diversifier.is_diverse(&cp_heuristic),
            };
            if admit {
                if let Some(diversified) = diversified_saturator {
                    let diversified_cp = compute_saturated_cost_partitioning_with_saturators(
                        abstractions,
                        abstraction_mask,
                        &order,
                        &[diversified],
                        &abstract_state_ids,
                        sdcf,
                    );
                    cp_heuristic.add(diversified_cp);
                }
                cp_heuristics.push(cp_heuristic);
                if let Some(diversifier) = &diversifier {
                    log::debug!(
                        "order {} admitted; portfolio sum over {} samples is {}",
                        evaluated_orders,
                        diversifier.num_samples(),
                        diversifier.sum_portfolio_h_values()
                    );
                }
            }
            evaluated_orders += 1;
        }

        sdcf.log_statistics();
        log::info!(
            "stored {} cost partitionings out of {} evaluated orders",
            cp_heuristics.len(),
            evaluated_orders
        );
        cp_heuristics
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_collection {
    use super::*;
    use crate::implementation::orders::DefaultOrderGenerator;
    use crate::implementation::projection::test_projection::projection;
    use crate::implementation::saturator_cap::CapSaturator;
    use crate::implementation::task::test_tasks::two_switches;
    use crate::implementation::{BddBuilder, TaskInfo};
    use rand::SeedableRng;
    use std::sync::Arc;

    fn setup(
        task: &Task,
        patterns: Vec<Vec<usize>>,
    ) -> (Vec<Box<dyn Abstraction>>, StateDependentCostFunction) {
        let task_info = Arc::new(TaskInfo::new(task));
        let bdd_builder = Arc::new(BddBuilder::new(Arc::clone(&task_info)));
        let abstractions: Vec<Box<dyn Abstraction>> = patterns
            .into_iter()
            .map(|pattern| Box::new(projection(task, pattern)) as Box<dyn Abstraction>)
            .collect();
        let sdcf = StateDependentCostFunction::new(task_info, bdd_builder, 8, true);
        (abstractions, sdcf)
    }

    #[test]
    fn the_plain_pipeline_splits_the_costs() {
        let task = two_switches();
        let (abstractions, _) = setup(&task, vec![vec![0], vec![1]]);
        let cp = compute_saturated_cost_partitioning(&abstractions, &[0, 1], &[3, 4]);
        let ids = get_abstract_state_ids(&abstractions, &task.initial_state);
        // Independent operators: the partitioning is additive, 3 + 4.
        assert_eq!(7, cp.compute_heuristic(&ids));
    }

    #[test]
    fn the_bucketed_pipeline_matches_the_plain_one_here() {
        let task = two_switches();
        let (abstractions, mut sdcf) = setup(&task, vec![vec![0], vec![1]]);
        let saturator: Box<dyn Saturator> = Box::new(CapSaturator::default());
        let ids = get_abstract_state_ids(&abstractions, &task.initial_state);
        let cp = compute_saturated_cost_partitioning_with_saturators(
            &abstractions,
            &AbstractionMask::AlwaysStateDependent,
            &[0, 1],
            &[saturator.as_ref()],
            &ids,
            &mut sdcf,
        );
        assert_eq!(7, cp.compute_heuristic(&ids));
    }

    #[test]
    fn the_generator_produces_at_least_one_partitioning() {
        let task = two_switches();
        let (abstractions, mut sdcf) = setup(&task, vec![vec![0], vec![1]]);
        let saturators: Vec<Box<dyn Saturator>> = vec![Box::new(CapSaturator::default())];
        let config = CollectionConfig {
            max_orders: 4,
            max_time: Duration::from_millis(200),
            num_samples: 5,
            ..CollectionConfig::default()
        };
        let mut generator = CostPartitioningCollectionGenerator::new(
            Box::new(DefaultOrderGenerator),
            config,
            StdRng::seed_from_u64(0),
        );
        let cps = generator.generate(
            &task,
            &abstractions,
            &AbstractionMask::AlwaysStateDependent,
            &saturators,
            None,
            None,
            &mut sdcf,
        );
        assert!(!cps.is_empty());
        let ids = get_abstract_state_ids(&abstractions, &task.initial_state);
        let best = cps.iter().map(|cp| cp.compute_heuristic(&ids)).max();
        assert_eq!(Some(7), best);
    }

    #[test]
    fn an_unsolvable_initial_state_needs_one_order_only() {
        let mut task = two_switches();
        // Make the goal unreachable: nothing sets v1 to 1 anymore.
        task.operators[1] = crate::implementation::task::Operator::new(
            4,
            vec![crate::common::Fact::new(1, 1)],
            vec![crate::common::Fact::new(1, 0)],
        );
        let (abstractions, mut sdcf) = setup(&task, vec![vec![0], vec![1]]);
        let saturators: Vec<Box<dyn Saturator>> = vec![Box::new(CapSaturator::default())];
        let mut generator = CostPartitioningCollectionGenerator::new(
            Box::new(DefaultOrderGenerator),
            CollectionConfig { max_orders: 8, ..CollectionConfig::default() },
            StdRng::seed_from_u64(0),
        );
        let cps = generator.generate(
            &task,
            &abstractions,
            &AbstractionMask::AlwaysStateIndependent,
            &saturators,
            None,
            None,
            &mut sdcf,
        );
        assert_eq!(1, cps.len());
        let ids = get_abstract_state_ids(&abstractions, &task.initial_state);
        assert_eq!(INFINITY, cps[0].compute_heuristic(&ids));
    }
}
