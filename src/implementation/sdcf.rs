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

//! This module provides the bucketed state-dependent cost function: for each
//! operator, a totally defined map from concrete states to remaining cost,
//! represented as an ordered map from cost value to the decision-diagram
//! characteristic function of the states holding that cost. Walking the map
//! in key order visits costs in ascending order, which is what every query
//! exploits.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::Arc;

use biodivine_lib_bdd::Bdd;
use rustc_hash::FxHashMap;

use crate::abstraction::Abstraction;
use crate::common::{left_subtraction, Cost, Transition, INFINITY};
use crate::errors::{fatal, Error};
use crate::implementation::{BddBuilder, TaskInfo, TransitionCostFunction};

/// Inserts a state set under a cost value, merging with an existing bucket
/// of the same value and dropping empty sets.
fn insert_cost_value(cost_value: Cost, cost_value_bdd: Bdd, buckets: &mut BTreeMap<Cost, Bdd>) {
    if cost_value_bdd.is_false() {
        return;
    }
    if let Some(existing) = buckets.get_mut(&cost_value) {
        *existing = existing.or(&cost_value_bdd);
    } else {
        buckets.insert(cost_value, cost_value_bdd);
    }
}

/// Enforces the bucket cap: all buckets beyond the cap are folded into the
/// highest-cost retained bucket. Since folding moves states to a *smaller*
/// cost, the result underapproximates the remaining costs.
fn limit_buckets(buckets: &mut BTreeMap<Cost, Bdd>, max_buckets: usize) {
    if buckets.len() <= max_buckets {
        return;
    }
    let keys: Vec<Cost> = buckets.keys().copied().collect();
    let sink_key = keys[max_buckets - 1];
    let mut sink = buckets.remove(&sink_key).unwrap_or_else(|| {
        fatal(Error::InvariantViolation("bucket sink key vanished".to_string()))
    });
    for &key in &keys[max_buckets..] {
        if let Some(folded) = buckets.remove(&key) {
            sink = sink.or(&folded);
        }
    }
    buckets.insert(sink_key, sink);
}

/// Removes the states of `context` from every finite bucket; the `INFINITY`
/// bucket is left alone because those states never recover.
fn remove_states(bdd_builder: &BddBuilder, context: &Bdd, buckets: &mut BTreeMap<Cost, Bdd>) {
    let mut emptied = vec![];
    for (&cost_value, bucket) in buckets.iter_mut() {
        if cost_value == INFINITY {
            continue;
        }
        if bdd_builder.intersect(context, bucket) {
            *bucket = bucket.and_not(context);
            if bucket.is_false() {
                emptied.push(cost_value);
            }
        }
    }
    for cost_value in emptied {
        buckets.remove(&cost_value);
    }
}

/// The state-dependent cost function `c : S x O -> N ∪ {INFINITY}` shared by
/// all abstractions of one order.
pub struct StateDependentCostFunction {
    task_info: Arc<TaskInfo>,
    bdd_builder: Arc<BddBuilder>,
    /// Cap on the number of buckets per operator; overflow triggers merging,
    /// otherwise instances with many distinct costs explode combinatorially.
    max_buckets: usize,
    /// When several orders are evaluated, transition fingerprints are worth
    /// caching inside the abstractions.
    diversify: bool,
    remaining: Vec<BTreeMap<Cost, Bdd>>,
    /// useless[op] is set once every transition of op saturated to
    /// `-INFINITY`; no later order can recover such an operator.
    useless_operators: Vec<bool>,
    count_evaluations: Cell<u64>,
    count_subtractions: Cell<u64>,
}

impl StateDependentCostFunction {
    pub fn new(
        task_info: Arc<TaskInfo>,
        bdd_builder: Arc<BddBuilder>,
        max_buckets: usize,
        diversify: bool,
    ) -> Self {
        assert!(max_buckets >= 1);
        let num_operators = task_info.num_operators();
        let mut sdcf = StateDependentCostFunction {
            task_info,
            bdd_builder,
            max_buckets,
            diversify,
            remaining: vec![],
            useless_operators: vec![false; num_operators],
            count_evaluations: Cell::new(0),
            count_subtractions: Cell::new(0),
        };
        sdcf.reinitialize();
        sdcf
    }

    /// Resets every operator to its original cost. Useless operators stay at
    /// `INFINITY` across reinitializations.
    pub fn reinitialize(&mut self) {
        let num_operators = self.task_info.num_operators();
        self.remaining = Vec::with_capacity(num_operators);
        for op_id in 0..num_operators {
            let mut buckets = BTreeMap::new();
            if self.useless_operators[op_id] {
                buckets.insert(INFINITY, self.bdd_builder.one());
            } else {
                buckets.insert(self.task_info.operator_cost(op_id), self.bdd_builder.one());
            }
            self.remaining.push(buckets);
        }
        debug_assert!(self.verify_all_buckets());
    }

    // ------------------------------------------------------------------
    // --- QUERIES ------------------------------------------------------
    // ------------------------------------------------------------------

    /// The minimal remaining cost of the operator over all states. Under the
    /// partition invariant this is the first bucket's key.
    pub fn initial_cost(&self, op_id: usize) -> Cost {
        match self.remaining[op_id].first_key_value() {
            Some((&cost, _bucket)) => {
                debug_assert!(cost >= 0);
                cost
            }
            None => fatal(Error::InvariantViolation(format!(
                "operator {} has no cost buckets",
                op_id
            ))),
        }
    }

    /// The remaining per-operator cost function: the state-minimum for each
    /// operator.
    pub fn remaining_operator_costs(&self) -> Vec<Cost> {
        (0..self.task_info.num_operators()).map(|op_id| self.initial_cost(op_id)).collect()
    }

    /// The remaining cost of one abstract transition: the smallest bucket
    /// cost whose state set intersects the transition's fingerprint.
    pub fn cost_at_transition(&self, abstraction: &dyn Abstraction, transition: &Transition) -> Cost {
        /* Transitions out of abstract goal states never lie on a shortest
        path that matters; their cost share is zero. */
        if abstraction.is_goal_state(transition.source_id) {
            return 0;
        }
        self.count_evaluations.set(self.count_evaluations.get() + 1);
        let transition_bdd = self.fingerprint(abstraction, transition);
        let mut cost = -1;
        for (&cost_value, bucket) in &self.remaining[transition.op_id] {
            cost = cost_value;
            if self.bdd_builder.intersect(bucket, &transition_bdd) {
                break;
            }
        }
        debug_assert!(cost >= 0);
        cost
    }

    /// Like [`cost_at_transition`], but once the walk reaches `required` the
    /// exact value no longer matters and the current key is returned as an
    /// upper bound (the Dijkstra engines only need to know whether the
    /// transition beats the required improvement).
    ///
    /// [`cost_at_transition`]: StateDependentCostFunction::cost_at_transition
    pub fn cost_at_transition_with_hint(
        &self,
        abstraction: &dyn Abstraction,
        transition: &Transition,
        required: Cost,
    ) -> Cost {
        if abstraction.is_goal_state(transition.source_id) {
            return 0;
        }
        self.count_evaluations.set(self.count_evaluations.get() + 1);
        let transition_bdd = self.fingerprint(abstraction, transition);
        let mut cost = -1;
        for (&cost_value, bucket) in &self.remaining[transition.op_id] {
            cost = cost_value;
            if cost >= required {
                break;
            }
            if self.bdd_builder.intersect(bucket, &transition_bdd) {
                break;
            }
        }
        debug_assert!(cost >= 0);
        cost
    }

    /// Fills the per-transition costs of `tcf` with the remaining cost of
    /// every transition of the abstraction.
    pub fn fill_transition_costs(
        &self,
        abstraction: &dyn Abstraction,
        tcf: &mut TransitionCostFunction,
    ) {
        let sd_costs = tcf.sd_costs_mut();
        abstraction.for_each_transition(&mut |transition: Transition| {
            sd_costs[transition.transition_id] = self.cost_at_transition(abstraction, &transition);
        });
    }

    fn fingerprint(&self, abstraction: &dyn Abstraction, transition: &Transition) -> Bdd {
        if self.diversify {
            abstraction.transition_bdd_cached(transition)
        } else {
            abstraction.transition_bdd(transition)
        }
    }

    // ------------------------------------------------------------------
    // --- REDUCTIONS ---------------------------------------------------
    // ------------------------------------------------------------------

    /// Subtracts the saturated cost of a single operator from every bucket.
    fn reduce_one_operator(&mut self, op_id: usize, saturated: Cost) {
        debug_assert!(saturated != 0 && saturated != INFINITY);
        if saturated == -INFINITY {
            self.remaining[op_id].clear();
            self.remaining[op_id].insert(INFINITY, self.bdd_builder.one());
            self.useless_operators[op_id] = true;
        } else {
            let old_buckets = std::mem::take(&mut self.remaining[op_id]);
            let mut new_buckets = BTreeMap::new();
            for (cost_value, bucket) in old_buckets {
                if cost_value == INFINITY {
                    insert_cost_value(INFINITY, bucket, &mut new_buckets);
                } else {
                    /* Clamp at zero: saturators working on a pruned state
                    subset may ask for more than some dead-end state has. */
                    let new_cost = 0.max(left_subtraction(cost_value, saturated));
                    insert_cost_value(new_cost, bucket, &mut new_buckets);
                }
            }
            self.remaining[op_id] = new_buckets;
        }
        debug_assert!(self.verify_buckets(op_id));
    }

    /// Subtracts a saturated operator cost function.
    pub fn reduce_by_operator(&mut self, socf: &[Cost]) {
        for op_id in 0..self.task_info.num_operators() {
            let saturated = socf[op_id];
            if saturated == 0 || saturated == INFINITY {
                continue;
            }
            self.reduce_one_operator(op_id, saturated);
        }
    }

    /// Subtracts the state-independent part of a saturated transition cost
    /// function: operators whose transitions all agreed on one value are
    /// handled with a single scalar subtraction.
    pub fn reduce_by_operator_masked(&mut self, tcf: &TransitionCostFunction) {
        for op_id in 0..self.task_info.num_operators() {
            if !tcf.si()[op_id] {
                continue;
            }
            let saturated = tcf.si_costs()[op_id];
            if saturated == 0 || saturated == INFINITY {
                continue;
            }
            self.reduce_one_operator(op_id, saturated);
        }
    }

    /// Subtracts the finite state-dependent part of a saturated transition
    /// cost function. First the saturated values are regrouped into
    /// state-set buckets per operator; then each remaining bucket is split
    /// against them.
    pub fn reduce_by_transition(
        &mut self,
        abstraction: &dyn Abstraction,
        tcf: &TransitionCostFunction,
    ) {
        let num_operators = self.task_info.num_operators();
        let sd_costs = tcf.sd_costs();
        let si = tcf.si();

        // 1. The saturated cost function as state-set buckets per operator.
        let mut saturated_dds: Vec<FxHashMap<Cost, Bdd>> =
            (0..num_operators).map(|_| FxHashMap::default()).collect();
        abstraction.for_each_transition_masked(si, &mut |transition: Transition| {
            let saturated = sd_costs[transition.transition_id];
            // Negative infinities are handled separately.
            if saturated == -INFINITY || saturated == 0 || saturated == INFINITY {
                return;
            }
            self.count_subtractions.set(self.count_subtractions.get() + 1);
            let transition_bdd = self.fingerprint(abstraction, &transition);
            if transition_bdd.is_false() {
                return;
            }
            let per_op = &mut saturated_dds[transition.op_id];
            if let Some(existing) = per_op.get_mut(&saturated) {
                *existing = existing.or(&transition_bdd);
            } else {
                per_op.insert(saturated, transition_bdd);
            }
        });

        // 2. Subtract them bucket by bucket.
        for op_id in 0..num_operators {
            if si[op_id] {
                // The scalar subtraction already covered this operator.
                continue;
            }
            let old_buckets = std::mem::take(&mut self.remaining[op_id]);
            let mut old_buckets: Vec<(Cost, Bdd)> = old_buckets.into_iter().collect();
            let mut new_buckets = BTreeMap::new();
            // Move the states whose cost changes.
            for (remaining_cost, remaining_bdd) in old_buckets.iter_mut() {
                for (&saturated_cost, saturated_bdd) in &saturated_dds[op_id] {
                    if self.bdd_builder.intersect(remaining_bdd, saturated_bdd) {
                        insert_cost_value(
                            0.max(left_subtraction(*remaining_cost, saturated_cost)),
                            remaining_bdd.and(saturated_bdd),
                            &mut new_buckets,
                        );
                        *remaining_bdd = remaining_bdd.and_not(saturated_bdd);
                    }
                }
            }
            // Keep the states whose cost is unchanged.
            for (remaining_cost, remaining_bdd) in old_buckets {
                insert_cost_value(remaining_cost, remaining_bdd, &mut new_buckets);
            }
            limit_buckets(&mut new_buckets, self.max_buckets);
            self.remaining[op_id] = new_buckets;
        }
        debug_assert!(self.verify_all_buckets());
    }

    /// Moves every concrete state that can only lead into infinite-estimate
    /// territory (and every state already mapped there) into the operator's
    /// `INFINITY` bucket.
    pub fn reduce_by_negative_infinity(
        &mut self,
        abstraction: &dyn Abstraction,
        h_values: &[Cost],
    ) {
        let infinity_bdds = self.bdd_builder.negative_infinity_bdds(
            abstraction,
            h_values,
            &self.useless_operators,
        );
        for (op_id, infinity_bdd) in infinity_bdds.into_iter().enumerate() {
            if self.useless_operators[op_id] {
                continue;
            }
            remove_states(&self.bdd_builder, &infinity_bdd, &mut self.remaining[op_id]);
            insert_cost_value(INFINITY, infinity_bdd, &mut self.remaining[op_id]);
            debug_assert!(self.verify_buckets(op_id));
        }
    }

    // ------------------------------------------------------------------
    // --- DIAGNOSTICS --------------------------------------------------
    // ------------------------------------------------------------------

    /// Checks the bucket invariant for one operator: buckets are nonempty,
    /// pairwise disjoint, and together cover the universe of states.
    pub fn verify_buckets(&self, op_id: usize) -> bool {
        let mut union = self.bdd_builder.zero();
        for bucket in self.remaining[op_id].values() {
            if bucket.is_false() {
                return false;
            }
            if self.bdd_builder.intersect(&union, bucket) {
                return false;
            }
            union = union.or(bucket);
        }
        self.bdd_builder.same_set(&union, &self.bdd_builder.one())
    }

    pub fn verify_all_buckets(&self) -> bool {
        (0..self.task_info.num_operators()).all(|op_id| self.verify_buckets(op_id))
    }

    pub fn num_buckets(&self, op_id: usize) -> usize {
        self.remaining[op_id].len()
    }

    pub fn is_useless(&self, op_id: usize) -> bool {
        self.useless_operators[op_id]
    }

    pub fn log_statistics(&self) {
        log::debug!(
            "state-dependent cost function: {} evaluations, {} subtractions, {} useless operators",
            self.count_evaluations.get(),
            self.count_subtractions.get(),
            self.useless_operators.iter().filter(|&&useless| useless).count()
        );
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_sdcf {
    use super::*;
    use crate::implementation::projection::test_projection::projection;
    use crate::implementation::task::test_tasks::two_switches;

    fn sdcf_for_two_switches() -> (StateDependentCostFunction, Arc<TaskInfo>, Arc<BddBuilder>) {
        let task = two_switches();
        let task_info = Arc::new(TaskInfo::new(&task));
        let bdd_builder = Arc::new(BddBuilder::new(Arc::clone(&task_info)));
        let sdcf = StateDependentCostFunction::new(
            Arc::clone(&task_info),
            Arc::clone(&bdd_builder),
            8,
            false,
        );
        (sdcf, task_info, bdd_builder)
    }

    #[test]
    fn initial_costs_are_the_operator_costs() {
        let (sdcf, _, _) = sdcf_for_two_switches();
        assert_eq!(vec![3, 4], sdcf.remaining_operator_costs());
        assert!(sdcf.verify_all_buckets());
    }

    #[test]
    fn operator_reduction_is_a_scalar_shift() {
        let (mut sdcf, _, _) = sdcf_for_two_switches();
        sdcf.reduce_by_operator(&[2, 0]);
        assert_eq!(vec![1, 4], sdcf.remaining_operator_costs());
        assert!(sdcf.verify_all_buckets());
    }

    #[test]
    fn reducing_by_negative_infinity_retires_the_operator() {
        let (mut sdcf, _, _) = sdcf_for_two_switches();
        sdcf.reduce_by_operator(&[-INFINITY, 0]);
        assert!(sdcf.is_useless(0));
        assert_eq!(INFINITY, sdcf.initial_cost(0));
        // The useless flag survives reinitialization.
        sdcf.reinitialize();
        assert_eq!(INFINITY, sdcf.initial_cost(0));
        assert_eq!(4, sdcf.initial_cost(1));
    }

    #[test]
    fn reduction_is_idempotent_on_zero() {
        let (mut sdcf, _, _) = sdcf_for_two_switches();
        sdcf.reduce_by_operator(&[0, 0]);
        assert_eq!(vec![3, 4], sdcf.remaining_operator_costs());
    }

    #[test]
    fn transition_costs_match_buckets() {
        let task = two_switches();
        let (sdcf, _, _) = sdcf_for_two_switches();
        let projection = projection(&task, vec![0, 1]);
        let mut costs = vec![];
        projection.for_each_transition(&mut |t: Transition| {
            costs.push((t.op_id, sdcf.cost_at_transition(&projection, &t)));
        });
        for (op_id, cost) in costs {
            // Goal-source transitions cost 0, all others the full cost.
            assert!(cost == 0 || cost == [3, 4][op_id]);
        }
    }

    #[test]
    fn transition_reduction_splits_buckets() {
        let task = two_switches();
        let (mut sdcf, _, _) = sdcf_for_two_switches();
        let projection = projection(&task, vec![0, 1]);
        // Saturate op 0 with cost 3 only on the transitions where v1 = 0.
        let mut tcf = TransitionCostFunction::new(&projection);
        {
            let (sd_costs, si, _si_costs) = tcf.parts_mut();
            si.fill(false);
            sd_costs.fill(0);
            projection.for_each_transition(&mut |t: Transition| {
                // v1 is the high digit of the state hash.
                if t.op_id == 0 && t.source_id < 2 {
                    sd_costs[t.transition_id] = 3;
                }
            });
        }
        sdcf.reduce_by_transition(&projection, &tcf);
        assert!(sdcf.verify_all_buckets());
        // Operator 0 now has two buckets: 0 where v1=0 (minus goal-state
        // quirks) and 3 elsewhere.
        assert_eq!(2, sdcf.num_buckets(0));
        assert_eq!(0, sdcf.initial_cost(0));
        assert_eq!(4, sdcf.initial_cost(1));
        // The zero bucket covers exactly the fingerprinted states.
        let mut checked = false;
        projection.for_each_transition(&mut |t: Transition| {
            if t.op_id == 0 && t.source_id < 2 && !projection.is_goal_state(t.source_id) {
                assert_eq!(0, sdcf.cost_at_transition(&projection, &t));
                checked = true;
            }
        });
        assert!(checked);
    }

    #[test]
    fn bucket_cap_folds_into_the_highest_retained_cost() {
        let mut buckets = BTreeMap::new();
        let (_sdcf, _, bdd_builder) = sdcf_for_two_switches();
        buckets.insert(0, bdd_builder.fact_bdd(0, 0).and(bdd_builder.fact_bdd(1, 0)));
        buckets.insert(1, bdd_builder.fact_bdd(0, 0).and(bdd_builder.fact_bdd(1, 1)));
        buckets.insert(5, bdd_builder.fact_bdd(0, 1).and(bdd_builder.fact_bdd(1, 0)));
        buckets.insert(9, bdd_builder.fact_bdd(0, 1).and(bdd_builder.fact_bdd(1, 1)));
        limit_buckets(&mut buckets, 2);
        assert_eq!(2, buckets.len());
        let keys: Vec<Cost> = buckets.keys().copied().collect();
        assert_eq!(vec![0, 1], keys);
        // The cost-1 bucket swallowed the cost-5 and cost-9 states.
        let expected = bdd_builder
            .fact_bdd(0, 0)
            .and(bdd_builder.fact_bdd(1, 1))
            .or(bdd_builder.fact_bdd(0, 1));
        assert!(bdd_builder.same_set(&buckets[&1], &expected));
    }
}
