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

//! This module provides the Cartesian abstraction: abstract states are
//! axis-aligned products of per-variable value subsets, induced by a binary
//! refinement tree built by an external CEGAR collaborator. The tree is kept
//! as an index-addressed arena; each inner node records the variable it
//! splits on and the value subsets routed to its two children, each leaf
//! names one abstract state.

use std::sync::Arc;

use biodivine_lib_bdd::Bdd;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::abstraction::{Abstraction, AbstractionFunction, TransitionCallback};
use crate::common::{Cost, State, Transition};
use crate::implementation::{
    BddBuilder, ExplicitTransitionSystem, StateDependentCostFunction, TaskInfo,
    TransitionCostFunction,
};

// ----------------------------------------------------------------------------
// --- SPLIT TREE -------------------------------------------------------------
// ----------------------------------------------------------------------------

/// One node of the refinement tree, as delivered by the CEGAR collaborator.
/// Children are arena indices; `left_vals`/`right_vals` are value subsets of
/// the split variable's domain.
#[derive(Clone, Debug)]
pub enum SplitTreeNode {
    /// Maps the states that reach it to one abstract state.
    Leaf { state_id: usize },
    Split {
        var: usize,
        left_vals: Vec<bool>,
        left: usize,
        right_vals: Vec<bool>,
        right: usize,
    },
}

/// The refinement tree with the per-node value-subset diagrams and the
/// root-to-leaf paths needed for fingerprints. Node 0 is the root.
pub struct SplitTree {
    nodes: Vec<SplitTreeNode>,
    /// For inner nodes, the diagrams of the left and right value subsets.
    node_bdds: Vec<Option<(Bdd, Bdd)>>,
    /// For each abstract state, the root-to-leaf path as (node, went-left).
    state_paths: Vec<Vec<(usize, bool)>>,
    split_variables: Vec<usize>,
    task_info: Arc<TaskInfo>,
    bdd_builder: Arc<BddBuilder>,
}

impl SplitTree {
    pub fn new(
        task_info: Arc<TaskInfo>,
        bdd_builder: Arc<BddBuilder>,
        nodes: Vec<SplitTreeNode>,
        num_states: usize,
    ) -> Self {
        let mut node_bdds = Vec::with_capacity(nodes.len());
        let mut split_variables = FxHashSet::default();
        for node in &nodes {
            match node {
                SplitTreeNode::Leaf { .. } => node_bdds.push(None),
                SplitTreeNode::Split { var, left_vals, right_vals, .. } => {
                    split_variables.insert(*var);
                    node_bdds.push(Some((
                        bdd_builder.value_set_bdd(*var, left_vals),
                        bdd_builder.value_set_bdd(*var, right_vals),
                    )));
                }
            }
        }
        let mut split_variables: Vec<usize> = split_variables.into_iter().collect();
        split_variables.sort_unstable();

        // Record the root-to-leaf path of every abstract state.
        let mut state_paths = vec![vec![]; num_states];
        let mut stack = vec![(0usize, vec![])];
        while let Some((node_id, path)) = stack.pop() {
            match &nodes[node_id] {
                SplitTreeNode::Leaf { state_id } => {
                    state_paths[*state_id] = path;
                }
                SplitTreeNode::Split { left, right, .. } => {
                    let mut left_path = path.clone();
                    left_path.push((node_id, true));
                    stack.push((*left, left_path));
                    let mut right_path = path;
                    right_path.push((node_id, false));
                    stack.push((*right, right_path));
                }
            }
        }

        SplitTree { nodes, node_bdds, state_paths, split_variables, task_info, bdd_builder }
    }

    pub fn split_variables(&self) -> &[usize] {
        &self.split_variables
    }

    /// Descends from the root, following the value subsets.
    pub fn abstract_state_id(&self, state: &State) -> usize {
        let mut node_id = 0;
        loop {
            match &self.nodes[node_id] {
                SplitTreeNode::Leaf { state_id } => return *state_id,
                SplitTreeNode::Split { var, left_vals, left, right, .. } => {
                    node_id = if left_vals[state.value(*var)] { *left } else { *right };
                }
            }
        }
    }

    /// Replays the state's path into a per-variable constraint slot; deeper
    /// splits on the same variable are more refined and overwrite shallower
    /// ones.
    fn fill_state(&self, state_id: usize, slots: &mut [Option<(usize, bool)>]) {
        for &var in &self.split_variables {
            slots[var] = None;
        }
        for &(node_id, went_left) in &self.state_paths[state_id] {
            if let SplitTreeNode::Split { var, .. } = &self.nodes[node_id] {
                slots[*var] = Some((node_id, went_left));
            }
        }
    }

    fn slot_bdd(&self, slot: (usize, bool)) -> &Bdd {
        let (node_id, went_left) = slot;
        let (left, right) = self.node_bdds[node_id]
            .as_ref()
            .expect("inner split node carries value-set diagrams");
        if went_left {
            left
        } else {
            right
        }
    }

    /// The characteristic function of the abstract state.
    pub fn state_bdd(&self, state_id: usize) -> Bdd {
        let mut slots = vec![None; self.task_info.num_variables()];
        self.fill_state(state_id, &mut slots);
        let mut result = self.bdd_builder.one();
        for &var in &self.split_variables {
            if let Some(slot) = slots[var] {
                result = result.and(self.slot_bdd(slot));
            }
        }
        result
    }

    /// The regression fingerprint of a transition: concrete states mapped
    /// to the source whose successor under the operator is mapped to the
    /// target. Variables pinned by the operator's precondition are projected
    /// away; target constraints only matter for variables the operator does
    /// not touch.
    pub fn regress(&self, transition: &Transition) -> Bdd {
        let num_variables = self.task_info.num_variables();
        let mut source_slots = vec![None; num_variables];
        let mut target_slots = vec![None; num_variables];
        self.fill_state(transition.source_id, &mut source_slots);
        self.fill_state(transition.target_id, &mut target_slots);
        let mut result = self.bdd_builder.one();
        for &var in &self.split_variables {
            if self.task_info.operator_has_precondition(transition.op_id, var) {
                continue;
            }
            if let Some(slot) = source_slots[var] {
                result = result.and(self.slot_bdd(slot));
            }
            if !self.task_info.operator_mentions_variable(transition.op_id, var) {
                if let Some(slot) = target_slots[var] {
                    result = result.and(self.slot_bdd(slot));
                }
            }
        }
        result
    }
}

/// The standalone abstraction mapping of a Cartesian abstraction.
pub struct CartesianFunction {
    split_tree: Arc<SplitTree>,
}

impl AbstractionFunction for CartesianFunction {
    fn abstract_state_id(&self, state: &State) -> usize {
        self.split_tree.abstract_state_id(state)
    }
}

// ----------------------------------------------------------------------------
// --- CARTESIAN ABSTRACTION --------------------------------------------------
// ----------------------------------------------------------------------------

/// A Cartesian refinement abstraction: the explicit transition-system core
/// plus the split tree that provides the abstraction mapping and the
/// decision-diagram fingerprints.
pub struct CartesianAbstraction {
    task_info: Arc<TaskInfo>,
    ts: ExplicitTransitionSystem,
    split_tree: Arc<SplitTree>,
    transition_bdd_cache: RwLock<FxHashMap<usize, Bdd>>,
}

impl CartesianAbstraction {
    /// Assembles an abstraction from the parts delivered by the CEGAR
    /// collaborator: the transition list `(source, op, target)`, the
    /// per-operator loop bits and the refinement tree.
    pub fn new(
        task_info: Arc<TaskInfo>,
        bdd_builder: Arc<BddBuilder>,
        num_states: usize,
        init_state_id: usize,
        goal_states: FxHashSet<usize>,
        transitions: &[(usize, usize, usize)],
        has_loop: Vec<bool>,
        nodes: Vec<SplitTreeNode>,
    ) -> Self {
        let num_operators = task_info.num_operators();
        debug_assert_eq!(num_operators, has_loop.len());
        let split_tree =
            Arc::new(SplitTree::new(Arc::clone(&task_info), bdd_builder, nodes, num_states));
        let ts = ExplicitTransitionSystem::new(
            num_states,
            num_operators,
            init_state_id,
            goal_states,
            transitions,
            has_loop,
        );
        CartesianAbstraction {
            task_info,
            ts,
            split_tree,
            transition_bdd_cache: RwLock::new(FxHashMap::default()),
        }
    }
}

impl Abstraction for CartesianAbstraction {
    fn num_states(&self) -> usize {
        self.ts.num_states()
    }

    fn num_transitions(&self) -> usize {
        self.ts.num_transitions()
    }

    fn num_operators(&self) -> usize {
        self.ts.num_operators()
    }

    fn num_transitions_of(&self, op_id: usize) -> usize {
        self.ts.num_transitions_of(op_id)
    }

    fn initial_state_id(&self) -> usize {
        self.ts.initial_state_id()
    }

    fn goal_states(&self) -> &FxHashSet<usize> {
        self.ts.goal_states()
    }

    fn abstract_state_id(&self, state: &State) -> usize {
        self.split_tree.abstract_state_id(state)
    }

    fn abstraction_function(&self) -> Box<dyn AbstractionFunction> {
        Box::new(CartesianFunction { split_tree: Arc::clone(&self.split_tree) })
    }

    fn operator_induces_self_loop(&self, op_id: usize) -> bool {
        self.ts.operator_induces_self_loop(op_id)
    }

    fn operator_is_active(&self, op_id: usize) -> bool {
        self.ts.operator_is_active(op_id)
    }

    fn split_variables(&self) -> Vec<usize> {
        self.split_tree.split_variables().to_vec()
    }

    fn for_each_transition(&self, callback: &mut dyn TransitionCallback) {
        self.ts.for_each_transition(&mut |transition| callback.apply(transition));
    }

    fn reachability_from_init(&self) -> &[bool] {
        self.ts.reachability_from_init(self.task_info.operator_costs())
    }

    fn compute_reachability_from_state_ocf(&self, ocf: &[Cost], state_id: usize) -> Vec<bool> {
        self.ts.compute_reachability_from_state_ocf(ocf, state_id)
    }

    fn compute_reachability_from_state_tcf(
        &self,
        tcf: &TransitionCostFunction,
        state_id: usize,
    ) -> Vec<bool> {
        self.ts.compute_reachability_from_state_tcf(tcf, state_id)
    }

    fn compute_reachability_to_state_ocf(&self, ocf: &[Cost], state_id: usize) -> Vec<bool> {
        self.ts.compute_reachability_to_state_ocf(ocf, state_id)
    }

    fn compute_reachability_to_state_tcf(
        &self,
        tcf: &TransitionCostFunction,
        state_id: usize,
    ) -> Vec<bool> {
        self.ts.compute_reachability_to_state_tcf(tcf, state_id)
    }

    fn goal_distances_nonnegative_ocf(&self, ocf: &[Cost]) -> Vec<Cost> {
        self.ts.goal_distances_nonnegative_ocf(ocf)
    }

    fn goal_distances_nonnegative_tcf(&self, tcf: &TransitionCostFunction) -> Vec<Cost> {
        self.ts.goal_distances_nonnegative_tcf(tcf)
    }

    fn compute_goal_distances_sdcf(
        &self,
        sdcf: &StateDependentCostFunction,
        tcf: &mut TransitionCostFunction,
    ) -> Vec<Cost> {
        self.ts.goal_distances_sdcf(self, sdcf, tcf)
    }

    fn state_bdd(&self, state_id: usize) -> Bdd {
        self.split_tree.state_bdd(state_id)
    }

    fn transition_bdd(&self, transition: &Transition) -> Bdd {
        self.split_tree.regress(transition)
    }

    fn transition_bdd_cached(&self, transition: &Transition) -> Bdd {
        if let Some(bdd) = self.transition_bdd_cache.read().get(&transition.transition_id) {
            return bdd.clone();
        }
        let bdd = self.split_tree.regress(transition);
        self.transition_bdd_cache.write().insert(transition.transition_id, bdd.clone());
        bdd
    }

    fn clear_caches(&self) {
        self.transition_bdd_cache.write().clear();
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
pub(crate) mod test_cartesian {
    use super::*;
    use crate::implementation::task::test_tasks::two_switches;
    use crate::implementation::Task;

    /// The Cartesian abstraction of `two_switches` that only distinguishes
    /// variable 0: states {v0=0} -> 0 and {v0=1} -> 1.
    pub fn var0_abstraction(task: &Task) -> CartesianAbstraction {
        let task_info = Arc::new(TaskInfo::new(task));
        let bdd_builder = Arc::new(BddBuilder::new(Arc::clone(&task_info)));
        let nodes = vec![
            SplitTreeNode::Split {
                var: 0,
                left_vals: vec![true, false],
                left: 1,
                right_vals: vec![false, true],
                right: 2,
            },
            SplitTreeNode::Leaf { state_id: 0 },
            SplitTreeNode::Leaf { state_id: 1 },
        ];
        CartesianAbstraction::new(
            task_info,
            bdd_builder,
            2,
            0,
            FxHashSet::from_iter([1]),
            &[(0, 0, 1)],
            vec![false, true],
            nodes,
        )
    }

    #[test]
    fn the_mapping_follows_the_split_tree() {
        let task = two_switches();
        let abstraction = var0_abstraction(&task);
        assert_eq!(0, abstraction.abstract_state_id(&State::new(vec![0, 0])));
        assert_eq!(0, abstraction.abstract_state_id(&State::new(vec![0, 1])));
        assert_eq!(1, abstraction.abstract_state_id(&State::new(vec![1, 0])));
        let function = abstraction.abstraction_function();
        assert_eq!(1, function.abstract_state_id(&State::new(vec![1, 1])));
    }

    #[test]
    fn goal_distances_and_saturation() {
        let task = two_switches();
        let abstraction = var0_abstraction(&task);
        let h = abstraction.compute_goal_distances_ocf(&[3, 4]);
        assert_eq!(vec![3, 0], h);
        let socf = abstraction.compute_saturated_costs_ocf(&h);
        // Operator 0 needs its full cost, operator 1 only loops.
        assert_eq!(vec![3, 0], socf);
    }

    #[test]
    fn state_bdds_cover_the_right_blocks() {
        let task = two_switches();
        let abstraction = var0_abstraction(&task);
        let task_info = Arc::new(TaskInfo::new(&task));
        let builder = BddBuilder::new(task_info);
        assert!(builder.same_set(&abstraction.state_bdd(0), builder.fact_bdd(0, 0)));
        assert!(builder.same_set(&abstraction.state_bdd(1), builder.fact_bdd(0, 1)));
    }

    #[test]
    fn transition_fingerprints_drop_precondition_variables() {
        let task = two_switches();
        let abstraction = var0_abstraction(&task);
        let transition = Transition::new(0, 0, 0, 1);
        // Operator 0 pins variable 0 by its precondition and variable 1 is
        // never split, so the regression set is the whole universe.
        let builder = BddBuilder::new(Arc::new(TaskInfo::new(&task)));
        assert!(builder.same_set(&abstraction.transition_bdd(&transition), &builder.one()));
        // The cached variant agrees.
        assert!(builder
            .same_set(&abstraction.transition_bdd_cached(&transition), &builder.one()));
    }
}
