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

//! This module wraps the decision-diagram library behind the one interface
//! the rest of the crate consumes. Every planning variable is encoded with
//! `ceil(log2(domain))` binary DD variables; the builder precomputes the
//! characteristic function of each fact and of each operator precondition,
//! and assembles the composite state sets the bucketed cost function needs.

use std::sync::Arc;

use biodivine_lib_bdd::{Bdd, BddVariable, BddVariableSet};

use crate::abstraction::Abstraction;
use crate::common::{Cost, Fact, Transition, INFINITY};
use crate::errors::{fatal, Error};
use crate::implementation::TaskInfo;

/// The number of binary DD variables needed to encode a domain.
fn bits_for_domain(domain_size: usize) -> usize {
    if domain_size <= 1 {
        0
    } else {
        (usize::BITS - (domain_size - 1).leading_zeros()) as usize
    }
}

/// Builds and owns all decision diagrams of one cost-partitioning run.
pub struct BddBuilder {
    task_info: Arc<TaskInfo>,
    variables: BddVariableSet,
    /// All binary DD variables, in encoding order.
    bdd_vars: Vec<BddVariable>,
    /// The characteristic function of each fact.
    var_val_bdds: Vec<Vec<Bdd>>,
    /// The set of concrete states in which each operator is applicable.
    preconditions: Vec<Bdd>,
}

impl BddBuilder {
    pub fn new(task_info: Arc<TaskInfo>) -> Self {
        let num_variables = task_info.num_variables();
        let total_bits: usize =
            (0..num_variables).map(|var| bits_for_domain(task_info.domain_size(var))).sum();
        if total_bits > u16::MAX as usize {
            fatal(Error::UnsupportedTask(format!(
                "task needs {} binary DD variables",
                total_bits
            )));
        }
        let variables = BddVariableSet::new_anonymous(total_bits as u16);
        let bdd_vars = variables.variables();

        // The characteristic function of every fact, one variable at a time.
        let mut var_val_bdds = Vec::with_capacity(num_variables);
        let mut offset = 0;
        for var in 0..num_variables {
            let domain_size = task_info.domain_size(var);
            let bits = bits_for_domain(domain_size);
            let mut val_bdds = Vec::with_capacity(domain_size);
            for value in 0..domain_size {
                val_bdds.push(encode_value(&variables, &bdd_vars[offset..offset + bits], value));
            }
            // The spare binary codes are dead weight; fold them into the
            // last value so that the per-variable sets cover the full cube.
            for spare in domain_size..(1usize << bits) {
                let cube = encode_value(&variables, &bdd_vars[offset..offset + bits], spare);
                let last = val_bdds.len() - 1;
                val_bdds[last] = val_bdds[last].or(&cube);
            }
            var_val_bdds.push(val_bdds);
            offset += bits;
        }

        // The applicability set of every operator.
        let mut preconditions = Vec::with_capacity(task_info.num_operators());
        for op_id in 0..task_info.num_operators() {
            let mut result = variables.mk_true();
            for var in 0..num_variables {
                if let Some(pre) = task_info.precondition_value(op_id, var) {
                    result = result.and(&var_val_bdds[var][pre]);
                }
            }
            preconditions.push(result);
        }

        BddBuilder { task_info, variables, bdd_vars, var_val_bdds, preconditions }
    }

    /// The constant-true diagram (the universe of concrete states).
    pub fn one(&self) -> Bdd {
        self.variables.mk_true()
    }

    /// The constant-false diagram (the empty state set).
    pub fn zero(&self) -> Bdd {
        self.variables.mk_false()
    }

    /// The characteristic function of one fact.
    pub fn fact_bdd(&self, var: usize, value: usize) -> &Bdd {
        &self.var_val_bdds[var][value]
    }

    /// The characteristic function of a per-variable value subset.
    pub fn value_set_bdd(&self, var: usize, values: &[bool]) -> Bdd {
        debug_assert_eq!(self.task_info.domain_size(var), values.len());
        let mut result = self.zero();
        for (value, selected) in values.iter().enumerate() {
            if *selected {
                result = result.or(&self.var_val_bdds[var][value]);
            }
        }
        result
    }

    /// The characteristic function of a partial assignment.
    pub fn state_bdd(&self, facts: &[Fact]) -> Bdd {
        let mut result = self.one();
        for fact in facts {
            result = result.and(&self.var_val_bdds[fact.var][fact.value]);
        }
        result
    }

    /// Like [`state_bdd`], but with the variables constrained by the
    /// operator's precondition projected away: the precondition already pins
    /// them, so the regression set must not.
    ///
    /// [`state_bdd`]: BddBuilder::state_bdd
    pub fn state_bdd_for_operator(&self, facts: &[Fact], op_id: usize) -> Bdd {
        let mut result = self.one();
        for fact in facts {
            if self.task_info.operator_has_precondition(op_id, fact.var) {
                continue;
            }
            result = result.and(&self.var_val_bdds[fact.var][fact.value]);
        }
        result
    }

    /// The set of concrete states in which the operator is applicable.
    pub fn precondition_bdd(&self, op_id: usize) -> &Bdd {
        &self.preconditions[op_id]
    }

    /// True iff the operator is applicable in at least one state of the set.
    pub fn is_applicable(&self, context: &Bdd, op_id: usize) -> bool {
        self.intersect(context, &self.preconditions[op_id])
    }

    /// True iff the two state sets share a state.
    pub fn intersect(&self, l: &Bdd, r: &Bdd) -> bool {
        !l.and(r).is_false()
    }

    /// True iff the two state sets are equal.
    pub fn same_set(&self, l: &Bdd, r: &Bdd) -> bool {
        l.xor(r).is_false()
    }

    /// For every useful operator, the set of concrete states from which the
    /// operator leads into a state with an infinite estimate, combined with
    /// the states that are themselves mapped to infinite-estimate abstract
    /// states. These are the states whose remaining costs the bucketed cost
    /// function moves to `INFINITY` after a saturator propagated negative
    /// infinity.
    pub fn negative_infinity_bdds(
        &self,
        abstraction: &dyn Abstraction,
        h_values: &[Cost],
        useless_operators: &[bool],
    ) -> Vec<Bdd> {
        let num_operators = self.task_info.num_operators();

        let mut unreachable_bdd = self.zero();
        for (state_id, &h) in h_values.iter().enumerate().take(abstraction.num_states()) {
            if h == INFINITY || h == -INFINITY {
                unreachable_bdd = unreachable_bdd.or(&abstraction.state_bdd(state_id));
            }
        }

        /* Transitions that enter an infinite-estimate state: if the target
        is a dead end, its cost share was never subtracted, so the whole
        regression set moves to the INFINITY bucket. */
        let mut unreachable_bdds = vec![self.zero(); num_operators];
        abstraction.for_each_transition(&mut |transition: Transition| {
            if useless_operators[transition.op_id] {
                return;
            }
            let source_h = h_values[transition.source_id];
            let target_h = h_values[transition.target_id];
            if (target_h == INFINITY || target_h == -INFINITY)
                && source_h != INFINITY
                && source_h != -INFINITY
            {
                unreachable_bdds[transition.op_id] = unreachable_bdds[transition.op_id]
                    .or(&abstraction.transition_bdd(&transition));
            }
        });

        for (op_id, bdd) in unreachable_bdds.iter_mut().enumerate() {
            if useless_operators[op_id] {
                continue;
            }
            *bdd = bdd.or(&unreachable_bdd);
        }
        unreachable_bdds
    }

    /// The number of binary DD variables in use.
    pub fn num_bdd_variables(&self) -> usize {
        self.bdd_vars.len()
    }
}

/// The cube of the binary encoding of `value` over the given DD variables;
/// bit `i` of the value is carried by the `i`-th variable.
fn encode_value(variables: &BddVariableSet, bits: &[BddVariable], value: usize) -> Bdd {
    let mut result = variables.mk_true();
    for (i, &bit_var) in bits.iter().enumerate() {
        result = result.and(&variables.mk_literal(bit_var, (value >> i) & 1 == 1));
    }
    result
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_bdd_builder {
    use super::*;
    use crate::common::State;
    use crate::implementation::task::test_tasks::two_switches;
    use crate::implementation::{Task, TaskInfo};
    use crate::common::Fact;
    use crate::implementation::task::Operator;

    fn builder(task: &Task) -> BddBuilder {
        BddBuilder::new(Arc::new(TaskInfo::new(task)))
    }

    #[test]
    fn domains_use_the_minimal_number_of_bits() {
        assert_eq!(0, bits_for_domain(1));
        assert_eq!(1, bits_for_domain(2));
        assert_eq!(2, bits_for_domain(3));
        assert_eq!(2, bits_for_domain(4));
        assert_eq!(3, bits_for_domain(5));
    }

    #[test]
    fn fact_bdds_partition_each_domain() {
        let task = Task::new(
            vec![3, 2],
            vec![Operator::new(1, vec![], vec![Fact::new(0, 1)])],
            State::new(vec![0, 0]),
            vec![Fact::new(0, 1)],
        );
        let b = builder(&task);
        // Values of a variable are pairwise disjoint and cover everything.
        let mut union = b.zero();
        for value in 0..3 {
            for other in value + 1..3 {
                assert!(!b.intersect(b.fact_bdd(0, value), b.fact_bdd(0, other)));
            }
            union = union.or(b.fact_bdd(0, value));
        }
        assert!(b.same_set(&union, &b.one()));
    }

    #[test]
    fn preconditions_capture_applicability() {
        let task = two_switches();
        let b = builder(&task);
        // Operator 0 requires variable 0 to be 0.
        assert!(b.same_set(b.precondition_bdd(0), b.fact_bdd(0, 0)));
        // A state set at value 1 does not intersect it.
        assert!(!b.is_applicable(b.fact_bdd(0, 1), 0));
        assert!(b.is_applicable(&b.one(), 0));
    }

    #[test]
    fn state_bdd_for_operator_drops_precondition_variables() {
        let task = two_switches();
        let b = builder(&task);
        let facts = vec![Fact::new(0, 0), Fact::new(1, 1)];
        // Operator 0 has a precondition on variable 0, so only the fact on
        // variable 1 survives.
        let restricted = b.state_bdd_for_operator(&facts, 0);
        assert!(b.same_set(&restricted, b.fact_bdd(1, 1)));
        let full = b.state_bdd(&facts);
        assert!(b.same_set(&full, &b.fact_bdd(0, 0).and(b.fact_bdd(1, 1))));
    }
}
