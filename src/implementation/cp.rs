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

//! This module provides the stored form of one cost partitioning: per
//! abstraction, the goal distances it contributed, kept only when they are
//! not identically zero. Evaluation is a sum of table lookups under left
//! addition, floored at zero.

use crate::common::{left_addition, Cost, INFINITY};

/// The h-values one abstraction contributes to a cost partitioning.
#[derive(Clone, Debug)]
struct LookupTable {
    abstraction_id: usize,
    h_values: Vec<Cost>,
}

/// One cost-partitioning heuristic: an ordered list of lookup tables.
#[derive(Clone, Debug, Default)]
pub struct CostPartitioningHeuristic {
    lookup_tables: Vec<LookupTable>,
}

impl CostPartitioningHeuristic {
    fn lookup_table_index(&self, abstraction_id: usize) -> Option<usize> {
        self.lookup_tables.iter().position(|table| table.abstraction_id == abstraction_id)
    }

    /// Stores the h-values of one abstraction. All-zero tables contribute
    /// nothing and are dropped; a second table for the same abstraction is
    /// merged entrywise with left addition.
    pub fn add_h_values(&mut self, abstraction_id: usize, h_values: Vec<Cost>) {
        if h_values.iter().all(|&h| h == 0) {
            return;
        }
        match self.lookup_table_index(abstraction_id) {
            None => self.lookup_tables.push(LookupTable { abstraction_id, h_values }),
            Some(index) => {
                let old_h_values = &mut self.lookup_tables[index].h_values;
                assert_eq!(old_h_values.len(), h_values.len());
                for (old, new) in old_h_values.iter_mut().zip(h_values) {
                    *old = left_addition(*old, new);
                }
            }
        }
    }

    /// Merges another cost partitioning into this one.
    pub fn add(&mut self, other: CostPartitioningHeuristic) {
        for table in other.lookup_tables {
            self.add_h_values(table.abstraction_id, table.h_values);
        }
    }

    /// The heuristic value for a state given by its abstract state ids:
    /// left-addition across the tables, short-circuiting on either infinity,
    /// floored at zero.
    pub fn compute_heuristic(&self, abstract_state_ids: &[usize]) -> Cost {
        let mut sum_h = 0;
        for table in &self.lookup_tables {
            let state_id = abstract_state_ids[table.abstraction_id];
            let h = table.h_values[state_id];
            if h == -INFINITY || h == INFINITY {
                return h;
            }
            sum_h += h;
        }
        sum_h.max(0)
    }

    pub fn num_lookup_tables(&self) -> usize {
        self.lookup_tables.len()
    }

    pub fn num_heuristic_values(&self) -> usize {
        self.lookup_tables.iter().map(|table| table.h_values.len()).sum()
    }

    /// Marks the abstractions whose tables this heuristic stores.
    pub fn mark_useful_abstractions(&self, useful_abstractions: &mut [bool]) {
        for table in &self.lookup_tables {
            useful_abstractions[table.abstraction_id] = true;
        }
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_cp_heuristic {
    use super::*;

    #[test]
    fn all_zero_tables_are_dropped() {
        let mut cp = CostPartitioningHeuristic::default();
        cp.add_h_values(0, vec![0, 0, 0]);
        assert_eq!(0, cp.num_lookup_tables());
        cp.add_h_values(1, vec![0, 2]);
        assert_eq!(1, cp.num_lookup_tables());
        assert_eq!(2, cp.num_heuristic_values());
    }

    #[test]
    fn evaluation_sums_and_floors() {
        let mut cp = CostPartitioningHeuristic::default();
        cp.add_h_values(0, vec![3, -5]);
        cp.add_h_values(1, vec![1, 2]);
        assert_eq!(4, cp.compute_heuristic(&[0, 0]));
        // -5 + 2 = -3 floors at 0.
        assert_eq!(0, cp.compute_heuristic(&[1, 1]));
    }

    #[test]
    fn infinities_short_circuit() {
        let mut cp = CostPartitioningHeuristic::default();
        cp.add_h_values(0, vec![INFINITY, -INFINITY]);
        cp.add_h_values(1, vec![5, 5]);
        assert_eq!(INFINITY, cp.compute_heuristic(&[0, 0]));
        assert_eq!(-INFINITY, cp.compute_heuristic(&[1, 0]));
    }

    #[test]
    fn merging_tables_uses_left_addition() {
        let mut cp = CostPartitioningHeuristic::default();
        cp.add_h_values(0, vec![3, INFINITY]);
        cp.add_h_values(0, vec![2, -INFINITY]);
        assert_eq!(1, cp.num_lookup_tables());
        assert_eq!(5, cp.compute_heuristic(&[0]));
        // INFINITY absorbs on the left.
        assert_eq!(INFINITY, cp.compute_heuristic(&[1]));
    }

    #[test]
    fn useful_abstractions_are_marked() {
        let mut cp = CostPartitioningHeuristic::default();
        cp.add_h_values(2, vec![1]);
        let mut useful = vec![false; 4];
        cp.mark_useful_abstractions(&mut useful);
        assert_eq!(vec![false, false, true, false], useful);
    }
}
