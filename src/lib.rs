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

//! # COSTSAT
//! Costsat computes admissible heuristics for classical planning by
//! *saturated cost partitioning*: several small abstractions of the task
//! each receive a slice of the operator costs, the slices never add up to
//! more than the real costs, and so the sum of the abstract goal distances
//! is a lower bound on the real plan cost. The delicate part is choosing the
//! slices. For every abstraction in turn, costsat computes the
//! pointwise-minimal cost function that preserves the abstraction's goal
//! distances (*saturation*) and passes the leftovers to the next
//! abstraction.
//!
//! The crate supports the state-dependent generalization of this scheme:
//! costs may be tracked per abstract *transition* rather than per operator,
//! against a shared, decision-diagram-backed map from concrete states to
//! remaining cost. Many orders of the abstractions are tried, and the
//! partitionings that improve some sampled state are kept; the final
//! heuristic is the maximum over the stored partitionings.
//!
//! ## Quick example
//! The following builds the heuristic for a toy task with two independent
//! switches and asks for the initial-state estimate.
//!
//! ```
//! use std::sync::Arc;
//! use costsat::*;
//!
//! // Two binary variables, one operator each, goal = both set.
//! let task = Task::new(
//!     vec![2, 2],
//!     vec![
//!         Operator::new(3, vec![Fact::new(0, 0)], vec![Fact::new(0, 1)]),
//!         Operator::new(4, vec![Fact::new(1, 0)], vec![Fact::new(1, 1)]),
//!     ],
//!     State::new(vec![0, 0]),
//!     vec![Fact::new(0, 1), Fact::new(1, 1)],
//! );
//! task.validate().unwrap();
//!
//! // The pipeline works on the scaled-cost task.
//! let scaled = task.with_scaled_costs(COST_FACTOR).unwrap();
//! let task_info = Arc::new(TaskInfo::new(&scaled));
//! let bdd_builder = Arc::new(BddBuilder::new(Arc::clone(&task_info)));
//!
//! // One projection per variable.
//! let abstractions: Vec<Box<dyn Abstraction>> = vec![
//!     Box::new(
//!         Projection::new(Arc::clone(&task_info), Arc::clone(&bdd_builder), vec![0]).unwrap(),
//!     ),
//!     Box::new(
//!         Projection::new(Arc::clone(&task_info), Arc::clone(&bdd_builder), vec![1]).unwrap(),
//!     ),
//! ];
//!
//! // Generate the collection of cost partitionings.
//! use rand::SeedableRng;
//! let mut sdcf = StateDependentCostFunction::new(
//!     Arc::clone(&task_info),
//!     Arc::clone(&bdd_builder),
//!     8,
//!     true,
//! );
//! let saturators: Vec<Box<dyn Saturator>> = vec![Box::new(CapSaturator::default())];
//! let mut generator = CostPartitioningCollectionGenerator::new(
//!     Box::new(GreedyOrderGenerator::new(ScoringFunction::MaxHeuristicPerStolenCosts)),
//!     CollectionConfig {
//!         max_orders: 8,
//!         num_samples: 10,
//!         max_time: std::time::Duration::from_millis(200),
//!         ..CollectionConfig::default()
//!     },
//!     rand::rngs::StdRng::seed_from_u64(0),
//! );
//! let cps = generator.generate(
//!     &scaled,
//!     &abstractions,
//!     &AbstractionMask::AlwaysStateDependent,
//!     &saturators,
//!     None,
//!     None,
//!     &mut sdcf,
//! );
//!
//! // The facade answers heuristic queries.
//! let mut heuristic = MaxCostPartitioningHeuristic::new(&abstractions, cps);
//! assert_eq!(Estimate::Value(7), heuristic.evaluate(&task.initial_state));
//! ```
//!
//! ## Getting a grasp on the codebase
//! The `abstraction` module holds the pluggable capability set
//! ([`Abstraction`], [`Saturator`], [`OrderGenerator`],
//! [`AbstractionGenerator`] and the mask policies); the `implementation`
//! module holds the concrete realizations. Start with the [`Abstraction`]
//! trait, then look at [`CapSaturator`] and
//! [`CostPartitioningCollectionGenerator`] for the pipeline itself.

mod common;
mod errors;
mod abstraction;
mod implementation;

pub use common::*;
pub use errors::*;
pub use abstraction::*;
pub use implementation::*;
