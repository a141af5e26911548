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

//! This module defines the [`OrderGenerator`] trait: the strategy that picks
//! the permutation in which the abstractions of a collection are saturated
//! for a given sample state.

use crate::abstraction::Abstraction;
use crate::common::{Cost, Order};

/// Produces abstraction orderings for the saturation pipeline. The generator
/// is initialized once with the full collection and then queried with the
/// abstract state ids of each sample.
pub trait OrderGenerator {
    /// Precomputes whatever static information the strategy needs.
    fn initialize(&mut self, abstractions: &[Box<dyn Abstraction>], costs: &[Cost]);

    /// Returns the order in which the abstractions should be saturated for
    /// the state identified by its abstract state ids.
    fn order_for_state(
        &mut self,
        abstractions: &[Box<dyn Abstraction>],
        costs: &[Cost],
        abstract_state_ids: &[usize],
        verbose: bool,
    ) -> Order;
}

/// The identity permutation over `num_abstractions` ids.
pub fn default_order(num_abstractions: usize) -> Order {
    (0..num_abstractions).collect()
}
