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

//! This module (and its submodules) provide the concrete realizations of the
//! capability set: the task model, the decision-diagram builder, the two
//! abstraction realizations, the cost-function representations, the
//! saturators, the order machinery and the pipeline that ties them into a
//! heuristic.

pub(crate) mod bdd;
pub(crate) mod cartesian;
pub(crate) mod collection;
pub(crate) mod cp;
pub(crate) mod diversifier;
pub(crate) mod explicit;
pub(crate) mod heuristic;
pub(crate) mod lp;
pub(crate) mod optimal;
pub(crate) mod orders;
pub(crate) mod projection;
pub(crate) mod sampler;
pub(crate) mod saturator_cap;
pub(crate) mod saturator_lp;
pub(crate) mod sdcf;
pub(crate) mod task;
pub(crate) mod tcf;

pub use bdd::*;
pub use cartesian::*;
pub use collection::*;
pub use cp::*;
pub use diversifier::*;
pub use explicit::*;
pub use heuristic::*;
pub use lp::*;
pub use optimal::*;
pub use orders::*;
pub use projection::*;
pub use sampler::*;
pub use saturator_cap::*;
pub use saturator_lp::*;
pub use sdcf::*;
pub use task::*;
pub use tcf::*;
