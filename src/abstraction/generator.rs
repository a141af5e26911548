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

//! This module defines the protocol under which external collaborators hand
//! abstractions to the crate. The core assumes neither uniqueness nor any
//! specific ordering of the generated abstractions.

use std::sync::Arc;

use crate::abstraction::Abstraction;
use crate::errors::Result;
use crate::implementation::{BddBuilder, Task, TaskInfo};

/// An external source of abstractions (a CEGAR loop, a pattern collection,
/// a hand-written test fixture).
pub trait AbstractionGenerator {
    fn generate(
        &self,
        task: &Task,
        task_info: &Arc<TaskInfo>,
        bdd_builder: &Arc<BddBuilder>,
    ) -> Result<Vec<Box<dyn Abstraction>>>;
}

/// Runs every generator in turn and concatenates the results.
pub fn generate_abstractions(
    task: &Task,
    task_info: &Arc<TaskInfo>,
    bdd_builder: &Arc<BddBuilder>,
    generators: &[Box<dyn AbstractionGenerator>],
) -> Result<Vec<Box<dyn Abstraction>>> {
    let mut abstractions = vec![];
    let mut per_generator = vec![];
    for generator in generators {
        let before = abstractions.len();
        abstractions.extend(generator.generate(task, task_info, bdd_builder)?);
        per_generator.push(abstractions.len() - before);
    }
    log::info!(
        "abstractions: {} (per generator: {:?})",
        abstractions.len(),
        per_generator
    );
    Ok(abstractions)
}
