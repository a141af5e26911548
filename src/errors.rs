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

//! This module defines the failure taxonomy of the crate. Recoverable
//! failures (task validation, LP trouble after the first successful query)
//! travel as `Result`s; the remaining classes are programming or resource
//! errors for which no caller can do anything useful, and they terminate
//! through the [`fatal`] abort path after logging their classification.

use thiserror::Error;

/// Every failure the crate can report, classified.
#[derive(Debug, Error)]
pub enum Error {
    /// The input task uses a construct the crate does not support, or is
    /// malformed (out-of-range facts, negative costs, empty domains).
    #[error("unsupported task: {0}")]
    UnsupportedTask(String),

    /// Finite cost arithmetic left the signed range reserved for finite
    /// values.
    #[error("arithmetic overflow: {0}")]
    Overflow(String),

    /// An internal invariant does not hold (saturated costs exceeding the
    /// remaining costs, a broken bucket partition, ...).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The LP backend reported an infeasible or unbounded program.
    #[error("LP failure: {0}")]
    LpFailure(String),

    /// A caller violated a documented precondition of a component; the
    /// message names the component.
    #[error("precondition violated: {0}")]
    Precondition(String),
}

/// Convenient shorthand used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The dedicated abort path for fatal error classes: the classification is
/// logged before the process (or test) is torn down.
pub(crate) fn fatal(error: Error) -> ! {
    log::error!("fatal: {}", error);
    panic!("{}", error);
}

#[cfg(test)]
mod test_errors {
    use super::*;

    #[test]
    fn messages_carry_the_classification() {
        let err = Error::UnsupportedTask("axioms".to_string());
        assert_eq!("unsupported task: axioms", format!("{}", err));
        let err = Error::Overflow("1 + 2147483646".to_string());
        assert_eq!("arithmetic overflow: 1 + 2147483646", format!("{}", err));
    }

    #[test]
    #[should_panic(expected = "invariant violation")]
    fn fatal_panics_with_the_classification() {
        fatal(Error::InvariantViolation("saturated > remaining".to_string()));
    }
}
