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

//! This module wraps the LP backend behind an owned row/column model. The
//! model keeps every variable bound and constraint itself, which is what
//! makes the bound-update API possible: mutating a bound only touches the
//! stored model, and the backend problem is rebuilt on the next solve. The
//! backend is a pure-Rust simplex implementation, called synchronously.

use minilp::{ComparisonOp, OptimizationDirection, Problem};

use crate::errors::{Error, Result};

/// The optimization direction of an LP.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LpSense {
    Minimize,
    Maximize,
}

/// One LP column: bounds and objective coefficient.
#[derive(Copy, Clone, Debug)]
pub struct LpVariable {
    pub lower: f64,
    pub upper: f64,
    pub objective: f64,
}

impl LpVariable {
    pub fn new(lower: f64, upper: f64, objective: f64) -> Self {
        LpVariable { lower, upper, objective }
    }
}

/// One LP row: `lower <= sum(coefficient * column) <= upper`.
#[derive(Clone, Debug, Default)]
pub struct LpConstraint {
    pub lower: f64,
    pub upper: f64,
    terms: Vec<(usize, f64)>,
}

impl LpConstraint {
    pub fn new(lower: f64, upper: f64) -> Self {
        LpConstraint { lower, upper, terms: vec![] }
    }

    /// Adds one term; columns must be inserted at most once.
    pub fn insert(&mut self, column: usize, coefficient: f64) {
        debug_assert!(self.terms.iter().all(|&(col, _)| col != column));
        self.terms.push((column, coefficient));
    }

    pub fn terms(&self) -> &[(usize, f64)] {
        &self.terms
    }
}

/// The solution of an LP: one value per column plus the objective value.
pub struct LpSolution {
    values: Vec<f64>,
    objective: f64,
}

impl LpSolution {
    pub fn value(&self, column: usize) -> f64 {
        self.values[column]
    }

    pub fn objective(&self) -> f64 {
        self.objective
    }
}

/// An owned linear program with a bound-update API.
pub struct LpProblem {
    sense: LpSense,
    variables: Vec<LpVariable>,
    constraints: Vec<LpConstraint>,
}

impl LpProblem {
    pub fn new(sense: LpSense) -> Self {
        LpProblem { sense, variables: vec![], constraints: vec![] }
    }

    /// The value used for unbounded variable bounds and one-sided rows.
    pub fn infinity() -> f64 {
        f64::INFINITY
    }

    /// Adds a column and returns its index.
    pub fn add_variable(&mut self, variable: LpVariable) -> usize {
        self.variables.push(variable);
        self.variables.len() - 1
    }

    /// Adds a row.
    pub fn add_constraint(&mut self, constraint: LpConstraint) {
        self.constraints.push(constraint);
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn set_objective_coefficient(&mut self, column: usize, coefficient: f64) {
        self.variables[column].objective = coefficient;
    }

    pub fn set_variable_lower_bound(&mut self, column: usize, lower: f64) {
        self.variables[column].lower = lower;
    }

    pub fn set_variable_upper_bound(&mut self, column: usize, upper: f64) {
        self.variables[column].upper = upper;
    }

    /// Loads the stored model into the backend and solves it. Infeasible and
    /// unbounded programs surface as [`Error::LpFailure`].
    pub fn solve(&self) -> Result<LpSolution> {
        let direction = match self.sense {
            LpSense::Minimize => OptimizationDirection::Minimize,
            LpSense::Maximize => OptimizationDirection::Maximize,
        };
        let mut problem = Problem::new(direction);
        let columns: Vec<minilp::Variable> = self
            .variables
            .iter()
            .map(|v| problem.add_var(v.objective, (v.lower, v.upper)))
            .collect();
        for constraint in &self.constraints {
            let expr: Vec<(minilp::Variable, f64)> = constraint
                .terms
                .iter()
                .map(|&(column, coefficient)| (columns[column], coefficient))
                .collect();
            if constraint.lower == constraint.upper {
                problem.add_constraint(expr.as_slice(), ComparisonOp::Eq, constraint.lower);
            } else {
                if constraint.lower.is_finite() {
                    problem.add_constraint(expr.as_slice(), ComparisonOp::Ge, constraint.lower);
                }
                if constraint.upper.is_finite() {
                    problem.add_constraint(expr.as_slice(), ComparisonOp::Le, constraint.upper);
                }
            }
        }
        let solution = problem
            .solve()
            .map_err(|error| Error::LpFailure(format!("{}", error)))?;
        let values = columns.iter().map(|&column| solution[column]).collect();
        Ok(LpSolution { values, objective: solution.objective() })
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_lp {
    use super::*;

    #[test]
    fn solves_a_small_minimization() {
        // min x + y s.t. x + y >= 2, x >= 0.5, y >= 0.
        let mut lp = LpProblem::new(LpSense::Minimize);
        let x = lp.add_variable(LpVariable::new(0.5, LpProblem::infinity(), 1.0));
        let y = lp.add_variable(LpVariable::new(0.0, LpProblem::infinity(), 1.0));
        let mut row = LpConstraint::new(2.0, LpProblem::infinity());
        row.insert(x, 1.0);
        row.insert(y, 1.0);
        lp.add_constraint(row);
        let solution = lp.solve().unwrap();
        assert!((solution.objective() - 2.0).abs() < 1e-6);
        assert!((solution.value(x) + solution.value(y) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn bound_updates_take_effect_on_resolve() {
        // max x s.t. x <= b, with b moved between solves.
        let mut lp = LpProblem::new(LpSense::Maximize);
        let x = lp.add_variable(LpVariable::new(0.0, 3.0, 1.0));
        let solution = lp.solve().unwrap();
        assert!((solution.value(x) - 3.0).abs() < 1e-6);
        lp.set_variable_upper_bound(x, 7.0);
        let solution = lp.solve().unwrap();
        assert!((solution.value(x) - 7.0).abs() < 1e-6);
    }

    #[test]
    fn infeasible_programs_are_reported() {
        let mut lp = LpProblem::new(LpSense::Minimize);
        let x = lp.add_variable(LpVariable::new(0.0, 1.0, 1.0));
        let mut row = LpConstraint::new(5.0, LpProblem::infinity());
        row.insert(x, 1.0);
        lp.add_constraint(row);
        assert!(matches!(lp.solve(), Err(Error::LpFailure(_))));
    }

    #[test]
    fn equality_rows_pin_their_expression() {
        // min y s.t. x = 2, y - x >= 1.
        let mut lp = LpProblem::new(LpSense::Minimize);
        let x = lp.add_variable(LpVariable::new(-LpProblem::infinity(), LpProblem::infinity(), 0.0));
        let y = lp.add_variable(LpVariable::new(-LpProblem::infinity(), LpProblem::infinity(), 1.0));
        let mut pin = LpConstraint::new(2.0, 2.0);
        pin.insert(x, 1.0);
        lp.add_constraint(pin);
        let mut row = LpConstraint::new(1.0, LpProblem::infinity());
        row.insert(y, 1.0);
        row.insert(x, -1.0);
        lp.add_constraint(row);
        let solution = lp.solve().unwrap();
        assert!((solution.value(y) - 3.0).abs() < 1e-6);
    }
}
