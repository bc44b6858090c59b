use log::debug;

use crate::plant::Plant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
  Minimize,
  Maximize,
}

/// A constraint row, `coefficients . x` compared to `rhs`
///
/// For inequalities a non negative `rhs` means "<=", a negative one means
/// ">=" with the absolute value as bound.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
  pub coefficients: Vec<f64>,
  pub rhs: f64,
}

impl Row {
  pub fn new(coefficients: Vec<f64>, rhs: f64) -> Self {
    Row { coefficients, rhs }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearProgram {
  pub objective: Vec<f64>,
  pub sense: Sense,
  pub inequalities: Vec<Row>,
  pub equalities: Vec<Row>,
}

impl LinearProgram {
  pub fn new(objective: Vec<f64>, sense: Sense) -> Self {
    LinearProgram { objective, sense, inequalities: Vec::new(), equalities: Vec::new() }
  }

  pub fn less_or_equal(mut self, coefficients: Vec<f64>, rhs: f64) -> Self {
    self.inequalities.push(Row::new(coefficients, rhs));
    self
  }

  /// Adds `coefficients . x >= bound`, encoded with a negated right hand side
  pub fn greater_or_equal(mut self, coefficients: Vec<f64>, bound: f64) -> Self {
    self.inequalities.push(Row::new(coefficients, -bound));
    self
  }

  pub fn equal(mut self, coefficients: Vec<f64>, rhs: f64) -> Self {
    self.equalities.push(Row::new(coefficients, rhs));
    self
  }

  pub fn num_variables(&self) -> usize {
    self.objective.len()
  }
}

/// The linear program for a load and the plants able to produce.
///
/// One decision variable per plant with a positive pmax, in input order. Each of them
/// gets a "<= pmax" row and, when pmin > 0, a ">= pmin" row. The sum of all of them
/// must be the load. Returns the program and, for every decision variable, the index
/// of its plant in `plants`.
pub fn build_problem(load: f64, plants: &[Plant]) -> (LinearProgram, Vec<usize>) {
  let eligible: Vec<usize> = plants.iter().enumerate().filter(|(_, p)| p.is_eligible()).map(|(i, _)| i).collect();
  let n = eligible.len();
  debug!("{} of {} plants can produce", n, plants.len());

  let objective = eligible.iter().map(|&i| plants[i].cost).collect();
  let mut program = LinearProgram::new(objective, Sense::Minimize);

  for (var, &i) in eligible.iter().enumerate() {
    let plant = &plants[i];
    let mut row = vec![0.0; n];
    row[var] = 1.0;
    program = program.less_or_equal(row.clone(), plant.pmax);
    if plant.pmin > 0.0 {
      program = program.greater_or_equal(row, plant.pmin);
    }
  }
  program = program.equal(vec![1.0; n], load);

  debug!(
    "Linear program with {} variables, {} inequalities, {} equalities",
    n,
    program.inequalities.len(),
    program.equalities.len()
  );
  (program, eligible)
}
