/// Implementation of the two phase simplex algorithm on a dense tableau
///
/// Phase one looks for a feasible basis by minimising the sum of the artificial
/// variables, phase two minimises the real objective starting from that basis.
/// Maximisation is done by minimising the negated objective.
use std::{
  collections::BTreeMap,
  fmt::{self, Display},
};

use log::{debug, warn};

use crate::{
  error::{Phase, SolverError},
  problem::{LinearProgram, Sense},
};

/// Rounds to one decimal, the precision of the production plan
pub fn round_to_tenth(value: f64) -> f64 {
  let rounded = (value * 10.0).round() / 10.0;
  // no negative zeroes in the output
  if rounded == 0.0 {
    0.0
  } else {
    rounded
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Variable {
  Decision(usize),
  Slack(usize),
}

impl Display for Variable {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Variable::Decision(i) => write!(f, "x_{}", i + 1),
      Variable::Slack(i) => write!(f, "s_{}", i + 1),
    }
  }
}

/// Values of the decision and slack variables in the optimal basis, rounded to one decimal
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
  values: BTreeMap<Variable, f64>,
  decisions: usize,
  /// Decision values as found in the tableau, before rounding
  exact_decisions: Vec<f64>,
  pub objective: f64,
}

impl Solution {
  /// Variables outside of the basis are zero
  pub fn value(&self, variable: Variable) -> f64 {
    self.values.get(&variable).copied().unwrap_or(0.0)
  }

  pub fn decision_values(&self) -> Vec<f64> {
    (0..self.decisions).map(|i| self.value(Variable::Decision(i))).collect()
  }

  /// Rounding each value on its own does not keep their sum, callers that
  /// need it start from these
  pub fn exact_decision_values(&self) -> &[f64] {
    &self.exact_decisions
  }
}

/// The augmented matrix, one row per constraint plus the objective row at the bottom.
///
/// Columns are the decision variables, one slack per inequality, the artificial
/// variables (only during phase one) and the right hand side as the last column.
/// The objective row holds `z_j - c_j`, its right hand side is the objective value.
#[derive(Debug, Clone, PartialEq)]
struct Tableau {
  data: Vec<f64>,
  width: usize,
  basis: Vec<usize>,
  decisions: usize,
  slacks: usize,
  artificials: usize,
}

impl Display for Tableau {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    writeln!(f, "Tableau {}x{}:", self.data.len() / self.width, self.width)?;
    for row in 0..=self.constraints() {
      if row < self.constraints() {
        write!(f, "{:>5} |", self.column_name(self.basis[row]))?;
      } else {
        write!(f, "{:>5} |", "z")?;
      }
      for col in 0..self.rhs_col() {
        write!(f, "{:.2}\t", self.get(row, col))?;
      }
      writeln!(f, "| {:.2}", self.get(row, self.rhs_col()))?;
    }
    Ok(())
  }
}

impl Tableau {
  /// Builds the constraint rows, with a slack per inequality and an artificial
  /// variable for every row where the slack can not start in the basis.
  /// The objective row is left empty.
  fn new(program: &LinearProgram) -> Result<Self, SolverError> {
    let n = program.num_variables();
    if program.objective.iter().any(|c| !c.is_finite()) {
      return Err(SolverError::Configuration("objective has non finite coefficients".to_string()));
    }
    for (kind, rows) in [("inequality", &program.inequalities), ("equality", &program.equalities)] {
      for (i, row) in rows.iter().enumerate() {
        if row.coefficients.len() != n {
          return Err(SolverError::Configuration(format!(
            "{kind} {i} has {} coefficients, expected {n}",
            row.coefficients.len()
          )));
        }
        if !row.rhs.is_finite() || row.coefficients.iter().any(|c| !c.is_finite()) {
          return Err(SolverError::Configuration(format!("{kind} {i} has non finite values")));
        }
      }
    }

    let slacks = program.inequalities.len();
    let m = slacks + program.equalities.len();

    // rows without the artificial columns: decisions, slacks, rhs
    let mut rows: Vec<Vec<f64>> = Vec::with_capacity(m);
    for (i, row) in program.inequalities.iter().enumerate() {
      // a negative rhs stands for ">=": the slack is subtracted
      let sign = if row.rhs < 0.0 { -1.0 } else { 1.0 };
      let mut equation = vec![0.0; n + slacks + 1];
      equation[..n].copy_from_slice(&row.coefficients);
      equation[n + i] = sign;
      equation[n + slacks] = sign * row.rhs;
      rows.push(equation);
    }
    for row in &program.equalities {
      let sign = if row.rhs < 0.0 { -1.0 } else { 1.0 };
      let mut equation: Vec<f64> = row.coefficients.iter().map(|c| sign * c).collect();
      equation.resize(n + slacks, 0.0);
      equation.push(sign * row.rhs);
      rows.push(equation);
    }

    // the slack of row i is the candidate basic variable of row i, equalities have none
    let conforming: Vec<bool> = (0..m)
      .map(|i| {
        i < slacks
          && rows.iter().enumerate().all(|(r, equation)| {
            let unit = if r == i { 1.0 } else { 0.0 };
            equation[n + i] == unit
          })
      })
      .collect();
    let artificials = conforming.iter().filter(|c| !**c).count();
    debug!("{} rows, {} need an artificial variable", m, artificials);

    let width = n + slacks + artificials + 1;
    let mut data = Vec::with_capacity((m + 1) * width);
    let mut basis = Vec::with_capacity(m);
    let mut artificial = n + slacks;
    for (i, equation) in rows.iter().enumerate() {
      let rhs = equation[n + slacks];
      data.extend_from_slice(&equation[..n + slacks]);
      let mut extra = vec![0.0; artificials];
      if conforming[i] {
        basis.push(n + i);
      } else {
        extra[artificial - n - slacks] = 1.0;
        basis.push(artificial);
        artificial += 1;
      }
      data.extend_from_slice(&extra);
      data.push(rhs);
    }
    data.extend(std::iter::repeat(0.0).take(width));

    Ok(Tableau { data, width, basis, decisions: n, slacks, artificials })
  }

  fn get(&self, row: usize, col: usize) -> f64 {
    self.data[row * self.width + col]
  }

  fn set(&mut self, row: usize, col: usize, val: f64) {
    self.data[row * self.width + col] = val;
  }

  fn constraints(&self) -> usize {
    self.basis.len()
  }

  fn objective_row(&self) -> usize {
    self.basis.len()
  }

  fn rhs_col(&self) -> usize {
    self.width - 1
  }

  fn first_artificial(&self) -> usize {
    self.decisions + self.slacks
  }

  fn column_name(&self, col: usize) -> String {
    if col < self.decisions {
      Variable::Decision(col).to_string()
    } else if col < self.first_artificial() {
      Variable::Slack(col - self.decisions).to_string()
    } else {
      format!("a_{}", col - self.first_artificial() + 1)
    }
  }

  /// row `to` += factor * row `from`
  fn add_row(&mut self, from: usize, to: usize, factor: f64) {
    for col in 0..self.width {
      self.set(to, col, self.get(to, col) + factor * self.get(from, col));
    }
  }

  fn pivot(&mut self, pivot_row: usize, pivot_col: usize) {
    debug!("Pivoting on ({pivot_row}, {pivot_col}), {} enters the basis", self.column_name(pivot_col));
    let pivot_val = self.get(pivot_row, pivot_col);

    // we need to make the pivot value 1, we divide the row by the pivot value
    for col in 0..self.width {
      self.set(pivot_row, col, self.get(pivot_row, col) / pivot_val);
    }
    // now we need to make the other values in the column 0, objective row included
    for row in 0..=self.constraints() {
      if row != pivot_row {
        let ratio = self.get(row, pivot_col);
        if ratio != 0.0 {
          self.add_row(pivot_row, row, -ratio);
        }
      }
    }
    self.basis[pivot_row] = pivot_col;
  }

  fn remove_row(&mut self, row: usize) {
    self.data.drain(row * self.width..(row + 1) * self.width);
    self.basis.remove(row);
  }

  /// Drops the artificial columns, none of them may be in the basis anymore
  fn remove_artificials(&mut self) {
    let keep = self.first_artificial();
    let width = keep + 1;
    let mut data = Vec::with_capacity((self.constraints() + 1) * width);
    for row in 0..=self.constraints() {
      let start = row * self.width;
      data.extend_from_slice(&self.data[start..start + keep]);
      data.push(self.get(row, self.rhs_col()));
    }
    self.data = data;
    self.width = width;
    self.artificials = 0;
  }

  /// Replaces the objective row with `-costs` and brings it in canonical form,
  /// i.e. zero on the columns of the basic variables
  fn set_objective(&mut self, costs: &[f64]) {
    let obj = self.objective_row();
    for col in 0..self.width {
      self.set(obj, col, 0.0);
    }
    for (col, cost) in costs.iter().enumerate() {
      self.set(obj, col, -cost);
    }
    for row in 0..self.constraints() {
      let factor = self.get(obj, self.basis[row]);
      if factor != 0.0 {
        self.add_row(row, obj, -factor);
      }
    }
  }

  fn solution(&self) -> Solution {
    let rhs = self.rhs_col();
    let mut values = BTreeMap::new();
    let mut exact_decisions = Vec::with_capacity(self.decisions);
    for col in 0..self.first_artificial() {
      let value = self.basis.iter().position(|&b| b == col).map_or(0.0, |row| self.get(row, rhs));
      let variable = if col < self.decisions {
        exact_decisions.push(value);
        Variable::Decision(col)
      } else {
        Variable::Slack(col - self.decisions)
      };
      values.insert(variable, round_to_tenth(value));
    }
    Solution {
      values,
      decisions: self.decisions,
      exact_decisions,
      objective: round_to_tenth(self.get(self.objective_row(), rhs)),
    }
  }
}

/// Simplex solver, always minimising internally
#[derive(Debug, Clone)]
pub struct Solver {
  /// Maximum pivots per phase, the pivot rules do not prevent cycling
  max_iterations: usize,
  /// Values closer to zero than this are treated as zero when choosing pivots
  tolerance: f64,
}

impl Default for Solver {
  fn default() -> Self {
    Solver { max_iterations: 10000, tolerance: 1e-9 }
  }
}

impl Solver {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_max_iterations(mut self, max: usize) -> Self {
    self.max_iterations = max;
    self
  }

  pub fn with_tolerance(mut self, tolerance: f64) -> Self {
    self.tolerance = tolerance;
    self
  }

  pub fn solve(&self, program: &LinearProgram) -> Result<Solution, SolverError> {
    let mut tableau = Tableau::new(program)?;
    let costs: Vec<f64> = match program.sense {
      Sense::Minimize => program.objective.clone(),
      Sense::Maximize => program.objective.iter().map(|c| -c).collect(),
    };

    if tableau.artificials > 0 {
      debug!("Phase one with {} artificial variables", tableau.artificials);
      self.phase_one(&mut tableau)?;
    } else {
      debug!("The slack variables are a feasible basis, skipping phase one");
    }

    debug!("Switching to phase two");
    tableau.set_objective(&costs);
    self.optimise(&mut tableau, Phase::Two)?;

    let mut solution = tableau.solution();
    if program.sense == Sense::Maximize {
      solution.objective = -solution.objective;
    }
    debug!("The solution is: {:?}, objective {}", solution.values, solution.objective);
    Ok(solution)
  }

  fn phase_one(&self, tableau: &mut Tableau) -> Result<(), SolverError> {
    let obj = tableau.objective_row();
    let first_artificial = tableau.first_artificial();
    // minimise the sum of the artificial variables
    for col in first_artificial..tableau.rhs_col() {
      tableau.set(obj, col, -1.0);
    }
    for row in 0..tableau.constraints() {
      if tableau.basis[row] >= first_artificial {
        tableau.add_row(row, obj, 1.0);
      }
    }

    match self.optimise(tableau, Phase::One) {
      // the sum of artificials is bounded by zero, this means no feasible point
      Err(SolverError::Unbounded) => return Err(SolverError::EmptyFeasibleRegion),
      result => result?,
    }

    let rhs = tableau.rhs_col();
    if tableau.get(obj, rhs).abs() > self.tolerance {
      debug!("Sum of artificial variables is {}", tableau.get(obj, rhs));
      return Err(SolverError::EmptyFeasibleRegion);
    }
    let stuck = (0..tableau.constraints())
      .any(|row| tableau.basis[row] >= first_artificial && tableau.get(row, rhs).abs() > self.tolerance);
    if stuck {
      return Err(SolverError::EmptyFeasibleRegion);
    }

    self.drive_out_artificials(tableau);
    tableau.remove_artificials();
    Ok(())
  }

  /// Artificial variables left in the basis are zero. Each one is replaced by the
  /// non basic real variable with the largest coefficient in its row; if there is
  /// no such variable the row is a combination of the others and gets removed.
  fn drive_out_artificials(&self, tableau: &mut Tableau) {
    let first_artificial = tableau.first_artificial();
    let mut redundant = Vec::new();
    for row in 0..tableau.constraints() {
      if tableau.basis[row] < first_artificial {
        continue;
      }
      // a tiny pivot element would blow up the whole row
      let entering = (0..first_artificial)
        .filter(|&col| !tableau.basis.contains(&col) && tableau.get(row, col).abs() > self.tolerance)
        .fold(None, |best: Option<usize>, col| match best {
          Some(b) if tableau.get(row, b).abs() >= tableau.get(row, col).abs() => Some(b),
          _ => Some(col),
        });
      match entering {
        Some(col) => tableau.pivot(row, col),
        None => redundant.push(row),
      }
    }
    for row in redundant.into_iter().rev() {
      warn!("Constraint row {row} is redundant, removing it");
      tableau.remove_row(row);
    }
  }

  /// Most positive coefficient in the objective row, first one on ties
  fn entering_column(&self, tableau: &Tableau) -> Option<usize> {
    let obj = tableau.objective_row();
    let mut found: Option<(usize, f64)> = None;
    for col in 0..tableau.rhs_col() {
      let x = tableau.get(obj, col);
      if x > self.tolerance {
        found = match found {
          Some((_, val)) if x > val => Some((col, x)),
          None => Some((col, x)),
          _ => found,
        };
      }
    }
    found.map(|(col, _)| col)
  }

  /// Minimum ratio test, first row on ties. None means the column is unbounded.
  fn leaving_row(&self, tableau: &Tableau, col: usize) -> Option<usize> {
    let rhs = tableau.rhs_col();
    let mut min_ratio = None;
    let mut pivot = None;
    for row in 0..tableau.constraints() {
      let a = tableau.get(row, col);
      // pivot must be positive
      if a > self.tolerance {
        let ratio = tableau.get(row, rhs) / a;
        match min_ratio {
          Some(val) if ratio >= val => (),
          _ => {
            min_ratio = Some(ratio);
            pivot = Some(row);
          }
        }
      }
    }
    pivot
  }

  fn optimise(&self, tableau: &mut Tableau, phase: Phase) -> Result<(), SolverError> {
    debug!("{tableau}");
    let mut iterations = 0;
    loop {
      let Some(col) = self.entering_column(tableau) else {
        debug!("Optimum of {phase} found after {iterations} iterations");
        return Ok(());
      };
      if iterations == self.max_iterations {
        return Err(SolverError::MaxIterationsExceeded { phase, iterations });
      }
      let Some(row) = self.leaving_row(tableau, col) else {
        return Err(SolverError::Unbounded);
      };
      tableau.pivot(row, col);
      debug!("{tableau}");
      iterations += 1;
    }
  }
}
