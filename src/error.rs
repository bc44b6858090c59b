use std::fmt::{self, Display};

use thiserror::Error;

/// The two passes of the simplex algorithm, reported when a pass runs out of iterations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  One,
  Two,
}

impl Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Phase::One => write!(f, "phase one"),
      Phase::Two => write!(f, "phase two"),
    }
  }
}

#[derive(Debug, Error, PartialEq)]
pub enum SolverError {
  /// The linear program is malformed, e.g. rows of the wrong length
  #[error("malformed linear program: {0}")]
  Configuration(String),
  #[error("no initial feasible solution found, the feasible region is empty")]
  EmptyFeasibleRegion,
  #[error("the problem is unbounded")]
  Unbounded,
  #[error("no solution found in {phase}, iterated {iterations} times")]
  MaxIterationsExceeded { phase: Phase, iterations: usize },
}

#[derive(Debug, Error, PartialEq)]
pub enum AllocationError {
  #[error("configuration error: {0}")]
  Configuration(String),
  #[error("unable to distribute load {load}: {source}")]
  Solver {
    load: f64,
    #[source]
    source: SolverError,
  },
  #[error("unable to distribute load: load={load}, allocated={allocated}")]
  LoadMismatch { load: f64, allocated: f64 },
}

#[derive(Debug, Error)]
pub enum InputError {
  #[error("unable to read file {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("unable to parse Json from file {path}: {source}")]
  Json {
    path: String,
    #[source]
    source: serde_json::Error,
  },
  #[error("unable to parse Toml from file {path}: {source}")]
  Toml {
    path: String,
    #[source]
    source: toml::de::Error,
  },
}

impl AllocationError {
  /// Failures caused by the request itself, as opposed to defects in the problem construction
  pub fn is_user_error(&self) -> bool {
    match self {
      AllocationError::Configuration(_) | AllocationError::LoadMismatch { .. } => true,
      AllocationError::Solver { source, .. } => matches!(source, SolverError::EmptyFeasibleRegion),
    }
  }
}
