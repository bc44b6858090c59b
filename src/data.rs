use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
  calculation::Allocation,
  error::{AllocationError, InputError},
  plant::{FuelPrices, PowerPlant},
  simplex::Solver,
};

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// The production plan request
#[derive(Debug, Deserialize)]
pub struct Payload {
  pub load: f64,
  pub fuels: FuelPrices,
  pub powerplants: Vec<PowerPlant>,
}

/// Solver and service settings, every key is optional
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
  pub max_iterations: usize,
  pub tolerance: f64,
  pub load_rel_tolerance: f64,
  pub load_abs_tolerance: f64,
  pub reject_invalid_efficiency: bool,
  pub log_level: String,
}

impl Default for Settings {
  fn default() -> Self {
    Settings {
      max_iterations: 10000,
      tolerance: 1e-9,
      load_rel_tolerance: 1e-9,
      load_abs_tolerance: 1e-6,
      reject_invalid_efficiency: false,
      log_level: DEFAULT_LOG_LEVEL.to_string(),
    }
  }
}

impl Settings {
  pub fn solver(&self) -> Solver {
    Solver::new().with_max_iterations(self.max_iterations).with_tolerance(self.tolerance)
  }
}

enum FileType {
  Json,
  Toml,
}

fn read_file_and_parse<T>(filename: &str, file_type: FileType) -> Result<T, InputError>
where
  T: serde::de::DeserializeOwned,
{
  let text =
    std::fs::read_to_string(filename).map_err(|source| InputError::Read { path: filename.to_string(), source })?;
  match file_type {
    FileType::Json => serde_json::from_str(&text).map_err(|source| InputError::Json { path: filename.to_string(), source }),
    FileType::Toml => toml::from_str(&text).map_err(|source| InputError::Toml { path: filename.to_string(), source }),
  }
}

pub fn read_payload(filename: &str) -> Result<Payload, InputError> {
  let payload: Payload = read_file_and_parse(filename, FileType::Json)?;
  debug!("Read load {} and {} power plants", payload.load, payload.powerplants.len());
  Ok(payload)
}

/// Settings from the toml file, or the defaults when there is none
pub fn read_settings(filename: Option<&str>) -> Result<Settings, InputError> {
  match filename {
    Some(filename) => read_file_and_parse(filename, FileType::Toml),
    None => Ok(Settings::default()),
  }
}

pub fn print_output(planning: &[Allocation]) -> serde_json::Result<()> {
  let json = serde_json::to_string_pretty(planning)?;
  println!("{}", json);
  Ok(())
}

/// The body returned to the caller on failure
#[derive(Debug, Serialize, PartialEq)]
pub struct ErrorBody {
  pub status_code: u16,
  pub error: String,
  pub description: String,
}

impl ErrorBody {
  fn bad_request(error: String) -> Self {
    ErrorBody { status_code: 400, error, description: "Bad Request".to_string() }
  }

  fn internal(error: String) -> Self {
    ErrorBody { status_code: 500, error, description: "Internal Server Error".to_string() }
  }
}

impl From<InputError> for ErrorBody {
  fn from(e: InputError) -> Self {
    ErrorBody::bad_request(e.to_string())
  }
}

impl From<AllocationError> for ErrorBody {
  fn from(e: AllocationError) -> Self {
    if e.is_user_error() {
      ErrorBody::bad_request(e.to_string())
    } else {
      ErrorBody::internal(e.to_string())
    }
  }
}

pub fn print_error(body: &ErrorBody) -> serde_json::Result<()> {
  let json = serde_json::to_string_pretty(body)?;
  println!("{}", json);
  Ok(())
}
