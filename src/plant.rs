use std::{
  collections::HashMap,
  fmt::{self, Display},
  str::FromStr,
};

use log::{debug, warn};
use serde::Deserialize;

use crate::{error::AllocationError, simplex::round_to_tenth};

/// Cost given to a plant that can not produce anything, it will never be picked by the solver
pub const EXCLUDED_PLANT_COST: f64 = 1e10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlantType {
  GasFired,
  TurboJet,
  WindTurbine,
}

impl PlantType {
  /// The key in the fuel table holding the price (or the availability for wind) for this type
  pub fn fuel_key(self) -> &'static str {
    match self {
      PlantType::GasFired => "gas(euro/MWh)",
      PlantType::TurboJet => "kerosine(euro/MWh)",
      PlantType::WindTurbine => "wind(%)",
    }
  }
}

impl FromStr for PlantType {
  type Err = AllocationError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "gasfired" => Ok(PlantType::GasFired),
      "turbojet" => Ok(PlantType::TurboJet),
      "windturbine" => Ok(PlantType::WindTurbine),
      other => Err(AllocationError::Configuration(format!("unknown plant type \"{other}\""))),
    }
  }
}

impl Display for PlantType {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let name = match self {
      PlantType::GasFired => "gasfired",
      PlantType::TurboJet => "turbojet",
      PlantType::WindTurbine => "windturbine",
    };
    write!(f, "{name}")
  }
}

/// Fuel prices in euro/MWh, co2 in euro/ton and the wind availability in percent
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct FuelPrices(HashMap<String, f64>);

impl FuelPrices {
  pub fn for_type(&self, plant_type: PlantType) -> Result<f64, AllocationError> {
    let key = plant_type.fuel_key();
    match self.0.get(key) {
      Some(value) if value.is_finite() => Ok(*value),
      Some(value) => Err(AllocationError::Configuration(format!("fuel \"{key}\" has invalid value {value}"))),
      None => Err(AllocationError::Configuration(format!("no fuel \"{key}\" for {plant_type} plants"))),
    }
  }
}

impl<'a> FromIterator<(&'a str, f64)> for FuelPrices {
  fn from_iter<I: IntoIterator<Item = (&'a str, f64)>>(iter: I) -> Self {
    FuelPrices(iter.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
  }
}

fn default_efficiency() -> f64 {
  1.0
}

/// A power plant as described in the request
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PowerPlant {
  pub name: String,
  #[serde(rename = "type")]
  pub kind: String,
  #[serde(default = "default_efficiency")]
  pub efficiency: f64,
  #[serde(default)]
  pub pmin: f64,
  #[serde(default)]
  pub pmax: f64,
}

/// A power plant with its cost per MWh and the bounds it can actually deliver
#[derive(Debug, Clone, PartialEq)]
pub struct Plant {
  pub name: String,
  pub plant_type: PlantType,
  pub efficiency: f64,
  pub pmin: f64,
  pub pmax: f64,
  pub cost: f64,
}

impl Plant {
  /// Derives the cost and the effective capacity of a plant.
  ///
  /// Wind turbines are free and their pmax is scaled by the wind availability.
  /// The other types pay the fuel price divided by the efficiency. A plant with
  /// an efficiency <= 0 is switched off with a prohibitive cost, unless
  /// `reject_invalid_efficiency` is set, then it is refused.
  pub fn new(raw: &PowerPlant, fuels: &FuelPrices, reject_invalid_efficiency: bool) -> Result<Self, AllocationError> {
    let plant_type: PlantType = raw.kind.parse()?;
    if !(raw.pmin.is_finite() && raw.pmax.is_finite() && raw.efficiency.is_finite()) {
      return Err(AllocationError::Configuration(format!("plant {} has non numeric parameters", raw.name)));
    }
    if raw.pmin < 0.0 || raw.pmin > raw.pmax {
      return Err(AllocationError::Configuration(format!(
        "plant {} needs 0 <= pmin <= pmax, got pmin={} pmax={}",
        raw.name, raw.pmin, raw.pmax
      )));
    }

    let factor = fuels.for_type(plant_type)?;
    let mut plant = Plant {
      name: raw.name.clone(),
      plant_type,
      efficiency: raw.efficiency,
      pmin: raw.pmin,
      pmax: raw.pmax,
      cost: 0.0,
    };

    match plant_type {
      PlantType::WindTurbine => {
        if !(0.0..=100.0).contains(&factor) {
          return Err(AllocationError::Configuration(format!("wind availability {factor}% is not a percentage")));
        }
        plant.pmax = round_to_tenth(raw.pmax * factor / 100.0);
        if plant.pmax == 0.0 {
          // no wind, the plant is off whatever its minimum
          plant.pmin = 0.0;
        } else if plant.pmin > plant.pmax {
          return Err(AllocationError::Configuration(format!(
            "plant {} can not reach its pmin {} with {}% wind, it delivers at most {}",
            raw.name, raw.pmin, factor, plant.pmax
          )));
        }
      }
      _ if raw.efficiency > 0.0 => plant.cost = factor / raw.efficiency,
      _ if reject_invalid_efficiency => {
        return Err(AllocationError::Configuration(format!(
          "plant {} has efficiency {}, it must be positive",
          raw.name, raw.efficiency
        )));
      }
      _ => {
        warn!("Plant {} has efficiency {}, excluding it", raw.name, raw.efficiency);
        plant.pmin = 0.0;
        plant.pmax = 0.0;
        plant.cost = EXCLUDED_PLANT_COST;
      }
    }
    debug!("{plant}");
    Ok(plant)
  }

  /// A plant can take part in the production plan only if it can deliver something
  pub fn is_eligible(&self) -> bool {
    self.pmax > 0.0
  }
}

impl Display for Plant {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(
      f,
      "{} ({}, efficiency {}): cost {:.3}, pmin {}, pmax {}",
      self.name, self.plant_type, self.efficiency, self.cost, self.pmin, self.pmax
    )
  }
}

/// Builds the plants of a request, names have to be unique
pub fn prepare_plants(
  raw: &[PowerPlant],
  fuels: &FuelPrices,
  reject_invalid_efficiency: bool,
) -> Result<Vec<Plant>, AllocationError> {
  let mut plants: Vec<Plant> = Vec::with_capacity(raw.len());
  for p in raw {
    if plants.iter().any(|other| other.name == p.name) {
      return Err(AllocationError::Configuration(format!("duplicate plant name {}", p.name)));
    }
    plants.push(Plant::new(p, fuels, reject_invalid_efficiency)?);
  }
  Ok(plants)
}
