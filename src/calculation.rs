use log::{debug, info};
use serde::Serialize;

use crate::{
  data::{Payload, Settings},
  error::AllocationError,
  plant::{prepare_plants, Plant},
  problem::build_problem,
  simplex::Solver,
};

/// Power assigned to a plant in the production plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
  pub name: String,
  pub p: f64,
}

/// Production plan for a request: derives the plants from the fuel prices and allocates the load
pub fn calculation(payload: &Payload, settings: &Settings) -> Result<Vec<Allocation>, AllocationError> {
  let plants = prepare_plants(&payload.powerplants, &payload.fuels, settings.reject_invalid_efficiency)?;
  allocate(payload.load, &plants, settings)
}

/// Distributes the load over the plants at minimum cost.
///
/// Plants that can not produce get 0. The plan is refused when the allocated
/// power does not add up to the load, the check is done before rounding the
/// plan to one decimal.
pub fn allocate(load: f64, plants: &[Plant], settings: &Settings) -> Result<Vec<Allocation>, AllocationError> {
  if !load.is_finite() || load < 0.0 {
    return Err(AllocationError::Configuration(format!("load must be a non negative number, got {load}")));
  }
  info!("Distributing load {} over {} plants", load, plants.len());

  let mut planning = solve(load, plants, &settings.solver())?;
  let allocated: f64 = planning.iter().map(|a| a.p).sum();
  if !is_close(allocated, load, settings.load_rel_tolerance, settings.load_abs_tolerance) {
    return Err(AllocationError::LoadMismatch { load, allocated });
  }
  round_planning(&mut planning);
  info!("Production plan: {:?}", planning);
  Ok(planning)
}

fn solve(load: f64, plants: &[Plant], solver: &Solver) -> Result<Vec<Allocation>, AllocationError> {
  let (program, eligible) = build_problem(load, plants);
  let solution = solver.solve(&program).map_err(|source| AllocationError::Solver { load, source })?;
  debug!("Objective {}", solution.objective);
  Ok(decode(plants, &eligible, solution.exact_decision_values()))
}

/// Rounds the plan to one decimal keeping its total: every value is cut down to
/// the decimal below and the tenths lost on the way go to the largest remainders.
fn round_planning(planning: &mut [Allocation]) {
  let tenths: Vec<f64> = planning.iter().map(|a| (a.p * 10.0).max(0.0)).collect();
  let mut units: Vec<f64> = tenths.iter().map(|t| t.floor()).collect();
  let missing = (tenths.iter().sum::<f64>().round() - units.iter().sum::<f64>()).max(0.0) as usize;

  let mut order: Vec<usize> = (0..planning.len()).collect();
  // stable, equal remainders are served in plant order
  order.sort_by(|&a, &b| {
    let (remainder_a, remainder_b) = (tenths[a] - units[a], tenths[b] - units[b]);
    remainder_b.partial_cmp(&remainder_a).unwrap_or(std::cmp::Ordering::Equal)
  });
  for &i in order.iter().take(missing) {
    units[i] += 1.0;
  }
  for (allocation, unit) in planning.iter_mut().zip(units) {
    allocation.p = unit / 10.0;
  }
}

/// Maps the decision variables back on the plants, `eligible[i]` is the plant of variable i
fn decode(plants: &[Plant], eligible: &[usize], values: &[f64]) -> Vec<Allocation> {
  let mut planning: Vec<Allocation> = plants.iter().map(|p| Allocation { name: p.name.clone(), p: 0.0 }).collect();
  for (&plant, &value) in eligible.iter().zip(values) {
    planning[plant].p = value;
  }
  planning
}

fn is_close(a: f64, b: f64, rel_tolerance: f64, abs_tolerance: f64) -> bool {
  (a - b).abs() <= (rel_tolerance * a.abs().max(b.abs())).max(abs_tolerance)
}

#[cfg(test)]
mod tests {
  use crate::tests::init;

  use super::*;
  use crate::{
    error::SolverError,
    plant::{FuelPrices, PowerPlant},
  };
  use log::info;
  use minilp::{ComparisonOp, LinearExpr, OptimizationDirection, Problem};

  fn fuels(wind: f64) -> FuelPrices {
    [("gas(euro/MWh)", 13.4), ("kerosine(euro/MWh)", 50.8), ("co2(euro/ton)", 20.0), ("wind(%)", wind)]
      .into_iter()
      .collect()
  }

  fn raw(name: &str, kind: &str, efficiency: f64, pmin: f64, pmax: f64) -> PowerPlant {
    PowerPlant { name: name.to_string(), kind: kind.to_string(), efficiency, pmin, pmax }
  }

  fn reference_plants() -> Vec<PowerPlant> {
    vec![
      raw("gasfiredbig1", "gasfired", 0.53, 0.0, 460.0),
      raw("gasfiredbig2", "gasfired", 0.53, 100.0, 460.0),
      raw("gasfiredsomewhatsmaller", "gasfired", 0.37, 40.0, 210.0),
      raw("tj1", "turbojet", 0.3, 0.0, 16.0),
      raw("windpark1", "windturbine", 1.0, 0.0, 150.0),
      raw("windpark2", "windturbine", 1.0, 0.0, 36.0),
    ]
  }

  fn payload(load: f64, wind: f64) -> Payload {
    Payload { load, fuels: fuels(wind), powerplants: reference_plants() }
  }

  fn power(planning: &[Allocation], name: &str) -> f64 {
    planning.iter().find(|a| a.name == name).map(|a| a.p).unwrap()
  }

  fn cost(planning: &[Allocation], plants: &[Plant]) -> f64 {
    planning.iter().zip(plants).map(|(a, p)| a.p * p.cost).sum()
  }

  /// Optimal cost according to an independent solver
  fn reference_cost(load: f64, plants: &[Plant]) -> f64 {
    let mut problem = Problem::new(OptimizationDirection::Minimize);
    let mut total = LinearExpr::empty();
    for plant in plants.iter().filter(|p| p.is_eligible()) {
      let var = problem.add_var(plant.cost, (plant.pmin, plant.pmax));
      total.add(var, 1.0);
    }
    problem.add_constraint(total, ComparisonOp::Eq, load);
    problem.solve().unwrap().objective()
  }

  fn check_plan(planning: &[Allocation], plants: &[Plant], load: f64) {
    assert_eq!(planning.len(), plants.len());
    let total: f64 = planning.iter().map(|a| a.p).sum();
    assert!((total - load).abs() < 1e-6, "allocated {total}, load {load}");
    for (a, p) in planning.iter().zip(plants) {
      assert_eq!(a.name, p.name);
      if p.is_eligible() {
        assert!(a.p >= p.pmin - 1e-9 && a.p <= p.pmax + 1e-9, "{} out of bounds: {}", a.name, a.p);
      } else {
        assert_eq!(a.p, 0.0);
      }
    }
    let expected = reference_cost(load, plants);
    assert!((cost(planning, plants) - expected).abs() <= 1e-6 * expected, "not the minimum cost");
  }

  #[test]
  fn test_wind_at_sixty_percent() {
    init();
    let payload = payload(480.0, 60.0);
    let settings = Settings::default();
    let plants = prepare_plants(&payload.powerplants, &payload.fuels, false).unwrap();
    let planning = calculation(&payload, &settings).unwrap();
    info!("{:?}", planning);
    check_plan(&planning, &plants, 480.0);

    assert_eq!(power(&planning, "windpark1"), 90.0);
    assert_eq!(power(&planning, "windpark2"), 21.6);
    assert_eq!(power(&planning, "tj1"), 0.0);
    assert_eq!(power(&planning, "gasfiredsomewhatsmaller"), 40.0);
    let big = power(&planning, "gasfiredbig1") + power(&planning, "gasfiredbig2");
    assert!((big - 368.4).abs() < 1e-6);
  }

  #[test]
  fn test_no_wind() {
    init();
    let payload = payload(480.0, 0.0);
    let plants = prepare_plants(&payload.powerplants, &payload.fuels, false).unwrap();
    let planning = calculation(&payload, &Settings::default()).unwrap();
    check_plan(&planning, &plants, 480.0);

    assert_eq!(power(&planning, "windpark1"), 0.0);
    assert_eq!(power(&planning, "windpark2"), 0.0);
    assert_eq!(power(&planning, "tj1"), 0.0);
    assert_eq!(power(&planning, "gasfiredsomewhatsmaller"), 40.0);
    let big = power(&planning, "gasfiredbig1") + power(&planning, "gasfiredbig2");
    assert!((big - 440.0).abs() < 1e-6);
  }

  #[test]
  fn test_near_full_capacity() {
    init();
    let payload = payload(910.0, 60.0);
    let plants = prepare_plants(&payload.powerplants, &payload.fuels, false).unwrap();
    let planning = calculation(&payload, &Settings::default()).unwrap();
    check_plan(&planning, &plants, 910.0);

    assert_eq!(power(&planning, "windpark1"), 90.0);
    assert_eq!(power(&planning, "windpark2"), 21.6);
    assert_eq!(power(&planning, "gasfiredsomewhatsmaller"), 40.0);
    let big = power(&planning, "gasfiredbig1") + power(&planning, "gasfiredbig2");
    assert!((big - 758.4).abs() < 1e-6);
  }

  #[test]
  fn test_turbojet_covers_the_peak() {
    init();
    // every gas plant at full power, the rest has to come from the turbojet
    let payload = payload(460.0 + 460.0 + 210.0 + 111.6 + 10.0, 60.0);
    let plants = prepare_plants(&payload.powerplants, &payload.fuels, false).unwrap();
    let planning = calculation(&payload, &Settings::default()).unwrap();
    check_plan(&planning, &plants, payload.load);
    assert_eq!(power(&planning, "tj1"), 10.0);
    assert_eq!(power(&planning, "gasfiredbig1"), 460.0);
    assert_eq!(power(&planning, "gasfiredsomewhatsmaller"), 210.0);
  }

  #[test]
  fn test_minimum_above_load() {
    init();
    let payload = Payload {
      load: 20.0,
      fuels: fuels(60.0),
      powerplants: vec![
        raw("gasfiredbig1", "gasfired", 0.53, 100.0, 460.0),
        raw("gasfiredbig2", "gasfired", 0.53, 100.0, 460.0),
      ],
    };
    let result = calculation(&payload, &Settings::default());
    assert_eq!(result, Err(AllocationError::Solver { load: 20.0, source: SolverError::EmptyFeasibleRegion }));
  }

  #[test]
  fn test_load_above_capacity() {
    init();
    let result = calculation(&payload(5000.0, 60.0), &Settings::default());
    assert_eq!(result, Err(AllocationError::Solver { load: 5000.0, source: SolverError::EmptyFeasibleRegion }));
  }

  #[test]
  fn test_nothing_can_produce() {
    init();
    let payload = Payload {
      load: 100.0,
      fuels: fuels(0.0),
      powerplants: vec![raw("windpark1", "windturbine", 1.0, 0.0, 150.0), raw("broken", "gasfired", 0.0, 0.0, 100.0)],
    };
    let result = calculation(&payload, &Settings::default());
    assert_eq!(result, Err(AllocationError::Solver { load: 100.0, source: SolverError::EmptyFeasibleRegion }));

    let idle = Payload { load: 0.0, ..payload };
    let planning = calculation(&idle, &Settings::default()).unwrap();
    assert_eq!(
      planning,
      vec![Allocation { name: "windpark1".to_string(), p: 0.0 }, Allocation { name: "broken".to_string(), p: 0.0 }]
    );
  }

  #[test]
  fn test_excluded_plant_keeps_its_place() {
    init();
    let payload = Payload {
      load: 50.0,
      fuels: fuels(60.0),
      powerplants: vec![raw("broken", "gasfired", 0.0, 10.0, 100.0), raw("tj1", "turbojet", 0.3, 0.0, 60.0)],
    };
    let planning = calculation(&payload, &Settings::default()).unwrap();
    assert_eq!(
      planning,
      vec![Allocation { name: "broken".to_string(), p: 0.0 }, Allocation { name: "tj1".to_string(), p: 50.0 }]
    );

    let strict = Settings { reject_invalid_efficiency: true, ..Settings::default() };
    assert!(matches!(calculation(&payload, &strict), Err(AllocationError::Configuration(_))));
  }

  #[test]
  fn test_invalid_load() {
    init();
    let result = calculation(&payload(-1.0, 60.0), &Settings::default());
    assert!(matches!(result, Err(AllocationError::Configuration(_))));
  }

  #[test]
  fn test_solver_settings_are_used() {
    init();
    let settings = Settings { max_iterations: 0, ..Settings::default() };
    let result = calculation(&payload(480.0, 60.0), &settings);
    assert!(matches!(
      result,
      Err(AllocationError::Solver { source: SolverError::MaxIterationsExceeded { .. }, .. })
    ));
  }

  fn grid_plants(plants: Vec<PowerPlant>, wind: f64) -> Vec<Plant> {
    prepare_plants(&plants, &fuels(wind), false).unwrap()
  }

  fn on_grid(value: f64) -> bool {
    (value * 10.0 - (value * 10.0).round()).abs() < 1e-9
  }

  #[test]
  fn test_minimum_off_the_grid() {
    init();
    // the turbojet runs at its minimum of 10.25, the gas plant takes 89.75
    let plants =
      grid_plants(vec![raw("gasfiredbig1", "gasfired", 0.53, 0.0, 460.0), raw("tj1", "turbojet", 0.3, 10.25, 16.0)], 60.0);
    let planning = allocate(100.0, &plants, &Settings::default()).unwrap();
    info!("{:?}", planning);
    let total: f64 = planning.iter().map(|a| a.p).sum();
    assert!((total - 100.0).abs() < 1e-9, "allocated {total}");
    assert!(planning.iter().all(|a| on_grid(a.p)));
    assert!((power(&planning, "gasfiredbig1") - 89.75).abs() <= 0.05 + 1e-9);
    assert!((power(&planning, "tj1") - 10.25).abs() <= 0.05 + 1e-9);
  }

  #[test]
  fn test_load_off_the_grid() {
    init();
    let plants = grid_plants(
      vec![raw("gasfiredbig1", "gasfired", 0.53, 0.0, 460.0), raw("windpark1", "windturbine", 1.0, 0.0, 16.25)],
      60.0,
    );
    let planning = allocate(100.05, &plants, &Settings::default()).unwrap();
    let total: f64 = planning.iter().map(|a| a.p).sum();
    assert!((total - 100.05).abs() <= 0.05 + 1e-9, "allocated {total}");
    assert!(planning.iter().all(|a| on_grid(a.p)));
    assert_eq!(power(&planning, "windpark1"), plants[1].pmax);
  }

  #[test]
  fn test_load_mismatch() {
    init();
    // with a loose solver tolerance the load of an empty program is taken for zero
    let plants = grid_plants(vec![raw("windpark1", "windturbine", 1.0, 0.0, 150.0)], 0.0);
    let settings = Settings { tolerance: 1e-3, ..Settings::default() };
    let result = allocate(0.0005, &plants, &settings);
    assert_eq!(result, Err(AllocationError::LoadMismatch { load: 0.0005, allocated: 0.0 }));
  }

  #[test]
  fn test_round_planning() {
    let mut planning = vec![
      Allocation { name: "a".to_string(), p: 33.33 },
      Allocation { name: "b".to_string(), p: 33.33 },
      Allocation { name: "c".to_string(), p: 33.34 },
      Allocation { name: "off".to_string(), p: 0.0 },
    ];
    round_planning(&mut planning);
    let values: Vec<f64> = planning.iter().map(|a| a.p).collect();
    assert_eq!(values, vec![33.3, 33.3, 33.4, 0.0]);

    let mut ties = vec![Allocation { name: "a".to_string(), p: 89.75 }, Allocation { name: "b".to_string(), p: 10.25 }];
    round_planning(&mut ties);
    assert_eq!(ties[0].p, 89.8);
    assert_eq!(ties[1].p, 10.2);
  }

  #[test]
  fn test_is_close() {
    assert!(is_close(480.0, 480.0000000001, 1e-9, 0.0));
    assert!(!is_close(480.0, 480.1, 1e-9, 1e-6));
    assert!(is_close(0.0, 1e-7, 1e-9, 1e-6));
  }

  #[test]
  fn test_decode() {
    let plants = prepare_plants(&reference_plants(), &fuels(0.0), false).unwrap();
    // the wind parks are not part of the linear program
    let planning = decode(&plants, &[0, 1, 2, 3], &[380.0, 100.0, 0.0, 0.0]);
    assert_eq!(planning[0], Allocation { name: "gasfiredbig1".to_string(), p: 380.0 });
    assert_eq!(planning[1].p, 100.0);
    assert_eq!(planning[4], Allocation { name: "windpark1".to_string(), p: 0.0 });
  }
}
