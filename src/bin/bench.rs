//! Benchmark for incremental scoring performance.
//!
//! Run with: cargo run --release --bin bench -- [visits] [vehicles] [steps]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use route_optimizer::constraints::calculate_score;
use route_optimizer::construction::construct;
use route_optimizer::director::ScoreDirector;
use route_optimizer::distance::DistanceMatrix;
use route_optimizer::domain::{Depot, Location, Vehicle, VehicleInfo, VehicleRoutePlan, Visit};
use route_optimizer::local_search::{LocalSearch, StepOutcome, DEFAULT_PLATEAU_TOLERANCE};
use std::error::Error;
use std::sync::Arc;
use std::time::Instant;

const SEED: u64 = 37;
const CENTER: (f64, f64) = (50.08, 14.43);

fn arg(index: usize, default: usize) -> usize {
    std::env::args()
        .nth(index)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn main() -> Result<(), Box<dyn Error>> {
    let n_visits = arg(1, 120);
    let n_vehicles = arg(2, 8);
    let max_steps = arg(3, 200);

    let mut rng = StdRng::seed_from_u64(SEED);
    let matrix = Arc::new(DistanceMatrix::default());
    let mut plan = VehicleRoutePlan::new();

    let depot = Arc::new(Location::new(0, CENTER.0, CENTER.1)?);
    matrix.add_location(depot.clone());
    plan.set_depot(Depot::new(depot))?;

    let mut total_demand = 0u32;
    for id in 1..=n_visits as i64 {
        let location = Arc::new(Location::new(
            id,
            CENTER.0 + rng.gen_range(-0.15..0.15),
            CENTER.1 + rng.gen_range(-0.25..0.25),
        )?);
        matrix.add_location(location.clone());
        let demand = rng.gen_range(1..=4);
        total_demand += demand;
        plan.add_visit(Visit::new(location, demand))?;
    }

    // Slightly more room than needed in total, so capacity stays binding.
    let capacity = total_demand / n_vehicles.max(1) as u32 + 2;
    for id in 1..=n_vehicles as i64 {
        plan.add_vehicle(Vehicle::new(Arc::new(VehicleInfo::new(id, format!("Vehicle {}", id))), capacity))?;
    }

    println!("Benchmark: Incremental Scoring (Local Search)");
    println!("  Visits: {}", n_visits);
    println!("  Vehicles: {} (capacity {})", n_vehicles, capacity);
    println!();

    let mut director = ScoreDirector::new(plan, matrix.clone())?;

    let construction_start = Instant::now();
    let stats = construct(&mut director)?;
    println!(
        "Construction: {} inserted, score {} ({:?})",
        stats.inserted,
        director.score(),
        construction_start.elapsed()
    );
    println!();

    let mut search = LocalSearch::new(DEFAULT_PLATEAU_TOLERANCE);
    search.reset(&director);

    let bench_start = Instant::now();
    let mut steps = 0;
    while steps < max_steps {
        steps += 1;
        if search.step(&mut director)? == StepOutcome::LocalOptimum {
            break;
        }
    }
    if search.in_excursion() {
        search.rollback(&mut director)?;
    }

    let elapsed = bench_start.elapsed();
    let moves = search.moves_evaluated();
    let moves_per_sec = moves as f64 / elapsed.as_secs_f64();

    println!("Results:");
    println!("  Steps: {} ({} accepted)", steps, search.steps_accepted());
    println!("  Moves: {}", moves);
    println!("  Time: {:.2?}", elapsed);
    println!("  Moves/sec: {:.0}", moves_per_sec);

    // The incremental score must match a full recalculation.
    let incremental = director.score();
    let full = calculate_score(director.working_solution(), matrix.as_ref())?;
    assert_eq!(incremental, full, "Score corrupted!");
    println!("  Final score: {} (verified)", full);
    Ok(())
}
