use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use net_qsim::simulation::config::{CommandLineArgs, Config};
use net_qsim::simulation::controller::{Controller, TripRequest};
use net_qsim::simulation::id::Id;
use net_qsim::simulation::logging::init_logging;
use net_qsim::simulation::network::grid::create_grid;
use net_qsim::simulation::network::LinkAttributes;
use net_qsim::simulation::vehicles::InternalVehicleType;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{error, info};

/// Simulates random trips on a synthetic grid network.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct GridArgs {
    #[command(flatten)]
    simulation: CommandLineArgs,
    /// Number of nodes along each side of the grid.
    #[arg(long, default_value_t = 10)]
    grid_size: u32,
    #[arg(long, default_value_t = 200.)]
    spacing: f64,
    #[arg(long, default_value_t = 1000)]
    trips: u32,
    /// Departures are spread uniformly over [0, departure_window).
    #[arg(long, default_value_t = 3600)]
    departure_window: u32,
    /// Share of trips which use the first multi modal mode of the config instead of the main mode.
    #[arg(long, default_value_t = 0.)]
    multi_modal_share: f64,
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> ExitCode {
    let args = GridArgs::parse();

    let config = match Config::try_from(args.simulation) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    let _guards = init_logging(&config);
    info!("Started with config {config:?}");

    let attributes = LinkAttributes::new(args.spacing, 1800., 13.89, 1.);
    let network = match create_grid(args.grid_size, args.spacing, &attributes) {
        Ok(network) => Arc::new(network),
        Err(e) => {
            error!("Could not create grid network: {e}");
            return ExitCode::FAILURE;
        }
    };
    if network.links().is_empty() {
        error!("Grid of size {} has no links", args.grid_size);
        return ExitCode::FAILURE;
    }

    let main_mode = config.simulation.main_mode.clone();
    let multi_modal_mode = config.multi_modal.mode_speeds.keys().next().cloned();
    let car = Arc::new(InternalVehicleType::new(&main_mode, &main_mode, 36.1, 1.));
    let other = multi_modal_mode.map(|mode| Arc::new(InternalVehicleType::new(&mode, &mode, 36.1, 0.)));

    let mut rng = StdRng::seed_from_u64(args.seed);
    let link_count = network.links().len() as u32;
    let trips: Vec<_> = (0..args.trips)
        .map(|i| {
            let vehicle_type = match &other {
                Some(other) if rng.random_bool(args.multi_modal_share.clamp(0., 1.)) => other.clone(),
                _ => car.clone(),
            };
            TripRequest {
                vehicle: Id::new(i),
                driver: Id::new(i),
                vehicle_type,
                from_link: Id::new(rng.random_range(0..link_count)),
                to_link: Id::new(rng.random_range(0..link_count)),
                departure_time: rng.random_range(0..args.departure_window.max(1)),
            }
        })
        .collect();

    let controller = Controller::new(network, config);
    match controller.run(&trips) {
        Ok(summaries) => {
            for summary in summaries {
                info!(
                    "Iteration {}: {} routed, {} unroutable, {} arrived, {} en route, finished at {}",
                    summary.iteration,
                    summary.routed,
                    summary.unroutable,
                    summary.mobsim.arrived,
                    summary.mobsim.en_route,
                    summary.mobsim.end_time
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Simulation failed: {e}");
            ExitCode::FAILURE
        }
    }
}
