use std::sync::Arc;

use net_qsim::simulation::config::{CommandLineArgs, Config};
use net_qsim::simulation::controller::{Controller, TripRequestBuilder};
use net_qsim::simulation::id::Id;
use net_qsim::simulation::logging::init_std_out_logging_thread_local;
use net_qsim::simulation::network::grid::create_grid;
use net_qsim::simulation::network::LinkAttributes;
use net_qsim::test_utils::vehicle_type;

#[test]
fn grid_with_config_file() {
    let _guard = init_std_out_logging_thread_local();
    let config = Config::try_from(CommandLineArgs::new_with_path(
        "./tests/resources/grid-config.yml",
    ))
    .unwrap();
    assert!(config.routing.turn_aware);
    assert_eq!(2, config.controller.iterations);

    let network = create_grid(4, 100., &LinkAttributes::new(100., 900., 10., 1.)).unwrap();
    let from = network.link_id("0_0-1_0").unwrap();
    let to = network.link_id("2_3-3_3").unwrap();
    let network = Arc::new(network);

    let car = vehicle_type("car", 50., 1.);
    let walk = vehicle_type("walk", 50., 0.);
    let trips: Vec<_> = (0..20)
        .map(|i| {
            TripRequestBuilder::default()
                .vehicle(Id::new(i))
                .driver(Id::new(i))
                .vehicle_type(if i % 5 == 0 { walk.clone() } else { car.clone() })
                .from_link(from)
                .to_link(to)
                .departure_time(i * 2)
                .build()
                .unwrap()
        })
        .collect();

    let summaries = Controller::new(network, config).run(&trips).unwrap();
    assert_eq!(2, summaries.len());
    for (iteration, summary) in summaries.iter().enumerate() {
        assert_eq!(iteration as u32, summary.iteration);
        assert_eq!(20, summary.routed);
        assert_eq!(20, summary.mobsim.arrived);
        assert_eq!(0, summary.mobsim.en_route);
        assert!(summary.planned_travel_time > 0.);
    }
}
