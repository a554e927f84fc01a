use std::collections::BTreeMap;
use std::sync::Arc;

use derive_builder::Builder;
use itertools::Itertools;
use tracing::{info, instrument, warn};

use crate::simulation::config::Config;
use crate::simulation::error::{ConfigurationError, SimulationError};
use crate::simulation::events::EventsManager;
use crate::simulation::id::Id;
use crate::simulation::mobsim::{Mobsim, MobsimSummary};
use crate::simulation::network::{Link, Network};
use crate::simulation::routing::inverted_graph::TurnCosts;
use crate::simulation::routing::router::LeastCostPathRouter;
use crate::simulation::routing::travel_costs::{
    FreeSpeedTravelTime, TimeDistanceTravelDisutility, TravelTime, WalkTravelDisutility,
};
use crate::simulation::routing::travel_time_collector::{CollectedTravelTimes, TravelTimeCollector};
use crate::simulation::routing::turn_aware_router::TurnAwareRouter;
use crate::simulation::routing::{Router, RoutingRequest};
use crate::simulation::vehicles::{Driver, InternalVehicle, InternalVehicleType};

/// Called at the start of every iteration with the iteration number, so that event handlers can be
/// attached.
pub type EventsSubscriberFn = dyn Fn(u32, &mut EventsManager);

/// A trip to be routed and simulated. The vehicle type determines the mode.
#[derive(Debug, Clone, Builder)]
pub struct TripRequest {
    pub vehicle: Id<InternalVehicle>,
    pub driver: Id<Driver>,
    pub vehicle_type: Arc<InternalVehicleType>,
    pub from_link: Id<Link>,
    pub to_link: Id<Link>,
    #[builder(default)]
    pub departure_time: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IterationSummary {
    pub iteration: u32,
    pub routed: usize,
    /// Trips without a route between their links, or whose route takes a forbidden turn. They are
    /// not simulated.
    pub unroutable: usize,
    /// Sum of the travel times the router expected.
    pub planned_travel_time: f64,
    pub mobsim: MobsimSummary,
}

/// Runs the iterations of route, simulate and learn. The first iteration routes with free speed
/// travel times, every later iteration with the travel times observed in the previous one.
pub struct Controller {
    network: Arc<Network>,
    config: Config,
    events_subscribers: Vec<Box<EventsSubscriberFn>>,
}

impl Controller {
    pub fn new(network: Arc<Network>, config: Config) -> Self {
        Controller {
            network,
            config,
            events_subscribers: Vec::new(),
        }
    }

    pub fn add_events_subscriber<F>(&mut self, subscriber: F)
    where
        F: Fn(u32, &mut EventsManager) + 'static,
    {
        self.events_subscribers.push(Box::new(subscriber));
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn run(&self, trips: &[TripRequest]) -> Result<Vec<IterationSummary>, SimulationError> {
        let trips_per_mode = trips
            .iter()
            .map(|t| t.vehicle_type.net_mode.as_str())
            .counts()
            .into_iter()
            .sorted()
            .collect_vec();
        info!(
            "Running {} iterations with trips per mode {trips_per_mode:?}",
            self.config.controller.iterations
        );

        let mut travel_time: Arc<dyn TravelTime> = Arc::new(FreeSpeedTravelTime);
        let mut summaries = Vec::new();
        for iteration in 0..self.config.controller.iterations {
            info!("=========== Start Iteration {iteration} ===========");
            let (summary, collected) = self.run_iteration(iteration, trips, travel_time)?;
            info!("{summary:?}");
            info!("=========== End Iteration {iteration} ===========");
            travel_time = Arc::new(collected);
            summaries.push(summary);
        }
        Ok(summaries)
    }

    #[instrument(level = "debug", skip(self, trips, travel_time))]
    fn run_iteration(
        &self,
        iteration: u32,
        trips: &[TripRequest],
        travel_time: Arc<dyn TravelTime>,
    ) -> Result<(IterationSummary, CollectedTravelTimes), SimulationError> {
        let routers = self.create_routers(travel_time)?;
        let mut mobsim = Mobsim::new(self.network.clone(), &self.config);

        let mut routed = 0;
        let mut unroutable = 0;
        let mut planned_travel_time = 0.;
        for trip in trips {
            let mode = trip.vehicle_type.net_mode.as_str();
            let router = routers
                .get(mode)
                .ok_or_else(|| ConfigurationError::UnsupportedMode(mode.to_string()))?;
            let request = RoutingRequest {
                driver: Some(trip.driver),
                vehicle_type: Some(trip.vehicle_type.clone()),
                ..RoutingRequest::new(trip.from_link, trip.to_link, trip.departure_time as f64)
            };

            match router.calc_route(&request) {
                Ok(route) => {
                    let travel_time = route.travel_time();
                    let vehicle =
                        InternalVehicle::new(trip.vehicle, trip.driver, trip.vehicle_type.clone(), route);
                    // routers without turn restrictions may find routes the queue engine refuses
                    if mode == self.config.simulation.main_mode {
                        if let Err(e @ ConfigurationError::IllegalTurn { .. }) =
                            self.network.validate_route(&vehicle)
                        {
                            warn!("Skipping trip of vehicle {}: {e}", trip.vehicle);
                            unroutable += 1;
                            continue;
                        }
                    }
                    planned_travel_time += travel_time;
                    mobsim.add_departure(vehicle, trip.departure_time);
                    routed += 1;
                }
                Err(e) if e.is_recoverable() => {
                    warn!("Skipping trip of vehicle {}: {e}", trip.vehicle);
                    unroutable += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let mut events = EventsManager::new();
        let collector = TravelTimeCollector::register_for_mode(
            &mut events,
            self.config.routing.time_bin_size,
            &self.config.simulation.main_mode,
        );
        for subscriber in &self.events_subscribers {
            subscriber(iteration, &mut events);
        }
        let mobsim = mobsim.run(&mut events)?;
        let collected = collector.borrow().travel_times();

        Ok((
            IterationSummary {
                iteration,
                routed,
                unroutable,
                planned_travel_time,
                mobsim,
            },
            collected,
        ))
    }

    /// One router for the main mode and one per multi modal mode.
    fn create_routers(
        &self,
        travel_time: Arc<dyn TravelTime>,
    ) -> Result<BTreeMap<String, Box<dyn Router>>, SimulationError> {
        let routing = &self.config.routing;
        let main_mode = &self.config.simulation.main_mode;
        let disutility = Arc::new(TimeDistanceTravelDisutility::new(
            travel_time.clone(),
            routing.marginal_cost_of_time,
            routing.marginal_cost_of_distance,
        ));

        let main_router: Box<dyn Router> = if routing.turn_aware {
            let turn_costs = TurnCosts {
                turn_penalty: routing.turn_penalty,
                u_turn_penalty: routing.u_turn_penalty,
            };
            Box::new(TurnAwareRouter::for_mode(
                self.network.clone(),
                main_mode,
                travel_time,
                disutility,
                turn_costs,
            )?)
        } else {
            Box::new(LeastCostPathRouter::for_mode(
                self.network.clone(),
                main_mode,
                travel_time,
                disutility,
            ))
        };

        let mut routers = BTreeMap::new();
        routers.insert(main_mode.clone(), main_router);
        for (mode, speed) in &self.config.multi_modal.mode_speeds {
            let walk = Arc::new(WalkTravelDisutility::new(*speed));
            let router: Box<dyn Router> = Box::new(LeastCostPathRouter::for_mode(
                self.network.clone(),
                mode,
                walk.clone(),
                walk,
            ));
            routers.insert(mode.clone(), router);
        }
        Ok(routers)
    }
}
