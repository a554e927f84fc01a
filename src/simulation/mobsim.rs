use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::simulation::config::Config;
use crate::simulation::engines::multi_modal_engine::MultiModalSimEngine;
use crate::simulation::error::{ConfigurationError, SimulationError};
use crate::simulation::events::EventsManager;
use crate::simulation::network::sim_network::SimNetwork;
use crate::simulation::network::Network;
use crate::simulation::time_queue::{EndTime, TimeQueue};
use crate::simulation::vehicles::InternalVehicle;

struct Departure {
    vehicle: InternalVehicle,
    time: u32,
}

impl EndTime for Departure {
    fn end_time(&self, _now: u32) -> u32 {
        self.time
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MobsimSummary {
    pub departed: usize,
    pub arrived: usize,
    /// Vehicles which were still on their way or waiting to depart when the simulation ended.
    pub en_route: usize,
    /// Last simulated time step.
    pub end_time: u32,
}

/// Runs one simulated day. Vehicles of the main mode are simulated by the queue engine, vehicles of
/// the configured multi modal modes by the multi modal engine. Each time step first departs due
/// vehicles, then steps the queue engine and then the multi modal engine.
pub struct Mobsim {
    start_time: u32,
    end_time: u32,
    main_mode: String,
    departures: TimeQueue<Departure>,
    network: SimNetwork,
    multi_modal: MultiModalSimEngine,
    departed: usize,
    arrived: usize,
}

impl Mobsim {
    pub fn new(network: Arc<Network>, config: &Config) -> Self {
        Mobsim {
            start_time: config.simulation.start_time,
            end_time: config.simulation.end_time,
            main_mode: config.simulation.main_mode.clone(),
            departures: TimeQueue::new(),
            network: SimNetwork::new(network.clone(), &config.simulation),
            multi_modal: MultiModalSimEngine::new(network, &config.multi_modal),
            departed: 0,
            arrived: 0,
        }
    }

    /// Schedules `vehicle` to depart at `time`. Departures before the start time happen in the first
    /// time step.
    pub fn add_departure(&mut self, vehicle: InternalVehicle, time: u32) {
        self.departures.add(Departure { vehicle, time }, time);
    }

    pub fn scheduled_departures(&self) -> usize {
        self.departures.len()
    }

    pub fn network(&self) -> &SimNetwork {
        &self.network
    }

    /// Steps from start to end time, both included, or until no vehicle is left. Calls
    /// [EventsManager::finish] afterwards.
    pub fn run(&mut self, events: &mut EventsManager) -> Result<MobsimSummary, SimulationError> {
        let mut now = self.start_time;
        info!(
            "Starting mobsim with {} departures. Start time {}, end time {}",
            self.departures.len(),
            self.start_time,
            self.end_time
        );

        while now <= self.end_time {
            if now % 3600 == 0 {
                let hour = now / 3600;
                info!(
                    "Mobsim at {hour}:00. {} vehicles on the network, {} departures pending",
                    self.network.veh_on_net() + self.multi_modal.veh_on_net(),
                    self.departures.len()
                );
            }
            self.do_step(now, events)?;
            if self.is_finished() {
                break;
            }
            now += 1;
        }
        events.finish();

        let summary = MobsimSummary {
            departed: self.departed,
            arrived: self.arrived,
            en_route: self.departures.len() + self.network.veh_on_net() + self.multi_modal.veh_on_net(),
            end_time: now.min(self.end_time),
        };
        info!("Mobsim finished: {summary:?}");
        Ok(summary)
    }

    #[instrument(level = "trace", skip(self, events))]
    pub fn do_step(&mut self, now: u32, events: &mut EventsManager) -> Result<(), SimulationError> {
        for Departure { vehicle, .. } in self.departures.pop(now) {
            self.depart(vehicle, now, events)?;
        }

        let result = self.network.step(now, events)?;
        let multi_modal_arrived = self.multi_modal.step(now, events)?;
        let arrived = result.arrived.len() + multi_modal_arrived.len();
        if arrived > 0 {
            debug!("{arrived} vehicles arrived at {now}");
        }
        self.arrived += arrived;
        Ok(())
    }

    fn depart(
        &mut self,
        vehicle: InternalVehicle,
        now: u32,
        events: &mut EventsManager,
    ) -> Result<(), SimulationError> {
        if vehicle.mode() == self.main_mode {
            self.network.insert_vehicle(vehicle, now)?;
        } else if self.multi_modal.handles_mode(vehicle.mode()) {
            self.multi_modal.insert_vehicle(vehicle, now, events)?;
        } else {
            return Err(ConfigurationError::UnsupportedMode(vehicle.mode().to_string()).into());
        }
        self.departed += 1;
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.departures.is_empty() && self.network.is_empty() && self.multi_modal.is_empty()
    }
}
