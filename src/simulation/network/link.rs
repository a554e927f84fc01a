use std::collections::VecDeque;
use std::fmt::Debug;

use tracing::trace;

use crate::simulation::config;
use crate::simulation::error::SimulationError;
use crate::simulation::events::{
    EventsManager, LinkEnterEvent, LinkLeaveEvent, VehicleEntersTrafficEvent,
    VehicleLeavesTrafficEvent,
};
use crate::simulation::id::Id;
use crate::simulation::network::flow_cap::Flowcap;
use crate::simulation::network::storage_cap::StorageCap;
use crate::simulation::network::{Link, Node};
use crate::simulation::vehicles::InternalVehicle;

/// Engine state of a link. Vehicles pass three FIFO containers:
///
/// 1. `waiting_list`: departures waiting to enter the link at its upstream end
/// 2. `q`: vehicles traversing the link, each with its earliest exit time
/// 3. `buffer`: vehicles at the downstream end, waiting for the to-node to move them on
///
/// Vehicles in `q` and `buffer` occupy storage capacity, waiting vehicles don't.
#[derive(Debug)]
pub struct SimLink {
    pub id: Id<Link>,
    pub from: Id<Node>,
    pub to: Id<Node>,
    q: VecDeque<VehicleQEntry>,
    buffer: VecDeque<InternalVehicle>,
    waiting_list: VecDeque<InternalVehicle>,
    length: f64,
    free_speed: f32,
    storage_cap: StorageCap,
    flow_cap: Flowcap,
    occupancy: f32,
}

#[derive(Debug)]
struct VehicleQEntry {
    vehicle: InternalVehicle,
    earliest_exit_time: u32,
}

/// Outcome of [SimLink::do_sim_step].
#[derive(Debug, Default)]
pub struct LinkStepResult {
    /// vehicles whose route ended on this link
    pub arrived: Vec<InternalVehicle>,
    /// whether at least one vehicle was moved into the buffer
    pub reached_buffer: bool,
}

impl SimLink {
    pub fn from_link(link: &Link, effective_cell_size: f32, config: &config::Simulation) -> Self {
        let storage_cap = match link.storage_capacity {
            Some(max) => StorageCap::with_max(max),
            None => StorageCap::new(
                link.length,
                link.permlanes,
                link.capacity,
                config.sample_size,
                effective_cell_size,
            ),
        };
        SimLink {
            id: link.id,
            from: link.from,
            to: link.to,
            q: VecDeque::new(),
            buffer: VecDeque::new(),
            waiting_list: VecDeque::new(),
            length: link.length,
            free_speed: link.freespeed,
            storage_cap,
            flow_cap: Flowcap::new(link.capacity, config.sample_size),
            occupancy: 0.,
        }
    }

    /// Entry time within time step `now` for a vehicle with `pce`, if storage and flow capacity
    /// allow it to enter.
    pub fn accepts(&self, pce: f32, now: u32) -> Option<f64> {
        if !self.storage_cap.is_available(pce, now) {
            return None;
        }
        self.flow_cap.entry_time(now)
    }

    /// Puts a vehicle at the start of the traversal queue. Callers must have checked
    /// [SimLink::accepts] before.
    pub fn push_veh(
        &mut self,
        vehicle: InternalVehicle,
        entry_time: f64,
        now: u32,
    ) -> Result<(), SimulationError> {
        let speed = self.free_speed.min(vehicle.max_v());
        // at least 1 second per link
        let free_exit_time = entry_time + f64::max(1., self.length / speed as f64);
        let exit_time = self.flow_cap.consume(entry_time, free_exit_time, vehicle.pce());
        // tolerate rounding errors, e.g. 0.1 + 0.2
        let earliest_exit_time = (exit_time - 1e-9).ceil() as u32;

        self.storage_cap.consume(vehicle.pce(), now);
        self.occupancy += vehicle.pce();
        self.check_storage()?;

        trace!(
            "Vehicle {} enters link {} at {entry_time}. Earliest exit at {earliest_exit_time}",
            vehicle.id,
            self.id
        );
        self.q.push_back(VehicleQEntry {
            vehicle,
            earliest_exit_time,
        });
        Ok(())
    }

    /// Queues a departing vehicle at the upstream end of the link.
    pub fn push_veh_to_waiting_list(&mut self, vehicle: InternalVehicle) {
        self.waiting_list.push_back(vehicle);
    }

    /// Moves vehicles whose earliest exit time has passed into the buffer, or out of the network if
    /// the link is the last one of their route. Afterwards, waiting vehicles are admitted as long as
    /// storage and flow capacity allow.
    pub fn do_sim_step(
        &mut self,
        now: u32,
        events: &mut EventsManager,
    ) -> Result<LinkStepResult, SimulationError> {
        let mut result = LinkStepResult::default();
        self.add_queue_to_buffer(now, events, &mut result);
        self.add_waiting_to_queue(now, events)?;
        Ok(result)
    }

    fn add_queue_to_buffer(&mut self, now: u32, events: &mut EventsManager, result: &mut LinkStepResult) {
        while let Some(entry) = self.q.front() {
            // If the earliest exit time has not passed, nothing to do
            if entry.earliest_exit_time > now {
                break;
            }
            let Some(entry) = self.q.pop_front() else {
                break;
            };
            let vehicle = entry.vehicle;

            if vehicle.is_current_link_last() {
                self.release(vehicle.pce(), now);
                events.publish_event(&LinkLeaveEvent::new(now, self.id, vehicle.id));
                events.publish_event(&VehicleLeavesTrafficEvent::new(now, &vehicle, self.id));
                result.arrived.push(vehicle);
            } else {
                self.buffer.push_back(vehicle);
                result.reached_buffer = true;
            }
        }
    }

    fn add_waiting_to_queue(&mut self, now: u32, events: &mut EventsManager) -> Result<(), SimulationError> {
        while let Some(vehicle) = self.waiting_list.front() {
            let Some(entry_time) = self.accepts(vehicle.pce(), now) else {
                break;
            };
            let Some(vehicle) = self.waiting_list.pop_front() else {
                break;
            };
            events.publish_event(&VehicleEntersTrafficEvent::new(now, &vehicle, self.id));
            events.publish_event(&LinkEnterEvent::new(now, self.id, vehicle.id));
            self.push_veh(vehicle, entry_time, now)?;
        }
        Ok(())
    }

    /// The vehicle at the head of the buffer.
    pub fn offers_veh(&self) -> Option<&InternalVehicle> {
        self.buffer.front()
    }

    /// Removes the vehicle at the head of the buffer and releases its storage capacity.
    pub fn pop_veh(&mut self, now: u32) -> Option<InternalVehicle> {
        let vehicle = self.buffer.pop_front()?;
        self.release(vehicle.pce(), now);
        Some(vehicle)
    }

    fn release(&mut self, pce: f32, now: u32) {
        self.storage_cap.release(pce, now);
        self.occupancy -= pce;
    }

    fn check_storage(&self) -> Result<(), SimulationError> {
        if self.occupancy > self.storage_cap.max() + 1e-6 {
            Err(SimulationError::CapacityInvariantViolation {
                link: self.id,
                occupancy: self.occupancy,
                capacity: self.storage_cap.max(),
            })
        } else {
            Ok(())
        }
    }

    /// A link needs to be simulated as long as vehicles traverse it or wait to enter it.
    pub fn is_active(&self) -> bool {
        !self.q.is_empty() || !self.waiting_list.is_empty()
    }

    pub fn has_buffered_vehicles(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub fn queue_len(&self) -> usize {
        self.q.len()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting_list.len()
    }

    /// pce of all vehicles in the traversal queue and the buffer.
    pub fn occupancy(&self) -> f32 {
        self.occupancy
    }

    pub fn storage_capacity(&self) -> f32 {
        self.storage_cap.max()
    }

    pub fn flow_capacity_per_time_step(&self) -> f32 {
        self.flow_cap.capacity_per_time_step()
    }

    pub fn num_vehicles(&self) -> usize {
        self.q.len() + self.buffer.len() + self.waiting_list.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_approx_eq::assert_approx_eq;

    use crate::simulation::config;
    use crate::simulation::error::SimulationError;
    use crate::simulation::events::EventsManager;
    use crate::simulation::id::Id;
    use crate::simulation::network::link::SimLink;
    use crate::simulation::network::{Link, LinkAttributes, Network};
    use crate::simulation::routing::Route;
    use crate::simulation::vehicles::{InternalVehicle, InternalVehicleType};

    fn link(attributes: LinkAttributes, effective_cell_size: f32) -> SimLink {
        let mut network = Network::with_effective_cell_size(effective_cell_size);
        let from = network.add_node("from", 0., 0.).unwrap();
        let to = network.add_node("to", 1., 0.).unwrap();
        let id = network.add_link("link", from, to, attributes).unwrap();
        SimLink::from_link(
            network.get_link(id),
            network.effective_cell_size,
            &config::Simulation::default(),
        )
    }

    fn vehicle(id: u32, links: &[u32], max_v: f32, pce: f32) -> InternalVehicle {
        let vehicle_type = Arc::new(InternalVehicleType::new("car", "car", max_v, pce));
        let route = Route::new(links.iter().map(|l| Id::<Link>::new(*l)).collect(), 0., 0.);
        InternalVehicle::new(Id::new(id), Id::new(id), vehicle_type, route)
    }

    #[test]
    fn storage_capacity() {
        let link = link(LinkAttributes::new(100., 3600., 10., 3.), 7.5);
        assert_approx_eq!(40., link.storage_capacity());

        let link = link_with_override();
        assert_eq!(5., link.storage_capacity());
    }

    fn link_with_override() -> SimLink {
        link(
            LinkAttributes::new(100., 3600., 10., 3.).with_storage_capacity(5.),
            7.5,
        )
    }

    #[test]
    fn free_flow_travel_time() {
        let mut link = link(LinkAttributes::new(100., 3600., 10., 1.), 7.5);
        let mut events = EventsManager::new();
        link.push_veh(vehicle(0, &[0, 1], 5., 1.), 0., 0).unwrap();

        // 100m at 5m/s
        for now in 0..20 {
            link.do_sim_step(now, &mut events).unwrap();
            assert_eq!(0, link.buffer_len());
        }
        let result = link.do_sim_step(20, &mut events).unwrap();
        assert!(result.reached_buffer);
        assert_eq!(1, link.buffer_len());
        assert!(!link.is_active());
        assert!(link.has_buffered_vehicles());
    }

    #[test]
    fn at_least_one_second() {
        let mut link = link(LinkAttributes::new(1., 3600., 100., 1.), 7.5);
        let mut events = EventsManager::new();
        link.push_veh(vehicle(0, &[0, 1], 100., 1.), 0., 0).unwrap();

        assert!(!link.do_sim_step(0, &mut events).unwrap().reached_buffer);
        assert!(link.do_sim_step(1, &mut events).unwrap().reached_buffer);
    }

    #[test]
    fn arrival_on_last_link() {
        let mut link = link(LinkAttributes::new(100., 3600., 10., 1.), 7.5);
        let mut events = EventsManager::new();
        link.push_veh(vehicle(0, &[0], 10., 1.), 0., 0).unwrap();

        let result = link.do_sim_step(10, &mut events).unwrap();
        assert_eq!(1, result.arrived.len());
        assert!(!result.reached_buffer);
        assert_eq!(0., link.occupancy());
    }

    #[test]
    fn waiting_vehicles_respect_storage() {
        // 100m, 1 lane, cell size 50m => storage capacity 2
        let mut link = link(LinkAttributes::new(100., 3600., 10., 1.), 50.);
        let mut events = EventsManager::new();
        for i in 0..3 {
            link.push_veh_to_waiting_list(vehicle(i, &[0, 1], 10., 1.));
        }

        link.do_sim_step(0, &mut events).unwrap();
        assert_eq!(1, link.queue_len());
        link.do_sim_step(1, &mut events).unwrap();
        assert_eq!(2, link.queue_len());
        link.do_sim_step(2, &mut events).unwrap();
        assert_eq!(2, link.queue_len());
        assert_eq!(1, link.waiting_len());
        assert!(link.is_active());
    }

    #[test]
    fn buffer_occupies_storage() {
        let mut link = link(LinkAttributes::new(100., 3600., 10., 1.), 50.);
        let mut events = EventsManager::new();
        link.push_veh(vehicle(0, &[0, 1], 10., 1.), 0., 0).unwrap();
        link.push_veh(vehicle(1, &[0, 1], 10., 1.), 1., 1).unwrap();
        link.do_sim_step(11, &mut events).unwrap();

        assert_eq!(2, link.buffer_len());
        assert_eq!(None, link.accepts(1., 12));

        link.pop_veh(12).unwrap();
        // released capacity is available in the next time step
        assert_eq!(None, link.accepts(1., 12));
        assert_eq!(Some(13.), link.accepts(1., 13));
    }

    #[test]
    fn storage_violation_is_reported() {
        let mut link = link(LinkAttributes::new(100., 3600., 10., 1.), 50.);
        link.push_veh(vehicle(0, &[0], 10., 1.), 0., 0).unwrap();
        link.push_veh(vehicle(1, &[0], 10., 1.), 1., 1).unwrap();
        let result = link.push_veh(vehicle(2, &[0], 10., 1.), 2., 2);

        assert_eq!(
            Err(SimulationError::CapacityInvariantViolation {
                link: Id::new(0),
                occupancy: 3.,
                capacity: 2.
            }),
            result
        );
    }
}
