use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tracing::{instrument, trace};

use crate::simulation::config;
use crate::simulation::error::{ConfigurationError, SimulationError};
use crate::simulation::events::{
    EventsManager, LinkEnterEvent, LinkLeaveEvent, VehicleEntersTrafficEvent,
    VehicleLeavesTrafficEvent,
};
use crate::simulation::id::Id;
use crate::simulation::network::activation::{ActiveSet, Activator};
use crate::simulation::network::{Link, Network, Node};
use crate::simulation::time_queue::{EndTime, TimeQueue};
use crate::simulation::vehicles::InternalVehicle;

/// Simulates modes which don't interact with each other and with network vehicles, e.g. walking or
/// cycling. Vehicles traverse links at the speed of their mode without capacity restraints. The
/// engine follows the same pattern as the queue engine: links move vehicles whose exit time has
/// come into a buffer, nodes pass buffered vehicles on to their next link. Both are only processed
/// while active.
///
/// Turn restrictions apply to network vehicles only and are ignored here.
#[derive(Debug)]
pub struct MultiModalSimEngine {
    network: Arc<Network>,
    mode_speeds: BTreeMap<String, f64>,
    links: Vec<MultiModalLink>,
    active_nodes: ActiveSet<Node>,
    active_links: ActiveSet<Link>,
    activator: Activator,
    veh_counter: usize,
}

#[derive(Default)]
struct MultiModalLink {
    q: TimeQueue<Traversal>,
    buffer: VecDeque<InternalVehicle>,
}

impl std::fmt::Debug for MultiModalLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiModalLink")
            .field("q", &self.q.len())
            .field("buffer", &self.buffer.len())
            .finish()
    }
}

struct Traversal {
    vehicle: InternalVehicle,
    exit_time: u32,
}

impl EndTime for Traversal {
    fn end_time(&self, _now: u32) -> u32 {
        self.exit_time
    }
}

impl MultiModalSimEngine {
    pub fn new(network: Arc<Network>, config: &config::MultiModal) -> Self {
        let links = network
            .links()
            .iter()
            .map(|_| MultiModalLink::default())
            .collect();
        let active_nodes = ActiveSet::with_bound(network.nodes().len());
        let active_links = ActiveSet::with_bound(network.links().len());
        let activator = Activator::new(active_links.sender(), active_nodes.sender());
        MultiModalSimEngine {
            network,
            mode_speeds: config.mode_speeds.clone(),
            links,
            active_nodes,
            active_links,
            activator,
            veh_counter: 0,
        }
    }

    pub fn activator(&self) -> Activator {
        self.activator.clone()
    }

    pub fn handles_mode(&self, mode: &str) -> bool {
        self.mode_speeds.contains_key(mode)
    }

    fn travel_time(&self, link: Id<Link>, vehicle: &InternalVehicle) -> Result<u32, SimulationError> {
        let speed = self
            .mode_speeds
            .get(vehicle.mode())
            .ok_or_else(|| ConfigurationError::UnsupportedMode(vehicle.mode().to_string()))?;
        let speed = speed.min(vehicle.max_v() as f64);
        let length = self.network.get_link(link).length;
        Ok(f64::max(1., (length / speed).ceil()) as u32)
    }

    /// Departs a vehicle onto the first link of its route. Unlike in the queue engine, the vehicle
    /// enters immediately.
    #[instrument(level = "trace", skip(self, vehicle, events), fields(vehicle = %vehicle.id))]
    pub fn insert_vehicle(
        &mut self,
        vehicle: InternalVehicle,
        now: u32,
        events: &mut EventsManager,
    ) -> Result<(), SimulationError> {
        self.network.validate_route_connectivity(&vehicle)?;
        let Some(first) = vehicle.curr_link_id() else {
            return Err(ConfigurationError::EmptyRoute(vehicle.id).into());
        };
        let exit_time = now + self.travel_time(first, &vehicle)?;

        events.publish_event(&VehicleEntersTrafficEvent::new(now, &vehicle, first));
        events.publish_event(&LinkEnterEvent::new(now, first, vehicle.id));
        self.links[first.index()].q.add(Traversal { vehicle, exit_time }, now);
        self.activator.activate_link(first);
        self.veh_counter += 1;
        Ok(())
    }

    #[instrument(level = "trace", skip(self, events))]
    pub fn step(&mut self, now: u32, events: &mut EventsManager) -> Result<Vec<InternalVehicle>, SimulationError> {
        self.move_nodes(now, events)?;
        Ok(self.move_links(now, events))
    }

    fn move_nodes(&mut self, now: u32, events: &mut EventsManager) -> Result<(), SimulationError> {
        self.active_nodes.drain();
        let nodes: Vec<_> = self.active_nodes.iter().copied().collect();
        for id in nodes {
            for in_link in &self.network.get_node(id).in_links {
                while let Some(mut vehicle) = self.links[in_link.index()].buffer.pop_front() {
                    events.publish_event(&LinkLeaveEvent::new(now, *in_link, vehicle.id));
                    vehicle.advance_route_index();
                    let next = vehicle.curr_link_id().unwrap_or_else(|| {
                        panic!(
                            "Vehicle {} in buffer of link {in_link} has no next link. Vehicles on the last link of their route must leave the network from the queue.",
                            vehicle.id
                        )
                    });
                    let exit_time = now + self.travel_time(next, &vehicle)?;
                    events.publish_event(&LinkEnterEvent::new(now, next, vehicle.id));
                    trace!("Vehicle {} enters link {next} at {now}", vehicle.id);
                    self.links[next.index()].q.add(Traversal { vehicle, exit_time }, now);
                    self.activator.activate_link(next);
                }
            }
            // nothing stays behind without capacity restraints
            self.active_nodes.deactivate(&id);
        }
        Ok(())
    }

    fn move_links(&mut self, now: u32, events: &mut EventsManager) -> Vec<InternalVehicle> {
        self.active_links.drain();
        let mut deactivate = vec![];
        let mut arrived = vec![];

        for id in &self.active_links {
            let link = &mut self.links[id.index()];
            for Traversal { vehicle, .. } in link.q.pop(now) {
                if vehicle.is_current_link_last() {
                    events.publish_event(&LinkLeaveEvent::new(now, *id, vehicle.id));
                    events.publish_event(&VehicleLeavesTrafficEvent::new(now, &vehicle, *id));
                    arrived.push(vehicle);
                } else {
                    link.buffer.push_back(vehicle);
                    self.activator.activate_node(self.network.get_link(*id).to);
                }
            }
            if link.q.is_empty() {
                deactivate.push(*id);
            }
        }

        for id in deactivate {
            self.active_links.deactivate(&id);
        }
        self.veh_counter -= arrived.len();
        arrived
    }

    pub fn veh_on_net(&self) -> usize {
        self.veh_counter
    }

    pub fn is_empty(&self) -> bool {
        self.veh_counter == 0
    }

    pub fn active_links(&self) -> usize {
        self.active_links.len()
    }

    pub fn active_nodes(&self) -> usize {
        self.active_nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;
    use std::sync::Arc;

    use crate::simulation::config;
    use crate::simulation::engines::multi_modal_engine::MultiModalSimEngine;
    use crate::simulation::error::{ConfigurationError, SimulationError};
    use crate::simulation::events::{EventsManager, LinkEnterEvent, LinkLeaveEvent};
    use crate::simulation::id::Id;
    use crate::simulation::network::{LinkAttributes, Network};
    use crate::simulation::routing::Route;
    use crate::simulation::vehicles::{InternalVehicle, InternalVehicleType};

    fn config() -> config::MultiModal {
        config::MultiModal {
            mode_speeds: BTreeMap::from([(String::from("walk"), 1.25)]),
        }
    }

    // a -0-> b -1-> c, link 1 is a car only link, link 2 goes back from b to a
    fn network() -> Arc<Network> {
        let mut network = Network::new();
        let a = network.add_node("a", 0., 0.).unwrap();
        let b = network.add_node("b", 100., 0.).unwrap();
        let c = network.add_node("c", 200., 0.).unwrap();
        network
            .add_link("0", a, b, LinkAttributes::new(100., 3600., 10., 1.))
            .unwrap();
        network
            .add_link("1", b, c, LinkAttributes::new(100., 3600., 10., 1.).with_modes(&["car"]))
            .unwrap();
        network
            .add_link("2", b, a, LinkAttributes::new(10., 3600., 10., 1.))
            .unwrap();
        // walkers ignore this
        network.set_turn_restriction(b, Id::new(0), vec![]).unwrap();
        Arc::new(network)
    }

    fn walker(id: u32, links: &[u32]) -> InternalVehicle {
        let vehicle_type = Arc::new(InternalVehicleType::new("walk", "walk", 10., 0.));
        let route = Route::new(links.iter().map(|l| Id::new(*l)).collect(), 0., 0.);
        InternalVehicle::new(Id::new(id), Id::new(id), vehicle_type, route)
    }

    #[test]
    #[should_panic(expected = "has no next link")]
    fn buffered_vehicle_without_next_link() {
        let mut engine = MultiModalSimEngine::new(network(), &config());
        let mut events = EventsManager::new();
        // a walker at the end of its route must never wait in a buffer
        engine.links[0].buffer.push_back(walker(0, &[0]));
        engine.activator.activate_node(Id::new(1));
        let _ = engine.step(0, &mut events);
    }

    #[test]
    fn activating_unknown_elements_is_ignored() {
        let mut engine = MultiModalSimEngine::new(network(), &config());
        let mut events = EventsManager::new();
        engine.activator.activate_link(Id::new(3));
        engine.activator.activate_node(Id::new(3));

        assert!(engine.step(0, &mut events).unwrap().is_empty());
        assert_eq!(0, engine.active_links());
        assert_eq!(0, engine.active_nodes());
    }

    #[test]
    fn walk_two_links() {
        let mut engine = MultiModalSimEngine::new(network(), &config());
        let mut events = EventsManager::new();
        let trace = Rc::new(RefCell::new(Vec::new()));
        let enter = trace.clone();
        events.on::<LinkEnterEvent, _>(move |e| enter.borrow_mut().push(format!("enter {} {}", e.time, e.link)));
        let leave = trace.clone();
        events.on::<LinkLeaveEvent, _>(move |e| leave.borrow_mut().push(format!("leave {} {}", e.time, e.link)));

        engine.insert_vehicle(walker(0, &[0, 2]), 0, &mut events).unwrap();
        let mut arrivals = vec![];
        for now in 0..100 {
            let arrived = engine.step(now, &mut events).unwrap();
            arrivals.extend(arrived.into_iter().map(|v| (now, v.id)));
        }

        // 100m at 1.25m/s => 80s, moved on by node b at 81, 10m => 8s
        assert_eq!(vec![(89, Id::new(0))], arrivals);
        assert_eq!(
            vec!["enter 0 #0", "leave 81 #0", "enter 81 #2", "leave 89 #2"],
            *trace.borrow()
        );
        assert!(engine.is_empty());
        assert_eq!(0, engine.active_links());
        assert_eq!(0, engine.active_nodes());
    }

    #[test]
    fn no_capacity_restraints() {
        let mut engine = MultiModalSimEngine::new(network(), &config());
        let mut events = EventsManager::new();
        for i in 0..100 {
            engine.insert_vehicle(walker(i, &[0]), 0, &mut events).unwrap();
        }
        assert_eq!(100, engine.veh_on_net());
        let arrived = engine.step(80, &mut events).unwrap();
        assert_eq!(100, arrived.len());
        // insertion order is kept
        assert!(arrived.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn mode_must_be_allowed() {
        let mut engine = MultiModalSimEngine::new(network(), &config());
        let mut events = EventsManager::new();
        let result = engine.insert_vehicle(walker(0, &[0, 1]), 0, &mut events);
        assert_eq!(
            Err(SimulationError::Configuration(ConfigurationError::ModeNotAllowed {
                link: Id::new(1),
                mode: String::from("walk")
            })),
            result
        );
        assert!(engine.is_empty());
    }

    #[test]
    fn unknown_mode() {
        let mut engine = MultiModalSimEngine::new(network(), &config());
        let mut events = EventsManager::new();
        let vehicle_type = Arc::new(InternalVehicleType::new("bike", "bike", 10., 0.));
        let bike = InternalVehicle::new(
            Id::new(0),
            Id::new(0),
            vehicle_type,
            Route::new(vec![Id::new(0)], 0., 0.),
        );
        assert!(matches!(
            engine.insert_vehicle(bike, 0, &mut events),
            Err(SimulationError::Configuration(ConfigurationError::UnsupportedMode(mode))) if mode == "bike"
        ));
        assert!(!engine.handles_mode("bike"));
        assert!(engine.handles_mode("walk"));
    }
}
