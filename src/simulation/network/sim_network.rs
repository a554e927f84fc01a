use std::sync::Arc;

use tracing::{debug, instrument, trace};

use super::activation::{ActiveSet, Activator};
use super::link::SimLink;
use super::{Link, Network, Node};
use crate::simulation::config;
use crate::simulation::error::{ConfigurationError, SimulationError};
use crate::simulation::events::{EventsManager, LinkEnterEvent, LinkLeaveEvent};
use crate::simulation::id::Id;
use crate::simulation::vehicles::InternalVehicle;

/// Capacity constrained queue simulation of the whole network.
///
/// Each time step first moves vehicles across nodes and then along links. Only active nodes and
/// links are processed. Nodes are active while any of their in-links has vehicles in its buffer,
/// links while vehicles traverse them or wait to enter them.
#[derive(Debug)]
pub struct SimNetwork {
    network: Arc<Network>,
    nodes: Vec<SimNode>,
    links: Vec<SimLink>,
    active_nodes: ActiveSet<Node>,
    active_links: ActiveSet<Link>,
    activator: Activator,
    veh_counter: usize,
}

#[derive(Debug)]
pub struct SimNode {
    id: Id<Node>,
    in_links: Vec<Id<Link>>,
    // in-link which is served first. Points behind the in-link which moved the last vehicle.
    rr_offset: usize,
}

#[derive(Debug, Default)]
pub struct StepResult {
    /// Vehicles which reached the end of their route in this time step.
    pub arrived: Vec<InternalVehicle>,
}

impl SimNetwork {
    pub fn new(network: Arc<Network>, config: &config::Simulation) -> Self {
        let links = network
            .links()
            .iter()
            .map(|link| SimLink::from_link(link, network.effective_cell_size, config))
            .collect();
        let nodes = network
            .nodes()
            .iter()
            .map(|node| SimNode {
                id: node.id,
                in_links: node.in_links.clone(),
                rr_offset: 0,
            })
            .collect();
        let active_nodes = ActiveSet::with_bound(network.nodes().len());
        let active_links = ActiveSet::with_bound(network.links().len());
        let activator = Activator::new(active_links.sender(), active_nodes.sender());

        SimNetwork {
            network,
            nodes,
            links,
            active_nodes,
            active_links,
            activator,
            veh_counter: 0,
        }
    }

    /// Handle to activate links and nodes of this engine from elsewhere.
    pub fn activator(&self) -> Activator {
        self.activator.clone()
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    /// Places a vehicle into the waiting list of the first link of its route. It enters traffic as
    /// soon as the link has capacity for it, at the earliest in the link phase of the current time
    /// step.
    #[instrument(level = "trace", skip(self, vehicle), fields(vehicle = %vehicle.id))]
    pub fn insert_vehicle(&mut self, vehicle: InternalVehicle, now: u32) -> Result<(), SimulationError> {
        self.network.validate_route(&vehicle)?;
        for id in vehicle.route().links() {
            let capacity = self.links[id.index()].storage_capacity();
            if vehicle.pce() > capacity + 1e-6 {
                return Err(ConfigurationError::VehicleExceedsStorage {
                    vehicle: vehicle.id,
                    link: *id,
                    pce: vehicle.pce(),
                    capacity,
                }
                .into());
            }
        }

        // validate_route made sure there is at least one link
        let Some(first) = vehicle.curr_link_id() else {
            return Err(ConfigurationError::EmptyRoute(vehicle.id).into());
        };
        trace!("Inserting vehicle {} on link {first} at {now}", vehicle.id);
        self.links[first.index()].push_veh_to_waiting_list(vehicle);
        self.activator.activate_link(first);
        self.veh_counter += 1;
        Ok(())
    }

    #[instrument(level = "trace", skip(self, events))]
    pub fn step(&mut self, now: u32, events: &mut EventsManager) -> Result<StepResult, SimulationError> {
        self.move_nodes(now, events)?;
        let arrived = self.move_links(now, events)?;
        Ok(StepResult { arrived })
    }

    pub fn move_nodes(&mut self, now: u32, events: &mut EventsManager) -> Result<(), SimulationError> {
        self.active_nodes.drain();
        let mut deactivate = vec![];
        for id in &self.active_nodes {
            let node = &mut self.nodes[id.index()];
            let active = Self::move_node(
                node,
                &self.network,
                &mut self.links,
                &self.activator,
                events,
                now,
            )?;
            if !active {
                deactivate.push(*id);
            }
        }

        for id in deactivate {
            self.active_nodes.deactivate(&id);
        }
        Ok(())
    }

    pub fn move_links(
        &mut self,
        now: u32,
        events: &mut EventsManager,
    ) -> Result<Vec<InternalVehicle>, SimulationError> {
        self.active_links.drain();
        let mut deactivate = vec![];
        let mut arrived = vec![];

        for id in &self.active_links {
            let link = &mut self.links[id.index()];
            let mut result = link.do_sim_step(now, events)?;
            if result.reached_buffer {
                self.activator.activate_node(link.to);
            }
            if !link.is_active() {
                deactivate.push(*id);
            }
            arrived.append(&mut result.arrived);
        }

        // bookkeeping. Empty links are no longer active.
        for id in deactivate {
            self.active_links.deactivate(&id);
        }
        self.veh_counter -= arrived.len();
        Ok(arrived)
    }

    /// Serves the in-links of a node round robin, one vehicle per in-link and round, until a round
    /// moves no vehicle. Serving starts behind the in-link which moved the last vehicle, also across
    /// time steps. An in-link whose head vehicle can't move is blocked for the rest of the time step.
    /// Returns whether the node must stay active.
    fn move_node(
        node: &mut SimNode,
        network: &Network,
        links: &mut [SimLink],
        activator: &Activator,
        events: &mut EventsManager,
        now: u32,
    ) -> Result<bool, SimulationError> {
        let num_in_links = node.in_links.len();
        if num_in_links == 0 {
            return Ok(false);
        }
        let offset = node.rr_offset % num_in_links;

        let mut blocked = vec![false; num_in_links];
        loop {
            let mut moved = false;
            for k in 0..num_in_links {
                let i = (offset + k) % num_in_links;
                if blocked[i] {
                    continue;
                }
                if Self::move_vehicle(node.in_links[i], network, links, activator, events, now)? {
                    moved = true;
                    node.rr_offset = (i + 1) % num_in_links;
                } else {
                    blocked[i] = true;
                }
            }
            if !moved {
                break;
            }
        }

        let active = node
            .in_links
            .iter()
            .any(|id| links[id.index()].has_buffered_vehicles());
        if active {
            debug!("Node {} keeps blocked vehicles at {now}", node.id);
        }
        Ok(active)
    }

    /// Moves the head of the buffer of `in_link_id` onto its next link. Returns false if the buffer
    /// is empty or the next link can't take the vehicle.
    fn move_vehicle(
        in_link_id: Id<Link>,
        network: &Network,
        links: &mut [SimLink],
        activator: &Activator,
        events: &mut EventsManager,
        now: u32,
    ) -> Result<bool, SimulationError> {
        let Some(vehicle) = links[in_link_id.index()].offers_veh() else {
            return Ok(false);
        };
        let pce = vehicle.pce();
        let next_id = vehicle.peek_next_link_id().unwrap_or_else(|| {
            panic!(
                "Vehicle {} in buffer of link {in_link_id} has no next link. Vehicles on the last link of their route must leave the network from the queue.",
                vehicle.id
            )
        });
        if !network.is_turn_allowed(in_link_id, next_id) {
            return Err(ConfigurationError::IllegalTurn {
                node: network.get_link(in_link_id).to,
                from: in_link_id,
                to: next_id,
            }
            .into());
        }

        let Some(entry_time) = links[next_id.index()].accepts(pce, now) else {
            return Ok(false);
        };
        let Some(mut vehicle) = links[in_link_id.index()].pop_veh(now) else {
            return Ok(false);
        };

        events.publish_event(&LinkLeaveEvent::new(now, in_link_id, vehicle.id));
        vehicle.advance_route_index();
        events.publish_event(&LinkEnterEvent::new(now, next_id, vehicle.id));
        links[next_id.index()].push_veh(vehicle, entry_time, now)?;
        activator.activate_link(next_id);
        Ok(true)
    }

    pub fn link(&self, id: Id<Link>) -> &SimLink {
        &self.links[id.index()]
    }

    pub fn links(&self) -> &[SimLink] {
        &self.links
    }

    pub fn veh_on_net(&self) -> usize {
        self.veh_counter
    }

    pub fn is_empty(&self) -> bool {
        self.veh_counter == 0
    }

    pub fn active_nodes(&self) -> usize {
        self.active_nodes.len()
    }

    pub fn active_links(&self) -> usize {
        self.active_links.len()
    }

    pub fn is_node_active(&self, id: Id<Node>) -> bool {
        self.active_nodes.contains(&id)
    }

    pub fn is_link_active(&self, id: Id<Link>) -> bool {
        self.active_links.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    use crate::simulation::config;
    use crate::simulation::error::{ConfigurationError, SimulationError};
    use crate::simulation::events::{EventsManager, LinkEnterEvent, LinkLeaveEvent};
    use crate::simulation::id::Id;
    use crate::simulation::network::sim_network::SimNetwork;
    use crate::simulation::network::{LinkAttributes, Network};
    use crate::simulation::routing::Route;
    use crate::simulation::vehicles::{InternalVehicle, InternalVehicleType};

    fn vehicle(id: u32, links: &[u32], pce: f32) -> InternalVehicle {
        let vehicle_type = Arc::new(InternalVehicleType::new("car", "car", 100., pce));
        let route = Route::new(links.iter().map(|l| Id::new(*l)).collect(), 0., 0.);
        InternalVehicle::new(Id::new(id), Id::new(id), vehicle_type, route)
    }

    // n0 -l0-> n1 -l1-> n2 -l2-> n3
    fn line(attributes: [LinkAttributes; 3], effective_cell_size: f32) -> Arc<Network> {
        let mut network = Network::with_effective_cell_size(effective_cell_size);
        let nodes: Vec<_> = (0..4)
            .map(|i| network.add_node(&format!("n{i}"), i as f64 * 100., 0.).unwrap())
            .collect();
        for (i, attributes) in attributes.into_iter().enumerate() {
            network
                .add_link(&format!("l{i}"), nodes[i], nodes[i + 1], attributes)
                .unwrap();
        }
        Arc::new(network)
    }

    // two in-links l0, l1 merge at node m into l2
    fn merge(out_capacity: f32) -> Arc<Network> {
        let mut network = Network::new();
        let a = network.add_node("a", 0., 100.).unwrap();
        let b = network.add_node("b", 0., -100.).unwrap();
        let m = network.add_node("m", 100., 0.).unwrap();
        let e = network.add_node("e", 200., 0.).unwrap();
        network.add_link("l0", a, m, LinkAttributes::new(10., 36000., 10., 1.)).unwrap();
        network.add_link("l1", b, m, LinkAttributes::new(10., 36000., 10., 1.)).unwrap();
        network
            .add_link("l2", m, e, LinkAttributes::new(1000., out_capacity, 10., 10.))
            .unwrap();
        Arc::new(network)
    }

    #[test]
    fn vehicle_traverses_line() {
        let network = line(
            [
                LinkAttributes::new(100., 3600., 10., 1.),
                LinkAttributes::new(200., 3600., 20., 1.),
                LinkAttributes::new(50., 3600., 10., 1.),
            ],
            7.5,
        );
        let mut sim = SimNetwork::new(network, &config::Simulation::default());
        let mut events = EventsManager::new();
        let leaves = Rc::new(RefCell::new(Vec::new()));
        let leaves_clone = leaves.clone();
        events.on::<LinkLeaveEvent, _>(move |e| leaves_clone.borrow_mut().push((e.time, e.link)));

        sim.insert_vehicle(vehicle(0, &[0, 1, 2], 1.), 0).unwrap();
        let mut arrival = None;
        for now in 0..100 {
            let result = sim.step(now, &mut events).unwrap();
            if !result.arrived.is_empty() {
                arrival = Some(now);
                break;
            }
        }

        // l0: 10s, moved by n1 at 11. l1: 10s, moved by n2 at 22. l2: 5s, arrival at 27
        assert_eq!(
            vec![(11, Id::new(0)), (22, Id::new(1)), (27, Id::new(2))],
            *leaves.borrow()
        );
        assert_eq!(Some(27), arrival);
        assert!(sim.is_empty());
    }

    #[test]
    fn activation_timing() {
        let network = line(
            [
                LinkAttributes::new(10., 3600., 10., 1.),
                LinkAttributes::new(10., 3600., 10., 1.),
                LinkAttributes::new(10., 3600., 10., 1.),
            ],
            7.5,
        );
        let mut sim = SimNetwork::new(network, &config::Simulation::default());
        let mut events = EventsManager::new();
        sim.insert_vehicle(vehicle(0, &[0, 1, 2], 1.), 0).unwrap();

        // vehicle enters l0 and reaches its end after 1s
        sim.step(0, &mut events).unwrap();
        assert!(sim.is_link_active(Id::new(0)));
        assert_eq!(0, sim.active_nodes());

        // vehicle reaches the buffer. n1 is activated, but runs in the next time step only
        sim.step(1, &mut events).unwrap();
        assert_eq!(1, sim.link(Id::new(0)).buffer_len());
        assert!(!sim.is_node_active(Id::new(1)));
        assert!(!sim.is_link_active(Id::new(0)));

        // n1 moves the vehicle onto l1, which is processed in the same time step
        sim.step(2, &mut events).unwrap();
        assert_eq!(1, sim.link(Id::new(1)).queue_len());
        assert!(sim.is_link_active(Id::new(1)));
        assert!(!sim.is_node_active(Id::new(1)));
        assert_eq!(1, sim.active_links());
    }

    #[test]
    fn activating_unknown_elements_is_ignored() {
        let network = line(
            [
                LinkAttributes::new(10., 3600., 10., 1.),
                LinkAttributes::new(10., 3600., 10., 1.),
                LinkAttributes::new(10., 3600., 10., 1.),
            ],
            7.5,
        );
        let mut sim = SimNetwork::new(network, &config::Simulation::default());
        let mut events = EventsManager::new();
        let activator = sim.activator();
        activator.activate_link(Id::new(42));
        activator.activate_node(Id::new(17));

        let result = sim.step(0, &mut events).unwrap();
        assert!(result.arrived.is_empty());
        assert_eq!(0, sim.active_links());
        assert_eq!(0, sim.active_nodes());
        assert!(sim.is_empty());
    }

    #[test]
    fn spillback_blocks_upstream() {
        // l1 holds a single vehicle and is slow, l0 has plenty of space
        let network = line(
            [
                LinkAttributes::new(10., 36000., 10., 1.),
                LinkAttributes::new(100., 36000., 1., 1.).with_storage_capacity(1.),
                LinkAttributes::new(10., 36000., 10., 1.),
            ],
            7.5,
        );
        let mut sim = SimNetwork::new(network, &config::Simulation::default());
        let mut events = EventsManager::new();
        for i in 0..3 {
            sim.insert_vehicle(vehicle(i, &[0, 1, 2], 1.), 0).unwrap();
        }

        for now in 0..50 {
            sim.step(now, &mut events).unwrap();
            let l1 = sim.link(Id::new(1));
            assert!(l1.occupancy() <= l1.storage_capacity());
        }
        // one vehicle on l1, the other two are stuck in the buffer of l0
        assert_eq!(1, sim.link(Id::new(1)).queue_len());
        assert_eq!(2, sim.link(Id::new(0)).buffer_len());
        assert!(sim.is_node_active(Id::new(1)));
        assert_eq!(3, sim.veh_on_net());
    }

    #[test]
    fn round_robin_alternates_in_links() {
        // l2 admits one vehicle every 10 seconds
        let network = merge(360.);
        let mut sim = SimNetwork::new(network, &config::Simulation::default());
        let mut events = EventsManager::new();
        let entered = Rc::new(RefCell::new(Vec::new()));
        let entered_clone = entered.clone();
        events.on::<LinkEnterEvent, _>(move |e| {
            if e.link == Id::new(2) {
                entered_clone.borrow_mut().push(e.vehicle.internal());
            }
        });

        for i in 0..3 {
            sim.insert_vehicle(vehicle(i, &[0, 2], 1.), 0).unwrap();
            sim.insert_vehicle(vehicle(10 + i, &[1, 2], 1.), 0).unwrap();
        }
        for now in 0..80 {
            sim.step(now, &mut events).unwrap();
        }

        let entered = entered.borrow();
        assert_eq!(6, entered.len());
        // vehicles from both in-links take turns
        for pair in entered.chunks(2) {
            assert!(pair[0] < 10 && pair[1] >= 10 || pair[0] >= 10 && pair[1] < 10);
        }
    }

    #[test]
    fn unblocked_node_moves_several_vehicles() {
        // l2 admits 10 vehicles per second
        let network = merge(36000.);
        let mut sim = SimNetwork::new(network, &config::Simulation::default());
        let mut events = EventsManager::new();
        for i in 0..4 {
            sim.insert_vehicle(vehicle(i, &[0, 2], 1.), 0).unwrap();
        }
        // the first vehicle reaches the buffer of l0 at t=1, the other three are spaced by flow
        // capacity and reach it at t=2
        for now in 0..=2 {
            sim.step(now, &mut events).unwrap();
        }
        assert_eq!(1, sim.link(Id::new(2)).queue_len());
        assert_eq!(3, sim.link(Id::new(0)).buffer_len());

        sim.step(3, &mut events).unwrap();
        assert_eq!(4, sim.link(Id::new(2)).queue_len());
        assert_eq!(0, sim.link(Id::new(0)).buffer_len());
    }

    #[test]
    fn events_balance() {
        let network = merge(360.);
        let mut sim = SimNetwork::new(network, &config::Simulation::default());
        let mut events = EventsManager::new();
        let balance = Rc::new(RefCell::new(vec![0i32; 3]));
        let enter = balance.clone();
        events.on::<LinkEnterEvent, _>(move |e| enter.borrow_mut()[e.link.index()] += 1);
        let leave = balance.clone();
        events.on::<LinkLeaveEvent, _>(move |e| leave.borrow_mut()[e.link.index()] -= 1);

        for i in 0..5 {
            sim.insert_vehicle(vehicle(i, &[(i % 2), 2], 1.), 0).unwrap();
        }
        let mut now = 0;
        while !sim.is_empty() {
            sim.step(now, &mut events).unwrap();
            now += 1;
        }
        assert_eq!(vec![0, 0, 0], *balance.borrow());
    }

    #[test]
    fn insert_invalid_vehicles() {
        let network = line(
            [
                LinkAttributes::new(100., 3600., 10., 1.),
                LinkAttributes::new(100., 3600., 10., 1.).with_storage_capacity(1.),
                LinkAttributes::new(100., 3600., 10., 1.),
            ],
            7.5,
        );
        let mut sim = SimNetwork::new(network, &config::Simulation::default());

        assert_eq!(
            Err(SimulationError::Configuration(ConfigurationError::DisconnectedRoute {
                vehicle: Id::new(0),
                from: Id::new(0),
                to: Id::new(2)
            })),
            sim.insert_vehicle(vehicle(0, &[0, 2], 1.), 0)
        );
        assert!(matches!(
            sim.insert_vehicle(vehicle(1, &[0, 1, 2], 2.), 0),
            Err(SimulationError::Configuration(
                ConfigurationError::VehicleExceedsStorage { .. }
            ))
        ));
        assert_eq!(0, sim.veh_on_net());
    }
}
