use std::sync::Arc;

use tracing::{instrument, trace};

use crate::simulation::id::Id;
use crate::simulation::network::{Link, Network, Node};
use crate::simulation::routing::dijkstra::{Dijkstra, EdgeCost, Path};
use crate::simulation::routing::graph::Graph;
use crate::simulation::routing::travel_costs::{TravelDisutility, TravelTime};
use crate::simulation::routing::{Route, Router, RoutingError, RoutingRequest};
use crate::simulation::vehicles::{Driver, InternalVehicleType};

/// Time dependent least cost path router on the network's node graph.
pub struct LeastCostPathRouter {
    network: Arc<Network>,
    graph: Graph,
    travel_time: Arc<dyn TravelTime>,
    disutility: Arc<dyn TravelDisutility>,
}

impl LeastCostPathRouter {
    pub fn new(
        network: Arc<Network>,
        travel_time: Arc<dyn TravelTime>,
        disutility: Arc<dyn TravelDisutility>,
    ) -> Self {
        let graph = Graph::from_network(&network, None);
        LeastCostPathRouter {
            network,
            graph,
            travel_time,
            disutility,
        }
    }

    /// Router which only uses links allowing `mode`.
    pub fn for_mode(
        network: Arc<Network>,
        mode: &str,
        travel_time: Arc<dyn TravelTime>,
        disutility: Arc<dyn TravelDisutility>,
    ) -> Self {
        let graph = Graph::from_network(&network, Some(mode));
        LeastCostPathRouter {
            network,
            graph,
            travel_time,
            disutility,
        }
    }

    /// Least cost path between two nodes when leaving `from` at `start_time`.
    pub fn calc_least_cost_path(
        &self,
        from: Id<Node>,
        to: Id<Node>,
        start_time: f64,
        driver: Option<Id<Driver>>,
        vehicle_type: Option<&InternalVehicleType>,
    ) -> Result<Path, RoutingError> {
        for node in [from, to] {
            if self.network.try_node(node).is_none() {
                return Err(RoutingError::UnknownNode(node));
            }
        }
        Dijkstra::least_cost_path(&self.graph, from.index(), to.index(), start_time, |edge, time| {
            let link = &self.network.links()[edge];
            self.edge_cost(link, time, driver, vehicle_type)
        })
        .ok_or(RoutingError::NoPathFound { from, to })
    }

    fn edge_cost(
        &self,
        link: &Link,
        time: f64,
        driver: Option<Id<Driver>>,
        vehicle_type: Option<&InternalVehicleType>,
    ) -> EdgeCost {
        let cost = self
            .disutility
            .link_travel_disutility(link, time, driver, vehicle_type);
        debug_assert!(
            cost >= self.disutility.link_minimum_travel_disutility(link) - 1e-6,
            "disutility of link {} below its minimum",
            link.id
        );
        EdgeCost {
            travel_time: self
                .travel_time
                .link_travel_time(link, time, driver, vehicle_type),
            cost,
        }
    }

    fn link(&self, id: Id<Link>) -> Result<&Link, RoutingError> {
        self.network.try_link(id).ok_or(RoutingError::UnknownLink(id))
    }
}

impl Router for LeastCostPathRouter {
    #[instrument(level = "trace", skip(self), fields(from = %request.from_link, to = %request.to_link))]
    fn calc_route(&self, request: &RoutingRequest) -> Result<Route, RoutingError> {
        let origin = self.link(request.from_link)?;
        let destination = self.link(request.to_link)?;
        if origin.id == destination.id {
            return Ok(Route::single_link(origin.id));
        }

        let vehicle_type = request.vehicle_type.as_deref();
        // the origin link is traversed completely before the node graph is entered
        let origin_cost = self.edge_cost(origin, request.departure_time, request.driver, vehicle_type);
        let start_time = request.departure_time + origin_cost.travel_time;

        let path = self
            .calc_least_cost_path(origin.to, destination.from, start_time, request.driver, vehicle_type)
            .map_err(|e| match e {
                RoutingError::NoPathFound { .. } => RoutingError::NoRouteFound {
                    from: origin.id,
                    to: destination.id,
                },
                e => e,
            })?;

        let mut links = Vec::with_capacity(path.edges.len() + 2);
        links.push(origin.id);
        links.extend(path.edges.iter().map(|e| Id::new(*e as u32)));
        links.push(destination.id);
        trace!("Found route with {} links", links.len());

        Ok(Route::new(
            links,
            origin_cost.travel_time + path.travel_time,
            origin_cost.cost + path.travel_cost,
        ))
    }
}
