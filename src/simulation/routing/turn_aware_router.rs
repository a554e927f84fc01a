use std::sync::Arc;

use tracing::{info, instrument};

use crate::simulation::id::Id;
use crate::simulation::network::{Link, Network};
use crate::simulation::routing::dijkstra::{Dijkstra, EdgeCost};
use crate::simulation::routing::inverted_graph::{InvertedGraph, TurnCosts};
use crate::simulation::routing::travel_costs::{LinkToLinkTravelTime, TravelDisutility, TravelTime};
use crate::simulation::routing::{Route, Router, RoutingError, RoutingRequest};

/// Least cost path router which respects turn restrictions and turn costs by routing on the
/// [InvertedGraph] of the network. The inverted graph is built once on construction. Build a new
/// router if turn restrictions change.
pub struct TurnAwareRouter {
    network: Arc<Network>,
    inverted: InvertedGraph,
    travel_time: Arc<dyn LinkToLinkTravelTime>,
    disutility: Arc<dyn TravelDisutility>,
}

impl TurnAwareRouter {
    pub fn new(
        network: Arc<Network>,
        travel_time: Arc<dyn TravelTime>,
        disutility: Arc<dyn TravelDisutility>,
        turn_costs: TurnCosts,
    ) -> Result<Self, RoutingError> {
        let travel_time = travel_time
            .into_link_to_link()
            .ok_or(RoutingError::UnsupportedCostProvider)?;
        info!("Creating turn aware router with {turn_costs:?}");
        let inverted = InvertedGraph::build(&network, turn_costs);
        Ok(TurnAwareRouter {
            network,
            inverted,
            travel_time,
            disutility,
        })
    }

    /// Router which only uses links allowing `mode`.
    pub fn for_mode(
        network: Arc<Network>,
        mode: &str,
        travel_time: Arc<dyn TravelTime>,
        disutility: Arc<dyn TravelDisutility>,
        turn_costs: TurnCosts,
    ) -> Result<Self, RoutingError> {
        let travel_time = travel_time
            .into_link_to_link()
            .ok_or(RoutingError::UnsupportedCostProvider)?;
        info!("Creating turn aware router for mode {mode} with {turn_costs:?}");
        let inverted = InvertedGraph::build_for_mode(&network, mode, turn_costs);
        Ok(TurnAwareRouter {
            network,
            inverted,
            travel_time,
            disutility,
        })
    }

    pub fn inverted_graph(&self) -> &InvertedGraph {
        &self.inverted
    }

    fn link(&self, request_link: Id<Link>) -> Result<&Link, RoutingError> {
        self.network
            .try_link(request_link)
            .ok_or(RoutingError::UnknownLink(request_link))
    }
}

impl Router for TurnAwareRouter {
    #[instrument(level = "trace", skip(self), fields(from = %request.from_link, to = %request.to_link))]
    fn calc_route(&self, request: &RoutingRequest) -> Result<Route, RoutingError> {
        let origin = self.link(request.from_link)?;
        let destination = self.link(request.to_link)?;
        if origin.id == destination.id {
            return Ok(Route::single_link(origin.id));
        }

        let vehicle_type = request.vehicle_type.as_deref();
        let path = Dijkstra::least_cost_path(
            self.inverted.graph(),
            InvertedGraph::inverted_node(origin.id),
            InvertedGraph::inverted_node(destination.id),
            request.departure_time,
            |turn_index, time| {
                let turn = self.inverted.turn(turn_index);
                let from = self.network.get_link(turn.from_link);
                let to = self.network.get_link(turn.to_link);
                EdgeCost {
                    travel_time: self.travel_time.link_to_link_travel_time(
                        from,
                        to,
                        time,
                        request.driver,
                        vehicle_type,
                    ),
                    cost: self
                        .disutility
                        .link_travel_disutility(from, time, request.driver, vehicle_type)
                        + turn.cost,
                }
            },
        )
        .ok_or(RoutingError::NoRouteFound {
            from: origin.id,
            to: destination.id,
        })?;

        // inverted nodes are links. The first and last one are origin and destination.
        let links = path.nodes.iter().map(|n| InvertedGraph::link(*n)).collect();
        Ok(Route::new(links, path.travel_time, path.travel_cost))
    }
}
