use std::sync::Arc;

use derive_builder::Builder;
use thiserror::Error;
use tracing::warn;

use crate::simulation::id::Id;
use crate::simulation::network::{Link, Node};
use crate::simulation::vehicles::{Driver, InternalVehicleType};

pub mod dijkstra;
pub mod graph;
pub mod inverted_graph;
pub mod router;
pub mod travel_costs;
pub mod travel_time_collector;
pub mod turn_aware_router;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RoutingError {
    #[error("no route from link {from} to link {to}")]
    NoRouteFound { from: Id<Link>, to: Id<Link> },

    #[error("no path from node {from} to node {to}")]
    NoPathFound { from: Id<Node>, to: Id<Node> },

    #[error("travel time provider can't compute link to link travel times")]
    UnsupportedCostProvider,

    #[error("unknown link {0}")]
    UnknownLink(Id<Link>),

    #[error("unknown node {0}")]
    UnknownNode(Id<Node>),
}

impl RoutingError {
    /// Whether the error only concerns a single request. Other errors mean the router or its
    /// input is unusable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RoutingError::NoRouteFound { .. } | RoutingError::NoPathFound { .. }
        )
    }
}

/// Links from origin to destination, both included. `travel_time` and `travel_cost` cover the
/// origin link and all intermediate links, i.e. the way up to the start of the destination link.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    links: Vec<Id<Link>>,
    travel_time: f64,
    travel_cost: f64,
}

impl Route {
    pub fn new(links: Vec<Id<Link>>, travel_time: f64, travel_cost: f64) -> Self {
        Route {
            links,
            travel_time,
            travel_cost,
        }
    }

    /// Route of a trip which starts and ends on the same link.
    pub fn single_link(link: Id<Link>) -> Self {
        Route::new(vec![link], 0., 0.)
    }

    pub fn links(&self) -> &[Id<Link>] {
        &self.links
    }

    pub fn start_link(&self) -> Option<Id<Link>> {
        self.links.first().copied()
    }

    pub fn end_link(&self) -> Option<Id<Link>> {
        self.links.last().copied()
    }

    pub fn travel_time(&self) -> f64 {
        self.travel_time
    }

    pub fn travel_cost(&self) -> f64 {
        self.travel_cost
    }
}

#[derive(Debug, Clone, Builder)]
pub struct RoutingRequest {
    pub from_link: Id<Link>,
    pub to_link: Id<Link>,
    #[builder(default)]
    pub departure_time: f64,
    #[builder(default, setter(strip_option))]
    pub driver: Option<Id<Driver>>,
    #[builder(default, setter(strip_option))]
    pub vehicle_type: Option<Arc<InternalVehicleType>>,
}

impl RoutingRequest {
    pub fn new(from_link: Id<Link>, to_link: Id<Link>, departure_time: f64) -> Self {
        RoutingRequest {
            from_link,
            to_link,
            departure_time,
            driver: None,
            vehicle_type: None,
        }
    }
}

pub trait Router {
    fn calc_route(&self, request: &RoutingRequest) -> Result<Route, RoutingError>;

    /// Routes every request independently. Failed requests are logged and reported in place.
    fn calc_routes(&self, requests: &[RoutingRequest]) -> Vec<Result<Route, RoutingError>> {
        requests
            .iter()
            .map(|request| {
                let result = self.calc_route(request);
                if let Err(e) = &result {
                    warn!("Routing request {request:?} failed: {e}");
                }
                result
            })
            .collect()
    }
}
