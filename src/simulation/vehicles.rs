use std::sync::Arc;

use crate::simulation::id::Id;
use crate::simulation::network::Link;
use crate::simulation::routing::Route;

/// Marker type for driver ids. Plans and persons are kept outside of the simulation engines, which
/// only need to know who is driving for event output.
#[derive(Debug)]
pub struct Driver;

#[derive(Debug, Clone, PartialEq)]
pub struct InternalVehicleType {
    pub id: String,
    pub net_mode: String,
    pub max_v: f32,
    pub pce: f32,
}

impl InternalVehicleType {
    pub fn new(id: &str, net_mode: &str, max_v: f32, pce: f32) -> Self {
        InternalVehicleType {
            id: String::from(id),
            net_mode: String::from(net_mode),
            max_v,
            pce,
        }
    }
}

/// A vehicle travelling along its route. The route is fixed when the vehicle is created. The
/// engines only advance the index of the current link.
#[derive(Debug, Clone, PartialEq)]
pub struct InternalVehicle {
    pub id: Id<InternalVehicle>,
    pub driver: Id<Driver>,
    pub vehicle_type: Arc<InternalVehicleType>,
    route: Route,
    route_index: usize,
}

impl InternalVehicle {
    pub fn new(
        id: Id<InternalVehicle>,
        driver: Id<Driver>,
        vehicle_type: Arc<InternalVehicleType>,
        route: Route,
    ) -> Self {
        InternalVehicle {
            id,
            driver,
            vehicle_type,
            route,
            route_index: 0,
        }
    }

    pub fn max_v(&self) -> f32 {
        self.vehicle_type.max_v
    }

    pub fn pce(&self) -> f32 {
        self.vehicle_type.pce
    }

    pub fn mode(&self) -> &str {
        &self.vehicle_type.net_mode
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn route_index(&self) -> usize {
        self.route_index
    }

    pub fn curr_link_id(&self) -> Option<Id<Link>> {
        self.route.links().get(self.route_index).copied()
    }

    pub fn peek_next_link_id(&self) -> Option<Id<Link>> {
        self.route.links().get(self.route_index + 1).copied()
    }

    pub fn is_current_link_last(&self) -> bool {
        self.route_index + 1 >= self.route.links().len()
    }

    pub fn advance_route_index(&mut self) {
        self.route_index += 1;
    }
}
