use thiserror::Error;

use crate::simulation::id::Id;
use crate::simulation::network::{Link, Node};
use crate::simulation::routing::RoutingError;
use crate::simulation::vehicles::InternalVehicle;

/// Errors which abort a simulation run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("storage capacity of link {link} exceeded: occupancy {occupancy} > capacity {capacity}")]
    CapacityInvariantViolation {
        link: Id<Link>,
        occupancy: f32,
        capacity: f32,
    },

    #[error(transparent)]
    Routing(#[from] RoutingError),
}

/// Inconsistent network or route input. Detected when the network is loaded or when a vehicle is
/// inserted.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("node id '{0}' is already taken")]
    DuplicateNode(String),

    #[error("link id '{0}' is already taken")]
    DuplicateLink(String),

    #[error("unknown node {0}")]
    UnknownNode(Id<Node>),

    #[error("unknown link {0}")]
    UnknownLink(Id<Link>),

    #[error("link {link} has invalid attribute {attribute} = {value}")]
    InvalidLinkAttribute {
        link: String,
        attribute: &'static str,
        value: f64,
    },

    #[error("link {link} is not an in-link of node {node}")]
    MissingInLink { node: Id<Node>, link: Id<Link> },

    #[error("link {link} is not an out-link of node {node}")]
    MissingOutLink { node: Id<Node>, link: Id<Link> },

    #[error("vehicle {0} has an empty route")]
    EmptyRoute(Id<InternalVehicle>),

    #[error("route of vehicle {vehicle} is disconnected between links {from} and {to}")]
    DisconnectedRoute {
        vehicle: Id<InternalVehicle>,
        from: Id<Link>,
        to: Id<Link>,
    },

    #[error("turn from link {from} to link {to} at node {node} is not allowed")]
    IllegalTurn {
        node: Id<Node>,
        from: Id<Link>,
        to: Id<Link>,
    },

    #[error("mode '{mode}' is not allowed on link {link}")]
    ModeNotAllowed { link: Id<Link>, mode: String },

    #[error("vehicle {vehicle} with pce {pce} does not fit onto link {link} with storage capacity {capacity}")]
    VehicleExceedsStorage {
        vehicle: Id<InternalVehicle>,
        link: Id<Link>,
        pce: f32,
        capacity: f32,
    },

    #[error("no engine simulates mode '{0}'")]
    UnsupportedMode(String),
}

pub type SimulationResult<T> = Result<T, SimulationError>;
