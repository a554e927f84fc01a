use ahash::AHashSet;
use nohash_hasher::IntMap;
use tracing::debug;

use crate::simulation::error::ConfigurationError;
use crate::simulation::id::{Id, IdStore};
use crate::simulation::vehicles::InternalVehicle;

pub mod activation;
pub mod flow_cap;
pub mod grid;
pub mod link;
pub mod sim_network;
pub mod storage_cap;

/// Static network model. Nodes and links are stored in flat vectors indexed by their internal id.
/// The network is immutable once it is handed to engines and routers, which share it through an
/// `Arc`.
#[derive(Debug)]
pub struct Network {
    node_ids: IdStore<Node>,
    link_ids: IdStore<Link>,
    nodes: Vec<Node>,
    links: Vec<Link>,
    pub effective_cell_size: f32,
}

#[derive(Debug)]
pub struct Node {
    pub id: Id<Node>,
    pub x: f64,
    pub y: f64,
    pub in_links: Vec<Id<Link>>,
    pub out_links: Vec<Id<Link>>,
    // in-link -> allowed out-links. Absent entries allow every out-link.
    turn_restrictions: IntMap<Id<Link>, Vec<Id<Link>>>,
}

#[derive(Debug)]
pub struct Link {
    pub id: Id<Link>,
    pub from: Id<Node>,
    pub to: Id<Node>,
    pub length: f64,
    /// veh/h, unscaled.
    pub capacity: f32,
    pub freespeed: f32,
    pub permlanes: f32,
    /// Allowed modes. An empty set allows every mode.
    pub modes: AHashSet<String>,
    /// Storage capacity in pce set by the loader. Overrides the value derived from length and lanes.
    pub storage_capacity: Option<f32>,
}

/// Attributes of a link as handed to [Network::add_link].
#[derive(Debug, Clone)]
pub struct LinkAttributes {
    pub length: f64,
    pub capacity: f32,
    pub freespeed: f32,
    pub permlanes: f32,
    pub modes: Vec<String>,
    pub storage_capacity: Option<f32>,
}

impl Default for LinkAttributes {
    fn default() -> Self {
        LinkAttributes {
            length: 100.,
            capacity: 3600.,
            freespeed: 10.,
            permlanes: 1.,
            modes: Vec::new(),
            storage_capacity: None,
        }
    }
}

impl LinkAttributes {
    pub fn new(length: f64, capacity: f32, freespeed: f32, permlanes: f32) -> Self {
        LinkAttributes {
            length,
            capacity,
            freespeed,
            permlanes,
            ..Default::default()
        }
    }

    pub fn with_modes(mut self, modes: &[&str]) -> Self {
        self.modes = modes.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_storage_capacity(mut self, storage_capacity: f32) -> Self {
        self.storage_capacity = Some(storage_capacity);
        self
    }
}

impl Default for Network {
    fn default() -> Self {
        Network::new()
    }
}

impl Network {
    pub fn new() -> Self {
        Network {
            node_ids: IdStore::new(),
            link_ids: IdStore::new(),
            nodes: Vec::new(),
            links: Vec::new(),
            effective_cell_size: 7.5,
        }
    }

    pub fn with_effective_cell_size(effective_cell_size: f32) -> Self {
        Network {
            effective_cell_size,
            ..Network::new()
        }
    }

    pub fn add_node(&mut self, external: &str, x: f64, y: f64) -> Result<Id<Node>, ConfigurationError> {
        if self.node_ids.contains(external) {
            return Err(ConfigurationError::DuplicateNode(String::from(external)));
        }
        let id = self.node_ids.create_id(external);
        self.nodes.push(Node {
            id,
            x,
            y,
            in_links: Vec::new(),
            out_links: Vec::new(),
            turn_restrictions: IntMap::default(),
        });
        Ok(id)
    }

    pub fn add_link(
        &mut self,
        external: &str,
        from: Id<Node>,
        to: Id<Node>,
        attributes: LinkAttributes,
    ) -> Result<Id<Link>, ConfigurationError> {
        if self.link_ids.contains(external) {
            return Err(ConfigurationError::DuplicateLink(String::from(external)));
        }
        for node in [from, to] {
            if node.index() >= self.nodes.len() {
                return Err(ConfigurationError::UnknownNode(node));
            }
        }
        Self::check_attribute(external, "length", attributes.length)?;
        Self::check_attribute(external, "capacity", attributes.capacity as f64)?;
        Self::check_attribute(external, "freespeed", attributes.freespeed as f64)?;
        Self::check_attribute(external, "permlanes", attributes.permlanes as f64)?;

        let id = self.link_ids.create_id(external);
        // wire up in and out links and push link to the links vec
        self.nodes[from.index()].out_links.push(id);
        self.nodes[to.index()].in_links.push(id);
        self.links.push(Link {
            id,
            from,
            to,
            length: attributes.length,
            capacity: attributes.capacity,
            freespeed: attributes.freespeed,
            permlanes: attributes.permlanes,
            modes: attributes.modes.into_iter().collect(),
            storage_capacity: attributes.storage_capacity,
        });
        Ok(id)
    }

    fn check_attribute(link: &str, attribute: &'static str, value: f64) -> Result<(), ConfigurationError> {
        if value.is_finite() && value > 0. {
            Ok(())
        } else {
            Err(ConfigurationError::InvalidLinkAttribute {
                link: String::from(link),
                attribute,
                value,
            })
        }
    }

    /// Restricts the turns at `node` coming from `in_link` to `allowed_out_links`. An empty list
    /// turns `in_link` into a dead end at this node.
    pub fn set_turn_restriction(
        &mut self,
        node: Id<Node>,
        in_link: Id<Link>,
        allowed_out_links: Vec<Id<Link>>,
    ) -> Result<(), ConfigurationError> {
        let node_ref = self
            .nodes
            .get_mut(node.index())
            .ok_or(ConfigurationError::UnknownNode(node))?;
        if !node_ref.in_links.contains(&in_link) {
            return Err(ConfigurationError::MissingInLink { node, link: in_link });
        }
        if let Some(out) = allowed_out_links
            .iter()
            .find(|out| !node_ref.out_links.contains(out))
        {
            return Err(ConfigurationError::MissingOutLink { node, link: *out });
        }
        debug!(
            "Restricting turns at node {node} from link {in_link} to {:?}",
            allowed_out_links
        );
        node_ref.turn_restrictions.insert(in_link, allowed_out_links);
        Ok(())
    }

    pub fn get_node(&self, id: Id<Node>) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn get_link(&self, id: Id<Link>) -> &Link {
        &self.links[id.index()]
    }

    pub fn try_link(&self, id: Id<Link>) -> Option<&Link> {
        self.links.get(id.index())
    }

    pub fn try_node(&self, id: Id<Node>) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn link_id(&self, external: &str) -> Option<Id<Link>> {
        self.link_ids.get_from_ext(external)
    }

    pub fn node_id(&self, external: &str) -> Option<Id<Node>> {
        self.node_ids.get_from_ext(external)
    }

    pub fn external_link_id(&self, id: Id<Link>) -> Option<&str> {
        self.link_ids.external(id)
    }

    pub fn external_node_id(&self, id: Id<Node>) -> Option<&str> {
        self.node_ids.external(id)
    }

    pub fn is_turn_allowed(&self, from: Id<Link>, to: Id<Link>) -> bool {
        let from_link = self.get_link(from);
        let to_link = self.get_link(to);
        from_link.to == to_link.from && self.get_node(from_link.to).is_turn_allowed(from, to)
    }

    /// Out-links reachable from `link` at its to-node, in declaration order.
    pub fn allowed_turns(&self, link: Id<Link>) -> impl Iterator<Item = Id<Link>> + '_ {
        let node = self.get_node(self.get_link(link).to);
        node.out_links
            .iter()
            .copied()
            .filter(move |out| node.is_turn_allowed(link, *out))
    }

    /// Checks that a vehicle's route refers to known links which are pairwise connected, that all
    /// turns are legal and that the vehicle's mode is allowed on every link.
    pub fn validate_route(&self, vehicle: &InternalVehicle) -> Result<(), ConfigurationError> {
        self.validate_route_connectivity(vehicle)?;
        for pair in vehicle.route().links().windows(2) {
            let node = self.get_link(pair[0]).to;
            if !self.get_node(node).is_turn_allowed(pair[0], pair[1]) {
                return Err(ConfigurationError::IllegalTurn {
                    node,
                    from: pair[0],
                    to: pair[1],
                });
            }
        }
        Ok(())
    }

    /// Like [Network::validate_route], but ignores turn restrictions.
    pub fn validate_route_connectivity(&self, vehicle: &InternalVehicle) -> Result<(), ConfigurationError> {
        let links = vehicle.route().links();
        if links.is_empty() {
            return Err(ConfigurationError::EmptyRoute(vehicle.id));
        }
        for id in links {
            let link = self
                .try_link(*id)
                .ok_or(ConfigurationError::UnknownLink(*id))?;
            if !link.allows_mode(vehicle.mode()) {
                return Err(ConfigurationError::ModeNotAllowed {
                    link: *id,
                    mode: vehicle.mode().to_string(),
                });
            }
        }
        for pair in links.windows(2) {
            let (from, to) = (self.get_link(pair[0]), self.get_link(pair[1]));
            if from.to != to.from {
                return Err(ConfigurationError::DisconnectedRoute {
                    vehicle: vehicle.id,
                    from: from.id,
                    to: to.id,
                });
            }
        }
        Ok(())
    }
}

impl Node {
    pub fn is_turn_allowed(&self, in_link: Id<Link>, out_link: Id<Link>) -> bool {
        match self.turn_restrictions.get(&in_link) {
            Some(allowed) => allowed.contains(&out_link),
            None => self.out_links.contains(&out_link),
        }
    }

    pub fn has_turn_restrictions(&self) -> bool {
        !self.turn_restrictions.is_empty()
    }
}

impl Link {
    pub fn allows_mode(&self, mode: &str) -> bool {
        self.modes.is_empty() || self.modes.contains(mode)
    }

    /// Free flow travel time, bounded below by one time step.
    pub fn free_speed_travel_time(&self, max_v: Option<f32>) -> f64 {
        let speed = match max_v {
            Some(v) => self.freespeed.min(v),
            None => self.freespeed,
        };
        f64::max(1., self.length / speed as f64)
    }
}
