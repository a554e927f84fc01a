use tracing::info;

use crate::simulation::id::Id;
use crate::simulation::network::{Link, Network, Node};
use crate::simulation::routing::graph::Graph;

/// Costs added on top of the link disutility when turning from one link into another.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TurnCosts {
    pub turn_penalty: f64,
    pub u_turn_penalty: f64,
}

/// A legal turn at `node` from `from_link` into `to_link`.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub node: Id<Node>,
    pub from_link: Id<Link>,
    pub to_link: Id<Link>,
    pub cost: f64,
}

/// Link-to-node inverted network. Every link becomes an inverted node with the same index and every
/// legal turn an inverted edge whose edge data is the index into [InvertedGraph::turns].
#[derive(Debug, Clone)]
pub struct InvertedGraph {
    graph: Graph,
    turns: Vec<Turn>,
}

impl InvertedGraph {
    pub fn build(network: &Network, turn_costs: TurnCosts) -> Self {
        Self::build_filtered(network, None, turn_costs)
    }

    /// Inverted graph which only contains turns between links allowing `mode`. Links which don't
    /// allow the mode remain as isolated inverted nodes, so that indices still match link ids.
    pub fn build_for_mode(network: &Network, mode: &str, turn_costs: TurnCosts) -> Self {
        Self::build_filtered(network, Some(mode), turn_costs)
    }

    fn build_filtered(network: &Network, mode: Option<&str>, turn_costs: TurnCosts) -> Self {
        let allowed = |link: &Link| mode.is_none_or(|m| link.allows_mode(m));
        let mut turns = Vec::new();
        let mut adjacency = Vec::with_capacity(network.links().len());
        for from in network.links() {
            let mut edges = Vec::new();
            if !allowed(from) {
                adjacency.push(edges);
                continue;
            }
            for to_id in network.allowed_turns(from.id) {
                if !allowed(network.get_link(to_id)) {
                    continue;
                }
                let u_turn = network.get_link(to_id).to == from.from;
                let cost =
                    turn_costs.turn_penalty + if u_turn { turn_costs.u_turn_penalty } else { 0. };
                edges.push((to_id.index(), turns.len()));
                turns.push(Turn {
                    node: from.to,
                    from_link: from.id,
                    to_link: to_id,
                    cost,
                });
            }
            adjacency.push(edges);
        }
        let graph = Graph::from_adjacency(adjacency);
        info!(
            "Built inverted graph with {} inverted nodes and {} turns for mode {:?}",
            graph.number_of_nodes(),
            turns.len(),
            mode
        );
        InvertedGraph { graph, turns }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn turn(&self, index: usize) -> &Turn {
        &self.turns[index]
    }

    pub fn inverted_node(link: Id<Link>) -> usize {
        link.index()
    }

    pub fn link(inverted_node: usize) -> Id<Link> {
        Id::new(inverted_node as u32)
    }
}
