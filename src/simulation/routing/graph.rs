use tracing::debug;

use crate::simulation::network::Network;

/// Forward graph in compressed sparse row layout. The out-edges of node `n` are stored at
/// `first_out[n]..first_out[n + 1]` in `head` (target node) and `edge_data` (an index chosen by
/// whoever builds the graph, e.g. the link id or the turn index).
#[derive(Clone, Debug, PartialEq)]
pub struct Graph {
    pub first_out: Vec<usize>,
    pub head: Vec<usize>,
    pub edge_data: Vec<usize>,
}

impl Graph {
    /// Builds a graph from per-node adjacency lists of `(head, edge_data)` pairs. Edge order
    /// within a node is kept.
    pub fn from_adjacency(adjacency: Vec<Vec<(usize, usize)>>) -> Self {
        let mut first_out = Vec::with_capacity(adjacency.len() + 1);
        let mut head = Vec::new();
        let mut edge_data = Vec::new();
        first_out.push(0);
        for edges in adjacency {
            for (h, data) in edges {
                head.push(h);
                edge_data.push(data);
            }
            first_out.push(head.len());
        }
        Graph {
            first_out,
            head,
            edge_data,
        }
    }

    /// Graph with one node per network node and one edge per link allowing `mode`. Without a
    /// mode every link is included. Edge data is the link index.
    pub fn from_network(network: &Network, mode: Option<&str>) -> Self {
        let adjacency = network
            .nodes()
            .iter()
            .map(|node| {
                node.out_links
                    .iter()
                    .map(|id| network.get_link(*id))
                    .filter(|link| mode.is_none_or(|m| link.allows_mode(m)))
                    .map(|link| (link.to.index(), link.id.index()))
                    .collect()
            })
            .collect();
        let graph = Self::from_adjacency(adjacency);
        debug!(
            "Converted network into graph with {} nodes and {} edges for mode {:?}",
            graph.number_of_nodes(),
            graph.number_of_edges(),
            mode
        );
        graph
    }

    pub fn number_of_nodes(&self) -> usize {
        self.first_out.len() - 1
    }

    pub fn number_of_edges(&self) -> usize {
        self.head.len()
    }

    /// Indices into `head` and `edge_data` of the out-edges of `node`.
    pub fn out_edges(&self, node: usize) -> std::ops::Range<usize> {
        self.first_out[node]..self.first_out[node + 1]
    }
}
