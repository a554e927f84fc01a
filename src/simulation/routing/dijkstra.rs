use std::cmp::Ordering;

use keyed_priority_queue::KeyedPriorityQueue;

use crate::simulation::routing::graph::Graph;

/// Queue priority. Lower cost first, on equal cost the lower node index first.
#[derive(Debug, Clone, Copy)]
pub struct Distance {
    cost: f64,
    node: usize,
}

impl Ord for Distance {
    fn cmp(&self, other: &Self) -> Ordering {
        // KeyedPriorityQueue is a max heap
        self.cost
            .total_cmp(&other.cost)
            .then(self.node.cmp(&other.node))
            .reverse()
    }
}

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Distance {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Distance {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeCost {
    pub travel_time: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub nodes: Vec<usize>,
    /// edge data of the traversed edges
    pub edges: Vec<usize>,
    pub travel_time: f64,
    pub travel_cost: f64,
}

/// Label setting, time dependent Dijkstra. The cost function receives the edge data and the time
/// at which the edge is entered.
pub struct Dijkstra {}

impl Dijkstra {
    pub fn least_cost_path<F>(
        graph: &Graph,
        from: usize,
        to: usize,
        start_time: f64,
        mut edge_cost: F,
    ) -> Option<Path>
    where
        F: FnMut(usize, f64) -> EdgeCost,
    {
        let node_count = graph.number_of_nodes();
        if from >= node_count || to >= node_count {
            return None;
        }

        let mut costs = vec![f64::INFINITY; node_count];
        let mut times = vec![start_time; node_count];
        // index of the edge over which a node was reached
        let mut predecessors: Vec<Option<usize>> = vec![None; node_count];
        let mut settled = vec![false; node_count];
        let mut queue = KeyedPriorityQueue::new();

        costs[from] = 0.;
        queue.push(from, Distance { cost: 0., node: from });

        while let Some((current, distance)) = queue.pop() {
            settled[current] = true;
            if current == to {
                return Some(Self::collect_path(
                    graph,
                    &predecessors,
                    from,
                    to,
                    times[to] - start_time,
                    distance.cost,
                ));
            }

            for edge in graph.out_edges(current) {
                let neighbour = graph.head[edge];
                if settled[neighbour] {
                    continue;
                }
                let EdgeCost { travel_time, cost } = edge_cost(graph.edge_data[edge], times[current]);
                let new_cost = distance.cost + cost;
                if new_cost < costs[neighbour] {
                    costs[neighbour] = new_cost;
                    times[neighbour] = times[current] + travel_time;
                    predecessors[neighbour] = Some(edge);
                    // push updates the priority if the node is queued already
                    queue.push(
                        neighbour,
                        Distance {
                            cost: new_cost,
                            node: neighbour,
                        },
                    );
                }
            }
        }
        None
    }

    fn collect_path(
        graph: &Graph,
        predecessors: &[Option<usize>],
        from: usize,
        to: usize,
        travel_time: f64,
        travel_cost: f64,
    ) -> Path {
        let mut nodes = vec![to];
        let mut edges = Vec::new();
        let mut current = to;
        while current != from {
            let Some(edge) = predecessors[current] else {
                break;
            };
            edges.push(graph.edge_data[edge]);
            current = Self::tail(graph, edge);
            nodes.push(current);
        }
        nodes.reverse();
        edges.reverse();
        Path {
            nodes,
            edges,
            travel_time,
            travel_cost,
        }
    }

    fn tail(graph: &Graph, edge: usize) -> usize {
        // first_out is sorted, the tail is the last node whose first edge is <= edge
        graph.first_out.partition_point(|first| *first <= edge) - 1
    }
}
