use tracing::info;

use crate::simulation::error::ConfigurationError;
use crate::simulation::network::{LinkAttributes, Network};

/// Creates a square grid of `size` x `size` nodes, `spacing` meters apart. Neighbouring nodes are
/// connected by a link in each direction. Node ids are `x_y`, link ids `x_y-x_y` from the from-node
/// to the to-node. The link length is always `spacing`.
pub fn create_grid(
    size: u32,
    spacing: f64,
    attributes: &LinkAttributes,
) -> Result<Network, ConfigurationError> {
    let mut network = Network::new();
    let mut nodes = Vec::with_capacity((size * size) as usize);
    for y in 0..size {
        for x in 0..size {
            let id = network.add_node(&node_id(x, y), x as f64 * spacing, y as f64 * spacing)?;
            nodes.push(id);
        }
    }

    let attributes = LinkAttributes {
        length: spacing,
        ..attributes.clone()
    };
    for y in 0..size {
        for x in 0..size {
            let mut neighbours = Vec::with_capacity(2);
            if x + 1 < size {
                neighbours.push((x + 1, y));
            }
            if y + 1 < size {
                neighbours.push((x, y + 1));
            }
            for (nx, ny) in neighbours {
                let here = nodes[(y * size + x) as usize];
                let there = nodes[(ny * size + nx) as usize];
                let forward = format!("{}-{}", node_id(x, y), node_id(nx, ny));
                let backward = format!("{}-{}", node_id(nx, ny), node_id(x, y));
                network.add_link(&forward, here, there, attributes.clone())?;
                network.add_link(&backward, there, here, attributes.clone())?;
            }
        }
    }

    info!(
        "Created grid network with {} nodes and {} links",
        network.nodes().len(),
        network.links().len()
    );
    Ok(network)
}

fn node_id(x: u32, y: u32) -> String {
    format!("{x}_{y}")
}
