//! Random adjacency-file generator
//!
//! Produces input in the format [`Graph::from_reader`](crate::graph::Graph::from_reader)
//! reads. Edges never point back at their origin.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use allpairs_common::Result;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    pub nodes: usize,
    /// Outgoing edges per node (the mean when `random_edges` is set)
    pub edges_per_node: usize,
    /// Draw each node's edge count from 2 × `edges_per_node` coin flips
    pub random_edges: bool,
    pub min_weight: u32,
    pub max_weight: u32,
    /// Fixed seed for reproducible graphs
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            nodes: 100,
            edges_per_node: 5,
            random_edges: false,
            min_weight: 1,
            max_weight: 100,
            seed: None,
        }
    }
}

impl GeneratorConfig {
    /// Replace unusable values with workable ones, logging each change
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.nodes <= 1 {
            warn!("nodes must be at least 2, using {}", defaults.nodes);
            self.nodes = defaults.nodes;
        }
        if self.edges_per_node < 1 {
            warn!("edges per node must be at least 1, using {}", defaults.edges_per_node);
            self.edges_per_node = defaults.edges_per_node;
        }
        if self.max_weight < self.min_weight {
            warn!("max weight below min weight, using {}", self.min_weight.saturating_add(1));
            self.max_weight = self.min_weight.saturating_add(1);
        }
        self
    }
}

/// One adjacency line per node
pub fn generate_lines(config: &GeneratorConfig) -> Vec<String> {
    let config = config.clone().sanitized();
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    (0..config.nodes)
        .map(|node| {
            let edge_count = if config.random_edges {
                (0..config.edges_per_node * 2)
                    .filter(|_| rng.gen_bool(0.5))
                    .count()
            } else {
                config.edges_per_node
            };

            let mut tokens = Vec::with_capacity(edge_count * 2);
            for _ in 0..edge_count {
                let destination = loop {
                    let candidate = rng.gen_range(0..config.nodes);
                    if candidate != node {
                        break candidate;
                    }
                };
                let weight = rng.gen_range(config.min_weight..=config.max_weight);
                tokens.push(destination.to_string());
                tokens.push(weight.to_string());
            }
            tokens.join(",")
        })
        .collect()
}

/// Generate a graph and write it to `path`
pub fn write_graph<P: AsRef<Path>>(path: P, config: &GeneratorConfig) -> Result<usize> {
    let lines = generate_lines(config);
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    for line in &lines {
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    info!("Wrote {} nodes to {}", lines.len(), path.as_ref().display());
    Ok(lines.len())
}
