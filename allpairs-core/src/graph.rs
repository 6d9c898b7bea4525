//! Adjacency-list ingestion
//!
//! Input is one line per vertex (the vertex id is the 0-based line number),
//! holding alternating `destination,weight` tokens:
//!
//! ```text
//! 2,1,3,4      vertex 0: 0 -> 2 (weight 1), 0 -> 3 (weight 4)
//! 0,7          vertex 1: 1 -> 0 (weight 7)
//! ```
//!
//! Commas and whitespace both separate tokens and empty tokens are ignored.
//! A line with an odd token count, a non-numeric token or a negative number
//! fails the whole ingestion; no edge of a malformed line is ever applied.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use allpairs_common::{Error, Result, Weight};
use log::debug;

use crate::matrix::DistanceMatrix;

/// Directed, weighted edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub origin: usize,
    pub destination: usize,
    pub weight: Weight,
}

impl Edge {
    /// Self-loops always get weight 0 (distance to self)
    pub fn new(origin: usize, destination: usize, weight: Weight) -> Self {
        let weight = if origin == destination { 0 } else { weight };
        Self {
            origin,
            destination,
            weight,
        }
    }

    pub fn is_self_loop(&self) -> bool {
        self.origin == self.destination
    }
}

/// Split one adjacency line into edges leaving `vertex`
pub fn parse_adjacency_line(vertex: usize, line: &str) -> Result<Vec<Edge>> {
    let tokens: Vec<&str> = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .collect();

    if tokens.len() % 2 != 0 {
        return Err(Error::malformed(
            vertex,
            format!("odd number of tokens ({}); expected destination,weight pairs", tokens.len()),
        ));
    }

    tokens
        .chunks_exact(2)
        .map(|pair| {
            let destination = pair[0].parse::<usize>().map_err(|e| {
                Error::malformed(vertex, format!("bad destination '{}': {e}", pair[0]))
            })?;
            let weight = pair[1].parse::<u32>().map_err(|e| {
                Error::malformed(vertex, format!("bad weight '{}': {e}", pair[1]))
            })?;
            Ok(Edge::new(vertex, destination, Weight::from(weight)))
        })
        .collect()
}

/// Directed graph as per-vertex edge lists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    adjacency: Vec<Vec<Edge>>,
}

impl Graph {
    /// Parse one adjacency line per vertex
    pub fn from_lines<I, S>(lines: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let adjacency = lines
            .into_iter()
            .enumerate()
            .map(|(vertex, line)| parse_adjacency_line(vertex, line.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let graph = Self { adjacency };
        debug!(
            "parsed graph: {} vertices, {} edges",
            graph.vertex_count(),
            graph.edge_count()
        );
        Ok(graph)
    }

    /// Read one adjacency line per vertex
    ///
    /// Trailing blank lines end the input; a blank line followed by more
    /// data is a vertex without outgoing edges.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut lines = BufReader::new(reader)
            .lines()
            .collect::<std::io::Result<Vec<_>>>()?;
        while lines.last().is_some_and(|line| line.trim().is_empty()) {
            lines.pop();
        }
        Self::from_lines(lines)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_reader(File::open(path)?)
    }

    /// Build directly from edges over `vertex_count` vertices
    pub fn from_edges(vertex_count: usize, edges: impl IntoIterator<Item = Edge>) -> Self {
        let mut adjacency = vec![Vec::new(); vertex_count];
        for edge in edges {
            if edge.origin >= adjacency.len() {
                adjacency.resize(edge.origin + 1, Vec::new());
            }
            adjacency[edge.origin].push(edge);
        }
        Self { adjacency }
    }

    pub fn vertex_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    /// Edges leaving `vertex` (empty for unknown vertices)
    pub fn edges(&self, vertex: usize) -> &[Edge] {
        self.adjacency.get(vertex).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum()
    }

    /// Sum of every edge weight
    ///
    /// No shortest path can exceed it, so reporting uses it to tell
    /// unreachable cells apart from long finite distances.
    pub fn total_weight(&self) -> Weight {
        self.adjacency
            .iter()
            .flatten()
            .map(|edge| edge.weight)
            .sum()
    }

    /// Fresh matrix: diagonal 0, edges at their weight, everything else
    /// unreachable. Duplicate edges: last one wins.
    pub fn seed_matrix(&self) -> Result<DistanceMatrix> {
        let dimension = self.vertex_count();
        let matrix = DistanceMatrix::unreachable(dimension);
        self.seed_into(&matrix)?;
        Ok(matrix)
    }

    /// Seed an already allocated matrix (overwrites the touched cells only)
    pub fn seed_into(&self, matrix: &DistanceMatrix) -> Result<()> {
        for (vertex, edges) in self.adjacency.iter().enumerate() {
            if !matrix.set(vertex, vertex, 0) {
                return Err(Error::EdgeOutOfRange {
                    origin: vertex,
                    destination: vertex,
                    dimension: matrix.dimension(),
                });
            }
            for edge in edges {
                if !matrix.set(edge.origin, edge.destination, edge.weight) {
                    return Err(Error::EdgeOutOfRange {
                        origin: edge.origin,
                        destination: edge.destination,
                        dimension: matrix.dimension(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Parse adjacency lines and seed a matrix in one step
pub fn ingest<I, S>(lines: I) -> Result<DistanceMatrix>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Graph::from_lines(lines)?.seed_matrix()
}

#[cfg(test)]
mod tests {
    use super::*;
    use allpairs_common::UNREACHABLE;
    use std::io::Write;

    #[test]
    fn parses_pairs_and_normalizes_self_loop() {
        let edges = parse_adjacency_line(0, "0,5,3,12,1,6").unwrap();
        assert_eq!(
            edges,
            vec![Edge::new(0, 0, 0), Edge::new(0, 3, 12), Edge::new(0, 1, 6)]
        );
        assert_eq!(edges[0].weight, 0);
        assert!(edges[0].is_self_loop());
    }

    #[test]
    fn tolerates_whitespace_and_trailing_commas() {
        let edges = parse_adjacency_line(1, "  2, 1,3 ,4,  ").unwrap();
        assert_eq!(edges, vec![Edge::new(1, 2, 1), Edge::new(1, 3, 4)]);
        assert!(parse_adjacency_line(1, "").unwrap().is_empty());
    }

    #[test]
    fn rejects_odd_token_count() {
        let err = parse_adjacency_line(2, "1,4,3").unwrap_err();
        assert!(matches!(err, Error::MalformedInput { vertex: 2, .. }));
    }

    #[test]
    fn rejects_non_numeric_and_negative_tokens() {
        assert!(parse_adjacency_line(0, "1,x").is_err());
        assert!(parse_adjacency_line(0, "1,-4").is_err());
        assert!(parse_adjacency_line(0, "-1,4").is_err());
    }

    #[test]
    fn malformed_line_fails_the_whole_graph() {
        let result = Graph::from_lines(["1,2", "0,1,9"]);
        assert!(matches!(
            result,
            Err(Error::MalformedInput { vertex: 1, .. })
        ));
    }

    #[test]
    fn seeding_sets_diagonal_and_edges_only() {
        let graph = Graph::from_lines(["1,4", "2,7", ""]).unwrap();
        let m = graph.seed_matrix().unwrap();
        for v in 0..3 {
            assert_eq!(m.get(v, v).unwrap(), 0);
        }
        assert_eq!(m.get(0, 1).unwrap(), 4);
        assert_eq!(m.get(1, 2).unwrap(), 7);
        assert_eq!(m.get(2, 0).unwrap(), UNREACHABLE);
        assert_eq!(m.get(0, 2).unwrap(), UNREACHABLE);
    }

    #[test]
    fn duplicate_edges_last_write_wins() {
        let m = ingest(["1,9,1,3", ""]).unwrap();
        assert_eq!(m.get(0, 1).unwrap(), 3);
    }

    #[test]
    fn destination_outside_graph_fails_seeding() {
        let graph = Graph::from_lines(["5,1", ""]).unwrap();
        assert!(matches!(
            graph.seed_matrix(),
            Err(Error::EdgeOutOfRange { origin: 0, destination: 5, dimension: 2 })
        ));
    }

    #[test]
    fn reader_drops_trailing_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1,3").unwrap();
        writeln!(file, "0,2").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "   ").unwrap();

        let graph = Graph::from_path(file.path()).unwrap();
        assert_eq!(graph.vertex_count(), 2);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.total_weight(), 5);
    }

    #[test]
    fn interior_blank_line_is_a_vertex_without_edges() {
        let graph = Graph::from_reader("1,3\n\n0,1\n".as_bytes()).unwrap();
        assert_eq!(graph.vertex_count(), 3);
        assert!(graph.edges(1).is_empty());
        assert_eq!(graph.edges(2), &[Edge::new(2, 0, 1)]);
    }

    #[test]
    fn from_edges_groups_by_origin() {
        let graph = Graph::from_edges(3, [Edge::new(2, 0, 4), Edge::new(0, 1, 1)]);
        assert_eq!(graph.vertex_count(), 3);
        assert_eq!(graph.edges(2), &[Edge::new(2, 0, 4)]);
        assert!(graph.edges(1).is_empty());
        assert!(graph.edges(9).is_empty());
    }
}
