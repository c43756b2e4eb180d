use std::fmt;
use std::str::FromStr;

use rand::Rng;

use cellq::producer::SearchStep;
use cellq::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Edge {
    pub u: i32,
    pub v: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeParseError(String);

impl fmt::Display for EdgeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid edge {:?}, expected vertex1-vertex2", self.0)
    }
}

impl std::error::Error for EdgeParseError {}

impl FromStr for Edge {
    type Err = EdgeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || EdgeParseError(s.to_string());
        let (u, v) = s.split_once('-').ok_or_else(err)?;
        let u: i32 = u.parse().map_err(|_| err())?;
        let v: i32 = v.parse().map_err(|_| err())?;
        if u < 0 || v < 0 || u == v {
            return Err(err());
        }
        Ok(Edge {
            u: u.min(v),
            v: u.max(v),
        })
    }
}

/// Undirected graph over vertices `0..=max id`.
#[derive(Debug, Clone)]
pub struct Graph {
    vertices: usize,
    edges: Vec<Edge>,
}

impl Graph {
    pub fn new(mut edges: Vec<Edge>) -> Graph {
        edges.sort();
        edges.dedup();
        let vertices = edges.iter().map(|e| e.v as usize + 1).max().unwrap_or(0);
        Graph { vertices, edges }
    }

    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Graph, EdgeParseError> {
        let edges = args
            .iter()
            .map(|s| s.as_ref().parse())
            .collect::<Result<Vec<Edge>, _>>()?;
        Ok(Graph::new(edges))
    }

    pub fn vertices(&self) -> usize {
        self.vertices
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }
}

/// Colors every vertex at random with one of three colors and reports the
/// edges whose endpoints got the same color.
pub struct ColoringSearch<R> {
    graph: Graph,
    colors: Vec<u8>,
    rng: R,
}

impl<R: Rng> ColoringSearch<R> {
    pub fn new(graph: Graph, rng: R) -> Self {
        let colors = vec![0; graph.vertices()];
        ColoringSearch { graph, colors, rng }
    }

    fn conflicts(&self, record: &mut Record) {
        record.clear();
        for e in self.graph.edges() {
            if self.colors[e.u as usize] == self.colors[e.v as usize] {
                record.push_pair(e.u, e.v);
            }
        }
    }
}

impl<R: Rng> SearchStep for ColoringSearch<R> {
    fn max_pairs(&self) -> usize {
        self.graph.edges().len()
    }

    fn next_candidate(&mut self, record: &mut Record) {
        for color in self.colors.iter_mut() {
            *color = self.rng.gen_range(0..3);
        }
        self.conflicts(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn parses_and_normalizes_edges() {
        let graph = Graph::parse(&["2-0", "0-2", "1-3"]).unwrap();
        assert_eq!(graph.vertices(), 4);
        assert_eq!(graph.edges(), &[Edge { u: 0, v: 2 }, Edge { u: 1, v: 3 }]);
    }

    #[test]
    fn rejects_malformed_edges() {
        for bad in ["1", "a-b", "1-1", "-1-2", "1-2-3"] {
            assert!(bad.parse::<Edge>().is_err(), "{} should not parse", bad);
        }
    }

    #[test]
    fn conflicts_are_monochromatic_edges() {
        let graph = Graph::parse(&["0-1", "1-2", "0-2", "2-3"]).unwrap();
        let mut search = ColoringSearch::new(graph, StdRng::seed_from_u64(7));
        search.colors = vec![0, 0, 1, 1];
        let mut record = Record::with_max_pairs(search.max_pairs());
        search.conflicts(&mut record);
        assert_eq!(record.cells(), &[2, 0, 1, 2, 3]);
    }

    #[test]
    fn candidates_only_hold_graph_edges() {
        let graph = Graph::parse(&["0-1", "0-2", "0-3", "1-2", "1-3", "2-3"]).unwrap();
        let mut search = ColoringSearch::new(graph.clone(), StdRng::seed_from_u64(42));
        let mut record = Record::with_max_pairs(search.max_pairs());
        for _ in 0..100 {
            search.next_candidate(&mut record);
            // K4 is never 3-colorable.
            assert!(record.size() >= 1);
            for (u, v) in record.pairs() {
                assert!(graph.edges().contains(&Edge { u, v }));
            }
        }
    }
}
