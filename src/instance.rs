use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use log::warn;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{Error, Result};
use crate::graph::{Arc, DiGraph, Node};

/// A parsed problem instance: the graph plus optional per-arc indicator
/// bounds read from the data file.
#[derive(Debug, Clone)]
pub struct Instance {
    pub graph: DiGraph,
    pub lower: BTreeMap<Arc, f64>,
    pub upper: BTreeMap<Arc, f64>,
}

impl Instance {
    pub fn has_bounds(&self) -> bool {
        !self.lower.is_empty() || !self.upper.is_empty()
    }
}

/// Whitespace token stream over the instance data, matching the original
/// free-format layout:
///
/// ```text
/// n m
/// <n node ids>
/// <m lines: tail head cost>
/// <if bounds requested, m lines: tail head lowerBound upperBound>
/// ```
struct Tokens<'a> {
    iter: std::str::SplitWhitespace<'a>,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            iter: text.split_whitespace(),
        }
    }

    fn next<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let tok = self
            .iter
            .next()
            .ok_or_else(|| Error::Parse(format!("unexpected end of data, expected {what}")))?;
        tok.parse()
            .map_err(|_| Error::Parse(format!("invalid {what}: {tok:?}")))
    }
}

/// Reads an instance from any source. A bound line naming an arc that was
/// never declared is a fatal configuration error, never silently ignored.
pub fn read_instance<R: Read>(mut reader: R, with_bounds: bool) -> Result<Instance> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    let mut tokens = Tokens::new(&text);

    let n: usize = tokens.next("node count")?;
    let m: usize = tokens.next("arc count")?;

    let mut graph = DiGraph::new();
    for _ in 0..n {
        graph.add_node(tokens.next("node id")?);
    }
    for _ in 0..m {
        let tail: Node = tokens.next("arc tail")?;
        let head: Node = tokens.next("arc head")?;
        let cost: f64 = tokens.next("arc cost")?;
        graph.add_arc(tail, head, cost)?;
    }

    let mut lower = BTreeMap::new();
    let mut upper = BTreeMap::new();
    if with_bounds {
        for _ in 0..m {
            let tail: Node = tokens.next("bound tail")?;
            let head: Node = tokens.next("bound head")?;
            let lb: f64 = tokens.next("lower bound")?;
            let ub: f64 = tokens.next("upper bound")?;
            let arc = Arc::new(tail, head);
            if !graph.contains_arc(arc) {
                return Err(Error::UnknownArc(arc));
            }
            lower.insert(arc, lb);
            upper.insert(arc, ub);
        }
    }

    Ok(Instance {
        graph,
        lower,
        upper,
    })
}

pub fn read_instance_file<P: AsRef<Path>>(path: P, with_bounds: bool) -> Result<Instance> {
    read_instance(BufReader::new(File::open(path)?), with_bounds)
}

/// Reads a list of (source, sink) pairs. Pairs naming nodes absent from
/// the graph are skipped, matching the original driver.
pub fn read_pairs<R: Read>(mut reader: R, graph: &DiGraph) -> Result<Vec<(Node, Node)>> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    let mut tokens = Tokens::new(&text);

    let mut pairs = Vec::new();
    loop {
        let s: Node = match tokens.next("pair source") {
            Ok(s) => s,
            Err(_) => break,
        };
        let t: Node = tokens.next("pair sink")?;
        if graph.contains_node(s) && graph.contains_node(t) {
            pairs.push((s, t));
        } else {
            warn!("skipping pair ({s}, {t}): not in graph");
        }
    }
    Ok(pairs)
}

pub fn read_pairs_file<P: AsRef<Path>>(path: P, graph: &DiGraph) -> Result<Vec<(Node, Node)>> {
    read_pairs(BufReader::new(File::open(path)?), graph)
}

/// Draws `k` distinct nodes from `nodes` using a caller-owned random
/// source, so trials stay reproducible. Returns all of `nodes` when `k`
/// is zero or not smaller than the node count.
pub fn sample_nodes<R: Rng>(nodes: &[Node], k: usize, rng: &mut R) -> Vec<Node> {
    let mut sampled = nodes.to_vec();
    if k > 0 && k < sampled.len() {
        sampled.shuffle(rng);
        sampled.truncate(k);
    }
    sampled
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const TOY: &str = "\
5 5
1 2 3 4 5
1 2 3
2 3 4
1 3 2
3 4 5
4 5 1
";

    #[test]
    fn test_read_instance() {
        let instance = read_instance(TOY.as_bytes(), false).unwrap();
        let g = &instance.graph;
        assert_eq!(g.num_nodes(), 5);
        assert_eq!(g.num_arcs(), 5);
        assert_eq!(g.cost(Arc::new(3, 4)), Some(5.0));
        assert_eq!(g.out_neighbors(1), &[2, 3]);
        assert!(!instance.has_bounds());
    }

    #[test]
    fn test_read_instance_with_bounds() {
        let data = format!("{TOY}1 2 0 1\n2 3 0 0\n1 3 1 1\n3 4 0 1\n4 5 0 1\n");
        let instance = read_instance(data.as_bytes(), true).unwrap();
        assert_eq!(instance.lower[&Arc::new(1, 3)], 1.0);
        assert_eq!(instance.upper[&Arc::new(2, 3)], 0.0);
    }

    #[test]
    fn test_bound_for_unknown_arc_is_fatal() {
        let data = format!("{TOY}5 1 0 1\n2 3 0 0\n1 3 1 1\n3 4 0 1\n4 5 0 1\n");
        assert!(matches!(
            read_instance(data.as_bytes(), true),
            Err(Error::UnknownArc(_))
        ));
    }

    #[test]
    fn test_truncated_instance() {
        assert!(matches!(
            read_instance("3 2\n1 2 3\n1 2".as_bytes(), false),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_read_pairs_filters_unknown_nodes() {
        let instance = read_instance(TOY.as_bytes(), false).unwrap();
        let pairs = read_pairs("1 5\n9 2\n2 4\n".as_bytes(), &instance.graph).unwrap();
        assert_eq!(pairs, vec![(1, 5), (2, 4)]);
    }

    #[test]
    fn test_sample_nodes_reproducible() {
        let nodes = [1, 2, 3, 4, 5, 6, 7, 8];
        let a = sample_nodes(&nodes, 3, &mut ChaCha8Rng::seed_from_u64(2));
        let b = sample_nodes(&nodes, 3, &mut ChaCha8Rng::seed_from_u64(2));
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        assert!(a.iter().all(|n| nodes.contains(n)));
    }

    #[test]
    fn test_sample_nodes_zero_keeps_all() {
        let nodes = [1, 2, 3];
        let all = sample_nodes(&nodes, 0, &mut ChaCha8Rng::seed_from_u64(2));
        assert_eq!(all, nodes);
    }
}
