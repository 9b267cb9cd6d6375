//! On-the-fly separation of violated subtour elimination constraints.
//!
//! Both separators follow the same shape: build the support graph induced
//! by the non-negligible arc values, detect structure that no elementary
//! source-sink path can contain, and emit the corresponding valid
//! inequalities, ranked by violation and capped per invocation. They are
//! stateless across invocations apart from a diagnostic cut counter, and
//! allocate all scratch per call, so the engine may probe them from
//! several worker threads at once.

pub mod maxflow;
pub mod scc;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;
use rayon::prelude::*;

use crate::engine::{CallbackNode, CutSeparator, LinExpr, Row, VarId};
use crate::formulation::Variables;
use crate::graph::{Arc, DiGraph, Node};

use maxflow::MaxFlow;

/// Arcs at an integer candidate count as selected above this value.
const INTEGER_THRESHOLD: f64 = 0.5;

fn support_threshold(node: CallbackNode, epsilon: f64) -> f64 {
    match node {
        CallbackNode::Integer => INTEGER_THRESHOLD,
        CallbackNode::Fractional => epsilon,
    }
}

/// Ranks candidate cuts by decreasing violation and keeps at most
/// `max_cuts` of them (negative means all).
fn select_cuts(
    mut candidates: Vec<(f64, Row)>,
    max_cuts: i32,
    counter: &AtomicUsize,
) -> Vec<Row> {
    candidates.sort_by(|a, b| b.0.total_cmp(&a.0));
    if max_cuts >= 0 {
        candidates.truncate(max_cuts as usize);
    }
    counter.fetch_add(candidates.len(), Ordering::Relaxed);
    if !candidates.is_empty() {
        debug!("separation emitted {} cut(s)", candidates.len());
    }
    candidates.into_iter().map(|(_, row)| row).collect()
}

/// SEC separation via strong-component decomposition of the support
/// graph. Every non-singleton component S disjoint from the endpoints
/// yields, per witness node k in S, the inequality
///
/// ```text
/// sum(x[a] for a leaving S)  >=  sum(x[a] for a leaving k)
/// ```
///
/// which every elementary source-sink path satisfies: if the path visits
/// k it must leave S on its way to the sink. With `dfj` set the DFJ form
/// `sum(x[a] inside S) <= |S| - 1` is emitted instead.
pub struct StrongComponentSeparator<'a> {
    graph: &'a DiGraph,
    source: Node,
    sink: Node,
    arc_vars: Vec<(Arc, VarId)>,
    by_arc: HashMap<Arc, VarId>,
    epsilon: f64,
    max_cuts: i32,
    dfj: bool,
    counter: AtomicUsize,
}

impl<'a> StrongComponentSeparator<'a> {
    pub fn new(
        graph: &'a DiGraph,
        source: Node,
        sink: Node,
        vars: &Variables,
        epsilon: f64,
        max_cuts: i32,
        dfj: bool,
    ) -> Self {
        Self {
            graph,
            source,
            sink,
            arc_vars: graph.arcs().iter().map(|&a| (a, vars.arc[&a])).collect(),
            by_arc: vars.arc.clone(),
            epsilon,
            max_cuts,
            dfj,
            counter: AtomicUsize::new(0),
        }
    }

    /// Total cuts emitted over the separator's lifetime.
    pub fn cuts_found(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }
}

impl CutSeparator for StrongComponentSeparator<'_> {
    fn separate(&self, node: CallbackNode, values: &[f64]) -> Vec<Row> {
        let threshold = support_threshold(node, self.epsilon);

        let mut support_nodes: Vec<Node> = Vec::new();
        let mut in_support: HashSet<Node> = HashSet::new();
        let mut adj: HashMap<Node, Vec<Node>> = HashMap::new();
        for (arc, var) in &self.arc_vars {
            if values[var.index()] > threshold {
                adj.entry(arc.tail).or_default().push(arc.head);
                for n in [arc.tail, arc.head] {
                    if in_support.insert(n) {
                        support_nodes.push(n);
                    }
                }
            }
        }

        let mut candidates: Vec<(f64, Row)> = Vec::new();
        for component in scc::strongly_connected_components(&support_nodes, &adj) {
            if component.len() < 2
                || component.contains(&self.source)
                || component.contains(&self.sink)
            {
                continue;
            }
            let members: HashSet<Node> = component.iter().copied().collect();
            if self.dfj {
                let mut inside = LinExpr::new();
                let mut inside_value = 0.0;
                for (arc, var) in &self.arc_vars {
                    if members.contains(&arc.tail) && members.contains(&arc.head) {
                        inside.add(*var, 1.0);
                        inside_value += values[var.index()];
                    }
                }
                let rhs = (component.len() - 1) as f64;
                let violation = inside_value - rhs;
                if violation > self.epsilon {
                    candidates.push((violation, Row::le(inside, rhs)));
                }
            } else {
                let mut leaving = LinExpr::new();
                let mut leaving_value = 0.0;
                for (arc, var) in &self.arc_vars {
                    if members.contains(&arc.tail) && !members.contains(&arc.head) {
                        leaving.add(*var, 1.0);
                        leaving_value += values[var.index()];
                    }
                }
                for &k in &component {
                    let mut witness_value = 0.0;
                    let mut expr = leaving.clone();
                    for &j in self.graph.out_neighbors(k) {
                        let var = self.by_arc[&Arc::new(k, j)];
                        expr.add(var, -1.0);
                        witness_value += values[var.index()];
                    }
                    let violation = witness_value - leaving_value;
                    if violation > self.epsilon {
                        candidates.push((violation, Row::ge(expr, 0.0)));
                    }
                }
            }
        }

        select_cuts(candidates, self.max_cuts, &self.counter)
    }
}

/// SEC separation via minimum cuts: a node k with visit value v_k must
/// receive v_k units of source flow inside the value-weighted support
/// graph. When the minimum source-k cut is smaller, the saturated side A
/// yields
///
/// ```text
/// sum(x[a] for a leaving A)  >=  sum(x[a] for a entering k)
/// ```
///
/// This is the row-generation realization of the connectivity the
/// compact MCF formulation states with its commodity blocks. Candidates
/// are independent and are evaluated in parallel.
pub struct MinCutSeparator<'a> {
    graph: &'a DiGraph,
    source: Node,
    sink: Node,
    arc_vars: HashMap<Arc, VarId>,
    epsilon: f64,
    max_cuts: i32,
    counter: AtomicUsize,
}

impl<'a> MinCutSeparator<'a> {
    pub fn new(
        graph: &'a DiGraph,
        source: Node,
        sink: Node,
        vars: &Variables,
        epsilon: f64,
        max_cuts: i32,
    ) -> Self {
        Self {
            graph,
            source,
            sink,
            arc_vars: vars.arc.clone(),
            epsilon,
            max_cuts,
            counter: AtomicUsize::new(0),
        }
    }

    pub fn cuts_found(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }

    fn visit_value(&self, k: Node, values: &[f64]) -> f64 {
        self.graph
            .in_neighbors(k)
            .iter()
            .map(|&j| values[self.arc_vars[&Arc::new(j, k)].index()])
            .sum()
    }
}

impl CutSeparator for MinCutSeparator<'_> {
    fn separate(&self, node: CallbackNode, values: &[f64]) -> Vec<Row> {
        let threshold = support_threshold(node, self.epsilon);

        // Compact indices over the support nodes, source included.
        let mut index: HashMap<Node, usize> = HashMap::new();
        let mut support_arcs: Vec<(Arc, f64)> = Vec::new();
        for (&arc, var) in &self.arc_vars {
            let value = values[var.index()];
            if value > threshold {
                support_arcs.push((arc, value));
                for n in [arc.tail, arc.head] {
                    let next = index.len();
                    index.entry(n).or_insert(next);
                }
            }
        }
        let next = index.len();
        let source_idx = *index.entry(self.source).or_insert(next);

        let mut template = MaxFlow::new(index.len());
        for &(arc, value) in &support_arcs {
            template.add_edge(index[&arc.tail], index[&arc.head], value);
        }

        let candidates: Vec<Node> = self
            .graph
            .nodes()
            .iter()
            .copied()
            .filter(|&k| k != self.source && k != self.sink)
            .filter(|&k| self.visit_value(k, values) > self.epsilon)
            .collect();

        let found: Vec<(f64, Row)> = candidates
            .par_iter()
            .filter_map(|&k| {
                let k_idx = *index.get(&k)?;
                let visit = self.visit_value(k, values);
                let mut network = template.clone();
                let flow = network.max_flow(source_idx, k_idx);
                if flow >= visit - self.epsilon {
                    return None;
                }
                let side = network.min_cut_side(source_idx);
                let in_side =
                    |n: Node| index.get(&n).map(|&i| side[i]).unwrap_or(false);
                let mut expr = LinExpr::new();
                let mut leaving_value = 0.0;
                for (&arc, var) in &self.arc_vars {
                    if in_side(arc.tail) && !in_side(arc.head) {
                        expr.add(*var, 1.0);
                        leaving_value += values[var.index()];
                    }
                }
                let violation = visit - leaving_value;
                if violation <= self.epsilon {
                    return None;
                }
                for &j in self.graph.in_neighbors(k) {
                    expr.add(self.arc_vars[&Arc::new(j, k)], -1.0);
                }
                Some((violation, Row::ge(expr, 0.0)))
            })
            .collect();

        select_cuts(found, self.max_cuts, &self.counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Model, VarKind};
    use crate::formulation;
    use crate::formulation::Formulation;

    /// Path 1 -> 2 -> 5 plus the detached cycle 3 -> 4 -> 6 -> 3.
    fn decoy_graph() -> DiGraph {
        let mut g = DiGraph::new();
        g.add_arc(1, 2, 1.0).unwrap();
        g.add_arc(2, 5, 1.0).unwrap();
        g.add_arc(3, 4, 10.0).unwrap();
        g.add_arc(4, 6, 10.0).unwrap();
        g.add_arc(6, 3, 10.0).unwrap();
        g
    }

    fn built(graph: &DiGraph) -> (Model, Variables) {
        let mut model = Model::new();
        let vars =
            formulation::build(&mut model, graph, 1, 5, Formulation::StrongComponent, false)
                .unwrap();
        (model, vars)
    }

    fn assignment(vars: &Variables, model: &Model, selected: &[(i64, i64)]) -> Vec<f64> {
        let mut values = vec![0.0; model.num_vars()];
        for &(i, j) in selected {
            values[vars.arc[&Arc::new(i, j)].index()] = 1.0;
        }
        values
    }

    #[test]
    fn test_strong_component_detects_cycle() {
        let g = decoy_graph();
        let (model, vars) = built(&g);
        let sep = StrongComponentSeparator::new(&g, 1, 5, &vars, 1e-3, -1, false);
        let values = assignment(&vars, &model, &[(1, 2), (2, 5), (3, 4), (4, 6), (6, 3)]);
        let cuts = sep.separate(CallbackNode::Integer, &values);
        assert!(!cuts.is_empty());
        assert_eq!(sep.cuts_found(), cuts.len());
        // Every emitted cut must be violated by the current point and
        // satisfied by the plain path.
        let path = assignment(&vars, &model, &[(1, 2), (2, 5)]);
        for cut in &cuts {
            assert!(cut.expr.value(&values) < cut.lb - 1e-6 || cut.expr.value(&values) > cut.ub + 1e-6);
            assert!(cut.expr.value(&path) >= cut.lb - 1e-9);
            assert!(cut.expr.value(&path) <= cut.ub + 1e-9);
        }
    }

    #[test]
    fn test_strong_component_clean_on_path() {
        let g = decoy_graph();
        let (model, vars) = built(&g);
        let sep = StrongComponentSeparator::new(&g, 1, 5, &vars, 1e-3, -1, false);
        let values = assignment(&vars, &model, &[(1, 2), (2, 5)]);
        assert!(sep.separate(CallbackNode::Integer, &values).is_empty());
        assert_eq!(sep.cuts_found(), 0);
    }

    #[test]
    fn test_dfj_form() {
        let g = decoy_graph();
        let (model, vars) = built(&g);
        let sep = StrongComponentSeparator::new(&g, 1, 5, &vars, 1e-3, -1, true);
        let values = assignment(&vars, &model, &[(1, 2), (2, 5), (3, 4), (4, 6), (6, 3)]);
        let cuts = sep.separate(CallbackNode::Integer, &values);
        assert_eq!(cuts.len(), 1);
        // sum of the three cycle arcs <= 2
        assert_eq!(cuts[0].ub, 2.0);
        assert!((cuts[0].expr.value(&values) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_min_cut_detects_cycle() {
        let g = decoy_graph();
        let (model, vars) = built(&g);
        let sep = MinCutSeparator::new(&g, 1, 5, &vars, 1e-3, -1);
        let values = assignment(&vars, &model, &[(1, 2), (2, 5), (3, 4), (4, 6), (6, 3)]);
        let cuts = sep.separate(CallbackNode::Integer, &values);
        assert!(!cuts.is_empty());
        let path = assignment(&vars, &model, &[(1, 2), (2, 5)]);
        for cut in &cuts {
            assert!(cut.expr.value(&values) < cut.lb - 1e-6);
            assert!(cut.expr.value(&path) >= cut.lb - 1e-9);
        }
    }

    #[test]
    fn test_min_cut_clean_on_path() {
        let g = decoy_graph();
        let (model, vars) = built(&g);
        let sep = MinCutSeparator::new(&g, 1, 5, &vars, 1e-3, -1);
        let values = assignment(&vars, &model, &[(1, 2), (2, 5)]);
        assert!(sep.separate(CallbackNode::Integer, &values).is_empty());
    }

    /// Two detached cycles; the cap must keep only the most violated cut.
    #[test]
    fn test_max_cuts_cap() {
        let mut g = decoy_graph();
        g.add_arc(7, 8, 10.0).unwrap();
        g.add_arc(8, 9, 10.0).unwrap();
        g.add_arc(9, 7, 10.0).unwrap();
        let (model, vars) = built(&g);
        let values = assignment(
            &vars,
            &model,
            &[(1, 2), (2, 5), (3, 4), (4, 6), (6, 3), (7, 8), (8, 9), (9, 7)],
        );

        let capped = StrongComponentSeparator::new(&g, 1, 5, &vars, 1e-3, 1, false);
        assert_eq!(capped.separate(CallbackNode::Integer, &values).len(), 1);

        let unbounded = StrongComponentSeparator::new(&g, 1, 5, &vars, 1e-3, -1, false);
        assert!(unbounded.separate(CallbackNode::Integer, &values).len() >= 2);
    }

    #[test]
    fn test_fractional_threshold_respects_epsilon() {
        let g = decoy_graph();
        let (model, vars) = built(&g);
        let sep = StrongComponentSeparator::new(&g, 1, 5, &vars, 1e-3, -1, false);
        // Cycle at value 0.4: invisible to the integer support, visible to
        // the fractional one.
        let mut values = vec![0.0; model.num_vars()];
        for &(i, j) in &[(3, 4), (4, 6), (6, 3)] {
            values[vars.arc[&Arc::new(i, j)].index()] = 0.4;
        }
        assert!(sep.separate(CallbackNode::Integer, &values).is_empty());
        assert!(!sep.separate(CallbackNode::Fractional, &values).is_empty());
    }
}
