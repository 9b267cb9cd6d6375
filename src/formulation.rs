use std::collections::HashMap;
use std::fmt;

use crate::engine::{LinExpr, Model, Row, VarId, VarKind};
use crate::error::{Error, Result};
use crate::graph::{Arc, DiGraph, Node, Triplet};

/// Which integer-programming formulation a solver instance uses to enforce
/// that the selected arcs form an elementary source-sink path.
///
/// Selector codes follow the original numbering: compact extended
/// formulations (MCF, SF, RLT, MTZ, DL) enforce acyclicity statically,
/// while the dynamic ones (SC, MinCut, DFJ, MCFsep) start from the plain
/// degree model and add violated subtour elimination constraints during
/// the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Formulation {
    /// Degree constraints only; solutions may contain extraneous cycles.
    None,
    /// Multi-commodity flow: one connectivity commodity per node.
    Mcf,
    /// Dynamic SEC separation via strong components.
    StrongComponent,
    /// Dynamic SEC separation via minimum cuts.
    MinCut,
    /// Single-commodity flow with node demands.
    SingleFlow,
    /// Linearized potential products with McCormick envelopes.
    Rlt,
    /// Miller-Tucker-Zemlin node potentials.
    Mtz,
    /// Desrochers-Laporte strengthening of MTZ.
    DesrochersLaporte,
    /// DFJ subtour rows generated dynamically. Experimental.
    Dfj,
    /// Cut-set rows of the MCF formulation generated dynamically.
    McfRowGeneration,
}

impl Formulation {
    pub const ALL: [Formulation; 10] = [
        Formulation::None,
        Formulation::Mcf,
        Formulation::StrongComponent,
        Formulation::MinCut,
        Formulation::SingleFlow,
        Formulation::Rlt,
        Formulation::Mtz,
        Formulation::DesrochersLaporte,
        Formulation::Dfj,
        Formulation::McfRowGeneration,
    ];

    /// True for formulations that rely on separation callbacks.
    pub fn is_dynamic(self) -> bool {
        matches!(
            self,
            Formulation::StrongComponent
                | Formulation::MinCut
                | Formulation::Dfj
                | Formulation::McfRowGeneration
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Formulation::None => "NONE",
            Formulation::Mcf => "MCF",
            Formulation::StrongComponent => "SC",
            Formulation::MinCut => "MinCut",
            Formulation::SingleFlow => "SF",
            Formulation::Rlt => "RLT",
            Formulation::Mtz => "MTZ",
            Formulation::DesrochersLaporte => "DL",
            Formulation::Dfj => "DFJ",
            Formulation::McfRowGeneration => "MCFsep",
        }
    }
}

impl fmt::Display for Formulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<i32> for Formulation {
    type Error = Error;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            0 => Ok(Formulation::None),
            1 => Ok(Formulation::Mcf),
            2 => Ok(Formulation::StrongComponent),
            3 => Ok(Formulation::MinCut),
            4 => Ok(Formulation::SingleFlow),
            5 => Ok(Formulation::Rlt),
            6 => Ok(Formulation::Mtz),
            7 => Ok(Formulation::DesrochersLaporte),
            8 => Ok(Formulation::Dfj),
            9 => Ok(Formulation::McfRowGeneration),
            other => Err(Error::UnknownFormulation(other)),
        }
    }
}

/// Handles of every variable a formulation created, keyed the way the
/// model pieces reference them. Which maps are populated depends on the
/// formulation; the arc indicators always exist. The set is fixed once
/// [`build`] returns: later updates touch bounds and objective
/// coefficients only, never the constraint topology.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    /// Arc indicator variables, one per graph arc.
    pub arc: HashMap<Arc, VarId>,
    /// Commodity flow variables of the MCF formulation.
    pub flow: HashMap<(Node, Arc), VarId>,
    /// Flow variables of the single-flow formulation.
    pub single_flow: HashMap<Arc, VarId>,
    /// Product variables of the RLT formulation; (i, j, k) carries the
    /// linearization of `u_k * x_ij` for k in {i, j}.
    pub product: HashMap<Triplet, VarId>,
    /// Node potential variables of MTZ, DL and RLT.
    pub potential: HashMap<Node, VarId>,
}

/// Builds the static part of the chosen formulation into `model`.
///
/// Every formulation gets one indicator per arc (binary, or continuous in
/// [0, 1] when `relax` is set) plus the source/sink degree model; the
/// compact formulations add their extended variables and linking rows.
///
/// # Errors
/// Fails when `source == sink` or either endpoint is not in the graph.
pub fn build(
    model: &mut Model,
    graph: &DiGraph,
    source: Node,
    sink: Node,
    formulation: Formulation,
    relax: bool,
) -> Result<Variables> {
    if source == sink {
        return Err(Error::SourceEqualsSink(source));
    }
    if !graph.contains_node(source) {
        return Err(Error::UnknownNode(source));
    }
    if !graph.contains_node(sink) {
        return Err(Error::UnknownNode(sink));
    }

    let kind = if relax {
        VarKind::Continuous
    } else {
        VarKind::Binary
    };
    let mut vars = Variables::default();
    for &arc in graph.arcs() {
        vars.arc.insert(arc, model.add_var(kind, 0.0, 1.0));
    }

    add_degree_rows(model, graph, &vars, source, sink);

    match formulation {
        Formulation::None
        | Formulation::StrongComponent
        | Formulation::MinCut
        | Formulation::Dfj
        | Formulation::McfRowGeneration => {}
        Formulation::Mcf => add_commodity_flow_rows(model, graph, &mut vars, source),
        Formulation::SingleFlow => add_single_flow_rows(model, graph, &mut vars, source),
        Formulation::Rlt => add_rlt_rows(model, graph, &mut vars),
        Formulation::Mtz => add_potential_rows(model, graph, &mut vars, false),
        Formulation::DesrochersLaporte => add_potential_rows(model, graph, &mut vars, true),
    }

    Ok(vars)
}

fn out_expr(graph: &DiGraph, vars: &Variables, node: Node) -> LinExpr {
    graph
        .out_neighbors(node)
        .iter()
        .map(|&j| (vars.arc[&Arc::new(node, j)], 1.0))
        .collect()
}

fn in_expr(graph: &DiGraph, vars: &Variables, node: Node) -> LinExpr {
    graph
        .in_neighbors(node)
        .iter()
        .map(|&i| (vars.arc[&Arc::new(i, node)], 1.0))
        .collect()
}

/// Path degree model shared by every formulation: the source emits one
/// arc and absorbs none, the sink absorbs one and emits none, and every
/// other node is either skipped or passed through exactly once.
fn add_degree_rows(model: &mut Model, graph: &DiGraph, vars: &Variables, source: Node, sink: Node) {
    model.add_row(Row::eq(out_expr(graph, vars, source), 1.0));
    model.add_row(Row::eq(in_expr(graph, vars, source), 0.0));
    model.add_row(Row::eq(in_expr(graph, vars, sink), 1.0));
    model.add_row(Row::eq(out_expr(graph, vars, sink), 0.0));
    for &i in graph.nodes() {
        if i == source || i == sink {
            continue;
        }
        let mut balance = in_expr(graph, vars, i);
        for &j in graph.out_neighbors(i) {
            balance.add(vars.arc[&Arc::new(i, j)], -1.0);
        }
        model.add_row(Row::eq(balance, 0.0));
        model.add_row(Row::le(in_expr(graph, vars, i), 1.0));
    }
}

/// MCF: one connectivity commodity per node k != source. If k has an
/// incoming selected arc, a unit of flow bounded by the indicators must
/// reach it from the source, which rules out cycles detached from the
/// path by construction.
fn add_commodity_flow_rows(model: &mut Model, graph: &DiGraph, vars: &mut Variables, source: Node) {
    for &k in graph.nodes() {
        if k == source {
            continue;
        }
        for &arc in graph.arcs() {
            let y = model.add_var(VarKind::Continuous, 0.0, 1.0);
            vars.flow.insert((k, arc), y);
            let mut link = LinExpr::new();
            link.add(y, 1.0).add(vars.arc[&arc], -1.0);
            model.add_row(Row::le(link, 0.0));
        }
        let visit = in_expr(graph, vars, k);
        for &i in graph.nodes() {
            let mut balance = LinExpr::new();
            for &j in graph.in_neighbors(i) {
                balance.add(vars.flow[&(k, Arc::new(j, i))], 1.0);
            }
            for &j in graph.out_neighbors(i) {
                balance.add(vars.flow[&(k, Arc::new(i, j))], -1.0);
            }
            if i == source {
                // The source injects the commodity's demand.
                for &(v, c) in visit.terms() {
                    balance.add(v, c);
                }
            } else if i == k {
                // k absorbs one unit iff it is visited.
                for &(v, c) in visit.terms() {
                    balance.add(v, -c);
                }
            }
            model.add_row(Row::eq(balance, 0.0));
        }
    }
}

/// SF: a single flow where every visited node absorbs one unit; arcs may
/// carry at most (n - 1) units and only when selected.
fn add_single_flow_rows(model: &mut Model, graph: &DiGraph, vars: &mut Variables, source: Node) {
    let capacity = (graph.num_nodes() - 1) as f64;
    for &arc in graph.arcs() {
        let f = model.add_var(VarKind::Continuous, 0.0, capacity);
        vars.single_flow.insert(arc, f);
        let mut link = LinExpr::new();
        link.add(f, 1.0).add(vars.arc[&arc], -capacity);
        model.add_row(Row::le(link, 0.0));
    }
    for &i in graph.nodes() {
        if i == source {
            continue;
        }
        let mut balance = LinExpr::new();
        for &j in graph.in_neighbors(i) {
            balance.add(vars.single_flow[&Arc::new(j, i)], 1.0);
        }
        for &j in graph.out_neighbors(i) {
            balance.add(vars.single_flow[&Arc::new(i, j)], -1.0);
        }
        for &j in graph.in_neighbors(i) {
            balance.add(vars.arc[&Arc::new(j, i)], -1.0);
        }
        model.add_row(Row::eq(balance, 0.0));
    }
}

/// RLT: node potentials with the products `u_i * x_ij` and `u_j * x_ij`
/// linearized exactly through their McCormick envelopes, plus the
/// precedence identity `u_j x_ij = u_i x_ij + x_ij` per arc. Along any
/// selected cycle the potentials would have to increase forever, so
/// cycles are infeasible.
fn add_rlt_rows(model: &mut Model, graph: &DiGraph, vars: &mut Variables) {
    let bound = (graph.num_nodes() - 1) as f64;
    for &i in graph.nodes() {
        vars.potential
            .insert(i, model.add_var(VarKind::Continuous, 0.0, bound));
    }
    for &arc in graph.arcs() {
        let x = vars.arc[&arc];
        let mut envelope = |node: Node, key: Triplet| -> VarId {
            let p = model.add_var(VarKind::Continuous, 0.0, bound);
            vars.product.insert(key, p);
            let u = vars.potential[&node];
            let mut cap = LinExpr::new();
            cap.add(p, 1.0).add(x, -bound);
            model.add_row(Row::le(cap, 0.0));
            let mut below = LinExpr::new();
            below.add(p, 1.0).add(u, -1.0);
            model.add_row(Row::le(below, 0.0));
            let mut above = LinExpr::new();
            above.add(p, 1.0).add(u, -1.0).add(x, -bound);
            model.add_row(Row::ge(above, -bound));
            p
        };
        let tail_product = envelope(arc.tail, (arc.tail, arc.head, arc.tail));
        let head_product = envelope(arc.head, (arc.tail, arc.head, arc.head));
        let mut precedence = LinExpr::new();
        precedence
            .add(head_product, 1.0)
            .add(tail_product, -1.0)
            .add(x, -1.0);
        model.add_row(Row::eq(precedence, 0.0));
    }
}

/// MTZ potentials, optionally with the Desrochers-Laporte reverse-arc
/// lifting. A selected arc forces the head's potential one above the
/// tail's, which no cycle can satisfy.
fn add_potential_rows(model: &mut Model, graph: &DiGraph, vars: &mut Variables, strengthened: bool) {
    let n = graph.num_nodes() as f64;
    for &i in graph.nodes() {
        vars.potential
            .insert(i, model.add_var(VarKind::Continuous, 0.0, n - 1.0));
    }
    for &arc in graph.arcs() {
        let mut row = LinExpr::new();
        row.add(vars.potential[&arc.tail], 1.0)
            .add(vars.potential[&arc.head], -1.0)
            .add(vars.arc[&arc], n);
        if strengthened {
            let reverse = Arc::new(arc.head, arc.tail);
            if graph.contains_arc(reverse) {
                row.add(vars.arc[&reverse], n - 2.0);
            }
        }
        model.add_row(Row::le(row, n - 1.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_graph() -> DiGraph {
        let mut g = DiGraph::new();
        g.add_arc(1, 2, 3.0).unwrap();
        g.add_arc(2, 3, 4.0).unwrap();
        g.add_arc(1, 3, 2.0).unwrap();
        g.add_arc(3, 4, 5.0).unwrap();
        g.add_arc(4, 5, 1.0).unwrap();
        g
    }

    fn build_toy(formulation: Formulation) -> (Model, Variables) {
        let g = toy_graph();
        let mut model = Model::new();
        let vars = build(&mut model, &g, 1, 5, formulation, false).unwrap();
        (model, vars)
    }

    #[test]
    fn test_selector_codes_round_trip() {
        for (code, form) in Formulation::ALL.iter().enumerate() {
            assert_eq!(Formulation::try_from(code as i32).unwrap(), *form);
        }
        assert!(matches!(
            Formulation::try_from(10),
            Err(Error::UnknownFormulation(10))
        ));
        assert!(matches!(
            Formulation::try_from(-1),
            Err(Error::UnknownFormulation(-1))
        ));
    }

    #[test]
    fn test_display_names() {
        assert_eq!(Formulation::StrongComponent.to_string(), "SC");
        assert_eq!(Formulation::McfRowGeneration.to_string(), "MCFsep");
        assert_eq!(Formulation::DesrochersLaporte.to_string(), "DL");
    }

    #[test]
    fn test_dynamic_flags() {
        let dynamic: Vec<_> = Formulation::ALL
            .iter()
            .filter(|f| f.is_dynamic())
            .collect();
        assert_eq!(
            dynamic,
            [
                &Formulation::StrongComponent,
                &Formulation::MinCut,
                &Formulation::Dfj,
                &Formulation::McfRowGeneration
            ]
        );
    }

    #[test]
    fn test_source_equals_sink_fails() {
        let g = toy_graph();
        let mut model = Model::new();
        assert!(matches!(
            build(&mut model, &g, 3, 3, Formulation::StrongComponent, false),
            Err(Error::SourceEqualsSink(3))
        ));
    }

    #[test]
    fn test_unknown_endpoint_fails() {
        let g = toy_graph();
        let mut model = Model::new();
        assert!(matches!(
            build(&mut model, &g, 1, 9, Formulation::Mtz, false),
            Err(Error::UnknownNode(9))
        ));
    }

    #[test]
    fn test_degree_model_size() {
        let (model, vars) = build_toy(Formulation::StrongComponent);
        assert_eq!(model.num_vars(), 5);
        assert_eq!(vars.arc.len(), 5);
        // 4 endpoint rows + 2 rows per intermediate node
        assert_eq!(model.num_rows(), 10);
        assert!(vars.flow.is_empty());
        assert!(vars.potential.is_empty());
    }

    #[test]
    fn test_mcf_size() {
        let (model, vars) = build_toy(Formulation::Mcf);
        // 4 commodities, 5 flow vars each, plus the 5 indicators
        assert_eq!(model.num_vars(), 25);
        assert_eq!(vars.flow.len(), 20);
        // degree rows + per commodity: 5 linking rows + 5 balance rows
        assert_eq!(model.num_rows(), 10 + 4 * 10);
    }

    #[test]
    fn test_single_flow_size() {
        let (model, vars) = build_toy(Formulation::SingleFlow);
        assert_eq!(model.num_vars(), 10);
        assert_eq!(vars.single_flow.len(), 5);
        assert_eq!(model.num_rows(), 10 + 5 + 4);
    }

    #[test]
    fn test_mtz_size() {
        let (model, vars) = build_toy(Formulation::Mtz);
        assert_eq!(model.num_vars(), 10);
        assert_eq!(vars.potential.len(), 5);
        assert_eq!(model.num_rows(), 10 + 5);
    }

    #[test]
    fn test_rlt_size() {
        let (model, vars) = build_toy(Formulation::Rlt);
        // indicators + potentials + two products per arc
        assert_eq!(model.num_vars(), 5 + 5 + 10);
        assert_eq!(vars.product.len(), 10);
        // degree rows + 7 rows per arc
        assert_eq!(model.num_rows(), 10 + 5 * 7);
    }

    #[test]
    fn test_relax_builds_continuous_indicators() {
        let g = toy_graph();
        let mut model = Model::new();
        build(&mut model, &g, 1, 5, Formulation::Mtz, true).unwrap();
        assert_eq!(model.binary_vars().count(), 0);
    }
}
