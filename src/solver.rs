use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use approx::abs_diff_eq;
use log::debug;

use crate::engine::{
    BranchAndCut, IlpEngine, LinExpr, Model, Row, RowId, SearchMode, Sense, Solution, Status,
};
use crate::error::{Error, Result};
use crate::formulation::{self, Formulation, Variables};
use crate::graph::{Arc, DiGraph, Node};
use crate::separation::{MinCutSeparator, StrongComponentSeparator};

/// Knobs shared by every trial: LP-relax flag, wall-clock limit, cut
/// violation tolerance and the per-callback cut cap (-1 adds every
/// violated inequality found).
#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub relax: bool,
    pub time_limit: Duration,
    pub epsilon: f64,
    pub max_cuts: i32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            relax: false,
            time_limit: Duration::from_secs(1200),
            epsilon: 1e-3,
            max_cuts: 1,
        }
    }
}

/// Elementary longest path solver for one (source, sink, formulation)
/// trial.
///
/// The model is built once at construction; afterwards the objective,
/// indicator bounds and the single replaceable side constraint can be
/// swapped any number of times without touching the variable or
/// constraint topology, so the same instance serves many cost vectors
/// cheaply. The borrowed graph is never copied or mutated.
///
/// # Examples
/// ```
/// use elpp::graph::DiGraph;
/// use elpp::{ElppSolver, Formulation, SolverConfig, Status};
///
/// let mut g = DiGraph::new();
/// g.add_arc(1, 2, 3.0).unwrap();
/// g.add_arc(2, 3, 4.0).unwrap();
/// g.add_arc(1, 3, 2.0).unwrap();
///
/// let mut solver = ElppSolver::new(
///     &g,
///     (1, 3),
///     Formulation::StrongComponent,
///     SolverConfig::default(),
/// )
/// .unwrap();
/// solver.update_problem(g.costs()).unwrap();
/// assert_eq!(solver.solve(), Status::Optimal);
/// assert!((solver.objective_value().unwrap() - 7.0).abs() < 1e-6);
/// assert_eq!(solver.path(), Some(vec![1, 2, 3]));
/// ```
pub struct ElppSolver<'g> {
    graph: &'g DiGraph,
    source: Node,
    sink: Node,
    formulation: Formulation,
    config: SolverConfig,
    model: Model,
    vars: Variables,
    extra_row: RowId,
    engine: BranchAndCut,
    solution: Option<Solution>,
    ncuts: usize,
    elapsed: Duration,
}

impl<'g> ElppSolver<'g> {
    /// Builds the chosen formulation over the graph for one
    /// (source, sink) pair.
    ///
    /// # Errors
    /// Fails when the endpoints coincide or are missing from the graph.
    pub fn new(
        graph: &'g DiGraph,
        (source, sink): (Node, Node),
        form: Formulation,
        config: SolverConfig,
    ) -> Result<Self> {
        let mut model = Model::new();
        let vars = formulation::build(&mut model, graph, source, sink, form, config.relax)?;
        // Pre-allocated slot for the replaceable user constraint; free
        // until the first update that sets one.
        let extra_row = model.add_row(Row::new(
            LinExpr::new(),
            f64::NEG_INFINITY,
            f64::INFINITY,
        ));
        let engine = BranchAndCut::new(config.time_limit);
        debug!(
            "built {form} for ({source}, {sink}): {} vars, {} rows",
            model.num_vars(),
            model.num_rows()
        );
        Ok(Self {
            graph,
            source,
            sink,
            formulation: form,
            config,
            model,
            vars,
            extra_row,
            engine,
            solution: None,
            ncuts: 0,
            elapsed: Duration::ZERO,
        })
    }

    /// Overwrites the objective with the given per-arc coefficients; arcs
    /// absent from the map keep coefficient zero.
    pub fn update_problem(&mut self, obj: &HashMap<Arc, f64>) -> Result<()> {
        self.apply_objective(obj)?;
        self.solution = None;
        Ok(())
    }

    /// As [`Self::update_problem`], and additionally tightens every
    /// indicator to the given interval; arcs absent from the bound maps
    /// default to [0, 1].
    pub fn update_problem_with_bounds(
        &mut self,
        obj: &HashMap<Arc, f64>,
        lbs: &BTreeMap<Arc, f64>,
        ubs: &BTreeMap<Arc, f64>,
    ) -> Result<()> {
        self.apply_objective(obj)?;
        self.check_arcs(lbs.keys())?;
        self.check_arcs(ubs.keys())?;
        for &arc in self.graph.arcs() {
            let lb = lbs.get(&arc).copied().unwrap_or(0.0);
            let ub = ubs.get(&arc).copied().unwrap_or(1.0);
            self.model.set_var_bounds(self.vars.arc[&arc], lb, ub);
        }
        self.solution = None;
        Ok(())
    }

    /// As [`Self::update_problem_with_bounds`], and replaces the single
    /// extra user constraint with `sum(lhs[a] * x[a]) <= rhs`. At most one
    /// such constraint exists at a time.
    pub fn update_problem_with_side_constraint(
        &mut self,
        obj: &HashMap<Arc, f64>,
        lbs: &BTreeMap<Arc, f64>,
        ubs: &BTreeMap<Arc, f64>,
        lhs: &HashMap<Arc, f64>,
        rhs: f64,
    ) -> Result<()> {
        self.update_problem_with_bounds(obj, lbs, ubs)?;
        self.check_arcs(lhs.keys())?;
        let expr = self.arc_expr(lhs);
        self.model.set_row(self.extra_row, Row::le(expr, rhs));
        self.solution = None;
        Ok(())
    }

    /// Appends a permanent range constraint, distinct from the replaceable
    /// one above.
    pub fn add_constraint(&mut self, lhs: &HashMap<Arc, f64>, lb: f64, ub: f64) -> Result<()> {
        self.check_arcs(lhs.keys())?;
        let expr = self.arc_expr(lhs);
        self.model.add_row(Row::new(expr, lb, ub));
        self.solution = None;
        Ok(())
    }

    /// Full branch-and-cut to the configured time limit.
    pub fn solve(&mut self) -> Status {
        self.run(SearchMode::BranchAndCut)
    }

    /// Root relaxation plus root separation only; cheap strengthened
    /// bound, no branching.
    pub fn solve_root(&mut self) -> Status {
        self.run(SearchMode::RootOnly)
    }

    /// Continuous relaxation; separation, where applicable, still runs at
    /// the root.
    pub fn solve_lp(&mut self) -> Status {
        self.run(SearchMode::LpRelaxation)
    }

    /// Discards the current solution while keeping the built model, so the
    /// next solve starts from updated parameters.
    pub fn clear(&mut self) {
        self.solution = None;
    }

    pub fn status(&self) -> Status {
        self.solution
            .as_ref()
            .map(|s| s.status)
            .unwrap_or(Status::Unknown)
    }

    /// Objective of the incumbent (or of the relaxation for LP solves);
    /// `None` while no point is available.
    pub fn objective_value(&self) -> Option<f64> {
        self.solution
            .as_ref()
            .filter(|s| s.has_point())
            .map(|s| s.objective)
    }

    /// Best known dual bound, even when optimality was not proven.
    pub fn best_objective_value(&self) -> Option<f64> {
        self.solution
            .as_ref()
            .map(|s| s.best_bound)
            .filter(|b| b.is_finite())
    }

    /// Value of an arc indicator in the current solution.
    pub fn value(&self, arc: Arc) -> Option<f64> {
        let solution = self.solution.as_ref().filter(|s| s.has_point())?;
        let var = self.vars.arc.get(&arc)?;
        Some(solution.values[var.index()])
    }

    /// Value of a node's auxiliary variable (the potential in MTZ-family
    /// formulations); `None` for formulations without one.
    pub fn node_value(&self, node: Node) -> Option<f64> {
        let solution = self.solution.as_ref().filter(|s| s.has_point())?;
        let var = self.vars.potential.get(&node)?;
        Some(solution.values[var.index()])
    }

    /// True iff every arc indicator lies within the configured tolerance
    /// of 0 or 1.
    pub fn is_integer(&self) -> bool {
        let Some(solution) = self.solution.as_ref().filter(|s| s.has_point()) else {
            return false;
        };
        self.vars.arc.values().all(|var| {
            let v = solution.values[var.index()];
            abs_diff_eq!(v, 0.0, epsilon = self.config.epsilon)
                || abs_diff_eq!(v, 1.0, epsilon = self.config.epsilon)
        })
    }

    /// Number of arcs selected (indicator within tolerance of 1).
    pub fn path_length(&self) -> usize {
        let Some(solution) = self.solution.as_ref().filter(|s| s.has_point()) else {
            return 0;
        };
        self.vars
            .arc
            .values()
            .filter(|var| abs_diff_eq!(solution.values[var.index()], 1.0, epsilon = self.config.epsilon))
            .count()
    }

    /// The selected source-sink node sequence, when the current solution
    /// is an elementary path.
    pub fn path(&self) -> Option<Vec<Node>> {
        let solution = self.solution.as_ref().filter(|s| s.has_point())?;
        let mut next: HashMap<Node, Node> = HashMap::new();
        let mut selected = 0usize;
        for (&arc, var) in &self.vars.arc {
            if abs_diff_eq!(solution.values[var.index()], 1.0, epsilon = self.config.epsilon) {
                selected += 1;
                if next.insert(arc.tail, arc.head).is_some() {
                    return None;
                }
            }
        }
        let mut sequence = vec![self.source];
        let mut current = self.source;
        while current != self.sink {
            current = *next.get(&current)?;
            if sequence.contains(&current) {
                return None;
            }
            sequence.push(current);
        }
        // Selected arcs the walk never used mean the solution is not an
        // elementary path (e.g. a detached cycle in the NONE formulation).
        if selected != sequence.len() - 1 {
            return None;
        }
        Some(sequence)
    }

    /// Cuts generated by separation across all solves of this instance.
    pub fn cuts_added(&self) -> usize {
        self.ncuts
    }

    /// Wall-clock time of the last solve.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn formulation(&self) -> Formulation {
        self.formulation
    }

    fn run(&mut self, mode: SearchMode) -> Status {
        let started = Instant::now();
        let solution = match self.formulation {
            Formulation::StrongComponent | Formulation::Dfj => {
                let separator = StrongComponentSeparator::new(
                    self.graph,
                    self.source,
                    self.sink,
                    &self.vars,
                    self.config.epsilon,
                    self.config.max_cuts,
                    self.formulation == Formulation::Dfj,
                );
                let solution = self.engine.solve(&self.model, mode, Some(&separator));
                self.ncuts += separator.cuts_found();
                solution
            }
            Formulation::MinCut | Formulation::McfRowGeneration => {
                let separator = MinCutSeparator::new(
                    self.graph,
                    self.source,
                    self.sink,
                    &self.vars,
                    self.config.epsilon,
                    self.config.max_cuts,
                );
                let solution = self.engine.solve(&self.model, mode, Some(&separator));
                self.ncuts += separator.cuts_found();
                solution
            }
            _ => self.engine.solve(&self.model, mode, None),
        };
        self.elapsed = started.elapsed();
        let status = solution.status;
        self.solution = Some(solution);
        status
    }

    fn apply_objective(&mut self, obj: &HashMap<Arc, f64>) -> Result<()> {
        self.check_arcs(obj.keys())?;
        let coeffs: Vec<_> = self
            .graph
            .arcs()
            .iter()
            .filter_map(|arc| obj.get(arc).map(|&c| (self.vars.arc[arc], c)))
            .collect();
        self.model.set_objective(Sense::Maximize, coeffs);
        Ok(())
    }

    fn check_arcs<'a, I: Iterator<Item = &'a Arc>>(&self, mut arcs: I) -> Result<()> {
        match arcs.find(|&&arc| !self.graph.contains_arc(arc)) {
            Some(&arc) => Err(Error::UnknownArc(arc)),
            None => Ok(()),
        }
    }

    fn arc_expr(&self, coeffs: &HashMap<Arc, f64>) -> LinExpr {
        coeffs
            .iter()
            .map(|(arc, &c)| (self.vars.arc[arc], c))
            .collect()
    }
}
