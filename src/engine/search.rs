use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, warn};

use super::simplex::{self, DenseConstraint, DenseLp, LpOutcome, Relation};
use super::{Model, Row, Sense};

/// Outcome classification of a search, reported as a value: not being
/// solved to optimality is an expected result in this domain, never a
/// fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Optimal,
    Feasible,
    Infeasible,
    TimeLimitReached,
    Unknown,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Optimal => "Optimal",
            Status::Feasible => "Feasible",
            Status::Infeasible => "Infeasible",
            Status::TimeLimitReached => "TimeLimitReached",
            Status::Unknown => "Unknown",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Full branch-and-cut to optimality or the time limit.
    BranchAndCut,
    /// Root relaxation plus root separation, no branching.
    RootOnly,
    /// Continuous relaxation; separation, if any, still runs at the root.
    LpRelaxation,
}

/// Which kind of candidate point a separation callback is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackNode {
    Fractional,
    Integer,
}

/// Separation callback registered with the engine.
///
/// The engine may probe candidate points from several worker threads, so
/// implementations must be `Sync`: they treat shared inputs as read-only
/// and allocate any scratch state per invocation. Returned rows must be
/// valid inequalities (satisfied by every feasible integer point); at
/// integer candidates they act as lazy constraints and reject the
/// incumbent, at fractional points as user cuts.
pub trait CutSeparator: Sync {
    fn separate(&self, node: CallbackNode, values: &[f64]) -> Vec<Row>;
}

/// Read-only view of a finished search.
///
/// `values` is empty and `objective` is NaN when the search produced no
/// incumbent (infeasible, or stopped before finding one). `best_bound` is
/// the best known dual bound; it equals `objective` when optimality was
/// proven.
#[derive(Debug, Clone)]
pub struct Solution {
    pub status: Status,
    pub objective: f64,
    pub best_bound: f64,
    pub values: Vec<f64>,
}

impl Solution {
    fn empty(status: Status) -> Self {
        Self {
            status,
            objective: f64::NAN,
            best_bound: f64::NAN,
            values: Vec::new(),
        }
    }

    pub fn has_point(&self) -> bool {
        !self.values.is_empty()
    }
}

/// The narrow engine contract the solve controller depends on. Any ILP
/// engine able to run the three search modes against a [`Model`] with an
/// optional separation callback can be substituted.
pub trait IlpEngine {
    fn solve(&self, model: &Model, mode: SearchMode, separator: Option<&dyn CutSeparator>)
        -> Solution;
}

/// Depth-first branch-and-cut over binary variables with an LP-relaxation
/// bound at every node, a global (deduplicated) cut pool, and cooperative
/// wall-clock cancellation.
#[derive(Debug, Clone)]
pub struct BranchAndCut {
    pub time_limit: Duration,
    /// Integrality tolerance on binary variables.
    pub tolerance: f64,
    pub max_nodes: usize,
    /// Pivot budget per LP solve.
    pub max_lp_iterations: usize,
    /// Cap on user-cut rounds per node; lazy rounds are never capped.
    pub max_fractional_rounds: usize,
}

impl Default for BranchAndCut {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(1200),
            tolerance: 1e-6,
            max_nodes: 200_000,
            max_lp_iterations: 50_000,
            max_fractional_rounds: 50,
        }
    }
}

type Fixing = (usize, f64, f64);
type CutKey = (Vec<(usize, u64)>, u64, u64);

enum NodeOutcome {
    Infeasible,
    /// LP could not be resolved within its budgets.
    Stalled,
    Solved {
        values: Vec<f64>,
        objective: f64,
    },
}

impl BranchAndCut {
    pub fn new(time_limit: Duration) -> Self {
        Self {
            time_limit,
            ..Self::default()
        }
    }

    fn near_binary(&self, value: f64) -> bool {
        (value - value.round()).abs() < self.tolerance
            && (value.round() == 0.0 || value.round() == 1.0)
    }

    /// Builds the dense LP for one node: model rows plus the cut pool,
    /// variable bounds overridden by the node's fixings. Minimization is
    /// folded into the objective sign so the search always maximizes.
    fn dense_lp(&self, model: &Model, cuts: &[Row], fixes: &[Fixing]) -> DenseLp<f64> {
        let n = model.num_vars();
        let sign = match model.sense() {
            Sense::Maximize => 1.0,
            Sense::Minimize => -1.0,
        };
        let mut objective = vec![0.0; n];
        let mut lower = vec![0.0; n];
        let mut upper = vec![0.0; n];
        for (j, var) in model.vars().iter().enumerate() {
            objective[j] = sign * var.obj;
            lower[j] = var.lb;
            upper[j] = var.ub;
        }
        for &(j, lb, ub) in fixes {
            lower[j] = lb;
            upper[j] = ub;
        }

        let mut constraints = Vec::new();
        for row in model.rows().iter().chain(cuts.iter()) {
            if row.free() {
                continue;
            }
            let mut coeffs = vec![0.0; n];
            for &(v, c) in row.expr.terms() {
                coeffs[v.index()] = c;
            }
            if row.lb == row.ub {
                constraints.push(DenseConstraint {
                    coeffs,
                    relation: Relation::Eq,
                    rhs: row.lb,
                });
                continue;
            }
            if row.ub.is_finite() {
                constraints.push(DenseConstraint {
                    coeffs: coeffs.clone(),
                    relation: Relation::Le,
                    rhs: row.ub,
                });
            }
            if row.lb.is_finite() {
                constraints.push(DenseConstraint {
                    coeffs,
                    relation: Relation::Ge,
                    rhs: row.lb,
                });
            }
        }

        DenseLp {
            objective,
            constraints,
            lower,
            upper,
        }
    }

    /// Solves one node to LP optimality, interleaving separation rounds:
    /// user cuts at fractional points (bounded rounds), lazy constraints at
    /// integer points (always enforced before a point can be returned).
    fn process_node(
        &self,
        model: &Model,
        binaries: &[usize],
        fixes: &[Fixing],
        separator: Option<&dyn CutSeparator>,
        cuts: &mut Vec<Row>,
        seen: &mut HashSet<CutKey>,
    ) -> NodeOutcome {
        let mut fractional_rounds = 0;
        loop {
            let lp = self.dense_lp(model, cuts, fixes);
            match simplex::maximize(&lp, self.max_lp_iterations) {
                LpOutcome::Infeasible => return NodeOutcome::Infeasible,
                LpOutcome::Unbounded => {
                    warn!("node relaxation unbounded; model is missing bounds");
                    return NodeOutcome::Stalled;
                }
                LpOutcome::IterationLimit => {
                    warn!("LP iteration budget exhausted at a node");
                    return NodeOutcome::Stalled;
                }
                LpOutcome::Optimal { point, value } => {
                    if let Some(sep) = separator {
                        let integral =
                            !binaries.is_empty() && binaries.iter().all(|&j| self.near_binary(point[j]));
                        let kind = if integral {
                            CallbackNode::Integer
                        } else {
                            CallbackNode::Fractional
                        };
                        let run = kind == CallbackNode::Integer
                            || fractional_rounds < self.max_fractional_rounds;
                        if run {
                            let found = sep.separate(kind, &point);
                            let added = Self::add_cuts(cuts, seen, found);
                            if added > 0 {
                                debug!("{added} cut(s) added at a {kind:?} node");
                                if kind == CallbackNode::Fractional {
                                    fractional_rounds += 1;
                                }
                                continue;
                            }
                        }
                    }
                    return NodeOutcome::Solved {
                        values: point,
                        objective: value,
                    };
                }
            }
        }
    }

    fn add_cuts(cuts: &mut Vec<Row>, seen: &mut HashSet<CutKey>, found: Vec<Row>) -> usize {
        let mut added = 0;
        for row in found {
            let key: CutKey = (
                row.expr
                    .terms()
                    .iter()
                    .map(|(v, c)| (v.index(), c.to_bits()))
                    .collect(),
                row.lb.to_bits(),
                row.ub.to_bits(),
            );
            if seen.insert(key) {
                cuts.push(row);
                added += 1;
            }
        }
        added
    }
}

impl IlpEngine for BranchAndCut {
    fn solve(
        &self,
        model: &Model,
        mode: SearchMode,
        separator: Option<&dyn CutSeparator>,
    ) -> Solution {
        let start = Instant::now();
        let sign = match model.sense() {
            Sense::Maximize => 1.0,
            Sense::Minimize => -1.0,
        };
        // In the pure LP mode binaries are relaxed: nothing to branch on.
        let binaries: Vec<usize> = if mode == SearchMode::LpRelaxation {
            Vec::new()
        } else {
            model.binary_vars().collect()
        };
        let mut cuts: Vec<Row> = Vec::new();
        let mut seen: HashSet<CutKey> = HashSet::new();

        if mode != SearchMode::BranchAndCut {
            let root = self.process_node(model, &binaries, &[], separator, &mut cuts, &mut seen);
            return match root {
                NodeOutcome::Infeasible => Solution::empty(Status::Infeasible),
                NodeOutcome::Stalled => Solution::empty(Status::Unknown),
                NodeOutcome::Solved { values, objective } => {
                    let integral = binaries.iter().all(|&j| self.near_binary(values[j]));
                    if mode == SearchMode::LpRelaxation || integral {
                        Solution {
                            status: Status::Optimal,
                            objective: sign * objective,
                            best_bound: sign * objective,
                            values,
                        }
                    } else {
                        // Fractional root: only the strengthened bound is
                        // meaningful.
                        Solution {
                            status: Status::Unknown,
                            objective: f64::NAN,
                            best_bound: sign * objective,
                            values: Vec::new(),
                        }
                    }
                }
            };
        }

        let mut stack: Vec<(Vec<Fixing>, f64)> = vec![(Vec::new(), f64::INFINITY)];
        let mut incumbent: Option<(Vec<f64>, f64)> = None;
        let mut nodes = 0usize;
        let mut timed_out = false;
        let mut truncated = false;

        while let Some((fixes, parent_bound)) = stack.pop() {
            if start.elapsed() >= self.time_limit {
                timed_out = true;
                stack.push((fixes, parent_bound));
                break;
            }
            if nodes >= self.max_nodes {
                truncated = true;
                stack.push((fixes, parent_bound));
                break;
            }
            nodes += 1;
            if let Some((_, inc)) = &incumbent {
                if parent_bound <= inc + 1e-9 {
                    continue;
                }
            }
            match self.process_node(model, &binaries, &fixes, separator, &mut cuts, &mut seen) {
                NodeOutcome::Infeasible => continue,
                NodeOutcome::Stalled => {
                    truncated = true;
                    continue;
                }
                NodeOutcome::Solved { values, objective } => {
                    if let Some((_, inc)) = &incumbent {
                        if objective <= inc + 1e-9 {
                            continue;
                        }
                    }
                    match binaries.iter().copied().find(|&j| !self.near_binary(values[j])) {
                        None => {
                            debug!("incumbent {objective} after {nodes} node(s)");
                            incumbent = Some((values, objective));
                        }
                        Some(j) => {
                            // Keep the variable's own bounds intact: a
                            // branch may only shrink the feasible interval.
                            let var = &model.vars()[j];
                            let mut down = fixes.clone();
                            down.push((j, var.lb, 0.0));
                            let mut up = fixes;
                            up.push((j, 1.0, var.ub));
                            stack.push((down, objective));
                            stack.push((up, objective));
                        }
                    }
                }
            }
        }

        debug!(
            "search finished: {nodes} node(s), {} cut(s) in pool",
            cuts.len()
        );

        let open_bound = stack
            .iter()
            .map(|(_, b)| *b)
            .fold(f64::NEG_INFINITY, f64::max);
        match incumbent {
            Some((values, objective)) => {
                let complete = !timed_out && !truncated;
                let status = if timed_out {
                    Status::TimeLimitReached
                } else if truncated {
                    Status::Feasible
                } else {
                    Status::Optimal
                };
                let bound = if complete {
                    objective
                } else {
                    objective.max(open_bound)
                };
                Solution {
                    status,
                    objective: sign * objective,
                    best_bound: sign * bound,
                    values,
                }
            }
            None => {
                let status = if timed_out {
                    Status::TimeLimitReached
                } else if truncated {
                    Status::Unknown
                } else {
                    Status::Infeasible
                };
                Solution::empty(status)
            }
        }
    }
}
