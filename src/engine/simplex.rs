use num_traits::Float;
use std::fmt::Debug;

const EPSILON: f64 = 1e-9;
const FEASIBILITY_EPSILON: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Le,
    Ge,
    Eq,
}

/// A dense row `coeffs . x  (<=|>=|=)  rhs` over the structural variables.
#[derive(Debug, Clone)]
pub struct DenseConstraint<T> {
    pub coeffs: Vec<T>,
    pub relation: Relation,
    pub rhs: T,
}

/// A bounded linear program in dense form:
/// maximize `objective . x` subject to the constraints and
/// `lower[j] <= x[j] <= upper[j]` (upper may be infinite).
#[derive(Debug, Clone)]
pub struct DenseLp<T> {
    pub objective: Vec<T>,
    pub constraints: Vec<DenseConstraint<T>>,
    pub lower: Vec<T>,
    pub upper: Vec<T>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LpOutcome<T> {
    Optimal { point: Vec<T>, value: T },
    Infeasible,
    Unbounded,
    IterationLimit,
}

/// Maximizes a bounded LP with the two-phase primal simplex method.
///
/// Variables are shifted so the working problem has nonnegative variables;
/// finite upper bounds become extra rows. Phase I drives artificial
/// variables out with a feasibility objective, Phase II optimizes the
/// original one. Bland's rule is used throughout, so the method cannot
/// cycle on degenerate bases.
///
/// # Arguments
/// * `lp` - The linear program to solve
/// * `max_iterations` - Total pivot budget across both phases
pub fn maximize<T>(lp: &DenseLp<T>, max_iterations: usize) -> LpOutcome<T>
where
    T: Float + Debug,
{
    let n = lp.objective.len();
    debug_assert_eq!(lp.lower.len(), n);
    debug_assert_eq!(lp.upper.len(), n);
    let eps = T::from(EPSILON).unwrap();

    // Shift x = lower + y so that y >= 0.
    let mut rows: Vec<(Vec<T>, Relation, T)> = Vec::new();
    for con in &lp.constraints {
        debug_assert_eq!(con.coeffs.len(), n);
        let shift = con
            .coeffs
            .iter()
            .zip(lp.lower.iter())
            .fold(T::zero(), |acc, (&a, &l)| acc + a * l);
        rows.push((con.coeffs.clone(), con.relation, con.rhs - shift));
    }
    for j in 0..n {
        if lp.upper[j].is_finite() {
            let mut unit = vec![T::zero(); n];
            unit[j] = T::one();
            rows.push((unit, Relation::Le, lp.upper[j] - lp.lower[j]));
        }
    }

    // Normalize right-hand sides to be nonnegative.
    for (coeffs, relation, rhs) in &mut rows {
        if *rhs < T::zero() {
            for a in coeffs.iter_mut() {
                *a = -*a;
            }
            *rhs = -*rhs;
            *relation = match *relation {
                Relation::Le => Relation::Ge,
                Relation::Ge => Relation::Le,
                Relation::Eq => Relation::Eq,
            };
        }
    }

    let m = rows.len();
    let mut ncols = n;
    let mut slack_col = vec![None; m];
    let mut art_col = vec![None; m];
    for (i, (_, relation, _)) in rows.iter().enumerate() {
        match relation {
            Relation::Le | Relation::Ge => {
                slack_col[i] = Some(ncols);
                ncols += 1;
            }
            Relation::Eq => {}
        }
    }
    for (i, (_, relation, _)) in rows.iter().enumerate() {
        if !matches!(relation, Relation::Le) {
            art_col[i] = Some(ncols);
            ncols += 1;
        }
    }

    // Tableau rows hold the constraint coefficients; the last column is
    // the right-hand side.
    let mut tableau = vec![vec![T::zero(); ncols + 1]; m];
    let mut basis = vec![0usize; m];
    let mut artificial = vec![false; ncols];
    for (i, (coeffs, relation, rhs)) in rows.iter().enumerate() {
        tableau[i][..n].copy_from_slice(coeffs);
        if let Some(col) = slack_col[i] {
            tableau[i][col] = match relation {
                Relation::Le => T::one(),
                Relation::Ge => -T::one(),
                Relation::Eq => unreachable!(),
            };
        }
        if let Some(col) = art_col[i] {
            tableau[i][col] = T::one();
            artificial[col] = true;
        }
        tableau[i][ncols] = *rhs;
        basis[i] = art_col[i].or(slack_col[i]).unwrap_or(0);
    }

    let mut remaining = max_iterations;
    let no_ban = vec![false; ncols];

    // Phase I: minimize the sum of artificial variables.
    if art_col.iter().any(Option::is_some) {
        let mut cost = vec![T::zero(); ncols];
        for (col, is_art) in artificial.iter().enumerate() {
            if *is_art {
                cost[col] = T::one();
            }
        }
        match run_simplex(&mut tableau, &mut basis, &cost, &no_ban, &mut remaining, eps) {
            Step::Optimal => {}
            Step::Unbounded => return LpOutcome::Infeasible,
            Step::IterationLimit => return LpOutcome::IterationLimit,
        }
        let infeasibility = basis
            .iter()
            .enumerate()
            .filter(|(_, &col)| artificial[col])
            .fold(T::zero(), |acc, (i, _)| acc + tableau[i][ncols]);
        if infeasibility > T::from(FEASIBILITY_EPSILON).unwrap() {
            return LpOutcome::Infeasible;
        }

        // Drive any artificial still basic (at zero) out of the basis, so
        // later pivots cannot push it positive again. A row with no
        // non-artificial coefficient left is redundant and stays inert.
        for i in 0..m {
            if artificial[basis[i]] {
                if let Some(j) = (0..ncols).find(|&j| !artificial[j] && tableau[i][j].abs() > eps) {
                    pivot(&mut tableau, i, j, eps);
                    basis[i] = j;
                }
            }
        }
    }

    // Phase II: minimize the negated objective, artificials banned.
    let mut cost = vec![T::zero(); ncols];
    for j in 0..n {
        cost[j] = -lp.objective[j];
    }
    match run_simplex(
        &mut tableau,
        &mut basis,
        &cost,
        &artificial,
        &mut remaining,
        eps,
    ) {
        Step::Optimal => {}
        Step::Unbounded => return LpOutcome::Unbounded,
        Step::IterationLimit => return LpOutcome::IterationLimit,
    }

    let mut point = lp.lower.clone();
    for (i, &col) in basis.iter().enumerate() {
        if col < n {
            point[col] = point[col] + tableau[i][ncols];
        }
    }
    let value = point
        .iter()
        .zip(lp.objective.iter())
        .fold(T::zero(), |acc, (&x, &c)| acc + c * x);
    LpOutcome::Optimal { point, value }
}

enum Step {
    Optimal,
    Unbounded,
    IterationLimit,
}

/// Minimizes `cost . z` over the current tableau with Bland's rule;
/// `banned` columns never enter the basis.
fn run_simplex<T>(
    tableau: &mut [Vec<T>],
    basis: &mut [usize],
    cost: &[T],
    banned: &[bool],
    remaining: &mut usize,
    eps: T,
) -> Step
where
    T: Float + Debug,
{
    let m = tableau.len();
    if m == 0 {
        return Step::Optimal;
    }
    let ncols = cost.len();
    loop {
        if *remaining == 0 {
            return Step::IterationLimit;
        }
        *remaining -= 1;

        // Entering column: smallest index with negative reduced cost.
        let mut entering = None;
        for j in 0..ncols {
            if banned[j] {
                continue;
            }
            let reduced = cost[j]
                - basis
                    .iter()
                    .enumerate()
                    .fold(T::zero(), |acc, (i, &b)| acc + cost[b] * tableau[i][j]);
            if reduced < -eps {
                entering = Some(j);
                break;
            }
        }
        let Some(entering) = entering else {
            return Step::Optimal;
        };

        // Leaving row: minimum ratio, ties broken on the smallest basic
        // column index (Bland).
        let mut leaving: Option<usize> = None;
        let mut best_ratio = T::infinity();
        for i in 0..m {
            let a = tableau[i][entering];
            if a > eps {
                let ratio = tableau[i][ncols] / a;
                let take = match leaving {
                    None => true,
                    Some(l) => {
                        ratio < best_ratio - eps
                            || ((ratio - best_ratio).abs() <= eps && basis[i] < basis[l])
                    }
                };
                if take {
                    leaving = Some(i);
                    best_ratio = ratio;
                }
            }
        }
        let Some(leaving) = leaving else {
            return Step::Unbounded;
        };

        pivot(tableau, leaving, entering, eps);
        basis[leaving] = entering;
    }
}

fn pivot<T>(tableau: &mut [Vec<T>], leaving: usize, entering: usize, eps: T)
where
    T: Float + Debug,
{
    let width = tableau[0].len();
    let scale = T::one() / tableau[leaving][entering];
    for j in 0..width {
        tableau[leaving][j] = tableau[leaving][j] * scale;
        if tableau[leaving][j].abs() < eps {
            tableau[leaving][j] = T::zero();
        }
    }
    let pivot_row = tableau[leaving].clone();
    for (i, row) in tableau.iter_mut().enumerate() {
        if i == leaving {
            continue;
        }
        let factor = row[entering];
        if factor.abs() > eps {
            for j in 0..width {
                row[j] = row[j] - factor * pivot_row[j];
                if row[j].abs() < eps {
                    row[j] = T::zero();
                }
            }
        }
        row[entering] = T::zero();
    }
    tableau[leaving][entering] = T::one();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lp(
        objective: Vec<f64>,
        constraints: Vec<DenseConstraint<f64>>,
        lower: Vec<f64>,
        upper: Vec<f64>,
    ) -> DenseLp<f64> {
        DenseLp {
            objective,
            constraints,
            lower,
            upper,
        }
    }

    fn optimal(outcome: LpOutcome<f64>) -> (Vec<f64>, f64) {
        match outcome {
            LpOutcome::Optimal { point, value } => (point, value),
            other => panic!("expected optimal, got {other:?}"),
        }
    }

    #[test]
    fn test_simple_lp() {
        // max x + y s.t. x + y <= 1, x, y in [0, 1]
        let problem = lp(
            vec![1.0, 1.0],
            vec![DenseConstraint {
                coeffs: vec![1.0, 1.0],
                relation: Relation::Le,
                rhs: 1.0,
            }],
            vec![0.0, 0.0],
            vec![1.0, 1.0],
        );
        let (_, value) = optimal(maximize(&problem, 1000));
        assert!((value - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_bounded_lp() {
        // max 2x + y s.t. x + y <= 2, x <= 1
        let problem = lp(
            vec![2.0, 1.0],
            vec![DenseConstraint {
                coeffs: vec![1.0, 1.0],
                relation: Relation::Le,
                rhs: 2.0,
            }],
            vec![0.0, 0.0],
            vec![1.0, f64::INFINITY],
        );
        let (point, value) = optimal(maximize(&problem, 1000));
        assert!((point[0] - 1.0).abs() < 1e-6);
        assert!((point[1] - 1.0).abs() < 1e-6);
        assert!((value - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_lp() {
        // max x + y s.t. x + y <= 1, x <= 0.5, y <= 0.5
        let problem = lp(
            vec![1.0, 1.0],
            vec![DenseConstraint {
                coeffs: vec![1.0, 1.0],
                relation: Relation::Le,
                rhs: 1.0,
            }],
            vec![0.0, 0.0],
            vec![0.5, 0.5],
        );
        let (point, value) = optimal(maximize(&problem, 1000));
        assert!((point[0] - 0.5).abs() < 1e-6);
        assert!((point[1] - 0.5).abs() < 1e-6);
        assert!((value - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_equality_and_ge() {
        // max x s.t. x + y = 1, x - y >= 0 => x = 1 is cut to x = y = 0.5? No:
        // x - y >= 0 allows x = 1, y = 0. Optimum x = 1.
        let problem = lp(
            vec![1.0, 0.0],
            vec![
                DenseConstraint {
                    coeffs: vec![1.0, 1.0],
                    relation: Relation::Eq,
                    rhs: 1.0,
                },
                DenseConstraint {
                    coeffs: vec![1.0, -1.0],
                    relation: Relation::Ge,
                    rhs: 0.0,
                },
            ],
            vec![0.0, 0.0],
            vec![1.0, 1.0],
        );
        let (point, value) = optimal(maximize(&problem, 1000));
        assert!((point[0] - 1.0).abs() < 1e-6);
        assert!((value - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_infeasible_lp() {
        let problem = lp(
            vec![1.0, 1.0],
            vec![
                DenseConstraint {
                    coeffs: vec![1.0, 1.0],
                    relation: Relation::Le,
                    rhs: 1.0,
                },
                DenseConstraint {
                    coeffs: vec![1.0, 1.0],
                    relation: Relation::Ge,
                    rhs: 2.0,
                },
            ],
            vec![0.0, 0.0],
            vec![1.0, 1.0],
        );
        assert_eq!(maximize(&problem, 1000), LpOutcome::Infeasible);
    }

    #[test]
    fn test_unbounded_lp() {
        let problem = lp(vec![1.0], vec![], vec![0.0], vec![f64::INFINITY]);
        assert_eq!(maximize(&problem, 1000), LpOutcome::Unbounded);
    }

    #[test]
    fn test_shifted_lower_bounds() {
        // max -x with x in [2, 5] and x >= 3
        let problem = lp(
            vec![-1.0],
            vec![DenseConstraint {
                coeffs: vec![1.0],
                relation: Relation::Ge,
                rhs: 3.0,
            }],
            vec![2.0],
            vec![5.0],
        );
        let (point, value) = optimal(maximize(&problem, 1000));
        assert!((point[0] - 3.0).abs() < 1e-6);
        assert!((value + 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_fixed_variable() {
        // x fixed to 1 by its bounds, max 5x + y with x + y <= 1.5
        let problem = lp(
            vec![5.0, 1.0],
            vec![DenseConstraint {
                coeffs: vec![1.0, 1.0],
                relation: Relation::Le,
                rhs: 1.5,
            }],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
        );
        let (point, value) = optimal(maximize(&problem, 1000));
        assert!((point[0] - 1.0).abs() < 1e-6);
        assert!((point[1] - 0.5).abs() < 1e-6);
        assert!((value - 5.5).abs() < 1e-6);
    }
}
