//! Narrow ILP-engine layer consumed by the solve controller.
//!
//! The contract is deliberately small: create bounded continuous/binary
//! variables, add or replace linear range constraints, set a linear
//! objective, run a search with an optional separation callback, and read
//! back values and status. Any engine satisfying [`search::IlpEngine`] can
//! be substituted for the in-crate [`search::BranchAndCut`].

pub mod search;
pub mod simplex;

pub use search::{
    BranchAndCut, CallbackNode, CutSeparator, IlpEngine, SearchMode, Solution, Status,
};

/// Handle of a variable created in a [`Model`]. Stable for the lifetime of
/// the model: variable counts are fixed once a formulation is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub(crate) usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Handle of a row (linear range constraint) in a [`Model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Continuous,
    Binary,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub kind: VarKind,
    pub lb: f64,
    pub ub: f64,
    pub obj: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Maximize,
    Minimize,
}

/// A sparse linear expression over model variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    terms: Vec<(VarId, f64)>,
}

impl LinExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, var: VarId, coeff: f64) -> &mut Self {
        self.terms.push((var, coeff));
        self
    }

    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Sorts terms by variable, merges duplicates, and drops zeros, so that
    /// structurally equal expressions compare equal.
    pub fn canonicalize(&mut self) {
        self.terms.sort_by_key(|(v, _)| v.index());
        let mut merged: Vec<(VarId, f64)> = Vec::with_capacity(self.terms.len());
        for &(v, c) in &self.terms {
            match merged.last_mut() {
                Some((last, acc)) if *last == v => *acc += c,
                _ => merged.push((v, c)),
            }
        }
        merged.retain(|(_, c)| *c != 0.0);
        self.terms = merged;
    }

    /// Evaluates the expression against a dense value vector.
    pub fn value(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(v, c)| c * values[v.index()])
            .sum()
    }
}

impl FromIterator<(VarId, f64)> for LinExpr {
    fn from_iter<I: IntoIterator<Item = (VarId, f64)>>(iter: I) -> Self {
        Self {
            terms: iter.into_iter().collect(),
        }
    }
}

/// A linear range constraint `lb <= expr <= ub`; one-sided rows use
/// infinite bounds, equalities have `lb == ub`.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub expr: LinExpr,
    pub lb: f64,
    pub ub: f64,
}

impl Row {
    pub fn new(expr: LinExpr, lb: f64, ub: f64) -> Self {
        let mut expr = expr;
        expr.canonicalize();
        Self { expr, lb, ub }
    }

    pub fn le(expr: LinExpr, ub: f64) -> Self {
        Self::new(expr, f64::NEG_INFINITY, ub)
    }

    pub fn ge(expr: LinExpr, lb: f64) -> Self {
        Self::new(expr, lb, f64::INFINITY)
    }

    pub fn eq(expr: LinExpr, rhs: f64) -> Self {
        Self::new(expr, rhs, rhs)
    }

    /// Rows with both bounds infinite constrain nothing; the search skips
    /// them. Used for the pre-allocated replaceable extra constraint.
    pub fn free(&self) -> bool {
        self.lb == f64::NEG_INFINITY && self.ub == f64::INFINITY
    }
}

/// The problem container handed to an engine: variables with bounds, range
/// rows, and a linear objective. Construction fixes the variable set; the
/// solve controller afterwards only touches bounds, objective coefficients,
/// and the coefficients of designated rows.
#[derive(Debug, Clone, Default)]
pub struct Model {
    vars: Vec<Variable>,
    rows: Vec<Row>,
    sense: Sense,
}

impl Default for Sense {
    fn default() -> Self {
        Sense::Maximize
    }
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_var(&mut self, kind: VarKind, lb: f64, ub: f64) -> VarId {
        self.vars.push(Variable {
            kind,
            lb,
            ub,
            obj: 0.0,
        });
        VarId(self.vars.len() - 1)
    }

    pub fn add_row(&mut self, row: Row) -> RowId {
        self.rows.push(row);
        RowId(self.rows.len() - 1)
    }

    /// Replaces an existing row's coefficients and bounds in place, keeping
    /// the row count fixed.
    pub fn set_row(&mut self, id: RowId, row: Row) {
        self.rows[id.0] = row;
    }

    /// Overwrites the whole objective: every coefficient is reset before
    /// the given ones are applied, so repeated calls are idempotent.
    pub fn set_objective<I: IntoIterator<Item = (VarId, f64)>>(&mut self, sense: Sense, coeffs: I) {
        self.sense = sense;
        for var in &mut self.vars {
            var.obj = 0.0;
        }
        for (id, c) in coeffs {
            self.vars[id.0].obj = c;
        }
    }

    pub fn set_var_bounds(&mut self, id: VarId, lb: f64, ub: f64) {
        self.vars[id.0].lb = lb;
        self.vars[id.0].ub = ub;
    }

    pub fn var(&self, id: VarId) -> &Variable {
        &self.vars[id.0]
    }

    pub fn vars(&self) -> &[Variable] {
        &self.vars
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn sense(&self) -> Sense {
        self.sense
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Indices of binary variables, the branching candidates.
    pub fn binary_vars(&self) -> impl Iterator<Item = usize> + '_ {
        self.vars
            .iter()
            .enumerate()
            .filter(|(_, v)| v.kind == VarKind::Binary)
            .map(|(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linexpr_canonicalize() {
        let mut e = LinExpr::new();
        e.add(VarId(2), 1.0).add(VarId(0), 2.0).add(VarId(2), -1.0);
        e.canonicalize();
        assert_eq!(e.terms(), &[(VarId(0), 2.0)]);
    }

    #[test]
    fn test_set_objective_resets() {
        let mut m = Model::new();
        let x = m.add_var(VarKind::Binary, 0.0, 1.0);
        let y = m.add_var(VarKind::Binary, 0.0, 1.0);
        m.set_objective(Sense::Maximize, [(x, 3.0), (y, 4.0)]);
        m.set_objective(Sense::Maximize, [(y, 1.0)]);
        assert_eq!(m.var(x).obj, 0.0);
        assert_eq!(m.var(y).obj, 1.0);
    }

    #[test]
    fn test_set_row_keeps_count() {
        let mut m = Model::new();
        let x = m.add_var(VarKind::Binary, 0.0, 1.0);
        let r = m.add_row(Row::new(LinExpr::new(), f64::NEG_INFINITY, f64::INFINITY));
        assert!(m.rows()[0].free());
        let mut e = LinExpr::new();
        e.add(x, 1.0);
        m.set_row(r, Row::le(e, 0.0));
        assert_eq!(m.num_rows(), 1);
        assert!(!m.rows()[0].free());
    }
}
