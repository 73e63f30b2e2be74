//! MILP construction.
//!
//! [`ModelShell`] wraps a [`highs::RowProblem`] and keeps a named registry
//! of every column and row it creates. The registry drives primal
//! extraction (column order is the HiGHS column order), the cost breakdown
//! (each column carries its objective coefficient and cost category), and
//! the LP-format dump used when an instance comes back infeasible.
//!
//! Submodules contribute constraint families:
//! - [`production`]: mix granularity, labor capacity, changeover linking
//! - [`balance`]: daily mass balance per (node, product, state)
//! - [`shelf_life`]: the sliding-window residency bound
//! - [`transport`]: truck coverage/capacity and pallet accounting
//! - [`demand`]: demand/shortage partition

mod balance;
mod columns;
mod demand;
mod production;
mod shelf_life;
mod transport;

use std::collections::BTreeMap;

use highs::{Col, RowProblem};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use bakeplan_core::{PlanNetwork, SolveRequest, StorageState};

use crate::index::ModelIndex;

/// Objective category a column's cost belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CostCategory {
    None,
    Labor,
    Production,
    Transport,
    StorageDaily,
    StorageEntry,
    Changeover,
    Shortage,
    Waste,
}

/// Handle for a column in the shell's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub(crate) usize);

/// Registry entry for one column.
#[derive(Debug, Clone)]
pub struct ColMeta {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
    pub integer: bool,
    pub objective: f64,
    pub category: CostCategory,
}

/// Registry entry for one row; infinite bounds encode one-sided rows.
#[derive(Debug, Clone)]
pub struct RowMeta {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
    pub terms: Vec<(VarId, f64)>,
}

/// A HiGHS problem under construction plus its registry.
pub struct ModelShell {
    problem: RowProblem,
    handles: Vec<Col>,
    pub cols: Vec<ColMeta>,
    pub rows: Vec<RowMeta>,
    /// Committed payroll for fixed labor days, added to the objective as a
    /// constant in the labor category.
    pub fixed_labor_cost: f64,
}

impl Default for ModelShell {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelShell {
    pub fn new() -> Self {
        Self {
            problem: RowProblem::default(),
            handles: Vec::new(),
            cols: Vec::new(),
            rows: Vec::new(),
            fixed_labor_cost: 0.0,
        }
    }

    pub fn num_cols(&self) -> usize {
        self.cols.len()
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn add_col(
        &mut self,
        name: String,
        objective: f64,
        category: CostCategory,
        lower: f64,
        upper: f64,
        integer: bool,
    ) -> VarId {
        let col = if integer {
            self.problem.add_integer_column(objective, lower..=upper)
        } else {
            self.problem.add_column(objective, lower..=upper)
        };
        let id = VarId(self.handles.len());
        self.handles.push(col);
        self.cols.push(ColMeta {
            name,
            lower,
            upper,
            integer,
            objective,
            category,
        });
        id
    }

    /// Merge duplicate variables and translate to backend handles.
    fn resolve(&self, terms: Vec<(VarId, f64)>) -> Vec<(Col, f64)> {
        let mut merged: BTreeMap<usize, f64> = BTreeMap::new();
        for &(var, coeff) in &terms {
            *merged.entry(var.0).or_insert(0.0) += coeff;
        }
        merged
            .into_iter()
            .map(|(i, coeff)| (self.handles[i], coeff))
            .collect()
    }

    pub fn add_eq(&mut self, name: String, terms: Vec<(VarId, f64)>, rhs: f64) {
        let resolved = self.resolve(terms.clone());
        self.problem.add_row(rhs..=rhs, resolved);
        self.rows.push(RowMeta {
            name,
            lower: rhs,
            upper: rhs,
            terms,
        });
    }

    pub fn add_le(&mut self, name: String, terms: Vec<(VarId, f64)>, upper: f64) {
        let resolved = self.resolve(terms.clone());
        self.problem.add_row(..=upper, resolved);
        self.rows.push(RowMeta {
            name,
            lower: f64::NEG_INFINITY,
            upper,
            terms,
        });
    }

    pub fn add_ge(&mut self, name: String, terms: Vec<(VarId, f64)>, lower: f64) {
        let resolved = self.resolve(terms.clone());
        self.problem.add_row(lower.., resolved);
        self.rows.push(RowMeta {
            name,
            lower,
            upper: f64::INFINITY,
            terms,
        });
    }

    /// Hand the backend the underlying problem, keeping the registry.
    pub fn into_problem(self) -> (RowProblem, Vec<ColMeta>, Vec<RowMeta>, f64) {
        (self.problem, self.cols, self.rows, self.fixed_labor_cost)
    }
}

/// Every variable family of the formulation, keyed by dense indices.
/// Insertion order in each map is stable and deterministic.
#[derive(Default)]
pub struct PlanVars {
    /// (node, product, day) -> units produced
    pub production: IndexMap<(usize, usize, usize), VarId>,
    /// (node, product, day) -> integer mixes
    pub mix_count: IndexMap<(usize, usize, usize), VarId>,
    /// (node, product, day) -> any-production indicator
    pub produced: IndexMap<(usize, usize, usize), VarId>,
    /// (node, product, day) -> changeover start indicator
    pub start: IndexMap<(usize, usize, usize), VarId>,
    /// (node, product, state, day) -> closing inventory
    pub inventory: IndexMap<(usize, usize, StorageState, usize), VarId>,
    /// (leg, product, departure day) -> units shipped
    pub in_transit: IndexMap<(usize, usize, usize), VarId>,
    /// (node, product, day) -> units thawed (frozen -> thawed)
    pub thaw: IndexMap<(usize, usize, usize), VarId>,
    /// (node, product, day) -> units frozen (ambient -> frozen)
    pub freeze: IndexMap<(usize, usize, usize), VarId>,
    /// (node, product, state, day) -> pallet positions occupied
    pub pallet_count: IndexMap<(usize, usize, StorageState, usize), VarId>,
    /// (node, product, state, day) -> pallet positions newly occupied
    pub pallet_entry: IndexMap<(usize, usize, StorageState, usize), VarId>,
    /// (truck instance, product) -> pallets loaded
    pub truck_load: IndexMap<(usize, usize), VarId>,
    /// truck instance -> departure-used indicator
    pub truck_used: IndexMap<usize, VarId>,
    /// (node, product, state, day) -> units disposed before the horizon end
    pub dispose: IndexMap<(usize, usize, StorageState, usize), VarId>,
    /// (node, product, state, day) -> units consumed against demand
    pub consume: IndexMap<(usize, usize, StorageState, usize), VarId>,
    /// (node, product, day) -> unmet demand
    pub shortage: IndexMap<(usize, usize, usize), VarId>,
    /// (node, day) -> fixed-regime hours used
    pub fixed_hours: IndexMap<(usize, usize), VarId>,
    /// (node, day) -> overtime hours beyond the fixed regime
    pub overtime_hours: IndexMap<(usize, usize), VarId>,
    /// (node, day) -> hours worked on a non-fixed day
    pub non_fixed_hours: IndexMap<(usize, usize), VarId>,
    /// (node, day) -> hours paid on a non-fixed day (floor applies)
    pub non_fixed_paid: IndexMap<(usize, usize), VarId>,
    /// (node, day) -> any-hours indicator on a non-fixed day
    pub non_fixed_active: IndexMap<(usize, usize), VarId>,
}

/// Finished model: problem plus variable registry.
pub struct BuiltModel {
    pub shell: ModelShell,
    pub vars: PlanVars,
}

/// Instantiate all variables and constraints for one solve.
pub fn build_model(
    request: &SolveRequest,
    network: &PlanNetwork,
    index: &ModelIndex,
) -> BuiltModel {
    let mut shell = ModelShell::new();
    let mut vars = PlanVars::default();

    columns::add_columns(request, network, index, &mut shell, &mut vars);
    production::add_rows(request, index, &mut shell, &vars);
    balance::add_rows(request, network, index, &mut shell, &vars);
    shelf_life::add_rows(request, network, index, &mut shell, &vars);
    transport::add_rows(request, network, index, &mut shell, &vars);
    demand::add_rows(index, &mut shell, &vars);

    debug!(
        cols = shell.num_cols(),
        rows = shell.num_rows(),
        "model built"
    );
    BuiltModel { shell, vars }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_merges_duplicate_terms() {
        let mut shell = ModelShell::new();
        let x = shell.add_col("x".into(), 1.0, CostCategory::None, 0.0, 10.0, false);
        let y = shell.add_col("y".into(), 0.0, CostCategory::None, 0.0, 10.0, false);
        shell.add_le("r".into(), vec![(x, 1.0), (y, 2.0), (x, 3.0)], 8.0);
        assert_eq!(shell.num_rows(), 1);
        // The registry keeps the raw terms; the backend row was merged.
        assert_eq!(shell.rows[0].terms.len(), 3);
        let merged = shell.resolve(shell.rows[0].terms.clone());
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn registry_tracks_bounds_and_kind() {
        let mut shell = ModelShell::new();
        let m = shell.add_col("mixes".into(), 0.0, CostCategory::None, 0.0, 40.0, true);
        assert_eq!(m.0, 0);
        assert!(shell.cols[0].integer);
        assert_eq!(shell.cols[0].upper, 40.0);
    }
}
