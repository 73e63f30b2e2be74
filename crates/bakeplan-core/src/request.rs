//! The typed solve request and its recognized options.

use serde::{Deserialize, Serialize};

use crate::calendar::{Horizon, LaborCalendar};
use crate::domain::{
    CostStructure, ForecastEntry, InventoryRecord, Node, ProductCatalog, Route, TruckSchedule,
};

fn default_true() -> bool {
    true
}

fn default_mip_gap() -> f64 {
    0.01
}

fn default_floor_hours() -> f64 {
    4.0
}

fn default_solver_name() -> String {
    "highs".to_string()
}

/// Backend configuration for one solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverOptions {
    #[serde(default = "default_solver_name")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_seconds: Option<f64>,
    /// Relative MIP gap tolerance.
    #[serde(default = "default_mip_gap")]
    pub mip_gap: f64,
    /// Compute campaign-based warm-start hints. Off by default; the gain is
    /// backend-dependent and sometimes negative.
    #[serde(default)]
    pub warmstart: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i32>,
    /// Forward backend log output to the console.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            name: default_solver_name(),
            time_limit_seconds: None,
            mip_gap: default_mip_gap(),
            warmstart: false,
            seed: None,
            verbose: false,
        }
    }
}

/// Model-shaping options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanOptions {
    /// When false, demand must be met exactly; tight instances may then be
    /// reported infeasible instead of carrying shortage.
    #[serde(default = "default_true")]
    pub allow_shortages: bool,
    /// Integer storage-pallet variables. When off, pallet occupancy relaxes
    /// to its continuous lower envelope.
    #[serde(default = "default_true")]
    pub use_pallet_tracking: bool,
    /// Integer truck-pallet variables, same relaxation rule.
    #[serde(default = "default_true")]
    pub use_truck_pallet_tracking: bool,
    /// Minimum hours paid on a non-fixed day once any hour is used.
    #[serde(default = "default_floor_hours")]
    pub non_fixed_minimum_paid_hours: f64,
    #[serde(default)]
    pub solver: SolverOptions,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            allow_shortages: true,
            use_pallet_tracking: true,
            use_truck_pallet_tracking: true,
            non_fixed_minimum_paid_hours: default_floor_hours(),
            solver: SolverOptions::default(),
        }
    }
}

/// Everything one solve consumes. Immutable once handed over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveRequest {
    pub horizon: Horizon,
    pub nodes: Vec<Node>,
    pub routes: Vec<Route>,
    #[serde(default)]
    pub trucks: Vec<TruckSchedule>,
    pub products: ProductCatalog,
    pub labor_calendar: LaborCalendar,
    pub cost_structure: CostStructure,
    pub forecast: Vec<ForecastEntry>,
    #[serde(default)]
    pub initial_inventory: Vec<InventoryRecord>,
    #[serde(default)]
    pub options: PlanOptions,
}
