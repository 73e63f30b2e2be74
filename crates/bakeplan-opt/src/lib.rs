//! # bakeplan-opt: Integrated Production-Distribution MILP
//!
//! Joint planning of production, storage-state transitions (ambient,
//! frozen, thawed), inter-node shipments, truck loading and demand
//! satisfaction over a multi-week horizon, as one mixed-integer linear
//! program plus a deterministic batch post-processor.
//!
//! Two formulation choices keep the model small without losing shelf-life
//! semantics:
//!
//! - **No age cohorts.** Perishability is enforced by a sliding residency
//!   window per (node, product, state, day) that bounds closing inventory
//!   by what entered the state over the trailing shelf-life window
//!   (see [`model`]). One variable per slot-day replaces the cohort cube.
//! - **No batch identity in the MILP.** Traceable batch allocations are
//!   reconstructed afterwards by a weighted-age FEFO pass over the
//!   aggregate flows (see [`fefo`]), which picks one canonical batch
//!   assignment the constraints guarantee exists.
//!
//! ## Pipeline
//!
//! [`Planner::solve`] chains the stages with validation at every gate:
//!
//! ```text
//! SolveRequest -> pre-build gate -> indices -> MILP build -> HiGHS
//!              -> extraction -> post-solve gate -> FEFO -> post-FEFO gate
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use bakeplan_opt::Planner;
//!
//! let outcome = Planner::new().solve(&request)?;
//! println!("{}", outcome.solution.summary());
//! for flow in &outcome.allocation.unwrap().flows {
//!     // feed labeling / traceability
//! }
//! ```

pub mod check;
pub mod fefo;
pub mod index;
pub mod model;
pub mod plan;
pub mod solution;
pub mod solver;

pub use check::{check_allocation, check_solution};
pub use fefo::{allocate, BatchAllocation, BatchFlow, BatchId, BatchInfo, FlowEvent};
pub use index::ModelIndex;
pub use model::{build_model, BuiltModel, CostCategory};
pub use plan::{PlanOutcome, Planner};
pub use solution::{
    AggregateSolution, ConsumptionRecord, ConversionKind, ConversionRecord, CostBreakdown,
    DemandFill, InventoryLevel, LaborRecord, PalletRecord, ProductionRecord, ShipmentRecord,
    TruckLoadRecord, WasteRecord,
};
pub use solver::{
    campaign_hints, resolve_backend, CancelToken, HighsBackend, MilpBackend, RawSolution,
    SolveStatus,
};
