//! # bakeplan-core: Production-Distribution Domain Model
//!
//! Core data structures for planning a hub-and-spoke distribution network
//! with perishable, multi-state inventory (ambient / frozen / thawed).
//!
//! This crate holds the typed input records, the calendar and horizon
//! helpers, the petgraph-backed network pre-processor, and the fail-fast
//! pre-build validation gate. The MILP formulation, solver adapter, and
//! batch post-processing live in `bakeplan-opt`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use bakeplan_core::{PlanNetwork, SolveRequest, validate_request};
//!
//! # fn load_request() -> SolveRequest { unimplemented!() }
//! let request: SolveRequest = load_request();
//! let network = PlanNetwork::build(
//!     &request.nodes,
//!     &request.routes,
//!     &request.trucks,
//!     &request.horizon,
//! )?;
//! let diagnostics = validate_request(&request, &network)?;
//! for issue in &diagnostics.issues {
//!     eprintln!("{issue}");
//! }
//! # Ok::<(), bakeplan_core::PlanError>(())
//! ```

pub mod calendar;
pub mod diagnostics;
pub mod domain;
pub mod error;
pub mod network;
pub mod request;
pub mod validate;

pub use calendar::{Horizon, LaborCalendar};
pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use domain::{
    CostStructure, ForecastEntry, InventoryRecord, LaborDay, Node, NodeCapabilities, NodeId,
    Product, ProductCatalog, ProductId, Route, ShelfLife, StorageLimits, StorageState,
    TruckId, TruckSchedule, UNITS_PER_CASE, UNITS_PER_PALLET,
};
pub use error::{PlanError, PlanResult};
pub use network::{Leg, PlanNetwork, TruckInstance};
pub use request::{PlanOptions, SolveRequest, SolverOptions};
pub use validate::{validate_request, MIN_SHORTAGE_PENALTY_RATIO};
