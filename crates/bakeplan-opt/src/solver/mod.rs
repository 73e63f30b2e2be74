//! Solver adapter: normalized termination status, backend trait, and
//! cooperative cancellation.
//!
//! Backends report termination through their own enums; every backend maps
//! its statuses to [`SolveStatus`] with an explicit `match`. Comparing
//! backend enums directly across crates silently fails, so the mapping is
//! the only place backend statuses are interpreted.

mod highs_backend;
mod lp_export;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use bakeplan_core::{PlanError, PlanResult, SolverOptions};

use crate::index::ModelIndex;
use crate::model::ColMeta;

pub use highs_backend::HighsBackend;
pub use lp_export::write_lp;

/// Normalized termination status across all backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolveStatus {
    Optimal,
    Feasible,
    Infeasible,
    Unbounded,
    TimeLimit,
    TerminatedByUser,
    Unknown,
}

impl SolveStatus {
    /// Whether a primal assignment may accompany this status.
    pub fn may_have_primal(&self) -> bool {
        matches!(
            self,
            SolveStatus::Optimal
                | SolveStatus::Feasible
                | SolveStatus::TimeLimit
                | SolveStatus::TerminatedByUser
        )
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SolveStatus::Optimal => "OPTIMAL",
            SolveStatus::Feasible => "FEASIBLE",
            SolveStatus::Infeasible => "INFEASIBLE",
            SolveStatus::Unbounded => "UNBOUNDED",
            SolveStatus::TimeLimit => "TIME_LIMIT",
            SolveStatus::TerminatedByUser => "TERMINATED_BY_USER",
            SolveStatus::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

/// Cooperative cancellation flag shared with the caller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Raw backend result: normalized status plus primal values in column
/// registry order. `values` is empty when no primal assignment exists.
#[derive(Debug)]
pub struct RawSolution {
    pub status: SolveStatus,
    pub values: Vec<f64>,
    pub solve_seconds: f64,
    pub warnings: Vec<String>,
}

/// A MILP backend able to solve the built model.
pub trait MilpBackend {
    fn id(&self) -> &'static str;

    fn solve(
        &self,
        problem: highs::RowProblem,
        cols: &[ColMeta],
        options: &SolverOptions,
        cancel: &CancelToken,
    ) -> PlanResult<RawSolution>;
}

/// Resolve a backend by configured name. Unknown names are an error, never
/// a silent fallback.
pub fn resolve_backend(name: &str) -> PlanResult<Box<dyn MilpBackend>> {
    match name.to_lowercase().as_str() {
        "highs" => Ok(Box::new(HighsBackend::default())),
        other => Err(PlanError::Config(format!(
            "unknown solver backend '{}' (available: highs)",
            other
        ))),
    }
}

/// Campaign-based warm-start hints: run indicators for days whose near-term
/// demand cluster is non-empty. Whether a backend can consume them is its
/// own business; effectiveness is backend-dependent and sometimes negative,
/// which is why these are opt-in.
pub fn campaign_hints(index: &ModelIndex) -> Vec<((usize, usize, usize), f64)> {
    const CLUSTER_DAYS: usize = 3;
    let mut hints = Vec::new();
    for &(n, p, t) in &index.production_keys {
        let clustered = index
            .demand_cells
            .iter()
            .any(|cell| cell.product == p && cell.day >= t && cell.day <= t + CLUSTER_DAYS);
        if clustered {
            hints.push(((n, p, t), 1.0));
        }
    }
    hints
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels() {
        assert_eq!(SolveStatus::TimeLimit.to_string(), "TIME_LIMIT");
        assert_eq!(SolveStatus::TerminatedByUser.to_string(), "TERMINATED_BY_USER");
        assert!(SolveStatus::TimeLimit.may_have_primal());
        assert!(!SolveStatus::Infeasible.may_have_primal());
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn unknown_backend_is_an_error() {
        assert!(resolve_backend("highs").is_ok());
        assert!(resolve_backend("cplex").is_err());
    }
}
