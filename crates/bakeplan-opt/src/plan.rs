//! End-to-end planning facade.
//!
//! `Planner::solve` runs the whole chain with a validation gate at every
//! boundary: pre-build (configuration), post-solve (aggregate invariants),
//! and post-allocation (batch ledger agreement). Scratch files live in a
//! per-solve temporary directory that is released on every exit path; the
//! directory is kept, and its path reported, only when an instance fails in
//! a way that needs debugging.

use tracing::{debug, info, warn};

use bakeplan_core::{
    validate_request, Diagnostics, PlanError, PlanNetwork, PlanResult, SolveRequest,
};

use crate::check::{check_allocation, check_solution};
use crate::fefo::{allocate, BatchAllocation};
use crate::index::ModelIndex;
use crate::model::{build_model, BuiltModel};
use crate::solution::{extract_solution, AggregateSolution};
use crate::solver::{campaign_hints, resolve_backend, write_lp, CancelToken, SolveStatus};

/// Everything one solve produces.
#[derive(Debug)]
pub struct PlanOutcome {
    pub solution: AggregateSolution,
    /// Batch-level ledger; present whenever a usable primal came back.
    pub allocation: Option<BatchAllocation>,
    pub diagnostics: Diagnostics,
}

/// Configured entry point for solves.
#[derive(Debug, Default)]
pub struct Planner {
    cancel: CancelToken,
}

impl Planner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an external cancellation flag (e.g. wired to a UI button).
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Handle for cancelling this planner's running solve.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn solve(&self, request: &SolveRequest) -> PlanResult<PlanOutcome> {
        if self.cancel.is_cancelled() {
            return Err(PlanError::Cancelled);
        }

        let network = PlanNetwork::build(
            &request.nodes,
            &request.routes,
            &request.trucks,
            &request.horizon,
        )?;
        let diagnostics = validate_request(request, &network)?;
        for issue in &diagnostics.issues {
            warn!(%issue, "validation");
        }

        let index = ModelIndex::build(request, &network);
        info!(
            days = index.num_days(),
            products = index.products.len(),
            demand_cells = index.demand_cells.len(),
            "building model"
        );
        let BuiltModel { shell, vars } = build_model(request, &network, &index);
        let (problem, cols, rows, fixed_labor_cost) = shell.into_problem();

        let scratch = tempfile::Builder::new().prefix("bakeplan-").tempdir()?;
        let lp_path = scratch.path().join("model.lp");
        write_lp(&cols, &rows, fixed_labor_cost, &lp_path)?;
        debug!(path = %lp_path.display(), cols = cols.len(), rows = rows.len(), "model dumped");

        if request.options.solver.warmstart {
            let hints = campaign_hints(&index);
            debug!(hints = hints.len(), "campaign warm-start hints computed");
        }

        if self.cancel.is_cancelled() {
            return Err(PlanError::Cancelled);
        }
        let backend = resolve_backend(&request.options.solver.name)?;
        let raw = backend.solve(problem, &cols, &request.options.solver, &self.cancel)?;
        let mut solution =
            extract_solution(request, &network, &index, &vars, &cols, fixed_labor_cost, raw);
        info!(status = %solution.status, objective = solution.objective_value, "solve finished");

        match solution.status {
            SolveStatus::Infeasible if request.options.allow_shortages => {
                // With shortages allowed every demand row can relax, so
                // infeasibility means the formulation itself is broken.
                let kept = scratch.into_path();
                return Err(PlanError::Solver(format!(
                    "instance infeasible although shortages are allowed; \
                     model dump kept at {}",
                    kept.join("model.lp").display()
                )));
            }
            SolveStatus::Infeasible => {
                return Ok(PlanOutcome {
                    solution,
                    allocation: None,
                    diagnostics,
                });
            }
            SolveStatus::Unbounded => {
                let kept = scratch.into_path();
                return Err(PlanError::Solver(format!(
                    "instance unbounded; model dump kept at {}",
                    kept.join("model.lp").display()
                )));
            }
            _ => {}
        }

        if !solution.has_primal {
            return Ok(PlanOutcome {
                solution,
                allocation: None,
                diagnostics,
            });
        }

        // Post-solve gate. A proven status with broken invariants is fatal;
        // a truncated solve may simply have returned an unusable incumbent.
        if let Err(violation) = check_solution(request, &solution) {
            match solution.status {
                SolveStatus::Optimal | SolveStatus::Feasible => {
                    let kept = scratch.into_path();
                    let message = match violation {
                        PlanError::Invariant(m) => m,
                        other => other.to_string(),
                    };
                    return Err(PlanError::Invariant(format!(
                        "{} (model dump kept at {})",
                        message,
                        kept.join("model.lp").display()
                    )));
                }
                _ => {
                    warn!(%violation, "incumbent failed invariant checks; skipping allocation");
                    solution.warnings.push(format!(
                        "incumbent failed invariant checks: {}",
                        violation
                    ));
                    return Ok(PlanOutcome {
                        solution,
                        allocation: None,
                        diagnostics,
                    });
                }
            }
        }

        if self.cancel.is_cancelled() {
            return Ok(PlanOutcome {
                solution,
                allocation: None,
                diagnostics,
            });
        }

        let allocation = allocate(request, &solution)?;
        check_allocation(request, &solution, &allocation)?;

        Ok(PlanOutcome {
            solution,
            allocation: Some(allocation),
            diagnostics,
        })
    }
}
