//! HiGHS backend.

use std::time::Instant;

use highs::{HighsModelStatus, RowProblem, Sense};
use tracing::{debug, info, warn};

use bakeplan_core::{PlanResult, SolverOptions};

use crate::model::ColMeta;

use super::{CancelToken, MilpBackend, RawSolution, SolveStatus};

#[derive(Debug, Default)]
pub struct HighsBackend;

impl MilpBackend for HighsBackend {
    fn id(&self) -> &'static str {
        "highs"
    }

    fn solve(
        &self,
        problem: RowProblem,
        cols: &[ColMeta],
        options: &SolverOptions,
        cancel: &CancelToken,
    ) -> PlanResult<RawSolution> {
        let mut warnings = Vec::new();

        if cancel.is_cancelled() {
            return Ok(RawSolution {
                status: SolveStatus::TerminatedByUser,
                values: Vec::new(),
                solve_seconds: 0.0,
                warnings,
            });
        }

        let mut model = problem.optimise(Sense::Minimise);
        model.set_option("output_flag", options.verbose);
        model.set_option("log_to_console", options.verbose);
        model.set_option("mip_rel_gap", options.mip_gap);
        if let Some(limit) = options.time_limit_seconds {
            model.set_option("time_limit", limit);
        }
        if let Some(seed) = options.seed {
            model.set_option("random_seed", seed);
        }
        if options.warmstart {
            // The binding has no solution-hint channel; hints were computed
            // upstream and are dropped here rather than faked via bounds.
            warn!("warm-start hints are not supported by the highs backend; solving cold");
        }

        info!(backend = self.id(), cols = cols.len(), "starting solve");
        let started = Instant::now();
        let solved = model.solve();
        let solve_seconds = started.elapsed().as_secs_f64();

        let raw_status = solved.status();
        let mut status = normalize_status(raw_status, &mut warnings);
        debug!(?raw_status, %status, solve_seconds, "solve finished");

        let values = if status.may_have_primal() {
            let solution = solved.get_solution();
            let columns = solution.columns().to_vec();
            if columns.len() == cols.len() {
                flag_uninitialized(&columns, cols, &mut warnings);
                columns
            } else {
                if !columns.is_empty() {
                    warnings.push(format!(
                        "backend returned {} primal values for {} columns; discarding",
                        columns.len(),
                        cols.len()
                    ));
                }
                Vec::new()
            }
        } else {
            Vec::new()
        };

        if cancel.is_cancelled() {
            status = SolveStatus::TerminatedByUser;
        }

        Ok(RawSolution {
            status,
            values,
            solve_seconds,
            warnings,
        })
    }
}

/// Explicit mapping from the backend's enum to the normalized one.
fn normalize_status(status: HighsModelStatus, warnings: &mut Vec<String>) -> SolveStatus {
    match status {
        HighsModelStatus::Optimal => SolveStatus::Optimal,
        HighsModelStatus::Infeasible => SolveStatus::Infeasible,
        HighsModelStatus::Unbounded => SolveStatus::Unbounded,
        HighsModelStatus::UnboundedOrInfeasible => {
            warnings.push(
                "backend could not separate unbounded from infeasible; reporting UNKNOWN"
                    .to_string(),
            );
            SolveStatus::Unknown
        }
        HighsModelStatus::ReachedTimeLimit => SolveStatus::TimeLimit,
        HighsModelStatus::ReachedIterationLimit => {
            warnings.push("iteration limit reached before optimality".to_string());
            SolveStatus::Feasible
        }
        HighsModelStatus::ModelEmpty => SolveStatus::Optimal,
        other => {
            warnings.push(format!("unexpected backend status {:?}", other));
            SolveStatus::Unknown
        }
    }
}

/// A NaN primal means the backend never touched the column. Zero is the
/// only sound reading, but a zeroed column that was allowed to be positive
/// may hide material, so the material-balance check downstream must see a
/// warning about it.
fn flag_uninitialized(values: &[f64], cols: &[ColMeta], warnings: &mut Vec<String>) {
    for (value, meta) in values.iter().zip(cols) {
        if value.is_nan() && meta.upper > 0.0 {
            warnings.push(format!(
                "primal for '{}' uninitialized with upper bound {}; treated as 0",
                meta.name, meta.upper
            ));
        }
    }
}
