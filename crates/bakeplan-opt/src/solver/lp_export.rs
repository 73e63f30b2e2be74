//! CPLEX-LP text rendering of the built model.
//!
//! Written into the solve's scratch directory so an unexpectedly infeasible
//! instance can be inspected with any off-the-shelf LP tooling.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use bakeplan_core::PlanResult;

use crate::model::{ColMeta, RowMeta};

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn write_terms(
    out: &mut impl Write,
    terms: &[(crate::model::VarId, f64)],
    cols: &[ColMeta],
) -> std::io::Result<()> {
    let mut first = true;
    for (var, coeff) in terms {
        if *coeff == 0.0 {
            continue;
        }
        let sign = if *coeff < 0.0 {
            "- "
        } else if first {
            ""
        } else {
            "+ "
        };
        write!(
            out,
            " {}{} {}",
            sign,
            coeff.abs(),
            sanitize(&cols[var.0].name)
        )?;
        first = false;
    }
    if first {
        write!(out, " 0")?;
    }
    Ok(())
}

/// Write the model to `path` in LP format.
pub fn write_lp(
    cols: &[ColMeta],
    rows: &[RowMeta],
    objective_constant: f64,
    path: &Path,
) -> PlanResult<()> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);

    writeln!(out, "\\ objective constant (not encoded): {objective_constant}")?;
    writeln!(out, "Minimize")?;
    write!(out, " obj:")?;
    let mut first = true;
    for col in cols {
        if col.objective == 0.0 {
            continue;
        }
        let sign = if col.objective < 0.0 {
            "- "
        } else if first {
            ""
        } else {
            "+ "
        };
        write!(out, " {}{} {}", sign, col.objective.abs(), sanitize(&col.name))?;
        first = false;
    }
    if first {
        write!(out, " 0")?;
    }
    writeln!(out)?;

    writeln!(out, "Subject To")?;
    for row in rows {
        write!(out, " {}:", sanitize(&row.name))?;
        write_terms(&mut out, &row.terms, cols)?;
        if row.lower == row.upper {
            writeln!(out, " = {}", row.upper)?;
        } else if row.lower.is_infinite() {
            writeln!(out, " <= {}", row.upper)?;
        } else {
            writeln!(out, " >= {}", row.lower)?;
        }
    }

    writeln!(out, "Bounds")?;
    for col in cols {
        let name = sanitize(&col.name);
        if col.upper.is_infinite() {
            writeln!(out, " {} <= {}", col.lower, name)?;
        } else {
            writeln!(out, " {} <= {} <= {}", col.lower, name, col.upper)?;
        }
    }

    let integers: Vec<&ColMeta> = cols.iter().filter(|c| c.integer).collect();
    if !integers.is_empty() {
        writeln!(out, "Generals")?;
        for col in integers {
            writeln!(out, " {}", sanitize(&col.name))?;
        }
    }

    writeln!(out, "End")?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CostCategory, ModelShell};

    #[test]
    fn lp_dump_round_trips_structure() {
        let mut shell = ModelShell::new();
        let x = shell.add_col("x one".into(), 2.0, CostCategory::Production, 0.0, 10.0, false);
        let y = shell.add_col("y".into(), 0.0, CostCategory::None, 0.0, f64::INFINITY, true);
        shell.add_ge("meet demand".into(), vec![(x, 1.0), (y, 1.0)], 4.0);
        shell.add_eq("tie".into(), vec![(x, 1.0), (y, -2.0)], 0.0);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.lp");
        write_lp(&shell.cols, &shell.rows, 12.5, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Minimize"));
        assert!(text.contains("x_one"));
        assert!(text.contains("meet_demand: 1 x_one + 1 y >= 4"));
        assert!(text.contains("tie: 1 x_one - 2 y = 0"));
        assert!(text.contains("Generals"));
        assert!(text.ends_with("End\n"));
    }
}
