//! Production granularity, labor capacity, and changeover linking.

use bakeplan_core::SolveRequest;

use crate::index::ModelIndex;

use super::{ModelShell, PlanVars, VarId};

pub(super) fn add_rows(
    request: &SolveRequest,
    index: &ModelIndex,
    shell: &mut ModelShell,
    vars: &PlanVars,
) {
    // Mix granularity and run/start indicator linking per (node, product, day).
    for &(n, p, t) in &index.production_keys {
        let node_id = &index.nodes[n].id;
        let product = &index.products[p];
        let production = vars.production[&(n, p, t)];
        let mixes = vars.mix_count[&(n, p, t)];
        let produced = vars.produced[&(n, p, t)];
        let start = vars.start[&(n, p, t)];
        let max_units = index.max_daily_units(n, t);

        shell.add_eq(
            format!("mixlink_{}_{}_{}", node_id, product.id, t),
            vec![(production, 1.0), (mixes, -(product.units_per_mix as f64))],
            0.0,
        );
        shell.add_le(
            format!("runlink_{}_{}_{}", node_id, product.id, t),
            vec![(production, 1.0), (produced, -max_units)],
            0.0,
        );
        // Running means at least one mix, so the indicator cannot idle high
        // across gap days to dodge changeover starts.
        shell.add_ge(
            format!("runlo_{}_{}_{}", node_id, product.id, t),
            vec![(mixes, 1.0), (produced, -1.0)],
            0.0,
        );

        // A start fires when the product runs today but did not run on the
        // previous calendar day (idle days count as not running).
        let mut start_terms: Vec<(VarId, f64)> = vec![(start, 1.0), (produced, -1.0)];
        if t > 0 {
            if let Some(&previous) = vars.produced.get(&(n, p, t - 1)) {
                start_terms.push((previous, 1.0));
            }
        }
        shell.add_ge(
            format!("startlo_{}_{}_{}", node_id, product.id, t),
            start_terms,
            0.0,
        );
        shell.add_le(
            format!("starthi_{}_{}_{}", node_id, product.id, t),
            vec![(start, 1.0), (produced, -1.0)],
            0.0,
        );
    }

    // Hours gate throughput per (node, day).
    for &(n, t) in &index.labor_keys {
        let node = &index.nodes[n];
        let rate = node.units_per_hour.unwrap_or(0.0);
        let mut terms: Vec<(VarId, f64)> = Vec::new();
        for p in 0..index.products.len() {
            if let Some(&production) = vars.production.get(&(n, p, t)) {
                terms.push((production, 1.0));
            }
        }
        for hours in [
            vars.fixed_hours.get(&(n, t)),
            vars.overtime_hours.get(&(n, t)),
            vars.non_fixed_hours.get(&(n, t)),
        ]
        .into_iter()
        .flatten()
        {
            terms.push((*hours, -rate));
        }
        shell.add_le(format!("cap_{}_{}", node.id, t), terms, 0.0);

        // Non-fixed days pay at least the floor once any hour is used.
        if let (Some(&hours), Some(&paid)) = (
            vars.non_fixed_hours.get(&(n, t)),
            vars.non_fixed_paid.get(&(n, t)),
        ) {
            shell.add_ge(
                format!("nfpaid_{}_{}", node.id, t),
                vec![(paid, 1.0), (hours, -1.0)],
                0.0,
            );
            if let Some(&active) = vars.non_fixed_active.get(&(n, t)) {
                let floor = request.options.non_fixed_minimum_paid_hours;
                let day = index.labor[t].expect("labor key without a regime");
                shell.add_ge(
                    format!("nffloor_{}_{}", node.id, t),
                    vec![(paid, 1.0), (active, -floor)],
                    0.0,
                );
                shell.add_le(
                    format!("nfgate_{}_{}", node.id, t),
                    vec![(hours, 1.0), (active, -day.max_hours)],
                    0.0,
                );
            }
        }
    }
}
