//! Sliding-window shelf-life bound.
//!
//! For every slot (node, product, state) and day t, closing inventory may
//! not exceed what entered the state inside the trailing residency window
//! `[t - L + 1, t]`, where L is the product's shelf life in that state:
//!
//! ```text
//! inventory[t] <= sum over window of inflow(tau)   (+ opening stock whose
//!                                                   entry date is in window)
//! ```
//!
//! Anything still on hand must have entered the state inside the window, so
//! older material is structurally unable to remain: once an entry day slides
//! out of the window, its units must have been consumed, shipped, converted
//! or disposed. The bound is tight for material that has not yet left and
//! slack for material that has, and the batch post-processor's oldest-first
//! attribution realizes it exactly. It is equivalent to the cumulative form
//! `CumOut(t) >= CumIn(t - L)`, which is where consumption and the other
//! outflows enter the accounting (through the balance rows); hiding
//! consumption from the balance would age phantom stock.
//!
//! Two formulations that look similar are wrong. Bounding window outflows
//! by window inflows is mere conservation and admits arbitrarily old stock.
//! Subtracting the window's own outflows from the right-hand side poisons
//! later windows: an outflow of material that entered before the window
//! start is subtracted without its matching inflow, so with L = 2, producing
//! 100 on day 0 and consuming it on day 1 yields the absurd `0 <= -100` at
//! day 2. Residency is a statement about what entered recently, not about
//! the flow balance of the window.
//!
//! A thaw re-enters the thawed window on its conversion day and a freeze
//! re-enters the frozen window, so conversions reset residency exactly like
//! fresh arrivals. Opening stock joins the window sum on its entry date and
//! silently ages out of it L days later.
//!
//! Rows whose window still covers the whole history (including every
//! opening-stock entry date) are implied by the balance rows and skipped.

use chrono::Duration;

use bakeplan_core::{PlanNetwork, SolveRequest};

use crate::index::ModelIndex;

use super::balance::flow_terms;
use super::{ModelShell, PlanVars, VarId};

pub(super) fn add_rows(
    _request: &SolveRequest,
    network: &PlanNetwork,
    index: &ModelIndex,
    shell: &mut ModelShell,
    vars: &PlanVars,
) {
    let start = index.days[0];
    for &(n, p, state) in &index.presence {
        let node_id = index.nodes[n].id.clone();
        let product_id = index.products[p].id.clone();
        let life = index.products[p].shelf_life.days_in(state) as i64;
        let earliest = index.earliest_entry(n, p, state);

        for t in 0..index.num_days() {
            let window_start = index.days[t] - Duration::days(life - 1);
            if window_start <= earliest {
                continue;
            }
            let tau_start = if window_start <= start {
                0
            } else {
                (window_start - start).num_days() as usize
            };

            let inv = vars.inventory[&(n, p, state, t)];
            let mut terms: Vec<(VarId, f64)> = vec![(inv, 1.0)];
            for tau in tau_start..=t {
                let (inflow, _outflow) = flow_terms(network, index, vars, n, p, state, tau);
                for (var, coeff) in inflow {
                    terms.push((var, -coeff));
                }
            }
            let rhs = index.opening_since(n, p, state, window_start);
            shell.add_le(
                format!("life_{}_{}_{}_{}", node_id, product_id, state, t),
                terms,
                rhs,
            );
        }
    }
}
