//! Daily mass balance per (node, product, state).
//!
//! Shipments are indexed by departure date: a departure leaves the origin's
//! balance on day t and lands in the destination's balance on day
//! t + transit. Opening stock enters the first day's balance as a constant,
//! whatever its entry date; entry dates only matter to the residency window.

use bakeplan_core::{PlanNetwork, SolveRequest, StorageState};

use crate::index::ModelIndex;

use super::{ModelShell, PlanVars, VarId};

/// Variable inflows and outflows of slot (n, p, s) on day t.
///
/// Thaw drains the frozen window and feeds the thawed one; freeze drains
/// ambient and feeds frozen. Consumption draws from ambient or thawed.
pub(super) fn flow_terms(
    network: &PlanNetwork,
    index: &ModelIndex,
    vars: &PlanVars,
    n: usize,
    p: usize,
    state: StorageState,
    t: usize,
) -> (Vec<(VarId, f64)>, Vec<(VarId, f64)>) {
    let node_id = &index.nodes[n].id;
    let mut inflow: Vec<(VarId, f64)> = Vec::new();
    let mut outflow: Vec<(VarId, f64)> = Vec::new();

    match state {
        StorageState::Ambient => {
            if let Some(&production) = vars.production.get(&(n, p, t)) {
                inflow.push((production, 1.0));
            }
            if let Some(&freeze) = vars.freeze.get(&(n, p, t)) {
                outflow.push((freeze, 1.0));
            }
        }
        StorageState::Frozen => {
            if let Some(&freeze) = vars.freeze.get(&(n, p, t)) {
                inflow.push((freeze, 1.0));
            }
            if let Some(&thaw) = vars.thaw.get(&(n, p, t)) {
                outflow.push((thaw, 1.0));
            }
        }
        StorageState::Thawed => {
            if let Some(&thaw) = vars.thaw.get(&(n, p, t)) {
                inflow.push((thaw, 1.0));
            }
        }
    }

    for &li in network.legs_to(node_id) {
        let leg = &network.legs[li];
        if leg.state != state {
            continue;
        }
        let transit = leg.transit_days as usize;
        if t >= transit {
            if let Some(&ship) = vars.in_transit.get(&(li, p, t - transit)) {
                inflow.push((ship, 1.0));
            }
        }
    }

    for &li in network.legs_from(node_id) {
        if network.legs[li].state != state {
            continue;
        }
        if let Some(&ship) = vars.in_transit.get(&(li, p, t)) {
            outflow.push((ship, 1.0));
        }
    }

    if matches!(state, StorageState::Ambient | StorageState::Thawed) {
        if let Some(&consume) = vars.consume.get(&(n, p, state, t)) {
            outflow.push((consume, 1.0));
        }
    }

    if let Some(&dispose) = vars.dispose.get(&(n, p, state, t)) {
        outflow.push((dispose, 1.0));
    }

    (inflow, outflow)
}

pub(super) fn add_rows(
    _request: &SolveRequest,
    network: &PlanNetwork,
    index: &ModelIndex,
    shell: &mut ModelShell,
    vars: &PlanVars,
) {
    for &(n, p, state) in &index.presence {
        let node_id = index.nodes[n].id.clone();
        let product_id = index.products[p].id.clone();
        for t in 0..index.num_days() {
            let inv = vars.inventory[&(n, p, state, t)];
            let mut terms: Vec<(VarId, f64)> = vec![(inv, 1.0)];
            if t > 0 {
                terms.push((vars.inventory[&(n, p, state, t - 1)], -1.0));
            }
            let (inflow, outflow) = flow_terms(network, index, vars, n, p, state, t);
            for (var, coeff) in inflow {
                terms.push((var, -coeff));
            }
            for (var, coeff) in outflow {
                terms.push((var, coeff));
            }
            let rhs = if t == 0 {
                index.opening_total(n, p, state)
            } else {
                0.0
            };
            shell.add_eq(
                format!("bal_{}_{}_{}_{}", node_id, product_id, state, t),
                terms,
                rhs,
            );
        }
    }
}
