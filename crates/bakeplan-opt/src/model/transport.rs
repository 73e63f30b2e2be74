//! Truck coverage/capacity and pallet accounting.

use std::collections::BTreeMap;

use bakeplan_core::{NodeId, PlanNetwork, SolveRequest, StorageState, UNITS_PER_PALLET};

use crate::index::ModelIndex;

use super::{ModelShell, PlanVars, VarId};

pub(super) fn add_rows(
    request: &SolveRequest,
    network: &PlanNetwork,
    index: &ModelIndex,
    shell: &mut ModelShell,
    vars: &PlanVars,
) {
    let pallet = UNITS_PER_PALLET as f64;

    // Pallet ceiling: count * 320 sandwiched so an integer count is exactly
    // the ceiling of inventory / 320, and a relaxed count its lower envelope.
    for (&(n, p, state, t), &count) in &vars.pallet_count {
        let node_id = &index.nodes[n].id;
        let product_id = &index.products[p].id;
        let inv = vars.inventory[&(n, p, state, t)];
        shell.add_ge(
            format!("pallo_{}_{}_{}_{}", node_id, product_id, state, t),
            vec![(count, pallet), (inv, -1.0)],
            0.0,
        );
        shell.add_le(
            format!("palhi_{}_{}_{}_{}", node_id, product_id, state, t),
            vec![(count, pallet), (inv, -1.0)],
            pallet - 1.0,
        );

        // Entries are the positive part of the day-over-day count change;
        // opening stock was racked before the horizon and is not re-billed.
        let entry = vars.pallet_entry[&(n, p, state, t)];
        if t == 0 {
            let opening_pallets = (index.opening_total(n, p, state) / pallet).ceil();
            shell.add_ge(
                format!("pentlink_{}_{}_{}_{}", node_id, product_id, state, t),
                vec![(entry, 1.0), (count, -1.0)],
                -opening_pallets,
            );
        } else {
            let previous = vars.pallet_count[&(n, p, state, t - 1)];
            shell.add_ge(
                format!("pentlink_{}_{}_{}_{}", node_id, product_id, state, t),
                vec![(entry, 1.0), (count, -1.0), (previous, 1.0)],
                0.0,
            );
        }
    }

    // Per-state storage capacity, where configured.
    for (n, node) in index.nodes.iter().enumerate() {
        for state in StorageState::ALL {
            let Some(limit) = node.storage_limits.for_state(state) else {
                continue;
            };
            for t in 0..index.num_days() {
                let terms: Vec<(VarId, f64)> = (0..index.products.len())
                    .filter_map(|p| vars.pallet_count.get(&(n, p, state, t)))
                    .map(|&count| (count, 1.0))
                    .collect();
                if !terms.is_empty() {
                    shell.add_le(
                        format!("cap_{}_{}_{}", node.id, state, t),
                        terms,
                        limit as f64,
                    );
                }
            }
        }
    }

    // Group shipments by (origin, destination, product, departure day).
    let mut departures: BTreeMap<(NodeId, NodeId, usize, usize), Vec<VarId>> = BTreeMap::new();
    for (&(l, p, t), &ship) in &vars.in_transit {
        let leg = &network.legs[l];
        if network.has_truck_service(&leg.origin, &leg.destination) {
            departures
                .entry((leg.origin.clone(), leg.destination.clone(), p, t))
                .or_default()
                .push(ship);
        }
    }

    // Coverage: a product departing a serviced pair must fit on the whole
    // pallets of it loaded across that day's truck instances; products do
    // not share pallets.
    for ((origin, destination, p, t), ships) in departures {
        let date = index.days[t];
        let mut terms: Vec<(VarId, f64)> = ships.into_iter().map(|s| (s, 1.0)).collect();
        let mut any_truck = false;
        for &k in network.instances_departing(&origin, &destination, date) {
            if let Some(&load) = vars.truck_load.get(&(k, p)) {
                terms.push((load, -pallet));
                any_truck = true;
            }
        }
        if any_truck {
            shell.add_le(
                format!("cover_{}_{}_{}_{}", origin, destination, index.products[p].id, t),
                terms,
                0.0,
            );
        }
    }

    // Capacity and departure gating per truck instance.
    for (&k, &used) in &vars.truck_used {
        let instance = &network.truck_instances[k];
        let mut terms: Vec<(VarId, f64)> = vec![(used, -(instance.pallet_capacity as f64))];
        for p in 0..index.products.len() {
            if let Some(&load) = vars.truck_load.get(&(k, p)) {
                terms.push((load, 1.0));
            }
        }
        if terms.len() > 1 {
            let day = request
                .horizon
                .index_of(instance.date)
                .unwrap_or_default();
            shell.add_le(format!("truckcap_{}_{}", instance.truck, day), terms, 0.0);
        }
    }
}
