//! Column creation for every variable family.
//!
//! Objective coefficients are attached here, at creation time, so the cost
//! breakdown can later be recomputed from the registry alone. End-of-horizon
//! waste is priced directly on the last day's inventory columns; shipments
//! still rolling at the horizon end are deliveries, not waste, and carry
//! only their transport cost.

use std::collections::BTreeSet;

use bakeplan_core::{PlanNetwork, SolveRequest, StorageState};

use crate::index::ModelIndex;

use super::{CostCategory, ModelShell, PlanVars};

pub(super) fn add_columns(
    request: &SolveRequest,
    network: &PlanNetwork,
    index: &ModelIndex,
    shell: &mut ModelShell,
    vars: &mut PlanVars,
) {
    let costs = &request.cost_structure;
    let opts = &request.options;
    let last = index.last_day();

    // Production, mix granularity, and changeover indicators.
    for &(n, p, t) in &index.production_keys {
        let node = &index.nodes[n];
        let product = &index.products[p];
        let max_units = index.max_daily_units(n, t);
        let max_mixes = (max_units / product.units_per_mix as f64).floor();

        let production = shell.add_col(
            format!("prod_{}_{}_{}", node.id, product.id, t),
            product.unit_cost,
            CostCategory::Production,
            0.0,
            max_units,
            false,
        );
        let mixes = shell.add_col(
            format!("mix_{}_{}_{}", node.id, product.id, t),
            0.0,
            CostCategory::None,
            0.0,
            max_mixes,
            true,
        );
        let produced = shell.add_col(
            format!("run_{}_{}_{}", node.id, product.id, t),
            0.0,
            CostCategory::None,
            0.0,
            1.0,
            true,
        );
        let start = shell.add_col(
            format!("start_{}_{}_{}", node.id, product.id, t),
            costs.changeover_cost_per_start + costs.changeover_waste_units * product.unit_cost,
            CostCategory::Changeover,
            0.0,
            1.0,
            true,
        );
        vars.production.insert((n, p, t), production);
        vars.mix_count.insert((n, p, t), mixes);
        vars.produced.insert((n, p, t), produced);
        vars.start.insert((n, p, t), start);
    }

    // Labor hours. Fixed-day payroll is committed: it lands in the objective
    // constant, and the fixed-hours variable itself is free to use.
    for &(n, t) in &index.labor_keys {
        let node = &index.nodes[n];
        let day = index.labor[t].expect("labor key on a day without a regime");
        if day.is_fixed_day() {
            shell.fixed_labor_cost += day.fixed_hours * day.regular_rate;
            let fixed = shell.add_col(
                format!("fh_{}_{}", node.id, t),
                0.0,
                CostCategory::None,
                0.0,
                day.fixed_hours.min(day.max_hours),
                false,
            );
            let overtime = shell.add_col(
                format!("ot_{}_{}", node.id, t),
                day.overtime_rate,
                CostCategory::Labor,
                0.0,
                (day.max_hours - day.fixed_hours).max(0.0),
                false,
            );
            vars.fixed_hours.insert((n, t), fixed);
            vars.overtime_hours.insert((n, t), overtime);
        } else {
            let floor = opts.non_fixed_minimum_paid_hours.max(0.0);
            let hours = shell.add_col(
                format!("nfh_{}_{}", node.id, t),
                0.0,
                CostCategory::None,
                0.0,
                day.max_hours,
                false,
            );
            let paid = shell.add_col(
                format!("nfp_{}_{}", node.id, t),
                day.non_fixed_rate,
                CostCategory::Labor,
                0.0,
                day.max_hours.max(floor),
                false,
            );
            vars.non_fixed_hours.insert((n, t), hours);
            vars.non_fixed_paid.insert((n, t), paid);
            if floor > 0.0 {
                let active = shell.add_col(
                    format!("nfa_{}_{}", node.id, t),
                    0.0,
                    CostCategory::None,
                    0.0,
                    1.0,
                    true,
                );
                vars.non_fixed_active.insert((n, t), active);
            }
        }
    }

    // Inventory. Pass-through states (a thaw point without frozen storage)
    // get a column pinned to zero so the balance row can still route flow.
    for &(n, p, state) in &index.presence {
        let node = &index.nodes[n];
        let product = &index.products[p];
        let storable = node.can_store(state);
        for t in 0..index.num_days() {
            let waste = if t == last {
                costs.waste_cost_multiplier * product.unit_cost
            } else {
                0.0
            };
            let category = if t == last {
                CostCategory::Waste
            } else {
                CostCategory::None
            };
            let upper = if storable { f64::INFINITY } else { 0.0 };
            let inv = shell.add_col(
                format!("inv_{}_{}_{}_{}", node.id, product.id, state, t),
                waste,
                category,
                0.0,
                upper,
                false,
            );
            vars.inventory.insert((n, p, state, t), inv);

            if storable {
                // Stock that cannot be used in time needs a disposal path;
                // it is billed like end-of-horizon waste.
                let dispose = shell.add_col(
                    format!("disp_{}_{}_{}_{}", node.id, product.id, state, t),
                    costs.waste_cost_multiplier * product.unit_cost,
                    CostCategory::Waste,
                    0.0,
                    f64::INFINITY,
                    false,
                );
                vars.dispose.insert((n, p, state, t), dispose);
                let count = shell.add_col(
                    format!("pal_{}_{}_{}_{}", node.id, product.id, state, t),
                    costs.storage_rate(state),
                    CostCategory::StorageDaily,
                    0.0,
                    f64::INFINITY,
                    opts.use_pallet_tracking,
                );
                let entry = shell.add_col(
                    format!("pent_{}_{}_{}_{}", node.id, product.id, state, t),
                    costs.storage_cost_fixed_per_pallet,
                    CostCategory::StorageEntry,
                    0.0,
                    f64::INFINITY,
                    opts.use_pallet_tracking,
                );
                vars.pallet_count.insert((n, p, state, t), count);
                vars.pallet_entry.insert((n, p, state, t), entry);
            }
        }
    }

    // Shipments.
    for &(l, p, t) in &index.transit_keys {
        let leg = &network.legs[l];
        let product = &index.products[p];
        let ship = shell.add_col(
            format!("ship_{}_{}_{}_{}", leg.origin, leg.destination, product.id, t),
            leg.cost_per_unit,
            CostCategory::Transport,
            0.0,
            f64::INFINITY,
            false,
        );
        vars.in_transit.insert((l, p, t), ship);
    }

    // Conversions.
    for &(n, p, t) in &index.thaw_keys {
        let thaw = shell.add_col(
            format!("thaw_{}_{}_{}", index.nodes[n].id, index.products[p].id, t),
            0.0,
            CostCategory::None,
            0.0,
            f64::INFINITY,
            false,
        );
        vars.thaw.insert((n, p, t), thaw);
    }
    for &(n, p, t) in &index.freeze_keys {
        let freeze = shell.add_col(
            format!("frz_{}_{}_{}", index.nodes[n].id, index.products[p].id, t),
            0.0,
            CostCategory::None,
            0.0,
            f64::INFINITY,
            false,
        );
        vars.freeze.insert((n, p, t), freeze);
    }

    // Trucks, only for departures some shipment key can actually use.
    let serviced: BTreeSet<(usize, usize)> = index
        .transit_keys
        .iter()
        .map(|&(l, _, t)| (l, t))
        .collect();
    for (k, instance) in network.truck_instances.iter().enumerate() {
        let Some(day) = request.horizon.index_of(instance.date) else {
            continue;
        };
        let feeds_a_leg = network.legs.iter().enumerate().any(|(l, leg)| {
            leg.origin == instance.origin
                && leg.destination == instance.destination
                && serviced.contains(&(l, day))
        });
        if !feeds_a_leg {
            continue;
        }
        let used = shell.add_col(
            format!("tu_{}_{}", instance.truck, day),
            instance.fixed_cost,
            CostCategory::Transport,
            0.0,
            1.0,
            opts.use_truck_pallet_tracking,
        );
        vars.truck_used.insert(k, used);
        for (p, product) in index.products.iter().enumerate() {
            let load = shell.add_col(
                format!("tl_{}_{}_{}", instance.truck, product.id, day),
                0.0,
                CostCategory::None,
                0.0,
                instance.pallet_capacity as f64,
                opts.use_truck_pallet_tracking,
            );
            vars.truck_load.insert((k, p), load);
        }
    }

    // Demand consumption and shortage.
    for cell in &index.demand_cells {
        let node = &index.nodes[cell.node];
        let product = &index.products[cell.product];
        for state in [StorageState::Ambient, StorageState::Thawed] {
            if !index.presence.contains(&(cell.node, cell.product, state)) {
                continue;
            }
            let consume = shell.add_col(
                format!("cons_{}_{}_{}_{}", node.id, product.id, state, cell.day),
                0.0,
                CostCategory::None,
                0.0,
                cell.quantity,
                false,
            );
            vars.consume
                .insert((cell.node, cell.product, state, cell.day), consume);
        }
        if opts.allow_shortages {
            let shortage = shell.add_col(
                format!("short_{}_{}_{}", node.id, product.id, cell.day),
                costs.shortage_penalty_per_unit,
                CostCategory::Shortage,
                0.0,
                cell.quantity,
                false,
            );
            vars.shortage
                .insert((cell.node, cell.product, cell.day), shortage);
        }
    }
}
