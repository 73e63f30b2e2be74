//! Post-solve and post-allocation invariant gates.
//!
//! These checks recompute everything from the extracted records, never from
//! the model internals, so a bug in the builder or the extraction cannot
//! vouch for itself. A violation is fatal and names the smallest witness
//! (node, product, state, date, amount) that breaks the rule.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate};
use tracing::debug;

use bakeplan_core::{
    NodeId, PlanError, PlanResult, ProductId, SolveRequest, StorageState, UNITS_PER_PALLET,
};

use crate::fefo::{BatchAllocation, FlowEvent};
use crate::solution::{AggregateSolution, ConversionKind};

const BALANCE_TOLERANCE: f64 = 1e-4;
const CLOSURE_TOLERANCE: f64 = 1e-2;

type Slot = (NodeId, ProductId, StorageState);

/// Flow quantities of one (node, product, state) slot, by day.
#[derive(Debug, Default, Clone)]
struct SlotFlows {
    inventory: BTreeMap<NaiveDate, f64>,
    inflow: BTreeMap<NaiveDate, f64>,
    outflow: BTreeMap<NaiveDate, f64>,
    opening: Vec<(NaiveDate, f64)>,
}

fn bump(map: &mut BTreeMap<NaiveDate, f64>, date: NaiveDate, quantity: f64) {
    *map.entry(date).or_insert(0.0) += quantity;
}

/// Rebuild per-slot flow series from the solution records.
fn collect_slots(request: &SolveRequest, solution: &AggregateSolution) -> BTreeMap<Slot, SlotFlows> {
    let mut slots: BTreeMap<Slot, SlotFlows> = BTreeMap::new();

    for record in &solution.inventory {
        let entry = slots
            .entry((record.node.clone(), record.product.clone(), record.state))
            .or_default();
        bump(&mut entry.inventory, record.date, record.quantity);
    }
    for record in &solution.production {
        let entry = slots
            .entry((
                record.node.clone(),
                record.product.clone(),
                StorageState::Ambient,
            ))
            .or_default();
        bump(&mut entry.inflow, record.date, record.quantity);
    }
    for record in &solution.shipments {
        let origin = slots
            .entry((record.origin.clone(), record.product.clone(), record.state))
            .or_default();
        bump(&mut origin.outflow, record.depart_date, record.quantity);
        if request.horizon.contains(record.arrive_date) {
            let dest = slots
                .entry((
                    record.destination.clone(),
                    record.product.clone(),
                    record.state,
                ))
                .or_default();
            bump(&mut dest.inflow, record.arrive_date, record.quantity);
        }
    }
    for record in &solution.conversions {
        let (from, to) = match record.kind {
            ConversionKind::Freeze => (StorageState::Ambient, StorageState::Frozen),
            ConversionKind::Thaw => (StorageState::Frozen, StorageState::Thawed),
        };
        let source = slots
            .entry((record.node.clone(), record.product.clone(), from))
            .or_default();
        bump(&mut source.outflow, record.date, record.quantity);
        let sink = slots
            .entry((record.node.clone(), record.product.clone(), to))
            .or_default();
        bump(&mut sink.inflow, record.date, record.quantity);
    }
    for record in &solution.consumption {
        let entry = slots
            .entry((
                record.destination.clone(),
                record.product.clone(),
                record.state,
            ))
            .or_default();
        bump(&mut entry.outflow, record.date, record.quantity);
    }
    for record in &solution.disposals {
        let entry = slots
            .entry((record.node.clone(), record.product.clone(), record.state))
            .or_default();
        bump(&mut entry.outflow, record.date, record.quantity);
    }
    for record in &request.initial_inventory {
        if record.quantity <= 0.0 {
            continue;
        }
        let entry_date = record
            .entry_date
            .unwrap_or(request.horizon.start)
            .min(request.horizon.start);
        let entry = slots
            .entry((record.node.clone(), record.product.clone(), record.state))
            .or_default();
        entry.opening.push((entry_date, record.quantity));
    }
    slots
}

/// Post-solve gate: material balance, pallet ceiling, demand partition,
/// residency windows, and global closure on the aggregate records.
pub fn check_solution(request: &SolveRequest, solution: &AggregateSolution) -> PlanResult<()> {
    if !solution.has_primal {
        return Err(PlanError::Invariant(
            "post-solve check invoked without a primal assignment".into(),
        ));
    }

    for record in &solution.inventory {
        if record.quantity < -BALANCE_TOLERANCE {
            return Err(PlanError::Invariant(format!(
                "negative inventory {:.4} of {} ({}) at {} on {}",
                record.quantity, record.product, record.state, record.node, record.date
            )));
        }
    }

    let slots = collect_slots(request, solution);

    // Daily mass balance.
    for ((node, product, state), flows) in &slots {
        let mut previous = 0.0;
        for date in request.horizon.days() {
            let opening: f64 = if date == request.horizon.start {
                flows.opening.iter().map(|(_, q)| q).sum()
            } else {
                0.0
            };
            let closing = flows.inventory.get(&date).copied().unwrap_or(0.0);
            let inflow = flows.inflow.get(&date).copied().unwrap_or(0.0);
            let outflow = flows.outflow.get(&date).copied().unwrap_or(0.0);
            let drift = closing - (previous + opening + inflow - outflow);
            if drift.abs() > BALANCE_TOLERANCE {
                return Err(PlanError::Invariant(format!(
                    "mass balance drift {:.5} for {} ({}) at {} on {}",
                    drift, product, state, node, date
                )));
            }
            previous = closing;
        }
    }

    // Residency window on the aggregate values: closing stock may not
    // exceed what entered the state over the trailing shelf-life window.
    for ((node, product, state), flows) in &slots {
        let Some(life) = request.products.get(product).map(|p| p.shelf_life) else {
            continue;
        };
        let window = life.days_in(*state) as i64;
        for date in request.horizon.days() {
            let closing = flows.inventory.get(&date).copied().unwrap_or(0.0);
            if closing <= BALANCE_TOLERANCE {
                continue;
            }
            let window_start = date - Duration::days(window - 1);
            let mut entered: f64 = flows
                .opening
                .iter()
                .filter(|(entry, _)| *entry >= window_start)
                .map(|(_, q)| q)
                .sum();
            for (_, q) in flows.inflow.range(window_start..=date) {
                entered += q;
            }
            if closing > entered + BALANCE_TOLERANCE {
                return Err(PlanError::Invariant(format!(
                    "{:.3} units of {} ({}) at {} on {} exceed the {}-day residency window by {:.4}",
                    closing,
                    product,
                    state,
                    node,
                    date,
                    window,
                    closing - entered
                )));
            }
        }
    }

    // Pallet ceiling.
    let node_map: BTreeMap<&NodeId, &bakeplan_core::Node> =
        request.nodes.iter().map(|n| (&n.id, n)).collect();
    let mut pallet_map: BTreeMap<(NodeId, ProductId, StorageState, NaiveDate), i64> =
        BTreeMap::new();
    for record in &solution.pallets {
        pallet_map.insert(
            (
                record.node.clone(),
                record.product.clone(),
                record.state,
                record.date,
            ),
            record.pallets,
        );
    }
    if request.options.use_pallet_tracking {
        for ((node, product, state), flows) in &slots {
            let storable = node_map
                .get(node)
                .map(|n| n.can_store(*state))
                .unwrap_or(false);
            if !storable {
                continue;
            }
            for date in request.horizon.days() {
                let closing = flows.inventory.get(&date).copied().unwrap_or(0.0);
                let expected = (((closing - BALANCE_TOLERANCE) / UNITS_PER_PALLET as f64).ceil()
                    as i64)
                    .max(0);
                let actual = pallet_map
                    .get(&(node.clone(), product.clone(), *state, date))
                    .copied()
                    .unwrap_or(0);
                if actual != expected {
                    return Err(PlanError::Invariant(format!(
                        "pallet count {} for {:.1} units of {} ({}) at {} on {} (expected {})",
                        actual, closing, product, state, node, date, expected
                    )));
                }
            }
        }
    }

    // Demand partition and fill-rate bounds.
    for fill in &solution.demand_fill {
        let drift = fill.consumed + fill.shortage - fill.demand;
        if drift.abs() > BALANCE_TOLERANCE {
            return Err(PlanError::Invariant(format!(
                "demand split off by {:.5} for {} at {} on {}",
                drift, fill.product, fill.destination, fill.date
            )));
        }
    }
    if !(0.0..=1.0 + 1e-9).contains(&solution.fill_rate) {
        return Err(PlanError::Invariant(format!(
            "fill rate {} outside [0, 1]",
            solution.fill_rate
        )));
    }

    // Global closure: everything that entered the system is consumed, still
    // on hand at horizon end, or delivered past the horizon.
    let opening_total: f64 = request
        .initial_inventory
        .iter()
        .map(|r| r.quantity.max(0.0))
        .sum();
    let produced = solution.total_production();
    let consumed: f64 = solution.consumption.iter().map(|r| r.quantity).sum();
    let disposed: f64 = solution.disposals.iter().map(|r| r.quantity).sum();
    let end_inventory = solution.end_inventory(request.horizon.end);
    let post_horizon: f64 = solution
        .shipments
        .iter()
        .filter(|s| s.arrive_date > request.horizon.end)
        .map(|s| s.quantity)
        .sum();
    let closure = opening_total + produced - consumed - disposed - end_inventory - post_horizon;
    if closure.abs() > CLOSURE_TOLERANCE {
        return Err(PlanError::Invariant(format!(
            "global mass closure off by {:.4} units",
            closure
        )));
    }

    debug!(slots = slots.len(), "post-solve checks passed");
    Ok(())
}

/// Post-allocation gate: the batch ledger must agree with the aggregate
/// flows at every boundary and never hold material past its state life.
pub fn check_allocation(
    request: &SolveRequest,
    solution: &AggregateSolution,
    allocation: &BatchAllocation,
) -> PlanResult<()> {
    // Aggregate agreement per (product, node, date) boundary.
    let mut ledger: BTreeMap<(FlowEvent, NodeId, ProductId, NaiveDate), f64> = BTreeMap::new();
    for flow in &allocation.flows {
        let node = match flow.event {
            FlowEvent::Produce | FlowEvent::ShipArrive => flow.to_location.clone(),
            _ => flow.from_location.clone(),
        };
        if let Some(node) = node {
            *ledger
                .entry((flow.event, node, flow.batch.product.clone(), flow.date))
                .or_insert(0.0) += flow.quantity;
        }
    }

    let expect = |event: FlowEvent, node: &NodeId, product: &ProductId, date: NaiveDate, quantity: f64| -> PlanResult<()> {
        let recorded = ledger
            .get(&(event, node.clone(), product.clone(), date))
            .copied()
            .unwrap_or(0.0);
        if (recorded - quantity).abs() > CLOSURE_TOLERANCE {
            return Err(PlanError::Invariant(format!(
                "batch ledger {:?} of {} at {} on {} sums to {:.3}, aggregate says {:.3}",
                event, product, node, date, recorded, quantity
            )));
        }
        Ok(())
    };

    let mut production_sum: BTreeMap<(NodeId, ProductId, NaiveDate), f64> = BTreeMap::new();
    for record in &solution.production {
        *production_sum
            .entry((record.node.clone(), record.product.clone(), record.date))
            .or_insert(0.0) += record.quantity;
    }
    for ((node, product, date), quantity) in production_sum {
        expect(FlowEvent::Produce, &node, &product, date, quantity)?;
    }

    let mut consumption_sum: BTreeMap<(NodeId, ProductId, NaiveDate), f64> = BTreeMap::new();
    for record in &solution.consumption {
        *consumption_sum
            .entry((
                record.destination.clone(),
                record.product.clone(),
                record.date,
            ))
            .or_insert(0.0) += record.quantity;
    }
    for ((node, product, date), quantity) in consumption_sum {
        expect(FlowEvent::Consume, &node, &product, date, quantity)?;
    }

    let mut depart_sum: BTreeMap<(NodeId, ProductId, NaiveDate), f64> = BTreeMap::new();
    for record in &solution.shipments {
        *depart_sum
            .entry((record.origin.clone(), record.product.clone(), record.depart_date))
            .or_insert(0.0) += record.quantity;
    }
    for ((node, product, date), quantity) in depart_sum {
        expect(FlowEvent::ShipDepart, &node, &product, date, quantity)?;
    }

    // Per-batch conservation: everything a batch starts with is consumed,
    // wasted, or delivered beyond the horizon.
    let mut terminal: BTreeMap<&crate::fefo::BatchId, f64> = BTreeMap::new();
    for flow in &allocation.flows {
        let is_terminal = matches!(flow.event, FlowEvent::Consume | FlowEvent::Waste)
            || (flow.event == FlowEvent::ShipArrive && flow.date > request.horizon.end);
        if is_terminal {
            *terminal.entry(&flow.batch).or_insert(0.0) += flow.quantity;
        }
    }
    for batch in &allocation.batches {
        let settled = terminal.get(&batch.id).copied().unwrap_or(0.0);
        if (settled - batch.initial_quantity).abs() > CLOSURE_TOLERANCE {
            return Err(PlanError::Invariant(format!(
                "batch {} settles {:.3} of {:.3} units",
                batch.id, settled, batch.initial_quantity
            )));
        }
    }

    // Residency: no removal may happen after the state's shelf life ran out.
    let mut entered: BTreeMap<(crate::fefo::BatchId, StorageState), NaiveDate> = BTreeMap::new();
    let mut by_date: Vec<&crate::fefo::BatchFlow> = allocation.flows.iter().collect();
    by_date.sort_by_key(|f| f.date);
    for flow in by_date {
        if let Some(to_state) = flow.to_state {
            match flow.event {
                FlowEvent::Produce | FlowEvent::Thaw | FlowEvent::Freeze => {
                    entered.insert((flow.batch.clone(), to_state), flow.date);
                }
                _ => {}
            }
        }
        // Waste is the disposal of whatever could not be used in time, so
        // only usage events are held to the residency bound.
        if flow.event == FlowEvent::Waste {
            continue;
        }
        if let Some(from_state) = flow.from_state {
            let life = request
                .products
                .get(&flow.batch.product)
                .map(|p| p.shelf_life.days_in(from_state) as i64)
                .unwrap_or(i64::MAX);
            let entry = entered
                .get(&(flow.batch.clone(), from_state))
                .copied()
                .unwrap_or(flow.batch.date);
            let residency = (flow.date - entry).num_days();
            if residency > life {
                return Err(PlanError::Invariant(format!(
                    "batch {} stayed {} days in {} (life {}) before {:?} on {}",
                    flow.batch, residency, from_state, life, flow.event, flow.date
                )));
            }
        }
    }

    // Every batch id is unique.
    let mut seen: BTreeSet<&crate::fefo::BatchId> = BTreeSet::new();
    for batch in &allocation.batches {
        if !seen.insert(&batch.id) {
            return Err(PlanError::Invariant(format!(
                "duplicate batch id {}",
                batch.id
            )));
        }
    }

    debug!(batches = allocation.batches.len(), "post-allocation checks passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_accumulates() {
        let mut map = BTreeMap::new();
        let d = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        bump(&mut map, d, 2.0);
        bump(&mut map, d, 3.0);
        assert_eq!(map[&d], 5.0);
    }
}
