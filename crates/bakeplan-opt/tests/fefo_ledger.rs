//! Batch-ledger reconstruction on hand-crafted aggregate solutions.
//!
//! These exercise the weighted-age ordering, state filtering, and failure
//! modes of the allocator without going through the solver.

mod common;

use bakeplan_core::{Horizon, InventoryRecord, NodeId, PlanError, ProductId, StorageState};
use bakeplan_opt::{
    allocate, AggregateSolution, ConsumptionRecord, ConversionKind, ConversionRecord,
    CostBreakdown, FlowEvent, ShipmentRecord, SolveStatus,
};
use common::*;

fn blank_solution() -> AggregateSolution {
    AggregateSolution {
        status: SolveStatus::Optimal,
        has_primal: true,
        objective_value: 0.0,
        mip_gap: 0.01,
        solve_seconds: 0.0,
        production: vec![],
        inventory: vec![],
        shipments: vec![],
        conversions: vec![],
        consumption: vec![],
        disposals: vec![],
        demand_fill: vec![],
        pallets: vec![],
        truck_loads: vec![],
        labor: vec![],
        cost_breakdown: CostBreakdown::default(),
        fill_rate: 1.0,
        warnings: vec![],
    }
}

fn depot_request() -> bakeplan_core::SolveRequest {
    let horizon = Horizon::new(d(2026, 3, 2), d(2026, 3, 9)).unwrap();
    request(
        horizon,
        vec![store("depot")],
        vec![],
        vec![product("LOAF", 100, 1.2)],
        vec![],
    )
}

fn opening(state: StorageState, entry: chrono::NaiveDate, quantity: f64) -> InventoryRecord {
    InventoryRecord {
        node: NodeId::new("depot"),
        product: ProductId::new("LOAF"),
        state,
        quantity,
        entry_date: Some(entry),
    }
}

#[test]
fn consumption_draws_highest_weighted_age_first() {
    let mut request = depot_request();
    // 10 ambient days (W ~ 0.59) vs 1 ambient day (W ~ 0.06)
    request
        .initial_inventory
        .push(opening(StorageState::Ambient, d(2026, 2, 20), 50.0));
    request
        .initial_inventory
        .push(opening(StorageState::Ambient, d(2026, 3, 1), 50.0));

    let mut solution = blank_solution();
    solution.consumption.push(ConsumptionRecord {
        destination: NodeId::new("depot"),
        product: ProductId::new("LOAF"),
        state: StorageState::Ambient,
        date: d(2026, 3, 2),
        quantity: 1.0,
    });

    let allocation = allocate(&request, &solution).unwrap();
    let consume = allocation
        .flows
        .iter()
        .find(|f| f.event == FlowEvent::Consume)
        .expect("consume flow");
    assert_eq!(consume.batch.date, d(2026, 2, 20));
    assert!((consume.quantity - 1.0).abs() < 1e-9);
}

#[test]
fn frozen_route_only_considers_frozen_stock() {
    let mut request = depot_request();
    // The ambient batch has the higher weighted age (10/17 vs 60/120), but a
    // frozen shipment cannot touch it.
    request
        .initial_inventory
        .push(opening(StorageState::Frozen, d(2026, 1, 1), 10.0));
    request
        .initial_inventory
        .push(opening(StorageState::Ambient, d(2026, 2, 20), 10.0));

    let mut solution = blank_solution();
    solution.shipments.push(ShipmentRecord {
        origin: NodeId::new("depot"),
        destination: NodeId::new("outlet"),
        product: ProductId::new("LOAF"),
        state: StorageState::Frozen,
        depart_date: d(2026, 3, 2),
        arrive_date: d(2026, 3, 3),
        quantity: 5.0,
    });

    let allocation = allocate(&request, &solution).unwrap();
    let depart = allocation
        .flows
        .iter()
        .find(|f| f.event == FlowEvent::ShipDepart)
        .expect("depart flow");
    assert_eq!(depart.batch.date, d(2026, 1, 1));
    assert_eq!(depart.from_state, Some(StorageState::Frozen));

    // The parcel lands the next day and its history reads in order; the
    // unshipped remainder and the delivered parcel both waste at the end.
    let history = allocation.location_history(&depart.batch);
    let events: Vec<FlowEvent> = history.iter().map(|f| f.event).collect();
    assert_eq!(
        events[..3],
        [FlowEvent::Produce, FlowEvent::ShipDepart, FlowEvent::ShipArrive]
    );
    assert!(events[3..].iter().all(|e| *e == FlowEvent::Waste));
    let arrived = history
        .iter()
        .find(|f| f.event == FlowEvent::ShipArrive)
        .unwrap();
    assert_eq!(arrived.to_location, Some(NodeId::new("outlet")));
    assert_eq!(arrived.date, d(2026, 3, 3));
}

#[test]
fn banked_fractions_order_the_frozen_pool() {
    let mut request = depot_request();
    request
        .initial_inventory
        .push(opening(StorageState::Frozen, d(2026, 1, 1), 10.0));
    request
        .initial_inventory
        .push(opening(StorageState::Ambient, d(2026, 2, 20), 10.0));

    let mut solution = blank_solution();
    // Freeze the ambient batch on day one; by day two the frozen pool holds
    // the fresh-frozen batch (W ~ 0.51) and the banked one (W ~ 0.60).
    solution.conversions.push(ConversionRecord {
        node: NodeId::new("depot"),
        product: ProductId::new("LOAF"),
        date: d(2026, 3, 2),
        kind: ConversionKind::Freeze,
        quantity: 10.0,
    });
    solution.conversions.push(ConversionRecord {
        node: NodeId::new("depot"),
        product: ProductId::new("LOAF"),
        date: d(2026, 3, 3),
        kind: ConversionKind::Thaw,
        quantity: 1.0,
    });

    let allocation = allocate(&request, &solution).unwrap();
    let thaw = allocation
        .flows
        .iter()
        .find(|f| f.event == FlowEvent::Thaw)
        .expect("thaw flow");
    assert_eq!(thaw.batch.date, d(2026, 2, 20));
}

#[test]
fn leftovers_waste_at_horizon_end_and_snapshots_project_lots() {
    let mut request = depot_request();
    request
        .initial_inventory
        .push(opening(StorageState::Ambient, d(2026, 3, 1), 100.0));

    let allocation = allocate(&request, &blank_solution()).unwrap();

    let waste: Vec<_> = allocation
        .flows
        .iter()
        .filter(|f| f.event == FlowEvent::Waste)
        .collect();
    assert_eq!(waste.len(), 1);
    assert_eq!(waste[0].date, d(2026, 3, 9));
    assert!((waste[0].quantity - 100.0).abs() < 1e-9);

    let mid = allocation.snapshot_at(d(2026, 3, 5));
    assert_eq!(mid.len(), 1);
    assert_eq!(mid[0].node, NodeId::new("depot"));
    assert_eq!(mid[0].state, StorageState::Ambient);
    assert_eq!(mid[0].entry_date, Some(d(2026, 3, 1)));
    assert!((mid[0].quantity - 100.0).abs() < 1e-9);

    assert!(allocation.snapshot_at(d(2026, 3, 9)).is_empty());
}

#[test]
fn uncoverable_flow_is_a_fatal_inconsistency() {
    let request = depot_request();
    let mut solution = blank_solution();
    solution.consumption.push(ConsumptionRecord {
        destination: NodeId::new("depot"),
        product: ProductId::new("LOAF"),
        state: StorageState::Ambient,
        date: d(2026, 3, 2),
        quantity: 5.0,
    });

    let err = allocate(&request, &solution).unwrap_err();
    assert!(matches!(err, PlanError::Invariant(_)));
    assert!(err.to_string().contains("consumption"));
}
