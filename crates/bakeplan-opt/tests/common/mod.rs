//! Shared builders for the end-to-end scenarios.

#![allow(dead_code)]

use std::collections::BTreeMap;

use chrono::NaiveDate;

use bakeplan_core::{
    CostStructure, ForecastEntry, Horizon, LaborCalendar, LaborDay, Node, NodeCapabilities,
    NodeId, PlanOptions, Product, ProductId, Route, ShelfLife, SolveRequest, StorageLimits,
    StorageState,
};

/// Route solver and planner traces to the test output when RUST_LOG is set.
pub fn init_logs() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

pub fn product(id: &str, units_per_mix: u32, unit_cost: f64) -> Product {
    Product {
        id: ProductId::new(id),
        shelf_life: ShelfLife::default(),
        units_per_mix,
        unit_cost,
    }
}

pub fn producer(id: &str, units_per_hour: f64) -> Node {
    Node {
        id: NodeId::new(id),
        capabilities: NodeCapabilities {
            can_produce: true,
            can_store_ambient: true,
            ..Default::default()
        },
        units_per_hour: Some(units_per_hour),
        storage_limits: StorageLimits::default(),
    }
}

pub fn store(id: &str) -> Node {
    Node {
        id: NodeId::new(id),
        capabilities: NodeCapabilities {
            can_store_ambient: true,
            is_demand_point: true,
            ..Default::default()
        },
        units_per_hour: None,
        storage_limits: StorageLimits::default(),
    }
}

pub fn route(origin: &str, destination: &str, state: StorageState, transit: u32, cost: f64) -> Route {
    Route {
        origin: NodeId::new(origin),
        destination: NodeId::new(destination),
        state,
        transit_days: transit,
        cost_per_unit: cost,
    }
}

pub fn labor_day(fixed_hours: f64, max_hours: f64) -> LaborDay {
    LaborDay {
        fixed_hours,
        regular_rate: 25.0,
        overtime_rate: 37.5,
        non_fixed_rate: 40.0,
        max_hours,
    }
}

/// Fixed 12-hour weekdays across the horizon; weekends stay idle.
pub fn weekday_calendar(horizon: &Horizon) -> LaborCalendar {
    let mut calendar = LaborCalendar::default();
    for date in horizon.days() {
        if !bakeplan_core::calendar::is_weekend(date) {
            calendar.insert(date, labor_day(12.0, 14.0));
        }
    }
    calendar
}

pub fn costs() -> CostStructure {
    CostStructure {
        production_cost_per_unit: 1.2,
        shortage_penalty_per_unit: 20.0,
        storage_cost_frozen_per_pallet_day: 0.5,
        storage_cost_ambient_per_pallet_day: 0.2,
        storage_cost_fixed_per_pallet: 1.0,
        changeover_cost_per_start: 50.0,
        changeover_waste_units: 20.0,
        waste_cost_multiplier: 10.0,
    }
}

pub fn demand(destination: &str, product: &str, date: NaiveDate, quantity: f64) -> ForecastEntry {
    ForecastEntry {
        destination: NodeId::new(destination),
        product: ProductId::new(product),
        delivery_date: date,
        quantity,
    }
}

pub fn request(
    horizon: Horizon,
    nodes: Vec<Node>,
    routes: Vec<Route>,
    products: Vec<Product>,
    forecast: Vec<ForecastEntry>,
) -> SolveRequest {
    let catalog: BTreeMap<ProductId, Product> =
        products.into_iter().map(|p| (p.id.clone(), p)).collect();
    let labor_calendar = weekday_calendar(&horizon);
    let mut options = PlanOptions::default();
    options.solver.mip_gap = 1e-4;
    SolveRequest {
        horizon,
        nodes,
        routes,
        trucks: vec![],
        products: catalog,
        labor_calendar,
        cost_structure: costs(),
        forecast,
        initial_inventory: vec![],
        options,
    }
}
