//! Pre-build validation gate.
//!
//! Every check here is fail-fast: a record that cannot be honored exactly is
//! an error naming the offending record, never a guess. Silent defaulting of
//! labor days or demand records has historically masked very large
//! shortages, so the gate refuses to infer anything a human did not write
//! down. The only tolerated adjustments are explicitly reported warnings.

use chrono::Duration;

use crate::diagnostics::Diagnostics;
use crate::domain::StorageState;
use crate::error::{PlanError, PlanResult};
use crate::network::PlanNetwork;
use crate::request::SolveRequest;

/// Minimum ratio of shortage penalty to production cost. Documented floor;
/// operators may configure any larger penalty.
pub const MIN_SHORTAGE_PENALTY_RATIO: f64 = 4.0;

/// Run the pre-build gate. Warnings are returned; any error aborts.
pub fn validate_request(
    request: &SolveRequest,
    network: &PlanNetwork,
) -> PlanResult<Diagnostics> {
    let mut diag = Diagnostics::new();

    check_products(request, &mut diag);
    check_nodes(request, &mut diag);
    check_routes(request, network, &mut diag);
    check_trucks(request, network, &mut diag);
    check_labor(request, &mut diag);
    check_costs(request, &mut diag);
    check_forecast(request, network, &mut diag);
    check_initial_inventory(request, network, &mut diag);

    if diag.has_errors() {
        return Err(PlanError::Config(format!(
            "{} validation error(s):\n{}",
            diag.error_count(),
            diag.error_summary()
        )));
    }
    Ok(diag)
}

fn check_products(request: &SolveRequest, diag: &mut Diagnostics) {
    if request.products.is_empty() {
        diag.error("catalog", "product catalog is empty");
    }
    for (id, product) in &request.products {
        let entity = format!("product {}", id);
        if product.id != *id {
            diag.error_for("catalog", &entity, "catalog key differs from product id");
        }
        if product.units_per_mix == 0 {
            diag.error_for("catalog", &entity, "units_per_mix must be positive");
        }
        for state in StorageState::ALL {
            if product.shelf_life.days_in(state) == 0 {
                diag.error_for(
                    "catalog",
                    &entity,
                    format!("{} shelf life must be positive", state),
                );
            }
        }
        if product.unit_cost < 0.0 {
            diag.error_for("catalog", &entity, "unit_cost is negative");
        }
    }
}

fn check_nodes(request: &SolveRequest, diag: &mut Diagnostics) {
    if request.nodes.is_empty() {
        diag.error("network", "no nodes configured");
    }
    for node in &request.nodes {
        let entity = format!("node {}", node.id);
        let caps = &node.capabilities;
        if caps.can_produce {
            match node.units_per_hour {
                Some(rate) if rate > 0.0 => {}
                _ => diag.error_for(
                    "network",
                    &entity,
                    "producing node needs a positive units_per_hour",
                ),
            }
        }
        let any_capability = caps.can_produce
            || caps.can_store_ambient
            || caps.can_store_frozen
            || caps.can_store_thawed
            || caps.can_thaw
            || caps.can_freeze
            || caps.is_demand_point;
        if !any_capability {
            diag.warning_for("network", &entity, "node has no capabilities and is inert");
        }
    }
}

fn check_routes(request: &SolveRequest, network: &PlanNetwork, diag: &mut Diagnostics) {
    for route in &request.routes {
        let entity = format!("route {}", route.label());
        if route.origin == route.destination {
            diag.error_for("route", &entity, "origin and destination are the same node");
            continue;
        }
        // Unknown endpoints are caught when the network is built; here we
        // check state compatibility on both ends.
        if let Some(origin) = network.node(&route.origin) {
            if !origin.can_handle(route.state) {
                diag.error_for(
                    "route",
                    &entity,
                    format!("origin cannot hold {} stock to ship", route.state),
                );
            }
        }
        if let Some(dest) = network.node(&route.destination) {
            if !dest.can_handle(route.state) {
                diag.error_for(
                    "route",
                    &entity,
                    format!("destination cannot accept {} arrivals", route.state),
                );
            }
        }
    }
}

fn check_trucks(request: &SolveRequest, network: &PlanNetwork, diag: &mut Diagnostics) {
    for truck in &request.trucks {
        let entity = format!("truck {}", truck.id);
        if truck.pallet_capacity == 0 {
            diag.error_for("truck", &entity, "pallet_capacity must be positive");
        }
        if truck.departure_weekdays.is_empty() {
            diag.warning_for("truck", &entity, "no departure weekdays; schedule is inert");
        }
        let has_route = request
            .routes
            .iter()
            .any(|r| r.origin == truck.origin && r.destination == truck.destination);
        if !has_route && network.node(&truck.origin).is_some() {
            diag.warning_for(
                "truck",
                &entity,
                format!(
                    "no route from {} to {}; departures will never load",
                    truck.origin, truck.destination
                ),
            );
        }
    }
}

fn check_labor(request: &SolveRequest, diag: &mut Diagnostics) {
    let any_producer = request.nodes.iter().any(|n| n.capabilities.can_produce);
    if any_producer {
        let missing = request.labor_calendar.missing_weekdays(&request.horizon);
        for date in &missing {
            diag.error_for(
                "labor",
                format!("date {}", date),
                "weekday inside the horizon has no labor calendar entry",
            );
        }
    }
    for date in request.horizon.days() {
        if let Some(day) = request.labor_calendar.get(date) {
            let entity = format!("labor day {}", date);
            if day.fixed_hours < 0.0 || day.max_hours < 0.0 {
                diag.error_for("labor", &entity, "negative hours");
            }
            if day.max_hours < day.fixed_hours {
                diag.error_for("labor", &entity, "max_hours below fixed_hours");
            }
            if day.regular_rate < 0.0 || day.overtime_rate < 0.0 || day.non_fixed_rate < 0.0 {
                diag.error_for("labor", &entity, "negative labor rate");
            }
        }
    }
}

fn check_costs(request: &SolveRequest, diag: &mut Diagnostics) {
    let costs = &request.cost_structure;
    let floor = MIN_SHORTAGE_PENALTY_RATIO * costs.production_cost_per_unit;
    if costs.shortage_penalty_per_unit < floor {
        diag.error(
            "cost",
            format!(
                "shortage_penalty_per_unit {} is below {}x production cost ({})",
                costs.shortage_penalty_per_unit, MIN_SHORTAGE_PENALTY_RATIO, floor
            ),
        );
    }
    for (id, product) in &request.products {
        if costs.shortage_penalty_per_unit < MIN_SHORTAGE_PENALTY_RATIO * product.unit_cost {
            diag.warning_for(
                "cost",
                format!("product {}", id),
                "shortage penalty does not dominate this product's unit cost",
            );
        }
    }
    if costs.waste_cost_multiplier < 1.0 {
        diag.error("cost", "waste_cost_multiplier must be at least 1");
    }
    let rates = [
        ("production_cost_per_unit", costs.production_cost_per_unit),
        (
            "storage_cost_frozen_per_pallet_day",
            costs.storage_cost_frozen_per_pallet_day,
        ),
        (
            "storage_cost_ambient_per_pallet_day",
            costs.storage_cost_ambient_per_pallet_day,
        ),
        (
            "storage_cost_fixed_per_pallet",
            costs.storage_cost_fixed_per_pallet,
        ),
        ("changeover_cost_per_start", costs.changeover_cost_per_start),
        ("changeover_waste_units", costs.changeover_waste_units),
    ];
    for (name, value) in rates {
        if value < 0.0 {
            diag.error("cost", format!("{} is negative", name));
        }
    }
}

fn check_forecast(request: &SolveRequest, network: &PlanNetwork, diag: &mut Diagnostics) {
    for entry in &request.forecast {
        let entity = format!(
            "forecast {} x{} @ {} on {}",
            entry.product, entry.quantity, entry.destination, entry.delivery_date
        );
        let product = match request.products.get(&entry.product) {
            Some(p) => p,
            None => {
                diag.error_for(
                    "catalog",
                    &entity,
                    "forecast references a product missing from the catalog",
                );
                continue;
            }
        };
        match network.node(&entry.destination) {
            None => {
                diag.error_for("forecast", &entity, "unknown destination node");
                continue;
            }
            Some(node) if !node.capabilities.is_demand_point => {
                diag.error_for("forecast", &entity, "destination is not a demand point");
                continue;
            }
            Some(_) => {}
        }
        if !request.horizon.contains(entry.delivery_date) {
            diag.error_for("forecast", &entity, "delivery date outside the horizon");
        }
        if entry.quantity < 0.0 {
            diag.error_for("forecast", &entity, "negative quantity");
        }
        if entry.quantity > 0.0 && !network.demand_servable(&entry.destination, product) {
            diag.error_for(
                "reachability",
                &entity,
                "no producer can reach this destination with usable stock",
            );
        }
    }
}

fn check_initial_inventory(request: &SolveRequest, network: &PlanNetwork, diag: &mut Diagnostics) {
    for record in &request.initial_inventory {
        let entity = format!(
            "inventory {} {} x{} @ {}",
            record.state, record.product, record.quantity, record.node
        );
        let product = match request.products.get(&record.product) {
            Some(p) => p,
            None => {
                diag.error_for(
                    "catalog",
                    &entity,
                    "inventory references a product missing from the catalog",
                );
                continue;
            }
        };
        match network.node(&record.node) {
            None => {
                diag.error_for("inventory", &entity, "unknown node");
                continue;
            }
            Some(node) if !node.can_handle(record.state) => {
                diag.error_for(
                    "inventory",
                    &entity,
                    format!("node cannot hold {} stock", record.state),
                );
                continue;
            }
            Some(_) => {}
        }
        if record.quantity < 0.0 {
            diag.error_for("inventory", &entity, "negative quantity");
        }
        if let Some(entry) = record.entry_date {
            if entry > request.horizon.start {
                diag.warning_for(
                    "inventory",
                    &entity,
                    "entry date after horizon start; clamped to horizon start",
                );
            }
            let life = product.shelf_life.days_in(record.state) as i64;
            let last_valid_day = entry + Duration::days(life - 1);
            if last_valid_day < request.horizon.start {
                diag.error_for(
                    "inventory",
                    &entity,
                    format!(
                        "stock expired before the horizon started (usable through {})",
                        last_valid_day
                    ),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{Horizon, LaborCalendar};
    use crate::domain::{
        CostStructure, ForecastEntry, InventoryRecord, LaborDay, Node, NodeCapabilities, NodeId,
        Product, ProductId, Route, ShelfLife, StorageLimits,
    };
    use crate::request::PlanOptions;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn labor_day() -> LaborDay {
        LaborDay {
            fixed_hours: 12.0,
            regular_rate: 25.0,
            overtime_rate: 37.5,
            non_fixed_rate: 40.0,
            max_hours: 14.0,
        }
    }

    fn base_request() -> SolveRequest {
        // Mon 2026-03-02 .. Fri 2026-03-06
        let horizon = Horizon::new(d(2026, 3, 2), d(2026, 3, 6)).unwrap();
        let plant = Node {
            id: NodeId::new("plant"),
            capabilities: NodeCapabilities {
                can_produce: true,
                can_store_ambient: true,
                ..Default::default()
            },
            units_per_hour: Some(1400.0),
            storage_limits: StorageLimits::default(),
        };
        let store = Node {
            id: NodeId::new("store"),
            capabilities: NodeCapabilities {
                can_store_ambient: true,
                is_demand_point: true,
                ..Default::default()
            },
            units_per_hour: None,
            storage_limits: StorageLimits::default(),
        };
        let route = Route {
            origin: NodeId::new("plant"),
            destination: NodeId::new("store"),
            state: StorageState::Ambient,
            transit_days: 1,
            cost_per_unit: 0.05,
        };
        let mut products = BTreeMap::new();
        products.insert(
            ProductId::new("LOAF"),
            Product {
                id: ProductId::new("LOAF"),
                shelf_life: ShelfLife::default(),
                units_per_mix: 100,
                unit_cost: 1.2,
            },
        );
        let mut calendar = LaborCalendar::default();
        for date in horizon.days() {
            calendar.insert(date, labor_day());
        }
        SolveRequest {
            horizon,
            nodes: vec![plant, store],
            routes: vec![route],
            trucks: vec![],
            products,
            labor_calendar: calendar,
            cost_structure: CostStructure {
                production_cost_per_unit: 1.2,
                shortage_penalty_per_unit: 10.0,
                storage_cost_frozen_per_pallet_day: 0.5,
                storage_cost_ambient_per_pallet_day: 0.2,
                storage_cost_fixed_per_pallet: 1.0,
                changeover_cost_per_start: 50.0,
                changeover_waste_units: 20.0,
                waste_cost_multiplier: 10.0,
            },
            forecast: vec![ForecastEntry {
                destination: NodeId::new("store"),
                product: ProductId::new("LOAF"),
                delivery_date: d(2026, 3, 4),
                quantity: 500.0,
            }],
            initial_inventory: vec![],
            options: PlanOptions::default(),
        }
    }

    fn validate(request: &SolveRequest) -> PlanResult<Diagnostics> {
        let network = PlanNetwork::build(
            &request.nodes,
            &request.routes,
            &request.trucks,
            &request.horizon,
        )?;
        validate_request(request, &network)
    }

    #[test]
    fn clean_request_passes() {
        let request = base_request();
        let diag = validate(&request).unwrap();
        assert!(!diag.has_errors());
    }

    #[test]
    fn unknown_forecast_product_is_fatal() {
        let mut request = base_request();
        request.forecast.push(ForecastEntry {
            destination: NodeId::new("store"),
            product: ProductId::new("GHOST"),
            delivery_date: d(2026, 3, 4),
            quantity: 10.0,
        });
        let err = validate(&request).unwrap_err();
        assert!(err.to_string().contains("GHOST"));
    }

    #[test]
    fn missing_weekday_labor_is_fatal() {
        let mut request = base_request();
        request.labor_calendar = LaborCalendar::default();
        let err = validate(&request).unwrap_err();
        assert!(err.to_string().contains("labor"));
    }

    #[test]
    fn weak_shortage_penalty_is_fatal() {
        let mut request = base_request();
        request.cost_structure.shortage_penalty_per_unit = 2.0;
        let err = validate(&request).unwrap_err();
        assert!(err.to_string().contains("shortage_penalty_per_unit"));
    }

    #[test]
    fn unreachable_demand_is_fatal() {
        let mut request = base_request();
        request.routes.clear();
        let err = validate(&request).unwrap_err();
        assert!(err.to_string().contains("no producer can reach"));
    }

    #[test]
    fn expired_opening_stock_is_fatal() {
        let mut request = base_request();
        request.initial_inventory.push(InventoryRecord {
            node: NodeId::new("plant"),
            product: ProductId::new("LOAF"),
            state: StorageState::Ambient,
            quantity: 100.0,
            // 17-day ambient life, entered 30 days before the horizon
            entry_date: Some(d(2026, 1, 31)),
        });
        let err = validate(&request).unwrap_err();
        assert!(err.to_string().contains("expired before the horizon"));
    }

    #[test]
    fn future_entry_date_warns_and_clamps() {
        let mut request = base_request();
        request.initial_inventory.push(InventoryRecord {
            node: NodeId::new("plant"),
            product: ProductId::new("LOAF"),
            state: StorageState::Ambient,
            quantity: 100.0,
            entry_date: Some(d(2026, 3, 4)),
        });
        let diag = validate(&request).unwrap();
        assert_eq!(diag.warning_count(), 1);
    }
}
