//! Aggregate solution records and primal extraction.
//!
//! Extraction walks the column registry once: NaN primals (columns a
//! backend never initialized) read as zero, integer families are rounded,
//! and every column's objective contribution is folded into its cost
//! category. The committed fixed-day payroll joins the labor category as a
//! constant.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use bakeplan_core::{NodeId, PlanNetwork, ProductId, SolveRequest, StorageState, TruckId};

use crate::index::ModelIndex;
use crate::model::{ColMeta, CostCategory, PlanVars};
use crate::solver::{RawSolution, SolveStatus};

const QUANTITY_EPS: f64 = 1e-6;

#[derive(Debug, Clone, Serialize)]
pub struct ProductionRecord {
    pub node: NodeId,
    pub product: ProductId,
    pub date: NaiveDate,
    pub quantity: f64,
    pub mixes: i64,
    pub started: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InventoryLevel {
    pub node: NodeId,
    pub product: ProductId,
    pub state: StorageState,
    pub date: NaiveDate,
    pub quantity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShipmentRecord {
    pub origin: NodeId,
    pub destination: NodeId,
    pub product: ProductId,
    pub state: StorageState,
    pub depart_date: NaiveDate,
    pub arrive_date: NaiveDate,
    pub quantity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionKind {
    Thaw,
    Freeze,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionRecord {
    pub node: NodeId,
    pub product: ProductId,
    pub date: NaiveDate,
    pub kind: ConversionKind,
    pub quantity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsumptionRecord {
    pub destination: NodeId,
    pub product: ProductId,
    pub state: StorageState,
    pub date: NaiveDate,
    pub quantity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WasteRecord {
    pub node: NodeId,
    pub product: ProductId,
    pub state: StorageState,
    pub date: NaiveDate,
    pub quantity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DemandFill {
    pub destination: NodeId,
    pub product: ProductId,
    pub date: NaiveDate,
    pub demand: f64,
    pub consumed: f64,
    pub shortage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PalletRecord {
    pub node: NodeId,
    pub product: ProductId,
    pub state: StorageState,
    pub date: NaiveDate,
    pub pallets: i64,
    pub entries: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TruckLoadRecord {
    pub truck: TruckId,
    pub origin: NodeId,
    pub destination: NodeId,
    pub date: NaiveDate,
    pub product: ProductId,
    pub pallets: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaborRecord {
    pub node: NodeId,
    pub date: NaiveDate,
    pub fixed_hours: f64,
    pub overtime_hours: f64,
    pub non_fixed_hours: f64,
}

/// Objective value split by category.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CostBreakdown {
    pub labor: f64,
    pub production: f64,
    pub transport: f64,
    pub storage_daily: f64,
    pub storage_entry: f64,
    pub changeover: f64,
    pub shortage: f64,
    pub waste: f64,
}

impl CostBreakdown {
    pub fn total(&self) -> f64 {
        self.labor
            + self.production
            + self.transport
            + self.storage_daily
            + self.storage_entry
            + self.changeover
            + self.shortage
            + self.waste
    }

    fn add(&mut self, category: CostCategory, amount: f64) {
        match category {
            CostCategory::None => {}
            CostCategory::Labor => self.labor += amount,
            CostCategory::Production => self.production += amount,
            CostCategory::Transport => self.transport += amount,
            CostCategory::StorageDaily => self.storage_daily += amount,
            CostCategory::StorageEntry => self.storage_entry += amount,
            CostCategory::Changeover => self.changeover += amount,
            CostCategory::Shortage => self.shortage += amount,
            CostCategory::Waste => self.waste += amount,
        }
    }
}

/// SKU-level planning result of one solve.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateSolution {
    pub status: SolveStatus,
    pub has_primal: bool,
    pub objective_value: f64,
    /// Relative gap tolerance the solve ran with.
    pub mip_gap: f64,
    pub solve_seconds: f64,
    pub production: Vec<ProductionRecord>,
    pub inventory: Vec<InventoryLevel>,
    pub shipments: Vec<ShipmentRecord>,
    pub conversions: Vec<ConversionRecord>,
    pub consumption: Vec<ConsumptionRecord>,
    pub disposals: Vec<WasteRecord>,
    pub demand_fill: Vec<DemandFill>,
    pub pallets: Vec<PalletRecord>,
    pub truck_loads: Vec<TruckLoadRecord>,
    pub labor: Vec<LaborRecord>,
    pub cost_breakdown: CostBreakdown,
    /// Served fraction of total forecast quantity (1.0 with no forecast).
    pub fill_rate: f64,
    pub warnings: Vec<String>,
}

impl AggregateSolution {
    pub fn total_production(&self) -> f64 {
        self.production.iter().map(|r| r.quantity).sum()
    }

    pub fn total_shortage(&self) -> f64 {
        self.demand_fill.iter().map(|r| r.shortage).sum()
    }

    pub fn total_consumed(&self) -> f64 {
        self.demand_fill.iter().map(|r| r.consumed).sum()
    }

    /// Closing inventory on the final horizon day.
    pub fn end_inventory(&self, last_day: NaiveDate) -> f64 {
        self.inventory
            .iter()
            .filter(|r| r.date == last_day)
            .map(|r| r.quantity)
            .sum()
    }

    pub fn summary(&self) -> String {
        let costs = &self.cost_breakdown;
        format!(
            "status: {}\nobjective: {:.2}\n  labor: {:.2}\n  production: {:.2}\n  transport: {:.2}\n  storage (daily): {:.2}\n  storage (entry): {:.2}\n  changeover: {:.2}\n  shortage: {:.2}\n  waste: {:.2}\nfill rate: {:.1}%\nsolve time: {:.2}s\nwarnings: {}",
            self.status,
            self.objective_value,
            costs.labor,
            costs.production,
            costs.transport,
            costs.storage_daily,
            costs.storage_entry,
            costs.changeover,
            costs.shortage,
            costs.waste,
            self.fill_rate * 100.0,
            self.solve_seconds,
            self.warnings.len(),
        )
    }
}

struct Primal<'a> {
    values: &'a [f64],
}

impl Primal<'_> {
    fn get(&self, var: crate::model::VarId) -> f64 {
        let raw = self.values.get(var.0).copied().unwrap_or(0.0);
        if raw.is_nan() {
            0.0
        } else {
            raw
        }
    }

    fn rounded(&self, var: crate::model::VarId) -> i64 {
        self.get(var).round() as i64
    }
}

/// Turn a raw backend result into typed records.
pub fn extract_solution(
    request: &SolveRequest,
    network: &PlanNetwork,
    index: &ModelIndex,
    vars: &PlanVars,
    cols: &[ColMeta],
    fixed_labor_cost: f64,
    raw: RawSolution,
) -> AggregateSolution {
    let has_primal = !raw.values.is_empty();
    let primal = Primal { values: &raw.values };

    let mut solution = AggregateSolution {
        status: raw.status,
        has_primal,
        objective_value: 0.0,
        mip_gap: request.options.solver.mip_gap,
        solve_seconds: raw.solve_seconds,
        production: Vec::new(),
        inventory: Vec::new(),
        shipments: Vec::new(),
        conversions: Vec::new(),
        consumption: Vec::new(),
        disposals: Vec::new(),
        demand_fill: Vec::new(),
        pallets: Vec::new(),
        truck_loads: Vec::new(),
        labor: Vec::new(),
        cost_breakdown: CostBreakdown::default(),
        fill_rate: 1.0,
        warnings: raw.warnings,
    };
    if !has_primal {
        return solution;
    }

    // Objective and breakdown from the registry.
    let mut breakdown = CostBreakdown::default();
    for (i, meta) in cols.iter().enumerate() {
        if meta.objective != 0.0 {
            breakdown.add(meta.category, meta.objective * primal.get(crate::model::VarId(i)));
        }
    }
    breakdown.add(CostCategory::Labor, fixed_labor_cost);
    solution.cost_breakdown = breakdown;
    solution.objective_value = breakdown.total();

    for (&(n, p, t), &var) in &vars.production {
        let quantity = primal.get(var);
        if quantity <= QUANTITY_EPS {
            continue;
        }
        solution.production.push(ProductionRecord {
            node: index.nodes[n].id.clone(),
            product: index.products[p].id.clone(),
            date: index.days[t],
            quantity,
            mixes: primal.rounded(vars.mix_count[&(n, p, t)]),
            started: primal.get(vars.start[&(n, p, t)]) > 0.5,
        });
    }

    for (&(n, p, state, t), &var) in &vars.inventory {
        let quantity = primal.get(var);
        if quantity <= QUANTITY_EPS {
            continue;
        }
        solution.inventory.push(InventoryLevel {
            node: index.nodes[n].id.clone(),
            product: index.products[p].id.clone(),
            state,
            date: index.days[t],
            quantity,
        });
    }

    for (&(l, p, t), &var) in &vars.in_transit {
        let quantity = primal.get(var);
        if quantity <= QUANTITY_EPS {
            continue;
        }
        let leg = &network.legs[l];
        let depart = index.days[t];
        solution.shipments.push(ShipmentRecord {
            origin: leg.origin.clone(),
            destination: leg.destination.clone(),
            product: index.products[p].id.clone(),
            state: leg.state,
            depart_date: depart,
            arrive_date: depart + chrono::Duration::days(leg.transit_days as i64),
            quantity,
        });
    }

    for (kind, map) in [
        (ConversionKind::Thaw, &vars.thaw),
        (ConversionKind::Freeze, &vars.freeze),
    ] {
        for (&(n, p, t), &var) in map {
            let quantity = primal.get(var);
            if quantity <= QUANTITY_EPS {
                continue;
            }
            solution.conversions.push(ConversionRecord {
                node: index.nodes[n].id.clone(),
                product: index.products[p].id.clone(),
                date: index.days[t],
                kind,
                quantity,
            });
        }
    }

    for (&(n, p, state, t), &var) in &vars.consume {
        let quantity = primal.get(var);
        if quantity <= QUANTITY_EPS {
            continue;
        }
        solution.consumption.push(ConsumptionRecord {
            destination: index.nodes[n].id.clone(),
            product: index.products[p].id.clone(),
            state,
            date: index.days[t],
            quantity,
        });
    }

    for (&(n, p, state, t), &var) in &vars.dispose {
        let quantity = primal.get(var);
        if quantity <= QUANTITY_EPS {
            continue;
        }
        solution.disposals.push(WasteRecord {
            node: index.nodes[n].id.clone(),
            product: index.products[p].id.clone(),
            state,
            date: index.days[t],
            quantity,
        });
    }

    let mut total_demand = 0.0;
    let mut total_consumed = 0.0;
    for cell in &index.demand_cells {
        let consumed: f64 = [StorageState::Ambient, StorageState::Thawed]
            .iter()
            .filter_map(|s| vars.consume.get(&(cell.node, cell.product, *s, cell.day)))
            .map(|&v| primal.get(v))
            .sum();
        let shortage = vars
            .shortage
            .get(&(cell.node, cell.product, cell.day))
            .map(|&v| primal.get(v))
            .unwrap_or(0.0);
        total_demand += cell.quantity;
        total_consumed += consumed;
        solution.demand_fill.push(DemandFill {
            destination: index.nodes[cell.node].id.clone(),
            product: index.products[cell.product].id.clone(),
            date: index.days[cell.day],
            demand: cell.quantity,
            consumed,
            shortage,
        });
    }
    solution.fill_rate = if total_demand > 0.0 {
        total_consumed / total_demand
    } else {
        1.0
    };

    for (&(n, p, state, t), &var) in &vars.pallet_count {
        let pallets = primal.rounded(var);
        let entries = primal.rounded(vars.pallet_entry[&(n, p, state, t)]);
        if pallets == 0 && entries == 0 {
            continue;
        }
        solution.pallets.push(PalletRecord {
            node: index.nodes[n].id.clone(),
            product: index.products[p].id.clone(),
            state,
            date: index.days[t],
            pallets,
            entries,
        });
    }

    for (&(k, p), &var) in &vars.truck_load {
        let pallets = primal.rounded(var);
        if pallets == 0 {
            continue;
        }
        let instance = &network.truck_instances[k];
        solution.truck_loads.push(TruckLoadRecord {
            truck: instance.truck.clone(),
            origin: instance.origin.clone(),
            destination: instance.destination.clone(),
            date: instance.date,
            product: index.products[p].id.clone(),
            pallets,
        });
    }

    for &(n, t) in &index.labor_keys {
        let fixed = vars.fixed_hours.get(&(n, t)).map(|&v| primal.get(v));
        let overtime = vars.overtime_hours.get(&(n, t)).map(|&v| primal.get(v));
        let non_fixed = vars.non_fixed_hours.get(&(n, t)).map(|&v| primal.get(v));
        let total = fixed.unwrap_or(0.0) + overtime.unwrap_or(0.0) + non_fixed.unwrap_or(0.0);
        if total <= QUANTITY_EPS {
            continue;
        }
        solution.labor.push(LaborRecord {
            node: index.nodes[n].id.clone(),
            date: index.days[t],
            fixed_hours: fixed.unwrap_or(0.0),
            overtime_hours: overtime.unwrap_or(0.0),
            non_fixed_hours: non_fixed.unwrap_or(0.0),
        });
    }

    debug!(
        production = solution.production.len(),
        shipments = solution.shipments.len(),
        fill_rate = solution.fill_rate,
        "solution extracted"
    );
    solution
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakdown_totals() {
        let mut b = CostBreakdown::default();
        b.add(CostCategory::Labor, 100.0);
        b.add(CostCategory::Shortage, 50.0);
        b.add(CostCategory::None, 999.0);
        assert_eq!(b.total(), 150.0);
    }

    #[test]
    fn primal_reads_nan_as_zero() {
        let values = vec![1.5, f64::NAN];
        let primal = Primal { values: &values };
        assert_eq!(primal.get(crate::model::VarId(0)), 1.5);
        assert_eq!(primal.get(crate::model::VarId(1)), 0.0);
        assert_eq!(primal.get(crate::model::VarId(7)), 0.0);
    }

    #[test]
    fn solution_serializes_for_downstream_consumers() {
        let solution = AggregateSolution {
            status: SolveStatus::Optimal,
            has_primal: true,
            objective_value: 42.5,
            mip_gap: 0.01,
            solve_seconds: 0.1,
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
            warnings: vec!["note".into()],
        };
        let json = serde_json::to_value(&solution).unwrap();
        assert_eq!(json["status"], "OPTIMAL");
        assert_eq!(json["objective_value"], 42.5);
        assert_eq!(json["warnings"][0], "note");
    }
}
