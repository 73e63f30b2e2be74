//! Sparse variable index sets.
//!
//! The model never enumerates the dense (node, product, state, day) cube.
//! This module decides, once, which combinations can carry material at all:
//! a state is present at a node only if some producer can reach it there (or
//! opening stock puts it there), shipments exist only on legs a product
//! survives and on days a truck actually runs, and conversions exist only at
//! capable nodes with both endpoint states present. Everything downstream
//! (columns, rows, extraction, allocation) iterates these sets.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use bakeplan_core::{
    LaborDay, Node, NodeId, PlanNetwork, Product, ProductId, SolveRequest, StorageState,
};

/// Aggregated forecast cell: one (destination, product, day) requirement.
#[derive(Debug, Clone)]
pub struct DemandCell {
    pub node: usize,
    pub product: usize,
    pub day: usize,
    pub quantity: f64,
}

/// One opening-stock lot, entry date clamped into the horizon history.
#[derive(Debug, Clone, Copy)]
pub struct OpeningLot {
    pub entry_date: NaiveDate,
    pub quantity: f64,
}

/// Dense handles and sparse key sets for one solve.
#[derive(Debug)]
pub struct ModelIndex {
    pub days: Vec<NaiveDate>,
    pub nodes: Vec<Node>,
    pub node_of: BTreeMap<NodeId, usize>,
    pub products: Vec<Product>,
    pub product_of: BTreeMap<ProductId, usize>,
    pub labor: Vec<Option<LaborDay>>,

    /// (node, product, day) triples where production may happen.
    pub production_keys: Vec<(usize, usize, usize)>,
    /// (node, day) pairs with workable labor.
    pub labor_keys: Vec<(usize, usize)>,
    /// (node, product, state) combinations that can carry material.
    pub presence: BTreeSet<(usize, usize, StorageState)>,
    /// (leg, product, departure day) triples for shipments.
    pub transit_keys: Vec<(usize, usize, usize)>,
    /// (node, product, day) triples for frozen -> thawed conversion.
    pub thaw_keys: Vec<(usize, usize, usize)>,
    /// (node, product, day) triples for ambient -> frozen conversion.
    pub freeze_keys: Vec<(usize, usize, usize)>,
    /// Aggregated forecast.
    pub demand_cells: Vec<DemandCell>,
    /// Opening stock lots keyed by (node, product, state).
    pub opening: BTreeMap<(usize, usize, StorageState), Vec<OpeningLot>>,
}

impl ModelIndex {
    pub fn build(request: &SolveRequest, network: &PlanNetwork) -> Self {
        let days: Vec<NaiveDate> = request.horizon.days().collect();
        let nodes: Vec<Node> = network.nodes().to_vec();
        let node_of: BTreeMap<NodeId, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        let products: Vec<Product> = request.products.values().cloned().collect();
        let product_of: BTreeMap<ProductId, usize> = products
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.clone(), i))
            .collect();

        let labor: Vec<Option<LaborDay>> = days
            .iter()
            .map(|d| request.labor_calendar.effective(*d))
            .collect();

        // Opening stock, entry dates clamped to the horizon start at latest.
        let mut opening: BTreeMap<(usize, usize, StorageState), Vec<OpeningLot>> = BTreeMap::new();
        for record in &request.initial_inventory {
            if record.quantity <= 0.0 {
                continue;
            }
            let (Some(&n), Some(&p)) = (
                node_of.get(&record.node),
                product_of.get(&record.product),
            ) else {
                continue;
            };
            let entry = record
                .entry_date
                .unwrap_or(request.horizon.start)
                .min(request.horizon.start);
            opening
                .entry((n, p, record.state))
                .or_default()
                .push(OpeningLot {
                    entry_date: entry,
                    quantity: record.quantity,
                });
        }

        // Material presence: a (node, product, state) slot exists when the
        // node can physically pass that state through and either opening
        // stock sits there or some producer can reach it in that state.
        let mut presence: BTreeSet<(usize, usize, StorageState)> = BTreeSet::new();
        for (ni, node) in nodes.iter().enumerate() {
            for (pi, product) in products.iter().enumerate() {
                for state in StorageState::ALL {
                    if !node.can_handle(state) {
                        continue;
                    }
                    let has_opening = opening.contains_key(&(ni, pi, state));
                    let reachable = network
                        .produce_nodes
                        .iter()
                        .any(|origin| network.reachable(origin, &node.id, product, state));
                    if has_opening || reachable {
                        presence.insert((ni, pi, state));
                    }
                }
            }
        }

        // Production and labor keys.
        let mut production_keys = Vec::new();
        let mut labor_keys = Vec::new();
        for (ni, node) in nodes.iter().enumerate() {
            if !node.capabilities.can_produce {
                continue;
            }
            for (t, day) in labor.iter().enumerate() {
                let workable = day.map(|d| !d.is_idle()).unwrap_or(false);
                if !workable {
                    continue;
                }
                labor_keys.push((ni, t));
                for pi in 0..products.len() {
                    production_keys.push((ni, pi, t));
                }
            }
        }

        // Shipment keys: viable legs, endpoint presence, truck service days.
        let mut transit_keys = Vec::new();
        for (li, leg) in network.legs.iter().enumerate() {
            let oi = node_of[&leg.origin];
            let di = node_of[&leg.destination];
            let serviced = network.has_truck_service(&leg.origin, &leg.destination);
            for (pi, product) in products.iter().enumerate() {
                if !network.leg_viable(leg, product) {
                    continue;
                }
                if !presence.contains(&(oi, pi, leg.state))
                    || !presence.contains(&(di, pi, leg.state))
                {
                    continue;
                }
                for (t, date) in days.iter().enumerate() {
                    if serviced
                        && network
                            .instances_departing(&leg.origin, &leg.destination, *date)
                            .is_empty()
                    {
                        continue;
                    }
                    transit_keys.push((li, pi, t));
                }
            }
        }

        // Conversions.
        let mut thaw_keys = Vec::new();
        let mut freeze_keys = Vec::new();
        for (ni, node) in nodes.iter().enumerate() {
            for pi in 0..products.len() {
                if node.capabilities.can_thaw
                    && presence.contains(&(ni, pi, StorageState::Frozen))
                    && presence.contains(&(ni, pi, StorageState::Thawed))
                {
                    for t in 0..days.len() {
                        thaw_keys.push((ni, pi, t));
                    }
                }
                if node.capabilities.can_freeze
                    && presence.contains(&(ni, pi, StorageState::Ambient))
                    && presence.contains(&(ni, pi, StorageState::Frozen))
                {
                    for t in 0..days.len() {
                        freeze_keys.push((ni, pi, t));
                    }
                }
            }
        }

        // Aggregate the forecast into cells.
        let mut cell_map: BTreeMap<(usize, usize, usize), f64> = BTreeMap::new();
        for entry in &request.forecast {
            if entry.quantity <= 0.0 {
                continue;
            }
            let (Some(&n), Some(&p), Some(t)) = (
                node_of.get(&entry.destination),
                product_of.get(&entry.product),
                request.horizon.index_of(entry.delivery_date),
            ) else {
                continue;
            };
            *cell_map.entry((n, p, t)).or_insert(0.0) += entry.quantity;
        }
        let demand_cells = cell_map
            .into_iter()
            .map(|((node, product, day), quantity)| DemandCell {
                node,
                product,
                day,
                quantity,
            })
            .collect();

        Self {
            days,
            nodes,
            node_of,
            products,
            product_of,
            labor,
            production_keys,
            labor_keys,
            presence,
            transit_keys,
            thaw_keys,
            freeze_keys,
            demand_cells,
            opening,
        }
    }

    pub fn num_days(&self) -> usize {
        self.days.len()
    }

    pub fn last_day(&self) -> usize {
        self.days.len() - 1
    }

    /// Daily production ceiling in units for a (node, day), zero when idle.
    pub fn max_daily_units(&self, node: usize, day: usize) -> f64 {
        let rate = self.nodes[node].units_per_hour.unwrap_or(0.0);
        let hours = self.labor[day].map(|d| d.max_hours).unwrap_or(0.0);
        rate * hours
    }

    /// Opening quantity for a slot, all lots summed.
    pub fn opening_total(&self, node: usize, product: usize, state: StorageState) -> f64 {
        self.opening
            .get(&(node, product, state))
            .map(|lots| lots.iter().map(|l| l.quantity).sum())
            .unwrap_or(0.0)
    }

    /// Opening quantity whose entry date falls on or after `cutoff`.
    pub fn opening_since(
        &self,
        node: usize,
        product: usize,
        state: StorageState,
        cutoff: NaiveDate,
    ) -> f64 {
        self.opening
            .get(&(node, product, state))
            .map(|lots| {
                lots.iter()
                    .filter(|l| l.entry_date >= cutoff)
                    .map(|l| l.quantity)
                    .sum()
            })
            .unwrap_or(0.0)
    }

    /// Earliest date material may have entered a slot's state.
    pub fn earliest_entry(&self, node: usize, product: usize, state: StorageState) -> NaiveDate {
        self.opening
            .get(&(node, product, state))
            .and_then(|lots| lots.iter().map(|l| l.entry_date).min())
            .map(|d| d.min(self.days[0]))
            .unwrap_or(self.days[0])
    }
}
