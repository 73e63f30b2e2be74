//! Weighted-age FEFO batch allocation.
//!
//! The MILP plans SKU-level flows with no batch identity. This module
//! replays the aggregate solution chronologically and assigns every flow to
//! concrete batches, oldest effective age first, producing the traceable
//! ledger labeling needs.
//!
//! A batch that has spent `a` days ambient, `f` frozen and `theta` thawed
//! has consumed the shelf-life fraction
//!
//! ```text
//! W = a / L_A + f / L_F + theta / L_T
//! ```
//!
//! so sixty days in a 120-day freezer weigh the same as eight and a half
//! ambient days. Candidates for a shipment or consumption must sit at the
//! right place in the right state with `W < 1` at the moment of arrival;
//! among candidates the highest `W` goes first, ties broken by production
//! date then batch id. Conversions re-enter the clock: the fraction spent
//! so far is banked and the day count restarts in the new state.
//!
//! If a flow cannot be covered by any candidate, the aggregate solution and
//! this bookkeeping disagree, which means either the residency window in
//! the model was wrong or the replay drifted; both are fatal.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use bakeplan_core::{
    InventoryRecord, NodeId, PlanError, PlanResult, ProductId, ShelfLife, SolveRequest,
    StorageState,
};

use crate::solution::{AggregateSolution, ConversionKind};

const DRAW_TOLERANCE: f64 = 1e-4;

/// Identity of one batch: production site, product, and production date.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BatchId {
    pub node: NodeId,
    pub product: ProductId,
    pub date: NaiveDate,
    /// True for opening stock observed at horizon start rather than planned
    /// production.
    pub opening: bool,
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.opening { "OPEN" } else { "BATCH" };
        write!(f, "{}-{}-{}-{}", prefix, self.node, self.product, self.date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowEvent {
    Produce,
    ShipDepart,
    ShipArrive,
    Thaw,
    Freeze,
    Consume,
    Waste,
}

/// One movement of part of a batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFlow {
    pub batch: BatchId,
    pub date: NaiveDate,
    pub event: FlowEvent,
    pub quantity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_location: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_location: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_state: Option<StorageState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_state: Option<StorageState>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchInfo {
    pub id: BatchId,
    pub product: ProductId,
    pub production_date: NaiveDate,
    pub initial_quantity: f64,
}

/// Deterministic batch-level reading of one aggregate solution.
#[derive(Debug, Clone, Serialize)]
pub struct BatchAllocation {
    pub batches: Vec<BatchInfo>,
    pub flows: Vec<BatchFlow>,
}

impl BatchAllocation {
    /// Ordered projection of one batch's flows.
    pub fn location_history(&self, id: &BatchId) -> Vec<&BatchFlow> {
        self.flows.iter().filter(|f| f.batch == *id).collect()
    }

    /// Lot-level positions at the end of `date`, suitable as the opening
    /// inventory of a follow-up solve.
    pub fn snapshot_at(&self, date: NaiveDate) -> Vec<InventoryRecord> {
        // (batch, location, state) -> quantity, with the date the batch last
        // entered that state for the remaining-life clock.
        let mut held: BTreeMap<(BatchId, NodeId, StorageState), f64> = BTreeMap::new();
        let mut entered: BTreeMap<(BatchId, StorageState), NaiveDate> = BTreeMap::new();

        for flow in self.flows.iter().filter(|f| f.date <= date) {
            let batch = flow.batch.clone();
            match flow.event {
                FlowEvent::Produce => {
                    let state = flow.to_state.unwrap_or(StorageState::Ambient);
                    let location = flow.to_location.clone().unwrap_or(batch.node.clone());
                    *held.entry((batch.clone(), location, state)).or_insert(0.0) +=
                        flow.quantity;
                    entered.entry((batch, state)).or_insert(flow.date);
                }
                FlowEvent::ShipDepart => {
                    if let (Some(from), Some(state)) = (&flow.from_location, flow.from_state) {
                        *held
                            .entry((batch, from.clone(), state))
                            .or_insert(0.0) -= flow.quantity;
                    }
                }
                FlowEvent::ShipArrive => {
                    if let (Some(to), Some(state)) = (&flow.to_location, flow.to_state) {
                        *held.entry((batch, to.clone(), state)).or_insert(0.0) +=
                            flow.quantity;
                    }
                }
                FlowEvent::Thaw | FlowEvent::Freeze => {
                    if let (Some(location), Some(from), Some(to)) =
                        (&flow.from_location, flow.from_state, flow.to_state)
                    {
                        *held
                            .entry((batch.clone(), location.clone(), from))
                            .or_insert(0.0) -= flow.quantity;
                        *held
                            .entry((batch.clone(), location.clone(), to))
                            .or_insert(0.0) += flow.quantity;
                        entered.insert((batch, to), flow.date);
                    }
                }
                FlowEvent::Consume | FlowEvent::Waste => {
                    if let (Some(from), Some(state)) = (&flow.from_location, flow.from_state) {
                        *held
                            .entry((batch, from.clone(), state))
                            .or_insert(0.0) -= flow.quantity;
                    }
                }
            }
        }

        held.into_iter()
            .filter(|(_, quantity)| *quantity > DRAW_TOLERANCE)
            .map(|((batch, node, state), quantity)| InventoryRecord {
                node,
                product: batch.product.clone(),
                state,
                quantity,
                entry_date: entered.get(&(batch, state)).copied(),
            })
            .collect()
    }
}

/// One physical parcel of a batch during the replay.
#[derive(Debug, Clone)]
struct Lot {
    batch: usize,
    location: NodeId,
    state: StorageState,
    state_entry: NaiveDate,
    /// Shelf-life fraction consumed in previous states.
    spent: f64,
    quantity: f64,
}

impl Lot {
    fn weighted_age(&self, at: NaiveDate, life: &ShelfLife) -> f64 {
        let days = (at - self.state_entry).num_days().max(0) as f64;
        self.spent + days / life.days_in(self.state) as f64
    }
}

struct Allocator<'a> {
    request: &'a SolveRequest,
    batches: Vec<BatchInfo>,
    lots: Vec<Lot>,
    flows: Vec<BatchFlow>,
    /// Parcels on the road, keyed by arrival date.
    pending: BTreeMap<NaiveDate, Vec<Lot>>,
}

impl<'a> Allocator<'a> {
    fn life_of(&self, product: &ProductId) -> ShelfLife {
        self.request
            .products
            .get(product)
            .map(|p| p.shelf_life)
            .unwrap_or_default()
    }

    fn new_batch(&mut self, id: BatchId, quantity: f64) -> usize {
        let info = BatchInfo {
            product: id.product.clone(),
            production_date: id.date,
            initial_quantity: quantity,
            id,
        };
        self.batches.push(info);
        self.batches.len() - 1
    }

    fn record(&mut self, flow: BatchFlow) {
        self.flows.push(flow);
    }

    /// FEFO-ordered indices of lots matching the filter, oldest weighted
    /// age at `at` first.
    fn candidates<F>(&self, at: NaiveDate, filter: F) -> Vec<usize>
    where
        F: Fn(&Lot) -> bool,
    {
        let mut found: Vec<usize> = self
            .lots
            .iter()
            .enumerate()
            .filter(|(_, lot)| lot.quantity > DRAW_TOLERANCE && filter(lot))
            .map(|(i, _)| i)
            .collect();
        found.sort_by(|&a, &b| {
            let la = &self.lots[a];
            let lb = &self.lots[b];
            let wa = la.weighted_age(at, &self.life_of(&self.batches[la.batch].id.product));
            let wb = lb.weighted_age(at, &self.life_of(&self.batches[lb.batch].id.product));
            wb.partial_cmp(&wa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    self.batches[la.batch]
                        .production_date
                        .cmp(&self.batches[lb.batch].production_date)
                })
                .then_with(|| self.batches[la.batch].id.cmp(&self.batches[lb.batch].id))
        });
        found
    }

    /// Draw `quantity` across `candidates`, calling `consume` per draw.
    /// Returns the unmet remainder.
    fn draw<F>(&mut self, candidates: &[usize], quantity: f64, mut consume: F) -> f64
    where
        F: FnMut(&mut Self, usize, f64),
    {
        let mut remaining = quantity;
        for &i in candidates {
            if remaining <= DRAW_TOLERANCE {
                break;
            }
            let take = self.lots[i].quantity.min(remaining);
            self.lots[i].quantity -= take;
            remaining -= take;
            consume(self, i, take);
        }
        remaining
    }
}

/// Reconstruct batch-level flows from the aggregate solution.
pub fn allocate(
    request: &SolveRequest,
    solution: &AggregateSolution,
) -> PlanResult<BatchAllocation> {
    let mut alloc = Allocator {
        request,
        batches: Vec::new(),
        lots: Vec::new(),
        flows: Vec::new(),
        pending: BTreeMap::new(),
    };

    // Opening stock becomes batches dated at their state-entry date.
    for record in &request.initial_inventory {
        if record.quantity <= DRAW_TOLERANCE {
            continue;
        }
        let entry = record
            .entry_date
            .unwrap_or(request.horizon.start)
            .min(request.horizon.start);
        let id = BatchId {
            node: record.node.clone(),
            product: record.product.clone(),
            date: entry,
            opening: true,
        };
        // Several opening records can share an identity (e.g. the same
        // delivery split across states); they are one batch.
        let batch = match alloc.batches.iter().position(|b| b.id == id) {
            Some(existing) => {
                alloc.batches[existing].initial_quantity += record.quantity;
                existing
            }
            None => alloc.new_batch(id.clone(), record.quantity),
        };
        alloc.lots.push(Lot {
            batch,
            location: record.node.clone(),
            state: record.state,
            state_entry: entry,
            spent: 0.0,
            quantity: record.quantity,
        });
        alloc.record(BatchFlow {
            batch: id,
            date: entry,
            event: FlowEvent::Produce,
            quantity: record.quantity,
            from_location: None,
            to_location: Some(record.node.clone()),
            from_state: None,
            to_state: Some(record.state),
        });
    }

    // Bucket solution records by day.
    let mut production_by_day: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (i, record) in solution.production.iter().enumerate() {
        production_by_day.entry(record.date).or_default().push(i);
    }
    let mut shipments_by_day: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (i, record) in solution.shipments.iter().enumerate() {
        shipments_by_day
            .entry(record.depart_date)
            .or_default()
            .push(i);
    }
    // Within a departure day, earliest delivery first, then destination.
    for shipment_ids in shipments_by_day.values_mut() {
        shipment_ids.sort_by(|&a, &b| {
            let sa = &solution.shipments[a];
            let sb = &solution.shipments[b];
            sa.arrive_date
                .cmp(&sb.arrive_date)
                .then_with(|| sa.destination.cmp(&sb.destination))
                .then_with(|| sa.product.cmp(&sb.product))
        });
    }
    let mut conversions_by_day: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (i, record) in solution.conversions.iter().enumerate() {
        conversions_by_day.entry(record.date).or_default().push(i);
    }
    let mut consumption_by_day: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (i, record) in solution.consumption.iter().enumerate() {
        consumption_by_day.entry(record.date).or_default().push(i);
    }
    let mut disposals_by_day: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (i, record) in solution.disposals.iter().enumerate() {
        disposals_by_day.entry(record.date).or_default().push(i);
    }

    for today in request.horizon.days() {
        // Arrivals land before anything else moves today.
        if let Some(arrivals) = alloc.pending.remove(&today) {
            for lot in arrivals {
                let id = alloc.batches[lot.batch].id.clone();
                alloc.record(BatchFlow {
                    batch: id,
                    date: today,
                    event: FlowEvent::ShipArrive,
                    quantity: lot.quantity,
                    from_location: None,
                    to_location: Some(lot.location.clone()),
                    from_state: None,
                    to_state: Some(lot.state),
                });
                alloc.lots.push(lot);
            }
        }

        for &i in production_by_day.get(&today).map(Vec::as_slice).unwrap_or(&[]) {
            let record = &solution.production[i];
            let id = BatchId {
                node: record.node.clone(),
                product: record.product.clone(),
                date: today,
                opening: false,
            };
            let batch = alloc.new_batch(id.clone(), record.quantity);
            alloc.lots.push(Lot {
                batch,
                location: record.node.clone(),
                state: StorageState::Ambient,
                state_entry: today,
                spent: 0.0,
                quantity: record.quantity,
            });
            alloc.record(BatchFlow {
                batch: id,
                date: today,
                event: FlowEvent::Produce,
                quantity: record.quantity,
                from_location: None,
                to_location: Some(record.node.clone()),
                from_state: None,
                to_state: Some(StorageState::Ambient),
            });
        }

        // Freeze before thaw: frozen buffers are fed ambient-side first.
        let mut conversion_ids = conversions_by_day
            .get(&today)
            .cloned()
            .unwrap_or_default();
        conversion_ids.sort_by_key(|&i| match solution.conversions[i].kind {
            ConversionKind::Freeze => 0,
            ConversionKind::Thaw => 1,
        });
        for i in conversion_ids {
            let record = solution.conversions[i].clone();
            let (from_state, to_state, event) = match record.kind {
                ConversionKind::Freeze => {
                    (StorageState::Ambient, StorageState::Frozen, FlowEvent::Freeze)
                }
                ConversionKind::Thaw => {
                    (StorageState::Frozen, StorageState::Thawed, FlowEvent::Thaw)
                }
            };
            let candidates = alloc.candidates(today, |lot| {
                lot.location == record.node
                    && lot.state == from_state
                    && alloc.batches[lot.batch].id.product == record.product
            });
            let unmet = alloc.draw(&candidates, record.quantity, |a, i, take| {
                let source = a.lots[i].clone();
                let life = a.life_of(&a.batches[source.batch].id.product);
                let banked = source.weighted_age(today, &life);
                a.lots.push(Lot {
                    batch: source.batch,
                    location: record.node.clone(),
                    state: to_state,
                    state_entry: today,
                    spent: banked,
                    quantity: take,
                });
                let id = a.batches[source.batch].id.clone();
                a.record(BatchFlow {
                    batch: id,
                    date: today,
                    event,
                    quantity: take,
                    from_location: Some(record.node.clone()),
                    to_location: Some(record.node.clone()),
                    from_state: Some(from_state),
                    to_state: Some(to_state),
                });
            });
            if unmet > DRAW_TOLERANCE {
                return Err(inconsistency(
                    &format!("{:?}", record.kind),
                    &record.node,
                    &record.product,
                    record.date,
                    unmet,
                ));
            }
        }

        for &i in shipments_by_day.get(&today).map(Vec::as_slice).unwrap_or(&[]) {
            let record = solution.shipments[i].clone();
            let life = alloc.life_of(&record.product);
            let candidates = alloc.candidates(record.arrive_date, |lot| {
                lot.location == record.origin
                    && lot.state == record.state
                    && alloc.batches[lot.batch].id.product == record.product
                    && lot.weighted_age(record.arrive_date, &life) < 1.0
            });
            let unmet = alloc.draw(&candidates, record.quantity, |a, i, take| {
                let source = a.lots[i].clone();
                let parcel = Lot {
                    batch: source.batch,
                    location: record.destination.clone(),
                    state: source.state,
                    state_entry: source.state_entry,
                    spent: source.spent,
                    quantity: take,
                };
                a.pending
                    .entry(record.arrive_date)
                    .or_default()
                    .push(parcel);
                let id = a.batches[source.batch].id.clone();
                a.record(BatchFlow {
                    batch: id,
                    date: today,
                    event: FlowEvent::ShipDepart,
                    quantity: take,
                    from_location: Some(record.origin.clone()),
                    to_location: Some(record.destination.clone()),
                    from_state: Some(record.state),
                    to_state: Some(record.state),
                });
            });
            if unmet > DRAW_TOLERANCE {
                return Err(inconsistency(
                    "shipment",
                    &record.origin,
                    &record.product,
                    today,
                    unmet,
                ));
            }
        }

        for &i in consumption_by_day.get(&today).map(Vec::as_slice).unwrap_or(&[]) {
            let record = solution.consumption[i].clone();
            let life = alloc.life_of(&record.product);
            let candidates = alloc.candidates(today, |lot| {
                lot.location == record.destination
                    && lot.state == record.state
                    && alloc.batches[lot.batch].id.product == record.product
                    && lot.weighted_age(today, &life) < 1.0
            });
            let unmet = alloc.draw(&candidates, record.quantity, |a, i, take| {
                let source = a.lots[i].clone();
                let id = a.batches[source.batch].id.clone();
                a.record(BatchFlow {
                    batch: id,
                    date: today,
                    event: FlowEvent::Consume,
                    quantity: take,
                    from_location: Some(record.destination.clone()),
                    to_location: None,
                    from_state: Some(record.state),
                    to_state: None,
                });
            });
            if unmet > DRAW_TOLERANCE {
                return Err(inconsistency(
                    "consumption",
                    &record.destination,
                    &record.product,
                    today,
                    unmet,
                ));
            }
        }

        // Disposals clear the oldest stock first and ignore the expiry
        // filter: expired leftovers are exactly what gets thrown out.
        for &i in disposals_by_day.get(&today).map(Vec::as_slice).unwrap_or(&[]) {
            let record = solution.disposals[i].clone();
            let candidates = alloc.candidates(today, |lot| {
                lot.location == record.node
                    && lot.state == record.state
                    && alloc.batches[lot.batch].id.product == record.product
            });
            let unmet = alloc.draw(&candidates, record.quantity, |a, i, take| {
                let source = a.lots[i].clone();
                let id = a.batches[source.batch].id.clone();
                a.record(BatchFlow {
                    batch: id,
                    date: today,
                    event: FlowEvent::Waste,
                    quantity: take,
                    from_location: Some(record.node.clone()),
                    to_location: None,
                    from_state: Some(record.state),
                    to_state: None,
                });
            });
            if unmet > DRAW_TOLERANCE {
                return Err(inconsistency(
                    "disposal",
                    &record.node,
                    &record.product,
                    today,
                    unmet,
                ));
            }
        }
    }

    // Parcels still rolling at horizon end are deliveries, not waste.
    let pending: Vec<(NaiveDate, Vec<Lot>)> = std::mem::take(&mut alloc.pending)
        .into_iter()
        .collect();
    for (arrive, lots) in pending {
        for lot in lots {
            let id = alloc.batches[lot.batch].id.clone();
            alloc.record(BatchFlow {
                batch: id,
                date: arrive,
                event: FlowEvent::ShipArrive,
                quantity: lot.quantity,
                from_location: None,
                to_location: Some(lot.location.clone()),
                from_state: None,
                to_state: Some(lot.state),
            });
        }
    }

    // Whatever still sits at a node is end-of-horizon waste.
    let end = request.horizon.end;
    let leftovers: Vec<Lot> = alloc
        .lots
        .iter()
        .filter(|lot| lot.quantity > DRAW_TOLERANCE)
        .cloned()
        .collect();
    for lot in leftovers {
        let id = alloc.batches[lot.batch].id.clone();
        alloc.record(BatchFlow {
            batch: id,
            date: end,
            event: FlowEvent::Waste,
            quantity: lot.quantity,
            from_location: Some(lot.location.clone()),
            to_location: None,
            from_state: Some(lot.state),
            to_state: None,
        });
    }

    debug!(
        batches = alloc.batches.len(),
        flows = alloc.flows.len(),
        "allocation complete"
    );
    Ok(BatchAllocation {
        batches: alloc.batches,
        flows: alloc.flows,
    })
}

fn inconsistency(
    what: &str,
    node: &NodeId,
    product: &ProductId,
    date: NaiveDate,
    unmet: f64,
) -> PlanError {
    PlanError::Invariant(format!(
        "no batch can cover {} of {:.3} units of {} at {} on {}; \
         the aggregate solution and the batch ledger disagree",
        what, unmet, product, node, date
    ))
}
