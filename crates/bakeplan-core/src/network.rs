//! Network pre-processing: capability sets, adjacency, reachability, and
//! truck schedule expansion.
//!
//! The distribution network is a directed multigraph over locations; each
//! edge is one [`Route`]. Reachability is state-aware: moving along a leg
//! keeps the current state (the leg fixes it), while freeze and thaw
//! transitions happen in place at capable nodes. A leg is viable for a
//! product only when its transit time is shorter than the product's shelf
//! life in the leg's state, otherwise nothing usable can arrive.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;

use crate::calendar::Horizon;
use crate::domain::{Node, NodeId, Product, Route, StorageState, TruckId, TruckSchedule};
use crate::error::{PlanError, PlanResult};

/// A resolved route: domain record plus dense endpoint handles.
#[derive(Debug, Clone, Serialize)]
pub struct Leg {
    pub origin: NodeId,
    pub destination: NodeId,
    pub state: StorageState,
    pub transit_days: u32,
    pub cost_per_unit: f64,
}

impl Leg {
    pub fn label(&self) -> String {
        format!("{}->{} ({})", self.origin, self.destination, self.state)
    }
}

/// One concrete departure of a truck schedule inside the horizon.
#[derive(Debug, Clone, Serialize)]
pub struct TruckInstance {
    pub truck: TruckId,
    pub origin: NodeId,
    pub destination: NodeId,
    pub date: NaiveDate,
    pub pallet_capacity: u32,
    pub fixed_cost: f64,
}

/// Pre-processed network handed to the index builder and model builder.
#[derive(Debug)]
pub struct PlanNetwork {
    nodes: Vec<Node>,
    node_lookup: BTreeMap<NodeId, usize>,
    graph: DiGraph<usize, usize>,
    graph_index: Vec<NodeIndex>,
    pub legs: Vec<Leg>,
    legs_from: BTreeMap<NodeId, Vec<usize>>,
    legs_to: BTreeMap<NodeId, Vec<usize>>,
    pub produce_nodes: BTreeSet<NodeId>,
    pub freeze_nodes: BTreeSet<NodeId>,
    pub thaw_nodes: BTreeSet<NodeId>,
    pub demand_nodes: BTreeSet<NodeId>,
    storage_nodes: BTreeMap<StorageState, BTreeSet<NodeId>>,
    pub truck_instances: Vec<TruckInstance>,
    truck_pairs: BTreeSet<(NodeId, NodeId)>,
    instances_by_departure: BTreeMap<(NodeId, NodeId, NaiveDate), Vec<usize>>,
}

impl PlanNetwork {
    pub fn build(
        nodes: &[Node],
        routes: &[Route],
        trucks: &[TruckSchedule],
        horizon: &Horizon,
    ) -> PlanResult<Self> {
        let mut node_lookup = BTreeMap::new();
        for (i, node) in nodes.iter().enumerate() {
            if node_lookup.insert(node.id.clone(), i).is_some() {
                return Err(PlanError::Network(format!("duplicate node id {}", node.id)));
            }
        }

        let mut graph = DiGraph::new();
        let graph_index: Vec<NodeIndex> = (0..nodes.len()).map(|i| graph.add_node(i)).collect();

        let mut legs = Vec::with_capacity(routes.len());
        let mut legs_from: BTreeMap<NodeId, Vec<usize>> = BTreeMap::new();
        let mut legs_to: BTreeMap<NodeId, Vec<usize>> = BTreeMap::new();
        for route in routes {
            let oi = *node_lookup.get(&route.origin).ok_or_else(|| {
                PlanError::Network(format!(
                    "route {} references unknown origin {}",
                    route.label(),
                    route.origin
                ))
            })?;
            let di = *node_lookup.get(&route.destination).ok_or_else(|| {
                PlanError::Network(format!(
                    "route {} references unknown destination {}",
                    route.label(),
                    route.destination
                ))
            })?;
            let leg_index = legs.len();
            graph.add_edge(graph_index[oi], graph_index[di], leg_index);
            legs.push(Leg {
                origin: route.origin.clone(),
                destination: route.destination.clone(),
                state: route.state,
                transit_days: route.transit_days,
                cost_per_unit: route.cost_per_unit,
            });
            legs_from
                .entry(route.origin.clone())
                .or_default()
                .push(leg_index);
            legs_to
                .entry(route.destination.clone())
                .or_default()
                .push(leg_index);
        }

        let mut produce_nodes = BTreeSet::new();
        let mut freeze_nodes = BTreeSet::new();
        let mut thaw_nodes = BTreeSet::new();
        let mut demand_nodes = BTreeSet::new();
        let mut storage_nodes: BTreeMap<StorageState, BTreeSet<NodeId>> = StorageState::ALL
            .iter()
            .map(|s| (*s, BTreeSet::new()))
            .collect();
        for node in nodes {
            let caps = &node.capabilities;
            if caps.can_produce {
                produce_nodes.insert(node.id.clone());
            }
            if caps.can_freeze {
                freeze_nodes.insert(node.id.clone());
            }
            if caps.can_thaw {
                thaw_nodes.insert(node.id.clone());
            }
            if caps.is_demand_point {
                demand_nodes.insert(node.id.clone());
            }
            for state in StorageState::ALL {
                if node.can_store(state) {
                    storage_nodes.get_mut(&state).unwrap().insert(node.id.clone());
                }
            }
        }

        let mut truck_instances = Vec::new();
        let mut truck_pairs = BTreeSet::new();
        let mut instances_by_departure: BTreeMap<(NodeId, NodeId, NaiveDate), Vec<usize>> =
            BTreeMap::new();
        for schedule in trucks {
            if !node_lookup.contains_key(&schedule.origin) {
                return Err(PlanError::Network(format!(
                    "truck {} references unknown origin {}",
                    schedule.id, schedule.origin
                )));
            }
            if !node_lookup.contains_key(&schedule.destination) {
                return Err(PlanError::Network(format!(
                    "truck {} references unknown destination {}",
                    schedule.id, schedule.destination
                )));
            }
            truck_pairs.insert((schedule.origin.clone(), schedule.destination.clone()));
            for date in horizon.days() {
                if schedule.departs_on(date.weekday()) {
                    let idx = truck_instances.len();
                    truck_instances.push(TruckInstance {
                        truck: schedule.id.clone(),
                        origin: schedule.origin.clone(),
                        destination: schedule.destination.clone(),
                        date,
                        pallet_capacity: schedule.pallet_capacity,
                        fixed_cost: schedule.fixed_cost_per_departure,
                    });
                    instances_by_departure
                        .entry((schedule.origin.clone(), schedule.destination.clone(), date))
                        .or_default()
                        .push(idx);
                }
            }
        }

        Ok(Self {
            nodes: nodes.to_vec(),
            node_lookup,
            graph,
            graph_index,
            legs,
            legs_from,
            legs_to,
            produce_nodes,
            freeze_nodes,
            thaw_nodes,
            demand_nodes,
            storage_nodes,
            truck_instances,
            truck_pairs,
            instances_by_departure,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.node_lookup.get(id).map(|&i| &self.nodes[i])
    }

    pub fn storage_nodes(&self, state: StorageState) -> &BTreeSet<NodeId> {
        &self.storage_nodes[&state]
    }

    pub fn legs_from(&self, node: &NodeId) -> &[usize] {
        self.legs_from.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn legs_to(&self, node: &NodeId) -> &[usize] {
        self.legs_to.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether any truck schedule covers the (origin, destination) pair.
    /// Pairs without service are not truck-constrained.
    pub fn has_truck_service(&self, origin: &NodeId, destination: &NodeId) -> bool {
        self.truck_pairs
            .contains(&(origin.clone(), destination.clone()))
    }

    /// Truck instances departing (origin, destination) on `date`.
    pub fn instances_departing(
        &self,
        origin: &NodeId,
        destination: &NodeId,
        date: NaiveDate,
    ) -> &[usize] {
        self.instances_by_departure
            .get(&(origin.clone(), destination.clone(), date))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// A leg can carry `product` only if something survives the ride.
    pub fn leg_viable(&self, leg: &Leg, product: &Product) -> bool {
        leg.transit_days < product.shelf_life.days_in(leg.state)
    }

    /// State-aware reachability: can inventory of `product` starting at
    /// `origin` end up at `destination` in `state`?
    ///
    /// Moves keep the current state; freeze (ambient -> frozen) and thaw
    /// (frozen -> thawed) happen in place at capable nodes.
    pub fn reachable(
        &self,
        origin: &NodeId,
        destination: &NodeId,
        product: &Product,
        state: StorageState,
    ) -> bool {
        let Some(&start) = self.node_lookup.get(origin) else {
            return false;
        };
        let Some(&target) = self.node_lookup.get(destination) else {
            return false;
        };

        let mut stack: Vec<(usize, StorageState)> = StorageState::ALL
            .iter()
            .filter(|s| self.nodes[start].can_handle(**s))
            .map(|s| (start, *s))
            .collect();
        let mut seen: BTreeSet<(usize, StorageState)> = stack.iter().copied().collect();

        while let Some((at, current)) = stack.pop() {
            if at == target && current == state {
                return true;
            }
            let node = &self.nodes[at];

            // In-place conversions
            let mut push = |next: (usize, StorageState), stack: &mut Vec<_>| {
                if seen.insert(next) {
                    stack.push(next);
                }
            };
            if current == StorageState::Ambient && node.capabilities.can_freeze {
                push((at, StorageState::Frozen), &mut stack);
            }
            if current == StorageState::Frozen && node.capabilities.can_thaw {
                push((at, StorageState::Thawed), &mut stack);
            }

            // Outbound legs in the current state
            for &leg_index in self.legs_from(&node.id) {
                let leg = &self.legs[leg_index];
                if leg.state != current || !self.leg_viable(leg, product) {
                    continue;
                }
                let next_node = self.node_lookup[&leg.destination];
                if !self.nodes[next_node].can_handle(current) {
                    continue;
                }
                push((next_node, current), &mut stack);
            }
        }
        false
    }

    /// Can demand for `product` at `destination` be served from any
    /// producer? Consumption draws from ambient or thawed stock.
    pub fn demand_servable(&self, destination: &NodeId, product: &Product) -> bool {
        if let Some(node) = self.node(destination) {
            if node.capabilities.can_produce {
                return true;
            }
        }
        self.produce_nodes.iter().any(|p| {
            self.reachable(p, destination, product, StorageState::Ambient)
                || self.reachable(p, destination, product, StorageState::Thawed)
        })
    }

    /// Number of underlying graph edges (sanity hook for tests).
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Graph handle for a node id, for topology queries.
    pub fn node_handle(&self, id: &NodeId) -> Option<NodeIndex> {
        self.node_lookup.get(id).map(|&i| self.graph_index[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NodeCapabilities, ProductId, ShelfLife, StorageLimits};
    use chrono::Weekday;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn node(id: &str, caps: NodeCapabilities) -> Node {
        Node {
            id: NodeId::new(id),
            capabilities: caps,
            units_per_hour: if caps.can_produce { Some(1400.0) } else { None },
            storage_limits: StorageLimits::default(),
        }
    }

    fn product(frozen_days: u32) -> Product {
        Product {
            id: ProductId::new("LOAF"),
            shelf_life: ShelfLife {
                ambient_days: 17,
                frozen_days,
                thawed_days: 14,
            },
            units_per_mix: 100,
            unit_cost: 1.2,
        }
    }

    fn route(o: &str, d: &str, state: StorageState, transit: u32) -> Route {
        Route {
            origin: NodeId::new(o),
            destination: NodeId::new(d),
            state,
            transit_days: transit,
            cost_per_unit: 0.05,
        }
    }

    fn hub_and_spoke() -> (Vec<Node>, Vec<Route>) {
        let producer = node(
            "plant",
            NodeCapabilities {
                can_produce: true,
                can_store_ambient: true,
                can_freeze: true,
                can_store_frozen: true,
                ..Default::default()
            },
        );
        let hub = node(
            "hub",
            NodeCapabilities {
                can_store_frozen: true,
                ..Default::default()
            },
        );
        let spoke = node(
            "spoke",
            NodeCapabilities {
                can_thaw: true,
                can_store_thawed: true,
                is_demand_point: true,
                ..Default::default()
            },
        );
        let routes = vec![
            route("plant", "hub", StorageState::Frozen, 2),
            route("hub", "spoke", StorageState::Frozen, 1),
        ];
        (vec![producer, hub, spoke], routes)
    }

    #[test]
    fn capability_sets_and_adjacency() {
        let (nodes, routes) = hub_and_spoke();
        let horizon = Horizon::new(d(2026, 3, 2), d(2026, 3, 8)).unwrap();
        let net = PlanNetwork::build(&nodes, &routes, &[], &horizon).unwrap();

        assert_eq!(net.produce_nodes.len(), 1);
        assert_eq!(net.freeze_nodes.len(), 1);
        assert_eq!(net.thaw_nodes.len(), 1);
        assert_eq!(net.demand_nodes.len(), 1);
        assert_eq!(net.legs_from(&NodeId::new("plant")).len(), 1);
        assert_eq!(net.legs_to(&NodeId::new("spoke")).len(), 1);
        assert_eq!(net.edge_count(), 2);
        assert!(net
            .storage_nodes(StorageState::Frozen)
            .contains(&NodeId::new("hub")));
    }

    #[test]
    fn frozen_path_reaches_spoke_as_thawed() {
        let (nodes, routes) = hub_and_spoke();
        let horizon = Horizon::new(d(2026, 3, 2), d(2026, 3, 8)).unwrap();
        let net = PlanNetwork::build(&nodes, &routes, &[], &horizon).unwrap();
        let p = product(120);

        let plant = NodeId::new("plant");
        let spoke = NodeId::new("spoke");
        assert!(net.reachable(&plant, &spoke, &p, StorageState::Thawed));
        // No ambient route exists, and the spoke cannot hold ambient stock
        assert!(!net.reachable(&plant, &spoke, &p, StorageState::Ambient));
        assert!(net.demand_servable(&spoke, &p));
    }

    #[test]
    fn transit_longer_than_shelf_life_blocks_the_leg() {
        let (nodes, routes) = hub_and_spoke();
        let horizon = Horizon::new(d(2026, 3, 2), d(2026, 3, 8)).unwrap();
        let net = PlanNetwork::build(&nodes, &routes, &[], &horizon).unwrap();
        // Frozen life of 2 days: the 2-day frozen leg delivers expired stock
        let p = product(2);
        assert!(!net.reachable(
            &NodeId::new("plant"),
            &NodeId::new("spoke"),
            &p,
            StorageState::Thawed
        ));
        assert!(!net.demand_servable(&NodeId::new("spoke"), &p));
    }

    #[test]
    fn unknown_route_endpoint_is_fatal() {
        let (nodes, mut routes) = hub_and_spoke();
        routes.push(route("hub", "nowhere", StorageState::Ambient, 1));
        let horizon = Horizon::new(d(2026, 3, 2), d(2026, 3, 8)).unwrap();
        let err = PlanNetwork::build(&nodes, &routes, &[], &horizon).unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn truck_expansion_respects_weekdays_and_horizon() {
        let (nodes, routes) = hub_and_spoke();
        let trucks = vec![TruckSchedule {
            id: TruckId::new("T1"),
            origin: NodeId::new("hub"),
            destination: NodeId::new("spoke"),
            departure_weekdays: vec![Weekday::Mon, Weekday::Wed],
            pallet_capacity: 22,
            fixed_cost_per_departure: 150.0,
        }];
        // Mon 2026-03-02 .. Sun 2026-03-08: one Monday, one Wednesday
        let horizon = Horizon::new(d(2026, 3, 2), d(2026, 3, 8)).unwrap();
        let net = PlanNetwork::build(&nodes, &routes, &trucks, &horizon).unwrap();
        assert_eq!(net.truck_instances.len(), 2);
        assert!(net.has_truck_service(&NodeId::new("hub"), &NodeId::new("spoke")));
        assert!(!net.has_truck_service(&NodeId::new("plant"), &NodeId::new("hub")));
        assert_eq!(
            net.instances_departing(&NodeId::new("hub"), &NodeId::new("spoke"), d(2026, 3, 2))
                .len(),
            1
        );
        assert!(net
            .instances_departing(&NodeId::new("hub"), &NodeId::new("spoke"), d(2026, 3, 3))
            .is_empty());
    }
}
