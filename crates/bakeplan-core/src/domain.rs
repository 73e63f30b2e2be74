//! Domain records for the production-distribution network.
//!
//! Everything here is pure data: locations, products with per-state shelf
//! lives, directed routes, recurring truck services, labor days, cost rates,
//! demand forecast entries and opening inventory. Records are immutable for
//! the duration of a solve; validation lives in [`crate::validate`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Units per case, fixed across the product range.
pub const UNITS_PER_CASE: u32 = 10;

/// Units per pallet. Partial pallets occupy a full pallet slot.
pub const UNITS_PER_PALLET: u32 = 320;

// Newtype wrappers for ids, for type safety across the workspace.

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TruckId(String);

macro_rules! impl_string_id {
    ($name:ident) => {
        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                $name(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name(value.to_string())
            }
        }
    };
}

impl_string_id!(NodeId);
impl_string_id!(ProductId);
impl_string_id!(TruckId);

/// The three storage states inventory can be held in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageState {
    Ambient,
    Frozen,
    Thawed,
}

impl StorageState {
    pub const ALL: [StorageState; 3] = [
        StorageState::Ambient,
        StorageState::Frozen,
        StorageState::Thawed,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            StorageState::Ambient => "ambient",
            StorageState::Frozen => "frozen",
            StorageState::Thawed => "thawed",
        }
    }
}

impl fmt::Display for StorageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What a node is physically able to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCapabilities {
    #[serde(default)]
    pub can_produce: bool,
    #[serde(default)]
    pub can_store_ambient: bool,
    #[serde(default)]
    pub can_store_frozen: bool,
    #[serde(default)]
    pub can_store_thawed: bool,
    #[serde(default)]
    pub can_thaw: bool,
    #[serde(default)]
    pub can_freeze: bool,
    #[serde(default)]
    pub is_demand_point: bool,
}

/// Optional per-state storage capacity, in pallets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambient_pallets: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frozen_pallets: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thawed_pallets: Option<u32>,
}

impl StorageLimits {
    pub fn for_state(&self, state: StorageState) -> Option<u32> {
        match state {
            StorageState::Ambient => self.ambient_pallets,
            StorageState::Frozen => self.frozen_pallets,
            StorageState::Thawed => self.thawed_pallets,
        }
    }
}

/// A physical location in the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub capabilities: NodeCapabilities,
    /// Production rate; required (> 0) when `can_produce` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units_per_hour: Option<f64>,
    #[serde(default)]
    pub storage_limits: StorageLimits,
}

impl Node {
    pub fn can_store(&self, state: StorageState) -> bool {
        match state {
            StorageState::Ambient => self.capabilities.can_store_ambient,
            StorageState::Frozen => self.capabilities.can_store_frozen,
            StorageState::Thawed => self.capabilities.can_store_thawed,
        }
    }

    /// Whether inventory in `state` may pass through this node at all.
    ///
    /// A node that thaws can receive frozen stock and hold thawed stock
    /// within the day even without dedicated storage for either; likewise a
    /// freeze point touches both ambient and frozen stock. Closing inventory
    /// in a state without storage capability is still forced to zero.
    pub fn can_handle(&self, state: StorageState) -> bool {
        if self.can_store(state) {
            return true;
        }
        match state {
            StorageState::Ambient => self.capabilities.can_produce || self.capabilities.can_freeze,
            StorageState::Frozen => self.capabilities.can_thaw || self.capabilities.can_freeze,
            StorageState::Thawed => self.capabilities.can_thaw,
        }
    }
}

/// Shelf life of a product, in days, per storage state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelfLife {
    pub ambient_days: u32,
    pub frozen_days: u32,
    pub thawed_days: u32,
}

impl Default for ShelfLife {
    fn default() -> Self {
        Self {
            ambient_days: 17,
            frozen_days: 120,
            thawed_days: 14,
        }
    }
}

impl ShelfLife {
    pub fn days_in(&self, state: StorageState) -> u32 {
        match state {
            StorageState::Ambient => self.ambient_days,
            StorageState::Frozen => self.frozen_days,
            StorageState::Thawed => self.thawed_days,
        }
    }
}

/// A stock-keeping unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    #[serde(default)]
    pub shelf_life: ShelfLife,
    /// Indivisible batch granularity: production is an integer multiple of this.
    pub units_per_mix: u32,
    pub unit_cost: f64,
}

/// A directed transport leg. The state is the arrival state of shipped
/// inventory; conversions happen at nodes, never on a route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub origin: NodeId,
    pub destination: NodeId,
    pub state: StorageState,
    pub transit_days: u32,
    pub cost_per_unit: f64,
}

impl Route {
    pub fn label(&self) -> String {
        format!("{}->{} ({})", self.origin, self.destination, self.state)
    }
}

/// A recurring truck service between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruckSchedule {
    pub id: TruckId,
    pub origin: NodeId,
    pub destination: NodeId,
    /// Days of the week on which this service departs.
    pub departure_weekdays: Vec<Weekday>,
    pub pallet_capacity: u32,
    pub fixed_cost_per_departure: f64,
}

impl TruckSchedule {
    pub fn departs_on(&self, weekday: Weekday) -> bool {
        self.departure_weekdays.contains(&weekday)
    }
}

/// Labor regime for one calendar date.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LaborDay {
    /// Committed hours paid at the regular rate whether used or not.
    /// Zero on weekends, holidays and other non-fixed days.
    pub fixed_hours: f64,
    pub regular_rate: f64,
    pub overtime_rate: f64,
    pub non_fixed_rate: f64,
    /// Hard cap on hours worked this day.
    pub max_hours: f64,
}

impl LaborDay {
    pub fn is_fixed_day(&self) -> bool {
        self.fixed_hours > 0.0
    }

    /// A day on which no production can happen at all.
    pub fn is_idle(&self) -> bool {
        self.max_hours <= 0.0
    }

    /// Zero-hour day used when a non-production date is absent from the calendar.
    pub fn idle() -> Self {
        Self {
            fixed_hours: 0.0,
            regular_rate: 0.0,
            overtime_rate: 0.0,
            non_fixed_rate: 0.0,
            max_hours: 0.0,
        }
    }
}

fn default_waste_multiplier() -> f64 {
    10.0
}

/// Scalar cost rates shared by the whole model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostStructure {
    pub production_cost_per_unit: f64,
    /// Must dominate the alternatives: enforced >= 4x production cost.
    pub shortage_penalty_per_unit: f64,
    pub storage_cost_frozen_per_pallet_day: f64,
    pub storage_cost_ambient_per_pallet_day: f64,
    /// Charged once per pallet entering storage.
    pub storage_cost_fixed_per_pallet: f64,
    pub changeover_cost_per_start: f64,
    pub changeover_waste_units: f64,
    /// Applied to unit cost for inventory left over at the end of the horizon.
    #[serde(default = "default_waste_multiplier")]
    pub waste_cost_multiplier: f64,
}

impl CostStructure {
    /// Daily storage rate for one pallet in the given state.
    ///
    /// Thawed stock is chilled-ambient for billing purposes.
    pub fn storage_rate(&self, state: StorageState) -> f64 {
        match state {
            StorageState::Frozen => self.storage_cost_frozen_per_pallet_day,
            StorageState::Ambient | StorageState::Thawed => {
                self.storage_cost_ambient_per_pallet_day
            }
        }
    }
}

/// One demand record: quantity of a product due at a destination on a date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastEntry {
    pub destination: NodeId,
    pub product: ProductId,
    pub delivery_date: NaiveDate,
    pub quantity: f64,
}

/// Opening stock observed at the start of the horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub node: NodeId,
    pub product: ProductId,
    pub state: StorageState,
    pub quantity: f64,
    /// When this stock entered its current state. Defaults to the horizon
    /// start; dates before the horizon shorten the remaining life.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_date: Option<NaiveDate>,
}

/// Product catalog keyed by id, preserving a stable iteration order.
pub type ProductCatalog = BTreeMap<ProductId, Product>;

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, caps: NodeCapabilities) -> Node {
        Node {
            id: NodeId::new(id),
            capabilities: caps,
            units_per_hour: None,
            storage_limits: StorageLimits::default(),
        }
    }

    #[test]
    fn shelf_life_defaults() {
        let life = ShelfLife::default();
        assert_eq!(life.days_in(StorageState::Ambient), 17);
        assert_eq!(life.days_in(StorageState::Frozen), 120);
        assert_eq!(life.days_in(StorageState::Thawed), 14);
    }

    #[test]
    fn thaw_point_handles_frozen_without_storage() {
        let n = node(
            "spoke",
            NodeCapabilities {
                can_thaw: true,
                can_store_thawed: true,
                is_demand_point: true,
                ..Default::default()
            },
        );
        assert!(!n.can_store(StorageState::Frozen));
        assert!(n.can_handle(StorageState::Frozen));
        assert!(n.can_handle(StorageState::Thawed));
        assert!(!n.can_handle(StorageState::Ambient));
    }

    #[test]
    fn thawed_storage_bills_at_ambient_rate() {
        let costs = CostStructure {
            production_cost_per_unit: 1.0,
            shortage_penalty_per_unit: 4.0,
            storage_cost_frozen_per_pallet_day: 0.5,
            storage_cost_ambient_per_pallet_day: 0.2,
            storage_cost_fixed_per_pallet: 1.0,
            changeover_cost_per_start: 10.0,
            changeover_waste_units: 5.0,
            waste_cost_multiplier: 10.0,
        };
        assert_eq!(costs.storage_rate(StorageState::Thawed), 0.2);
        assert_eq!(costs.storage_rate(StorageState::Frozen), 0.5);
    }

    #[test]
    fn ids_round_trip_through_json() {
        let id = ProductId::new("BREAD-WHITE");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"BREAD-WHITE\"");
        let back: ProductId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn truck_weekday_membership() {
        let truck = TruckSchedule {
            id: TruckId::new("T1"),
            origin: NodeId::new("hub"),
            destination: NodeId::new("spoke"),
            departure_weekdays: vec![Weekday::Mon, Weekday::Thu],
            pallet_capacity: 22,
            fixed_cost_per_departure: 180.0,
        };
        assert!(truck.departs_on(Weekday::Mon));
        assert!(!truck.departs_on(Weekday::Tue));
    }
}
