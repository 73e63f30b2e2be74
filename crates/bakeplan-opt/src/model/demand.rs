//! Demand satisfaction: consumption by state plus shortage equals forecast.

use bakeplan_core::StorageState;

use crate::index::ModelIndex;

use super::{ModelShell, PlanVars, VarId};

pub(super) fn add_rows(index: &ModelIndex, shell: &mut ModelShell, vars: &PlanVars) {
    for cell in &index.demand_cells {
        let node_id = &index.nodes[cell.node].id;
        let product_id = &index.products[cell.product].id;
        let mut terms: Vec<(VarId, f64)> = Vec::new();
        for state in [StorageState::Ambient, StorageState::Thawed] {
            if let Some(&consume) = vars.consume.get(&(cell.node, cell.product, state, cell.day)) {
                terms.push((consume, 1.0));
            }
        }
        if let Some(&shortage) = vars.shortage.get(&(cell.node, cell.product, cell.day)) {
            terms.push((shortage, 1.0));
        }
        shell.add_eq(
            format!("dem_{}_{}_{}", node_id, product_id, cell.day),
            terms,
            cell.quantity,
        );
    }
}
