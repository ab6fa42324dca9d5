//! Behavior-tree gate: an ordered selector of condition-guarded branches.
//!
//! Each branch narrows the catalog to the candidates it allows; the engine
//! scores those and the first branch that yields an action wins. Every
//! branch after `combat` requires the entity to be out of combat, so an
//! entity in combat only ever receives a combat action or none at all.

use crate::actions::ids;
use crate::catalog::CatalogEntry;
use crate::config::DecisionConfig;
use crate::engine::DecisionInput;
use crate::types::ActionCategory;
use chrono::Duration;

pub struct GateBranch {
    pub id: &'static str,
    pub condition: fn(&DecisionInput<'_>, &DecisionConfig) -> bool,
    /// Which performable catalog entries this branch offers to the scorer.
    pub allows: fn(&CatalogEntry, &DecisionInput<'_>) -> bool,
}

pub struct BehaviorTree {
    branches: Vec<GateBranch>,
}

impl BehaviorTree {
    pub fn new(branches: Vec<GateBranch>) -> Self {
        Self { branches }
    }

    pub fn branches(&self) -> &[GateBranch] {
        &self.branches
    }
}

impl Default for BehaviorTree {
    fn default() -> Self {
        Self::new(default_branches())
    }
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

fn out_of_combat(input: &DecisionInput<'_>) -> bool {
    !input.entity.is_in_combat()
}

fn alive_and_calm(input: &DecisionInput<'_>) -> bool {
    out_of_combat(input) && !input.entity.is_dead()
}

fn just_arrived(input: &DecisionInput<'_>, cfg: &DecisionConfig) -> bool {
    alive_and_calm(input)
        && input
            .entity
            .arrived_at
            .map(|t| input.now - t <= Duration::seconds(cfg.arrival_window_secs))
            .unwrap_or(false)
}

/// No action for longer than the stall window. An entity that never acted
/// counts as stalled.
fn stalled(input: &DecisionInput<'_>, cfg: &DecisionConfig) -> bool {
    alive_and_calm(input)
        && input
            .entity
            .last_action_at
            .map(|t| input.now - t > Duration::seconds(cfg.stall_window_secs))
            .unwrap_or(true)
}

// ---------------------------------------------------------------------------
// Default branches, highest precedence first
// ---------------------------------------------------------------------------

pub fn default_branches() -> Vec<GateBranch> {
    vec![
        GateBranch {
            id: "combat",
            condition: |input, _| input.entity.is_in_combat(),
            allows: |entry, _| entry.category == ActionCategory::Combat,
        },
        GateBranch {
            id: "dead",
            condition: |input, _| out_of_combat(input) && input.entity.is_dead(),
            allows: |entry, _| entry.category == ActionCategory::Recovery,
        },
        GateBranch {
            id: "just_arrived",
            condition: just_arrived,
            allows: |entry, _| {
                matches!(
                    entry.category,
                    ActionCategory::Explore
                        | ActionCategory::Quest
                        | ActionCategory::Trade
                        | ActionCategory::Social
                        | ActionCategory::Rest
                        | ActionCategory::Recovery
                )
            },
        },
        GateBranch {
            id: "npcs_closed",
            condition: |input, _| alive_and_calm(input) && !input.world.npcs_open,
            allows: |entry, _| {
                !entry.category.needs_npcs() && entry.category != ActionCategory::Combat
            },
        },
        GateBranch {
            id: "stalled",
            condition: stalled,
            allows: |entry, _| entry.id == ids::TRAVEL,
        },
        GateBranch {
            id: "idle",
            condition: |input, _| alive_and_calm(input),
            allows: |entry, _| entry.category != ActionCategory::Combat,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_order_is_fixed() {
        let ids: Vec<_> = BehaviorTree::default()
            .branches()
            .iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(
            ids,
            vec!["combat", "dead", "just_arrived", "npcs_closed", "stalled", "idle"]
        );
    }
}
