use crate::error::{Result, TickError};
use crate::types::ActionCategory;
use crate::world::WorldState;

// ---------------------------------------------------------------------------
// PriorityRule
// ---------------------------------------------------------------------------

/// A fn-pointer priority rule. The first rule whose condition holds supplies
/// the base weight and per-category boosts for every candidate.
pub struct PriorityRule {
    pub id: &'static str,
    pub condition: fn(&WorldState) -> bool,
    pub base_weight: f64,
    pub boosts: &'static [(ActionCategory, f64)],
}

impl PriorityRule {
    pub fn boost(&self, category: ActionCategory) -> f64 {
        self.boosts
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, b)| *b)
            .unwrap_or(0.0)
    }

    pub fn apply(&self, category: ActionCategory) -> RuleMatch {
        RuleMatch {
            rule_id: self.id,
            base: (self.base_weight + self.boost(category)).max(0.0),
        }
    }
}

/// The matched rule applied to one category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleMatch {
    pub rule_id: &'static str,
    /// `max(0, base_weight + boost)`.
    pub base: f64,
}

pub struct RuleSet {
    rules: Vec<PriorityRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<PriorityRule>) -> Self {
        Self { rules }
    }

    pub fn first_match(&self, world: &WorldState) -> Result<&PriorityRule> {
        self.rules
            .iter()
            .find(|r| (r.condition)(world))
            .ok_or_else(|| TickError::Rule {
                rule: "priority".to_string(),
                reason: "no priority rule matched the world state".to_string(),
            })
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.id).collect()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

// ---------------------------------------------------------------------------
// Helper macro for concise rule definitions
// ---------------------------------------------------------------------------

macro_rules! rule {
    (
        id: $id:expr,
        condition: $cond:expr,
        base: $base:expr
        $(, boosts: [$(($cat:expr, $b:expr)),* $(,)?])?
    ) => {
        PriorityRule {
            id: $id,
            condition: $cond,
            base_weight: $base,
            boosts: {
                #[allow(unused_assignments, unused_mut)]
                let mut v: &'static [(ActionCategory, f64)] = &[];
                $(v = &[$(($cat, $b)),*];)?
                v
            },
        }
    };
}

// ---------------------------------------------------------------------------
// Default rules, highest precedence first
// ---------------------------------------------------------------------------

pub fn default_rules() -> Vec<PriorityRule> {
    use ActionCategory::*;
    vec![
        rule! {
            id: "critical_health",
            condition: |w| w.health_ratio < 0.25,
            base: 5.0,
            boosts: [(Recovery, 20.0), (Rest, 15.0)]
        },
        rule! {
            id: "in_combat",
            condition: |w| w.in_combat,
            base: 5.0,
            boosts: [(Combat, 10.0)]
        },
        rule! {
            id: "exhausted",
            condition: |w| w.stamina_ratio < 0.2 || w.tired,
            base: 5.0,
            boosts: [(Rest, 12.0)]
        },
        rule! {
            id: "overencumbered",
            condition: |w| w.overencumbered,
            base: 5.0,
            boosts: [(Trade, 10.0)]
        },
        rule! {
            id: "unsafe_and_hurt",
            condition: |w| !w.location_safe && w.health_ratio < 0.6,
            base: 5.0,
            boosts: [(Travel, 8.0)]
        },
        rule! {
            id: "quest_available",
            condition: |w| w.quest_available,
            base: 5.0,
            boosts: [(Quest, 6.0)]
        },
        rule! {
            id: "default",
            condition: |_| true,
            base: 5.0
        },
    ]
}
