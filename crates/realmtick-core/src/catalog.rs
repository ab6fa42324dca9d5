//! Action catalog: the ordered registry of everything an entity can do.
//!
//! Catalog order matters. It is the candidate order handed to the scorer,
//! and the scorer's stable sort breaks ties by it.

use crate::error::{Result, TickError};
use crate::game_data::GameData;
use crate::types::{ActionCategory, Entity};
use crate::world::WorldState;
use chrono::{DateTime, Utc};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Action capability
// ---------------------------------------------------------------------------

/// Read-only view passed to `can_perform` and `weight`.
pub struct ActionState<'a> {
    pub entity: &'a Entity,
    pub world: &'a WorldState,
    pub game: &'a GameData,
}

/// Mutable view passed to `perform`.
pub struct ActionContext<'a> {
    pub entity: &'a mut Entity,
    pub world: &'a WorldState,
    pub game: &'a GameData,
    pub rng: &'a mut dyn RngCore,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChronicleNote {
    pub kind: String,
    pub text: String,
}

/// What an action did. `success` feeds the learning stats.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutcome {
    pub log_lines: Vec<String>,
    pub chronicle: Vec<ChronicleNote>,
    pub success: bool,
}

impl ActionOutcome {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failed() -> Self {
        Self::default()
    }

    pub fn line(&mut self, text: impl Into<String>) -> &mut Self {
        self.log_lines.push(text.into());
        self
    }

    pub fn chronicle(&mut self, kind: &str, text: impl Into<String>) -> &mut Self {
        self.chronicle.push(ChronicleNote {
            kind: kind.to_string(),
            text: text.into(),
        });
        self
    }
}

pub trait Action: Send + Sync {
    fn can_perform(&self, state: &ActionState<'_>) -> bool;

    /// Raw weight multiplier. Catalog entries without an opinion use 1.0.
    fn weight(&self, _state: &ActionState<'_>) -> f64 {
        1.0
    }

    fn perform(&self, ctx: &mut ActionContext<'_>) -> Result<ActionOutcome>;
}

/// An [`Action`] assembled from plain function pointers. No captures, no
/// heap state; the built-in catalog is made of these.
pub struct FnAction {
    pub can_perform: fn(&ActionState<'_>) -> bool,
    pub weight: Option<fn(&ActionState<'_>) -> f64>,
    pub perform: fn(&mut ActionContext<'_>) -> Result<ActionOutcome>,
}

impl Action for FnAction {
    fn can_perform(&self, state: &ActionState<'_>) -> bool {
        (self.can_perform)(state)
    }

    fn weight(&self, state: &ActionState<'_>) -> f64 {
        self.weight.map(|w| w(state)).unwrap_or(1.0)
    }

    fn perform(&self, ctx: &mut ActionContext<'_>) -> Result<ActionOutcome> {
        (self.perform)(ctx)
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct CatalogEntry {
    pub id: String,
    pub category: ActionCategory,
    pub tags: Vec<String>,
    pub action: Arc<dyn Action>,
}

impl std::fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct ActionCatalog {
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
}

impl ActionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action. Ids are unique across the catalog.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        category: ActionCategory,
        tags: &[&str],
        action: Arc<dyn Action>,
    ) -> Result<()> {
        let id = id.into();
        if self.index.contains_key(&id) {
            return Err(TickError::InvalidConfig(format!(
                "action '{id}' registered twice"
            )));
        }
        self.index.insert(id.clone(), self.entries.len());
        self.entries.push(CatalogEntry {
            id,
            category,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            action,
        });
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    pub fn require(&self, id: &str) -> Result<&CatalogEntry> {
        self.get(id)
            .ok_or_else(|| TickError::ActionNotFound(id.to_string()))
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn in_category(&self, category: ActionCategory) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter().filter(move |e| e.category == category)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Arc<dyn Action> {
        Arc::new(FnAction {
            can_perform: |_| true,
            weight: None,
            perform: |_| Ok(ActionOutcome::succeeded()),
        })
    }

    #[test]
    fn register_preserves_order_and_indexes_by_id() {
        let mut catalog = ActionCatalog::new();
        catalog
            .register("wave", ActionCategory::Social, &["friendly"], noop())
            .unwrap();
        catalog
            .register("nap", ActionCategory::Rest, &[], noop())
            .unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.entries()[1].id, "nap");
        assert_eq!(catalog.get("wave").unwrap().tags, vec!["friendly"]);
        assert_eq!(catalog.in_category(ActionCategory::Rest).count(), 1);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut catalog = ActionCatalog::new();
        catalog
            .register("nap", ActionCategory::Rest, &[], noop())
            .unwrap();
        let err = catalog
            .register("nap", ActionCategory::Rest, &[], noop())
            .unwrap_err();
        assert!(err.to_string().contains("registered twice"));
    }

    #[test]
    fn require_reports_missing_action() {
        let catalog = ActionCatalog::new();
        assert!(matches!(
            catalog.require("dance"),
            Err(TickError::ActionNotFound(_))
        ));
    }
}
