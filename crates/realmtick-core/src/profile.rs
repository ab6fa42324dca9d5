//! Play-style profiles: per-category affinity multipliers.

use crate::types::ActionCategory;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub code: String,
    /// Categories missing from the table have affinity 1.0.
    pub affinities: BTreeMap<ActionCategory, f64>,
}

impl Profile {
    pub fn new(code: &str, affinities: &[(ActionCategory, f64)]) -> Self {
        Self {
            code: code.to_string(),
            affinities: affinities.iter().copied().collect(),
        }
    }

    pub fn affinity(&self, category: ActionCategory) -> f64 {
        self.affinities.get(&category).copied().unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: HashMap<String, Profile>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        use ActionCategory::*;
        let mut reg = Self::new();
        reg.insert(Profile::new(
            "warrior",
            &[(Combat, 1.5), (Explore, 1.2), (Trade, 0.8), (Social, 0.7), (Craft, 0.7)],
        ));
        reg.insert(Profile::new(
            "explorer",
            &[(Explore, 1.6), (Travel, 1.4), (Rest, 0.9), (Craft, 0.8)],
        ));
        reg.insert(Profile::new(
            "merchant",
            &[(Trade, 1.7), (Craft, 1.3), (Social, 1.2), (Combat, 0.7), (Explore, 0.8)],
        ));
        reg.insert(Profile::new(
            "scholar",
            &[(Quest, 1.5), (Social, 1.4), (Craft, 1.2), (Combat, 0.7)],
        ));
        reg
    }

    pub fn insert(&mut self, profile: Profile) {
        self.profiles.insert(profile.code.clone(), profile);
    }

    pub fn get(&self, code: &str) -> Option<&Profile> {
        self.profiles.get(code)
    }

    /// Affinity of `code` for `category`. Missing or unknown profiles are
    /// neutral.
    pub fn affinity(&self, code: Option<&str>, category: ActionCategory) -> f64 {
        code.and_then(|c| self.profiles.get(c))
            .map(|p| p.affinity(category))
            .unwrap_or(1.0)
    }

    pub fn codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }
}
