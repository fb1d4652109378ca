//! Player projection: reputation and faction influence

use crate::config::Rules;
use crate::types::{Faction, PlayerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub reputation: i32,
    pub influence: BTreeMap<Faction, i32>,
    pub registered_year: i32,
}

impl Player {
    pub fn new(id: PlayerId, name: String, registered_year: i32) -> Self {
        Self {
            id,
            name,
            reputation: 0,
            influence: Faction::ALL.iter().map(|f| (*f, 0)).collect(),
            registered_year,
        }
    }

    pub fn influence(&self, faction: Faction) -> i32 {
        self.influence.get(&faction).copied().unwrap_or(0)
    }

    /// Current per-faction ceiling
    pub fn influence_cap(&self, rules: &Rules) -> i32 {
        rules.influence_soft_cap(self.reputation)
    }

    /// Apply a reputation change, clamp it, then pull influence under the
    /// (possibly lower) cap.
    pub fn adjust_reputation(&mut self, delta: i32, rules: &Rules) {
        self.reputation = rules.clamp_reputation(self.reputation.saturating_add(delta));
        self.enforce_caps(rules);
    }

    pub fn adjust_influence(&mut self, faction: Faction, delta: i32, rules: &Rules) {
        let cap = self.influence_cap(rules);
        let value = self.influence.entry(faction).or_insert(0);
        *value = value.saturating_add(delta).clamp(0, cap);
    }

    pub fn enforce_caps(&mut self, rules: &Rules) {
        let cap = self.influence_cap(rules);
        for value in self.influence.values_mut() {
            *value = (*value).clamp(0, cap);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> Player {
        Player::new("p1".into(), "Ada".into(), 1900)
    }

    #[test]
    fn test_new_player_has_every_faction() {
        let p = player();
        assert_eq!(p.influence.len(), Faction::ALL.len());
        assert_eq!(p.reputation, 0);
    }

    #[test]
    fn test_reputation_clamped() {
        let rules = Rules::default();
        let mut p = player();
        p.adjust_reputation(70, &rules);
        assert_eq!(p.reputation, 50);
        p.adjust_reputation(-500, &rules);
        assert_eq!(p.reputation, -50);
        p.adjust_reputation(i32::MIN, &rules);
        assert_eq!(p.reputation, -50);
    }

    #[test]
    fn test_influence_soft_cap_follows_reputation() {
        let rules = Rules::default();
        let mut p = player();

        p.adjust_influence(Faction::Academia, 20, &rules);
        assert_eq!(p.influence(Faction::Academia), 5);

        p.adjust_reputation(50, &rules);
        p.adjust_influence(Faction::Academia, 20, &rules);
        assert_eq!(p.influence(Faction::Academia), 15);

        // Falling reputation pulls existing influence down
        p.adjust_reputation(-40, &rules);
        assert_eq!(p.influence(Faction::Academia), 7);

        p.adjust_influence(Faction::Academia, -100, &rules);
        assert_eq!(p.influence(Faction::Academia), 0);
    }
}
