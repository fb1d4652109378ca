//! Scholar projection
//!
//! Personality and stats are regenerated from the seed on `scholar_generated`
//! and never change afterwards. Career, patronage and memory move with later
//! events.

use crate::generation::{self, Personality};
use crate::memory::MemoryState;
use crate::types::{CareerTier, CareerTrack, PlayerId, ScholarId, StatName, Subject};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Career {
    pub tier: CareerTier,
    pub track: CareerTrack,
    pub last_promotion_year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scholar {
    pub id: ScholarId,
    pub name: String,
    pub seed: u64,
    pub personality: Personality,
    pub stats: BTreeMap<StatName, u8>,
    pub memory: MemoryState,
    pub career: Career,
    pub patron: Option<PlayerId>,
    pub retired: bool,
    /// Offers received so far; keys the next defection draw
    pub defection_attempts: u32,
}

impl Scholar {
    pub fn generate(id: ScholarId, name: String, seed: u64, year: i32) -> Self {
        let generated = generation::generate(seed);
        Self {
            id,
            name,
            seed,
            personality: generated.personality,
            stats: generated.stats,
            memory: MemoryState::new(),
            career: Career {
                tier: CareerTier::Apprentice,
                track: generated.track,
                last_promotion_year: year,
            },
            patron: None,
            retired: false,
            defection_attempts: 0,
        }
    }

    pub fn stat(&self, stat: StatName) -> u8 {
        self.stats.get(&stat).copied().unwrap_or(0)
    }

    pub fn years_since_promotion(&self, current_year: i32) -> i32 {
        current_year - self.career.last_promotion_year
    }

    /// Subject key for the current patron, if any
    pub fn patron_subject(&self) -> Option<Subject> {
        self.patron.clone().map(Subject::Player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_seed_deterministic() {
        let a = Scholar::generate("s1".into(), "Dr. A".into(), 99, 1900);
        let b = Scholar::generate("s1".into(), "Dr. A".into(), 99, 1900);
        assert_eq!(a, b);
        assert_eq!(a.career.tier, CareerTier::Apprentice);
        assert!(a.patron.is_none());
    }

    #[test]
    fn test_years_since_promotion() {
        let s = Scholar::generate("s1".into(), "Dr. A".into(), 1, 1900);
        assert_eq!(s.years_since_promotion(1907), 7);
    }
}
