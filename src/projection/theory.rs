use crate::types::{Confidence, PlayerId, TheoryId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TheoryOutcome {
    pub verified: bool,
    pub resolved_year: i32,
}

/// A claim a player has staked reputation on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theory {
    pub id: TheoryId,
    pub player_id: PlayerId,
    pub claim: String,
    pub confidence: Confidence,
    pub submission_year: i32,
    pub outcome: Option<TheoryOutcome>,
    /// Reputation the owner gained or lost on resolution (0 while open)
    pub reputation_delta: i32,
}

impl Theory {
    pub fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }
}
