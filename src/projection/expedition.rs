use crate::events::Discovery;
use crate::resolution::ExpeditionInputs;
use crate::types::{
    ExpeditionId, ExpeditionOutcome, FailureVariant, PlayerId, Preparation, ScholarId, TheoryId,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expedition {
    pub id: ExpeditionId,
    pub theory_id: TheoryId,
    /// Owner of the theory, who gains or loses reputation
    pub player_id: PlayerId,
    pub preparation: Preparation,
    pub team: Vec<ScholarId>,
    pub expertise_match: i32,
    pub site_friction: i32,
    pub political_friction: i32,
    pub launch_year: i32,
    pub roll: Option<i32>,
    pub score: Option<i32>,
    pub outcome: Option<ExpeditionOutcome>,
    pub failure_variant: Option<FailureVariant>,
    pub discoveries: Vec<Discovery>,
    pub resolved_year: Option<i32>,
}

impl Expedition {
    pub fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }

    /// Score inputs for a given roll
    pub fn inputs(&self, roll: i32) -> ExpeditionInputs {
        ExpeditionInputs {
            roll,
            preparation_bonus: self.preparation.bonus,
            expertise_match: self.expertise_match,
            site_friction: self.site_friction,
            political_friction: self.political_friction,
            depth: self.preparation.depth,
        }
    }
}
