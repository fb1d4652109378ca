//! Domain events
//!
//! One payload variant per action type, each with a fixed shape. Events are
//! built by the engine, validated here, appended by the store and folded by
//! the projection layer. Nothing edits an event after it is appended; fixes
//! are new compensating events (`reputation_adjusted`, `feeling_recorded`).

use crate::error::{GameError, Result};
use crate::memory::Fact;
use crate::resolution::DefectionInputs;
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ACTION TYPES
// ============================================================================

/// Discriminant of an event payload, stored in its own column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    PlayerRegistered,
    ScholarGenerated,
    ScholarRecruited,
    ScholarPromoted,
    ScholarRetired,
    TheorySubmitted,
    TheoryResolved,
    ExpeditionLaunched,
    ExpeditionResolved,
    DefectionResolved,
    FeelingRecorded,
    FactRecorded,
    ScarInflicted,
    InfluenceGranted,
    ReputationAdjusted,
    YearAdvanced,
}

impl ActionType {
    pub const ALL: [ActionType; 16] = [
        ActionType::PlayerRegistered,
        ActionType::ScholarGenerated,
        ActionType::ScholarRecruited,
        ActionType::ScholarPromoted,
        ActionType::ScholarRetired,
        ActionType::TheorySubmitted,
        ActionType::TheoryResolved,
        ActionType::ExpeditionLaunched,
        ActionType::ExpeditionResolved,
        ActionType::DefectionResolved,
        ActionType::FeelingRecorded,
        ActionType::FactRecorded,
        ActionType::ScarInflicted,
        ActionType::InfluenceGranted,
        ActionType::ReputationAdjusted,
        ActionType::YearAdvanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::PlayerRegistered => "player_registered",
            ActionType::ScholarGenerated => "scholar_generated",
            ActionType::ScholarRecruited => "scholar_recruited",
            ActionType::ScholarPromoted => "scholar_promoted",
            ActionType::ScholarRetired => "scholar_retired",
            ActionType::TheorySubmitted => "theory_submitted",
            ActionType::TheoryResolved => "theory_resolved",
            ActionType::ExpeditionLaunched => "expedition_launched",
            ActionType::ExpeditionResolved => "expedition_resolved",
            ActionType::DefectionResolved => "defection_resolved",
            ActionType::FeelingRecorded => "feeling_recorded",
            ActionType::FactRecorded => "fact_recorded",
            ActionType::ScarInflicted => "scar_inflicted",
            ActionType::InfluenceGranted => "influence_granted",
            ActionType::ReputationAdjusted => "reputation_adjusted",
            ActionType::YearAdvanced => "year_advanced",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self> {
        ActionType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| GameError::Validation(format!("unknown action_type '{}'", s)))
    }
}

// ============================================================================
// PAYLOADS
// ============================================================================

/// A finding brought back from an expedition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discovery {
    pub significance: ExpeditionOutcome,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    PlayerRegistered {
        player_id: PlayerId,
        name: String,
    },
    ScholarGenerated {
        scholar_id: ScholarId,
        name: String,
        seed: u64,
    },
    ScholarRecruited {
        scholar_id: ScholarId,
        player_id: PlayerId,
    },
    ScholarPromoted {
        scholar_id: ScholarId,
        tier: CareerTier,
    },
    ScholarRetired {
        scholar_id: ScholarId,
    },
    TheorySubmitted {
        theory_id: TheoryId,
        player_id: PlayerId,
        claim: String,
        confidence: Confidence,
    },
    TheoryResolved {
        theory_id: TheoryId,
        verified: bool,
        reputation_delta: i32,
    },
    ExpeditionLaunched {
        expedition_id: ExpeditionId,
        theory_id: TheoryId,
        preparation: Preparation,
        team: Vec<ScholarId>,
        expertise_match: i32,
        site_friction: i32,
        political_friction: i32,
    },
    ExpeditionResolved {
        expedition_id: ExpeditionId,
        roll: i32,
        score: i32,
        outcome: ExpeditionOutcome,
        failure_variant: Option<FailureVariant>,
        discoveries: Vec<Discovery>,
    },
    DefectionResolved {
        scholar_id: ScholarId,
        /// Zero-based count of earlier offers to this scholar
        attempt: u32,
        from_player: PlayerId,
        to_player: PlayerId,
        inputs: DefectionInputs,
        probability: f64,
        draw: f64,
        defected: bool,
    },
    FeelingRecorded {
        scholar_id: ScholarId,
        subject: Subject,
        delta: f64,
    },
    FactRecorded {
        scholar_id: ScholarId,
        fact: Fact,
    },
    ScarInflicted {
        scholar_id: ScholarId,
        subject: Subject,
        trigger: ScarTrigger,
        magnitude: f64,
    },
    InfluenceGranted {
        player_id: PlayerId,
        faction: Faction,
        delta: i32,
    },
    ReputationAdjusted {
        player_id: PlayerId,
        delta: i32,
        reason: String,
    },
    YearAdvanced {
        year: i32,
    },
}

/// Derived effect computed at submission time and applied by the fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Consequence {
    Reputation {
        player_id: PlayerId,
        delta: i32,
    },
    Influence {
        player_id: PlayerId,
        faction: Faction,
        delta: i32,
    },
    Feeling {
        scholar_id: ScholarId,
        subject: Subject,
        delta: f64,
    },
    Fact {
        scholar_id: ScholarId,
        fact: Fact,
    },
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(GameError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn require_finite(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(GameError::Validation(format!("{} must be finite", field)));
    }
    Ok(())
}

fn promotion_key(scholar_id: &ScholarId, tier: CareerTier) -> String {
    format!("scholar-promoted:{}:{}", scholar_id, tier.as_str())
}

fn defection_key(scholar_id: &ScholarId, attempt: u32) -> String {
    format!("defection:{}:{}", scholar_id, attempt)
}

fn subject_key(subject: &Subject) -> String {
    match subject {
        Subject::Player(id) => id.key(),
        Subject::Scholar(id) => id.key(),
    }
}

impl EventPayload {
    pub fn action_type(&self) -> ActionType {
        match self {
            EventPayload::PlayerRegistered { .. } => ActionType::PlayerRegistered,
            EventPayload::ScholarGenerated { .. } => ActionType::ScholarGenerated,
            EventPayload::ScholarRecruited { .. } => ActionType::ScholarRecruited,
            EventPayload::ScholarPromoted { .. } => ActionType::ScholarPromoted,
            EventPayload::ScholarRetired { .. } => ActionType::ScholarRetired,
            EventPayload::TheorySubmitted { .. } => ActionType::TheorySubmitted,
            EventPayload::TheoryResolved { .. } => ActionType::TheoryResolved,
            EventPayload::ExpeditionLaunched { .. } => ActionType::ExpeditionLaunched,
            EventPayload::ExpeditionResolved { .. } => ActionType::ExpeditionResolved,
            EventPayload::DefectionResolved { .. } => ActionType::DefectionResolved,
            EventPayload::FeelingRecorded { .. } => ActionType::FeelingRecorded,
            EventPayload::FactRecorded { .. } => ActionType::FactRecorded,
            EventPayload::ScarInflicted { .. } => ActionType::ScarInflicted,
            EventPayload::InfluenceGranted { .. } => ActionType::InfluenceGranted,
            EventPayload::ReputationAdjusted { .. } => ActionType::ReputationAdjusted,
            EventPayload::YearAdvanced { .. } => ActionType::YearAdvanced,
        }
    }

    /// Entity keys that must already exist in the log
    pub fn requires(&self) -> Vec<String> {
        match self {
            EventPayload::PlayerRegistered { .. } | EventPayload::ScholarGenerated { .. } => {
                vec![]
            }
            EventPayload::ScholarRecruited {
                scholar_id,
                player_id,
            } => vec![scholar_id.key(), player_id.key()],
            EventPayload::ScholarPromoted { scholar_id, tier } => {
                let mut keys = vec![scholar_id.key()];
                if let Some(previous) = tier.previous().filter(|t| *t != CareerTier::Apprentice) {
                    keys.push(promotion_key(scholar_id, previous));
                }
                keys
            }
            EventPayload::ScholarRetired { scholar_id } => vec![scholar_id.key()],
            EventPayload::TheorySubmitted { player_id, .. } => vec![player_id.key()],
            EventPayload::TheoryResolved { theory_id, .. } => vec![theory_id.key()],
            EventPayload::ExpeditionLaunched {
                theory_id, team, ..
            } => {
                let mut keys = vec![theory_id.key()];
                keys.extend(team.iter().map(|s| s.key()));
                keys
            }
            EventPayload::ExpeditionResolved { expedition_id, .. } => vec![expedition_id.key()],
            EventPayload::DefectionResolved {
                scholar_id,
                attempt,
                from_player,
                to_player,
                ..
            } => {
                let mut keys = vec![
                    scholar_id.key(),
                    from_player.key(),
                    to_player.key(),
                    format!("scholar-recruited:{}", scholar_id),
                ];
                if *attempt > 0 {
                    keys.push(defection_key(scholar_id, attempt - 1));
                }
                keys
            }
            EventPayload::FeelingRecorded {
                scholar_id,
                subject,
                ..
            }
            | EventPayload::ScarInflicted {
                scholar_id,
                subject,
                ..
            } => vec![scholar_id.key(), subject_key(subject)],
            EventPayload::FactRecorded { scholar_id, .. } => vec![scholar_id.key()],
            EventPayload::InfluenceGranted { player_id, .. }
            | EventPayload::ReputationAdjusted { player_id, .. } => vec![player_id.key()],
            EventPayload::YearAdvanced { year } => vec![format!("year:{}", year - 1)],
        }
    }

    /// Entity keys this event brings into existence. A key can only be
    /// created once, which is what makes one-time transitions (resolving an
    /// expedition, advancing to a given year) safe under racing writers.
    pub fn creates(&self) -> Vec<String> {
        match self {
            EventPayload::PlayerRegistered { player_id, .. } => vec![player_id.key()],
            EventPayload::ScholarGenerated { scholar_id, .. } => vec![scholar_id.key()],
            EventPayload::ScholarRetired { scholar_id } => {
                vec![format!("scholar-retired:{}", scholar_id)]
            }
            EventPayload::ScholarRecruited { scholar_id, .. } => {
                vec![format!("scholar-recruited:{}", scholar_id)]
            }
            EventPayload::ScholarPromoted { scholar_id, tier } => {
                vec![promotion_key(scholar_id, *tier)]
            }
            EventPayload::TheorySubmitted { theory_id, .. } => vec![theory_id.key()],
            EventPayload::TheoryResolved { theory_id, .. } => {
                vec![format!("theory-resolved:{}", theory_id)]
            }
            EventPayload::ExpeditionLaunched { expedition_id, .. } => vec![expedition_id.key()],
            EventPayload::ExpeditionResolved { expedition_id, .. } => {
                vec![format!("expedition-resolved:{}", expedition_id)]
            }
            EventPayload::DefectionResolved {
                scholar_id,
                attempt,
                ..
            } => vec![defection_key(scholar_id, *attempt)],
            EventPayload::YearAdvanced { year } => vec![format!("year:{}", year)],
            _ => vec![],
        }
    }

    /// Schema checks that need no game state
    pub fn validate(&self) -> Result<()> {
        match self {
            EventPayload::PlayerRegistered { player_id, name } => {
                require_text("player_id", player_id.as_str())?;
                require_text("name", name)?;
            }
            EventPayload::ScholarGenerated {
                scholar_id, name, ..
            } => {
                require_text("scholar_id", scholar_id.as_str())?;
                require_text("name", name)?;
            }
            EventPayload::ScholarRecruited {
                scholar_id,
                player_id,
            } => {
                require_text("scholar_id", scholar_id.as_str())?;
                require_text("player_id", player_id.as_str())?;
            }
            EventPayload::ScholarPromoted { scholar_id, .. }
            | EventPayload::ScholarRetired { scholar_id } => {
                require_text("scholar_id", scholar_id.as_str())?;
            }
            EventPayload::TheorySubmitted {
                theory_id,
                player_id,
                claim,
                ..
            } => {
                require_text("theory_id", theory_id.as_str())?;
                require_text("player_id", player_id.as_str())?;
                require_text("claim", claim)?;
            }
            EventPayload::TheoryResolved { theory_id, .. } => {
                require_text("theory_id", theory_id.as_str())?;
            }
            EventPayload::ExpeditionLaunched {
                expedition_id,
                theory_id,
                team,
                ..
            } => {
                require_text("expedition_id", expedition_id.as_str())?;
                require_text("theory_id", theory_id.as_str())?;
                if team.is_empty() {
                    return Err(GameError::Validation(
                        "expedition team must not be empty".into(),
                    ));
                }
                let mut seen = std::collections::BTreeSet::new();
                for member in team {
                    require_text("team member", member.as_str())?;
                    if !seen.insert(member) {
                        return Err(GameError::Validation(format!(
                            "scholar {} listed twice in expedition team",
                            member
                        )));
                    }
                }
            }
            EventPayload::ExpeditionResolved { expedition_id, .. } => {
                require_text("expedition_id", expedition_id.as_str())?;
            }
            EventPayload::DefectionResolved {
                scholar_id,
                from_player,
                to_player,
                probability,
                draw,
                ..
            } => {
                require_text("scholar_id", scholar_id.as_str())?;
                if from_player == to_player {
                    return Err(GameError::Validation(
                        "a scholar cannot defect to its own patron".into(),
                    ));
                }
                require_finite("probability", *probability)?;
                require_finite("draw", *draw)?;
            }
            EventPayload::FeelingRecorded {
                scholar_id, delta, ..
            } => {
                require_text("scholar_id", scholar_id.as_str())?;
                require_finite("delta", *delta)?;
            }
            EventPayload::FactRecorded { scholar_id, fact } => {
                require_text("scholar_id", scholar_id.as_str())?;
                require_text("fact.detail", &fact.detail)?;
            }
            EventPayload::ScarInflicted {
                scholar_id,
                magnitude,
                ..
            } => {
                require_text("scholar_id", scholar_id.as_str())?;
                require_finite("magnitude", *magnitude)?;
                if *magnitude >= 0.0 {
                    return Err(GameError::Validation(
                        "scar magnitude must be negative".into(),
                    ));
                }
            }
            EventPayload::InfluenceGranted { player_id, .. } => {
                require_text("player_id", player_id.as_str())?;
            }
            EventPayload::ReputationAdjusted {
                player_id, reason, ..
            } => {
                require_text("player_id", player_id.as_str())?;
                require_text("reason", reason)?;
            }
            EventPayload::YearAdvanced { .. } => {}
        }
        Ok(())
    }
}

impl Consequence {
    pub fn validate(&self) -> Result<()> {
        match self {
            Consequence::Feeling { delta, .. } => require_finite("consequence delta", *delta),
            Consequence::Fact { fact, .. } => require_text("fact.detail", &fact.detail),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// EVENTS
// ============================================================================

/// An event ready to append (no id yet)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub timestamp: DateTime<Utc>,
    pub game_year: i32,
    pub actor_id: Option<PlayerId>,
    pub payload: EventPayload,
    pub consequences: Vec<Consequence>,
    pub idempotency_key: Option<String>,
}

impl NewEvent {
    pub fn new(game_year: i32, actor_id: Option<PlayerId>, payload: EventPayload) -> Self {
        Self {
            timestamp: Utc::now(),
            game_year,
            actor_id,
            payload,
            consequences: Vec::new(),
            idempotency_key: None,
        }
    }

    pub fn with_consequences(mut self, consequences: Vec<Consequence>) -> Self {
        self.consequences = consequences;
        self
    }

    pub fn with_idempotency_key(mut self, key: Option<String>) -> Self {
        self.idempotency_key = key;
        self
    }

    pub fn action_type(&self) -> ActionType {
        self.payload.action_type()
    }

    pub fn validate(&self) -> Result<()> {
        self.payload.validate()?;
        for consequence in &self.consequences {
            consequence.validate()?;
        }
        if let Some(key) = &self.idempotency_key {
            require_text("idempotency_key", key)?;
        }
        if let Some(actor) = &self.actor_id {
            require_text("actor_id", actor.as_str())?;
        }
        Ok(())
    }
}

/// An appended, immutable event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub game_year: i32,
    pub action_type: ActionType,
    pub actor_id: Option<PlayerId>,
    pub payload: EventPayload,
    pub consequences: Vec<Consequence>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::FactKind;

    #[test]
    fn test_action_type_round_trip_names() {
        for action in ActionType::ALL {
            let parsed: ActionType = action.as_str().parse().unwrap();
            assert_eq!(parsed, action);
            assert_eq!(
                serde_json::to_string(&action).unwrap(),
                format!("\"{}\"", action.as_str())
            );
        }
        assert!(matches!(
            "summon_dragon".parse::<ActionType>(),
            Err(GameError::Validation(_))
        ));
    }

    #[test]
    fn test_payload_tagging() {
        let payload = EventPayload::YearAdvanced { year: 1901 };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "year_advanced");
        assert_eq!(json["data"]["year"], 1901);
        assert_eq!(payload.action_type(), ActionType::YearAdvanced);
    }

    #[test]
    fn test_causal_keys() {
        let launch = EventPayload::ExpeditionLaunched {
            expedition_id: "e1".into(),
            theory_id: "t1".into(),
            preparation: Preparation {
                depth: PreparationDepth::Deep,
                bonus: 10,
            },
            team: vec!["s1".into(), "s2".into()],
            expertise_match: 5,
            site_friction: 3,
            political_friction: 0,
        };
        assert_eq!(
            launch.requires(),
            vec!["theory:t1", "scholar:s1", "scholar:s2"]
        );
        assert_eq!(launch.creates(), vec!["expedition:e1"]);

        let resolve = EventPayload::ExpeditionResolved {
            expedition_id: "e1".into(),
            roll: 50,
            score: 62,
            outcome: ExpeditionOutcome::Partial,
            failure_variant: None,
            discoveries: vec![],
        };
        assert_eq!(resolve.requires(), vec!["expedition:e1"]);
        assert_eq!(resolve.creates(), vec!["expedition-resolved:e1"]);

        let promote = EventPayload::ScholarPromoted {
            scholar_id: "s1".into(),
            tier: CareerTier::Reader,
        };
        assert_eq!(
            promote.requires(),
            vec!["scholar:s1", "scholar-promoted:s1:fellow"]
        );
        assert_eq!(promote.creates(), vec!["scholar-promoted:s1:reader"]);

        let year = EventPayload::YearAdvanced { year: 1902 };
        assert_eq!(year.requires(), vec!["year:1901"]);
        assert_eq!(year.creates(), vec!["year:1902"]);
    }

    #[test]
    fn test_validation_rejects_empty_fields() {
        let bad = EventPayload::PlayerRegistered {
            player_id: "p1".into(),
            name: "   ".into(),
        };
        assert!(matches!(bad.validate(), Err(GameError::Validation(_))));

        let bad = EventPayload::TheorySubmitted {
            theory_id: "t1".into(),
            player_id: "p1".into(),
            claim: "".into(),
            confidence: Confidence::Certain,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_teams_and_scars() {
        let dup = EventPayload::ExpeditionLaunched {
            expedition_id: "e1".into(),
            theory_id: "t1".into(),
            preparation: Preparation {
                depth: PreparationDepth::Standard,
                bonus: 0,
            },
            team: vec!["s1".into(), "s1".into()],
            expertise_match: 0,
            site_friction: 0,
            political_friction: 0,
        };
        assert!(dup.validate().is_err());

        let positive_scar = EventPayload::ScarInflicted {
            scholar_id: "s1".into(),
            subject: Subject::Player("p1".into()),
            trigger: ScarTrigger::Betrayal,
            magnitude: 3.0,
        };
        assert!(positive_scar.validate().is_err());

        let nan = EventPayload::FeelingRecorded {
            scholar_id: "s1".into(),
            subject: Subject::Player("p1".into()),
            delta: f64::NAN,
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_new_event_validates_consequences() {
        let event = NewEvent::new(
            1900,
            None,
            EventPayload::YearAdvanced { year: 1901 },
        )
        .with_consequences(vec![Consequence::Fact {
            scholar_id: "s1".into(),
            fact: Fact {
                year: 1900,
                kind: FactKind::Observation,
                subject: None,
                detail: "".into(),
            },
        }]);
        assert!(event.validate().is_err());
    }
}
