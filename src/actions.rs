//! Player actions and how they become events
//!
//! An `ActionRequest` is what a command handler sends. Turning it into an
//! event happens against the current projection:
//! 1. `ActionRequest::into_payload` resolves ids, draws and outcomes
//! 2. `check_payload` validates the payload against state (raw submissions
//!    enter here directly, so it re-derives every draw and score)
//! 3. `consequences` computes the derived effects the fold will apply

use crate::error::{GameError, Result};
use crate::events::{Consequence, Discovery, EventPayload};
use crate::memory::{Fact, FactKind};
use crate::projection::{fact, GameState, Player, Scholar};
use crate::resolution::{self, DefectionInputs};
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionRequest {
    RegisterPlayer {
        #[serde(default)]
        player_id: Option<PlayerId>,
        name: String,
    },
    GenerateScholar {
        #[serde(default)]
        scholar_id: Option<ScholarId>,
        name: String,
        /// Defaults to a seed derived from the campaign seed and the id
        #[serde(default)]
        seed: Option<u64>,
    },
    RecruitScholar {
        scholar_id: ScholarId,
    },
    PromoteScholar {
        scholar_id: ScholarId,
    },
    RetireScholar {
        scholar_id: ScholarId,
    },
    SubmitTheory {
        #[serde(default)]
        theory_id: Option<TheoryId>,
        claim: String,
        confidence: Confidence,
    },
    ResolveTheory {
        theory_id: TheoryId,
        verified: bool,
    },
    LaunchExpedition {
        #[serde(default)]
        expedition_id: Option<ExpeditionId>,
        theory_id: TheoryId,
        preparation: Preparation,
        team: Vec<ScholarId>,
        expertise_match: i32,
        site_friction: i32,
        political_friction: i32,
    },
    ResolveExpedition {
        expedition_id: ExpeditionId,
        #[serde(default)]
        discoveries: Vec<Discovery>,
    },
    /// A rival's offer to the actor's benefit; resolves as a defection roll
    MakeOffer {
        scholar_id: ScholarId,
        offer_quality: f64,
        faction_alignment: f64,
    },
    RecordFeeling {
        scholar_id: ScholarId,
        subject: Subject,
        delta: f64,
    },
    RecordFact {
        scholar_id: ScholarId,
        fact: Fact,
    },
    InflictScar {
        scholar_id: ScholarId,
        subject: Subject,
        trigger: ScarTrigger,
        magnitude: f64,
    },
    GrantInfluence {
        player_id: PlayerId,
        faction: Faction,
        delta: i32,
    },
    AdjustReputation {
        player_id: PlayerId,
        delta: i32,
        reason: String,
    },
    AdvanceYear,
}

fn require_actor(actor: Option<&PlayerId>, action: &str) -> Result<PlayerId> {
    actor
        .cloned()
        .ok_or_else(|| GameError::Validation(format!("{} needs an acting player", action)))
}

impl ActionRequest {
    /// Resolve this request into the payload to append
    pub fn into_payload(
        self,
        state: &GameState,
        actor: Option<&PlayerId>,
        campaign_seed: u64,
    ) -> Result<EventPayload> {
        let payload = match self {
            ActionRequest::RegisterPlayer { player_id, name } => EventPayload::PlayerRegistered {
                player_id: player_id.unwrap_or_else(PlayerId::generate),
                name,
            },
            ActionRequest::GenerateScholar {
                scholar_id,
                name,
                seed,
            } => {
                let scholar_id = scholar_id.unwrap_or_else(ScholarId::generate);
                let seed = seed.unwrap_or_else(|| {
                    resolution::derive_seed(campaign_seed, &scholar_id.key())
                });
                EventPayload::ScholarGenerated {
                    scholar_id,
                    name,
                    seed,
                }
            }
            ActionRequest::RecruitScholar { scholar_id } => EventPayload::ScholarRecruited {
                scholar_id,
                player_id: require_actor(actor, "recruit_scholar")?,
            },
            ActionRequest::PromoteScholar { scholar_id } => {
                let scholar = known_scholar(state, &scholar_id)?;
                let tier = scholar.career.tier.next().ok_or_else(|| {
                    GameError::Validation(format!("{} is already a professor", scholar_id))
                })?;
                EventPayload::ScholarPromoted { scholar_id, tier }
            }
            ActionRequest::RetireScholar { scholar_id } => {
                EventPayload::ScholarRetired { scholar_id }
            }
            ActionRequest::SubmitTheory {
                theory_id,
                claim,
                confidence,
            } => EventPayload::TheorySubmitted {
                theory_id: theory_id.unwrap_or_else(TheoryId::generate),
                player_id: require_actor(actor, "submit_theory")?,
                claim,
                confidence,
            },
            ActionRequest::ResolveTheory {
                theory_id,
                verified,
            } => {
                let theory = known(state.theories.get(&theory_id), theory_id.key())?;
                EventPayload::TheoryResolved {
                    reputation_delta: theory.confidence.reputation_delta(verified),
                    theory_id,
                    verified,
                }
            }
            ActionRequest::LaunchExpedition {
                expedition_id,
                theory_id,
                preparation,
                team,
                expertise_match,
                site_friction,
                political_friction,
            } => EventPayload::ExpeditionLaunched {
                expedition_id: expedition_id.unwrap_or_else(ExpeditionId::generate),
                theory_id,
                preparation,
                team,
                expertise_match,
                site_friction,
                political_friction,
            },
            ActionRequest::ResolveExpedition {
                expedition_id,
                discoveries,
            } => {
                let expedition = known(state.expeditions.get(&expedition_id), expedition_id.key())?;
                let roll = resolution::expedition_roll(campaign_seed, expedition_id.as_str());
                let outcome = resolution::resolve_expedition(&expedition.inputs(roll))?;
                EventPayload::ExpeditionResolved {
                    expedition_id,
                    roll,
                    score: outcome.score,
                    outcome: outcome.outcome,
                    failure_variant: outcome.failure_variant,
                    discoveries,
                }
            }
            ActionRequest::MakeOffer {
                scholar_id,
                offer_quality,
                faction_alignment,
            } => {
                let to_player = require_actor(actor, "make_offer")?;
                let scholar = known_scholar(state, &scholar_id)?;
                let from_player = scholar.patron.clone().ok_or_else(|| {
                    GameError::Validation(format!("{} has no patron to leave", scholar_id))
                })?;
                let inputs = defection_inputs(state, scholar, offer_quality, faction_alignment);
                let probability = resolution::defection_probability(&inputs)?;
                let attempt = scholar.defection_attempts;
                let draw = resolution::defection_draw(campaign_seed, scholar_id.as_str(), attempt);
                EventPayload::DefectionResolved {
                    scholar_id,
                    attempt,
                    from_player,
                    to_player,
                    inputs,
                    probability,
                    draw,
                    defected: draw < probability,
                }
            }
            ActionRequest::RecordFeeling {
                scholar_id,
                subject,
                delta,
            } => EventPayload::FeelingRecorded {
                scholar_id,
                subject,
                delta,
            },
            ActionRequest::RecordFact { scholar_id, fact } => {
                EventPayload::FactRecorded { scholar_id, fact }
            }
            ActionRequest::InflictScar {
                scholar_id,
                subject,
                trigger,
                magnitude,
            } => EventPayload::ScarInflicted {
                scholar_id,
                subject,
                trigger,
                magnitude,
            },
            ActionRequest::GrantInfluence {
                player_id,
                faction,
                delta,
            } => EventPayload::InfluenceGranted {
                player_id,
                faction,
                delta,
            },
            ActionRequest::AdjustReputation {
                player_id,
                delta,
                reason,
            } => EventPayload::ReputationAdjusted {
                player_id,
                delta,
                reason,
            },
            ActionRequest::AdvanceYear => EventPayload::YearAdvanced {
                year: state.current_year + 1,
            },
        };
        Ok(payload)
    }
}

/// Pressures on a scholar weighing an offer, derived from its projection
pub fn defection_inputs(
    state: &GameState,
    scholar: &Scholar,
    offer_quality: f64,
    faction_alignment: f64,
) -> DefectionInputs {
    let (feeling, scarred) = match scholar.patron_subject() {
        Some(patron) => (
            scholar.memory.feeling(&patron),
            scholar.memory.is_scarred(&patron),
        ),
        None => (0.0, false),
    };
    DefectionInputs {
        offer_quality,
        mistreatment: resolution::mistreatment_from_feeling(feeling, scarred),
        faction_alignment,
        plateau: resolution::plateau_from_years(scholar.years_since_promotion(state.current_year)),
        loyalty: scholar.stat(StatName::Loyalty),
        integrity: scholar.stat(StatName::Integrity),
    }
}

// ============================================================================
// STATE VALIDATION
// ============================================================================

fn known<T>(entity: Option<&T>, key: String) -> Result<&T> {
    entity.ok_or_else(|| GameError::Ordering(format!("{} has not been recorded", key)))
}

fn known_scholar<'a>(state: &'a GameState, id: &ScholarId) -> Result<&'a Scholar> {
    known(state.scholars.get(id), id.key())
}

fn known_player<'a>(state: &'a GameState, id: &PlayerId) -> Result<&'a Player> {
    known(state.players.get(id), id.key())
}

fn known_subject(state: &GameState, subject: &Subject) -> Result<()> {
    match subject {
        Subject::Player(id) => known_player(state, id).map(|_| ()),
        Subject::Scholar(id) => known_scholar(state, id).map(|_| ()),
    }
}

fn active_scholar<'a>(state: &'a GameState, id: &ScholarId) -> Result<&'a Scholar> {
    let scholar = known_scholar(state, id)?;
    if scholar.retired {
        return Err(GameError::Validation(format!("{} has retired", id)));
    }
    Ok(scholar)
}

fn invalid(detail: String) -> GameError {
    GameError::Validation(detail)
}

fn check_acting_player(actor: Option<&PlayerId>, expected: &PlayerId, action: &str) -> Result<()> {
    match actor {
        Some(actor) if actor != expected => Err(invalid(format!(
            "{} acted for {} in {}",
            actor, expected, action
        ))),
        _ => Ok(()),
    }
}

/// Validate a payload against current state. Draws, scores and derived
/// inputs are recomputed and must match what the payload claims.
pub fn check_payload(
    state: &GameState,
    actor: Option<&PlayerId>,
    payload: &EventPayload,
    campaign_seed: u64,
) -> Result<()> {
    if let Some(actor) = actor {
        known_player(state, actor)?;
    }

    match payload {
        EventPayload::PlayerRegistered { player_id, .. } => {
            if state.players.contains_key(player_id) {
                return Err(invalid(format!("{} already registered", player_id.key())));
            }
        }
        EventPayload::ScholarGenerated { scholar_id, .. } => {
            if state.scholars.contains_key(scholar_id) {
                return Err(invalid(format!("{} already exists", scholar_id.key())));
            }
        }
        EventPayload::ScholarRecruited {
            scholar_id,
            player_id,
        } => {
            known_player(state, player_id)?;
            check_acting_player(actor, player_id, "scholar_recruited")?;
            let scholar = active_scholar(state, scholar_id)?;
            if let Some(patron) = &scholar.patron {
                return Err(invalid(format!(
                    "{} already works for {}",
                    scholar_id, patron
                )));
            }
        }
        EventPayload::ScholarPromoted { scholar_id, tier } => {
            let scholar = active_scholar(state, scholar_id)?;
            if scholar.career.tier.next() != Some(*tier) {
                return Err(invalid(format!(
                    "{} is {} and cannot be promoted to {}",
                    scholar_id,
                    scholar.career.tier.as_str(),
                    tier.as_str()
                )));
            }
        }
        EventPayload::ScholarRetired { scholar_id } => {
            active_scholar(state, scholar_id)?;
        }
        EventPayload::TheorySubmitted {
            theory_id,
            player_id,
            ..
        } => {
            known_player(state, player_id)?;
            check_acting_player(actor, player_id, "theory_submitted")?;
            if state.theories.contains_key(theory_id) {
                return Err(invalid(format!("{} already exists", theory_id.key())));
            }
        }
        EventPayload::TheoryResolved {
            theory_id,
            verified,
            reputation_delta,
        } => {
            let theory = known(state.theories.get(theory_id), theory_id.key())?;
            if theory.is_resolved() {
                return Err(invalid(format!("{} is already resolved", theory_id)));
            }
            let expected = theory.confidence.reputation_delta(*verified);
            if *reputation_delta != expected {
                return Err(invalid(format!(
                    "reputation_delta {} does not match the stake ({})",
                    reputation_delta, expected
                )));
            }
        }
        EventPayload::ExpeditionLaunched {
            expedition_id,
            theory_id,
            preparation,
            team,
            expertise_match,
            site_friction,
            political_friction,
        } => {
            if state.expeditions.contains_key(expedition_id) {
                return Err(invalid(format!("{} already exists", expedition_id.key())));
            }
            let theory = known(state.theories.get(theory_id), theory_id.key())?;
            if theory.is_resolved() {
                return Err(invalid(format!("{} is already resolved", theory_id)));
            }
            check_acting_player(actor, &theory.player_id, "expedition_launched")?;
            for member in team {
                active_scholar(state, member)?;
            }
            resolution::check_launch_inputs(
                preparation.bonus,
                *expertise_match,
                *site_friction,
                *political_friction,
            )?;
        }
        EventPayload::ExpeditionResolved {
            expedition_id,
            roll,
            score,
            outcome,
            failure_variant,
            ..
        } => {
            let expedition = known(state.expeditions.get(expedition_id), expedition_id.key())?;
            if expedition.is_resolved() {
                return Err(invalid(format!("{} is already resolved", expedition_id)));
            }
            let expected_roll = resolution::expedition_roll(campaign_seed, expedition_id.as_str());
            if *roll != expected_roll {
                return Err(invalid(format!(
                    "roll {} does not match the seeded roll {}",
                    roll, expected_roll
                )));
            }
            let expected = resolution::resolve_expedition(&expedition.inputs(*roll))?;
            if expected.score != *score
                || expected.outcome != *outcome
                || expected.failure_variant != *failure_variant
            {
                return Err(invalid(format!(
                    "resolution of {} does not match its inputs (expected score {})",
                    expedition_id, expected.score
                )));
            }
        }
        EventPayload::DefectionResolved {
            scholar_id,
            attempt,
            from_player,
            to_player,
            inputs,
            probability,
            draw,
            defected,
        } => {
            known_player(state, to_player)?;
            check_acting_player(actor, to_player, "defection_resolved")?;
            let scholar = active_scholar(state, scholar_id)?;
            if scholar.patron.as_ref() != Some(from_player) {
                return Err(invalid(format!(
                    "{} does not work for {}",
                    scholar_id, from_player
                )));
            }
            if *attempt != scholar.defection_attempts {
                return Err(invalid(format!(
                    "offer {} to {} is out of turn (next is {})",
                    attempt, scholar_id, scholar.defection_attempts
                )));
            }
            let expected_inputs =
                defection_inputs(state, scholar, inputs.offer_quality, inputs.faction_alignment);
            if expected_inputs != *inputs {
                return Err(invalid(format!(
                    "defection inputs for {} do not match its projection",
                    scholar_id
                )));
            }
            let expected_p = resolution::defection_probability(inputs)?;
            let expected_draw =
                resolution::defection_draw(campaign_seed, scholar_id.as_str(), *attempt);
            if expected_p != *probability || expected_draw != *draw {
                return Err(invalid(format!(
                    "probability or draw for {} does not match the seeded resolution",
                    scholar_id
                )));
            }
            if *defected != (draw < probability) {
                return Err(invalid("defected must equal draw < probability".into()));
            }
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
        } => {
            known_scholar(state, scholar_id)?;
            known_subject(state, subject)?;
            if *subject == Subject::Scholar(scholar_id.clone()) {
                return Err(invalid(format!("{} cannot feel about itself", scholar_id)));
            }
        }
        EventPayload::FactRecorded { scholar_id, fact } => {
            known_scholar(state, scholar_id)?;
            if let Some(subject) = &fact.subject {
                known_subject(state, subject)?;
            }
        }
        EventPayload::InfluenceGranted { player_id, .. }
        | EventPayload::ReputationAdjusted { player_id, .. } => {
            known_player(state, player_id)?;
        }
        EventPayload::YearAdvanced { year } => {
            if *year <= state.current_year {
                return Err(invalid(format!("year {} has already begun", year)));
            }
            if *year > state.current_year + 1 {
                return Err(GameError::Ordering(format!(
                    "year {} requires year {} first",
                    year,
                    year - 1
                )));
            }
        }
    }
    Ok(())
}

// ============================================================================
// CONSEQUENCES
// ============================================================================

/// Reject a payload whose feeling deltas, together with its derived
/// consequences, would leave a magnitude that is not a finite number
pub fn check_consequences(
    state: &GameState,
    payload: &EventPayload,
    consequences: &[Consequence],
) -> Result<()> {
    match state.overflowing_feeling(payload, consequences) {
        Some((scholar_id, subject)) => Err(GameError::Validation(format!(
            "feeling of {} toward {} would overflow",
            scholar_id, subject
        ))),
        None => Ok(()),
    }
}

/// Derived effects of a (validated) payload on the current state
pub fn consequences(state: &GameState, payload: &EventPayload) -> Vec<Consequence> {
    let year = state.current_year;
    let mut out = Vec::new();

    match payload {
        EventPayload::ScholarRecruited {
            scholar_id,
            player_id,
        } => {
            let patron = Subject::Player(player_id.clone());
            out.push(Consequence::Fact {
                scholar_id: scholar_id.clone(),
                fact: fact(
                    year,
                    FactKind::Recruited,
                    Some(patron.clone()),
                    format!("joined the circle of {}", player_id),
                ),
            });
            out.push(Consequence::Feeling {
                scholar_id: scholar_id.clone(),
                subject: patron,
                delta: 1.0,
            });
        }
        EventPayload::ScholarPromoted { scholar_id, tier } => {
            let patron = state
                .scholars
                .get(scholar_id)
                .and_then(|s| s.patron_subject());
            out.push(Consequence::Fact {
                scholar_id: scholar_id.clone(),
                fact: fact(
                    year,
                    FactKind::Promoted,
                    patron.clone(),
                    format!("promoted to {}", tier.as_str()),
                ),
            });
            if let Some(patron) = patron {
                out.push(Consequence::Feeling {
                    scholar_id: scholar_id.clone(),
                    subject: patron,
                    delta: 1.0,
                });
            }
        }
        EventPayload::TheoryResolved {
            theory_id,
            verified,
            reputation_delta,
        } => {
            if let Some(theory) = state.theories.get(theory_id) {
                out.push(Consequence::Reputation {
                    player_id: theory.player_id.clone(),
                    delta: *reputation_delta,
                });
                if *verified {
                    out.push(Consequence::Influence {
                        player_id: theory.player_id.clone(),
                        faction: Faction::Academia,
                        delta: 1,
                    });
                }
            }
        }
        EventPayload::ExpeditionResolved {
            expedition_id,
            score,
            outcome,
            failure_variant,
            ..
        } => {
            if let Some(expedition) = state.expeditions.get(expedition_id) {
                let resolution = resolution::ExpeditionResolution {
                    score: *score,
                    outcome: *outcome,
                    failure_variant: *failure_variant,
                };
                let owner = Subject::Player(expedition.player_id.clone());
                out.push(Consequence::Reputation {
                    player_id: expedition.player_id.clone(),
                    delta: resolution.reputation_delta(),
                });
                let detail = match failure_variant {
                    Some(variant) => format!("{}: {:?} ({:?})", expedition_id, outcome, variant),
                    None => format!("{}: {:?}", expedition_id, outcome),
                }
                .to_lowercase();
                for member in &expedition.team {
                    out.push(Consequence::Feeling {
                        scholar_id: member.clone(),
                        subject: owner.clone(),
                        delta: resolution.team_feeling_delta(),
                    });
                    out.push(Consequence::Fact {
                        scholar_id: member.clone(),
                        fact: fact(year, FactKind::Expedition, Some(owner.clone()), detail.clone()),
                    });
                }
            }
        }
        EventPayload::DefectionResolved {
            scholar_id,
            from_player,
            to_player,
            defected,
            ..
        } => {
            let suitor = Subject::Player(to_player.clone());
            if *defected {
                out.push(Consequence::Fact {
                    scholar_id: scholar_id.clone(),
                    fact: fact(
                        year,
                        FactKind::Defected,
                        Some(suitor.clone()),
                        format!("left {} for {}", from_player, to_player),
                    ),
                });
                out.push(Consequence::Feeling {
                    scholar_id: scholar_id.clone(),
                    subject: suitor,
                    delta: 1.0,
                });
            } else {
                out.push(Consequence::Fact {
                    scholar_id: scholar_id.clone(),
                    fact: fact(
                        year,
                        FactKind::RefusedOffer,
                        Some(suitor),
                        format!("stayed with {}", from_player),
                    ),
                });
                out.push(Consequence::Feeling {
                    scholar_id: scholar_id.clone(),
                    subject: Subject::Player(from_player.clone()),
                    delta: 0.5,
                });
            }
        }
        _ => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> GameState {
        let mut state = GameState::new(1900);
        state.players.insert(
            "p1".into(),
            Player::new("p1".into(), "Ada".into(), 1900),
        );
        state.players.insert(
            "p2".into(),
            Player::new("p2".into(), "Brunel".into(), 1900),
        );
        let mut scholar = Scholar::generate("s1".into(), "Dr. Voss".into(), 5, 1900);
        scholar.patron = Some("p1".into());
        state.scholars.insert("s1".into(), scholar);
        state
    }

    #[test]
    fn test_request_json_shape() {
        let request: ActionRequest = serde_json::from_str(
            r#"{"action":"submit_theory","claim":"Atlantis","confidence":"stake_career"}"#,
        )
        .unwrap();
        assert!(matches!(
            request,
            ActionRequest::SubmitTheory {
                theory_id: None,
                confidence: Confidence::StakeCareer,
                ..
            }
        ));

        let advance: ActionRequest = serde_json::from_str(r#"{"action":"advance_year"}"#).unwrap();
        assert_eq!(advance, ActionRequest::AdvanceYear);
    }

    #[test]
    fn test_actor_required() {
        let err = ActionRequest::RecruitScholar {
            scholar_id: "s1".into(),
        }
        .into_payload(&state(), None, 1)
        .unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
    }

    #[test]
    fn test_offer_payload_is_self_consistent() {
        let state = state();
        let payload = ActionRequest::MakeOffer {
            scholar_id: "s1".into(),
            offer_quality: 0.8,
            faction_alignment: 0.5,
        }
        .into_payload(&state, Some(&"p2".into()), 42)
        .unwrap();

        check_payload(&state, Some(&"p2".into()), &payload, 42).unwrap();
        // A different campaign seed gives a different draw
        assert!(check_payload(&state, Some(&"p2".into()), &payload, 43).is_err());

        match payload {
            EventPayload::DefectionResolved {
                from_player,
                attempt,
                ..
            } => {
                assert_eq!(from_player, PlayerId::from("p1"));
                assert_eq!(attempt, 0);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_tampered_theory_stake_rejected() {
        let mut state = state();
        state.theories.insert(
            "t1".into(),
            crate::projection::Theory {
                id: "t1".into(),
                player_id: "p1".into(),
                claim: "x".into(),
                confidence: Confidence::Certain,
                submission_year: 1900,
                outcome: None,
                reputation_delta: 0,
            },
        );
        let payload = EventPayload::TheoryResolved {
            theory_id: "t1".into(),
            verified: true,
            reputation_delta: 15,
        };
        assert!(matches!(
            check_payload(&state, None, &payload, 1),
            Err(GameError::Validation(_))
        ));
    }

    #[test]
    fn test_unknown_reference_is_ordering_error() {
        let payload = EventPayload::ScholarRetired {
            scholar_id: "ghost".into(),
        };
        assert!(matches!(
            check_payload(&state(), None, &payload, 1),
            Err(GameError::Ordering(_))
        ));
    }

    #[test]
    fn test_year_skips() {
        let state = state();
        assert!(matches!(
            check_payload(&state, None, &EventPayload::YearAdvanced { year: 1900 }, 1),
            Err(GameError::Validation(_))
        ));
        assert!(matches!(
            check_payload(&state, None, &EventPayload::YearAdvanced { year: 1903 }, 1),
            Err(GameError::Ordering(_))
        ));
        check_payload(&state, None, &EventPayload::YearAdvanced { year: 1901 }, 1).unwrap();
    }

    #[test]
    fn test_refused_offer_warms_patron_feelings() {
        let state = state();
        let payload = EventPayload::DefectionResolved {
            scholar_id: "s1".into(),
            attempt: 0,
            from_player: "p1".into(),
            to_player: "p2".into(),
            inputs: defection_inputs(&state, &state.scholars[&ScholarId::from("s1")], 0.1, 0.0),
            probability: 0.1,
            draw: 0.9,
            defected: false,
        };
        let effects = consequences(&state, &payload);
        assert!(effects.contains(&Consequence::Feeling {
            scholar_id: "s1".into(),
            subject: Subject::Player("p1".into()),
            delta: 0.5,
        }));
    }
}
