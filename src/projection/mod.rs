//! Entity projections folded from the event log
//!
//! `GameState` is a pure function of (seed state, events, rules). Nothing
//! here touches the store, the clock or an RNG, and every map is a BTreeMap,
//! so two folds over the same events serialize to the same bytes.
//!
//! Applying an event is split in two:
//! - `check` reads state and rejects anything contradictory with
//!   `GameError::Consistency`
//! - `mutate` then applies the payload followed by each consequence, and
//!   cannot fail
//!
//! A rejected event therefore leaves the state exactly as it was.

pub mod expedition;
pub mod player;
pub mod scholar;
pub mod theory;

pub use expedition::Expedition;
pub use player::Player;
pub use scholar::{Career, Scholar};
pub use theory::{Theory, TheoryOutcome};

use crate::config::Rules;
use crate::error::{GameError, Result};
use crate::events::{Consequence, Event, EventPayload};
use crate::memory::{Fact, FactKind};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub current_year: i32,
    /// Id of the last event folded in (0 for the seed state)
    pub applied_through: EventId,
    pub players: BTreeMap<PlayerId, Player>,
    pub scholars: BTreeMap<ScholarId, Scholar>,
    pub theories: BTreeMap<TheoryId, Theory>,
    pub expeditions: BTreeMap<ExpeditionId, Expedition>,
}

fn missing(what: impl std::fmt::Display, event: &Event) -> GameError {
    GameError::Consistency(format!(
        "event {} ({}) references missing {}",
        event.id, event.action_type, what
    ))
}

fn contradiction(event: &Event, detail: String) -> GameError {
    GameError::Consistency(format!(
        "event {} ({}) contradicts state: {}",
        event.id, event.action_type, detail
    ))
}

impl GameState {
    /// Empty campaign opening in `start_year`
    pub fn new(start_year: i32) -> Self {
        Self {
            current_year: start_year,
            applied_through: EventId::ZERO,
            players: BTreeMap::new(),
            scholars: BTreeMap::new(),
            theories: BTreeMap::new(),
            expeditions: BTreeMap::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize for a checkpoint. JSON has no encoding for infinities or
    /// NaN, so a state holding one is refused rather than written lossily.
    pub fn to_json(&self) -> Result<String> {
        if let Some(scholar) = self.scholars.values().find(|s| !s.memory.is_finite()) {
            return Err(GameError::Consistency(format!(
                "{} holds a non-finite feeling",
                scholar.id
            )));
        }
        Ok(serde_json::to_string(self)?)
    }

    // ========================================================================
    // LOOKUPS
    // ========================================================================

    pub fn player(&self, id: &PlayerId) -> Result<&Player> {
        self.players
            .get(id)
            .ok_or_else(|| GameError::NotFound(id.key()))
    }

    pub fn scholar(&self, id: &ScholarId) -> Result<&Scholar> {
        self.scholars
            .get(id)
            .ok_or_else(|| GameError::NotFound(id.key()))
    }

    pub fn theory(&self, id: &TheoryId) -> Result<&Theory> {
        self.theories
            .get(id)
            .ok_or_else(|| GameError::NotFound(id.key()))
    }

    pub fn expedition(&self, id: &ExpeditionId) -> Result<&Expedition> {
        self.expeditions
            .get(id)
            .ok_or_else(|| GameError::NotFound(id.key()))
    }

    fn known_scholar(&self, id: &ScholarId, event: &Event) -> Result<&Scholar> {
        self.scholars.get(id).ok_or_else(|| missing(id.key(), event))
    }

    fn subject_exists(&self, subject: &Subject) -> bool {
        match subject {
            Subject::Player(id) => self.players.contains_key(id),
            Subject::Scholar(id) => self.scholars.contains_key(id),
        }
    }

    /// Snapshot of one entity at this state's offset
    pub fn snapshot(&self, entity: &EntityRef) -> Result<EntitySnapshot> {
        let state = match entity {
            EntityRef::Player(id) => EntityState::Player(self.player(id)?.clone()),
            EntityRef::Scholar(id) => EntityState::Scholar(Box::new(self.scholar(id)?.clone())),
            EntityRef::Theory(id) => EntityState::Theory(self.theory(id)?.clone()),
            EntityRef::Expedition(id) => EntityState::Expedition(self.expedition(id)?.clone()),
        };
        Ok(EntitySnapshot {
            entity: entity.clone(),
            as_of: self.applied_through,
            game_year: self.current_year,
            state,
        })
    }

    // ========================================================================
    // FOLD
    // ========================================================================

    /// Apply one event, or reject it and leave the state untouched
    pub fn apply(&mut self, event: &Event, rules: &Rules) -> Result<()> {
        self.check(event)?;
        self.mutate(event, rules);
        self.applied_through = event.id;
        debug!(event_id = %event.id, action_type = %event.action_type, "folded event");
        Ok(())
    }

    fn check(&self, event: &Event) -> Result<()> {
        if event.id <= self.applied_through {
            return Err(GameError::Consistency(format!(
                "event {} does not follow offset {}",
                event.id, self.applied_through
            )));
        }
        if event.payload.action_type() != event.action_type {
            return Err(contradiction(
                event,
                format!("payload is {}", event.payload.action_type()),
            ));
        }

        match &event.payload {
            EventPayload::PlayerRegistered { player_id, .. } => {
                if self.players.contains_key(player_id) {
                    return Err(contradiction(event, format!("{} already registered", player_id)));
                }
            }
            EventPayload::ScholarGenerated { scholar_id, .. } => {
                if self.scholars.contains_key(scholar_id) {
                    return Err(contradiction(event, format!("{} already generated", scholar_id)));
                }
            }
            EventPayload::ScholarRecruited {
                scholar_id,
                player_id,
            } => {
                let scholar = self.known_scholar(scholar_id, event)?;
                if !self.players.contains_key(player_id) {
                    return Err(missing(player_id.key(), event));
                }
                if let Some(patron) = &scholar.patron {
                    return Err(contradiction(
                        event,
                        format!("{} is already patronised by {}", scholar_id, patron),
                    ));
                }
            }
            EventPayload::ScholarPromoted { scholar_id, tier } => {
                let scholar = self.known_scholar(scholar_id, event)?;
                if scholar.career.tier.next() != Some(*tier) {
                    return Err(contradiction(
                        event,
                        format!(
                            "{} cannot move from {} to {}",
                            scholar_id,
                            scholar.career.tier.as_str(),
                            tier.as_str()
                        ),
                    ));
                }
            }
            EventPayload::ScholarRetired { scholar_id } => {
                let scholar = self.known_scholar(scholar_id, event)?;
                if scholar.retired {
                    return Err(contradiction(event, format!("{} already retired", scholar_id)));
                }
            }
            EventPayload::TheorySubmitted {
                theory_id,
                player_id,
                ..
            } => {
                if !self.players.contains_key(player_id) {
                    return Err(missing(player_id.key(), event));
                }
                if self.theories.contains_key(theory_id) {
                    return Err(contradiction(event, format!("{} already submitted", theory_id)));
                }
            }
            EventPayload::TheoryResolved { theory_id, .. } => {
                let theory = self
                    .theories
                    .get(theory_id)
                    .ok_or_else(|| missing(theory_id.key(), event))?;
                if theory.is_resolved() {
                    return Err(contradiction(event, format!("{} already resolved", theory_id)));
                }
            }
            EventPayload::ExpeditionLaunched {
                expedition_id,
                theory_id,
                team,
                ..
            } => {
                if self.expeditions.contains_key(expedition_id) {
                    return Err(contradiction(event, format!("{} already launched", expedition_id)));
                }
                if !self.theories.contains_key(theory_id) {
                    return Err(missing(theory_id.key(), event));
                }
                if let Some(member) = team.iter().find(|s| !self.scholars.contains_key(*s)) {
                    return Err(missing(member.key(), event));
                }
            }
            EventPayload::ExpeditionResolved { expedition_id, .. } => {
                let expedition = self
                    .expeditions
                    .get(expedition_id)
                    .ok_or_else(|| missing(expedition_id.key(), event))?;
                if expedition.is_resolved() {
                    return Err(contradiction(event, format!("{} already resolved", expedition_id)));
                }
            }
            EventPayload::DefectionResolved {
                scholar_id,
                attempt,
                from_player,
                to_player,
                ..
            } => {
                let scholar = self.known_scholar(scholar_id, event)?;
                for player in [from_player, to_player] {
                    if !self.players.contains_key(player) {
                        return Err(missing(player.key(), event));
                    }
                }
                if scholar.patron.as_ref() != Some(from_player) {
                    return Err(contradiction(
                        event,
                        format!("{} is not patronised by {}", scholar_id, from_player),
                    ));
                }
                if *attempt != scholar.defection_attempts {
                    return Err(contradiction(
                        event,
                        format!(
                            "offer {} to {} but {} offers recorded",
                            attempt, scholar_id, scholar.defection_attempts
                        ),
                    ));
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
                if !self.scholars.contains_key(scholar_id) {
                    return Err(missing(scholar_id.key(), event));
                }
                if !self.subject_exists(subject) {
                    return Err(missing(subject, event));
                }
            }
            EventPayload::FactRecorded { scholar_id, .. } => {
                if !self.scholars.contains_key(scholar_id) {
                    return Err(missing(scholar_id.key(), event));
                }
            }
            EventPayload::InfluenceGranted { player_id, .. }
            | EventPayload::ReputationAdjusted { player_id, .. } => {
                if !self.players.contains_key(player_id) {
                    return Err(missing(player_id.key(), event));
                }
            }
            EventPayload::YearAdvanced { year } => {
                if *year != self.current_year + 1 {
                    return Err(contradiction(
                        event,
                        format!("year {} does not follow {}", year, self.current_year),
                    ));
                }
            }
        }

        for consequence in &event.consequences {
            match consequence {
                Consequence::Reputation { player_id, .. }
                | Consequence::Influence { player_id, .. } => {
                    if !self.players.contains_key(player_id) {
                        return Err(missing(player_id.key(), event));
                    }
                }
                Consequence::Feeling { scholar_id, .. } | Consequence::Fact { scholar_id, .. } => {
                    if !self.scholars.contains_key(scholar_id) {
                        return Err(missing(scholar_id.key(), event));
                    }
                }
            }
        }
        if let Some((scholar_id, subject)) =
            self.overflowing_feeling(&event.payload, &event.consequences)
        {
            return Err(contradiction(
                event,
                format!("feeling of {} toward {} overflows", scholar_id, subject),
            ));
        }
        Ok(())
    }

    /// First (scholar, subject) pair whose feeling the payload and its
    /// consequences, applied in order, would push past the range of f64
    pub fn overflowing_feeling(
        &self,
        payload: &EventPayload,
        consequences: &[Consequence],
    ) -> Option<(ScholarId, Subject)> {
        let recorded = match payload {
            EventPayload::FeelingRecorded {
                scholar_id,
                subject,
                delta,
            } => Some((scholar_id, subject, *delta)),
            _ => None,
        };
        let derived = consequences.iter().filter_map(|c| match c {
            Consequence::Feeling {
                scholar_id,
                subject,
                delta,
            } => Some((scholar_id, subject, *delta)),
            _ => None,
        });
        let freshly_scarred = |scholar: &ScholarId, target: &Subject| {
            matches!(payload, EventPayload::ScarInflicted { scholar_id, subject, .. }
                if scholar_id == scholar && subject == target)
        };

        let mut running: BTreeMap<(&ScholarId, &Subject), f64> = BTreeMap::new();
        for (scholar_id, subject, delta) in recorded.into_iter().chain(derived) {
            let Some(scholar) = self.scholars.get(scholar_id) else {
                continue;
            };
            if scholar.memory.is_scarred(subject) || freshly_scarred(scholar_id, subject) {
                continue;
            }
            let magnitude = running
                .entry((scholar_id, subject))
                .or_insert_with(|| scholar.memory.feeling(subject));
            *magnitude += delta;
            if !magnitude.is_finite() {
                return Some((scholar_id.clone(), subject.clone()));
            }
        }
        None
    }

    fn mutate(&mut self, event: &Event, rules: &Rules) {
        let year = event.game_year;

        match &event.payload {
            EventPayload::PlayerRegistered { player_id, name } => {
                self.players.insert(
                    player_id.clone(),
                    Player::new(player_id.clone(), name.clone(), year),
                );
            }
            EventPayload::ScholarGenerated {
                scholar_id,
                name,
                seed,
            } => {
                self.scholars.insert(
                    scholar_id.clone(),
                    Scholar::generate(scholar_id.clone(), name.clone(), *seed, year),
                );
            }
            EventPayload::ScholarRecruited {
                scholar_id,
                player_id,
            } => {
                if let Some(scholar) = self.scholars.get_mut(scholar_id) {
                    scholar.patron = Some(player_id.clone());
                }
            }
            EventPayload::ScholarPromoted { scholar_id, tier } => {
                if let Some(scholar) = self.scholars.get_mut(scholar_id) {
                    scholar.career.tier = *tier;
                    scholar.career.last_promotion_year = year;
                }
            }
            EventPayload::ScholarRetired { scholar_id } => {
                if let Some(scholar) = self.scholars.get_mut(scholar_id) {
                    scholar.retired = true;
                }
            }
            EventPayload::TheorySubmitted {
                theory_id,
                player_id,
                claim,
                confidence,
            } => {
                self.theories.insert(
                    theory_id.clone(),
                    Theory {
                        id: theory_id.clone(),
                        player_id: player_id.clone(),
                        claim: claim.clone(),
                        confidence: *confidence,
                        submission_year: year,
                        outcome: None,
                        reputation_delta: 0,
                    },
                );
            }
            EventPayload::TheoryResolved {
                theory_id,
                verified,
                reputation_delta,
            } => {
                if let Some(theory) = self.theories.get_mut(theory_id) {
                    theory.outcome = Some(TheoryOutcome {
                        verified: *verified,
                        resolved_year: year,
                    });
                    theory.reputation_delta = *reputation_delta;
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
                let player_id = self
                    .theories
                    .get(theory_id)
                    .map(|t| t.player_id.clone())
                    .unwrap_or_else(|| PlayerId(String::new()));
                self.expeditions.insert(
                    expedition_id.clone(),
                    Expedition {
                        id: expedition_id.clone(),
                        theory_id: theory_id.clone(),
                        player_id,
                        preparation: *preparation,
                        team: team.clone(),
                        expertise_match: *expertise_match,
                        site_friction: *site_friction,
                        political_friction: *political_friction,
                        launch_year: year,
                        roll: None,
                        score: None,
                        outcome: None,
                        failure_variant: None,
                        discoveries: Vec::new(),
                        resolved_year: None,
                    },
                );
            }
            EventPayload::ExpeditionResolved {
                expedition_id,
                roll,
                score,
                outcome,
                failure_variant,
                discoveries,
            } => {
                if let Some(expedition) = self.expeditions.get_mut(expedition_id) {
                    expedition.roll = Some(*roll);
                    expedition.score = Some(*score);
                    expedition.outcome = Some(*outcome);
                    expedition.failure_variant = *failure_variant;
                    expedition.discoveries = discoveries.clone();
                    expedition.resolved_year = Some(year);
                }
            }
            EventPayload::DefectionResolved {
                scholar_id,
                to_player,
                defected,
                ..
            } => {
                if let Some(scholar) = self.scholars.get_mut(scholar_id) {
                    scholar.defection_attempts += 1;
                    if *defected {
                        scholar.patron = Some(to_player.clone());
                    }
                }
            }
            EventPayload::FeelingRecorded {
                scholar_id,
                subject,
                delta,
            } => {
                if let Some(scholar) = self.scholars.get_mut(scholar_id) {
                    scholar.memory.adjust_feeling(subject, *delta);
                }
            }
            EventPayload::FactRecorded { scholar_id, fact } => {
                if let Some(scholar) = self.scholars.get_mut(scholar_id) {
                    scholar.memory.record_fact(fact.clone());
                }
            }
            EventPayload::ScarInflicted {
                scholar_id,
                subject,
                trigger,
                magnitude,
            } => {
                if let Some(scholar) = self.scholars.get_mut(scholar_id) {
                    scholar.memory.inflict_scar(subject, *trigger, *magnitude, year);
                }
            }
            EventPayload::InfluenceGranted {
                player_id,
                faction,
                delta,
            } => {
                if let Some(player) = self.players.get_mut(player_id) {
                    player.adjust_influence(*faction, *delta, rules);
                }
            }
            EventPayload::ReputationAdjusted {
                player_id, delta, ..
            } => {
                if let Some(player) = self.players.get_mut(player_id) {
                    player.adjust_reputation(*delta, rules);
                }
            }
            EventPayload::YearAdvanced { year } => {
                self.current_year = *year;
                for scholar in self.scholars.values_mut() {
                    scholar.memory.decay_tick(rules);
                }
            }
        }

        for consequence in &event.consequences {
            self.apply_consequence(consequence, rules);
        }
    }

    fn apply_consequence(&mut self, consequence: &Consequence, rules: &Rules) {
        match consequence {
            Consequence::Reputation { player_id, delta } => {
                if let Some(player) = self.players.get_mut(player_id) {
                    player.adjust_reputation(*delta, rules);
                }
            }
            Consequence::Influence {
                player_id,
                faction,
                delta,
            } => {
                if let Some(player) = self.players.get_mut(player_id) {
                    player.adjust_influence(*faction, *delta, rules);
                }
            }
            Consequence::Feeling {
                scholar_id,
                subject,
                delta,
            } => {
                if let Some(scholar) = self.scholars.get_mut(scholar_id) {
                    scholar.memory.adjust_feeling(subject, *delta);
                }
            }
            Consequence::Fact { scholar_id, fact } => {
                if let Some(scholar) = self.scholars.get_mut(scholar_id) {
                    scholar.memory.record_fact(fact.clone());
                }
            }
        }
    }
}

/// Fold `events` onto `seed`. Stops at the first inconsistent event.
pub fn fold<I>(seed: GameState, events: I, rules: &Rules) -> Result<GameState>
where
    I: IntoIterator<Item = Event>,
{
    let mut state = seed;
    for event in events {
        state.apply(&event, rules)?;
    }
    Ok(state)
}

/// Fact a scholar keeps about something that happened to it this year
pub fn fact(year: i32, kind: FactKind, subject: Option<Subject>, detail: impl Into<String>) -> Fact {
    Fact {
        year,
        kind,
        subject,
        detail: detail.into(),
    }
}

// ============================================================================
// SNAPSHOTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "state", rename_all = "snake_case")]
pub enum EntityState {
    Player(Player),
    Scholar(Box<Scholar>),
    Theory(Theory),
    Expedition(Expedition),
}

/// One entity as it stood after event `as_of`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity: EntityRef,
    pub as_of: EventId,
    pub game_year: i32,
    pub state: EntityState,
}
