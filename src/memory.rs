//! Scholar memory: facts, feelings and scars
//!
//! - **Facts** are the permanent historical record. Append-only, never decayed.
//! - **Feelings** are signed magnitudes about a subject. Each game year they
//!   shrink by the decay factor until they hit the floor, where they stay:
//!   the grudge remains faint but real.
//! - **Scars** freeze a feeling for good. Only betrayal-class triggers create
//!   them and nothing removes them.

use crate::config::Rules;
use crate::types::{ScarTrigger, Subject};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Something that happened, as a scholar remembers it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub year: i32,
    pub kind: FactKind,
    pub subject: Option<Subject>,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    Recruited,
    Promoted,
    Expedition,
    Defected,
    RefusedOffer,
    Scarred,
    Observation,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryState {
    pub facts: Vec<Fact>,
    pub feelings: BTreeMap<Subject, f64>,
    pub scars: BTreeSet<Subject>,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_fact(&mut self, fact: Fact) {
        self.facts.push(fact);
    }

    /// Current magnitude toward a subject (0.0 if none recorded)
    pub fn feeling(&self, subject: &Subject) -> f64 {
        self.feelings.get(subject).copied().unwrap_or(0.0)
    }

    pub fn is_scarred(&self, subject: &Subject) -> bool {
        self.scars.contains(subject)
    }

    /// True when every stored magnitude is a finite number
    pub fn is_finite(&self) -> bool {
        self.feelings.values().all(|m| m.is_finite())
    }

    /// Add `delta` to an active feeling. Returns false when the subject is
    /// scarred, in which case the frozen magnitude is left alone.
    pub fn adjust_feeling(&mut self, subject: &Subject, delta: f64) -> bool {
        if self.is_scarred(subject) {
            return false;
        }
        *self.feelings.entry(subject.clone()).or_insert(0.0) += delta;
        true
    }

    /// Freeze a feeling at `magnitude`. A second scar on the same subject
    /// keeps the first magnitude; the trigger is still remembered as a fact.
    pub fn inflict_scar(
        &mut self,
        subject: &Subject,
        trigger: ScarTrigger,
        magnitude: f64,
        year: i32,
    ) {
        if self.scars.insert(subject.clone()) {
            self.feelings.insert(subject.clone(), magnitude);
        }
        self.facts.push(Fact {
            year,
            kind: FactKind::Scarred,
            subject: Some(subject.clone()),
            detail: format!("{:?}", trigger).to_lowercase(),
        });
    }

    /// One yearly decay tick over every active feeling
    pub fn decay_tick(&mut self, rules: &Rules) {
        for (subject, magnitude) in self.feelings.iter_mut() {
            if self.scars.contains(subject) {
                continue;
            }
            *magnitude = decay_magnitude(*magnitude, rules.decay_factor, rules.feeling_floor);
        }
    }
}

/// Shrink `magnitude` toward `floor` (in absolute value), keeping its sign.
/// Values already at or under the floor are returned unchanged.
pub fn decay_magnitude(magnitude: f64, factor: f64, floor: f64) -> f64 {
    let abs = magnitude.abs();
    if abs <= floor {
        return magnitude;
    }
    (abs * factor).max(floor).copysign(magnitude)
}
