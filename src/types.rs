//! Core vocabulary shared by events, projections and resolution
//!
//! Identifiers are string newtypes so that ids generated by collaborators
//! (command handlers, fixtures) and by the engine (`uuid` v4) look the same
//! in the log.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Fresh random id
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Entity key used for causal ordering checks
            pub fn key(&self) -> String {
                format!("{}:{}", $prefix, self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// A human player
    PlayerId,
    "player"
);
string_id!(
    /// A generated scholar character
    ScholarId,
    "scholar"
);
string_id!(
    /// A submitted theory
    TheoryId,
    "theory"
);
string_id!(
    /// A launched expedition
    ExpeditionId,
    "expedition"
);

/// Sequence number of an event in the log (1-based, strictly increasing)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EventId(pub i64);

impl EventId {
    /// Offset of a state that has applied nothing yet
    pub const ZERO: EventId = EventId(0);

    pub fn next(self) -> EventId {
        EventId(self.0 + 1)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who a feeling is about: a player or another scholar.
///
/// Serialized as `player:<id>` / `scholar:<id>` so it can key JSON maps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Subject {
    Player(PlayerId),
    Scholar(ScholarId),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Player(id) => write!(f, "{}", id.key()),
            Subject::Scholar(id) => write!(f, "{}", id.key()),
        }
    }
}

impl From<Subject> for String {
    fn from(subject: Subject) -> Self {
        subject.to_string()
    }
}

impl TryFrom<String> for Subject {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.split_once(':') {
            Some(("player", id)) if !id.is_empty() => Ok(Subject::Player(id.into())),
            Some(("scholar", id)) if !id.is_empty() => Ok(Subject::Scholar(id.into())),
            _ => Err(format!("invalid subject '{}'", value)),
        }
    }
}

/// The five political blocs players court
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Faction {
    Academia,
    Government,
    Industry,
    Religion,
    Foreign,
}

impl Faction {
    pub const ALL: [Faction; 5] = [
        Faction::Academia,
        Faction::Government,
        Faction::Industry,
        Faction::Religion,
        Faction::Foreign,
    ];
}

/// How much a player stakes on a theory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Suspect,
    Certain,
    StakeCareer,
}

impl Confidence {
    /// Reputation change when the theory is verified or refuted
    pub fn reputation_delta(&self, verified: bool) -> i32 {
        match (self, verified) {
            (Confidence::Suspect, true) => 2,
            (Confidence::Suspect, false) => -1,
            (Confidence::Certain, true) => 5,
            (Confidence::Certain, false) => -7,
            (Confidence::StakeCareer, true) => 15,
            (Confidence::StakeCareer, false) => -25,
        }
    }
}

/// Scholar attributes, each in 0..=10
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatName {
    Talent,
    Reliability,
    Integrity,
    Theatrics,
    Loyalty,
    Ambition,
}

impl StatName {
    pub const ALL: [StatName; 6] = [
        StatName::Talent,
        StatName::Reliability,
        StatName::Integrity,
        StatName::Theatrics,
        StatName::Loyalty,
        StatName::Ambition,
    ];
}

/// Highest value any stat may hold
pub const STAT_MAX: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CareerTier {
    Apprentice,
    Fellow,
    Reader,
    Professor,
}

impl CareerTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CareerTier::Apprentice => "apprentice",
            CareerTier::Fellow => "fellow",
            CareerTier::Reader => "reader",
            CareerTier::Professor => "professor",
        }
    }

    /// The tier below this one, if any
    pub fn previous(&self) -> Option<CareerTier> {
        match self {
            CareerTier::Apprentice => None,
            CareerTier::Fellow => Some(CareerTier::Apprentice),
            CareerTier::Reader => Some(CareerTier::Fellow),
            CareerTier::Professor => Some(CareerTier::Reader),
        }
    }

    /// The tier a promotion leads to, if any
    pub fn next(&self) -> Option<CareerTier> {
        match self {
            CareerTier::Apprentice => Some(CareerTier::Fellow),
            CareerTier::Fellow => Some(CareerTier::Reader),
            CareerTier::Reader => Some(CareerTier::Professor),
            CareerTier::Professor => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CareerTrack {
    Academia,
    Industry,
}

/// How thoroughly an expedition was prepared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreparationDepth {
    Shallow,
    Standard,
    Deep,
}

/// Expedition preparation as declared at launch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preparation {
    pub depth: PreparationDepth,
    /// 0..=30
    pub bonus: i32,
}

/// Outcome band of an expedition score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpeditionOutcome {
    Failure,
    Partial,
    Success,
    Landmark,
}

/// Flavour of a failed expedition, chosen by preparation depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureVariant {
    /// Shallow preparation: a low-value, embarrassing mess
    ComicDisaster,
    /// Standard preparation: nothing found, nothing lost
    ProceduralSetback,
    /// Deep preparation: an unrelated finding worth about a partial success
    SidewaysDiscovery,
}

/// Events that can scar a scholar's feelings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScarTrigger {
    Betrayal,
    CreditTheft,
    Sabotage,
}

/// Lookup key for projections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Scholar,
    Theory,
    Expedition,
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "player" => Ok(EntityKind::Player),
            "scholar" => Ok(EntityKind::Scholar),
            "theory" => Ok(EntityKind::Theory),
            "expedition" => Ok(EntityKind::Expedition),
            other => Err(format!("unknown entity kind '{}'", other)),
        }
    }
}

/// Reference to one projected entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum EntityRef {
    Player(PlayerId),
    Scholar(ScholarId),
    Theory(TheoryId),
    Expedition(ExpeditionId),
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: &str) -> Self {
        match kind {
            EntityKind::Player => EntityRef::Player(id.into()),
            EntityKind::Scholar => EntityRef::Scholar(id.into()),
            EntityKind::Theory => EntityRef::Theory(id.into()),
            EntityKind::Expedition => EntityRef::Expedition(id.into()),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Player(id) => write!(f, "{}", id.key()),
            EntityRef::Scholar(id) => write!(f, "{}", id.key()),
            EntityRef::Theory(id) => write!(f, "{}", id.key()),
            EntityRef::Expedition(id) => write!(f, "{}", id.key()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_stakes() {
        assert_eq!(Confidence::Suspect.reputation_delta(true), 2);
        assert_eq!(Confidence::Suspect.reputation_delta(false), -1);
        assert_eq!(Confidence::Certain.reputation_delta(false), -7);
        assert_eq!(Confidence::StakeCareer.reputation_delta(true), 15);
        assert_eq!(Confidence::StakeCareer.reputation_delta(false), -25);
    }

    #[test]
    fn test_career_ladder_ends_at_professor() {
        assert_eq!(CareerTier::Apprentice.next(), Some(CareerTier::Fellow));
        assert_eq!(CareerTier::Reader.next(), Some(CareerTier::Professor));
        assert_eq!(CareerTier::Professor.next(), None);
    }

    #[test]
    fn test_entity_keys() {
        let id = ExpeditionId::from("e-1");
        assert_eq!(id.key(), "expedition:e-1");
        assert_eq!(EntityRef::Expedition(id).to_string(), "expedition:e-1");
        assert_eq!(Subject::Player("p".into()).to_string(), "player:p");
    }

    #[test]
    fn test_entity_kind_parse() {
        assert_eq!("Scholar".parse::<EntityKind>(), Ok(EntityKind::Scholar));
        assert!("dragon".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Confidence::StakeCareer).unwrap(), "\"stake_career\"");
        assert_eq!(serde_json::to_string(&Faction::Religion).unwrap(), "\"religion\"");
        let subject: Subject = serde_json::from_str(r#""scholar:s-9""#).unwrap();
        assert_eq!(subject, Subject::Scholar("s-9".into()));
        assert!(serde_json::from_str::<Subject>(r#""dragon:s-9""#).is_err());

        let mut feelings = std::collections::BTreeMap::new();
        feelings.insert(Subject::Player("p-1".into()), -2.5);
        let json = serde_json::to_string(&feelings).unwrap();
        assert_eq!(json, r#"{"player:p-1":-2.5}"#);
    }
}
