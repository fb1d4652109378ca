//! Deterministic Resolution Engine
//!
//! Pure functions plus seeded draws. Nothing here reads the clock or the
//! thread RNG: every random number comes from a `StdRng` whose seed is
//! derived from the campaign seed and the thing being resolved, and every
//! draw is written into the resulting event so replay never re-rolls.
//!
//! Arguments outside their declared range are rejected, never clamped. An
//! out-of-range friction or bonus means some upstream calculation is wrong.

use crate::error::{GameError, Result};
use crate::types::{ExpeditionOutcome, FailureVariant, PreparationDepth};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// SEEDED DRAWS
// ============================================================================

/// Derive a 64-bit RNG seed from the campaign seed and a context string
pub fn derive_seed(campaign_seed: u64, context: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(campaign_seed.to_le_bytes());
    hasher.update(context.as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// d100 roll for an expedition, keyed by `(campaign_seed, expedition_id)`
pub fn expedition_roll(campaign_seed: u64, expedition_id: &str) -> i32 {
    let seed = derive_seed(campaign_seed, &format!("expedition:{}", expedition_id));
    StdRng::seed_from_u64(seed).gen_range(1..=100)
}

/// Uniform draw in [0, 1) for the `attempt`-th defection offer to a scholar
pub fn defection_draw(campaign_seed: u64, scholar_id: &str, attempt: u32) -> f64 {
    let seed = derive_seed(
        campaign_seed,
        &format!("defection:{}:{}", scholar_id, attempt),
    );
    StdRng::seed_from_u64(seed).gen::<f64>()
}

// ============================================================================
// EXPEDITIONS
// ============================================================================

pub const ROLL_RANGE: (i32, i32) = (1, 100);
pub const PREPARATION_BONUS_RANGE: (i32, i32) = (0, 30);
pub const EXPERTISE_MATCH_RANGE: (i32, i32) = (0, 15);
pub const SITE_FRICTION_RANGE: (i32, i32) = (0, 15);
pub const POLITICAL_FRICTION_RANGE: (i32, i32) = (0, 10);

/// Everything that goes into an expedition score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpeditionInputs {
    pub roll: i32,
    pub preparation_bonus: i32,
    pub expertise_match: i32,
    pub site_friction: i32,
    pub political_friction: i32,
    pub depth: PreparationDepth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpeditionResolution {
    pub score: i32,
    pub outcome: ExpeditionOutcome,
    /// Set only for failures
    pub failure_variant: Option<FailureVariant>,
}

impl ExpeditionResolution {
    /// Reputation change for the theory's owner
    pub fn reputation_delta(&self) -> i32 {
        match (self.outcome, self.failure_variant) {
            (ExpeditionOutcome::Failure, Some(FailureVariant::ComicDisaster)) => -2,
            (ExpeditionOutcome::Failure, Some(FailureVariant::ProceduralSetback)) => -1,
            (ExpeditionOutcome::Failure, Some(FailureVariant::SidewaysDiscovery)) => 1,
            (ExpeditionOutcome::Failure, None) => -1,
            (ExpeditionOutcome::Partial, _) => 1,
            (ExpeditionOutcome::Success, _) => 3,
            (ExpeditionOutcome::Landmark, _) => 5,
        }
    }

    /// How team members come to feel about the player who sent them
    pub fn team_feeling_delta(&self) -> f64 {
        match (self.outcome, self.failure_variant) {
            (ExpeditionOutcome::Failure, Some(FailureVariant::ComicDisaster)) => -1.0,
            (ExpeditionOutcome::Failure, Some(FailureVariant::SidewaysDiscovery)) => 0.5,
            (ExpeditionOutcome::Failure, _) => -0.5,
            (ExpeditionOutcome::Partial, _) => 0.5,
            (ExpeditionOutcome::Success, _) | (ExpeditionOutcome::Landmark, _) => 1.0,
        }
    }
}

fn check_range(name: &str, value: i32, (lo, hi): (i32, i32)) -> Result<()> {
    if value < lo || value > hi {
        return Err(GameError::InvalidInput(format!(
            "{} = {} is outside [{}, {}]",
            name, value, lo, hi
        )));
    }
    Ok(())
}

/// Score bands: <40 failure, 40..65 partial, 65..85 success, >=85 landmark
pub fn outcome_for_score(score: i32) -> ExpeditionOutcome {
    match score {
        s if s < 40 => ExpeditionOutcome::Failure,
        s if s < 65 => ExpeditionOutcome::Partial,
        s if s < 85 => ExpeditionOutcome::Success,
        _ => ExpeditionOutcome::Landmark,
    }
}

/// Failure table keyed on preparation depth. A lookup, not a second draw.
pub fn failure_variant(depth: PreparationDepth) -> FailureVariant {
    match depth {
        PreparationDepth::Shallow => FailureVariant::ComicDisaster,
        PreparationDepth::Standard => FailureVariant::ProceduralSetback,
        PreparationDepth::Deep => FailureVariant::SidewaysDiscovery,
    }
}

/// Range checks for everything fixed at launch time (all inputs but the roll)
pub fn check_launch_inputs(
    preparation_bonus: i32,
    expertise_match: i32,
    site_friction: i32,
    political_friction: i32,
) -> Result<()> {
    check_range("preparation_bonus", preparation_bonus, PREPARATION_BONUS_RANGE)?;
    check_range("expertise_match", expertise_match, EXPERTISE_MATCH_RANGE)?;
    check_range("site_friction", site_friction, SITE_FRICTION_RANGE)?;
    check_range("political_friction", political_friction, POLITICAL_FRICTION_RANGE)
}

pub fn resolve_expedition(inputs: &ExpeditionInputs) -> Result<ExpeditionResolution> {
    check_range("roll", inputs.roll, ROLL_RANGE)?;
    check_launch_inputs(
        inputs.preparation_bonus,
        inputs.expertise_match,
        inputs.site_friction,
        inputs.political_friction,
    )?;

    let score = inputs.roll + inputs.preparation_bonus + inputs.expertise_match
        - inputs.site_friction
        - inputs.political_friction;
    let outcome = outcome_for_score(score);
    let failure_variant = match outcome {
        ExpeditionOutcome::Failure => Some(failure_variant(inputs.depth)),
        _ => None,
    };

    Ok(ExpeditionResolution {
        score,
        outcome,
        failure_variant,
    })
}

// ============================================================================
// DEFECTION
// ============================================================================

/// Factors behind a defection offer. The four pressures are in [0, 1];
/// loyalty and integrity are raw stats in [0, 10].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DefectionInputs {
    pub offer_quality: f64,
    pub mistreatment: f64,
    pub faction_alignment: f64,
    pub plateau: f64,
    pub loyalty: u8,
    pub integrity: u8,
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(GameError::InvalidInput(format!(
            "{} = {} is outside [0, 1]",
            name, value
        )));
    }
    Ok(())
}

fn check_stat(name: &str, value: u8) -> Result<()> {
    if value > crate::types::STAT_MAX {
        return Err(GameError::InvalidInput(format!(
            "{} = {} is outside [0, {}]",
            name,
            value,
            crate::types::STAT_MAX
        )));
    }
    Ok(())
}

/// Logistic defection probability
///
/// ```text
/// x = offer + mistreatment + alignment + plateau - 0.6*loyalty/10 - 0.4*integrity/10
/// p = 1 / (1 + e^(-6(x - 0.5)))
/// ```
pub fn defection_probability(inputs: &DefectionInputs) -> Result<f64> {
    check_unit("offer_quality", inputs.offer_quality)?;
    check_unit("mistreatment", inputs.mistreatment)?;
    check_unit("faction_alignment", inputs.faction_alignment)?;
    check_unit("plateau", inputs.plateau)?;
    check_stat("loyalty", inputs.loyalty)?;
    check_stat("integrity", inputs.integrity)?;

    let x = inputs.offer_quality + inputs.mistreatment + inputs.faction_alignment + inputs.plateau
        - 0.6 * (inputs.loyalty as f64 / 10.0)
        - 0.4 * (inputs.integrity as f64 / 10.0);

    Ok(1.0 / (1.0 + (-6.0 * (x - 0.5)).exp()))
}

/// Mistreatment pressure from the scholar's feeling toward its patron.
/// A scar toward the patron is maximal mistreatment.
pub fn mistreatment_from_feeling(feeling: f64, scarred: bool) -> f64 {
    if scarred {
        return 1.0;
    }
    ((-feeling).max(0.0) / 5.0).min(1.0)
}

/// Career stagnation pressure: a decade without promotion saturates it
pub fn plateau_from_years(years_since_promotion: i32) -> f64 {
    (years_since_promotion.max(0) as f64 / 10.0).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(
        roll: i32,
        bonus: i32,
        expertise: i32,
        site: i32,
        political: i32,
        depth: PreparationDepth,
    ) -> ExpeditionInputs {
        ExpeditionInputs {
            roll,
            preparation_bonus: bonus,
            expertise_match: expertise,
            site_friction: site,
            political_friction: political,
            depth,
        }
    }

    #[test]
    fn test_success_band() {
        let r = resolve_expedition(&inputs(70, 10, 5, 5, 0, PreparationDepth::Standard)).unwrap();
        assert_eq!(r.score, 80);
        assert_eq!(r.outcome, ExpeditionOutcome::Success);
        assert_eq!(r.failure_variant, None);
    }

    #[test]
    fn test_landmark_band() {
        let r = resolve_expedition(&inputs(90, 0, 0, 0, 0, PreparationDepth::Shallow)).unwrap();
        assert_eq!(r.score, 90);
        assert_eq!(r.outcome, ExpeditionOutcome::Landmark);
    }

    #[test]
    fn test_failure_variant_follows_preparation_depth() {
        let deep = resolve_expedition(&inputs(10, 0, 0, 10, 5, PreparationDepth::Deep)).unwrap();
        assert_eq!(deep.score, -5);
        assert_eq!(deep.outcome, ExpeditionOutcome::Failure);
        assert_eq!(deep.failure_variant, Some(FailureVariant::SidewaysDiscovery));

        let shallow =
            resolve_expedition(&inputs(10, 0, 0, 10, 5, PreparationDepth::Shallow)).unwrap();
        assert_eq!(shallow.score, -5);
        assert_eq!(shallow.failure_variant, Some(FailureVariant::ComicDisaster));

        // Deep preparation pays like a partial success
        assert_eq!(deep.reputation_delta(), 1);
        assert!(shallow.reputation_delta() < 0);
    }

    #[test]
    fn test_band_edges() {
        assert_eq!(outcome_for_score(39), ExpeditionOutcome::Failure);
        assert_eq!(outcome_for_score(40), ExpeditionOutcome::Partial);
        assert_eq!(outcome_for_score(64), ExpeditionOutcome::Partial);
        assert_eq!(outcome_for_score(65), ExpeditionOutcome::Success);
        assert_eq!(outcome_for_score(84), ExpeditionOutcome::Success);
        assert_eq!(outcome_for_score(85), ExpeditionOutcome::Landmark);
    }

    #[test]
    fn test_out_of_range_inputs_are_rejected() {
        let cases = [
            inputs(0, 0, 0, 0, 0, PreparationDepth::Standard),
            inputs(101, 0, 0, 0, 0, PreparationDepth::Standard),
            inputs(50, 31, 0, 0, 0, PreparationDepth::Standard),
            inputs(50, 0, 16, 0, 0, PreparationDepth::Standard),
            inputs(50, 0, 0, -1, 0, PreparationDepth::Standard),
            inputs(50, 0, 0, 0, 11, PreparationDepth::Standard),
        ];
        for case in cases {
            let err = resolve_expedition(&case).unwrap_err();
            assert!(matches!(err, GameError::InvalidInput(_)), "{:?}", case);
        }
    }

    #[test]
    fn test_roll_is_seeded() {
        let a = expedition_roll(7, "exp-1");
        assert_eq!(a, expedition_roll(7, "exp-1"));
        assert!((1..=100).contains(&a));

        let rolls: std::collections::HashSet<i32> =
            (0..50).map(|i| expedition_roll(7, &format!("exp-{}", i))).collect();
        assert!(rolls.len() > 10, "rolls should vary across expeditions");
    }

    #[test]
    fn test_defection_draw_is_seeded() {
        let d = defection_draw(7, "s-1", 0);
        assert_eq!(d, defection_draw(7, "s-1", 0));
        assert_ne!(d, defection_draw(7, "s-1", 1));
        assert!((0.0..1.0).contains(&d));
    }

    fn offer(offer_quality: f64, mistreatment: f64) -> DefectionInputs {
        DefectionInputs {
            offer_quality,
            mistreatment,
            faction_alignment: 0.2,
            plateau: 0.1,
            loyalty: 6,
            integrity: 5,
        }
    }

    #[test]
    fn test_defection_midpoint() {
        // x = 0.5 exactly -> p = 0.5
        let p = defection_probability(&DefectionInputs {
            offer_quality: 0.5,
            mistreatment: 0.0,
            faction_alignment: 0.0,
            plateau: 0.0,
            loyalty: 0,
            integrity: 0,
        })
        .unwrap();
        assert!((p - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_defection_monotonic_in_offer_and_mistreatment() {
        let mut last = 0.0;
        for step in 0..=10 {
            let p = defection_probability(&offer(step as f64 / 10.0, 0.3)).unwrap();
            assert!(p > last);
            last = p;
        }

        let mut last = 0.0;
        for step in 0..=10 {
            let p = defection_probability(&offer(0.3, step as f64 / 10.0)).unwrap();
            assert!(p > last);
            last = p;
        }
    }

    #[test]
    fn test_loyalty_resists_defection() {
        let loyal = DefectionInputs { loyalty: 10, ..offer(0.5, 0.5) };
        let fickle = DefectionInputs { loyalty: 0, ..offer(0.5, 0.5) };
        assert!(defection_probability(&loyal).unwrap() < defection_probability(&fickle).unwrap());
    }

    #[test]
    fn test_defection_rejects_out_of_range() {
        assert!(matches!(
            defection_probability(&offer(1.2, 0.0)),
            Err(GameError::InvalidInput(_))
        ));
        assert!(matches!(
            defection_probability(&offer(0.5, -0.1)),
            Err(GameError::InvalidInput(_))
        ));
        assert!(matches!(
            defection_probability(&DefectionInputs { integrity: 11, ..offer(0.5, 0.5) }),
            Err(GameError::InvalidInput(_))
        ));
        assert!(defection_probability(&offer(f64::NAN, 0.0)).is_err());
    }

    #[test]
    fn test_pressure_derivations() {
        assert_eq!(mistreatment_from_feeling(2.0, false), 0.0);
        assert_eq!(mistreatment_from_feeling(-2.5, false), 0.5);
        assert_eq!(mistreatment_from_feeling(-40.0, false), 1.0);
        assert_eq!(mistreatment_from_feeling(3.0, true), 1.0);

        assert_eq!(plateau_from_years(0), 0.0);
        assert_eq!(plateau_from_years(4), 0.4);
        assert_eq!(plateau_from_years(25), 1.0);
    }
}
