use crate::{
    error::{EngineError, Result},
    model::{
        calculator::EloCalculator,
        constants::{
            DEFAULT_ABSENTEE_DEMERIT, DEFAULT_ELO_SCALE, DEFAULT_K_FACTOR, DEFAULT_LOOKBACK_DATES,
            DEFAULT_REACTIVATION_MULTIPLIER
        },
        rating_system::RatingSystem
    }
};
use serde::{Deserialize, Serialize};
use std::{env, str::FromStr};

/// Tunable scoring parameters. The engine snapshots the current value at the
/// start of every operation, so a change never rewrites past results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Rating method used to score matches and absences
    pub rating_system: RatingSystem,
    /// Magnitude of the demerit for missing a cycle
    pub absentee_demerit: f64,
    /// Number of distinct match dates that make up the long-term absence window
    pub lookback_dates: usize,
    /// Reactivated players re-enter this many demerits below their reference peer
    pub reactivation_multiplier: f64
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            rating_system: RatingSystem::Elo(EloCalculator::default()),
            absentee_demerit: DEFAULT_ABSENTEE_DEMERIT,
            lookback_dates: DEFAULT_LOOKBACK_DATES,
            reactivation_multiplier: DEFAULT_REACTIVATION_MULTIPLIER
        }
    }
}

impl ScoringConfig {
    /// Creates a scoring configuration from environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let k_factor = parse_var("SCORING_K_FACTOR", DEFAULT_K_FACTOR)?;
        let scale = parse_var("SCORING_ELO_SCALE", DEFAULT_ELO_SCALE)?;
        let system = env::var("SCORING_RATING_SYSTEM").unwrap_or_else(|_| "elo".to_string());

        let config = Self {
            rating_system: RatingSystem::from_name(&system, k_factor, scale)?,
            absentee_demerit: parse_var("SCORING_ABSENTEE_DEMERIT", DEFAULT_ABSENTEE_DEMERIT)?,
            lookback_dates: parse_var("SCORING_LOOKBACK_DATES", DEFAULT_LOOKBACK_DATES)?,
            reactivation_multiplier: parse_var("SCORING_REACTIVATION_MULTIPLIER", DEFAULT_REACTIVATION_MULTIPLIER)?
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lookback_dates == 0 {
            return Err(EngineError::Config("lookback window must cover at least one date".to_string()));
        }

        let RatingSystem::Elo(elo) = self.rating_system;
        if !(elo.k_factor.is_finite() && elo.k_factor > 0.0) {
            return Err(EngineError::Config(format!("K factor must be positive, got {}", elo.k_factor)));
        }
        if !(elo.scale.is_finite() && elo.scale > 0.0) {
            return Err(EngineError::Config(format!("Elo scale must be positive, got {}", elo.scale)));
        }

        if !self.absentee_demerit.is_finite() || !self.reactivation_multiplier.is_finite() {
            return Err(EngineError::Config("demerit settings must be finite".to_string()));
        }

        Ok(())
    }

    /// Points a reactivated player is placed below their reference peer.
    pub fn reactivation_penalty(&self) -> f64 {
        self.reactivation_multiplier * self.absentee_demerit.abs()
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| EngineError::Config(format!("{} has an invalid value '{}'", key, raw))),
        Err(_) => Ok(default)
    }
}
