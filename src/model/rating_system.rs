use crate::{
    error::{EngineError, Result},
    model::calculator::{EloCalculator, RatingCalculator}
};
use serde::{Deserialize, Serialize};

/// The rating method selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RatingSystem {
    Elo(EloCalculator)
}

impl Default for RatingSystem {
    fn default() -> Self {
        RatingSystem::Elo(EloCalculator::default())
    }
}

impl RatingSystem {
    /// Builds a rating system from its configured name.
    pub fn from_name(name: &str, k_factor: f64, scale: f64) -> Result<RatingSystem> {
        match name.to_ascii_lowercase().as_str() {
            "elo" => Ok(RatingSystem::Elo(EloCalculator::new(k_factor, scale))),
            other => Err(EngineError::Config(format!("unknown rating system '{}'", other)))
        }
    }

    fn calculator(&self) -> &dyn RatingCalculator {
        match self {
            RatingSystem::Elo(elo) => elo
        }
    }
}

impl RatingCalculator for RatingSystem {
    fn compute_delta(&self, team_a_rating: f64, team_b_rating: f64, team_a_won: bool) -> Result<f64> {
        self.calculator().compute_delta(team_a_rating, team_b_rating, team_a_won)
    }

    fn absentee_adjustment(&self, demerit_magnitude: f64) -> f64 {
        self.calculator().absentee_adjustment(demerit_magnitude)
    }
}
