use crate::{
    error::{EngineError, Result},
    model::constants::{DEFAULT_ELO_SCALE, DEFAULT_K_FACTOR, DELTA_DECIMAL_PLACES}
};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A rating method the engine can score matches and absences with.
///
/// Implementations must be pure: the same inputs always give the same output
/// and nothing is read from or written to storage.
pub trait RatingCalculator: Send + Sync {
    /// Rating change for team A. Team B always receives the exact negation.
    fn compute_delta(&self, team_a_rating: f64, team_b_rating: f64, team_a_won: bool) -> Result<f64>;

    /// Rating change applied to a player who missed a processing cycle.
    fn absentee_adjustment(&self, demerit_magnitude: f64) -> f64 {
        -demerit_magnitude.abs()
    }
}

/// Pairwise comparison with a logistic expected outcome on a base-10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EloCalculator {
    pub k_factor: f64,
    pub scale: f64
}

impl Default for EloCalculator {
    fn default() -> Self {
        EloCalculator {
            k_factor: DEFAULT_K_FACTOR,
            scale: DEFAULT_ELO_SCALE
        }
    }
}

impl EloCalculator {
    pub fn new(k_factor: f64, scale: f64) -> EloCalculator {
        EloCalculator { k_factor, scale }
    }

    /// `E_A = 1 / (1 + 10^((R_B - R_A) / scale))`
    pub fn expected_score(&self, team_a_rating: f64, team_b_rating: f64) -> f64 {
        1.0 / (1.0 + 10f64.powf((team_b_rating - team_a_rating) / self.scale))
    }
}

impl RatingCalculator for EloCalculator {
    fn compute_delta(&self, team_a_rating: f64, team_b_rating: f64, team_a_won: bool) -> Result<f64> {
        let expected = self.expected_score(team_a_rating, team_b_rating);
        let actual = if team_a_won { 1.0 } else { 0.0 };

        round_half_up(self.k_factor * (actual - expected), DELTA_DECIMAL_PLACES)
    }
}

/// Arithmetic mean of the members' ratings.
pub fn team_rating(ratings: &[f64]) -> Result<f64> {
    if ratings.is_empty() {
        return Err(EngineError::invalid_input("cannot rate an empty team"));
    }

    Ok(ratings.iter().sum::<f64>() / ratings.len() as f64)
}

/// Rounds half away from zero on the shortest decimal representation of `value`,
/// so `1.005` becomes `1.01` rather than the `1.0` binary rounding would give.
pub fn round_half_up(value: f64, decimal_places: u32) -> Result<f64> {
    if !value.is_finite() {
        return Err(EngineError::invalid_input(format!("cannot round non-finite value {}", value)));
    }

    // Rounds to zero at this precision
    if value.abs() < 0.5 * 10f64.powi(-(decimal_places as i32)) {
        return Ok(0.0);
    }

    let decimal = Decimal::from_str(&value.to_string())
        .map_err(|e| EngineError::invalid_input(format!("cannot round {}: {}", value, e)))?;

    let rounded = decimal.round_dp_with_strategy(decimal_places, RoundingStrategy::MidpointAwayFromZero);

    f64::from_str(&rounded.to_string())
        .map_err(|e| EngineError::invalid_input(format!("cannot convert rounded {} back to f64: {}", rounded, e)))
}
