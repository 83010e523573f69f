use chrono::NaiveDate;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Failures surfaced by the scoring engine. Every variant names the
/// offending identifier so an operator can act on it.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Encounter {encounter_id} has already been processed")]
    AlreadyProcessed { encounter_id: i32 },

    #[error("No unprocessed encounters found for {date}")]
    NothingToProcess { date: NaiveDate },

    #[error("Player {player_id} has no match history and no explicit score was given")]
    NoHistory { player_id: i32 },

    #[error("Inconsistent state: {0}")]
    InconsistentState(String),

    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error)
}

impl EngineError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn inconsistent(msg: impl Into<String>) -> Self {
        Self::InconsistentState(msg.into())
    }

    pub fn unknown_player(player_id: i32) -> Self {
        Self::InvalidInput(format!("player {} does not exist", player_id))
    }

    pub fn unknown_encounter(encounter_id: i32) -> Self {
        Self::InvalidInput(format!("encounter {} does not exist", encounter_id))
    }
}
