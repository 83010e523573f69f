use crate::{
    error::{EngineError, Result},
    model::{
        constants::UNRANKED,
        structures::{ledger_event::LedgerEvent, player_status::PlayerStatus}
    }
};
use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: i32,
    /// Profile fields are owned by the player directory and never written by the engine
    pub name: String,
    pub email: Option<String>,
    pub color_hex: Option<String>,
    pub rating: f64,
    /// 1 is best. [`UNRANKED`] while disabled or not yet placed
    pub rank: i32,
    /// Numerically smallest rank ever held. [`UNRANKED`] if never ranked
    pub best_rank: i32,
    pub best_rank_since: NaiveDate,
    pub status: PlayerStatus
}

impl Player {
    pub fn is_ranked(&self) -> bool {
        self.status.is_ranked()
    }

    /// Current rank as a sort key: unranked players sort after every ranked one.
    pub fn rank_order(&self) -> i32 {
        if self.rank > 0 {
            self.rank
        } else {
            i32::MAX
        }
    }
}

/// Directory input used to create a player row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPlayer {
    pub name: String,
    pub email: Option<String>,
    pub color_hex: Option<String>,
    pub initial_rating: f64,
    pub since: NaiveDate
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encounter {
    pub id: i32,
    pub team_a: Vec<i32>,
    pub team_b: Vec<i32>,
    pub date: NaiveDate,
    pub team_a_points: i32,
    pub team_b_points: i32,
    pub processed: bool,
    /// Absolute value of the rating delta applied, set once processed
    pub calculated_score: Option<f64>
}

impl Encounter {
    /// Ties go against team A, there is no draw.
    pub fn team_a_won(&self) -> bool {
        self.team_a_points > self.team_b_points
    }

    pub fn participants(&self) -> impl Iterator<Item = i32> + '_ {
        self.team_a.iter().chain(self.team_b.iter()).copied()
    }
}

/// A validated match record handed over by the intake collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub team_a: Vec<i32>,
    pub team_b: Vec<i32>,
    pub date: NaiveDate,
    pub team_a_points: i32,
    pub team_b_points: i32
}

impl MatchResult {
    /// Deduplicates each roster (first occurrence wins) and rejects rosters
    /// the engine cannot score.
    pub fn new(
        team_a: &[i32],
        team_b: &[i32],
        date: NaiveDate,
        team_a_points: i32,
        team_b_points: i32
    ) -> Result<MatchResult> {
        let team_a = team_a.iter().copied().unique().collect_vec();
        let team_b = team_b.iter().copied().unique().collect_vec();

        if team_a.is_empty() || team_b.is_empty() {
            return Err(EngineError::invalid_input(format!("empty roster in match on {}", date)));
        }

        if team_a_points < 0 || team_b_points < 0 {
            return Err(EngineError::invalid_input(format!(
                "negative set points ({}, {}) in match on {}",
                team_a_points, team_b_points, date
            )));
        }

        if let Some(both) = team_a.iter().find(|id| team_b.contains(id)) {
            return Err(EngineError::invalid_input(format!(
                "player {} appears on both sides of the match on {}",
                both, date
            )));
        }

        Ok(MatchResult {
            team_a,
            team_b,
            date,
            team_a_points,
            team_b_points
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreHistory {
    pub id: i32,
    pub player_id: i32,
    /// Positive for a real encounter, otherwise a sentinel event id
    pub encounter_id: i32,
    pub old_rating: f64,
    pub new_rating: f64,
    /// Rank held immediately before the event
    pub old_rank: i32,
    /// Backfilled after the rank pass of the cycle
    pub new_rank: Option<i32>,
    pub event_date: NaiveDate
}

impl ScoreHistory {
    pub fn is_match_linked(&self) -> bool {
        self.encounter_id > 0
    }

    pub fn event(&self) -> Option<LedgerEvent> {
        LedgerEvent::from_encounter_id(self.encounter_id)
    }
}

/// A ledger row before the store assigns its id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewScoreHistory {
    pub player_id: i32,
    pub event: LedgerEvent,
    pub old_rating: f64,
    pub new_rating: f64,
    pub old_rank: i32,
    pub event_date: NaiveDate
}

impl NewScoreHistory {
    pub fn into_history(self, id: i32) -> ScoreHistory {
        ScoreHistory {
            id,
            player_id: self.player_id,
            encounter_id: self.event.encounter_id(),
            old_rating: self.old_rating,
            new_rating: self.new_rating,
            old_rank: self.old_rank,
            new_rank: None,
            event_date: self.event_date
        }
    }
}

/// Most recent match-linked ledger row, latest date first, then latest id.
pub fn last_match_entry(history: &[ScoreHistory]) -> Option<&ScoreHistory> {
    history
        .iter()
        .filter(|h| h.is_match_linked())
        .max_by(|a, b| a.event_date.cmp(&b.event_date).then(a.id.cmp(&b.id)))
}
