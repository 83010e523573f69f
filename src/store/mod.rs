//! Storage seam between the scoring engine and its backends.
//!
//! Every mutation goes through a [`StoreTx`]: rows are re-read (and locked
//! where the backend supports it) inside the transaction before they are
//! written, and nothing is visible to other readers until [`StoreTx::commit`].
//! Dropping a transaction without committing rolls it back.

pub mod memory;

use crate::{
    database::db_structs::{Encounter, MatchResult, NewPlayer, NewScoreHistory, Player, ScoreHistory},
    error::Result
};
use async_trait::async_trait;
use chrono::NaiveDate;

#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Starts an all-or-nothing unit of work.
    async fn begin(&self) -> Result<Box<dyn StoreTx + '_>>;

    /// Serialises processing cycles against each other. Held until
    /// [`CycleGuard::release`] is awaited.
    async fn lock_cycle(&self) -> Result<Box<dyn CycleGuard + '_>>;

    async fn players(&self) -> Result<Vec<Player>>;

    /// Players for the given ids, in id order. Unknown ids are omitted.
    async fn players_by_ids(&self, ids: &[i32]) -> Result<Vec<Player>>;

    async fn encounters_on(&self, date: NaiveDate) -> Result<Vec<Encounter>>;

    /// Distinct dates of processed encounters, most recent first.
    async fn match_dates_desc(&self) -> Result<Vec<NaiveDate>>;

    async fn history_for_player(&self, player_id: i32) -> Result<Vec<ScoreHistory>>;

    /// Intake entry point: stores an unprocessed encounter.
    async fn insert_encounter(&self, result: &MatchResult) -> Result<Encounter>;

    /// Directory entry point: creates an active player placed after the
    /// current last rank.
    async fn insert_player(&self, player: &NewPlayer) -> Result<Player>;
}

#[async_trait]
pub trait StoreTx: Send {
    async fn encounter_for_update(&mut self, encounter_id: i32) -> Result<Option<Encounter>>;

    async fn player_for_update(&mut self, player_id: i32) -> Result<Option<Player>>;

    /// Every player row, locked, in id order.
    async fn players_for_update(&mut self) -> Result<Vec<Player>>;

    async fn history_for_player(&mut self, player_id: i32) -> Result<Vec<ScoreHistory>>;

    /// Writes the rating-relevant fields of `player`.
    async fn save_player(&mut self, player: &Player) -> Result<()>;

    /// Writes the processing state of `encounter`.
    async fn save_encounter(&mut self, encounter: &Encounter) -> Result<()>;

    async fn append_history(&mut self, entry: NewScoreHistory) -> Result<ScoreHistory>;

    /// Sets `new_rank` on the player's ledger rows dated `event_date`.
    /// This is the only update ever applied to ledger rows.
    async fn backfill_new_rank(&mut self, player_id: i32, event_date: NaiveDate, new_rank: i32) -> Result<u64>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait CycleGuard: Send {
    async fn release(self: Box<Self>) -> Result<()>;
}
