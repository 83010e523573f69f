use crate::{
    database::db_structs::{last_match_entry, NewScoreHistory, Player, ScoreHistory},
    error::{EngineError, Result},
    model::{
        constants::UNRANKED,
        ranking::RankAssignment,
        structures::{
            ledger_event::{LedgerEvent, SentinelEvent},
            player_status::PlayerStatus
        }
    },
    store::{ScoreStore, StoreTx}
};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The only writer of player ratings, player status and encounter state.
///
/// Each operation is one transaction: rows are re-read inside it right before
/// they are changed, and every rating-relevant change appends exactly one
/// ledger row per player.
pub struct ScoreLedger<S: ScoreStore> {
    store: Arc<S>
}

impl<S: ScoreStore> Clone for ScoreLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store)
        }
    }
}

impl<S: ScoreStore> ScoreLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Applies a scored match to both rosters and marks the encounter processed.
    ///
    /// Roster members who were `ENABLED` become `ACTIVE` now that they played.
    pub async fn persist_match_result(
        &self,
        encounter_id: i32,
        team_a_delta: f64,
        team_b_delta: f64
    ) -> Result<Vec<ScoreHistory>> {
        let mut tx = self.store.begin().await?;

        let mut encounter = tx
            .encounter_for_update(encounter_id)
            .await?
            .ok_or_else(|| EngineError::unknown_encounter(encounter_id))?;

        if encounter.processed {
            warn!("Refusing to process encounter {} twice", encounter_id);
            return Err(EngineError::AlreadyProcessed { encounter_id });
        }

        if encounter.team_a.is_empty() || encounter.team_b.is_empty() {
            return Err(EngineError::invalid_input(format!(
                "encounter {} has an empty roster",
                encounter_id
            )));
        }

        let event = LedgerEvent::Match(encounter_id);
        let mut entries = Vec::with_capacity(encounter.team_a.len() + encounter.team_b.len());
        for (roster, delta) in [(&encounter.team_a, team_a_delta), (&encounter.team_b, team_b_delta)] {
            for &player_id in roster {
                let entry = apply_rating_change(tx.as_mut(), player_id, delta, event, encounter.date, |p| {
                    if p.status == PlayerStatus::Enabled {
                        p.status = PlayerStatus::Active;
                    }
                })
                .await?;
                entries.push(entry);
            }
        }

        encounter.calculated_score = Some(team_a_delta.abs());
        encounter.processed = true;
        tx.save_encounter(&encounter).await?;
        tx.commit().await?;

        debug!(
            "Encounter {} persisted: team A {:+.2}, team B {:+.2}",
            encounter_id, team_a_delta, team_b_delta
        );
        Ok(entries)
    }

    /// Applies the (negative) absentee adjustment to a player.
    pub async fn apply_absentee_demerit(
        &self,
        player_id: i32,
        demerit_amount: f64,
        event_date: NaiveDate
    ) -> Result<ScoreHistory> {
        let mut tx = self.store.begin().await?;
        let event = LedgerEvent::Sentinel(SentinelEvent::AbsenteeDemerit);
        let entry = apply_rating_change(tx.as_mut(), player_id, demerit_amount, event, event_date, |_| {}).await?;
        tx.commit().await?;

        debug!("Player {} absent on {}, adjusted by {}", player_id, event_date, demerit_amount);
        Ok(entry)
    }

    /// Removes a player from the ranking. Rating is unchanged.
    pub async fn deactivate(&self, player_id: i32, event_date: NaiveDate) -> Result<ScoreHistory> {
        let mut tx = self.store.begin().await?;
        let mut player = load_player(tx.as_mut(), player_id).await?;

        let old_rank = player.rank;
        player.status = PlayerStatus::Disabled;
        player.rank = UNRANKED;
        player.best_rank_since = event_date;
        tx.save_player(&player).await?;

        let entry = tx
            .append_history(NewScoreHistory {
                player_id,
                event: LedgerEvent::Sentinel(SentinelEvent::Deactivation),
                old_rating: player.rating,
                new_rating: player.rating,
                old_rank,
                event_date
            })
            .await?;
        tx.commit().await?;

        info!("Player {} deactivated on {} (was rank {})", player_id, event_date, old_rank);
        Ok(entry)
    }

    /// Returns a disabled player to the `ENABLED` state.
    ///
    /// With `explicit_score` the rating is set to it. Otherwise the rating is
    /// derived from the rank the player held after their last match: the
    /// first ranked player (in id order) currently holding that rank is the
    /// reference, falling back to the lowest rating among active players, and
    /// the player re-enters `penalty` points below it.
    ///
    /// Players who are not disabled are left alone and `None` is returned.
    pub async fn reactivate(
        &self,
        player_id: i32,
        explicit_score: Option<f64>,
        penalty: f64,
        event_date: NaiveDate
    ) -> Result<Option<ScoreHistory>> {
        let mut tx = self.store.begin().await?;
        let mut player = load_player(tx.as_mut(), player_id).await?;

        if player.status != PlayerStatus::Disabled {
            info!("Player {} is already {}, nothing to reactivate", player_id, player.status);
            return Ok(None);
        }

        let new_rating = match explicit_score {
            Some(score) if !score.is_finite() => {
                return Err(EngineError::invalid_input(format!(
                    "reactivation score {} for player {} is not a number",
                    score, player_id
                )))
            }
            Some(score) => score,
            None => derived_rating(tx.as_mut(), player_id, penalty).await?
        };

        let old_rating = player.rating;
        player.status = PlayerStatus::Enabled;
        player.rating = new_rating;
        tx.save_player(&player).await?;

        let entry = tx
            .append_history(NewScoreHistory {
                player_id,
                event: LedgerEvent::Sentinel(SentinelEvent::Reactivation),
                old_rating,
                new_rating,
                old_rank: player.rank,
                event_date
            })
            .await?;
        tx.commit().await?;

        info!(
            "Player {} reactivated on {} with rating {:.2} (was {:.2})",
            player_id, event_date, new_rating, old_rating
        );
        Ok(Some(entry))
    }

    /// Records the rank each player ended the cycle with on their ledger rows
    /// for `date`. This is the only change ever made to existing ledger rows.
    pub async fn backfill_new_ranks(&self, date: NaiveDate, assignments: &[RankAssignment]) -> Result<u64> {
        let mut tx = self.store.begin().await?;

        let mut updated = 0;
        for assignment in assignments {
            updated += tx.backfill_new_rank(assignment.player_id, date, assignment.rank).await?;
        }
        tx.commit().await?;

        debug!("Backfilled new rank on {} ledger rows for {}", updated, date);
        Ok(updated)
    }
}

async fn load_player(tx: &mut (dyn StoreTx + '_), player_id: i32) -> Result<Player> {
    tx.player_for_update(player_id)
        .await?
        .ok_or_else(|| EngineError::unknown_player(player_id))
}

/// Re-reads the player, adds `delta` to their rating, lets `adjust` touch the
/// row further, and appends the ledger row with the rank held before.
async fn apply_rating_change<F>(
    tx: &mut (dyn StoreTx + '_),
    player_id: i32,
    delta: f64,
    event: LedgerEvent,
    event_date: NaiveDate,
    adjust: F
) -> Result<ScoreHistory>
where
    F: FnOnce(&mut Player) + Send
{
    let mut player = load_player(tx, player_id).await?;

    let old_rating = player.rating;
    let old_rank = player.rank;
    player.rating = old_rating + delta;
    adjust(&mut player);
    tx.save_player(&player).await?;

    tx.append_history(NewScoreHistory {
        player_id,
        event,
        old_rating,
        new_rating: player.rating,
        old_rank,
        event_date
    })
    .await
}

async fn derived_rating(tx: &mut (dyn StoreTx + '_), player_id: i32, penalty: f64) -> Result<f64> {
    let history = tx.history_for_player(player_id).await?;
    let last_match = last_match_entry(&history).ok_or(EngineError::NoHistory { player_id })?;
    let rank_then = last_match.new_rank;

    let players = tx.players_for_update().await?;
    let ranked = players.iter().filter(|p| p.is_ranked() && p.id != player_id);

    let peer = rank_then.and_then(|rank| ranked.clone().find(|p| p.rank == rank));
    let reference = match peer {
        Some(peer) => {
            debug!("Player {} held rank {:?}, now held by player {}", player_id, rank_then, peer.id);
            peer.rating
        }
        None => ranked
            .filter(|p| p.status == PlayerStatus::Active)
            .map(|p| p.rating)
            .min_by(|a, b| a.total_cmp(b))
            .ok_or_else(|| {
                EngineError::inconsistent(format!(
                    "no active player to derive a reactivation rating for player {}",
                    player_id
                ))
            })?
    };

    Ok(reference - penalty.abs())
}
