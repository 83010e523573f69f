use crate::{
    config::ScoringConfig,
    database::db_structs::{last_match_entry, Encounter, Player, ScoreHistory},
    error::{EngineError, Result},
    model::{
        absentee::classify,
        calculator::{team_rating, RatingCalculator},
        ledger::ScoreLedger,
        ranking::{self, RankAssignment}
    },
    store::{CycleGuard, ScoreStore},
    utils::progress_utils::{hidden_progress_bar, progress_bar}
};
use chrono::{Local, NaiveDate};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc
};
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessedEncounter {
    pub encounter_id: i32,
    pub team_a_delta: f64,
    pub team_b_delta: f64
}

/// Everything one processing cycle changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub date: NaiveDate,
    pub encounters: Vec<ProcessedEncounter>,
    /// Players who received the absentee demerit
    pub absentees: Vec<i32>,
    pub deactivated: Vec<i32>,
    pub assignments: Vec<RankAssignment>,
    pub backfilled_rows: u64
}

/// Runs processing cycles and reactivations against a [`ScoreStore`].
///
/// Configuration arrives through a watch channel. Each operation takes a
/// snapshot when it starts and uses it throughout.
pub struct ScoringEngine<S: ScoreStore> {
    store: Arc<S>,
    ledger: ScoreLedger<S>,
    config: watch::Receiver<ScoringConfig>,
    show_progress: bool
}

impl<S: ScoreStore> ScoringEngine<S> {
    pub fn new(store: Arc<S>, config: watch::Receiver<ScoringConfig>) -> Self {
        Self {
            ledger: ScoreLedger::new(Arc::clone(&store)),
            store,
            config,
            show_progress: false
        }
    }

    /// An engine with a fixed configuration.
    pub fn with_config(store: Arc<S>, config: ScoringConfig) -> Self {
        let (_, rx) = watch::channel(config);
        Self::new(store, rx)
    }

    /// Draws a progress bar over the encounters of a cycle.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn ledger(&self) -> &ScoreLedger<S> {
        &self.ledger
    }

    /// The configuration a new operation would start with.
    pub fn current_config(&self) -> ScoringConfig {
        self.config.borrow().clone()
    }

    /// Scores every unprocessed encounter of `date`, settles absentees and
    /// re-ranks everyone.
    ///
    /// Each step commits on its own. A failure stops the cycle but leaves
    /// whatever already committed in place; encounters that were scored stay
    /// processed and the cycle can be run again for the rest.
    pub async fn process_date(&self, date: NaiveDate) -> Result<CycleReport> {
        let guard = self.store.lock_cycle().await?;

        let result = self.run_cycle(date).await;
        if let Err(e) = &result {
            error!("Processing cycle for {} stopped: {}", date, e);
        }

        release_after(guard, result).await
    }

    /// Reactivates a disabled player, dated today unless `date` is given.
    pub async fn reactivate_player(
        &self,
        player_id: i32,
        explicit_score: Option<f64>,
        date: Option<NaiveDate>
    ) -> Result<Option<ScoreHistory>> {
        let config = self.current_config();
        let date = date.unwrap_or_else(|| Local::now().date_naive());

        let guard = self.store.lock_cycle().await?;
        let result = self
            .ledger
            .reactivate(player_id, explicit_score, config.reactivation_penalty(), date)
            .await;

        release_after(guard, result).await
    }

    async fn run_cycle(&self, date: NaiveDate) -> Result<CycleReport> {
        let config = self.current_config();

        let encounters = self
            .store
            .encounters_on(date)
            .await?
            .into_iter()
            .filter(|e| !e.processed)
            .sorted_by_key(|e| e.id)
            .collect_vec();

        if encounters.is_empty() {
            return Err(EngineError::NothingToProcess { date });
        }

        info!("Processing {} encounters for {}", encounters.len(), date);
        let bar = if self.show_progress {
            progress_bar(encounters.len() as u64, format!("Scoring encounters for {}", date))
        } else {
            hidden_progress_bar(encounters.len() as u64)
        };

        let mut processed = Vec::with_capacity(encounters.len());
        let mut played = HashSet::new();
        for encounter in &encounters {
            let outcome = self.score_encounter(&config, encounter).await?;
            processed.push(outcome);
            played.extend(encounter.participants());
            bar.inc(1);
        }
        bar.finish_and_clear();

        let (absentees, deactivated) = self.settle_absentees(&config, date, &played).await?;

        let assignments = ranking::reassign(self.store.as_ref(), date).await?;
        let backfilled_rows = self.ledger.backfill_new_ranks(date, &assignments).await?;

        info!(
            "Cycle for {} complete: {} encounters, {} absentees, {} deactivated",
            date,
            processed.len(),
            absentees.len(),
            deactivated.len()
        );

        Ok(CycleReport {
            date,
            encounters: processed,
            absentees,
            deactivated,
            assignments,
            backfilled_rows
        })
    }

    /// Rates one encounter off the ratings committed so far this cycle.
    async fn score_encounter(&self, config: &ScoringConfig, encounter: &Encounter) -> Result<ProcessedEncounter> {
        let team_a = self.roster(encounter.id, &encounter.team_a).await?;
        let team_b = self.roster(encounter.id, &encounter.team_b).await?;

        let team_a_rating = team_rating(&team_a.iter().map(|p| p.rating).collect_vec())?;
        let team_b_rating = team_rating(&team_b.iter().map(|p| p.rating).collect_vec())?;

        let delta = config
            .rating_system
            .compute_delta(team_a_rating, team_b_rating, encounter.team_a_won())?;

        self.ledger.persist_match_result(encounter.id, delta, -delta).await?;

        info!(
            "Encounter {}: {:.2} vs {:.2}, team A {}, delta {:+.2}",
            encounter.id,
            team_a_rating,
            team_b_rating,
            if encounter.team_a_won() { "won" } else { "lost" },
            delta
        );

        Ok(ProcessedEncounter {
            encounter_id: encounter.id,
            team_a_delta: delta,
            team_b_delta: -delta
        })
    }

    async fn roster(&self, encounter_id: i32, ids: &[i32]) -> Result<Vec<Player>> {
        let players = self.store.players_by_ids(ids).await?;

        let missing = ids
            .iter()
            .filter(|id| !players.iter().any(|p| p.id == **id))
            .unique()
            .collect_vec();
        if !missing.is_empty() {
            return Err(EngineError::invalid_input(format!(
                "encounter {} references unknown players {:?}",
                encounter_id, missing
            )));
        }

        Ok(players)
    }

    /// Demerits recent absentees and deactivates long-term ones. Returns the
    /// ids of each group.
    async fn settle_absentees(
        &self,
        config: &ScoringConfig,
        date: NaiveDate,
        played: &HashSet<i32>
    ) -> Result<(Vec<i32>, Vec<i32>)> {
        let candidates = self
            .store
            .players()
            .await?
            .into_iter()
            .filter(|p| p.is_ranked() && !played.contains(&p.id))
            .collect_vec();

        let mut last_match_dates = HashMap::with_capacity(candidates.len());
        for player in &candidates {
            let history = self.store.history_for_player(player.id).await?;
            if let Some(entry) = last_match_entry(&history) {
                last_match_dates.insert(player.id, entry.event_date);
            }
        }

        let match_dates = self.store.match_dates_desc().await?;
        let classification = classify(candidates, &match_dates, &last_match_dates, config.lookback_dates);

        let demerit = config.rating_system.absentee_adjustment(config.absentee_demerit);
        let mut absentees = Vec::with_capacity(classification.recent.len());
        for player in &classification.recent {
            self.ledger.apply_absentee_demerit(player.id, demerit, date).await?;
            absentees.push(player.id);
        }

        let mut deactivated = Vec::with_capacity(classification.long_term.len());
        for player in &classification.long_term {
            self.ledger.deactivate(player.id, date).await?;
            deactivated.push(player.id);
        }

        if !absentees.is_empty() {
            info!("Applied absentee demerit {:.2} to {} players", demerit, absentees.len());
        }

        Ok((absentees, deactivated))
    }
}

/// Releases the cycle lock. The operation's own error wins over a failed release.
async fn release_after<T>(guard: Box<dyn CycleGuard + '_>, result: Result<T>) -> Result<T> {
    let released = guard.release().await;

    match result {
        Ok(value) => {
            released?;
            Ok(value)
        }
        Err(e) => {
            if let Err(release_err) = released {
                warn!("Failed to release the cycle lock: {}", release_err);
            }
            Err(e)
        }
    }
}
