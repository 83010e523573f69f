use crate::{
    database::db_structs::{Encounter, MatchResult, NewPlayer, NewScoreHistory, Player, ScoreHistory},
    error::{EngineError, Result},
    model::structures::player_status::PlayerStatus,
    store::{CycleGuard, ScoreStore, StoreTx}
};
use async_trait::async_trait;
use chrono::NaiveDate;
use itertools::Itertools;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    players: BTreeMap<i32, Player>,
    encounters: BTreeMap<i32, Encounter>,
    history: Vec<ScoreHistory>,
    last_player_id: i32,
    last_encounter_id: i32,
    last_history_id: i32
}

impl MemoryState {
    fn next_id(counter: &mut i32) -> i32 {
        *counter += 1;
        *counter
    }

    fn history_for_player(&self, player_id: i32) -> Vec<ScoreHistory> {
        self.history
            .iter()
            .filter(|h| h.player_id == player_id)
            .cloned()
            .collect()
    }
}

/// Process-local store. A transaction works on a copy of the whole state while
/// holding the state lock, and swaps the copy in on commit.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    cycle: Arc<Mutex<()>>
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Inserts a player row verbatim, keeping its id.
    pub async fn seed_player(&self, player: Player) {
        let mut state = self.state.lock().await;
        state.last_player_id = state.last_player_id.max(player.id);
        state.players.insert(player.id, player);
    }

    /// Inserts an encounter row verbatim, keeping its id.
    pub async fn seed_encounter(&self, encounter: Encounter) {
        let mut state = self.state.lock().await;
        state.last_encounter_id = state.last_encounter_id.max(encounter.id);
        state.encounters.insert(encounter.id, encounter);
    }

    /// Inserts a ledger row verbatim, keeping its id.
    pub async fn seed_history(&self, entry: ScoreHistory) {
        let mut state = self.state.lock().await;
        state.last_history_id = state.last_history_id.max(entry.id);
        state.history.push(entry);
    }

    pub async fn player(&self, player_id: i32) -> Option<Player> {
        self.state.lock().await.players.get(&player_id).cloned()
    }

    pub async fn encounter(&self, encounter_id: i32) -> Option<Encounter> {
        self.state.lock().await.encounters.get(&encounter_id).cloned()
    }

    /// Every ledger row in insertion order.
    pub async fn history(&self) -> Vec<ScoreHistory> {
        self.state.lock().await.history.clone()
    }
}

#[async_trait]
impl ScoreStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx + '_>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();

        Ok(Box::new(MemoryTx { guard, working }))
    }

    async fn lock_cycle(&self) -> Result<Box<dyn CycleGuard + '_>> {
        let guard = self.cycle.clone().lock_owned().await;

        Ok(Box::new(MemoryCycleGuard { _guard: guard }))
    }

    async fn players(&self) -> Result<Vec<Player>> {
        Ok(self.state.lock().await.players.values().cloned().collect())
    }

    async fn players_by_ids(&self, ids: &[i32]) -> Result<Vec<Player>> {
        let state = self.state.lock().await;

        Ok(ids
            .iter()
            .unique()
            .sorted()
            .filter_map(|id| state.players.get(id).cloned())
            .collect())
    }

    async fn encounters_on(&self, date: NaiveDate) -> Result<Vec<Encounter>> {
        Ok(self
            .state
            .lock()
            .await
            .encounters
            .values()
            .filter(|e| e.date == date)
            .cloned()
            .collect())
    }

    async fn match_dates_desc(&self) -> Result<Vec<NaiveDate>> {
        Ok(self
            .state
            .lock()
            .await
            .encounters
            .values()
            .filter(|e| e.processed)
            .map(|e| e.date)
            .unique()
            .sorted_by(|a, b| b.cmp(a))
            .collect())
    }

    async fn history_for_player(&self, player_id: i32) -> Result<Vec<ScoreHistory>> {
        Ok(self.state.lock().await.history_for_player(player_id))
    }

    async fn insert_encounter(&self, result: &MatchResult) -> Result<Encounter> {
        let mut state = self.state.lock().await;

        let duplicate = state
            .encounters
            .values()
            .any(|e| e.date == result.date && e.team_a == result.team_a && e.team_b == result.team_b);
        if duplicate {
            return Err(EngineError::invalid_input(format!(
                "encounter {:?} vs {:?} on {} already exists",
                result.team_a, result.team_b, result.date
            )));
        }

        let encounter = Encounter {
            id: MemoryState::next_id(&mut state.last_encounter_id),
            team_a: result.team_a.clone(),
            team_b: result.team_b.clone(),
            date: result.date,
            team_a_points: result.team_a_points,
            team_b_points: result.team_b_points,
            processed: false,
            calculated_score: None
        };
        state.encounters.insert(encounter.id, encounter.clone());

        Ok(encounter)
    }

    async fn insert_player(&self, player: &NewPlayer) -> Result<Player> {
        let mut state = self.state.lock().await;

        let last_rank = state
            .players
            .values()
            .filter(|p| p.status == PlayerStatus::Active)
            .map(|p| p.rank)
            .max()
            .unwrap_or(0)
            .max(0);

        let created = Player {
            id: MemoryState::next_id(&mut state.last_player_id),
            name: player.name.clone(),
            email: player.email.as_ref().map(|e| e.to_lowercase()),
            color_hex: player.color_hex.clone(),
            rating: player.initial_rating,
            rank: last_rank + 1,
            best_rank: last_rank + 1,
            best_rank_since: player.since,
            status: PlayerStatus::Active
        };
        state.players.insert(created.id, created.clone());

        Ok(created)
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn encounter_for_update(&mut self, encounter_id: i32) -> Result<Option<Encounter>> {
        Ok(self.working.encounters.get(&encounter_id).cloned())
    }

    async fn player_for_update(&mut self, player_id: i32) -> Result<Option<Player>> {
        Ok(self.working.players.get(&player_id).cloned())
    }

    async fn players_for_update(&mut self) -> Result<Vec<Player>> {
        Ok(self.working.players.values().cloned().collect())
    }

    async fn history_for_player(&mut self, player_id: i32) -> Result<Vec<ScoreHistory>> {
        Ok(self.working.history_for_player(player_id))
    }

    async fn save_player(&mut self, player: &Player) -> Result<()> {
        match self.working.players.get_mut(&player.id) {
            Some(existing) => {
                existing.rating = player.rating;
                existing.rank = player.rank;
                existing.best_rank = player.best_rank;
                existing.best_rank_since = player.best_rank_since;
                existing.status = player.status;
                Ok(())
            }
            None => Err(EngineError::unknown_player(player.id))
        }
    }

    async fn save_encounter(&mut self, encounter: &Encounter) -> Result<()> {
        match self.working.encounters.get_mut(&encounter.id) {
            Some(existing) => {
                existing.processed = encounter.processed;
                existing.calculated_score = encounter.calculated_score;
                Ok(())
            }
            None => Err(EngineError::unknown_encounter(encounter.id))
        }
    }

    async fn append_history(&mut self, entry: NewScoreHistory) -> Result<ScoreHistory> {
        let id = MemoryState::next_id(&mut self.working.last_history_id);
        let row = entry.into_history(id);
        self.working.history.push(row.clone());

        Ok(row)
    }

    async fn backfill_new_rank(&mut self, player_id: i32, event_date: NaiveDate, new_rank: i32) -> Result<u64> {
        let mut updated = 0;
        for row in self
            .working
            .history
            .iter_mut()
            .filter(|h| h.player_id == player_id && h.event_date == event_date)
        {
            row.new_rank = Some(new_rank);
            updated += 1;
        }

        Ok(updated)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;

        Ok(())
    }
}

struct MemoryCycleGuard {
    _guard: OwnedMutexGuard<()>
}

#[async_trait]
impl CycleGuard for MemoryCycleGuard {
    async fn release(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
