use super::db_structs::{Encounter, MatchResult, NewPlayer, NewScoreHistory, Player, ScoreHistory};
use crate::{
    error::{EngineError, Result},
    model::{constants::CYCLE_LOCK_KEY, structures::player_status::PlayerStatus},
    store::{CycleGuard, ScoreStore, StoreTx}
};
use async_trait::async_trait;
use chrono::NaiveDate;
use postgres_types::ToSql;
use std::{
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc
    }
};
use tokio::{
    runtime::Handle,
    sync::{Mutex, MutexGuard, OwnedMutexGuard}
};
use tokio_postgres::{error::SqlState, Client, NoTls, Row};
use tracing::{error, info, warn};

const PLAYER_COLUMNS: &str = "id, name, email, color_hex, rating, rank, best_rank, best_rank_since, status";
const ENCOUNTER_COLUMNS: &str =
    "id, team_a, team_b, date, team_a_points, team_b_points, processed, calculated_score";
const HISTORY_COLUMNS: &str = "id, player_id, encounter_id, old_rating, new_rating, old_rank, new_rank, event_date";

/// Postgres-backed store over a single connection.
///
/// A transaction holds the connection for its whole lifetime, so reads made
/// through the client wait until it commits or rolls back.
///
/// A transaction dropped outside a Tokio runtime cannot send its `ROLLBACK`.
/// The connection is then still inside the open transaction, so the client
/// refuses all further work with `InconsistentState` and has to be reconnected.
#[derive(Clone)]
pub struct DbClient {
    client: Arc<Mutex<Client>>,
    cycle: Arc<Mutex<()>>,
    abandoned: Arc<AtomicBool>
}

impl DbClient {
    // Connect to the database and return a DbClient instance
    pub async fn connect(connection_str: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(connection_str, NoTls).await?;

        // Spawn the connection object to run in the background
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("connection error: {}", e);
            }
        });

        Ok(DbClient {
            client: Arc::new(Mutex::new(client)),
            cycle: Arc::new(Mutex::new(())),
            abandoned: Arc::new(AtomicBool::new(false))
        })
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.abandoned.load(Ordering::Acquire) {
            return Err(EngineError::inconsistent(
                "connection left inside an abandoned transaction"
            ));
        }

        Ok(())
    }

    async fn connection(&self) -> Result<MutexGuard<'_, Client>> {
        let client = self.client.lock().await;
        self.ensure_usable()?;
        Ok(client)
    }

    /// Creates the tables and indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.connection()
            .await?
            .batch_execute(include_str!("schema.sql"))
            .await?;

        info!("Database schema is in place");
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<Row>> {
        Ok(self.connection().await?.query(sql, params).await?)
    }

    fn player_from_row(row: &Row) -> Result<Player> {
        let status = row.get::<_, String>("status");

        Ok(Player {
            id: row.get("id"),
            name: row.get("name"),
            email: row.get("email"),
            color_hex: row.get("color_hex"),
            rating: row.get("rating"),
            rank: row.get("rank"),
            best_rank: row.get("best_rank"),
            best_rank_since: row.get("best_rank_since"),
            status: PlayerStatus::from_str(&status)
                .map_err(|_| EngineError::inconsistent(format!("unknown player status '{}'", status)))?
        })
    }

    fn encounter_from_row(row: &Row) -> Encounter {
        Encounter {
            id: row.get("id"),
            team_a: row.get("team_a"),
            team_b: row.get("team_b"),
            date: row.get("date"),
            team_a_points: row.get("team_a_points"),
            team_b_points: row.get("team_b_points"),
            processed: row.get("processed"),
            calculated_score: row.get("calculated_score")
        }
    }

    fn history_from_row(row: &Row) -> ScoreHistory {
        ScoreHistory {
            id: row.get("id"),
            player_id: row.get("player_id"),
            encounter_id: row.get("encounter_id"),
            old_rating: row.get("old_rating"),
            new_rating: row.get("new_rating"),
            old_rank: row.get("old_rank"),
            new_rank: row.get("new_rank"),
            event_date: row.get("event_date")
        }
    }

    fn players_from_rows(rows: &[Row]) -> Result<Vec<Player>> {
        rows.iter().map(Self::player_from_row).collect()
    }
}

#[async_trait]
impl ScoreStore for DbClient {
    async fn begin(&self) -> Result<Box<dyn StoreTx + '_>> {
        let client = self.client.clone().lock_owned().await;
        self.ensure_usable()?;
        client.batch_execute("BEGIN").await?;

        Ok(Box::new(PgTransaction {
            client: Some(client),
            abandoned: Arc::clone(&self.abandoned)
        }))
    }

    async fn lock_cycle(&self) -> Result<Box<dyn CycleGuard + '_>> {
        let local = self.cycle.clone().lock_owned().await;
        self.connection()
            .await?
            .execute("SELECT pg_advisory_lock($1)", &[&CYCLE_LOCK_KEY])
            .await?;

        Ok(Box::new(PgCycleGuard {
            client: Arc::clone(&self.client),
            local: Some(local)
        }))
    }

    async fn players(&self) -> Result<Vec<Player>> {
        let rows = self
            .query(&format!("SELECT {} FROM players ORDER BY id", PLAYER_COLUMNS), &[])
            .await?;

        Self::players_from_rows(&rows)
    }

    async fn players_by_ids(&self, ids: &[i32]) -> Result<Vec<Player>> {
        let rows = self
            .query(
                &format!("SELECT {} FROM players WHERE id = ANY($1) ORDER BY id", PLAYER_COLUMNS),
                &[&ids]
            )
            .await?;

        Self::players_from_rows(&rows)
    }

    async fn encounters_on(&self, date: NaiveDate) -> Result<Vec<Encounter>> {
        let rows = self
            .query(
                &format!("SELECT {} FROM encounters WHERE date = $1 ORDER BY id", ENCOUNTER_COLUMNS),
                &[&date]
            )
            .await?;

        Ok(rows.iter().map(Self::encounter_from_row).collect())
    }

    async fn match_dates_desc(&self) -> Result<Vec<NaiveDate>> {
        let rows = self
            .query("SELECT DISTINCT date FROM encounters WHERE processed ORDER BY date DESC", &[])
            .await?;

        Ok(rows.iter().map(|row| row.get("date")).collect())
    }

    async fn history_for_player(&self, player_id: i32) -> Result<Vec<ScoreHistory>> {
        let rows = self
            .query(
                &format!(
                    "SELECT {} FROM score_history WHERE player_id = $1 ORDER BY event_date, id",
                    HISTORY_COLUMNS
                ),
                &[&player_id]
            )
            .await?;

        Ok(rows.iter().map(Self::history_from_row).collect())
    }

    async fn insert_encounter(&self, result: &MatchResult) -> Result<Encounter> {
        let sql = format!(
            "INSERT INTO encounters (team_a, team_b, date, team_a_points, team_b_points) \
            VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            ENCOUNTER_COLUMNS
        );

        let inserted = self
            .client
            .lock()
            .await
            .query_one(
                &sql,
                &[
                    &result.team_a,
                    &result.team_b,
                    &result.date,
                    &result.team_a_points,
                    &result.team_b_points
                ]
            )
            .await;

        match inserted {
            Ok(row) => Ok(Self::encounter_from_row(&row)),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => Err(EngineError::invalid_input(format!(
                "encounter {:?} vs {:?} on {} already exists",
                result.team_a, result.team_b, result.date
            ))),
            Err(e) => Err(e.into())
        }
    }

    async fn insert_player(&self, player: &NewPlayer) -> Result<Player> {
        let sql = format!(
            "WITH last AS (\
                SELECT GREATEST(COALESCE(MAX(rank), 0), 0) + 1 AS next_rank FROM players WHERE status = 'ACTIVE'\
            ) \
            INSERT INTO players (name, email, color_hex, rating, rank, best_rank, best_rank_since, status) \
            SELECT $1, LOWER($2), $3, $4, next_rank, next_rank, $5, 'ACTIVE' FROM last \
            RETURNING {}",
            PLAYER_COLUMNS
        );

        let row = self
            .client
            .lock()
            .await
            .query_one(
                &sql,
                &[
                    &player.name,
                    &player.email,
                    &player.color_hex,
                    &player.initial_rating,
                    &player.since
                ]
            )
            .await?;

        Self::player_from_row(&row)
    }
}

/// Holds the connection between `BEGIN` and `COMMIT`. Dropped without a
/// commit, it rolls back before handing the connection on.
struct PgTransaction {
    client: Option<OwnedMutexGuard<Client>>,
    abandoned: Arc<AtomicBool>
}

impl PgTransaction {
    fn client(&self) -> Result<&Client> {
        self.client
            .as_deref()
            .ok_or_else(|| EngineError::inconsistent("transaction already finished"))
    }

    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<Row>> {
        Ok(self.client()?.query(sql, params).await?)
    }

    async fn query_opt(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Option<Row>> {
        Ok(self.client()?.query_opt(sql, params).await?)
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<u64> {
        Ok(self.client()?.execute(sql, params).await?)
    }
}

#[async_trait]
impl StoreTx for PgTransaction {
    async fn encounter_for_update(&mut self, encounter_id: i32) -> Result<Option<Encounter>> {
        let row = self
            .query_opt(
                &format!("SELECT {} FROM encounters WHERE id = $1 FOR UPDATE", ENCOUNTER_COLUMNS),
                &[&encounter_id]
            )
            .await?;

        Ok(row.as_ref().map(DbClient::encounter_from_row))
    }

    async fn player_for_update(&mut self, player_id: i32) -> Result<Option<Player>> {
        let row = self
            .query_opt(
                &format!("SELECT {} FROM players WHERE id = $1 FOR UPDATE", PLAYER_COLUMNS),
                &[&player_id]
            )
            .await?;

        row.as_ref().map(DbClient::player_from_row).transpose()
    }

    async fn players_for_update(&mut self) -> Result<Vec<Player>> {
        let rows = self
            .query(&format!("SELECT {} FROM players ORDER BY id FOR UPDATE", PLAYER_COLUMNS), &[])
            .await?;

        DbClient::players_from_rows(&rows)
    }

    async fn history_for_player(&mut self, player_id: i32) -> Result<Vec<ScoreHistory>> {
        let rows = self
            .query(
                &format!(
                    "SELECT {} FROM score_history WHERE player_id = $1 ORDER BY event_date, id",
                    HISTORY_COLUMNS
                ),
                &[&player_id]
            )
            .await?;

        Ok(rows.iter().map(DbClient::history_from_row).collect())
    }

    async fn save_player(&mut self, player: &Player) -> Result<()> {
        let updated = self
            .execute(
                "UPDATE players SET rating = $2, rank = $3, best_rank = $4, best_rank_since = $5, status = $6 \
                WHERE id = $1",
                &[
                    &player.id,
                    &player.rating,
                    &player.rank,
                    &player.best_rank,
                    &player.best_rank_since,
                    &player.status.to_string()
                ]
            )
            .await?;

        if updated == 0 {
            return Err(EngineError::unknown_player(player.id));
        }

        Ok(())
    }

    async fn save_encounter(&mut self, encounter: &Encounter) -> Result<()> {
        let updated = self
            .execute(
                "UPDATE encounters SET processed = $2, calculated_score = $3 WHERE id = $1",
                &[&encounter.id, &encounter.processed, &encounter.calculated_score]
            )
            .await?;

        if updated == 0 {
            return Err(EngineError::unknown_encounter(encounter.id));
        }

        Ok(())
    }

    async fn append_history(&mut self, entry: NewScoreHistory) -> Result<ScoreHistory> {
        let encounter_id = entry.event.encounter_id();
        let row = self
            .client()?
            .query_one(
                "INSERT INTO score_history (player_id, encounter_id, old_rating, new_rating, old_rank, event_date) \
                VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
                &[
                    &entry.player_id,
                    &encounter_id,
                    &entry.old_rating,
                    &entry.new_rating,
                    &entry.old_rank,
                    &entry.event_date
                ]
            )
            .await?;

        Ok(entry.into_history(row.get("id")))
    }

    async fn backfill_new_rank(&mut self, player_id: i32, event_date: NaiveDate, new_rank: i32) -> Result<u64> {
        self.execute(
            "UPDATE score_history SET new_rank = $3 WHERE player_id = $1 AND event_date = $2",
            &[&player_id, &event_date, &new_rank]
        )
        .await
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let client = self
            .client
            .take()
            .ok_or_else(|| EngineError::inconsistent("transaction already finished"))?;

        client.batch_execute("COMMIT").await?;
        Ok(())
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };

        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = client.batch_execute("ROLLBACK").await {
                        warn!("Rollback failed: {}", e);
                    }
                });
            }
            Err(_) => {
                // Set before the guard is released so the next holder sees it
                self.abandoned.store(true, Ordering::Release);
                warn!("Transaction dropped outside a runtime, the connection is no longer usable");
                drop(client);
            }
        }
    }
}

struct PgCycleGuard {
    client: Arc<Mutex<Client>>,
    local: Option<OwnedMutexGuard<()>>
}

#[async_trait]
impl CycleGuard for PgCycleGuard {
    async fn release(mut self: Box<Self>) -> Result<()> {
        let unlocked = self
            .client
            .lock()
            .await
            .execute("SELECT pg_advisory_unlock($1)", &[&CYCLE_LOCK_KEY])
            .await;
        self.local.take();

        unlocked?;
        Ok(())
    }
}

impl Drop for PgCycleGuard {
    fn drop(&mut self) {
        let Some(local) = self.local.take() else {
            return;
        };

        if let Ok(handle) = Handle::try_current() {
            let client = Arc::clone(&self.client);
            handle.spawn(async move {
                let unlocked = client
                    .lock()
                    .await
                    .execute("SELECT pg_advisory_unlock($1)", &[&CYCLE_LOCK_KEY])
                    .await;
                if let Err(e) = unlocked {
                    warn!("Failed to release the cycle lock: {}", e);
                }
                drop(local);
            });
        }
    }
}
