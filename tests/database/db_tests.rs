use rank_scoring_engine::{
    config::ScoringConfig,
    database::db_structs::MatchResult,
    error::EngineError,
    model::{processor::ScoringEngine, structures::player_status::PlayerStatus},
    store::ScoreStore
};
use serial_test::serial;
use std::sync::Arc;

use super::test_helpers::{date, TestDatabase};
use crate::common::init_test_env;

#[tokio::test]
#[serial]
async fn test_ensure_schema_is_idempotent() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");
    let client = test_db.connect().await;

    client.ensure_schema().await.expect("Schema should apply twice");

    assert!(client.players().await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn test_insert_player_ranks_after_last() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");
    let client = test_db.connect().await;

    let ids = test_db.seed_players(&client).await.expect("Failed to seed players");
    let players = client.players().await.unwrap();

    assert_eq!(players.len(), 4);
    assert_eq!(players.iter().map(|p| p.id).collect::<Vec<_>>(), ids);
    assert_eq!(players.iter().map(|p| p.rank).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    assert_eq!(players[0].best_rank, 1);
    assert_eq!(players[0].email.as_deref(), Some("testplayer1@example.com"));
    assert_eq!(players[0].status, PlayerStatus::Active);
    assert_eq!(players[3].rating, 850.0);
}

#[tokio::test]
#[serial]
async fn test_players_by_ids() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");
    let client = test_db.connect().await;
    let ids = test_db.seed_players(&client).await.expect("Failed to seed players");

    let players = client.players_by_ids(&[ids[2], 9999, ids[0]]).await.unwrap();

    assert_eq!(players.iter().map(|p| p.id).collect::<Vec<_>>(), vec![ids[0], ids[2]]);
}

#[tokio::test]
#[serial]
async fn test_duplicate_encounter_rejected() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");
    let client = test_db.connect().await;
    let ids = test_db.seed_players(&client).await.expect("Failed to seed players");

    let result = MatchResult::new(&[ids[0]], &[ids[1]], date(2024, 6, 1), 2, 0).unwrap();
    let stored = client.insert_encounter(&result).await.unwrap();
    let duplicate = client.insert_encounter(&result).await;

    assert_eq!(stored.team_a, vec![ids[0]]);
    assert!(!stored.processed);
    assert!(matches!(duplicate, Err(EngineError::InvalidInput(_))));
}

#[tokio::test]
#[serial]
async fn test_process_date() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");
    let client = Arc::new(test_db.connect().await);
    let ids = test_db.seed_players(&client).await.expect("Failed to seed players");

    // 850 beats 900
    let result = MatchResult::new(&[ids[3]], &[ids[2]], date(2024, 6, 1), 2, 1).unwrap();
    let encounter = client.insert_encounter(&result).await.unwrap();

    let engine = ScoringEngine::with_config(Arc::clone(&client), ScoringConfig::default());
    let report = engine.process_date(date(2024, 6, 1)).await.expect("Cycle should succeed");

    assert_eq!(report.encounters.len(), 1);
    assert_eq!(report.encounters[0].team_a_delta, 11.19);
    assert!(report.absentees.is_empty());

    let processed = client.encounters_on(date(2024, 6, 1)).await.unwrap();
    assert!(processed[0].processed);
    assert_eq!(processed[0].calculated_score, Some(11.19));
    assert_eq!(client.match_dates_desc().await.unwrap(), vec![date(2024, 6, 1)]);

    let raw = test_db.get_client().await.expect("Failed to get client");
    let rows = raw
        .query(
            "SELECT player_id, encounter_id, old_rank, new_rank FROM score_history ORDER BY id",
            &[]
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get::<_, i32>("player_id"), ids[3]);
    assert_eq!(rows[0].get::<_, i32>("encounter_id"), encounter.id);
    assert_eq!(rows[0].get::<_, i32>("old_rank"), 4);
    assert_eq!(rows[0].get::<_, Option<i32>>("new_rank"), Some(4));
}
