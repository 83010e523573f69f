use rank_scoring_engine::{
    config::ScoringConfig,
    database::db_structs::MatchResult,
    error::EngineError,
    model::processor::ScoringEngine,
    store::ScoreStore
};
use serial_test::serial;
use std::sync::Arc;

use super::test_helpers::{date, TestDatabase};
use crate::common::init_test_env;

#[tokio::test]
#[serial]
async fn test_uncommitted_transaction_rolls_back() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");
    let client = test_db.connect().await;
    let ids = test_db.seed_players(&client).await.expect("Failed to seed players");

    {
        let mut tx = client.begin().await.unwrap();
        let mut player = tx.player_for_update(ids[0]).await.unwrap().unwrap();
        player.rating = 5000.0;
        tx.save_player(&player).await.unwrap();
    }

    let players = client.players().await.unwrap();
    assert_eq!(players[0].rating, 1000.0);
}

#[tokio::test]
#[serial]
async fn test_transaction_dropped_off_runtime_disables_client() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");
    let client = test_db.connect().await;
    let ids = test_db.seed_players(&client).await.expect("Failed to seed players");

    let mut tx = client.begin().await.unwrap();
    let mut player = tx.player_for_update(ids[0]).await.unwrap().unwrap();
    player.rating = 5000.0;
    tx.save_player(&player).await.unwrap();

    // No runtime on a plain thread, so no rollback can be sent
    std::thread::scope(|s| {
        s.spawn(move || drop(tx));
    });

    assert!(matches!(client.players().await, Err(EngineError::InconsistentState(_))));
    assert!(matches!(client.begin().await, Err(EngineError::InconsistentState(_))));

    let raw = test_db.get_client().await.expect("Failed to get client");
    let rating: f64 = raw
        .query_one("SELECT rating FROM players WHERE id = $1", &[&ids[0]])
        .await
        .unwrap()
        .get(0);
    assert_eq!(rating, 1000.0);
}

#[tokio::test]
#[serial]
async fn test_committed_transaction_is_visible() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");
    let client = test_db.connect().await;
    let ids = test_db.seed_players(&client).await.expect("Failed to seed players");

    let mut tx = client.begin().await.unwrap();
    let mut player = tx.player_for_update(ids[1]).await.unwrap().unwrap();
    player.rating = 1234.5;
    tx.save_player(&player).await.unwrap();
    tx.commit().await.unwrap();

    let raw = test_db.get_client().await.expect("Failed to get client");
    let rating: f64 = raw
        .query_one("SELECT rating FROM players WHERE id = $1", &[&ids[1]])
        .await
        .unwrap()
        .get(0);
    assert_eq!(rating, 1234.5);
}

#[tokio::test]
#[serial]
async fn test_failed_encounter_keeps_earlier_commits() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");
    let client = Arc::new(test_db.connect().await);
    let ids = test_db.seed_players(&client).await.expect("Failed to seed players");

    let good = MatchResult::new(&[ids[0]], &[ids[1]], date(2024, 6, 1), 2, 0).unwrap();
    let bad = MatchResult::new(&[ids[2]], &[9999], date(2024, 6, 1), 2, 0).unwrap();
    let good = client.insert_encounter(&good).await.unwrap();
    client.insert_encounter(&bad).await.unwrap();

    let engine = ScoringEngine::with_config(Arc::clone(&client), ScoringConfig::default());
    let result = engine.process_date(date(2024, 6, 1)).await;

    assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    let encounters = client.encounters_on(date(2024, 6, 1)).await.unwrap();
    assert!(encounters.iter().find(|e| e.id == good.id).unwrap().processed);
    assert_eq!(encounters.iter().filter(|e| e.processed).count(), 1);
    assert!(client.players().await.unwrap()[0].rating > 1000.0);
}

#[tokio::test]
#[serial]
async fn test_cycle_lock_across_connections() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");
    let first_client = Arc::new(test_db.connect().await);
    let second_client = Arc::new(test_db.connect().await);
    let ids = test_db.seed_players(&first_client).await.expect("Failed to seed players");

    let result = MatchResult::new(&[ids[0], ids[1]], &[ids[2], ids[3]], date(2024, 6, 1), 1, 2).unwrap();
    first_client.insert_encounter(&result).await.unwrap();

    let first = ScoringEngine::with_config(first_client, ScoringConfig::default());
    let second = ScoringEngine::with_config(Arc::clone(&second_client), ScoringConfig::default());
    let (a, b) = tokio::join!(
        first.process_date(date(2024, 6, 1)),
        second.process_date(date(2024, 6, 1))
    );

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(EngineError::NothingToProcess { .. }))));

    let raw = test_db.get_client().await.expect("Failed to get client");
    let history_rows: i64 = raw
        .query_one("SELECT COUNT(*) FROM score_history WHERE encounter_id > 0", &[])
        .await
        .unwrap()
        .get(0);
    assert_eq!(history_rows, 4);
}
