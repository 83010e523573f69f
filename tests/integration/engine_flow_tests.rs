use crate::common::init_test_env;
use approx::assert_abs_diff_eq;
use chrono::{Duration, NaiveDate};
use itertools::Itertools;
use rank_scoring_engine::{
    config::ScoringConfig,
    database::db_structs::{MatchResult, NewPlayer},
    error::EngineError,
    model::{
        constants::UNRANKED,
        processor::ScoringEngine,
        structures::{ledger_event::SentinelEvent, player_status::PlayerStatus}
    },
    store::{memory::MemoryStore, ScoreStore}
};
use std::sync::Arc;

fn season_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 6).unwrap()
}

fn week(n: i64) -> NaiveDate {
    season_start() + Duration::weeks(n)
}

async fn club(store: &MemoryStore, size: usize) -> Vec<i32> {
    let mut ids = Vec::with_capacity(size);
    for i in 1..=size {
        let player = store
            .insert_player(&NewPlayer {
                name: format!("Member {}", i),
                email: Some(format!("Member{}@Club.org", i)),
                color_hex: None,
                initial_rating: 1000.0,
                since: season_start()
            })
            .await
            .unwrap();
        ids.push(player.id);
    }

    ids
}

async fn record(store: &MemoryStore, team_a: &[i32], team_b: &[i32], date: NaiveDate, points: (i32, i32)) {
    let result = MatchResult::new(team_a, team_b, date, points.0, points.1).unwrap();
    store.insert_encounter(&result).await.unwrap();
}

/// Six members over eight weeks; member 6 plays once and drifts out of the ranking.
#[tokio::test]
async fn test_season_with_long_term_absentee() {
    init_test_env();
    let store = Arc::new(MemoryStore::new());
    let ids = club(&store, 6).await;
    let engine = ScoringEngine::with_config(Arc::clone(&store), ScoringConfig::default());

    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(store.player(6).await.unwrap().email.as_deref(), Some("member6@club.org"));

    record(&store, &[1, 2], &[3, 4], week(0), (2, 1)).await;
    record(&store, &[5], &[6], week(0), (0, 2)).await;
    let opening = engine.process_date(week(0)).await.unwrap();
    assert_eq!(opening.encounters.len(), 2);
    assert_eq!(opening.encounters[0].team_a_delta, 10.0);
    assert_eq!(opening.encounters[1].team_a_delta, -10.0);
    let rating_after_opening = store.player(6).await.unwrap().rating;

    for n in 1..=7 {
        let doubles_points = if n % 2 == 0 { (2, 0) } else { (1, 2) };
        record(&store, &[1, 2], &[3, 4], week(n), doubles_points).await;
        record(&store, &[5], &[1], week(n), (2, 1)).await;

        let report = engine.process_date(week(n)).await.unwrap();

        let ranks = report.assignments.iter().map(|a| a.rank).sorted().collect_vec();
        if n < 7 {
            // The lookback window still includes the opening week
            assert_eq!(report.absentees, vec![6], "week {}", n);
            assert!(report.deactivated.is_empty(), "week {}", n);
            assert_eq!(ranks, (1..=6).collect_vec());
        } else {
            assert!(report.absentees.is_empty());
            assert_eq!(report.deactivated, vec![6]);
            assert_eq!(ranks, (1..=5).collect_vec());
        }
    }

    let absent = store.player(6).await.unwrap();
    assert_eq!(absent.status, PlayerStatus::Disabled);
    assert_eq!(absent.rank, UNRANKED);
    assert_abs_diff_eq!(absent.rating, rating_after_opening - 30.0, epsilon = 1e-9);

    let history = store.history_for_player(6).await.unwrap();
    assert_eq!(history.len(), 8);
    assert_eq!(
        history
            .iter()
            .filter(|h| h.encounter_id == SentinelEvent::AbsenteeDemerit.encounter_id())
            .count(),
        6
    );
    let deactivation = history.last().unwrap();
    assert_eq!(deactivation.encounter_id, SentinelEvent::Deactivation.encounter_id());
    assert_eq!(deactivation.old_rating, deactivation.new_rating);

    // Every scored match moved ratings by a net zero
    let mut net = 0.0;
    for id in &ids {
        for row in store.history_for_player(*id).await.unwrap() {
            if row.is_match_linked() {
                net += row.new_rating - row.old_rating;
            }
        }
    }
    assert_abs_diff_eq!(net, 0.0, epsilon = 1e-6);

    // Ledger rows of ranked players carry the rank they ended each week with
    for id in 1..=5 {
        let rows = store.history_for_player(id).await.unwrap();
        assert!(rows.iter().all(|h| h.new_rank.is_some()), "player {}", id);
    }
}

#[tokio::test]
async fn test_reactivated_player_rejoins_ranking() {
    init_test_env();
    let store = Arc::new(MemoryStore::new());
    club(&store, 3).await;
    let engine = ScoringEngine::with_config(Arc::clone(&store), ScoringConfig::default());

    record(&store, &[1], &[3], week(0), (2, 0)).await;
    engine.process_date(week(0)).await.unwrap();
    engine.ledger().deactivate(3, week(0)).await.unwrap();
    let deactivated_rating = store.player(3).await.unwrap().rating;

    let entry = engine
        .reactivate_player(3, Some(1100.0), Some(week(1)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.old_rating, deactivated_rating);
    assert_eq!(entry.new_rating, 1100.0);
    assert_eq!(store.player(3).await.unwrap().status, PlayerStatus::Enabled);

    // A second request changes nothing
    assert!(engine
        .reactivate_player(3, Some(900.0), Some(week(1)))
        .await
        .unwrap()
        .is_none());

    record(&store, &[3], &[2], week(1), (2, 1)).await;
    let report = engine.process_date(week(1)).await.unwrap();

    let returning = store.player(3).await.unwrap();
    assert_eq!(returning.status, PlayerStatus::Active);
    assert_eq!(returning.rank, 1);
    assert!(report.assignments.iter().any(|a| a.player_id == 3 && a.rank == 1));
}

#[tokio::test]
async fn test_processed_date_is_not_reprocessed() {
    init_test_env();
    let store = Arc::new(MemoryStore::new());
    club(&store, 2).await;
    let engine = ScoringEngine::with_config(Arc::clone(&store), ScoringConfig::default());

    record(&store, &[1], &[2], week(0), (2, 0)).await;
    engine.process_date(week(0)).await.unwrap();
    let second = engine.process_date(week(0)).await;

    assert!(matches!(second, Err(EngineError::NothingToProcess { .. })));
    assert_eq!(store.player(1).await.unwrap().rating, 1010.0);
}

#[tokio::test]
async fn test_concurrent_cycles_do_not_double_score() {
    init_test_env();
    let store = Arc::new(MemoryStore::new());
    club(&store, 2).await;
    record(&store, &[1], &[2], week(0), (2, 0)).await;

    let engine = Arc::new(ScoringEngine::with_config(Arc::clone(&store), ScoringConfig::default()));
    let first = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.process_date(week(0)).await }
    });
    let second = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.process_date(week(0)).await }
    });

    let results = [first.await.unwrap(), second.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(EngineError::NothingToProcess { .. }))));
    assert_eq!(store.player(1).await.unwrap().rating, 1010.0);
    assert_eq!(store.history().await.len(), 2);
}
