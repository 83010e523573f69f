use crate::{
    database::db_structs::{Encounter, Player, ScoreHistory},
    model::{constants::UNRANKED, structures::player_status::PlayerStatus}
};
use chrono::{Duration, NaiveDate};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("Expected a valid calendar date")
}

/// An active player whose best rank equals the given rank.
pub fn generate_player(id: i32, rating: f64, rank: i32) -> Player {
    Player {
        id,
        name: format!("Player {}", id),
        email: Some(format!("player{}@example.com", id)),
        color_hex: Some("1f77b4".to_string()),
        rating,
        rank,
        best_rank: if rank > 0 { rank } else { UNRANKED },
        best_rank_since: date(2024, 1, 1),
        status: PlayerStatus::Active
    }
}

pub fn generate_disabled_player(id: i32, rating: f64, best_rank: i32) -> Player {
    Player {
        rank: UNRANKED,
        best_rank,
        status: PlayerStatus::Disabled,
        ..generate_player(id, rating, UNRANKED)
    }
}

pub fn generate_encounter(id: i32, team_a: &[i32], team_b: &[i32], date: NaiveDate, points: (i32, i32)) -> Encounter {
    Encounter {
        id,
        team_a: team_a.to_vec(),
        team_b: team_b.to_vec(),
        date,
        team_a_points: points.0,
        team_b_points: points.1,
        processed: false,
        calculated_score: None
    }
}

/// A ledger row with no rating change, ranked 1 before and after.
pub fn generate_history(id: i32, player_id: i32, encounter_id: i32, event_date: NaiveDate) -> ScoreHistory {
    ScoreHistory {
        id,
        player_id,
        encounter_id,
        old_rating: 1000.0,
        new_rating: 1000.0,
        old_rank: 1,
        new_rank: Some(1),
        event_date
    }
}

/// `n` weekly dates starting at `start`, most recent first.
pub fn generate_weekly_dates_desc(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut dates = (0..n)
        .map(|i| start + Duration::weeks(i as i64))
        .collect::<Vec<_>>();
    dates.reverse();

    dates
}

/// Reproducible ratings in a realistic club range.
pub fn generate_ratings(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    (0..n).map(|_| rng.random_range(800.0..=2200.0)).collect()
}
