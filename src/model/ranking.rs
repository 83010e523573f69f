use crate::{database::db_structs::Player, error::Result, store::ScoreStore};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankAssignment {
    pub player_id: i32,
    pub previous_rank: i32,
    pub rank: i32,
    /// The new rank beat the player's best
    pub new_best: bool
}

/// Assigns dense ranks `1..=N` to every non-disabled player in `players`.
///
/// Order is rating descending, then current rank ascending (unranked last),
/// then id, so repeated runs over unchanged inputs agree. Best ranks that
/// improve are stamped with `date`. Disabled players are left untouched.
pub fn assign_ranks(players: &mut [Player], date: NaiveDate) -> Vec<RankAssignment> {
    let mut order = players
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_ranked())
        .map(|(i, _)| i)
        .collect::<Vec<_>>();

    order.sort_by(|&a, &b| {
        let (a, b) = (&players[a], &players[b]);
        b.rating
            .total_cmp(&a.rating)
            .then(a.rank_order().cmp(&b.rank_order()))
            .then(a.id.cmp(&b.id))
    });

    let mut assignments = Vec::with_capacity(order.len());
    for (position, idx) in order.into_iter().enumerate() {
        let player = &mut players[idx];
        let rank = position as i32 + 1;
        let previous_rank = player.rank;

        let new_best = player.best_rank <= 0 || rank < player.best_rank;
        if new_best {
            player.best_rank = rank;
            player.best_rank_since = date;
        }
        player.rank = rank;

        assignments.push(RankAssignment {
            player_id: player.id,
            previous_rank,
            rank,
            new_best
        });
    }

    assignments
}

/// Recomputes the ranking over every stored player in one transaction and
/// writes back every ranked row, changed or not.
pub async fn reassign<S: ScoreStore + ?Sized>(store: &S, date: NaiveDate) -> Result<Vec<RankAssignment>> {
    let mut tx = store.begin().await?;
    let mut players = tx.players_for_update().await?;

    let assignments = assign_ranks(&mut players, date);

    for player in players.iter().filter(|p| p.is_ranked()) {
        tx.save_player(player).await?;
    }
    tx.commit().await?;

    for assignment in assignments.iter().filter(|a| a.new_best) {
        debug!("Player {} reached a new best rank {}", assignment.player_id, assignment.rank);
    }
    info!("Assigned ranks to {} players for {}", assignments.len(), date);

    Ok(assignments)
}
