use crate::database::db_structs::Player;
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{debug, info};

/// Absentees of one processing cycle, split by how long they have been away.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    /// Receive the absentee demerit only
    pub recent: Vec<Player>,
    /// Deactivated, without the demerit
    pub long_term: Vec<Player>
}

/// Partitions `candidates` into recent and long-term absentees.
///
/// `match_dates_desc` holds every distinct match date, most recent first.
/// `last_match_dates` maps a player id to the date of their latest
/// match-linked ledger row; players missing from it have never played and
/// are left out of both groups.
///
/// With fewer than `lookback` dates on record there is not enough history to
/// judge long-term absence, so everyone with match history is recent.
/// Otherwise the cutover is the `lookback`-th most recent date and anyone who
/// last played strictly before it is long-term.
pub fn classify(
    candidates: Vec<Player>,
    match_dates_desc: &[NaiveDate],
    last_match_dates: &HashMap<i32, NaiveDate>,
    lookback: usize
) -> Classification {
    let cutover = cutover_date(match_dates_desc, lookback);
    if cutover.is_none() {
        info!(
            "Only {} match dates recorded, not enough to deactivate anyone",
            match_dates_desc.len()
        );
    }

    let mut classification = Classification::default();
    for player in candidates {
        let Some(last_played) = last_match_dates.get(&player.id) else {
            debug!("Player {} has no match history, skipping", player.id);
            continue;
        };

        match cutover {
            Some(cutover) if *last_played < cutover => classification.long_term.push(player),
            _ => classification.recent.push(player)
        }
    }

    classification
}

/// The `lookback`-th most recent match date, if that many exist.
pub fn cutover_date(match_dates_desc: &[NaiveDate], lookback: usize) -> Option<NaiveDate> {
    if lookback == 0 || match_dates_desc.len() < lookback {
        return None;
    }

    match_dates_desc.get(lookback - 1).copied()
}
