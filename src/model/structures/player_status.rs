use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// Stored as upper-case text in the `players.status` column.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerStatus {
    /// Ranked and playing
    Active,
    /// Reactivated, ranked on the next pass but has not played since
    Enabled,
    /// Removed from the ranking
    Disabled
}

impl PlayerStatus {
    /// Whether the player takes part in rank assignment.
    pub fn is_ranked(&self) -> bool {
        *self != PlayerStatus::Disabled
    }
}
