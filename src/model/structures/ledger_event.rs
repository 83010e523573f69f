use serde_repr::{Deserialize_repr, Serialize_repr};
use std::convert::TryFrom;
use strum_macros::EnumIter;

/// Reserved `encounter_id` values for ledger rows that are not linked to a match.
/// Real encounter ids are always positive.
#[derive(Deserialize_repr, Serialize_repr, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
#[repr(i32)]
pub enum SentinelEvent {
    AbsenteeDemerit = -1,
    Deactivation = -2,
    Reactivation = -3
}

impl SentinelEvent {
    pub fn encounter_id(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for SentinelEvent {
    type Error = ();

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        match v {
            -1 => Ok(SentinelEvent::AbsenteeDemerit),
            -2 => Ok(SentinelEvent::Deactivation),
            -3 => Ok(SentinelEvent::Reactivation),
            _ => Err(())
        }
    }
}

/// What caused a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerEvent {
    Match(i32),
    Sentinel(SentinelEvent)
}

impl LedgerEvent {
    pub fn encounter_id(self) -> i32 {
        match self {
            LedgerEvent::Match(id) => id,
            LedgerEvent::Sentinel(s) => s.encounter_id()
        }
    }

    pub fn from_encounter_id(id: i32) -> Option<LedgerEvent> {
        if id > 0 {
            return Some(LedgerEvent::Match(id));
        }

        SentinelEvent::try_from(id).ok().map(LedgerEvent::Sentinel)
    }
}
