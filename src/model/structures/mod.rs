pub mod ledger_event;
pub mod player_status;
