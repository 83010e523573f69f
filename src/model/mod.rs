pub mod absentee;
pub mod calculator;
pub mod constants;
pub mod ledger;
pub mod processor;
pub mod ranking;
pub mod rating_system;
pub mod structures;
