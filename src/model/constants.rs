// Rating model defaults, all overridable through `ScoringConfig`
pub const DEFAULT_K_FACTOR: f64 = 20.0;
pub const DEFAULT_ELO_SCALE: f64 = 480.0;
pub const DEFAULT_ABSENTEE_DEMERIT: f64 = 5.0;
pub const DEFAULT_LOOKBACK_DATES: usize = 7;
pub const DEFAULT_REACTIVATION_MULTIPLIER: f64 = 3.0;
pub const DELTA_DECIMAL_PLACES: u32 = 2;
// Rank held by disabled or not yet placed players
pub const UNRANKED: i32 = -1;
// Postgres advisory lock key serialising processing cycles
pub const CYCLE_LOCK_KEY: i64 = 0x0062_6164_6d69_6e74;
