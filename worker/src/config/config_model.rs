#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub database: Database,
    pub sweeper: Sweeper,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Sweeper {
    pub hold_ttl_seconds: i64,
    pub booking_expiry_seconds: i64,
    /// Cadence of the booking-expiry pass.
    pub sweep_interval_seconds: u64,
    /// Cadence of the expired-hold garbage collection.
    pub hold_sweep_interval_seconds: u64,
}
