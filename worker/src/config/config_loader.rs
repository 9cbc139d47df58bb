use anyhow::{Context, Result, ensure};

use super::config_model::{Database, DotEnvyConfig, Sweeper};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let database = Database {
        url: std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?,
    };

    let sweeper = Sweeper {
        hold_ttl_seconds: env_or("HOLD_TTL_SECONDS", 600)?,
        booking_expiry_seconds: env_or("BOOKING_EXPIRY_SECONDS", 900)?,
        sweep_interval_seconds: env_or("SWEEP_INTERVAL_SECONDS", 300)?,
        hold_sweep_interval_seconds: env_or("HOLD_SWEEP_INTERVAL_SECONDS", 600)?,
    };
    ensure!(
        sweeper.booking_expiry_seconds >= sweeper.hold_ttl_seconds,
        "BOOKING_EXPIRY_SECONDS must be >= HOLD_TTL_SECONDS"
    );

    Ok(DotEnvyConfig { database, sweeper })
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    std::env::var(key)
        .ok()
        .map(|value| value.parse())
        .transpose()
        .with_context(|| format!("{key} is invalid"))
        .map(|value| value.unwrap_or(default))
}
