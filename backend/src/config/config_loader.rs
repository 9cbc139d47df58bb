use anyhow::{Context, Result, ensure};

use super::config_model::{
    BookingPolicy, Database, DotEnvyConfig, JwtSecrets, Server, VnPayConfig,
};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let server = Server {
        port: required("PORT")?.parse().context("PORT is invalid")?,
        body_limit: std::env::var("SERVER_BODY_LIMIT")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("SERVER_BODY_LIMIT is invalid")?
            .unwrap_or(10),
        timeout: std::env::var("SERVER_TIMEOUT")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("SERVER_TIMEOUT is invalid")?
            .unwrap_or(30),
    };

    let database = Database {
        url: required("DATABASE_URL")?,
    };

    let jwt = JwtSecrets {
        secret: required("JWT_SECRET")?,
        refresh_secret: required("JWT_REFRESH_SECRET")?,
    };

    let booking = BookingPolicy {
        hold_ttl_seconds: std::env::var("HOLD_TTL_SECONDS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("HOLD_TTL_SECONDS is invalid")?
            .unwrap_or(600),
        booking_expiry_seconds: std::env::var("BOOKING_EXPIRY_SECONDS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("BOOKING_EXPIRY_SECONDS is invalid")?
            .unwrap_or(900),
    };
    ensure!(
        booking.hold_ttl_seconds > 0,
        "HOLD_TTL_SECONDS must be positive"
    );
    // A hold must never outlive its booking.
    ensure!(
        booking.booking_expiry_seconds >= booking.hold_ttl_seconds,
        "BOOKING_EXPIRY_SECONDS must be >= HOLD_TTL_SECONDS"
    );

    let vnpay = VnPayConfig {
        tmn_code: required("VNPAY_TMN_CODE")?,
        hash_secret: required("VNPAY_HASH_SECRET")?,
        pay_url: required("VNPAY_URL")?,
        return_url: required("VNPAY_RETURN_URL")?,
    };

    let frontend_url = required("FRONTEND_URL")?;

    Ok(DotEnvyConfig {
        server,
        database,
        jwt,
        booking,
        vnpay,
        frontend_url,
    })
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("{key} is not set"))
}
