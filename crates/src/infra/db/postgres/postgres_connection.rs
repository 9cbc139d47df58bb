use std::time::Duration;

use anyhow::Result;
use diesel::{
    PgConnection, RunQueryDsl,
    r2d2::{ConnectionManager, CustomizeConnection, Error as R2d2Error, Pool},
};

// Seat mutations hold a `FOR UPDATE` lock on the showtime row; a statement
// stuck past this would stall every other buyer of that showtime.
const STATEMENT_TIMEOUT_MS: u32 = 5_000;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 5;

#[derive(Debug)]
struct SeatLockSessionSetup;

impl CustomizeConnection<PgConnection, R2d2Error> for SeatLockSessionSetup {
    fn on_acquire(&self, conn: &mut PgConnection) -> std::result::Result<(), R2d2Error> {
        diesel::sql_query(format!("SET statement_timeout = {STATEMENT_TIMEOUT_MS}"))
            .execute(conn)
            .map_err(R2d2Error::QueryError)?;
        Ok(())
    }
}

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

pub fn establish_connection(database_url: &str) -> Result<PgPool> {
    let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
        .ok()
        .map(|value| value.parse())
        .transpose()?
        .unwrap_or(DEFAULT_MAX_CONNECTIONS);

    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(max_connections)
        .connection_timeout(Duration::from_secs(CONNECTION_TIMEOUT_SECS))
        .connection_customizer(Box::new(SeatLockSessionSetup))
        .build(manager)?;
    Ok(pool)
}
