use anyhow::Result;
use chrono::Duration;
use crates::application::usecases::bookings::{BookingLifecycle, BookingUseCase};
use crates::domain::repositories::{
    bookings::BookingRepository, payments::PaymentRepository,
    showtime_seats::ShowtimeSeatRepository,
};
use crates::infra::{
    db::{
        postgres::postgres_connection,
        repositories::{
            bookings::BookingPostgres, payments::PaymentPostgres,
            showtime_seats::ShowtimeSeatPostgres, showtimes::ShowtimePostgres,
        },
    },
    notifications::TracingNotifier,
};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{error, info};
use worker::{
    config::config_loader,
    services::worker_loop,
    usecases::expire_stale_bookings::ExpireStaleBookingsUseCase,
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    if let Err(error) = crates::observability::init_observability("worker") {
        eprintln!("Failed to initialize observability: {error}");
        std::process::exit(1);
    }

    let dotenvy_env = match config_loader::load() {
        Ok(config) => config,
        Err(error) => {
            error!("Invalid configuration: {}", error);
            std::process::exit(1);
        }
    };
    info!("ENV has been loaded");

    let postgres_pool = match postgres_connection::establish_connection(&dotenvy_env.database.url)
    {
        Ok(pool) => pool,
        Err(error) => {
            error!("Postgres is unreachable: {}", error);
            std::process::exit(2);
        }
    };
    info!("Postgres connection has been established");

    if let Err(error) = run(dotenvy_env, Arc::new(postgres_pool)).await {
        error!("Worker exited with error: {}", error);
        std::process::exit(1);
    }
}

async fn run(
    dotenvy_env: worker::config::config_model::DotEnvyConfig,
    db_pool: Arc<postgres_connection::PgPool>,
) -> Result<()> {
    let showtime_repo = Arc::new(ShowtimePostgres::new(Arc::clone(&db_pool)));
    let seat_repo = Arc::new(ShowtimeSeatPostgres::new(Arc::clone(&db_pool)));
    let booking_repo = Arc::new(BookingPostgres::new(Arc::clone(&db_pool)));

    let bookings_usecase = BookingUseCase::new(
        showtime_repo,
        Arc::clone(&seat_repo),
        Arc::clone(&booking_repo),
        Arc::new(TracingNotifier),
        Duration::seconds(dotenvy_env.sweeper.hold_ttl_seconds),
    );
    let booking_lifecycle: Arc<dyn BookingLifecycle + Send + Sync> = Arc::new(bookings_usecase);

    let booking_repo_dyn: Arc<dyn BookingRepository + Send + Sync> = booking_repo;
    let payment_repo_dyn: Arc<dyn PaymentRepository + Send + Sync> =
        Arc::new(PaymentPostgres::new(Arc::clone(&db_pool)));
    let seat_repo_dyn: Arc<dyn ShowtimeSeatRepository + Send + Sync> = seat_repo;

    let expire_usecase = Arc::new(ExpireStaleBookingsUseCase::new(
        booking_repo_dyn,
        payment_repo_dyn,
        booking_lifecycle,
        Duration::seconds(dotenvy_env.sweeper.booking_expiry_seconds),
    ));

    let booking_expiry_loop = tokio::spawn(worker_loop::run_booking_expiry_loop(
        expire_usecase,
        StdDuration::from_secs(dotenvy_env.sweeper.sweep_interval_seconds),
    ));

    let hold_gc_loop = tokio::spawn(worker_loop::run_hold_gc_loop(
        seat_repo_dyn,
        StdDuration::from_secs(dotenvy_env.sweeper.hold_sweep_interval_seconds),
    ));

    tokio::select! {
        result = booking_expiry_loop => result??,
        result = hold_gc_loop => result??,
    };
    Ok(())
}
