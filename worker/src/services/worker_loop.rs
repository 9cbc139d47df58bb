use anyhow::Result;
use chrono::Utc;
use crates::domain::repositories::showtime_seats::ShowtimeSeatRepository;
use std::{sync::Arc, time::Duration};
use tracing::{error, info};

use crate::usecases::expire_stale_bookings::ExpireStaleBookingsUseCase;

/// Auto-cancels PENDING bookings older than the expiry window. Errors are
/// logged and retried on the next tick; the loop itself never dies.
pub async fn run_booking_expiry_loop(
    usecase: Arc<ExpireStaleBookingsUseCase>,
    interval: Duration,
) -> Result<()> {
    loop {
        info!("Checking for stale pending bookings...");
        match usecase.run().await {
            Ok(result) => {
                if result.scanned == 0 {
                    info!("No stale bookings found. Sleeping...");
                }
            }
            Err(e) => error!("Booking expiry sweep failed: {}", e),
        }

        tokio::time::sleep(interval).await;
    }
}

/// Garbage-collects expired seat holds across all showtimes.
pub async fn run_hold_gc_loop(
    seat_repo: Arc<dyn ShowtimeSeatRepository + Send + Sync>,
    interval: Duration,
) -> Result<()> {
    loop {
        match seat_repo.sweep_expired(None, Utc::now()).await {
            Ok(released) if released > 0 => info!(released, "Hold GC released expired holds"),
            Ok(_) => info!("No expired holds. Sleeping..."),
            Err(e) => error!("Hold GC failed: {}", e),
        }

        tokio::time::sleep(interval).await;
    }
}
