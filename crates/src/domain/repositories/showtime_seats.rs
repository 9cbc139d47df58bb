use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::value_objects::seat_holds::{HoldOutcome, SeatSnapshot};

/// Sole authority for a showtime's seat state. Every mutating primitive is
/// atomic and linearizable per showtime: two callers racing for the same seat
/// observe a total order of FREE / HELD / BOOKED transitions.
#[async_trait]
#[automock]
pub trait ShowtimeSeatRepository {
    /// All-or-nothing hold of every requested seat. Succeeds only if no seat
    /// is currently booked or live-held; expired holds on the requested seats
    /// do not count and are purged on the way in.
    async fn try_hold(
        &self,
        showtime_id: Uuid,
        seats: Vec<String>,
        booking_id: Uuid,
        user_id: Uuid,
        ttl: Duration,
    ) -> Result<HoldOutcome>;

    /// Moves the listed seats into `booked`, removing any hold whose seat is
    /// in the list regardless of holder. Re-promoting booked seats is a no-op.
    async fn promote(&self, showtime_id: Uuid, seats: Vec<String>) -> Result<()>;

    /// Removes holds for the listed seats whose holder matches. Idempotent.
    async fn release(&self, showtime_id: Uuid, seats: Vec<String>, booking_id: Uuid) -> Result<()>;

    /// Refund path: removes the listed seats from `booked`. Tolerates a
    /// showtime deleted out of band (warns and returns Ok).
    async fn revoke_booked(&self, showtime_id: Uuid, seats: Vec<String>) -> Result<()>;

    /// Re-sets the expiry of the booking's live holds. Returns how many holds
    /// were extended.
    async fn extend_holds(
        &self,
        showtime_id: Uuid,
        booking_id: Uuid,
        ttl: Duration,
    ) -> Result<usize>;

    /// Garbage-collects holds with `expires_at <= now`, for one showtime or,
    /// with `None`, across all showtimes. Returns the number released.
    async fn sweep_expired(&self, showtime_id: Option<Uuid>, now: DateTime<Utc>) -> Result<usize>;

    /// Availability view; purges the showtime's expired holds inline so the
    /// caller never observes stale holds.
    async fn snapshot(&self, showtime_id: Uuid) -> Result<Option<SeatSnapshot>>;
}
