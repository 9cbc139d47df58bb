use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::bookings::{BookingEntity, InsertBookingEntity};
use crate::domain::value_objects::enums::booking_statuses::BookingStatus;

/// Unique-index violation on `booking_code`. The create use case downcasts to
/// this to drive its regenerate-and-retry loop.
#[derive(Debug, Error)]
#[error("booking code already exists")]
pub struct DuplicateBookingCode;

#[async_trait]
#[automock]
pub trait BookingRepository {
    async fn create(&self, insert_booking_entity: InsertBookingEntity) -> Result<BookingEntity>;

    async fn find_by_id(&self, booking_id: Uuid) -> Result<Option<BookingEntity>>;

    async fn find_by_code(&self, booking_code: String) -> Result<Option<BookingEntity>>;

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<BookingEntity>>;

    async fn list_all(&self) -> Result<Vec<BookingEntity>>;

    /// Compare-and-set on the status column. Returns the updated row, or
    /// `None` when the booking was not in `from` (some other caller won).
    async fn transition_status(
        &self,
        booking_id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<Option<BookingEntity>>;

    async fn set_payment_id(&self, booking_id: Uuid, payment_id: Uuid) -> Result<()>;

    /// PENDING bookings created before `cutoff`, oldest first, bounded.
    async fn list_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<BookingEntity>>;
}
