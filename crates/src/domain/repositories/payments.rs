use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::payments::{InsertPaymentEntity, PaymentEntity};

#[async_trait]
#[automock]
pub trait PaymentRepository {
    async fn create(&self, insert_payment_entity: InsertPaymentEntity) -> Result<PaymentEntity>;

    async fn find_by_id(&self, payment_id: Uuid) -> Result<Option<PaymentEntity>>;

    async fn find_by_order_ref(&self, order_ref: String) -> Result<Option<PaymentEntity>>;

    /// The booking's payment in PENDING or COMPLETED, if any. At most one such
    /// row exists per booking.
    async fn find_active_for_booking(&self, booking_id: Uuid) -> Result<Option<PaymentEntity>>;

    /// Marks the booking's PENDING payments FAILED before a new intent is
    /// created. Returns how many rows were superseded.
    async fn supersede_pending(&self, booking_id: Uuid, error: String) -> Result<usize>;

    /// CAS PENDING -> COMPLETED. True for exactly one caller per payment.
    async fn complete(
        &self,
        payment_id: Uuid,
        transaction_id: Option<String>,
        paid_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// CAS PENDING -> FAILED.
    async fn fail(&self, payment_id: Uuid, error: String) -> Result<bool>;

    /// CAS COMPLETED -> REFUNDED.
    async fn refund(&self, payment_id: Uuid) -> Result<bool>;

    /// Fails payments stuck in PENDING past the booking-expiry window: a
    /// gateway that never called back is treated as a declined attempt.
    async fn fail_stale_pending(&self, cutoff: DateTime<Utc>, error: String) -> Result<usize>;
}
