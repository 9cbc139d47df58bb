use anyhow::Result;
use chrono::{Duration, Utc};
use crates::application::usecases::bookings::BookingLifecycle;
use crates::domain::repositories::{bookings::BookingRepository, payments::PaymentRepository};
use std::sync::Arc;
use tracing::{error, info};

/// Bounded batch per tick keeps a backlog from stretching a single pass.
pub const EXPIRY_BATCH_SIZE: i64 = 100;

#[derive(Debug, Clone, Default)]
pub struct ExpireStaleBookingsResult {
    pub scanned: usize,
    pub cancelled: usize,
    pub failed: usize,
    pub stale_payments_failed: usize,
}

pub struct ExpireStaleBookingsUseCase {
    booking_repo: Arc<dyn BookingRepository + Send + Sync>,
    payment_repo: Arc<dyn PaymentRepository + Send + Sync>,
    bookings: Arc<dyn BookingLifecycle + Send + Sync>,
    expiry_window: Duration,
}

impl ExpireStaleBookingsUseCase {
    pub fn new(
        booking_repo: Arc<dyn BookingRepository + Send + Sync>,
        payment_repo: Arc<dyn PaymentRepository + Send + Sync>,
        bookings: Arc<dyn BookingLifecycle + Send + Sync>,
        expiry_window: Duration,
    ) -> Self {
        Self {
            booking_repo,
            payment_repo,
            bookings,
            expiry_window,
        }
    }

    pub async fn run(&self) -> Result<ExpireStaleBookingsResult> {
        let cutoff = Utc::now() - self.expiry_window;

        let stale = self
            .booking_repo
            .list_stale_pending(cutoff, EXPIRY_BATCH_SIZE)
            .await?;

        let mut result = ExpireStaleBookingsResult {
            scanned: stale.len(),
            ..Default::default()
        };

        for booking in stale {
            // Every cancellation is idempotent, so a redundant sweeper
            // deployment racing this one is harmless.
            match self.bookings.cancel_if_pending(booking.id).await {
                Ok(true) => result.cancelled += 1,
                Ok(false) => {}
                Err(err) => {
                    error!(
                        booking_id = %booking.id,
                        error = ?err,
                        "expire_bookings: failed to cancel stale booking; will retry next tick"
                    );
                    result.failed += 1;
                }
            }
        }

        // A gateway that never called back counts as a declined attempt.
        match self
            .payment_repo
            .fail_stale_pending(cutoff, "gateway never delivered a callback".to_string())
            .await
        {
            Ok(failed) => result.stale_payments_failed = failed,
            Err(err) => {
                error!(error = ?err, "expire_bookings: failed to fail stale payments");
            }
        }

        info!(
            scanned = result.scanned,
            cancelled = result.cancelled,
            failed = result.failed,
            stale_payments_failed = result.stale_payments_failed,
            "expire_bookings: completed"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crates::application::usecases::bookings::UseCaseResult;
    use crates::domain::entities::bookings::BookingEntity;
    use crates::domain::repositories::bookings::MockBookingRepository;
    use crates::domain::repositories::payments::MockPaymentRepository;
    use crates::domain::value_objects::bookings::BookingDto;
    use crates::domain::value_objects::enums::booking_statuses::BookingStatus;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct StubLifecycle {
        cancelled: Mutex<Vec<Uuid>>,
        fail_for: Option<Uuid>,
    }

    #[async_trait]
    impl BookingLifecycle for StubLifecycle {
        async fn confirm(&self, _booking_id: Uuid) -> UseCaseResult<BookingDto> {
            unimplemented!("the sweeper never confirms")
        }

        async fn cancel(&self, _booking_id: Uuid) -> UseCaseResult<BookingDto> {
            unimplemented!("the sweeper only cancels pending bookings")
        }

        async fn cancel_if_pending(&self, booking_id: Uuid) -> UseCaseResult<bool> {
            if self.fail_for == Some(booking_id) {
                return Err(anyhow::anyhow!("storage unavailable").into());
            }
            self.cancelled.lock().unwrap().push(booking_id);
            Ok(true)
        }
    }

    fn stale_booking(age_minutes: i64) -> BookingEntity {
        let created_at = Utc::now() - Duration::minutes(age_minutes);
        BookingEntity {
            id: Uuid::new_v4(),
            booking_code: "AB12CD34".to_string(),
            user_id: Uuid::new_v4(),
            showtime_id: Uuid::new_v4(),
            seats: vec!["A1".to_string()],
            total_price_minor: 100,
            status: BookingStatus::Pending.to_string(),
            payment_id: None,
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn cancels_every_stale_pending_booking() {
        let first = stale_booking(20);
        let second = stale_booking(30);
        let expected = vec![first.id, second.id];

        let mut booking_repo = MockBookingRepository::new();
        booking_repo
            .expect_list_stale_pending()
            .returning(move |_, _| {
                let stale = vec![first.clone(), second.clone()];
                Box::pin(async move { Ok(stale) })
            });

        let mut payment_repo = MockPaymentRepository::new();
        payment_repo
            .expect_fail_stale_pending()
            .returning(|_, _| Box::pin(async { Ok(0) }));

        let lifecycle = Arc::new(StubLifecycle::default());

        let usecase = ExpireStaleBookingsUseCase::new(
            Arc::new(booking_repo),
            Arc::new(payment_repo),
            Arc::clone(&lifecycle) as Arc<dyn BookingLifecycle + Send + Sync>,
            Duration::minutes(15),
        );

        let result = usecase.run().await.unwrap();
        assert_eq!(result.scanned, 2);
        assert_eq!(result.cancelled, 2);
        assert_eq!(result.failed, 0);
        assert_eq!(*lifecycle.cancelled.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn a_failing_cancellation_does_not_abort_the_tick() {
        let poisoned = stale_booking(20);
        let healthy = stale_booking(25);
        let poisoned_id = poisoned.id;
        let healthy_id = healthy.id;

        let mut booking_repo = MockBookingRepository::new();
        booking_repo
            .expect_list_stale_pending()
            .returning(move |_, _| {
                let stale = vec![poisoned.clone(), healthy.clone()];
                Box::pin(async move { Ok(stale) })
            });

        let mut payment_repo = MockPaymentRepository::new();
        payment_repo
            .expect_fail_stale_pending()
            .returning(|_, _| Box::pin(async { Ok(3) }));

        let lifecycle = Arc::new(StubLifecycle {
            fail_for: Some(poisoned_id),
            ..Default::default()
        });

        let usecase = ExpireStaleBookingsUseCase::new(
            Arc::new(booking_repo),
            Arc::new(payment_repo),
            Arc::clone(&lifecycle) as Arc<dyn BookingLifecycle + Send + Sync>,
            Duration::minutes(15),
        );

        let result = usecase.run().await.unwrap();
        assert_eq!(result.cancelled, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.stale_payments_failed, 3);
        assert_eq!(*lifecycle.cancelled.lock().unwrap(), vec![healthy_id]);
    }
}
