use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{OptionalExtension, insert_into, prelude::*, update};
use uuid::Uuid;

use crate::domain::entities::payments::{InsertPaymentEntity, PaymentEntity};
use crate::domain::repositories::payments::PaymentRepository;
use crate::domain::value_objects::enums::payment_statuses::PaymentStatus;
use crate::infra::db::postgres::{postgres_connection::PgPool, schema::payments};

pub struct PaymentPostgres {
    db_pool: Arc<PgPool>,
}

impl PaymentPostgres {
    pub fn new(db_pool: Arc<PgPool>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PaymentRepository for PaymentPostgres {
    async fn create(&self, insert_payment_entity: InsertPaymentEntity) -> Result<PaymentEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let payment = insert_into(payments::table)
            .values(&insert_payment_entity)
            .get_result::<PaymentEntity>(&mut conn)?;

        Ok(payment)
    }

    async fn find_by_id(&self, payment_id: Uuid) -> Result<Option<PaymentEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let payment = payments::table
            .find(payment_id)
            .first::<PaymentEntity>(&mut conn)
            .optional()?;

        Ok(payment)
    }

    async fn find_by_order_ref(&self, order_ref: String) -> Result<Option<PaymentEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let payment = payments::table
            .filter(payments::order_ref.eq(order_ref))
            .first::<PaymentEntity>(&mut conn)
            .optional()?;

        Ok(payment)
    }

    async fn find_active_for_booking(&self, booking_id: Uuid) -> Result<Option<PaymentEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let payment = payments::table
            .filter(payments::booking_id.eq(booking_id))
            .filter(payments::status.eq_any(vec![
                PaymentStatus::Pending.to_string(),
                PaymentStatus::Completed.to_string(),
            ]))
            .order(payments::created_at.desc())
            .first::<PaymentEntity>(&mut conn)
            .optional()?;

        Ok(payment)
    }

    async fn supersede_pending(&self, booking_id: Uuid, error: String) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let superseded = update(
            payments::table
                .filter(payments::booking_id.eq(booking_id))
                .filter(payments::status.eq(PaymentStatus::Pending.to_string())),
        )
        .set((
            payments::status.eq(PaymentStatus::Failed.to_string()),
            payments::error.eq(Some(error)),
            payments::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

        Ok(superseded)
    }

    async fn complete(
        &self,
        payment_id: Uuid,
        transaction_id: Option<String>,
        paid_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = update(
            payments::table
                .filter(payments::id.eq(payment_id))
                .filter(payments::status.eq(PaymentStatus::Pending.to_string())),
        )
        .set((
            payments::status.eq(PaymentStatus::Completed.to_string()),
            payments::transaction_id.eq(transaction_id),
            payments::paid_at.eq(Some(paid_at)),
            payments::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

        Ok(updated == 1)
    }

    async fn fail(&self, payment_id: Uuid, error: String) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = update(
            payments::table
                .filter(payments::id.eq(payment_id))
                .filter(payments::status.eq(PaymentStatus::Pending.to_string())),
        )
        .set((
            payments::status.eq(PaymentStatus::Failed.to_string()),
            payments::error.eq(Some(error)),
            payments::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

        Ok(updated == 1)
    }

    async fn refund(&self, payment_id: Uuid) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = update(
            payments::table
                .filter(payments::id.eq(payment_id))
                .filter(payments::status.eq(PaymentStatus::Completed.to_string())),
        )
        .set((
            payments::status.eq(PaymentStatus::Refunded.to_string()),
            payments::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

        Ok(updated == 1)
    }

    async fn fail_stale_pending(&self, cutoff: DateTime<Utc>, error: String) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let failed = update(
            payments::table
                .filter(payments::status.eq(PaymentStatus::Pending.to_string()))
                .filter(payments::created_at.lt(cutoff)),
        )
        .set((
            payments::status.eq(PaymentStatus::Failed.to_string()),
            payments::error.eq(Some(error)),
            payments::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

        Ok(failed)
    }
}
