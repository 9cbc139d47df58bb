use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::{OptionalExtension, insert_into, prelude::*, update};
use uuid::Uuid;

use crate::domain::entities::bookings::{BookingEntity, InsertBookingEntity};
use crate::domain::repositories::bookings::{BookingRepository, DuplicateBookingCode};
use crate::domain::value_objects::enums::booking_statuses::BookingStatus;
use crate::infra::db::postgres::{postgres_connection::PgPool, schema::bookings};

pub struct BookingPostgres {
    db_pool: Arc<PgPool>,
}

impl BookingPostgres {
    pub fn new(db_pool: Arc<PgPool>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl BookingRepository for BookingPostgres {
    async fn create(&self, insert_booking_entity: InsertBookingEntity) -> Result<BookingEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let booking = insert_into(bookings::table)
            .values(&insert_booking_entity)
            .get_result::<BookingEntity>(&mut conn)
            .map_err(|err| match err {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    anyhow::Error::new(DuplicateBookingCode)
                }
                other => anyhow::Error::new(other),
            })?;

        Ok(booking)
    }

    async fn find_by_id(&self, booking_id: Uuid) -> Result<Option<BookingEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let booking = bookings::table
            .find(booking_id)
            .first::<BookingEntity>(&mut conn)
            .optional()?;

        Ok(booking)
    }

    async fn find_by_code(&self, booking_code: String) -> Result<Option<BookingEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let booking = bookings::table
            .filter(bookings::booking_code.eq(booking_code))
            .first::<BookingEntity>(&mut conn)
            .optional()?;

        Ok(booking)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<BookingEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let bookings = bookings::table
            .filter(bookings::user_id.eq(user_id))
            .order(bookings::created_at.desc())
            .load::<BookingEntity>(&mut conn)?;

        Ok(bookings)
    }

    async fn list_all(&self) -> Result<Vec<BookingEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let bookings = bookings::table
            .order(bookings::created_at.desc())
            .load::<BookingEntity>(&mut conn)?;

        Ok(bookings)
    }

    async fn transition_status(
        &self,
        booking_id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<Option<BookingEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = update(
            bookings::table
                .filter(bookings::id.eq(booking_id))
                .filter(bookings::status.eq(from.to_string())),
        )
        .set((
            bookings::status.eq(to.to_string()),
            bookings::updated_at.eq(Utc::now()),
        ))
        .get_result::<BookingEntity>(&mut conn)
        .optional()?;

        Ok(updated)
    }

    async fn set_payment_id(&self, booking_id: Uuid, payment_id: Uuid) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(bookings::table.find(booking_id))
            .set((
                bookings::payment_id.eq(Some(payment_id)),
                bookings::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn list_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<BookingEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let bookings = bookings::table
            .filter(bookings::status.eq(BookingStatus::Pending.to_string()))
            .filter(bookings::created_at.lt(cutoff))
            .order(bookings::created_at.asc())
            .limit(limit)
            .load::<BookingEntity>(&mut conn)?;

        Ok(bookings)
    }
}
