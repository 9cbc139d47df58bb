use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::{Connection, PgConnection, delete, insert_into, prelude::*, update};
use tracing::warn;
use uuid::Uuid;

use crate::domain::entities::seat_holds::{InsertSeatHoldEntity, SeatHoldEntity};
use crate::domain::entities::showtimes::ShowtimeEntity;
use crate::domain::events::{self, SeatEventSender};
use crate::domain::repositories::showtime_seats::ShowtimeSeatRepository;
use crate::domain::value_objects::seat_holds::{HoldOutcome, SeatSnapshot};
use crate::infra::db::postgres::postgres_connection::PgPool;
use crate::infra::db::postgres::schema::{seat_holds, showtimes};

const POOL_RETRIES: u32 = 3;
const POOL_BACKOFF_MS: u64 = 50;

/// Postgres seat store. Every primitive runs in a transaction that first
/// locks the showtime row (`SELECT ... FOR UPDATE`); that row lock is the
/// per-showtime serialization point, so the predicate check and the write
/// are atomic with respect to concurrent callers.
pub struct ShowtimeSeatPostgres {
    db_pool: Arc<PgPool>,
    events: Option<SeatEventSender>,
}

impl ShowtimeSeatPostgres {
    pub fn new(db_pool: Arc<PgPool>) -> Self {
        Self {
            db_pool,
            events: None,
        }
    }

    pub fn with_events(db_pool: Arc<PgPool>, events: SeatEventSender) -> Self {
        Self {
            db_pool,
            events: Some(events),
        }
    }

    async fn conn(&self) -> Result<PooledConnection<ConnectionManager<PgConnection>>> {
        let mut attempt = 0;
        loop {
            match Arc::clone(&self.db_pool).get() {
                Ok(conn) => return Ok(conn),
                Err(err) if attempt + 1 < POOL_RETRIES => {
                    attempt += 1;
                    warn!(attempt, error = %err, "seat store: pool acquisition failed, retrying");
                    tokio::time::sleep(StdDuration::from_millis(POOL_BACKOFF_MS * attempt as u64))
                        .await;
                }
                Err(err) => return Err(anyhow::Error::new(err).context("storage unavailable")),
            }
        }
    }

    fn lock_showtime(
        conn: &mut PgConnection,
        showtime_id: Uuid,
    ) -> Result<Option<ShowtimeEntity>, diesel::result::Error> {
        showtimes::table
            .find(showtime_id)
            .for_update()
            .first::<ShowtimeEntity>(conn)
            .optional()
    }

    fn purge_expired(
        conn: &mut PgConnection,
        showtime_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<usize, diesel::result::Error> {
        delete(
            seat_holds::table
                .filter(seat_holds::showtime_id.eq(showtime_id))
                .filter(seat_holds::expires_at.le(now)),
        )
        .execute(conn)
    }
}

#[async_trait]
impl ShowtimeSeatRepository for ShowtimeSeatPostgres {
    async fn try_hold(
        &self,
        showtime_id: Uuid,
        seats: Vec<String>,
        booking_id: Uuid,
        user_id: Uuid,
        ttl: Duration,
    ) -> Result<HoldOutcome> {
        let mut conn = self.conn().await?;

        let outcome = conn.transaction::<HoldOutcome, anyhow::Error, _>(|conn| {
            let showtime = Self::lock_showtime(conn, showtime_id)?
                .ok_or_else(|| anyhow::anyhow!("showtime {showtime_id} not found"))?;

            let now = Utc::now();
            Self::purge_expired(conn, showtime_id, now)?;

            let live_holds = seat_holds::table
                .filter(seat_holds::showtime_id.eq(showtime_id))
                .load::<SeatHoldEntity>(conn)?;

            let conflicting_seats: Vec<String> = seats
                .iter()
                .filter(|seat| {
                    showtime.booked_seats.contains(*seat)
                        || live_holds.iter().any(|hold| hold.seat == **seat)
                })
                .cloned()
                .collect();

            if !conflicting_seats.is_empty() {
                return Ok(HoldOutcome::Conflict { conflicting_seats });
            }

            let expires_at = now + ttl;
            let rows: Vec<InsertSeatHoldEntity> = seats
                .iter()
                .map(|seat| InsertSeatHoldEntity {
                    showtime_id,
                    seat: seat.clone(),
                    booking_id,
                    user_id,
                    expires_at,
                })
                .collect();

            insert_into(seat_holds::table).values(&rows).execute(conn)?;

            Ok(HoldOutcome::Acquired)
        })?;

        if outcome.is_acquired() {
            events::publish(&self.events, showtime_id);
        }
        Ok(outcome)
    }

    async fn promote(&self, showtime_id: Uuid, seats: Vec<String>) -> Result<()> {
        let mut conn = self.conn().await?;

        conn.transaction::<(), anyhow::Error, _>(|conn| {
            let Some(showtime) = Self::lock_showtime(conn, showtime_id)? else {
                warn!(%showtime_id, "seat store: promote on missing showtime, skipping");
                return Ok(());
            };

            // Confirm-time sweep: any hold on these seats goes, whoever holds it.
            delete(
                seat_holds::table
                    .filter(seat_holds::showtime_id.eq(showtime_id))
                    .filter(seat_holds::seat.eq_any(seats.clone())),
            )
            .execute(conn)?;

            let mut booked = showtime.booked_seats;
            for seat in &seats {
                if !booked.contains(seat) {
                    booked.push(seat.clone());
                }
            }

            update(showtimes::table.find(showtime_id))
                .set((
                    showtimes::booked_seats.eq(booked),
                    showtimes::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;

            Ok(())
        })?;

        events::publish(&self.events, showtime_id);
        Ok(())
    }

    async fn release(&self, showtime_id: Uuid, seats: Vec<String>, booking_id: Uuid) -> Result<()> {
        let mut conn = self.conn().await?;

        let released = delete(
            seat_holds::table
                .filter(seat_holds::showtime_id.eq(showtime_id))
                .filter(seat_holds::seat.eq_any(seats))
                .filter(seat_holds::booking_id.eq(booking_id)),
        )
        .execute(&mut conn)?;

        if released > 0 {
            events::publish(&self.events, showtime_id);
        }
        Ok(())
    }

    async fn revoke_booked(&self, showtime_id: Uuid, seats: Vec<String>) -> Result<()> {
        let mut conn = self.conn().await?;

        let revoked = conn.transaction::<bool, anyhow::Error, _>(|conn| {
            let Some(showtime) = Self::lock_showtime(conn, showtime_id)? else {
                warn!(%showtime_id, "seat store: revoke on missing showtime, skipping");
                return Ok(false);
            };

            let booked: Vec<String> = showtime
                .booked_seats
                .into_iter()
                .filter(|seat| !seats.contains(seat))
                .collect();

            update(showtimes::table.find(showtime_id))
                .set((
                    showtimes::booked_seats.eq(booked),
                    showtimes::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;

            Ok(true)
        })?;

        if revoked {
            events::publish(&self.events, showtime_id);
        }
        Ok(())
    }

    async fn extend_holds(
        &self,
        showtime_id: Uuid,
        booking_id: Uuid,
        ttl: Duration,
    ) -> Result<usize> {
        let mut conn = self.conn().await?;
        let now = Utc::now();

        let extended = update(
            seat_holds::table
                .filter(seat_holds::showtime_id.eq(showtime_id))
                .filter(seat_holds::booking_id.eq(booking_id))
                .filter(seat_holds::expires_at.gt(now)),
        )
        .set(seat_holds::expires_at.eq(now + ttl))
        .execute(&mut conn)?;

        Ok(extended)
    }

    async fn sweep_expired(&self, showtime_id: Option<Uuid>, now: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.conn().await?;

        let released = match showtime_id {
            Some(showtime_id) => delete(
                seat_holds::table
                    .filter(seat_holds::expires_at.le(now))
                    .filter(seat_holds::showtime_id.eq(showtime_id)),
            )
            .execute(&mut conn)?,
            None => delete(seat_holds::table.filter(seat_holds::expires_at.le(now)))
                .execute(&mut conn)?,
        };

        if released > 0 {
            if let Some(showtime_id) = showtime_id {
                events::publish(&self.events, showtime_id);
            }
        }
        Ok(released)
    }

    async fn snapshot(&self, showtime_id: Uuid) -> Result<Option<SeatSnapshot>> {
        let mut conn = self.conn().await?;

        conn.transaction::<Option<SeatSnapshot>, anyhow::Error, _>(|conn| {
            let Some(showtime) = Self::lock_showtime(conn, showtime_id)? else {
                return Ok(None);
            };

            Self::purge_expired(conn, showtime_id, Utc::now())?;

            let held_seats: Vec<String> = seat_holds::table
                .filter(seat_holds::showtime_id.eq(showtime_id))
                .select(seat_holds::seat)
                .order(seat_holds::seat.asc())
                .load::<String>(conn)?;

            let available_count =
                showtime.capacity - showtime.booked_seats.len() as i32 - held_seats.len() as i32;

            Ok(Some(SeatSnapshot {
                capacity: showtime.capacity,
                booked_seats: showtime.booked_seats,
                held_seats,
                available_count,
            }))
        })
    }
}
