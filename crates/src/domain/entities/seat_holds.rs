use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::seat_holds;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = seat_holds)]
pub struct SeatHoldEntity {
    pub showtime_id: Uuid,
    pub seat: String,
    pub booking_id: Uuid,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = seat_holds)]
pub struct InsertSeatHoldEntity {
    pub showtime_id: Uuid,
    pub seat: String,
    pub booking_id: Uuid,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}
