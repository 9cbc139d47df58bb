use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::showtimes;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = showtimes)]
pub struct ShowtimeEntity {
    pub id: Uuid,
    pub movie_title: String,
    pub auditorium: String,
    pub starts_at: DateTime<Utc>,
    pub price_minor: i32,
    pub capacity: i32,
    pub booked_seats: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = showtimes)]
pub struct InsertShowtimeEntity {
    pub movie_title: String,
    pub auditorium: String,
    pub starts_at: DateTime<Utc>,
    pub price_minor: i32,
    pub capacity: i32,
    pub booked_seats: Vec<String>,
}
