use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::payments;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = payments)]
pub struct PaymentEntity {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub amount_minor: i32,
    pub method: String,
    pub provider: String,
    pub order_ref: String,
    pub transaction_id: Option<String>,
    pub status: String,
    pub error: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = payments)]
pub struct InsertPaymentEntity {
    pub booking_id: Uuid,
    pub amount_minor: i32,
    pub method: String,
    pub provider: String,
    pub order_ref: String,
    pub status: String,
}
