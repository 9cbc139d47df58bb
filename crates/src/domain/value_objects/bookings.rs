use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entities::bookings::BookingEntity;
use crate::domain::value_objects::enums::booking_statuses::BookingStatus;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingModel {
    pub showtime_id: Uuid,
    pub seats: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingDto {
    pub id: Uuid,
    pub booking_code: String,
    pub user_id: Uuid,
    pub showtime_id: Uuid,
    pub seats: Vec<String>,
    pub total_price_minor: i32,
    pub status: BookingStatus,
    pub payment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<BookingEntity> for BookingDto {
    fn from(value: BookingEntity) -> Self {
        Self {
            id: value.id,
            booking_code: value.booking_code,
            user_id: value.user_id,
            showtime_id: value.showtime_id,
            seats: value.seats,
            total_price_minor: value.total_price_minor,
            status: BookingStatus::from_str(&value.status).unwrap_or(BookingStatus::Cancelled),
            payment_id: value.payment_id,
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyQrRequest {
    pub payload: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyQrDto {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking: Option<BookingDto>,
}

impl VerifyQrDto {
    pub fn ok(booking: BookingDto) -> Self {
        Self {
            valid: true,
            reason: None,
            booking: Some(booking),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            booking: None,
        }
    }
}
