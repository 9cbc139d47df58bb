use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::bookings::BookingDto;

/// Gate staff scan this payload printed as a QR code on the ticket.
pub const QR_VALIDITY_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub booking_id: Uuid,
    pub booking_code: String,
    pub user_id: Uuid,
    pub showtime_id: Uuid,
    pub seats: Vec<String>,
    pub total_price: i32,
    pub timestamp: i64,
}

impl QrPayload {
    pub fn from_booking(booking: &BookingDto, issued_at: DateTime<Utc>) -> Self {
        Self {
            booking_id: booking.id,
            booking_code: booking.booking_code.clone(),
            user_id: booking.user_id,
            showtime_id: booking.showtime_id,
            seats: booking.seats.clone(),
            total_price: booking.total_price_minor,
            timestamp: issued_at.timestamp(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let issued = DateTime::<Utc>::from_timestamp(self.timestamp, 0);
        match issued {
            Some(issued) => now.signed_duration_since(issued) <= Duration::days(QR_VALIDITY_DAYS),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::enums::booking_statuses::BookingStatus;

    fn sample_booking() -> BookingDto {
        BookingDto {
            id: Uuid::new_v4(),
            booking_code: "AB12CD34".to_string(),
            user_id: Uuid::new_v4(),
            showtime_id: Uuid::new_v4(),
            seats: vec!["A1".to_string(), "A2".to_string()],
            total_price_minor: 200,
            status: BookingStatus::Confirmed,
            payment_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn round_trips_through_json() {
        let booking = sample_booking();
        let payload = QrPayload::from_booking(&booking, Utc::now());
        let raw = payload.encode().unwrap();
        assert_eq!(QrPayload::parse(&raw).unwrap(), payload);
    }

    #[test]
    fn serializes_camel_case_keys() {
        let booking = sample_booking();
        let raw = QrPayload::from_booking(&booking, Utc::now()).encode().unwrap();
        assert!(raw.contains("\"bookingId\""));
        assert!(raw.contains("\"bookingCode\""));
        assert!(raw.contains("\"totalPrice\""));
    }

    #[test]
    fn expires_after_validity_window() {
        let booking = sample_booking();
        let issued = Utc::now() - Duration::days(QR_VALIDITY_DAYS + 1);
        let payload = QrPayload::from_booking(&booking, issued);
        assert!(!payload.is_fresh(Utc::now()));
        assert!(payload.is_fresh(issued + Duration::days(1)));
    }
}
