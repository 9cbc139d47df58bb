use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::value_objects::{bookings::BookingDto, qr::QrPayload};

/// Out-of-band confirmation artifacts: receipt email and the QR ticket.
/// Called strictly after the booking state transition commits; a failure here
/// is logged by the caller and never reverses a confirmation.
#[async_trait]
#[automock]
pub trait BookingNotifier {
    async fn booking_confirmed(&self, booking: BookingDto, qr: QrPayload) -> Result<()>;
}
