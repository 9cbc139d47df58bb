use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::domain::repositories::notifications::BookingNotifier;
use crate::domain::value_objects::{bookings::BookingDto, qr::QrPayload};

/// Log-only notifier. Receipt mail and QR rendering are delivered by an
/// external collaborator; this records what would have been handed over.
pub struct TracingNotifier;

#[async_trait]
impl BookingNotifier for TracingNotifier {
    async fn booking_confirmed(&self, booking: BookingDto, qr: QrPayload) -> Result<()> {
        let encoded_qr = qr.encode()?;
        info!(
            booking_id = %booking.id,
            booking_code = %booking.booking_code,
            user_id = %booking.user_id,
            qr = %encoded_qr,
            "notifications: booking confirmed, receipt queued"
        );
        Ok(())
    }
}
