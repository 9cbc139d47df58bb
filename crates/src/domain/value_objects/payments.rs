use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entities::payments::PaymentEntity;
use crate::domain::value_objects::enums::{
    payment_methods::PaymentMethod, payment_statuses::PaymentStatus,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    pub booking_id: Uuid,
    pub method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutDto {
    pub payment_id: Uuid,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDto {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub amount_minor: i32,
    pub method: String,
    pub provider: String,
    pub order_ref: String,
    pub transaction_id: Option<String>,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<PaymentEntity> for PaymentDto {
    fn from(value: PaymentEntity) -> Self {
        Self {
            id: value.id,
            booking_id: value.booking_id,
            amount_minor: value.amount_minor,
            method: value.method,
            provider: value.provider,
            order_ref: value.order_ref,
            transaction_id: value.transaction_id,
            status: PaymentStatus::from_str(&value.status).unwrap_or(PaymentStatus::Failed),
            paid_at: value.paid_at,
            created_at: value.created_at,
        }
    }
}

/// Which of the gateway's two delivery channels a callback arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackSource {
    /// Browser redirect back from the gateway.
    Return,
    /// Server-to-server notification. Authoritative and retried by the gateway.
    Ipn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone)]
pub struct CallbackResolution {
    pub outcome: CallbackOutcome,
    pub booking_id: Uuid,
    /// True when the payment was already terminal and the callback was a replay.
    pub duplicate: bool,
    pub message: String,
}
