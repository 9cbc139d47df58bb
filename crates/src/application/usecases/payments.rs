use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::Result as AnyResult;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::usecases::bookings::{BookingError, BookingLifecycle};
use crate::domain::entities::payments::{InsertPaymentEntity, PaymentEntity};
use crate::domain::repositories::bookings::BookingRepository;
use crate::domain::repositories::payments::PaymentRepository;
use crate::domain::value_objects::enums::{
    booking_statuses::BookingStatus, payment_methods::PaymentMethod,
    payment_statuses::PaymentStatus,
};
use crate::domain::value_objects::payments::{
    CallbackOutcome, CallbackResolution, CallbackSource, CheckoutDto, PaymentDto,
};
use crate::payments::gateway_client::{
    self, GatewayIntent, RedirectGatewayClient, RESPONSE_CODE_SUCCESS,
};

/// Gateway seam of the coordinator; implemented by `RedirectGatewayClient`
/// and mocked in tests.
#[cfg_attr(test, mockall::automock)]
pub trait PaymentGateway: Send + Sync {
    fn build_redirect_url(&self, intent: &GatewayIntent) -> AnyResult<String>;

    fn verify_callback(&self, params: &HashMap<String, String>) -> bool;
}

impl PaymentGateway for RedirectGatewayClient {
    fn build_redirect_url(&self, intent: &GatewayIntent) -> AnyResult<String> {
        RedirectGatewayClient::build_redirect_url(self, intent)
    }

    fn verify_callback(&self, params: &HashMap<String, String>) -> bool {
        RedirectGatewayClient::verify_callback(self, params)
    }
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("invalid gateway signature")]
    InvalidSignature,
    #[error("unknown order reference")]
    UnknownOrder,
    #[error("callback amount does not match the payment")]
    AmountMismatch,
    #[error("payment not found")]
    PaymentNotFound,
    #[error("booking not found")]
    BookingNotFound,
    #[error("forbidden")]
    Forbidden,
    #[error("invalid payment state: {0}")]
    InvalidTransition(String),
    #[error(transparent)]
    Booking(#[from] BookingError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PaymentError {
    pub fn status_code(&self) -> u16 {
        match self {
            PaymentError::InvalidSignature
            | PaymentError::AmountMismatch
            | PaymentError::InvalidTransition(_) => 400,
            PaymentError::UnknownOrder
            | PaymentError::PaymentNotFound
            | PaymentError::BookingNotFound => 404,
            PaymentError::Forbidden => 403,
            PaymentError::Booking(err) => err.status_code(),
            PaymentError::Internal(_) => 500,
        }
    }
}

pub type PaymentResult<T> = std::result::Result<T, PaymentError>;

// Order stamps are strictly increasing even when two intents land on the
// same millisecond, so order references never collide.
static LAST_ORDER_STAMP: AtomicI64 = AtomicI64::new(0);

fn next_order_stamp(now_millis: i64) -> i64 {
    let mut prev = LAST_ORDER_STAMP.load(Ordering::Relaxed);
    loop {
        let next = if now_millis > prev { now_millis } else { prev + 1 };
        match LAST_ORDER_STAMP.compare_exchange(prev, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

pub fn order_ref_for(booking_id: Uuid, now: DateTime<Utc>) -> String {
    format!("{}-{}", booking_id, next_order_stamp(now.timestamp_millis()))
}

/// The booking id is a hyphenated UUID, so the stamp is whatever follows the
/// last hyphen.
pub fn booking_id_from_order_ref(order_ref: &str) -> Option<Uuid> {
    let (booking_id, _stamp) = order_ref.rsplit_once('-')?;
    Uuid::parse_str(booking_id).ok()
}

pub fn parse_gateway_date(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, gateway_client::GATEWAY_DATE_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

pub struct PaymentUseCase<P, B, G, L>
where
    P: PaymentRepository + Send + Sync + 'static,
    B: BookingRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    L: BookingLifecycle + Send + Sync + 'static,
{
    payment_repo: Arc<P>,
    booking_repo: Arc<B>,
    gateway: Arc<G>,
    bookings: Arc<L>,
    provider: String,
}

impl<P, B, G, L> PaymentUseCase<P, B, G, L>
where
    P: PaymentRepository + Send + Sync + 'static,
    B: BookingRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    L: BookingLifecycle + Send + Sync + 'static,
{
    pub fn new(
        payment_repo: Arc<P>,
        booking_repo: Arc<B>,
        gateway: Arc<G>,
        bookings: Arc<L>,
        provider: String,
    ) -> Self {
        Self {
            payment_repo,
            booking_repo,
            gateway,
            bookings,
            provider,
        }
    }

    pub async fn create_intent(
        &self,
        user_id: Uuid,
        booking_id: Uuid,
        method: PaymentMethod,
        client_ip: String,
    ) -> PaymentResult<CheckoutDto> {
        let booking = self
            .booking_repo
            .find_by_id(booking_id)
            .await?
            .ok_or(PaymentError::BookingNotFound)?;

        if booking.user_id != user_id {
            return Err(PaymentError::Forbidden);
        }
        if BookingStatus::from_str(&booking.status) != Some(BookingStatus::Pending) {
            return Err(PaymentError::InvalidTransition(
                "only a pending booking can be paid".to_string(),
            ));
        }

        if let Some(active) = self.payment_repo.find_active_for_booking(booking_id).await? {
            match PaymentStatus::from_str(&active.status) {
                Some(PaymentStatus::Completed) => {
                    return Err(PaymentError::InvalidTransition(
                        "the booking is already paid".to_string(),
                    ));
                }
                _ => {
                    // A stale intent the user abandoned; the new attempt wins.
                    let superseded = self
                        .payment_repo
                        .supersede_pending(
                            booking_id,
                            "superseded by a new payment intent".to_string(),
                        )
                        .await?;
                    info!(%booking_id, superseded, "payments: superseded pending intent");
                }
            }
        }

        let now = Utc::now();
        let order_ref = order_ref_for(booking_id, now);

        let payment = self
            .payment_repo
            .create(InsertPaymentEntity {
                booking_id,
                amount_minor: booking.total_price_minor,
                method: method.to_string(),
                provider: self.provider.clone(),
                order_ref: order_ref.clone(),
                status: PaymentStatus::Pending.to_string(),
            })
            .await?;

        self.booking_repo
            .set_payment_id(booking_id, payment.id)
            .await?;

        let redirect_url = self.gateway.build_redirect_url(&GatewayIntent {
            order_ref,
            amount_minor: payment.amount_minor,
            order_info: format!("Tickets for booking {}", booking.booking_code),
            client_ip,
            created_at: now,
        })?;

        info!(
            %booking_id,
            payment_id = %payment.id,
            method = %method,
            "payments: created intent"
        );

        Ok(CheckoutDto {
            payment_id: payment.id,
            redirect_url,
        })
    }

    /// Both the browser return and the server notification land here; the
    /// payment row's status CAS is the single convergence point, so replays,
    /// reorders and races all collapse onto one applied outcome.
    pub async fn handle_callback(
        &self,
        source: CallbackSource,
        params: HashMap<String, String>,
    ) -> PaymentResult<CallbackResolution> {
        if !self.gateway.verify_callback(&params) {
            warn!(?source, "payments: callback failed signature verification");
            return Err(PaymentError::InvalidSignature);
        }

        let order_ref = params
            .get(gateway_client::PARAM_TXN_REF)
            .ok_or(PaymentError::UnknownOrder)?;
        let booking_id =
            booking_id_from_order_ref(order_ref).ok_or(PaymentError::UnknownOrder)?;
        let payment = self
            .payment_repo
            .find_by_order_ref(order_ref.clone())
            .await?
            .ok_or(PaymentError::UnknownOrder)?;

        if let Some(amount) = params.get(gateway_client::PARAM_AMOUNT) {
            if amount.parse::<i64>().ok() != Some(i64::from(payment.amount_minor) * 100) {
                warn!(?source, payment_id = %payment.id, amount, "payments: callback amount mismatch");
                return Err(PaymentError::AmountMismatch);
            }
        }

        match PaymentStatus::from_str(&payment.status) {
            Some(PaymentStatus::Pending) => {}
            Some(PaymentStatus::Completed) => {
                info!(?source, payment_id = %payment.id, "payments: duplicate callback on completed payment");
                return Ok(Self::settled_resolution(PaymentStatus::Completed, booking_id));
            }
            Some(PaymentStatus::Failed) | Some(PaymentStatus::Refunded) => {
                return Ok(Self::settled_resolution(PaymentStatus::Failed, booking_id));
            }
            None => {
                return Err(PaymentError::Internal(anyhow::anyhow!(
                    "payment {} has unknown status {:?}",
                    payment.id,
                    payment.status
                )));
            }
        }

        let response_code = params
            .get(gateway_client::PARAM_RESPONSE_CODE)
            .map(String::as_str)
            .unwrap_or_default();

        if response_code == RESPONSE_CODE_SUCCESS {
            self.apply_success(source, &params, payment, booking_id).await
        } else {
            self.apply_failure(source, response_code, payment, booking_id)
                .await
        }
    }

    pub async fn refund(&self, payment_id: Uuid) -> PaymentResult<PaymentDto> {
        let payment = self
            .payment_repo
            .find_by_id(payment_id)
            .await?
            .ok_or(PaymentError::PaymentNotFound)?;

        match PaymentStatus::from_str(&payment.status) {
            Some(PaymentStatus::Refunded) => Ok(PaymentDto::from(payment)),
            Some(PaymentStatus::Completed) => {
                if self.payment_repo.refund(payment_id).await? {
                    self.bookings.cancel(payment.booking_id).await?;
                    info!(%payment_id, booking_id = %payment.booking_id, "payments: refunded");
                }

                let settled = self
                    .payment_repo
                    .find_by_id(payment_id)
                    .await?
                    .ok_or(PaymentError::PaymentNotFound)?;
                Ok(PaymentDto::from(settled))
            }
            _ => Err(PaymentError::InvalidTransition(
                "only a completed payment can be refunded".to_string(),
            )),
        }
    }

    async fn apply_success(
        &self,
        source: CallbackSource,
        params: &HashMap<String, String>,
        payment: PaymentEntity,
        booking_id: Uuid,
    ) -> PaymentResult<CallbackResolution> {
        let transaction_id = params.get(gateway_client::PARAM_TRANSACTION_NO).cloned();
        let paid_at = params
            .get(gateway_client::PARAM_PAY_DATE)
            .and_then(|raw| parse_gateway_date(raw))
            .unwrap_or_else(Utc::now);

        if !self
            .payment_repo
            .complete(payment.id, transaction_id, paid_at)
            .await?
        {
            // A concurrent callback won the CAS; answer with the settled state.
            let settled = self
                .payment_repo
                .find_by_id(payment.id)
                .await?
                .ok_or(PaymentError::UnknownOrder)?;
            let status =
                PaymentStatus::from_str(&settled.status).unwrap_or(PaymentStatus::Failed);
            return Ok(Self::settled_resolution(status, booking_id));
        }

        match self.bookings.confirm(booking_id).await {
            Ok(_) => {
                info!(?source, payment_id = %payment.id, %booking_id, "payments: completed and confirmed");
                Ok(CallbackResolution {
                    outcome: CallbackOutcome::Success,
                    booking_id,
                    duplicate: false,
                    message: "payment confirmed".to_string(),
                })
            }
            Err(err) => {
                // Money captured but the booking cannot confirm (for example
                // the expiry sweeper cancelled it moments earlier). The
                // payment stays COMPLETED and waits for an operator refund.
                error!(
                    ?source,
                    payment_id = %payment.id,
                    %booking_id,
                    error = ?err,
                    "payments: completed payment could not confirm its booking"
                );
                Ok(CallbackResolution {
                    outcome: CallbackOutcome::Failure,
                    booking_id,
                    duplicate: false,
                    message: "payment received but the booking could not be confirmed; please contact support".to_string(),
                })
            }
        }
    }

    async fn apply_failure(
        &self,
        source: CallbackSource,
        response_code: &str,
        payment: PaymentEntity,
        booking_id: Uuid,
    ) -> PaymentResult<CallbackResolution> {
        if !self
            .payment_repo
            .fail(
                payment.id,
                format!("gateway declined with code {response_code}"),
            )
            .await?
        {
            let settled = self
                .payment_repo
                .find_by_id(payment.id)
                .await?
                .ok_or(PaymentError::UnknownOrder)?;
            let status =
                PaymentStatus::from_str(&settled.status).unwrap_or(PaymentStatus::Failed);
            return Ok(Self::settled_resolution(status, booking_id));
        }

        // The user may retry with another method, so only a still-pending
        // booking is cancelled here.
        if let Err(err) = self.bookings.cancel_if_pending(booking_id).await {
            warn!(%booking_id, error = ?err, "payments: could not cancel booking after declined payment");
        }

        info!(?source, payment_id = %payment.id, %booking_id, response_code, "payments: gateway declined");
        Ok(CallbackResolution {
            outcome: CallbackOutcome::Failure,
            booking_id,
            duplicate: false,
            message: gateway_client::decline_message(response_code).to_string(),
        })
    }

    fn settled_resolution(status: PaymentStatus, booking_id: Uuid) -> CallbackResolution {
        match status {
            PaymentStatus::Completed => CallbackResolution {
                outcome: CallbackOutcome::Success,
                booking_id,
                duplicate: true,
                message: "payment already confirmed".to_string(),
            },
            _ => CallbackResolution {
                outcome: CallbackOutcome::Failure,
                booking_id,
                duplicate: true,
                message: "payment already settled as failed".to_string(),
            },
        }
    }
}
