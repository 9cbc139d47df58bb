use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{OriginalUri, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    routing::{get, post},
};
use crates::{
    application::usecases::{
        bookings::BookingLifecycle,
        payments::{PaymentError, PaymentGateway, PaymentUseCase},
    },
    domain::{
        events::SeatEventSender,
        repositories::{bookings::BookingRepository, payments::PaymentRepository},
        value_objects::{
            enums::payment_methods::PaymentMethod,
            payments::{CallbackOutcome, CallbackSource},
        },
    },
    infra::db::{
        postgres::postgres_connection::PgPool,
        repositories::{bookings::BookingPostgres, payments::PaymentPostgres},
    },
    payments::gateway_client::{
        self, GatewayConfig, RedirectGatewayClient, SignatureAlgo,
    },
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::axum_http::error_responses::AppError;
use crate::axum_http::routers::bookings::build_usecase;
use crate::config::config_model::DotEnvyConfig;

pub const GATEWAY_NAME: &str = "vnpay";

pub struct PaymentsState<P, B, G, L>
where
    P: PaymentRepository + Send + Sync + 'static,
    B: BookingRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    L: BookingLifecycle + Send + Sync + 'static,
{
    pub payments_usecase: PaymentUseCase<P, B, G, L>,
    pub frontend_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub booking_id: Uuid,
    pub method: PaymentMethod,
}

/// The acknowledgement body the gateway expects from the IPN endpoint.
#[derive(Debug, Serialize)]
pub struct IpnAck {
    #[serde(rename = "RspCode")]
    pub rsp_code: String,
    #[serde(rename = "Message")]
    pub message: String,
}

impl IpnAck {
    fn new(rsp_code: &str, message: &str) -> Self {
        Self {
            rsp_code: rsp_code.to_string(),
            message: message.to_string(),
        }
    }
}

pub fn routes(
    config: Arc<DotEnvyConfig>,
    db_pool: Arc<PgPool>,
    seat_events: SeatEventSender,
) -> Router {
    let bookings_usecase = Arc::new(build_usecase(
        &config,
        Arc::clone(&db_pool),
        seat_events,
    ));

    let gateway = Arc::new(RedirectGatewayClient::new(GatewayConfig {
        tmn_code: config.vnpay.tmn_code.clone(),
        hash_secret: config.vnpay.hash_secret.clone(),
        pay_url: config.vnpay.pay_url.clone(),
        return_url: config.vnpay.return_url.clone(),
        algo: SignatureAlgo::HmacSha512,
    }));

    let payment_repo = Arc::new(PaymentPostgres::new(Arc::clone(&db_pool)));
    let booking_repo = Arc::new(BookingPostgres::new(db_pool));

    let payments_usecase = PaymentUseCase::new(
        payment_repo,
        booking_repo,
        gateway,
        bookings_usecase,
        GATEWAY_NAME.to_string(),
    );

    let state = Arc::new(PaymentsState {
        payments_usecase,
        frontend_url: config.frontend_url.clone(),
    });

    Router::new()
        .route("/:gateway/create", post(create_payment))
        .route("/vnpay-return", get(handle_return))
        .route("/vnpay-ipn", post(handle_ipn))
        .route("/refund/:id", post(refund_payment))
        .with_state(state)
}

pub async fn create_payment<P, B, G, L>(
    State(state): State<Arc<PaymentsState<P, B, G, L>>>,
    auth: AuthUser,
    OriginalUri(uri): OriginalUri,
    Path(gateway): Path<String>,
    headers: HeaderMap,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse, AppError>
where
    P: PaymentRepository + Send + Sync + 'static,
    B: BookingRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    L: BookingLifecycle + Send + Sync + 'static,
{
    if gateway != GATEWAY_NAME {
        return Err(AppError::not_found(uri.path()));
    }

    let checkout = state
        .payments_usecase
        .create_intent(
            auth.user_id,
            request.booking_id,
            request.method,
            client_ip(&headers),
        )
        .await
        .map_err(|err| AppError::from_payment(err, uri.path()))?;

    Ok((StatusCode::CREATED, Json(checkout)))
}

/// Browser redirect back from the gateway. Always lands the user on the
/// frontend's success or failure page, whatever happened internally.
pub async fn handle_return<P, B, G, L>(
    State(state): State<Arc<PaymentsState<P, B, G, L>>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse
where
    P: PaymentRepository + Send + Sync + 'static,
    B: BookingRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    L: BookingLifecycle + Send + Sync + 'static,
{
    let target = match state
        .payments_usecase
        .handle_callback(CallbackSource::Return, params)
        .await
    {
        Ok(resolution) if resolution.outcome == CallbackOutcome::Success => redirect_target(
            &state.frontend_url,
            "/payment/success",
            &[("bookingId", resolution.booking_id.to_string().as_str())],
        ),
        Ok(resolution) => redirect_target(
            &state.frontend_url,
            "/payment/failed",
            &[("message", resolution.message.as_str())],
        ),
        Err(err) => {
            warn!(error = %err, "payments: return callback rejected");
            redirect_target(
                &state.frontend_url,
                "/payment/failed",
                &[("message", user_message(&err).as_str())],
            )
        }
    };

    Redirect::to(&target)
}

/// Server-to-server notification; answered with the gateway's ack contract.
pub async fn handle_ipn<P, B, G, L>(
    State(state): State<Arc<PaymentsState<P, B, G, L>>>,
    Form(params): Form<HashMap<String, String>>,
) -> impl IntoResponse
where
    P: PaymentRepository + Send + Sync + 'static,
    B: BookingRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    L: BookingLifecycle + Send + Sync + 'static,
{
    let ack = match state
        .payments_usecase
        .handle_callback(CallbackSource::Ipn, params)
        .await
    {
        Ok(resolution) if resolution.duplicate => {
            IpnAck::new(gateway_client::ACK_ALREADY_CONFIRMED, "Order already confirmed")
        }
        Ok(_) => IpnAck::new(gateway_client::ACK_OK, "Confirm Success"),
        Err(PaymentError::InvalidSignature) => {
            IpnAck::new(gateway_client::ACK_INVALID_SIGNATURE, "Invalid signature")
        }
        Err(PaymentError::UnknownOrder) => {
            IpnAck::new(gateway_client::ACK_ORDER_NOT_FOUND, "Order not found")
        }
        Err(PaymentError::AmountMismatch) => {
            IpnAck::new(gateway_client::ACK_INVALID_AMOUNT, "Invalid amount")
        }
        Err(err) => {
            warn!(error = %err, "payments: ipn processing failed");
            IpnAck::new(gateway_client::ACK_UNKNOWN_ERROR, "Unknown error")
        }
    };

    Json(ack)
}

pub async fn refund_payment<P, B, G, L>(
    State(state): State<Arc<PaymentsState<P, B, G, L>>>,
    auth: AuthUser,
    OriginalUri(uri): OriginalUri,
    Path(payment_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError>
where
    P: PaymentRepository + Send + Sync + 'static,
    B: BookingRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    L: BookingLifecycle + Send + Sync + 'static,
{
    if !auth.is_admin() {
        return Err(AppError::forbidden(uri.path()));
    }

    let payment = state
        .payments_usecase
        .refund(payment_id)
        .await
        .map_err(|err| AppError::from_payment(err, uri.path()))?;

    Ok(Json(payment))
}

fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

fn redirect_target(frontend_url: &str, path: &str, params: &[(&str, &str)]) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    format!("{}{}?{}", frontend_url.trim_end_matches('/'), path, query)
}

fn user_message(err: &PaymentError) -> String {
    match err {
        PaymentError::InvalidSignature
        | PaymentError::UnknownOrder
        | PaymentError::AmountMismatch
        | PaymentError::InvalidTransition(_) => err.to_string(),
        _ => "payment processing failed".to_string(),
    }
}
