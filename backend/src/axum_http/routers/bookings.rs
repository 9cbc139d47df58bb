use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{OriginalUri, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};
use chrono::Duration;
use crates::{
    application::usecases::bookings::BookingUseCase,
    domain::{
        events::SeatEventSender,
        repositories::{
            bookings::BookingRepository, notifications::BookingNotifier,
            showtime_seats::ShowtimeSeatRepository, showtimes::ShowtimeRepository,
        },
        value_objects::bookings::{CreateBookingModel, VerifyQrRequest},
    },
    infra::{
        db::{
            postgres::postgres_connection::PgPool,
            repositories::{
                bookings::BookingPostgres, showtime_seats::ShowtimeSeatPostgres,
                showtimes::ShowtimePostgres,
            },
        },
        notifications::TracingNotifier,
    },
};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::axum_http::error_responses::AppError;
use crate::config::config_model::DotEnvyConfig;

pub type BackendBookingUseCase =
    BookingUseCase<ShowtimePostgres, ShowtimeSeatPostgres, BookingPostgres, TracingNotifier>;

pub fn build_usecase(
    config: &DotEnvyConfig,
    db_pool: Arc<PgPool>,
    seat_events: SeatEventSender,
) -> BackendBookingUseCase {
    let showtime_repo = ShowtimePostgres::new(Arc::clone(&db_pool));
    let seat_repo = ShowtimeSeatPostgres::with_events(Arc::clone(&db_pool), seat_events);
    let booking_repo = BookingPostgres::new(db_pool);

    BookingUseCase::new(
        Arc::new(showtime_repo),
        Arc::new(seat_repo),
        Arc::new(booking_repo),
        Arc::new(TracingNotifier),
        Duration::seconds(config.booking.hold_ttl_seconds),
    )
}

pub fn routes(
    config: Arc<DotEnvyConfig>,
    db_pool: Arc<PgPool>,
    seat_events: SeatEventSender,
) -> Router {
    let bookings_usecase = build_usecase(&config, db_pool, seat_events);

    Router::new()
        .route("/", post(create_booking).get(list_bookings))
        .route("/verify-qr", post(verify_qr))
        .route("/code/:code", get(get_booking_by_code))
        .route("/:id", get(get_booking))
        .route("/:id/cancel", patch(cancel_booking))
        .route("/:id/extend", patch(extend_booking))
        .with_state(Arc::new(bookings_usecase))
}

pub async fn create_booking<S, H, B, N>(
    State(bookings_usecase): State<Arc<BookingUseCase<S, H, B, N>>>,
    auth: AuthUser,
    OriginalUri(uri): OriginalUri,
    Json(create_booking_model): Json<CreateBookingModel>,
) -> Result<impl IntoResponse, AppError>
where
    S: ShowtimeRepository + Send + Sync + 'static,
    H: ShowtimeSeatRepository + Send + Sync + 'static,
    B: BookingRepository + Send + Sync + 'static,
    N: BookingNotifier + Send + Sync + 'static,
{
    let booking = bookings_usecase
        .create(auth.user_id, create_booking_model)
        .await
        .map_err(|err| AppError::from_booking(err, uri.path()))?;

    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn list_bookings<S, H, B, N>(
    State(bookings_usecase): State<Arc<BookingUseCase<S, H, B, N>>>,
    auth: AuthUser,
    OriginalUri(uri): OriginalUri,
) -> Result<impl IntoResponse, AppError>
where
    S: ShowtimeRepository + Send + Sync + 'static,
    H: ShowtimeSeatRepository + Send + Sync + 'static,
    B: BookingRepository + Send + Sync + 'static,
    N: BookingNotifier + Send + Sync + 'static,
{
    let bookings = bookings_usecase
        .list(auth.user_id, auth.is_admin())
        .await
        .map_err(|err| AppError::from_booking(err, uri.path()))?;

    Ok(Json(bookings))
}

pub async fn get_booking<S, H, B, N>(
    State(bookings_usecase): State<Arc<BookingUseCase<S, H, B, N>>>,
    auth: AuthUser,
    OriginalUri(uri): OriginalUri,
    Path(booking_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError>
where
    S: ShowtimeRepository + Send + Sync + 'static,
    H: ShowtimeSeatRepository + Send + Sync + 'static,
    B: BookingRepository + Send + Sync + 'static,
    N: BookingNotifier + Send + Sync + 'static,
{
    let booking = bookings_usecase
        .get(booking_id, auth.user_id, auth.is_admin())
        .await
        .map_err(|err| AppError::from_booking(err, uri.path()))?;

    Ok(Json(booking))
}

pub async fn get_booking_by_code<S, H, B, N>(
    State(bookings_usecase): State<Arc<BookingUseCase<S, H, B, N>>>,
    auth: AuthUser,
    OriginalUri(uri): OriginalUri,
    Path(booking_code): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    S: ShowtimeRepository + Send + Sync + 'static,
    H: ShowtimeSeatRepository + Send + Sync + 'static,
    B: BookingRepository + Send + Sync + 'static,
    N: BookingNotifier + Send + Sync + 'static,
{
    let booking = bookings_usecase
        .get_by_code(booking_code, auth.user_id, auth.is_admin())
        .await
        .map_err(|err| AppError::from_booking(err, uri.path()))?;

    Ok(Json(booking))
}

pub async fn cancel_booking<S, H, B, N>(
    State(bookings_usecase): State<Arc<BookingUseCase<S, H, B, N>>>,
    auth: AuthUser,
    OriginalUri(uri): OriginalUri,
    Path(booking_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError>
where
    S: ShowtimeRepository + Send + Sync + 'static,
    H: ShowtimeSeatRepository + Send + Sync + 'static,
    B: BookingRepository + Send + Sync + 'static,
    N: BookingNotifier + Send + Sync + 'static,
{
    // Admins may cancel any booking, including confirmed ones (refund path);
    // users may only abandon their own pending bookings.
    let booking = if auth.is_admin() {
        bookings_usecase.cancel(booking_id).await
    } else {
        bookings_usecase.cancel_own(booking_id, auth.user_id).await
    }
    .map_err(|err| AppError::from_booking(err, uri.path()))?;

    Ok(Json(booking))
}

pub async fn extend_booking<S, H, B, N>(
    State(bookings_usecase): State<Arc<BookingUseCase<S, H, B, N>>>,
    auth: AuthUser,
    OriginalUri(uri): OriginalUri,
    Path(booking_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError>
where
    S: ShowtimeRepository + Send + Sync + 'static,
    H: ShowtimeSeatRepository + Send + Sync + 'static,
    B: BookingRepository + Send + Sync + 'static,
    N: BookingNotifier + Send + Sync + 'static,
{
    bookings_usecase
        .extend(booking_id, auth.user_id)
        .await
        .map_err(|err| AppError::from_booking(err, uri.path()))?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn verify_qr<S, H, B, N>(
    State(bookings_usecase): State<Arc<BookingUseCase<S, H, B, N>>>,
    auth: AuthUser,
    OriginalUri(uri): OriginalUri,
    Json(request): Json<VerifyQrRequest>,
) -> Result<impl IntoResponse, AppError>
where
    S: ShowtimeRepository + Send + Sync + 'static,
    H: ShowtimeSeatRepository + Send + Sync + 'static,
    B: BookingRepository + Send + Sync + 'static,
    N: BookingNotifier + Send + Sync + 'static,
{
    if !auth.is_staff() {
        return Err(AppError::forbidden(uri.path()));
    }

    let verdict = bookings_usecase
        .verify_qr(&request.payload)
        .await
        .map_err(|err| AppError::from_booking(err, uri.path()))?;

    Ok(Json(verdict))
}
