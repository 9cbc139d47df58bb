use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{OriginalUri, Path, State},
    response::IntoResponse,
    routing::get,
};
use crates::{
    application::usecases::bookings::BookingUseCase,
    domain::{
        events::SeatEventSender,
        repositories::{
            bookings::BookingRepository, notifications::BookingNotifier,
            showtime_seats::ShowtimeSeatRepository, showtimes::ShowtimeRepository,
        },
    },
    infra::db::postgres::postgres_connection::PgPool,
};
use uuid::Uuid;

use crate::axum_http::error_responses::AppError;
use crate::axum_http::routers::bookings::build_usecase;
use crate::config::config_model::DotEnvyConfig;

pub fn routes(
    config: Arc<DotEnvyConfig>,
    db_pool: Arc<PgPool>,
    seat_events: SeatEventSender,
) -> Router {
    let bookings_usecase = build_usecase(&config, db_pool, seat_events);

    Router::new()
        .route("/:id/seats", get(seat_snapshot))
        .with_state(Arc::new(bookings_usecase))
}

/// Public availability endpoint; no auth so the seat map renders before login.
pub async fn seat_snapshot<S, H, B, N>(
    State(bookings_usecase): State<Arc<BookingUseCase<S, H, B, N>>>,
    OriginalUri(uri): OriginalUri,
    Path(showtime_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError>
where
    S: ShowtimeRepository + Send + Sync + 'static,
    H: ShowtimeSeatRepository + Send + Sync + 'static,
    B: BookingRepository + Send + Sync + 'static,
    N: BookingNotifier + Send + Sync + 'static,
{
    let snapshot = bookings_usecase
        .seat_snapshot(showtime_id)
        .await
        .map_err(|err| AppError::from_booking(err, uri.path()))?;

    Ok(Json(snapshot))
}
