use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::Rng;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::entities::bookings::{BookingEntity, InsertBookingEntity};
use crate::domain::repositories::bookings::{BookingRepository, DuplicateBookingCode};
use crate::domain::repositories::notifications::BookingNotifier;
use crate::domain::repositories::showtime_seats::ShowtimeSeatRepository;
use crate::domain::repositories::showtimes::ShowtimeRepository;
use crate::domain::value_objects::bookings::{BookingDto, CreateBookingModel, VerifyQrDto};
use crate::domain::value_objects::enums::booking_statuses::BookingStatus;
use crate::domain::value_objects::qr::QrPayload;
use crate::domain::value_objects::seat_holds::{HoldOutcome, SeatSnapshot};

pub const BOOKING_CODE_LEN: usize = 8;
const BOOKING_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MAX_CODE_ATTEMPTS: usize = 3;

pub fn generate_booking_code() -> String {
    let mut rng = rand::thread_rng();
    (0..BOOKING_CODE_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..BOOKING_CODE_ALPHABET.len());
            BOOKING_CODE_ALPHABET[idx] as char
        })
        .collect()
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("showtime not found")]
    ShowtimeNotFound,
    #[error("booking not found")]
    BookingNotFound,
    #[error("{}", .violations.join("; "))]
    Validation { violations: Vec<String> },
    #[error("seats unavailable: {}", .conflicting_seats.join(", "))]
    SeatsUnavailable { conflicting_seats: Vec<String> },
    #[error("could not allocate a unique booking code")]
    CodeExhausted,
    #[error("forbidden")]
    Forbidden,
    #[error("invalid booking state: {0}")]
    InvalidTransition(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl BookingError {
    pub fn status_code(&self) -> u16 {
        match self {
            BookingError::ShowtimeNotFound | BookingError::BookingNotFound => 404,
            BookingError::Validation { .. } | BookingError::InvalidTransition(_) => 400,
            BookingError::SeatsUnavailable { .. } | BookingError::CodeExhausted => 409,
            BookingError::Forbidden => 403,
            BookingError::Internal(_) => 500,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, BookingError>;

/// The booking lifecycle seam the payment coordinator and the expiry sweeper
/// drive. Implemented by `BookingUseCase`.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait BookingLifecycle: Send + Sync {
    async fn confirm(&self, booking_id: Uuid) -> UseCaseResult<BookingDto>;

    async fn cancel(&self, booking_id: Uuid) -> UseCaseResult<BookingDto>;

    /// Cancels only if the booking is still PENDING; returns whether this call
    /// performed the cancellation.
    async fn cancel_if_pending(&self, booking_id: Uuid) -> UseCaseResult<bool>;
}

pub struct BookingUseCase<S, H, B, N>
where
    S: ShowtimeRepository + Send + Sync + 'static,
    H: ShowtimeSeatRepository + Send + Sync + 'static,
    B: BookingRepository + Send + Sync + 'static,
    N: BookingNotifier + Send + Sync + 'static,
{
    showtime_repo: Arc<S>,
    seat_repo: Arc<H>,
    booking_repo: Arc<B>,
    notifier: Arc<N>,
    hold_window: Duration,
}

impl<S, H, B, N> BookingUseCase<S, H, B, N>
where
    S: ShowtimeRepository + Send + Sync + 'static,
    H: ShowtimeSeatRepository + Send + Sync + 'static,
    B: BookingRepository + Send + Sync + 'static,
    N: BookingNotifier + Send + Sync + 'static,
{
    pub fn new(
        showtime_repo: Arc<S>,
        seat_repo: Arc<H>,
        booking_repo: Arc<B>,
        notifier: Arc<N>,
        hold_window: Duration,
    ) -> Self {
        Self {
            showtime_repo,
            seat_repo,
            booking_repo,
            notifier,
            hold_window,
        }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        model: CreateBookingModel,
    ) -> UseCaseResult<BookingDto> {
        let seats = validate_seat_selection(&model.seats)?;

        let showtime = self
            .showtime_repo
            .find_by_id(model.showtime_id)
            .await?
            .ok_or(BookingError::ShowtimeNotFound)?;

        if seats.len() > showtime.capacity as usize {
            return Err(BookingError::Validation {
                violations: vec![format!(
                    "requested {} seats but the showtime capacity is {}",
                    seats.len(),
                    showtime.capacity
                )],
            });
        }

        // Price is frozen here; later showtime price changes never reprice
        // an existing booking.
        let total_price_minor = showtime.price_minor * seats.len() as i32;
        let booking_id = Uuid::new_v4();

        match self
            .seat_repo
            .try_hold(
                showtime.id,
                seats.clone(),
                booking_id,
                user_id,
                self.hold_window,
            )
            .await?
        {
            HoldOutcome::Acquired => {}
            HoldOutcome::Conflict { conflicting_seats } => {
                return Err(BookingError::SeatsUnavailable { conflicting_seats });
            }
        }

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let insert_booking_entity = InsertBookingEntity {
                id: booking_id,
                booking_code: generate_booking_code(),
                user_id,
                showtime_id: showtime.id,
                seats: seats.clone(),
                total_price_minor,
                status: BookingStatus::Pending.to_string(),
            };

            match self.booking_repo.create(insert_booking_entity).await {
                Ok(entity) => {
                    info!(
                        booking_id = %entity.id,
                        booking_code = %entity.booking_code,
                        %user_id,
                        seats = ?seats,
                        total_price_minor,
                        "bookings: created"
                    );
                    return Ok(BookingDto::from(entity));
                }
                Err(err) if err.downcast_ref::<DuplicateBookingCode>().is_some() => {
                    warn!(%booking_id, attempt, "bookings: booking code collision, regenerating");
                }
                Err(err) => {
                    self.release_after_failed_create(showtime.id, &seats, booking_id)
                        .await;
                    return Err(BookingError::Internal(err));
                }
            }
        }

        self.release_after_failed_create(showtime.id, &seats, booking_id)
            .await;
        Err(BookingError::CodeExhausted)
    }

    pub async fn confirm(&self, booking_id: Uuid) -> UseCaseResult<BookingDto> {
        let booking = self
            .booking_repo
            .find_by_id(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound)?;

        match booking_status(&booking)? {
            BookingStatus::Confirmed => {
                // Idempotent replay. Re-asserting the promotion is a no-op
                // when the seats are booked, and heals a crash that landed
                // between the status flip and the promotion.
                self.seat_repo
                    .promote(booking.showtime_id, booking.seats.clone())
                    .await?;
                Ok(BookingDto::from(booking))
            }
            BookingStatus::Cancelled => Err(cannot_confirm_cancelled()),
            BookingStatus::Pending => {
                match self
                    .booking_repo
                    .transition_status(booking_id, BookingStatus::Pending, BookingStatus::Confirmed)
                    .await?
                {
                    Some(updated) => {
                        // Must not be unwound past this point; the status
                        // transition is already durable.
                        self.seat_repo
                            .promote(updated.showtime_id, updated.seats.clone())
                            .await?;

                        let dto = BookingDto::from(updated);
                        let qr = QrPayload::from_booking(&dto, Utc::now());
                        if let Err(err) = self.notifier.booking_confirmed(dto.clone(), qr).await {
                            error!(
                                %booking_id,
                                error = ?err,
                                "bookings: confirmation notification failed"
                            );
                        }

                        info!(%booking_id, "bookings: confirmed");
                        Ok(dto)
                    }
                    None => {
                        // Lost the CAS; settle on whatever state won.
                        let current = self
                            .booking_repo
                            .find_by_id(booking_id)
                            .await?
                            .ok_or(BookingError::BookingNotFound)?;
                        match booking_status(&current)? {
                            BookingStatus::Confirmed => Ok(BookingDto::from(current)),
                            _ => Err(cannot_confirm_cancelled()),
                        }
                    }
                }
            }
        }
    }

    pub async fn cancel(&self, booking_id: Uuid) -> UseCaseResult<BookingDto> {
        let booking = self
            .booking_repo
            .find_by_id(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound)?;

        match booking_status(&booking)? {
            BookingStatus::Cancelled => Ok(BookingDto::from(booking)),
            BookingStatus::Pending => {
                match self
                    .booking_repo
                    .transition_status(booking_id, BookingStatus::Pending, BookingStatus::Cancelled)
                    .await?
                {
                    Some(updated) => {
                        self.release_holds(&updated).await;
                        info!(%booking_id, "bookings: cancelled");
                        Ok(BookingDto::from(updated))
                    }
                    None => {
                        let current = self
                            .booking_repo
                            .find_by_id(booking_id)
                            .await?
                            .ok_or(BookingError::BookingNotFound)?;
                        match booking_status(&current)? {
                            BookingStatus::Cancelled => Ok(BookingDto::from(current)),
                            BookingStatus::Confirmed => self.cancel_confirmed(current).await,
                            BookingStatus::Pending => Err(BookingError::Internal(anyhow::anyhow!(
                                "booking {booking_id} stayed pending through a failed cancel CAS"
                            ))),
                        }
                    }
                }
            }
            BookingStatus::Confirmed => self.cancel_confirmed(booking).await,
        }
    }

    pub async fn cancel_if_pending(&self, booking_id: Uuid) -> UseCaseResult<bool> {
        let booking = self
            .booking_repo
            .find_by_id(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound)?;

        if booking_status(&booking)? != BookingStatus::Pending {
            return Ok(false);
        }

        match self
            .booking_repo
            .transition_status(booking_id, BookingStatus::Pending, BookingStatus::Cancelled)
            .await?
        {
            Some(updated) => {
                self.release_holds(&updated).await;
                info!(%booking_id, "bookings: cancelled while pending");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// User-facing cancel: owner only, and only before payment. A paid
    /// booking is cancellable solely through the refund path.
    pub async fn cancel_own(&self, booking_id: Uuid, user_id: Uuid) -> UseCaseResult<BookingDto> {
        let booking = self
            .booking_repo
            .find_by_id(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound)?;

        if booking.user_id != user_id {
            return Err(BookingError::Forbidden);
        }

        match booking_status(&booking)? {
            BookingStatus::Cancelled => Ok(BookingDto::from(booking)),
            BookingStatus::Pending => self.cancel(booking_id).await,
            BookingStatus::Confirmed => Err(BookingError::InvalidTransition(
                "a paid booking can only be cancelled through a refund".to_string(),
            )),
        }
    }

    pub async fn extend(&self, booking_id: Uuid, user_id: Uuid) -> UseCaseResult<()> {
        let booking = self
            .booking_repo
            .find_by_id(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound)?;

        if booking.user_id != user_id {
            return Err(BookingError::Forbidden);
        }
        if booking_status(&booking)? != BookingStatus::Pending {
            return Err(BookingError::InvalidTransition(
                "only a pending booking can be extended".to_string(),
            ));
        }

        let extended = self
            .seat_repo
            .extend_holds(booking.showtime_id, booking_id, self.hold_window)
            .await?;

        if extended == 0 {
            return Err(BookingError::InvalidTransition(
                "the seat holds already expired".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn get(
        &self,
        booking_id: Uuid,
        user_id: Uuid,
        is_admin: bool,
    ) -> UseCaseResult<BookingDto> {
        let booking = self
            .booking_repo
            .find_by_id(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound)?;

        if !is_admin && booking.user_id != user_id {
            return Err(BookingError::Forbidden);
        }
        Ok(BookingDto::from(booking))
    }

    pub async fn get_by_code(
        &self,
        booking_code: String,
        user_id: Uuid,
        is_admin: bool,
    ) -> UseCaseResult<BookingDto> {
        let booking = self
            .booking_repo
            .find_by_code(booking_code)
            .await?
            .ok_or(BookingError::BookingNotFound)?;

        if !is_admin && booking.user_id != user_id {
            return Err(BookingError::Forbidden);
        }
        Ok(BookingDto::from(booking))
    }

    pub async fn list(&self, user_id: Uuid, is_admin: bool) -> UseCaseResult<Vec<BookingDto>> {
        let bookings = if is_admin {
            self.booking_repo.list_all().await?
        } else {
            self.booking_repo.list_for_user(user_id).await?
        };
        Ok(bookings.into_iter().map(BookingDto::from).collect())
    }

    pub async fn seat_snapshot(&self, showtime_id: Uuid) -> UseCaseResult<SeatSnapshot> {
        self.seat_repo
            .snapshot(showtime_id)
            .await?
            .ok_or(BookingError::ShowtimeNotFound)
    }

    pub async fn verify_qr(&self, raw_payload: &str) -> UseCaseResult<VerifyQrDto> {
        let payload = match QrPayload::parse(raw_payload) {
            Ok(payload) => payload,
            Err(_) => return Ok(VerifyQrDto::rejected("unreadable ticket payload")),
        };

        if !payload.is_fresh(Utc::now()) {
            return Ok(VerifyQrDto::rejected("ticket expired"));
        }

        let Some(booking) = self.booking_repo.find_by_id(payload.booking_id).await? else {
            return Ok(VerifyQrDto::rejected("booking not found"));
        };
        let dto = BookingDto::from(booking);

        if dto.booking_code != payload.booking_code
            || dto.user_id != payload.user_id
            || dto.showtime_id != payload.showtime_id
            || dto.seats != payload.seats
        {
            return Ok(VerifyQrDto::rejected("ticket does not match the booking"));
        }
        if dto.status != BookingStatus::Confirmed {
            return Ok(VerifyQrDto::rejected("booking is not confirmed"));
        }

        Ok(VerifyQrDto::ok(dto))
    }

    /// Refund path. The status CAS runs first, exactly like `confirm`: once
    /// the booking is durably cancelled no competing confirm can touch the
    /// seats, and only then do they go back to the pool.
    async fn cancel_confirmed(&self, booking: BookingEntity) -> UseCaseResult<BookingDto> {
        let booking_id = booking.id;

        match self
            .booking_repo
            .transition_status(
                booking_id,
                BookingStatus::Confirmed,
                BookingStatus::Cancelled,
            )
            .await?
        {
            Some(updated) => {
                // Must not be unwound past this point; the status transition
                // is already durable.
                self.reclaim_seats(&updated).await?;
                info!(%booking_id, "bookings: cancelled after confirmation (refund)");
                Ok(BookingDto::from(updated))
            }
            None => {
                let current = self
                    .booking_repo
                    .find_by_id(booking_id)
                    .await?
                    .ok_or(BookingError::BookingNotFound)?;
                match booking_status(&current)? {
                    BookingStatus::Cancelled => {
                        // A concurrent cancel won the CAS. Re-asserting the
                        // reclaim is an idempotent no-op when the winner got
                        // through, and heals a crash that landed between its
                        // status flip and its seat reclaim.
                        self.reclaim_seats(&current).await?;
                        Ok(BookingDto::from(current))
                    }
                    other => Err(BookingError::Internal(anyhow::anyhow!(
                        "booking {booking_id} moved to {other} during a refund cancel"
                    ))),
                }
            }
        }
    }

    /// Returns a refund-cancelled booking's seats to the pool: drops any
    /// leftover holds it still owns, then removes the seats from `booked`.
    async fn reclaim_seats(&self, booking: &BookingEntity) -> UseCaseResult<()> {
        self.seat_repo
            .release(booking.showtime_id, booking.seats.clone(), booking.id)
            .await?;
        self.seat_repo
            .revoke_booked(booking.showtime_id, booking.seats.clone())
            .await?;
        Ok(())
    }

    async fn release_holds(&self, booking: &BookingEntity) {
        // The booking is already cancelled; a failed release only delays the
        // seats until the hold TTL runs out, so log instead of surfacing.
        if let Err(err) = self
            .seat_repo
            .release(booking.showtime_id, booking.seats.clone(), booking.id)
            .await
        {
            warn!(
                booking_id = %booking.id,
                showtime_id = %booking.showtime_id,
                error = ?err,
                "bookings: failed to release holds after cancel"
            );
        }
    }

    async fn release_after_failed_create(
        &self,
        showtime_id: Uuid,
        seats: &[String],
        booking_id: Uuid,
    ) {
        if let Err(err) = self
            .seat_repo
            .release(showtime_id, seats.to_vec(), booking_id)
            .await
        {
            error!(
                %booking_id,
                %showtime_id,
                error = ?err,
                "bookings: failed to release holds after aborted create"
            );
        }
    }
}

#[async_trait]
impl<S, H, B, N> BookingLifecycle for BookingUseCase<S, H, B, N>
where
    S: ShowtimeRepository + Send + Sync + 'static,
    H: ShowtimeSeatRepository + Send + Sync + 'static,
    B: BookingRepository + Send + Sync + 'static,
    N: BookingNotifier + Send + Sync + 'static,
{
    async fn confirm(&self, booking_id: Uuid) -> UseCaseResult<BookingDto> {
        BookingUseCase::confirm(self, booking_id).await
    }

    async fn cancel(&self, booking_id: Uuid) -> UseCaseResult<BookingDto> {
        BookingUseCase::cancel(self, booking_id).await
    }

    async fn cancel_if_pending(&self, booking_id: Uuid) -> UseCaseResult<bool> {
        BookingUseCase::cancel_if_pending(self, booking_id).await
    }
}

fn booking_status(booking: &BookingEntity) -> UseCaseResult<BookingStatus> {
    BookingStatus::from_str(&booking.status).ok_or_else(|| {
        BookingError::Internal(anyhow::anyhow!(
            "booking {} has unknown status {:?}",
            booking.id,
            booking.status
        ))
    })
}

fn cannot_confirm_cancelled() -> BookingError {
    BookingError::InvalidTransition(
        "cannot confirm a cancelled booking; its seats may have been resold".to_string(),
    )
}

fn validate_seat_selection(seats: &[String]) -> UseCaseResult<Vec<String>> {
    let mut violations = Vec::new();

    if seats.is_empty() {
        violations.push("at least one seat must be selected".to_string());
    }
    if seats.iter().any(|seat| seat.trim().is_empty()) {
        violations.push("seat labels must not be blank".to_string());
    }

    let mut seen = HashSet::new();
    let duplicates: Vec<String> = seats
        .iter()
        .filter(|seat| !seen.insert(seat.as_str()))
        .cloned()
        .collect();
    if !duplicates.is_empty() {
        violations.push(format!("duplicate seats: {}", duplicates.join(", ")));
    }

    if !violations.is_empty() {
        return Err(BookingError::Validation { violations });
    }
    Ok(seats.to_vec())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::domain::entities::showtimes::ShowtimeEntity;
    use crate::domain::repositories::bookings::MockBookingRepository;
    use crate::domain::repositories::notifications::MockBookingNotifier;
    use crate::domain::repositories::showtime_seats::MockShowtimeSeatRepository;
    use crate::domain::repositories::showtimes::MockShowtimeRepository;
    use mockall::predicate::eq;

    const HOLD_WINDOW_MINUTES: i64 = 10;

    fn seats(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|label| label.to_string()).collect()
    }

    fn sample_showtime(price_minor: i32, capacity: i32) -> ShowtimeEntity {
        let now = Utc::now();
        ShowtimeEntity {
            id: Uuid::new_v4(),
            movie_title: "Movie".to_string(),
            auditorium: "Hall 1".to_string(),
            starts_at: now + Duration::hours(3),
            price_minor,
            capacity,
            booked_seats: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_booking(status: BookingStatus, seat_list: &[&str]) -> BookingEntity {
        let now = Utc::now();
        BookingEntity {
            id: Uuid::new_v4(),
            booking_code: "AB12CD34".to_string(),
            user_id: Uuid::new_v4(),
            showtime_id: Uuid::new_v4(),
            seats: seats(seat_list),
            total_price_minor: 100 * seat_list.len() as i32,
            status: status.to_string(),
            payment_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn entity_from_insert(insert: InsertBookingEntity) -> BookingEntity {
        let now = Utc::now();
        BookingEntity {
            id: insert.id,
            booking_code: insert.booking_code,
            user_id: insert.user_id,
            showtime_id: insert.showtime_id,
            seats: insert.seats,
            total_price_minor: insert.total_price_minor,
            status: insert.status,
            payment_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn usecase(
        showtime_repo: MockShowtimeRepository,
        seat_repo: MockShowtimeSeatRepository,
        booking_repo: MockBookingRepository,
        notifier: MockBookingNotifier,
    ) -> BookingUseCase<
        MockShowtimeRepository,
        MockShowtimeSeatRepository,
        MockBookingRepository,
        MockBookingNotifier,
    > {
        BookingUseCase::new(
            Arc::new(showtime_repo),
            Arc::new(seat_repo),
            Arc::new(booking_repo),
            Arc::new(notifier),
            Duration::minutes(HOLD_WINDOW_MINUTES),
        )
    }

    #[test]
    fn booking_codes_are_eight_uppercase_alphanumerics() {
        for _ in 0..100 {
            let code = generate_booking_code();
            assert_eq!(code.len(), BOOKING_CODE_LEN);
            assert!(
                code.chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
            );
        }
    }

    #[tokio::test]
    async fn create_freezes_the_price_and_holds_the_seats() {
        let user_id = Uuid::new_v4();
        let showtime = sample_showtime(100, 50);
        let showtime_id = showtime.id;

        let mut showtime_repo = MockShowtimeRepository::new();
        showtime_repo
            .expect_find_by_id()
            .with(eq(showtime_id))
            .returning(move |_| {
                let showtime = showtime.clone();
                Box::pin(async move { Ok(Some(showtime)) })
            });

        let mut seat_repo = MockShowtimeSeatRepository::new();
        seat_repo
            .expect_try_hold()
            .withf(move |st, requested, _, uid, ttl| {
                *st == showtime_id
                    && *requested == seats(&["A1", "A2"])
                    && *uid == user_id
                    && *ttl == Duration::minutes(HOLD_WINDOW_MINUTES)
            })
            .times(1)
            .returning(|_, _, _, _, _| Box::pin(async { Ok(HoldOutcome::Acquired) }));

        let mut booking_repo = MockBookingRepository::new();
        booking_repo
            .expect_create()
            .times(1)
            .returning(|insert| Box::pin(async move { Ok(entity_from_insert(insert)) }));

        let usecase = usecase(
            showtime_repo,
            seat_repo,
            booking_repo,
            MockBookingNotifier::new(),
        );

        let booking = usecase
            .create(
                user_id,
                CreateBookingModel {
                    showtime_id,
                    seats: seats(&["A1", "A2"]),
                },
            )
            .await
            .unwrap();

        assert_eq!(booking.total_price_minor, 200);
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.seats, seats(&["A1", "A2"]));
        assert_eq!(booking.booking_code.len(), BOOKING_CODE_LEN);
    }

    #[tokio::test]
    async fn create_rejects_empty_and_duplicate_seat_lists() {
        let usecase = usecase(
            MockShowtimeRepository::new(),
            MockShowtimeSeatRepository::new(),
            MockBookingRepository::new(),
            MockBookingNotifier::new(),
        );

        let err = usecase
            .create(
                Uuid::new_v4(),
                CreateBookingModel {
                    showtime_id: Uuid::new_v4(),
                    seats: vec![],
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        let err = usecase
            .create(
                Uuid::new_v4(),
                CreateBookingModel {
                    showtime_id: Uuid::new_v4(),
                    seats: seats(&["A1", "A1"]),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Validation { .. }));
    }

    #[tokio::test]
    async fn create_rejects_requests_beyond_capacity() {
        let showtime = sample_showtime(100, 1);
        let showtime_id = showtime.id;

        let mut showtime_repo = MockShowtimeRepository::new();
        showtime_repo.expect_find_by_id().returning(move |_| {
            let showtime = showtime.clone();
            Box::pin(async move { Ok(Some(showtime)) })
        });

        let usecase = usecase(
            showtime_repo,
            MockShowtimeSeatRepository::new(),
            MockBookingRepository::new(),
            MockBookingNotifier::new(),
        );

        let err = usecase
            .create(
                Uuid::new_v4(),
                CreateBookingModel {
                    showtime_id,
                    seats: seats(&["A1", "A2"]),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Validation { .. }));
    }

    #[tokio::test]
    async fn create_surfaces_seat_conflicts_without_persisting() {
        let showtime = sample_showtime(100, 10);
        let showtime_id = showtime.id;

        let mut showtime_repo = MockShowtimeRepository::new();
        showtime_repo.expect_find_by_id().returning(move |_| {
            let showtime = showtime.clone();
            Box::pin(async move { Ok(Some(showtime)) })
        });

        let mut seat_repo = MockShowtimeSeatRepository::new();
        seat_repo.expect_try_hold().returning(|_, _, _, _, _| {
            Box::pin(async {
                Ok(HoldOutcome::Conflict {
                    conflicting_seats: vec!["X".to_string()],
                })
            })
        });

        // No `create` expectation: persisting after a conflict would panic.
        let usecase = usecase(
            showtime_repo,
            seat_repo,
            MockBookingRepository::new(),
            MockBookingNotifier::new(),
        );

        let err = usecase
            .create(
                Uuid::new_v4(),
                CreateBookingModel {
                    showtime_id,
                    seats: seats(&["X"]),
                },
            )
            .await
            .unwrap_err();

        match err {
            BookingError::SeatsUnavailable { conflicting_seats } => {
                assert_eq!(conflicting_seats, seats(&["X"]));
            }
            other => panic!("expected SeatsUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_releases_holds_when_persistence_fails() {
        let showtime = sample_showtime(100, 10);
        let showtime_id = showtime.id;

        let mut showtime_repo = MockShowtimeRepository::new();
        showtime_repo.expect_find_by_id().returning(move |_| {
            let showtime = showtime.clone();
            Box::pin(async move { Ok(Some(showtime)) })
        });

        let mut seat_repo = MockShowtimeSeatRepository::new();
        seat_repo
            .expect_try_hold()
            .returning(|_, _, _, _, _| Box::pin(async { Ok(HoldOutcome::Acquired) }));
        seat_repo
            .expect_release()
            .withf(move |st, released, _| *st == showtime_id && *released == seats(&["B1"]))
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(()) }));

        let mut booking_repo = MockBookingRepository::new();
        booking_repo
            .expect_create()
            .returning(|_| Box::pin(async { Err(anyhow::anyhow!("insert failed")) }));

        let usecase = usecase(
            showtime_repo,
            seat_repo,
            booking_repo,
            MockBookingNotifier::new(),
        );

        let err = usecase
            .create(
                Uuid::new_v4(),
                CreateBookingModel {
                    showtime_id,
                    seats: seats(&["B1"]),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn create_retries_on_booking_code_collision() {
        let showtime = sample_showtime(100, 10);
        let showtime_id = showtime.id;

        let mut showtime_repo = MockShowtimeRepository::new();
        showtime_repo.expect_find_by_id().returning(move |_| {
            let showtime = showtime.clone();
            Box::pin(async move { Ok(Some(showtime)) })
        });

        let mut seat_repo = MockShowtimeSeatRepository::new();
        seat_repo
            .expect_try_hold()
            .returning(|_, _, _, _, _| Box::pin(async { Ok(HoldOutcome::Acquired) }));

        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_in_mock = Arc::clone(&attempts);
        let mut booking_repo = MockBookingRepository::new();
        booking_repo.expect_create().times(2).returning(move |insert| {
            let attempt = attempts_in_mock.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if attempt == 0 {
                    Err(anyhow::Error::new(DuplicateBookingCode))
                } else {
                    Ok(entity_from_insert(insert))
                }
            })
        });

        let usecase = usecase(
            showtime_repo,
            seat_repo,
            booking_repo,
            MockBookingNotifier::new(),
        );

        let booking = usecase
            .create(
                Uuid::new_v4(),
                CreateBookingModel {
                    showtime_id,
                    seats: seats(&["C1"]),
                },
            )
            .await
            .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(booking.status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn create_gives_up_after_exhausting_code_retries() {
        let showtime = sample_showtime(100, 10);
        let showtime_id = showtime.id;

        let mut showtime_repo = MockShowtimeRepository::new();
        showtime_repo.expect_find_by_id().returning(move |_| {
            let showtime = showtime.clone();
            Box::pin(async move { Ok(Some(showtime)) })
        });

        let mut seat_repo = MockShowtimeSeatRepository::new();
        seat_repo
            .expect_try_hold()
            .returning(|_, _, _, _, _| Box::pin(async { Ok(HoldOutcome::Acquired) }));
        seat_repo
            .expect_release()
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(()) }));

        let mut booking_repo = MockBookingRepository::new();
        booking_repo
            .expect_create()
            .times(MAX_CODE_ATTEMPTS)
            .returning(|_| Box::pin(async { Err(anyhow::Error::new(DuplicateBookingCode)) }));

        let usecase = usecase(
            showtime_repo,
            seat_repo,
            booking_repo,
            MockBookingNotifier::new(),
        );

        let err = usecase
            .create(
                Uuid::new_v4(),
                CreateBookingModel {
                    showtime_id,
                    seats: seats(&["D1"]),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::CodeExhausted));
    }

    #[tokio::test]
    async fn confirm_promotes_seats_and_notifies() {
        let booking = sample_booking(BookingStatus::Pending, &["A1", "A2"]);
        let booking_id = booking.id;
        let showtime_id = booking.showtime_id;

        let mut booking_repo = MockBookingRepository::new();
        let found = booking.clone();
        booking_repo.expect_find_by_id().returning(move |_| {
            let found = found.clone();
            Box::pin(async move { Ok(Some(found)) })
        });
        let confirmed = BookingEntity {
            status: BookingStatus::Confirmed.to_string(),
            ..booking.clone()
        };
        booking_repo
            .expect_transition_status()
            .with(
                eq(booking_id),
                eq(BookingStatus::Pending),
                eq(BookingStatus::Confirmed),
            )
            .times(1)
            .returning(move |_, _, _| {
                let confirmed = confirmed.clone();
                Box::pin(async move { Ok(Some(confirmed)) })
            });

        let mut seat_repo = MockShowtimeSeatRepository::new();
        seat_repo
            .expect_promote()
            .withf(move |st, promoted| *st == showtime_id && *promoted == seats(&["A1", "A2"]))
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));

        let mut notifier = MockBookingNotifier::new();
        notifier
            .expect_booking_confirmed()
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));

        let usecase = usecase(
            MockShowtimeRepository::new(),
            seat_repo,
            booking_repo,
            notifier,
        );

        let dto = usecase.confirm(booking_id).await.unwrap();
        assert_eq!(dto.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn confirm_is_idempotent_on_a_confirmed_booking() {
        let booking = sample_booking(BookingStatus::Confirmed, &["A1"]);
        let booking_id = booking.id;

        let mut booking_repo = MockBookingRepository::new();
        booking_repo.expect_find_by_id().returning(move |_| {
            let booking = booking.clone();
            Box::pin(async move { Ok(Some(booking)) })
        });

        let mut seat_repo = MockShowtimeSeatRepository::new();
        seat_repo
            .expect_promote()
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));

        // No transition, no notification on the replay.
        let usecase = usecase(
            MockShowtimeRepository::new(),
            seat_repo,
            booking_repo,
            MockBookingNotifier::new(),
        );

        let dto = usecase.confirm(booking_id).await.unwrap();
        assert_eq!(dto.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn confirm_rejects_a_cancelled_booking() {
        let booking = sample_booking(BookingStatus::Cancelled, &["A1"]);
        let booking_id = booking.id;

        let mut booking_repo = MockBookingRepository::new();
        booking_repo.expect_find_by_id().returning(move |_| {
            let booking = booking.clone();
            Box::pin(async move { Ok(Some(booking)) })
        });

        let usecase = usecase(
            MockShowtimeRepository::new(),
            MockShowtimeSeatRepository::new(),
            booking_repo,
            MockBookingNotifier::new(),
        );

        let err = usecase.confirm(booking_id).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidTransition(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn confirm_survives_a_notification_failure() {
        let booking = sample_booking(BookingStatus::Pending, &["A1"]);
        let booking_id = booking.id;

        let mut booking_repo = MockBookingRepository::new();
        let found = booking.clone();
        booking_repo.expect_find_by_id().returning(move |_| {
            let found = found.clone();
            Box::pin(async move { Ok(Some(found)) })
        });
        let confirmed = BookingEntity {
            status: BookingStatus::Confirmed.to_string(),
            ..booking.clone()
        };
        booking_repo
            .expect_transition_status()
            .returning(move |_, _, _| {
                let confirmed = confirmed.clone();
                Box::pin(async move { Ok(Some(confirmed)) })
            });

        let mut seat_repo = MockShowtimeSeatRepository::new();
        seat_repo
            .expect_promote()
            .returning(|_, _| Box::pin(async { Ok(()) }));

        let mut notifier = MockBookingNotifier::new();
        notifier
            .expect_booking_confirmed()
            .returning(|_, _| Box::pin(async { Err(anyhow::anyhow!("smtp down")) }));

        let usecase = usecase(
            MockShowtimeRepository::new(),
            seat_repo,
            booking_repo,
            notifier,
        );

        // The confirmation stands even though the receipt could not be sent.
        let dto = usecase.confirm(booking_id).await.unwrap();
        assert_eq!(dto.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn cancel_pending_releases_the_holds() {
        let booking = sample_booking(BookingStatus::Pending, &["A1", "A2"]);
        let booking_id = booking.id;
        let showtime_id = booking.showtime_id;

        let mut booking_repo = MockBookingRepository::new();
        let found = booking.clone();
        booking_repo.expect_find_by_id().returning(move |_| {
            let found = found.clone();
            Box::pin(async move { Ok(Some(found)) })
        });
        let cancelled = BookingEntity {
            status: BookingStatus::Cancelled.to_string(),
            ..booking.clone()
        };
        booking_repo
            .expect_transition_status()
            .with(
                eq(booking_id),
                eq(BookingStatus::Pending),
                eq(BookingStatus::Cancelled),
            )
            .times(1)
            .returning(move |_, _, _| {
                let cancelled = cancelled.clone();
                Box::pin(async move { Ok(Some(cancelled)) })
            });

        let mut seat_repo = MockShowtimeSeatRepository::new();
        seat_repo
            .expect_release()
            .withf(move |st, released, holder| {
                *st == showtime_id && *released == seats(&["A1", "A2"]) && *holder == booking_id
            })
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(()) }));

        let usecase = usecase(
            MockShowtimeRepository::new(),
            seat_repo,
            booking_repo,
            MockBookingNotifier::new(),
        );

        let dto = usecase.cancel(booking_id).await.unwrap();
        assert_eq!(dto.status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_confirmed_flips_the_status_before_reclaiming_seats() {
        let booking = sample_booking(BookingStatus::Confirmed, &["A1"]);
        let booking_id = booking.id;
        let showtime_id = booking.showtime_id;

        // A crash after the seat reclaim but before the CAS would leave a
        // CONFIRMED booking without its seats, so the order is load-bearing.
        let mut seq = mockall::Sequence::new();

        let mut booking_repo = MockBookingRepository::new();
        let found = booking.clone();
        booking_repo.expect_find_by_id().returning(move |_| {
            let found = found.clone();
            Box::pin(async move { Ok(Some(found)) })
        });
        let cancelled = BookingEntity {
            status: BookingStatus::Cancelled.to_string(),
            ..booking.clone()
        };
        booking_repo
            .expect_transition_status()
            .with(
                eq(booking_id),
                eq(BookingStatus::Confirmed),
                eq(BookingStatus::Cancelled),
            )
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_, _, _| {
                let cancelled = cancelled.clone();
                Box::pin(async move { Ok(Some(cancelled)) })
            });

        let mut seat_repo = MockShowtimeSeatRepository::new();
        seat_repo
            .expect_release()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Box::pin(async { Ok(()) }));
        seat_repo
            .expect_revoke_booked()
            .withf(move |st, revoked| *st == showtime_id && *revoked == seats(&["A1"]))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Box::pin(async { Ok(()) }));

        let usecase = usecase(
            MockShowtimeRepository::new(),
            seat_repo,
            booking_repo,
            MockBookingNotifier::new(),
        );

        let dto = usecase.cancel(booking_id).await.unwrap();
        assert_eq!(dto.status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_confirmed_reasserts_the_reclaim_after_losing_the_cas() {
        let booking = sample_booking(BookingStatus::Confirmed, &["A1"]);
        let booking_id = booking.id;

        let mut booking_repo = MockBookingRepository::new();
        let found = booking.clone();
        let cancelled = BookingEntity {
            status: BookingStatus::Cancelled.to_string(),
            ..booking.clone()
        };
        let lookups = Arc::new(AtomicUsize::new(0));
        let lookups_in_mock = Arc::clone(&lookups);
        booking_repo.expect_find_by_id().returning(move |_| {
            let row = if lookups_in_mock.fetch_add(1, Ordering::SeqCst) == 0 {
                found.clone()
            } else {
                cancelled.clone()
            };
            Box::pin(async move { Ok(Some(row)) })
        });
        booking_repo
            .expect_transition_status()
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(None) }));

        // The winner may have crashed between its CAS and its reclaim, so the
        // loser still frees the seats.
        let mut seat_repo = MockShowtimeSeatRepository::new();
        seat_repo
            .expect_release()
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(()) }));
        seat_repo
            .expect_revoke_booked()
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));

        let usecase = usecase(
            MockShowtimeRepository::new(),
            seat_repo,
            booking_repo,
            MockBookingNotifier::new(),
        );

        let dto = usecase.cancel(booking_id).await.unwrap();
        assert_eq!(dto.status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_is_idempotent_on_a_cancelled_booking() {
        let booking = sample_booking(BookingStatus::Cancelled, &["A1"]);
        let booking_id = booking.id;

        let mut booking_repo = MockBookingRepository::new();
        booking_repo.expect_find_by_id().returning(move |_| {
            let booking = booking.clone();
            Box::pin(async move { Ok(Some(booking)) })
        });

        let usecase = usecase(
            MockShowtimeRepository::new(),
            MockShowtimeSeatRepository::new(),
            booking_repo,
            MockBookingNotifier::new(),
        );

        let dto = usecase.cancel(booking_id).await.unwrap();
        assert_eq!(dto.status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_if_pending_is_a_noop_on_settled_bookings() {
        let booking = sample_booking(BookingStatus::Confirmed, &["A1"]);
        let booking_id = booking.id;

        let mut booking_repo = MockBookingRepository::new();
        booking_repo.expect_find_by_id().returning(move |_| {
            let booking = booking.clone();
            Box::pin(async move { Ok(Some(booking)) })
        });

        let usecase = usecase(
            MockShowtimeRepository::new(),
            MockShowtimeSeatRepository::new(),
            booking_repo,
            MockBookingNotifier::new(),
        );

        assert!(!usecase.cancel_if_pending(booking_id).await.unwrap());
    }

    #[tokio::test]
    async fn cancel_own_is_owner_and_pending_gated() {
        let booking = sample_booking(BookingStatus::Confirmed, &["A1"]);
        let booking_id = booking.id;
        let owner = booking.user_id;

        let mut booking_repo = MockBookingRepository::new();
        booking_repo.expect_find_by_id().returning(move |_| {
            let booking = booking.clone();
            Box::pin(async move { Ok(Some(booking)) })
        });

        let usecase = usecase(
            MockShowtimeRepository::new(),
            MockShowtimeSeatRepository::new(),
            booking_repo,
            MockBookingNotifier::new(),
        );

        let err = usecase
            .cancel_own(booking_id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Forbidden));

        let err = usecase.cancel_own(booking_id, owner).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn extend_requires_live_holds() {
        let booking = sample_booking(BookingStatus::Pending, &["A1"]);
        let booking_id = booking.id;
        let owner = booking.user_id;

        let mut booking_repo = MockBookingRepository::new();
        booking_repo.expect_find_by_id().returning(move |_| {
            let booking = booking.clone();
            Box::pin(async move { Ok(Some(booking)) })
        });

        let mut seat_repo = MockShowtimeSeatRepository::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_mock = Arc::clone(&calls);
        seat_repo.expect_extend_holds().returning(move |_, _, _| {
            let call = calls_in_mock.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(if call == 0 { 1 } else { 0 }) })
        });

        let usecase = usecase(
            MockShowtimeRepository::new(),
            seat_repo,
            booking_repo,
            MockBookingNotifier::new(),
        );

        usecase.extend(booking_id, owner).await.unwrap();

        let err = usecase.extend(booking_id, owner).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn list_scopes_to_the_caller_unless_admin() {
        let user_id = Uuid::new_v4();

        let mut booking_repo = MockBookingRepository::new();
        booking_repo
            .expect_list_for_user()
            .with(eq(user_id))
            .times(1)
            .returning(|_| Box::pin(async { Ok(vec![]) }));
        booking_repo
            .expect_list_all()
            .times(1)
            .returning(|| Box::pin(async { Ok(vec![]) }));

        let usecase = usecase(
            MockShowtimeRepository::new(),
            MockShowtimeSeatRepository::new(),
            booking_repo,
            MockBookingNotifier::new(),
        );

        usecase.list(user_id, false).await.unwrap();
        usecase.list(user_id, true).await.unwrap();
    }

    #[tokio::test]
    async fn verify_qr_accepts_a_matching_confirmed_booking() {
        let booking = sample_booking(BookingStatus::Confirmed, &["A1", "A2"]);
        let dto = BookingDto::from(booking.clone());
        let payload = QrPayload::from_booking(&dto, Utc::now()).encode().unwrap();

        let mut booking_repo = MockBookingRepository::new();
        booking_repo.expect_find_by_id().returning(move |_| {
            let booking = booking.clone();
            Box::pin(async move { Ok(Some(booking)) })
        });

        let usecase = usecase(
            MockShowtimeRepository::new(),
            MockShowtimeSeatRepository::new(),
            booking_repo,
            MockBookingNotifier::new(),
        );

        let verdict = usecase.verify_qr(&payload).await.unwrap();
        assert!(verdict.valid);
        assert_eq!(verdict.booking.unwrap().id, dto.id);
    }

    #[tokio::test]
    async fn verify_qr_rejects_stale_mismatched_or_unconfirmed_tickets() {
        let booking = sample_booking(BookingStatus::Pending, &["A1"]);
        let dto = BookingDto::from(booking.clone());

        let mut booking_repo = MockBookingRepository::new();
        booking_repo.expect_find_by_id().returning(move |_| {
            let booking = booking.clone();
            Box::pin(async move { Ok(Some(booking)) })
        });

        let usecase = usecase(
            MockShowtimeRepository::new(),
            MockShowtimeSeatRepository::new(),
            booking_repo,
            MockBookingNotifier::new(),
        );

        let verdict = usecase.verify_qr("{not json").await.unwrap();
        assert!(!verdict.valid);

        let stale = QrPayload::from_booking(&dto, Utc::now() - Duration::days(31))
            .encode()
            .unwrap();
        let verdict = usecase.verify_qr(&stale).await.unwrap();
        assert_eq!(verdict.reason.as_deref(), Some("ticket expired"));

        let mut wrong_code = QrPayload::from_booking(&dto, Utc::now());
        wrong_code.booking_code = "ZZZZZZZZ".to_string();
        let verdict = usecase
            .verify_qr(&wrong_code.encode().unwrap())
            .await
            .unwrap();
        assert_eq!(
            verdict.reason.as_deref(),
            Some("ticket does not match the booking")
        );

        // Matching ticket, but the booking was never paid.
        let unpaid = QrPayload::from_booking(&dto, Utc::now()).encode().unwrap();
        let verdict = usecase.verify_qr(&unpaid).await.unwrap();
        assert_eq!(verdict.reason.as_deref(), Some("booking is not confirmed"));
    }
}
