use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::events::{self, SeatEventSender};
use crate::domain::repositories::showtime_seats::ShowtimeSeatRepository;
use crate::domain::value_objects::seat_holds::{HoldOutcome, SeatSnapshot};

#[derive(Debug, Clone)]
struct HoldRecord {
    booking_id: Uuid,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ShowtimeSeats {
    capacity: i32,
    booked: Vec<String>,
    holds: HashMap<String, HoldRecord>,
}

impl ShowtimeSeats {
    fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.holds.len();
        self.holds.retain(|_, hold| hold.expires_at > now);
        before - self.holds.len()
    }
}

/// In-memory seat store. One mutex over all showtimes keeps every primitive
/// linearizable; contention is per-process and bounded by request volume, so
/// the single lock is fine for the store's users (tests, single-node setups).
pub struct ShowtimeSeatMemory {
    state: Mutex<HashMap<Uuid, ShowtimeSeats>>,
    events: Option<SeatEventSender>,
}

impl ShowtimeSeatMemory {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HashMap::new()),
            events: None,
        }
    }

    pub fn with_events(events: SeatEventSender) -> Self {
        Self {
            state: Mutex::new(HashMap::new()),
            events: Some(events),
        }
    }

    pub async fn register_showtime(&self, showtime_id: Uuid, capacity: i32) {
        let mut state = self.state.lock().await;
        state.entry(showtime_id).or_insert_with(|| ShowtimeSeats {
            capacity,
            ..Default::default()
        });
    }

    /// Introspection: who holds a seat right now, if anyone.
    pub async fn hold_for_seat(
        &self,
        showtime_id: Uuid,
        seat: &str,
    ) -> Option<(Uuid, Uuid, DateTime<Utc>)> {
        let state = self.state.lock().await;
        let showtime = state.get(&showtime_id)?;
        let hold = showtime.holds.get(seat)?;
        (hold.expires_at > Utc::now()).then_some((hold.booking_id, hold.user_id, hold.expires_at))
    }
}

impl Default for ShowtimeSeatMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ShowtimeSeatRepository for ShowtimeSeatMemory {
    async fn try_hold(
        &self,
        showtime_id: Uuid,
        seats: Vec<String>,
        booking_id: Uuid,
        user_id: Uuid,
        ttl: Duration,
    ) -> Result<HoldOutcome> {
        let mut state = self.state.lock().await;
        let showtime = state
            .get_mut(&showtime_id)
            .ok_or_else(|| anyhow::anyhow!("showtime {showtime_id} not found"))?;

        let now = Utc::now();
        showtime.purge_expired(now);

        let conflicting_seats: Vec<String> = seats
            .iter()
            .filter(|seat| showtime.booked.contains(*seat) || showtime.holds.contains_key(*seat))
            .cloned()
            .collect();

        if !conflicting_seats.is_empty() {
            return Ok(HoldOutcome::Conflict { conflicting_seats });
        }

        let expires_at = now + ttl;
        for seat in seats {
            showtime.holds.insert(
                seat,
                HoldRecord {
                    booking_id,
                    user_id,
                    expires_at,
                },
            );
        }

        drop(state);
        events::publish(&self.events, showtime_id);
        Ok(HoldOutcome::Acquired)
    }

    async fn promote(&self, showtime_id: Uuid, seats: Vec<String>) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(showtime) = state.get_mut(&showtime_id) else {
            return Ok(());
        };

        for seat in &seats {
            showtime.holds.remove(seat);
            if !showtime.booked.contains(seat) {
                showtime.booked.push(seat.clone());
            }
        }

        drop(state);
        events::publish(&self.events, showtime_id);
        Ok(())
    }

    async fn release(&self, showtime_id: Uuid, seats: Vec<String>, booking_id: Uuid) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(showtime) = state.get_mut(&showtime_id) else {
            return Ok(());
        };

        for seat in &seats {
            if showtime
                .holds
                .get(seat)
                .is_some_and(|hold| hold.booking_id == booking_id)
            {
                showtime.holds.remove(seat);
            }
        }

        drop(state);
        events::publish(&self.events, showtime_id);
        Ok(())
    }

    async fn revoke_booked(&self, showtime_id: Uuid, seats: Vec<String>) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(showtime) = state.get_mut(&showtime_id) else {
            return Ok(());
        };

        showtime.booked.retain(|seat| !seats.contains(seat));

        drop(state);
        events::publish(&self.events, showtime_id);
        Ok(())
    }

    async fn extend_holds(
        &self,
        showtime_id: Uuid,
        booking_id: Uuid,
        ttl: Duration,
    ) -> Result<usize> {
        let mut state = self.state.lock().await;
        let Some(showtime) = state.get_mut(&showtime_id) else {
            return Ok(0);
        };

        let now = Utc::now();
        let mut extended = 0;
        for hold in showtime.holds.values_mut() {
            if hold.booking_id == booking_id && hold.expires_at > now {
                hold.expires_at = now + ttl;
                extended += 1;
            }
        }

        Ok(extended)
    }

    async fn sweep_expired(&self, showtime_id: Option<Uuid>, now: DateTime<Utc>) -> Result<usize> {
        let mut state = self.state.lock().await;

        let released = match showtime_id {
            Some(showtime_id) => state
                .get_mut(&showtime_id)
                .map(|showtime| showtime.purge_expired(now))
                .unwrap_or(0),
            None => state
                .values_mut()
                .map(|showtime| showtime.purge_expired(now))
                .sum(),
        };

        Ok(released)
    }

    async fn snapshot(&self, showtime_id: Uuid) -> Result<Option<SeatSnapshot>> {
        let mut state = self.state.lock().await;
        let Some(showtime) = state.get_mut(&showtime_id) else {
            return Ok(None);
        };

        showtime.purge_expired(Utc::now());

        let mut held_seats: Vec<String> = showtime.holds.keys().cloned().collect();
        held_seats.sort();

        let available_count =
            showtime.capacity - showtime.booked.len() as i32 - held_seats.len() as i32;

        Ok(Some(SeatSnapshot {
            capacity: showtime.capacity,
            booked_seats: showtime.booked.clone(),
            held_seats,
            available_count,
        }))
    }
}
