use serde::Serialize;

/// Result of a hold attempt. All-or-nothing: on conflict no hold was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldOutcome {
    Acquired,
    Conflict { conflicting_seats: Vec<String> },
}

impl HoldOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, HoldOutcome::Acquired)
    }
}

/// Availability view of a showtime after the inline expired-hold purge.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SeatSnapshot {
    pub capacity: i32,
    pub booked_seats: Vec<String>,
    pub held_seats: Vec<String>,
    pub available_count: i32,
}
