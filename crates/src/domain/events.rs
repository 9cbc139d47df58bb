use tokio::sync::broadcast;
use uuid::Uuid;

/// Published after any primitive that mutates a showtime's seat state.
/// Delivery is best-effort: real-time subscribers (e.g. a seat-map push
/// gateway) may miss events, correctness never depends on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatStateChanged {
    pub showtime_id: Uuid,
}

pub type SeatEventSender = broadcast::Sender<SeatStateChanged>;

pub fn seat_event_channel(capacity: usize) -> (SeatEventSender, broadcast::Receiver<SeatStateChanged>) {
    broadcast::channel(capacity)
}

pub fn publish(events: &Option<SeatEventSender>, showtime_id: Uuid) {
    if let Some(tx) = events {
        let _ = tx.send(SeatStateChanged { showtime_id });
    }
}
