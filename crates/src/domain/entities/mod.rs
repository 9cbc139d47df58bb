pub mod bookings;
pub mod payments;
pub mod seat_holds;
pub mod showtimes;
