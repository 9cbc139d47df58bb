pub mod bookings;
pub mod notifications;
pub mod payments;
pub mod showtime_seats;
pub mod showtimes;
