pub mod bookings;
pub mod payments;
pub mod showtime_seats;
pub mod showtimes;
