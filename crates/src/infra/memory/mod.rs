pub mod showtime_seats;
