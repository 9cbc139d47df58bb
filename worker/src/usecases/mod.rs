pub mod expire_stale_bookings;
