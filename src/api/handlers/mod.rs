pub mod auth;
pub mod bookings;
pub mod checkin;
pub mod host_accounts;
pub mod root;
pub mod webhooks;
