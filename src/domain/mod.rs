pub mod user;
pub mod listing;
pub mod booking;
pub mod transaction;
pub mod host_account;
pub mod checkin;

pub use user::*;
pub use listing::*;
pub use booking::*;
pub use transaction::*;
pub use host_account::*;
pub use checkin::*;
