pub mod fleet;
pub mod overlap;
pub mod reservation;
pub mod subscription;
pub mod user;

pub use fleet::Fleet;
pub use reservation::Reservation;
pub use subscription::Subscription;
pub use user::User;
