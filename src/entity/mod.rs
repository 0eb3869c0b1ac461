pub mod car;
pub mod car_availability;
pub mod car_category;
pub mod payment;
pub mod reservation;
pub mod review;
pub mod subscription;
pub mod subscription_type;
pub mod user;

pub use payment::{PaymentStatus, PaymentType};
pub use reservation::ReservationStatus;
pub use subscription::SubscriptionStatus;
pub use user::Role;
