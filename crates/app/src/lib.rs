//! RentEase application layer: landlord and tenant operations over the billing engine.

pub mod app;
pub mod authz;
pub mod context;

pub use app::RentEase;
pub use app::errors::AppError;
pub use context::{Role, Session};
