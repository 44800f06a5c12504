pub mod dto;
pub mod errors;
pub mod reports;
pub mod services;

pub use services::RentEase;
