//! Portfolio-isolated storage for disposable read models.

pub mod portfolio_store;

pub use portfolio_store::{InMemoryPortfolioStore, PortfolioStore};
