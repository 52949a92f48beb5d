pub mod audit;
pub mod catalog;
pub mod config;
pub mod metrics;
pub mod routes;

pub use routes::{AppState, router};
