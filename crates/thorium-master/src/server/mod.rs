//! HTTP surface of the master coordinator.

pub mod error;
pub mod extract;
pub mod routes;

#[cfg(test)]
pub mod test_helpers;

pub use error::ApiError;
pub use routes::{AppState, build_router};
