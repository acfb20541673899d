//! HTTP surface of a worker host.

pub mod error;
pub mod routes;


pub use error::HostError;
pub use routes::{HostState, build_router};
