//! Player connect and disconnect coordination.

mod coordinator;

pub use coordinator::{ConnectError, PlayerConnectCoordinator};
