//! Supervision of the game server processes running on this machine.

pub mod manager;

pub use manager::{ProcessInfo, ProcessSupervisor, SupervisorConfig, SupervisorError};
