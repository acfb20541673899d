//! Game scheduling and provisioning.

mod service;
pub mod worker;


pub use service::{GameScheduler, SchedulerError, ServerInfo};
pub use worker::{LaunchError, WorkerClient};
