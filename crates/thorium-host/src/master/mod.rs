//! Outbound calls from this host to the master coordinator.

pub mod client;

pub use client::{Forwarded, MasterClient, MasterClientError};
