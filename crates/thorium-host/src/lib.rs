//! Thorium Host Library
//!
//! Core functionality for a Thorium worker machine:
//! - Supervision of locally launched game server processes
//! - HTTP client for the master coordinator
//! - Periodic load reports to the master
//! - HTTP surface for the master and local game servers

pub mod heartbeat;
pub mod master;
pub mod server;
pub mod supervisor;
