//! Thorium Core Library
//!
//! Shared functionality for Thorium components:
//! - Domain model (characters, games) shared by master and hosts
//! - JSON wire contract between clients, hosts, game servers and the master
//! - Configuration resolution and hierarchy
//! - `SQLite` pool helpers and common error types

pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod tracing_init;
pub mod wire;

pub use config::Config;
pub use error::{Error, Result};
