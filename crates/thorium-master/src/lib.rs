//! Thorium Master Library
//!
//! Core functionality for the Thorium master coordinator:
//! - SQLite storage for accounts, characters, machines and games
//! - Signed tokens and password hashing
//! - Expiring player sessions
//! - Machine registry and game scheduling across worker hosts
//! - Player admission on behalf of game servers
//! - HTTP routes for clients, hosts and game servers

pub mod accounts;
pub mod auth;
pub mod connect;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod storage;
