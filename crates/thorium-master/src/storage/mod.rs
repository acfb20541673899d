//! SQLite storage for the Thorium master.
//!
//! Persists accounts, characters, machines and the game lifecycle tables.

mod db;
mod models;
mod queries;
mod queries_games;

#[cfg(test)]
mod tests;

pub use db::MasterDatabase;
pub use models::*;
pub use thorium_core::db::DatabaseError;
