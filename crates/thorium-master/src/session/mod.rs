//! Player sessions: one live session per account, held in an expiring cache.

pub mod cache;
pub mod store;

pub use cache::SessionCache;
pub use store::{SessionError, SessionStore};
