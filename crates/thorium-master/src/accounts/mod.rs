//! Player accounts and characters.

mod service;

pub use service::{AccountError, AccountService};
