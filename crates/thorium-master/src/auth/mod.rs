//! Credentials for the Thorium master.
//!
//! Provides signed account, character and machine tokens plus password
//! hashing.

pub mod claims;
pub mod jwt;
pub mod password;

pub use claims::{Claims, Subject, TokenKind};
pub use jwt::{TokenAuthority, TokenError};
