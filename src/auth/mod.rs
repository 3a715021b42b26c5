//! Accounts, password digests and session tokens.

pub mod accounts;
pub mod password;

pub use accounts::{AccountService, IssuedSession};
pub use password::{hash_password, new_session_token, verify_password};
