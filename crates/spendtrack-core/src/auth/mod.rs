//! Authentication module for tokens and the user session.
//!
//! This module provides:
//! - `Tokens`: the access/refresh pair over a pluggable `TokenStore`
//!   (memory, cookie file, or OS keychain)
//! - `Session`: login, signup, profile, logout and startup hydration

pub mod session;
pub mod tokens;

pub use session::{Session, LOGIN_PATH, PROFILE_PATH, SIGNUP_PATH};
pub use tokens::{
    FileTokenStore, KeyringTokenStore, MemoryTokenStore, SameSite, StoredCookie, TokenStore,
    Tokens, ACCESS_KEY, REFRESH_KEY,
};
