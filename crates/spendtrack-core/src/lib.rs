//! Spendtrack core - client library for a personal-finance REST API.
//!
//! - [`api`]: authenticated HTTP client with single-flight token refresh
//! - [`auth`]: token storage and the user session
//! - [`services`]: categories, expenses and reports endpoints
//! - [`models`]: request/response types
//! - [`config`]: file and environment configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod services;

pub use api::{ApiClient, ApiError, RequestConfig};
pub use auth::{Session, Tokens};
pub use config::{Config, TokenStoreKind};
