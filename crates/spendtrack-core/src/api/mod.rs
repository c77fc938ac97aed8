//! REST API client module for the spendtrack server.
//!
//! This module provides the `ApiClient` for talking to the personal-finance
//! API. Requests carry a JWT bearer token; an expired access token is
//! refreshed once, shared by all concurrent requests, and the request is
//! replayed.

pub mod client;
pub mod error;
mod refresh;
pub mod transport;

pub use client::{ApiClient, RequestConfig, REFRESH_PATH};
pub use error::ApiError;
pub use transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport};
