//! Resource endpoints of the spendtrack API.
//!
//! Each submodule adds methods to [`ApiClient`](crate::ApiClient), so every
//! call goes through the same authenticated pipeline.

pub mod categories;
pub mod expenses;
pub mod reports;
