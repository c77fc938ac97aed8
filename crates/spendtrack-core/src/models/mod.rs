//! Data models for the spendtrack API.
//!
//! - Auth types: `LoginRequest`, `TokenPair`, `Profile`, `SignupRequest`
//! - `Category` and `Expense` with their create/update payloads
//! - Report query parameters and the trend series

pub mod auth;
pub mod category;
pub mod expense;
pub mod report;

pub use auth::{LoginRequest, Profile, RefreshRequest, RefreshResponse, SignupRequest, TokenPair};
pub use category::{Category, CategoryPayload, CategoryUpdate};
pub use expense::{Expense, ExpensePayload, ExpenseUpdate};
pub use report::{
    ByCategoryParams, Dashboard, Granularity, SummaryParams, TrendFilters, TrendParams, TrendPoint,
    TrendResponse,
};
