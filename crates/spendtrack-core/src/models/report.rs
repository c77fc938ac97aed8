//! Report query parameters and response shapes.
//!
//! The summary and by-category endpoints return free-form JSON, so only the
//! trend series is typed.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
    Month,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
        };
        f.write_str(name)
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" => Ok(Granularity::Day),
            "week" => Ok(Granularity::Week),
            "month" => Ok(Granularity::Month),
            other => Err(format!("unknown granularity '{}' (expected day, week or month)", other)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SummaryParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_limit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_limit: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ByCategoryParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_uncategorized: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_n: Option<u32>,
}

/// Omitted granularity means the server default (`week`).
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrendParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granularity: Option<Granularity>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrendFilters {
    pub start: Option<String>,
    pub end: Option<String>,
    pub granularity: Granularity,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrendPoint {
    pub period: String,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrendResponse {
    pub filters: TrendFilters,
    #[serde(default)]
    pub series: Vec<TrendPoint>,
}

impl TrendResponse {
    pub fn total(&self) -> f64 {
        self.series.iter().map(|p| p.total).sum()
    }
}

/// Everything the dashboard shows, fetched together.
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub summary: Value,
    pub by_category: Value,
    pub trend: TrendResponse,
}
