use serde_json::Value;
use tracing::debug;

use crate::api::{ApiClient, ApiError, RequestConfig};
use crate::models::{ByCategoryParams, Dashboard, SummaryParams, TrendParams, TrendResponse};

const SUMMARY_PATH: &str = "/api/reports/summary/";
const BY_CATEGORY_PATH: &str = "/api/reports/by-category/";
const TREND_PATH: &str = "/api/reports/trend/";

impl ApiClient {
    pub async fn report_summary(&self, params: &SummaryParams) -> Result<Value, ApiError> {
        self.get_json_with(SUMMARY_PATH, RequestConfig::with_params(params)?)
            .await
    }

    pub async fn report_by_category(&self, params: &ByCategoryParams) -> Result<Value, ApiError> {
        self.get_json_with(BY_CATEGORY_PATH, RequestConfig::with_params(params)?)
            .await
    }

    pub async fn report_trend(&self, params: &TrendParams) -> Result<TrendResponse, ApiError> {
        self.get_json_with(TREND_PATH, RequestConfig::with_params(params)?)
            .await
    }

    /// Fetch summary, per-category breakdown and trend concurrently.
    pub async fn dashboard(
        &self,
        summary: &SummaryParams,
        by_category: &ByCategoryParams,
        trend: &TrendParams,
    ) -> Result<Dashboard, ApiError> {
        let (summary, by_category, trend) = futures::try_join!(
            self.report_summary(summary),
            self.report_by_category(by_category),
            self.report_trend(trend),
        )?;
        debug!(points = trend.series.len(), "Dashboard loaded");
        Ok(Dashboard {
            summary,
            by_category,
            trend,
        })
    }
}
