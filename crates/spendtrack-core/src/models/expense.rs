use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub date: NaiveDate,
    pub category: i64,
    #[serde(default)]
    pub category_name: Option<String>,
    /// Decimal amount as the server formats it, e.g. "12.50"
    pub amount: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Expense {
    /// Category label for display, falling back to the id.
    pub fn category_label(&self) -> String {
        match self.category_name {
            Some(ref name) if !name.is_empty() => name.clone(),
            _ => format!("#{}", self.category),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpensePayload {
    pub date: NaiveDate,
    pub category: i64,
    pub amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Partial update; only the fields that are set are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExpenseUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
