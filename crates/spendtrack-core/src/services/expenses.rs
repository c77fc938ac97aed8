use crate::api::{ApiClient, ApiError};
use crate::models::{Expense, ExpensePayload, ExpenseUpdate};

const EXPENSES_PATH: &str = "/api/expenses/";

impl ApiClient {
    pub async fn list_expenses(&self) -> Result<Vec<Expense>, ApiError> {
        self.get_json(EXPENSES_PATH).await
    }

    pub async fn create_expense(&self, payload: &ExpensePayload) -> Result<Expense, ApiError> {
        self.post_json(EXPENSES_PATH, payload).await
    }

    pub async fn get_expense(&self, id: i64) -> Result<Expense, ApiError> {
        self.get_json(&format!("{}{}/", EXPENSES_PATH, id)).await
    }

    pub async fn update_expense(
        &self,
        id: i64,
        update: &ExpenseUpdate,
    ) -> Result<Expense, ApiError> {
        self.patch_json(&format!("{}{}/", EXPENSES_PATH, id), update)
            .await
    }

    pub async fn delete_expense(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("{}{}/", EXPENSES_PATH, id)).await?;
        Ok(())
    }
}
