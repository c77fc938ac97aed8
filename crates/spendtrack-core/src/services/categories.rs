use crate::api::{ApiClient, ApiError};
use crate::models::{Category, CategoryPayload, CategoryUpdate};

const CATEGORIES_PATH: &str = "/api/categories/";

impl ApiClient {
    pub async fn list_categories(&self) -> Result<Vec<Category>, ApiError> {
        self.get_json(CATEGORIES_PATH).await
    }

    pub async fn create_category(&self, payload: &CategoryPayload) -> Result<Category, ApiError> {
        self.post_json(CATEGORIES_PATH, payload).await
    }

    pub async fn get_category(&self, id: i64) -> Result<Category, ApiError> {
        self.get_json(&format!("{}{}/", CATEGORIES_PATH, id)).await
    }

    pub async fn update_category(
        &self,
        id: i64,
        update: &CategoryUpdate,
    ) -> Result<Category, ApiError> {
        self.patch_json(&format!("{}{}/", CATEGORIES_PATH, id), update)
            .await
    }

    /// Deletion has its own route on the server: `/api/categories/{id}/delete/`.
    pub async fn delete_category(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("{}{}/delete/", CATEGORIES_PATH, id))
            .await?;
        Ok(())
    }
}
