use crate::database::sqlite::SqliteDatabase;
use crate::errors::{AppError, Result};
use crate::models::food::{FoodCategory, FoodFilter, FoodItem, ServiceType};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewFoodItem {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub category_id: Option<Uuid>,
    pub service_type: ServiceType,
    pub image_urls: Vec<String>,
}

pub struct CatalogService {
    database: Arc<SqliteDatabase>,
}

impl CatalogService {
    pub fn new(database: Arc<SqliteDatabase>) -> Self {
        Self { database }
    }

    pub async fn create_category(&self, name: &str, service_type: ServiceType) -> Result<FoodCategory> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::ValidationError("Category name is required".to_string()));
        }
        let category = FoodCategory {
            id: Uuid::new_v4(),
            name: name.to_string(),
            service_type,
            created_at: Utc::now(),
        };
        self.database.create_category(&category).await?;
        info!(action = "category_created", category_id = %category.id, service_type = %service_type);
        Ok(category)
    }

    pub async fn list_categories(&self, service_type: Option<ServiceType>) -> Result<Vec<FoodCategory>> {
        self.database.list_categories(service_type).await
    }

    pub async fn create_food_item(&self, new_item: NewFoodItem) -> Result<FoodItem> {
        let name = new_item.name.trim();
        if name.is_empty() {
            return Err(AppError::ValidationError("Food name is required".to_string()));
        }
        if new_item.price <= Decimal::ZERO {
            return Err(AppError::ValidationError("Price must be greater than zero".to_string()));
        }
        if let Some(category_id) = &new_item.category_id {
            let category = self.database.get_category(category_id).await?;
            if category.service_type != new_item.service_type {
                return Err(AppError::ValidationError(format!(
                    "Category '{}' belongs to {}",
                    category.name, category.service_type
                )));
            }
        }

        let now = Utc::now();
        let item = FoodItem {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: new_item.description,
            price: new_item.price.round_dp(2),
            category_id: new_item.category_id,
            service_type: new_item.service_type,
            image_urls: new_item.image_urls,
            is_available: true,
            created_at: now,
            updated_at: now,
        };
        self.database.create_food_item(&item).await?;
        info!(action = "food_item_created", food_item_id = %item.id, price = %item.price);
        Ok(item)
    }

    pub async fn get_food_item(&self, id: &Uuid) -> Result<FoodItem> {
        self.database.get_food_item(id).await
    }

    pub async fn list_food_items(&self, filter: &FoodFilter) -> Result<Vec<FoodItem>> {
        self.database.list_food_items(filter).await
    }

    pub async fn set_availability(&self, id: &Uuid, is_available: bool) -> Result<FoodItem> {
        self.database.set_food_availability(id, is_available, Utc::now()).await?;
        info!(action = "food_availability_changed", food_item_id = %id, is_available);
        self.database.get_food_item(id).await
    }
}
