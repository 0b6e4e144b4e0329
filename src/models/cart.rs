use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::food::ServiceType;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartItem {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub food_item_id: Uuid,
    pub quantity: i32,
    pub added_at: DateTime<Utc>,
}

/// A cart line joined with the current catalog entry.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartLine {
    pub id: Uuid,
    pub food_item_id: Uuid,
    pub food_name: String,
    pub service_type: ServiceType,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub is_available: bool,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}
