use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    CloudKitchen,
    Homemade,
    IndoorEvents,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::CloudKitchen => "cloud_kitchen",
            ServiceType::Homemade => "homemade",
            ServiceType::IndoorEvents => "indoor_events",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cloud_kitchen" => Ok(ServiceType::CloudKitchen),
            "homemade" => Ok(ServiceType::Homemade),
            "indoor_events" => Ok(ServiceType::IndoorEvents),
            other => Err(AppError::ValidationError(format!("Unknown service type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FoodCategory {
    pub id: Uuid,
    pub name: String,
    pub service_type: ServiceType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FoodItem {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub category_id: Option<Uuid>,
    pub service_type: ServiceType,
    pub image_urls: Vec<String>,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FoodFilter {
    pub service_type: Option<ServiceType>,
    pub category_id: Option<Uuid>,
    pub available_only: Option<bool>,
}
