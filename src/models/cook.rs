use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Cook {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub kitchen_name: String,
    pub panchayat: String,
    pub ward: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Allocation of one food item to one cook.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CookDish {
    pub id: Uuid,
    pub cook_id: Uuid,
    pub food_item_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(AppError::DatabaseError(format!("Unknown request status: {}", other))),
        }
    }
}

/// A cook asking to be allocated a dish.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CookDishRequest {
    pub id: Uuid,
    pub cook_id: Uuid,
    pub food_item_id: Uuid,
    pub status: RequestStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}
