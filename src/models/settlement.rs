use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::order::OrderItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PayeeKind {
    Cook,
    Delivery,
}

impl PayeeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayeeKind::Cook => "cook",
            PayeeKind::Delivery => "delivery",
        }
    }
}

impl FromStr for PayeeKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cook" => Ok(PayeeKind::Cook),
            "delivery" => Ok(PayeeKind::Delivery),
            other => Err(AppError::DatabaseError(format!("Unknown payee kind: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Approved,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Pending => "pending",
            SettlementStatus::Approved => "approved",
        }
    }
}

impl FromStr for SettlementStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SettlementStatus::Pending),
            "approved" => Ok(SettlementStatus::Approved),
            other => Err(AppError::ValidationError(format!("Unknown settlement status: {}", other))),
        }
    }
}

/// Amount owed to a cook or a delivery agent for one delivered order.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Settlement {
    pub id: Uuid,
    pub order_id: Uuid,
    pub payee_kind: PayeeKind,
    pub payee_id: Uuid,
    pub amount: Decimal,
    pub status: SettlementStatus,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub payee_kind: PayeeKind,
    pub payee_id: Uuid,
    pub settlement_id: Option<Uuid>,
    pub amount: Decimal,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WalletSummary {
    pub payee_kind: PayeeKind,
    pub payee_id: Uuid,
    pub balance: Decimal,
    pub pending_amount: Decimal,
    pub transactions: Vec<WalletTransaction>,
}

/// Sums `total_price` per assigned cook. Every item must carry a cook.
pub fn cook_totals(items: &[OrderItem]) -> Result<BTreeMap<Uuid, Decimal>, AppError> {
    let mut totals = BTreeMap::new();
    for item in items {
        let cook_id = item.cook_id.ok_or_else(|| {
            AppError::InvalidTransition(format!("order item {} has no assigned cook", item.id))
        })?;
        *totals.entry(cook_id).or_insert(Decimal::ZERO) += item.total_price;
    }
    Ok(totals)
}
