use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::food::ServiceType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Preparing | OrderStatus::Ready
        )
    }

    /// Whether the workflow may move an order from `self` to `next`.
    ///
    /// The only backward edge is `preparing -> confirmed`, taken when every cook
    /// assignment of the order was rejected or timed out.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (from, Cancelled) => from.is_cancellable(),
            (Pending, Confirmed)
            | (Confirmed, Preparing)
            | (Preparing, Confirmed)
            | (Preparing, Ready)
            | (Ready, OutForDelivery)
            | (OutForDelivery, Delivered) => true,
            _ => false,
        }
    }

    /// Returns `next` if the edge is allowed, an `InvalidTransition` error otherwise.
    pub fn transition(&self, next: OrderStatus) -> Result<OrderStatus, AppError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(AppError::InvalidTransition(format!(
                "order cannot move from {} to {}",
                self, next
            )))
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "preparing" => Ok(OrderStatus::Preparing),
            "ready" => Ok(OrderStatus::Ready),
            "out_for_delivery" => Ok(OrderStatus::OutForDelivery),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(AppError::DatabaseError(format!("Unknown order status: {}", other))),
        }
    }
}

/// State of one cook's assignment on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CookStatus {
    Pending,
    Accepted,
    Rejected,
    TimedOut,
    Cancelled,
}

impl CookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CookStatus::Pending => "pending",
            CookStatus::Accepted => "accepted",
            CookStatus::Rejected => "rejected",
            CookStatus::TimedOut => "timed_out",
            CookStatus::Cancelled => "cancelled",
        }
    }

    /// Pending and accepted assignments still hold their items.
    pub fn is_live(&self) -> bool {
        matches!(self, CookStatus::Pending | CookStatus::Accepted)
    }
}

impl FromStr for CookStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CookStatus::Pending),
            "accepted" => Ok(CookStatus::Accepted),
            "rejected" => Ok(CookStatus::Rejected),
            "timed_out" => Ok(CookStatus::TimedOut),
            "cancelled" => Ok(CookStatus::Cancelled),
            other => Err(AppError::DatabaseError(format!("Unknown cook status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EventDetails {
    pub event_date: NaiveDate,
    pub guest_count: u32,
    pub venue: String,
    pub event_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub service_type: ServiceType,
    pub status: OrderStatus,
    pub panchayat: String,
    pub ward: i32,
    pub delivery_address: String,
    pub delivery_charge: Decimal,
    pub total_amount: Decimal,
    pub delivery_staff_id: Option<Uuid>,
    pub event_details: Option<EventDetails>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub food_item_id: Uuid,
    pub food_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub cook_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CookAssignment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub cook_id: Uuid,
    pub status: CookStatus,
    pub assigned_at: DateTime<Utc>,
    pub respond_by: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl CookAssignment {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == CookStatus::Pending && now > self.respond_by
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeliveryVehicle {
    pub id: Uuid,
    pub order_id: Uuid,
    pub staff_id: Uuid,
    pub vehicle_type: String,
    pub vehicle_number: String,
    pub recorded_at: DateTime<Utc>,
}

/// An order together with its lines and cook assignments.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub assignments: Vec<CookAssignment>,
    pub vehicle: Option<DeliveryVehicle>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn forward_sequence_is_allowed() {
        use OrderStatus::*;
        let path = [Pending, Confirmed, Preparing, Ready, OutForDelivery, Delivered];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn skipping_steps_is_rejected() {
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Preparing));
        assert!(!OrderStatus::Confirmed.can_transition_to(OrderStatus::Ready));
        assert!(!OrderStatus::Ready.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Ready.can_transition_to(OrderStatus::Preparing));
    }

    #[test]
    fn terminal_states_go_nowhere() {
        for next in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Preparing,
            OrderStatus::Cancelled,
        ] {
            assert!(!OrderStatus::Cancelled.can_transition_to(next));
            assert!(!OrderStatus::Delivered.can_transition_to(next));
        }
    }

    #[test]
    fn out_for_delivery_cannot_be_cancelled() {
        assert!(OrderStatus::Ready.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::OutForDelivery.can_transition_to(OrderStatus::Cancelled));
        assert!(matches!(
            OrderStatus::OutForDelivery.transition(OrderStatus::Cancelled),
            Err(AppError::InvalidTransition(_))
        ));
    }

    #[test]
    fn status_text_round_trips() {
        for status in [OrderStatus::OutForDelivery, OrderStatus::Cancelled] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn assignment_expiry_only_applies_to_pending() {
        let now = Utc::now();
        let mut assignment = CookAssignment {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            cook_id: Uuid::new_v4(),
            status: CookStatus::Pending,
            assigned_at: now - Duration::seconds(200),
            respond_by: now - Duration::seconds(80),
            responded_at: None,
        };
        assert!(assignment.is_expired(now));
        assignment.status = CookStatus::Accepted;
        assert!(!assignment.is_expired(now));
    }
}
