use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::delivery::DeliveryStaff;
use crate::models::food::ServiceType;
use crate::models::order::OrderStatus;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum NotificationType {
    OrderPlaced,
    OrderStatusChanged,
    OrderDelivered,
    SettlementApproved,
    DishRequestReviewed,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::OrderPlaced => "OrderPlaced",
            NotificationType::OrderStatusChanged => "OrderStatusChanged",
            NotificationType::OrderDelivered => "OrderDelivered",
            NotificationType::SettlementApproved => "SettlementApproved",
            NotificationType::DishRequestReviewed => "DishRequestReviewed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "OrderPlaced" => NotificationType::OrderPlaced,
            "OrderDelivered" => NotificationType::OrderDelivered,
            "SettlementApproved" => NotificationType::SettlementApproved,
            "DishRequestReviewed" => NotificationType::DishRequestReviewed,
            _ => NotificationType::OrderStatusChanged,
        }
    }
}

/// Persisted inbox entry for one profile.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Row-change event published on the in-process change feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub service_type: ServiceType,
    pub status: OrderStatus,
    pub panchayat: String,
    pub ward: i32,
    pub kind: OrderEventKind,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEventKind {
    Placed,
    StatusChanged,
    CookAssigned { cook_id: Uuid, respond_by: DateTime<Utc> },
    CookResponded { cook_id: Uuid, accepted: bool },
    DeliveryAssigned { staff_id: Uuid },
}

/// Whose point of view a change-feed subscriber watches from.
#[derive(Debug, Clone)]
pub enum FeedScope {
    Everything,
    Customer(Uuid),
    Cook(Uuid),
    Delivery(DeliveryStaff),
}

/// Per-subscriber event filter. Remembers the orders a cook or delivery agent
/// was handed so later status changes on them still reach that subscriber.
#[derive(Debug, Clone)]
pub struct FeedFilter {
    scope: FeedScope,
    service_type: Option<ServiceType>,
    followed: HashSet<Uuid>,
}

impl FeedFilter {
    pub fn new(scope: FeedScope, service_type: Option<ServiceType>) -> Self {
        Self {
            scope,
            service_type,
            followed: HashSet::new(),
        }
    }

    pub fn admits(&mut self, event: &OrderEvent) -> bool {
        if self.service_type.is_some_and(|s| s != event.service_type) {
            return false;
        }
        match &self.scope {
            FeedScope::Everything => true,
            FeedScope::Customer(id) => event.customer_id == *id,
            FeedScope::Cook(id) => {
                if let OrderEventKind::CookAssigned { cook_id, .. } = &event.kind {
                    if cook_id == id {
                        self.followed.insert(event.order_id);
                    }
                }
                self.followed.contains(&event.order_id)
            }
            FeedScope::Delivery(staff) => {
                if let OrderEventKind::DeliveryAssigned { staff_id } = &event.kind {
                    if *staff_id == staff.id {
                        self.followed.insert(event.order_id);
                    }
                }
                self.followed.contains(&event.order_id) || staff.covers(&event.panchayat, event.ward)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    CookAssignment,
    DeliveryRequest,
}

/// An order waiting for a staff member's response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PendingAlert {
    pub order_id: Uuid,
    pub kind: AlertKind,
    pub service_type: ServiceType,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingAlert {
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AlertView {
    pub order_id: Uuid,
    pub kind: AlertKind,
    pub service_type: ServiceType,
    pub seconds_remaining: i64,
    pub expires_at: DateTime<Utc>,
}
