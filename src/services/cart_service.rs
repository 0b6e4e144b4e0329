use crate::database::sqlite::SqliteDatabase;
use crate::errors::{AppError, Result};
use crate::models::cart::CartLine;
use crate::models::food::ServiceType;
use crate::models::notification::{NotificationType, OrderEventKind};
use crate::models::order::{EventDetails, Order, OrderDetails, OrderItem, OrderStatus};
use crate::services::notification_service::NotificationService;
use crate::utils::validation::{Validator, MAX_LINE_QUANTITY};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone)]
pub struct Checkout {
    pub panchayat: String,
    pub ward: i32,
    pub delivery_address: String,
    pub notes: Option<String>,
    pub event_details: Option<EventDetails>,
}

pub struct CartService {
    database: Arc<SqliteDatabase>,
    notifications: Arc<NotificationService>,
    delivery_charge: Decimal,
}

impl CartService {
    pub fn new(
        database: Arc<SqliteDatabase>,
        notifications: Arc<NotificationService>,
        delivery_charge: Decimal,
    ) -> Self {
        Self {
            database,
            notifications,
            delivery_charge,
        }
    }

    pub async fn add_item(&self, customer_id: &Uuid, food_item_id: &Uuid, quantity: i32) -> Result<CartView> {
        Validator::validate_quantity(quantity)?;
        let food = self.database.get_food_item(food_item_id).await?;
        if !food.is_available {
            return Err(AppError::ValidationError(format!("{} is currently unavailable", food.name)));
        }
        self.database
            .add_to_cart(customer_id, food_item_id, quantity, MAX_LINE_QUANTITY, Utc::now())
            .await?;
        self.view(customer_id).await
    }

    /// Zero removes the line.
    pub async fn set_quantity(&self, customer_id: &Uuid, cart_item_id: &Uuid, quantity: i32) -> Result<CartView> {
        if quantity != 0 {
            Validator::validate_quantity(quantity)?;
        }
        self.database
            .set_cart_quantity(customer_id, cart_item_id, quantity)
            .await?;
        self.view(customer_id).await
    }

    pub async fn remove_item(&self, customer_id: &Uuid, cart_item_id: &Uuid) -> Result<CartView> {
        self.set_quantity(customer_id, cart_item_id, 0).await
    }

    pub async fn clear(&self, customer_id: &Uuid) -> Result<()> {
        self.database.clear_cart(customer_id).await
    }

    pub async fn view(&self, customer_id: &Uuid) -> Result<CartView> {
        let lines = self.database.list_cart_lines(customer_id).await?;
        let subtotal = lines.iter().map(CartLine::line_total).sum();
        Ok(CartView { lines, subtotal })
    }

    /// Turns the cart into a `pending` order and empties it.
    pub async fn checkout(&self, customer_id: &Uuid, checkout: Checkout) -> Result<OrderDetails> {
        let now = Utc::now();
        let lines = self.database.list_cart_lines(customer_id).await?;
        let service_type = validate_cart(&lines)?;

        Validator::validate_panchayat(&checkout.panchayat)?;
        Validator::validate_ward(checkout.ward)?;
        if checkout.delivery_address.trim().is_empty() {
            return Err(AppError::ValidationError("Delivery address is required".to_string()));
        }
        let event_details = match service_type {
            ServiceType::IndoorEvents => {
                let details = checkout.event_details.ok_or_else(|| {
                    AppError::ValidationError("Event details are required for indoor events".to_string())
                })?;
                validate_event(&details, now)?;
                Some(details)
            }
            _ => None,
        };

        let order_id = Uuid::new_v4();
        let items: Vec<OrderItem> = lines
            .iter()
            .map(|line| OrderItem {
                id: Uuid::new_v4(),
                order_id,
                food_item_id: line.food_item_id,
                food_name: line.food_name.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
                total_price: line.line_total(),
                cook_id: None,
            })
            .collect();
        let subtotal: Decimal = items.iter().map(|i| i.total_price).sum();

        let order = Order {
            id: order_id,
            customer_id: *customer_id,
            service_type,
            status: OrderStatus::Pending,
            panchayat: checkout.panchayat.trim().to_string(),
            ward: checkout.ward,
            delivery_address: checkout.delivery_address.trim().to_string(),
            delivery_charge: self.delivery_charge,
            total_amount: subtotal + self.delivery_charge,
            delivery_staff_id: None,
            event_details,
            notes: checkout.notes,
            created_at: now,
            updated_at: now,
            delivered_at: None,
        };

        let priced: Vec<(Uuid, i32)> = lines.iter().map(|l| (l.id, l.quantity)).collect();
        self.database.place_order(&order, &items, &priced).await?;
        self.notifications.publish(&order, OrderEventKind::Placed, now);
        if let Err(e) = self
            .notifications
            .notify(
                customer_id,
                NotificationType::OrderPlaced,
                "Order placed".to_string(),
                format!("Your order of {} item(s) totalling {} was placed", items.len(), order.total_amount),
                Some(serde_json::json!({ "order_id": order.id })),
            )
            .await
        {
            warn!(action = "checkout_notify_failed", order_id = %order.id, error = %e);
        }

        info!(action = "checkout_complete", order_id = %order.id, total = %order.total_amount);
        Ok(OrderDetails {
            order,
            items,
            assignments: Vec::new(),
            vehicle: None,
        })
    }
}

/// A cart can be checked out when it is non-empty, single-service and fully available.
fn validate_cart(lines: &[CartLine]) -> Result<ServiceType> {
    let first = lines
        .first()
        .ok_or_else(|| AppError::ValidationError("Cart is empty".to_string()))?;
    if let Some(other) = lines.iter().find(|l| l.service_type != first.service_type) {
        return Err(AppError::ValidationError(format!(
            "Cart mixes {} and {} items; check them out separately",
            first.service_type, other.service_type
        )));
    }
    if let Some(gone) = lines.iter().find(|l| !l.is_available) {
        return Err(AppError::ValidationError(format!("{} is currently unavailable", gone.food_name)));
    }
    Ok(first.service_type)
}

fn validate_event(details: &EventDetails, now: DateTime<Utc>) -> Result<()> {
    if details.event_date <= now.date_naive() {
        return Err(AppError::ValidationError("Event date must be in the future".to_string()));
    }
    if details.guest_count == 0 {
        return Err(AppError::ValidationError("Guest count must be greater than zero".to_string()));
    }
    if details.venue.trim().is_empty() {
        return Err(AppError::ValidationError("Event venue is required".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn line(service_type: ServiceType, available: bool) -> CartLine {
        CartLine {
            id: Uuid::new_v4(),
            food_item_id: Uuid::new_v4(),
            food_name: "Appam".to_string(),
            service_type,
            unit_price: Decimal::new(40, 0),
            quantity: 2,
            is_available: available,
        }
    }

    #[test]
    fn cart_rules() {
        assert!(validate_cart(&[]).is_err());
        assert!(validate_cart(&[line(ServiceType::Homemade, true), line(ServiceType::CloudKitchen, true)]).is_err());
        assert!(validate_cart(&[line(ServiceType::Homemade, false)]).is_err());
        assert_eq!(
            validate_cart(&[line(ServiceType::Homemade, true), line(ServiceType::Homemade, true)]).unwrap(),
            ServiceType::Homemade
        );
    }

    #[test]
    fn event_rules() {
        let now = Utc::now();
        let mut details = EventDetails {
            event_date: (now + Duration::days(10)).date_naive(),
            guest_count: 80,
            venue: "Parish hall".to_string(),
            event_type: "wedding".to_string(),
        };
        assert!(validate_event(&details, now).is_ok());

        details.guest_count = 0;
        assert!(validate_event(&details, now).is_err());

        details.guest_count = 80;
        details.event_date = now.date_naive();
        assert!(validate_event(&details, now).is_err());
    }
}
