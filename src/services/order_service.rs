use crate::database::sqlite::{OrderQuery, SqliteDatabase};
use crate::errors::{AppError, Result};
use crate::models::cook::Cook;
use crate::models::delivery::DeliveryStaff;
use crate::models::notification::{AlertKind, NotificationType, OrderEventKind, PendingAlert};
use crate::models::order::{
    CookAssignment, CookStatus, DeliveryVehicle, Order, OrderDetails, OrderStatus,
};
use crate::models::profile::Role;
use crate::models::settlement::Settlement;
use crate::services::cook_service::eligible_cook_ids;
use crate::services::jwt::AuthenticatedUser;
use crate::services::notification_service::NotificationService;
use crate::utils::validation::Validator;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Which items go to which cook.
#[derive(Debug, Clone)]
pub enum CookPlan {
    /// Every currently unassigned item goes to one cook.
    WholeOrder(Uuid),
    /// Explicit `(order item id, cook id)` pairs.
    PerItem(Vec<(Uuid, Uuid)>),
}

/// The caller resolved to the record its role acts through.
#[derive(Debug, Clone)]
pub enum Actor {
    Customer(Uuid),
    Cook(Cook),
    Delivery(DeliveryStaff),
    Admin(Uuid),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub timed_out: usize,
    pub alerts_dropped: usize,
}

pub struct OrderService {
    database: Arc<SqliteDatabase>,
    notifications: Arc<NotificationService>,
}

impl OrderService {
    pub fn new(database: Arc<SqliteDatabase>, notifications: Arc<NotificationService>) -> Self {
        Self {
            database,
            notifications,
        }
    }

    pub async fn actor(&self, user: &AuthenticatedUser) -> Result<Actor> {
        match user.role {
            Role::Customer => Ok(Actor::Customer(user.profile_id)),
            Role::Admin => Ok(Actor::Admin(user.profile_id)),
            Role::Cook => self
                .database
                .get_cook_by_profile(&user.profile_id)
                .await?
                .map(Actor::Cook)
                .ok_or_else(|| AppError::Forbidden("No cook record for this account".to_string())),
            Role::Delivery => self
                .database
                .get_delivery_staff_by_profile(&user.profile_id)
                .await?
                .map(Actor::Delivery)
                .ok_or_else(|| AppError::Forbidden("No delivery staff record for this account".to_string())),
        }
    }

    pub async fn get_details(&self, order_id: &Uuid) -> Result<OrderDetails> {
        Ok(OrderDetails {
            order: self.database.get_order(order_id).await?,
            items: self.database.get_order_items(order_id).await?,
            assignments: self.database.get_cook_assignments(order_id).await?,
            vehicle: self.database.get_vehicle(order_id).await?,
        })
    }

    /// Order details, if `actor` is allowed to see the order.
    pub async fn details_for(&self, actor: &Actor, order_id: &Uuid) -> Result<OrderDetails> {
        let details = self.get_details(order_id).await?;
        let visible = match actor {
            Actor::Admin(_) => true,
            Actor::Customer(id) => details.order.customer_id == *id,
            Actor::Cook(cook) => {
                details.items.iter().any(|i| i.cook_id == Some(cook.id))
                    || details.assignments.iter().any(|a| a.cook_id == cook.id)
            }
            Actor::Delivery(staff) => {
                details.order.delivery_staff_id == Some(staff.id)
                    || (details.order.delivery_staff_id.is_none()
                        && staff.covers(&details.order.panchayat, details.order.ward))
            }
        };
        if !visible {
            return Err(AppError::NotFound(format!("Order {} not found", order_id)));
        }
        Ok(details)
    }

    /// Lists orders, narrowed to the caller's own unless they are an admin.
    pub async fn list_for(&self, actor: &Actor, mut query: OrderQuery) -> Result<Vec<Order>> {
        match actor {
            Actor::Admin(_) => {}
            Actor::Customer(id) => query.customer_id = Some(*id),
            Actor::Cook(cook) => query.cook_id = Some(cook.id),
            Actor::Delivery(staff) => query.delivery_staff_id = Some(staff.id),
        }
        self.database.list_orders(&query).await
    }

    pub async fn confirm_order(&self, order_id: &Uuid) -> Result<Order> {
        let now = Utc::now();
        self.database
            .update_order_status(order_id, &[OrderStatus::Pending], OrderStatus::Confirmed, now)
            .await?;
        let order = self.status_changed(order_id, now).await?;
        info!(action = "order_confirmed", order_id = %order_id);
        Ok(order)
    }

    /// Active cooks able to prepare every still-unassigned item, or the given subset of items.
    pub async fn eligible_cooks(&self, order_id: &Uuid, item_ids: Option<&[Uuid]>) -> Result<Vec<Cook>> {
        let items = self.database.get_order_items(order_id).await?;
        let required: BTreeSet<Uuid> = match item_ids {
            Some(ids) => {
                let mut required = BTreeSet::new();
                for id in ids {
                    let item = items
                        .iter()
                        .find(|i| i.id == *id)
                        .ok_or_else(|| AppError::NotFound(format!("Order item {} not found", id)))?;
                    required.insert(item.food_item_id);
                }
                required
            }
            None => items
                .iter()
                .filter(|i| i.cook_id.is_none())
                .map(|i| i.food_item_id)
                .collect(),
        };
        if required.is_empty() {
            return Ok(Vec::new());
        }

        let allocations = self.database.active_cook_dish_pairs().await?;
        let mut cooks = Vec::new();
        for cook_id in eligible_cook_ids(&allocations, &required) {
            cooks.push(self.database.get_cook(&cook_id).await?);
        }
        Ok(cooks)
    }

    pub async fn assign_cooks(&self, order_id: &Uuid, plan: CookPlan) -> Result<OrderDetails> {
        let now = Utc::now();
        let order = self.database.get_order(order_id).await?;
        if order.status.is_terminal() {
            return Err(AppError::InvalidTransition(format!(
                "order {} is {} and cannot be re-assigned",
                order_id, order.status
            )));
        }
        if !matches!(order.status, OrderStatus::Confirmed | OrderStatus::Preparing) {
            return Err(AppError::InvalidTransition(format!(
                "cooks can be assigned to confirmed or preparing orders, not {}",
                order.status
            )));
        }

        let items = self.database.get_order_items(order_id).await?;
        let pairs: Vec<(Uuid, Uuid)> = match plan {
            CookPlan::WholeOrder(cook_id) => items
                .iter()
                .filter(|i| i.cook_id.is_none())
                .map(|i| (i.id, cook_id))
                .collect(),
            CookPlan::PerItem(pairs) => pairs,
        };
        if pairs.is_empty() {
            return Err(AppError::Conflict(format!("Order {} has no unassigned items", order_id)));
        }

        let mut food_by_cook: BTreeMap<Uuid, BTreeSet<Uuid>> = BTreeMap::new();
        for (item_id, cook_id) in &pairs {
            let item = items
                .iter()
                .find(|i| i.id == *item_id)
                .ok_or_else(|| AppError::NotFound(format!("Order item {} not found", item_id)))?;
            if item.cook_id.is_some() {
                return Err(AppError::Conflict(format!("{} is already assigned", item.food_name)));
            }
            food_by_cook.entry(*cook_id).or_default().insert(item.food_item_id);
        }

        let existing = self.database.get_cook_assignments(order_id).await?;
        let mut assignments = Vec::with_capacity(food_by_cook.len());
        for (cook_id, food_ids) in &food_by_cook {
            let cook = self.database.get_cook(cook_id).await?;
            if !cook.is_active {
                return Err(AppError::ValidationError(format!("{} is not active", cook.kitchen_name)));
            }
            if existing.iter().any(|a| a.cook_id == cook.id && a.status.is_live()) {
                return Err(AppError::Conflict(format!(
                    "{} already holds an assignment on this order",
                    cook.kitchen_name
                )));
            }
            let allocated: BTreeSet<Uuid> = self
                .database
                .list_cook_dishes(cook_id)
                .await?
                .into_iter()
                .map(|d| d.food_item_id)
                .collect();
            if !food_ids.is_subset(&allocated) {
                return Err(AppError::ValidationError(format!(
                    "{} is not allocated every dish it would receive",
                    cook.kitchen_name
                )));
            }
            assignments.push(CookAssignment {
                id: Uuid::new_v4(),
                order_id: *order_id,
                cook_id: *cook_id,
                status: CookStatus::Pending,
                assigned_at: now,
                respond_by: now + self.notifications.response_window(),
                responded_at: None,
            });
        }

        self.database
            .assign_cooks(order_id, &pairs, &assignments, now)
            .await?;

        let order = self.database.get_order(order_id).await?;
        for assignment in &assignments {
            self.notifications.push_alert(
                assignment.cook_id,
                PendingAlert {
                    order_id: *order_id,
                    kind: AlertKind::CookAssignment,
                    service_type: order.service_type,
                    created_at: now,
                    expires_at: assignment.respond_by,
                },
            );
            self.notifications.publish(
                &order,
                OrderEventKind::CookAssigned {
                    cook_id: assignment.cook_id,
                    respond_by: assignment.respond_by,
                },
                now,
            );
        }

        info!(
            action = "cooks_assigned",
            order_id = %order_id,
            items = pairs.len(),
            cooks = assignments.len()
        );
        self.get_details(order_id).await
    }

    /// A cook answers its own assignment. Acceptance is refused once `respond_by` has passed.
    pub async fn respond_to_assignment(
        &self,
        cook: &Cook,
        assignment_id: &Uuid,
        accept: bool,
    ) -> Result<CookAssignment> {
        self.respond_at(cook, assignment_id, accept, Utc::now()).await
    }

    pub async fn respond_at(
        &self,
        cook: &Cook,
        assignment_id: &Uuid,
        accept: bool,
        now: DateTime<Utc>,
    ) -> Result<CookAssignment> {
        let assignment = self.database.get_cook_assignment(assignment_id).await?;
        if assignment.cook_id != cook.id {
            return Err(AppError::Forbidden("This assignment belongs to another cook".to_string()));
        }
        if assignment.status != CookStatus::Pending {
            return Err(AppError::Conflict(format!(
                "Assignment was already {}",
                assignment.status.as_str()
            )));
        }

        if accept {
            if !self.database.accept_assignment(assignment_id, now).await? {
                let current = self.database.get_cook_assignment(assignment_id).await?;
                if current.status == CookStatus::Pending && now > current.respond_by {
                    return Err(AppError::Conflict(format!(
                        "Response window closed at {}",
                        current.respond_by
                    )));
                }
                return Err(AppError::Conflict(format!(
                    "Assignment was already {}",
                    current.status.as_str()
                )));
            }
        } else {
            let release = self
                .database
                .release_assignment(assignment_id, CookStatus::Rejected, now)
                .await?;
            debug!(
                action = "assignment_released",
                assignment_id = %assignment_id,
                items = release.released_items,
                reverted = release.order_reverted
            );
        }

        self.notifications
            .remove_alert(&cook.id, &assignment.order_id, AlertKind::CookAssignment);
        let order = self.database.get_order(&assignment.order_id).await?;
        self.notifications.publish(
            &order,
            OrderEventKind::CookResponded {
                cook_id: cook.id,
                accepted: accept,
            },
            now,
        );

        info!(
            action = "assignment_answered",
            assignment_id = %assignment_id,
            order_id = %assignment.order_id,
            accepted = accept
        );
        self.database.get_cook_assignment(assignment_id).await
    }

    /// `preparing -> ready`. A cook may only mark orders it has accepted work on.
    pub async fn mark_ready(&self, actor: &Actor, order_id: &Uuid) -> Result<Order> {
        let now = Utc::now();
        match actor {
            Actor::Admin(_) => {}
            Actor::Cook(cook) => {
                let holds_work = self
                    .database
                    .get_cook_assignments(order_id)
                    .await?
                    .iter()
                    .any(|a| a.cook_id == cook.id && a.status == CookStatus::Accepted);
                if !holds_work {
                    return Err(AppError::Forbidden("You have no accepted work on this order".to_string()));
                }
            }
            _ => return Err(AppError::Forbidden("Only cooks and admins mark orders ready".to_string())),
        }

        self.database.mark_ready(order_id, now).await?;
        let order = self.status_changed(order_id, now).await?;

        if order.delivery_staff_id.is_none() {
            let staff_ids: Vec<Uuid> = self
                .matching_staff(&order)
                .await?
                .into_iter()
                .map(|s| s.id)
                .collect();
            if staff_ids.is_empty() {
                warn!(action = "no_delivery_staff_for_area", order_id = %order_id, panchayat = %order.panchayat, ward = order.ward);
            }
            self.notifications.alert_delivery_staff(&order, &staff_ids, now);
        }

        info!(action = "order_ready", order_id = %order_id);
        Ok(order)
    }

    /// Active staff covering the order's panchayat and ward.
    pub async fn eligible_delivery_staff(&self, order_id: &Uuid) -> Result<Vec<DeliveryStaff>> {
        let order = self.database.get_order(order_id).await?;
        self.matching_staff(&order).await
    }

    async fn matching_staff(&self, order: &Order) -> Result<Vec<DeliveryStaff>> {
        Ok(self
            .database
            .list_delivery_staff(true)
            .await?
            .into_iter()
            .filter(|s| s.covers(&order.panchayat, order.ward))
            .collect())
    }

    /// Admin picks the delivery agent.
    pub async fn assign_delivery(&self, order_id: &Uuid, staff_id: &Uuid) -> Result<Order> {
        let staff = self.database.get_delivery_staff(staff_id).await?;
        self.attach_delivery(order_id, &staff).await
    }

    /// A delivery agent takes an order from its alert queue. Exactly one racing claimant wins.
    pub async fn claim_delivery(&self, staff: &DeliveryStaff, order_id: &Uuid) -> Result<Order> {
        self.attach_delivery(order_id, staff).await
    }

    async fn attach_delivery(&self, order_id: &Uuid, staff: &DeliveryStaff) -> Result<Order> {
        let now = Utc::now();
        let order = self.database.get_order(order_id).await?;
        if order.status.is_terminal() {
            return Err(AppError::InvalidTransition(format!(
                "order {} is {} and cannot be re-assigned",
                order_id, order.status
            )));
        }
        if !matches!(order.status, OrderStatus::Preparing | OrderStatus::Ready) {
            return Err(AppError::InvalidTransition(format!(
                "delivery can be arranged for preparing or ready orders, not {}",
                order.status
            )));
        }
        if !staff.covers(&order.panchayat, order.ward) {
            return Err(AppError::ValidationError(format!(
                "Delivery staff does not cover {} ward {}",
                order.panchayat, order.ward
            )));
        }

        if !self.database.attach_delivery_staff(order_id, &staff.id, now).await? {
            return Err(AppError::Conflict(format!(
                "Order {} already has a delivery agent",
                order_id
            )));
        }

        self.notifications
            .clear_order_alerts(order_id, AlertKind::DeliveryRequest);
        let order = self.database.get_order(order_id).await?;
        self.notifications.publish(
            &order,
            OrderEventKind::DeliveryAssigned { staff_id: staff.id },
            now,
        );
        info!(action = "delivery_assigned", order_id = %order_id, staff_id = %staff.id);
        Ok(order)
    }

    pub async fn dispatch(
        &self,
        staff: &DeliveryStaff,
        order_id: &Uuid,
        vehicle_type: &str,
        vehicle_number: &str,
    ) -> Result<Order> {
        let now = Utc::now();
        if vehicle_type.trim().is_empty() {
            return Err(AppError::ValidationError("Vehicle type is required".to_string()));
        }
        Validator::validate_vehicle_number(vehicle_number)?;

        let vehicle = DeliveryVehicle {
            id: Uuid::new_v4(),
            order_id: *order_id,
            staff_id: staff.id,
            vehicle_type: vehicle_type.trim().to_string(),
            vehicle_number: vehicle_number.trim().to_uppercase(),
            recorded_at: now,
        };
        self.database.dispatch_order(&vehicle, now).await?;
        let order = self.status_changed(order_id, now).await?;
        info!(action = "order_dispatched", order_id = %order_id, staff_id = %staff.id);
        Ok(order)
    }

    /// `out_for_delivery -> delivered`; returns the settlements created by this call.
    pub async fn complete_delivery(&self, actor: &Actor, order_id: &Uuid) -> Result<Vec<Settlement>> {
        let now = Utc::now();
        match actor {
            Actor::Admin(_) => {}
            Actor::Delivery(staff) => {
                let order = self.database.get_order(order_id).await?;
                if order.delivery_staff_id != Some(staff.id) {
                    return Err(AppError::Forbidden("This order is assigned to another agent".to_string()));
                }
            }
            _ => return Err(AppError::Forbidden("Only delivery staff and admins complete deliveries".to_string())),
        }

        let settlements = self.database.complete_delivery(order_id, now).await?;
        let order = self.database.get_order(order_id).await?;
        self.notifications
            .publish(&order, OrderEventKind::StatusChanged, now);
        if let Err(e) = self
            .notifications
            .notify(
                &order.customer_id,
                NotificationType::OrderDelivered,
                "Order delivered".to_string(),
                format!("Your order totalling {} has been delivered", order.total_amount),
                Some(serde_json::json!({ "order_id": order.id })),
            )
            .await
        {
            warn!(action = "delivery_notify_failed", order_id = %order.id, error = %e);
        }
        Ok(settlements)
    }

    /// Customers cancel their own pending orders; admins cancel anything not yet dispatched.
    pub async fn cancel(&self, actor: &Actor, order_id: &Uuid) -> Result<Order> {
        let now = Utc::now();
        let order = self.database.get_order(order_id).await?;
        let from: &[OrderStatus] = match actor {
            Actor::Admin(_) => &[
                OrderStatus::Pending,
                OrderStatus::Confirmed,
                OrderStatus::Preparing,
                OrderStatus::Ready,
            ],
            Actor::Customer(id) if order.customer_id == *id => &[OrderStatus::Pending],
            Actor::Customer(_) => {
                return Err(AppError::NotFound(format!("Order {} not found", order_id)))
            }
            _ => return Err(AppError::Forbidden("Staff cannot cancel orders".to_string())),
        };
        order.status.transition(OrderStatus::Cancelled)?;

        self.database.cancel_order(order_id, from, now).await?;
        self.notifications
            .clear_order_alerts(order_id, AlertKind::CookAssignment);
        self.notifications
            .clear_order_alerts(order_id, AlertKind::DeliveryRequest);
        let order = self.status_changed(order_id, now).await?;
        info!(action = "order_cancelled", order_id = %order_id);
        Ok(order)
    }

    /// Times out cook assignments past `respond_by` and drops expired alerts.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        for assignment in self.database.list_expired_assignments(now).await? {
            match self
                .database
                .release_assignment(&assignment.id, CookStatus::TimedOut, now)
                .await
            {
                Ok(release) => {
                    report.timed_out += 1;
                    self.notifications.remove_alert(
                        &assignment.cook_id,
                        &assignment.order_id,
                        AlertKind::CookAssignment,
                    );
                    let order = self.database.get_order(&assignment.order_id).await?;
                    self.notifications.publish(
                        &order,
                        OrderEventKind::CookResponded {
                            cook_id: assignment.cook_id,
                            accepted: false,
                        },
                        now,
                    );
                    info!(
                        action = "assignment_timed_out",
                        assignment_id = %assignment.id,
                        order_id = %assignment.order_id,
                        reverted = release.order_reverted
                    );
                }
                // Answered between the scan and the update.
                Err(AppError::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
        }
        report.alerts_dropped = self.notifications.sweep_expired_alerts(now);
        Ok(report)
    }

    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(StdDuration::from_secs(1));
            loop {
                ticker.tick().await;
                match self.sweep(Utc::now()).await {
                    Ok(report) if report != SweepReport::default() => {
                        debug!(
                            action = "sweep",
                            timed_out = report.timed_out,
                            alerts_dropped = report.alerts_dropped
                        );
                    }
                    Ok(_) => {}
                    Err(e) => warn!(action = "sweep_failed", error = %e),
                }
            }
        })
    }

    async fn status_changed(&self, order_id: &Uuid, now: DateTime<Utc>) -> Result<Order> {
        let order = self.database.get_order(order_id).await?;
        self.notifications
            .publish(&order, OrderEventKind::StatusChanged, now);
        // The transition has committed; inbox failures are logged, not returned.
        if let Err(e) = self
            .notifications
            .notify(
                &order.customer_id,
                NotificationType::OrderStatusChanged,
                "Order update".to_string(),
                format!("Your order is now {}", order.status.as_str().replace('_', " ")),
                Some(serde_json::json!({ "order_id": order.id, "status": order.status })),
            )
            .await
        {
            warn!(action = "status_notify_failed", order_id = %order.id, error = %e);
        }
        Ok(order)
    }
}
