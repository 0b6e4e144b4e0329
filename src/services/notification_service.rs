use crate::database::sqlite::SqliteDatabase;
use crate::errors::Result;
use crate::models::notification::*;
use crate::models::order::Order;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

const FEED_CAPACITY: usize = 256;

/// Change feed, per-staff alert queues and the persisted inbox.
///
/// Alert queues are keyed by the staff record id: `cooks.id` for cook
/// assignments, `delivery_staff.id` for delivery requests.
pub struct NotificationService {
    database: Arc<SqliteDatabase>,
    feed: broadcast::Sender<OrderEvent>,
    alerts: DashMap<Uuid, Vec<PendingAlert>>,
    response_window: Duration,
}

impl NotificationService {
    pub fn new(database: Arc<SqliteDatabase>, response_window_secs: i64) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            database,
            feed,
            alerts: DashMap::new(),
            response_window: Duration::seconds(response_window_secs),
        }
    }

    pub fn response_window(&self) -> Duration {
        self.response_window
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.feed.subscribe()
    }

    /// Publishes a change for `order`. Having no subscriber is not an error.
    pub fn publish(&self, order: &Order, kind: OrderEventKind, at: DateTime<Utc>) {
        let event = OrderEvent {
            order_id: order.id,
            customer_id: order.customer_id,
            service_type: order.service_type,
            status: order.status,
            panchayat: order.panchayat.clone(),
            ward: order.ward,
            kind,
            at,
        };
        if self.feed.send(event).is_err() {
            debug!(action = "order_event_unobserved", order_id = %order.id);
        }
    }

    /// Queues an alert for one staff member, replacing any earlier alert of the
    /// same kind for the same order.
    pub fn push_alert(&self, staff_id: Uuid, alert: PendingAlert) {
        let mut queue = self.alerts.entry(staff_id).or_default();
        queue.retain(|a| !(a.order_id == alert.order_id && a.kind == alert.kind));
        queue.push(alert);
    }

    /// Delivery request for every listed staff member, expiring after the response window.
    pub fn alert_delivery_staff(&self, order: &Order, staff_ids: &[Uuid], now: DateTime<Utc>) {
        for staff_id in staff_ids {
            self.push_alert(
                *staff_id,
                PendingAlert {
                    order_id: order.id,
                    kind: AlertKind::DeliveryRequest,
                    service_type: order.service_type,
                    created_at: now,
                    expires_at: now + self.response_window,
                },
            );
        }
        info!(action = "delivery_alerts_sent", order_id = %order.id, recipients = staff_ids.len());
    }

    /// Live alerts of one staff member, oldest first, with server-computed countdowns.
    pub fn pending_alerts(&self, staff_id: &Uuid, now: DateTime<Utc>) -> Vec<AlertView> {
        let Some(queue) = self.alerts.get(staff_id) else {
            return Vec::new();
        };
        let mut views: Vec<AlertView> = queue
            .iter()
            .filter(|alert| !alert.is_expired(now))
            .map(|alert| AlertView {
                order_id: alert.order_id,
                kind: alert.kind,
                service_type: alert.service_type,
                seconds_remaining: alert.seconds_remaining(now),
                expires_at: alert.expires_at,
            })
            .collect();
        views.sort_by_key(|v| v.expires_at);
        views
    }

    pub fn remove_alert(&self, staff_id: &Uuid, order_id: &Uuid, kind: AlertKind) {
        if let Some(mut queue) = self.alerts.get_mut(staff_id) {
            queue.retain(|a| !(a.order_id == *order_id && a.kind == kind));
        }
    }

    /// Withdraws an order's alerts of `kind` from every queue.
    pub fn clear_order_alerts(&self, order_id: &Uuid, kind: AlertKind) {
        for mut queue in self.alerts.iter_mut() {
            queue.retain(|a| !(a.order_id == *order_id && a.kind == kind));
        }
    }

    /// Drops expired alerts and empty queues; returns how many alerts were dropped.
    pub fn sweep_expired_alerts(&self, now: DateTime<Utc>) -> usize {
        let mut dropped = 0;
        for mut queue in self.alerts.iter_mut() {
            let before = queue.len();
            queue.retain(|a| !a.is_expired(now));
            dropped += before - queue.len();
        }
        self.alerts.retain(|_, queue| !queue.is_empty());
        dropped
    }

    /// Stores an inbox entry for `profile_id`.
    pub async fn notify(
        &self,
        profile_id: &Uuid,
        notification_type: NotificationType,
        title: String,
        message: String,
        metadata: Option<serde_json::Value>,
    ) -> Result<Notification> {
        let notification = Notification {
            id: Uuid::new_v4(),
            profile_id: *profile_id,
            notification_type,
            title,
            message,
            metadata,
            is_read: false,
            created_at: Utc::now(),
        };
        self.database.store_notification(&notification).await?;
        info!(
            action = "notification_stored",
            profile_id = %profile_id,
            kind = notification_type.as_str()
        );
        Ok(notification)
    }

    pub async fn get_profile_notifications(&self, profile_id: &Uuid, limit: Option<i64>) -> Result<Vec<Notification>> {
        self.database.get_profile_notifications(profile_id, limit).await
    }

    pub async fn mark_notification_read(&self, notification_id: &Uuid, profile_id: &Uuid) -> Result<()> {
        self.database.mark_notification_read(notification_id, profile_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::food::ServiceType;

    fn alert(order_id: Uuid, now: DateTime<Utc>, secs: i64) -> PendingAlert {
        PendingAlert {
            order_id,
            kind: AlertKind::DeliveryRequest,
            service_type: ServiceType::CloudKitchen,
            created_at: now,
            expires_at: now + Duration::seconds(secs),
        }
    }

    async fn service() -> NotificationService {
        let db = Arc::new(SqliteDatabase::in_memory().await.unwrap());
        NotificationService::new(db, 120)
    }

    #[tokio::test]
    async fn countdown_comes_from_server_time() {
        let hub = service().await;
        let staff = Uuid::new_v4();
        let now = Utc::now();
        hub.push_alert(staff, alert(Uuid::new_v4(), now, 120));

        let views = hub.pending_alerts(&staff, now + Duration::seconds(45));
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].seconds_remaining, 75);
        assert!(hub.pending_alerts(&staff, now + Duration::seconds(121)).is_empty());
    }

    #[tokio::test]
    async fn sweep_drops_only_expired() {
        let hub = service().await;
        let staff = Uuid::new_v4();
        let now = Utc::now();
        hub.push_alert(staff, alert(Uuid::new_v4(), now, 5));
        hub.push_alert(staff, alert(Uuid::new_v4(), now, 60));

        assert_eq!(hub.sweep_expired_alerts(now + Duration::seconds(10)), 1);
        assert_eq!(hub.pending_alerts(&staff, now + Duration::seconds(10)).len(), 1);
    }

    #[tokio::test]
    async fn clearing_an_order_empties_every_queue() {
        let hub = service().await;
        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        hub.push_alert(a, alert(order_id, now, 60));
        hub.push_alert(b, alert(order_id, now, 60));
        hub.push_alert(a, alert(order_id, now, 90));

        assert_eq!(hub.pending_alerts(&a, now).len(), 1);
        hub.clear_order_alerts(&order_id, AlertKind::DeliveryRequest);
        assert!(hub.pending_alerts(&a, now).is_empty());
        assert!(hub.pending_alerts(&b, now).is_empty());
    }
}
