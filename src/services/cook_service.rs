use crate::database::sqlite::SqliteDatabase;
use crate::errors::{AppError, Result};
use crate::models::cook::{Cook, CookDish, CookDishRequest, RequestStatus};
use crate::models::delivery::DeliveryStaff;
use crate::models::notification::NotificationType;
use crate::models::profile::Role;
use crate::services::notification_service::NotificationService;
use crate::utils::validation::Validator;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Cooks whose allocated dishes cover every item in `required`, in cook-id order.
pub fn eligible_cook_ids(allocations: &[(Uuid, Uuid)], required: &BTreeSet<Uuid>) -> Vec<Uuid> {
    let mut dishes_by_cook: HashMap<Uuid, BTreeSet<Uuid>> = HashMap::new();
    for (cook_id, food_item_id) in allocations {
        dishes_by_cook.entry(*cook_id).or_default().insert(*food_item_id);
    }

    let mut eligible: Vec<Uuid> = dishes_by_cook
        .into_iter()
        .filter(|(_, dishes)| required.is_subset(dishes))
        .map(|(cook_id, _)| cook_id)
        .collect();
    eligible.sort();
    eligible
}

/// Staff on-boarding, dish allocation and dish requests.
pub struct CookService {
    database: Arc<SqliteDatabase>,
    notifications: Arc<NotificationService>,
}

impl CookService {
    pub fn new(database: Arc<SqliteDatabase>, notifications: Arc<NotificationService>) -> Self {
        Self {
            database,
            notifications,
        }
    }

    pub async fn register_cook(
        &self,
        profile_id: &Uuid,
        kitchen_name: &str,
        panchayat: &str,
        ward: i32,
    ) -> Result<Cook> {
        let profile = self.database.get_profile_by_id(profile_id).await?;
        if profile.role != Role::Cook {
            return Err(AppError::ValidationError(format!(
                "Profile {} has role {}, expected cook",
                profile_id, profile.role
            )));
        }
        if kitchen_name.trim().is_empty() {
            return Err(AppError::ValidationError("Kitchen name is required".to_string()));
        }
        Validator::validate_panchayat(panchayat)?;
        Validator::validate_ward(ward)?;

        let cook = Cook {
            id: Uuid::new_v4(),
            profile_id: *profile_id,
            kitchen_name: kitchen_name.trim().to_string(),
            panchayat: panchayat.trim().to_string(),
            ward,
            is_active: true,
            created_at: Utc::now(),
        };
        self.database.create_cook(&cook).await?;
        info!(action = "cook_registered", cook_id = %cook.id, profile_id = %profile_id);
        Ok(cook)
    }

    pub async fn register_delivery_staff(
        &self,
        profile_id: &Uuid,
        panchayats: Vec<String>,
        wards: Vec<i32>,
    ) -> Result<DeliveryStaff> {
        let profile = self.database.get_profile_by_id(profile_id).await?;
        if profile.role != Role::Delivery {
            return Err(AppError::ValidationError(format!(
                "Profile {} has role {}, expected delivery",
                profile_id, profile.role
            )));
        }
        if panchayats.is_empty() {
            return Err(AppError::ValidationError(
                "Delivery staff must cover at least one panchayat".to_string(),
            ));
        }
        for panchayat in &panchayats {
            Validator::validate_panchayat(panchayat)?;
        }
        for ward in &wards {
            Validator::validate_ward(*ward)?;
        }

        let staff = DeliveryStaff {
            id: Uuid::new_v4(),
            profile_id: *profile_id,
            panchayats: panchayats.into_iter().map(|p| p.trim().to_string()).collect(),
            wards,
            is_active: true,
            created_at: Utc::now(),
        };
        self.database.create_delivery_staff(&staff).await?;
        info!(action = "delivery_staff_registered", staff_id = %staff.id, profile_id = %profile_id);
        Ok(staff)
    }

    pub async fn list_cooks(&self, active_only: bool) -> Result<Vec<Cook>> {
        self.database.list_cooks(active_only).await
    }

    pub async fn set_cook_active(&self, cook_id: &Uuid, is_active: bool) -> Result<Cook> {
        self.database.set_cook_active(cook_id, is_active).await?;
        info!(action = "cook_active_changed", cook_id = %cook_id, is_active);
        self.database.get_cook(cook_id).await
    }

    pub async fn list_delivery_staff(&self, active_only: bool) -> Result<Vec<DeliveryStaff>> {
        self.database.list_delivery_staff(active_only).await
    }

    /// The cook record behind a cook-role profile.
    pub async fn cook_for_profile(&self, profile_id: &Uuid) -> Result<Cook> {
        self.database
            .get_cook_by_profile(profile_id)
            .await?
            .ok_or_else(|| AppError::Forbidden("No cook record for this account".to_string()))
    }

    pub async fn staff_for_profile(&self, profile_id: &Uuid) -> Result<DeliveryStaff> {
        self.database
            .get_delivery_staff_by_profile(profile_id)
            .await?
            .ok_or_else(|| AppError::Forbidden("No delivery staff record for this account".to_string()))
    }

    pub async fn allocate_dish(&self, cook_id: &Uuid, food_item_id: &Uuid) -> Result<CookDish> {
        self.database.get_cook(cook_id).await?;
        self.database.get_food_item(food_item_id).await?;

        let dish = CookDish {
            id: Uuid::new_v4(),
            cook_id: *cook_id,
            food_item_id: *food_item_id,
            created_at: Utc::now(),
        };
        self.database.allocate_dish(&dish).await?;
        info!(action = "dish_allocated", cook_id = %cook_id, food_item_id = %food_item_id);
        Ok(dish)
    }

    pub async fn list_cook_dishes(&self, cook_id: &Uuid) -> Result<Vec<CookDish>> {
        self.database.list_cook_dishes(cook_id).await
    }

    /// Active cooks able to prepare every one of `food_item_ids`.
    pub async fn eligible_cooks(&self, food_item_ids: &BTreeSet<Uuid>) -> Result<Vec<Cook>> {
        if food_item_ids.is_empty() {
            return Ok(Vec::new());
        }
        let allocations = self.database.active_cook_dish_pairs().await?;
        let mut cooks = Vec::new();
        for cook_id in eligible_cook_ids(&allocations, food_item_ids) {
            cooks.push(self.database.get_cook(&cook_id).await?);
        }
        Ok(cooks)
    }

    pub async fn request_dish(&self, cook_id: &Uuid, food_item_id: &Uuid, note: Option<String>) -> Result<CookDishRequest> {
        self.database.get_food_item(food_item_id).await?;
        if self
            .database
            .list_cook_dishes(cook_id)
            .await?
            .iter()
            .any(|d| d.food_item_id == *food_item_id)
        {
            return Err(AppError::Conflict("Dish is already allocated to this cook".to_string()));
        }
        if self.database.has_pending_dish_request(cook_id, food_item_id).await? {
            return Err(AppError::Conflict("A request for this dish is already pending".to_string()));
        }

        let request = CookDishRequest {
            id: Uuid::new_v4(),
            cook_id: *cook_id,
            food_item_id: *food_item_id,
            status: RequestStatus::Pending,
            note,
            created_at: Utc::now(),
            reviewed_at: None,
        };
        self.database.create_dish_request(&request).await?;
        info!(action = "dish_requested", request_id = %request.id, cook_id = %cook_id);
        Ok(request)
    }

    pub async fn list_dish_requests(
        &self,
        status: Option<RequestStatus>,
        cook_id: Option<&Uuid>,
    ) -> Result<Vec<CookDishRequest>> {
        self.database.list_dish_requests(status, cook_id).await
    }

    pub async fn review_dish_request(&self, request_id: &Uuid, approve: bool) -> Result<CookDishRequest> {
        let request = self
            .database
            .review_dish_request(request_id, approve, Utc::now())
            .await?;
        let cook = self.database.get_cook(&request.cook_id).await?;
        let food = self.database.get_food_item(&request.food_item_id).await?;

        let verdict = if approve { "approved" } else { "rejected" };
        if let Err(e) = self
            .notifications
            .notify(
                &cook.profile_id,
                NotificationType::DishRequestReviewed,
                format!("Dish request {}", verdict),
                format!("Your request to cook {} was {}", food.name, verdict),
                Some(serde_json::json!({ "request_id": request.id, "food_item_id": food.id })),
            )
            .await
        {
            warn!(action = "dish_review_notify_failed", request_id = %request_id, error = %e);
        }
        info!(action = "dish_request_reviewed", request_id = %request_id, approved = approve);
        Ok(request)
    }
}
