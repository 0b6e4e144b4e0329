use crate::models::food::ServiceType;
use crate::models::order::{EventDetails, Order, OrderStatus};
use crate::models::profile::{ProfileResponse, Role};
use crate::models::settlement::{PayeeKind, Settlement, SettlementStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub full_name: String,
    pub mobile_number: String,
    pub password: String,
    pub role: Role,
    pub panchayat: Option<String>,
    pub ward: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub mobile_number: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: u64,
    pub profile: ProfileResponse,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub service_type: ServiceType,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateFoodItemRequest {
    pub name: String,
    pub description: Option<String>,
    #[schema(value_type = String, example = "120.00")]
    pub price: Decimal,
    pub category_id: Option<Uuid>,
    pub service_type: ServiceType,
    #[serde(default)]
    pub image_urls: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AvailabilityRequest {
    pub is_available: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CategoryQuery {
    pub service_type: Option<ServiceType>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToCartRequest {
    pub food_item_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetQuantityRequest {
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub panchayat: String,
    pub ward: i32,
    pub delivery_address: String,
    pub notes: Option<String>,
    pub event_details: Option<EventDetails>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    pub service_type: Option<ServiceType>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderEventsQuery {
    /// Only events for orders of this service type.
    pub service_type: Option<ServiceType>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<Order>,
    pub count: usize,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EligibleCooksQuery {
    /// Comma-separated order item ids; all unassigned items when absent.
    pub item_ids: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ItemCook {
    pub item_id: Uuid,
    pub cook_id: Uuid,
}

/// Either `cook_id` for every unassigned item, or an explicit per-item mapping.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignCooksRequest {
    pub cook_id: Option<Uuid>,
    #[serde(default)]
    pub items: Vec<ItemCook>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RespondRequest {
    pub accept: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignDeliveryRequest {
    pub staff_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DispatchRequest {
    pub vehicle_type: String,
    pub vehicle_number: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeliveredResponse {
    pub order_id: Uuid,
    pub settlements: Vec<Settlement>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterCookRequest {
    pub profile_id: Uuid,
    pub kitchen_name: String,
    pub panchayat: String,
    pub ward: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterDeliveryStaffRequest {
    pub profile_id: Uuid,
    pub panchayats: Vec<String>,
    #[serde(default)]
    pub wards: Vec<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CookActiveRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AllocateDishRequest {
    pub food_item_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DishRequestBody {
    pub food_item_id: Uuid,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewRequest {
    pub approve: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SettlementQuery {
    pub status: Option<SettlementStatus>,
    pub payee_kind: Option<PayeeKind>,
    pub payee_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkApproveRequest {
    pub settlement_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApprovedResponse {
    pub approved: Vec<Settlement>,
    pub count: usize,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotificationQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}
