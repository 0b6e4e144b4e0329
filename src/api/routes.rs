use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post, put},
    Json, Router,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::types::*;
use crate::api::AppState;
use crate::database::sqlite::OrderQuery;
use crate::errors::{AppError, Result};
use crate::models::cook::{Cook, CookDish, CookDishRequest};
use crate::models::delivery::DeliveryStaff;
use crate::models::food::{FoodCategory, FoodFilter, FoodItem};
use crate::models::notification::{AlertView, FeedFilter, FeedScope, Notification};
use crate::models::order::{CookAssignment, Order, OrderDetails};
use crate::models::profile::{ProfileResponse, Role};
use crate::models::settlement::{PayeeKind, Settlement, WalletSummary};
use crate::services::auth::NewProfile;
use crate::services::cart_service::{CartView, Checkout};
use crate::services::catalog_service::NewFoodItem;
use crate::services::jwt::AuthenticatedUser;
use crate::services::order_service::{Actor, CookPlan};

/// Bearer-token extractor; rejects with 401 when the header is missing or the token is invalid.
pub struct AuthUser(pub AuthenticatedUser);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| {
                AppError::AuthenticationError("Missing or invalid Authorization header".to_string())
            })?;
        Ok(AuthUser(state.auth.validate_token(token)?))
    }
}

const ADMIN: &[Role] = &[Role::Admin];

pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth_router())
        .nest("/cart", cart_router())
        .merge(catalog_router())
        .merge(order_router())
        .merge(staff_router())
        .merge(settlement_router())
        .merge(notification_router())
}

pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
}

pub fn catalog_router() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route("/foods", get(list_foods).post(create_food))
        .route("/foods/:id", get(get_food))
        .route("/foods/:id/availability", put(set_food_availability))
}

pub fn cart_router() -> Router<AppState> {
    Router::new()
        .route("/", get(view_cart).delete(clear_cart))
        .route("/items", post(add_to_cart))
        .route("/items/:id", put(set_cart_quantity).delete(remove_cart_item))
        .route("/checkout", post(checkout))
}

pub fn order_router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/events", get(order_events))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/confirm", post(confirm_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/eligible-cooks", get(eligible_cooks))
        .route("/orders/:id/cooks", post(assign_cooks))
        .route("/orders/:id/ready", post(mark_ready))
        .route("/orders/:id/eligible-delivery", get(eligible_delivery_staff))
        .route("/orders/:id/delivery", post(assign_delivery))
        .route("/orders/:id/claim", post(claim_delivery))
        .route("/orders/:id/dispatch", post(dispatch_order))
        .route("/orders/:id/delivered", post(mark_delivered))
        .route("/assignments/:id/respond", post(respond_to_assignment))
        .route("/alerts", get(pending_alerts))
}

pub fn staff_router() -> Router<AppState> {
    Router::new()
        .route("/admin/cooks", get(list_cooks).post(register_cook))
        .route("/admin/cooks/:id/active", put(set_cook_active))
        .route("/admin/cooks/:id/dishes", post(allocate_dish))
        .route("/cooks/:id/dishes", get(list_cook_dishes))
        .route(
            "/admin/delivery-staff",
            get(list_delivery_staff).post(register_delivery_staff),
        )
        .route("/dish-requests", get(list_dish_requests).post(create_dish_request))
        .route("/admin/dish-requests/:id/review", post(review_dish_request))
}

pub fn settlement_router() -> Router<AppState> {
    Router::new()
        .route("/settlements", get(list_settlements))
        .route("/admin/settlements/approve", post(bulk_approve_settlements))
        .route("/admin/settlements/:id/approve", post(approve_settlement))
        .route("/wallet", get(my_wallet))
        .route("/admin/wallets/:kind/:id", get(payee_wallet))
}

pub fn notification_router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/:id/read", post(mark_notification_read))
}

// Auth

#[utoipa::path(post, path = "/api/auth/register", tag = "Auth", request_body = RegisterRequest,
    responses((status = 201, body = ProfileResponse), (status = 400), (status = 409)))]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ProfileResponse>)> {
    let profile = state
        .auth
        .register(NewProfile {
            full_name: req.full_name,
            mobile_number: req.mobile_number,
            password: req.password,
            role: req.role,
            panchayat: req.panchayat,
            ward: req.ward,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(profile.into())))
}

#[utoipa::path(post, path = "/api/auth/login", tag = "Auth", request_body = LoginRequest,
    responses((status = 200, body = LoginResponse), (status = 401)))]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let (token, profile) = state.auth.login(&req.mobile_number, &req.password).await?;
    Ok(Json(LoginResponse {
        token,
        expires_in: 86400,
        profile: profile.into(),
    }))
}

#[utoipa::path(get, path = "/api/auth/me", tag = "Auth",
    responses((status = 200, body = ProfileResponse), (status = 401)),
    security(("bearerAuth" = [])))]
pub async fn me(State(state): State<AppState>, AuthUser(user): AuthUser) -> Result<Json<ProfileResponse>> {
    Ok(Json(state.auth.get_profile(&user.profile_id).await?.into()))
}

// Catalog

#[utoipa::path(get, path = "/api/categories", tag = "Catalog", params(CategoryQuery),
    responses((status = 200, body = [FoodCategory])))]
pub async fn list_categories(
    State(state): State<AppState>,
    Query(query): Query<CategoryQuery>,
) -> Result<Json<Vec<FoodCategory>>> {
    Ok(Json(state.catalog.list_categories(query.service_type).await?))
}

#[utoipa::path(post, path = "/api/categories", tag = "Catalog", request_body = CreateCategoryRequest,
    responses((status = 201, body = FoodCategory), (status = 403)),
    security(("bearerAuth" = [])))]
pub async fn create_category(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<FoodCategory>)> {
    user.require(ADMIN)?;
    let category = state.catalog.create_category(&req.name, req.service_type).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

#[utoipa::path(get, path = "/api/foods", tag = "Catalog", params(FoodFilter),
    responses((status = 200, body = [FoodItem])))]
pub async fn list_foods(
    State(state): State<AppState>,
    Query(filter): Query<FoodFilter>,
) -> Result<Json<Vec<FoodItem>>> {
    Ok(Json(state.catalog.list_food_items(&filter).await?))
}

#[utoipa::path(get, path = "/api/foods/{id}", tag = "Catalog",
    params(("id" = Uuid, Path, description = "Food item id")),
    responses((status = 200, body = FoodItem), (status = 404)))]
pub async fn get_food(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<FoodItem>> {
    Ok(Json(state.catalog.get_food_item(&id).await?))
}

#[utoipa::path(post, path = "/api/foods", tag = "Catalog", request_body = CreateFoodItemRequest,
    responses((status = 201, body = FoodItem), (status = 400), (status = 403)),
    security(("bearerAuth" = [])))]
pub async fn create_food(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateFoodItemRequest>,
) -> Result<(StatusCode, Json<FoodItem>)> {
    user.require(ADMIN)?;
    let item = state
        .catalog
        .create_food_item(NewFoodItem {
            name: req.name,
            description: req.description,
            price: req.price,
            category_id: req.category_id,
            service_type: req.service_type,
            image_urls: req.image_urls,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[utoipa::path(put, path = "/api/foods/{id}/availability", tag = "Catalog",
    params(("id" = Uuid, Path, description = "Food item id")), request_body = AvailabilityRequest,
    responses((status = 200, body = FoodItem), (status = 403), (status = 404)),
    security(("bearerAuth" = [])))]
pub async fn set_food_availability(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<AvailabilityRequest>,
) -> Result<Json<FoodItem>> {
    user.require(ADMIN)?;
    Ok(Json(state.catalog.set_availability(&id, req.is_available).await?))
}

// Cart

#[utoipa::path(get, path = "/api/cart", tag = "Cart",
    responses((status = 200, body = CartView)), security(("bearerAuth" = [])))]
pub async fn view_cart(State(state): State<AppState>, AuthUser(user): AuthUser) -> Result<Json<CartView>> {
    user.require(&[Role::Customer])?;
    Ok(Json(state.carts.view(&user.profile_id).await?))
}

#[utoipa::path(post, path = "/api/cart/items", tag = "Cart", request_body = AddToCartRequest,
    responses((status = 200, body = CartView), (status = 400), (status = 404)),
    security(("bearerAuth" = [])))]
pub async fn add_to_cart(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<AddToCartRequest>,
) -> Result<Json<CartView>> {
    user.require(&[Role::Customer])?;
    Ok(Json(
        state
            .carts
            .add_item(&user.profile_id, &req.food_item_id, req.quantity)
            .await?,
    ))
}

#[utoipa::path(put, path = "/api/cart/items/{id}", tag = "Cart",
    params(("id" = Uuid, Path, description = "Cart line id")), request_body = SetQuantityRequest,
    responses((status = 200, body = CartView), (status = 404)), security(("bearerAuth" = [])))]
pub async fn set_cart_quantity(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<SetQuantityRequest>,
) -> Result<Json<CartView>> {
    user.require(&[Role::Customer])?;
    Ok(Json(state.carts.set_quantity(&user.profile_id, &id, req.quantity).await?))
}

#[utoipa::path(delete, path = "/api/cart/items/{id}", tag = "Cart",
    params(("id" = Uuid, Path, description = "Cart line id")),
    responses((status = 200, body = CartView), (status = 404)), security(("bearerAuth" = [])))]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CartView>> {
    user.require(&[Role::Customer])?;
    Ok(Json(state.carts.remove_item(&user.profile_id, &id).await?))
}

#[utoipa::path(delete, path = "/api/cart", tag = "Cart",
    responses((status = 200, body = MessageResponse)), security(("bearerAuth" = [])))]
pub async fn clear_cart(State(state): State<AppState>, AuthUser(user): AuthUser) -> Result<Json<MessageResponse>> {
    user.require(&[Role::Customer])?;
    state.carts.clear(&user.profile_id).await?;
    Ok(Json(MessageResponse {
        message: "Cart cleared".to_string(),
    }))
}

#[utoipa::path(post, path = "/api/cart/checkout", tag = "Cart", request_body = CheckoutRequest,
    responses((status = 201, body = OrderDetails), (status = 400)), security(("bearerAuth" = [])))]
pub async fn checkout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderDetails>)> {
    user.require(&[Role::Customer])?;
    let details = state
        .carts
        .checkout(
            &user.profile_id,
            Checkout {
                panchayat: req.panchayat,
                ward: req.ward,
                delivery_address: req.delivery_address,
                notes: req.notes,
                event_details: req.event_details,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(details)))
}

// Orders

#[utoipa::path(get, path = "/api/orders", tag = "Orders", params(OrderListQuery),
    responses((status = 200, body = OrderListResponse)), security(("bearerAuth" = [])))]
pub async fn list_orders(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<OrderListResponse>> {
    let actor = state.orders.actor(&user).await?;
    let orders = state
        .orders
        .list_for(
            &actor,
            OrderQuery {
                status: query.status,
                service_type: query.service_type,
                limit: query.limit,
                ..OrderQuery::default()
            },
        )
        .await?;
    Ok(Json(OrderListResponse {
        count: orders.len(),
        orders,
    }))
}

#[utoipa::path(get, path = "/api/orders/{id}", tag = "Orders",
    params(("id" = Uuid, Path, description = "Order id")),
    responses((status = 200, body = OrderDetails), (status = 404)), security(("bearerAuth" = [])))]
pub async fn get_order(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderDetails>> {
    let actor = state.orders.actor(&user).await?;
    Ok(Json(state.orders.details_for(&actor, &id).await?))
}

#[utoipa::path(post, path = "/api/orders/{id}/confirm", tag = "Orders",
    params(("id" = Uuid, Path, description = "Order id")),
    responses((status = 200, body = Order), (status = 409)), security(("bearerAuth" = [])))]
pub async fn confirm_order(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>> {
    user.require(ADMIN)?;
    Ok(Json(state.orders.confirm_order(&id).await?))
}

#[utoipa::path(post, path = "/api/orders/{id}/cancel", tag = "Orders",
    params(("id" = Uuid, Path, description = "Order id")),
    responses((status = 200, body = Order), (status = 409)), security(("bearerAuth" = [])))]
pub async fn cancel_order(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>> {
    let actor = state.orders.actor(&user).await?;
    Ok(Json(state.orders.cancel(&actor, &id).await?))
}

#[utoipa::path(get, path = "/api/orders/{id}/eligible-cooks", tag = "Orders",
    params(("id" = Uuid, Path, description = "Order id"), EligibleCooksQuery),
    responses((status = 200, body = [Cook])), security(("bearerAuth" = [])))]
pub async fn eligible_cooks(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<EligibleCooksQuery>,
) -> Result<Json<Vec<Cook>>> {
    user.require(ADMIN)?;
    let item_ids = query
        .item_ids
        .map(|raw| {
            raw.split(',')
                .filter(|part| !part.trim().is_empty())
                .map(|part| {
                    Uuid::parse_str(part.trim())
                        .map_err(|e| AppError::ValidationError(format!("Invalid item id: {}", e)))
                })
                .collect::<Result<Vec<Uuid>>>()
        })
        .transpose()?;
    Ok(Json(state.orders.eligible_cooks(&id, item_ids.as_deref()).await?))
}

#[utoipa::path(post, path = "/api/orders/{id}/cooks", tag = "Orders",
    params(("id" = Uuid, Path, description = "Order id")), request_body = AssignCooksRequest,
    responses((status = 200, body = OrderDetails), (status = 400), (status = 409)),
    security(("bearerAuth" = [])))]
pub async fn assign_cooks(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignCooksRequest>,
) -> Result<Json<OrderDetails>> {
    user.require(ADMIN)?;
    let plan = match (req.cook_id, req.items.is_empty()) {
        (Some(cook_id), true) => CookPlan::WholeOrder(cook_id),
        (None, false) => CookPlan::PerItem(req.items.iter().map(|m| (m.item_id, m.cook_id)).collect()),
        _ => {
            return Err(AppError::ValidationError(
                "Provide either cook_id or items, not both".to_string(),
            ))
        }
    };
    Ok(Json(state.orders.assign_cooks(&id, plan).await?))
}

#[utoipa::path(post, path = "/api/assignments/{id}/respond", tag = "Orders",
    params(("id" = Uuid, Path, description = "Cook assignment id")), request_body = RespondRequest,
    responses((status = 200, body = CookAssignment), (status = 409)), security(("bearerAuth" = [])))]
pub async fn respond_to_assignment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<RespondRequest>,
) -> Result<Json<CookAssignment>> {
    user.require(&[Role::Cook])?;
    let cook = state.cooks.cook_for_profile(&user.profile_id).await?;
    Ok(Json(state.orders.respond_to_assignment(&cook, &id, req.accept).await?))
}

#[utoipa::path(post, path = "/api/orders/{id}/ready", tag = "Orders",
    params(("id" = Uuid, Path, description = "Order id")),
    responses((status = 200, body = Order), (status = 409)), security(("bearerAuth" = [])))]
pub async fn mark_ready(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>> {
    let actor = state.orders.actor(&user).await?;
    Ok(Json(state.orders.mark_ready(&actor, &id).await?))
}

#[utoipa::path(get, path = "/api/orders/{id}/eligible-delivery", tag = "Orders",
    params(("id" = Uuid, Path, description = "Order id")),
    responses((status = 200, body = [DeliveryStaff])), security(("bearerAuth" = [])))]
pub async fn eligible_delivery_staff(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DeliveryStaff>>> {
    user.require(ADMIN)?;
    Ok(Json(state.orders.eligible_delivery_staff(&id).await?))
}

#[utoipa::path(post, path = "/api/orders/{id}/delivery", tag = "Orders",
    params(("id" = Uuid, Path, description = "Order id")), request_body = AssignDeliveryRequest,
    responses((status = 200, body = Order), (status = 409)), security(("bearerAuth" = [])))]
pub async fn assign_delivery(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignDeliveryRequest>,
) -> Result<Json<Order>> {
    user.require(ADMIN)?;
    Ok(Json(state.orders.assign_delivery(&id, &req.staff_id).await?))
}

#[utoipa::path(post, path = "/api/orders/{id}/claim", tag = "Orders",
    params(("id" = Uuid, Path, description = "Order id")),
    responses((status = 200, body = Order), (status = 409)), security(("bearerAuth" = [])))]
pub async fn claim_delivery(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>> {
    user.require(&[Role::Delivery])?;
    let staff = state.cooks.staff_for_profile(&user.profile_id).await?;
    Ok(Json(state.orders.claim_delivery(&staff, &id).await?))
}

#[utoipa::path(post, path = "/api/orders/{id}/dispatch", tag = "Orders",
    params(("id" = Uuid, Path, description = "Order id")), request_body = DispatchRequest,
    responses((status = 200, body = Order), (status = 409)), security(("bearerAuth" = [])))]
pub async fn dispatch_order(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<DispatchRequest>,
) -> Result<Json<Order>> {
    user.require(&[Role::Delivery])?;
    let staff = state.cooks.staff_for_profile(&user.profile_id).await?;
    Ok(Json(
        state
            .orders
            .dispatch(&staff, &id, &req.vehicle_type, &req.vehicle_number)
            .await?,
    ))
}

#[utoipa::path(post, path = "/api/orders/{id}/delivered", tag = "Orders",
    params(("id" = Uuid, Path, description = "Order id")),
    responses((status = 200, body = DeliveredResponse), (status = 409)), security(("bearerAuth" = [])))]
pub async fn mark_delivered(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveredResponse>> {
    let actor = state.orders.actor(&user).await?;
    let settlements = state.orders.complete_delivery(&actor, &id).await?;
    Ok(Json(DeliveredResponse {
        order_id: id,
        settlements,
    }))
}

#[utoipa::path(get, path = "/api/alerts", tag = "Notification",
    responses((status = 200, body = [AlertView])), security(("bearerAuth" = [])))]
pub async fn pending_alerts(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<AlertView>>> {
    let staff_id = match user.role {
        Role::Cook => state.cooks.cook_for_profile(&user.profile_id).await?.id,
        Role::Delivery => state.cooks.staff_for_profile(&user.profile_id).await?.id,
        _ => return Err(AppError::Forbidden("Only staff receive alerts".to_string())),
    };
    Ok(Json(state.notifications.pending_alerts(&staff_id, chrono::Utc::now())))
}

#[utoipa::path(get, path = "/api/orders/events", tag = "Orders", params(OrderEventsQuery),
    responses((status = 200, description = "text/event-stream of JSON `order` events")),
    security(("bearerAuth" = [])))]
pub async fn order_events(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<OrderEventsQuery>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let scope = match state.orders.actor(&user).await? {
        Actor::Admin(_) => FeedScope::Everything,
        Actor::Customer(id) => FeedScope::Customer(id),
        Actor::Cook(cook) => FeedScope::Cook(cook.id),
        Actor::Delivery(staff) => FeedScope::Delivery(staff),
    };
    let mut filter = FeedFilter::new(scope, query.service_type);
    let profile_id = user.profile_id;

    let stream = BroadcastStream::new(state.notifications.subscribe()).filter_map(move |result| match result {
        Ok(event) if filter.admits(&event) => match serde_json::to_string(&event) {
            Ok(json) => Some(Ok(Event::default().event("order").data(json))),
            Err(e) => {
                warn!(action = "order_event_encode_failed", order_id = %event.order_id, error = %e);
                None
            }
        },
        Ok(_) => None,
        // Lagged subscribers skip what they missed and carry on.
        Err(e) => {
            warn!(action = "order_feed_lagged", profile_id = %profile_id, error = %e);
            None
        }
    });

    info!(action = "order_feed_subscribed", profile_id = %profile_id, role = %user.role);
    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}

// Staff

#[utoipa::path(get, path = "/api/admin/cooks", tag = "Staff",
    responses((status = 200, body = [Cook])), security(("bearerAuth" = [])))]
pub async fn list_cooks(State(state): State<AppState>, AuthUser(user): AuthUser) -> Result<Json<Vec<Cook>>> {
    user.require(ADMIN)?;
    Ok(Json(state.cooks.list_cooks(false).await?))
}

#[utoipa::path(post, path = "/api/admin/cooks", tag = "Staff", request_body = RegisterCookRequest,
    responses((status = 201, body = Cook), (status = 400), (status = 409)), security(("bearerAuth" = [])))]
pub async fn register_cook(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<RegisterCookRequest>,
) -> Result<(StatusCode, Json<Cook>)> {
    user.require(ADMIN)?;
    let cook = state
        .cooks
        .register_cook(&req.profile_id, &req.kitchen_name, &req.panchayat, req.ward)
        .await?;
    Ok((StatusCode::CREATED, Json(cook)))
}

#[utoipa::path(put, path = "/api/admin/cooks/{id}/active", tag = "Staff",
    params(("id" = Uuid, Path, description = "Cook id")), request_body = CookActiveRequest,
    responses((status = 200, body = Cook), (status = 404)), security(("bearerAuth" = [])))]
pub async fn set_cook_active(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<CookActiveRequest>,
) -> Result<Json<Cook>> {
    user.require(ADMIN)?;
    Ok(Json(state.cooks.set_cook_active(&id, req.is_active).await?))
}

#[utoipa::path(post, path = "/api/admin/cooks/{id}/dishes", tag = "Staff",
    params(("id" = Uuid, Path, description = "Cook id")), request_body = AllocateDishRequest,
    responses((status = 201, body = CookDish), (status = 409)), security(("bearerAuth" = [])))]
pub async fn allocate_dish(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<AllocateDishRequest>,
) -> Result<(StatusCode, Json<CookDish>)> {
    user.require(ADMIN)?;
    let dish = state.cooks.allocate_dish(&id, &req.food_item_id).await?;
    Ok((StatusCode::CREATED, Json(dish)))
}

#[utoipa::path(get, path = "/api/cooks/{id}/dishes", tag = "Staff",
    params(("id" = Uuid, Path, description = "Cook id")),
    responses((status = 200, body = [CookDish])), security(("bearerAuth" = [])))]
pub async fn list_cook_dishes(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CookDish>>> {
    if user.role != Role::Admin {
        user.require(&[Role::Cook])?;
        if state.cooks.cook_for_profile(&user.profile_id).await?.id != id {
            return Err(AppError::Forbidden("You can only view your own dishes".to_string()));
        }
    }
    Ok(Json(state.cooks.list_cook_dishes(&id).await?))
}

#[utoipa::path(get, path = "/api/admin/delivery-staff", tag = "Staff",
    responses((status = 200, body = [DeliveryStaff])), security(("bearerAuth" = [])))]
pub async fn list_delivery_staff(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<DeliveryStaff>>> {
    user.require(ADMIN)?;
    Ok(Json(state.cooks.list_delivery_staff(false).await?))
}

#[utoipa::path(post, path = "/api/admin/delivery-staff", tag = "Staff", request_body = RegisterDeliveryStaffRequest,
    responses((status = 201, body = DeliveryStaff), (status = 400), (status = 409)), security(("bearerAuth" = [])))]
pub async fn register_delivery_staff(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<RegisterDeliveryStaffRequest>,
) -> Result<(StatusCode, Json<DeliveryStaff>)> {
    user.require(ADMIN)?;
    let staff = state
        .cooks
        .register_delivery_staff(&req.profile_id, req.panchayats, req.wards)
        .await?;
    Ok((StatusCode::CREATED, Json(staff)))
}

#[utoipa::path(post, path = "/api/dish-requests", tag = "Staff", request_body = DishRequestBody,
    responses((status = 201, body = CookDishRequest), (status = 409)), security(("bearerAuth" = [])))]
pub async fn create_dish_request(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<DishRequestBody>,
) -> Result<(StatusCode, Json<CookDishRequest>)> {
    user.require(&[Role::Cook])?;
    let cook = state.cooks.cook_for_profile(&user.profile_id).await?;
    let request = state
        .cooks
        .request_dish(&cook.id, &req.food_item_id, req.note)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

#[utoipa::path(get, path = "/api/dish-requests", tag = "Staff",
    responses((status = 200, body = [CookDishRequest])), security(("bearerAuth" = [])))]
pub async fn list_dish_requests(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<CookDishRequest>>> {
    let requests = match user.role {
        Role::Admin => state.cooks.list_dish_requests(None, None).await?,
        Role::Cook => {
            let cook = state.cooks.cook_for_profile(&user.profile_id).await?;
            state.cooks.list_dish_requests(None, Some(&cook.id)).await?
        }
        _ => return Err(AppError::Forbidden("Only cooks and admins see dish requests".to_string())),
    };
    Ok(Json(requests))
}

#[utoipa::path(post, path = "/api/admin/dish-requests/{id}/review", tag = "Staff",
    params(("id" = Uuid, Path, description = "Dish request id")), request_body = ReviewRequest,
    responses((status = 200, body = CookDishRequest), (status = 409)), security(("bearerAuth" = [])))]
pub async fn review_dish_request(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<CookDishRequest>> {
    user.require(ADMIN)?;
    Ok(Json(state.cooks.review_dish_request(&id, req.approve).await?))
}

// Settlements

/// Payee identity of a staff caller.
async fn own_payee(state: &AppState, user: &AuthenticatedUser) -> Result<(PayeeKind, Uuid)> {
    match user.role {
        Role::Cook => Ok((PayeeKind::Cook, state.cooks.cook_for_profile(&user.profile_id).await?.id)),
        Role::Delivery => Ok((
            PayeeKind::Delivery,
            state.cooks.staff_for_profile(&user.profile_id).await?.id,
        )),
        _ => Err(AppError::Forbidden("Only cooks and delivery staff have wallets".to_string())),
    }
}

#[utoipa::path(get, path = "/api/settlements", tag = "Settlements", params(SettlementQuery),
    responses((status = 200, body = [Settlement])), security(("bearerAuth" = [])))]
pub async fn list_settlements(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<SettlementQuery>,
) -> Result<Json<Vec<Settlement>>> {
    let payee = if user.role == Role::Admin {
        match (query.payee_kind, query.payee_id) {
            (Some(kind), Some(id)) => Some((kind, id)),
            (None, None) => None,
            _ => {
                return Err(AppError::ValidationError(
                    "payee_kind and payee_id go together".to_string(),
                ))
            }
        }
    } else {
        Some(own_payee(&state, &user).await?)
    };
    Ok(Json(
        state
            .settlements
            .list(query.status, payee, query.order_id.as_ref())
            .await?,
    ))
}

#[utoipa::path(post, path = "/api/admin/settlements/{id}/approve", tag = "Settlements",
    params(("id" = Uuid, Path, description = "Settlement id")),
    responses((status = 200, body = Settlement), (status = 409)), security(("bearerAuth" = [])))]
pub async fn approve_settlement(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Settlement>> {
    user.require(ADMIN)?;
    Ok(Json(state.settlements.approve(&id, &user.profile_id).await?))
}

#[utoipa::path(post, path = "/api/admin/settlements/approve", tag = "Settlements", request_body = BulkApproveRequest,
    responses((status = 200, body = ApprovedResponse), (status = 409)), security(("bearerAuth" = [])))]
pub async fn bulk_approve_settlements(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<BulkApproveRequest>,
) -> Result<Json<ApprovedResponse>> {
    user.require(ADMIN)?;
    let approved = state
        .settlements
        .approve_many(&req.settlement_ids, &user.profile_id)
        .await?;
    info!(action = "bulk_approve", count = approved.len(), admin = %user.profile_id);
    Ok(Json(ApprovedResponse {
        count: approved.len(),
        approved,
    }))
}

#[utoipa::path(get, path = "/api/wallet", tag = "Settlements",
    responses((status = 200, body = WalletSummary), (status = 403)), security(("bearerAuth" = [])))]
pub async fn my_wallet(State(state): State<AppState>, AuthUser(user): AuthUser) -> Result<Json<WalletSummary>> {
    let (kind, id) = own_payee(&state, &user).await?;
    Ok(Json(state.settlements.wallet(kind, &id).await?))
}

#[utoipa::path(get, path = "/api/admin/wallets/{kind}/{id}", tag = "Settlements",
    params(("kind" = PayeeKind, Path, description = "cook or delivery"), ("id" = Uuid, Path, description = "Payee id")),
    responses((status = 200, body = WalletSummary)), security(("bearerAuth" = [])))]
pub async fn payee_wallet(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((kind, id)): Path<(PayeeKind, Uuid)>,
) -> Result<Json<WalletSummary>> {
    user.require(ADMIN)?;
    Ok(Json(state.settlements.wallet(kind, &id).await?))
}

// Notifications

#[utoipa::path(get, path = "/api/notifications", tag = "Notification", params(NotificationQuery),
    responses((status = 200, body = [Notification])), security(("bearerAuth" = [])))]
pub async fn list_notifications(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<Notification>>> {
    Ok(Json(
        state
            .notifications
            .get_profile_notifications(&user.profile_id, query.limit.or(Some(50)))
            .await?,
    ))
}

#[utoipa::path(post, path = "/api/notifications/{id}/read", tag = "Notification",
    params(("id" = Uuid, Path, description = "Notification id")),
    responses((status = 200, body = MessageResponse), (status = 404)), security(("bearerAuth" = [])))]
pub async fn mark_notification_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>> {
    state
        .notifications
        .mark_notification_read(&id, &user.profile_id)
        .await?;
    Ok(Json(MessageResponse {
        message: "Notification marked as read".to_string(),
    }))
}
