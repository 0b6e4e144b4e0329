use axum::{
    http::{header, Method},
    middleware,
    response::IntoResponse,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Instrument};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::database::sqlite::SqliteDatabase;
use crate::errors::{AppError, Result};
use crate::services::auth::AuthService;
use crate::services::cart_service::CartService;
use crate::services::catalog_service::CatalogService;
use crate::services::cook_service::CookService;
use crate::services::notification_service::NotificationService;
use crate::services::order_service::OrderService;
use crate::services::settlement_service::SettlementService;
use crate::utils::middleware::{rate_limiter_middleware, RateLimiter};

pub mod routes;
pub mod types;

/// Everything a handler can reach.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub database: Arc<SqliteDatabase>,
    pub auth: Arc<AuthService>,
    pub catalog: Arc<CatalogService>,
    pub carts: Arc<CartService>,
    pub cooks: Arc<CookService>,
    pub orders: Arc<OrderService>,
    pub settlements: Arc<SettlementService>,
    pub notifications: Arc<NotificationService>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(database: Arc<SqliteDatabase>, config: AppConfig) -> Self {
        let notifications = Arc::new(NotificationService::new(
            database.clone(),
            config.response_window_secs,
        ));
        Self {
            auth: Arc::new(AuthService::new(database.clone(), config.jwt_secret.clone())),
            catalog: Arc::new(CatalogService::new(database.clone())),
            carts: Arc::new(CartService::new(
                database.clone(),
                notifications.clone(),
                config.delivery_charge,
            )),
            cooks: Arc::new(CookService::new(database.clone(), notifications.clone())),
            orders: Arc::new(OrderService::new(database.clone(), notifications.clone())),
            settlements: Arc::new(SettlementService::new(database.clone(), notifications.clone())),
            limiter: Arc::new(RateLimiter::per_second(config.rate_limit_per_sec)),
            notifications,
            database,
            config: Arc::new(config),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::register,
        routes::login,
        routes::me,
        routes::list_categories,
        routes::create_category,
        routes::list_foods,
        routes::get_food,
        routes::create_food,
        routes::set_food_availability,
        routes::view_cart,
        routes::add_to_cart,
        routes::set_cart_quantity,
        routes::remove_cart_item,
        routes::clear_cart,
        routes::checkout,
        routes::list_orders,
        routes::get_order,
        routes::confirm_order,
        routes::cancel_order,
        routes::eligible_cooks,
        routes::assign_cooks,
        routes::respond_to_assignment,
        routes::mark_ready,
        routes::eligible_delivery_staff,
        routes::assign_delivery,
        routes::claim_delivery,
        routes::dispatch_order,
        routes::mark_delivered,
        routes::pending_alerts,
        routes::order_events,
        routes::list_cooks,
        routes::register_cook,
        routes::set_cook_active,
        routes::allocate_dish,
        routes::list_cook_dishes,
        routes::list_delivery_staff,
        routes::register_delivery_staff,
        routes::create_dish_request,
        routes::list_dish_requests,
        routes::review_dish_request,
        routes::list_settlements,
        routes::approve_settlement,
        routes::bulk_approve_settlements,
        routes::my_wallet,
        routes::payee_wallet,
        routes::list_notifications,
        routes::mark_notification_read,
    ),
    components(
        schemas(
            types::RegisterRequest,
            types::LoginRequest,
            types::LoginResponse,
            types::CreateCategoryRequest,
            types::CreateFoodItemRequest,
            types::AvailabilityRequest,
            types::AddToCartRequest,
            types::SetQuantityRequest,
            types::CheckoutRequest,
            types::OrderListResponse,
            types::ItemCook,
            types::AssignCooksRequest,
            types::RespondRequest,
            types::AssignDeliveryRequest,
            types::DispatchRequest,
            types::DeliveredResponse,
            types::RegisterCookRequest,
            types::RegisterDeliveryStaffRequest,
            types::CookActiveRequest,
            types::AllocateDishRequest,
            types::DishRequestBody,
            types::ReviewRequest,
            types::BulkApproveRequest,
            types::ApprovedResponse,
            types::MessageResponse,
            crate::services::cart_service::CartView,
            crate::models::cart::CartLine,
            crate::models::profile::Role,
            crate::models::profile::ProfileResponse,
            crate::models::food::ServiceType,
            crate::models::food::FoodCategory,
            crate::models::food::FoodItem,
            crate::models::order::OrderStatus,
            crate::models::order::CookStatus,
            crate::models::order::EventDetails,
            crate::models::order::Order,
            crate::models::order::OrderItem,
            crate::models::order::CookAssignment,
            crate::models::order::DeliveryVehicle,
            crate::models::order::OrderDetails,
            crate::models::cook::Cook,
            crate::models::cook::CookDish,
            crate::models::cook::RequestStatus,
            crate::models::cook::CookDishRequest,
            crate::models::delivery::DeliveryStaff,
            crate::models::settlement::PayeeKind,
            crate::models::settlement::SettlementStatus,
            crate::models::settlement::Settlement,
            crate::models::settlement::WalletTransaction,
            crate::models::settlement::WalletSummary,
            crate::models::notification::NotificationType,
            crate::models::notification::Notification,
            crate::models::notification::AlertKind,
            crate::models::notification::AlertView,
        )
    ),
    tags(
        (name = "Auth", description = "Registration and login"),
        (name = "Catalog", description = "Food categories and items"),
        (name = "Cart", description = "Customer cart and checkout"),
        (name = "Orders", description = "Order lifecycle, cook and delivery assignment. Use the Authorize button and paste your token as 'Bearer <token>'"),
        (name = "Staff", description = "Cook and delivery staff management"),
        (name = "Settlements", description = "Payouts to cooks and delivery staff"),
        (name = "Notification", description = "Inbox and pending alerts")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearerAuth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub async fn request_id_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let request_id = Uuid::new_v4().to_string();
    req.extensions_mut().insert(request_id.clone());
    let span = tracing::info_span!("request", request_id = %request_id, method = %req.method(), uri = %req.uri());
    next.run(req).instrument(span).await
}

/// The full HTTP surface, without the listener.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .nest("/api", routes::api_router())
        .route("/health", get(health_check))
        .merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn_with_state(
            state.limiter.clone(),
            rate_limiter_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Serves the API until Ctrl+C or SIGTERM; the expiry sweeper runs alongside.
pub async fn start_http_server(config: AppConfig) -> Result<()> {
    let database = Arc::new(SqliteDatabase::new(&config.database_path).await?);
    let port = config.port;
    let state = AppState::new(database, config);
    let sweeper = state.orders.clone().spawn_sweeper();
    let limiter = state.limiter.clone();
    let purger = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            ticker.tick().await;
            limiter.purge();
        }
    });

    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::ConfigError(format!("Failed to bind {}: {}", addr, e)))?;

    info!(action = "server_started", %addr, docs = %format!("http://{}/api/docs", addr));
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| AppError::InternalError(format!("Server error: {}", e)))?;

    sweeper.abort();
    purger.abort();
    info!(action = "server_stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(action = "signal_handler_failed", error = %e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(action = "signal_handler_failed", error = %e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn health_check() -> impl IntoResponse {
    "OK"
}
